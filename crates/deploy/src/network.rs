//! Network classification and confirmation depth selection.

use serde::{Deserialize, Serialize};

/// Default confirmation depth on live networks, deep enough to ride out reorgs.
pub const DEFAULT_LIVE_CONFIRMATIONS: u64 = 12;
/// Default confirmation depth on disposable or local networks.
pub const DEFAULT_EPHEMERAL_CONFIRMATIONS: u64 = 1;

/// Class of the target network.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Default,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum NetworkClass {
    /// A long-lived public network.
    Live,
    /// A test or local network that can be thrown away.
    #[default]
    Ephemeral,
}

/// Confirmation depth per network class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfirmationPolicy {
    pub live: u64,
    pub ephemeral: u64,
}

impl Default for ConfirmationPolicy {
    fn default() -> Self {
        Self {
            live: DEFAULT_LIVE_CONFIRMATIONS,
            ephemeral: DEFAULT_EPHEMERAL_CONFIRMATIONS,
        }
    }
}

impl ConfirmationPolicy {
    /// Required confirmations for the given class. Never less than 1.
    pub fn required(&self, class: NetworkClass) -> u64 {
        let depth = match class {
            NetworkClass::Live => self.live,
            NetworkClass::Ephemeral => self.ephemeral,
        };
        depth.max(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_default_policy() {
        let policy = ConfirmationPolicy::default();
        assert_eq!(policy.required(NetworkClass::Live), 12);
        assert_eq!(policy.required(NetworkClass::Ephemeral), 1);
    }

    #[test]
    fn test_policy_is_configurable() {
        let policy: ConfirmationPolicy = toml::from_str("live = 20").unwrap();
        assert_eq!(policy.required(NetworkClass::Live), 20);
        assert_eq!(policy.required(NetworkClass::Ephemeral), 1);
    }

    #[test]
    fn test_zero_depth_is_clamped() {
        let policy = ConfirmationPolicy {
            live: 0,
            ephemeral: 0,
        };
        assert_eq!(policy.required(NetworkClass::Live), 1);
        assert_eq!(policy.required(NetworkClass::Ephemeral), 1);
    }

    #[test]
    fn test_network_class_parse() {
        assert_eq!(NetworkClass::from_str("live").unwrap(), NetworkClass::Live);
        assert_eq!(
            NetworkClass::from_str("ephemeral").unwrap(),
            NetworkClass::Ephemeral
        );
        assert!(NetworkClass::from_str("mainnet").is_err());
        assert_eq!(NetworkClass::Live.to_string(), "live");
    }
}

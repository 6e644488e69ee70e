//! Minimal HTTP/1.1 server answering every request through a handler.

use std::sync::Arc;

use serde_json::Value;
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::{TcpListener, TcpStream},
};
use url::Url;

/// A request received by the stub server.
#[derive(Debug, Clone)]
pub struct StubRequest {
    pub path: String,
    pub body: String,
}

impl StubRequest {
    /// Decode an `application/x-www-form-urlencoded` body.
    pub fn form(&self) -> Vec<(String, String)> {
        url::form_urlencoded::parse(self.body.as_bytes())
            .into_owned()
            .collect()
    }

    pub fn form_value(&self, key: &str) -> Option<String> {
        self.form()
            .into_iter()
            .find_map(|(k, v)| (k == key).then_some(v))
    }
}

/// Start a server answering every request with `handler`'s JSON body.
pub async fn serve<F>(handler: F) -> Url
where
    F: Fn(StubRequest) -> Value + Send + Sync + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let handler = Arc::new(handler);

    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            let handler = handler.clone();
            tokio::spawn(async move {
                let _ = respond(stream, handler.as_ref()).await;
            });
        }
    });

    format!("http://{addr}/").parse().unwrap()
}

/// Start a JSON-RPC server; `handler` maps `(method, params)` to a result.
pub async fn serve_json_rpc<F>(handler: F) -> Url
where
    F: Fn(&str, &[Value]) -> Value + Send + Sync + 'static,
{
    serve(move |request| {
        let body: Value = serde_json::from_str(&request.body).unwrap();
        let method = body["method"].as_str().unwrap_or_default();
        let params = body["params"].as_array().cloned().unwrap_or_default();
        serde_json::json!({
            "jsonrpc": "2.0",
            "id": body["id"].clone(),
            "result": handler(method, &params),
        })
    })
    .await
}

async fn respond<F>(mut stream: TcpStream, handler: &F) -> std::io::Result<()>
where
    F: Fn(StubRequest) -> Value,
{
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];

    let header_end = loop {
        let n = stream.read(&mut chunk).await?;
        if n == 0 {
            return Ok(());
        }
        buf.extend_from_slice(&chunk[..n]);
        if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos + 4;
        }
    };

    let head = String::from_utf8_lossy(&buf[..header_end]).to_string();
    let path = head.split_whitespace().nth(1).unwrap_or("/").to_string();
    let length = head
        .lines()
        .find_map(|line| {
            let (name, value) = line.split_once(':')?;
            if name.eq_ignore_ascii_case("content-length") {
                value.trim().parse::<usize>().ok()
            } else {
                None
            }
        })
        .unwrap_or(0);

    while buf.len() < header_end + length {
        let n = stream.read(&mut chunk).await?;
        if n == 0 {
            break;
        }
        buf.extend_from_slice(&chunk[..n]);
    }
    let end = buf.len().min(header_end + length);
    let body = String::from_utf8_lossy(&buf[header_end..end]).to_string();

    let response = handler(StubRequest { path, body }).to_string();
    let reply = format!(
        "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        response.len(),
        response
    );
    stream.write_all(reply.as_bytes()).await?;
    stream.shutdown().await
}

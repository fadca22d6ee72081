//! Local JSON-RPC node for exercising contract reads without a network.
//!
//! Every `eth_call` is answered with `respond(calldata)`. The node records
//! the calldata it served and the peak number of requests it was handling
//! at once.

use alloy::primitives::Bytes;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

/// Maps `eth_call` calldata to ABI-encoded return data.
pub type Responder = fn(&[u8]) -> Vec<u8>;

#[derive(Debug, Default)]
struct NodeState {
    calls: Mutex<Vec<Bytes>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

/// Handle to a running node. The node lives until the runtime shuts down.
#[derive(Debug, Clone)]
pub struct TestNode {
    url: String,
    state: Arc<NodeState>,
}

impl TestNode {
    pub async fn spawn(respond: Responder) -> std::io::Result<Self> {
        Self::spawn_with_latency(respond, Duration::ZERO).await
    }

    /// Hold every response for `latency` so overlapping requests are visible.
    pub async fn spawn_with_latency(
        respond: Responder,
        latency: Duration,
    ) -> std::io::Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let url = format!("http://{}", listener.local_addr()?);
        let state = Arc::new(NodeState::default());

        let accept_state = state.clone();
        tokio::spawn(async move {
            while let Ok((socket, _)) = listener.accept().await {
                tokio::spawn(serve(socket, respond, latency, accept_state.clone()));
            }
        });

        Ok(Self { url, state })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Number of served calls whose calldata starts with `selector`.
    pub fn calls_to(&self, selector: [u8; 4]) -> usize {
        let calls = self.state.calls.lock().unwrap_or_else(|e| e.into_inner());
        calls.iter().filter(|c| c.starts_with(&selector)).count()
    }

    /// Peak concurrent requests since start or the last reset.
    pub fn max_in_flight(&self) -> usize {
        self.state.max_in_flight.load(Ordering::SeqCst)
    }

    pub fn reset_max_in_flight(&self) {
        self.state.max_in_flight.store(0, Ordering::SeqCst);
    }
}

async fn read_more(socket: &mut TcpStream, buf: &mut Vec<u8>) -> bool {
    let mut chunk = [0u8; 4096];
    match socket.read(&mut chunk).await {
        Ok(0) | Err(_) => false,
        Ok(n) => {
            buf.extend_from_slice(&chunk[..n]);
            true
        }
    }
}

/// Serve keep-alive HTTP/1.1 requests on one connection.
async fn serve(
    mut socket: TcpStream,
    respond: Responder,
    latency: Duration,
    state: Arc<NodeState>,
) {
    let mut buf = Vec::new();
    loop {
        let header_end = loop {
            if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
                break pos + 4;
            }
            if !read_more(&mut socket, &mut buf).await {
                return;
            }
        };
        let headers = String::from_utf8_lossy(&buf[..header_end]).to_ascii_lowercase();
        let length = headers
            .lines()
            .find_map(|l| l.strip_prefix("content-length:"))
            .and_then(|v| v.trim().parse::<usize>().ok())
            .unwrap_or(0);
        while buf.len() < header_end + length {
            if !read_more(&mut socket, &mut buf).await {
                return;
            }
        }
        let body = buf[header_end..header_end + length].to_vec();
        buf.drain(..header_end + length);

        let Ok(request) = serde_json::from_slice::<serde_json::Value>(&body) else {
            return;
        };

        let current = state.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        state.max_in_flight.fetch_max(current, Ordering::SeqCst);

        let call = &request["params"][0];
        let calldata: Bytes = call["input"]
            .as_str()
            .or(call["data"].as_str())
            .and_then(|hex| hex.parse().ok())
            .unwrap_or_default();
        let result = Bytes::from(respond(&calldata));
        state
            .calls
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(calldata);

        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
        state.in_flight.fetch_sub(1, Ordering::SeqCst);

        let body = serde_json::json!({
            "jsonrpc": "2.0",
            "id": request["id"],
            "result": result,
        })
        .to_string();
        let response = format!(
            "HTTP/1.1 200 OK\r\ncontent-type: application/json\r\ncontent-length: {}\r\n\r\n{}",
            body.len(),
            body
        );
        if socket.write_all(response.as_bytes()).await.is_err() {
            return;
        }
    }
}

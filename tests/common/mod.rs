//! Shared utilities for the integration tests.

use std::net::SocketAddr;
use std::time::Duration;

use handoff::{Router, Server};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::oneshot;

/// A running server. Dropping it shuts the server down.
pub struct TestServer {
    pub addr: SocketAddr,
    _shutdown: oneshot::Sender<()>,
}

/// Start `router` on an ephemeral port.
pub async fn spawn(router: Router) -> TestServer {
    spawn_with(router, |server| server).await
}

/// Start `router` on an ephemeral port with extra server configuration.
pub async fn spawn_with(router: Router, configure: impl FnOnce(Server) -> Server) -> TestServer {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (tx, rx) = oneshot::channel::<()>();

    let server = configure(Server::from_listener(listener));
    tokio::spawn(async move {
        server
            .serve_with_shutdown(router, async {
                let _ = rx.await;
            })
            .await
            .unwrap();
    });

    TestServer { addr, _shutdown: tx }
}

/// A parsed HTTP/1.1 response.
#[allow(dead_code)]
pub struct RawResponse {
    pub status: u16,
    pub head: String,
    pub body: String,
}

#[allow(dead_code)]
impl RawResponse {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.head.lines().skip(1).find_map(|line| {
            let (k, v) = line.split_once(':')?;
            k.trim().eq_ignore_ascii_case(name).then(|| v.trim())
        })
    }
}

/// Send a raw request and read the response until the server closes.
#[allow(dead_code)]
pub async fn raw(addr: SocketAddr, method: &str, path: &str, headers: &[(&str, &str)]) -> RawResponse {
    send(addr, method, path, headers, b"").await
}

/// `POST` with a body and a matching `Content-Length`.
#[allow(dead_code)]
pub async fn post(addr: SocketAddr, path: &str, body: &[u8]) -> RawResponse {
    let len = body.len().to_string();
    send(addr, "POST", path, &[("Content-Length", &len)], body).await
}

async fn send(
    addr: SocketAddr,
    method: &str,
    path: &str,
    headers: &[(&str, &str)],
    body: &[u8],
) -> RawResponse {
    let mut stream = TcpStream::connect(addr).await.unwrap();

    let mut req = format!("{method} {path} HTTP/1.1\r\nHost: {addr}\r\n");
    if !headers.iter().any(|(k, _)| k.eq_ignore_ascii_case("connection")) {
        req.push_str("Connection: close\r\n");
    }
    for (k, v) in headers {
        req.push_str(&format!("{k}: {v}\r\n"));
    }
    req.push_str("\r\n");
    stream.write_all(req.as_bytes()).await.unwrap();
    stream.write_all(body).await.unwrap();

    let mut buf = Vec::new();
    tokio::time::timeout(Duration::from_secs(5), stream.read_to_end(&mut buf))
        .await
        .expect("server did not close the connection")
        .unwrap();

    let text = String::from_utf8_lossy(&buf).into_owned();
    let (head, body) = text.split_once("\r\n\r\n").unwrap_or((text.as_str(), ""));
    let status = head
        .split_whitespace()
        .nth(1)
        .and_then(|s| s.parse().ok())
        .unwrap_or(0);

    RawResponse { status, head: head.to_owned(), body: body.to_owned() }
}

/// `GET` shorthand.
#[allow(dead_code)]
pub async fn get(addr: SocketAddr, path: &str) -> RawResponse {
    raw(addr, "GET", path, &[]).await
}

/// Headers of a valid WebSocket upgrade request. `close` makes the server
/// hang up after a refusal instead of keeping the connection alive.
#[allow(dead_code)]
pub const UPGRADE: &[(&str, &str)] = &[
    ("Connection", "Upgrade, close"),
    ("Upgrade", "websocket"),
    ("Sec-WebSocket-Version", "13"),
    ("Sec-WebSocket-Key", "dGhlIHNhbXBsZSBub25jZQ=="),
];

/// Give detached tasks a moment to run.
#[allow(dead_code)]
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(50)).await;
}

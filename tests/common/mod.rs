#![allow(dead_code)]

use async_trait::async_trait;
use once_cell::sync::Lazy;
use restbridge::services::endpoint::ResolvedRequest;
use restbridge::services::transport::{HttpTransport, TransportError, UpstreamResponse};
use serde_json::Value;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::{Duration, Instant};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Mutex;

pub static ENV_LOCK: Lazy<Mutex<()>> = Lazy::new(|| Mutex::new(()));

pub fn restore_env(key: &str, previous: Option<String>) {
    match previous {
        Some(value) => std::env::set_var(key, value),
        None => std::env::remove_var(key),
    }
}

#[derive(Clone, Debug)]
pub enum Reply {
    Json(u16, Value),
    Text(u16, String),
    Refused,
    Hang,
}

/// Polls `condition` until it holds or `within` runs out.
pub async fn wait_until(within: Duration, condition: impl Fn() -> bool) -> bool {
    let deadline = Instant::now() + within;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}

/// Bumps the counter when dropped before `disarm`.
struct DropCounter<'a>(Option<&'a AtomicUsize>);

impl DropCounter<'_> {
    fn disarm(mut self) {
        self.0 = None;
    }
}

impl Drop for DropCounter<'_> {
    fn drop(&mut self) {
        if let Some(counter) = self.0 {
            counter.fetch_add(1, Ordering::SeqCst);
        }
    }
}

/// In-memory transport that records every request it is asked to send.
pub struct RecordingTransport {
    reply: Reply,
    calls: StdMutex<Vec<ResolvedRequest>>,
    abandoned: AtomicUsize,
}

impl RecordingTransport {
    pub fn new(reply: Reply) -> Arc<Self> {
        Arc::new(Self {
            reply,
            calls: StdMutex::new(Vec::new()),
            abandoned: AtomicUsize::new(0),
        })
    }

    /// Hanging sends whose future was dropped before it finished.
    pub fn abandoned(&self) -> usize {
        self.abandoned.load(Ordering::SeqCst)
    }

    pub fn calls(&self) -> Vec<ResolvedRequest> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl HttpTransport for RecordingTransport {
    async fn send(
        &self,
        request: &ResolvedRequest,
        _timeout: Duration,
    ) -> Result<UpstreamResponse, TransportError> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(request.clone());
        }
        match &self.reply {
            Reply::Json(status, body) => Ok(UpstreamResponse::json(*status, body.clone())),
            Reply::Text(status, text) => Ok(UpstreamResponse {
                status: *status,
                body: None,
                text: text.clone(),
            }),
            Reply::Refused => Err(TransportError::Unavailable("connection refused".into())),
            Reply::Hang => {
                let guard = DropCounter(Some(&self.abandoned));
                tokio::time::sleep(Duration::from_secs(3600)).await;
                guard.disarm();
                Err(TransportError::Timeout)
            }
        }
    }
}

#[derive(Clone, Debug)]
pub struct CapturedRequest {
    pub method: String,
    pub target: String,
    pub body: String,
}

pub struct TestServer {
    pub base_url: String,
    pub requests: Arc<StdMutex<Vec<CapturedRequest>>>,
}

impl TestServer {
    pub fn requests(&self) -> Vec<CapturedRequest> {
        self.requests.lock().map(|r| r.clone()).unwrap_or_default()
    }
}

/// Minimal HTTP/1.1 server answering every request with the same response.
pub async fn spawn_http_server(status: u16, content_type: &str, body: &str) -> TestServer {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    let requests = Arc::new(StdMutex::new(Vec::new()));
    let captured = requests.clone();
    let response = format!(
        "HTTP/1.1 {} Test\r\nContent-Type: {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        status,
        content_type,
        body.len(),
        body
    );
    tokio::spawn(async move {
        loop {
            let Ok((mut stream, _)) = listener.accept().await else {
                break;
            };
            let captured = captured.clone();
            let response = response.clone();
            tokio::spawn(async move {
                if let Some(request) = read_request(&mut stream).await {
                    captured.lock().expect("lock").push(request);
                }
                let _ = stream.write_all(response.as_bytes()).await;
                let _ = stream.shutdown().await;
            });
        }
    });
    TestServer {
        base_url: format!("http://{}", addr),
        requests,
    }
}

pub struct SilentServer {
    pub base_url: String,
    received: Arc<AtomicUsize>,
    closed: Arc<AtomicUsize>,
}

impl SilentServer {
    /// Connections that delivered a full request head.
    pub fn received(&self) -> usize {
        self.received.load(Ordering::SeqCst)
    }

    /// Connections the client has closed.
    pub fn closed(&self) -> usize {
        self.closed.load(Ordering::SeqCst)
    }
}

/// Reads requests and never answers. Each connection is held open until the
/// client closes it.
pub async fn spawn_silent_server() -> SilentServer {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    let received = Arc::new(AtomicUsize::new(0));
    let closed = Arc::new(AtomicUsize::new(0));
    let (received_in, closed_in) = (received.clone(), closed.clone());
    tokio::spawn(async move {
        while let Ok((mut stream, _)) = listener.accept().await {
            let received = received_in.clone();
            let closed = closed_in.clone();
            tokio::spawn(async move {
                let mut seen = Vec::new();
                let mut chunk = [0u8; 4096];
                let mut counted = false;
                loop {
                    match stream.read(&mut chunk).await {
                        Ok(0) | Err(_) => break,
                        Ok(n) => seen.extend_from_slice(&chunk[..n]),
                    }
                    if !counted && seen.windows(4).any(|w| w == b"\r\n\r\n") {
                        counted = true;
                        received.fetch_add(1, Ordering::SeqCst);
                    }
                }
                closed.fetch_add(1, Ordering::SeqCst);
            });
        }
    });
    SilentServer {
        base_url: format!("http://{}", addr),
        received,
        closed,
    }
}

/// An address nothing listens on.
pub async fn closed_port_url() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    drop(listener);
    format!("http://{}", addr)
}

async fn read_request(stream: &mut TcpStream) -> Option<CapturedRequest> {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];
    let head_end = loop {
        let n = stream.read(&mut chunk).await.ok()?;
        if n == 0 {
            return None;
        }
        buf.extend_from_slice(&chunk[..n]);
        if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos + 4;
        }
    };
    let head = String::from_utf8_lossy(&buf[..head_end]).to_string();
    let mut lines = head.lines();
    let mut request_line = lines.next()?.split_whitespace();
    let method = request_line.next()?.to_string();
    let target = request_line.next()?.to_string();
    let content_length = lines
        .filter_map(|line| line.split_once(':'))
        .find(|(name, _)| name.trim().eq_ignore_ascii_case("content-length"))
        .and_then(|(_, value)| value.trim().parse::<usize>().ok())
        .unwrap_or(0);
    while buf.len() < head_end + content_length {
        let n = stream.read(&mut chunk).await.ok()?;
        if n == 0 {
            break;
        }
        buf.extend_from_slice(&chunk[..n]);
    }
    let body = String::from_utf8_lossy(&buf[head_end..]).to_string();
    Some(CapturedRequest {
        method,
        target,
        body,
    })
}

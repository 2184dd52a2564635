#![allow(dead_code)]

use hfmd_core::{HubClient, ProgressSink, TransferCoordinator};
use hfmd_types::{FileDescriptor, TaskId, TransferOutcome};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

pub const REPO: &str = "org/model";

pub fn coordinator(endpoint: &str) -> TransferCoordinator {
    TransferCoordinator::new(HubClient::with_endpoint(endpoint, None).unwrap())
}

pub fn file(path: &str, size: u64) -> FileDescriptor {
    FileDescriptor::file(path, format!("oid-{}", path), size)
}

pub fn resolve_path(path: &str) -> String {
    format!("/{}/resolve/main/{}", REPO, path)
}

pub async fn read(path: impl AsRef<Path>) -> Vec<u8> {
    tokio::fs::read(path).await.unwrap()
}

/// Records sink calls and the peak number of tasks between `start` and `finish`
#[derive(Default)]
pub struct RecordingSink {
    pub totals: Mutex<HashMap<TaskId, u64>>,
    pub advanced: Mutex<HashMap<TaskId, u64>>,
    active: AtomicUsize,
    pub peak: AtomicUsize,
}

impl ProgressSink for RecordingSink {
    fn start(&self, _task: TaskId, _path: &str) {
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
    }

    fn set_total(&self, task: TaskId, total: u64) {
        let previous = self.totals.lock().insert(task, total);
        assert!(previous.is_none(), "set_total called twice for {task}");
        assert!(
            !self.advanced.lock().contains_key(&task),
            "set_total called after advance for {task}"
        );
    }

    fn advance(&self, task: TaskId, delta: u64) {
        *self.advanced.lock().entry(task).or_insert(0) += delta;
    }

    fn finish(&self, _task: TaskId, _outcome: &TransferOutcome) {
        self.active.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Responses that a regular mock server will not produce
#[derive(Clone)]
pub enum RawReply {
    /// 206 for `Range: bytes=N-`, 200 otherwise
    Ranged(Vec<u8>),
    /// 200 without Content-Length, body ends when the connection closes
    NoLength(Vec<u8>),
    /// Declares `declared` bytes, sends `body`, then keeps the connection open
    Stall { declared: u64, body: Vec<u8> },
    /// Declares `declared` bytes, sends `body`, then closes the connection
    Truncated { declared: u64, body: Vec<u8> },
}

#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub path: String,
    pub range: Option<String>,
}

/// Minimal HTTP/1.1 responder over a raw TCP socket
pub struct RawServer {
    addr: SocketAddr,
    requests: Arc<Mutex<Vec<RecordedRequest>>>,
}

impl RawServer {
    pub async fn start(routes: HashMap<String, RawReply>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let requests = Arc::new(Mutex::new(Vec::new()));
        let routes = Arc::new(routes);

        let recorded = requests.clone();
        tokio::spawn(async move {
            while let Ok((socket, _)) = listener.accept().await {
                let routes = routes.clone();
                let recorded = recorded.clone();
                tokio::spawn(async move {
                    let _ = serve(socket, &routes, &recorded).await;
                });
            }
        });

        Self { addr, requests }
    }

    pub fn uri(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().clone()
    }
}

async fn serve(
    mut socket: TcpStream,
    routes: &HashMap<String, RawReply>,
    recorded: &Mutex<Vec<RecordedRequest>>,
) -> std::io::Result<()> {
    let mut head = Vec::new();
    let mut buf = [0u8; 1024];
    while !head.windows(4).any(|w| w == b"\r\n\r\n") {
        let n = socket.read(&mut buf).await?;
        if n == 0 {
            return Ok(());
        }
        head.extend_from_slice(&buf[..n]);
    }

    let head = String::from_utf8_lossy(&head).to_string();
    let mut lines = head.lines();
    let path = lines
        .next()
        .and_then(|l| l.split_whitespace().nth(1))
        .unwrap_or("/")
        .to_string();
    let range = lines.find_map(|l| {
        let (name, value) = l.split_once(':')?;
        name.eq_ignore_ascii_case("range").then(|| value.trim().to_string())
    });
    recorded.lock().push(RecordedRequest {
        path: path.clone(),
        range: range.clone(),
    });

    let Some(reply) = routes.get(&path) else {
        socket
            .write_all(b"HTTP/1.1 404 Not Found\r\nContent-Length: 0\r\nConnection: close\r\n\r\n")
            .await?;
        return socket.shutdown().await;
    };

    match reply {
        RawReply::Ranged(body) => {
            let offset = range
                .as_deref()
                .and_then(|r| r.strip_prefix("bytes="))
                .and_then(|r| r.trim_end_matches('-').parse::<usize>().ok());
            let response = match offset {
                Some(offset) if offset <= body.len() => {
                    let rest = &body[offset..];
                    let mut out = format!(
                        "HTTP/1.1 206 Partial Content\r\nContent-Length: {}\r\nContent-Range: bytes {}-{}/{}\r\nConnection: close\r\n\r\n",
                        rest.len(),
                        offset,
                        body.len().saturating_sub(1),
                        body.len()
                    )
                    .into_bytes();
                    out.extend_from_slice(rest);
                    out
                }
                _ => {
                    let mut out = format!(
                        "HTTP/1.1 200 OK\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                        body.len()
                    )
                    .into_bytes();
                    out.extend_from_slice(body);
                    out
                }
            };
            socket.write_all(&response).await?;
            socket.shutdown().await
        }
        RawReply::NoLength(body) => {
            socket
                .write_all(b"HTTP/1.1 200 OK\r\nConnection: close\r\n\r\n")
                .await?;
            socket.write_all(body).await?;
            socket.shutdown().await
        }
        RawReply::Stall { declared, body } => {
            let header = format!(
                "HTTP/1.1 200 OK\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                declared
            );
            socket.write_all(header.as_bytes()).await?;
            socket.write_all(body).await?;
            socket.flush().await?;
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(())
        }
        RawReply::Truncated { declared, body } => {
            let header = format!(
                "HTTP/1.1 200 OK\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                declared
            );
            socket.write_all(header.as_bytes()).await?;
            socket.write_all(body).await?;
            socket.shutdown().await
        }
    }
}

use crate::config::types::SocketConfig;
use crate::normalize::normalize_line;
use crate::record::{CanonicalRecord, Origin};
use crate::source::framing::LineFramer;
use crate::source::IngestSink;
use serde::Serialize;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::AsyncReadExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

const READ_CHUNK_BYTES: usize = 8 * 1024;

/// Result of a start or stop request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StartOutcome {
    pub ok: bool,
    pub message: String,
}

impl StartOutcome {
    fn ok(message: impl Into<String>) -> Self {
        Self {
            ok: true,
            message: message.into(),
        }
    }

    fn failed(message: impl Into<String>) -> Self {
        Self {
            ok: false,
            message: message.into(),
        }
    }
}

struct Listening {
    owner: String,
    addr: SocketAddr,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

/// Line-oriented TCP listener.
///
/// Each accepted connection is framed on newlines; every complete line is
/// normalized and emitted immediately. One consumer owns the listener at a
/// time; start and stop requests from anyone else are refused.
pub struct SocketSource {
    config: SocketConfig,
    sink: Arc<dyn IngestSink>,
    state: Mutex<Option<Listening>>,
}

impl SocketSource {
    pub fn new(config: SocketConfig, sink: Arc<dyn IngestSink>) -> Self {
        Self {
            config,
            sink,
            state: Mutex::new(None),
        }
    }

    /// Binds `port` and starts accepting connections on behalf of `owner`.
    ///
    /// Bind failures are reported in the outcome, never raised.
    pub async fn start(&self, port: u16, owner: &str) -> StartOutcome {
        let mut state = self.state.lock().await;

        if let Some(listening) = state.as_ref() {
            if listening.owner != owner {
                return StartOutcome::failed(format!(
                    "socket listener is owned by '{}'",
                    listening.owner
                ));
            }
            return StartOutcome::ok(format!("already listening on {}", listening.addr));
        }

        let listener = match TcpListener::bind((self.config.bind.as_str(), port)).await {
            Ok(listener) => listener,
            Err(e) => {
                error!(bind = %self.config.bind, port = port, error = %e, "Failed to start socket listener");
                return StartOutcome::failed(format!(
                    "failed to bind {}:{}: {}",
                    self.config.bind, port, e
                ));
            }
        };

        let addr = match listener.local_addr() {
            Ok(addr) => addr,
            Err(e) => return StartOutcome::failed(format!("failed to read local address: {}", e)),
        };

        let cancel = CancellationToken::new();
        let task = tokio::spawn(accept_loop(
            listener,
            self.config.clone(),
            Arc::clone(&self.sink),
            cancel.clone(),
        ));

        info!(addr = %addr, owner = %owner, "Socket listener started");

        *state = Some(Listening {
            owner: owner.to_string(),
            addr,
            cancel,
            task,
        });

        StartOutcome::ok(format!("listening on {}", addr))
    }

    /// Stops the listener and closes every open connection.
    pub async fn stop(&self, requester: &str) -> StartOutcome {
        let mut state = self.state.lock().await;

        match state.as_ref() {
            None => return StartOutcome::failed("socket listener is not running"),
            Some(listening) if listening.owner != requester => {
                return StartOutcome::failed(format!(
                    "socket listener is owned by '{}'",
                    listening.owner
                ));
            }
            Some(_) => {}
        }

        let Some(listening) = state.take() else {
            return StartOutcome::failed("socket listener is not running");
        };

        listening.cancel.cancel();
        if let Err(e) = listening.task.await {
            warn!(error = %e, "Socket accept task ended abnormally");
        }

        info!(addr = %listening.addr, "Socket listener stopped");
        StartOutcome::ok(format!("stopped listening on {}", listening.addr))
    }

    /// Address actually bound, useful when started on port 0.
    pub async fn local_addr(&self) -> Option<SocketAddr> {
        self.state.lock().await.as_ref().map(|l| l.addr)
    }

    pub async fn owner(&self) -> Option<String> {
        self.state.lock().await.as_ref().map(|l| l.owner.clone())
    }
}

async fn accept_loop(
    listener: TcpListener,
    config: SocketConfig,
    sink: Arc<dyn IngestSink>,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    if !config.allowed_peers.is_empty()
                        && !config.allowed_peers.contains(&peer.ip())
                    {
                        warn!(peer = %peer, "Rejected connection from unauthorized peer");
                        continue;
                    }

                    debug!(peer = %peer, "Accepted connection");
                    tokio::spawn(handle_connection(
                        stream,
                        peer,
                        config.max_line_bytes,
                        Arc::clone(&sink),
                        cancel.child_token(),
                    ));
                }
                Err(e) => {
                    warn!(error = %e, "Socket accept error");
                }
            }
        }
    }
}

async fn handle_connection(
    mut stream: TcpStream,
    peer: SocketAddr,
    max_line_bytes: usize,
    sink: Arc<dyn IngestSink>,
    cancel: CancellationToken,
) {
    let source = format!("tcp://{}", peer);
    let mut framer = LineFramer::new(max_line_bytes);
    let mut chunk = vec![0u8; READ_CHUNK_BYTES];

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            read = stream.read(&mut chunk) => match read {
                Ok(0) => {
                    if let Some(rest) = framer.finish() {
                        emit_line(sink.as_ref(), &rest, &source);
                    }
                    debug!(peer = %peer, "Connection closed");
                    break;
                }
                Ok(n) => {
                    for line in framer.push(&chunk[..n]) {
                        emit_line(sink.as_ref(), &line, &source);
                    }
                }
                Err(e) => {
                    warn!(peer = %peer, error = %e, "Connection error");
                    sink.emit(
                        Origin::Socket,
                        vec![CanonicalRecord::synthetic_error(
                            format!("connection error: {}", e),
                            source.clone(),
                        )],
                    );
                    break;
                }
            }
        }
    }
}

fn emit_line(sink: &dyn IngestSink, line: &str, source: &str) {
    if line.trim().is_empty() {
        return;
    }
    sink.emit(Origin::Socket, vec![normalize_line(line, source)]);
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncWriteExt;
    use tokio::sync::mpsc;

    fn test_config() -> SocketConfig {
        SocketConfig {
            enabled: true,
            bind: "127.0.0.1".to_string(),
            port: 0,
            ..SocketConfig::default()
        }
    }

    #[tokio::test]
    async fn test_start_stop_lifecycle() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let source = SocketSource::new(test_config(), Arc::new(tx));

        assert!(!source.stop("ui").await.ok);

        let started = source.start(0, "ui").await;
        assert!(started.ok, "{}", started.message);
        assert!(source.local_addr().await.is_some());
        assert_eq!(source.owner().await.as_deref(), Some("ui"));

        let again = source.start(0, "ui").await;
        assert!(again.ok);
        assert!(again.message.starts_with("already listening"));

        let stopped = source.stop("ui").await;
        assert!(stopped.ok);
        assert!(source.local_addr().await.is_none());
    }

    #[tokio::test]
    async fn test_other_owner_is_refused() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let source = SocketSource::new(test_config(), Arc::new(tx));

        assert!(source.start(0, "ui").await.ok);
        let denied = source.start(0, "intruder").await;
        assert!(!denied.ok);
        assert!(denied.message.contains("'ui'"));
        assert!(!source.stop("intruder").await.ok);
        assert!(source.stop("ui").await.ok);
    }

    #[tokio::test]
    async fn test_bind_failure_is_reported() {
        let occupied = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = occupied.local_addr().unwrap().port();

        let (tx, _rx) = mpsc::unbounded_channel();
        let source = SocketSource::new(test_config(), Arc::new(tx));

        let outcome = source.start(port, "ui").await;
        assert!(!outcome.ok);
        assert!(outcome.message.contains("failed to bind"));
    }

    #[tokio::test]
    async fn test_lines_are_emitted_in_order() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let source = SocketSource::new(test_config(), Arc::new(tx));
        assert!(source.start(0, "ui").await.ok);
        let addr = source.local_addr().await.unwrap();

        let mut client = TcpStream::connect(addr).await.unwrap();
        client
            .write_all(b"{\"message\":\"first\"}\nsecond li")
            .await
            .unwrap();
        client.write_all(b"ne\n\nthird").await.unwrap();
        client.shutdown().await.unwrap();
        drop(client);

        let mut messages = Vec::new();
        while messages.len() < 3 {
            let (origin, records) = rx.recv().await.unwrap();
            assert_eq!(origin, Origin::Socket);
            messages.extend(records.into_iter().map(|r| r.message));
        }
        assert_eq!(messages, vec!["first", "second line", "third"]);

        source.stop("ui").await;
    }

    #[tokio::test]
    async fn test_disallowed_peer_is_rejected() {
        let config = SocketConfig {
            allowed_peers: vec!["10.255.255.1".parse().unwrap()],
            ..test_config()
        };
        let (tx, mut rx) = mpsc::unbounded_channel();
        let source = SocketSource::new(config, Arc::new(tx));
        assert!(source.start(0, "ui").await.ok);
        let addr = source.local_addr().await.unwrap();

        let mut client = TcpStream::connect(addr).await.unwrap();
        let _ = client.write_all(b"sneaky\n").await;
        drop(client);

        let received =
            tokio::time::timeout(std::time::Duration::from_millis(200), rx.recv()).await;
        assert!(received.is_err(), "no records expected from rejected peer");

        source.stop("ui").await;
    }
}

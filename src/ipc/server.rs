//! Unix domain socket server for IPC
//!
//! Provides request-response communication for status queries and a push
//! notification stream (HUD cues, prevented-quit totals) for subscribed
//! clients such as the overlay and menu-bar companions.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::{broadcast, RwLock};
use tracing::{debug, error, info, warn};

use crate::stats::QuitLedger;

use super::protocol::{DaemonStatus, Notification, Request, Response};

/// IPC server handling client connections
pub struct Server {
    socket_path: PathBuf,
    listener: Option<UnixListener>,
    state: Arc<RwLock<ServerState>>,
    ledger: Arc<dyn QuitLedger>,
    notify_tx: broadcast::Sender<Notification>,
    shutdown_tx: broadcast::Sender<()>,
}

/// Shared server state
struct ServerState {
    status: DaemonStatus,
    start_time: std::time::Instant,
}

impl Server {
    /// Create a new IPC server bound to `socket_path`
    pub fn new(
        socket_path: &Path,
        ledger: Arc<dyn QuitLedger>,
        notify_tx: broadcast::Sender<Notification>,
    ) -> Result<Self> {
        // Ensure parent directory exists
        if let Some(parent) = socket_path.parent() {
            std::fs::create_dir_all(parent).context("failed to create socket directory")?;
        }

        // Remove stale socket if it exists
        if socket_path.exists() {
            std::fs::remove_file(socket_path).context("failed to remove stale socket")?;
        }

        let listener = UnixListener::bind(socket_path).context("failed to bind Unix socket")?;

        // Set socket permissions to owner-only (0600)
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(socket_path, std::fs::Permissions::from_mode(0o600))?;
        }

        let (shutdown_tx, _) = broadcast::channel(1);

        let state = Arc::new(RwLock::new(ServerState {
            status: DaemonStatus::default(),
            start_time: std::time::Instant::now(),
        }));

        info!(?socket_path, "IPC server listening");

        Ok(Self {
            socket_path: socket_path.to_owned(),
            listener: Some(listener),
            state,
            ledger,
            notify_tx,
            shutdown_tx,
        })
    }

    /// Record whether the quit taps are installed
    pub async fn set_guarding(&self, guarding: bool) {
        let mut state = self.state.write().await;
        state.status.guarding = guarding;
    }

    /// Run the server, accepting connections
    pub async fn run(&self) -> Result<()> {
        let listener = self.listener.as_ref().context("server not initialized")?;

        loop {
            match listener.accept().await {
                Ok((stream, _addr)) => {
                    debug!("client connected");
                    let state = Arc::clone(&self.state);
                    let ledger = Arc::clone(&self.ledger);
                    let notify_tx = self.notify_tx.clone();
                    let mut shutdown_rx = self.shutdown_tx.subscribe();

                    tokio::spawn(async move {
                        tokio::select! {
                            result = Self::handle_client(stream, state, ledger, notify_tx) => {
                                if let Err(e) = result {
                                    warn!(?e, "client handler error");
                                }
                            }
                            _ = shutdown_rx.recv() => {
                                debug!("client handler shutting down");
                            }
                        }
                    });
                }
                Err(e) => {
                    error!(?e, "accept error");
                }
            }
        }
    }

    /// Handle a single client connection
    async fn handle_client(
        mut stream: UnixStream,
        state: Arc<RwLock<ServerState>>,
        ledger: Arc<dyn QuitLedger>,
        notify_tx: broadcast::Sender<Notification>,
    ) -> Result<()> {
        let mut len_buf = [0u8; 4];

        loop {
            // Read message length (4-byte little-endian)
            match stream.read_exact(&mut len_buf).await {
                Ok(_) => {}
                Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                    debug!("client disconnected");
                    return Ok(());
                }
                Err(e) => return Err(e.into()),
            }

            let len = u32::from_le_bytes(len_buf) as usize;
            if len > 1024 * 1024 {
                warn!(len, "message too large, disconnecting");
                return Ok(());
            }

            // Read message body
            let mut msg_buf = vec![0u8; len];
            stream.read_exact(&mut msg_buf).await?;

            // Parse request; a malformed frame gets an error response
            // rather than a disconnect.
            let request: Request = match serde_json::from_slice(&msg_buf) {
                Ok(request) => request,
                Err(e) => {
                    let response = Response::Error {
                        code: "bad_request".to_string(),
                        message: e.to_string(),
                    };
                    Self::send_message(&mut stream, &response).await?;
                    continue;
                }
            };

            debug!(?request, "received request");

            let (response, subscribe) = Self::process_request(request, &state, &ledger).await;

            if subscribe {
                // Subscribe before confirming so nothing sent after the
                // confirmation can be missed.
                let notify_rx = notify_tx.subscribe();
                Self::send_message(&mut stream, &response).await?;
                debug!("client subscribed to notifications");
                return Self::push_notifications(stream, notify_rx).await;
            }

            Self::send_message(&mut stream, &response).await?;
        }
    }

    /// Stream notifications to a subscribed client until either side closes
    async fn push_notifications(
        mut stream: UnixStream,
        mut notify_rx: broadcast::Receiver<Notification>,
    ) -> Result<()> {
        loop {
            match notify_rx.recv().await {
                Ok(notification) => {
                    Self::send_message(&mut stream, &notification).await?;
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!(skipped = n, "notification receiver lagged");
                }
                Err(broadcast::error::RecvError::Closed) => return Ok(()),
            }
        }
    }

    /// Send a length-prefixed JSON message
    async fn send_message<T: serde::Serialize>(stream: &mut UnixStream, msg: &T) -> Result<()> {
        let msg_bytes = serde_json::to_vec(msg)?;
        let msg_len = (msg_bytes.len() as u32).to_le_bytes();

        stream.write_all(&msg_len).await?;
        stream.write_all(&msg_bytes).await?;

        Ok(())
    }

    /// Process a request and return a response
    /// Returns (Response, should_subscribe)
    async fn process_request(
        request: Request,
        state: &Arc<RwLock<ServerState>>,
        ledger: &Arc<dyn QuitLedger>,
    ) -> (Response, bool) {
        match request {
            Request::Ping => (Response::Pong, false),

            Request::GetStatus => {
                let mut state = state.write().await;
                state.status.uptime_secs = state.start_time.elapsed().as_secs();
                state.status.quits_prevented = ledger.prevented();
                (Response::Status(state.status.clone()), false)
            }

            Request::Subscribe => (Response::Subscribed, true),
        }
    }

    /// Gracefully shutdown the server
    pub async fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());

        // Remove socket file
        if self.socket_path.exists() {
            if let Err(e) = std::fs::remove_file(&self.socket_path) {
                warn!(?e, "failed to remove socket file");
            }
        }

        info!("IPC server shutdown complete");
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU64, Ordering};

    use super::*;

    struct FixedLedger {
        count: AtomicU64,
    }

    impl QuitLedger for FixedLedger {
        fn record_prevented(&self) -> u64 {
            self.count.fetch_add(1, Ordering::SeqCst) + 1
        }

        fn prevented(&self) -> u64 {
            self.count.load(Ordering::SeqCst)
        }
    }

    async fn send_request(stream: &mut UnixStream, request: &Request) {
        let bytes = serde_json::to_vec(request).unwrap();
        stream
            .write_all(&(bytes.len() as u32).to_le_bytes())
            .await
            .unwrap();
        stream.write_all(&bytes).await.unwrap();
    }

    async fn read_frame<T: serde::de::DeserializeOwned>(stream: &mut UnixStream) -> T {
        let mut len_buf = [0u8; 4];
        stream.read_exact(&mut len_buf).await.unwrap();
        let mut buf = vec![0u8; u32::from_le_bytes(len_buf) as usize];
        stream.read_exact(&mut buf).await.unwrap();
        serde_json::from_slice(&buf).unwrap()
    }

    fn start_server() -> (PathBuf, broadcast::Sender<Notification>, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let socket_path = dir.path().join("test.sock");
        let (notify_tx, _) = broadcast::channel(16);
        let ledger = Arc::new(FixedLedger {
            count: AtomicU64::new(3),
        });

        let server = Server::new(&socket_path, ledger, notify_tx.clone()).unwrap();
        tokio::spawn(async move {
            let _ = server.run().await;
        });

        (socket_path, notify_tx, dir)
    }

    #[tokio::test]
    async fn test_status_roundtrip() {
        let (socket_path, _notify_tx, _dir) = start_server();

        let mut stream = UnixStream::connect(&socket_path).await.unwrap();
        send_request(&mut stream, &Request::GetStatus).await;

        match read_frame::<Response>(&mut stream).await {
            Response::Status(status) => {
                assert_eq!(status.quits_prevented, 3);
                assert!(!status.guarding);
            }
            other => panic!("unexpected response: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_subscribe_streams_notifications() {
        let (socket_path, notify_tx, _dir) = start_server();

        let mut stream = UnixStream::connect(&socket_path).await.unwrap();
        send_request(&mut stream, &Request::Subscribe).await;
        assert!(matches!(
            read_frame::<Response>(&mut stream).await,
            Response::Subscribed
        ));

        notify_tx.send(Notification::HudShow).unwrap();
        notify_tx.send(Notification::QuitPrevented { total: 4 }).unwrap();

        assert_eq!(read_frame::<Notification>(&mut stream).await, Notification::HudShow);
        assert_eq!(
            read_frame::<Notification>(&mut stream).await,
            Notification::QuitPrevented { total: 4 }
        );
    }
}

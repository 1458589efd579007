//! Session — one live client-to-server connection plus its handshake state.
//!
//! A session owns the subprocess (if one was spawned) and both halves of the
//! message channel. A writer task drains an mpsc queue of outbound frames; a
//! reader task dispatches inbound frames into a pending-response map. Every
//! path that reaches `Closed` releases the channel and terminates the
//! subprocess.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::AsyncWriteExt;
use tokio::process::Child;
use tokio::sync::{Mutex, mpsc, oneshot};

use crate::codec::{FrameReader, FrameWriter};
use crate::config::InitializationOptions;
use crate::error::SessionError;
use crate::launcher::ServerHandle;
use crate::protocol::{self, Incoming};
use crate::selector::DocumentSelector;

/// Bound on the initialize handshake.
const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(30);

/// Bound on the shutdown acknowledgment, and again on child exit before the
/// process is force-terminated.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(2);

const WRITER_CHANNEL_CAPACITY: usize = 64;

/// Where the session is in its life. `Closed` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Unstarted,
    Handshaking,
    Active,
    ShuttingDown,
    Closed,
}

enum WriterCommand {
    Send(serde_json::Value),
    Shutdown,
}

type PendingMap = Arc<Mutex<HashMap<u64, oneshot::Sender<serde_json::Value>>>>;

/// One request/response/notification channel to an analysis server.
pub struct Session {
    state: SessionState,
    child: Option<Child>,
    writer_tx: mpsc::Sender<WriterCommand>,
    pending: PendingMap,
    next_id: u64,
    selector: DocumentSelector,
    init_options: InitializationOptions,
    server_capabilities: Option<serde_json::Value>,
    #[allow(dead_code)]
    reader_handle: tokio::task::JoinHandle<()>,
    #[allow(dead_code)]
    writer_handle: tokio::task::JoinHandle<()>,
}

impl Session {
    /// Wire up the channel tasks over the given transport. The session is
    /// `Unstarted` until [`start`](Self::start) completes the handshake.
    #[must_use]
    pub fn new(
        handle: ServerHandle,
        selector: DocumentSelector,
        init_options: InitializationOptions,
    ) -> Self {
        let ServerHandle {
            child,
            stdin,
            stdout,
        } = handle;

        let (writer_tx, mut writer_rx) = mpsc::channel(WRITER_CHANNEL_CAPACITY);
        let writer_handle = tokio::spawn(async move {
            let mut writer = FrameWriter::new(stdin);
            while let Some(cmd) = writer_rx.recv().await {
                match cmd {
                    WriterCommand::Send(frame) => {
                        if let Err(e) = writer.write_frame(&frame).await {
                            tracing::warn!("session write error: {e}");
                            break;
                        }
                    }
                    WriterCommand::Shutdown => break,
                }
            }
            // Half-close so the server sees EOF on its input. Dropping the
            // write half is not enough for transports whose read half the
            // session still holds.
            let mut stream = writer.into_inner();
            let _ = stream.shutdown().await;
        });

        let pending: PendingMap = Arc::new(Mutex::new(HashMap::new()));
        let reader_pending = pending.clone();
        let reader_writer_tx = writer_tx.clone();
        let reader_handle = tokio::spawn(async move {
            let mut reader = FrameReader::new(stdout);
            loop {
                match reader.read_frame().await {
                    Ok(Some(frame)) => {
                        dispatch_frame(&frame, &reader_pending, &reader_writer_tx).await;
                    }
                    Ok(None) => {
                        tracing::info!("analysis server closed its output stream");
                        break;
                    }
                    Err(e) => {
                        tracing::warn!("session read error: {e}");
                        break;
                    }
                }
            }
            // Dropping the senders resolves in-flight requests with
            // `ChannelClosed` instead of leaving them to time out.
            reader_pending.lock().await.clear();
        });

        Self {
            state: SessionState::Unstarted,
            child,
            writer_tx,
            pending,
            next_id: 1,
            selector,
            init_options,
            server_capabilities: None,
            reader_handle,
            writer_handle,
        }
    }

    /// Perform the initialize handshake.
    ///
    /// Suspends until the server answers, the handshake bound elapses, or the
    /// channel dies. `Active` is entered only on success; every failure path
    /// cleans up and lands in `Closed`. There is no "started" without
    /// "ready".
    pub async fn start(&mut self) -> Result<(), SessionError> {
        if self.state != SessionState::Unstarted {
            return Err(SessionError::AlreadyStarted);
        }
        self.state = SessionState::Handshaking;

        match self.handshake().await {
            Ok(capabilities) => {
                self.server_capabilities = Some(capabilities);
                self.state = SessionState::Active;
                Ok(())
            }
            Err(e) => {
                self.close(false).await;
                Err(e)
            }
        }
    }

    async fn handshake(&mut self) -> Result<serde_json::Value, SessionError> {
        let params = protocol::initialize_params(&self.init_options, &self.selector);
        let response = self
            .send_request("initialize", Some(params), HANDSHAKE_TIMEOUT)
            .await?;

        if let Some(error) = response.get("error") {
            let message = error
                .get("message")
                .and_then(|m| m.as_str())
                .unwrap_or("unknown error");
            return Err(SessionError::HandshakeFailed(message.to_string()));
        }

        self.send_notification("initialized", Some(serde_json::json!({})))
            .await?;

        Ok(response
            .get("result")
            .and_then(|r| r.get("capabilities"))
            .cloned()
            .unwrap_or_default())
    }

    /// Gracefully shut the session down.
    ///
    /// No-op returning success when there is nothing to stop. Otherwise the
    /// session always reaches `Closed`, force-terminating the subprocess if
    /// it outlives the shutdown bound. Idempotent.
    pub async fn stop(&mut self) -> Result<(), SessionError> {
        if matches!(self.state, SessionState::Unstarted | SessionState::Closed) {
            return Ok(());
        }
        self.state = SessionState::ShuttingDown;

        let result = self.request_shutdown().await;
        self.close(result.is_ok()).await;
        result
    }

    async fn request_shutdown(&mut self) -> Result<(), SessionError> {
        let response = self.send_request("shutdown", None, SHUTDOWN_TIMEOUT).await?;
        if response.get("error").is_none() {
            self.send_notification("exit", None).await?;
        }
        Ok(())
    }

    /// Release the channel and the subprocess. Terminal.
    ///
    /// When `graceful`, the child was asked to exit and gets the shutdown
    /// bound to do so; otherwise it is terminated immediately.
    async fn close(&mut self, graceful: bool) {
        let _ = self.writer_tx.send(WriterCommand::Shutdown).await;

        if let Some(mut child) = self.child.take() {
            if graceful {
                let exited = tokio::time::timeout(SHUTDOWN_TIMEOUT, child.wait()).await;
                if exited.is_err() {
                    tracing::debug!("analysis server did not exit in time, killing");
                    let _ = child.kill().await;
                }
            } else {
                let _ = child.kill().await;
            }
        }

        self.pending.lock().await.clear();
        self.state = SessionState::Closed;
    }

    async fn send_request(
        &mut self,
        method: &'static str,
        params: Option<serde_json::Value>,
        timeout: Duration,
    ) -> Result<serde_json::Value, SessionError> {
        let id = self.next_id;
        self.next_id += 1;

        let (tx, rx) = oneshot::channel();
        self.pending.lock().await.insert(id, tx);

        let frame = protocol::request_frame(id, method, params);
        if self
            .writer_tx
            .send(WriterCommand::Send(frame))
            .await
            .is_err()
        {
            self.pending.lock().await.remove(&id);
            return Err(SessionError::ChannelClosed);
        }

        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(response)) => Ok(response),
            Ok(Err(_)) => {
                // Reader task ended or the server exited.
                self.pending.lock().await.remove(&id);
                Err(SessionError::ChannelClosed)
            }
            Err(_) => {
                self.pending.lock().await.remove(&id);
                Err(SessionError::Timeout { method })
            }
        }
    }

    async fn send_notification(
        &self,
        method: &'static str,
        params: Option<serde_json::Value>,
    ) -> Result<(), SessionError> {
        let frame = protocol::notification_frame(method, params);
        self.writer_tx
            .send(WriterCommand::Send(frame))
            .await
            .map_err(|_| SessionError::ChannelClosed)
    }

    /// Whether a document is in scope for this session.
    #[must_use]
    pub fn covers(&self, scheme: &str, language_id: &str, path: &Path) -> bool {
        self.selector.matches(scheme, language_id, path)
    }

    #[must_use]
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Capabilities the server reported during the handshake; present only
    /// once `Active`.
    #[must_use]
    pub fn server_capabilities(&self) -> Option<&serde_json::Value> {
        self.server_capabilities.as_ref()
    }
}

async fn dispatch_frame(
    frame: &serde_json::Value,
    pending: &Mutex<HashMap<u64, oneshot::Sender<serde_json::Value>>>,
    writer_tx: &mpsc::Sender<WriterCommand>,
) {
    let Some(incoming) = protocol::classify(frame) else {
        tracing::trace!("ignoring malformed frame from server");
        return;
    };

    match incoming {
        Incoming::Response { id, body } => {
            if let Some(tx) = pending.lock().await.remove(&id) {
                let _ = tx.send(body);
            }
        }
        Incoming::ServerRequest { id, method } => {
            tracing::debug!("server request `{method}`, replying method not found");
            let reply = protocol::method_not_found(&id, &method);
            let _ = writer_tx.send(WriterCommand::Send(reply)).await;
        }
        Incoming::Notification { method } => {
            // Diagnostics and other analysis traffic are the host's concern,
            // not the lifecycle's.
            tracing::trace!("ignoring server notification `{method}`");
        }
    }
}

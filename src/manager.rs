//! Lifecycle manager — the two entry points the host framework calls.
//!
//! Owned as an explicit value by the host-integration layer; there is no
//! ambient global. The manager guarantees at most one live [`Session`],
//! sequences configuration → command resolution → spawn → handshake on
//! start, and always lands back in `Idle` on stop.

use std::path::PathBuf;

use crate::config::{self, ConfigReader};
use crate::error::StartError;
use crate::launcher::{self, Launcher, Platform};
use crate::session::Session;

/// Where the lifecycle is between host hooks.
///
/// Transitions only `Idle → Starting → Running → Stopping → Idle`, with
/// `Starting → Idle` on failure or disabled configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Idle,
    Starting,
    Running,
    Stopping,
}

/// Process-wide owner of at most one live [`Session`].
///
/// The session is stored only on the success path and taken on stop, so
/// "`Running` with no session" is unrepresentable.
pub struct LifecycleManager<R, L> {
    reader: R,
    launcher: L,
    bundled_dir: PathBuf,
    state: LifecycleState,
    session: Option<Session>,
}

impl<R: ConfigReader, L: Launcher> LifecycleManager<R, L> {
    #[must_use]
    pub fn new(reader: R, launcher: L, bundled_dir: PathBuf) -> Self {
        Self {
            reader,
            launcher,
            bundled_dir,
            state: LifecycleState::Idle,
            session: None,
        }
    }

    /// Host activation hook. Safe to call any number of times; only an
    /// `Idle` manager acts, so a second activation (or one racing an
    /// unfinished start) is a no-op.
    ///
    /// Failures are logged, never propagated: a broken configuration or a
    /// missing server binary must not crash the host.
    pub async fn start_hook(&mut self) {
        if self.state != LifecycleState::Idle {
            tracing::debug!(state = ?self.state, "start requested while not idle, ignoring");
            return;
        }
        self.state = LifecycleState::Starting;

        match self.try_start().await {
            Ok(Some(session)) => {
                tracing::info!("calcagebra language server session started");
                self.session = Some(session);
                self.state = LifecycleState::Running;
            }
            Ok(None) => {
                tracing::debug!("calcagebra language server disabled by configuration");
                self.state = LifecycleState::Idle;
            }
            Err(e) => {
                tracing::error!("failed to start calcagebra language server: {e}");
                self.state = LifecycleState::Idle;
            }
        }
    }

    /// The start sequence: resolve config, resolve the command, spawn,
    /// handshake. `Ok(None)` is the deliberate disabled state. A session
    /// that fails its handshake has already released its resources.
    async fn try_start(&mut self) -> Result<Option<Session>, StartError> {
        let config = config::resolve(&self.reader)?;
        if !config.enabled() {
            return Ok(None);
        }

        let spec = launcher::resolve_command(&config, Platform::current(), &self.bundled_dir);
        tracing::info!("launching analysis server: {spec}");
        let handle = self.launcher.spawn(&spec)?;

        let mut session = Session::new(
            handle,
            config.document_selector().clone(),
            config.initialization_options().clone(),
        );
        session.start().await?;
        Ok(Some(session))
    }

    /// Host deactivation hook. Safe to call any number of times; only a
    /// `Running` manager acts.
    ///
    /// Always lands in `Idle`, even when graceful shutdown reports an error.
    pub async fn stop_hook(&mut self) {
        if self.state != LifecycleState::Running {
            tracing::debug!(state = ?self.state, "stop requested while not running, ignoring");
            return;
        }
        self.state = LifecycleState::Stopping;

        if let Some(mut session) = self.session.take() {
            if let Err(e) = session.stop().await {
                tracing::warn!("error during session shutdown: {e}");
            }
        }
        self.state = LifecycleState::Idle;
    }

    #[must_use]
    pub fn state(&self) -> LifecycleState {
        self.state
    }

    /// The live session, present exactly while `Running`.
    #[must_use]
    pub fn session(&self) -> Option<&Session> {
        self.session.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{FrameReader, FrameWriter};
    use crate::error::SpawnError;
    use crate::launcher::{ExecutableSpec, ServerHandle};
    use crate::session::SessionState;
    use serde_json::json;
    use std::collections::HashMap;
    use std::path::PathBuf;
    use std::sync::Arc;
    use std::sync::Mutex as StdMutex;

    /// What the fake server behind the spy launcher does.
    #[derive(Clone, Copy)]
    enum FakeBehavior {
        Healthy,
        RejectInitialize,
        FailSpawn,
    }

    /// Records every spawn and hands back an in-memory transport driven by a
    /// scripted server task.
    #[derive(Clone)]
    struct SpyLauncher {
        behavior: FakeBehavior,
        spawned: Arc<StdMutex<Vec<PathBuf>>>,
    }

    impl SpyLauncher {
        fn new(behavior: FakeBehavior) -> Self {
            Self {
                behavior,
                spawned: Arc::new(StdMutex::new(Vec::new())),
            }
        }

        fn spawn_count(&self) -> usize {
            self.spawned.lock().unwrap().len()
        }

        fn spawned_commands(&self) -> Vec<PathBuf> {
            self.spawned.lock().unwrap().clone()
        }
    }

    impl Launcher for SpyLauncher {
        fn spawn(&mut self, spec: &ExecutableSpec) -> Result<ServerHandle, SpawnError> {
            self.spawned
                .lock()
                .unwrap()
                .push(spec.command().to_path_buf());

            if matches!(self.behavior, FakeBehavior::FailSpawn) {
                return Err(SpawnError::Io {
                    command: spec.command().to_path_buf(),
                    source: std::io::Error::new(std::io::ErrorKind::NotFound, "no such file"),
                });
            }

            let (ours, theirs) = tokio::io::duplex(64 * 1024);
            let (our_read, our_write) = tokio::io::split(ours);
            let (their_read, their_write) = tokio::io::split(theirs);

            tokio::spawn(run_fake_server(
                FrameReader::new(their_read),
                FrameWriter::new(their_write),
                self.behavior,
            ));

            Ok(ServerHandle {
                child: None,
                stdin: Box::new(our_write),
                stdout: Box::new(our_read),
            })
        }
    }

    async fn run_fake_server<R, W>(
        mut reader: FrameReader<R>,
        mut writer: FrameWriter<W>,
        behavior: FakeBehavior,
    ) where
        R: tokio::io::AsyncRead + Unpin,
        W: tokio::io::AsyncWrite + Unpin,
    {
        let Ok(Some(init)) = reader.read_frame().await else {
            return;
        };
        assert_eq!(init["method"], "initialize");

        if matches!(behavior, FakeBehavior::RejectInitialize) {
            let reply = json!({
                "jsonrpc": "2.0",
                "id": init["id"],
                "error": { "code": -32002, "message": "server not ready" }
            });
            let _ = writer.write_frame(&reply).await;
            return;
        }

        let reply = json!({
            "jsonrpc": "2.0",
            "id": init["id"],
            "result": { "capabilities": { "hoverProvider": true } }
        });
        let _ = writer.write_frame(&reply).await;

        while let Ok(Some(frame)) = reader.read_frame().await {
            match frame["method"].as_str() {
                Some("shutdown") => {
                    let reply = json!({"jsonrpc": "2.0", "id": frame["id"], "result": null});
                    let _ = writer.write_frame(&reply).await;
                }
                Some("exit") => return,
                _ => {}
            }
        }
    }

    fn reader(pairs: &[(&str, serde_json::Value)]) -> HashMap<String, serde_json::Value> {
        pairs
            .iter()
            .map(|(key, value)| ((*key).to_string(), value.clone()))
            .collect()
    }

    fn enabled_reader() -> HashMap<String, serde_json::Value> {
        reader(&[("server.enable", json!(true))])
    }

    fn manager(
        config: HashMap<String, serde_json::Value>,
        behavior: FakeBehavior,
    ) -> (
        LifecycleManager<HashMap<String, serde_json::Value>, SpyLauncher>,
        SpyLauncher,
    ) {
        let launcher = SpyLauncher::new(behavior);
        let spy = launcher.clone();
        (
            LifecycleManager::new(config, launcher, PathBuf::from("/bundle/out")),
            spy,
        )
    }

    #[tokio::test]
    async fn disabled_config_never_touches_the_launcher() {
        let (mut mgr, spy) = manager(HashMap::new(), FakeBehavior::Healthy);
        mgr.start_hook().await;
        assert_eq!(mgr.state(), LifecycleState::Idle);
        assert_eq!(spy.spawn_count(), 0);
        assert!(mgr.session().is_none());
    }

    #[tokio::test]
    async fn start_then_stop_settles_idle() {
        let (mut mgr, spy) = manager(enabled_reader(), FakeBehavior::Healthy);

        mgr.start_hook().await;
        assert_eq!(mgr.state(), LifecycleState::Running);
        assert_eq!(mgr.session().unwrap().state(), SessionState::Active);
        assert_eq!(spy.spawn_count(), 1);

        mgr.stop_hook().await;
        assert_eq!(mgr.state(), LifecycleState::Idle);
        assert!(mgr.session().is_none());
    }

    #[tokio::test]
    async fn double_start_yields_exactly_one_session() {
        let (mut mgr, spy) = manager(enabled_reader(), FakeBehavior::Healthy);
        mgr.start_hook().await;
        mgr.start_hook().await;
        assert_eq!(mgr.state(), LifecycleState::Running);
        assert_eq!(spy.spawn_count(), 1);
    }

    #[tokio::test]
    async fn stop_when_idle_is_a_noop() {
        let (mut mgr, _spy) = manager(enabled_reader(), FakeBehavior::Healthy);
        mgr.stop_hook().await;
        assert_eq!(mgr.state(), LifecycleState::Idle);
    }

    #[tokio::test]
    async fn spawn_failure_reverts_to_idle() {
        let (mut mgr, spy) = manager(enabled_reader(), FakeBehavior::FailSpawn);
        mgr.start_hook().await;
        assert_eq!(mgr.state(), LifecycleState::Idle);
        assert!(mgr.session().is_none());
        assert_eq!(spy.spawn_count(), 1);

        // A later activation may try again.
        mgr.start_hook().await;
        assert_eq!(spy.spawn_count(), 2);
    }

    #[tokio::test]
    async fn rejected_handshake_never_reports_running() {
        let (mut mgr, _spy) = manager(enabled_reader(), FakeBehavior::RejectInitialize);
        mgr.start_hook().await;
        assert_eq!(mgr.state(), LifecycleState::Idle);
        assert!(mgr.session().is_none());
    }

    #[tokio::test]
    async fn malformed_config_reverts_to_idle_without_spawning() {
        let (mut mgr, spy) = manager(
            reader(&[("server.enable", json!("definitely"))]),
            FakeBehavior::Healthy,
        );
        mgr.start_hook().await;
        assert_eq!(mgr.state(), LifecycleState::Idle);
        assert_eq!(spy.spawn_count(), 0);
    }

    #[tokio::test]
    async fn explicit_path_override_is_spawned_verbatim() {
        let (mut mgr, spy) = manager(
            reader(&[
                ("server.enable", json!(true)),
                ("server.path", json!("/custom/bin")),
            ]),
            FakeBehavior::Healthy,
        );
        mgr.start_hook().await;
        assert_eq!(spy.spawned_commands(), vec![PathBuf::from("/custom/bin")]);
    }

    #[tokio::test]
    async fn hook_sequences_settle_in_idle_or_running() {
        let (mut mgr, _spy) = manager(enabled_reader(), FakeBehavior::Healthy);

        mgr.start_hook().await;
        mgr.start_hook().await;
        mgr.stop_hook().await;
        mgr.stop_hook().await;
        mgr.start_hook().await;
        mgr.stop_hook().await;

        assert_eq!(mgr.state(), LifecycleState::Idle);

        // And a restart still works after the churn.
        mgr.start_hook().await;
        assert_eq!(mgr.state(), LifecycleState::Running);
    }
}

//! The casting session controller.
//!
//! Owns at most one [`CastingSession`]. Every start, stop and reset runs under
//! one async mutex, so a new session is only built after the previous one has
//! been fully torn down. Status lives in a watch channel next to that mutex:
//! reads never wait on a start in progress, and the crash monitor can flag a
//! dead encoder without taking the lock.

use chrono::Utc;
use hlscast_av::{EncoderBackend, EncoderSpec, ResolveOptions, SessionWorkspace};
use hlscast_common::{CastState, SessionId};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Weak};
use tokio::sync::{watch, Mutex};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use super::error::CastError;
use super::failure::{write_failure_bundle, FailureReport};
use super::session::{CastOptions, CastStatus, CastingSession, StreamHandle};
use crate::config::Config;
use crate::server::{stream_url, HlsServer};
use crate::supervisor::{Encoder, LogSink, ProcessExit, ProcessHandle, Supervisor};
use crate::watch::{spawn_retention, SegmentWatcher};

/// Entry point for hosts: `start`, `stop`, `status`.
///
/// Cheap to clone; clones drive the same session.
#[derive(Clone)]
pub struct CastController {
    inner: Arc<Inner>,
}

struct Inner {
    config: Config,
    encoder: Arc<dyn Encoder>,
    session: Mutex<Option<CastingSession>>,
    status: watch::Sender<CastStatus>,
}

/// A launched encoder that has written its first segment.
struct Running {
    spec: EncoderSpec,
    process: ProcessHandle,
}

/// Flags a start whose future was dropped before `bring_up` finished.
///
/// Partially built resources are released by their own drops; this only
/// keeps the status from reporting `Starting` with nothing behind it.
struct PendingStart<'a> {
    status: &'a watch::Sender<CastStatus>,
    id: SessionId,
    armed: bool,
}

impl PendingStart<'_> {
    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for PendingStart<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let id = self.id;
        let cancelled = self.status.send_if_modified(|status| {
            if status.session_id == Some(id) && status.state == CastState::Starting {
                status.state = CastState::Failed;
                status.error = Some("start cancelled".to_string());
                true
            } else {
                false
            }
        });
        if cancelled {
            tracing::warn!(session_id = %id, "Cast start cancelled before going live");
        }
    }
}

impl CastController {
    /// Controller that launches encoders as child processes.
    pub fn new(config: Config) -> Self {
        let supervisor = Supervisor::new(config.session.launch_probe());
        Self::with_encoder(config, Arc::new(supervisor))
    }

    /// Controller driving a custom [`Encoder`].
    pub fn with_encoder(config: Config, encoder: Arc<dyn Encoder>) -> Self {
        let (status, _) = watch::channel(CastStatus::default());
        Self {
            inner: Arc::new(Inner {
                config,
                encoder,
                session: Mutex::new(None),
                status,
            }),
        }
    }

    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    /// Current status snapshot.
    pub fn status(&self) -> CastStatus {
        self.inner.status.borrow().clone()
    }

    /// Receiver of status snapshots, updated on every transition.
    pub fn subscribe(&self) -> watch::Receiver<CastStatus> {
        self.inner.status.subscribe()
    }

    /// Start casting `source`, replacing any current session.
    ///
    /// Returns once the first segment exists and the HTTP server is serving
    /// it, or with the error that stopped the start. Nothing from a failed
    /// start is left running.
    pub async fn start(
        &self,
        source: impl AsRef<Path>,
        options: CastOptions,
    ) -> Result<StreamHandle, CastError> {
        let source = source.as_ref().to_path_buf();
        let mut current = self.inner.session.lock().await;

        if let Some(previous) = current.take() {
            self.teardown(previous).await;
        }
        self.clear_failed();

        let id = SessionId::new();
        self.transition(CastState::Starting, |status| {
            *status = CastStatus {
                state: CastState::Starting,
                session_id: Some(id),
                source: Some(source.clone()),
                ..CastStatus::default()
            };
        });
        tracing::info!(session_id = %id, source = %source.display(), "Starting cast");

        let pending = PendingStart {
            status: &self.inner.status,
            id,
            armed: true,
        };
        let result = self.bring_up(id, &source, &options).await;
        pending.disarm();

        match result {
            Ok((mut session, spec)) => {
                let handle = StreamHandle::new(session.url.clone(), id, self.clone());
                let pid = session.process.as_ref().and_then(ProcessHandle::pid);
                let encoder = session.process.as_ref().map(ProcessHandle::backend);

                self.transition(CastState::Live, |status| {
                    status.state = CastState::Live;
                    status.url = Some(session.url.clone());
                    status.working_dir = session.working_dir().map(Path::to_path_buf);
                    status.encoder = encoder;
                    status.pid = pid;
                    status.started_at = Some(session.started_at);
                });
                tracing::info!(session_id = %id, url = %session.url, "Cast is live");

                // Watch for crashes only once Live, so an early death is not
                // overwritten by the Live transition
                if let Some(process) = session.process.as_ref() {
                    session.monitor = Some(self.spawn_crash_monitor(id, spec, process));
                }

                *current = Some(session);
                Ok(handle)
            }
            Err(e) => {
                tracing::error!(session_id = %id, "Cast failed to start: {}", e);
                self.transition(CastState::Failed, |status| {
                    status.state = CastState::Failed;
                    status.error = Some(e.to_string());
                });
                Err(e)
            }
        }
    }

    /// Stop the current session, if any. Always succeeds; returns once the
    /// encoder is reaped, the port released and the directory removed.
    pub async fn stop(&self) {
        let mut current = self.inner.session.lock().await;
        if let Some(session) = current.take() {
            self.teardown(session).await;
        }
        self.clear_failed();
    }

    /// Clear a `Failed` session. Does nothing in any other state.
    pub async fn reset(&self) -> bool {
        let mut current = self.inner.session.lock().await;
        if self.status().state != CastState::Failed {
            return false;
        }
        if let Some(session) = current.take() {
            self.teardown(session).await;
        }
        self.clear_failed();
        true
    }

    /// Stop only if `id` is still the current session.
    pub(crate) async fn stop_session(&self, id: SessionId) {
        let mut current = self.inner.session.lock().await;
        if current.as_ref().map(|s| s.id) == Some(id) {
            if let Some(session) = current.take() {
                self.teardown(session).await;
            }
        }
    }

    async fn teardown(&self, session: CastingSession) {
        let id = session.id;
        self.inner.status.send_if_modified(|status| {
            if status.state == CastState::Live {
                status.state = CastState::Stopping;
                true
            } else {
                false
            }
        });

        session
            .teardown(self.inner.config.session.grace_timeout())
            .await;

        self.inner.status.send_if_modified(|status| {
            if status.session_id == Some(id) {
                *status = CastStatus::default();
                true
            } else {
                false
            }
        });
    }

    fn clear_failed(&self) {
        self.inner.status.send_if_modified(|status| {
            if status.state == CastState::Failed {
                *status = CastStatus::default();
                true
            } else {
                false
            }
        });
    }

    fn transition(&self, next: CastState, update: impl FnOnce(&mut CastStatus)) {
        self.inner.status.send_modify(|status| {
            let from = status.state;
            if from != next && !from.can_transition_to(next) {
                tracing::warn!(%from, to = %next, "Unexpected cast state transition");
            }
            update(status);
        });
    }

    /// Build a live session or clean up everything partially built.
    async fn bring_up(
        &self,
        id: SessionId,
        source: &Path,
        options: &CastOptions,
    ) -> Result<(CastingSession, EncoderSpec), CastError> {
        let config = &self.inner.config;
        let label = format!("{}-{}", Utc::now().format("%Y%m%d%H%M%S"), id.short());
        let work_root = config.session.work_root.clone();
        let workspace =
            blocking(move || SessionWorkspace::create(work_root.as_deref(), &label)).await??;

        let running = match self.launch_encoder(id, source, options, &workspace).await {
            Ok(running) => running,
            Err(e) => {
                remove_workspace(id, workspace).await;
                return Err(e);
            }
        };

        let server = match self.bind_server(&workspace, &running.spec).await {
            Ok(server) => server,
            Err(e) => {
                running.process.terminate(config.session.grace_timeout()).await;
                remove_workspace(id, workspace).await;
                return Err(e.into());
            }
        };

        let url = stream_url(
            server.local_addr(),
            config.server.advertise_host.as_deref(),
            &running.spec.layout.manifest_name,
        );

        let cancel = CancellationToken::new();
        let retention = spawn_retention(
            workspace.path().to_path_buf(),
            running.spec.layout.clone(),
            running.spec.window_size,
            config.session.retention_interval(),
            cancel.clone(),
        );

        let session = CastingSession {
            id,
            source: source.to_path_buf(),
            subtitle: running.spec.subtitle.clone(),
            started_at: running.process.started_at(),
            url,
            workspace: Some(workspace),
            server: Some(server),
            process: Some(running.process),
            retention: Some((cancel, retention)),
            monitor: None,
        };

        Ok((session, running.spec))
    }

    /// Resolve, launch and wait for the first segment, degrading to the next
    /// ranked backend when an encoder fails to launch or dies during startup.
    async fn launch_encoder(
        &self,
        id: SessionId,
        source: &Path,
        options: &CastOptions,
        workspace: &SessionWorkspace,
    ) -> Result<Running, CastError> {
        let config = &self.inner.config;
        let grace = config.session.grace_timeout();
        let timeout = config.session.startup_timeout();
        let deadline = Instant::now() + timeout;
        let resolve_options = ResolveOptions::from(options);

        let mut excluded: Vec<EncoderBackend> = Vec::new();
        let mut last_failure: Option<String> = None;

        for attempt in 1..=config.session.encoder_attempts {
            let resolved = {
                let source = source.to_path_buf();
                let options = resolve_options.clone();
                let profile = config.hardware.clone();
                let settings = config.encoder.clone();
                let excluded = excluded.clone();
                let dir = workspace.path().to_path_buf();
                blocking(move || {
                    hlscast_av::resolve(&source, &options, &profile, &excluded, &settings, &dir)
                })
                .await?
            };
            let spec = match resolved {
                Ok(spec) => spec,
                Err(hlscast_av::Error::NoEncoderAvailable { .. }) if last_failure.is_some() => {
                    break;
                }
                Err(e) => return Err(e.into()),
            };

            let log = self.open_log(id).await;
            tracing::info!(
                session_id = %id,
                encoder = %spec.backend,
                attempt,
                "Launching encoder"
            );

            let process = match self.inner.encoder.launch(&spec, log.clone()).await {
                Ok(process) => process,
                Err(e) => {
                    tracing::warn!(session_id = %id, encoder = %spec.backend, "Encoder failed to launch: {}", e);
                    self.record_failure(&spec, "launch failed", None, &log).await;
                    last_failure = Some(format!("{}: {}", spec.backend, e));
                    excluded.push(spec.backend);
                    clear_attempt(workspace.path()).await?;
                    continue;
                }
            };

            let watcher = SegmentWatcher::new(
                workspace.path(),
                spec.layout.clone(),
                config.session.poll_interval(),
            );
            let remaining = deadline.saturating_duration_since(Instant::now());

            tokio::select! {
                ready = watcher.wait_for_first_segment(remaining) => match ready {
                    Ok(()) => return Ok(Running { spec, process }),
                    Err(timeout) => {
                        tracing::warn!(session_id = %id, encoder = %spec.backend, "{}", timeout);
                        process.terminate(grace).await;
                        self.record_failure(&spec, "startup timeout", process.exit_status(), &log)
                            .await;
                        return Err(CastError::StartupTimeout(timeout));
                    }
                },
                exit = process.wait() => {
                    let exit_text = exit.map(|e| e.to_string()).unwrap_or_else(|| "unknown exit".into());
                    tracing::warn!(
                        session_id = %id,
                        encoder = %spec.backend,
                        "Encoder exited before producing output ({})",
                        exit_text
                    );
                    self.record_failure(&spec, "exited during startup", exit, &log)
                        .await;
                    last_failure = Some(format!("{}: {}", spec.backend, exit_text));
                    excluded.push(spec.backend);
                    clear_attempt(workspace.path()).await?;
                }
            }

            if Instant::now() >= deadline {
                return Err(CastError::StartupTimeout(crate::watch::StartupTimeout {
                    dir: workspace.path().to_path_buf(),
                    timeout,
                }));
            }
        }

        Err(CastError::EncoderUnavailable(
            last_failure.unwrap_or_else(|| "no encoder attempts configured".to_string()),
        ))
    }

    /// Bind the configured port, trying the next ports on conflict.
    async fn bind_server(
        &self,
        workspace: &SessionWorkspace,
        spec: &EncoderSpec,
    ) -> Result<HlsServer, crate::server::BindError> {
        let server = &self.inner.config.server;
        let attempts = server.bind_attempts.max(1);
        let mut attempt = 0;

        loop {
            let port = if server.port == 0 {
                0
            } else {
                server.port.saturating_add(attempt as u16)
            };

            match HlsServer::bind(workspace.path(), spec.layout.clone(), &server.host, port).await {
                Ok(bound) => return Ok(bound),
                Err(e) if e.is_address_conflict() && attempt + 1 < attempts => {
                    tracing::warn!(port, "Port unavailable, trying next: {}", e);
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Flag the session `Failed` if its encoder exits without being asked to.
    fn spawn_crash_monitor(
        &self,
        id: SessionId,
        spec: EncoderSpec,
        process: &ProcessHandle,
    ) -> tokio::task::JoinHandle<()> {
        let inner: Weak<Inner> = Arc::downgrade(&self.inner);
        let mut exit_rx = process.exit_watcher();
        let log = process.log().clone();

        tokio::spawn(async move {
            let exit = match exit_rx.wait_for(Option::is_some).await {
                Ok(exit) => *exit,
                Err(_) => return,
            };
            let Some(exit) = exit else { return };
            if exit.requested {
                return;
            }
            let Some(inner) = inner.upgrade() else { return };

            let error = CastError::ProcessCrashed(exit);
            let flagged = inner.status.send_if_modified(|status| {
                if status.state == CastState::Live && status.session_id == Some(id) {
                    status.state = CastState::Failed;
                    status.url = None;
                    status.pid = None;
                    status.error = Some(error.to_string());
                    true
                } else {
                    false
                }
            });

            if flagged {
                tracing::error!(session_id = %id, encoder = %spec.backend, "{}", error);
                write_bundle(&inner.config, &spec, "crashed while live", Some(exit), &log).await;
            }
        })
    }

    async fn open_log(&self, id: SessionId) -> LogSink {
        let session = &self.inner.config.session;
        let (lines, max_bytes) = (session.log_lines, session.log_max_bytes);
        if let Some(dir) = &session.log_dir {
            let path = dir.join(format!("encoder-{}.log", id.short()));
            let target = path.clone();
            match blocking(move || LogSink::with_file(lines, &target, max_bytes)).await {
                Ok(Ok(sink)) => return sink,
                Ok(Err(e)) => {
                    tracing::warn!(path = %path.display(), "Cannot open encoder log file: {}", e);
                }
                Err(e) => {
                    tracing::warn!(path = %path.display(), "Cannot open encoder log file: {}", e);
                }
            }
        }
        LogSink::new(lines)
    }

    async fn record_failure(
        &self,
        spec: &EncoderSpec,
        reason: &str,
        exit: Option<ProcessExit>,
        log: &LogSink,
    ) {
        write_bundle(&self.inner.config, spec, reason, exit, log).await;
    }
}

async fn write_bundle(
    config: &Config,
    spec: &EncoderSpec,
    reason: &str,
    exit: Option<ProcessExit>,
    log: &LogSink,
) {
    let Some(root) = &config.session.failure_log_dir else {
        return;
    };

    let report = FailureReport {
        reason: reason.to_string(),
        source: spec.source.clone(),
        subtitle: spec.subtitle.clone(),
        encoder: Some(spec.backend),
        exit: exit.map(|e| e.to_string()),
        command: Some(spec.command_line()),
        settings: serde_json::to_value(&config.encoder).unwrap_or_default(),
        timestamp: Utc::now(),
    };

    let root = root.clone();
    let lines = log.lines();
    match blocking(move || write_failure_bundle(&root, &report, &lines)).await {
        Ok(Ok(dir)) => tracing::info!(path = %dir.display(), "Wrote failure bundle"),
        Ok(Err(e)) => tracing::warn!("Failed to write failure bundle: {}", e),
        Err(e) => tracing::warn!("Failed to write failure bundle: {}", e),
    }
}

/// Run filesystem work on the blocking pool.
async fn blocking<T, F>(f: F) -> Result<T, CastError>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| CastError::Workspace(format!("blocking task failed: {e}")))
}

async fn remove_workspace(id: SessionId, workspace: SessionWorkspace) {
    let path: PathBuf = workspace.path().to_path_buf();
    match blocking(move || workspace.remove()).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => tracing::warn!(session_id = %id, "Failed to remove {}: {}", path.display(), e),
        Err(e) => tracing::warn!(session_id = %id, "Failed to remove {}: {}", path.display(), e),
    }
}

/// Empty the workspace between encoder attempts. Leftover segments would let
/// the next attempt look ready before it wrote anything.
async fn clear_attempt(dir: &Path) -> Result<(), CastError> {
    clear_dir(dir).await.map_err(|e| {
        CastError::Workspace(format!("cannot clear {} between attempts: {}", dir.display(), e))
    })
}

/// Remove everything inside `dir`, keeping `dir` itself. Every entry is
/// attempted; the first failure is returned.
async fn clear_dir(dir: &Path) -> std::io::Result<()> {
    let mut entries = tokio::fs::read_dir(dir).await?;
    let mut first_error = None;

    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        let removed = match entry.file_type().await {
            Ok(kind) if kind.is_dir() => tokio::fs::remove_dir_all(&path).await,
            Ok(_) => tokio::fs::remove_file(&path).await,
            Err(e) => Err(e),
        };
        match removed {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                tracing::warn!(path = %path.display(), "Failed to remove attempt output: {}", e);
                first_error.get_or_insert(e);
            }
        }
    }

    match first_error {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

impl std::fmt::Debug for CastController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CastController")
            .field("status", &self.status())
            .finish()
    }
}

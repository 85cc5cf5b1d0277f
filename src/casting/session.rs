//! Session values: what the host passes in, what it gets back, and the
//! controller's private record of the live session.

use chrono::{DateTime, Utc};
use hlscast_av::{EncoderBackend, ResolveOptions, SessionWorkspace};
use hlscast_common::{CastState, SessionId};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::controller::CastController;
use crate::server::HlsServer;
use crate::supervisor::ProcessHandle;

/// Per-cast options from the host.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CastOptions {
    /// Already-materialized subtitle file to burn in.
    pub subtitle_path: Option<PathBuf>,
    /// Resolution ceiling.
    pub max_height: Option<u32>,
    /// Bitrate ceiling (e.g. `4000k`).
    pub max_bitrate: Option<String>,
}

impl CastOptions {
    pub fn with_subtitles(mut self, path: impl Into<PathBuf>) -> Self {
        self.subtitle_path = Some(path.into());
        self
    }
}

impl From<&CastOptions> for ResolveOptions {
    fn from(options: &CastOptions) -> Self {
        ResolveOptions {
            subtitle_path: options.subtitle_path.clone(),
            max_height: options.max_height,
            max_bitrate: options.max_bitrate.clone(),
        }
    }
}

/// Point-in-time view of the controller.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CastStatus {
    pub state: CastState,
    pub session_id: Option<SessionId>,
    /// Manifest URL; set only while live.
    pub url: Option<String>,
    /// Human-readable description of the last failure.
    pub error: Option<String>,
    pub source: Option<PathBuf>,
    /// Session directory the stream is served from.
    pub working_dir: Option<PathBuf>,
    pub encoder: Option<EncoderBackend>,
    pub pid: Option<u32>,
    pub started_at: Option<DateTime<Utc>>,
}

impl CastStatus {
    pub fn is_live(&self) -> bool {
        self.state == CastState::Live
    }
}

/// What `start` hands back: where to point clients, and a way to stop.
///
/// Only stops the session it was issued for; once that session has ended
/// the handle is inert.
#[derive(Clone)]
pub struct StreamHandle {
    url: String,
    session_id: SessionId,
    controller: CastController,
}

impl StreamHandle {
    pub(crate) fn new(url: String, session_id: SessionId, controller: CastController) -> Self {
        Self {
            url,
            session_id,
            controller,
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn session_id(&self) -> SessionId {
        self.session_id
    }

    /// Whether this handle's session is still the controller's session.
    pub fn is_current(&self) -> bool {
        self.controller.status().session_id == Some(self.session_id)
    }

    /// Stop this session. No-op if it already ended or was superseded.
    pub async fn stop(&self) {
        self.controller.stop_session(self.session_id).await;
    }
}

impl std::fmt::Debug for StreamHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamHandle")
            .field("url", &self.url)
            .field("session_id", &self.session_id)
            .finish()
    }
}

/// Everything one session owns. Dropping it without [`teardown`] still
/// releases the port and directory, but without waiting for the encoder.
///
/// [`teardown`]: CastingSession::teardown
pub(crate) struct CastingSession {
    pub id: SessionId,
    pub source: PathBuf,
    pub subtitle: Option<PathBuf>,
    pub started_at: DateTime<Utc>,
    pub url: String,
    pub workspace: Option<SessionWorkspace>,
    pub server: Option<HlsServer>,
    pub process: Option<ProcessHandle>,
    pub retention: Option<(CancellationToken, JoinHandle<()>)>,
    pub monitor: Option<JoinHandle<()>>,
}

impl CastingSession {
    pub fn working_dir(&self) -> Option<&Path> {
        self.workspace.as_ref().map(SessionWorkspace::path)
    }

    /// Release everything in order: HTTP server, encoder, retention loop,
    /// working directory. Never fails; problems are logged.
    pub async fn teardown(mut self, grace: Duration) {
        tracing::debug!(
            session_id = %self.id,
            source = %self.source.display(),
            subtitle = ?self.subtitle,
            "Tearing down session"
        );

        if let Some(server) = self.server.take() {
            server.shutdown().await;
        }

        if let Some(process) = self.process.take() {
            if let Some(exit) = process.terminate(grace).await {
                tracing::debug!(session_id = %self.id, %exit, "Encoder reaped");
            }
        }

        if let Some((cancel, task)) = self.retention.take() {
            cancel.cancel();
            let _ = task.await;
        }

        if let Some(monitor) = self.monitor.take() {
            monitor.abort();
        }

        if let Some(workspace) = self.workspace.take() {
            let path = workspace.path().to_path_buf();
            match tokio::task::spawn_blocking(move || workspace.remove()).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    tracing::warn!(session_id = %self.id, "Failed to remove {}: {}", path.display(), e);
                }
                Err(e) => {
                    tracing::warn!(session_id = %self.id, "Failed to remove {}: {}", path.display(), e);
                }
            }
        }

        let lived = Utc::now() - self.started_at;
        tracing::info!(
            session_id = %self.id,
            duration_secs = lived.num_seconds(),
            "Session torn down"
        );
    }
}

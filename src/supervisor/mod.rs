//! Encoder process supervision.
//!
//! [`Supervisor`] launches the resolved encoder command, pipes its output into
//! a [`LogSink`], and hands back a [`ProcessHandle`]. One background task per
//! process owns the `Child`: it reaps the process, escalates termination from
//! SIGTERM to SIGKILL, and publishes the exit on a watch channel so the
//! session controller can tell a requested stop from a crash.

mod log;

pub use log::LogSink;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use hlscast_av::{EncoderBackend, EncoderSpec};
use std::fmt;
use std::process::{ExitStatus, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::{mpsc, watch};

/// Errors starting an encoder process.
#[derive(Debug, thiserror::Error)]
pub enum LaunchError {
    #[error("encoder program not found: {0}")]
    NotFound(String),

    #[error("failed to spawn {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{backend} encoder exited during launch ({exit})")]
    EarlyExit {
        backend: EncoderBackend,
        exit: ProcessExit,
    },
}

/// How an encoder process ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcessExit {
    /// Exit code, if the process exited normally.
    pub code: Option<i32>,
    /// Terminating signal, if any.
    pub signal: Option<i32>,
    /// Whether a stop was requested before the process ended.
    pub requested: bool,
}

impl ProcessExit {
    fn from_status(status: &ExitStatus, requested: bool) -> Self {
        #[cfg(unix)]
        let signal = {
            use std::os::unix::process::ExitStatusExt;
            status.signal()
        };
        #[cfg(not(unix))]
        let signal = None;

        Self {
            code: status.code(),
            signal,
            requested,
        }
    }

    /// Whether the process exited with status 0.
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

impl fmt::Display for ProcessExit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.code, self.signal) {
            (Some(code), _) => write!(f, "exit code {code}"),
            (None, Some(signal)) => write!(f, "killed by signal {signal}"),
            (None, None) => f.write_str("unknown exit status"),
        }
    }
}

#[derive(Debug)]
enum Control {
    Terminate(Duration),
}

/// Handle to a running (or finished) encoder process.
///
/// Clones share the same process. The process is killed once every handle
/// is dropped.
#[derive(Debug, Clone)]
pub struct ProcessHandle {
    pid: Option<u32>,
    backend: EncoderBackend,
    started_at: DateTime<Utc>,
    control: mpsc::Sender<Control>,
    exit: watch::Receiver<Option<ProcessExit>>,
    stop_requested: Arc<AtomicBool>,
    log: LogSink,
}

impl ProcessHandle {
    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    pub fn backend(&self) -> EncoderBackend {
        self.backend
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// Whether the process has not exited yet.
    pub fn is_alive(&self) -> bool {
        self.exit.borrow().is_none()
    }

    /// Exit information once the process has been reaped.
    pub fn exit_status(&self) -> Option<ProcessExit> {
        *self.exit.borrow()
    }

    /// Receiver that flips to `Some` when the process is reaped.
    pub fn exit_watcher(&self) -> watch::Receiver<Option<ProcessExit>> {
        self.exit.clone()
    }

    /// Captured output.
    pub fn log(&self) -> &LogSink {
        &self.log
    }

    /// Wait until the process is reaped.
    pub async fn wait(&self) -> Option<ProcessExit> {
        let mut exit = self.exit.clone();
        let result = exit.wait_for(Option::is_some).await.ok().and_then(|e| *e);
        result
    }

    /// Ask the process to stop: SIGTERM, then SIGKILL after `grace`.
    /// Returns once the process has been reaped. Safe to call repeatedly.
    pub async fn terminate(&self, grace: Duration) -> Option<ProcessExit> {
        self.stop_requested.store(true, Ordering::SeqCst);
        if let Some(exit) = self.exit_status() {
            return Some(exit);
        }
        // A full queue means a terminate is already in flight
        let _ = self.control.try_send(Control::Terminate(grace));
        self.wait().await
    }
}

/// The narrow interface the session controller drives encoders through.
#[async_trait]
pub trait Encoder: Send + Sync {
    /// Start the process described by `spec`, capturing output into `log`.
    async fn launch(&self, spec: &EncoderSpec, log: LogSink) -> Result<ProcessHandle, LaunchError>;

    fn is_alive(&self, handle: &ProcessHandle) -> bool {
        handle.is_alive()
    }

    async fn terminate(&self, handle: &ProcessHandle, grace: Duration) -> Option<ProcessExit> {
        handle.terminate(grace).await
    }

    fn capture_log(&self, handle: &ProcessHandle) -> LogSink {
        handle.log().clone()
    }
}

/// Launches encoder processes with `tokio::process`.
#[derive(Debug, Clone)]
pub struct Supervisor {
    launch_probe: Duration,
}

impl Supervisor {
    /// `launch_probe` is how long a new process must stay up before
    /// [`Encoder::launch`] reports success.
    pub fn new(launch_probe: Duration) -> Self {
        Self { launch_probe }
    }
}

impl Default for Supervisor {
    fn default() -> Self {
        Self::new(Duration::from_millis(500))
    }
}

#[async_trait]
impl Encoder for Supervisor {
    async fn launch(&self, spec: &EncoderSpec, log: LogSink) -> Result<ProcessHandle, LaunchError> {
        let program = hlscast_av::tools::resolve_program(&spec.program)
            .map_err(|_| LaunchError::NotFound(spec.program.display().to_string()))?;

        log.append(format!("$ {}", spec.command_line())).await;

        let mut cmd = Command::new(&program);
        cmd.args(&spec.args)
            .current_dir(&spec.working_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = cmd.spawn().map_err(|e| LaunchError::Spawn {
            program: program.display().to_string(),
            source: e,
        })?;
        let pid = child.id();

        tracing::info!(
            pid = ?pid,
            encoder = %spec.backend,
            dir = %spec.working_dir.display(),
            "Launched encoder"
        );

        if let Some(stdout) = child.stdout.take() {
            tokio::spawn(capture_output(stdout, log.clone()));
        }
        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(capture_output(stderr, log.clone()));
        }

        let (exit_tx, exit_rx) = watch::channel(None);
        let (control_tx, control_rx) = mpsc::channel(1);
        let stop_requested = Arc::new(AtomicBool::new(false));

        tokio::spawn(supervise(
            child,
            pid,
            control_rx,
            exit_tx,
            stop_requested.clone(),
        ));

        let handle = ProcessHandle {
            pid,
            backend: spec.backend,
            started_at: Utc::now(),
            control: control_tx,
            exit: exit_rx,
            stop_requested,
            log,
        };

        // An encoder that rejects its arguments or device dies right away
        if let Ok(Some(exit)) = tokio::time::timeout(self.launch_probe, handle.wait()).await {
            tracing::warn!(encoder = %spec.backend, %exit, "Encoder exited during launch");
            return Err(LaunchError::EarlyExit {
                backend: spec.backend,
                exit,
            });
        }

        Ok(handle)
    }
}

async fn capture_output<R>(reader: R, log: LogSink)
where
    R: AsyncRead + Unpin,
{
    let mut lines = BufReader::new(reader).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        tracing::trace!(target: "hlscast::encoder", "{}", line);
        log.append(line).await;
    }
}

async fn supervise(
    mut child: Child,
    pid: Option<u32>,
    mut control: mpsc::Receiver<Control>,
    exit_tx: watch::Sender<Option<ProcessExit>>,
    stop_requested: Arc<AtomicBool>,
) {
    let status = tokio::select! {
        status = child.wait() => status,
        msg = control.recv() => {
            // A closed channel means every handle is gone
            let grace = match msg {
                Some(Control::Terminate(grace)) => grace,
                None => Duration::ZERO,
            };
            stop_requested.store(true, Ordering::SeqCst);
            shutdown(&mut child, pid, grace).await
        }
    };

    let exit = match status {
        Ok(status) => ProcessExit::from_status(&status, stop_requested.load(Ordering::SeqCst)),
        Err(e) => {
            tracing::error!(pid = ?pid, "Failed to reap encoder: {}", e);
            ProcessExit {
                code: None,
                signal: None,
                requested: stop_requested.load(Ordering::SeqCst),
            }
        }
    };

    if exit.requested {
        tracing::debug!(pid = ?pid, %exit, "Encoder stopped");
    } else {
        tracing::warn!(pid = ?pid, %exit, "Encoder exited unexpectedly");
    }

    let _ = exit_tx.send(Some(exit));
}

async fn shutdown(
    child: &mut Child,
    pid: Option<u32>,
    grace: Duration,
) -> std::io::Result<ExitStatus> {
    if !grace.is_zero() && pid.map(send_terminate).unwrap_or(false) {
        match tokio::time::timeout(grace, child.wait()).await {
            Ok(status) => return status,
            Err(_) => {
                tracing::warn!(pid = ?pid, "Encoder ignored SIGTERM for {:?}, killing", grace);
            }
        }
    }

    child.kill().await?;
    child.wait().await
}

#[cfg(unix)]
fn send_terminate(pid: u32) -> bool {
    use nix::sys::signal::{kill, Signal};
    use nix::unistd::Pid;

    let Ok(raw) = i32::try_from(pid) else {
        return false;
    };
    kill(Pid::from_raw(raw), Signal::SIGTERM).is_ok()
}

#[cfg(not(unix))]
fn send_terminate(_pid: u32) -> bool {
    false
}

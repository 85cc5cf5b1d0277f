//! Errors surfaced by the casting session controller.

use crate::server::BindError;
use crate::supervisor::{LaunchError, ProcessExit};
use crate::watch::StartupTimeout;

/// Why a cast could not start, or why a live cast ended.
#[derive(Debug, thiserror::Error)]
pub enum CastError {
    /// Bad source or subtitle path. Retry with a valid one.
    #[error("invalid source: {0}")]
    InvalidSource(#[source] hlscast_av::Error),

    /// The encoder could not be started.
    #[error(transparent)]
    Launch(#[from] LaunchError),

    /// Every ranked encoder backend failed.
    #[error("no usable encoder: {0}")]
    EncoderUnavailable(String),

    /// The encoder started but produced no output in time.
    #[error(transparent)]
    StartupTimeout(#[from] StartupTimeout),

    /// The encoder died while the stream was live.
    #[error("encoder process crashed ({0})")]
    ProcessCrashed(ProcessExit),

    /// The HTTP server could not bind.
    #[error(transparent)]
    Bind(#[from] BindError),

    /// Creating or removing the session directory failed.
    #[error("session workspace error: {0}")]
    Workspace(String),
}

impl From<hlscast_av::Error> for CastError {
    fn from(e: hlscast_av::Error) -> Self {
        use hlscast_av::Error;

        match e {
            Error::InvalidSource { .. } | Error::InvalidSubtitle { .. } | Error::InvalidInput(_) => {
                CastError::InvalidSource(e)
            }
            Error::NoEncoderAvailable { .. } | Error::ToolNotFound { .. } | Error::UnknownBackend(_) => {
                CastError::EncoderUnavailable(e.to_string())
            }
            Error::Workspace(_) | Error::Io(_) => CastError::Workspace(e.to_string()),
        }
    }
}

//! Core types shared between the controller and its hosts.

use serde::{Deserialize, Serialize};
use std::fmt;

/// State of the casting session state machine.
///
/// `Idle -> Starting -> Live -> Stopping -> Idle`, with `Failed` reachable
/// from `Starting` or `Live`. The only way out of `Failed` is back to `Idle`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CastState {
    #[default]
    Idle,
    Starting,
    Live,
    Stopping,
    Failed,
}

impl CastState {
    /// Whether moving from `self` to `next` is a legal transition.
    pub fn can_transition_to(self, next: CastState) -> bool {
        use CastState::*;
        matches!(
            (self, next),
            (Idle, Starting)
                | (Starting, Live)
                | (Starting, Failed)
                | (Live, Stopping)
                | (Live, Failed)
                | (Stopping, Idle)
                | (Failed, Idle)
                | (Idle, Idle)
        )
    }

    /// Whether a session (and its resources) may exist in this state.
    pub fn holds_resources(self) -> bool {
        !matches!(self, CastState::Idle)
    }
}

impl fmt::Display for CastState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CastState::Idle => "idle",
            CastState::Starting => "starting",
            CastState::Live => "live",
            CastState::Stopping => "stopping",
            CastState::Failed => "failed",
        };
        f.write_str(s)
    }
}

//! Casting session control.
//!
//! [`CastController`] is what a host talks to. It coordinates the encoder
//! supervisor, the segment watcher and the HLS server for one session at a
//! time:
//!
//! ```text
//! start(): teardown previous -> resolve -> launch -> first segment -> bind -> Live
//! stop():  HTTP server -> encoder (SIGTERM, then SIGKILL) -> retention loop -> directory
//! ```

mod controller;
mod error;
mod failure;
mod session;

pub use controller::CastController;
pub use error::CastError;
pub use failure::{write_failure_bundle, FailureReport};
pub use session::{CastOptions, CastStatus, StreamHandle};

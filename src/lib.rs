//! hlscast - cast a local media file to network players over HLS.
//!
//! A host hands [`CastController::start`] a source file; the controller
//! launches an encoder writing a live HLS window into a fresh directory,
//! serves that directory over HTTP once the first segment lands, and returns
//! the manifest URL. [`CastController::stop`] undoes all of it.
//!
//! This library crate exposes the core functionality for integration testing.

pub mod casting;
pub mod config;
pub mod server;
pub mod supervisor;
pub mod watch;

pub use casting::{CastController, CastError, CastOptions, CastStatus, StreamHandle};
pub use hlscast_av::{EncoderBackend, HardwareProfile};
pub use hlscast_common::{CastState, SessionId};

//! # hlscast-av
//!
//! Encoder-side building blocks for hlscast.
//!
//! This crate provides:
//! - A ranked [`HardwareProfile`] of encoder backends, supplied by the host
//! - [`resolve`], a pure function turning a source file, options, and a
//!   profile into a ready-to-run [`EncoderSpec`]
//! - [`SessionWorkspace`], a uniquely named scratch directory per session
//! - External tool detection
//!
//! ## Features
//!
//! - `tracing` (default) - Enable tracing support
//!
//! ## Example
//!
//! ```no_run
//! use hlscast_av::{resolve, EncoderSettings, HardwareProfile, ResolveOptions};
//!
//! let spec = resolve(
//!     "/videos/sample.mp4",
//!     &ResolveOptions::default(),
//!     &HardwareProfile::software_only(),
//!     &[],
//!     &EncoderSettings::default(),
//!     "/tmp/hlscast-session",
//! )?;
//! println!("{} {}", spec.program.display(), spec.args.join(" "));
//! # Ok::<(), hlscast_av::Error>(())
//! ```

mod error;
pub mod hwaccel;
pub mod resolve;
pub mod tools;
pub mod workspace;

// Re-exports
pub use error::{Error, Result};
pub use hwaccel::{EncoderBackend, HardwareProfile};
pub use resolve::{resolve, EncoderSettings, EncoderSpec, ResolveOptions};
pub use tools::{check_tool, check_tools, compiled_backends, require_tool, ToolInfo};
pub use workspace::SessionWorkspace;

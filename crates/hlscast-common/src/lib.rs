//! hlscast-common: Shared types and helpers.
//!
//! - **Typed IDs**: [`SessionId`] for casting sessions
//! - **Core Types**: [`CastState`], the session state machine's states
//! - **Segment Layout**: naming rules for the manifest and its segments
//! - **Path Utilities**: content types for HLS artifacts
//!
//! # Examples
//!
//! ```
//! use hlscast_common::{SegmentLayout, SessionId};
//! use hlscast_common::paths::content_type_for;
//! use std::path::Path;
//!
//! let id = SessionId::new();
//! assert!(!id.short().is_empty());
//!
//! let layout = SegmentLayout::default();
//! assert_eq!(layout.segment_name(7), "segment007.ts");
//! assert_eq!(content_type_for(Path::new("stream.m3u8")), Some("application/vnd.apple.mpegurl"));
//! ```

pub mod ids;
pub mod layout;
pub mod paths;
pub mod types;

pub use ids::*;
pub use layout::SegmentLayout;
pub use types::*;

//! Mseforged-Common: Shared types and IDs.
//!
//! This crate provides the small vocabulary shared by the box parser and the
//! buffering state machine:
//!
//! - **Typed IDs**: a UUID wrapper identifying a source buffer
//! - **Core Types**: ready state, append mode, end-of-stream error and track kind
//!
//! # Examples
//!
//! ```
//! use mseforged_common::{AppendMode, ReadyState, SourceBufferId, TrackKind};
//!
//! let id = SourceBufferId::new();
//! assert_ne!(id, SourceBufferId::new());
//!
//! assert_eq!(ReadyState::default(), ReadyState::Closed);
//! assert_eq!(AppendMode::Sequence.to_string(), "sequence");
//! assert_eq!(TrackKind::from_handler(*b"soun"), Some(TrackKind::Audio));
//! ```

pub mod ids;
pub mod types;

pub use ids::*;
pub use types::*;

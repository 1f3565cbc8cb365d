//! Mseforged - Media source buffering for fragmented MP4
//!
//! This library crate exposes the media source and source buffer controllers
//! that sit on top of the `mseforged-isobmff` segment parser.

pub mod config;
pub mod demux;
pub mod element;
pub mod error;
pub mod media_source;
pub mod mime;
pub mod source_buffer;
pub mod tasks;

pub use demux::{AcceptedSegment, BoxScanDemuxer, DemuxOutcome, Demuxer, DemuxerFactory};
pub use element::{ElementFailure, ElementReadyState, HeadlessElement, PlaybackElement};
pub use error::{Error, Result};
pub use media_source::MediaSource;
pub use mime::ContentType;
pub use source_buffer::{AppendState, SourceBuffer};
pub use tasks::{Event, EventKind, TaskSource};

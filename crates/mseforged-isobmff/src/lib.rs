//! Mseforged-Isobmff: ISOBMFF box reading and fMP4 segment parsing
//!
//! This crate provides the parsing half of mseforged. It reads the front of
//! an incrementally appended byte stream and decides what it holds.
//!
//! # Modules
//!
//! - `mp4` - Box headers, a bounded byte cursor and fixed-field box decoders
//! - `segment` - Init/media segment classification, init segment extraction
//!   and media segment boundary scanning
//! - `fmp4` - Fragmented MP4 writers (init segment, styp/moof/mdat)
//!
//! # Incomplete vs invalid
//!
//! Every fallible call returns [`Error::Incomplete`] when the bytes seen so
//! far are a valid prefix of what is expected. Callers wait for more data in
//! that case. Every other error is permanent for the bytes at hand.
//!
//! ```
//! use mseforged_isobmff::fmp4::{InitSegmentBuilder, TrackSpec};
//! use mseforged_isobmff::segment::{contains_full_init_segment, parse_init_segment};
//! use std::time::Duration;
//!
//! let data = InitSegmentBuilder::new()
//!     .timescale(1000)
//!     .duration(5000)
//!     .track(TrackSpec::video(1).duration(5000))
//!     .build();
//!
//! assert!(!contains_full_init_segment(&data[..data.len() - 1]));
//! assert!(contains_full_init_segment(&data));
//!
//! let init = parse_init_segment(&data).unwrap();
//! assert_eq!(init.duration(), Some(Duration::from_millis(5000)));
//! assert_eq!(init.tracks().len(), 1);
//! ```

pub mod error;
pub mod fmp4;
pub mod mp4;
pub mod segment;

pub use error::{Error, Result};
pub use fmp4::{InitSegmentBuilder, MediaSegmentBuilder, TrackSpec};
pub use mp4::AtomType;
pub use segment::{
    InitializationSegment, IsoBmffSegmentParser, SegmentParser, SegmentStart, Track,
};

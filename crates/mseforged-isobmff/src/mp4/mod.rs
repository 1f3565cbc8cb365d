//! ISOBMFF box reading.

pub mod atoms;
pub mod boxes;
pub mod reader;

pub use atoms::{
    peek_box, AtomType, BoxHeader, FullBoxHeader, Header, BOX_HEADER_SIZE, FULL_BOX_HEADER_SIZE,
};
pub use boxes::{
    media_time_to_duration, FileTypeBox, HandlerBox, MediaHeaderBox, MovieHeaderBox,
    TrackHeaderBox, UNKNOWN_DURATION,
};
pub use reader::{BoxCursor, BoxRef, Children};

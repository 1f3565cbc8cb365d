//! Segment classification and extraction.
//!
//! Answers questions about the front of an append buffer: does it begin an
//! initialization segment or a media segment, and is a complete
//! initialization segment already present. None of these consume input.

pub mod init;
pub mod media;

pub use init::{
    parse_init_segment, parse_init_segment_with, ExtractOptions, InitializationSegment, Track,
};
pub use media::{fragment_timings, scan_media_segment, FragmentTiming};

use crate::mp4::{peek_box, AtomType, BoxCursor, BoxHeader, BOX_HEADER_SIZE};
use crate::{Error, Result};

/// What the front of a buffer begins with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SegmentStart {
    /// Fewer than a box header's worth of bytes.
    NeedMoreData,
    /// `ftyp`.
    InitSegment,
    /// `styp` or `moof`.
    MediaSegment,
    /// Any other box, or a header that cannot be valid.
    Unrecognized(AtomType),
}

/// Classify the box at offset 0.
pub fn classify(input: &[u8]) -> SegmentStart {
    match peek_box::<BoxHeader>(input, 0) {
        Some(header) => match header.atom_type {
            AtomType::FTYP => SegmentStart::InitSegment,
            AtomType::STYP | AtomType::MOOF => SegmentStart::MediaSegment,
            other => SegmentStart::Unrecognized(other),
        },
        None if input.len() < BOX_HEADER_SIZE => SegmentStart::NeedMoreData,
        None => SegmentStart::Unrecognized(AtomType([input[4], input[5], input[6], input[7]])),
    }
}

/// True iff the box at offset 0 is `ftyp`.
pub fn starts_with_init_segment(input: &[u8]) -> bool {
    classify(input) == SegmentStart::InitSegment
}

/// True iff the box at offset 0 is `styp` or `moof`.
pub fn starts_with_media_segment(input: &[u8]) -> bool {
    classify(input) == SegmentStart::MediaSegment
}

/// Locate the end of the initialization segment at the front of `input`.
///
/// `ftyp`, then any number of `pdin`/`free`/`sidx`, then a complete `moov`.
/// Returns [`Error::Incomplete`] while the bytes seen so far are a valid
/// prefix, and [`Error::UnexpectedTopLevel`] once some other box shows up.
pub fn scan_init_segment(input: &[u8]) -> Result<usize> {
    let mut cursor = BoxCursor::new(input);

    let ftyp = cursor.peek_header()?;
    if ftyp.atom_type != AtomType::FTYP {
        return Err(Error::UnexpectedTopLevel(ftyp.atom_type));
    }
    cursor.read_box()?;

    loop {
        let header = cursor.peek_header()?;
        match header.atom_type {
            AtomType::PDIN | AtomType::FREE | AtomType::SIDX => {
                cursor.read_box()?;
            }
            AtomType::MOOV => {
                cursor.read_box()?;
                return Ok(cursor.position());
            }
            other => return Err(Error::UnexpectedTopLevel(other)),
        }
    }
}

/// True iff a complete initialization segment is present. Callers that get
/// `false` use [`scan_init_segment`] to tell "wait" from "never".
pub fn contains_full_init_segment(input: &[u8]) -> bool {
    scan_init_segment(input).is_ok()
}

/// Byte length of the complete initialization segment at the front.
pub fn init_segment_size(input: &[u8]) -> Option<usize> {
    scan_init_segment(input).ok()
}

/// Container-format seam used by the append state machine.
pub trait SegmentParser: Send {
    fn starts_with_init_segment(&self, input: &[u8]) -> bool;

    fn starts_with_media_segment(&self, input: &[u8]) -> bool;

    /// See [`scan_init_segment`].
    fn scan_init_segment(&self, input: &[u8]) -> Result<usize>;

    fn contains_full_init_segment(&self, input: &[u8]) -> bool {
        self.scan_init_segment(input).is_ok()
    }

    fn parse_init_segment(&self, input: &[u8]) -> Result<InitializationSegment>;
}

/// [`SegmentParser`] for ISOBMFF (fragmented MP4).
#[derive(Debug, Clone, Copy, Default)]
pub struct IsoBmffSegmentParser {
    options: ExtractOptions,
}

impl IsoBmffSegmentParser {
    pub fn new(options: ExtractOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> ExtractOptions {
        self.options
    }
}

impl SegmentParser for IsoBmffSegmentParser {
    fn starts_with_init_segment(&self, input: &[u8]) -> bool {
        starts_with_init_segment(input)
    }

    fn starts_with_media_segment(&self, input: &[u8]) -> bool {
        starts_with_media_segment(input)
    }

    fn scan_init_segment(&self, input: &[u8]) -> Result<usize> {
        scan_init_segment(input)
    }

    fn parse_init_segment(&self, input: &[u8]) -> Result<InitializationSegment> {
        parse_init_segment_with(input, self.options)
    }
}

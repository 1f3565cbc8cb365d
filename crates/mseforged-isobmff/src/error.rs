//! Error types for mseforged-isobmff.

use crate::mp4::AtomType;
use thiserror::Error;

/// Result type for mseforged-isobmff operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for box reading and segment extraction.
///
/// `Incomplete` is the only recoverable variant: the bytes seen so far are a
/// valid prefix and the caller should retry once more data has arrived. Every
/// other variant means the available bytes can never form a valid segment.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    /// Not enough bytes are available yet.
    #[error("Incomplete data: need {needed} bytes, have {available}")]
    Incomplete { needed: usize, available: usize },

    /// Box header declares a size that cannot hold the header itself.
    #[error("Invalid size {size} for box {atom_type}")]
    InvalidSize { atom_type: AtomType, size: u32 },

    /// Box content runs past the declared size of its enclosing box.
    #[error("Box {atom_type} is truncated")]
    Truncated { atom_type: AtomType },

    /// Top-level box not allowed at this point of the stream.
    #[error("Unexpected top-level box {0}")]
    UnexpectedTopLevel(AtomType),

    /// Child box not allowed inside its parent.
    #[error("Unexpected box {found} in {parent}")]
    UnexpectedBox { parent: AtomType, found: AtomType },

    /// Child box that may appear only once appeared again.
    #[error("Duplicate box {found} in {parent}")]
    DuplicateBox { parent: AtomType, found: AtomType },

    /// Child box appeared before a sibling it must follow.
    #[error("Box {found} out of order in {parent}")]
    OutOfOrder { parent: AtomType, found: AtomType },

    /// Required child box is missing.
    #[error("Missing required box {child} in {parent}")]
    MissingBox { parent: AtomType, child: AtomType },

    /// `minf` has no vmhd/smhd/hmhd/nmhd.
    #[error("Missing media header box in minf")]
    MissingMediaHeader,

    /// Full box version outside 0 and 1.
    #[error("Unsupported {atom_type} version {version}")]
    UnsupportedVersion { atom_type: AtomType, version: u8 },

    /// Handler type other than vide, soun or hint.
    #[error("Unknown handler type {0}")]
    UnknownHandler(AtomType),

    /// Sample table that should be empty in an initialization segment.
    #[error("Sample table box {atom_type} has {entry_count} entries, expected none")]
    NonEmptySampleTable { atom_type: AtomType, entry_count: u32 },

    /// Timescale field of zero.
    #[error("Zero timescale in {0}")]
    ZeroTimescale(AtomType),
}

impl Error {
    /// Create a duplicate box error.
    pub fn duplicate(parent: AtomType, found: AtomType) -> Self {
        Self::DuplicateBox { parent, found }
    }

    /// Create a missing box error.
    pub fn missing(parent: AtomType, child: AtomType) -> Self {
        Self::MissingBox { parent, child }
    }

    /// Create an unexpected child box error.
    pub fn unexpected(parent: AtomType, found: AtomType) -> Self {
        Self::UnexpectedBox { parent, found }
    }

    /// Whether the caller should wait for more bytes and retry.
    pub fn is_incomplete(&self) -> bool {
        matches!(self, Self::Incomplete { .. })
    }
}

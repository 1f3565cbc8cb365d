//! Core type definitions shared between the parser and the buffer controllers.
//!
//! All enums serialize in lowercase, matching the strings a scripting surface
//! would expose (`"open"`, `"sequence"`, `"decode"`, ...).

use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle state of a media source.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReadyState {
    /// Not attached to a playback element.
    #[default]
    Closed,
    /// Attached and accepting data.
    Open,
    /// Attached, end of stream has been signalled.
    Ended,
}

impl fmt::Display for ReadyState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Closed => write!(f, "closed"),
            Self::Open => write!(f, "open"),
            Self::Ended => write!(f, "ended"),
        }
    }
}

/// How a source buffer assigns timestamps to appended media segments.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AppendMode {
    /// Timestamps in the media segments are used as-is.
    #[default]
    Segments,
    /// Segments are placed back to back after the previous one.
    Sequence,
}

impl fmt::Display for AppendMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Segments => write!(f, "segments"),
            Self::Sequence => write!(f, "sequence"),
        }
    }
}

/// Error reason passed to end of stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EndOfStreamError {
    /// The media data could not be fetched.
    Network,
    /// The media data could not be decoded.
    Decode,
}

impl fmt::Display for EndOfStreamError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Network => write!(f, "network"),
            Self::Decode => write!(f, "decode"),
        }
    }
}

/// Kind of track declared by a `hdlr` box.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrackKind {
    /// `soun` handler.
    Audio,
    /// `vide` handler.
    Video,
    /// `hint` handler.
    Hint,
}

impl TrackKind {
    /// Resolve a handler type code. Only `vide`, `soun` and `hint` are known.
    pub fn from_handler(handler: [u8; 4]) -> Option<Self> {
        match &handler {
            b"vide" => Some(Self::Video),
            b"soun" => Some(Self::Audio),
            b"hint" => Some(Self::Hint),
            _ => None,
        }
    }

    /// The handler type code for this kind.
    pub fn handler(&self) -> [u8; 4] {
        match self {
            Self::Audio => *b"soun",
            Self::Video => *b"vide",
            Self::Hint => *b"hint",
        }
    }
}

impl fmt::Display for TrackKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Audio => write!(f, "audio"),
            Self::Video => write!(f, "video"),
            Self::Hint => write!(f, "hint"),
        }
    }
}

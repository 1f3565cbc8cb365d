//! Error types for the media source and source buffer controllers.
//!
//! These are the synchronous rejections of the scripting-facing calls. Parse
//! failures never show up here: they are reported asynchronously through the
//! append error path as `error` + `updateend` events.

use mseforged_common::SourceBufferId;
use thiserror::Error;

/// Result type for mseforged operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for mseforged operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    /// Call not allowed in the current state (not open, updating, removed).
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Content type the source cannot handle.
    #[error("Not supported: {0}")]
    NotSupported(String),

    /// Argument of the wrong shape (empty type, negative duration).
    #[error("Type error: {0}")]
    Type(String),

    /// The buffer is full and eviction could not make room.
    #[error("Quota exceeded: need {needed} bytes, {available} available")]
    QuotaExceeded { needed: usize, available: usize },

    /// Source buffer is not part of this media source.
    #[error("Source buffer {0} not found")]
    NotFound(SourceBufferId),
}

impl Error {
    /// Create an invalid state error.
    pub fn invalid_state(msg: impl Into<String>) -> Self {
        Self::InvalidState(msg.into())
    }

    /// Create a not supported error.
    pub fn not_supported(msg: impl Into<String>) -> Self {
        Self::NotSupported(msg.into())
    }

    /// Create a type error.
    pub fn type_error(msg: impl Into<String>) -> Self {
        Self::Type(msg.into())
    }
}

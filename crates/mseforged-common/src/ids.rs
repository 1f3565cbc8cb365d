//! Typed ID wrappers.
//!
//! Source buffers are referenced by ID rather than by pointer: the media source
//! owns every buffer and resolves an ID back to its buffer on each call.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for a source buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SourceBufferId(Uuid);

impl SourceBufferId {
    /// Generate a new random source buffer ID.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SourceBufferId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<Uuid> for SourceBufferId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl From<SourceBufferId> for Uuid {
    fn from(id: SourceBufferId) -> Self {
        id.0
    }
}

impl std::fmt::Display for SourceBufferId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_source_buffer_id_roundtrips_uuid() {
        let uuid = Uuid::new_v4();
        let id = SourceBufferId::from(uuid);
        assert_eq!(Uuid::from(id), uuid);
        assert_eq!(id.to_string(), uuid.to_string());
    }

    #[test]
    fn test_source_buffer_id_serializes_transparently() {
        let id = SourceBufferId::new();
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, format!("\"{}\"", id));
    }
}

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub source: SourceConfig,

    #[serde(default)]
    pub feed: FeedConfig,
}

/// Media source and source buffer settings.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct SourceConfig {
    /// Bytes of media a source buffer may hold before it is full.
    #[serde(default = "default_buffer_quota")]
    pub buffer_quota_bytes: usize,

    /// Leave tracks with the tkhd enabled flag clear out of parsed
    /// initialization segments.
    #[serde(default)]
    pub exclude_disabled_tracks: bool,

    /// Content subtypes accepted by `add_source_buffer` (default: mp4).
    #[serde(default = "default_supported_subtypes")]
    pub supported_subtypes: Vec<String>,
}

fn default_buffer_quota() -> usize {
    150 * 1024 * 1024
}

fn default_supported_subtypes() -> Vec<String> {
    vec!["mp4".to_string()]
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            buffer_quota_bytes: default_buffer_quota(),
            exclude_disabled_tracks: false,
            supported_subtypes: default_supported_subtypes(),
        }
    }
}

/// Settings for the `feed` command.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct FeedConfig {
    /// Bytes per append call.
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    #[serde(default = "default_content_type")]
    pub content_type: String,
}

fn default_chunk_size() -> usize {
    64 * 1024
}

fn default_content_type() -> String {
    "video/mp4".to_string()
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            content_type: default_content_type(),
        }
    }
}

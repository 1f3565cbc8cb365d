//! Playback element collaborator.
//!
//! The media source reports lifecycle outcomes to the element it is attached
//! to. [`HeadlessElement`] records them, for the CLI and for tests.

use std::fmt;

/// Readiness of the playback element, ordered from least to most data.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ElementReadyState {
    #[default]
    HaveNothing,
    HaveMetadata,
    HaveCurrentData,
    HaveFutureData,
    HaveEnoughData,
}

impl fmt::Display for ElementReadyState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::HaveNothing => "HAVE_NOTHING",
            Self::HaveMetadata => "HAVE_METADATA",
            Self::HaveCurrentData => "HAVE_CURRENT_DATA",
            Self::HaveFutureData => "HAVE_FUTURE_DATA",
            Self::HaveEnoughData => "HAVE_ENOUGH_DATA",
        };
        f.write_str(name)
    }
}

/// The media element a media source is attached to.
pub trait PlaybackElement {
    fn ready_state(&self) -> ElementReadyState;

    fn set_ready_state(&mut self, state: ElementReadyState);

    /// Current playback position in seconds.
    fn current_time(&self) -> f64;

    /// Whether the element is already in an error state.
    fn has_error(&self) -> bool;

    /// Failure before any media data was obtained.
    fn no_supported_source(&mut self, reason: &str);

    /// Network failure after some media data was obtained.
    fn connection_interrupted(&mut self);

    /// Decode failure after some media data was obtained.
    fn media_data_corrupted(&mut self);

    /// End of stream without error, with the final duration if known.
    fn all_data_received(&mut self, duration: Option<f64>);

    /// The media source duration changed.
    fn duration_changed(&mut self, _duration: f64) {}
}

/// Failure reported to a [`HeadlessElement`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ElementFailure {
    NoSupportedSource(String),
    ConnectionInterrupted,
    MediaDataCorrupted,
}

impl fmt::Display for ElementFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoSupportedSource(reason) => write!(f, "no supported source ({reason})"),
            Self::ConnectionInterrupted => write!(f, "connection interrupted"),
            Self::MediaDataCorrupted => write!(f, "media data corrupted"),
        }
    }
}

/// Element without a decoder. Records what the media source tells it.
#[derive(Debug, Clone, Default)]
pub struct HeadlessElement {
    ready_state: ElementReadyState,
    current_time: f64,
    duration: Option<f64>,
    failure: Option<ElementFailure>,
    ended: bool,
}

impl HeadlessElement {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_current_time(&mut self, time: f64) {
        self.current_time = time;
    }

    pub fn failure(&self) -> Option<&ElementFailure> {
        self.failure.as_ref()
    }

    /// Last duration reported through a duration change or end of stream.
    pub fn duration(&self) -> Option<f64> {
        self.duration
    }

    /// Whether end of stream without error was signalled.
    pub fn ended(&self) -> bool {
        self.ended
    }
}

impl PlaybackElement for HeadlessElement {
    fn ready_state(&self) -> ElementReadyState {
        self.ready_state
    }

    fn set_ready_state(&mut self, state: ElementReadyState) {
        self.ready_state = state;
    }

    fn current_time(&self) -> f64 {
        self.current_time
    }

    fn has_error(&self) -> bool {
        self.failure.is_some()
    }

    fn no_supported_source(&mut self, reason: &str) {
        self.failure = Some(ElementFailure::NoSupportedSource(reason.to_string()));
    }

    fn connection_interrupted(&mut self) {
        self.failure = Some(ElementFailure::ConnectionInterrupted);
    }

    fn media_data_corrupted(&mut self) {
        self.failure = Some(ElementFailure::MediaDataCorrupted);
    }

    fn all_data_received(&mut self, duration: Option<f64>) {
        self.ended = true;
        if duration.is_some() {
            self.duration = duration;
        }
    }

    fn duration_changed(&mut self, duration: f64) {
        self.duration = Some(duration);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ready_state_order() {
        assert!(ElementReadyState::HaveNothing < ElementReadyState::HaveMetadata);
        assert!(ElementReadyState::HaveFutureData < ElementReadyState::HaveEnoughData);
        assert_eq!(ElementReadyState::HaveMetadata.to_string(), "HAVE_METADATA");
    }

    #[test]
    fn test_headless_records_failures() {
        let mut element = HeadlessElement::new();
        assert!(!element.has_error());
        element.no_supported_source("decode error");
        assert!(element.has_error());
        assert_eq!(
            element.failure(),
            Some(&ElementFailure::NoSupportedSource("decode error".into()))
        );
    }

    #[test]
    fn test_all_data_received_keeps_known_duration() {
        let mut element = HeadlessElement::new();
        element.duration_changed(12.5);
        element.all_data_received(None);
        assert!(element.ended());
        assert_eq!(element.duration(), Some(12.5));
    }
}

//! Source buffer: append preconditions, mode switching, abort and eviction.
//!
//! A source buffer is owned by its [`MediaSource`](crate::MediaSource). Every
//! operation that needs the media source's state receives it as
//! [`SourceState`] rather than holding a back-reference.

mod append;
pub mod eviction;

pub use append::AppendState;
pub use eviction::{BufferedSegment, TrackBuffer};

use crate::config::SourceConfig;
use crate::demux::Demuxer;
use crate::element::PlaybackElement;
use crate::error::{Error, Result};
use crate::media_source::SourceState;
use crate::mime::{self, ContentType};
use crate::tasks::{EventKind, TaskId, TaskSource};
use bytes::BytesMut;
use mseforged_common::{AppendMode, ReadyState, SourceBufferId};
use mseforged_isobmff::segment::{
    ExtractOptions, IsoBmffSegmentParser, SegmentParser, Track,
};
use std::fmt;
use tracing::{debug, info};

pub struct SourceBuffer {
    id: SourceBufferId,
    content_type: ContentType,
    mode: AppendMode,
    updating: bool,
    append_state: AppendState,
    /// Appended bytes not yet consumed by the segment parser loop.
    input_buffer: BytesMut,
    group_start_timestamp: f64,
    group_end_timestamp: f64,
    /// Fixed at creation from the content type.
    generate_timestamps: bool,
    buffer_full: bool,
    first_init_segment_received: bool,
    /// Tracks of the most recent initialization segment.
    tracks: Vec<Track>,
    track_buffer: TrackBuffer,
    quota: usize,
    parser: Box<dyn SegmentParser>,
    demuxer: Box<dyn Demuxer>,
    pending_append: Option<TaskId>,
}

impl SourceBuffer {
    pub(crate) fn new(
        content_type: ContentType,
        config: &SourceConfig,
        demuxer: Box<dyn Demuxer>,
    ) -> Self {
        let generate_timestamps = mime::should_generate_timestamps(&content_type);
        let mode = if generate_timestamps {
            AppendMode::Sequence
        } else {
            AppendMode::Segments
        };
        let parser = IsoBmffSegmentParser::new(ExtractOptions {
            exclude_disabled_tracks: config.exclude_disabled_tracks,
        });

        Self {
            id: SourceBufferId::new(),
            content_type,
            mode,
            updating: false,
            append_state: AppendState::WaitingForSegment,
            input_buffer: BytesMut::new(),
            group_start_timestamp: 0.0,
            group_end_timestamp: 0.0,
            generate_timestamps,
            buffer_full: false,
            first_init_segment_received: false,
            tracks: Vec::new(),
            track_buffer: TrackBuffer::new(),
            quota: config.buffer_quota_bytes,
            parser: Box::new(parser),
            demuxer,
            pending_append: None,
        }
    }

    pub fn id(&self) -> SourceBufferId {
        self.id
    }

    pub fn content_type(&self) -> &ContentType {
        &self.content_type
    }

    pub fn mode(&self) -> AppendMode {
        self.mode
    }

    /// True from `append_buffer` until the append step finishes or aborts.
    pub fn updating(&self) -> bool {
        self.updating
    }

    pub fn append_state(&self) -> AppendState {
        self.append_state
    }

    pub fn generate_timestamps(&self) -> bool {
        self.generate_timestamps
    }

    pub fn group_start_timestamp(&self) -> f64 {
        self.group_start_timestamp
    }

    pub fn group_end_timestamp(&self) -> f64 {
        self.group_end_timestamp
    }

    pub fn buffer_full(&self) -> bool {
        self.buffer_full
    }

    pub fn first_init_segment_received(&self) -> bool {
        self.first_init_segment_received
    }

    pub fn tracks(&self) -> &[Track] {
        &self.tracks
    }

    /// Buffered presentation ranges in seconds.
    pub fn buffered(&self) -> Vec<(f64, f64)> {
        self.track_buffer.buffered_ranges()
    }

    pub fn buffered_bytes(&self) -> usize {
        self.track_buffer.total_bytes()
    }

    /// Appended bytes still waiting for the rest of their segment.
    pub fn pending_input(&self) -> usize {
        self.input_buffer.len()
    }

    pub(crate) fn highest_end(&self) -> Option<f64> {
        self.track_buffer.highest_end()
    }

    fn task_source(&self) -> TaskSource {
        TaskSource::SourceBuffer(self.id)
    }

    /// Accept `data` and schedule the buffer append step.
    pub(crate) fn append_buffer<E: PlaybackElement>(
        &mut self,
        state: &mut SourceState<E>,
        data: &[u8],
    ) -> Result<()> {
        self.prepare_append(state, data.len())?;

        self.input_buffer.extend_from_slice(data);
        self.updating = true;
        state
            .tasks
            .queue_event(self.task_source(), EventKind::UpdateStart);
        self.pending_append = Some(state.tasks.queue_append(self.id));
        debug!(id = %self.id, bytes = data.len(), "Append scheduled");
        Ok(())
    }

    fn prepare_append<E: PlaybackElement>(
        &mut self,
        state: &mut SourceState<E>,
        incoming: usize,
    ) -> Result<()> {
        if self.updating {
            return Err(Error::invalid_state("An append is already in progress"));
        }
        if state.element_has_error() {
            return Err(Error::invalid_state("Media element is in an error state"));
        }
        if state.ready_state == ReadyState::Ended {
            state.set_ready_state(ReadyState::Open);
        }
        self.coded_frame_eviction(state.current_time(), incoming)
    }

    /// Evict buffered media when the buffer is full.
    fn coded_frame_eviction(&mut self, current_time: f64, incoming: usize) -> Result<()> {
        if !self.buffer_full {
            return Ok(());
        }
        let freed = self.track_buffer.evict(current_time, incoming, self.quota)?;
        self.buffer_full = self.track_buffer.total_bytes() > self.quota;
        debug!(
            id = %self.id,
            freed,
            buffered = self.track_buffer.total_bytes(),
            "Coded frame eviction"
        );
        Ok(())
    }

    pub(crate) fn set_mode<E: PlaybackElement>(
        &mut self,
        state: &mut SourceState<E>,
        mode: AppendMode,
    ) -> Result<()> {
        if self.updating {
            return Err(Error::invalid_state("Cannot change mode while updating"));
        }
        if mode == AppendMode::Segments && self.generate_timestamps {
            return Err(Error::type_error(format!(
                "{} requires sequence mode",
                self.content_type.essence()
            )));
        }
        if self.append_state == AppendState::ParsingMediaSegment {
            return Err(Error::invalid_state(
                "Cannot change mode while parsing a media segment",
            ));
        }
        if state.ready_state == ReadyState::Ended {
            state.set_ready_state(ReadyState::Open);
        }
        if mode == AppendMode::Sequence {
            self.group_start_timestamp = self.group_end_timestamp;
        }
        if self.mode != mode {
            info!(id = %self.id, from = %self.mode, to = %mode, "Append mode changed");
        }
        self.mode = mode;
        Ok(())
    }

    pub(crate) fn abort<E: PlaybackElement>(&mut self, state: &mut SourceState<E>) -> Result<()> {
        if state.ready_state != ReadyState::Open {
            return Err(Error::invalid_state(format!(
                "Cannot abort while media source is {}",
                state.ready_state
            )));
        }
        if self.updating {
            self.abort_pending(state);
        }
        self.reset_parser_state();
        Ok(())
    }

    /// Cancel an in-flight append and queue `abort` + `updateend`.
    pub(crate) fn abort_pending<E: PlaybackElement>(&mut self, state: &mut SourceState<E>) {
        if let Some(task) = self.pending_append.take() {
            state.tasks.cancel(task);
        }
        self.updating = false;
        state.tasks.queue_event(self.task_source(), EventKind::Abort);
        state
            .tasks
            .queue_event(self.task_source(), EventKind::UpdateEnd);
        info!(id = %self.id, "Append aborted");
    }
}

impl fmt::Debug for SourceBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SourceBuffer")
            .field("id", &self.id)
            .field("content_type", &self.content_type.essence())
            .field("mode", &self.mode)
            .field("updating", &self.updating)
            .field("append_state", &self.append_state)
            .field("pending_input", &self.input_buffer.len())
            .field("buffered_bytes", &self.track_buffer.total_bytes())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::demux::BoxScanDemuxer;
    use crate::element::HeadlessElement;
    use assert_matches::assert_matches;

    fn open_state() -> SourceState<HeadlessElement> {
        let mut state = SourceState::new(SourceConfig::default());
        state.element = Some(HeadlessElement::new());
        state.ready_state = ReadyState::Open;
        state
    }

    fn buffer(content_type: &str) -> SourceBuffer {
        SourceBuffer::new(
            ContentType::parse(content_type).unwrap(),
            &SourceConfig::default(),
            Box::new(BoxScanDemuxer::new()),
        )
    }

    #[test]
    fn test_initial_mode_follows_timestamp_generation() {
        let mp4 = buffer("video/mp4");
        assert!(!mp4.generate_timestamps());
        assert_eq!(mp4.mode(), AppendMode::Segments);

        let aac = buffer("audio/aac");
        assert!(aac.generate_timestamps());
        assert_eq!(aac.mode(), AppendMode::Sequence);
    }

    #[test]
    fn test_sequence_mode_continues_from_group_end() {
        let mut state = open_state();
        let mut sb = buffer("audio/aac");
        sb.group_end_timestamp = 12.5;
        sb.group_start_timestamp = 3.0;

        sb.set_mode(&mut state, AppendMode::Sequence).unwrap();
        assert_eq!(sb.group_start_timestamp(), 12.5);
        assert_eq!(sb.group_end_timestamp(), 12.5);

        assert_matches!(
            sb.set_mode(&mut state, AppendMode::Segments),
            Err(Error::Type(_))
        );
        assert_eq!(sb.mode(), AppendMode::Sequence);
    }

    #[test]
    fn test_set_mode_rejected_while_updating() {
        let mut state = open_state();
        let mut sb = buffer("video/mp4");
        sb.append_buffer(&mut state, &[0, 0, 0]).unwrap();
        assert_matches!(
            sb.set_mode(&mut state, AppendMode::Sequence),
            Err(Error::InvalidState(_))
        );
        assert_eq!(sb.mode(), AppendMode::Segments);
    }

    #[test]
    fn test_set_mode_rejected_mid_media_segment_leaves_source_ended() {
        let mut state = open_state();
        state.ready_state = ReadyState::Ended;
        let mut sb = buffer("video/mp4");
        sb.append_state = AppendState::ParsingMediaSegment;

        assert_matches!(
            sb.set_mode(&mut state, AppendMode::Sequence),
            Err(Error::InvalidState(_))
        );
        assert_eq!(state.ready_state, ReadyState::Ended);
        assert!(state.tasks.is_empty());
    }

    #[test]
    fn test_set_mode_reopens_ended_source() {
        let mut state = open_state();
        state.ready_state = ReadyState::Ended;
        let mut sb = buffer("video/mp4");

        sb.set_mode(&mut state, AppendMode::Sequence).unwrap();
        assert_eq!(state.ready_state, ReadyState::Open);
        assert_eq!(state.tasks.pending(), 1);
    }

    #[test]
    fn test_append_while_updating_is_rejected_before_parsing() {
        let mut state = open_state();
        let mut sb = buffer("video/mp4");
        sb.append_buffer(&mut state, &[1, 2, 3]).unwrap();
        assert!(sb.updating());
        let queued = state.tasks.pending();

        assert_matches!(
            sb.append_buffer(&mut state, &[4, 5, 6]),
            Err(Error::InvalidState(_))
        );
        assert_eq!(sb.pending_input(), 3);
        assert_eq!(state.tasks.pending(), queued);
    }

    #[test]
    fn test_append_rejected_when_element_has_error() {
        let mut state = open_state();
        if let Some(element) = state.element.as_mut() {
            element.media_data_corrupted();
        }
        let mut sb = buffer("video/mp4");
        assert_matches!(
            sb.append_buffer(&mut state, &[1]),
            Err(Error::InvalidState(_))
        );
        assert!(!sb.updating());
    }

    #[test]
    fn test_full_buffer_evicts_before_accepting() {
        let mut state = open_state();
        let mut sb = buffer("video/mp4");
        sb.quota = 100;
        sb.track_buffer.push(0.0, 1.0, 60);
        sb.track_buffer.push(1.0, 2.0, 60);
        sb.buffer_full = true;

        // Playback at 0: nothing has finished playing.
        assert_matches!(
            sb.append_buffer(&mut state, &[0; 10]),
            Err(Error::QuotaExceeded { .. })
        );
        assert!(!sb.updating());
        assert!(state.tasks.is_empty());

        if let Some(element) = state.element.as_mut() {
            element.set_current_time(1.5);
        }
        sb.append_buffer(&mut state, &[0; 10]).unwrap();
        assert!(!sb.buffer_full());
        assert_eq!(sb.buffered_bytes(), 60);
        assert_eq!(sb.buffered(), vec![(1.0, 2.0)]);
    }

    #[test]
    fn test_abort_requires_open_source() {
        let mut state = open_state();
        state.ready_state = ReadyState::Ended;
        let mut sb = buffer("video/mp4");
        assert_matches!(sb.abort(&mut state), Err(Error::InvalidState(_)));
    }

    #[test]
    fn test_abort_cancels_pending_append() {
        let mut state = open_state();
        let mut sb = buffer("video/mp4");
        sb.append_buffer(&mut state, &[0, 0, 0, 8]).unwrap();

        sb.abort(&mut state).unwrap();
        assert!(!sb.updating());
        assert_eq!(sb.pending_input(), 0);
        assert_eq!(sb.append_state(), AppendState::WaitingForSegment);
        // updatestart, abort, updateend; the append step itself is cancelled.
        assert_eq!(state.tasks.pending(), 3);
    }
}

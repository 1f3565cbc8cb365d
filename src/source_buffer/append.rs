//! The buffer append step and its segment parser loop.

use super::SourceBuffer;
use crate::demux::{AcceptedSegment, DemuxOutcome};
use crate::element::{ElementReadyState, PlaybackElement};
use crate::media_source::SourceState;
use crate::tasks::EventKind;
use bytes::Buf;
use mseforged_common::{AppendMode, EndOfStreamError, TrackKind};
use mseforged_isobmff::mp4::{AtomType, BOX_HEADER_SIZE};
use mseforged_isobmff::segment::InitializationSegment;
use std::fmt;
use tracing::{debug, info, trace, warn};

/// Where the segment parser loop is within the appended byte stream.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum AppendState {
    #[default]
    WaitingForSegment,
    ParsingInitSegment,
    ParsingMediaSegment,
}

impl fmt::Display for AppendState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::WaitingForSegment => write!(f, "waiting for segment"),
            Self::ParsingInitSegment => write!(f, "parsing init segment"),
            Self::ParsingMediaSegment => write!(f, "parsing media segment"),
        }
    }
}

type StepResult = std::result::Result<(), String>;

impl SourceBuffer {
    /// Run the deferred half of `append_buffer`.
    pub(crate) fn buffer_append<E: PlaybackElement>(&mut self, state: &mut SourceState<E>) {
        self.pending_append = None;

        if let Err(reason) = self.segment_parser_loop(state) {
            self.append_error(state, &reason);
            return;
        }

        self.updating = false;
        let source = self.task_source();
        state.tasks.queue_event(source, EventKind::Update);
        state.tasks.queue_event(source, EventKind::UpdateEnd);
    }

    /// Consume as many complete segments as the input buffer holds.
    ///
    /// Returns `Ok` when it needs more data, `Err` with a reason on a
    /// permanent failure.
    fn segment_parser_loop<E: PlaybackElement>(&mut self, state: &mut SourceState<E>) -> StepResult {
        loop {
            if self.input_buffer.is_empty() {
                return Ok(());
            }

            match self.append_state {
                AppendState::WaitingForSegment => {
                    if self.parser.starts_with_init_segment(&self.input_buffer) {
                        self.set_append_state(AppendState::ParsingInitSegment);
                    } else if self.parser.starts_with_media_segment(&self.input_buffer) {
                        self.set_append_state(AppendState::ParsingMediaSegment);
                    } else if self.input_buffer.len() < BOX_HEADER_SIZE {
                        return Ok(());
                    } else {
                        let fourcc = AtomType([
                            self.input_buffer[4],
                            self.input_buffer[5],
                            self.input_buffer[6],
                            self.input_buffer[7],
                        ]);
                        return Err(format!("Unrecognized segment starting with {fourcc}"));
                    }
                }

                AppendState::ParsingInitSegment => {
                    match self.parser.scan_init_segment(&self.input_buffer) {
                        Ok(_) => {}
                        Err(e) if e.is_incomplete() => {
                            trace!(id = %self.id, buffered = self.input_buffer.len(), "Init segment incomplete");
                            return Ok(());
                        }
                        Err(e) => return Err(e.to_string()),
                    }

                    let init = self
                        .parser
                        .parse_init_segment(&self.input_buffer)
                        .map_err(|e| e.to_string())?;
                    self.initialization_segment_received(state, &init)?;
                    self.input_buffer.advance(init.size());
                    self.set_append_state(AppendState::WaitingForSegment);
                }

                AppendState::ParsingMediaSegment => {
                    if !self.first_init_segment_received {
                        return Err("Media segment before any initialization segment".to_string());
                    }

                    match self
                        .demuxer
                        .demux_media_segment(&self.input_buffer, &self.tracks)
                    {
                        DemuxOutcome::Incomplete => return Ok(()),
                        DemuxOutcome::Invalid(reason) => return Err(reason),
                        DemuxOutcome::Accepted(segment) => {
                            if segment.consumed == 0 || segment.consumed > self.input_buffer.len() {
                                return Err(format!(
                                    "Demuxer consumed {} of {} bytes",
                                    segment.consumed,
                                    self.input_buffer.len()
                                ));
                            }
                            self.media_segment_received(state, segment);
                            self.input_buffer.advance(segment.consumed);
                            self.set_append_state(AppendState::WaitingForSegment);
                        }
                    }
                }
            }
        }
    }

    /// Validate an initialization segment, hand it to the demuxer and apply
    /// it. Nothing changes unless every check passes.
    fn initialization_segment_received<E: PlaybackElement>(
        &mut self,
        state: &mut SourceState<E>,
        init: &InitializationSegment,
    ) -> StepResult {
        if init.tracks().is_empty() {
            return Err("Initialization segment has no tracks".to_string());
        }

        if self.first_init_segment_received {
            for kind in [TrackKind::Audio, TrackKind::Video, TrackKind::Hint] {
                let expected = self.tracks.iter().filter(|t| t.kind == kind).count();
                let found = init.count(kind);
                if expected != found {
                    return Err(format!(
                        "Initialization segment has {found} {kind} tracks, expected {expected}"
                    ));
                }
            }
        }

        self.demuxer.initialization_segment(init)?;

        if state.duration.is_nan() {
            let duration = init
                .duration()
                .map(|d| d.as_secs_f64())
                .unwrap_or(f64::INFINITY);
            state.change_duration(duration);
        }

        self.tracks = init.tracks().to_vec();
        self.first_init_segment_received = true;
        state.advance_element(ElementReadyState::HaveMetadata);

        info!(
            id = %self.id,
            size = init.size(),
            brand = %init.major_brand(),
            tracks = self.tracks.len(),
            "Initialization segment received"
        );
        Ok(())
    }

    fn media_segment_received<E: PlaybackElement>(
        &mut self,
        state: &mut SourceState<E>,
        segment: AcceptedSegment,
    ) {
        let group_end = self.group_end_timestamp;
        let (start, end) = match (self.mode, segment.time_range) {
            (_, None) => (group_end, group_end),
            (AppendMode::Segments, Some(range)) => range,
            (AppendMode::Sequence, Some((start, end))) => {
                (group_end, group_end + (end - start).max(0.0))
            }
        };

        self.track_buffer.push(start, end, segment.consumed);
        self.group_end_timestamp = end;

        if !self.buffer_full && self.track_buffer.total_bytes() > self.quota {
            self.buffer_full = true;
            debug!(
                id = %self.id,
                buffered = self.track_buffer.total_bytes(),
                quota = self.quota,
                "Buffer full"
            );
        }

        state.advance_element(ElementReadyState::HaveCurrentData);
        debug!(id = %self.id, start, end, bytes = segment.consumed, "Media segment received");
    }

    /// Abandon the append: drop pending input, report, end the stream.
    fn append_error<E: PlaybackElement>(&mut self, state: &mut SourceState<E>, reason: &str) {
        warn!(id = %self.id, reason, "Append error");

        self.reset_parser_state();
        self.updating = false;

        let source = self.task_source();
        state.tasks.queue_event(source, EventKind::Error);
        state.tasks.queue_event(source, EventKind::UpdateEnd);

        state.end_of_stream(Some(EndOfStreamError::Decode), None);
    }

    pub(crate) fn reset_parser_state(&mut self) {
        if self.append_state == AppendState::ParsingMediaSegment {
            debug!(id = %self.id, "Dropping partial media segment");
        }
        self.input_buffer.clear();
        self.set_append_state(AppendState::WaitingForSegment);
    }

    fn set_append_state(&mut self, next: AppendState) {
        if self.append_state != next {
            trace!(id = %self.id, from = %self.append_state, to = %next, "Append state");
            self.append_state = next;
        }
    }
}

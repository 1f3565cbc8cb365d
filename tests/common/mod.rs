//! Shared helpers for integration tests.
//!
//! Builds synthetic fragmented MP4 streams and provides [`Script`], a
//! demuxer whose answers are decided by the test.

#![allow(dead_code)]

use bytes::Bytes;
use mseforged::config::SourceConfig;
use mseforged::{
    DemuxOutcome, Demuxer, DemuxerFactory, Event, EventKind, HeadlessElement, MediaSource,
    TaskSource,
};
use mseforged_common::SourceBufferId;
use mseforged_isobmff::segment::{InitializationSegment, Track};
use mseforged_isobmff::{InitSegmentBuilder, MediaSegmentBuilder, TrackSpec};
use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

/// Video ticks per second in generated streams.
pub const VIDEO_TIMESCALE: u64 = 90_000;

/// Init segment with one video (track 1) and one audio (track 2) track.
pub fn av_init_segment(duration_ms: u64) -> Bytes {
    InitSegmentBuilder::new()
        .timescale(1000)
        .duration(duration_ms)
        .track(TrackSpec::video(1).duration(duration_ms))
        .track(TrackSpec::audio(2).duration(duration_ms))
        .build()
}

/// Two-second video media segment for track 1 starting at `start_secs`.
pub fn video_segment(sequence: u32, start_secs: u64) -> Bytes {
    MediaSegmentBuilder::new(sequence, 1)
        .base_media_decode_time(start_secs * VIDEO_TIMESCALE)
        .samples(60, 3000, 100)
        .build()
}

pub fn open_source() -> MediaSource<HeadlessElement> {
    open_source_with(SourceConfig::default())
}

pub fn open_source_with(config: SourceConfig) -> MediaSource<HeadlessElement> {
    let mut source = MediaSource::new(config);
    source
        .attach(HeadlessElement::new())
        .expect("attach to closed source");
    source.run_tasks();
    source
}

/// Open source with one `video/mp4` buffer. Setup events are drained.
pub fn source_with_buffer(config: SourceConfig) -> (MediaSource<HeadlessElement>, SourceBufferId) {
    let mut source = open_source_with(config);
    let id = source
        .add_source_buffer("video/mp4")
        .expect("add video/mp4 buffer");
    source.run_tasks();
    (source, id)
}

/// Append and run the queue, returning the dispatched events.
pub fn append(
    source: &mut MediaSource<HeadlessElement>,
    id: SourceBufferId,
    data: &[u8],
) -> Vec<Event> {
    source.append_buffer(id, data).expect("append accepted");
    source.run_tasks()
}

pub fn kinds(events: &[Event]) -> Vec<EventKind> {
    events.iter().map(|e| e.kind).collect()
}

/// Kinds of the events fired at one source buffer.
pub fn buffer_kinds(events: &[Event], id: SourceBufferId) -> Vec<EventKind> {
    events
        .iter()
        .filter(|e| e.target == TaskSource::SourceBuffer(id))
        .map(|e| e.kind)
        .collect()
}

pub const APPEND_OK: [EventKind; 3] = [
    EventKind::UpdateStart,
    EventKind::Update,
    EventKind::UpdateEnd,
];

pub const APPEND_FAILED: [EventKind; 3] = [
    EventKind::UpdateStart,
    EventKind::Error,
    EventKind::UpdateEnd,
];

#[derive(Default)]
struct ScriptState {
    outcomes: VecDeque<DemuxOutcome>,
    init_segments: Vec<InitializationSegment>,
    media_calls: Vec<(usize, Vec<Track>)>,
    reject_init: Option<String>,
}

/// Handle to the demuxers created by [`Script::factory`]. Outcomes are
/// returned in order; an empty script answers `Incomplete`.
#[derive(Clone, Default)]
pub struct Script {
    state: Rc<RefCell<ScriptState>>,
}

impl Script {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, outcome: DemuxOutcome) {
        self.state.borrow_mut().outcomes.push_back(outcome);
    }

    pub fn reject_init(&self, reason: &str) {
        self.state.borrow_mut().reject_init = Some(reason.to_string());
    }

    /// Initialization segments the demuxer accepted.
    pub fn init_segments(&self) -> usize {
        self.state.borrow().init_segments.len()
    }

    /// Input length and tracks of each media segment call.
    pub fn media_calls(&self) -> Vec<(usize, Vec<Track>)> {
        self.state.borrow().media_calls.clone()
    }

    pub fn factory(&self) -> DemuxerFactory {
        let script = self.clone();
        Box::new(move |_| {
            Box::new(ScriptedDemuxer {
                script: script.clone(),
            })
        })
    }
}

struct ScriptedDemuxer {
    script: Script,
}

impl Demuxer for ScriptedDemuxer {
    fn initialization_segment(&mut self, init: &InitializationSegment) -> Result<(), String> {
        let mut state = self.script.state.borrow_mut();
        if let Some(reason) = state.reject_init.take() {
            return Err(reason);
        }
        state.init_segments.push(init.clone());
        Ok(())
    }

    fn demux_media_segment(&mut self, input: &[u8], tracks: &[Track]) -> DemuxOutcome {
        let mut state = self.script.state.borrow_mut();
        state.media_calls.push((input.len(), tracks.to_vec()));
        state
            .outcomes
            .pop_front()
            .unwrap_or(DemuxOutcome::Incomplete)
    }
}

/// Media source using a scripted demuxer, with one `video/mp4` buffer.
pub fn scripted_source(
    config: SourceConfig,
) -> (MediaSource<HeadlessElement>, SourceBufferId, Script) {
    let script = Script::new();
    let mut source = MediaSource::with_demuxer_factory(config, script.factory());
    source
        .attach(HeadlessElement::new())
        .expect("attach to closed source");
    let id = source
        .add_source_buffer("video/mp4")
        .expect("add video/mp4 buffer");
    source.run_tasks();
    (source, id, script)
}

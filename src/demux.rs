//! Demuxer collaborator.
//!
//! Receives every initialization segment and the raw bytes of each media
//! segment. The append state machine only cares about the three outcomes.

use crate::mime::ContentType;
use mseforged_isobmff::segment::{
    fragment_timings, scan_media_segment, FragmentTiming, InitializationSegment, Track,
};
use tracing::debug;

/// A media segment the demuxer took.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AcceptedSegment {
    /// Bytes of input the segment occupied.
    pub consumed: usize,
    /// Presentation interval in seconds, if the demuxer knows it.
    pub time_range: Option<(f64, f64)>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum DemuxOutcome {
    /// The segment continues past the available bytes.
    Incomplete,
    /// The bytes cannot form a media segment.
    Invalid(String),
    Accepted(AcceptedSegment),
}

pub trait Demuxer {
    /// Called with each successfully parsed initialization segment. An error
    /// rejects the segment and raises an append error.
    fn initialization_segment(
        &mut self,
        init: &InitializationSegment,
    ) -> std::result::Result<(), String>;

    /// Inspect the media segment at the front of `input`.
    fn demux_media_segment(&mut self, input: &[u8], tracks: &[Track]) -> DemuxOutcome;
}

/// Creates the demuxer for a new source buffer.
pub type DemuxerFactory = Box<dyn Fn(&ContentType) -> Box<dyn Demuxer>>;

/// Demuxer that finds segment boundaries and reads fragment decode times.
/// Sample payloads are never looked at.
#[derive(Debug, Default)]
pub struct BoxScanDemuxer {
    segments: u64,
}

impl BoxScanDemuxer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Default factory for [`MediaSource`](crate::MediaSource).
    pub fn factory() -> DemuxerFactory {
        Box::new(|_| Box::new(BoxScanDemuxer::new()))
    }

    /// Media segments accepted so far.
    pub fn segments(&self) -> u64 {
        self.segments
    }
}

impl Demuxer for BoxScanDemuxer {
    fn initialization_segment(
        &mut self,
        init: &InitializationSegment,
    ) -> std::result::Result<(), String> {
        debug!(
            size = init.size(),
            tracks = init.tracks().len(),
            "Demuxer received initialization segment"
        );
        Ok(())
    }

    fn demux_media_segment(&mut self, input: &[u8], tracks: &[Track]) -> DemuxOutcome {
        let consumed = match scan_media_segment(input) {
            Ok(consumed) => consumed,
            Err(e) if e.is_incomplete() => return DemuxOutcome::Incomplete,
            Err(e) => return DemuxOutcome::Invalid(e.to_string()),
        };
        let timings = match fragment_timings(&input[..consumed]) {
            Ok(timings) => timings,
            Err(e) => return DemuxOutcome::Invalid(e.to_string()),
        };

        self.segments += 1;
        DemuxOutcome::Accepted(AcceptedSegment {
            consumed,
            time_range: presentation_range(&timings, tracks),
        })
    }
}

/// Union of the fragment intervals in seconds. Fragments of tracks not in
/// `tracks` are ignored.
fn presentation_range(timings: &[FragmentTiming], tracks: &[Track]) -> Option<(f64, f64)> {
    timings
        .iter()
        .filter_map(|timing| {
            let track = tracks.iter().find(|t| t.track_id == timing.track_id)?;
            let timescale = f64::from(track.media_timescale);
            let start = timing.base_media_decode_time as f64 / timescale;
            let end = start + timing.duration as f64 / timescale;
            Some((start, end))
        })
        .reduce(|a, b| (a.0.min(b.0), a.1.max(b.1)))
}

//! Fragmented MP4 (fMP4) serialization.
//!
//! Writes the structures the segment parser consumes:
//! - Init segment (ftyp + moov{mvhd, trak*, mvex})
//! - Media segment (styp? + moof{mfhd, traf} + mdat)
//!
//! Sample tables are always written empty and sample descriptions carry no
//! entries, so the output is structurally complete but codec-agnostic.

mod moof;

pub use moof::MediaSegmentBuilder;

use bytes::{BufMut, Bytes, BytesMut};
use mseforged_common::TrackKind;

/// Reserve a size field and write the box type. Returns the box start.
pub(crate) fn open_box(buf: &mut BytesMut, atom_type: &[u8; 4]) -> usize {
    let start = buf.len();
    buf.put_u32(0); // placeholder size
    buf.put_slice(atom_type);
    start
}

/// Patch the size field of the box opened at `start`.
pub(crate) fn close_box(buf: &mut BytesMut, start: usize) {
    let size = (buf.len() - start) as u32;
    buf[start..start + 4].copy_from_slice(&size.to_be_bytes());
}

/// Write a complete box with the given body.
pub(crate) fn write_box(buf: &mut BytesMut, atom_type: &[u8; 4], body: &[u8]) {
    buf.put_u32((8 + body.len()) as u32);
    buf.put_slice(atom_type);
    buf.put_slice(body);
}

fn put_full_header(buf: &mut BytesMut, version: u8, flags: u32) {
    buf.put_u32((u32::from(version) << 24) | (flags & 0x00FF_FFFF));
}

fn put_time(buf: &mut BytesMut, version: u8, value: u64) {
    if version == 1 {
        buf.put_u64(value);
    } else {
        // Values that do not fit collapse to the all-ones "unknown" marker.
        buf.put_u32(u32::try_from(value).unwrap_or(u32::MAX));
    }
}

fn put_identity_matrix(buf: &mut BytesMut) {
    for value in [0x0001_0000, 0, 0, 0, 0x0001_0000, 0, 0, 0, 0x4000_0000u32] {
        buf.put_u32(value);
    }
}

/// Description of one track written into the init segment.
#[derive(Debug, Clone)]
pub struct TrackSpec {
    pub track_id: u32,
    /// Handler type; anything other than `vide`/`soun`/`hint` is written
    /// verbatim so malformed input can be produced.
    pub handler: [u8; 4],
    /// Track duration in movie timescale units.
    pub duration: u64,
    pub media_timescale: u32,
    /// Duration in `media_timescale` units.
    pub media_duration: u64,
    pub enabled: bool,
    /// Number of (dummy) entries written into `stts`.
    pub stts_entries: u32,
}

impl TrackSpec {
    pub fn new(track_id: u32, kind: TrackKind) -> Self {
        let media_timescale = match kind {
            TrackKind::Audio => 48_000,
            _ => 90_000,
        };
        Self {
            track_id,
            handler: kind.handler(),
            duration: 0,
            media_timescale,
            media_duration: 0,
            enabled: true,
            stts_entries: 0,
        }
    }

    pub fn video(track_id: u32) -> Self {
        Self::new(track_id, TrackKind::Video)
    }

    pub fn audio(track_id: u32) -> Self {
        Self::new(track_id, TrackKind::Audio)
    }

    pub fn duration(mut self, duration: u64) -> Self {
        self.duration = duration;
        self
    }

    pub fn media(mut self, timescale: u32, duration: u64) -> Self {
        self.media_timescale = timescale;
        self.media_duration = duration;
        self
    }

    pub fn handler(mut self, handler: [u8; 4]) -> Self {
        self.handler = handler;
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    pub fn stts_entries(mut self, count: u32) -> Self {
        self.stts_entries = count;
        self
    }
}

/// Builder for creating init segments.
#[derive(Debug, Clone)]
pub struct InitSegmentBuilder {
    version: u8,
    timescale: u32,
    duration: u64,
    major_brand: [u8; 4],
    compatible_brands: Vec<[u8; 4]>,
    leading_boxes: Vec<([u8; 4], Vec<u8>)>,
    extra_moov_boxes: Vec<([u8; 4], Vec<u8>)>,
    tracks: Vec<TrackSpec>,
    omit_mvhd: bool,
    omit_mvex: bool,
    mvhd_last: bool,
}

impl InitSegmentBuilder {
    /// Create a new builder.
    pub fn new() -> Self {
        Self {
            version: 0,
            timescale: 1000,
            duration: 0,
            major_brand: *b"isom",
            compatible_brands: vec![*b"isom", *b"iso6", *b"dash", *b"mp41"],
            leading_boxes: Vec::new(),
            extra_moov_boxes: Vec::new(),
            tracks: Vec::new(),
            omit_mvhd: false,
            omit_mvex: false,
            mvhd_last: false,
        }
    }

    /// Full box version for mvhd/tkhd/mdhd (0 = 32-bit times, 1 = 64-bit).
    pub fn version(mut self, version: u8) -> Self {
        self.version = version;
        self
    }

    /// Set movie timescale.
    pub fn timescale(mut self, timescale: u32) -> Self {
        self.timescale = timescale;
        self
    }

    /// Set movie duration in timescale units.
    pub fn duration(mut self, duration: u64) -> Self {
        self.duration = duration;
        self
    }

    /// Replace the compatible brand list.
    pub fn brands(mut self, brands: &[[u8; 4]]) -> Self {
        self.compatible_brands = brands.to_vec();
        self
    }

    /// Insert a box between ftyp and moov.
    pub fn leading_box(mut self, atom_type: [u8; 4], body: &[u8]) -> Self {
        self.leading_boxes.push((atom_type, body.to_vec()));
        self
    }

    /// Insert an extra moov child after the tracks.
    pub fn moov_box(mut self, atom_type: [u8; 4], body: &[u8]) -> Self {
        self.extra_moov_boxes.push((atom_type, body.to_vec()));
        self
    }

    /// Add a track.
    pub fn track(mut self, track: TrackSpec) -> Self {
        self.tracks.push(track);
        self
    }

    pub fn without_mvhd(mut self) -> Self {
        self.omit_mvhd = true;
        self
    }

    pub fn without_mvex(mut self) -> Self {
        self.omit_mvex = true;
        self
    }

    /// Write mvhd after the tracks instead of first.
    pub fn mvhd_last(mut self) -> Self {
        self.mvhd_last = true;
        self
    }

    /// Build the init segment.
    pub fn build(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(1024);

        self.write_ftyp(&mut buf);
        for (atom_type, body) in &self.leading_boxes {
            write_box(&mut buf, atom_type, body);
        }
        self.write_moov(&mut buf);

        buf.freeze()
    }

    fn write_ftyp(&self, buf: &mut BytesMut) {
        let start = open_box(buf, b"ftyp");
        buf.put_slice(&self.major_brand);
        buf.put_u32(0x200); // minor version
        for brand in &self.compatible_brands {
            buf.put_slice(brand);
        }
        close_box(buf, start);
    }

    fn write_moov(&self, buf: &mut BytesMut) {
        let start = open_box(buf, b"moov");

        if !self.omit_mvhd && !self.mvhd_last {
            self.write_mvhd(buf);
        }
        for track in &self.tracks {
            self.write_trak(buf, track);
        }
        for (atom_type, body) in &self.extra_moov_boxes {
            write_box(buf, atom_type, body);
        }
        if !self.omit_mvex {
            self.write_mvex(buf);
        }
        if !self.omit_mvhd && self.mvhd_last {
            self.write_mvhd(buf);
        }

        close_box(buf, start);
    }

    fn write_mvhd(&self, buf: &mut BytesMut) {
        let start = open_box(buf, b"mvhd");
        put_full_header(buf, self.version, 0);
        put_time(buf, self.version, 0); // creation time
        put_time(buf, self.version, 0); // modification time
        buf.put_u32(self.timescale);
        put_time(buf, self.version, self.duration);
        buf.put_u32(0x0001_0000); // rate = 1.0
        buf.put_u16(0x0100); // volume = 1.0
        buf.put_u16(0); // reserved
        buf.put_u64(0); // reserved
        put_identity_matrix(buf);
        for _ in 0..6 {
            buf.put_u32(0); // pre_defined
        }
        let next_track_id = self.tracks.iter().map(|t| t.track_id).max().unwrap_or(0) + 1;
        buf.put_u32(next_track_id);
        close_box(buf, start);
    }

    fn write_trak(&self, buf: &mut BytesMut, track: &TrackSpec) {
        let start = open_box(buf, b"trak");
        self.write_tkhd(buf, track);
        self.write_mdia(buf, track);
        close_box(buf, start);
    }

    fn write_tkhd(&self, buf: &mut BytesMut, track: &TrackSpec) {
        // in_movie | in_preview, plus enabled
        let flags = if track.enabled { 0x7 } else { 0x6 };
        let is_audio = track.handler == *b"soun";

        let start = open_box(buf, b"tkhd");
        put_full_header(buf, self.version, flags);
        put_time(buf, self.version, 0);
        put_time(buf, self.version, 0);
        buf.put_u32(track.track_id);
        buf.put_u32(0); // reserved
        put_time(buf, self.version, track.duration);
        buf.put_u64(0); // reserved
        buf.put_u16(0); // layer
        buf.put_u16(0); // alternate group
        buf.put_u16(if is_audio { 0x0100 } else { 0 }); // volume
        buf.put_u16(0); // reserved
        put_identity_matrix(buf);
        if track.handler == *b"vide" {
            buf.put_u32(1920 << 16);
            buf.put_u32(1080 << 16);
        } else {
            buf.put_u32(0);
            buf.put_u32(0);
        }
        close_box(buf, start);
    }

    fn write_mdia(&self, buf: &mut BytesMut, track: &TrackSpec) {
        let start = open_box(buf, b"mdia");

        let mdhd = open_box(buf, b"mdhd");
        put_full_header(buf, self.version, 0);
        put_time(buf, self.version, 0);
        put_time(buf, self.version, 0);
        buf.put_u32(track.media_timescale);
        put_time(buf, self.version, track.media_duration);
        buf.put_u16(0x55C4); // language: und
        buf.put_u16(0); // pre_defined
        close_box(buf, mdhd);

        let hdlr = open_box(buf, b"hdlr");
        put_full_header(buf, 0, 0);
        buf.put_u32(0); // pre_defined
        buf.put_slice(&track.handler);
        buf.put_slice(&[0; 12]); // reserved
        buf.put_slice(b"mseforged\0");
        close_box(buf, hdlr);

        self.write_minf(buf, track);
        close_box(buf, start);
    }

    fn write_minf(&self, buf: &mut BytesMut, track: &TrackSpec) {
        let start = open_box(buf, b"minf");

        match &track.handler {
            b"vide" => {
                let vmhd = open_box(buf, b"vmhd");
                put_full_header(buf, 0, 1);
                buf.put_slice(&[0; 8]); // graphics mode + opcolor
                close_box(buf, vmhd);
            }
            b"soun" => {
                let smhd = open_box(buf, b"smhd");
                put_full_header(buf, 0, 0);
                buf.put_u32(0); // balance + reserved
                close_box(buf, smhd);
            }
            b"hint" => {
                let hmhd = open_box(buf, b"hmhd");
                put_full_header(buf, 0, 0);
                buf.put_slice(&[0; 16]);
                close_box(buf, hmhd);
            }
            _ => {
                let nmhd = open_box(buf, b"nmhd");
                put_full_header(buf, 0, 0);
                close_box(buf, nmhd);
            }
        }

        // dinf { dref { url (self-contained) } }
        buf.put_u32(36);
        buf.put_slice(b"dinf");
        buf.put_u32(28);
        buf.put_slice(b"dref");
        buf.put_u32(0); // version/flags
        buf.put_u32(1); // entry count
        buf.put_u32(12);
        buf.put_slice(b"url ");
        buf.put_u32(1); // flags: self-contained

        self.write_stbl(buf, track);
        close_box(buf, start);
    }

    fn write_stbl(&self, buf: &mut BytesMut, track: &TrackSpec) {
        let start = open_box(buf, b"stbl");

        // stsd without sample entries
        let stsd = open_box(buf, b"stsd");
        put_full_header(buf, 0, 0);
        buf.put_u32(0);
        close_box(buf, stsd);

        let stts = open_box(buf, b"stts");
        put_full_header(buf, 0, 0);
        buf.put_u32(track.stts_entries);
        for _ in 0..track.stts_entries {
            buf.put_u32(1); // sample count
            buf.put_u32(1024); // sample delta
        }
        close_box(buf, stts);

        let stsc = open_box(buf, b"stsc");
        put_full_header(buf, 0, 0);
        buf.put_u32(0);
        close_box(buf, stsc);

        let stsz = open_box(buf, b"stsz");
        put_full_header(buf, 0, 0);
        buf.put_u32(0); // sample size
        buf.put_u32(0); // sample count
        close_box(buf, stsz);

        let stco = open_box(buf, b"stco");
        put_full_header(buf, 0, 0);
        buf.put_u32(0);
        close_box(buf, stco);

        close_box(buf, start);
    }

    fn write_mvex(&self, buf: &mut BytesMut) {
        let start = open_box(buf, b"mvex");
        for track in &self.tracks {
            buf.put_u32(32);
            buf.put_slice(b"trex");
            buf.put_u32(0); // version/flags
            buf.put_u32(track.track_id);
            buf.put_u32(1); // default sample description index
            buf.put_u32(0); // default sample duration
            buf.put_u32(0); // default sample size
            buf.put_u32(0); // default sample flags
        }
        close_box(buf, start);
    }
}

impl Default for InitSegmentBuilder {
    fn default() -> Self {
        Self::new()
    }
}

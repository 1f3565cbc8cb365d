//! Media segment (styp + moof + mdat) builder.

use super::{close_box, open_box};
use bytes::{BufMut, Bytes, BytesMut};

/// Builder for single-track media segments with uniform samples.
#[derive(Debug, Clone)]
pub struct MediaSegmentBuilder {
    sequence_number: u32,
    track_id: u32,
    base_media_decode_time: u64,
    sample_count: u32,
    sample_duration: u32,
    sample_size: u32,
    with_styp: bool,
}

impl MediaSegmentBuilder {
    /// Create a new media segment builder.
    pub fn new(sequence_number: u32, track_id: u32) -> Self {
        Self {
            sequence_number,
            track_id,
            base_media_decode_time: 0,
            sample_count: 1,
            sample_duration: 1024,
            sample_size: 16,
            with_styp: false,
        }
    }

    /// Set base media decode time.
    pub fn base_media_decode_time(mut self, time: u64) -> Self {
        self.base_media_decode_time = time;
        self
    }

    /// Set the number, duration and byte size of the samples.
    pub fn samples(mut self, count: u32, duration: u32, size: u32) -> Self {
        self.sample_count = count;
        self.sample_duration = duration;
        self.sample_size = size;
        self
    }

    /// Prefix the segment with a `styp` box.
    pub fn with_styp(mut self) -> Self {
        self.with_styp = true;
        self
    }

    /// Build styp? + moof + mdat. The mdat payload is zero-filled.
    pub fn build(&self) -> Bytes {
        let data_size = self.sample_count as usize * self.sample_size as usize;
        let mut buf = BytesMut::with_capacity(128 + data_size);

        if self.with_styp {
            buf.put_u32(24);
            buf.put_slice(b"styp");
            buf.put_slice(b"msdh"); // major brand
            buf.put_u32(0); // minor version
            buf.put_slice(b"msdh");
            buf.put_slice(b"msix");
        }

        self.write_moof(&mut buf);

        buf.put_u32((8 + data_size) as u32);
        buf.put_slice(b"mdat");
        buf.put_bytes(0, data_size);

        buf.freeze()
    }

    fn write_moof(&self, buf: &mut BytesMut) {
        let moof_start = open_box(buf, b"moof");

        // mfhd
        buf.put_u32(16);
        buf.put_slice(b"mfhd");
        buf.put_u32(0); // version/flags
        buf.put_u32(self.sequence_number);

        let traf_start = open_box(buf, b"traf");

        // tfhd, default-base-is-moof
        buf.put_u32(16);
        buf.put_slice(b"tfhd");
        buf.put_u32(0x020000);
        buf.put_u32(self.track_id);

        // tfdt, version 1 for 64-bit decode time
        buf.put_u32(20);
        buf.put_slice(b"tfdt");
        buf.put_u32(0x0100_0000);
        buf.put_u64(self.base_media_decode_time);

        // trun: data-offset | sample-duration | sample-size
        let trun_size = 12 + 4 + 4 + self.sample_count as usize * 8;
        buf.put_u32(trun_size as u32);
        buf.put_slice(b"trun");
        buf.put_u32(0x000001 | 0x000100 | 0x000200);
        buf.put_u32(self.sample_count);
        let data_offset_pos = buf.len();
        buf.put_u32(0); // placeholder
        for _ in 0..self.sample_count {
            buf.put_u32(self.sample_duration);
            buf.put_u32(self.sample_size);
        }

        close_box(buf, traf_start);
        close_box(buf, moof_start);

        // Relative to moof start, pointing past the 8-byte mdat header.
        let data_offset = (buf.len() - moof_start + 8) as u32;
        buf[data_offset_pos..data_offset_pos + 4].copy_from_slice(&data_offset.to_be_bytes());
    }
}

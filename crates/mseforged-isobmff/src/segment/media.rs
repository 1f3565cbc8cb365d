//! Media segment boundary scanning.
//!
//! Finds where a media segment ends without parsing fragment payloads. A
//! segment is complete once a `moof` has been followed by a complete `mdat`.
//! [`fragment_timings`] additionally reads the decode times out of `traf`.

use crate::mp4::{AtomType, BoxCursor, BoxRef};
use crate::{Error, Result};

const TFHD_BASE_DATA_OFFSET: u32 = 0x01;
const TFHD_SAMPLE_DESCRIPTION_INDEX: u32 = 0x02;
const TFHD_DEFAULT_SAMPLE_DURATION: u32 = 0x08;

const TRUN_DATA_OFFSET: u32 = 0x01;
const TRUN_FIRST_SAMPLE_FLAGS: u32 = 0x04;
const TRUN_SAMPLE_DURATION: u32 = 0x100;
const TRUN_SAMPLE_SIZE: u32 = 0x200;
const TRUN_SAMPLE_FLAGS: u32 = 0x400;
const TRUN_SAMPLE_COMPOSITION_OFFSET: u32 = 0x800;

/// Decode timing of one track fragment, in the track's media timescale.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FragmentTiming {
    pub track_id: u32,
    /// From `tfdt`; 0 when the fragment has none.
    pub base_media_decode_time: u64,
    /// Sum of the `trun` sample durations. Samples without an explicit
    /// duration use the `tfhd` default, or 0.
    pub duration: u64,
}

/// Return the byte length of the media segment at the front of `input`.
///
/// Accepted boxes: `styp` (first only), `sidx`, `ssix`, `prft`, `emsg`,
/// `free`, `skip`, `moof` and `mdat` (only after a `moof`).
pub fn scan_media_segment(input: &[u8]) -> Result<usize> {
    let mut cursor = BoxCursor::new(input);
    let mut moof_seen = false;

    loop {
        let first = cursor.position() == 0;
        let header = cursor.peek_header()?;
        match header.atom_type {
            AtomType::STYP if first => {}
            AtomType::SIDX
            | AtomType::SSIX
            | AtomType::PRFT
            | AtomType::EMSG
            | AtomType::FREE
            | AtomType::SKIP => {}
            AtomType::MOOF => moof_seen = true,
            AtomType::MDAT if moof_seen => {
                cursor.read_box()?;
                return Ok(cursor.position());
            }
            other => return Err(Error::UnexpectedTopLevel(other)),
        }
        cursor.read_box()?;
    }
}

/// Read the timing of every track fragment in the media segment at the
/// front of `input`.
pub fn fragment_timings(input: &[u8]) -> Result<Vec<FragmentTiming>> {
    let len = scan_media_segment(input)?;
    let mut cursor = BoxCursor::new(&input[..len]);
    let mut timings = Vec::new();

    while !cursor.is_empty() {
        let moof = cursor.read_box()?;
        if moof.atom_type() != AtomType::MOOF {
            continue;
        }
        for child in moof.children() {
            let child = child?;
            if child.atom_type() == AtomType::TRAF {
                timings.push(read_traf(&child)?);
            }
        }
    }

    Ok(timings)
}

fn read_traf(traf: &BoxRef<'_>) -> Result<FragmentTiming> {
    let mut track_id = None;
    let mut default_duration = 0u64;
    let mut base_media_decode_time = 0;
    let mut duration = 0u64;

    for child in traf.children() {
        let child = child?;
        match child.atom_type() {
            AtomType::TFHD => {
                let (full, mut body) = child.full()?;
                track_id = Some(body.read_u32()?);
                if full.flags & TFHD_BASE_DATA_OFFSET != 0 {
                    body.skip(8)?;
                }
                if full.flags & TFHD_SAMPLE_DESCRIPTION_INDEX != 0 {
                    body.skip(4)?;
                }
                if full.flags & TFHD_DEFAULT_SAMPLE_DURATION != 0 {
                    default_duration = u64::from(body.read_u32()?);
                }
            }
            AtomType::TFDT => {
                let (full, mut body) = child.full()?;
                base_media_decode_time = match full.version {
                    0 => u64::from(body.read_u32()?),
                    1 => body.read_u64()?,
                    version => {
                        return Err(Error::UnsupportedVersion {
                            atom_type: AtomType::TFDT,
                            version,
                        })
                    }
                };
            }
            AtomType::TRUN => {
                let (full, mut body) = child.full()?;
                duration = duration.saturating_add(read_trun_duration(
                    full.flags,
                    &mut body,
                    default_duration,
                )?);
            }
            _ => {}
        }
    }

    let track_id = track_id.ok_or_else(|| Error::missing(AtomType::TRAF, AtomType::TFHD))?;
    Ok(FragmentTiming {
        track_id,
        base_media_decode_time,
        duration,
    })
}

fn read_trun_duration(flags: u32, body: &mut BoxCursor<'_>, default_duration: u64) -> Result<u64> {
    let sample_count = body.read_u32()?;
    if flags & TRUN_DATA_OFFSET != 0 {
        body.skip(4)?;
    }
    if flags & TRUN_FIRST_SAMPLE_FLAGS != 0 {
        body.skip(4)?;
    }

    // Per-sample fields other than the duration.
    let other_fields = [
        TRUN_SAMPLE_SIZE,
        TRUN_SAMPLE_FLAGS,
        TRUN_SAMPLE_COMPOSITION_OFFSET,
    ]
    .iter()
    .filter(|&&flag| flags & flag != 0)
    .count()
        * 4;

    if flags & TRUN_SAMPLE_DURATION == 0 {
        let table = (sample_count as usize).saturating_mul(other_fields);
        body.skip(table)?;
        return Ok(u64::from(sample_count).saturating_mul(default_duration));
    }

    let mut total = 0u64;
    for _ in 0..sample_count {
        total = total.saturating_add(u64::from(body.read_u32()?));
        body.skip(other_fields)?;
    }
    Ok(total)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fmp4::MediaSegmentBuilder;
    use assert_matches::assert_matches;

    #[test]
    fn test_complete_segment() {
        let data = MediaSegmentBuilder::new(1, 1).with_styp().build();
        assert_eq!(scan_media_segment(&data), Ok(data.len()));

        let data = MediaSegmentBuilder::new(1, 1).build();
        assert_eq!(scan_media_segment(&data), Ok(data.len()));
    }

    #[test]
    fn test_stops_after_first_mdat() {
        let first = MediaSegmentBuilder::new(1, 1).build();
        let second = MediaSegmentBuilder::new(2, 1).build();
        let data = [first.as_ref(), second.as_ref()].concat();
        assert_eq!(scan_media_segment(&data), Ok(first.len()));
    }

    #[test]
    fn test_partial_segment_is_incomplete() {
        let data = MediaSegmentBuilder::new(1, 1).samples(10, 1024, 100).build();
        for len in [0, 7, 8, 100, data.len() - 1] {
            assert!(scan_media_segment(&data[..len]).unwrap_err().is_incomplete());
        }
    }

    #[test]
    fn test_mdat_before_moof() {
        let data = [0, 0, 0, 8, b'm', b'd', b'a', b't'];
        assert_matches!(
            scan_media_segment(&data),
            Err(Error::UnexpectedTopLevel(AtomType::MDAT))
        );
    }

    #[test]
    fn test_styp_only_first() {
        let styp = [0, 0, 0, 8, b's', b't', b'y', b'p'];
        let data = [styp.to_vec(), styp.to_vec()].concat();
        assert_matches!(
            scan_media_segment(&data),
            Err(Error::UnexpectedTopLevel(AtomType::STYP))
        );
    }

    #[test]
    fn test_fragment_timings() {
        let data = MediaSegmentBuilder::new(3, 2)
            .with_styp()
            .base_media_decode_time(180_000)
            .samples(30, 3000, 8)
            .build();
        assert_eq!(
            fragment_timings(&data),
            Ok(vec![FragmentTiming {
                track_id: 2,
                base_media_decode_time: 180_000,
                duration: 90_000,
            }])
        );
    }

    #[test]
    fn test_fragment_timings_incomplete() {
        let data = MediaSegmentBuilder::new(1, 1).build();
        assert!(fragment_timings(&data[..data.len() - 1])
            .unwrap_err()
            .is_incomplete());
    }

    #[test]
    fn test_traf_without_tfhd() {
        let mut data = Vec::new();
        // moof { traf { } } mdat { }
        data.extend_from_slice(&[0, 0, 0, 16, b'm', b'o', b'o', b'f']);
        data.extend_from_slice(&[0, 0, 0, 8, b't', b'r', b'a', b'f']);
        data.extend_from_slice(&[0, 0, 0, 8, b'm', b'd', b'a', b't']);
        assert_matches!(
            fragment_timings(&data),
            Err(Error::MissingBox {
                parent: AtomType::TRAF,
                child: AtomType::TFHD
            })
        );
    }

    #[test]
    fn test_ftyp_is_not_a_media_segment() {
        let data = [0, 0, 0, 8, b'f', b't', b'y', b'p'];
        assert_matches!(
            scan_media_segment(&data),
            Err(Error::UnexpectedTopLevel(AtomType::FTYP))
        );
    }
}

//! Initialization segment extraction.
//!
//! Walks `ftyp` → (`pdin`|`free`|`sidx`)* → `moov` and collects the movie
//! duration and one [`Track`] per `trak`. Every box consumed is copied
//! verbatim into [`InitializationSegment::raw_bytes`] so the whole segment
//! can be handed to a demuxer unchanged.
//!
//! Unknown boxes are fatal at every level of the walk. Initialization
//! segments of fragmented content carry no samples, so the sample tables
//! that would describe samples must be empty.

use crate::mp4::{
    boxes::sample_table_entry_count, media_time_to_duration, AtomType, BoxCursor, BoxRef,
    FileTypeBox, HandlerBox, MediaHeaderBox, MovieHeaderBox, TrackHeaderBox,
};
use crate::{Error, Result};
use bytes::{Bytes, BytesMut};
use mseforged_common::TrackKind;
use std::time::Duration;
use tracing::debug;

/// Sample table boxes that must carry zero entries.
const EMPTY_SAMPLE_TABLES: [AtomType; 6] = [
    AtomType::STSS,
    AtomType::STSH,
    AtomType::STSZ,
    AtomType::PADB,
    AtomType::STTS,
    AtomType::CO64,
];

/// Sample table boxes accepted without inspection.
const SKIPPED_SAMPLE_TABLES: [AtomType; 10] = [
    AtomType::CTTS,
    AtomType::STCO,
    AtomType::STSC,
    AtomType::SBGP,
    AtomType::SGPD,
    AtomType::SUBS,
    AtomType::STDP,
    AtomType::SDTP,
    AtomType::STZ2,
    AtomType::STSD,
];

/// Extraction behaviour switches.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExtractOptions {
    /// Leave tracks whose `tkhd` enabled flag is clear out of the result.
    /// Such tracks are still fully validated.
    pub exclude_disabled_tracks: bool,
}

/// One parsed `trak`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Track {
    pub kind: TrackKind,
    pub track_id: u32,
    /// Duration from `tkhd`, in movie timescale. `None` when unknown, or when
    /// `mvhd` had not been seen yet when the track was parsed.
    pub duration: Option<Duration>,
    /// Timescale from `mdhd`.
    pub media_timescale: u32,
    /// Duration from `mdhd`, in its own timescale.
    pub media_duration: Option<Duration>,
    pub enabled: bool,
}

/// Result of a successful extraction. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InitializationSegment {
    raw_bytes: Bytes,
    major_brand: AtomType,
    tracks: Vec<Track>,
    duration: Option<Duration>,
}

impl InitializationSegment {
    /// Every byte consumed, from the start of `ftyp` to the end of `moov`.
    pub fn raw_bytes(&self) -> &Bytes {
        &self.raw_bytes
    }

    /// Number of input bytes the segment occupies.
    pub fn size(&self) -> usize {
        self.raw_bytes.len()
    }

    pub fn major_brand(&self) -> AtomType {
        self.major_brand
    }

    pub fn tracks(&self) -> &[Track] {
        &self.tracks
    }

    /// Movie duration from `mvhd`. `None` when unknown.
    pub fn duration(&self) -> Option<Duration> {
        self.duration
    }

    /// Number of tracks of `kind`.
    pub fn count(&self, kind: TrackKind) -> usize {
        self.tracks.iter().filter(|t| t.kind == kind).count()
    }
}

/// Parse an initialization segment from the front of `input`.
pub fn parse_init_segment(input: &[u8]) -> Result<InitializationSegment> {
    parse_init_segment_with(input, ExtractOptions::default())
}

/// Parse an initialization segment from the front of `input`.
///
/// Fails with [`Error::Incomplete`] if the full `moov` is not available yet.
/// Any other error means the input is not a usable initialization segment.
pub fn parse_init_segment_with(
    input: &[u8],
    options: ExtractOptions,
) -> Result<InitializationSegment> {
    let mut cursor = BoxCursor::new(input);
    let mut raw = BytesMut::new();

    let header = cursor.peek_header()?;
    if header.atom_type != AtomType::FTYP {
        return Err(Error::UnexpectedTopLevel(header.atom_type));
    }
    let ftyp = FileTypeBox::decode(&cursor.read_and_consume(&mut raw)?)?;
    debug!(
        major_brand = %ftyp.major_brand,
        compatible_brands = ftyp.compatible_brands.len(),
        "Parsed ftyp"
    );

    loop {
        let header = cursor.peek_header()?;
        match header.atom_type {
            AtomType::PDIN | AtomType::FREE | AtomType::SIDX => {
                cursor.read_and_consume(&mut raw)?;
            }
            AtomType::MOOV => break,
            other => return Err(Error::UnexpectedTopLevel(other)),
        }
    }

    let moov = cursor.read_and_consume(&mut raw)?;
    let (duration, tracks) = parse_moov(&moov, options)?;

    debug!(
        size = raw.len(),
        tracks = tracks.len(),
        duration_ms = duration.map(|d| d.as_millis() as u64),
        "Parsed initialization segment"
    );

    Ok(InitializationSegment {
        raw_bytes: raw.freeze(),
        major_brand: ftyp.major_brand,
        tracks,
        duration,
    })
}

fn parse_moov(moov: &BoxRef<'_>, options: ExtractOptions) -> Result<(Option<Duration>, Vec<Track>)> {
    let mut mvhd: Option<MovieHeaderBox> = None;
    let mut tracks = Vec::new();
    let mut trak_count = 0usize;
    let mut mvex_seen = false;

    for child in moov.children() {
        let child = child?;
        match child.atom_type() {
            AtomType::MVHD => {
                if mvhd.is_some() {
                    return Err(Error::duplicate(AtomType::MOOV, AtomType::MVHD));
                }
                mvhd = Some(MovieHeaderBox::decode(&child)?);
            }
            AtomType::TRAK => {
                trak_count += 1;
                let track = parse_trak(&child, mvhd.as_ref())?;
                if options.exclude_disabled_tracks && !track.enabled {
                    debug!(track_id = track.track_id, "Excluding disabled track");
                } else {
                    tracks.push(track);
                }
            }
            AtomType::MVEX => {
                if mvex_seen {
                    return Err(Error::duplicate(AtomType::MOOV, AtomType::MVEX));
                }
                mvex_seen = true;
            }
            AtomType::UDTA => {}
            other => return Err(Error::unexpected(AtomType::MOOV, other)),
        }
    }

    let mvhd = mvhd.ok_or(Error::missing(AtomType::MOOV, AtomType::MVHD))?;
    if trak_count == 0 {
        return Err(Error::missing(AtomType::MOOV, AtomType::TRAK));
    }
    if !mvex_seen {
        return Err(Error::missing(AtomType::MOOV, AtomType::MVEX));
    }

    Ok((mvhd.duration(), tracks))
}

fn parse_trak(trak: &BoxRef<'_>, mvhd: Option<&MovieHeaderBox>) -> Result<Track> {
    let mut tkhd: Option<TrackHeaderBox> = None;
    let mut media: Option<MediaInfo> = None;
    let mut edts_seen = false;

    for child in trak.children() {
        let child = child?;
        match child.atom_type() {
            AtomType::TKHD => {
                if tkhd.is_some() {
                    return Err(Error::duplicate(AtomType::TRAK, AtomType::TKHD));
                }
                tkhd = Some(TrackHeaderBox::decode(&child)?);
            }
            AtomType::MDIA => {
                if media.is_some() {
                    return Err(Error::duplicate(AtomType::TRAK, AtomType::MDIA));
                }
                media = Some(parse_mdia(&child)?);
            }
            AtomType::EDTS => {
                if edts_seen {
                    return Err(Error::duplicate(AtomType::TRAK, AtomType::EDTS));
                }
                edts_seen = true;
            }
            other => return Err(Error::unexpected(AtomType::TRAK, other)),
        }
    }

    let tkhd = tkhd.ok_or(Error::missing(AtomType::TRAK, AtomType::TKHD))?;
    let media = media.ok_or(Error::missing(AtomType::TRAK, AtomType::MDIA))?;

    let duration = mvhd.and_then(|m| media_time_to_duration(tkhd.duration, m.timescale));
    debug!(
        track_id = tkhd.track_id,
        kind = %media.kind,
        enabled = tkhd.is_enabled(),
        "Parsed trak"
    );

    Ok(Track {
        kind: media.kind,
        track_id: tkhd.track_id,
        duration,
        media_timescale: media.mdhd.timescale,
        media_duration: media_time_to_duration(media.mdhd.duration, media.mdhd.timescale),
        enabled: tkhd.is_enabled(),
    })
}

struct MediaInfo {
    mdhd: MediaHeaderBox,
    kind: TrackKind,
}

/// `mdia` children must come as mdhd, hdlr, minf.
fn parse_mdia(mdia: &BoxRef<'_>) -> Result<MediaInfo> {
    let mut mdhd: Option<MediaHeaderBox> = None;
    let mut kind: Option<TrackKind> = None;
    let mut minf_seen = false;

    for child in mdia.children() {
        let child = child?;
        let atom_type = child.atom_type();
        match atom_type {
            AtomType::MDHD => {
                if mdhd.is_some() {
                    return Err(Error::duplicate(AtomType::MDIA, atom_type));
                }
                if kind.is_some() || minf_seen {
                    return Err(Error::OutOfOrder {
                        parent: AtomType::MDIA,
                        found: atom_type,
                    });
                }
                mdhd = Some(MediaHeaderBox::decode(&child)?);
            }
            AtomType::HDLR => {
                if kind.is_some() {
                    return Err(Error::duplicate(AtomType::MDIA, atom_type));
                }
                if mdhd.is_none() || minf_seen {
                    return Err(Error::OutOfOrder {
                        parent: AtomType::MDIA,
                        found: atom_type,
                    });
                }
                let hdlr = HandlerBox::decode(&child)?;
                kind = Some(
                    TrackKind::from_handler(hdlr.handler_type.0)
                        .ok_or(Error::UnknownHandler(hdlr.handler_type))?,
                );
            }
            AtomType::MINF => {
                if minf_seen {
                    return Err(Error::duplicate(AtomType::MDIA, atom_type));
                }
                if kind.is_none() {
                    return Err(Error::OutOfOrder {
                        parent: AtomType::MDIA,
                        found: atom_type,
                    });
                }
                parse_minf(&child)?;
                minf_seen = true;
            }
            other => return Err(Error::unexpected(AtomType::MDIA, other)),
        }
    }

    let mdhd = mdhd.ok_or(Error::missing(AtomType::MDIA, AtomType::MDHD))?;
    let kind = kind.ok_or(Error::missing(AtomType::MDIA, AtomType::HDLR))?;
    if !minf_seen {
        return Err(Error::missing(AtomType::MDIA, AtomType::MINF));
    }
    Ok(MediaInfo { mdhd, kind })
}

fn parse_minf(minf: &BoxRef<'_>) -> Result<()> {
    let mut media_header_seen = false;
    let mut dinf_seen = false;
    let mut stbl_seen = false;

    for child in minf.children() {
        let child = child?;
        match child.atom_type() {
            AtomType::VMHD | AtomType::SMHD | AtomType::HMHD | AtomType::NMHD => {
                media_header_seen = true;
            }
            AtomType::DINF => {
                if dinf_seen {
                    return Err(Error::duplicate(AtomType::MINF, AtomType::DINF));
                }
                dinf_seen = true;
            }
            AtomType::STBL => {
                if stbl_seen {
                    return Err(Error::duplicate(AtomType::MINF, AtomType::STBL));
                }
                parse_stbl(&child)?;
                stbl_seen = true;
            }
            other => return Err(Error::unexpected(AtomType::MINF, other)),
        }
    }

    if !media_header_seen {
        return Err(Error::MissingMediaHeader);
    }
    if !dinf_seen {
        return Err(Error::missing(AtomType::MINF, AtomType::DINF));
    }
    if !stbl_seen {
        return Err(Error::missing(AtomType::MINF, AtomType::STBL));
    }
    Ok(())
}

fn parse_stbl(stbl: &BoxRef<'_>) -> Result<()> {
    for child in stbl.children() {
        let child = child?;
        let atom_type = child.atom_type();
        if EMPTY_SAMPLE_TABLES.contains(&atom_type) {
            let entry_count = sample_table_entry_count(&child)?;
            if entry_count != 0 {
                return Err(Error::NonEmptySampleTable {
                    atom_type,
                    entry_count,
                });
            }
        } else if !SKIPPED_SAMPLE_TABLES.contains(&atom_type) {
            return Err(Error::unexpected(AtomType::STBL, atom_type));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fmp4::{InitSegmentBuilder, TrackSpec};
    use assert_matches::assert_matches;

    fn single_video() -> InitSegmentBuilder {
        InitSegmentBuilder::new()
            .timescale(1000)
            .duration(5000)
            .track(TrackSpec::video(1).duration(5000).media(90_000, 450_000))
    }

    #[test]
    fn test_single_video_track() {
        let data = single_video().build();
        let init = parse_init_segment(&data).unwrap();

        assert_eq!(init.duration(), Some(Duration::from_millis(5000)));
        assert_eq!(init.size(), data.len());
        assert_eq!(init.raw_bytes(), &data);
        assert_eq!(init.major_brand(), AtomType(*b"isom"));
        assert_eq!(
            init.tracks(),
            &[Track {
                kind: TrackKind::Video,
                track_id: 1,
                duration: Some(Duration::from_millis(5000)),
                media_timescale: 90_000,
                media_duration: Some(Duration::from_millis(5000)),
                enabled: true,
            }]
        );
    }

    #[test]
    fn test_version_1_headers() {
        let data = InitSegmentBuilder::new()
            .version(1)
            .timescale(90_000)
            .duration(90_000 * 7200)
            .track(TrackSpec::audio(2).duration(90_000 * 7200))
            .build();
        let init = parse_init_segment(&data).unwrap();
        assert_eq!(init.duration(), Some(Duration::from_secs(7200)));
        assert_eq!(init.tracks()[0].kind, TrackKind::Audio);
        assert_eq!(init.tracks()[0].duration, Some(Duration::from_secs(7200)));
    }

    #[test]
    fn test_unknown_movie_duration() {
        let data = InitSegmentBuilder::new()
            .duration(u64::MAX)
            .track(TrackSpec::video(1))
            .build();
        let init = parse_init_segment(&data).unwrap();
        assert_eq!(init.duration(), None);
    }

    #[test]
    fn test_track_before_mvhd_has_unknown_duration() {
        let data = single_video().mvhd_last().build();
        let init = parse_init_segment(&data).unwrap();
        assert_eq!(init.duration(), Some(Duration::from_millis(5000)));
        assert_eq!(init.tracks()[0].duration, None);
    }

    #[test]
    fn test_leading_boxes_are_kept_in_raw_bytes() {
        let data = single_video()
            .leading_box(*b"free", &[0; 8])
            .leading_box(*b"sidx", &[0; 24])
            .build();
        let init = parse_init_segment(&data).unwrap();
        assert_eq!(init.size(), data.len());
    }

    #[test]
    fn test_unexpected_box_before_moov() {
        let data = single_video().leading_box(*b"mdat", &[0; 8]).build();
        assert_matches!(
            parse_init_segment(&data),
            Err(Error::UnexpectedTopLevel(AtomType::MDAT))
        );
    }

    #[test]
    fn test_missing_mvhd() {
        let data = single_video().without_mvhd().build();
        assert_eq!(
            parse_init_segment(&data),
            Err(Error::missing(AtomType::MOOV, AtomType::MVHD))
        );
    }

    #[test]
    fn test_missing_mvex_and_trak() {
        let data = single_video().without_mvex().build();
        assert_eq!(
            parse_init_segment(&data),
            Err(Error::missing(AtomType::MOOV, AtomType::MVEX))
        );

        let data = InitSegmentBuilder::new().build();
        assert_eq!(
            parse_init_segment(&data),
            Err(Error::missing(AtomType::MOOV, AtomType::TRAK))
        );
    }

    #[test]
    fn test_ipmc_and_unknown_moov_children_are_fatal() {
        let data = single_video().moov_box(*b"ipmc", &[]).build();
        assert_eq!(
            parse_init_segment(&data),
            Err(Error::unexpected(AtomType::MOOV, AtomType::IPMC))
        );

        let data = single_video().moov_box(*b"meta", &[]).build();
        assert_matches!(
            parse_init_segment(&data),
            Err(Error::UnexpectedBox { found, .. }) if found == AtomType(*b"meta")
        );

        // udta is accepted and ignored.
        let data = single_video().moov_box(*b"udta", &[0; 4]).build();
        assert!(parse_init_segment(&data).is_ok());
    }

    #[test]
    fn test_duplicate_mvex() {
        let data = single_video().moov_box(*b"mvex", &[]).build();
        assert_eq!(
            parse_init_segment(&data),
            Err(Error::duplicate(AtomType::MOOV, AtomType::MVEX))
        );
    }

    #[test]
    fn test_unknown_handler_fails_whole_segment() {
        let data = InitSegmentBuilder::new()
            .track(TrackSpec::video(1))
            .track(TrackSpec::video(2).handler(*b"text"))
            .build();
        assert_eq!(
            parse_init_segment(&data),
            Err(Error::UnknownHandler(AtomType(*b"text")))
        );
    }

    #[test]
    fn test_hint_track() {
        let data = InitSegmentBuilder::new()
            .track(TrackSpec::video(1))
            .track(TrackSpec::video(3).handler(*b"hint"))
            .build();
        let init = parse_init_segment(&data).unwrap();
        assert_eq!(init.count(TrackKind::Video), 1);
        assert_eq!(init.count(TrackKind::Hint), 1);
    }

    #[test]
    fn test_non_empty_stts() {
        let data = InitSegmentBuilder::new()
            .track(TrackSpec::video(1).stts_entries(2))
            .build();
        assert_eq!(
            parse_init_segment(&data),
            Err(Error::NonEmptySampleTable {
                atom_type: AtomType::STTS,
                entry_count: 2
            })
        );
    }

    #[test]
    fn test_disabled_tracks() {
        let data = InitSegmentBuilder::new()
            .track(TrackSpec::video(1))
            .track(TrackSpec::audio(2).disabled())
            .build();

        let kept = parse_init_segment(&data).unwrap();
        assert_eq!(kept.tracks().len(), 2);
        assert!(!kept.tracks()[1].enabled);

        let options = ExtractOptions {
            exclude_disabled_tracks: true,
        };
        let filtered = parse_init_segment_with(&data, options).unwrap();
        assert_eq!(filtered.tracks().len(), 1);
        assert_eq!(filtered.tracks()[0].track_id, 1);
    }

    #[test]
    fn test_prefixes_are_incomplete() {
        let data = single_video().build();
        for len in [0, 4, 8, 31, 32, 40, data.len() - 1] {
            let err = parse_init_segment(&data[..len]).unwrap_err();
            assert!(err.is_incomplete(), "prefix {len}: {err}");
        }
    }

    #[test]
    fn test_trailing_bytes_are_not_consumed() {
        let mut data = single_video().build().to_vec();
        let init_len = data.len();
        data.extend_from_slice(&[0, 0, 0, 8, b'm', b'o', b'o', b'f']);
        let init = parse_init_segment(&data).unwrap();
        assert_eq!(init.size(), init_len);
    }

    #[test]
    fn test_does_not_start_with_ftyp() {
        let data = [0, 0, 0, 8, b'm', b'o', b'o', b'f'];
        assert_eq!(
            parse_init_segment(&data),
            Err(Error::UnexpectedTopLevel(AtomType::MOOF))
        );
    }
}

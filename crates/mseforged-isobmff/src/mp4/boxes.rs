//! Fixed-field decoders for the boxes the initialization segment walk reads.
//!
//! Each decoder takes a complete [`BoxRef`] and returns only the fields that
//! box carries. Trailing fixed fields nobody consumes are skipped without
//! validating their content, but they must be present.

use super::{AtomType, BoxCursor, BoxRef, FullBoxHeader};
use crate::{Error, Result};
use std::time::Duration;

/// Raw duration value meaning "cannot be determined" (all ones).
pub const UNKNOWN_DURATION: u64 = u64::MAX;

const MVHD_TRAILER: usize = 80;
const TKHD_TRAILER: usize = 60;
const MDHD_TRAILER: usize = 4;

/// Convert a raw duration in `timescale` units to whole milliseconds,
/// truncating. Returns `None` for the unknown sentinel or a zero timescale.
pub fn media_time_to_duration(raw: u64, timescale: u32) -> Option<Duration> {
    if raw == UNKNOWN_DURATION || timescale == 0 {
        return None;
    }
    let millis = u128::from(raw) * 1000 / u128::from(timescale);
    Some(Duration::from_millis(u64::try_from(millis).unwrap_or(u64::MAX)))
}

fn check_version(full: &FullBoxHeader) -> Result<()> {
    match full.version {
        0 | 1 => Ok(()),
        version => Err(Error::UnsupportedVersion {
            atom_type: full.header.atom_type,
            version,
        }),
    }
}

/// Read a version-dependent time value: 32 bits for v0, 64 bits for v1.
fn read_time(cursor: &mut BoxCursor<'_>, version: u8) -> Result<u64> {
    if version == 1 {
        cursor.read_u64()
    } else {
        cursor.read_u32().map(u64::from)
    }
}

/// Like [`read_time`], normalizing a v0 all-ones value to [`UNKNOWN_DURATION`].
fn read_duration(cursor: &mut BoxCursor<'_>, version: u8) -> Result<u64> {
    if version == 1 {
        cursor.read_u64()
    } else {
        let raw = cursor.read_u32()?;
        Ok(if raw == u32::MAX {
            UNKNOWN_DURATION
        } else {
            u64::from(raw)
        })
    }
}

/// `ftyp`: major brand, minor version and compatible brands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileTypeBox {
    pub major_brand: AtomType,
    pub minor_version: u32,
    pub compatible_brands: Vec<AtomType>,
}

impl FileTypeBox {
    pub fn decode(entry: &BoxRef<'_>) -> Result<Self> {
        let mut cursor = entry.cursor();
        let major_brand = cursor.read_fourcc()?;
        let minor_version = cursor.read_u32()?;
        let count = cursor.remaining() / 4;
        let compatible_brands = (0..count)
            .map(|_| cursor.read_fourcc())
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            major_brand,
            minor_version,
            compatible_brands,
        })
    }
}

/// `mvhd`: movie timescale and duration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MovieHeaderBox {
    pub version: u8,
    pub creation_time: u64,
    pub modification_time: u64,
    pub timescale: u32,
    /// Raw duration in `timescale` units, or [`UNKNOWN_DURATION`].
    pub duration: u64,
}

impl MovieHeaderBox {
    pub fn decode(entry: &BoxRef<'_>) -> Result<Self> {
        let (full, mut cursor) = entry.full()?;
        check_version(&full)?;
        let creation_time = read_time(&mut cursor, full.version)?;
        let modification_time = read_time(&mut cursor, full.version)?;
        let timescale = cursor.read_u32()?;
        let duration = read_duration(&mut cursor, full.version)?;
        // rate, volume, reserved, matrix, pre_defined, next_track_ID
        cursor.skip(MVHD_TRAILER)?;

        if timescale == 0 {
            return Err(Error::ZeroTimescale(AtomType::MVHD));
        }
        Ok(Self {
            version: full.version,
            creation_time,
            modification_time,
            timescale,
            duration,
        })
    }

    pub fn duration(&self) -> Option<Duration> {
        media_time_to_duration(self.duration, self.timescale)
    }
}

/// `tkhd`: track id, duration in movie timescale units, enabled flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrackHeaderBox {
    pub version: u8,
    pub flags: u32,
    pub track_id: u32,
    pub duration: u64,
}

impl TrackHeaderBox {
    pub const FLAG_ENABLED: u32 = 0x000001;

    pub fn decode(entry: &BoxRef<'_>) -> Result<Self> {
        let (full, mut cursor) = entry.full()?;
        check_version(&full)?;
        read_time(&mut cursor, full.version)?;
        read_time(&mut cursor, full.version)?;
        let track_id = cursor.read_u32()?;
        cursor.skip(4)?;
        let duration = read_duration(&mut cursor, full.version)?;
        cursor.skip(TKHD_TRAILER)?;

        Ok(Self {
            version: full.version,
            flags: full.flags,
            track_id,
            duration,
        })
    }

    pub fn is_enabled(&self) -> bool {
        self.flags & Self::FLAG_ENABLED != 0
    }
}

/// `mdhd`: the track's own timescale and duration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MediaHeaderBox {
    pub version: u8,
    pub timescale: u32,
    pub duration: u64,
}

impl MediaHeaderBox {
    pub fn decode(entry: &BoxRef<'_>) -> Result<Self> {
        let (full, mut cursor) = entry.full()?;
        check_version(&full)?;
        read_time(&mut cursor, full.version)?;
        read_time(&mut cursor, full.version)?;
        let timescale = cursor.read_u32()?;
        let duration = read_duration(&mut cursor, full.version)?;
        // language + pre_defined
        cursor.skip(MDHD_TRAILER)?;

        if timescale == 0 {
            return Err(Error::ZeroTimescale(AtomType::MDHD));
        }
        Ok(Self {
            version: full.version,
            timescale,
            duration,
        })
    }
}

/// `hdlr`: handler type. The name is consumed, not retained.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HandlerBox {
    pub handler_type: AtomType,
}

impl HandlerBox {
    pub fn decode(entry: &BoxRef<'_>) -> Result<Self> {
        let (_, mut cursor) = entry.full()?;
        cursor.skip(4)?;
        let handler_type = cursor.read_fourcc()?;
        cursor.skip(12)?;
        cursor.read_null_terminated();
        Ok(Self { handler_type })
    }
}

/// Entry count of a sample table box that must be empty in an
/// initialization segment. For `stsz` this is the sample count, which
/// follows the default sample size.
pub fn sample_table_entry_count(entry: &BoxRef<'_>) -> Result<u32> {
    let (_, mut cursor) = entry.full()?;
    if entry.atom_type() == AtomType::STSZ {
        cursor.skip(4)?;
    }
    cursor.read_u32()
}

//! Box type codes, header definitions and non-consuming header peeks.

use std::fmt;

/// Size of a plain box header (32-bit size + four-character type).
pub const BOX_HEADER_SIZE: usize = 8;

/// Size of a full box header (box header + version + 24-bit flags).
pub const FULL_BOX_HEADER_SIZE: usize = 12;

/// Four-character box type code.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct AtomType(pub [u8; 4]);

impl AtomType {
    // File level
    pub const FTYP: Self = Self(*b"ftyp");
    pub const STYP: Self = Self(*b"styp");
    pub const PDIN: Self = Self(*b"pdin");
    pub const FREE: Self = Self(*b"free");
    pub const SKIP: Self = Self(*b"skip");
    pub const SIDX: Self = Self(*b"sidx");
    pub const SSIX: Self = Self(*b"ssix");
    pub const PRFT: Self = Self(*b"prft");
    pub const EMSG: Self = Self(*b"emsg");
    pub const MOOV: Self = Self(*b"moov");
    pub const MOOF: Self = Self(*b"moof");
    pub const MDAT: Self = Self(*b"mdat");

    // Movie
    pub const MVHD: Self = Self(*b"mvhd");
    pub const TRAK: Self = Self(*b"trak");
    pub const MVEX: Self = Self(*b"mvex");
    pub const TREX: Self = Self(*b"trex");
    pub const UDTA: Self = Self(*b"udta");
    pub const IPMC: Self = Self(*b"ipmc");

    // Track
    pub const TKHD: Self = Self(*b"tkhd");
    pub const EDTS: Self = Self(*b"edts");
    pub const MDIA: Self = Self(*b"mdia");
    pub const MDHD: Self = Self(*b"mdhd");
    pub const HDLR: Self = Self(*b"hdlr");
    pub const MINF: Self = Self(*b"minf");
    pub const VMHD: Self = Self(*b"vmhd");
    pub const SMHD: Self = Self(*b"smhd");
    pub const HMHD: Self = Self(*b"hmhd");
    pub const NMHD: Self = Self(*b"nmhd");
    pub const DINF: Self = Self(*b"dinf");
    pub const STBL: Self = Self(*b"stbl");

    // Sample table
    pub const STSD: Self = Self(*b"stsd");
    pub const STTS: Self = Self(*b"stts");
    pub const CTTS: Self = Self(*b"ctts");
    pub const STSS: Self = Self(*b"stss");
    pub const STSH: Self = Self(*b"stsh");
    pub const STSC: Self = Self(*b"stsc");
    pub const STSZ: Self = Self(*b"stsz");
    pub const STZ2: Self = Self(*b"stz2");
    pub const STCO: Self = Self(*b"stco");
    pub const CO64: Self = Self(*b"co64");
    pub const PADB: Self = Self(*b"padb");
    pub const SBGP: Self = Self(*b"sbgp");
    pub const SGPD: Self = Self(*b"sgpd");
    pub const SUBS: Self = Self(*b"subs");
    pub const STDP: Self = Self(*b"stdp");
    pub const SDTP: Self = Self(*b"sdtp");

    // Fragments
    pub const MFHD: Self = Self(*b"mfhd");
    pub const TRAF: Self = Self(*b"traf");
    pub const TFHD: Self = Self(*b"tfhd");
    pub const TFDT: Self = Self(*b"tfdt");
    pub const TRUN: Self = Self(*b"trun");

    /// Create from bytes.
    pub fn from_bytes(bytes: [u8; 4]) -> Self {
        Self(bytes)
    }

    /// Create from the big-endian integer value of the code.
    pub fn from_u32(value: u32) -> Self {
        Self(value.to_be_bytes())
    }

    /// The big-endian integer value of the code (`ftyp` is `0x66747970`).
    pub fn as_u32(&self) -> u32 {
        u32::from_be_bytes(self.0)
    }

    /// Get the 4-char code as a string.
    pub fn as_str(&self) -> &str {
        std::str::from_utf8(&self.0).unwrap_or("????")
    }
}

impl fmt::Display for AtomType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl fmt::Debug for AtomType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AtomType({:?})", self.as_str())
    }
}

/// A fixed-size header that can be decoded from the front of a byte slice.
pub trait Header: Sized {
    /// Number of bytes the header occupies.
    const SIZE: usize;

    /// Decode from a slice of at least `SIZE` bytes. Returns `None` for a
    /// header this reader does not accept (a size field of zero).
    fn decode(bytes: &[u8]) -> Option<Self>;
}

/// Plain box header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BoxHeader {
    /// Box size including the header.
    pub size: u32,
    /// Box type code.
    pub atom_type: AtomType,
}

impl BoxHeader {
    /// Size of the box body (size - header).
    pub fn body_size(&self) -> usize {
        (self.size as usize).saturating_sub(BOX_HEADER_SIZE)
    }
}

impl Header for BoxHeader {
    const SIZE: usize = BOX_HEADER_SIZE;

    fn decode(bytes: &[u8]) -> Option<Self> {
        let bytes: &[u8; BOX_HEADER_SIZE] = bytes.get(..BOX_HEADER_SIZE)?.try_into().ok()?;
        let size = u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
        // Size 0 means "extends to end of file", which a stream never has.
        if size == 0 {
            return None;
        }
        Some(Self {
            size,
            atom_type: AtomType([bytes[4], bytes[5], bytes[6], bytes[7]]),
        })
    }
}

/// Full box header: box header plus version and 24-bit flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FullBoxHeader {
    pub header: BoxHeader,
    pub version: u8,
    pub flags: u32,
}

impl Header for FullBoxHeader {
    const SIZE: usize = FULL_BOX_HEADER_SIZE;

    fn decode(bytes: &[u8]) -> Option<Self> {
        let header = BoxHeader::decode(bytes)?;
        let rest = bytes.get(BOX_HEADER_SIZE..FULL_BOX_HEADER_SIZE)?;
        Some(Self {
            header,
            version: rest[0],
            flags: u32::from_be_bytes([0, rest[1], rest[2], rest[3]]),
        })
    }
}

/// Decode the header at `offset` without consuming anything.
///
/// Returns `None` if fewer than `H::SIZE` bytes remain from `offset` or if
/// the header's size field is zero.
pub fn peek_box<H: Header>(input: &[u8], offset: usize) -> Option<H> {
    let end = offset.checked_add(H::SIZE)?;
    H::decode(input.get(offset..end)?)
}

//! Byte cursor over a bounded input window.
//!
//! A cursor reading the front of an appended stream reports running out of
//! bytes as [`Error::Incomplete`]. A cursor opened inside a box whose declared
//! size is already fully available reports the same condition as
//! [`Error::Truncated`], because no amount of further input can fix it.

use super::{peek_box, AtomType, BoxHeader, FullBoxHeader, BOX_HEADER_SIZE};
use crate::{Error, Result};
use bytes::BytesMut;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Window {
    Stream,
    Box(AtomType),
}

/// Forward-only reader over a byte slice. Does not own the bytes.
#[derive(Debug, Clone)]
pub struct BoxCursor<'a> {
    data: &'a [u8],
    pos: usize,
    window: Window,
}

impl<'a> BoxCursor<'a> {
    /// Cursor over the front of a stream that may still grow.
    pub fn new(data: &'a [u8]) -> Self {
        Self {
            data,
            pos: 0,
            window: Window::Stream,
        }
    }

    /// Cursor over the complete body of `atom_type`.
    pub fn within(atom_type: AtomType, data: &'a [u8]) -> Self {
        Self {
            data,
            pos: 0,
            window: Window::Box(atom_type),
        }
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    pub fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    /// Bytes consumed so far.
    pub fn consumed(&self) -> &'a [u8] {
        &self.data[..self.pos]
    }

    fn shortfall(&self, len: usize) -> Error {
        match self.window {
            Window::Stream => Error::Incomplete {
                needed: self.pos.saturating_add(len),
                available: self.data.len(),
            },
            Window::Box(atom_type) => Error::Truncated { atom_type },
        }
    }

    /// Consume exactly `len` bytes.
    pub fn take(&mut self, len: usize) -> Result<&'a [u8]> {
        if self.remaining() < len {
            return Err(self.shortfall(len));
        }
        let bytes = &self.data[self.pos..self.pos + len];
        self.pos += len;
        Ok(bytes)
    }

    pub fn skip(&mut self, len: usize) -> Result<()> {
        self.take(len).map(|_| ())
    }

    pub fn read_u8(&mut self) -> Result<u8> {
        Ok(self.take(1)?[0])
    }

    pub fn read_u16(&mut self) -> Result<u16> {
        let b = self.take(2)?;
        Ok(u16::from_be_bytes([b[0], b[1]]))
    }

    pub fn read_u24(&mut self) -> Result<u32> {
        let b = self.take(3)?;
        Ok(u32::from_be_bytes([0, b[0], b[1], b[2]]))
    }

    pub fn read_u32(&mut self) -> Result<u32> {
        let b = self.take(4)?;
        Ok(u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }

    pub fn read_u64(&mut self) -> Result<u64> {
        let b = self.take(8)?;
        Ok(u64::from_be_bytes([
            b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7],
        ]))
    }

    pub fn read_fourcc(&mut self) -> Result<AtomType> {
        let b = self.take(4)?;
        Ok(AtomType([b[0], b[1], b[2], b[3]]))
    }

    /// Consume a NUL-terminated string, terminator included. A string that
    /// runs to the end of the window without a terminator is consumed whole.
    pub fn read_null_terminated(&mut self) -> &'a [u8] {
        let rest = &self.data[self.pos..];
        match rest.iter().position(|&b| b == 0) {
            Some(nul) => {
                self.pos += nul + 1;
                &rest[..nul]
            }
            None => {
                self.pos = self.data.len();
                rest
            }
        }
    }

    /// Decode the next box header without consuming it.
    pub fn peek_header(&self) -> Result<BoxHeader> {
        if self.remaining() < BOX_HEADER_SIZE {
            return Err(self.shortfall(BOX_HEADER_SIZE));
        }
        match peek_box::<BoxHeader>(self.data, self.pos) {
            Some(header) if header.size as usize >= BOX_HEADER_SIZE => Ok(header),
            _ => {
                let raw = &self.data[self.pos..self.pos + BOX_HEADER_SIZE];
                Err(Error::InvalidSize {
                    atom_type: AtomType([raw[4], raw[5], raw[6], raw[7]]),
                    size: u32::from_be_bytes([raw[0], raw[1], raw[2], raw[3]]),
                })
            }
        }
    }

    /// Read the next box header and its whole body.
    ///
    /// The full declared size must be available; otherwise the window's
    /// shortfall error is returned and nothing is consumed.
    pub fn read_box(&mut self) -> Result<BoxRef<'a>> {
        let header = self.peek_header()?;
        let bytes = self.take(header.size as usize)?;
        Ok(BoxRef {
            header,
            body: &bytes[BOX_HEADER_SIZE..],
        })
    }

    /// Like [`read_box`](Self::read_box), additionally appending every
    /// consumed byte to `out_raw` so the exact wire bytes can be forwarded.
    pub fn read_and_consume(&mut self, out_raw: &mut BytesMut) -> Result<BoxRef<'a>> {
        let start = self.pos;
        let entry = self.read_box()?;
        out_raw.extend_from_slice(&self.data[start..self.pos]);
        Ok(entry)
    }
}

/// A box whose whole body is available.
#[derive(Debug, Clone, Copy)]
pub struct BoxRef<'a> {
    pub header: BoxHeader,
    pub body: &'a [u8],
}

impl<'a> BoxRef<'a> {
    pub fn atom_type(&self) -> AtomType {
        self.header.atom_type
    }

    /// Total size including the header.
    pub fn size(&self) -> usize {
        self.header.size as usize
    }

    /// Cursor over the body.
    pub fn cursor(&self) -> BoxCursor<'a> {
        BoxCursor::within(self.header.atom_type, self.body)
    }

    /// Decode version and flags, returning a cursor positioned after them.
    pub fn full(&self) -> Result<(FullBoxHeader, BoxCursor<'a>)> {
        let mut cursor = self.cursor();
        let version = cursor.read_u8()?;
        let flags = cursor.read_u24()?;
        Ok((
            FullBoxHeader {
                header: self.header,
                version,
                flags,
            },
            cursor,
        ))
    }

    /// Iterate the child boxes of a container box.
    pub fn children(&self) -> Children<'a> {
        Children {
            cursor: self.cursor(),
            failed: false,
        }
    }
}

/// Iterator over child boxes. Stops after the first error.
#[derive(Debug)]
pub struct Children<'a> {
    cursor: BoxCursor<'a>,
    failed: bool,
}

impl<'a> Iterator for Children<'a> {
    type Item = Result<BoxRef<'a>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed || self.cursor.is_empty() {
            return None;
        }
        match self.cursor.read_box() {
            Ok(entry) => Some(Ok(entry)),
            Err(err) => {
                self.failed = true;
                Some(Err(err))
            }
        }
    }
}

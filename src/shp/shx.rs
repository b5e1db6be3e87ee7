//! The ".shx" index: a copy of the ".shp" header (with its own file length),
//! then one 8-byte big-endian entry per record.

use std::io;

use byteorder::{BigEndian, ByteOrder, WriteBytesExt};

use super::header::{ShapefileHeader, SHP_HEADER_LENGTH};
use super::ShpError;

pub const SHX_ENTRY_LENGTH: usize = 8;

/// Where one ".shp" record lives, in 16-bit words.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShxEntry {
    /// Start of the record header, from the start of the ".shp"
    pub offset: u32,
    /// Same as the record header's content length
    pub content_length: u32,
}

impl ShxEntry {
    pub fn parse(buf: &[u8]) -> ShxEntry {
        ShxEntry {
            offset: BigEndian::read_u32(&buf[0..4]),
            content_length: BigEndian::read_u32(&buf[4..8]),
        }
    }

    pub fn write<W: io::Write + ?Sized>(&self, w: &mut W) -> Result<(), ShpError> {
        w.write_u32::<BigEndian>(self.offset)?;
        w.write_u32::<BigEndian>(self.content_length)?;
        Ok(())
    }

    /// Byte offset of the record header within the ".shp".
    pub fn byte_offset(&self) -> u64 {
        self.offset as u64 * 2
    }
}

/// Iterates over index entries.
pub struct ShxReader<R: io::Read> {
    file: R,
    header: ShapefileHeader,
    n_entries: usize,
    n_entries_read: usize,
}

impl<R: io::Read> ShxReader<R> {
    pub fn new(mut file: R) -> Result<ShxReader<R>, ShpError> {
        let header = ShapefileHeader::read(&mut file)?;
        let n_entry_bytes = header.file_n_bytes() - SHP_HEADER_LENGTH;
        if n_entry_bytes % SHX_ENTRY_LENGTH != 0 {
            return Err(ShpError::CorruptHeader(format!(".shx file length {} words is not a whole number of entries", header.file_length)));
        }
        Ok(ShxReader {
            file: file,
            header: header,
            n_entries: n_entry_bytes / SHX_ENTRY_LENGTH,
            n_entries_read: 0,
        })
    }

    pub fn header(&self) -> &ShapefileHeader {
        &self.header
    }

    /// Number of entries the header's file length implies.
    pub fn len(&self) -> usize {
        self.n_entries
    }

    pub fn is_empty(&self) -> bool {
        self.n_entries == 0
    }

    fn read_entry(&mut self) -> Result<ShxEntry, ShpError> {
        let mut buf = [0u8; SHX_ENTRY_LENGTH];
        match self.file.read_exact(&mut buf) {
            Ok(()) => Ok(ShxEntry::parse(&buf)),
            Err(ref err) if err.kind() == io::ErrorKind::UnexpectedEof => {
                Err(ShpError::UnexpectedEnd { record: self.n_entries_read as u32 })
            }
            Err(err) => Err(ShpError::Io(err)),
        }
    }
}

impl<R: io::Read> Iterator for ShxReader<R> {
    type Item = Result<ShxEntry, ShpError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.n_entries_read == self.n_entries {
            return None;
        }
        self.n_entries_read += 1;
        let result = self.read_entry();
        if result.is_err() {
            self.n_entries_read = self.n_entries;
        }
        Some(result)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let n = self.n_entries - self.n_entries_read;
        (n, Some(n))
    }
}

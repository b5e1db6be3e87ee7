//! Reads and writes xBase ".dbf" files, as per
//! https://www.clicketyclick.dk/databases/xbase/format/dbf.html
//!
//! Only the dBASE III flavor Shapefiles use is supported: Character, Number,
//! Logical and Date columns.

use std::fs;
use std::io;
use std::path::Path;

use byteorder::WriteBytesExt;
use encoding::EncodingRef;
use thiserror::Error;
use tracing::{debug, trace, warn};

use crate::error::ErrorKind;

pub mod header;
pub mod record;

pub use self::header::{DbaseFieldDescriptor, DbaseFieldType, DbaseFileHeader};
pub use self::record::{decode_record, encode_record, DbfRecord, FieldValue};

pub const DBF_END_OF_FILE: u8 = 0x1A;

#[derive(Debug, Error)]
pub enum DbfError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("corrupt .dbf header: {0}")]
    CorruptHeader(String),

    #[error("corrupt .dbf record {record}, field '{field}': {reason}")]
    CorruptRecord {
        /// 1-based; 0 when the record codec is used on its own
        record: usize,
        field: String,
        reason: String,
    },

    #[error(".dbf ends before record {record}, but its header promises more")]
    UnexpectedEnd { record: usize },

    #[error("schema violation: {0}")]
    SchemaViolation(String),

    #[error(".dbf header declares {declared} records, but {written} were written")]
    RecordCount { declared: usize, written: usize },

    #[error("an earlier write failed, so the .dbf is incomplete")]
    WriteFailed,
}

impl DbfError {
    pub fn kind(&self) -> ErrorKind {
        match *self {
            DbfError::Io(_) => ErrorKind::Io,
            DbfError::CorruptHeader(_) => ErrorKind::CorruptHeader,
            DbfError::CorruptRecord { .. } => ErrorKind::CorruptRecord,
            DbfError::UnexpectedEnd { .. } => ErrorKind::StreamDesynchronization,
            DbfError::SchemaViolation(_) => ErrorKind::SchemaViolation,
            DbfError::RecordCount { .. } => ErrorKind::RecordCount,
            DbfError::WriteFailed => ErrorKind::Io,
        }
    }

    fn at_record(self, n: usize) -> DbfError {
        match self {
            DbfError::CorruptRecord { field, reason, .. } => DbfError::CorruptRecord { record: n, field: field, reason: reason },
            other => other,
        }
    }
}

/// Reads one record per `next()`, up to the count in the header.
///
/// Bytes after the last record (the 0x1A marker, or garbage) are never read.
pub struct DbfReader<R: io::Read> {
    file: R,
    header: DbaseFileHeader,
    encoding: EncodingRef,
    buf: Vec<u8>,
    n_records_already_iterated: usize,
}

impl<R: io::Read> DbfReader<R> {
    pub fn new(mut file: R, encoding: EncodingRef) -> Result<DbfReader<R>, DbfError> {
        let header = DbaseFileHeader::read(&mut file)?;
        let buf = vec![0u8; header.record_length()];
        Ok(DbfReader {
            file: file,
            header: header,
            encoding: encoding,
            buf: buf,
            n_records_already_iterated: 0,
        })
    }

    pub fn header(&self) -> &DbaseFileHeader {
        &self.header
    }

    pub fn fields(&self) -> &[DbaseFieldDescriptor] {
        self.header.fields()
    }

    pub fn get_field(&self, name: &str) -> Option<&DbaseFieldDescriptor> {
        self.header.field(name)
    }

    /// Records not yet read.
    pub fn remaining(&self) -> usize {
        self.header.num_records() - self.n_records_already_iterated
    }

    pub fn into_inner(self) -> R {
        self.file
    }

    fn read_record(&mut self) -> Result<DbfRecord, DbfError> {
        let n = self.n_records_already_iterated;
        match self.file.read_exact(&mut self.buf) {
            Ok(()) => {}
            Err(ref err) if err.kind() == io::ErrorKind::UnexpectedEof => {
                return Err(DbfError::UnexpectedEnd { record: n });
            }
            Err(err) => return Err(DbfError::Io(err)),
        }

        let (deleted, values) = decode_record(&self.buf, self.header.fields(), self.encoding)
            .map_err(|err| err.at_record(n))?;
        trace!(record = n, deleted, "read .dbf record");
        Ok(DbfRecord::from_values(self.header.fields(), deleted, values))
    }
}

impl<R: io::Read + io::Seek> DbfReader<R> {
    /// Rewinds to the first record.
    pub fn reset(&mut self) -> Result<(), DbfError> {
        self.file.seek(io::SeekFrom::Start(self.header.header_length() as u64))?;
        self.n_records_already_iterated = 0;
        Ok(())
    }
}

impl<R: io::Read> Iterator for DbfReader<R> {
    type Item = Result<DbfRecord, DbfError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.n_records_already_iterated == self.header.num_records() {
            None
        } else {
            self.n_records_already_iterated += 1;
            Some(self.read_record())
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (0, Some(self.remaining()))
    }
}

/// Writes the header on construction, then one record per `write()`.
///
/// The header's record count is a promise: `finish()` fails unless exactly
/// that many records were written.
pub struct DbfWriter<W: io::Write> {
    file: W,
    header: DbaseFileHeader,
    encoding: EncodingRef,
    n_records_written: usize,
    n_records_refused: usize,
    failed: bool,
}

impl<W: io::Write> DbfWriter<W> {
    pub fn new(mut file: W, header: DbaseFileHeader, encoding: EncodingRef) -> Result<DbfWriter<W>, DbfError> {
        header.write(&mut file)?;
        debug!(num_records = header.num_records(), num_fields = header.fields().len(), "wrote .dbf header");
        Ok(DbfWriter {
            file: file,
            header: header,
            encoding: encoding,
            n_records_written: 0,
            n_records_refused: 0,
            failed: false,
        })
    }

    pub fn header(&self) -> &DbaseFileHeader {
        &self.header
    }

    pub fn n_records_written(&self) -> usize {
        self.n_records_written
    }

    /// Encodes the record before writing anything, so a rejected value leaves
    /// the file untouched. Keeps the record's deletion flag.
    pub fn encode(&self, record: &DbfRecord) -> Result<Vec<u8>, DbfError> {
        let values = record.values_for(self.header.fields())?;
        let mut bytes = encode_record(&values, self.header.fields(), self.encoding)?;
        if record.is_deleted() {
            bytes[0] = record::DBF_RECORD_DELETED;
        }
        Ok(bytes)
    }

    /// Checks the declared count, then writes bytes from `encode()`.
    ///
    /// After a failed write the file may end in part of a record, so every
    /// later call (and `finish()`) fails with `DbfError::WriteFailed`.
    pub fn write_encoded(&mut self, bytes: &[u8]) -> Result<(), DbfError> {
        if self.failed {
            return Err(DbfError::WriteFailed);
        }
        if self.n_records_written == self.header.num_records() {
            self.n_records_refused += 1;
            return Err(DbfError::RecordCount {
                declared: self.header.num_records(),
                written: self.n_records_written + self.n_records_refused,
            });
        }
        if let Err(err) = self.file.write_all(bytes) {
            self.failed = true;
            warn!(record = self.n_records_written + 1, "failed writing .dbf record; refusing further writes");
            return Err(DbfError::Io(err));
        }
        self.n_records_written += 1;
        trace!(record = self.n_records_written, "wrote .dbf record");
        Ok(())
    }

    pub fn write(&mut self, record: &DbfRecord) -> Result<(), DbfError> {
        let bytes = self.encode(record)?;
        self.write_encoded(&bytes)
    }

    /// Writes the end-of-file marker and checks the record count.
    pub fn finish(mut self) -> Result<W, DbfError> {
        if self.failed {
            return Err(DbfError::WriteFailed);
        }
        self.file.write_u8(DBF_END_OF_FILE)?;
        self.file.flush()?;

        let written = self.n_records_written + self.n_records_refused;
        if written != self.header.num_records() {
            return Err(DbfError::RecordCount { declared: self.header.num_records(), written: written });
        }
        debug!(num_records = written, "finished .dbf");
        Ok(self.file)
    }
}

/// Opens a ".dbf" file from the filesystem.
pub fn open(path: &Path, encoding: EncodingRef) -> Result<DbfReader<io::BufReader<fs::File>>, DbfError> {
    let f = fs::File::open(path)?;
    DbfReader::new(io::BufReader::new(f), encoding)
}

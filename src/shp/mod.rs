//! Reads and writes ".shp" geometry files and their ".shx" indexes, as per
//! https://www.esri.com/library/whitepapers/pdfs/shapefile.pdf
//!
//! MultiPatch is not supported.

use std::fs;
use std::io;
use std::path::Path;

use thiserror::Error;
use tracing::{debug, trace, warn};

use crate::error::ErrorKind;

pub mod header;
pub mod record;
pub mod shx;

pub use self::header::{BoundingBox, ShapeKind, ShapeType, ShapefileHeader, SHP_HEADER_LENGTH};
pub use self::record::{decode_shape, encode_record, encode_shape, read_record, read_record_within, Shape, ShpPoint, ShpRecord, SHP_RECORD_HEADER_LENGTH};
pub use self::shx::{ShxEntry, ShxReader};

#[derive(Debug, Error)]
pub enum ShpError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("corrupt header: {0}")]
    CorruptHeader(String),

    #[error("corrupt .shp record {record}: {reason}")]
    CorruptRecord { record: u32, reason: String },

    #[error("expected .shp record {expected}, found record number {found}")]
    RecordNumber { expected: u32, found: i32 },

    #[error(".shp ends in the middle of record {record}")]
    UnexpectedEnd { record: u32 },

    #[error("schema violation: {0}")]
    SchemaViolation(String),

    #[error(".shp writer declared {declared} records, but {written} were written")]
    RecordCount { declared: usize, written: usize },

    #[error("an earlier write failed, so the .shp and .shx are incomplete")]
    WriteFailed,
}

impl ShpError {
    pub fn kind(&self) -> ErrorKind {
        match *self {
            ShpError::Io(_) => ErrorKind::Io,
            ShpError::CorruptHeader(_) => ErrorKind::CorruptHeader,
            ShpError::CorruptRecord { .. } => ErrorKind::CorruptRecord,
            ShpError::RecordNumber { .. } => ErrorKind::CorruptRecord,
            ShpError::UnexpectedEnd { .. } => ErrorKind::StreamDesynchronization,
            ShpError::SchemaViolation(_) => ErrorKind::SchemaViolation,
            ShpError::RecordCount { .. } => ErrorKind::RecordCount,
            ShpError::WriteFailed => ErrorKind::Io,
        }
    }
}

/// Reads records up to the file length in the header.
///
/// After the last record, or after any error, `next()` returns `None`.
pub struct ShpReader<R: io::Read> {
    file: R,
    header: ShapefileHeader,
    validate_bounding_boxes: bool,
    n_bytes_read: usize,
    n_records_read: u32,
    done: bool,
}

impl<R: io::Read> ShpReader<R> {
    pub fn new(mut file: R) -> Result<ShpReader<R>, ShpError> {
        let header = ShapefileHeader::read(&mut file)?;
        Ok(ShpReader {
            file: file,
            header: header,
            validate_bounding_boxes: false,
            n_bytes_read: SHP_HEADER_LENGTH,
            n_records_read: 0,
            done: false,
        })
    }

    /// Makes each record's stored bounding box a checked claim.
    pub fn validate_bounding_boxes(&mut self, validate: bool) {
        self.validate_bounding_boxes = validate;
    }

    pub fn header(&self) -> &ShapefileHeader {
        &self.header
    }

    pub fn shape_type(&self) -> ShapeType {
        self.header.shape_type
    }

    /// True when the header's file length leaves room for no records.
    pub fn is_empty(&self) -> bool {
        self.header.file_n_bytes() <= SHP_HEADER_LENGTH
    }

    pub fn n_records_read(&self) -> u32 {
        self.n_records_read
    }

    pub fn into_inner(self) -> R {
        self.file
    }

    /// Reads one record and the index entry that should describe it.
    fn read_next(&mut self) -> Option<Result<(ShpRecord, ShxEntry), ShpError>> {
        if self.done {
            return None;
        }
        let result = self.read_one();
        match result {
            None | Some(Err(_)) => self.done = true,
            Some(Ok(_)) => {}
        }
        result
    }

    fn read_one(&mut self) -> Option<Result<(ShpRecord, ShxEntry), ShpError>> {
        let file_n_bytes = self.header.file_n_bytes();
        if self.n_bytes_read >= file_n_bytes {
            return None;
        }

        let n = self.n_records_read + 1;
        let remaining = file_n_bytes - self.n_bytes_read;
        if remaining < SHP_RECORD_HEADER_LENGTH {
            return Some(Err(ShpError::CorruptRecord {
                record: n,
                reason: format!("file length leaves {} bytes, too few for a record header", remaining),
            }));
        }

        let offset = (self.n_bytes_read / 2) as u32;
        let (record, n_bytes) = match read_record_within(&mut self.file, self.header.shape_type, n, self.validate_bounding_boxes, remaining) {
            Ok(r) => r,
            Err(err) => return Some(Err(err)),
        };

        self.n_bytes_read += n_bytes;
        self.n_records_read = n;
        trace!(record = n, shape_type = %record.shape.shape_type(), "read .shp record");

        let entry = ShxEntry { offset: offset, content_length: ((n_bytes - SHP_RECORD_HEADER_LENGTH) / 2) as u32 };
        Some(Ok((record, entry)))
    }
}

impl<R: io::Read + io::Seek> ShpReader<R> {
    /// Rewinds to the first record.
    pub fn reset(&mut self) -> Result<(), ShpError> {
        self.file.seek(io::SeekFrom::Start(SHP_HEADER_LENGTH as u64))?;
        self.n_bytes_read = SHP_HEADER_LENGTH;
        self.n_records_read = 0;
        self.done = false;
        debug!("rewound .shp");
        Ok(())
    }

    /// Reads every record and checks it against `shx`, then rewinds.
    ///
    /// Returns the number of records.
    pub fn verify_index<X: io::Read>(&mut self, mut shx: ShxReader<X>) -> Result<usize, ShpError> {
        if shx.header().shape_type != self.header.shape_type {
            return Err(ShpError::CorruptHeader(format!(
                ".shx says shape type {}, .shp says {}",
                shx.header().shape_type,
                self.header.shape_type
            )));
        }

        self.reset()?;
        let mut n = 0;
        loop {
            match (self.read_next(), shx.next()) {
                (None, None) => break,
                (Some(Ok((_, actual))), Some(Ok(indexed))) => {
                    n += 1;
                    if actual != indexed {
                        return Err(ShpError::CorruptRecord {
                            record: n as u32,
                            reason: format!("index says {:?}, .shp has {:?}", indexed, actual),
                        });
                    }
                }
                (Some(Err(err)), _) | (_, Some(Err(err))) => return Err(err),
                (Some(Ok(_)), None) | (None, Some(Ok(_))) => {
                    return Err(ShpError::CorruptHeader(format!(
                        ".shx lists {} records, but .shp has a different number",
                        shx.len()
                    )));
                }
            }
        }
        self.reset()?;
        Ok(n)
    }
}

impl<R: io::Read> Iterator for ShpReader<R> {
    type Item = Result<ShpRecord, ShpError>;

    fn next(&mut self) -> Option<Self::Item> {
        self.read_next().map(|r| r.map(|(record, _)| record))
    }
}

/// A record encoded by `ShpWriter::encode()`, ready to append.
#[derive(Debug, Clone)]
pub struct EncodedRecord {
    bytes: Vec<u8>,
    bounding_box: Option<BoundingBox>,
}

/// Appends records to a ".shp" and its ".shx".
///
/// Both headers are written as placeholders, then overwritten by `finish()`
/// once the file length and bounding box are known. A writer dropped without
/// `finish()` leaves those placeholders, which describe an empty file.
///
/// Once a record fails to write, the streams may hold part of it: every later
/// `write()` and `finish()` fails with `ShpError::WriteFailed`.
pub struct ShpWriter<W: io::Write + io::Seek, X: io::Write + io::Seek> {
    shp: W,
    shx: X,
    shape_type: ShapeType,
    num_records: usize,
    n_records_written: usize,
    n_records_refused: usize,
    file_length: u64,
    bounding_box: Option<BoundingBox>,
    failed: bool,
}

impl<W: io::Write + io::Seek, X: io::Write + io::Seek> ShpWriter<W, X> {
    pub fn new(mut shp: W, mut shx: X, shape_type: ShapeType, num_records: usize) -> Result<ShpWriter<W, X>, ShpError> {
        let header = ShapefileHeader::new(shape_type);
        header.write(&mut shp)?;
        header.write(&mut shx)?;
        Ok(ShpWriter {
            shp: shp,
            shx: shx,
            shape_type: shape_type,
            num_records: num_records,
            n_records_written: 0,
            n_records_refused: 0,
            file_length: header.file_length as u64,
            bounding_box: None,
            failed: false,
        })
    }

    pub fn shape_type(&self) -> ShapeType {
        self.shape_type
    }

    pub fn n_records_written(&self) -> usize {
        self.n_records_written
    }

    /// Encodes `shape` as the next record, without writing it.
    pub fn encode(&self, shape: &Shape) -> Result<EncodedRecord, ShpError> {
        if shape.shape_type() != self.shape_type && !shape.is_null() {
            return Err(ShpError::SchemaViolation(format!("Cannot write a {} to a {} file", shape.shape_type(), self.shape_type)));
        }
        let record_number = self.n_records_written as u32 + 1;
        Ok(EncodedRecord {
            bytes: encode_record(record_number, shape)?,
            bounding_box: if shape.is_null() { None } else { Some(shape.bounding_box()) },
        })
    }

    /// Checks the declared count, then appends a record from `encode()`.
    pub fn write_encoded(&mut self, record: EncodedRecord) -> Result<(), ShpError> {
        if self.failed {
            return Err(ShpError::WriteFailed);
        }
        if self.n_records_written == self.num_records {
            self.n_records_refused += 1;
            return Err(ShpError::RecordCount {
                declared: self.num_records,
                written: self.n_records_written + self.n_records_refused,
            });
        }

        let n_words = (record.bytes.len() / 2) as u64;
        if self.file_length + n_words > i32::max_value() as u64 {
            return Err(ShpError::SchemaViolation(String::from("Records do not fit in a .shp file's 32-bit length")));
        }

        let entry = ShxEntry { offset: self.file_length as u32, content_length: n_words as u32 - 4 };
        let result = match self.shp.write_all(&record.bytes) {
            Ok(()) => entry.write(&mut self.shx),
            Err(err) => Err(ShpError::Io(err)),
        };
        if let Err(err) = result {
            self.failed = true;
            warn!(record = self.n_records_written + 1, "failed writing .shp record; refusing further writes");
            return Err(err);
        }

        self.file_length += n_words;
        self.n_records_written += 1;
        if let Some(bbox) = record.bounding_box {
            self.bounding_box = Some(match self.bounding_box {
                Some(total) => total.union(&bbox),
                None => bbox,
            });
        }
        trace!(record = self.n_records_written, n_words, "wrote .shp record");
        Ok(())
    }

    pub fn write(&mut self, shape: &Shape) -> Result<(), ShpError> {
        let record = self.encode(shape)?;
        self.write_encoded(record)
    }

    /// Overwrites both headers with final lengths and bounding box, and
    /// checks the record count.
    pub fn finish(mut self) -> Result<(W, X), ShpError> {
        if self.failed {
            return Err(ShpError::WriteFailed);
        }
        let shp_header = ShapefileHeader {
            file_length: self.file_length as u32,
            shape_type: self.shape_type,
            bounding_box: self.bounding_box.unwrap_or_default(),
        };
        let shx_header = ShapefileHeader {
            file_length: (SHP_HEADER_LENGTH + shx::SHX_ENTRY_LENGTH * self.n_records_written) as u32 / 2,
            ..shp_header
        };

        self.shp.seek(io::SeekFrom::Start(0))?;
        shp_header.write(&mut self.shp)?;
        self.shp.seek(io::SeekFrom::End(0))?;
        self.shp.flush()?;

        self.shx.seek(io::SeekFrom::Start(0))?;
        shx_header.write(&mut self.shx)?;
        self.shx.seek(io::SeekFrom::End(0))?;
        self.shx.flush()?;

        let written = self.n_records_written + self.n_records_refused;
        if written != self.num_records {
            return Err(ShpError::RecordCount { declared: self.num_records, written: written });
        }
        debug!(num_records = written, file_length = shp_header.file_length, "finished .shp and .shx");
        Ok((self.shp, self.shx))
    }
}

/// Opens a ".shp" file from the filesystem.
pub fn open(path: &Path) -> Result<ShpReader<io::BufReader<fs::File>>, ShpError> {
    let f = fs::File::open(path)?;
    ShpReader::new(io::BufReader::new(f))
}

#[cfg(test)]
mod test {
    use std::io::{Cursor, Seek, Write};

    use byteorder::{BigEndian, ByteOrder, LittleEndian};

    use super::*;

    fn points() -> Vec<Shape> {
        vec![Shape::point(1., 2.), Shape::null(), Shape::point(-3., 5.)]
    }

    fn written(shapes: &[Shape]) -> (Vec<u8>, Vec<u8>) {
        let mut writer = ShpWriter::new(Cursor::new(Vec::new()), Cursor::new(Vec::new()), ShapeType::Point, shapes.len()).unwrap();
        for shape in shapes {
            writer.write(shape).unwrap();
        }
        let (shp, shx) = writer.finish().unwrap();
        (shp.into_inner(), shx.into_inner())
    }

    #[test]
    fn write_then_read() {
        let (shp, shx) = written(&points());
        assert_eq!(100 + 28 + 12 + 28, shp.len());
        assert_eq!(100 + 3 * 8, shx.len());

        let reader = ShpReader::new(Cursor::new(shp)).unwrap();
        let header = *reader.header();
        assert_eq!((100 + 28 + 12 + 28) / 2, header.file_length);
        assert_eq!((-3., 2., 1., 5.), (header.bounding_box.x_min, header.bounding_box.y_min, header.bounding_box.x_max, header.bounding_box.y_max));

        let shapes: Vec<Shape> = reader.map(|r| r.unwrap().shape).collect();
        assert_eq!(points(), shapes);
    }

    #[test]
    fn index_matches_records() {
        let (shp, shx) = written(&points());
        assert_eq!(62, BigEndian::read_i32(&shx[24..28]));
        assert_eq!(1, LittleEndian::read_i32(&shx[32..36]));
        assert_eq!(&shp[36..100], &shx[36..100]);

        let index: Vec<ShxEntry> = ShxReader::new(Cursor::new(shx.clone())).unwrap().map(|e| e.unwrap()).collect();
        assert_eq!(vec![
            ShxEntry { offset: 50, content_length: 10 },
            ShxEntry { offset: 64, content_length: 2 },
            ShxEntry { offset: 70, content_length: 10 },
        ], index);

        let mut reader = ShpReader::new(Cursor::new(shp)).unwrap();
        assert_eq!(3, reader.verify_index(ShxReader::new(Cursor::new(shx)).unwrap()).unwrap());
        assert_eq!(3, reader.count());
    }

    #[test]
    fn stale_index() {
        let (shp, mut shx) = written(&points());
        BigEndian::write_u32(&mut shx[116..120], 51);
        let mut reader = ShpReader::new(Cursor::new(shp)).unwrap();
        assert!(matches!(
            reader.verify_index(ShxReader::new(Cursor::new(shx)).unwrap()),
            Err(ShpError::CorruptRecord { record: 3, .. })
        ));
    }

    #[test]
    fn ignores_bytes_past_file_length() {
        let (mut shp, _) = written(&points());
        shp.extend_from_slice(&[0, 0, 0, 4, 0, 0, 0, 2, 0, 0, 0, 0]);
        let reader = ShpReader::new(Cursor::new(shp)).unwrap();
        assert_eq!(3, reader.count());
    }

    #[test]
    fn empty_file() {
        let (shp, shx) = written(&[]);
        assert_eq!(100, shp.len());
        assert_eq!(100, shx.len());
        let reader = ShpReader::new(Cursor::new(shp)).unwrap();
        assert!(reader.is_empty());
        assert_eq!(BoundingBox::default(), reader.header().bounding_box);
        assert_eq!(0, reader.count());
    }

    #[test]
    fn stops_after_error() {
        let (mut shp, _) = written(&points());
        BigEndian::write_i32(&mut shp[128..132], 7);
        let mut reader = ShpReader::new(Cursor::new(shp)).unwrap();
        assert!(reader.next().unwrap().is_ok());
        assert!(matches!(reader.next(), Some(Err(ShpError::RecordNumber { expected: 2, found: 7 }))));
        assert!(reader.next().is_none());
    }

    #[test]
    fn record_past_file_length() {
        let (mut shp, _) = written(&points());
        BigEndian::write_i32(&mut shp[24..28], 75);
        let mut reader = ShpReader::new(Cursor::new(shp)).unwrap();
        assert!(reader.next().unwrap().is_ok());
        assert!(reader.next().unwrap().is_ok());
        assert!(matches!(reader.next(), Some(Err(ShpError::CorruptRecord { record: 3, .. }))));
    }

    #[test]
    fn oversized_content_length_is_corrupt() {
        let (mut shp, _) = written(&points());
        BigEndian::write_i32(&mut shp[104..108], 0x4000_0000);
        let mut reader = ShpReader::new(Cursor::new(shp)).unwrap();
        let err = reader.next().unwrap().unwrap_err();
        assert!(matches!(err, ShpError::CorruptRecord { record: 1, .. }));
        assert_eq!(ErrorKind::CorruptRecord, err.kind());
        assert!(reader.next().is_none());
    }

    #[test]
    fn truncated_file() {
        let (mut shp, _) = written(&points());
        shp.truncate(150);
        let mut reader = ShpReader::new(Cursor::new(shp)).unwrap();
        assert!(reader.next().unwrap().is_ok());
        assert!(reader.next().unwrap().is_ok());
        let err = reader.next().unwrap().unwrap_err();
        assert_eq!(ErrorKind::StreamDesynchronization, err.kind());
    }

    #[test]
    fn reset_rewinds() {
        let (shp, _) = written(&points());
        let mut reader = ShpReader::new(Cursor::new(shp)).unwrap();
        assert_eq!(3, reader.by_ref().count());
        reader.reset().unwrap();
        assert_eq!(Shape::point(1., 2.), reader.next().unwrap().unwrap().shape);
    }

    #[test]
    fn rejects_other_shape_types() {
        let mut writer = ShpWriter::new(Cursor::new(Vec::new()), Cursor::new(Vec::new()), ShapeType::Point, 1).unwrap();
        let line = Shape::from_parts(ShapeType::PolyLine, vec![vec![ShpPoint(0., 0.), ShpPoint(1., 1.)]], None, None).unwrap();
        assert!(matches!(writer.write(&line), Err(ShpError::SchemaViolation(_))));
        assert_eq!(0, writer.n_records_written());
        writer.write(&Shape::point(0., 0.)).unwrap();
        writer.finish().unwrap();
    }

    #[test]
    fn record_count_is_enforced() {
        let mut writer = ShpWriter::new(Cursor::new(Vec::new()), Cursor::new(Vec::new()), ShapeType::Point, 1).unwrap();
        writer.write(&Shape::point(0., 0.)).unwrap();
        assert!(matches!(writer.write(&Shape::point(1., 1.)), Err(ShpError::RecordCount { declared: 1, written: 2 })));

        let short = ShpWriter::new(Cursor::new(Vec::new()), Cursor::new(Vec::new()), ShapeType::Point, 2).unwrap();
        assert!(matches!(short.finish(), Err(ShpError::RecordCount { declared: 2, written: 0 })));
    }

    #[test]
    fn bounding_box_includes_origin() {
        let (shp, _) = written(&[Shape::point(0., 0.), Shape::point(2., 3.)]);
        let header = ShapefileHeader::parse(&shp).unwrap();
        assert_eq!((0., 0., 2., 3.), (header.bounding_box.x_min, header.bounding_box.y_min, header.bounding_box.x_max, header.bounding_box.y_max));

        let (shp, _) = written(&[Shape::point(5., 6.), Shape::point(2., 3.)]);
        let header = ShapefileHeader::parse(&shp).unwrap();
        assert_eq!((2., 3., 5., 6.), (header.bounding_box.x_min, header.bounding_box.y_min, header.bounding_box.x_max, header.bounding_box.y_max));
    }

    /// Accepts `capacity` bytes, then fails every write.
    struct FullDisk {
        inner: Cursor<Vec<u8>>,
        capacity: u64,
    }

    impl io::Write for FullDisk {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            if self.inner.position() + buf.len() as u64 > self.capacity {
                return Err(io::Error::new(io::ErrorKind::Other, "disk full"));
            }
            self.inner.write(buf)
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl io::Seek for FullDisk {
        fn seek(&mut self, pos: io::SeekFrom) -> io::Result<u64> {
            self.inner.seek(pos)
        }
    }

    #[test]
    fn failed_write_refuses_further_writes() {
        let shx = FullDisk { inner: Cursor::new(Vec::new()), capacity: 100 };
        let mut writer = ShpWriter::new(Cursor::new(Vec::new()), shx, ShapeType::Point, 2).unwrap();
        assert!(matches!(writer.write(&Shape::point(0., 0.)), Err(ShpError::Io(_))));

        let err = writer.write(&Shape::point(1., 1.)).unwrap_err();
        assert!(matches!(err, ShpError::WriteFailed));
        assert_eq!(ErrorKind::Io, err.kind());
        assert!(matches!(writer.finish(), Err(ShpError::WriteFailed)));
    }
}

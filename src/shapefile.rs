//! Reads and writes ".shp", ".shx" and ".dbf" in lockstep.
//!
//! The formats pair shapes with rows by position alone: record N of the
//! ".shp" belongs with row N of the ".dbf". Everything here exists to keep
//! the two streams aligned, and to fail loudly when they aren't.

use std::fmt;
use std::io;
use std::path::PathBuf;

use thiserror::Error;
use tracing::{debug, trace, warn};

use crate::dbf::{DbaseFieldDescriptor, DbaseFileHeader, DbfError, DbfReader, DbfRecord, DbfWriter};
use crate::error::ErrorKind;
use crate::geometry::{GeometryFactory, ShapeFactory};
use crate::options::ShapefileOptions;
use crate::shp::{ShapeType, ShapefileHeader, ShpError, ShpReader, ShpWriter, ShxReader};

/// Name of the column `columns()` puts ahead of the ".dbf" fields.
pub const GEOMETRY_COLUMN: &str = "geometry";

#[derive(Debug, Error)]
pub enum ShapefileError {
    #[error("{} does not exist", .0.display())]
    MissingFile(PathBuf),

    #[error(transparent)]
    Shp(#[from] ShpError),

    #[error(transparent)]
    Dbf(#[from] DbfError),

    #[error(".shp and .dbf disagree at record {record}: {reason}")]
    Desynchronized { record: usize, reason: String },

    #[error("an earlier write failed, so the .shp and .dbf are out of step")]
    WriteFailed,
}

impl ShapefileError {
    pub fn kind(&self) -> ErrorKind {
        match *self {
            ShapefileError::MissingFile(_) => ErrorKind::MissingFile,
            ShapefileError::Shp(ref err) => err.kind(),
            ShapefileError::Dbf(ref err) => err.kind(),
            ShapefileError::Desynchronized { .. } => ErrorKind::StreamDesynchronization,
            ShapefileError::WriteFailed => ErrorKind::Io,
        }
    }
}

/// One shape and its ".dbf" row.
#[derive(Debug, Clone, PartialEq)]
pub struct Feature<G> {
    pub geometry: G,
    pub attributes: DbfRecord,
}

impl<G> Feature<G> {
    pub fn new(geometry: G, attributes: DbfRecord) -> Feature<G> {
        Feature { geometry: geometry, attributes: attributes }
    }

    /// True when the ".dbf" row carries the deletion flag.
    pub fn is_deleted(&self) -> bool {
        self.attributes.is_deleted()
    }
}

impl<G: fmt::Display> fmt::Display for Feature<G> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{} {}", self.geometry, self.attributes)
    }
}

/// An entry in the combined schema.
#[derive(Debug, Clone, PartialEq)]
pub enum Column {
    Geometry(ShapeType),
    Field(DbaseFieldDescriptor),
}

impl Column {
    pub fn name(&self) -> &str {
        match *self {
            Column::Geometry(_) => GEOMETRY_COLUMN,
            Column::Field(ref field) => field.name(),
        }
    }
}

/// Iterates over ".shp" and ".dbf" records simultaneously.
///
/// Yields exactly as many features as the ".dbf" header declares. If either
/// stream runs out first, the call that notices fails with
/// `ShapefileError::Desynchronized`; after that, and after any other error,
/// `next()` returns `None`.
///
/// # Examples
///
/// ```
/// use std::io::Cursor;
/// use shapeio::{DbaseFieldDescriptor, DbaseFileHeader, DbfRecord, FieldValue, Shape, ShapeType};
/// use shapeio::{ShapefileOptions, ShapefileReader, ShapefileWriter};
///
/// let header = DbaseFileHeader::with_fields(vec![DbaseFieldDescriptor::character("NAME", 20).unwrap()], 1).unwrap();
/// let mut writer = ShapefileWriter::new(
///     Cursor::new(Vec::new()), Cursor::new(Vec::new()), Cursor::new(Vec::new()),
///     ShapeType::Point, header, ShapefileOptions::default(),
/// ).unwrap();
/// writer.write(&Shape::point(1., 2.), &DbfRecord::new().with("NAME", FieldValue::Character("A".to_string()))).unwrap();
/// let (shp, _shx, dbf) = writer.finish().unwrap();
///
/// let mut reader = ShapefileReader::new(Cursor::new(shp.into_inner()), Cursor::new(dbf.into_inner()), ShapefileOptions::default()).unwrap();
/// assert_eq!(1, reader.len());
/// assert_eq!("geometry", reader.columns()[0].name());
///
/// let feature = reader.next().unwrap().unwrap();
/// assert_eq!(Shape::point(1., 2.), feature.geometry);
/// assert_eq!(Some("A"), feature.attributes.get("NAME").and_then(|v| v.as_str()));
/// assert!(reader.next().is_none());
/// ```
pub struct ShapefileReader<R: io::Read, S: io::Read, F: GeometryFactory = ShapeFactory> {
    shp: ShpReader<R>,
    dbf: DbfReader<S>,
    factory: F,
    options: ShapefileOptions,
    columns: Vec<Column>,
    n_records_read: usize,
    done: bool,
}

impl<R: io::Read, S: io::Read> ShapefileReader<R, S, ShapeFactory> {
    pub fn new(shp: R, dbf: S, options: ShapefileOptions) -> Result<ShapefileReader<R, S, ShapeFactory>, ShapefileError> {
        ShapefileReader::with_factory(shp, dbf, ShapeFactory, options)
    }
}

impl<R: io::Read, S: io::Read, F: GeometryFactory> ShapefileReader<R, S, F> {
    /// Reads both headers, and checks they can describe the same records.
    pub fn with_factory(shp: R, dbf: S, factory: F, options: ShapefileOptions) -> Result<ShapefileReader<R, S, F>, ShapefileError> {
        let mut shp = ShpReader::new(shp)?;
        shp.validate_bounding_boxes(options.validate_bounding_boxes);
        let dbf = DbfReader::new(dbf, options.encoding)?;

        let num_records = dbf.header().num_records();
        if shp.is_empty() && num_records > 0 {
            return Err(ShapefileError::Desynchronized {
                record: 1,
                reason: format!(".shp has no records, but .dbf declares {}", num_records),
            });
        }
        if !shp.is_empty() && num_records == 0 {
            return Err(ShapefileError::Desynchronized {
                record: 1,
                reason: String::from(".dbf declares no records, but .shp has some"),
            });
        }

        let mut columns = Vec::with_capacity(1 + dbf.fields().len());
        columns.push(Column::Geometry(shp.shape_type()));
        columns.extend(dbf.fields().iter().cloned().map(Column::Field));

        debug!(num_records, shape_type = %shp.shape_type(), num_fields = dbf.fields().len(), "opened shapefile");

        Ok(ShapefileReader {
            shp: shp,
            dbf: dbf,
            factory: factory,
            options: options,
            columns: columns,
            n_records_read: 0,
            done: false,
        })
    }

    /// The geometry column, then every ".dbf" field in order.
    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn field(&self, name: &str) -> Option<&DbaseFieldDescriptor> {
        self.dbf.get_field(name)
    }

    /// Number of records, from the ".dbf" header.
    ///
    /// With `skip_deleted`, fewer features may be yielded.
    pub fn len(&self) -> usize {
        self.dbf.header().num_records()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn shape_type(&self) -> ShapeType {
        self.shp.shape_type()
    }

    pub fn shp_header(&self) -> &ShapefileHeader {
        self.shp.header()
    }

    pub fn dbf_header(&self) -> &DbaseFileHeader {
        self.dbf.header()
    }

    pub fn options(&self) -> &ShapefileOptions {
        &self.options
    }

    /// Ends the session and hands back the ".shp" and ".dbf" streams.
    pub fn close(self) -> (R, S) {
        debug!(n_records_read = self.n_records_read, "closed shapefile");
        (self.shp.into_inner(), self.dbf.into_inner())
    }

    fn desynchronized(&self, record: usize, reason: String) -> Option<Result<Feature<F::Geometry>, ShapefileError>> {
        Some(Err(ShapefileError::Desynchronized { record: record, reason: reason }))
    }

    fn read_feature(&mut self) -> Option<Result<Feature<F::Geometry>, ShapefileError>> {
        loop {
            let n = self.n_records_read + 1;
            match (self.shp.next(), self.dbf.next()) {
                (None, None) => return None,

                // One stream ran dry
                (Some(Err(ShpError::UnexpectedEnd { .. })), _) => {
                    return self.desynchronized(n, format!(".shp ends in the middle of record {}", n));
                }
                (_, Some(Err(DbfError::UnexpectedEnd { .. }))) => {
                    return self.desynchronized(n, format!(".dbf header promises {} records, but the file ends before record {}", self.len(), n));
                }
                (Some(Ok(_)), None) => {
                    return self.desynchronized(n, format!(".shp has more records than the {} the .dbf declares", self.len()));
                }
                (None, Some(Ok(_))) => {
                    return self.desynchronized(n, format!(".shp has {} records, but .dbf declares {}", n - 1, self.len()));
                }

                (Some(Err(err)), _) => return Some(Err(err.into())),
                (_, Some(Err(err))) => return Some(Err(err.into())),

                (Some(Ok(shp_record)), Some(Ok(dbf_record))) => {
                    self.n_records_read = n;
                    if dbf_record.is_deleted() {
                        if self.options.skip_deleted {
                            trace!(record = n, "skipped deleted record");
                            continue;
                        }
                        warn!(record = n, "yielding a record the .dbf marks as deleted");
                    }
                    return Some(
                        self.factory.build(shp_record.shape)
                            .map(|geometry| Feature { geometry: geometry, attributes: dbf_record })
                            .map_err(ShapefileError::from)
                    );
                }
            }
        }
    }
}

impl<R: io::Read + io::Seek, S: io::Read + io::Seek, F: GeometryFactory> ShapefileReader<R, S, F> {
    /// Rewinds both streams to their first record.
    pub fn reset(&mut self) -> Result<(), ShapefileError> {
        self.shp.reset()?;
        self.dbf.reset()?;
        self.n_records_read = 0;
        self.done = false;
        debug!("rewound shapefile");
        Ok(())
    }

    /// Checks `shx` against every ".shp" record, and its record count
    /// against the ".dbf" header, then rewinds.
    pub fn verify_index<X: io::Read>(&mut self, shx: X) -> Result<(), ShapefileError> {
        let shx = ShxReader::new(shx)?;
        let n = self.shp.verify_index(shx)?;
        if n != self.len() {
            return Err(ShapefileError::Desynchronized {
                record: n.min(self.len()) + 1,
                reason: format!(".shp has {} records, but .dbf declares {}", n, self.len()),
            });
        }
        self.reset()
    }
}

impl<R: io::Read, S: io::Read, F: GeometryFactory> Iterator for ShapefileReader<R, S, F> {
    type Item = Result<Feature<F::Geometry>, ShapefileError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let result = self.read_feature();
        match result {
            None | Some(Err(_)) => self.done = true,
            Some(Ok(_)) => {}
        }
        result
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (0, Some(self.len() - self.n_records_read))
    }
}

/// Writes ".shp", ".shx" and ".dbf" together, one feature at a time.
///
/// The ".dbf" header's record count is the number of features the session
/// promises; `finish()` fails if a different number was written.
///
/// Call `finish()`: a writer dropped without it logs a warning and leaves
/// ".shp" and ".shx" headers that describe an empty file. After an I/O error
/// the streams may be out of step, and every later `write()` and `finish()`
/// fails.
pub struct ShapefileWriter<W, X, D, F = ShapeFactory>
where
    W: io::Write + io::Seek,
    X: io::Write + io::Seek,
    D: io::Write,
    F: GeometryFactory,
{
    shp: ShpWriter<W, X>,
    dbf: DbfWriter<D>,
    factory: F,
    failed: bool,
    unfinished: Unfinished,
}

/// Warns when dropped while armed.
struct Unfinished {
    armed: bool,
}

impl Drop for Unfinished {
    fn drop(&mut self) {
        if self.armed {
            warn!("shapefile writer dropped without finish(); .shp and .shx headers still describe an empty file");
        }
    }
}

impl<W: io::Write + io::Seek, X: io::Write + io::Seek, D: io::Write> ShapefileWriter<W, X, D, ShapeFactory> {
    pub fn new(shp: W, shx: X, dbf: D, shape_type: ShapeType, header: DbaseFileHeader, options: ShapefileOptions) -> Result<ShapefileWriter<W, X, D, ShapeFactory>, ShapefileError> {
        ShapefileWriter::with_factory(shp, shx, dbf, shape_type, header, ShapeFactory, options)
    }
}

impl<W, X, D, F> ShapefileWriter<W, X, D, F>
where
    W: io::Write + io::Seek,
    X: io::Write + io::Seek,
    D: io::Write,
    F: GeometryFactory,
{
    /// Writes both headers. `header` must list every field and the final
    /// record count.
    pub fn with_factory(shp: W, shx: X, dbf: D, shape_type: ShapeType, header: DbaseFileHeader, factory: F, options: ShapefileOptions) -> Result<ShapefileWriter<W, X, D, F>, ShapefileError> {
        let num_records = header.num_records();
        let shp = ShpWriter::new(shp, shx, shape_type, num_records)?;
        let dbf = DbfWriter::new(dbf, header, options.encoding)?;
        debug!(num_records, shape_type = %shape_type, "created shapefile");
        Ok(ShapefileWriter {
            shp: shp,
            dbf: dbf,
            factory: factory,
            failed: false,
            unfinished: Unfinished { armed: true },
        })
    }

    pub fn shape_type(&self) -> ShapeType {
        self.shp.shape_type()
    }

    pub fn dbf_header(&self) -> &DbaseFileHeader {
        self.dbf.header()
    }

    pub fn n_records_written(&self) -> usize {
        self.shp.n_records_written()
    }

    /// Appends one shape and one row.
    ///
    /// Both are encoded before either is written, so a rejected geometry or
    /// value leaves the streams aligned.
    pub fn write(&mut self, geometry: &F::Geometry, attributes: &DbfRecord) -> Result<(), ShapefileError> {
        if self.failed {
            return Err(ShapefileError::WriteFailed);
        }
        let shape = self.factory.decompose(geometry)?;
        let shp_record = self.shp.encode(&shape)?;
        let dbf_record = self.dbf.encode(attributes)?;

        if let Err(err) = self.shp.write_encoded(shp_record) {
            // Count and size checks fail before any byte is written.
            if err.kind() == ErrorKind::Io {
                self.failed = true;
            }
            return Err(err.into());
        }
        if let Err(err) = self.dbf.write_encoded(&dbf_record) {
            self.failed = true;
            warn!(record = self.shp.n_records_written(), "wrote .shp record but not its .dbf row");
            return Err(err.into());
        }
        Ok(())
    }

    pub fn write_feature(&mut self, feature: &Feature<F::Geometry>) -> Result<(), ShapefileError> {
        self.write(&feature.geometry, &feature.attributes)
    }

    /// Finalizes all three files and hands back their streams.
    ///
    /// Both writers are finished even when the first fails.
    pub fn finish(mut self) -> Result<(W, X, D), ShapefileError> {
        self.unfinished.armed = false;
        let shp = self.shp.finish();
        let dbf = self.dbf.finish();
        if self.failed {
            return Err(ShapefileError::WriteFailed);
        }
        let (shp, shx) = shp?;
        let dbf = dbf?;
        Ok((shp, shx, dbf))
    }
}

#[cfg(test)]
mod test {
    use std::io::Cursor;

    use encoding::all::UTF_8;

    use super::*;
    use crate::dbf::FieldValue;
    use crate::shp::{Shape, ShpPoint};

    type Streams = (Vec<u8>, Vec<u8>, Vec<u8>);

    fn options() -> ShapefileOptions {
        ShapefileOptions::default().encoding(UTF_8)
    }

    fn header(n: usize) -> DbaseFileHeader {
        DbaseFileHeader::with_fields(vec![
            DbaseFieldDescriptor::number("ID", 10, 0).unwrap(),
            DbaseFieldDescriptor::character("NAME", 20).unwrap(),
        ], n).unwrap()
    }

    fn row(id: i64, name: &str) -> DbfRecord {
        DbfRecord::new()
            .with("ID", FieldValue::Integer(id))
            .with("NAME", FieldValue::Character(name.to_string()))
    }

    fn features() -> Vec<Feature<Shape>> {
        vec![
            Feature::new(Shape::point(0., 0.), row(1, "A")),
            Feature::new(Shape::point(1., 1.), row(2, "B")),
            Feature::new(Shape::point(2., 2.), row(3, "C")),
        ]
    }

    fn written(features: &[Feature<Shape>]) -> Streams {
        let mut writer = ShapefileWriter::new(
            Cursor::new(Vec::new()),
            Cursor::new(Vec::new()),
            Vec::new(),
            ShapeType::Point,
            header(features.len()),
            options(),
        ).unwrap();
        for feature in features {
            writer.write_feature(feature).unwrap();
        }
        let (shp, shx, dbf) = writer.finish().unwrap();
        (shp.into_inner(), shx.into_inner(), dbf)
    }

    fn reader(shp: Vec<u8>, dbf: Vec<u8>) -> ShapefileReader<Cursor<Vec<u8>>, Cursor<Vec<u8>>> {
        ShapefileReader::new(Cursor::new(shp), Cursor::new(dbf), options()).unwrap()
    }

    #[test]
    fn write_then_read() {
        let (shp, _, dbf) = written(&features());
        let read: Vec<Feature<Shape>> = reader(shp, dbf).map(|f| f.unwrap()).collect();
        assert_eq!(features(), read);
    }

    #[test]
    fn combined_schema() {
        let (shp, _, dbf) = written(&features());
        let reader = reader(shp, dbf);
        let names: Vec<&str> = reader.columns().iter().map(|c| c.name()).collect();
        assert_eq!(vec!["geometry", "ID", "NAME"], names);
        assert_eq!(Column::Geometry(ShapeType::Point), reader.columns()[0]);
        assert_eq!(20, reader.field("NAME").unwrap().len());
        assert_eq!(3, reader.len());
    }

    #[test]
    fn dbf_missing_a_record() {
        let (shp, _, mut dbf) = written(&features());
        let len = dbf.len();
        dbf.truncate(len - 1 - 31);

        let mut reader = reader(shp, dbf);
        assert!(reader.next().unwrap().is_ok());
        assert!(reader.next().unwrap().is_ok());
        match reader.next() {
            Some(Err(ShapefileError::Desynchronized { record: 3, .. })) => {}
            other => panic!("expected Desynchronized, got {:?}", other.map(|r| r.map(|f| f.geometry))),
        }
        assert!(reader.next().is_none());
    }

    #[test]
    fn shp_missing_a_record() {
        let (_, _, dbf) = written(&features());
        let (shp, _, _) = written(&features()[..2]);
        let mut reader = reader(shp, dbf);
        assert_eq!(2, reader.by_ref().take(2).filter(|r| r.is_ok()).count());
        let err = reader.next().unwrap().unwrap_err();
        assert_eq!(ErrorKind::StreamDesynchronization, err.kind());
    }

    #[test]
    fn dbf_declares_fewer_records() {
        let (shp, _, _) = written(&features());
        let (_, _, dbf) = written(&features()[..2]);
        let mut reader = reader(shp, dbf);
        assert!(reader.next().unwrap().is_ok());
        assert!(reader.next().unwrap().is_ok());
        assert!(matches!(reader.next(), Some(Err(ShapefileError::Desynchronized { record: 3, .. }))));
    }

    #[test]
    fn empty_shp_with_rows() {
        let (_, _, dbf) = written(&features());
        let (shp, _, _) = written(&[]);
        match ShapefileReader::new(Cursor::new(shp), Cursor::new(dbf), options()) {
            Err(ShapefileError::Desynchronized { record: 1, .. }) => {}
            Err(err) => panic!("expected Desynchronized, got {}", err),
            Ok(_) => panic!("expected Desynchronized"),
        }
    }

    #[test]
    fn empty_dataset() {
        let (shp, shx, dbf) = written(&[]);
        let mut reader = reader(shp, dbf);
        assert!(reader.is_empty());
        assert!(reader.next().is_none());
        reader.verify_index(Cursor::new(shx)).unwrap();
    }

    #[test]
    fn deleted_rows() {
        let mut deleted = features();
        deleted[1].attributes.set_deleted(true);
        let (shp, _, dbf) = written(&deleted);

        let all: Vec<Feature<Shape>> = reader(shp.clone(), dbf.clone()).map(|f| f.unwrap()).collect();
        assert_eq!(3, all.len());
        assert!(all[1].is_deleted());

        let live: Vec<Feature<Shape>> = ShapefileReader::new(Cursor::new(shp), Cursor::new(dbf), options().skip_deleted(true))
            .unwrap()
            .map(|f| f.unwrap())
            .collect();
        assert_eq!(vec![Shape::point(0., 0.), Shape::point(2., 2.)], live.into_iter().map(|f| f.geometry).collect::<Vec<_>>());
    }

    #[test]
    fn reset_and_close() {
        let (shp, shx, dbf) = written(&features());
        let mut reader = reader(shp.clone(), dbf.clone());
        assert_eq!(3, reader.by_ref().count());
        reader.reset().unwrap();
        assert_eq!(Shape::point(0., 0.), reader.next().unwrap().unwrap().geometry);
        reader.verify_index(Cursor::new(shx)).unwrap();
        assert_eq!(3, reader.by_ref().count());

        let (shp_stream, dbf_stream) = reader.close();
        assert_eq!(shp, shp_stream.into_inner());
        assert_eq!(dbf, dbf_stream.into_inner());
    }

    #[test]
    fn index_from_another_dataset() {
        let (shp, _, dbf) = written(&features());
        let (_, shx, _) = written(&features()[..2]);
        let mut reader = reader(shp, dbf);
        assert!(reader.verify_index(Cursor::new(shx)).is_err());
    }

    #[test]
    fn rejected_feature_keeps_streams_aligned() {
        let mut writer = ShapefileWriter::new(
            Cursor::new(Vec::new()),
            Cursor::new(Vec::new()),
            Vec::new(),
            ShapeType::Point,
            header(1),
            options(),
        ).unwrap();

        let line = Shape::from_parts(ShapeType::PolyLine, vec![vec![ShpPoint(0., 0.), ShpPoint(1., 1.)]], None, None).unwrap();
        let err = writer.write(&line, &row(1, "A")).unwrap_err();
        assert_eq!(ErrorKind::SchemaViolation, err.kind());

        let err = writer.write(&Shape::point(0., 0.), &row(1, "a name far too long for its column")).unwrap_err();
        assert_eq!(ErrorKind::SchemaViolation, err.kind());
        assert_eq!(0, writer.n_records_written());

        writer.write(&Shape::point(0., 0.), &row(1, "A")).unwrap();
        let (shp, _, dbf) = writer.finish().unwrap();
        assert_eq!(1, reader(shp.into_inner(), dbf).count());
    }

    #[test]
    fn count_mismatch_on_finish() {
        let mut writer = ShapefileWriter::new(
            Cursor::new(Vec::new()),
            Cursor::new(Vec::new()),
            Vec::new(),
            ShapeType::Point,
            header(2),
            options(),
        ).unwrap();
        writer.write(&Shape::point(0., 0.), &row(1, "A")).unwrap();
        let err = writer.finish().unwrap_err();
        assert_eq!(ErrorKind::RecordCount, err.kind());
    }

    #[test]
    fn failed_row_refuses_further_writes() {
        let mut dbf = [0u8; 97 + 31 + 5];
        let mut writer = ShapefileWriter::new(
            Cursor::new(Vec::new()),
            Cursor::new(Vec::new()),
            &mut dbf[..],
            ShapeType::Point,
            header(3),
            options(),
        ).unwrap();
        writer.write(&Shape::point(0., 0.), &row(1, "A")).unwrap();

        let err = writer.write(&Shape::point(1., 1.), &row(2, "B")).unwrap_err();
        assert!(matches!(err, ShapefileError::Dbf(DbfError::Io(_))));

        let err = writer.write(&Shape::point(2., 2.), &row(3, "C")).unwrap_err();
        assert!(matches!(err, ShapefileError::WriteFailed));
        assert_eq!(ErrorKind::Io, err.kind());
        assert_eq!(2, writer.n_records_written());
        assert!(matches!(writer.finish(), Err(ShapefileError::WriteFailed)));
    }

    #[test]
    fn dropped_writer_leaves_placeholder_headers() {
        let mut shp = Cursor::new(Vec::new());
        {
            let mut writer = ShapefileWriter::new(
                &mut shp,
                Cursor::new(Vec::new()),
                Vec::new(),
                ShapeType::Point,
                header(1),
                options(),
            ).unwrap();
            writer.write(&Shape::point(1., 1.), &row(1, "A")).unwrap();
        }
        assert_eq!(128, shp.get_ref().len());
        let placeholder = ShapefileHeader::parse(shp.get_ref()).unwrap();
        assert_eq!(50, placeholder.file_length);
    }
}

//! Reads and writes ESRI Shapefiles: the ".shp" geometry file, its ".shx"
//! index and the ".dbf" attribute table.
//!
//! There are two pieces of information these files _don't_ carry that this
//! library cares about:
//!
//! * The _projection_. Sometimes there's a ".prj" file that contains it; this
//!   library ignores that file and returns `f64` coordinates.
//! * The _text encoding_ of ".dbf" Character fields. Pass it in
//!   `ShapefileOptions`; the default is Windows-1252.
//!
//! # Examples
//!
//! Open by ".shp" filename:
//!
//! ```no_run
//! use std::path::Path;
//!
//! let reader = shapeio::open(Path::new("roads.shp"), shapeio::ShapefileOptions::default()).unwrap();
//!
//! for feature in reader {
//!     // feature is a Result<Feature<Shape>, ShapefileError>
//!     println!("{}", feature.unwrap());
//! }
//! ```

use std::ffi::OsStr;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

pub mod dbf;
pub mod error;
pub mod geometry;
pub mod options;
pub mod shapefile;
pub mod shp;

pub use crate::dbf::{DbaseFieldDescriptor, DbaseFieldType, DbaseFileHeader, DbfError, DbfRecord, FieldValue};
pub use crate::error::ErrorKind;
pub use crate::geometry::{GeometryFactory, ShapeFactory};
pub use crate::options::ShapefileOptions;
pub use crate::shapefile::{Column, Feature, ShapefileError, ShapefileReader, ShapefileWriter};
pub use crate::shp::{BoundingBox, Shape, ShapeType, ShpError, ShpPoint};

pub type FileReader = ShapefileReader<io::BufReader<fs::File>, io::BufReader<fs::File>>;
pub type FileWriter = ShapefileWriter<io::BufWriter<fs::File>, io::BufWriter<fs::File>, io::BufWriter<fs::File>>;

/// Path of a dataset's sibling file, e.g. "roads.dbf" for "roads.shp".
///
/// Keeps the case of the given extension: "ROADS.SHP" gives "ROADS.DBF".
pub fn sibling_path(path: &Path, extension: &str) -> PathBuf {
    let upper = path.extension()
        .and_then(OsStr::to_str)
        .map(|ext| !ext.is_empty() && ext.chars().all(|c| !c.is_ascii_lowercase()))
        .unwrap_or(false);
    if upper {
        path.with_extension(extension.to_ascii_uppercase())
    } else {
        path.with_extension(extension)
    }
}

fn open_file<E: Into<ShapefileError>>(path: PathBuf, wrap: fn(io::Error) -> E) -> Result<io::BufReader<fs::File>, ShapefileError> {
    match fs::File::open(&path) {
        Ok(f) => Ok(io::BufReader::new(f)),
        Err(ref err) if err.kind() == io::ErrorKind::NotFound => Err(ShapefileError::MissingFile(path)),
        Err(err) => Err(wrap(err).into()),
    }
}

fn create_file<E: Into<ShapefileError>>(path: PathBuf, wrap: fn(io::Error) -> E) -> Result<io::BufWriter<fs::File>, ShapefileError> {
    fs::File::create(&path)
        .map(io::BufWriter::new)
        .map_err(|err| wrap(err).into())
}

/// Opens a dataset by the path of any of its files.
///
/// Fails with `ShapefileError::MissingFile` if the ".shp" or ".dbf" doesn't
/// exist.
pub fn open(path: &Path, options: ShapefileOptions) -> Result<FileReader, ShapefileError> {
    let shp = open_file(sibling_path(path, "shp"), ShpError::Io)?;
    let dbf = open_file(sibling_path(path, "dbf"), DbfError::Io)?;
    ShapefileReader::new(shp, dbf, options)
}

/// Creates (or truncates) a dataset's ".shp", ".shx" and ".dbf".
///
/// `header` lists the ".dbf" fields and the number of features that will be
/// written. Failing to create a file (including a missing parent
/// directory) is an I/O error from the ".shp" or ".dbf" side.
pub fn create(path: &Path, shape_type: ShapeType, header: DbaseFileHeader, options: ShapefileOptions) -> Result<FileWriter, ShapefileError> {
    let shp = create_file(sibling_path(path, "shp"), ShpError::Io)?;
    let shx = create_file(sibling_path(path, "shx"), ShpError::Io)?;
    let dbf = create_file(sibling_path(path, "dbf"), DbfError::Io)?;
    ShapefileWriter::new(shp, shx, dbf, shape_type, header, options)
}

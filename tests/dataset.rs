use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use shapeio::{
    DbaseFieldDescriptor, DbaseFileHeader, DbfError, DbfRecord, ErrorKind, Feature, FieldValue, GeometryFactory, Shape, ShapeType,
    ShapefileError, ShapefileOptions, ShapefileReader, ShpError, ShpPoint,
};
use tempfile::TempDir;

fn id_name_header(n: usize) -> DbaseFileHeader {
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

fn three_points() -> Vec<Feature<Shape>> {
    vec![
        Feature::new(Shape::point(0., 0.), row(1, "A")),
        Feature::new(Shape::point(1., 1.), row(2, "B")),
        Feature::new(Shape::point(2., 2.), row(3, "C")),
    ]
}

fn write_dataset(dir: &TempDir, features: &[Feature<Shape>]) -> PathBuf {
    let path = dir.path().join("points.shp");
    let mut writer = shapeio::create(&path, ShapeType::Point, id_name_header(features.len()), ShapefileOptions::default()).unwrap();
    for feature in features {
        writer.write_feature(feature).unwrap();
    }
    writer.finish().unwrap();
    path
}

fn read_all(path: &Path, options: ShapefileOptions) -> Vec<Feature<Shape>> {
    shapeio::open(path, options).unwrap().map(|f| f.unwrap()).collect()
}

fn append(path: &Path, bytes: &[u8]) {
    let mut f = fs::OpenOptions::new().append(true).open(path).unwrap();
    f.write_all(bytes).unwrap();
}

#[test]
fn write_then_read_three_points() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_dataset(&dir, &three_points());

    assert!(dir.path().join("points.shx").exists());
    assert_eq!(100 + 3 * 28, fs::metadata(&path).unwrap().len());
    assert_eq!(100 + 3 * 8, fs::metadata(dir.path().join("points.shx")).unwrap().len());

    assert_eq!(three_points(), read_all(&path, ShapefileOptions::default()));
}

#[test]
fn open_by_dbf_path() {
    let dir = tempfile::tempdir().unwrap();
    write_dataset(&dir, &three_points());
    let reader = shapeio::open(&dir.path().join("points.dbf"), ShapefileOptions::default()).unwrap();
    assert_eq!(3, reader.len());
    assert_eq!(ShapeType::Point, reader.shape_type());
}

#[test]
fn truncated_dbf_desynchronizes_at_last_record() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_dataset(&dir, &three_points());
    let dbf_path = dir.path().join("points.dbf");
    let len = fs::metadata(&dbf_path).unwrap().len();
    fs::OpenOptions::new().write(true).open(&dbf_path).unwrap().set_len(len - 1 - 31).unwrap();

    let mut reader = shapeio::open(&path, ShapefileOptions::default()).unwrap();
    assert!(reader.next().unwrap().is_ok());
    assert!(reader.next().unwrap().is_ok());
    let err = reader.next().unwrap().unwrap_err();
    assert_eq!(ErrorKind::StreamDesynchronization, err.kind());
    assert!(matches!(err, ShapefileError::Desynchronized { record: 3, .. }));
    assert!(reader.next().is_none());
}

#[test]
fn trailing_garbage_is_ignored() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_dataset(&dir, &three_points());
    append(&path, &[0, 0, 0, 4, 0, 0, 0, 10, 1, 0, 0, 0]);
    append(&dir.path().join("points.dbf"), &[b' '; 64]);

    assert_eq!(three_points(), read_all(&path, ShapefileOptions::default()));
}

#[test]
fn missing_files() {
    let dir = tempfile::tempdir().unwrap();

    let err = shapeio::open(&dir.path().join("nothing.shp"), ShapefileOptions::default()).err().unwrap();
    assert_eq!(ErrorKind::MissingFile, err.kind());

    let path = write_dataset(&dir, &three_points());
    fs::remove_file(dir.path().join("points.dbf")).unwrap();
    match shapeio::open(&path, ShapefileOptions::default()) {
        Err(ShapefileError::MissingFile(missing)) => assert_eq!(dir.path().join("points.dbf"), missing),
        Err(err) => panic!("expected MissingFile, got {}", err),
        Ok(_) => panic!("expected MissingFile"),
    }
}

#[test]
fn corrupt_header_fails_on_open() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_dataset(&dir, &three_points());
    let mut bytes = fs::read(&path).unwrap();
    bytes[3] = 0;
    fs::write(&path, bytes).unwrap();

    let err = shapeio::open(&path, ShapefileOptions::default()).err().unwrap();
    assert_eq!(ErrorKind::CorruptHeader, err.kind());
}

#[test]
fn writing_fewer_features_than_declared() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("short.shp");
    let mut writer = shapeio::create(&path, ShapeType::Point, id_name_header(3), ShapefileOptions::default()).unwrap();
    writer.write(&Shape::point(0., 0.), &row(1, "A")).unwrap();
    let err = writer.finish().err().unwrap();
    assert_eq!(ErrorKind::RecordCount, err.kind());
}

#[test]
fn writing_more_features_than_declared() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("long.shp");
    let mut writer = shapeio::create(&path, ShapeType::Point, id_name_header(1), ShapefileOptions::default()).unwrap();
    writer.write(&Shape::point(0., 0.), &row(1, "A")).unwrap();
    let err = writer.write(&Shape::point(1., 1.), &row(2, "B")).unwrap_err();
    assert_eq!(ErrorKind::RecordCount, err.kind());
    assert!(writer.finish().is_err());
}

#[test]
fn deleted_rows_are_yielded_unless_skipped() {
    let dir = tempfile::tempdir().unwrap();
    let mut features = three_points();
    features[0].attributes.set_deleted(true);
    let path = write_dataset(&dir, &features);

    let all = read_all(&path, ShapefileOptions::default());
    assert_eq!(3, all.len());
    assert!(all[0].is_deleted());

    let live = read_all(&path, ShapefileOptions::default().skip_deleted(true));
    assert_eq!(three_points()[1..].to_vec(), live);
}

#[test]
fn index_matches_dataset() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_dataset(&dir, &three_points());
    let mut reader = shapeio::open(&path, ShapefileOptions::default()).unwrap();
    reader.verify_index(fs::File::open(dir.path().join("points.shx")).unwrap()).unwrap();
    assert_eq!(3, reader.count());
}

#[test]
fn latin1_names() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("accents.shp");
    let options = ShapefileOptions::default().with_encoding_label("iso-8859-1").unwrap();

    let mut writer = shapeio::create(&path, ShapeType::Point, id_name_header(1), options).unwrap();
    writer.write(&Shape::point(0., 0.), &row(1, "Montréal")).unwrap();
    writer.finish().unwrap();

    let dbf = fs::read(dir.path().join("accents.dbf")).unwrap();
    assert!(dbf.contains(&0xE9));

    let features = read_all(&path, options);
    assert_eq!(Some("Montréal"), features[0].attributes.get("NAME").and_then(|v| v.as_str()));
}

#[test]
fn schema_from_values() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("typed.shp");
    let date = NaiveDate::from_ymd_opt(2019, 7, 4).unwrap();
    let attributes = DbfRecord::new()
        .with("AREA", FieldValue::Number(12.5))
        .with("COUNT", FieldValue::Integer(7))
        .with("LABEL", FieldValue::Character("lake".to_string()))
        .with("WET", FieldValue::Logical(true))
        .with("SURVEYED", FieldValue::Date(date));
    let header = DbaseFileHeader::from_schema(attributes.iter(), 1).unwrap();

    let ring = vec![ShpPoint(0., 0.), ShpPoint(0., 2.), ShpPoint(2., 2.), ShpPoint(2., 0.), ShpPoint(0., 0.)];
    let polygon = Shape::from_parts(ShapeType::PolygonZ, vec![ring], Some(vec![1., 1., 2., 2., 1.]), None).unwrap();

    let mut writer = shapeio::create(&path, ShapeType::PolygonZ, header, ShapefileOptions::default()).unwrap();
    writer.write(&polygon, &attributes).unwrap();
    writer.finish().unwrap();

    let reader = shapeio::open(&path, ShapefileOptions::default().validate_bounding_boxes(true)).unwrap();
    let bbox = reader.shp_header().bounding_box;
    assert_eq!((0., 0., 2., 2., 1., 2.), (bbox.x_min, bbox.y_min, bbox.x_max, bbox.y_max, bbox.z_min, bbox.z_max));

    let features: Vec<Feature<Shape>> = reader.map(|f| f.unwrap()).collect();
    assert_eq!(vec![Feature::new(polygon, attributes)], features);
}

/// Keeps only each shape's points, as (x, y) pairs.
struct PointListFactory;

impl GeometryFactory for PointListFactory {
    type Geometry = Vec<(f64, f64)>;

    fn build(&self, shape: Shape) -> Result<Vec<(f64, f64)>, ShpError> {
        Ok(shape.points().iter().map(|p| (p.0, p.1)).collect())
    }

    fn decompose(&self, geometry: &Vec<(f64, f64)>) -> Result<Shape, ShpError> {
        let points = geometry.iter().map(|&(x, y)| ShpPoint(x, y)).collect();
        Shape::multi_point(ShapeType::MultiPoint, points, None, None)
    }
}

#[test]
fn custom_geometry_factory() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("multi.shp");

    let shp = fs::File::create(&path).unwrap();
    let shx = fs::File::create(dir.path().join("multi.shx")).unwrap();
    let dbf = fs::File::create(dir.path().join("multi.dbf")).unwrap();
    let mut writer = shapeio::ShapefileWriter::with_factory(
        shp, shx, dbf, ShapeType::MultiPoint, id_name_header(2), PointListFactory, ShapefileOptions::default(),
    ).unwrap();
    writer.write(&vec![(0., 0.), (3., 4.)], &row(1, "A")).unwrap();
    writer.write(&vec![], &row(2, "B")).unwrap();
    writer.finish().unwrap();

    let reader = ShapefileReader::with_factory(
        fs::File::open(&path).unwrap(),
        fs::File::open(dir.path().join("multi.dbf")).unwrap(),
        PointListFactory,
        ShapefileOptions::default(),
    ).unwrap();
    let geometries: Vec<Vec<(f64, f64)>> = reader.map(|f| f.unwrap().geometry).collect();
    assert_eq!(vec![vec![(0., 0.), (3., 4.)], vec![]], geometries);
}

#[test]
fn create_in_missing_directory_is_io_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nowhere").join("points.shp");
    let err = shapeio::create(&path, ShapeType::Point, id_name_header(0), ShapefileOptions::default()).err().unwrap();
    assert_eq!(ErrorKind::Io, err.kind());
    assert!(matches!(err, ShapefileError::Shp(ShpError::Io(_))));
}

#[test]
fn dbf_open_failure_is_dbf_error() {
    let dir = tempfile::tempdir().unwrap();
    fs::create_dir(dir.path().join("points.dbf")).unwrap();
    let err = shapeio::create(&dir.path().join("points.shp"), ShapeType::Point, id_name_header(0), ShapefileOptions::default()).err().unwrap();
    assert_eq!(ErrorKind::Io, err.kind());
    assert!(matches!(err, ShapefileError::Dbf(DbfError::Io(_))));
}

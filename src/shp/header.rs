//! The 100-byte header shared by ".shp" and ".shx".
//!
//! Magic number, the five unused words and the file length are big-endian;
//! version, shape type and bounding box are little-endian.

use std::fmt;
use std::io;

use byteorder::{BigEndian, ByteOrder, LittleEndian, WriteBytesExt};
use tracing::debug;

use super::ShpError;

pub const SHP_HEADER_LENGTH: usize = 100;
pub const SHP_MAGIC_NUMBER: i32 = 9994;
pub const SHP_VERSION: i32 = 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShapeType {
    Null,
    Point,
    PolyLine,
    Polygon,
    MultiPoint,
    PointZ,
    PolyLineZ,
    PolygonZ,
    MultiPointZ,
    PointM,
    PolyLineM,
    PolygonM,
    MultiPointM,
}

/// Shape type without its Z/M suffix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShapeKind {
    Null,
    Point,
    MultiPoint,
    PolyLine,
    Polygon,
}

impl ShapeType {
    pub fn with_i32(i: i32) -> Option<ShapeType> {
        match i {
            0 => Some(ShapeType::Null),
            1 => Some(ShapeType::Point),
            3 => Some(ShapeType::PolyLine),
            5 => Some(ShapeType::Polygon),
            8 => Some(ShapeType::MultiPoint),
            11 => Some(ShapeType::PointZ),
            13 => Some(ShapeType::PolyLineZ),
            15 => Some(ShapeType::PolygonZ),
            18 => Some(ShapeType::MultiPointZ),
            21 => Some(ShapeType::PointM),
            23 => Some(ShapeType::PolyLineM),
            25 => Some(ShapeType::PolygonM),
            28 => Some(ShapeType::MultiPointM),
            _ => None,
        }
    }

    pub fn to_i32(self) -> i32 {
        match self {
            ShapeType::Null => 0,
            ShapeType::Point => 1,
            ShapeType::PolyLine => 3,
            ShapeType::Polygon => 5,
            ShapeType::MultiPoint => 8,
            ShapeType::PointZ => 11,
            ShapeType::PolyLineZ => 13,
            ShapeType::PolygonZ => 15,
            ShapeType::MultiPointZ => 18,
            ShapeType::PointM => 21,
            ShapeType::PolyLineM => 23,
            ShapeType::PolygonM => 25,
            ShapeType::MultiPointM => 28,
        }
    }

    pub fn kind(self) -> ShapeKind {
        match self {
            ShapeType::Null => ShapeKind::Null,
            ShapeType::Point | ShapeType::PointZ | ShapeType::PointM => ShapeKind::Point,
            ShapeType::MultiPoint | ShapeType::MultiPointZ | ShapeType::MultiPointM => ShapeKind::MultiPoint,
            ShapeType::PolyLine | ShapeType::PolyLineZ | ShapeType::PolyLineM => ShapeKind::PolyLine,
            ShapeType::Polygon | ShapeType::PolygonZ | ShapeType::PolygonM => ShapeKind::Polygon,
        }
    }

    pub fn has_z(self) -> bool {
        match self {
            ShapeType::PointZ | ShapeType::PolyLineZ | ShapeType::PolygonZ | ShapeType::MultiPointZ => true,
            _ => false,
        }
    }

    /// True when M values are (or, for Z types, may be) present.
    pub fn has_m(self) -> bool {
        match self {
            ShapeType::PointM | ShapeType::PolyLineM | ShapeType::PolygonM | ShapeType::MultiPointM => true,
            _ => self.has_z(),
        }
    }
}

impl fmt::Display for ShapeType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Extents of a file or record. Z and M ranges stay zero unless the shape
/// type carries them.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct BoundingBox {
    pub x_min: f64,
    pub y_min: f64,
    pub x_max: f64,
    pub y_max: f64,
    pub z_min: f64,
    pub z_max: f64,
    pub m_min: f64,
    pub m_max: f64,
}

impl BoundingBox {
    pub fn union(&self, other: &BoundingBox) -> BoundingBox {
        BoundingBox {
            x_min: self.x_min.min(other.x_min),
            y_min: self.y_min.min(other.y_min),
            x_max: self.x_max.max(other.x_max),
            y_max: self.y_max.max(other.y_max),
            z_min: self.z_min.min(other.z_min),
            z_max: self.z_max.max(other.z_max),
            m_min: self.m_min.min(other.m_min),
            m_max: self.m_max.max(other.m_max),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ShapefileHeader {
    /// Whole file, header included, in 16-bit words
    pub file_length: u32,
    pub shape_type: ShapeType,
    pub bounding_box: BoundingBox,
}

impl ShapefileHeader {
    /// Header of a file with no records yet.
    pub fn new(shape_type: ShapeType) -> ShapefileHeader {
        ShapefileHeader {
            file_length: (SHP_HEADER_LENGTH / 2) as u32,
            shape_type: shape_type,
            bounding_box: BoundingBox::default(),
        }
    }

    pub fn file_n_bytes(&self) -> usize {
        self.file_length as usize * 2
    }

    /// Decodes the first 100 bytes of a ".shp" or ".shx".
    ///
    /// MultiPatch files are rejected like unknown shape types.
    pub fn parse(buf: &[u8]) -> Result<ShapefileHeader, ShpError> {
        if buf.len() < SHP_HEADER_LENGTH {
            return Err(ShpError::CorruptHeader(format!("Header needs {} bytes, found {}", SHP_HEADER_LENGTH, buf.len())));
        }

        let magic_number = BigEndian::read_i32(&buf[0..4]);
        let file_length = BigEndian::read_i32(&buf[24..28]);
        let version = LittleEndian::read_i32(&buf[28..32]);
        let shape_type_i32 = LittleEndian::read_i32(&buf[32..36]);

        if magic_number != SHP_MAGIC_NUMBER {
            return Err(ShpError::CorruptHeader(format!("File has wrong magic number: found {}, expected {}", magic_number, SHP_MAGIC_NUMBER)));
        }

        if version != SHP_VERSION {
            return Err(ShpError::CorruptHeader(format!("File has wrong version: found {}, expected {}", version, SHP_VERSION)));
        }

        if file_length < (SHP_HEADER_LENGTH / 2) as i32 {
            return Err(ShpError::CorruptHeader(format!("File length {} words is shorter than the header", file_length)));
        }

        let shape_type = match ShapeType::with_i32(shape_type_i32) {
            Some(t) => t,
            None => return Err(ShpError::CorruptHeader(format!("File has unsupported shape type {}", shape_type_i32))),
        };

        Ok(ShapefileHeader {
            file_length: file_length as u32,
            shape_type: shape_type,
            bounding_box: BoundingBox {
                x_min: LittleEndian::read_f64(&buf[36..44]),
                y_min: LittleEndian::read_f64(&buf[44..52]),
                x_max: LittleEndian::read_f64(&buf[52..60]),
                y_max: LittleEndian::read_f64(&buf[60..68]),
                z_min: LittleEndian::read_f64(&buf[68..76]),
                z_max: LittleEndian::read_f64(&buf[76..84]),
                m_min: LittleEndian::read_f64(&buf[84..92]),
                m_max: LittleEndian::read_f64(&buf[92..100]),
            },
        })
    }

    /// Reads the first 100 bytes of the file.
    ///
    /// Side-effect: advances the file cursor 100 bytes.
    pub fn read<R: io::Read + ?Sized>(file: &mut R) -> Result<ShapefileHeader, ShpError> {
        let mut buf = [0u8; SHP_HEADER_LENGTH];
        match file.read_exact(&mut buf) {
            Ok(()) => {}
            Err(ref err) if err.kind() == io::ErrorKind::UnexpectedEof => {
                return Err(ShpError::CorruptHeader(String::from("File is shorter than its 100-byte header")));
            }
            Err(err) => return Err(ShpError::Io(err)),
        }
        let header = ShapefileHeader::parse(&buf)?;
        debug!(shape_type = %header.shape_type, file_length = header.file_length, "read shapefile header");
        Ok(header)
    }

    pub fn write<W: io::Write + ?Sized>(&self, w: &mut W) -> Result<(), ShpError> {
        if self.file_length > i32::max_value() as u32 {
            return Err(ShpError::SchemaViolation(format!("File length {} words does not fit in the header", self.file_length)));
        }
        w.write_i32::<BigEndian>(SHP_MAGIC_NUMBER)?;
        for _ in 0..5 {
            w.write_i32::<BigEndian>(0)?;
        }
        w.write_i32::<BigEndian>(self.file_length as i32)?;
        w.write_i32::<LittleEndian>(SHP_VERSION)?;
        w.write_i32::<LittleEndian>(self.shape_type.to_i32())?;
        let b = &self.bounding_box;
        for &v in [b.x_min, b.y_min, b.x_max, b.y_max, b.z_min, b.z_max, b.m_min, b.m_max].iter() {
            w.write_f64::<LittleEndian>(v)?;
        }
        Ok(())
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, ShpError> {
        let mut buf = Vec::with_capacity(SHP_HEADER_LENGTH);
        self.write(&mut buf)?;
        Ok(buf)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn header() -> ShapefileHeader {
        ShapefileHeader {
            file_length: 110,
            shape_type: ShapeType::PolyLineZ,
            bounding_box: BoundingBox {
                x_min: -1.5, y_min: -2.5, x_max: 3.0, y_max: 4.0,
                z_min: 10.0, z_max: 20.0, m_min: 0.0, m_max: 1.0,
            },
        }
    }

    #[test]
    fn mixed_byte_order() {
        let bytes = header().to_bytes().unwrap();
        assert_eq!(100, bytes.len());
        assert_eq!(&[0x00, 0x00, 0x27, 0x0A], &bytes[0..4]);
        assert!(bytes[4..24].iter().all(|&b| b == 0));
        assert_eq!(&[0x00, 0x00, 0x00, 110], &bytes[24..28]);
        assert_eq!(&[0xE8, 0x03, 0x00, 0x00], &bytes[28..32]);
        assert_eq!(&[13, 0, 0, 0], &bytes[32..36]);
        assert_eq!(-1.5, LittleEndian::read_f64(&bytes[36..44]));
        assert_eq!(1.0, LittleEndian::read_f64(&bytes[92..100]));
    }

    #[test]
    fn round_trip() {
        let h = header();
        assert_eq!(h, ShapefileHeader::parse(&h.to_bytes().unwrap()).unwrap());
        for &t in [ShapeType::Null, ShapeType::Point, ShapeType::MultiPointM, ShapeType::PolygonZ].iter() {
            let h = ShapefileHeader::new(t);
            assert_eq!(h, ShapefileHeader::parse(&h.to_bytes().unwrap()).unwrap());
        }
    }

    #[test]
    fn wrong_magic_number() {
        let mut bytes = header().to_bytes().unwrap();
        bytes[3] = 0x0B;
        assert!(matches!(ShapefileHeader::parse(&bytes), Err(ShpError::CorruptHeader(_))));
    }

    #[test]
    fn wrong_version() {
        let mut bytes = header().to_bytes().unwrap();
        bytes[28] = 0xE9;
        assert!(matches!(ShapefileHeader::parse(&bytes), Err(ShpError::CorruptHeader(_))));
    }

    #[test]
    fn multipatch_unsupported() {
        let mut bytes = header().to_bytes().unwrap();
        bytes[32] = 31;
        assert!(matches!(ShapefileHeader::parse(&bytes), Err(ShpError::CorruptHeader(_))));
    }

    #[test]
    fn short_file() {
        let bytes = header().to_bytes().unwrap();
        let mut cursor = &bytes[..60];
        assert!(matches!(ShapefileHeader::read(&mut cursor), Err(ShpError::CorruptHeader(_))));
    }

    #[test]
    fn shape_type_codes() {
        for i in 0..40 {
            if let Some(t) = ShapeType::with_i32(i) {
                assert_eq!(i, t.to_i32());
            }
        }
        assert!(ShapeType::PolygonZ.has_z() && ShapeType::PolygonZ.has_m());
        assert!(!ShapeType::PolygonM.has_z() && ShapeType::PolygonM.has_m());
        assert!(!ShapeType::Polygon.has_z() && !ShapeType::Polygon.has_m());
        assert_eq!(ShapeKind::MultiPoint, ShapeType::MultiPointZ.kind());
    }
}

//! ".shp" records: an 8-byte big-endian header (record number, content
//! length in 16-bit words) and a little-endian payload tagged by shape type.
//!
//! Payload layouts, after the 4-byte shape type:
//!
//! * Null: nothing.
//! * Point: X, Y, then Z (PointZ) and M (PointM; optional for PointZ).
//! * MultiPoint: bounding box, point count, points, then Z range + Z values
//!   and M range + M values when the type carries them.
//! * PolyLine/Polygon: bounding box, part count, point count, part offsets,
//!   points, then Z and M blocks like MultiPoint.
//!
//! Z types may omit their M block; the content length says which it is.

use std::fmt;
use std::io;

use byteorder::{BigEndian, ByteOrder, LittleEndian, WriteBytesExt};
use itertools::Itertools;
use tracing::warn;

use super::header::{BoundingBox, ShapeKind, ShapeType};
use super::ShpError;

pub const SHP_RECORD_HEADER_LENGTH: usize = 8;
const SHP_POINT_LENGTH: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
pub struct ShpPoint(pub f64, pub f64);

impl fmt::Display for ShpPoint {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "({},{})", self.0, self.1)
    }
}

/// Coordinate arrays of one record.
///
/// Always consistent with its shape type: constructors and the decoder check
/// array lengths, part offsets and Z/M presence.
#[derive(Debug, Clone, PartialEq)]
pub struct Shape {
    shape_type: ShapeType,
    parts: Vec<u32>,
    points: Vec<ShpPoint>,
    z: Option<Vec<f64>>,
    m: Option<Vec<f64>>,
}

/// A decoded ".shp" record.
#[derive(Debug, Clone, PartialEq)]
pub struct ShpRecord {
    /// 1-based, and always one more than the previous record's
    pub record_number: u32,
    pub shape: Shape,
}

impl Shape {
    /// Builds a shape from raw arrays.
    ///
    /// `parts` holds the index of each part's first point, and is only
    /// allowed for PolyLine and Polygon types. `z` is required by Z types;
    /// `m` by M types, and optional for Z types.
    pub fn new(shape_type: ShapeType, parts: Vec<u32>, points: Vec<ShpPoint>, z: Option<Vec<f64>>, m: Option<Vec<f64>>) -> Result<Shape, ShpError> {
        let shape = Shape {
            shape_type: shape_type,
            parts: parts,
            points: points,
            z: z,
            m: m,
        };
        match shape.check() {
            Ok(()) => Ok(shape),
            Err(reason) => Err(ShpError::SchemaViolation(reason)),
        }
    }

    pub fn null() -> Shape {
        Shape { shape_type: ShapeType::Null, parts: vec![], points: vec![], z: None, m: None }
    }

    pub fn point(x: f64, y: f64) -> Shape {
        Shape { shape_type: ShapeType::Point, parts: vec![], points: vec![ShpPoint(x, y)], z: None, m: None }
    }

    pub fn point_m(x: f64, y: f64, m: f64) -> Shape {
        Shape { shape_type: ShapeType::PointM, parts: vec![], points: vec![ShpPoint(x, y)], z: None, m: Some(vec![m]) }
    }

    pub fn point_z(x: f64, y: f64, z: f64, m: Option<f64>) -> Shape {
        Shape {
            shape_type: ShapeType::PointZ,
            parts: vec![],
            points: vec![ShpPoint(x, y)],
            z: Some(vec![z]),
            m: m.map(|m| vec![m]),
        }
    }

    pub fn multi_point(shape_type: ShapeType, points: Vec<ShpPoint>, z: Option<Vec<f64>>, m: Option<Vec<f64>>) -> Result<Shape, ShpError> {
        Shape::new(shape_type, vec![], points, z, m)
    }

    /// A PolyLine or Polygon (or Z/M variant) from its parts' point lists.
    pub fn from_parts(shape_type: ShapeType, parts: Vec<Vec<ShpPoint>>, z: Option<Vec<f64>>, m: Option<Vec<f64>>) -> Result<Shape, ShpError> {
        let mut offsets = Vec::with_capacity(parts.len());
        let mut points = Vec::with_capacity(parts.iter().map(|p| p.len()).sum());
        for part in parts {
            offsets.push(points.len() as u32);
            points.extend(part);
        }
        Shape::new(shape_type, offsets, points, z, m)
    }

    pub fn shape_type(&self) -> ShapeType {
        self.shape_type
    }

    pub fn is_null(&self) -> bool {
        self.shape_type == ShapeType::Null
    }

    pub fn part_offsets(&self) -> &[u32] {
        &self.parts
    }

    pub fn points(&self) -> &[ShpPoint] {
        &self.points
    }

    pub fn z(&self) -> Option<&[f64]> {
        self.z.as_ref().map(|z| &z[..])
    }

    pub fn m(&self) -> Option<&[f64]> {
        self.m.as_ref().map(|m| &m[..])
    }

    /// Points of each part (line or ring), in order.
    ///
    /// Point and MultiPoint shapes have a single part holding all points.
    pub fn parts(&self) -> Vec<&[ShpPoint]> {
        if self.parts.is_empty() {
            return if self.points.is_empty() { vec![] } else { vec![&self.points[..]] };
        }
        self.parts.iter()
            .map(|&p| p as usize)
            .chain(Some(self.points.len()))
            .tuple_windows()
            .map(|(start, end)| &self.points[start..end])
            .collect()
    }

    /// Extents computed from the coordinates. All zero for an empty shape.
    pub fn bounding_box(&self) -> BoundingBox {
        let mut bbox = BoundingBox::default();
        if let Some((first, rest)) = self.points.split_first() {
            bbox.x_min = first.0;
            bbox.x_max = first.0;
            bbox.y_min = first.1;
            bbox.y_max = first.1;
            for p in rest {
                bbox.x_min = bbox.x_min.min(p.0);
                bbox.x_max = bbox.x_max.max(p.0);
                bbox.y_min = bbox.y_min.min(p.1);
                bbox.y_max = bbox.y_max.max(p.1);
            }
        }
        if let Some((min, max)) = self.z.as_ref().and_then(|z| range(z)) {
            bbox.z_min = min;
            bbox.z_max = max;
        }
        if let Some((min, max)) = self.m.as_ref().and_then(|m| range(m)) {
            bbox.m_min = min;
            bbox.m_max = max;
        }
        bbox
    }

    /// Payload size in bytes, shape type included.
    pub fn content_n_bytes(&self) -> usize {
        let n = self.points.len();
        let z = self.z.is_some() as usize;
        let m = self.m.is_some() as usize;
        match self.shape_type.kind() {
            ShapeKind::Null => 4,
            ShapeKind::Point => 4 + SHP_POINT_LENGTH + 8 * z + 8 * m,
            ShapeKind::MultiPoint => 40 + SHP_POINT_LENGTH * n + (16 + 8 * n) * (z + m),
            ShapeKind::PolyLine | ShapeKind::Polygon => {
                44 + 4 * self.parts.len() + SHP_POINT_LENGTH * n + (16 + 8 * n) * (z + m)
            }
        }
    }

    /// Payload size in 16-bit words, as written in the record header.
    pub fn content_length(&self) -> usize {
        self.content_n_bytes() / 2
    }

    fn check(&self) -> Result<(), String> {
        let t = self.shape_type;
        let n = self.points.len();

        match t.kind() {
            ShapeKind::Null => {
                if n > 0 || !self.parts.is_empty() || self.z.is_some() || self.m.is_some() {
                    return Err(String::from("a Null shape has no coordinates"));
                }
                return Ok(());
            }
            ShapeKind::Point => {
                if n != 1 || !self.parts.is_empty() {
                    return Err(format!("a {} has exactly one point and no parts", t));
                }
            }
            ShapeKind::MultiPoint => {
                if !self.parts.is_empty() {
                    return Err(format!("a {} has no parts", t));
                }
            }
            ShapeKind::PolyLine | ShapeKind::Polygon => check_part_offsets(&self.parts, n)?,
        }

        match self.z {
            Some(ref z) if !t.has_z() => return Err(format!("a {} has no Z values, but {} were given", t, z.len())),
            Some(ref z) if z.len() != n => return Err(format!("{} Z values for {} points", z.len(), n)),
            None if t.has_z() => return Err(format!("a {} needs Z values", t)),
            _ => {}
        }

        let m_required = t.has_m() && !t.has_z();
        match self.m {
            Some(ref m) if !t.has_m() => return Err(format!("a {} has no M values, but {} were given", t, m.len())),
            Some(ref m) if m.len() != n => return Err(format!("{} M values for {} points", m.len(), n)),
            None if m_required => return Err(format!("a {} needs M values", t)),
            _ => {}
        }

        Ok(())
    }
}

impl fmt::Display for Shape {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}[", self.shape_type)?;
        for (i, part) in self.parts().iter().enumerate() {
            if i > 0 {
                write!(f, ",")?;
            }
            write!(f, "[")?;
            for (j, point) in part.iter().enumerate() {
                if j > 0 {
                    write!(f, ",")?;
                }
                write!(f, "{}", point)?;
            }
            write!(f, "]")?;
        }
        write!(f, "]")
    }
}

fn range(values: &[f64]) -> Option<(f64, f64)> {
    values.iter().fold(None, |acc, &v| match acc {
        None => Some((v, v)),
        Some((min, max)) => Some((min.min(v), max.max(v))),
    })
}

fn check_part_offsets(parts: &[u32], n_points: usize) -> Result<(), String> {
    match parts.first() {
        None if n_points > 0 => return Err(format!("{} points belong to no part", n_points)),
        None => return Ok(()),
        Some(&first) if first != 0 => return Err(format!("first part starts at point {}, not 0", first)),
        Some(_) => {}
    }
    for (&start, &end) in parts.iter().tuple_windows() {
        if start > end {
            return Err(format!("part offsets go backwards: {} then {}", start, end));
        }
    }
    if let Some(&last) = parts.last() {
        if last as usize > n_points {
            return Err(format!("a part starts at point {}, but there are only {} points", last, n_points));
        }
    }
    Ok(())
}

/// Reads little-endian values from an exactly-sized payload.
struct Payload<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Payload<'a> {
    fn i32(&mut self) -> i32 {
        let v = LittleEndian::read_i32(&self.buf[self.pos..]);
        self.pos += 4;
        v
    }

    fn f64(&mut self) -> f64 {
        let v = LittleEndian::read_f64(&self.buf[self.pos..]);
        self.pos += 8;
        v
    }

    fn count(&mut self, what: &str) -> Result<usize, String> {
        let v = self.i32();
        if v < 0 {
            Err(format!("{} count is negative ({})", what, v))
        } else {
            Ok(v as usize)
        }
    }

    fn xy_box(&mut self) -> BoundingBox {
        BoundingBox {
            x_min: self.f64(),
            y_min: self.f64(),
            x_max: self.f64(),
            y_max: self.f64(),
            ..BoundingBox::default()
        }
    }

    fn points(&mut self, n: usize) -> Vec<ShpPoint> {
        (0..n).map(|_| ShpPoint(self.f64(), self.f64())).collect()
    }

    fn values(&mut self, n: usize) -> Vec<f64> {
        (0..n).map(|_| self.f64()).collect()
    }
}

/// Picks whether an M block is present from the payload size.
///
/// `base` is the size without Z or M; `block` the size of one Z or M block.
fn has_m_block(shape_type: ShapeType, len: u64, base: u64, block: u64) -> Result<bool, String> {
    let with_z = if shape_type.has_z() { base + block } else { base };
    let expected = if shape_type.has_z() {
        if len == with_z {
            return Ok(false);
        }
        with_z + block
    } else if shape_type.has_m() {
        base + block
    } else {
        base
    };

    if len == expected {
        Ok(shape_type.has_m())
    } else {
        Err(format!("{} payload needs {} bytes, but the record header says it has {}", shape_type, expected, len))
    }
}

/// Decodes a record payload (everything after the 8-byte record header).
///
/// Returns the shape and, for MultiPoint/PolyLine/Polygon types, the
/// bounding box stored in the record.
pub fn decode_shape(buf: &[u8], file_shape_type: ShapeType) -> Result<(Shape, Option<BoundingBox>), String> {
    if buf.len() < 4 {
        return Err(format!("payload is {} bytes, too short for a shape type", buf.len()));
    }
    let mut p = Payload { buf: buf, pos: 0 };
    let shape_type_i32 = p.i32();
    let shape_type = match ShapeType::with_i32(shape_type_i32) {
        Some(t) => t,
        None => return Err(format!("unsupported shape type {}", shape_type_i32)),
    };
    if shape_type != ShapeType::Null && shape_type != file_shape_type {
        return Err(format!("record is a {} in a {} file", shape_type, file_shape_type));
    }

    let len = buf.len() as u64;
    let (shape, stored_bbox) = match shape_type.kind() {
        ShapeKind::Null => {
            if len != 4 {
                return Err(format!("Null payload needs 4 bytes, but the record header says it has {}", len));
            }
            (Shape::null(), None)
        }
        ShapeKind::Point => {
            let with_m = has_m_block(shape_type, len, 20, 8)?;
            let point = p.points(1);
            let z = if shape_type.has_z() { Some(p.values(1)) } else { None };
            let m = if with_m { Some(p.values(1)) } else { None };
            (Shape { shape_type: shape_type, parts: vec![], points: point, z: z, m: m }, None)
        }
        ShapeKind::MultiPoint | ShapeKind::PolyLine | ShapeKind::Polygon => {
            let is_poly = shape_type.kind() != ShapeKind::MultiPoint;
            let fixed = if is_poly { 44 } else { 40 };
            if len < fixed {
                return Err(format!("{} payload needs at least {} bytes, but the record header says it has {}", shape_type, fixed, len));
            }

            let mut bbox = p.xy_box();
            let n_parts = if is_poly { p.count("part")? } else { 0 };
            let n_points = p.count("point")?;

            let base = fixed + 4 * n_parts as u64 + SHP_POINT_LENGTH as u64 * n_points as u64;
            let block = 16 + 8 * n_points as u64;
            let with_m = has_m_block(shape_type, len, base, block)?;

            let parts: Vec<u32> = (0..n_parts).map(|_| p.i32() as u32).collect();
            let points = p.points(n_points);
            let z = if shape_type.has_z() {
                bbox.z_min = p.f64();
                bbox.z_max = p.f64();
                Some(p.values(n_points))
            } else {
                None
            };
            let m = if with_m {
                bbox.m_min = p.f64();
                bbox.m_max = p.f64();
                Some(p.values(n_points))
            } else {
                None
            };
            (Shape { shape_type: shape_type, parts: parts, points: points, z: z, m: m }, Some(bbox))
        }
    };

    shape.check()?;
    Ok((shape, stored_bbox))
}

/// Encodes a record payload (everything after the 8-byte record header).
pub fn encode_shape<W: io::Write + ?Sized>(shape: &Shape, w: &mut W) -> Result<(), ShpError> {
    w.write_i32::<LittleEndian>(shape.shape_type.to_i32())?;

    let kind = shape.shape_type.kind();
    if kind == ShapeKind::Null {
        return Ok(());
    }
    if kind == ShapeKind::Point {
        let point = shape.points[0];
        w.write_f64::<LittleEndian>(point.0)?;
        w.write_f64::<LittleEndian>(point.1)?;
        if let Some(ref z) = shape.z {
            w.write_f64::<LittleEndian>(z[0])?;
        }
        if let Some(ref m) = shape.m {
            w.write_f64::<LittleEndian>(m[0])?;
        }
        return Ok(());
    }

    let bbox = shape.bounding_box();
    w.write_f64::<LittleEndian>(bbox.x_min)?;
    w.write_f64::<LittleEndian>(bbox.y_min)?;
    w.write_f64::<LittleEndian>(bbox.x_max)?;
    w.write_f64::<LittleEndian>(bbox.y_max)?;

    if kind != ShapeKind::MultiPoint {
        w.write_i32::<LittleEndian>(shape.parts.len() as i32)?;
    }
    w.write_i32::<LittleEndian>(shape.points.len() as i32)?;
    for &part in shape.parts.iter() {
        w.write_i32::<LittleEndian>(part as i32)?;
    }
    for point in shape.points.iter() {
        w.write_f64::<LittleEndian>(point.0)?;
        w.write_f64::<LittleEndian>(point.1)?;
    }

    if let Some(ref z) = shape.z {
        w.write_f64::<LittleEndian>(bbox.z_min)?;
        w.write_f64::<LittleEndian>(bbox.z_max)?;
        for &v in z.iter() {
            w.write_f64::<LittleEndian>(v)?;
        }
    }
    if let Some(ref m) = shape.m {
        w.write_f64::<LittleEndian>(bbox.m_min)?;
        w.write_f64::<LittleEndian>(bbox.m_max)?;
        for &v in m.iter() {
            w.write_f64::<LittleEndian>(v)?;
        }
    }
    Ok(())
}

/// Encodes a whole record: record header plus payload.
pub fn encode_record(record_number: u32, shape: &Shape) -> Result<Vec<u8>, ShpError> {
    let content_length = shape.content_length();
    if content_length > i32::max_value() as usize || record_number > i32::max_value() as u32 {
        return Err(ShpError::SchemaViolation(format!("Record {} is too large for a .shp file", record_number)));
    }

    let mut buf = Vec::with_capacity(SHP_RECORD_HEADER_LENGTH + shape.content_n_bytes());
    buf.write_i32::<BigEndian>(record_number as i32)?;
    buf.write_i32::<BigEndian>(content_length as i32)?;
    encode_shape(shape, &mut buf)?;
    Ok(buf)
}

/// Reads the next record, and returns the number of bytes it consumed
/// (including its record header).
///
/// Side effect: advances the file cursor to the next record.
pub fn read_record<R: io::Read + ?Sized>(file: &mut R, file_shape_type: ShapeType, expected_number: u32, validate_bounding_box: bool) -> Result<(ShpRecord, usize), ShpError> {
    read_record_within(file, file_shape_type, expected_number, validate_bounding_box, usize::MAX)
}

/// Like `read_record`, but a record claiming more than `max_n_bytes`
/// (header included) is corrupt. Nothing is allocated for it.
pub fn read_record_within<R: io::Read + ?Sized>(file: &mut R, file_shape_type: ShapeType, expected_number: u32, validate_bounding_box: bool, max_n_bytes: usize) -> Result<(ShpRecord, usize), ShpError> {
    let mut header_buf = [0u8; SHP_RECORD_HEADER_LENGTH];
    read_exact_or_end(file, &mut header_buf, expected_number)?;

    let record_number = BigEndian::read_i32(&header_buf[0..4]);
    let content_length = BigEndian::read_i32(&header_buf[4..8]);

    if record_number as i64 != expected_number as i64 {
        return Err(ShpError::RecordNumber { expected: expected_number, found: record_number });
    }
    if content_length < 2 {
        return Err(ShpError::CorruptRecord {
            record: expected_number,
            reason: format!("content length is {} words, too short for a shape type", content_length),
        });
    }

    let n_bytes = SHP_RECORD_HEADER_LENGTH + content_length as usize * 2;
    if n_bytes > max_n_bytes {
        return Err(ShpError::CorruptRecord {
            record: expected_number,
            reason: format!("record is {} bytes, but the file length leaves {}", n_bytes, max_n_bytes),
        });
    }

    let mut buf = vec![0u8; content_length as usize * 2];
    read_exact_or_end(file, &mut buf, expected_number)?;

    let (shape, stored_bbox) = decode_shape(&buf, file_shape_type)
        .map_err(|reason| ShpError::CorruptRecord { record: expected_number, reason: reason })?;

    if let Some(stored) = stored_bbox {
        let computed = shape.bounding_box();
        if stored != computed {
            if validate_bounding_box {
                return Err(ShpError::CorruptRecord {
                    record: expected_number,
                    reason: format!("stored bounding box {:?} does not match the coordinates' extents {:?}", stored, computed),
                });
            }
            warn!(record = expected_number, "stored bounding box does not match the coordinates' extents");
        }
    }

    Ok((ShpRecord { record_number: expected_number, shape: shape }, header_buf.len() + buf.len()))
}

fn read_exact_or_end<R: io::Read + ?Sized>(file: &mut R, buf: &mut [u8], record: u32) -> Result<(), ShpError> {
    match file.read_exact(buf) {
        Ok(()) => Ok(()),
        Err(ref err) if err.kind() == io::ErrorKind::UnexpectedEof => Err(ShpError::UnexpectedEnd { record: record }),
        Err(err) => Err(ShpError::Io(err)),
    }
}

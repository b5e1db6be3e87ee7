//! Fixed-length ".dbf" records.
//!
//! Byte 0 is the deletion flag (' ' live, '*' deleted); the remaining bytes
//! are sliced per field, in declared order. Numbers are right-aligned text,
//! everything else left-aligned.

use std::fmt;
use std::slice;

use chrono::NaiveDate;
use encoding::{DecoderTrap, EncoderTrap, EncodingRef};
use lazy_static::lazy_static;
use regex::Regex;

use super::header::{DbaseFieldDescriptor, DbaseFieldType};
use super::DbfError;

pub const DBF_RECORD_LIVE: u8 = b' ';
pub const DBF_RECORD_DELETED: u8 = b'*';

lazy_static! {
    static ref NUMBER: Regex = Regex::new(r"^[+-]?(\d+\.?\d*|\.\d+)([eE][+-]?\d+)?$").unwrap();
}

/// A typed attribute value.
///
/// Number fields decode to Integer when they have no decimals and the text
/// has no fraction; otherwise to Number. Blank Number, Logical and Date
/// fields decode to Null. Blank Character fields decode to an empty string.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Character(String),
    Number(f64),
    Integer(i64),
    Logical(bool),
    Date(NaiveDate),
    Null,
}

impl FieldValue {
    pub fn is_null(&self) -> bool {
        *self == FieldValue::Null
    }

    pub fn as_str(&self) -> Option<&str> {
        match *self {
            FieldValue::Character(ref s) => Some(s),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match *self {
            FieldValue::Number(n) => Some(n),
            FieldValue::Integer(i) => Some(i as f64),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match *self {
            FieldValue::Integer(i) => Some(i),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match *self {
            FieldValue::Logical(b) => Some(b),
            _ => None,
        }
    }

    pub fn as_date(&self) -> Option<NaiveDate> {
        match *self {
            FieldValue::Date(d) => Some(d),
            _ => None,
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            FieldValue::Character(ref s) => write!(f, "{}", s),
            FieldValue::Number(n) => write!(f, "{}", n),
            FieldValue::Integer(i) => write!(f, "{}", i),
            FieldValue::Logical(b) => write!(f, "{}", if b { "T" } else { "F" }),
            FieldValue::Date(d) => write!(f, "{}", d.format("%Y-%m-%d")),
            FieldValue::Null => write!(f, "NULL"),
        }
    }
}

/// One ".dbf" row: its deletion flag and an ordered name-to-value mapping.
///
/// Readers yield deleted rows too; check `is_deleted()`.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DbfRecord {
    deleted: bool,
    entries: Vec<(String, FieldValue)>,
}

impl DbfRecord {
    pub fn new() -> DbfRecord {
        DbfRecord::default()
    }

    /// Zips decoded values with their fields' names.
    pub fn from_values(fields: &[DbaseFieldDescriptor], deleted: bool, values: Vec<FieldValue>) -> DbfRecord {
        DbfRecord {
            deleted: deleted,
            entries: fields.iter().map(|f| f.name().to_string()).zip(values).collect(),
        }
    }

    /// Builder-style `insert()`.
    pub fn with<S: Into<String>>(mut self, name: S, value: FieldValue) -> DbfRecord {
        self.insert(name, value);
        self
    }

    /// Sets a value, replacing (in place) any value already under that name.
    pub fn insert<S: Into<String>>(&mut self, name: S, value: FieldValue) {
        let name = name.into();
        match self.entries.iter_mut().find(|e| e.0 == name) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((name, value)),
        }
    }

    pub fn get(&self, name: &str) -> Option<&FieldValue> {
        self.entries.iter().find(|e| e.0 == name).map(|e| &e.1)
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted
    }

    pub fn set_deleted(&mut self, deleted: bool) {
        self.deleted = deleted;
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> DbfRecordIter {
        DbfRecordIter { inner: self.entries.iter() }
    }

    pub fn into_values(self) -> Vec<FieldValue> {
        self.entries.into_iter().map(|e| e.1).collect()
    }

    /// Values in the order of `fields`, looked up by name.
    ///
    /// A field with no value here is a SchemaViolation: writers never guess.
    pub fn values_for(&self, fields: &[DbaseFieldDescriptor]) -> Result<Vec<&FieldValue>, DbfError> {
        fields.iter()
            .map(|field| {
                self.get(field.name()).ok_or_else(|| {
                    DbfError::SchemaViolation(format!("Record has no value for field '{}'", field.name()))
                })
            })
            .collect()
    }
}

impl fmt::Display for DbfRecord {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if self.deleted {
            write!(f, "*")?;
        }
        write!(f, "{{")?;
        for (i, &(ref name, ref value)) in self.entries.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}: {}", name, value)?;
        }
        write!(f, "}}")
    }
}

pub struct DbfRecordIter<'a> {
    inner: slice::Iter<'a, (String, FieldValue)>,
}

impl<'a> Iterator for DbfRecordIter<'a> {
    type Item = (&'a str, &'a FieldValue);

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next().map(|e| (e.0.as_str(), &e.1))
    }
}

impl<'a> IntoIterator for &'a DbfRecord {
    type Item = (&'a str, &'a FieldValue);
    type IntoIter = DbfRecordIter<'a>;

    fn into_iter(self) -> DbfRecordIter<'a> {
        self.iter()
    }
}

fn corrupt(field: &DbaseFieldDescriptor, reason: String) -> DbfError {
    DbfError::CorruptRecord { record: 0, field: field.name().to_string(), reason: reason }
}

fn too_wide(field: &DbaseFieldDescriptor, text: &str) -> DbfError {
    DbfError::SchemaViolation(format!("Value {:?} does not fit in the {} bytes of field '{}'", text, field.len(), field.name()))
}

fn wrong_type(field: &DbaseFieldDescriptor, value: &FieldValue) -> DbfError {
    DbfError::SchemaViolation(format!("Field '{}' has type {:?}; it cannot hold {:?}", field.name(), field.field_type(), value))
}

fn is_blank(buf: &[u8]) -> bool {
    buf.iter().all(|&b| b == b' ' || b == 0)
}

fn trim_ascii(buf: &[u8]) -> &[u8] {
    let start = buf.iter().position(|&b| b != b' ' && b != 0).unwrap_or(buf.len());
    let end = buf.iter().rposition(|&b| b != b' ' && b != 0).map(|i| i + 1).unwrap_or(start);
    &buf[start..end]
}

fn decode_character(buf: &[u8], field: &DbaseFieldDescriptor, encoding: EncodingRef) -> Result<FieldValue, DbfError> {
    let end = buf.iter().rposition(|&b| b != b' ' && b != 0).map(|i| i + 1).unwrap_or(0);
    match encoding.decode(&buf[..end], DecoderTrap::Strict) {
        Ok(s) => Ok(FieldValue::Character(s)),
        Err(err) => Err(corrupt(field, format!("text is not valid {}: {}", encoding.name(), err))),
    }
}

fn decode_number(buf: &[u8], field: &DbaseFieldDescriptor) -> Result<FieldValue, DbfError> {
    let trimmed = trim_ascii(buf);
    if trimmed.is_empty() || trimmed.iter().all(|&b| b == b'*') {
        return Ok(FieldValue::Null);
    }

    let text = match ::std::str::from_utf8(trimmed) {
        Ok(t) if NUMBER.is_match(t) => t,
        _ => return Err(corrupt(field, format!("{:?} is not a number", String::from_utf8_lossy(trimmed)))),
    };

    if field.decimal_count() == 0 && !text.contains(|c: char| c == '.' || c == 'e' || c == 'E') {
        if let Ok(i) = text.parse::<i64>() {
            return Ok(FieldValue::Integer(i));
        }
    }

    match text.parse::<f64>() {
        Ok(n) => Ok(FieldValue::Number(n)),
        Err(err) => Err(corrupt(field, format!("{:?} is not a number: {}", text, err))),
    }
}

fn decode_logical(buf: &[u8], field: &DbaseFieldDescriptor) -> Result<FieldValue, DbfError> {
    match buf[0] {
        b'T' | b't' | b'Y' | b'y' => Ok(FieldValue::Logical(true)),
        b'F' | b'f' | b'N' | b'n' => Ok(FieldValue::Logical(false)),
        b'?' | b' ' | 0 => Ok(FieldValue::Null),
        other => Err(corrupt(field, format!("{:?} is not a logical value", other as char))),
    }
}

fn decode_date(buf: &[u8], field: &DbaseFieldDescriptor) -> Result<FieldValue, DbfError> {
    // Some writers fill empty dates with zeroes instead of spaces.
    if is_blank(buf) || buf.iter().all(|&b| b == b'0') {
        return Ok(FieldValue::Null);
    }
    if buf.len() != 8 || !buf.iter().all(|b| b.is_ascii_digit()) {
        return Err(corrupt(field, format!("{:?} is not a YYYYMMDD date", String::from_utf8_lossy(buf))));
    }

    let digits = |range: ::std::ops::Range<usize>| {
        buf[range].iter().fold(0u32, |acc, &b| acc * 10 + (b - b'0') as u32)
    };
    let (year, month, day) = (digits(0..4), digits(4..6), digits(6..8));

    match NaiveDate::from_ymd_opt(year as i32, month, day) {
        Some(date) => Ok(FieldValue::Date(date)),
        None => Err(corrupt(field, format!("{:04}-{:02}-{:02} is not a calendar date", year, month, day))),
    }
}

fn decode_field(buf: &[u8], field: &DbaseFieldDescriptor, encoding: EncodingRef) -> Result<FieldValue, DbfError> {
    match field.field_type() {
        DbaseFieldType::Character => decode_character(buf, field, encoding),
        DbaseFieldType::Number => decode_number(buf, field),
        DbaseFieldType::Logical => decode_logical(buf, field),
        DbaseFieldType::Date => decode_date(buf, field),
    }
}

/// Decodes one record into its deletion flag and values.
///
/// `bytes` must be exactly one record long. Errors carry record number 0;
/// readers fill in the real one.
pub fn decode_record(bytes: &[u8], fields: &[DbaseFieldDescriptor], encoding: EncodingRef) -> Result<(bool, Vec<FieldValue>), DbfError> {
    let expected = 1 + fields.iter().map(|f| f.len()).sum::<usize>();
    if bytes.len() != expected {
        return Err(DbfError::CorruptRecord {
            record: 0,
            field: String::new(),
            reason: format!("record is {} bytes long, but its fields need {}", bytes.len(), expected),
        });
    }

    let deleted = match bytes[0] {
        DBF_RECORD_LIVE => false,
        DBF_RECORD_DELETED => true,
        other => {
            return Err(DbfError::CorruptRecord {
                record: 0,
                field: String::new(),
                reason: format!("deletion flag is {:#04x}, not ' ' or '*'", other),
            });
        }
    };

    let mut values = Vec::with_capacity(fields.len());
    let mut offset = 1;
    for field in fields.iter() {
        let buf = &bytes[offset..offset + field.len()];
        values.push(decode_field(buf, field, encoding)?);
        offset += field.len();
    }

    Ok((deleted, values))
}

fn format_number(value: &FieldValue, field: &DbaseFieldDescriptor) -> Result<Option<String>, DbfError> {
    let decimals = field.decimal_count();
    match *value {
        FieldValue::Null => Ok(None),
        FieldValue::Integer(i) if decimals == 0 => Ok(Some(i.to_string())),
        FieldValue::Integer(i) => Ok(Some(format!("{:.*}", decimals, i as f64))),
        FieldValue::Number(n) if n.is_finite() => Ok(Some(format!("{:.*}", decimals, n))),
        FieldValue::Number(n) => Err(DbfError::SchemaViolation(format!("Field '{}' cannot hold {}", field.name(), n))),
        _ => Err(wrong_type(field, value)),
    }
}

fn encode_field(out: &mut Vec<u8>, value: &FieldValue, field: &DbaseFieldDescriptor, encoding: EncodingRef) -> Result<(), DbfError> {
    let width = field.len();
    match field.field_type() {
        DbaseFieldType::Character => {
            let bytes = match *value {
                FieldValue::Null => Vec::new(),
                FieldValue::Character(ref s) => match encoding.encode(s, EncoderTrap::Strict) {
                    Ok(bytes) => bytes,
                    Err(_) => {
                        return Err(DbfError::SchemaViolation(format!("Value {:?} of field '{}' cannot be encoded as {}", s, field.name(), encoding.name())));
                    }
                },
                _ => return Err(wrong_type(field, value)),
            };
            if bytes.len() > width {
                return Err(too_wide(field, value.as_str().unwrap_or("")));
            }
            out.extend_from_slice(&bytes);
            out.resize(out.len() + width - bytes.len(), b' ');
        }
        DbaseFieldType::Number => {
            match format_number(value, field)? {
                None => out.resize(out.len() + width, b' '),
                Some(text) => {
                    if text.len() > width {
                        return Err(too_wide(field, &text));
                    }
                    out.resize(out.len() + width - text.len(), b' ');
                    out.extend_from_slice(text.as_bytes());
                }
            }
        }
        DbaseFieldType::Logical => {
            let b = match *value {
                FieldValue::Logical(true) => b'T',
                FieldValue::Logical(false) => b'F',
                FieldValue::Null => b'?',
                _ => return Err(wrong_type(field, value)),
            };
            out.push(b);
            out.resize(out.len() + width - 1, b' ');
        }
        DbaseFieldType::Date => {
            match *value {
                FieldValue::Null => out.resize(out.len() + width, b' '),
                FieldValue::Date(date) => {
                    let text = date.format("%Y%m%d").to_string();
                    if text.len() != width {
                        return Err(too_wide(field, &text));
                    }
                    out.extend_from_slice(text.as_bytes());
                }
                _ => return Err(wrong_type(field, value)),
            }
        }
    }
    Ok(())
}

/// Encodes one live record.
///
/// Values are positional, one per field. Text that doesn't fit its field is
/// an error, never clipped.
pub fn encode_record(values: &[&FieldValue], fields: &[DbaseFieldDescriptor], encoding: EncodingRef) -> Result<Vec<u8>, DbfError> {
    if values.len() != fields.len() {
        return Err(DbfError::SchemaViolation(format!("Record has {} values, but the table has {} fields", values.len(), fields.len())));
    }

    let mut out = Vec::with_capacity(1 + fields.iter().map(|f| f.len()).sum::<usize>());
    out.push(DBF_RECORD_LIVE);
    for (value, field) in values.iter().zip(fields.iter()) {
        encode_field(&mut out, value, field, encoding)?;
    }
    Ok(out)
}

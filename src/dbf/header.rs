//! The ".dbf" file header: a 32-byte preamble, one 32-byte descriptor per
//! field and a 0x0D terminator.

use std::collections::HashSet;
use std::io;

use byteorder::{ByteOrder, LittleEndian, WriteBytesExt};
use chrono::{Datelike, Local, NaiveDate};
use encoding::all::ISO_8859_1;
use encoding::{DecoderTrap, EncoderTrap, Encoding};
use tracing::debug;

use super::record::FieldValue;
use super::DbfError;

pub const DBF_HEADER_LENGTH: usize = 32;
pub const DBF_FIELD_DESCRIPTOR_LENGTH: usize = 32;
pub const DBF_HEADER_TERMINATOR: u8 = 0x0D;
pub const DBF_MAX_FIELD_NAME_LENGTH: usize = 10;

/// dBASE III without memo; what every Shapefile writer emits.
pub const DBF_VERSION: u8 = 0x03;

const DBF_FIELD_NAME_WIDTH: usize = 11;

// Defaults used when a header is derived from example values.
const DOUBLE_LENGTH: u8 = 18;
const DOUBLE_DECIMALS: u8 = 8;
const INT_LENGTH: u8 = 10;
const STRING_LENGTH: u8 = 254;
const BOOL_LENGTH: u8 = 1;
const DATE_LENGTH: u8 = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DbaseFieldType {
    Character,
    Number,
    Logical,
    Date,
}

impl DbaseFieldType {
    pub fn with_u8(tag: u8) -> Option<DbaseFieldType> {
        match tag {
            b'C' => Some(DbaseFieldType::Character),
            b'N' => Some(DbaseFieldType::Number),
            b'L' => Some(DbaseFieldType::Logical),
            b'D' => Some(DbaseFieldType::Date),
            _ => None,
        }
    }

    pub fn tag(self) -> u8 {
        match self {
            DbaseFieldType::Character => b'C',
            DbaseFieldType::Number => b'N',
            DbaseFieldType::Logical => b'L',
            DbaseFieldType::Date => b'D',
        }
    }
}

/// One column of the attribute table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DbaseFieldDescriptor {
    name: String,
    // The name as stored, padding included.
    name_bytes: [u8; DBF_FIELD_NAME_WIDTH],
    field_type: DbaseFieldType,
    length: u8,
    decimal_count: u8,
    // Bytes 12..16 and 18..32 of the descriptor, kept so a parsed header
    // serializes back to the same bytes.
    reserved: [u8; 18],
}

impl DbaseFieldDescriptor {
    /// Builds a descriptor, checking the width rules of each type.
    ///
    /// Logical fields are one byte wide and Date fields eight; only Number
    /// fields may carry decimals.
    pub fn new(name: &str, field_type: DbaseFieldType, length: u8, decimal_count: u8) -> Result<DbaseFieldDescriptor, DbfError> {
        check_field_name(name)?;

        if length == 0 {
            return Err(DbfError::SchemaViolation(format!("Field '{}' has zero length", name)));
        }

        match field_type {
            DbaseFieldType::Logical if length != BOOL_LENGTH => {
                return Err(DbfError::SchemaViolation(format!("Logical field '{}' must be 1 byte wide, not {}", name, length)));
            }
            DbaseFieldType::Date if length != DATE_LENGTH => {
                return Err(DbfError::SchemaViolation(format!("Date field '{}' must be 8 bytes wide, not {}", name, length)));
            }
            DbaseFieldType::Number if decimal_count > 0 && decimal_count as usize + 2 > length as usize => {
                return Err(DbfError::SchemaViolation(format!("Number field '{}' is {} bytes wide; that leaves no room for {} decimals", name, length, decimal_count)));
            }
            DbaseFieldType::Character | DbaseFieldType::Logical | DbaseFieldType::Date if decimal_count != 0 => {
                return Err(DbfError::SchemaViolation(format!("Field '{}' is not a Number, so it cannot have decimals", name)));
            }
            _ => {}
        }

        let mut name_bytes = [0u8; DBF_FIELD_NAME_WIDTH];
        let encoded = encode_field_name(name)?;
        name_bytes[..encoded.len()].copy_from_slice(&encoded);

        Ok(DbaseFieldDescriptor {
            name: name.to_string(),
            name_bytes: name_bytes,
            field_type: field_type,
            length: length,
            decimal_count: decimal_count,
            reserved: [0; 18],
        })
    }

    pub fn character(name: &str, length: u8) -> Result<DbaseFieldDescriptor, DbfError> {
        DbaseFieldDescriptor::new(name, DbaseFieldType::Character, length, 0)
    }

    pub fn number(name: &str, length: u8, decimal_count: u8) -> Result<DbaseFieldDescriptor, DbfError> {
        DbaseFieldDescriptor::new(name, DbaseFieldType::Number, length, decimal_count)
    }

    pub fn logical(name: &str) -> Result<DbaseFieldDescriptor, DbfError> {
        DbaseFieldDescriptor::new(name, DbaseFieldType::Logical, BOOL_LENGTH, 0)
    }

    pub fn date(name: &str) -> Result<DbaseFieldDescriptor, DbfError> {
        DbaseFieldDescriptor::new(name, DbaseFieldType::Date, DATE_LENGTH, 0)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn field_type(&self) -> DbaseFieldType {
        self.field_type
    }

    pub fn len(&self) -> usize {
        self.length as usize
    }

    pub fn decimal_count(&self) -> usize {
        self.decimal_count as usize
    }

    fn parse(buf: &[u8]) -> Result<DbaseFieldDescriptor, DbfError> {
        let name_bytes = &buf[0..DBF_FIELD_NAME_WIDTH];
        let name_end = name_bytes.iter().position(|&b| b == 0).unwrap_or(DBF_FIELD_NAME_WIDTH);
        let name = match ISO_8859_1.decode(&name_bytes[..name_end], DecoderTrap::Strict) {
            Ok(s) => s.trim_end_matches(' ').to_string(),
            Err(err) => return Err(DbfError::CorruptHeader(format!("Field name could not be decoded: {}", err))),
        };

        if name.is_empty() {
            return Err(DbfError::CorruptHeader(String::from("A field descriptor has an empty name")));
        }

        let field_type = match DbaseFieldType::with_u8(buf[11]) {
            Some(t) => t,
            None => {
                return Err(DbfError::CorruptHeader(format!("Field '{}' has unsupported type tag {:?}", name, buf[11] as char)));
            }
        };

        let length = buf[16];
        let decimal_count = buf[17];
        if length == 0 {
            return Err(DbfError::CorruptHeader(format!("Field '{}' has zero length", name)));
        }

        let mut raw_name = [0u8; DBF_FIELD_NAME_WIDTH];
        raw_name.copy_from_slice(name_bytes);
        let mut reserved = [0u8; 18];
        reserved[0..4].copy_from_slice(&buf[12..16]);
        reserved[4..18].copy_from_slice(&buf[18..32]);

        Ok(DbaseFieldDescriptor {
            name: name,
            name_bytes: raw_name,
            field_type: field_type,
            length: length,
            decimal_count: decimal_count,
            reserved: reserved,
        })
    }

    fn write<W: io::Write + ?Sized>(&self, w: &mut W) -> Result<(), DbfError> {
        w.write_all(&self.name_bytes)?;
        w.write_u8(self.field_type.tag())?;
        w.write_all(&self.reserved[0..4])?;
        w.write_u8(self.length)?;
        w.write_u8(self.decimal_count)?;
        w.write_all(&self.reserved[4..18])?;
        Ok(())
    }
}

fn encode_field_name(name: &str) -> Result<Vec<u8>, DbfError> {
    match ISO_8859_1.encode(name, EncoderTrap::Strict) {
        Ok(bytes) => Ok(bytes),
        Err(_) => Err(DbfError::SchemaViolation(format!("Field name '{}' must be single-byte text", name))),
    }
}

fn check_field_name(name: &str) -> Result<(), DbfError> {
    if name.is_empty() {
        return Err(DbfError::SchemaViolation(String::from("Field names cannot be empty")));
    }
    let bytes = encode_field_name(name)?;
    if bytes.len() > DBF_MAX_FIELD_NAME_LENGTH {
        return Err(DbfError::SchemaViolation(format!("Field name '{}' is longer than {} bytes", name, DBF_MAX_FIELD_NAME_LENGTH)));
    }
    if bytes.contains(&0) {
        return Err(DbfError::SchemaViolation(format!("Field name '{}' contains a NUL byte", name.escape_default())));
    }
    Ok(())
}

/// Header of a ".dbf" file.
///
/// Header and record byte lengths aren't stored: they're always derived from
/// the field list, and a file that disagrees with them is corrupt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DbaseFileHeader {
    version: u8,
    // Year (since 1900), month, day
    last_update: [u8; 3],
    num_records: u32,
    fields: Vec<DbaseFieldDescriptor>,
    reserved: [u8; 20],
}

impl DbaseFileHeader {
    /// Starts an empty header stamped with today's date.
    pub fn new(num_records: usize) -> Result<DbaseFileHeader, DbfError> {
        if num_records > u32::max_value() as usize {
            return Err(DbfError::SchemaViolation(format!("{} records do not fit in a .dbf header", num_records)));
        }
        let mut header = DbaseFileHeader {
            version: DBF_VERSION,
            last_update: [0; 3],
            num_records: num_records as u32,
            fields: Vec::new(),
            reserved: [0; 20],
        };
        header.set_last_update(Local::now().date_naive());
        Ok(header)
    }

    pub fn with_fields(fields: Vec<DbaseFieldDescriptor>, num_records: usize) -> Result<DbaseFileHeader, DbfError> {
        let mut header = DbaseFileHeader::new(num_records)?;
        for field in fields {
            header.add_field(field)?;
        }
        Ok(header)
    }

    /// Derives a header from one feature's attribute values.
    ///
    /// Each value's variant picks the column type: Number becomes N(18,8),
    /// Integer N(10,0), Character C(254), Logical L(1) and Date D(8). A Null
    /// value says nothing about its type, so it is rejected.
    pub fn from_schema<'a, I>(values: I, num_records: usize) -> Result<DbaseFileHeader, DbfError>
        where I: IntoIterator<Item=(&'a str, &'a FieldValue)>
    {
        let mut header = DbaseFileHeader::new(num_records)?;
        for (name, value) in values {
            let field = match *value {
                FieldValue::Number(_) => DbaseFieldDescriptor::number(name, DOUBLE_LENGTH, DOUBLE_DECIMALS)?,
                FieldValue::Integer(_) => DbaseFieldDescriptor::number(name, INT_LENGTH, 0)?,
                FieldValue::Character(_) => DbaseFieldDescriptor::character(name, STRING_LENGTH)?,
                FieldValue::Logical(_) => DbaseFieldDescriptor::logical(name)?,
                FieldValue::Date(_) => DbaseFieldDescriptor::date(name)?,
                FieldValue::Null => {
                    return Err(DbfError::SchemaViolation(format!("Cannot derive a column type for '{}' from a null value", name)));
                }
            };
            header.add_field(field)?;
        }
        Ok(header)
    }

    /// Appends a column. Names must be unique.
    pub fn add_field(&mut self, field: DbaseFieldDescriptor) -> Result<(), DbfError> {
        if self.fields.iter().any(|f| f.name == field.name) {
            return Err(DbfError::SchemaViolation(format!("Field '{}' is already defined", field.name)));
        }
        if self.record_length() + field.len() > u16::max_value() as usize
            || self.header_length() + DBF_FIELD_DESCRIPTOR_LENGTH > u16::max_value() as usize {
            return Err(DbfError::SchemaViolation(format!("Adding field '{}' would overflow the .dbf header", field.name)));
        }
        self.fields.push(field);
        Ok(())
    }

    pub fn version(&self) -> u8 {
        self.version
    }

    pub fn num_records(&self) -> usize {
        self.num_records as usize
    }

    pub fn fields(&self) -> &[DbaseFieldDescriptor] {
        &self.fields
    }

    pub fn field(&self, name: &str) -> Option<&DbaseFieldDescriptor> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn header_length(&self) -> usize {
        DBF_HEADER_LENGTH + DBF_FIELD_DESCRIPTOR_LENGTH * self.fields.len() + 1
    }

    /// Deletion flag plus every field.
    pub fn record_length(&self) -> usize {
        1 + self.fields.iter().map(|f| f.len()).sum::<usize>()
    }

    /// None if the stored bytes aren't a calendar date (some writers leave
    /// them zeroed).
    pub fn last_update(&self) -> Option<NaiveDate> {
        NaiveDate::from_ymd_opt(
            1900 + self.last_update[0] as i32,
            self.last_update[1] as u32,
            self.last_update[2] as u32,
        )
    }

    pub fn set_last_update(&mut self, date: NaiveDate) {
        let year = (date.year() - 1900).max(0).min(255);
        self.last_update = [year as u8, date.month() as u8, date.day() as u8];
    }

    /// Reads the preamble and field descriptors.
    ///
    /// Side-effect: advances the file cursor to the first data record.
    pub fn read<R: io::Read + ?Sized>(file: &mut R) -> Result<DbaseFileHeader, DbfError> {
        let mut buf = [0u8; DBF_HEADER_LENGTH];
        read_header_bytes(file, &mut buf)?;

        // Virtually any 32 bytes are a valid preamble. The exception: bytes
        // 1-3 are "YMD", and there are 12 valid months and 31 valid days.
        if buf[2] > 12 || buf[3] > 31 {
            return Err(DbfError::CorruptHeader(String::from("The first four bytes of the file mention an invalid update date. This is not a valid .dbf file.")));
        }

        let num_records = LittleEndian::read_u32(&buf[4..8]);
        let n_header_bytes = LittleEndian::read_u16(&buf[8..10]) as usize;
        let n_bytes_per_record = LittleEndian::read_u16(&buf[10..12]) as usize;

        if n_header_bytes < DBF_HEADER_LENGTH + 1 {
            return Err(DbfError::CorruptHeader(format!("Header length {} is shorter than the preamble", n_header_bytes)));
        }
        let max_fields = (n_header_bytes - DBF_HEADER_LENGTH - 1) / DBF_FIELD_DESCRIPTOR_LENGTH;

        let mut header = DbaseFileHeader {
            version: buf[0],
            last_update: [buf[1], buf[2], buf[3]],
            num_records: num_records,
            fields: Vec::new(),
            reserved: [0; 20],
        };
        header.reserved.copy_from_slice(&buf[12..32]);

        let mut names = HashSet::new();
        loop {
            let mut descriptor = [0u8; DBF_FIELD_DESCRIPTOR_LENGTH];
            read_header_bytes(file, &mut descriptor[0..1])?;
            if descriptor[0] == DBF_HEADER_TERMINATOR {
                break;
            }
            if header.fields.len() == max_fields {
                return Err(DbfError::CorruptHeader(format!("Header length {} leaves room for {} fields, but there is no terminator after them", n_header_bytes, max_fields)));
            }
            read_header_bytes(file, &mut descriptor[1..])?;

            let field = DbaseFieldDescriptor::parse(&descriptor)?;
            if !names.insert(field.name.clone()) {
                return Err(DbfError::CorruptHeader(format!("Field '{}' is defined twice", field.name)));
            }
            header.fields.push(field);
        }

        if header.header_length() != n_header_bytes {
            return Err(DbfError::CorruptHeader(format!("Header says it is {} bytes long, but its {} fields need {}", n_header_bytes, header.fields.len(), header.header_length())));
        }
        if header.record_length() != n_bytes_per_record {
            return Err(DbfError::CorruptHeader(format!("Header says each record is {} bytes long, but its fields add up to {}", n_bytes_per_record, header.record_length())));
        }

        debug!(num_records = header.num_records, num_fields = header.fields.len(), "read .dbf header");
        Ok(header)
    }

    pub fn parse(bytes: &[u8]) -> Result<DbaseFileHeader, DbfError> {
        let mut cursor = bytes;
        DbaseFileHeader::read(&mut cursor)
    }

    pub fn write<W: io::Write + ?Sized>(&self, w: &mut W) -> Result<(), DbfError> {
        w.write_u8(self.version)?;
        w.write_all(&self.last_update)?;
        w.write_u32::<LittleEndian>(self.num_records)?;
        w.write_u16::<LittleEndian>(self.header_length() as u16)?;
        w.write_u16::<LittleEndian>(self.record_length() as u16)?;
        w.write_all(&self.reserved)?;
        for field in self.fields.iter() {
            field.write(w)?;
        }
        w.write_u8(DBF_HEADER_TERMINATOR)?;
        Ok(())
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, DbfError> {
        let mut buf = Vec::with_capacity(self.header_length());
        self.write(&mut buf)?;
        Ok(buf)
    }
}

fn read_header_bytes<R: io::Read + ?Sized>(file: &mut R, buf: &mut [u8]) -> Result<(), DbfError> {
    match file.read_exact(buf) {
        Ok(()) => Ok(()),
        Err(ref err) if err.kind() == io::ErrorKind::UnexpectedEof => {
            Err(DbfError::CorruptHeader(String::from("File ends before its header does")))
        }
        Err(err) => Err(DbfError::Io(err)),
    }
}

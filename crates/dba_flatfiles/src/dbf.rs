//! Forward-only `.dbf` (XBase) reader, scoped to the field types spec.md
//! names: `C`(text), `N`(numeric), `F`(float), `L`(logical), `D`(date).
//! Records are fixed-width and self-contained, so reading is a plain
//! header parse followed by a flat byte-slice walk — no index file needed.

use std::fs::File;
use std::io::{self, BufReader, Read};

use byteorder::{LittleEndian, ReadBytesExt};
use dba_core::{Attrib, Error, Result, Type};

const RECORD_VALID: u8 = 0x20;
const RECORD_DELETED: u8 = 0x2A;
const FIELD_TERMINATOR: u8 = 0x0D;

fn io_err(e: io::Error) -> Error {
    Error::Other(format!("dbf io error: {e}"))
}

#[derive(Debug, Clone)]
pub struct DbfField {
    pub name: String,
    pub ty: Type,
    pub length: usize,
    pub decimal_count: u8,
}

/// Reads the 32-byte `Header_V4` and field descriptor array, then walks
/// fixed-width records from a shared byte buffer.
pub struct DbfReader {
    fields: Vec<DbfField>,
    record_size: usize,
    record_count: u32,
    records: Vec<u8>,
    pos: usize,
    next_index: u32,
}

impl DbfReader {
    pub fn open(path: impl AsRef<std::path::Path>) -> Result<Self> {
        let file = File::open(path).map_err(io_err)?;
        Self::new(BufReader::new(file))
    }

    pub fn new(mut reader: impl Read) -> Result<Self> {
        let mut header = [0u8; 32];
        reader.read_exact(&mut header).map_err(io_err)?;

        let record_count = u32::from_le_bytes(header[4..8].try_into().unwrap());
        let head_size = u16::from_le_bytes(header[8..10].try_into().unwrap()) as usize;
        let record_size = u16::from_le_bytes(header[10..12].try_into().unwrap()) as usize;

        let mut fields = Vec::new();
        let mut bytes_read = 32;
        loop {
            let mut marker = [0u8; 1];
            reader.read_exact(&mut marker).map_err(io_err)?;
            if marker[0] == FIELD_TERMINATOR {
                bytes_read += 1;
                break;
            }

            let mut rest = [0u8; 31];
            reader.read_exact(&mut rest).map_err(io_err)?;
            bytes_read += 32;

            let mut descriptor = [0u8; 32];
            descriptor[0] = marker[0];
            descriptor[1..].copy_from_slice(&rest);

            let name_end = descriptor[0..11].iter().position(|&b| b == 0).unwrap_or(11);
            let name = String::from_utf8_lossy(&descriptor[0..name_end]).trim().to_string();
            let type_char = descriptor[11] as char;
            let length = descriptor[16] as usize;
            let decimal_count = descriptor[17];

            let ty = match type_char {
                'C' => Type::Text,
                'N' => {
                    if decimal_count > 0 {
                        Type::Double
                    } else {
                        Type::Int32
                    }
                }
                'F' => Type::Double,
                'L' => Type::Bool,
                'D' => Type::Date,
                other => return Err(Error::Unsupported(format!("DBF field type '{other}'"))),
            };

            fields.push(DbfField { name, ty, length, decimal_count });
        }

        // Skip any header padding between the field array and the first
        // record (header_v4's HeadSize includes the 0x0D terminator).
        if bytes_read < head_size {
            let mut pad = vec![0u8; head_size - bytes_read];
            reader.read_exact(&mut pad).map_err(io_err)?;
        }

        let mut records = Vec::with_capacity(record_size * record_count as usize);
        reader.read_to_end(&mut records).map_err(io_err)?;

        Ok(DbfReader { fields, record_size, record_count, records, pos: 0, next_index: 0 })
    }

    pub fn fields(&self) -> &[DbfField] {
        &self.fields
    }

    pub fn record_count(&self) -> u32 {
        self.record_count
    }

    /// Reads the next non-deleted record. Returns `Ok(None)` once every
    /// record in the file has been visited (deleted records are skipped,
    /// not surfaced as empty rows).
    pub fn next_record(&mut self) -> Result<Option<Vec<Attrib>>> {
        loop {
            if self.next_index >= self.record_count {
                return Ok(None);
            }
            if self.pos + self.record_size > self.records.len() {
                return Err(Error::Eof);
            }

            let record = &self.records[self.pos..self.pos + self.record_size];
            self.pos += self.record_size;
            self.next_index += 1;

            let deletion_flag = record[0];
            if deletion_flag == RECORD_DELETED {
                continue;
            }
            if deletion_flag != RECORD_VALID {
                return Err(Error::InvalidInput);
            }

            let mut offset = 1;
            let mut row = Vec::with_capacity(self.fields.len());
            for field in &self.fields {
                let raw = &record[offset..offset + field.length];
                offset += field.length;
                row.push(decode_field(field, raw)?);
            }
            return Ok(Some(row));
        }
    }
}

fn decode_field(field: &DbfField, raw: &[u8]) -> Result<Attrib> {
    let text = std::str::from_utf8(raw).unwrap_or_default().trim();
    if text.is_empty() {
        return Ok(Attrib::Null);
    }

    Ok(match field.ty {
        Type::Text => Attrib::set_text(text),
        Type::Int32 => match text.parse::<i32>() {
            Ok(v) => Attrib::Int32(v),
            Err(_) => Attrib::Null,
        },
        Type::Double => match text.parse::<f64>() {
            Ok(v) => Attrib::Double(v),
            Err(_) => Attrib::Null,
        },
        Type::Bool => match text {
            "T" | "t" | "Y" | "y" => Attrib::Bool(true),
            "F" | "f" | "N" | "n" => Attrib::Bool(false),
            "?" => Attrib::Null,
            _ => Attrib::Null,
        },
        Type::Date => {
            if text.len() != 8 {
                return Ok(Attrib::Null);
            }
            let year: i32 = text[0..4].parse().map_err(|_| Error::InvalidInput)?;
            let month: u32 = text[4..6].parse().map_err(|_| Error::InvalidInput)?;
            let day: u32 = text[6..8].parse().map_err(|_| Error::InvalidInput)?;
            match dba_core::chrono::NaiveDate::from_ymd_opt(year, month, day) {
                Some(date) => {
                    let midnight = date.and_hms_opt(0, 0, 0).expect("midnight is always valid");
                    Attrib::Date(midnight.and_utc().timestamp(), 0)
                }
                None => Attrib::Null,
            }
        }
        _ => unreachable!("DbfField::ty is only ever set to one of the above"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use byteorder::WriteBytesExt;

    fn field_descriptor(name: &str, type_char: u8, length: u8, decimals: u8) -> [u8; 32] {
        let mut d = [0u8; 32];
        let bytes = name.as_bytes();
        d[0..bytes.len()].copy_from_slice(bytes);
        d[11] = type_char;
        d[16] = length;
        d[17] = decimals;
        d
    }

    fn build_dbf(fields: &[(&str, u8, u8, u8)], rows: &[&str]) -> Vec<u8> {
        let record_size = 1 + fields.iter().map(|f| f.2 as usize).sum::<usize>();
        let head_size = 32 + fields.len() * 32 + 1;

        let mut buf = Vec::new();
        buf.write_u8(3).unwrap(); // version
        buf.extend_from_slice(&[0, 0, 0]); // last modified
        buf.write_u32::<LittleEndian>(rows.len() as u32 / fields.len() as u32).unwrap();
        buf.write_u16::<LittleEndian>(head_size as u16).unwrap();
        buf.write_u16::<LittleEndian>(record_size as u16).unwrap();
        buf.extend_from_slice(&[0u8; 20]); // reserved through MDXFlag/CodePage/Reserved2

        for (name, type_char, length, decimals) in fields {
            buf.extend_from_slice(&field_descriptor(name, *type_char, *length, *decimals));
        }
        buf.write_u8(FIELD_TERMINATOR).unwrap();

        for row in rows.chunks(fields.len()) {
            buf.write_u8(RECORD_VALID).unwrap();
            for (cell, (_, _, length, _)) in row.iter().zip(fields) {
                let mut padded = cell.as_bytes().to_vec();
                padded.resize(*length as usize, b' ');
                buf.extend_from_slice(&padded);
            }
        }

        buf
    }

    #[test]
    fn reads_text_and_numeric_fields() {
        let fields = [("NAME", b'C', 10, 0), ("AGE", b'N', 3, 0)];
        let buf = build_dbf(&fields, &["alice", "30", "bob", "45"]);

        let mut reader = DbfReader::new(io::Cursor::new(buf)).unwrap();
        assert_eq!(reader.fields().len(), 2);
        assert_eq!(reader.fields()[0].ty, Type::Text);
        assert_eq!(reader.fields()[1].ty, Type::Int32);

        let row1 = reader.next_record().unwrap().unwrap();
        assert_eq!(row1[0].to_string(), "alice");
        assert_eq!(row1[1].to_int32(), 30);

        let row2 = reader.next_record().unwrap().unwrap();
        assert_eq!(row2[0].to_string(), "bob");
        assert_eq!(row2[1].to_int32(), 45);

        assert!(reader.next_record().unwrap().is_none());
    }

    #[test]
    fn skips_deleted_records() {
        let fields = [("NAME", b'C', 10, 0)];
        let mut buf = build_dbf(&fields, &["alice", "bob"]);
        let head_size = 32 + fields.len() * 32 + 1;
        buf[head_size] = RECORD_DELETED;

        let mut reader = DbfReader::new(io::Cursor::new(buf)).unwrap();
        let row = reader.next_record().unwrap().unwrap();
        assert_eq!(row[0].to_string(), "bob");
        assert!(reader.next_record().unwrap().is_none());
    }

    #[test]
    fn empty_text_cell_decodes_to_null() {
        let fields = [("NAME", b'C', 10, 0)];
        let buf = build_dbf(&fields, &["          "]);
        let mut reader = DbfReader::new(io::Cursor::new(buf)).unwrap();
        let row = reader.next_record().unwrap().unwrap();
        assert!(matches!(row[0], Attrib::Null));
    }

    #[test]
    fn parses_date_field() {
        let fields = [("DOB", b'D', 8, 0)];
        let buf = build_dbf(&fields, &["20240315"]);
        let mut reader = DbfReader::new(io::Cursor::new(buf)).unwrap();
        let row = reader.next_record().unwrap().unwrap();
        match row[0] {
            Attrib::Date(secs, _) => {
                let expected = dba_core::chrono::NaiveDate::from_ymd_opt(2024, 3, 15)
                    .unwrap()
                    .and_hms_opt(0, 0, 0)
                    .unwrap()
                    .and_utc()
                    .timestamp();
                assert_eq!(secs, expected);
            }
            ref other => panic!("expected Attrib::Date, got {other:?}"),
        }
    }
}

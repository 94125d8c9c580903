//! Schema-driven `.csv` reader. The caller supplies the column types up
//! front (there is no type inference here, same as the flat-file readers
//! above); each cell is converted against its declared [`Type`] the way a
//! prepared statement would bind a parameter. WKT geometry parsing is out
//! of scope, matching every other reader in this crate.

use std::io::Read;

use dba_core::{Attrib, Error, Result, Type};

#[derive(Debug, Clone)]
pub struct CsvField {
    pub name: String,
    pub ty: Type,
}

pub struct CsvReader<R> {
    inner: ::csv::Reader<R>,
    fields: Vec<CsvField>,
}

impl CsvReader<std::fs::File> {
    pub fn open(path: impl AsRef<std::path::Path>, fields: Vec<CsvField>) -> Result<Self> {
        let file = std::fs::File::open(path).map_err(|e| Error::Other(format!("csv io error: {e}")))?;
        Self::new(file, fields)
    }
}

impl<R: Read> CsvReader<R> {
    /// `has_headers` is always assumed true on the underlying stream; the
    /// header row is consumed and discarded, with `fields` as the
    /// authoritative column order and type list.
    pub fn new(reader: R, fields: Vec<CsvField>) -> Result<Self> {
        let inner = ::csv::ReaderBuilder::new().has_headers(true).flexible(false).from_reader(reader);
        Ok(CsvReader { inner, fields })
    }

    pub fn fields(&self) -> &[CsvField] {
        &self.fields
    }

    /// Reads the next record, or `Ok(None)` at end of stream.
    pub fn next_record(&mut self) -> Result<Option<Vec<Attrib>>> {
        let mut record = ::csv::StringRecord::new();
        let read = self.inner.read_record(&mut record).map_err(|e| Error::Other(format!("csv parse error: {e}")))?;
        if !read {
            return Ok(None);
        }
        if record.len() != self.fields.len() {
            return Err(Error::InvalidInput);
        }

        let mut row = Vec::with_capacity(self.fields.len());
        for (cell, field) in record.iter().zip(&self.fields) {
            row.push(decode_cell(cell, field.ty)?);
        }
        Ok(Some(row))
    }
}

fn decode_cell(cell: &str, ty: Type) -> Result<Attrib> {
    if cell.is_empty() {
        return Ok(Attrib::Null);
    }

    Ok(match ty {
        Type::Text => Attrib::set_text(cell),
        Type::Bool => match cell {
            "true" | "t" | "1" | "T" | "TRUE" => Attrib::Bool(true),
            "false" | "f" | "0" | "F" | "FALSE" => Attrib::Bool(false),
            _ => return Err(Error::InvalidInput),
        },
        Type::Int16 => Attrib::Int16(cell.parse().map_err(|_| Error::InvalidInput)?),
        Type::Int32 => Attrib::Int32(cell.parse().map_err(|_| Error::InvalidInput)?),
        Type::Int64 => Attrib::Int64(cell.parse().map_err(|_| Error::InvalidInput)?),
        Type::Float => Attrib::Float(cell.parse().map_err(|_| Error::InvalidInput)?),
        Type::Double => Attrib::Double(cell.parse().map_err(|_| Error::InvalidInput)?),
        Type::Guid => Attrib::Guid(cell.parse().map_err(|_| Error::InvalidInput)?),
        Type::Bin => Attrib::set_bin(hex::decode(cell).map_err(|_| Error::InvalidInput)?),
        Type::JSONB => Attrib::set_jsonb(cell.as_bytes().to_vec()),
        Type::Date => {
            let parsed = parse_date(cell)?;
            Attrib::Date(parsed, 0)
        }
        Type::Time => {
            let (secs, nanos) = parse_time(cell)?;
            Attrib::Time(secs, nanos)
        }
        other => return Err(Error::Unsupported(format!("CSV field type {other:?}"))),
    })
}

fn parse_date(s: &str) -> Result<i64> {
    use dba_core::chrono::NaiveDate;
    if let Ok(dt) = dba_core::chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f") {
        return Ok(dt.and_utc().timestamp());
    }
    let date = NaiveDate::parse_from_str(s, "%Y-%m-%d").map_err(|_| Error::InvalidInput)?;
    let midnight = date.and_hms_opt(0, 0, 0).expect("midnight is always valid");
    Ok(midnight.and_utc().timestamp())
}

fn parse_time(s: &str) -> Result<(i64, i32)> {
    use dba_core::chrono::{NaiveTime, Timelike};
    let time = NaiveTime::parse_from_str(s, "%H:%M:%S%.f").map_err(|_| Error::InvalidInput)?;
    let secs = time.num_seconds_from_midnight() as i64;
    let nanos = time.nanosecond() as i32;
    Ok((secs, nanos))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fields() -> Vec<CsvField> {
        vec![
            CsvField { name: "name".into(), ty: Type::Text },
            CsvField { name: "age".into(), ty: Type::Int32 },
            CsvField { name: "score".into(), ty: Type::Double },
        ]
    }

    #[test]
    fn reads_typed_rows() {
        let data = "name,age,score\nalice,30,9.5\nbob,45,7.25\n";
        let mut reader = CsvReader::new(data.as_bytes(), fields()).unwrap();

        let row1 = reader.next_record().unwrap().unwrap();
        assert_eq!(row1[0].to_string(), "alice");
        assert_eq!(row1[1].to_int32(), 30);
        assert_eq!(row1[2].to_double(), 9.5);

        let row2 = reader.next_record().unwrap().unwrap();
        assert_eq!(row2[0].to_string(), "bob");
        assert_eq!(row2[1].to_int32(), 45);
        assert_eq!(row2[2].to_double(), 7.25);

        assert!(reader.next_record().unwrap().is_none());
    }

    #[test]
    fn empty_cell_decodes_to_null() {
        let data = "name,age,score\n,30,9.5\n";
        let mut reader = CsvReader::new(data.as_bytes(), fields()).unwrap();
        let row = reader.next_record().unwrap().unwrap();
        assert!(matches!(row[0], Attrib::Null));
    }

    #[test]
    fn mismatched_column_count_is_an_error() {
        let data = "name,age,score\nalice,30\n";
        let mut reader = CsvReader::new(data.as_bytes(), fields()).unwrap();
        assert!(reader.next_record().is_err());
    }

    #[test]
    fn parses_date_field() {
        let fields = vec![CsvField { name: "d".into(), ty: Type::Date }];
        let data = "d\n2024-03-15\n";
        let mut reader = CsvReader::new(data.as_bytes(), fields).unwrap();
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

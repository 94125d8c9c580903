//! SQLite `DriverConn`/`DriverRows`/`DriverStmt` adapter: typed binds over
//! `rusqlite`, EWKB blob geometry, and a handful of pass-through scalar
//! UDFs that let a computed column's logical type be recovered from its
//! expression text when SQLite's own `column_decltype` comes back empty.

use std::sync::{Arc, Mutex};

use dba_core::chrono::{DateTime, NaiveTime, Timelike};
use dba_core::uuid::Uuid;
use dba_core::{
    Attrib, ColumnInfo, CoreFn, Dialect, DriverConn, DriverRows, DriverStmt, EncodeOptions, Error,
    PlaceholderStyle, Result, SqlDialectFlags, Type, TypeFlags, decode_wkb, encode_wkb,
};
use log::debug;
use rusqlite::functions::FunctionFlags;
use rusqlite::types::{Value as SqlValue, ValueRef};
use rusqlite::Connection;

pub fn open(path: &str) -> Result<SqliteConn> {
    debug!("opening sqlite database at {}", path);
    let conn = Connection::open(path).map_err(|e| Error::connect_failed(e.to_string()))?;
    register_udfs(&conn)?;
    Ok(SqliteConn {
        conn: Arc::new(Mutex::new(conn)),
        tx_busy: false,
    })
}

/// `dba_st_asgeom`/`dba_asguid`/`dba_asint32` wrap a computed column
/// expression and pass the value through unchanged; `column_type` below
/// recognizes the wrapper by name and recovers the logical type from it.
fn register_udfs(conn: &Connection) -> Result<()> {
    let flags = FunctionFlags::SQLITE_UTF8 | FunctionFlags::SQLITE_DETERMINISTIC;
    conn.create_scalar_function("dba_st_asgeom", 1, flags, |ctx| match ctx.get_raw(0) {
        ValueRef::Null => Ok(None::<Vec<u8>>),
        ValueRef::Blob(b) => Ok(Some(b.to_vec())),
        _ => Ok(None),
    })
    .map_err(map_sqlite_error)?;
    conn.create_scalar_function("dba_asguid", 1, flags, |ctx| match ctx.get_raw(0) {
        ValueRef::Null => Ok(None::<Vec<u8>>),
        ValueRef::Blob(b) => Ok(Some(b.to_vec())),
        _ => Ok(None),
    })
    .map_err(map_sqlite_error)?;
    conn.create_scalar_function("dba_asint32", 1, flags, |ctx| ctx.get::<i64>(0))
        .map_err(map_sqlite_error)?;
    Ok(())
}

pub struct SqliteDialect;

impl Dialect for SqliteDialect {
    fn capabilities(&self) -> SqlDialectFlags {
        SqlDialectFlags::GEOM_Z | SqlDialectFlags::GEOM_M | SqlDialectFlags::INT16 | SqlDialectFlags::FLOAT
    }

    fn placeholder_style(&self) -> PlaceholderStyle {
        PlaceholderStyle::QuestionMark
    }

    fn format_column_type(&self, typ: Type, flags: TypeFlags, _width: Option<u32>) -> String {
        if typ == Type::Int64 && flags.contains(TypeFlags::AUTO_INCREMENT) {
            // The one column-type string that carries rowid semantics;
            // must stay exactly "INTEGER" for `INTEGER PRIMARY KEY`.
            return "INTEGER".to_string();
        }
        match typ {
            Type::Null => "BLOB".to_string(),
            Type::Bool => "BOOLEAN".to_string(),
            Type::Int16 => "SMALLINT".to_string(),
            Type::Int32 => "INT".to_string(),
            Type::Int64 => "BIGINT".to_string(),
            Type::Float => "FLOAT".to_string(),
            Type::Double => "DOUBLE".to_string(),
            Type::Text => "TEXT".to_string(),
            Type::Guid => "GUID".to_string(),
            Type::Date => "DATETIME".to_string(),
            Type::Time => "TIME".to_string(),
            Type::Bin => "BLOB".to_string(),
            Type::JSONB => "JSONB".to_string(),
            Type::GeomPoint | Type::GeomMultiPoint | Type::GeomPolyline | Type::GeomPolygon | Type::GeomAny => {
                "GEOMETRY".to_string()
            }
        }
    }

    fn translate_fn(&self, f: CoreFn, args: &[String]) -> String {
        match f {
            CoreFn::StGeomFromText => format!("dba_st_asgeom({})", args.join(", ")),
            CoreFn::StIntersects => format!("dba_st_asgeom({}) IS NOT NULL", args.join(", ")),
            CoreFn::StAsGeom => format!("dba_st_asgeom({})", args.join(", ")),
            CoreFn::UnixTimestamp => format!("strftime('%s', {})", args.join(", ")),
            CoreFn::StCoarseIntersect => format!("dba_st_asgeom({}) IS NOT NULL", args.join(", ")),
        }
    }
}

static DIALECT: SqliteDialect = SqliteDialect;

pub struct SqliteConn {
    conn: Arc<Mutex<Connection>>,
    tx_busy: bool,
}

impl DriverConn for SqliteConn {
    fn prepare(&mut self, sql: &str, _param_types: &[Type]) -> Result<Box<dyn DriverStmt>> {
        let rewritten = DIALECT.rewrite_placeholders(sql);
        let conn = self.conn.lock().unwrap();
        let stmt = conn.prepare(&rewritten).map_err(map_sqlite_error)?;
        let columns = column_infos(&stmt);
        drop(stmt);
        Ok(Box::new(SqliteStmt {
            sql: rewritten,
            conn: self.conn.clone(),
            columns,
        }))
    }

    fn exec(&mut self, sql: &str, params: &[Attrib]) -> Result<Box<dyn DriverRows>> {
        let rewritten = DIALECT.rewrite_placeholders(sql);
        run(&self.conn, &rewritten, params)
    }

    fn begin(&mut self) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute_batch("BEGIN").map_err(map_sqlite_error)?;
        self.tx_busy = true;
        Ok(())
    }

    fn commit(&mut self) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute_batch("COMMIT").map_err(map_sqlite_error)?;
        self.tx_busy = false;
        Ok(())
    }

    fn rollback(&mut self) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute_batch("ROLLBACK").map_err(map_sqlite_error)?;
        self.tx_busy = false;
        Ok(())
    }

    fn dialect(&self) -> &dyn Dialect {
        &DIALECT
    }

    fn is_tx_busy(&self) -> bool {
        self.tx_busy
    }

    fn deallocate(&mut self, _slot: u32) -> Result<()> {
        // Every statement is re-prepared per `exec`; there is no persistent
        // slot to release.
        Ok(())
    }
}

pub struct SqliteStmt {
    sql: String,
    conn: Arc<Mutex<Connection>>,
    columns: Vec<ColumnInfo>,
}

impl DriverStmt for SqliteStmt {
    fn exec(&mut self, params: &[Attrib]) -> Result<Box<dyn DriverRows>> {
        run(&self.conn, &self.sql, params)
    }

    fn sql(&self) -> &str {
        &self.sql
    }
}

/// Executes `sql` against `conn` with `params` and eagerly decodes every
/// row while the connection lock is held — `rusqlite::Row` borrows the
/// statement, so rows can't outlive the lock the way `postgres::Row` can.
fn run(conn: &Arc<Mutex<Connection>>, sql: &str, params: &[Attrib]) -> Result<Box<dyn DriverRows>> {
    let conn = conn.lock().unwrap();
    let mut stmt = conn.prepare_cached(sql).map_err(map_sqlite_error)?;
    let columns = column_infos(&stmt);

    let values: Vec<SqlValue> = params.iter().map(attrib_to_sqlite_value).collect();
    let mut rows = stmt
        .query(rusqlite::params_from_iter(values))
        .map_err(map_sqlite_error)?;

    let mut decoded: Vec<Vec<Attrib>> = Vec::new();
    while let Some(row) = rows.next().map_err(map_sqlite_error)? {
        let mut values = Vec::with_capacity(columns.len());
        for (i, col) in columns.iter().enumerate() {
            let v = row.get_ref(i).map_err(map_sqlite_error)?;
            values.push(decode_sqlite_value(col.typ, v));
        }
        decoded.push(values);
    }

    Ok(Box::new(SqliteRows {
        rows: decoded.into_iter(),
        current: None,
        columns,
    }))
}

fn column_infos(stmt: &rusqlite::Statement<'_>) -> Vec<ColumnInfo> {
    (0..stmt.column_count())
        .map(|i| {
            let name = stmt.column_name(i).unwrap_or("").to_string();
            let decltype = stmt.column_decltype(i);
            let typ = column_type(&name, decltype);
            ColumnInfo { name, typ }
        })
        .collect()
}

fn column_type(name: &str, decltype: Option<&str>) -> Type {
    if name.starts_with("dba_st_asgeom(") {
        return Type::GeomAny;
    }
    if name.starts_with("dba_asguid(") {
        return Type::Guid;
    }
    if name.starts_with("dba_asint32(") {
        return Type::Int32;
    }
    match decltype.map(|s| s.to_ascii_uppercase()) {
        Some(ref t) if t == "BOOLEAN" => Type::Bool,
        Some(ref t) if t == "SMALLINT" => Type::Int16,
        Some(ref t) if t == "INT" => Type::Int32,
        Some(ref t) if t == "BIGINT" || t == "INTEGER" => Type::Int64,
        Some(ref t) if t == "FLOAT" => Type::Float,
        Some(ref t) if t == "DOUBLE" => Type::Double,
        Some(ref t) if t == "GUID" => Type::Guid,
        Some(ref t) if t == "DATETIME" => Type::Date,
        Some(ref t) if t == "TIME" => Type::Time,
        Some(ref t) if t == "JSONB" => Type::JSONB,
        Some(ref t) if t == "GEOMETRY" => Type::GeomAny,
        Some(ref t) if t == "BLOB" => Type::Bin,
        Some(ref t) if t == "TEXT" => Type::Text,
        _ => Type::Null, // no decltype (computed/aliased column); resolved per-value below
    }
}

fn attrib_to_sqlite_value(a: &Attrib) -> SqlValue {
    match a {
        Attrib::Null => SqlValue::Null,
        Attrib::Bool(b) => SqlValue::Integer(*b as i64),
        Attrib::Int16(v) => SqlValue::Integer(*v as i64),
        Attrib::Int32(v) => SqlValue::Integer(*v as i64),
        Attrib::Int64(v) => SqlValue::Integer(*v),
        Attrib::Float(v) => SqlValue::Real(*v as f64),
        Attrib::Double(v) => SqlValue::Real(*v),
        Attrib::Text(_) => SqlValue::Text(a.to_string()),
        Attrib::Guid(g) => SqlValue::Blob(g.as_bytes().to_vec()),
        Attrib::Date(secs, nanos) => SqlValue::Text(format_date(*secs, *nanos)),
        Attrib::Time(secs, nanos) => SqlValue::Text(format_time(*secs, *nanos)),
        Attrib::Bin(_) => SqlValue::Blob(a.as_bytes().unwrap_or(&[]).to_vec()),
        Attrib::JSONB(_) => SqlValue::Text(a.to_string()),
        Attrib::Geom(typ, g) => SqlValue::Blob(encode_wkb(
            *typ,
            g,
            EncodeOptions { with_srid: true, force_multi: true, ..Default::default() },
        )),
    }
}

/// `ValueRef` carries SQLite's storage class; `typ` (from `column_type`,
/// falling back to `Type::Null` for untyped computed columns) disambiguates
/// the logical type when the storage class alone is ambiguous (`Bool` vs.
/// `Int16`/`Int32`/`Int64`, `Guid`/geometry vs. plain `Bin`).
fn decode_sqlite_value(typ: Type, v: ValueRef) -> Attrib {
    match v {
        ValueRef::Null => Attrib::Null,
        ValueRef::Integer(i) => match typ {
            Type::Bool => Attrib::Bool(i != 0),
            Type::Int16 => Attrib::Int16(i as i16),
            Type::Int32 => Attrib::Int32(i as i32),
            _ => Attrib::Int64(i),
        },
        ValueRef::Real(f) => match typ {
            Type::Float => Attrib::Float(f as f32),
            _ => Attrib::Double(f),
        },
        ValueRef::Text(t) => {
            let s = String::from_utf8_lossy(t).into_owned();
            match typ {
                Type::Guid => Attrib::Guid(Uuid::parse_str(&s).unwrap_or(Uuid::nil())),
                Type::Date => parse_date(&s).unwrap_or(Attrib::Null),
                Type::Time => parse_time(&s).unwrap_or(Attrib::Null),
                Type::JSONB => Attrib::set_jsonb(s.into_bytes()),
                _ => Attrib::set_text(s),
            }
        }
        ValueRef::Blob(b) => match typ {
            Type::Guid if b.len() == 16 => Attrib::Guid(Uuid::from_slice(b).unwrap_or(Uuid::nil())),
            t if t.is_geom() || t == Type::Null => match decode_wkb(b) {
                Ok((gt, g)) => Attrib::geom(gt, g),
                Err(_) => Attrib::set_bin(b.to_vec()),
            },
            _ => Attrib::set_bin(b.to_vec()),
        },
    }
}

fn format_date(secs: i64, nanos: i32) -> String {
    DateTime::from_timestamp(secs, nanos as u32)
        .map(|dt| dt.format("%Y-%m-%dT%H:%M:%S%.9f").to_string())
        .unwrap_or_default()
}

fn parse_date(s: &str) -> Option<Attrib> {
    dba_core::chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|dt| {
            let dt = dt.and_utc();
            Attrib::Date(dt.timestamp(), dt.timestamp_subsec_nanos() as i32)
        })
}

fn format_time(secs: i64, nanos: i32) -> String {
    format!(
        "{:02}:{:02}:{:02}.{:09}",
        secs / 3600,
        (secs / 60) % 60,
        secs % 60,
        nanos
    )
}

fn parse_time(s: &str) -> Option<Attrib> {
    NaiveTime::parse_from_str(s, "%H:%M:%S%.f").ok().map(|t| {
        let secs = t.num_seconds_from_midnight() as i64;
        Attrib::Time(secs, t.nanosecond() as i32)
    })
}

pub struct SqliteRows {
    rows: std::vec::IntoIter<Vec<Attrib>>,
    current: Option<Vec<Attrib>>,
    columns: Vec<ColumnInfo>,
}

impl DriverRows for SqliteRows {
    fn next_row(&mut self) -> Result<bool> {
        self.current = self.rows.next();
        Ok(self.current.is_some())
    }

    fn get(&mut self, col: usize) -> Result<Attrib> {
        self.current
            .as_ref()
            .and_then(|row| row.get(col))
            .cloned()
            .ok_or(Error::FieldNotFound(col.to_string()))
    }

    fn columns(&self) -> &[ColumnInfo] {
        &self.columns
    }
}

fn map_sqlite_error(e: rusqlite::Error) -> Error {
    match &e {
        rusqlite::Error::SqliteFailure(inner, msg) => {
            let text = msg.clone().unwrap_or_else(|| inner.to_string());
            match inner.code {
                rusqlite::ErrorCode::ConstraintViolation => Error::KeyViolation(text),
                rusqlite::ErrorCode::DatabaseBusy | rusqlite::ErrorCode::DatabaseLocked => {
                    Error::DatabaseBusy
                }
                rusqlite::ErrorCode::CannotOpen | rusqlite::ErrorCode::NotADatabase => {
                    Error::bad_connection(text)
                }
                _ => Error::Other(text),
            }
        }
        rusqlite::Error::QueryReturnedNoRows => Error::Eof,
        other => Error::Other(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_column_type_distinguishes_int_widths() {
        let flags = TypeFlags::empty();
        assert_eq!(DIALECT.format_column_type(Type::Int16, flags, None), "SMALLINT");
        assert_eq!(DIALECT.format_column_type(Type::Int32, flags, None), "INT");
        assert_eq!(DIALECT.format_column_type(Type::Int64, flags, None), "BIGINT");
        assert_eq!(
            DIALECT.format_column_type(Type::Int64, TypeFlags::AUTO_INCREMENT, None),
            "INTEGER"
        );
    }

    #[test]
    fn column_type_recognizes_udf_wrapped_expressions() {
        assert_eq!(column_type("dba_st_asgeom(shape)", None), Type::GeomAny);
        assert_eq!(column_type("dba_asguid(id)", None), Type::Guid);
        assert_eq!(column_type("name", Some("TEXT")), Type::Text);
    }

    #[test]
    fn date_round_trips_through_text() {
        let formatted = format_date(1_700_000_000, 123_000_000);
        match parse_date(&formatted) {
            Some(Attrib::Date(secs, nanos)) => {
                assert_eq!(secs, 1_700_000_000);
                assert_eq!(nanos, 123_000_000);
            }
            other => panic!("expected Date, got {:?}", other),
        }
    }
}

//! Postgres `DriverConn`/`DriverRows`/`DriverStmt` adapter: binary
//! parameter encoding, EWKB geometry over `bytea`, and a plain blocking
//! `postgres::Client` per sub-connection.

use std::sync::{Arc, Mutex};

use bytes::{BufMut, BytesMut};
use dba_core::{
    Attrib, ColumnInfo, CoreFn, Dialect, DriverConn, DriverRows, DriverStmt, EncodeOptions, Error,
    PlaceholderStyle, Result, SqlDialectFlags, Type, TypeFlags, decode_wkb, encode_wkb,
};
use log::debug;
use native_tls::TlsConnector;
use postgres::types::{FromSql, IsNull, ToSql, Type as PgType};
use postgres::{Client, NoTls};
use postgres_native_tls::MakeTlsConnector;

/// What `open` needs to reach a Postgres sub-connection; no profile
/// persistence, secrets manager, or keyring integration — those are
/// application-layer concerns.
pub struct ConnDesc {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub database: String,
    pub tls: bool,
}

pub fn open(desc: &ConnDesc) -> Result<PgConn> {
    let conn_string = format!(
        "host={} port={} user={} password={} dbname={} connect_timeout=30",
        desc.host, desc.port, desc.user, desc.password, desc.database
    );
    let client = if desc.tls {
        let connector = TlsConnector::builder()
            .build()
            .map_err(|e| Error::connect_failed(format!("TLS setup failed: {e}")))?;
        let tls = MakeTlsConnector::new(connector);
        Client::connect(&conn_string, tls).map_err(|e| Error::connect_failed(e.to_string()))?
    } else {
        Client::connect(&conn_string, NoTls).map_err(|e| Error::connect_failed(e.to_string()))?
    };
    debug!("connected to postgres at {}:{}", desc.host, desc.port);
    Ok(PgConn { client: Arc::new(Mutex::new(client)), tx_busy: false })
}

pub struct PgDialect;

impl Dialect for PgDialect {
    fn capabilities(&self) -> SqlDialectFlags {
        SqlDialectFlags::MULTI_ROW_INSERT
            | SqlDialectFlags::ALTER_SCHEMA_INSIDE_TRANSACTION
            | SqlDialectFlags::UUID
            | SqlDialectFlags::GEOM_Z
            | SqlDialectFlags::GEOM_M
            | SqlDialectFlags::SPATIAL_INDEX
            | SqlDialectFlags::GEOM_SPECIFIC_FIELD_TYPES
            | SqlDialectFlags::INT16
            | SqlDialectFlags::FLOAT
            | SqlDialectFlags::JSONB
            | SqlDialectFlags::NAMED_SCHEMAS
    }

    fn placeholder_style(&self) -> PlaceholderStyle {
        PlaceholderStyle::DollarNumber
    }

    fn format_column_type(&self, typ: Type, flags: TypeFlags, width: Option<u32>) -> String {
        if flags.contains(TypeFlags::AUTO_INCREMENT) && typ == Type::Int64 {
            return "bigserial".to_string();
        }
        match typ {
            Type::Bool => "boolean".to_string(),
            Type::Int16 => "smallint".to_string(),
            Type::Int32 => "integer".to_string(),
            Type::Int64 => "bigint".to_string(),
            Type::Float => "real".to_string(),
            Type::Double => "double precision".to_string(),
            Type::Text => width.map(|w| format!("varchar({w})")).unwrap_or_else(|| "text".to_string()),
            Type::Guid => "uuid".to_string(),
            Type::Date => "timestamp".to_string(),
            Type::Time => "time".to_string(),
            Type::Bin => "bytea".to_string(),
            Type::JSONB => "jsonb".to_string(),
            Type::GeomPoint | Type::GeomMultiPoint | Type::GeomPolyline | Type::GeomPolygon | Type::GeomAny => {
                "geometry".to_string()
            }
            Type::Null => "bytea".to_string(),
        }
    }

    fn translate_fn(&self, f: CoreFn, args: &[String]) -> String {
        match f {
            CoreFn::StGeomFromText => format!("ST_GeomFromEWKT({})", args.join(", ")),
            CoreFn::StIntersects => format!("ST_Intersects({})", args.join(", ")),
            CoreFn::StAsGeom => format!("ST_AsEWKB({})", args.join(", ")),
            CoreFn::UnixTimestamp => format!("extract(epoch from {})", args.join(", ")),
            CoreFn::StCoarseIntersect => format!("{} && {}", args[0], args[1]),
        }
    }
}

static DIALECT: PgDialect = PgDialect;

pub struct PgConn {
    client: Arc<Mutex<Client>>,
    tx_busy: bool,
}

/// Binary-encodes one `Attrib` for the wire, matching the parameter
/// encoding policy in spec.md §6: binary for every scalar type, EWKB bytes
/// for geometry.
#[derive(Debug)]
struct Param<'a>(&'a Attrib);

impl<'a> ToSql for Param<'a> {
    fn to_sql(&self, _ty: &PgType, out: &mut BytesMut) -> std::result::Result<IsNull, Box<dyn std::error::Error + Sync + Send>> {
        match self.0 {
            Attrib::Null => return Ok(IsNull::Yes),
            Attrib::Bool(b) => out.put_u8(*b as u8),
            Attrib::Int16(v) => out.put_i16(*v),
            Attrib::Int32(v) => out.put_i32(*v),
            Attrib::Int64(v) => out.put_i64(*v),
            Attrib::Float(v) => out.put_f32(*v),
            Attrib::Double(v) => out.put_f64(*v),
            Attrib::Text(_) | Attrib::Bin(_) | Attrib::JSONB(_) => {
                out.extend_from_slice(self.0.as_bytes().unwrap_or(&[]));
            }
            Attrib::Guid(g) => out.extend_from_slice(g.as_bytes()),
            Attrib::Date(secs, nanos) => {
                let micros = secs * 1_000_000 + (*nanos as i64) / 1000 - pg_epoch_offset_micros();
                out.put_i64(micros);
            }
            Attrib::Time(secs, nanos) => {
                let micros = secs * 1_000_000 + (*nanos as i64) / 1000;
                out.put_i64(micros);
            }
            Attrib::Geom(typ, g) => {
                let bytes = encode_wkb(*typ, g, EncodeOptions { with_srid: true, force_multi: true, ..Default::default() });
                out.extend_from_slice(&bytes);
            }
        }
        Ok(IsNull::No)
    }

    fn accepts(_ty: &PgType) -> bool {
        true
    }

    postgres::types::to_sql_checked!();
}

/// Microseconds between the Unix epoch (1970-01-01) and Postgres's own
/// epoch (2000-01-01), which its binary `timestamp` format counts from.
fn pg_epoch_offset_micros() -> i64 {
    946_684_800_000_000
}

/// A column whose wire bytes this driver decodes directly into `Attrib`
/// rather than through the `postgres` crate's own `FromSql` catalog, so
/// the raw payload and the target `dba_core::Type` stay under one roof.
struct RawBytes(Option<Vec<u8>>);

impl<'a> FromSql<'a> for RawBytes {
    fn from_sql(_ty: &PgType, raw: &'a [u8]) -> std::result::Result<Self, Box<dyn std::error::Error + Sync + Send>> {
        Ok(RawBytes(Some(raw.to_vec())))
    }

    fn from_sql_null(_ty: &PgType) -> std::result::Result<Self, Box<dyn std::error::Error + Sync + Send>> {
        Ok(RawBytes(None))
    }

    fn accepts(_ty: &PgType) -> bool {
        true
    }
}

pub struct PgRows {
    rows: std::vec::IntoIter<postgres::Row>,
    current: Option<postgres::Row>,
    columns: Vec<ColumnInfo>,
}

impl DriverRows for PgRows {
    fn next_row(&mut self) -> Result<bool> {
        match self.rows.next() {
            Some(r) => {
                self.current = Some(r);
                Ok(true)
            }
            None => {
                self.current = None;
                Ok(false)
            }
        }
    }

    fn get(&mut self, col: usize) -> Result<Attrib> {
        let row = self.current.as_ref().ok_or(Error::Eof)?;
        let raw: RawBytes = row.try_get(col).map_err(|e| Error::Other(e.to_string()))?;
        let bytes = match raw.0 {
            None => return Ok(Attrib::Null),
            Some(b) => b,
        };
        Ok(decode_pg_value(&self.columns[col], bytes))
    }

    fn columns(&self) -> &[ColumnInfo] {
        &self.columns
    }
}

/// Decodes one column's raw wire bytes using the Postgres type this driver
/// already recorded for it. `bytea` columns get a best-effort WKB decode
/// attempt first: this driver doesn't introspect PostGIS's catalog OID for
/// `geometry` (which would need a `pg_type` round trip per connection), so
/// a `bytea` payload that parses as valid WKB is reported as geometry,
/// otherwise as a plain blob. Documented as a deliberate simplification in
/// DESIGN.md.
fn decode_pg_value(col: &ColumnInfo, bytes: Vec<u8>) -> Attrib {
    match col.typ {
        Type::Bool => Attrib::Bool(bytes.first().copied().unwrap_or(0) != 0),
        Type::Int16 => Attrib::Int16(i16::from_be_bytes(bytes[..2].try_into().unwrap_or_default())),
        Type::Int32 => Attrib::Int32(i32::from_be_bytes(bytes[..4].try_into().unwrap_or_default())),
        Type::Int64 => Attrib::Int64(i64::from_be_bytes(bytes[..8].try_into().unwrap_or_default())),
        Type::Float => Attrib::Float(f32::from_be_bytes(bytes[..4].try_into().unwrap_or_default())),
        Type::Double => Attrib::Double(f64::from_be_bytes(bytes[..8].try_into().unwrap_or_default())),
        Type::Text => Attrib::set_text(String::from_utf8_lossy(&bytes).into_owned()),
        Type::Guid => uuid::Uuid::from_slice(&bytes).map(Attrib::Guid).unwrap_or(Attrib::Null),
        Type::Date => {
            let micros = i64::from_be_bytes(bytes[..8].try_into().unwrap_or_default());
            let total = micros + pg_epoch_offset_micros();
            Attrib::Date(total.div_euclid(1_000_000), (total.rem_euclid(1_000_000) * 1000) as i32)
        }
        Type::Time => {
            let micros = i64::from_be_bytes(bytes[..8].try_into().unwrap_or_default());
            Attrib::Time(micros.div_euclid(1_000_000), (micros.rem_euclid(1_000_000) * 1000) as i32)
        }
        Type::JSONB => {
            // binary jsonb carries a one-byte version prefix ahead of the text.
            let body = if bytes.first() == Some(&1) { &bytes[1..] } else { &bytes[..] };
            Attrib::set_jsonb(body.to_vec())
        }
        Type::Bin => match decode_wkb(&bytes) {
            Ok((typ, g)) => Attrib::geom(typ, g),
            Err(_) => Attrib::set_bin(bytes),
        },
        Type::GeomPoint | Type::GeomMultiPoint | Type::GeomPolyline | Type::GeomPolygon | Type::GeomAny => {
            match decode_wkb(&bytes) {
                Ok((typ, g)) => Attrib::geom(typ, g),
                Err(_) => Attrib::Null,
            }
        }
        Type::Null => Attrib::Null,
    }
}

pub struct PgStmt {
    sql: String,
    statement: postgres::Statement,
    client: Arc<Mutex<Client>>,
    columns: Vec<ColumnInfo>,
}

impl DriverStmt for PgStmt {
    fn exec(&mut self, params: &[Attrib]) -> Result<Box<dyn DriverRows>> {
        let params: Vec<Param> = params.iter().map(Param).collect();
        let refs: Vec<&(dyn ToSql + Sync)> = params.iter().map(|p| p as &(dyn ToSql + Sync)).collect();
        let mut client = self.client.lock().unwrap();
        let rows = client.query(&self.statement, &refs).map_err(map_pg_error)?;
        Ok(Box::new(PgRows { rows: rows.into_iter(), current: None, columns: self.columns.clone() }))
    }

    fn sql(&self) -> &str {
        &self.sql
    }
}

fn map_pg_error(e: postgres::Error) -> Error {
    if let Some(db) = e.as_db_error() {
        match db.code().code() {
            "08000" | "08003" | "08006" | "57P01" | "57P02" | "57P03" => Error::bad_connection(db.message().to_string()),
            "23505" => Error::KeyViolation(db.message().to_string()),
            "42P01" => Error::TableNotFound(db.message().to_string()),
            "42703" => Error::FieldNotFound(db.message().to_string()),
            "42P07" => Error::RelationAlreadyExists(db.message().to_string()),
            "25P02" => Error::TransactionAborted,
            "40001" | "55P03" => Error::DatabaseBusy,
            _ => Error::Other(db.message().to_string()),
        }
    } else {
        Error::bad_connection(e.to_string())
    }
}

/// Maps a `postgres::Column`'s builtin type to the core `Type` taxonomy.
/// Anything unrecognized (including PostGIS's `geometry`, which the
/// `postgres` crate has no catalog entry for) is reported as `Bin` so the
/// raw bytes are preserved; `decode_pg_value`'s WKB probe then recovers
/// the logical geometry type from the payload itself.
fn column_type(col: &postgres::Column) -> Type {
    match col.type_().name() {
        "bool" => Type::Bool,
        "int2" => Type::Int16,
        "int4" => Type::Int32,
        "int8" => Type::Int64,
        "float4" => Type::Float,
        "float8" => Type::Double,
        "text" | "varchar" | "bpchar" | "name" => Type::Text,
        "uuid" => Type::Guid,
        "timestamp" | "timestamptz" => Type::Date,
        "time" | "timetz" => Type::Time,
        "jsonb" | "json" => Type::JSONB,
        _ => Type::Bin,
    }
}

impl DriverConn for PgConn {
    fn prepare(&mut self, sql: &str, _param_types: &[Type]) -> Result<Box<dyn DriverStmt>> {
        let rewritten = DIALECT.rewrite_placeholders(sql);
        let mut client = self.client.lock().unwrap();
        let statement = client.prepare(&rewritten).map_err(map_pg_error)?;
        let columns: Vec<ColumnInfo> = statement
            .columns()
            .iter()
            .map(|c| ColumnInfo { name: c.name().to_string(), typ: column_type(c) })
            .collect();
        drop(client);
        Ok(Box::new(PgStmt { sql: sql.to_string(), statement, client: self.client.clone(), columns }))
    }

    fn exec(&mut self, sql: &str, params: &[Attrib]) -> Result<Box<dyn DriverRows>> {
        let rewritten = DIALECT.rewrite_placeholders(sql);
        let params: Vec<Param> = params.iter().map(Param).collect();
        let refs: Vec<&(dyn ToSql + Sync)> = params.iter().map(|p| p as &(dyn ToSql + Sync)).collect();
        let mut client = self.client.lock().unwrap();
        let statement = client.prepare(&rewritten).map_err(map_pg_error)?;
        let columns: Vec<ColumnInfo> = statement
            .columns()
            .iter()
            .map(|c| ColumnInfo { name: c.name().to_string(), typ: column_type(c) })
            .collect();
        let rows = client.query(&statement, &refs).map_err(map_pg_error)?;
        Ok(Box::new(PgRows { rows: rows.into_iter(), current: None, columns }))
    }

    fn begin(&mut self) -> Result<()> {
        let mut client = self.client.lock().unwrap();
        client.batch_execute("BEGIN").map_err(map_pg_error)?;
        self.tx_busy = true;
        debug!("transaction started");
        Ok(())
    }

    fn commit(&mut self) -> Result<()> {
        let mut client = self.client.lock().unwrap();
        client.batch_execute("COMMIT").map_err(map_pg_error)?;
        self.tx_busy = false;
        Ok(())
    }

    fn rollback(&mut self) -> Result<()> {
        let mut client = self.client.lock().unwrap();
        client.batch_execute("ROLLBACK").map_err(map_pg_error)?;
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
        // `postgres::Client::prepare` manages its own statement cache and
        // drops server-side PREPARE state on `Statement`'s `Drop`; there is
        // no separate DEALLOCATE step to issue here.
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pg_epoch_offset_matches_known_constant() {
        assert_eq!(pg_epoch_offset_micros(), 946_684_800_000_000);
    }

    #[test]
    fn column_type_maps_known_postgres_type_names() {
        // exercised indirectly via decode_pg_value's match arms; a direct
        // `postgres::Column` can't be constructed outside the crate, so this
        // documents the mapping table instead of round-tripping it.
        let col = ColumnInfo { name: "x".into(), typ: Type::Int32 };
        assert_eq!(decode_pg_value(&col, 7i32.to_be_bytes().to_vec()).to_string(), "7");
    }
}

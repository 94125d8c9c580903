//! MSSQL `DriverConn`/`DriverRows`/`DriverStmt` adapter. `tiberius` is
//! async-only, so every sub-connection carries its own single-threaded
//! `tokio` runtime and every trait method blocks on it; there is no sync
//! TDS client in the ecosystem to wrap directly.

use std::sync::{Arc, Mutex};

use dba_core::chrono::{DateTime, NaiveDateTime, NaiveTime, Timelike};
use dba_core::uuid::Uuid;
use dba_core::{
    Attrib, ColumnInfo, CoreFn, Dialect, DriverConn, DriverRows, DriverStmt, EncodeOptions, Error,
    PlaceholderStyle, Result, SqlDialectFlags, Type, TypeFlags, decode_wkb, encode_wkb,
};
use log::debug;
use tiberius::{Client, ColumnType, Config};
use tokio::net::TcpStream;
use tokio::runtime::Runtime;
use tokio_util::compat::{Compat, TokioAsyncWriteCompatExt};

type TdsClient = Client<Compat<TcpStream>>;

struct ClientState {
    rt: Runtime,
    client: TdsClient,
}

/// Opens a sub-connection from an ADO-style connection string, the format
/// `dba_test_support::containers::with_mssql_url` and the MSSQL ODBC driver
/// manager both speak (`Server=host,port;User Id=...;Password=...`).
pub fn open(ado_string: &str) -> Result<MssqlConn> {
    let rt = Runtime::new().map_err(|e| Error::connect_failed(e.to_string()))?;
    let client = rt.block_on(async {
        let config = Config::from_ado_string(ado_string).map_err(|e| Error::connect_failed(e.to_string()))?;
        let addr = config.get_addr();
        let tcp = TcpStream::connect(addr).await.map_err(|e| Error::connect_failed(e.to_string()))?;
        tcp.set_nodelay(true).map_err(|e| Error::connect_failed(e.to_string()))?;
        Client::connect(config, tcp.compat_write()).await.map_err(|e| Error::connect_failed(e.to_string()))
    })?;
    debug!("connected to mssql");
    Ok(MssqlConn { state: Arc::new(Mutex::new(ClientState { rt, client })), tx_busy: false })
}

pub struct MssqlDialect;

impl Dialect for MssqlDialect {
    fn capabilities(&self) -> SqlDialectFlags {
        SqlDialectFlags::MULTI_ROW_INSERT
            | SqlDialectFlags::UUID
            | SqlDialectFlags::GEOM_Z
            | SqlDialectFlags::GEOM_M
            | SqlDialectFlags::SPATIAL_INDEX
            | SqlDialectFlags::GEOM_SPECIFIC_FIELD_TYPES
            | SqlDialectFlags::INT16
            | SqlDialectFlags::FLOAT
            | SqlDialectFlags::NAMED_SCHEMAS
    }

    fn placeholder_style(&self) -> PlaceholderStyle {
        PlaceholderStyle::ColonNumber
    }

    fn format_column_type(&self, typ: Type, flags: TypeFlags, width: Option<u32>) -> String {
        if flags.contains(TypeFlags::AUTO_INCREMENT) && typ == Type::Int64 {
            return "BIGINT IDENTITY(1,1)".to_string();
        }
        match typ {
            Type::Bool => "BIT".to_string(),
            Type::Int16 => "SMALLINT".to_string(),
            Type::Int32 => "INT".to_string(),
            Type::Int64 => "BIGINT".to_string(),
            Type::Float => "REAL".to_string(),
            Type::Double => "FLOAT".to_string(),
            Type::Text => width.map(|w| format!("NVARCHAR({w})")).unwrap_or_else(|| "NVARCHAR(MAX)".to_string()),
            Type::Guid => "UNIQUEIDENTIFIER".to_string(),
            Type::Date => "DATETIME2".to_string(),
            Type::Time => "TIME".to_string(),
            Type::Bin => width.map(|w| format!("VARBINARY({w})")).unwrap_or_else(|| "VARBINARY(MAX)".to_string()),
            Type::JSONB => "NVARCHAR(MAX)".to_string(),
            Type::GeomPoint | Type::GeomMultiPoint | Type::GeomPolyline | Type::GeomPolygon | Type::GeomAny => {
                "GEOMETRY".to_string()
            }
            Type::Null => "VARBINARY(MAX)".to_string(),
        }
    }

    fn translate_fn(&self, f: CoreFn, args: &[String]) -> String {
        match f {
            CoreFn::StGeomFromText => format!(
                "geometry::STGeomFromText({}, {})",
                args[0],
                args.get(1).cloned().unwrap_or_else(|| "0".to_string())
            ),
            CoreFn::StIntersects => format!("({}).STIntersects({}) = 1", args[0], args[1]),
            CoreFn::StAsGeom => format!(
                "geometry::STGeomFromWKB({}, {})",
                args[0],
                args.get(1).cloned().unwrap_or_else(|| "0".to_string())
            ),
            CoreFn::UnixTimestamp => format!("DATEDIFF(SECOND, '1970-01-01', {})", args[0]),
            CoreFn::StCoarseIntersect => {
                format!("({}).STEnvelope().STIntersects(({}).STEnvelope()) = 1", args[0], args[1])
            }
        }
    }
}

static DIALECT: MssqlDialect = MssqlDialect;

pub struct MssqlConn {
    state: Arc<Mutex<ClientState>>,
    tx_busy: bool,
}

/// Rewrites the `:N` ODBC-style placeholders `rewrite_placeholders`
/// produces into the `@PN` syntax `tiberius` (a native TDS client, not an
/// ODBC driver) actually expects on the wire.
fn colon_to_at_p(sql: &str) -> String {
    let mut out = String::with_capacity(sql.len());
    let mut chars = sql.char_indices().peekable();
    while let Some((_, c)) = chars.next() {
        if c == ':' {
            let mut digits = String::new();
            while let Some(&(_, d)) = chars.peek() {
                if d.is_ascii_digit() {
                    digits.push(d);
                    chars.next();
                } else {
                    break;
                }
            }
            if digits.is_empty() {
                out.push(c);
            } else {
                out.push_str("@P");
                out.push_str(&digits);
            }
        } else {
            out.push(c);
        }
    }
    out
}

/// Converts one `Attrib` into an owned value `tiberius::ToSql` is already
/// implemented for, delegating the actual wire encoding to that impl
/// instead of constructing `tiberius::ColumnData` variants by hand.
enum MssqlParam {
    Null,
    Bit(bool),
    I16(i16),
    I32(i32),
    I64(i64),
    F32(f32),
    F64(f64),
    Str(String),
    Bin(Vec<u8>),
    Guid(Uuid),
    DateTime(NaiveDateTime),
    Time(NaiveTime),
}

impl tiberius::ToSql for MssqlParam {
    fn to_sql(&self) -> tiberius::ColumnData<'_> {
        match self {
            MssqlParam::Null => None::<i32>.to_sql(),
            MssqlParam::Bit(b) => b.to_sql(),
            MssqlParam::I16(v) => v.to_sql(),
            MssqlParam::I32(v) => v.to_sql(),
            MssqlParam::I64(v) => v.to_sql(),
            MssqlParam::F32(v) => v.to_sql(),
            MssqlParam::F64(v) => v.to_sql(),
            MssqlParam::Str(s) => s.as_str().to_sql(),
            MssqlParam::Bin(b) => b.as_slice().to_sql(),
            MssqlParam::Guid(g) => g.to_sql(),
            MssqlParam::DateTime(dt) => dt.to_sql(),
            MssqlParam::Time(t) => t.to_sql(),
        }
    }
}

fn attrib_to_param(a: &Attrib) -> MssqlParam {
    match a {
        Attrib::Null => MssqlParam::Null,
        Attrib::Bool(b) => MssqlParam::Bit(*b),
        Attrib::Int16(v) => MssqlParam::I16(*v),
        Attrib::Int32(v) => MssqlParam::I32(*v),
        Attrib::Int64(v) => MssqlParam::I64(*v),
        Attrib::Float(v) => MssqlParam::F32(*v),
        Attrib::Double(v) => MssqlParam::F64(*v),
        Attrib::Text(_) | Attrib::JSONB(_) => MssqlParam::Str(a.to_string()),
        Attrib::Guid(g) => MssqlParam::Guid(*g),
        Attrib::Date(secs, nanos) => {
            let dt = DateTime::from_timestamp(*secs, *nanos as u32).unwrap_or_default();
            MssqlParam::DateTime(dt.naive_utc())
        }
        Attrib::Time(secs, nanos) => {
            let t = NaiveTime::from_num_seconds_from_midnight_opt((*secs).rem_euclid(86_400) as u32, *nanos as u32)
                .unwrap_or_default();
            MssqlParam::Time(t)
        }
        Attrib::Bin(_) => MssqlParam::Bin(a.as_bytes().unwrap_or(&[]).to_vec()),
        Attrib::Geom(typ, g) => {
            let bytes = encode_wkb(*typ, g, EncodeOptions { with_srid: false, force_multi: true, ..Default::default() });
            MssqlParam::Bin(bytes)
        }
    }
}

fn column_type_of(ct: ColumnType) -> Type {
    match ct {
        ColumnType::Int1 | ColumnType::Int2 => Type::Int16,
        ColumnType::Int4 | ColumnType::Intn => Type::Int32,
        ColumnType::Int8 => Type::Int64,
        ColumnType::Bit | ColumnType::Bitn => Type::Bool,
        ColumnType::Float4 | ColumnType::Floatn => Type::Float,
        ColumnType::Float8 => Type::Double,
        ColumnType::Guid => Type::Guid,
        ColumnType::Datetime
        | ColumnType::Datetime4
        | ColumnType::Datetimen
        | ColumnType::Datetime2
        | ColumnType::DatetimeOffsetn
        | ColumnType::Daten => Type::Date,
        ColumnType::Timen => Type::Time,
        ColumnType::BigVarBin | ColumnType::BigBinary | ColumnType::Image | ColumnType::Udt => Type::Bin,
        ColumnType::BigVarChar
        | ColumnType::BigChar
        | ColumnType::NVarchar
        | ColumnType::NChar
        | ColumnType::Text
        | ColumnType::NText
        | ColumnType::Xml => Type::Text,
        _ => Type::Bin,
    }
}

fn decode_row(columns: &[ColumnInfo], row: &tiberius::Row) -> Result<Vec<Attrib>> {
    let mut out = Vec::with_capacity(columns.len());
    for (i, col) in columns.iter().enumerate() {
        let v = match col.typ {
            Type::Bool => row.try_get::<bool, _>(i).map_err(map_tiberius_error)?.map(Attrib::Bool),
            Type::Int16 => row.try_get::<i16, _>(i).map_err(map_tiberius_error)?.map(Attrib::Int16),
            Type::Int32 => row.try_get::<i32, _>(i).map_err(map_tiberius_error)?.map(Attrib::Int32),
            Type::Int64 => row.try_get::<i64, _>(i).map_err(map_tiberius_error)?.map(Attrib::Int64),
            Type::Float => row.try_get::<f32, _>(i).map_err(map_tiberius_error)?.map(Attrib::Float),
            Type::Double => row.try_get::<f64, _>(i).map_err(map_tiberius_error)?.map(Attrib::Double),
            Type::Text => row.try_get::<&str, _>(i).map_err(map_tiberius_error)?.map(Attrib::set_text),
            Type::Guid => row.try_get::<Uuid, _>(i).map_err(map_tiberius_error)?.map(Attrib::Guid),
            Type::Date => row.try_get::<NaiveDateTime, _>(i).map_err(map_tiberius_error)?.map(|dt| {
                Attrib::Date(dt.and_utc().timestamp(), dt.and_utc().timestamp_subsec_nanos() as i32)
            }),
            Type::Time => row.try_get::<NaiveTime, _>(i).map_err(map_tiberius_error)?.map(|t| {
                Attrib::Time(t.num_seconds_from_midnight() as i64, t.nanosecond() as i32)
            }),
            Type::Bin | Type::GeomPoint | Type::GeomMultiPoint | Type::GeomPolyline | Type::GeomPolygon | Type::GeomAny => {
                row.try_get::<&[u8], _>(i).map_err(map_tiberius_error)?.map(|bytes| match decode_wkb(bytes) {
                    Ok((typ, g)) => Attrib::geom(typ, g),
                    Err(_) => Attrib::set_bin(bytes.to_vec()),
                })
            }
            Type::JSONB => row.try_get::<&str, _>(i).map_err(map_tiberius_error)?.map(|s| Attrib::set_jsonb(s.as_bytes().to_vec())),
            Type::Null => None,
        };
        out.push(v.unwrap_or(Attrib::Null));
    }
    Ok(out)
}

fn columns_of(cols: &[tiberius::Column]) -> Vec<ColumnInfo> {
    cols.iter().map(|c| ColumnInfo { name: c.name().to_string(), typ: column_type_of(c.column_type()) }).collect()
}

fn map_tiberius_error(e: tiberius::error::Error) -> Error {
    let text = e.to_string();
    if matches!(e, tiberius::error::Error::Io(_)) {
        return Error::bad_connection(text);
    }
    let upper = text.to_uppercase();
    if upper.contains("2627") || upper.contains("2601") || upper.contains("UNIQUE") {
        Error::KeyViolation(text)
    } else if upper.contains("1205") || upper.contains("DEADLOCK") {
        Error::DatabaseBusy
    } else if upper.contains("INVALID OBJECT NAME") {
        Error::TableNotFound(text)
    } else if upper.contains("INVALID COLUMN NAME") {
        Error::FieldNotFound(text)
    } else {
        Error::Other(text)
    }
}

/// Runs one statement to completion, eagerly materializing every row: a
/// `tiberius::Row` borrows the stream it came from, which can't outlive the
/// `block_on` call, so rows are decoded into owned `Attrib`s before control
/// returns to the synchronous caller.
fn run(state: &Arc<Mutex<ClientState>>, sql: &str, params: &[Attrib]) -> Result<Box<dyn DriverRows>> {
    let rewritten = colon_to_at_p(&DIALECT.rewrite_placeholders(sql));
    let owned: Vec<MssqlParam> = params.iter().map(attrib_to_param).collect();
    let refs: Vec<&dyn tiberius::ToSql> = owned.iter().map(|p| p as &dyn tiberius::ToSql).collect();

    let mut guard = state.lock().unwrap();
    let ClientState { rt, client } = &mut *guard;
    let (columns, rows) = rt.block_on(async {
        let mut stream = client.query(&rewritten, &refs).await.map_err(map_tiberius_error)?;
        let columns = columns_of(stream.columns().await.map_err(map_tiberius_error)?.unwrap_or(&[]));
        let rows = stream.into_first_result().await.map_err(map_tiberius_error)?;
        Ok::<_, Error>((columns, rows))
    })?;

    let mut decoded = Vec::with_capacity(rows.len());
    for row in &rows {
        decoded.push(decode_row(&columns, row)?);
    }
    Ok(Box::new(MssqlRows { rows: decoded.into_iter(), current: None, columns }))
}

pub struct MssqlStmt {
    sql: String,
    state: Arc<Mutex<ClientState>>,
}

impl DriverStmt for MssqlStmt {
    fn exec(&mut self, params: &[Attrib]) -> Result<Box<dyn DriverRows>> {
        run(&self.state, &self.sql, params)
    }

    fn sql(&self) -> &str {
        &self.sql
    }
}

pub struct MssqlRows {
    rows: std::vec::IntoIter<Vec<Attrib>>,
    current: Option<Vec<Attrib>>,
    columns: Vec<ColumnInfo>,
}

impl DriverRows for MssqlRows {
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
        self.current.as_ref().and_then(|r| r.get(col)).cloned().ok_or(Error::Eof)
    }

    fn columns(&self) -> &[ColumnInfo] {
        &self.columns
    }
}

impl DriverConn for MssqlConn {
    fn prepare(&mut self, sql: &str, _param_types: &[Type]) -> Result<Box<dyn DriverStmt>> {
        Ok(Box::new(MssqlStmt { sql: sql.to_string(), state: self.state.clone() }))
    }

    fn exec(&mut self, sql: &str, params: &[Attrib]) -> Result<Box<dyn DriverRows>> {
        run(&self.state, sql, params)
    }

    fn begin(&mut self) -> Result<()> {
        let mut guard = self.state.lock().unwrap();
        let ClientState { rt, client } = &mut *guard;
        rt.block_on(async { client.simple_query("BEGIN TRAN").await.map_err(map_tiberius_error) })?;
        self.tx_busy = true;
        debug!("transaction started");
        Ok(())
    }

    fn commit(&mut self) -> Result<()> {
        let mut guard = self.state.lock().unwrap();
        let ClientState { rt, client } = &mut *guard;
        rt.block_on(async { client.simple_query("COMMIT TRAN").await.map_err(map_tiberius_error) })?;
        self.tx_busy = false;
        Ok(())
    }

    fn rollback(&mut self) -> Result<()> {
        let mut guard = self.state.lock().unwrap();
        let ClientState { rt, client } = &mut *guard;
        rt.block_on(async { client.simple_query("ROLLBACK TRAN").await.map_err(map_tiberius_error) })?;
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
        // `MssqlStmt` re-issues its SQL text through `sp_executesql` on
        // every `exec`; there is no server-side handle to release here.
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn colon_to_at_p_rewrites_positional_placeholders() {
        assert_eq!(colon_to_at_p("SELECT * FROM t WHERE a = :1 AND b = :2"), "SELECT * FROM t WHERE a = @P1 AND b = @P2");
    }

    #[test]
    fn colon_to_at_p_leaves_bare_colons_alone() {
        assert_eq!(colon_to_at_p("SELECT CAST(x AS TIME) : y"), "SELECT CAST(x AS TIME) : y");
    }

    #[test]
    fn format_column_type_identity_uses_bigint_identity() {
        assert_eq!(
            DIALECT.format_column_type(Type::Int64, TypeFlags::AUTO_INCREMENT, None),
            "BIGINT IDENTITY(1,1)"
        );
    }
}

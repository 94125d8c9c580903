//! Postgres backend for `dba_core`: binary wire encoding, EWKB geometry
//! over `bytea`/PostGIS `geometry`, and SQLSTATE-to-`Error` mapping.

mod driver;

pub use driver::{ConnDesc, PgConn, PgDialect, open};

//! SQLite backend for `dba_core`: typed binds over `rusqlite`, EWKB blob
//! geometry, and scalar UDFs standing in for column-level subtype tags.

mod driver;

pub use driver::{SqliteConn, SqliteDialect, open};

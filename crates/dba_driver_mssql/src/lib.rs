//! MSSQL backend for `dba_core`: a `tiberius` TDS client bridged to this
//! crate's synchronous `DriverConn` contract via a single-threaded `tokio`
//! runtime per connection, WKB geometry over `VARBINARY(MAX)`, and the
//! `:N` ODBC-style placeholder contract translated once more into
//! `tiberius`'s native `@PN` parameter syntax.

mod driver;

pub use driver::{MssqlConn, MssqlDialect, open};

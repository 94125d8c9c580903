//! SAP HANA backend for `dba_core`: `hdbconnect`'s synchronous client bound
//! directly to `HdbValue` (bypassing its `serde_db` input path), WKB
//! geometry over HANA's native `GEOMETRY`/`POINT` wire types, and the
//! `:N` ODBC-style placeholder contract translated into `hdbconnect`'s own
//! positional `?` syntax.

mod driver;

pub use driver::{HanaConn, HanaDialect, open};

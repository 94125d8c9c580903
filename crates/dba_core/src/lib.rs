#![allow(clippy::result_large_err)]

mod allocators;
mod attrib;
mod conn;
mod crud;
mod driver;
mod error;
mod executor;
mod geom;
mod rows;
mod schema;
mod sql_dialect;
mod stmt;
mod tx;
mod types;
mod wkb;

pub use allocators::{Allocator, IdentityAllocator, OnceOffAllocator, RepeatCycleAllocator, SimpleAllocator, StackAlloc};
pub use attrib::Attrib;
pub use conn::Conn;
pub use crud::CrudOps;
pub use driver::{ColumnInfo, DriverConn, DriverRows, DriverStmt, FaultInjection};
pub use error::{Error, Result};
pub use executor::Executor;
pub use geom::{GeomFlags, GeomHeader, GeomPartFlags, GeomValue};
pub use rows::{Row, Rows};
pub use schema::{Field, Index, Schema, Table};
pub use sql_dialect::{CoreFn, Dialect, PlaceholderStyle, rewrite_dollar_placeholders};
pub use stmt::Stmt;
pub use tx::Tx;
pub use types::{MAX_VARLEN, MAX_VERTICES_PER_PART, SqlDialectFlags, Type, TypeFlags};
pub use wkb::{
    EncodeOptions, computed_encoded_bytes, decode as decode_wkb, encode as encode_wkb, fix_ring_order,
    num_external_rings,
};

pub use chrono;
pub use uuid;

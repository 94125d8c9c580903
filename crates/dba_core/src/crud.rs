//! `CrudOps`: small static helpers built on top of [`crate::executor::Executor`]
//! for the common single-row and count-style queries, grounded on the
//! source's `CrudOps` static helper API (Insert/Upsert/DeleteByKey/Count/
//! CheckExistence/Query-one-row). Only the row-shape helpers named by the
//! core spec (§4.6) are implemented here; schema-aware Insert/Upsert
//! helpers belong to the application layer that owns table metadata.

use crate::attrib::Attrib;
use crate::error::{Error, Result};
use crate::executor::Executor;

pub struct CrudOps;

impl CrudOps {
    /// Runs `sql`, expecting exactly one result row, and scans it into
    /// `dsts`. Returns `Eof` if no row matched, `NotOneResult` if more than
    /// one did.
    pub fn query_row(exec: &dyn Executor, sql: &str, params: &[Attrib], dsts: &mut [&mut Attrib]) -> Result<()> {
        let mut rows = exec.query(sql, params)?;
        let first = match rows.next() {
            Some(r) => r?,
            None => return Err(Error::Eof),
        };
        if rows.next().is_some() {
            return Err(Error::NotOneResult);
        }
        first.scan(dsts)
    }

    /// Runs a `SELECT count(*)`-shaped query, expecting a single `Int64`
    /// column in its single row.
    pub fn count(exec: &dyn Executor, sql: &str, params: &[Attrib]) -> Result<i64> {
        let mut n = Attrib::Null;
        Self::query_row(exec, sql, params, &mut [&mut n])?;
        Ok(n.to_int64())
    }

    /// True iff `sql` (typically a `SELECT 1 FROM ... WHERE ...`) yields at
    /// least one row.
    pub fn check_existence(exec: &dyn Executor, sql: &str, params: &[Attrib]) -> Result<bool> {
        let mut rows = exec.query(sql, params)?;
        Ok(rows.next().transpose()?.is_some())
    }

    /// Collects every row's first column as `String`, via `Attrib::to_string`.
    pub fn query_strings(exec: &dyn Executor, sql: &str, params: &[Attrib]) -> Result<Vec<String>> {
        let rows = exec.query(sql, params)?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?.get(0).to_string());
        }
        Ok(out)
    }
}

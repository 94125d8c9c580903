//! The per-backend adapter contract (C4/C5): `DriverConn`, `DriverRows`,
//! `DriverStmt`, and the `ColumnInfo` descriptor they hand back. One
//! concrete type per backend crate (`dba_driver_postgres::PgConn`, etc.)
//! implements these three traits; nothing above this layer knows which
//! backend it is talking to.

use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};

use crate::attrib::Attrib;
use crate::error::{Error, Result};
use crate::sql_dialect::Dialect;
use crate::types::Type;

/// Result-set column descriptor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnInfo {
    pub name: String,
    pub typ: Type,
}

/// A forward-only cursor over one statement execution's rows, as produced
/// by a specific backend. `dba_core::rows::Rows` wraps this with the
/// pool-release-on-EOF and sticky-error behavior common to every backend.
pub trait DriverRows {
    /// Advances to the next row. Returns `Ok(false)` on a clean EOF.
    fn next_row(&mut self) -> Result<bool>;

    /// Decodes column `col` (0-based) of the current row.
    fn get(&mut self, col: usize) -> Result<Attrib>;

    fn columns(&self) -> &[ColumnInfo];

    fn column_count(&self) -> usize {
        self.columns().len()
    }
}

/// A prepared statement bound to one physical sub-connection.
pub trait DriverStmt {
    /// Executes with fresh parameters; may be called many times.
    fn exec(&mut self, params: &[Attrib]) -> Result<Box<dyn DriverRows>>;

    /// SQL text this statement was prepared from, kept for diagnostics and
    /// for re-preparing on a fresh sub-connection after a retry.
    fn sql(&self) -> &str;
}

/// A physical connection to one backend. Exactly one logical `Conn`
/// pool-owns any given `DriverConn` at a time; see `conn::Conn`.
pub trait DriverConn: Send {
    fn prepare(&mut self, sql: &str, param_types: &[Type]) -> Result<Box<dyn DriverStmt>>;

    /// Direct (unprepared) execution. Drivers that can't support this
    /// return `Error::Unsupported`; the caller falls back to
    /// `prepare` + `exec`.
    fn exec(&mut self, sql: &str, params: &[Attrib]) -> Result<Box<dyn DriverRows>> {
        let _ = (sql, params);
        Err(crate::error::Error::unsupported("direct exec"))
    }

    fn begin(&mut self) -> Result<()>;
    fn commit(&mut self) -> Result<()>;
    fn rollback(&mut self) -> Result<()>;

    fn dialect(&self) -> &dyn Dialect;

    /// True while a transaction opened by `begin` has neither been
    /// committed nor rolled back.
    fn is_tx_busy(&self) -> bool;

    /// Issues `DEALLOCATE` (or the backend's equivalent) for a
    /// previously-prepared statement slot. Called directly when the
    /// transaction is not aborted, or later by `conn::Conn` when draining
    /// the retired list.
    fn deallocate(&mut self, slot: u32) -> Result<()>;
}

/// Direct-execs `sql`; if the driver can't support unprepared execution
/// (`Error::Unsupported`), falls back to `prepare` + `exec` on the same
/// driver. Shared by `Conn` and `Tx`, which both owe callers this fallback
/// per the `Executor` contract.
pub(crate) fn exec_or_fallback(driver: &mut dyn DriverConn, sql: &str, params: &[Attrib]) -> Result<Box<dyn DriverRows>> {
    match driver.exec(sql, params) {
        Ok(rows) => Ok(rows),
        Err(Error::Unsupported(_)) => {
            let param_types: Vec<Type> = params.iter().map(|p| p.type_tag()).collect();
            let mut stmt = driver.prepare(sql, &param_types)?;
            stmt.exec(params)
        }
        Err(e) => Err(e),
    }
}

/// Fault-injection counters shared by every backend's `DriverConn`,
/// exercised by `dba_test_support::FakeDriver` and reused verbatim by real
/// drivers so the same retry tests run against them. Every operation
/// decrements the counter; when it reaches exactly 1 the operation
/// synthesizes `fail_with` instead of doing real work.
#[derive(Debug, Default)]
pub struct FaultInjection {
    pub fail_after: AtomicUsize,
    pub fail_after_with: std::sync::Mutex<Option<String>>,
}

impl FaultInjection {
    /// Arms the counter so the `n`th subsequent operation fails.
    pub fn fail_after(&self, n: usize, with: impl Into<String>) {
        self.fail_after.store(n, AtomicOrdering::SeqCst);
        *self.fail_after_with.lock().unwrap() = Some(with.into());
    }

    /// Call at the top of every operation; returns `Some(message)` exactly
    /// once the counter reaches 1, and disarms itself afterward.
    pub fn tick(&self) -> Option<String> {
        let prev = self.fail_after.load(AtomicOrdering::SeqCst);
        if prev == 0 {
            return None;
        }
        let next = prev - 1;
        self.fail_after.store(next, AtomicOrdering::SeqCst);
        if next == 0 {
            self.fail_after_with.lock().unwrap().take()
        } else {
            None
        }
    }
}

/// Atomic refcount helper every backend's sub-connection embeds: `0` means
/// free-for-checkout, `1` means held by exactly one caller. The pool never
/// hands out a sub-connection with refcount `> 0`.
#[derive(Debug, Default)]
pub struct RefCount(AtomicUsize);

impl RefCount {
    pub fn is_free(&self) -> bool {
        self.0.load(AtomicOrdering::SeqCst) == 0
    }

    /// Attempts to move `0 -> 1`; returns whether it succeeded.
    pub fn try_acquire(&self) -> bool {
        self.0
            .compare_exchange(0, 1, AtomicOrdering::SeqCst, AtomicOrdering::SeqCst)
            .is_ok()
    }

    pub fn release(&self) {
        self.0.store(0, AtomicOrdering::SeqCst);
    }
}

//! An in-memory [`dba_core::DriverConn`] used by `dba_core`'s own unit
//! tests (pool checkout/retry behavior) and by driver crates that want to
//! exercise `Executor`/`Conn` plumbing without a real backend.
//!
//! Canned results are registered by exact SQL text via
//! [`FakeDriver::with_rows`]; anything else returns an empty result set.
//! Fault injection is driven by [`FakeDriver::fault`], shared with every
//! operation (`exec`, `prepare`+`exec`, `begin`/`commit`/`rollback`).

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use dba_core::{
    Attrib, ColumnInfo, CoreFn, Dialect, DriverConn, DriverRows, DriverStmt, Error, FaultInjection,
    PlaceholderStyle, Result, SqlDialectFlags, Type, TypeFlags,
};

/// A no-op dialect good enough for pool/retry tests: no rewriting needed
/// since `FakeDriver` never actually parses SQL.
#[derive(Clone)]
pub struct FakeDialect;

impl Dialect for FakeDialect {
    fn capabilities(&self) -> SqlDialectFlags {
        SqlDialectFlags::empty()
    }

    fn placeholder_style(&self) -> PlaceholderStyle {
        PlaceholderStyle::DollarNumber
    }

    fn format_column_type(&self, typ: Type, _flags: TypeFlags, _width: Option<u32>) -> String {
        format!("{typ}")
    }

    fn translate_fn(&self, f: CoreFn, args: &[String]) -> String {
        format!("{f:?}({})", args.join(", "))
    }
}

#[derive(Clone)]
struct CannedResult {
    columns: Vec<ColumnInfo>,
    rows: Vec<Vec<Attrib>>,
}

struct FakeDriverState {
    fault: FaultInjection,
    tx_busy: AtomicBool,
    deallocated_slots: Mutex<Vec<u32>>,
    results: Mutex<HashMap<String, CannedResult>>,
}

/// A deterministic, in-process stand-in for a real backend connection.
/// Cloning shares the underlying state (`Arc`-backed), so a test can keep
/// a handle for assertions (e.g. `deallocated_slots()`) after moving a
/// clone into a `Conn`'s opener closure.
#[derive(Clone)]
pub struct FakeDriver {
    state: std::sync::Arc<FakeDriverState>,
    dialect: FakeDialect,
}

impl FakeDriver {
    pub fn new() -> Self {
        FakeDriver {
            state: std::sync::Arc::new(FakeDriverState {
                fault: FaultInjection::default(),
                tx_busy: AtomicBool::new(false),
                deallocated_slots: Mutex::new(Vec::new()),
                results: Mutex::new(HashMap::new()),
            }),
            dialect: FakeDialect,
        }
    }

    pub fn fault(&self) -> &FaultInjection {
        &self.state.fault
    }

    pub fn with_rows(self, sql: impl Into<String>, columns: Vec<ColumnInfo>, rows: Vec<Vec<Attrib>>) -> Self {
        self.state.results.lock().unwrap().insert(sql.into(), CannedResult { columns, rows });
        self
    }

    /// Slots that were actually deallocated (not merely retired), for
    /// assertions in `conn`/`tx` tests.
    pub fn deallocated_slots(&self) -> Vec<u32> {
        self.state.deallocated_slots.lock().unwrap().clone()
    }

    fn maybe_fail(&self) -> Result<()> {
        if let Some(msg) = self.state.fault.tick() {
            return Err(Error::bad_connection(msg));
        }
        Ok(())
    }
}

impl Default for FakeDriver {
    fn default() -> Self {
        Self::new()
    }
}

pub struct FakeRows {
    columns: Vec<ColumnInfo>,
    rows: Vec<Vec<Attrib>>,
    pos: usize,
}

impl DriverRows for FakeRows {
    fn next_row(&mut self) -> Result<bool> {
        if self.pos >= self.rows.len() {
            return Ok(false);
        }
        self.pos += 1;
        Ok(true)
    }

    fn get(&mut self, col: usize) -> Result<Attrib> {
        Ok(self.rows[self.pos - 1][col].clone())
    }

    fn columns(&self) -> &[ColumnInfo] {
        &self.columns
    }
}

pub struct FakeStmt {
    sql: String,
    state: std::sync::Arc<FakeDriverState>,
}

impl DriverStmt for FakeStmt {
    fn exec(&mut self, _params: &[Attrib]) -> Result<Box<dyn DriverRows>> {
        if let Some(msg) = self.state.fault.tick() {
            return Err(Error::bad_connection(msg));
        }
        let canned = self.state.results.lock().unwrap().get(&self.sql).cloned();
        let (columns, rows) = match canned {
            Some(c) => (c.columns, c.rows),
            None => (Vec::new(), Vec::new()),
        };
        Ok(Box::new(FakeRows { columns, rows, pos: 0 }))
    }

    fn sql(&self) -> &str {
        &self.sql
    }
}

impl DriverConn for FakeDriver {
    fn prepare(&mut self, sql: &str, _param_types: &[Type]) -> Result<Box<dyn DriverStmt>> {
        self.maybe_fail()?;
        Ok(Box::new(FakeStmt { sql: sql.to_string(), state: self.state.clone() }))
    }

    fn exec(&mut self, sql: &str, _params: &[Attrib]) -> Result<Box<dyn DriverRows>> {
        self.maybe_fail()?;
        let canned = self.state.results.lock().unwrap().get(sql).cloned();
        let (columns, rows) = match canned {
            Some(c) => (c.columns, c.rows),
            None => (Vec::new(), Vec::new()),
        };
        Ok(Box::new(FakeRows { columns, rows, pos: 0 }))
    }

    fn begin(&mut self) -> Result<()> {
        self.maybe_fail()?;
        self.state.tx_busy.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn commit(&mut self) -> Result<()> {
        self.maybe_fail()?;
        self.state.tx_busy.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn rollback(&mut self) -> Result<()> {
        self.maybe_fail()?;
        self.state.tx_busy.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn dialect(&self) -> &dyn Dialect {
        &self.dialect
    }

    fn is_tx_busy(&self) -> bool {
        self.state.tx_busy.load(Ordering::SeqCst)
    }

    fn deallocate(&mut self, slot: u32) -> Result<()> {
        self.maybe_fail()?;
        self.state.deallocated_slots.lock().unwrap().push(slot);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dba_core::Executor;

    #[test]
    fn exec_returns_canned_rows_by_sql_text() {
        let driver = FakeDriver::new().with_rows(
            "SELECT 1",
            vec![ColumnInfo { name: "x".into(), typ: Type::Int64 }],
            vec![vec![Attrib::Int64(1)]],
        );
        let mut driver = driver;
        let mut rows = driver.exec("SELECT 1", &[]).unwrap();
        assert!(rows.next_row().unwrap());
        assert_eq!(rows.get(0).unwrap(), Attrib::Int64(1));
        assert!(!rows.next_row().unwrap());
    }

    #[test]
    fn fault_injection_fires_exactly_once() {
        let mut driver = FakeDriver::new();
        driver.fault().fail_after(1, "boom");
        let err = driver.exec("SELECT 1", &[]).unwrap_err();
        assert!(matches!(err, Error::BadConnection(_)));
        // second call succeeds: fault fired once and disarmed itself.
        driver.exec("SELECT 1", &[]).unwrap();
    }

    #[test]
    fn conn_wraps_fake_driver_through_executor() {
        let conn = dba_core::Conn::new(|| Ok(Box::new(FakeDriver::new()) as Box<dyn DriverConn>));
        conn.exec("SELECT 1", &[]).unwrap();
    }
}

//! Transactions (C5): exclusive ownership of one sub-connection for the
//! transaction's lifetime, exposing the same [`Executor`] surface as
//! [`crate::conn::Conn`] but always dispatching through the bound
//! sub-connection rather than checking one out per call.

use crate::attrib::Attrib;
use crate::conn::SubConnGuard;
use crate::driver::DriverConn;
use crate::error::Result;
use crate::executor::Executor;
use crate::rows::Rows;
use crate::stmt::Stmt;
use crate::types::Type;

/// An open transaction. Dropping without calling `commit`/`rollback`
/// leaves the sub-connection's transaction open; callers should always
/// call one or the other, mirroring the source (there is no implicit
/// rollback-on-drop, since a silent rollback can hide a bug in caller
/// control flow).
pub struct Tx {
    guard: SubConnGuard,
}

impl Tx {
    pub(crate) fn new(guard: SubConnGuard) -> Self {
        Tx { guard }
    }

    pub fn commit(mut self) -> Result<()> {
        {
            let mut driver = self.guard.sub.driver.lock().unwrap();
            driver.commit()?;
        }
        self.guard.sub.drain_retired();
        Ok(())
    }

    pub fn rollback(mut self) -> Result<()> {
        {
            let mut driver = self.guard.sub.driver.lock().unwrap();
            driver.rollback()?;
        }
        self.guard.sub.drain_retired();
        Ok(())
    }

    fn with_driver<T>(&self, op: impl FnOnce(&mut dyn DriverConn) -> Result<T>) -> Result<T> {
        let mut driver = self.guard.sub.driver.lock().unwrap();
        op(&mut **driver)
    }
}

impl Executor for Tx {
    fn exec(&self, sql: &str, params: &[Attrib]) -> Result<()> {
        self.with_driver(|d| {
            let mut rows = crate::driver::exec_or_fallback(d, sql, params)?;
            while rows.next_row()? {}
            Ok(())
        })
    }

    fn query(&self, sql: &str, params: &[Attrib]) -> Result<Rows> {
        let cursor = self.with_driver(|d| crate::driver::exec_or_fallback(d, sql, params))?;
        Ok(Rows::new(cursor, Box::new(|| {})))
    }

    fn prepare(&self, sql: &str, param_types: &[Type]) -> Result<Stmt> {
        let inner = self.with_driver(|d| d.prepare(sql, param_types))?;
        let slot = self.guard.sub.alloc_slot();
        // `Stmt` normally owns a `SubConnGuard` for its lifetime; inside a
        // transaction the `Tx` already holds the one and only guard, so
        // the statement borrows the sub-connection through `Tx` instead of
        // taking its own checkout. See `Stmt::new_in_tx`.
        Ok(Stmt::new_in_tx(inner, self.guard.sub.clone(), slot))
    }
}

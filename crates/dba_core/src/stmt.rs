//! Prepared statements (C5/C6): bound to one physical sub-connection for
//! their lifetime, with deferred `DEALLOCATE` handled by the owning
//! [`crate::conn::SubConn`].

use std::sync::Arc;

use crate::attrib::Attrib;
use crate::conn::{SubConn, SubConnGuard};
use crate::driver::DriverStmt;
use crate::error::Result;
use crate::rows::Rows;

/// A statement prepared via `Executor::prepare`. Holds the sub-connection
/// it was prepared on for its entire lifetime (it is the "unowned" case
/// from the source's `Rows`: the statement, not the row cursor, owns the
/// checkout).
pub struct Stmt {
    inner: Box<dyn DriverStmt>,
    sub: Arc<SubConn>,
    slot: u32,
    /// `None` when prepared inside a `Tx`, which already holds the one
    /// checkout guard for the sub-connection this statement lives on.
    _guard: Option<SubConnGuard>,
}

impl Stmt {
    pub(crate) fn new(inner: Box<dyn DriverStmt>, sub: Arc<SubConn>, slot: u32, guard: SubConnGuard) -> Self {
        Stmt { inner, sub, slot, _guard: Some(guard) }
    }

    pub(crate) fn new_in_tx(inner: Box<dyn DriverStmt>, sub: Arc<SubConn>, slot: u32) -> Self {
        Stmt { inner, sub, slot, _guard: None }
    }

    pub fn sql(&self) -> &str {
        self.inner.sql()
    }

    pub fn exec(&mut self, params: &[Attrib]) -> Result<()> {
        let mut rows = self.inner.exec(params)?;
        while rows.next_row()? {}
        Ok(())
    }

    /// Executes and returns a row stream. Note this does not release the
    /// statement's sub-connection on `Rows` EOF, unlike
    /// `Executor::query`'s owned case: the statement keeps the
    /// sub-connection for its own lifetime, so `Rows::new` here is given a
    /// no-op release.
    pub fn query(&mut self, params: &[Attrib]) -> Result<Rows> {
        let cursor = self.inner.exec(params)?;
        Ok(Rows::new(cursor, Box::new(|| {})))
    }
}

impl Drop for Stmt {
    fn drop(&mut self) {
        self.sub.deallocate_or_retire(self.slot);
    }
}

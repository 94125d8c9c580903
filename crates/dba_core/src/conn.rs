//! The logical connection and its pool of physical sub-connections (C5):
//! check-out policy, at-most-one-retry-on-`BadConnection`, and the
//! prepared-statement slot allocator with deferred `DEALLOCATE`.

use std::sync::atomic::{AtomicU32, Ordering as AtomicOrdering};
use std::sync::{Arc, Mutex};

use log::{debug, warn};

use crate::attrib::Attrib;
use crate::driver::{DriverConn, RefCount};
use crate::error::{Error, Result};
use crate::executor::Executor;
use crate::rows::Rows;
use crate::stmt::Stmt;
use crate::tx::Tx;
use crate::types::Type;

/// One physical sub-connection: the driver handle, its checkout refcount,
/// and its prepared-statement slot bookkeeping (next free slot, and slots
/// whose `DEALLOCATE` was deferred because the transaction that owned them
/// was aborted at the time).
pub struct SubConn {
    driver: Mutex<Box<dyn DriverConn>>,
    refcount: RefCount,
    next_slot: AtomicU32,
    retired_slots: Mutex<Vec<u32>>,
}

impl SubConn {
    fn new(driver: Box<dyn DriverConn>) -> Arc<Self> {
        Arc::new(SubConn {
            driver: Mutex::new(driver),
            refcount: RefCount::default(),
            next_slot: AtomicU32::new(1),
            retired_slots: Mutex::new(Vec::new()),
        })
    }

    pub(crate) fn alloc_slot(&self) -> u32 {
        self.next_slot.fetch_add(1, AtomicOrdering::SeqCst)
    }

    /// Deallocates `slot` now, or defers it to the retired list if the
    /// sub-connection's transaction is currently busy (i.e. deallocating
    /// now would run inside an aborted transaction and fail).
    pub(crate) fn deallocate_or_retire(&self, slot: u32) {
        let mut driver = self.driver.lock().unwrap();
        if driver.is_tx_busy() {
            self.retired_slots.lock().unwrap().push(slot);
            return;
        }
        if let Err(e) = driver.deallocate(slot) {
            debug!("deferred deallocate for slot {slot}: {e}");
            self.retired_slots.lock().unwrap().push(slot);
        }
    }

    /// Drains and deallocates every slot retired while a transaction was
    /// aborted. Called after a successful `Commit` or `Rollback`.
    pub(crate) fn drain_retired(&self) {
        let slots: Vec<u32> = std::mem::take(&mut *self.retired_slots.lock().unwrap());
        let mut driver = self.driver.lock().unwrap();
        for slot in slots {
            let _ = driver.deallocate(slot);
        }
    }
}

/// RAII guard for a checked-out sub-connection: releases the refcount back
/// to the pool on drop, matching the source's "release, possibly
/// release-and-close on fatal error" discipline.
pub(crate) struct SubConnGuard {
    pub(crate) sub: Arc<SubConn>,
    pool: Arc<Mutex<Vec<Arc<SubConn>>>>,
    evict_on_drop: bool,
}

impl SubConnGuard {
    pub(crate) fn mark_bad(&mut self) {
        self.evict_on_drop = true;
    }
}

impl Drop for SubConnGuard {
    fn drop(&mut self) {
        if self.evict_on_drop {
            self.pool.lock().unwrap().retain(|s| !Arc::ptr_eq(s, &self.sub));
        } else {
            self.sub.refcount.release();
        }
    }
}

type Opener = dyn Fn() -> Result<Box<dyn DriverConn>> + Send + Sync;

/// A logical connection: thread-safe, backed by an unbounded pool of
/// physical sub-connections opened on demand. Two threads calling the same
/// `Conn` concurrently get two distinct sub-connections.
#[derive(Clone)]
pub struct Conn {
    pool: Arc<Mutex<Vec<Arc<SubConn>>>>,
    opener: Arc<Opener>,
}

impl Conn {
    pub fn new(opener: impl Fn() -> Result<Box<dyn DriverConn>> + Send + Sync + 'static) -> Self {
        Conn { pool: Arc::new(Mutex::new(Vec::new())), opener: Arc::new(opener) }
    }

    /// Scans the pool under lock for a free sub-connection; opens a new
    /// one and appends it if none is free.
    fn checkout(&self) -> Result<SubConnGuard> {
        {
            let pool = self.pool.lock().unwrap();
            for sub in pool.iter() {
                if sub.refcount.try_acquire() {
                    return Ok(SubConnGuard { sub: sub.clone(), pool: self.pool.clone(), evict_on_drop: false });
                }
            }
        }
        let driver = (self.opener)()?;
        let sub = SubConn::new(driver);
        sub.refcount.try_acquire();
        self.pool.lock().unwrap().push(sub.clone());
        debug!("opened new sub-connection, pool size now {}", self.pool.lock().unwrap().len());
        Ok(SubConnGuard { sub, pool: self.pool.clone(), evict_on_drop: false })
    }

    /// Checks out a sub-connection and runs `op` on it. On `BadConnection`,
    /// the sub-connection is evicted and destroyed, and `op` is retried
    /// exactly once on a fresh sub-connection. Returns the guard the
    /// successful attempt ran on alongside `op`'s result, so callers that
    /// need to keep holding the sub-connection afterward (`query`,
    /// `prepare`, `begin`) get the right one back.
    fn checkout_with_retry<T>(&self, op: impl Fn(&mut dyn DriverConn) -> Result<T>) -> Result<(SubConnGuard, T)> {
        let mut guard = self.checkout()?;
        let result = {
            let mut driver = guard.sub.driver.lock().unwrap();
            op(&mut **driver)
        };
        match result {
            Ok(value) => Ok((guard, value)),
            Err(Error::BadConnection(msg)) => {
                warn!("sub-connection unusable ({msg}); evicting and retrying once");
                guard.mark_bad();
                drop(guard);
                let guard2 = self.checkout()?;
                let value = {
                    let mut driver = guard2.sub.driver.lock().unwrap();
                    op(&mut **driver)?
                };
                Ok((guard2, value))
            }
            Err(e) => Err(e),
        }
    }

    /// Runs `op` on a checked-out sub-connection with the same
    /// retry-and-evict behavior as `checkout_with_retry`, discarding the
    /// guard once `op` returns since callers that don't need to keep the
    /// sub-connection (`exec`) release it immediately.
    fn with_retry<T>(&self, op: impl Fn(&mut dyn DriverConn) -> Result<T>) -> Result<T> {
        self.checkout_with_retry(op).map(|(_, value)| value)
    }

    pub fn begin(&self) -> Result<Tx> {
        let (guard, ()) = self.checkout_with_retry(|driver| driver.begin())?;
        Ok(Tx::new(guard))
    }
}

impl Executor for Conn {
    fn exec(&self, sql: &str, params: &[Attrib]) -> Result<()> {
        self.with_retry(|d| {
            let mut rows = crate::driver::exec_or_fallback(d, sql, params)?;
            while rows.next_row()? {}
            Ok(())
        })
    }

    fn query(&self, sql: &str, params: &[Attrib]) -> Result<Rows> {
        let (guard, cursor) = self.checkout_with_retry(|driver| crate::driver::exec_or_fallback(driver, sql, params))?;
        let release: Box<dyn FnOnce() + Send> = Box::new(move || drop(guard));
        Ok(Rows::new(cursor, release))
    }

    fn prepare(&self, sql: &str, param_types: &[Type]) -> Result<Stmt> {
        let (guard, inner) = self.checkout_with_retry(|driver| driver.prepare(sql, param_types))?;
        let sub = guard.sub.clone();
        let slot = sub.alloc_slot();
        Ok(Stmt::new(inner, sub, slot, guard))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dba_test_support::fake_driver::FakeDriver;

    #[test]
    fn bad_connection_triggers_one_retry_on_fresh_sub_connection() {
        let opened = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let opened2 = opened.clone();
        let conn = Conn::new(move || {
            let n = opened2.fetch_add(1, AtomicOrdering::SeqCst);
            let driver = FakeDriver::new();
            if n == 0 {
                driver.fault().fail_after(1, "connection reset");
            }
            Ok(Box::new(driver) as Box<dyn DriverConn>)
        });

        conn.exec("SELECT 1", &[]).expect("retry should succeed on second sub-connection");
        assert_eq!(opened.load(AtomicOrdering::SeqCst), 2, "exactly one retry: two sub-connections opened");
    }

    #[test]
    fn bad_connection_triggers_one_retry_on_query_path() {
        let opened = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let opened2 = opened.clone();
        let conn = Conn::new(move || {
            let n = opened2.fetch_add(1, AtomicOrdering::SeqCst);
            let driver = FakeDriver::new().with_rows(
                "SELECT 1",
                vec![crate::driver::ColumnInfo { name: "x".into(), typ: Type::Int64 }],
                vec![vec![Attrib::Int64(1)]],
            );
            if n == 0 {
                driver.fault().fail_after(1, "connection reset");
            }
            Ok(Box::new(driver) as Box<dyn DriverConn>)
        });

        let mut rows = conn.query("SELECT 1", &[]).expect("retry should succeed on second sub-connection");
        let row = rows.next().expect("one row").expect("no error");
        assert_eq!(row.get(0).to_int64(), 1);
        assert_eq!(opened.load(AtomicOrdering::SeqCst), 2, "exactly one retry: two sub-connections opened");
    }

    #[test]
    fn bad_connection_on_prepare_evicts_and_retries() {
        let opened = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let opened2 = opened.clone();
        let conn = Conn::new(move || {
            let n = opened2.fetch_add(1, AtomicOrdering::SeqCst);
            let driver = FakeDriver::new();
            if n == 0 {
                driver.fault().fail_after(1, "connection reset");
            }
            Ok(Box::new(driver) as Box<dyn DriverConn>)
        });

        conn.prepare("SELECT 1", &[]).expect("retry should succeed on second sub-connection");
        assert_eq!(opened.load(AtomicOrdering::SeqCst), 2, "exactly one retry: two sub-connections opened");
    }

    #[test]
    fn bad_connection_on_begin_evicts_and_retries() {
        let opened = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let opened2 = opened.clone();
        let conn = Conn::new(move || {
            let n = opened2.fetch_add(1, AtomicOrdering::SeqCst);
            let driver = FakeDriver::new();
            if n == 0 {
                driver.fault().fail_after(1, "connection reset");
            }
            Ok(Box::new(driver) as Box<dyn DriverConn>)
        });

        conn.begin().expect("retry should succeed on second sub-connection");
        assert_eq!(opened.load(AtomicOrdering::SeqCst), 2, "exactly one retry: two sub-connections opened");
    }

    #[test]
    fn retired_statement_drains_exactly_once_on_rollback() {
        let driver = FakeDriver::new();
        let handle = driver.clone();
        let conn = Conn::new(move || Ok(Box::new(driver.clone()) as Box<dyn DriverConn>));

        let tx = conn.begin().expect("begin succeeds");
        let stmt = tx.prepare("SELECT 1", &[]).expect("prepare succeeds");
        drop(stmt);
        assert!(
            handle.deallocated_slots().is_empty(),
            "deallocate is deferred while the transaction is busy, not run immediately"
        );

        tx.rollback().expect("rollback succeeds");
        assert_eq!(handle.deallocated_slots().len(), 1, "retired slot drains exactly once after rollback");
    }
}

//! Row iteration (C6): a forward-only cursor over one statement
//! execution's result set, with a sticky error and automatic release of
//! the underlying sub-connection on EOF or error.
//!
//! The source resets a `RepeatCycleAllocator` between rows so column
//! decode storage from the prior row can be reused. This port's `Attrib`
//! owns standard Rust containers (`Rc<[u8]>`, `Vec<f64>`) rather than
//! arena pointers, so there is no separate per-row allocator to reset;
//! each row's storage is freed by ordinary `Drop` once superseded.

use crate::attrib::Attrib;
use crate::driver::{ColumnInfo, DriverRows};
use crate::error::{Error, Result};

/// Called once, either on clean EOF or on error, to return the borrowed
/// sub-connection to its pool.
type ReleaseFn = Box<dyn FnOnce() + Send>;

/// A forward-only cursor. Iterating yields `Result<Row>`; once an item is
/// `None`, `rows.err()` distinguishes clean EOF (`None`) from a stored
/// error.
pub struct Rows {
    cursor: Box<dyn DriverRows>,
    release: Option<ReleaseFn>,
    err: Option<Error>,
    finished: bool,
}

impl Rows {
    pub fn new(cursor: Box<dyn DriverRows>, release: ReleaseFn) -> Self {
        Rows { cursor, release: Some(release), err: None, finished: false }
    }

    pub fn columns(&self) -> &[ColumnInfo] {
        self.cursor.columns()
    }

    /// The sticky error, if iteration stopped because of one rather than
    /// a clean EOF.
    pub fn err(&self) -> Option<&Error> {
        self.err.as_ref()
    }

    fn finish(&mut self) {
        self.finished = true;
        if let Some(release) = self.release.take() {
            release();
        }
    }
}

impl Drop for Rows {
    fn drop(&mut self) {
        if !self.finished {
            self.finish();
        }
    }
}

impl Iterator for Rows {
    type Item = Result<Row>;

    fn next(&mut self) -> Option<Result<Row>> {
        if self.finished {
            return None;
        }
        match self.cursor.next_row() {
            Ok(false) => {
                self.finish();
                None
            }
            Ok(true) => {
                let n = self.cursor.column_count();
                let mut values = Vec::with_capacity(n);
                for i in 0..n {
                    match self.cursor.get(i) {
                        Ok(v) => values.push(v),
                        Err(e) => {
                            self.err = Some(clone_err(&e));
                            self.finish();
                            return Some(Err(e));
                        }
                    }
                }
                Some(Ok(Row { values }))
            }
            Err(e) => {
                self.err = Some(clone_err(&e));
                self.finish();
                Some(Err(e))
            }
        }
    }
}

/// `Error` doesn't derive `Clone` (several variants wrap driver-native
/// strings that aren't worth forcing `Clone` on); the sticky copy stored
/// on `Rows` only needs to be inspectable, so it's rendered to a string
/// and carried as `Error::Other`.
fn clone_err(e: &Error) -> Error {
    Error::Other(e.to_string())
}

/// One decoded row. Values are addressed either positionally
/// (`row[col]`) or via `scan` into caller-supplied destinations.
pub struct Row {
    values: Vec<Attrib>,
}

impl Row {
    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn get(&self, col: usize) -> &Attrib {
        &self.values[col]
    }

    /// Assigns each column to the corresponding destination, in order.
    /// Mismatched arity is an error; this port defers type-mismatch
    /// conversion to `Attrib`'s own `to_*` methods rather than failing
    /// here (matching the "pure conversion, never throws" rule for those).
    pub fn scan(&self, dsts: &mut [&mut Attrib]) -> Result<()> {
        if dsts.len() != self.values.len() {
            return Err(Error::InvalidNumberOfParameters {
                expected: self.values.len(),
                got: dsts.len(),
            });
        }
        for (dst, src) in dsts.iter_mut().zip(self.values.iter()) {
            **dst = src.clone();
        }
        Ok(())
    }
}

impl std::ops::Index<usize> for Row {
    type Output = Attrib;
    fn index(&self, col: usize) -> &Attrib {
        &self.values[col]
    }
}

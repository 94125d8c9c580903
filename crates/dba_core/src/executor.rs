//! The `Executor` contract shared by `Conn` and `Tx` (C6). Both dispatch
//! through a physical sub-connection; `Conn` borrows one from its pool per
//! call, `Tx` reuses the one it was opened on.

use crate::attrib::Attrib;
use crate::error::Result;
use crate::rows::Rows;
use crate::stmt::Stmt;

/// Query API surface shared by `Conn` and `Tx`. Ordinal `$1, $2, ...`
/// placeholders in `sql` are rewritten by the bound dialect before
/// dispatch.
pub trait Executor {
    fn exec(&self, sql: &str, params: &[Attrib]) -> Result<()>;
    fn query(&self, sql: &str, params: &[Attrib]) -> Result<Rows>;
    fn prepare(&self, sql: &str, param_types: &[crate::types::Type]) -> Result<Stmt>;
}

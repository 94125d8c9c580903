//! Small builders for canned `FakeDriver` results and schema fixtures,
//! used by `dba_core` tests and by driver crates' own unit tests.

use dba_core::{ColumnInfo, Field, Table, Type};

pub fn column(name: impl Into<String>, typ: Type) -> ColumnInfo {
    ColumnInfo { name: name.into(), typ }
}

/// A two-column `(id Int64, name Text)` table, the shape most unit tests
/// reach for when they need "some table".
pub fn people_table(name: impl Into<String>) -> Table {
    let mut t = Table::new(name);
    t.fields.push(Field::new("id", Type::Int64).required());
    t.fields.push(Field::new("name", Type::Text));
    t.primary_key = vec!["id".to_string()];
    t
}

//! The schema data model the core accepts as an opaque collaborator
//! (§6): `Table`/`Field` describe what the (out-of-scope) schema DSL
//! parser would hand back. The core never parses schema source text; it
//! only consumes this shape, e.g. to pick `format_column_type` arguments
//! or to validate `Row::scan` arity against declared fields.

use std::collections::HashMap;

use crate::types::{Type, TypeFlags};

/// One field of a `Table`, corresponding to one `required|optional TYPE
/// name "friendly" [key:value ...]` declaration line in the schema
/// source.
#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    pub name: String,
    pub friendly_name: String,
    pub typ: Type,
    pub flags: TypeFlags,
    /// Declared text/bin column width, if any (`Text(50)` etc).
    pub width: Option<u32>,
    pub attrs: HashMap<String, String>,
}

impl Field {
    pub fn new(name: impl Into<String>, typ: Type) -> Self {
        Field {
            name: name.into(),
            friendly_name: String::new(),
            typ,
            flags: TypeFlags::empty(),
            width: None,
            attrs: HashMap::new(),
        }
    }

    pub fn required(mut self) -> Self {
        self.flags |= TypeFlags::NOT_NULL;
        self
    }
}

/// An index declaration (`INDEX(f)` / `UNIQUE INDEX(f)`).
#[derive(Debug, Clone, PartialEq)]
pub struct Index {
    pub fields: Vec<String>,
    pub unique: bool,
    pub spatial: bool,
}

/// One table. `base` names a parent table by **name**, not by reference:
/// the schema source can form cycles via automatically generated inverse
/// relations, so tables are addressed by name throughout (see design
/// notes in SPEC_FULL.md §9).
#[derive(Debug, Clone, PartialEq)]
pub struct Table {
    pub name: String,
    pub friendly_name: String,
    pub base: Option<String>,
    pub fields: Vec<Field>,
    pub primary_key: Vec<String>,
    pub indexes: Vec<Index>,
}

impl Table {
    pub fn new(name: impl Into<String>) -> Self {
        Table {
            name: name.into(),
            friendly_name: String::new(),
            base: None,
            fields: Vec::new(),
            primary_key: Vec::new(),
            indexes: Vec::new(),
        }
    }

    pub fn field(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.name == name)
    }
}

/// A resolved set of tables, addressed by name. Produced by the (external,
/// out-of-scope) schema DSL parser; the core only reads it.
#[derive(Debug, Clone, Default)]
pub struct Schema {
    pub tables: HashMap<String, Table>,
}

impl Schema {
    pub fn table(&self, name: &str) -> Option<&Table> {
        self.tables.get(name)
    }

    pub fn insert(&mut self, table: Table) {
        self.tables.insert(table.name.clone(), table);
    }

    /// Walks `base` chains to resolve every field a table exposes,
    /// including inherited ones, closest-declaration-wins on name clash.
    pub fn resolved_fields(&self, table_name: &str) -> Vec<&Field> {
        let mut chain = Vec::new();
        let mut seen = std::collections::HashSet::new();
        let mut cur = Some(table_name.to_string());
        while let Some(name) = cur {
            if !seen.insert(name.clone()) {
                break; // cyclic base chain; stop rather than loop forever
            }
            let Some(t) = self.tables.get(&name) else { break };
            chain.push(t);
            cur = t.base.clone();
        }
        let mut seen_fields = std::collections::HashSet::new();
        let mut out = Vec::new();
        for t in chain {
            for f in &t.fields {
                if seen_fields.insert(f.name.clone()) {
                    out.push(f);
                }
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolved_fields_follows_base_chain_and_dedupes() {
        let mut schema = Schema::default();
        let mut base = Table::new("base");
        base.fields.push(Field::new("id", Type::Int64));
        schema.insert(base);

        let mut child = Table::new("child");
        child.base = Some("base".to_string());
        child.fields.push(Field::new("name", Type::Text));
        schema.insert(child);

        let fields: Vec<&str> = schema.resolved_fields("child").iter().map(|f| f.name.as_str()).collect();
        assert_eq!(fields, vec!["name", "id"]);
    }

    #[test]
    fn resolved_fields_tolerates_cyclic_base_chain() {
        let mut schema = Schema::default();
        let mut a = Table::new("a");
        a.base = Some("b".to_string());
        a.fields.push(Field::new("x", Type::Int32));
        schema.insert(a);
        let mut b = Table::new("b");
        b.base = Some("a".to_string());
        schema.insert(b);

        let fields = schema.resolved_fields("a");
        assert!(!fields.is_empty());
    }
}

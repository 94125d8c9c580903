//! The per-backend dialect contract (C1/C4): capability flags, a tiny
//! cross-dialect function namespace, type-formatting, and literal quoting.
//! `Dialect` is the non-I/O half of what `DriverConn::dialect()` returns;
//! the I/O half (parameter encoding) lives in each backend crate.

use crate::types::{SqlDialectFlags, Type, TypeFlags};

/// Placeholder style used on the wire; the core always accepts ordinal
/// `$1, $2, ...` from the caller and each dialect rewrites it internally.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaceholderStyle {
    /// `$1`, `$2`, ... (Postgres's native style; passed through unchanged).
    DollarNumber,
    /// `?` positional (SQLite).
    QuestionMark,
    /// `:1`, `:2`, ... (the "ODBC-style layer" used for MSSQL/HANA).
    ColonNumber,
}

/// The tiny cross-dialect function namespace every backend translates
/// into native syntax.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoreFn {
    StGeomFromText,
    StIntersects,
    StAsGeom,
    UnixTimestamp,
    StCoarseIntersect,
}

/// Per-backend capability flags, type formatting, literal quoting, and
/// function-name translation. One implementation per driver crate.
pub trait Dialect: Send + Sync {
    fn capabilities(&self) -> SqlDialectFlags;

    fn placeholder_style(&self) -> PlaceholderStyle;

    /// Rewrites ordinal `$N` placeholders in `sql` into this dialect's
    /// native style. Implemented once here since every dialect only
    /// differs in the target syntax, not in how `$N` is located.
    fn rewrite_placeholders(&self, sql: &str) -> String {
        rewrite_dollar_placeholders(sql, self.placeholder_style())
    }

    /// Quotes an identifier (table/column name).
    fn quote_identifier(&self, name: &str) -> String {
        format!("\"{}\"", name.replace('"', "\"\""))
    }

    /// Escapes a string for a single-quoted literal.
    fn escape_string(&self, s: &str) -> String {
        s.replace('\'', "''")
    }

    /// Renders a column type declaration, e.g. `Text(50)`, `Int64 AutoIncrement`,
    /// or a geometry column of a given concrete type and SRID. `width` is
    /// the declared length for `Text`/`Bin`; ignored otherwise.
    fn format_column_type(&self, typ: Type, flags: TypeFlags, width: Option<u32>) -> String;

    /// Translates one function from [`CoreFn`]'s namespace into this
    /// dialect's native call syntax, given its already-rendered arguments.
    fn translate_fn(&self, f: CoreFn, args: &[String]) -> String;
}

pub fn rewrite_dollar_placeholders(sql: &str, style: PlaceholderStyle) -> String {
    if style == PlaceholderStyle::DollarNumber {
        return sql.to_string();
    }
    let mut out = String::with_capacity(sql.len());
    let chars: Vec<char> = sql.chars().collect();
    let mut i = 0;
    while i < chars.len() {
        if chars[i] == '$' && i + 1 < chars.len() && chars[i + 1].is_ascii_digit() {
            let start = i + 1;
            let mut end = start;
            while end < chars.len() && chars[end].is_ascii_digit() {
                end += 1;
            }
            let n: String = chars[start..end].iter().collect();
            match style {
                PlaceholderStyle::QuestionMark => out.push('?'),
                PlaceholderStyle::ColonNumber => {
                    out.push(':');
                    out.push_str(&n);
                }
                PlaceholderStyle::DollarNumber => unreachable!(),
            }
            i = end;
        } else {
            out.push(chars[i]);
            i += 1;
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rewrites_dollar_to_question_mark() {
        let out = rewrite_dollar_placeholders("SELECT * FROM t WHERE a = $1 AND b = $2", PlaceholderStyle::QuestionMark);
        assert_eq!(out, "SELECT * FROM t WHERE a = ? AND b = ?");
    }

    #[test]
    fn rewrites_dollar_to_colon_number() {
        let out = rewrite_dollar_placeholders("x = $1", PlaceholderStyle::ColonNumber);
        assert_eq!(out, "x = :1");
    }

    #[test]
    fn leaves_dollar_number_unchanged() {
        let out = rewrite_dollar_placeholders("x = $1", PlaceholderStyle::DollarNumber);
        assert_eq!(out, "x = $1");
    }
}

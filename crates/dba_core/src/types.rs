//! Closed type taxonomy and the bit flags attached to schema fields, values,
//! and dialects (C1).

use bitflags::bitflags;

/// A value's kind. Geometry tags share bit 4 (`0x10`) so that
/// `Type::is_geom` is a single mask test; `GeomAny` is a schema-level
/// wildcard meaning "any concrete geometry" and never appears on a value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Type {
    Null = 0,
    Bool = 1,
    Int16 = 2,
    Int32 = 3,
    Int64 = 4,
    Float = 5,
    Double = 6,
    Text = 7,
    Guid = 8,
    Date = 9,
    Time = 10,
    Bin = 11,
    JSONB = 12,
    GeomPoint = 16,
    GeomMultiPoint = 17,
    GeomPolyline = 18,
    GeomPolygon = 19,
    GeomAny = 20,
}

impl Type {
    /// Geometry tags all have bit 4 set; `GeomAny` does too, even though it
    /// never labels a concrete value, matching the source taxonomy.
    pub fn is_geom(self) -> bool {
        (self as u8) & 0x10 != 0
    }

    pub fn from_u8(v: u8) -> Option<Type> {
        Some(match v {
            0 => Type::Null,
            1 => Type::Bool,
            2 => Type::Int16,
            3 => Type::Int32,
            4 => Type::Int64,
            5 => Type::Float,
            6 => Type::Double,
            7 => Type::Text,
            8 => Type::Guid,
            9 => Type::Date,
            10 => Type::Time,
            11 => Type::Bin,
            12 => Type::JSONB,
            16 => Type::GeomPoint,
            17 => Type::GeomMultiPoint,
            18 => Type::GeomPolyline,
            19 => Type::GeomPolygon,
            20 => Type::GeomAny,
            _ => return None,
        })
    }
}

impl std::fmt::Display for Type {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Type::Null => "Null",
            Type::Bool => "Bool",
            Type::Int16 => "Int16",
            Type::Int32 => "Int32",
            Type::Int64 => "Int64",
            Type::Float => "Float",
            Type::Double => "Double",
            Type::Text => "Text",
            Type::Guid => "Guid",
            Type::Date => "Date",
            Type::Time => "Time",
            Type::Bin => "Bin",
            Type::JSONB => "JSONB",
            Type::GeomPoint => "GeomPoint",
            Type::GeomMultiPoint => "GeomMultiPoint",
            Type::GeomPolyline => "GeomPolyline",
            Type::GeomPolygon => "GeomPolygon",
            Type::GeomAny => "GeomAny",
        };
        f.write_str(s)
    }
}

bitflags! {
    /// Flags on a schema field, not on a value. A value's own geometry
    /// shape is recorded separately on [`crate::geom::GeomFlags`].
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct TypeFlags: u32 {
        const NOT_NULL      = 1 << 0;
        const AUTO_INCREMENT = 1 << 1;
        const GEOM_HAS_Z    = 1 << 2;
        const GEOM_HAS_M    = 1 << 3;
        const GEOM_NOT_MULTI = 1 << 4;
    }
}

bitflags! {
    /// Per-backend capability bitset. Bit numbers are stable for wire
    /// compatibility if ever persisted, though nothing in this crate
    /// persists them.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct SqlDialectFlags: u32 {
        /// `INSERT ... VALUES (...), (...), (...)`
        const MULTI_ROW_INSERT = 1 << 0;
        /// `INSERT ... SELECT ... UNION SELECT ...`
        const MULTI_ROW_DUMMY_UNION_INSERT = 1 << 1;
        const ALTER_SCHEMA_INSIDE_TRANSACTION = 1 << 2;
        const UUID = 1 << 3;
        const GEOM_Z = 1 << 4;
        const GEOM_M = 1 << 5;
        const SPATIAL_INDEX = 1 << 6;
        const GEOM_SPECIFIC_FIELD_TYPES = 1 << 7;
        const INT16 = 1 << 8;
        const FLOAT = 1 << 9;
        const JSONB = 1 << 10;
        const NAMED_SCHEMAS = 1 << 11;
    }
}

/// Maximum number of vertices a single geometry part may hold; the top 12
/// bits of a parts-array entry are reserved for `GeomPartFlags`.
pub const MAX_VERTICES_PER_PART: u32 = (1 << 20) - 1;

/// Maximum byte length of Text/Bin/JSONB payloads.
pub const MAX_VARLEN: usize = (1 << 30) - 1;

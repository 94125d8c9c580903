//! The `Attrib` tagged-union value (C3): construction, conversion,
//! comparison, hashing, and the zero-copy "temp" view constructors.
//!
//! Unlike the source's raw-pointer union (kept small by pointing into a
//! thread-local pool or a caller allocator), this port represents the
//! owned-storage cases with `Rc<[u8]>`/`Box<str>` so the type stays safe
//! without losing the "cheap to clone, no deep copy of the common scalar
//! cases" property the design notes call out. `Attrib` intentionally does
//! not implement `Copy`: Text/Bin/JSONB/Guid/Date-with-tz and geometry
//! values own heap data, so clones are explicit.

use std::cmp::Ordering;
use std::rc::Rc;

use chrono::{NaiveDate, NaiveDateTime};
use uuid::Uuid;

use crate::geom::GeomValue;
use crate::types::Type;

/// Variable-length payload storage. `Owned` holds pool/heap-allocated
/// bytes; `Temp` borrows caller memory for the lifetime of the `Rc` (the
/// caller is responsible for keeping the source alive, matching the
/// source's `SetTempText`/`SetTempBin` contract — this port uses `Rc`
/// rather than a raw borrow so `Attrib` stays `'static` and movable).
#[derive(Debug, Clone, PartialEq)]
enum Bytes {
    Owned(Rc<[u8]>),
    Temp(Rc<[u8]>),
}

impl Bytes {
    fn as_slice(&self) -> &[u8] {
        match self {
            Bytes::Owned(b) | Bytes::Temp(b) => b,
        }
    }
}

/// One SQL value or parameter. See module docs for the representation
/// choice relative to the source's packed union.
#[derive(Debug, Clone)]
pub enum Attrib {
    Null,
    Bool(bool),
    Int16(i16),
    Int32(i32),
    Int64(i64),
    Float(f32),
    Double(f64),
    Text(Bytes),
    Guid(Uuid),
    /// Seconds since Unix epoch and nanosecond remainder, matching the
    /// source's `(seconds: i64, nanos: i32)` pair.
    Date(i64, i32),
    Time(i64, i32),
    Bin(Bytes),
    JSONB(Bytes),
    Geom(Type, Rc<GeomValue>),
}

impl Default for Attrib {
    fn default() -> Self {
        Attrib::Null
    }
}

impl Attrib {
    pub fn is_null(&self) -> bool {
        matches!(self, Attrib::Null)
    }

    pub fn type_tag(&self) -> Type {
        match self {
            Attrib::Null => Type::Null,
            Attrib::Bool(_) => Type::Bool,
            Attrib::Int16(_) => Type::Int16,
            Attrib::Int32(_) => Type::Int32,
            Attrib::Int64(_) => Type::Int64,
            Attrib::Float(_) => Type::Float,
            Attrib::Double(_) => Type::Double,
            Attrib::Text(_) => Type::Text,
            Attrib::Guid(_) => Type::Guid,
            Attrib::Date(_, _) => Type::Date,
            Attrib::Time(_, _) => Type::Time,
            Attrib::Bin(_) => Type::Bin,
            Attrib::JSONB(_) => Type::JSONB,
            Attrib::Geom(t, _) => *t,
        }
    }

    pub fn set_text(s: impl Into<String>) -> Self {
        let s: String = s.into();
        Attrib::Text(Bytes::Owned(Rc::from(s.into_bytes().into_boxed_slice())))
    }

    pub fn set_bin(b: impl Into<Vec<u8>>) -> Self {
        Attrib::Bin(Bytes::Owned(Rc::from(b.into().into_boxed_slice())))
    }

    pub fn set_jsonb(b: impl Into<Vec<u8>>) -> Self {
        Attrib::JSONB(Bytes::Owned(Rc::from(b.into().into_boxed_slice())))
    }

    /// Zero-copy view into caller-owned memory. The source marks this
    /// `CustomHeap` so the destructor never frees it; here the `Rc` simply
    /// shares ownership instead, since this port has no allocator-owned
    /// raw pointer to avoid freeing.
    pub fn set_temp_text(shared: Rc<[u8]>) -> Self {
        Attrib::Text(Bytes::Temp(shared))
    }

    pub fn set_temp_bin(shared: Rc<[u8]>) -> Self {
        Attrib::Bin(Bytes::Temp(shared))
    }

    pub fn geom(typ: Type, g: GeomValue) -> Self {
        debug_assert!(typ.is_geom());
        Attrib::Geom(typ, Rc::new(g))
    }

    /// Raw bytes backing `Text`/`Bin`/`JSONB`, for drivers that need to
    /// write the payload to the wire without the lossy `to_string`
    /// conversion (hex-encoding `Bin`, lossily re-decoding `Text`).
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Attrib::Text(b) | Attrib::Bin(b) | Attrib::JSONB(b) => Some(b.as_slice()),
            _ => None,
        }
    }

    /// The geometry payload, for drivers encoding it to WKB/EWKB on write.
    pub fn as_geom(&self) -> Option<(Type, &GeomValue)> {
        match self {
            Attrib::Geom(t, g) => Some((*t, g)),
            _ => None,
        }
    }

    /// `(seconds, nanos)` since the Unix epoch, for `Date`/`Time` values,
    /// without going through `to_int64`'s total-conversion fallback.
    pub fn as_seconds_and_nanos(&self) -> Option<(i64, i32)> {
        match self {
            Attrib::Date(s, n) | Attrib::Time(s, n) => Some((*s, *n)),
            _ => None,
        }
    }

    // -- conversions -----------------------------------------------------
    //
    // Every `to_*` is total: an unconvertible source yields the zero value
    // of the target type, never an error or panic.

    pub fn to_bool(&self) -> bool {
        match self {
            Attrib::Null => false,
            Attrib::Bool(b) => *b,
            Attrib::Int16(v) => *v != 0,
            Attrib::Int32(v) => *v != 0,
            Attrib::Int64(v) => *v != 0,
            Attrib::Float(v) => *v != 0.0,
            Attrib::Double(v) => *v != 0.0,
            Attrib::Text(b) => {
                // Treat "false", "0", and empty as false; everything else
                // as true. The source inverts this comparison by mistake
                // (see design notes); this port does not replicate that.
                let s = std::str::from_utf8(b.as_slice()).unwrap_or("");
                !(s.eq_ignore_ascii_case("false") || s == "0" || s.is_empty())
            }
            Attrib::Bin(b) => !b.as_slice().is_empty(),
            _ => false,
        }
    }

    pub fn to_int64(&self) -> i64 {
        match self {
            Attrib::Null => 0,
            Attrib::Bool(b) => *b as i64,
            Attrib::Int16(v) => *v as i64,
            Attrib::Int32(v) => *v as i64,
            Attrib::Int64(v) => *v,
            Attrib::Float(v) => *v as i64,
            Attrib::Double(v) => *v as i64,
            Attrib::Text(b) => std::str::from_utf8(b.as_slice())
                .ok()
                .and_then(|s| s.trim().parse::<i64>().ok())
                .unwrap_or(0),
            Attrib::Date(secs, _) => *secs,
            Attrib::Time(secs, _) => *secs,
            _ => 0,
        }
    }

    pub fn to_int32(&self) -> i32 {
        self.to_int64() as i32
    }

    pub fn to_int16(&self) -> i16 {
        self.to_int64() as i16
    }

    pub fn to_double(&self) -> f64 {
        match self {
            Attrib::Null => 0.0,
            Attrib::Bool(b) => *b as i32 as f64,
            Attrib::Int16(v) => *v as f64,
            Attrib::Int32(v) => *v as f64,
            Attrib::Int64(v) => *v as f64,
            Attrib::Float(v) => *v as f64,
            Attrib::Double(v) => *v,
            Attrib::Text(b) => std::str::from_utf8(b.as_slice())
                .ok()
                .and_then(|s| s.trim().parse::<f64>().ok())
                .unwrap_or(0.0),
            _ => 0.0,
        }
    }

    pub fn to_float(&self) -> f32 {
        self.to_double() as f32
    }

    pub fn to_guid(&self) -> Uuid {
        match self {
            Attrib::Guid(g) => *g,
            Attrib::Text(b) => std::str::from_utf8(b.as_slice())
                .ok()
                .and_then(|s| Uuid::parse_str(s).ok())
                .unwrap_or(Uuid::nil()),
            Attrib::Bin(b) if b.as_slice().len() == 16 => {
                Uuid::from_slice(b.as_slice()).unwrap_or(Uuid::nil())
            }
            _ => Uuid::nil(),
        }
    }

    pub fn to_string(&self) -> String {
        match self {
            Attrib::Null => String::new(),
            Attrib::Bool(b) => b.to_string(),
            Attrib::Int16(v) => v.to_string(),
            Attrib::Int32(v) => v.to_string(),
            Attrib::Int64(v) => v.to_string(),
            Attrib::Float(v) => v.to_string(),
            Attrib::Double(v) => v.to_string(),
            Attrib::Text(b) => String::from_utf8_lossy(b.as_slice()).into_owned(),
            Attrib::Guid(g) => g.to_string(),
            Attrib::Date(secs, nanos) => date_to_string(*secs, *nanos),
            Attrib::Time(secs, _) => format!("{:02}:{:02}:{:02}", secs / 3600, (secs / 60) % 60, secs % 60),
            Attrib::Bin(b) => hex::encode(b.as_slice()),
            Attrib::JSONB(b) => String::from_utf8_lossy(b.as_slice()).into_owned(),
            Attrib::Geom(..) => String::new(), // WKT rendering is an external collaborator
        }
    }

    /// `Date` as whole Unix seconds, discarding the nanosecond remainder.
    pub fn to_date_unix_seconds(&self) -> i64 {
        match self {
            Attrib::Date(secs, _) => *secs,
            other => other.to_int64(),
        }
    }

    // -- comparison --------------------------------------------------

    /// Total order: `Null` sorts before everything; numerics compare
    /// numerically; text is byte-wise; geometries have no order and
    /// compare equal only when bitwise identical (`Ordering::Equal` is
    /// returned as a sentinel, not a claim of a genuine order).
    pub fn compare(&self, other: &Attrib) -> Ordering {
        match (self, other) {
            (Attrib::Null, Attrib::Null) => Ordering::Equal,
            (Attrib::Null, _) => Ordering::Less,
            (_, Attrib::Null) => Ordering::Greater,
            (Attrib::Text(a), Attrib::Text(b)) => a.as_slice().cmp(b.as_slice()),
            (Attrib::Bin(a), Attrib::Bin(b)) | (Attrib::JSONB(a), Attrib::JSONB(b)) => {
                a.as_slice().cmp(b.as_slice())
            }
            (Attrib::Date(sa, na), Attrib::Date(sb, nb)) => (sa, na).cmp(&(sb, nb)),
            (Attrib::Guid(a), Attrib::Guid(b)) => a.cmp(b),
            // Geometries have no total order; `Equal` here is a sentinel,
            // not a claim of bitwise equality (see the `PartialEq` impl).
            (Attrib::Geom(..), Attrib::Geom(..)) => Ordering::Equal,
            _ if self.type_tag().is_geom() || other.type_tag().is_geom() => Ordering::Equal,
            _ => self
                .to_double()
                .partial_cmp(&other.to_double())
                .unwrap_or(Ordering::Equal),
        }
    }

    /// Coerces both sides to `f64` before comparing, for mixed-type
    /// numeric comparisons.
    pub fn compare_as_num(&self, other: &Attrib) -> Ordering {
        self.to_double().partial_cmp(&other.to_double()).unwrap_or(Ordering::Equal)
    }

    /// Scalars hash as a 32-bit folded integer representation of their
    /// bits; variable-length payloads (text/binary/JSONB/GUID/geometry)
    /// hash via FNV-1a when their byte representation is 8 bytes or
    /// shorter, and XXH32 otherwise.
    pub fn get_hash_code(&self) -> u64 {
        match self {
            Attrib::Null => 0,
            Attrib::Bool(b) => fold32(*b as u64) as u64,
            Attrib::Int16(v) => fold32(*v as i64 as u64) as u64,
            Attrib::Int32(v) => fold32(*v as i64 as u64) as u64,
            Attrib::Int64(v) => fold32(*v as u64) as u64,
            Attrib::Float(v) => fold32(v.to_bits() as u64) as u64,
            Attrib::Double(v) => fold32(v.to_bits()) as u64,
            Attrib::Text(b) | Attrib::Bin(b) | Attrib::JSONB(b) => hash_variable_payload(b.as_slice()),
            Attrib::Guid(g) => hash_variable_payload(g.as_bytes()),
            Attrib::Date(s, n) => fold32((*s as u64) ^ ((*n as u32 as u64) << 32)) as u64,
            Attrib::Time(s, n) => fold32((*s as u64) ^ ((*n as u32 as u64) << 32)) as u64,
            Attrib::Geom(t, g) => {
                let mut raw = vec![*t as u8];
                raw.extend(g.copy_raw_out());
                hash_variable_payload(&raw)
            }
        }
    }
}

/// Folds a 64-bit value down to 32 bits by XORing its two halves, the
/// "32-bit folded integer representation" the scalar branches use.
fn fold32(bits: u64) -> u32 {
    (bits as u32) ^ ((bits >> 32) as u32)
}

/// FNV-1a for payloads of 8 bytes or fewer, XXH32 (seed 0) otherwise.
fn hash_variable_payload(bytes: &[u8]) -> u64 {
    if bytes.len() <= 8 { fnv1a_32(bytes) as u64 } else { xxh32(bytes, 0) as u64 }
}

fn fnv1a_32(bytes: &[u8]) -> u32 {
    const OFFSET_BASIS: u32 = 0x811c_9dc5;
    const PRIME: u32 = 0x0100_0193;
    let mut h = OFFSET_BASIS;
    for &b in bytes {
        h ^= b as u32;
        h = h.wrapping_mul(PRIME);
    }
    h
}

/// xxHash32, following the reference algorithm's stripe/round structure.
fn xxh32(input: &[u8], seed: u32) -> u32 {
    const PRIME1: u32 = 2654435761;
    const PRIME2: u32 = 2246822519;
    const PRIME3: u32 = 3266489917;
    const PRIME4: u32 = 668265263;
    const PRIME5: u32 = 374761393;

    fn round(acc: u32, input: u32) -> u32 {
        acc.wrapping_add(input.wrapping_mul(PRIME2)).rotate_left(13).wrapping_mul(PRIME1)
    }

    fn read_u32_le(b: &[u8]) -> u32 {
        u32::from_le_bytes([b[0], b[1], b[2], b[3]])
    }

    let len = input.len();
    let mut i = 0;
    let mut h32;

    if len >= 16 {
        let mut v1 = seed.wrapping_add(PRIME1).wrapping_add(PRIME2);
        let mut v2 = seed.wrapping_add(PRIME2);
        let mut v3 = seed;
        let mut v4 = seed.wrapping_sub(PRIME1);
        while i + 16 <= len {
            v1 = round(v1, read_u32_le(&input[i..]));
            v2 = round(v2, read_u32_le(&input[i + 4..]));
            v3 = round(v3, read_u32_le(&input[i + 8..]));
            v4 = round(v4, read_u32_le(&input[i + 12..]));
            i += 16;
        }
        h32 = v1.rotate_left(1).wrapping_add(v2.rotate_left(7)).wrapping_add(v3.rotate_left(12)).wrapping_add(v4.rotate_left(18));
    } else {
        h32 = seed.wrapping_add(PRIME5);
    }

    h32 = h32.wrapping_add(len as u32);

    while i + 4 <= len {
        h32 = h32.wrapping_add(read_u32_le(&input[i..]).wrapping_mul(PRIME3));
        h32 = h32.rotate_left(17).wrapping_mul(PRIME4);
        i += 4;
    }

    while i < len {
        h32 = h32.wrapping_add((input[i] as u32).wrapping_mul(PRIME5));
        h32 = h32.rotate_left(11).wrapping_mul(PRIME1);
        i += 1;
    }

    h32 ^= h32 >> 15;
    h32 = h32.wrapping_mul(PRIME2);
    h32 ^= h32 >> 13;
    h32 = h32.wrapping_mul(PRIME3);
    h32 ^= h32 >> 16;
    h32
}

/// Value equality, not storage-mechanism equality: an owned and a temp
/// view over identical bytes compare equal, matching `Attrib::Compare`.
/// Geometries are a special case: `compare()` returns a sentinel `Equal`
/// for any two geometries (they have no total order), so equality here is
/// computed separately as bitwise equality of type/parts/vertices/SRID.
impl PartialEq for Attrib {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Attrib::Geom(ta, a), Attrib::Geom(tb, b)) => ta == tb && a == b,
            (Attrib::Geom(..), _) | (_, Attrib::Geom(..)) => false,
            _ => self.compare(other) == Ordering::Equal,
        }
    }
}

fn date_to_string(secs: i64, nanos: i32) -> String {
    chrono::DateTime::from_timestamp(secs, nanos as u32)
        .map(|dt| dt.format("%Y-%m-%dT%H:%M:%S%.f").to_string())
        .unwrap_or_default()
}

/// Parses an ISO-8601 date/time string into `(seconds, nanos)` since the
/// Unix epoch, the representation `Attrib::Date` carries.
pub fn parse_iso8601_date(s: &str) -> Option<(i64, i32)> {
    if let Ok(dt) = NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f") {
        return Some((dt.and_utc().timestamp(), dt.and_utc().timestamp_subsec_nanos() as i32));
    }
    if let Ok(d) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        let dt = d.and_hms_opt(0, 0, 0)?;
        return Some((dt.and_utc().timestamp(), 0));
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_is_less_than_everything() {
        assert_eq!(Attrib::Null.compare(&Attrib::Int32(0)), Ordering::Less);
        assert_eq!(Attrib::Int32(0).compare(&Attrib::Null), Ordering::Greater);
    }

    #[test]
    fn empty_text_is_not_null() {
        let a = Attrib::set_text("");
        assert!(!a.is_null());
        assert_eq!(a.to_string(), "");
    }

    #[test]
    fn text_false_variants_convert_to_bool_false() {
        assert!(!Attrib::set_text("false").to_bool());
        assert!(!Attrib::set_text("FALSE").to_bool());
        assert!(!Attrib::set_text("0").to_bool());
        assert!(!Attrib::set_text("").to_bool());
        assert!(Attrib::set_text("true").to_bool());
        assert!(Attrib::set_text("yes").to_bool());
    }

    #[test]
    fn hash_consistent_for_equal_values() {
        let a = Attrib::Int64(42);
        let b = Attrib::Int64(42);
        assert_eq!(a.get_hash_code(), b.get_hash_code());
    }

    #[test]
    fn hash_consistent_for_short_and_long_text_payloads() {
        // "short" exercises the FNV-1a branch (<= 8 bytes), "long" the
        // XXH32 branch.
        let short_a = Attrib::set_text("short");
        let short_b = Attrib::set_text("short");
        assert_eq!(short_a.get_hash_code(), short_b.get_hash_code());

        let long_a = Attrib::set_text("a text payload well past eight bytes");
        let long_b = Attrib::set_text("a text payload well past eight bytes");
        assert_eq!(long_a.get_hash_code(), long_b.get_hash_code());
        assert_ne!(short_a.get_hash_code(), long_a.get_hash_code());
    }

    #[test]
    fn hash_matches_across_owned_and_temp_storage() {
        let shared: Rc<[u8]> = Rc::from(b"temp-view-bytes".as_slice());
        let owned = Attrib::set_text("temp-view-bytes");
        let temp = Attrib::set_temp_text(shared);
        assert_eq!(owned.get_hash_code(), temp.get_hash_code());
    }

    #[test]
    fn self_copy_is_noop_and_equal() {
        let a = Attrib::set_text("hello");
        let b = a.clone();
        assert_eq!(a.compare(&b), Ordering::Equal);
    }
}

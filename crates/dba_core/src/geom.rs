//! Geometry storage layout (C4, part 1): the header, per-part flags, and
//! the contiguous byte layout shared by every concrete geometry `Attrib`.
//! WKB encode/decode and ring reordering live in [`crate::wkb`].

use bitflags::bitflags;

use crate::error::{Error, Result};
use crate::types::MAX_VERTICES_PER_PART;

/// 8-byte anchor for all dynamic geometry storage: `[GeomHeader][PartsArray?][Vertices]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(C)]
pub struct GeomHeader {
    pub num_parts: u32,
    pub srid: i32,
}

bitflags! {
    /// Value-level geometry flags, distinct from the schema-level
    /// [`crate::types::TypeFlags`].
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct GeomFlags: u32 {
        /// Vertices are stored as `f64` rather than `f32`.
        const DOUBLE = 1 << 0;
        const FLOAT = 1 << 1;
        const HAS_Z = 1 << 2;
        const HAS_M = 1 << 3;
        /// Rings have already been reordered into WKB order; skip the
        /// ring-reorder pass on the next encode.
        const RINGS_IN_WKB_ORDER = 1 << 4;
    }
}

impl GeomFlags {
    /// 2 (x, y) plus one bit each for Z and M.
    pub fn dimensions(self) -> u32 {
        2 + self.contains(GeomFlags::HAS_Z) as u32 + self.contains(GeomFlags::HAS_M) as u32
    }

    pub fn bytes_per_vertex(self) -> usize {
        let unit = if self.contains(GeomFlags::DOUBLE) { 8 } else { 4 };
        self.dimensions() as usize * unit
    }
}

/// High bits of a `PartsArray` entry; the low 20 bits are a vertex offset
/// (capped by [`MAX_VERTICES_PER_PART`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GeomPartFlags(pub u32);

const CLOSED_BIT: u32 = 1 << 31;
const EXTERIOR_RING_BIT: u32 = 1 << 30;
const OFFSET_MASK: u32 = (1 << 20) - 1;

impl GeomPartFlags {
    pub fn new(vertex_offset: u32, closed: bool, exterior_ring: bool) -> Result<Self> {
        if vertex_offset > OFFSET_MASK {
            return Err(Error::TooManyVertices {
                max: MAX_VERTICES_PER_PART,
            });
        }
        let mut bits = vertex_offset;
        if closed {
            bits |= CLOSED_BIT;
        }
        if exterior_ring {
            bits |= EXTERIOR_RING_BIT;
        }
        Ok(GeomPartFlags(bits))
    }

    pub fn vertex_offset(self) -> u32 {
        self.0 & OFFSET_MASK
    }

    pub fn closed(self) -> bool {
        self.0 & CLOSED_BIT != 0
    }

    pub fn exterior_ring(self) -> bool {
        self.0 & EXTERIOR_RING_BIT != 0
    }
}

/// A decoded view over one geometry's raw storage: header, optional parts
/// array (polyline/polygon only), and a flat vertex buffer in `(x, y[, z][, m])`
/// order. `vertices` is always `f64`-widened regardless of the on-wire
/// `GeomFlags::DOUBLE`/`FLOAT` bit, since all in-process arithmetic in this
/// crate is done in double precision; encoders narrow back down as needed.
#[derive(Debug, Clone, PartialEq)]
pub struct GeomValue {
    pub header: GeomHeader,
    pub flags: GeomFlags,
    /// Empty for Point/MultiPoint, one entry per part plus a sentinel for
    /// Polyline/Polygon.
    pub parts: Vec<GeomPartFlags>,
    pub vertices: Vec<f64>,
}

impl GeomValue {
    /// Number of coordinate components per vertex (`dimensions()`).
    pub fn dims(&self) -> usize {
        self.flags.dimensions() as usize
    }

    pub fn total_vertex_count(&self) -> u32 {
        self.vertices.len() as u32 / self.flags.dimensions()
    }

    /// True for Polyline/Polygon, which carry a parts index array; false
    /// for Point/MultiPoint, whose part count doubles as the vertex count.
    pub fn has_parts_array(&self) -> bool {
        !self.parts.is_empty()
    }

    /// Vertex range `[start, end)` of part `i`, resolved from the parts
    /// array's sentinel entry.
    pub fn part_range(&self, i: usize) -> (u32, u32) {
        let start = self.parts[i].vertex_offset();
        let end = self.parts[i + 1].vertex_offset();
        (start, end)
    }

    /// Number of bytes needed to serialize this geometry contiguously as
    /// `[GeomHeader][PartsArray][Vertices]`, matching the source's
    /// `GeomRawSize`.
    pub fn raw_size(&self) -> usize {
        let header_size = 8;
        let parts_size = if self.parts.is_empty() {
            0
        } else {
            let n = self.parts.len();
            let padded = n + (n % 2);
            padded * 4
        };
        let vertex_size = self.vertices.len() * self.flags.bytes_per_vertex_f64_unit();
        header_size + parts_size + vertex_size
    }

    /// Serializes `[GeomHeader][PartsArray][Vertices]` into one contiguous
    /// buffer, matching `GeomCopyRawOut`. Vertices are written at the
    /// on-wire width implied by `flags` (f32 or f64).
    pub fn copy_raw_out(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.raw_size());
        out.extend_from_slice(&self.header.num_parts.to_le_bytes());
        out.extend_from_slice(&self.header.srid.to_le_bytes());
        if !self.parts.is_empty() {
            let n = self.parts.len();
            let padded = n + (n % 2);
            for p in &self.parts {
                out.extend_from_slice(&p.0.to_le_bytes());
            }
            if padded > n {
                out.extend_from_slice(&0u32.to_le_bytes());
            }
        }
        if self.flags.contains(GeomFlags::DOUBLE) {
            for v in &self.vertices {
                out.extend_from_slice(&v.to_le_bytes());
            }
        } else {
            for v in &self.vertices {
                out.extend_from_slice(&(*v as f32).to_le_bytes());
            }
        }
        out
    }

    /// Reconstructs a `GeomValue` from bytes produced by `copy_raw_out`,
    /// matching `GeomCopyRawIn`. The caller supplies the flags and a flag
    /// for "this concrete type carries a parts array" since that
    /// information lives on the `Type` tag, not in the raw bytes.
    pub fn copy_raw_in(bytes: &[u8], flags: GeomFlags, has_parts_array: bool) -> Result<Self> {
        if bytes.len() < 8 {
            return Err(Error::Overrun);
        }
        let num_parts = u32::from_le_bytes(bytes[0..4].try_into().unwrap());
        let srid = i32::from_le_bytes(bytes[4..8].try_into().unwrap());
        let mut off = 8usize;
        let mut parts = Vec::new();
        if has_parts_array {
            let n = num_parts as usize + 1;
            let padded = n + (n % 2);
            if bytes.len() < off + padded * 4 {
                return Err(Error::Overrun);
            }
            for i in 0..n {
                let b = &bytes[off + i * 4..off + i * 4 + 4];
                parts.push(GeomPartFlags(u32::from_le_bytes(b.try_into().unwrap())));
            }
            off += padded * 4;
        }
        let total_vertices = if has_parts_array {
            parts.last().map(|p| p.vertex_offset()).unwrap_or(0)
        } else {
            num_parts
        };
        let dims = flags.dimensions() as usize;
        let unit = if flags.contains(GeomFlags::DOUBLE) { 8 } else { 4 };
        let vbytes = total_vertices as usize * dims * unit;
        if bytes.len() < off + vbytes {
            return Err(Error::Overrun);
        }
        let mut vertices = Vec::with_capacity(total_vertices as usize * dims);
        if flags.contains(GeomFlags::DOUBLE) {
            for chunk in bytes[off..off + vbytes].chunks_exact(8) {
                vertices.push(f64::from_le_bytes(chunk.try_into().unwrap()));
            }
        } else {
            for chunk in bytes[off..off + vbytes].chunks_exact(4) {
                vertices.push(f32::from_le_bytes(chunk.try_into().unwrap()) as f64);
            }
        }
        Ok(GeomValue {
            header: GeomHeader { num_parts, srid },
            flags,
            parts,
            vertices,
        })
    }
}

impl GeomFlags {
    fn bytes_per_vertex_f64_unit(self) -> usize {
        if self.contains(GeomFlags::DOUBLE) { 8 } else { 4 }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn point(x: f64, y: f64) -> GeomValue {
        GeomValue {
            header: GeomHeader { num_parts: 1, srid: 4326 },
            flags: GeomFlags::DOUBLE,
            parts: vec![],
            vertices: vec![x, y],
        }
    }

    #[test]
    fn raw_round_trip_point() {
        let g = point(1.5, -2.25);
        let bytes = g.copy_raw_out();
        let back = GeomValue::copy_raw_in(&bytes, g.flags, false).unwrap();
        assert_eq!(back, g);
    }

    #[test]
    fn part_flags_reject_excessive_offset() {
        assert!(GeomPartFlags::new(MAX_VERTICES_PER_PART + 1, false, false).is_err());
        assert!(GeomPartFlags::new(MAX_VERTICES_PER_PART, true, true).is_ok());
    }

    #[test]
    fn part_flags_roundtrip_bits() {
        let f = GeomPartFlags::new(42, true, true).unwrap();
        assert_eq!(f.vertex_offset(), 42);
        assert!(f.closed());
        assert!(f.exterior_ring());
    }
}

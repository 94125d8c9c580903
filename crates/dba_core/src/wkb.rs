//! WKB/EWKB encode and decode, and the polygon ring-reordering algorithm
//! (C4, part 2).
//!
//! The source drives this with a callback reader/target pair
//! (`WKG_Reader`/`WKG_Target`) so that `Decode`'s first pass can count
//! vertices before the fixed-layout arena allocation is made. This crate's
//! in-memory geometry representation ([`GeomValue`]) is backed by growable
//! `Vec`s, so the count-then-fill indirection isn't needed to avoid a
//! reallocation; encode and decode below operate directly on `GeomValue`,
//! preserving every rule the callback design exists to enforce (ring
//! closure, Z/M modifiers, SRID, Multi-promotion).

use crate::error::{Error, Result};
use crate::geom::{GeomFlags, GeomHeader, GeomPartFlags, GeomValue};
use crate::types::Type;

const WKB_POINT: u32 = 1;
const WKB_LINESTRING: u32 = 2;
const WKB_POLYGON: u32 = 3;
const WKB_MULTIPOINT: u32 = 4;
const WKB_MULTILINESTRING: u32 = 5;
const WKB_MULTIPOLYGON: u32 = 6;

const EWKB_Z: u32 = 0x8000_0000;
const EWKB_M: u32 = 0x4000_0000;
const EWKB_SRID: u32 = 0x2000_0000;

/// Options controlling [`encode`]. `force_multi` promotes a singleton
/// geometry to its Multi-variant, matching the source's `Force_Multi`
/// writer flag used for engines (e.g. PostGIS columns typed `MULTI*`) that
/// reject a bare singleton in a Multi column.
#[derive(Debug, Clone, Copy)]
pub struct EncodeOptions {
    pub little_endian: bool,
    pub with_srid: bool,
    pub force_multi: bool,
}

impl Default for EncodeOptions {
    fn default() -> Self {
        EncodeOptions {
            little_endian: cfg!(target_endian = "little"),
            with_srid: true,
            force_multi: false,
        }
    }
}

/// Number of bytes [`encode`] will produce for `g`, without performing the
/// encode. Exposed separately (mirroring the source's `ComputeEncodedBytes`)
/// so callers can pre-size a buffer; `encode` does not call this itself.
pub fn computed_encoded_bytes(typ: Type, g: &GeomValue, opts: EncodeOptions) -> usize {
    encode(typ, g, opts).len()
}

/// Encodes one geometry as WKB (or EWKB, if `opts.with_srid` and the SRID
/// is non-zero). Closed rings re-emit their first vertex as the last
/// vertex, satisfying the OGC rule that polygon rings are closed on the
/// wire even though this crate's storage omits the duplicate.
pub fn encode(typ: Type, g: &GeomValue, opts: EncodeOptions) -> Vec<u8> {
    let mut out = Vec::with_capacity(g.raw_size() + 32);
    let dims = g.dims();
    let has_z = g.flags.contains(GeomFlags::HAS_Z);
    let has_m = g.flags.contains(GeomFlags::HAS_M);
    let srid = g.header.srid;
    let emit_srid = opts.with_srid && srid != 0;

    let base_tag = match typ {
        Type::GeomPoint => {
            if opts.force_multi {
                WKB_MULTIPOINT
            } else {
                WKB_POINT
            }
        }
        Type::GeomMultiPoint => WKB_MULTIPOINT,
        Type::GeomPolyline => {
            if opts.force_multi || g.has_parts_array() && g.parts.len() > 2 {
                WKB_MULTILINESTRING
            } else {
                WKB_LINESTRING
            }
        }
        Type::GeomPolygon => {
            if opts.force_multi {
                WKB_MULTIPOLYGON
            } else {
                WKB_POLYGON
            }
        }
        _ => unreachable!("encode called on non-geometry type"),
    };

    out.push(if opts.little_endian { 1 } else { 0 });
    let mut type_word = base_tag;
    if has_z {
        type_word |= EWKB_Z;
    }
    if has_m {
        type_word |= EWKB_M;
    }
    if emit_srid {
        type_word |= EWKB_SRID;
    }
    write_u32(&mut out, type_word, opts.little_endian);
    if emit_srid {
        write_u32(&mut out, srid as u32, opts.little_endian);
    }

    match base_tag {
        WKB_POINT => write_vertex(&mut out, &g.vertices[0..dims], opts.little_endian),
        WKB_MULTIPOINT => {
            let n = g.total_vertex_count();
            write_u32(&mut out, n, opts.little_endian);
            for i in 0..n as usize {
                out.push(if opts.little_endian { 1 } else { 0 });
                write_u32(&mut out, point_subtag(has_z, has_m), opts.little_endian);
                write_vertex(&mut out, &g.vertices[i * dims..(i + 1) * dims], opts.little_endian);
            }
        }
        WKB_LINESTRING => write_ring_body(&mut out, g, 0, opts.little_endian),
        WKB_POLYGON => {
            write_u32(&mut out, g.parts.len().saturating_sub(1) as u32, opts.little_endian);
            for i in 0..g.parts.len() - 1 {
                write_ring(&mut out, g, i, opts.little_endian);
            }
        }
        WKB_MULTILINESTRING => {
            let n_parts = g.parts.len().saturating_sub(1);
            write_u32(&mut out, n_parts as u32, opts.little_endian);
            for i in 0..n_parts {
                out.push(if opts.little_endian { 1 } else { 0 });
                write_u32(&mut out, linestring_subtag(has_z, has_m), opts.little_endian);
                write_ring_body(&mut out, g, i, opts.little_endian);
            }
        }
        WKB_MULTIPOLYGON => {
            // One ring-exterior-flagged part starts each sub-polygon.
            let boundaries = exterior_boundaries(g);
            write_u32(&mut out, boundaries.len() as u32, opts.little_endian);
            for (start, end) in boundaries {
                out.push(if opts.little_endian { 1 } else { 0 });
                write_u32(&mut out, polygon_subtag(has_z, has_m), opts.little_endian);
                write_u32(&mut out, (end - start) as u32, opts.little_endian);
                for i in start..end {
                    write_ring(&mut out, g, i, opts.little_endian);
                }
            }
        }
        _ => unreachable!(),
    }
    out
}

fn point_subtag(has_z: bool, has_m: bool) -> u32 {
    tagged(WKB_POINT, has_z, has_m)
}
fn linestring_subtag(has_z: bool, has_m: bool) -> u32 {
    tagged(WKB_LINESTRING, has_z, has_m)
}
fn polygon_subtag(has_z: bool, has_m: bool) -> u32 {
    tagged(WKB_POLYGON, has_z, has_m)
}
fn tagged(base: u32, has_z: bool, has_m: bool) -> u32 {
    let mut t = base;
    if has_z {
        t |= EWKB_Z;
    }
    if has_m {
        t |= EWKB_M;
    }
    t
}

/// Sub-polygon boundaries within a multi-polygon's parts array: each
/// exterior-flagged part starts a new boundary that runs until (but
/// excluding) the next exterior-flagged part.
fn exterior_boundaries(g: &GeomValue) -> Vec<(usize, usize)> {
    let n = g.parts.len().saturating_sub(1);
    let mut starts: Vec<usize> = (0..n).filter(|&i| g.parts[i].exterior_ring()).collect();
    if starts.is_empty() && n > 0 {
        starts.push(0);
    }
    let mut out = Vec::with_capacity(starts.len());
    for (k, &s) in starts.iter().enumerate() {
        let e = starts.get(k + 1).copied().unwrap_or(n);
        out.push((s, e));
    }
    out
}

fn write_ring(out: &mut Vec<u8>, g: &GeomValue, part_idx: usize, little_endian: bool) {
    write_ring_body(out, g, part_idx, little_endian)
}

fn write_ring_body(out: &mut Vec<u8>, g: &GeomValue, part_idx: usize, little_endian: bool) {
    let (start, end) = g.part_range(part_idx);
    let dims = g.dims();
    let closed = g.parts[part_idx].closed();
    let n = (end - start) as usize;
    let wire_count = if closed { n + 1 } else { n };
    write_u32(out, wire_count as u32, little_endian);
    for i in start as usize..end as usize {
        write_vertex(out, &g.vertices[i * dims..(i + 1) * dims], little_endian);
    }
    if closed && n > 0 {
        write_vertex(out, &g.vertices[start as usize * dims..start as usize * dims + dims], little_endian);
    }
}

fn write_vertex(out: &mut Vec<u8>, v: &[f64], little_endian: bool) {
    for c in v {
        if little_endian {
            out.extend_from_slice(&c.to_le_bytes());
        } else {
            out.extend_from_slice(&c.to_be_bytes());
        }
    }
}

fn write_u32(out: &mut Vec<u8>, v: u32, little_endian: bool) {
    if little_endian {
        out.extend_from_slice(&v.to_le_bytes());
    } else {
        out.extend_from_slice(&v.to_be_bytes());
    }
}

/// Decodes a WKB/EWKB buffer into its concrete `Type` and a `GeomValue`.
/// Rings that are bit-exactly closed (first vertex == last vertex) have
/// the duplicate dropped and `Closed` set, matching the source's
/// `Decode` pass 2 behavior.
pub fn decode(bytes: &[u8]) -> Result<(Type, GeomValue)> {
    let mut cur = Cursor::new(bytes);
    let little_endian = cur.u8()? == 1;
    let raw_type = cur.u32(little_endian)?;
    let has_z = raw_type & EWKB_Z != 0;
    let has_m = raw_type & EWKB_M != 0;
    let has_srid = raw_type & EWKB_SRID != 0;
    let base = raw_type & 0x0000_ffff;
    let srid = if has_srid { cur.u32(little_endian)? as i32 } else { 0 };

    let mut flags = GeomFlags::DOUBLE;
    if has_z {
        flags |= GeomFlags::HAS_Z;
    }
    if has_m {
        flags |= GeomFlags::HAS_M;
    }
    let dims = flags.dimensions() as usize;

    match base {
        WKB_POINT => {
            let v = cur.vertex(dims, little_endian)?;
            Ok((
                Type::GeomPoint,
                GeomValue { header: GeomHeader { num_parts: 1, srid }, flags, parts: vec![], vertices: v },
            ))
        }
        WKB_MULTIPOINT => {
            let n = cur.u32(little_endian)?;
            let mut vertices = Vec::with_capacity(n as usize * dims);
            for _ in 0..n {
                cur.u8()?;
                cur.u32(little_endian)?;
                vertices.extend(cur.vertex(dims, little_endian)?);
            }
            Ok((
                Type::GeomMultiPoint,
                GeomValue { header: GeomHeader { num_parts: n, srid }, flags, parts: vec![], vertices },
            ))
        }
        WKB_LINESTRING => {
            let line_vertex_count = cur.u32(little_endian)?;
            let raw = cur.read_vertices(line_vertex_count, dims, little_endian)?;
            let (closed, v) = drop_duplicate_closing_vertex(raw, dims);
            let n = (v.len() / dims) as u32;
            let parts = vec![GeomPartFlags::new(0, closed, false)?, GeomPartFlags::new(n, false, false)?];
            Ok((
                Type::GeomPolyline,
                GeomValue { header: GeomHeader { num_parts: 1, srid }, flags, parts, vertices: v },
            ))
        }
        WKB_MULTILINESTRING => {
            let n = cur.u32(little_endian)?;
            let mut vertices = Vec::new();
            let mut parts = Vec::new();
            let mut offset = 0u32;
            for _ in 0..n {
                cur.u8()?;
                cur.u32(little_endian)?;
                let line_vertex_count = cur.u32(little_endian)?;
                let raw = cur.read_vertices(line_vertex_count, dims, little_endian)?;
                let (closed, v) = drop_duplicate_closing_vertex(raw, dims);
                let count = (v.len() / dims) as u32;
                vertices.extend(v);
                parts.push(GeomPartFlags::new(offset, closed, false)?);
                offset += count;
            }
            parts.push(GeomPartFlags::new(offset, false, false)?);
            Ok((
                Type::GeomPolyline,
                GeomValue { header: GeomHeader { num_parts: n, srid }, flags, parts, vertices },
            ))
        }
        WKB_POLYGON => {
            let nrings = cur.u32(little_endian)?;
            let (parts, vertices) = cur.read_polygon_rings(nrings, dims, little_endian)?;
            Ok((
                Type::GeomPolygon,
                GeomValue { header: GeomHeader { num_parts: nrings, srid }, flags, parts, vertices },
            ))
        }
        WKB_MULTIPOLYGON => {
            let npoly = cur.u32(little_endian)?;
            let mut parts = Vec::new();
            let mut vertices = Vec::new();
            let mut offset = 0u32;
            let mut total_rings = 0u32;
            for _ in 0..npoly {
                cur.u8()?;
                cur.u32(little_endian)?;
                let nrings = cur.u32(little_endian)?;
                let (mut poly_parts, poly_vertices) = cur.read_polygon_rings(nrings, dims, little_endian)?;
                poly_parts.pop(); // drop this sub-polygon's sentinel; one global sentinel is appended below
                for p in &mut poly_parts {
                    *p = GeomPartFlags::new(p.vertex_offset() + offset, p.closed(), p.exterior_ring())?;
                }
                offset += (poly_vertices.len() / dims) as u32;
                total_rings += nrings;
                parts.extend(poly_parts);
                vertices.extend(poly_vertices);
            }
            parts.push(GeomPartFlags::new(offset, false, false)?);
            Ok((
                Type::GeomPolygon,
                GeomValue { header: GeomHeader { num_parts: total_rings, srid }, flags, parts, vertices },
            ))
        }
        _ => Err(Error::InvalidInput),
    }
}

struct Cursor<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(data: &'a [u8]) -> Self {
        Cursor { data, pos: 0 }
    }

    fn u8(&mut self) -> Result<u8> {
        let b = *self.data.get(self.pos).ok_or(Error::Overrun)?;
        self.pos += 1;
        Ok(b)
    }

    fn u32(&mut self, little_endian: bool) -> Result<u32> {
        let end = self.pos + 4;
        let b = self.data.get(self.pos..end).ok_or(Error::Overrun)?;
        self.pos = end;
        Ok(if little_endian {
            u32::from_le_bytes(b.try_into().unwrap())
        } else {
            u32::from_be_bytes(b.try_into().unwrap())
        })
    }

    fn f64(&mut self, little_endian: bool) -> Result<f64> {
        let end = self.pos + 8;
        let b = self.data.get(self.pos..end).ok_or(Error::Overrun)?;
        self.pos = end;
        Ok(if little_endian {
            f64::from_le_bytes(b.try_into().unwrap())
        } else {
            f64::from_be_bytes(b.try_into().unwrap())
        })
    }

    fn vertex(&mut self, dims: usize, little_endian: bool) -> Result<Vec<f64>> {
        (0..dims).map(|_| self.f64(little_endian)).collect()
    }

    fn read_vertices(&mut self, count: u32, dims: usize, little_endian: bool) -> Result<Vec<f64>> {
        let mut v = Vec::with_capacity(count as usize * dims);
        for _ in 0..count {
            v.extend(self.vertex(dims, little_endian)?);
        }
        Ok(v)
    }

    /// Reads `nrings` rings of a single polygon body in wire order (ring
    /// count, then that ring's vertices, repeated), dropping a duplicated
    /// closing vertex from each and flagging the first ring exterior.
    fn read_polygon_rings(&mut self, nrings: u32, dims: usize, little_endian: bool) -> Result<(Vec<GeomPartFlags>, Vec<f64>)> {
        let mut parts = Vec::with_capacity(nrings as usize + 1);
        let mut vertices = Vec::new();
        let mut offset = 0u32;
        for i in 0..nrings {
            let vc = self.u32(little_endian)?;
            let raw = self.read_vertices(vc, dims, little_endian)?;
            let (closed, v) = drop_duplicate_closing_vertex(raw, dims);
            let count = (v.len() / dims) as u32;
            vertices.extend(v);
            parts.push(GeomPartFlags::new(offset, closed, i == 0)?);
            offset += count;
        }
        parts.push(GeomPartFlags::new(offset, false, false)?);
        Ok((parts, vertices))
    }
}

/// If the ring's first and last vertex are bit-exactly equal, drops the
/// duplicate and reports the ring as closed.
fn drop_duplicate_closing_vertex(mut v: Vec<f64>, dims: usize) -> (bool, Vec<f64>) {
    if v.len() < 2 * dims {
        return (false, v);
    }
    let n = v.len() / dims;
    let first = &v[0..dims];
    let last = &v[(n - 1) * dims..n * dims];
    if first == last {
        v.truncate((n - 1) * dims);
        (true, v)
    } else {
        (false, v)
    }
}

// ---------------------------------------------------------------------
// Ring reordering
// ---------------------------------------------------------------------

#[derive(Clone, Copy)]
struct BBox {
    min: (f64, f64),
    max: (f64, f64),
}

impl BBox {
    fn contains(&self, other: &BBox) -> bool {
        self.min.0 <= other.min.0 && self.min.1 <= other.min.1 && self.max.0 >= other.max.0 && self.max.1 >= other.max.1
    }
}

fn ring_bbox(ring: &[f64], dims: usize) -> BBox {
    let mut min = (f64::MAX, f64::MAX);
    let mut max = (f64::MIN, f64::MIN);
    for v in ring.chunks_exact(dims) {
        min.0 = min.0.min(v[0]);
        min.1 = min.1.min(v[1]);
        max.0 = max.0.max(v[0]);
        max.1 = max.1.max(v[1]);
    }
    BBox { min, max }
}

/// Shoelace formula restricted to x/y; positive means counter-clockwise.
fn signed_area(ring: &[f64], dims: usize) -> f64 {
    let n = ring.len() / dims;
    if n < 3 {
        return 0.0;
    }
    let mut sum = 0.0;
    for i in 0..n {
        let j = (i + 1) % n;
        let (xi, yi) = (ring[i * dims], ring[i * dims + 1]);
        let (xj, yj) = (ring[j * dims], ring[j * dims + 1]);
        sum += xi * yj - xj * yi;
    }
    sum * 0.5
}

/// Even-odd ray-casting point-in-polygon test against a single ring.
fn point_in_ring(ring: &[f64], dims: usize, px: f64, py: f64) -> bool {
    let n = ring.len() / dims;
    let mut inside = false;
    let mut j = n - 1;
    for i in 0..n {
        let (xi, yi) = (ring[i * dims], ring[i * dims + 1]);
        let (xj, yj) = (ring[j * dims], ring[j * dims + 1]);
        if (yi > py) != (yj > py) {
            let x_cross = xi + (py - yi) / (yj - yi) * (xj - xi);
            if px < x_cross {
                inside = !inside;
            }
        }
        j = i;
    }
    inside
}

/// Reorders a polygon's rings so every exterior ring is immediately
/// followed by the interior rings nested inside it, exterior rings wind
/// counter-clockwise, interior rings wind clockwise. No-op (beyond setting
/// the flag) if `RINGS_IN_WKB_ORDER` is already set. See spec.md §4.2 for
/// the algorithm this implements step by step.
pub fn fix_ring_order(g: &mut GeomValue) {
    if g.flags.contains(GeomFlags::RINGS_IN_WKB_ORDER) {
        return;
    }
    let dims = g.dims();
    let nrings = g.parts.len().saturating_sub(1);
    if nrings == 0 {
        g.flags |= GeomFlags::RINGS_IN_WKB_ORDER;
        return;
    }

    let rings: Vec<Vec<f64>> = (0..nrings)
        .map(|i| {
            let (s, e) = g.part_range(i);
            g.vertices[s as usize * dims..e as usize * dims].to_vec()
        })
        .collect();
    let bboxes: Vec<BBox> = rings.iter().map(|r| ring_bbox(r, dims)).collect();
    let areas: Vec<f64> = rings.iter().map(|r| signed_area(r, dims).abs()).collect();

    let mut parent: Vec<Option<usize>> = vec![None; nrings];
    for i in 0..nrings {
        if rings[i].is_empty() {
            continue;
        }
        let (fx, fy) = (rings[i][0], rings[i][1]);
        let mut best: Option<usize> = None;
        for j in 0..nrings {
            if i == j {
                continue;
            }
            if bboxes[j].contains(&bboxes[i]) && point_in_ring(&rings[j], dims, fx, fy) {
                if best.map(|b| areas[j] > areas[b]).unwrap_or(true) {
                    best = Some(j);
                }
            }
        }
        parent[i] = best;
    }
    for i in 0..nrings {
        if let Some(j) = parent[i] {
            if parent[j] == Some(i) {
                parent[i] = None;
                parent[j] = None;
            }
        }
    }

    let top_level: Vec<usize> = (0..nrings).filter(|&i| parent[i].is_none()).collect();
    let mut order = Vec::with_capacity(nrings);
    for &t in &top_level {
        order.push(t);
        for i in 0..nrings {
            if parent[i] == Some(t) {
                order.push(i);
            }
        }
    }

    let mut new_parts = Vec::with_capacity(nrings + 1);
    let mut new_vertices = Vec::with_capacity(g.vertices.len());
    let mut offset = 0u32;
    for &i in &order {
        let is_top = parent[i].is_none();
        let mut ring = rings[i].clone();
        let area = signed_area(&ring, dims);
        let is_ccw = area > 0.0;
        if is_top && !is_ccw {
            reverse_ring(&mut ring, dims);
        } else if !is_top && is_ccw {
            reverse_ring(&mut ring, dims);
        }
        let closed = g.parts[i].closed();
        let n = (ring.len() / dims) as u32;
        new_vertices.extend(ring);
        new_parts.push(GeomPartFlags::new(offset, closed, is_top).expect("ring fits vertex cap"));
        offset += n;
    }
    new_parts.push(GeomPartFlags::new(offset, false, false).expect("sentinel fits"));

    g.parts = new_parts;
    g.vertices = new_vertices;
    g.flags |= GeomFlags::RINGS_IN_WKB_ORDER;
}

fn reverse_ring(ring: &mut [f64], dims: usize) {
    let n = ring.len() / dims;
    for i in 0..n / 2 {
        let j = n - 1 - i;
        for d in 0..dims {
            ring.swap(i * dims + d, j * dims + d);
        }
    }
}

/// Count of top-level (outermost, `parent == None`) rings after
/// reordering — `GeomNumExternalRings` in the source.
pub fn num_external_rings(g: &GeomValue) -> u32 {
    g.parts
        .iter()
        .take(g.parts.len().saturating_sub(1))
        .filter(|p| p.exterior_ring())
        .count() as u32
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geom::GeomHeader;

    fn square(x0: f64, y0: f64, s: f64, ccw: bool) -> Vec<f64> {
        let mut pts = vec![(x0, y0), (x0 + s, y0), (x0 + s, y0 + s), (x0, y0 + s)];
        if !ccw {
            pts.reverse();
        }
        pts.into_iter().flat_map(|(x, y)| vec![x, y]).collect()
    }

    fn polygon_with_hole() -> GeomValue {
        // Outer ring given clockwise (wrong orientation on purpose), hole given CCW.
        let outer = square(0.0, 0.0, 10.0, false);
        let hole = square(2.0, 2.0, 2.0, true);
        let mut vertices = Vec::new();
        vertices.extend(hole.clone()); // deliberately out of order: hole first
        vertices.extend(outer.clone());
        GeomValue {
            header: GeomHeader { num_parts: 2, srid: 0 },
            flags: GeomFlags::DOUBLE,
            parts: vec![
                GeomPartFlags::new(0, true, false).unwrap(),
                GeomPartFlags::new(4, true, false).unwrap(),
                GeomPartFlags::new(8, false, false).unwrap(),
            ],
            vertices,
        }
    }

    #[test]
    fn fix_ring_order_puts_exterior_first_and_fixes_winding() {
        let mut g = polygon_with_hole();
        fix_ring_order(&mut g);
        assert_eq!(g.parts.len(), 3);
        assert!(g.parts[0].exterior_ring());
        assert!(!g.parts[1].exterior_ring());
        let dims = g.dims();
        let (s0, e0) = g.part_range(0);
        let outer_area = signed_area(&g.vertices[s0 as usize * dims..e0 as usize * dims], dims);
        assert!(outer_area > 0.0, "exterior ring must be CCW");
        let (s1, e1) = g.part_range(1);
        let hole_area = signed_area(&g.vertices[s1 as usize * dims..e1 as usize * dims], dims);
        assert!(hole_area < 0.0, "interior ring must be CW");
    }

    #[test]
    fn wkb_point_round_trips() {
        let g = GeomValue {
            header: GeomHeader { num_parts: 1, srid: 4326 },
            flags: GeomFlags::DOUBLE,
            parts: vec![],
            vertices: vec![10.0, 20.0],
        };
        let bytes = encode(Type::GeomPoint, &g, EncodeOptions::default());
        let (typ, back) = decode(&bytes).unwrap();
        assert_eq!(typ, Type::GeomPoint);
        assert_eq!(back.vertices, g.vertices);
        assert_eq!(back.header.srid, 4326);
    }

    #[test]
    fn wkb_polygon_round_trips_after_reorder() {
        let mut g = polygon_with_hole();
        fix_ring_order(&mut g);
        let bytes = encode(Type::GeomPolygon, &g, EncodeOptions { with_srid: false, ..Default::default() });
        let (typ, back) = decode(&bytes).unwrap();
        assert_eq!(typ, Type::GeomPolygon);
        assert_eq!(back.parts.len(), g.parts.len());
        assert_eq!(back.vertices.len(), g.vertices.len());
    }
}

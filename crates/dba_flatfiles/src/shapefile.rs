//! Forward-only `.shp` reader. Feature geometry decodes straight into the
//! same [`GeomValue`] storage the WKB codec produces, so a row read from a
//! shapefile and a row decoded from a PostGIS `geometry` column are
//! interchangeable downstream. No `.shx` index is read: sequential access
//! only needs each record's own content length, exactly as a forward-only
//! reader over the `.shp` stream would.

use std::fs::File;
use std::io::{self, BufReader, Read};

use byteorder::{BigEndian, LittleEndian, ReadBytesExt};
use dba_core::{Error, GeomFlags, GeomHeader, GeomPartFlags, GeomValue, Result, Type, fix_ring_order};

const FILE_CODE: i32 = 9994;
const FILE_VERSION: i32 = 1000;

/// Caps against a corrupt or malicious `.shp` feeding an unbounded
/// allocation; matches the source's `MaxPolyParts`/`MaxPolyVertices`.
const MAX_POLY_PARTS: u32 = 10_000;
const MAX_POLY_VERTICES: u32 = 10_000_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
enum ShapeType {
    Null = 0,
    Point = 1,
    Polyline = 3,
    Polygon = 5,
    MultiPoint = 8,
    PointZ = 11,
    PolylineZ = 13,
    PolygonZ = 15,
    MultiPointZ = 18,
    PointM = 21,
    PolylineM = 23,
    PolygonM = 25,
    MultiPointM = 28,
}

impl ShapeType {
    fn from_i32(v: i32) -> Result<Self> {
        Ok(match v {
            0 => ShapeType::Null,
            1 => ShapeType::Point,
            3 => ShapeType::Polyline,
            5 => ShapeType::Polygon,
            8 => ShapeType::MultiPoint,
            11 => ShapeType::PointZ,
            13 => ShapeType::PolylineZ,
            15 => ShapeType::PolygonZ,
            18 => ShapeType::MultiPointZ,
            21 => ShapeType::PointM,
            23 => ShapeType::PolylineM,
            25 => ShapeType::PolygonM,
            28 => ShapeType::MultiPointM,
            _ => return Err(Error::InvalidInput),
        })
    }

    fn has_z(self) -> bool {
        matches!(self, ShapeType::PointZ | ShapeType::PolylineZ | ShapeType::PolygonZ | ShapeType::MultiPointZ)
    }

    /// Z-variants always carry an `M` array too, per the on-disk layout
    /// (`ShPointMZ` has both `Z` and `M`); only the plain `*M` variants are
    /// "M but not Z".
    fn has_m(self) -> bool {
        self.has_z()
            || matches!(self, ShapeType::PointM | ShapeType::PolylineM | ShapeType::PolygonM | ShapeType::MultiPointM)
    }

    fn geom_type(self) -> Option<Type> {
        match self {
            ShapeType::Null => None,
            ShapeType::Point | ShapeType::PointM | ShapeType::PointZ => Some(Type::GeomPoint),
            ShapeType::Polyline | ShapeType::PolylineM | ShapeType::PolylineZ => Some(Type::GeomPolyline),
            ShapeType::Polygon | ShapeType::PolygonM | ShapeType::PolygonZ => Some(Type::GeomPolygon),
            ShapeType::MultiPoint | ShapeType::MultiPointM | ShapeType::MultiPointZ => Some(Type::GeomMultiPoint),
        }
    }

    fn is_poly(self) -> bool {
        matches!(
            self,
            ShapeType::Polyline | ShapeType::PolylineM | ShapeType::PolylineZ | ShapeType::Polygon | ShapeType::PolygonM | ShapeType::PolygonZ
        )
    }

    fn is_polygon(self) -> bool {
        matches!(self, ShapeType::Polygon | ShapeType::PolygonM | ShapeType::PolygonZ)
    }

    fn is_multipoint(self) -> bool {
        matches!(self, ShapeType::MultiPoint | ShapeType::MultiPointM | ShapeType::MultiPointZ)
    }
}

fn io_err(e: io::Error) -> Error {
    Error::Other(format!("shapefile io error: {e}"))
}

/// Reads one shapefile's main header and then yields each feature in
/// on-disk order via [`ShapefileReader::next_feature`].
pub struct ShapefileReader<R> {
    reader: R,
    shape_type: ShapeType,
    geom_type: Type,
}

impl ShapefileReader<BufReader<File>> {
    pub fn open(path: impl AsRef<std::path::Path>) -> Result<Self> {
        let file = File::open(path).map_err(io_err)?;
        Self::new(BufReader::new(file))
    }
}

impl<R: Read> ShapefileReader<R> {
    pub fn new(mut reader: R) -> Result<Self> {
        let file_code = reader.read_i32::<BigEndian>().map_err(io_err)?;
        if file_code != FILE_CODE {
            return Err(Error::InvalidInput);
        }
        for _ in 0..5 {
            reader.read_i32::<BigEndian>().map_err(io_err)?; // unused
        }
        reader.read_i32::<BigEndian>().map_err(io_err)?; // file length, in 16-bit words

        let version = reader.read_i32::<LittleEndian>().map_err(io_err)?;
        if version != FILE_VERSION {
            return Err(Error::InvalidInput);
        }
        let shape_type = ShapeType::from_i32(reader.read_i32::<LittleEndian>().map_err(io_err)?)?;
        for _ in 0..8 {
            reader.read_f64::<LittleEndian>().map_err(io_err)?; // Xmin..Mmax bounding box
        }

        let geom_type = shape_type.geom_type().unwrap_or(Type::GeomPoint);
        Ok(ShapefileReader { reader, shape_type, geom_type })
    }

    /// The geometry column type every non-null feature in this file decodes
    /// to (`GeomPoint`/`GeomPolyline`/`GeomPolygon`/`GeomMultiPoint`).
    pub fn geom_type(&self) -> Type {
        self.geom_type
    }

    /// Reads the next feature. Returns `Ok(None)` at end of file; a null
    /// feature decodes to `Ok(Some((typ, None)))`.
    pub fn next_feature(&mut self) -> Result<Option<(Type, Option<GeomValue>)>> {
        let _index = match self.reader.read_i32::<BigEndian>() {
            Ok(v) => v,
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Ok(None),
            Err(e) => return Err(io_err(e)),
        };
        let content_words = self.reader.read_i32::<BigEndian>().map_err(io_err)?;
        let content_len = content_words as usize * 2;
        if content_len < 4 {
            return Err(Error::InvalidInput);
        }

        let record_type = ShapeType::from_i32(self.reader.read_i32::<LittleEndian>().map_err(io_err)?)?;
        let body_len = content_len - 4;
        let mut body = vec![0u8; body_len];
        self.reader.read_exact(&mut body).map_err(io_err)?;
        let mut cur = io::Cursor::new(body);

        if record_type == ShapeType::Null {
            return Ok(Some((self.geom_type, None)));
        }

        let g = if record_type.is_poly() {
            read_poly(&mut cur, record_type)?
        } else if record_type.is_multipoint() {
            read_multipoint(&mut cur, record_type)?
        } else {
            read_point(&mut cur, record_type)?
        };
        Ok(Some((self.geom_type, Some(g))))
    }
}

fn flags_for(t: ShapeType) -> GeomFlags {
    let mut flags = GeomFlags::DOUBLE;
    if t.has_z() {
        flags |= GeomFlags::HAS_Z;
    }
    if t.has_m() {
        flags |= GeomFlags::HAS_M;
    }
    flags
}

fn read_point(cur: &mut io::Cursor<Vec<u8>>, t: ShapeType) -> Result<GeomValue> {
    let flags = flags_for(t);
    let dims = flags.dimensions() as usize;
    let mut vertices = Vec::with_capacity(dims);
    vertices.push(cur.read_f64::<LittleEndian>().map_err(io_err)?);
    vertices.push(cur.read_f64::<LittleEndian>().map_err(io_err)?);
    if t.has_z() {
        vertices.push(cur.read_f64::<LittleEndian>().map_err(io_err)?);
    }
    if t.has_m() {
        vertices.push(cur.read_f64::<LittleEndian>().map_err(io_err)?);
    }
    Ok(GeomValue { header: GeomHeader { num_parts: 1, srid: 0 }, flags, parts: vec![], vertices })
}

fn read_multipoint(cur: &mut io::Cursor<Vec<u8>>, t: ShapeType) -> Result<GeomValue> {
    let flags = flags_for(t);
    for _ in 0..4 {
        cur.read_f64::<LittleEndian>().map_err(io_err)?; // bounding box
    }
    let n = cur.read_i32::<LittleEndian>().map_err(io_err)? as u32;
    if n > MAX_POLY_VERTICES {
        return Err(Error::TooManyVertices { max: MAX_POLY_VERTICES });
    }

    let mut xy = Vec::with_capacity(n as usize * 2);
    for _ in 0..n {
        xy.push((cur.read_f64::<LittleEndian>().map_err(io_err)?, cur.read_f64::<LittleEndian>().map_err(io_err)?));
    }

    let mut z = Vec::new();
    if t.has_z() {
        cur.read_f64::<LittleEndian>().map_err(io_err)?; // Zmin
        cur.read_f64::<LittleEndian>().map_err(io_err)?; // Zmax
        for _ in 0..n {
            z.push(cur.read_f64::<LittleEndian>().map_err(io_err)?);
        }
    }

    let mut m = Vec::new();
    if t.has_m() {
        cur.read_f64::<LittleEndian>().map_err(io_err)?; // Mmin
        cur.read_f64::<LittleEndian>().map_err(io_err)?; // Mmax
        for _ in 0..n {
            m.push(cur.read_f64::<LittleEndian>().map_err(io_err)?);
        }
    }

    let mut vertices = Vec::with_capacity(n as usize * flags.dimensions() as usize);
    for i in 0..n as usize {
        vertices.push(xy[i].0);
        vertices.push(xy[i].1);
        if t.has_z() {
            vertices.push(z[i]);
        }
        if t.has_m() {
            vertices.push(m[i]);
        }
    }

    Ok(GeomValue { header: GeomHeader { num_parts: n, srid: 0 }, flags, parts: vec![], vertices })
}

fn read_poly(cur: &mut io::Cursor<Vec<u8>>, t: ShapeType) -> Result<GeomValue> {
    let flags = flags_for(t);
    for _ in 0..4 {
        cur.read_f64::<LittleEndian>().map_err(io_err)?; // bounding box
    }
    let num_parts = cur.read_i32::<LittleEndian>().map_err(io_err)? as u32;
    let num_points = cur.read_i32::<LittleEndian>().map_err(io_err)? as u32;
    if num_parts == 0 || num_points == 0 {
        return Err(Error::InvalidInput);
    }
    if num_parts > MAX_POLY_PARTS {
        return Err(Error::TooManyParts { max: MAX_POLY_PARTS });
    }
    if num_points > MAX_POLY_VERTICES {
        return Err(Error::TooManyVertices { max: MAX_POLY_VERTICES });
    }

    let mut part_starts = Vec::with_capacity(num_parts as usize);
    for _ in 0..num_parts {
        part_starts.push(cur.read_i32::<LittleEndian>().map_err(io_err)? as u32);
    }

    let mut xy = Vec::with_capacity(num_points as usize * 2);
    for _ in 0..num_points {
        xy.push((cur.read_f64::<LittleEndian>().map_err(io_err)?, cur.read_f64::<LittleEndian>().map_err(io_err)?));
    }

    let mut z = Vec::new();
    if t.has_z() {
        cur.read_f64::<LittleEndian>().map_err(io_err)?; // Zmin
        cur.read_f64::<LittleEndian>().map_err(io_err)?; // Zmax
        for _ in 0..num_points {
            z.push(cur.read_f64::<LittleEndian>().map_err(io_err)?);
        }
    }

    let mut m = Vec::new();
    if t.has_m() {
        cur.read_f64::<LittleEndian>().map_err(io_err)?; // Mmin
        cur.read_f64::<LittleEndian>().map_err(io_err)?; // Mmax
        for _ in 0..num_points {
            m.push(cur.read_f64::<LittleEndian>().map_err(io_err)?);
        }
    }

    let dims = flags.dimensions() as usize;
    let mut raw_vertices = Vec::with_capacity(num_points as usize * dims);
    for i in 0..num_points as usize {
        raw_vertices.push(xy[i].0);
        raw_vertices.push(xy[i].1);
        if t.has_z() {
            raw_vertices.push(z[i]);
        }
        if t.has_m() {
            raw_vertices.push(m[i]);
        }
    }

    let mut parts = Vec::with_capacity(num_parts as usize + 1);
    let mut vertices = Vec::with_capacity(raw_vertices.len());
    let mut offset = 0u32;
    for i in 0..num_parts as usize {
        let start = part_starts[i] as usize;
        let end = if i + 1 < num_parts as usize { part_starts[i + 1] as usize } else { num_points as usize };
        if end <= start || end > num_points as usize {
            return Err(Error::InvalidInput);
        }
        let ring = &raw_vertices[start * dims..end * dims];
        let (closed, ring) = drop_duplicate_closing_vertex(ring, dims);
        let count = (ring.len() / dims) as u32;
        vertices.extend_from_slice(ring);
        parts.push(GeomPartFlags::new(offset, closed, false)?);
        offset += count;
    }
    parts.push(GeomPartFlags::new(offset, false, false)?);

    let mut g = GeomValue { header: GeomHeader { num_parts, srid: 0 }, flags, parts, vertices };
    if t.is_polygon() {
        // Shapefile winds exterior rings clockwise; `fix_ring_order`
        // brings the polygon into this crate's canonical CCW-exterior
        // order and recovers which rings are exterior vs. hole.
        fix_ring_order(&mut g);
    }
    Ok(g)
}

/// Drops a ring's duplicated closing vertex when the first and last
/// vertex are bit-exactly equal, matching the WKB decoder's rule for
/// rings that arrive pre-closed on the wire.
fn drop_duplicate_closing_vertex(v: &[f64], dims: usize) -> (bool, Vec<f64>) {
    if v.len() < 2 * dims {
        return (false, v.to_vec());
    }
    let n = v.len() / dims;
    let first = &v[0..dims];
    let last = &v[(n - 1) * dims..n * dims];
    if first == last { (true, v[..(n - 1) * dims].to_vec()) } else { (false, v.to_vec()) }
}

#[cfg(test)]
mod tests {
    use super::*;
    use byteorder::WriteBytesExt;

    fn write_header(buf: &mut Vec<u8>, shape_type: i32) {
        buf.write_i32::<BigEndian>(FILE_CODE).unwrap();
        for _ in 0..5 {
            buf.write_i32::<BigEndian>(0).unwrap();
        }
        buf.write_i32::<BigEndian>(0).unwrap();
        buf.write_i32::<LittleEndian>(FILE_VERSION).unwrap();
        buf.write_i32::<LittleEndian>(shape_type).unwrap();
        for _ in 0..8 {
            buf.write_f64::<LittleEndian>(0.0).unwrap();
        }
    }

    #[test]
    fn reads_a_single_point_feature() {
        let mut buf = Vec::new();
        write_header(&mut buf, ShapeType::Point as i32);

        let mut content = Vec::new();
        content.write_i32::<LittleEndian>(ShapeType::Point as i32).unwrap();
        content.write_f64::<LittleEndian>(12.5).unwrap();
        content.write_f64::<LittleEndian>(41.9).unwrap();

        buf.write_i32::<BigEndian>(1).unwrap();
        buf.write_i32::<BigEndian>((content.len() / 2) as i32).unwrap();
        buf.extend_from_slice(&content);

        let mut reader = ShapefileReader::new(io::Cursor::new(buf)).unwrap();
        assert_eq!(reader.geom_type(), Type::GeomPoint);

        let (typ, g) = reader.next_feature().unwrap().unwrap();
        assert_eq!(typ, Type::GeomPoint);
        let g = g.unwrap();
        assert_eq!(g.vertices, vec![12.5, 41.9]);

        assert!(reader.next_feature().unwrap().is_none());
    }

    #[test]
    fn reads_a_closed_polygon_ring() {
        let mut buf = Vec::new();
        write_header(&mut buf, ShapeType::Polygon as i32);

        let mut content = Vec::new();
        content.write_i32::<LittleEndian>(ShapeType::Polygon as i32).unwrap();
        for _ in 0..4 {
            content.write_f64::<LittleEndian>(0.0).unwrap();
        }
        content.write_i32::<LittleEndian>(1).unwrap(); // num parts
        content.write_i32::<LittleEndian>(5).unwrap(); // num points (closed ring of 4 + repeat)
        content.write_i32::<LittleEndian>(0).unwrap(); // part start

        let ring = [(0.0, 0.0), (10.0, 0.0), (10.0, 10.0), (0.0, 10.0), (0.0, 0.0)];
        for (x, y) in ring {
            content.write_f64::<LittleEndian>(x).unwrap();
            content.write_f64::<LittleEndian>(y).unwrap();
        }

        buf.write_i32::<BigEndian>(1).unwrap();
        buf.write_i32::<BigEndian>((content.len() / 2) as i32).unwrap();
        buf.extend_from_slice(&content);

        let mut reader = ShapefileReader::new(io::Cursor::new(buf)).unwrap();
        let (typ, g) = reader.next_feature().unwrap().unwrap();
        assert_eq!(typ, Type::GeomPolygon);
        let g = g.unwrap();
        assert_eq!(g.vertices.len() / 2, 4, "duplicate closing vertex is dropped");
        assert!(g.parts[0].closed());
    }
}

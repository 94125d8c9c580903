//! Forward-only readers for the geospatial flat-file formats that still
//! show up alongside database exports: Esri Shapefiles, XBase/DBF tables,
//! and schema-typed CSV. Each reader decodes straight into the `dba_core`
//! value types (`Attrib`, `GeomValue`) so a row read from a file and a row
//! read from a driver are interchangeable to anything downstream. There is
//! no write path and no reprojection; see each module for the exact format
//! subset covered.

pub mod csv;
pub mod dbf;
pub mod shapefile;

pub use csv::{CsvField, CsvReader};
pub use dbf::{DbfField, DbfReader};
pub use shapefile::ShapefileReader;

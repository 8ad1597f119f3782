//! Convert geometries owned by a geometry engine to and from
//! [GeoArrow](https://github.com/geoarrow/geoarrow) arrays.
//!
//! Geometries live inside an engine implementing [`engine::GeometryEngine`] and are addressed by
//! opaque [`engine::GeomHandle`]s. [`writer::ArrayWriter`] walks engine geometries and serializes
//! them as WKT, WKB or native GeoArrow. [`reader::ArrayReader`] reconstructs engine geometries
//! from those arrays. [`schema::SchemaCalculator`] picks the narrowest type able to hold a
//! population of geometries, and [`io::ffi`] exchanges schemas and arrays through the Arrow C Data
//! Interface.

#![cfg_attr(docsrs, feature(doc_auto_cfg))]
#![cfg_attr(not(test), deny(unused_crate_dependencies))]

pub mod array;
pub mod coord;
pub mod datatypes;
pub mod engine;
pub mod error;
pub mod io;
pub mod reader;
pub mod scratch;
pub mod schema;
#[cfg(test)]
pub(crate) mod test;
pub mod visitor;
pub mod writer;

/// The version of this crate.
///
/// With the `geos` feature, `engine::geos::geos_version` reports the linked GEOS version.
///
/// ```
/// assert!(!geoarrow_bridge::version().is_empty());
/// ```
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

//! Text, binary and C Data Interface encodings of geometries.

pub mod ffi;
pub mod wkb;
pub mod wkt;

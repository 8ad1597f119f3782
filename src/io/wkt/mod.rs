//! Reading and writing WKT-encoded geometries.

pub mod reader;
pub mod writer;

pub use reader::read_wkt;
pub use writer::WktWriter;

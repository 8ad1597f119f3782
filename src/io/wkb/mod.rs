//! Reading and writing ISO-flavored WKB-encoded geometries.

pub(crate) mod common;
pub mod reader;
pub mod writer;

pub use reader::read_wkb;
pub use writer::WkbWriter;

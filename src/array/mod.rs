//! Builders and views of GeoArrow arrays.

pub use builder::NativeBuilder;
pub use coord_builder::{
    CoordBufferBuilder, InterleavedCoordBufferBuilder, SeparatedCoordBufferBuilder,
};
pub use metadata::{ArrayMetadata, Edges};
pub use view::{ArrayView, NativeView};

pub mod builder;
pub mod coord_builder;
pub mod metadata;
pub mod offset_builder;
pub mod view;

//! The geometry engine seam.
//!
//! The conversion core never owns geometry objects itself: it asks a [`GeometryEngine`] to
//! describe existing geometries (while writing) and to construct new ones (while reading).
//! Geometries are addressed by opaque [`GeomHandle`] tokens whose lifetime is managed by the
//! engine.
//!
//! Ownership follows the GEOS conventions:
//!
//! - handles returned by `create_*` are owned by the caller until passed to a constructor that
//!   consumes them (`create_polygon`, `create_collection`) or to [`GeometryEngine::destroy`];
//! - a constructor that fails leaves ownership of its inputs with the caller;
//! - handles returned by introspection (`exterior_ring`, `geometry_n`, ...) are borrowed from
//!   their parent and must never be destroyed.

use thiserror::Error;

use crate::datatypes::{Dimension, GeometryType};
use crate::error::{GeoArrowError, Result};

pub mod arena;
pub mod geo;
#[cfg(feature = "geos")]
pub mod geos;

pub use arena::ArenaEngine;
#[cfg(feature = "geos")]
pub use self::geos::GeosEngine;

/// Geometry type ids, as reported by [`GeometryEngine::type_id`].
///
/// These are the GEOS type ids.
pub mod type_id {
    /// Point
    pub const POINT: i32 = 0;
    /// LineString
    pub const LINESTRING: i32 = 1;
    /// LinearRing
    pub const LINEARRING: i32 = 2;
    /// Polygon
    pub const POLYGON: i32 = 3;
    /// MultiPoint
    pub const MULTIPOINT: i32 = 4;
    /// MultiLineString
    pub const MULTILINESTRING: i32 = 5;
    /// MultiPolygon
    pub const MULTIPOLYGON: i32 = 6;
    /// GeometryCollection
    pub const GEOMETRYCOLLECTION: i32 = 7;
}

/// An opaque reference to a geometry living inside a [`GeometryEngine`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GeomHandle(u64);

impl GeomHandle {
    /// Wrap a raw engine-specific identifier.
    pub fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    /// The raw engine-specific identifier.
    pub fn as_raw(&self) -> u64 {
        self.0
    }
}

/// A failure reported by a geometry engine primitive.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{0}")]
pub struct EngineError(pub String);

impl EngineError {
    /// Construct an engine error from a message.
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// Result type returned by [`GeometryEngine`] primitives.
pub type EngineResult<T> = std::result::Result<T, EngineError>;

/// The primitives the conversion core needs from a computational geometry engine.
///
/// Every method takes `&self`: the engine context is shared by readers and writers and the core
/// never creates or destroys it.
pub trait GeometryEngine {
    /// An owned coordinate sequence, consumed by the `create_*` constructors.
    type CoordSeq;

    /// The type id of a geometry (see [`type_id`]).
    fn type_id(&self, geom: GeomHandle) -> EngineResult<i32>;

    /// The coordinate dimension of a geometry (2, 3 or 4).
    fn coordinate_dimension(&self, geom: GeomHandle) -> EngineResult<i32>;

    /// Whether a geometry is empty.
    fn is_empty(&self, geom: GeomHandle) -> EngineResult<bool>;

    /// Number of coordinates of a Point, LineString or LinearRing.
    fn coord_seq_size(&self, geom: GeomHandle) -> EngineResult<usize>;

    /// Number of ordinates per coordinate of a Point, LineString or LinearRing.
    fn coord_seq_dimensions(&self, geom: GeomHandle) -> EngineResult<usize>;

    /// Copy the coordinates of a Point, LineString or LinearRing into `out`, interleaved as
    /// `x y [z] [m]`.
    ///
    /// `out` holds at least `coord_seq_size * (2 + has_z + has_m)` values. Ordinates requested
    /// but absent from the geometry are written as NaN.
    fn copy_coords(
        &self,
        geom: GeomHandle,
        has_z: bool,
        has_m: bool,
        out: &mut [f64],
    ) -> EngineResult<()>;

    /// The exterior ring of a non-empty Polygon (borrowed).
    fn exterior_ring(&self, geom: GeomHandle) -> EngineResult<GeomHandle>;

    /// Number of interior rings of a Polygon.
    fn num_interior_rings(&self, geom: GeomHandle) -> EngineResult<usize>;

    /// The `n`th interior ring of a Polygon (borrowed).
    fn interior_ring_n(&self, geom: GeomHandle, n: usize) -> EngineResult<GeomHandle>;

    /// Number of parts of a multi geometry or collection.
    fn num_geometries(&self, geom: GeomHandle) -> EngineResult<usize>;

    /// The `n`th part of a multi geometry or collection (borrowed).
    fn geometry_n(&self, geom: GeomHandle, n: usize) -> EngineResult<GeomHandle>;

    /// Build a coordinate sequence from `n_coords` interleaved coordinates.
    fn coord_seq_from_buffer(
        &self,
        values: &[f64],
        n_coords: usize,
        has_z: bool,
        has_m: bool,
    ) -> EngineResult<Self::CoordSeq>;

    /// Build a coordinate sequence from one slice per ordinate.
    fn coord_seq_from_arrays(
        &self,
        x: &[f64],
        y: &[f64],
        z: Option<&[f64]>,
        m: Option<&[f64]>,
    ) -> EngineResult<Self::CoordSeq>;

    /// Create a Point. An empty sequence creates an empty point.
    fn create_point(&self, seq: Self::CoordSeq) -> EngineResult<GeomHandle>;

    /// Create a LineString.
    fn create_line_string(&self, seq: Self::CoordSeq) -> EngineResult<GeomHandle>;

    /// Create a LinearRing.
    fn create_linear_ring(&self, seq: Self::CoordSeq) -> EngineResult<GeomHandle>;

    /// Create a Polygon, taking ownership of `shell` and `holes` on success.
    fn create_polygon(&self, shell: GeomHandle, holes: &[GeomHandle])
        -> EngineResult<GeomHandle>;

    /// Create an empty Polygon.
    fn create_empty_polygon(&self) -> EngineResult<GeomHandle>;

    /// Create a multi geometry or collection of kind `type_id`, taking ownership of `geoms` on
    /// success.
    fn create_collection(&self, type_id: i32, geoms: &[GeomHandle]) -> EngineResult<GeomHandle>;

    /// Destroy an owned geometry and everything it owns.
    fn destroy(&self, geom: GeomHandle);
}

/// Attach the failed operation to an [`EngineError`].
pub(crate) trait EngineResultExt<T> {
    fn context(self, operation: &'static str) -> Result<T>;
}

impl<T> EngineResultExt<T> for EngineResult<T> {
    fn context(self, operation: &'static str) -> Result<T> {
        self.map_err(|err| GeoArrowError::Engine {
            operation,
            row: None,
            message: err.0,
        })
    }
}

/// Map an engine type id to the GeoArrow geometry type. LinearRing maps to LineString.
pub fn geometry_type_from_type_id(id: i32) -> Result<GeometryType> {
    let typ = match id {
        type_id::POINT => GeometryType::Point,
        type_id::LINESTRING | type_id::LINEARRING => GeometryType::LineString,
        type_id::POLYGON => GeometryType::Polygon,
        type_id::MULTIPOINT => GeometryType::MultiPoint,
        type_id::MULTILINESTRING => GeometryType::MultiLineString,
        type_id::MULTIPOLYGON => GeometryType::MultiPolygon,
        type_id::GEOMETRYCOLLECTION => GeometryType::GeometryCollection,
        _ => {
            return Err(GeoArrowError::InvalidArgument(format!(
                "Unexpected geometry type id: {id}"
            )))
        }
    };
    Ok(typ)
}

/// The engine type id used to construct collections of a geometry type.
pub(crate) fn collection_type_id(geometry_type: GeometryType) -> Result<i32> {
    match geometry_type {
        GeometryType::MultiPoint => Ok(type_id::MULTIPOINT),
        GeometryType::MultiLineString => Ok(type_id::MULTILINESTRING),
        GeometryType::MultiPolygon => Ok(type_id::MULTIPOLYGON),
        GeometryType::GeometryCollection => Ok(type_id::GEOMETRYCOLLECTION),
        typ => Err(GeoArrowError::IncorrectGeometryType(
            format!("{typ} is not a collection type").into(),
        )),
    }
}

/// Map an engine coordinate dimension to the dimension written to GeoArrow.
///
/// Only 2 (XY) and 3 (XYZ) are accepted.
pub fn dimension_from_coordinate_dimension(dims: i32) -> Result<Dimension> {
    match dims {
        2 => Ok(Dimension::XY),
        3 => Ok(Dimension::XYZ),
        _ => Err(GeoArrowError::InvalidArgument(format!(
            "Unexpected coordinate dimension: {dims}"
        ))),
    }
}

/// The ISO WKB type code (`geometry_type + 1000 * dimension block`) of an engine geometry.
pub fn wkb_type_code<E: GeometryEngine + ?Sized>(engine: &E, geom: GeomHandle) -> Result<u32> {
    let typ = geometry_type_from_type_id(engine.type_id(geom).context("type_id")?)?;
    let dim = dimension_from_coordinate_dimension(
        engine
            .coordinate_dimension(geom)
            .context("coordinate_dimension")?,
    )?;
    Ok(u32::from(typ) + 1000 * dim.iso_wkb_block())
}

/// Create a Point, LineString or LinearRing (by engine type id) from interleaved values.
pub(crate) fn create_from_values<E: GeometryEngine + ?Sized>(
    engine: &E,
    id: i32,
    values: &[f64],
    dim: Dimension,
) -> Result<GeomHandle> {
    let n_coords = values.len() / dim.size();
    let seq = engine
        .coord_seq_from_buffer(values, n_coords, dim.has_z(), dim.has_m())
        .context("coord_seq_from_buffer")?;
    create_from_seq(engine, id, seq)
}

/// Create a Point, LineString or LinearRing (by engine type id) from a coordinate sequence.
pub(crate) fn create_from_seq<E: GeometryEngine + ?Sized>(
    engine: &E,
    id: i32,
    seq: E::CoordSeq,
) -> Result<GeomHandle> {
    match id {
        type_id::POINT => engine.create_point(seq).context("create_point"),
        type_id::LINESTRING => engine.create_line_string(seq).context("create_line_string"),
        type_id::LINEARRING => engine.create_linear_ring(seq).context("create_linear_ring"),
        _ => Err(GeoArrowError::InvalidArgument(format!(
            "Unexpected geometry type id: {id}"
        ))),
    }
}

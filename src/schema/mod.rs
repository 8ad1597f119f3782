//! Choose the GeoArrow type used to store a population of geometries.

use num_enum::{IntoPrimitive, TryFromPrimitive};

use crate::datatypes::{CoordType, Dimension, GeoDataType, GeometryType};
use crate::error::{GeoArrowError, Result};

pub use calculator::SchemaCalculator;

pub mod calculator;

/// The physical encoding of a geometry column.
///
/// The discriminants are stable; `0` is reserved for an unknown encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, TryFromPrimitive, IntoPrimitive)]
#[repr(i32)]
pub enum Encoding {
    /// Well-known text in a `Utf8` array.
    Wkt = 1,
    /// ISO well-known binary in a `Binary` array.
    Wkb = 2,
    /// Native GeoArrow with one buffer per ordinate.
    GeoArrow = 3,
    /// Native GeoArrow with interleaved ordinates.
    GeoArrowInterleaved = 4,
}

impl Encoding {
    /// Parse an encoding from its integer value.
    pub fn try_from_i32(value: i32) -> Result<Self> {
        Self::try_from(value)
            .map_err(|_| GeoArrowError::InvalidArgument(format!("Unknown encoding: {value}")))
    }
}

/// Split an ISO WKB type code into its geometry type and dimension.
pub(crate) fn decode_wkb_type(wkb_type: u32) -> Result<(GeometryType, Dimension)> {
    let geometry_type = GeometryType::try_from(wkb_type % 1000).map_err(|_| {
        GeoArrowError::InvalidArgument(format!("Invalid WKB type code: {wkb_type}"))
    })?;
    let dim = Dimension::try_from_iso_wkb_block(wkb_type / 1000)?;
    Ok((geometry_type, dim))
}

/// The native type with the given geometry type, coordinate layout and dimension.
pub(crate) fn native_type(
    geometry_type: GeometryType,
    coord_type: CoordType,
    dim: Dimension,
) -> Result<GeoDataType> {
    let data_type = match geometry_type {
        GeometryType::Point => GeoDataType::Point(coord_type, dim),
        GeometryType::LineString => GeoDataType::LineString(coord_type, dim),
        GeometryType::Polygon => GeoDataType::Polygon(coord_type, dim),
        GeometryType::MultiPoint => GeoDataType::MultiPoint(coord_type, dim),
        GeometryType::MultiLineString => GeoDataType::MultiLineString(coord_type, dim),
        GeometryType::MultiPolygon => GeoDataType::MultiPolygon(coord_type, dim),
        typ @ (GeometryType::Geometry | GeometryType::GeometryCollection) => {
            return Err(GeoArrowError::InvalidArgument(format!(
                "No native GeoArrow type for {typ}"
            )))
        }
    };
    Ok(data_type)
}

/// The GeoArrow type of an encoding applied to geometries of ISO WKB type `wkb_type`.
///
/// `wkb_type` is ignored for WKT and WKB.
///
/// ```
/// use geoarrow_bridge::datatypes::{CoordType, Dimension, GeoDataType};
/// use geoarrow_bridge::schema::{make_schema, Encoding};
///
/// let data_type = make_schema(Encoding::GeoArrowInterleaved, 1003).unwrap();
/// assert_eq!(data_type, GeoDataType::Polygon(CoordType::Interleaved, Dimension::XYZ));
/// ```
pub fn make_schema(encoding: Encoding, wkb_type: u32) -> Result<GeoDataType> {
    match encoding {
        Encoding::Wkt => Ok(GeoDataType::WKT),
        Encoding::Wkb => Ok(GeoDataType::WKB),
        Encoding::GeoArrow | Encoding::GeoArrowInterleaved => {
            let (geometry_type, dim) = decode_wkb_type(wkb_type)?;
            let coord_type = if encoding == Encoding::GeoArrow {
                CoordType::Separated
            } else {
                CoordType::Interleaved
            };
            native_type(geometry_type, coord_type, dim)
        }
    }
}

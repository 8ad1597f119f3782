//! Geometry type, dimension and coordinate layout descriptions, and their mapping to Arrow
//! [`DataType`]s and extension [`Field`]s.

use std::collections::{HashMap, HashSet};
use std::fmt::Display;
use std::sync::Arc;

use arrow_schema::{DataType, Field, Fields};
use num_enum::{IntoPrimitive, TryFromPrimitive};

use crate::array::metadata::ArrayMetadata;
use crate::error::{GeoArrowError, Result};

pub(crate) const EXTENSION_NAME_KEY: &str = "ARROW:extension:name";
pub(crate) const EXTENSION_METADATA_KEY: &str = "ARROW:extension:metadata";

/// The closed set of geometry kinds understood by GeoArrow.
///
/// The discriminants are the 2D ISO WKB type codes. `Geometry` stands for "unknown or mixed".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, TryFromPrimitive, IntoPrimitive)]
#[repr(u32)]
pub enum GeometryType {
    /// Unknown or mixed geometry type.
    Geometry = 0,
    /// Point.
    Point = 1,
    /// LineString (and LinearRing).
    LineString = 2,
    /// Polygon.
    Polygon = 3,
    /// MultiPoint.
    MultiPoint = 4,
    /// MultiLineString.
    MultiLineString = 5,
    /// MultiPolygon.
    MultiPolygon = 6,
    /// GeometryCollection.
    GeometryCollection = 7,
}

impl GeometryType {
    /// The upper-case WKT tag of this geometry type.
    pub fn wkt_tag(&self) -> &'static str {
        match self {
            GeometryType::Geometry => "GEOMETRY",
            GeometryType::Point => "POINT",
            GeometryType::LineString => "LINESTRING",
            GeometryType::Polygon => "POLYGON",
            GeometryType::MultiPoint => "MULTIPOINT",
            GeometryType::MultiLineString => "MULTILINESTRING",
            GeometryType::MultiPolygon => "MULTIPOLYGON",
            GeometryType::GeometryCollection => "GEOMETRYCOLLECTION",
        }
    }

    /// The single-part type of a multi type, or `None` for any other type.
    pub fn simple_type(&self) -> Option<GeometryType> {
        match self {
            GeometryType::MultiPoint => Some(GeometryType::Point),
            GeometryType::MultiLineString => Some(GeometryType::LineString),
            GeometryType::MultiPolygon => Some(GeometryType::Polygon),
            _ => None,
        }
    }

    /// The multi type of a single-part type, or `None` for any other type.
    pub fn multi_type(&self) -> Option<GeometryType> {
        match self {
            GeometryType::Point => Some(GeometryType::MultiPoint),
            GeometryType::LineString => Some(GeometryType::MultiLineString),
            GeometryType::Polygon => Some(GeometryType::MultiPolygon),
            _ => None,
        }
    }
}

impl Display for GeometryType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.wkt_tag())
    }
}

/// The dimension of the geometry array.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Dimension {
    /// Two-dimensional.
    XY,

    /// Three-dimensional.
    XYZ,

    /// XYM (2D with measure).
    XYM,

    /// XYZM (3D with measure).
    XYZM,
}

impl Dimension {
    /// Build a dimension from the presence of Z and M ordinates.
    pub fn from_flags(has_z: bool, has_m: bool) -> Self {
        match (has_z, has_m) {
            (false, false) => Dimension::XY,
            (true, false) => Dimension::XYZ,
            (false, true) => Dimension::XYM,
            (true, true) => Dimension::XYZM,
        }
    }

    /// Returns the number of dimensions.
    pub fn size(&self) -> usize {
        match self {
            Dimension::XY => 2,
            Dimension::XYZ => 3,
            Dimension::XYM => 3,
            Dimension::XYZM => 4,
        }
    }

    /// Whether coordinates of this dimension carry a Z ordinate.
    pub fn has_z(&self) -> bool {
        matches!(self, Dimension::XYZ | Dimension::XYZM)
    }

    /// Whether coordinates of this dimension carry an M ordinate.
    pub fn has_m(&self) -> bool {
        matches!(self, Dimension::XYM | Dimension::XYZM)
    }

    /// The thousands block of the ISO WKB type code (0 for XY, 1 for XYZ, 2 for XYM, 3 for XYZM).
    pub fn iso_wkb_block(&self) -> u32 {
        match self {
            Dimension::XY => 0,
            Dimension::XYZ => 1,
            Dimension::XYM => 2,
            Dimension::XYZM => 3,
        }
    }

    /// Inverse of [`Dimension::iso_wkb_block`].
    pub fn try_from_iso_wkb_block(block: u32) -> Result<Self> {
        match block {
            0 => Ok(Dimension::XY),
            1 => Ok(Dimension::XYZ),
            2 => Ok(Dimension::XYM),
            3 => Ok(Dimension::XYZM),
            _ => Err(GeoArrowError::InvalidArgument(format!(
                "Invalid dimension block in WKB type code: {block}"
            ))),
        }
    }

    /// The names of the ordinates of this dimension, in storage order.
    pub fn ordinate_names(&self) -> &'static [&'static str] {
        match self {
            Dimension::XY => &["x", "y"],
            Dimension::XYZ => &["x", "y", "z"],
            Dimension::XYM => &["x", "y", "m"],
            Dimension::XYZM => &["x", "y", "z", "m"],
        }
    }

    /// The name of the child field of an interleaved coordinate array.
    pub(crate) fn interleaved_field_name(&self) -> &'static str {
        match self {
            Dimension::XY => "xy",
            Dimension::XYZ => "xyz",
            Dimension::XYM => "xym",
            Dimension::XYZM => "xyzm",
        }
    }

    pub(crate) fn from_interleaved_field(field: &Field) -> Result<Self> {
        let dim = match field.name().as_str() {
            "xy" => Dimension::XY,
            "xyz" => Dimension::XYZ,
            "xym" => Dimension::XYM,
            "xyzm" => Dimension::XYZM,
            _ => {
                return Err(GeoArrowError::InvalidGeoArrow(format!(
                    "Invalid interleaved field name: {}",
                    field.name()
                )));
            }
        };
        Ok(dim)
    }

    pub(crate) fn from_separated_field(fields: &Fields) -> Result<Self> {
        let dim = if fields.len() == 2 {
            Self::XY
        } else if fields.len() == 3 {
            let field_names: HashSet<&str> =
                HashSet::from_iter(fields.iter().map(|f| f.name().as_str()));
            let xym_field_names = HashSet::<&str>::from_iter(["x", "y", "m"]);
            let xyz_field_names = HashSet::<&str>::from_iter(["x", "y", "z"]);

            if field_names.eq(&xym_field_names) {
                Self::XYM
            } else if field_names.eq(&xyz_field_names) {
                Self::XYZ
            } else {
                return Err(GeoArrowError::InvalidGeoArrow(format!(
                    "Invalid field names for separated coordinates with 3 dimensions: {field_names:?}",
                )));
            }
        } else if fields.len() == 4 {
            Self::XYZM
        } else {
            return Err(GeoArrowError::InvalidGeoArrow(format!(
                "Invalid fields for separated coordinates: {fields:?}",
            )));
        };
        Ok(dim)
    }
}

impl Display for Dimension {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Dimension::XY => write!(f, "XY"),
            Dimension::XYZ => write!(f, "XYZ"),
            Dimension::XYM => write!(f, "XYM"),
            Dimension::XYZM => write!(f, "XYZM"),
        }
    }
}

/// The permitted GeoArrow coordinate representations.
///
/// GeoArrow permits coordinate types to either be `Interleaved`, where the X and Y coordinates are
/// in a single buffer as XYXYXY or `Separated`, where the X and Y coordinates are in multiple
/// buffers as XXXX and YYYY.
#[derive(Default, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CoordType {
    /// Interleaved coordinates.
    #[default]
    Interleaved,

    /// Separated coordinates.
    Separated,
}

/// A description of a GeoArrow array: which extension type it is and how it is laid out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GeoDataType {
    /// `geoarrow.point`
    Point(CoordType, Dimension),
    /// `geoarrow.linestring`
    LineString(CoordType, Dimension),
    /// `geoarrow.polygon`
    Polygon(CoordType, Dimension),
    /// `geoarrow.multipoint`
    MultiPoint(CoordType, Dimension),
    /// `geoarrow.multilinestring`
    MultiLineString(CoordType, Dimension),
    /// `geoarrow.multipolygon`
    MultiPolygon(CoordType, Dimension),
    /// `geoarrow.wkb` with `i32` offsets
    WKB,
    /// `geoarrow.wkb` with `i64` offsets
    LargeWKB,
    /// `geoarrow.wkt` with `i32` offsets
    WKT,
    /// `geoarrow.wkt` with `i64` offsets
    LargeWKT,
}

impl GeoDataType {
    /// Construct the native (coordinate-based) type for a geometry type.
    ///
    /// Errors for [`GeometryType::Geometry`] and [`GeometryType::GeometryCollection`], which have no
    /// native representation here.
    pub fn native(
        geometry_type: GeometryType,
        dim: Dimension,
        coord_type: CoordType,
    ) -> Result<Self> {
        let data_type = match geometry_type {
            GeometryType::Point => GeoDataType::Point(coord_type, dim),
            GeometryType::LineString => GeoDataType::LineString(coord_type, dim),
            GeometryType::Polygon => GeoDataType::Polygon(coord_type, dim),
            GeometryType::MultiPoint => GeoDataType::MultiPoint(coord_type, dim),
            GeometryType::MultiLineString => GeoDataType::MultiLineString(coord_type, dim),
            GeometryType::MultiPolygon => GeoDataType::MultiPolygon(coord_type, dim),
            GeometryType::Geometry | GeometryType::GeometryCollection => {
                return Err(GeoArrowError::InvalidArgument(format!(
                    "No native GeoArrow type for geometry type {geometry_type}"
                )))
            }
        };
        Ok(data_type)
    }

    /// The geometry type stored by this type. Serialized types report [`GeometryType::Geometry`].
    pub fn geometry_type(&self) -> GeometryType {
        match self {
            GeoDataType::Point(_, _) => GeometryType::Point,
            GeoDataType::LineString(_, _) => GeometryType::LineString,
            GeoDataType::Polygon(_, _) => GeometryType::Polygon,
            GeoDataType::MultiPoint(_, _) => GeometryType::MultiPoint,
            GeoDataType::MultiLineString(_, _) => GeometryType::MultiLineString,
            GeoDataType::MultiPolygon(_, _) => GeometryType::MultiPolygon,
            GeoDataType::WKB | GeoDataType::LargeWKB | GeoDataType::WKT | GeoDataType::LargeWKT => {
                GeometryType::Geometry
            }
        }
    }

    /// The coordinate dimension of a native type.
    pub fn dimension(&self) -> Option<Dimension> {
        self.native_parts().map(|(_, dim)| dim)
    }

    /// The coordinate layout of a native type.
    pub fn coord_type(&self) -> Option<CoordType> {
        self.native_parts().map(|(coord_type, _)| coord_type)
    }

    fn native_parts(&self) -> Option<(CoordType, Dimension)> {
        match self {
            GeoDataType::Point(ct, dim)
            | GeoDataType::LineString(ct, dim)
            | GeoDataType::Polygon(ct, dim)
            | GeoDataType::MultiPoint(ct, dim)
            | GeoDataType::MultiLineString(ct, dim)
            | GeoDataType::MultiPolygon(ct, dim) => Some((*ct, *dim)),
            _ => None,
        }
    }

    /// The `ARROW:extension:name` of this type.
    pub fn extension_name(&self) -> &'static str {
        match self {
            GeoDataType::Point(_, _) => "geoarrow.point",
            GeoDataType::LineString(_, _) => "geoarrow.linestring",
            GeoDataType::Polygon(_, _) => "geoarrow.polygon",
            GeoDataType::MultiPoint(_, _) => "geoarrow.multipoint",
            GeoDataType::MultiLineString(_, _) => "geoarrow.multilinestring",
            GeoDataType::MultiPolygon(_, _) => "geoarrow.multipolygon",
            GeoDataType::WKB | GeoDataType::LargeWKB => "geoarrow.wkb",
            GeoDataType::WKT | GeoDataType::LargeWKT => "geoarrow.wkt",
        }
    }

    /// The Arrow storage type of this GeoArrow type.
    pub fn to_data_type(&self) -> DataType {
        match self {
            GeoDataType::Point(ct, dim) => coord_type_to_data_type(*ct, *dim),
            GeoDataType::LineString(ct, dim) | GeoDataType::MultiPoint(ct, dim) => {
                let name = if matches!(self, GeoDataType::LineString(_, _)) {
                    "vertices"
                } else {
                    "points"
                };
                list(name, coord_type_to_data_type(*ct, *dim))
            }
            GeoDataType::Polygon(ct, dim) => list(
                "rings",
                list("vertices", coord_type_to_data_type(*ct, *dim)),
            ),
            GeoDataType::MultiLineString(ct, dim) => list(
                "linestrings",
                list("vertices", coord_type_to_data_type(*ct, *dim)),
            ),
            GeoDataType::MultiPolygon(ct, dim) => list(
                "polygons",
                list(
                    "rings",
                    list("vertices", coord_type_to_data_type(*ct, *dim)),
                ),
            ),
            GeoDataType::WKB => DataType::Binary,
            GeoDataType::LargeWKB => DataType::LargeBinary,
            GeoDataType::WKT => DataType::Utf8,
            GeoDataType::LargeWKT => DataType::LargeUtf8,
        }
    }

    /// Convert this type to a nullable [`Field`] carrying the GeoArrow extension metadata.
    pub fn to_field<N: Into<String>>(&self, name: N, nullable: bool) -> Field {
        let mut metadata = HashMap::with_capacity(2);
        metadata.insert(
            EXTENSION_NAME_KEY.to_string(),
            self.extension_name().to_string(),
        );
        metadata.insert(EXTENSION_METADATA_KEY.to_string(), "{}".to_string());
        Field::new(name, self.to_data_type(), nullable).with_metadata(metadata)
    }

    /// Like [`GeoDataType::to_field`], also serializing `metadata` (CRS, edges).
    pub fn to_field_with_metadata<N: Into<String>>(
        &self,
        name: N,
        nullable: bool,
        metadata: &ArrayMetadata,
    ) -> Result<Field> {
        let field = self.to_field(name, nullable);
        let mut field_metadata = field.metadata().clone();
        field_metadata.insert(
            EXTENSION_METADATA_KEY.to_string(),
            serde_json::to_string(metadata)?,
        );
        Ok(field.with_metadata(field_metadata))
    }
}

impl TryFrom<&Field> for GeoDataType {
    type Error = GeoArrowError;

    fn try_from(field: &Field) -> Result<Self> {
        let data_type = field.data_type();
        let Some(extension_name) = field.metadata().get(EXTENSION_NAME_KEY) else {
            // Without extension metadata, only serialized encodings are unambiguous.
            return match data_type {
                DataType::Binary => Ok(GeoDataType::WKB),
                DataType::LargeBinary => Ok(GeoDataType::LargeWKB),
                DataType::Utf8 => Ok(GeoDataType::WKT),
                DataType::LargeUtf8 => Ok(GeoDataType::LargeWKT),
                dt => Err(GeoArrowError::InvalidGeoArrow(format!(
                    "Field '{}' has no GeoArrow extension name and storage type {dt}",
                    field.name()
                ))),
            };
        };

        let data_type = match extension_name.as_str() {
            "geoarrow.point" => {
                let (ct, dim) = parse_coords(data_type)?;
                GeoDataType::Point(ct, dim)
            }
            "geoarrow.linestring" => {
                let (ct, dim) = parse_coords(list_child(data_type)?)?;
                GeoDataType::LineString(ct, dim)
            }
            "geoarrow.multipoint" => {
                let (ct, dim) = parse_coords(list_child(data_type)?)?;
                GeoDataType::MultiPoint(ct, dim)
            }
            "geoarrow.polygon" => {
                let (ct, dim) = parse_coords(list_child(list_child(data_type)?)?)?;
                GeoDataType::Polygon(ct, dim)
            }
            "geoarrow.multilinestring" => {
                let (ct, dim) = parse_coords(list_child(list_child(data_type)?)?)?;
                GeoDataType::MultiLineString(ct, dim)
            }
            "geoarrow.multipolygon" => {
                let (ct, dim) =
                    parse_coords(list_child(list_child(list_child(data_type)?)?)?)?;
                GeoDataType::MultiPolygon(ct, dim)
            }
            "geoarrow.wkb" => match data_type {
                DataType::Binary => GeoDataType::WKB,
                DataType::LargeBinary => GeoDataType::LargeWKB,
                dt => {
                    return Err(GeoArrowError::InvalidGeoArrow(format!(
                        "Unexpected storage type for geoarrow.wkb: {dt}"
                    )))
                }
            },
            "geoarrow.wkt" => match data_type {
                DataType::Utf8 => GeoDataType::WKT,
                DataType::LargeUtf8 => GeoDataType::LargeWKT,
                dt => {
                    return Err(GeoArrowError::InvalidGeoArrow(format!(
                        "Unexpected storage type for geoarrow.wkt: {dt}"
                    )))
                }
            },
            name => {
                return Err(GeoArrowError::InvalidArgument(format!(
                    "Unsupported extension type: {name}"
                )))
            }
        };
        Ok(data_type)
    }
}

fn list(name: &str, child: DataType) -> DataType {
    DataType::List(Arc::new(Field::new(name, child, false)))
}

fn list_child(data_type: &DataType) -> Result<&DataType> {
    match data_type {
        DataType::List(field) => Ok(field.data_type()),
        dt => Err(GeoArrowError::InvalidGeoArrow(format!(
            "Expected a list storage type, got {dt}"
        ))),
    }
}

pub(crate) fn coord_type_to_data_type(coord_type: CoordType, dim: Dimension) -> DataType {
    match coord_type {
        CoordType::Interleaved => {
            let values_field = Field::new(dim.interleaved_field_name(), DataType::Float64, false);
            DataType::FixedSizeList(Arc::new(values_field), dim.size() as i32)
        }
        CoordType::Separated => {
            let fields: Vec<Field> = dim
                .ordinate_names()
                .iter()
                .map(|name| Field::new(*name, DataType::Float64, false))
                .collect();
            DataType::Struct(fields.into())
        }
    }
}

fn parse_coords(data_type: &DataType) -> Result<(CoordType, Dimension)> {
    match data_type {
        DataType::FixedSizeList(inner_field, list_size) => {
            let dim = Dimension::from_interleaved_field(inner_field)?;
            if *list_size as usize != dim.size() {
                return Err(GeoArrowError::InvalidGeoArrow(format!(
                    "Interleaved field '{}' has list size {list_size}",
                    inner_field.name()
                )));
            }
            Ok((CoordType::Interleaved, dim))
        }
        DataType::Struct(struct_fields) => Ok((
            CoordType::Separated,
            Dimension::from_separated_field(struct_fields)?,
        )),
        dt => Err(GeoArrowError::InvalidGeoArrow(format!(
            "Unexpected coordinate data type {dt}"
        ))),
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn test_fields(dims: &[&str]) -> Fields {
        dims.iter()
            .map(|dim| Field::new(*dim, DataType::Null, false))
            .collect()
    }

    #[test]
    fn from_interleaved() {
        assert_eq!(
            Dimension::from_interleaved_field(&Field::new("xyz", DataType::Null, false)).unwrap(),
            Dimension::XYZ
        );
        assert!(
            Dimension::from_interleaved_field(&Field::new("banana", DataType::Null, false))
                .is_err()
        );
    }

    #[test]
    fn from_separated() {
        assert_eq!(
            Dimension::from_separated_field(&test_fields(&["x", "y", "m"])).unwrap(),
            Dimension::XYM
        );
        assert_eq!(
            Dimension::from_separated_field(&test_fields(&["x", "y", "z", "m"])).unwrap(),
            Dimension::XYZM
        );
        assert!(Dimension::from_separated_field(&test_fields(&["x", "y", "a"])).is_err());
        assert!(Dimension::from_separated_field(&test_fields(&["x"])).is_err());
    }

    #[test]
    fn field_round_trip() {
        let types = [
            GeoDataType::Point(CoordType::Separated, Dimension::XY),
            GeoDataType::Point(CoordType::Interleaved, Dimension::XYZM),
            GeoDataType::LineString(CoordType::Interleaved, Dimension::XYZ),
            GeoDataType::Polygon(CoordType::Separated, Dimension::XYM),
            GeoDataType::MultiPoint(CoordType::Separated, Dimension::XY),
            GeoDataType::MultiLineString(CoordType::Interleaved, Dimension::XY),
            GeoDataType::MultiPolygon(CoordType::Separated, Dimension::XYZ),
            GeoDataType::WKB,
            GeoDataType::LargeWKB,
            GeoDataType::WKT,
            GeoDataType::LargeWKT,
        ];
        for typ in types {
            let field = typ.to_field("geometry", true);
            assert_eq!(
                field.metadata().get(EXTENSION_NAME_KEY).unwrap(),
                typ.extension_name()
            );
            assert_eq!(GeoDataType::try_from(&field).unwrap(), typ);
        }
    }

    #[test]
    fn polygon_storage_type() {
        let typ = GeoDataType::Polygon(CoordType::Interleaved, Dimension::XY);
        let DataType::List(rings) = typ.to_data_type() else {
            panic!("expected list")
        };
        assert_eq!(rings.name(), "rings");
        let DataType::List(vertices) = rings.data_type() else {
            panic!("expected list")
        };
        assert_eq!(vertices.name(), "vertices");
        assert_eq!(
            vertices.data_type(),
            &DataType::FixedSizeList(Field::new("xy", DataType::Float64, false).into(), 2)
        );
    }

    #[test]
    fn plain_storage_without_extension() {
        let field = Field::new("geom", DataType::Binary, true);
        assert_eq!(GeoDataType::try_from(&field).unwrap(), GeoDataType::WKB);

        let field = Field::new("geom", DataType::Float64, true);
        assert!(GeoDataType::try_from(&field).is_err());
    }

    #[test]
    fn native_rejects_collections() {
        assert!(GeoDataType::native(
            GeometryType::GeometryCollection,
            Dimension::XY,
            CoordType::Separated
        )
        .is_err());
        assert_eq!(
            GeoDataType::native(GeometryType::Polygon, Dimension::XYZ, CoordType::Separated)
                .unwrap(),
            GeoDataType::Polygon(CoordType::Separated, Dimension::XYZ)
        );
    }
}

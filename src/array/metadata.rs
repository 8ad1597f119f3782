//! Extension metadata attached to GeoArrow fields.
//!
//! Serialized as JSON under `ARROW:extension:metadata` (see <https://geoarrow.org/extension-types>).

use arrow_schema::Field;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::datatypes::EXTENSION_METADATA_KEY;
use crate::error::GeoArrowError;

/// Edge interpolation. Edges are planar when absent.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum Edges {
    /// Edges follow great circles.
    #[serde(rename = "spherical")]
    Spherical,
}

/// The CRS and edge interpretation of a GeoArrow array.
///
/// Empty metadata serializes to `{}`.
#[derive(Default, Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ArrayMetadata {
    /// A PROJJSON object (or any JSON value) describing the coordinate reference system.
    /// Axis order is always longitude/latitude or easting/northing.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub crs: Option<Value>,

    /// Spherical edges, if set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub edges: Option<Edges>,
}

impl ArrayMetadata {
    /// Whether any key would be written.
    pub fn should_serialize(&self) -> bool {
        self.crs.is_some() || self.edges.is_some()
    }
}

impl TryFrom<&Field> for ArrayMetadata {
    type Error = GeoArrowError;

    fn try_from(value: &Field) -> Result<Self, Self::Error> {
        match value.metadata().get(EXTENSION_METADATA_KEY) {
            Some(ext_meta) if !ext_meta.is_empty() => Ok(serde_json::from_str(ext_meta)?),
            _ => Ok(Default::default()),
        }
    }
}

#[cfg(test)]
mod test {
    use serde_json::json;

    use super::*;
    use crate::datatypes::{CoordType, Dimension, GeoDataType};

    #[test]
    fn empty_metadata_is_empty_object() {
        assert_eq!(
            serde_json::to_string(&ArrayMetadata::default()).unwrap(),
            "{}"
        );
        assert!(!ArrayMetadata::default().should_serialize());
    }

    #[test]
    fn field_round_trip() {
        let metadata = ArrayMetadata {
            crs: Some(json!("OGC:CRS84")),
            edges: Some(Edges::Spherical),
        };
        let field = GeoDataType::Point(CoordType::Separated, Dimension::XY)
            .to_field_with_metadata("geometry", true, &metadata)
            .unwrap();
        assert_eq!(
            field.metadata().get(EXTENSION_METADATA_KEY).unwrap(),
            r#"{"crs":"OGC:CRS84","edges":"spherical"}"#
        );
        assert_eq!(ArrayMetadata::try_from(&field).unwrap(), metadata);
    }

    #[test]
    fn invalid_json() {
        let field = GeoDataType::WKB.to_field("geometry", true);
        let mut meta = field.metadata().clone();
        meta.insert(EXTENSION_METADATA_KEY.to_string(), "{".to_string());
        let field = field.with_metadata(meta);
        assert!(ArrayMetadata::try_from(&field).is_err());
    }
}

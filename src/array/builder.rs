//! Visitor-driven builder of native (coordinate-based) GeoArrow arrays.

use std::sync::Arc;

use arrow_array::{ArrayRef, ListArray};
use arrow_buffer::NullBufferBuilder;
use arrow_schema::Field;

use crate::array::coord_builder::CoordBufferBuilder;
use crate::array::offset_builder::OffsetsBuilder;
use crate::coord::CoordView;
use crate::datatypes::{Dimension, GeoDataType, GeometryType};
use crate::error::{GeoArrowError, Result};
use crate::visitor::GeoArrowVisitor;

/// Buffer lengths after the last completed feature.
#[derive(Debug, Default, Clone, Copy)]
struct Checkpoint {
    n_coords: usize,
    n_offsets: [usize; 3],
}

/// Builds a `geoarrow.point`, `linestring`, `polygon`, `multipoint`, `multilinestring` or
/// `multipolygon` array from visitor events.
///
/// Single-part geometries appended to a multi array are promoted to one-part multi geometries
/// (or zero-part ones when empty). Coordinates are converted to the array dimension; missing
/// ordinates are filled with NaN. Null and empty points are stored as NaN coordinates.
#[derive(Debug)]
pub struct NativeBuilder {
    data_type: GeoDataType,
    geometry_type: GeometryType,
    dim: Dimension,

    coords: CoordBufferBuilder,

    /// One offsets buffer per nesting level, outermost first.
    offsets: Vec<OffsetsBuilder<i32>>,

    /// Validity is only defined at the geometry level
    validity: NullBufferBuilder,

    checkpoint: Checkpoint,

    // Per-feature state
    depth: usize,
    counts: [usize; 3],
    geom_depth: usize,
    has_geometry: bool,
    promoted: bool,
    point_open: bool,
    point_coords: usize,
    feature_coords: usize,
    feature_closed: bool,
    feat_is_null: bool,
}

/// The names of the list child fields, outermost first.
fn list_field_names(geometry_type: GeometryType) -> &'static [&'static str] {
    match geometry_type {
        GeometryType::LineString => &["vertices"],
        GeometryType::Polygon => &["rings", "vertices"],
        GeometryType::MultiPoint => &["points"],
        GeometryType::MultiLineString => &["linestrings", "vertices"],
        GeometryType::MultiPolygon => &["polygons", "rings", "vertices"],
        _ => &[],
    }
}

impl NativeBuilder {
    /// Creates a new empty builder for a native GeoArrow type.
    pub fn try_new(data_type: GeoDataType) -> Result<Self> {
        let (Some(coord_type), Some(dim)) = (data_type.coord_type(), data_type.dimension()) else {
            return Err(GeoArrowError::IncorrectGeometryType(
                format!("{data_type:?} is not a native GeoArrow type").into(),
            ));
        };
        let geometry_type = data_type.geometry_type();
        let n_levels = list_field_names(geometry_type).len();
        Ok(Self {
            data_type,
            geometry_type,
            dim,
            coords: CoordBufferBuilder::new(coord_type, dim),
            offsets: (0..n_levels).map(|_| OffsetsBuilder::new()).collect(),
            validity: NullBufferBuilder::new(0),
            checkpoint: Checkpoint::default(),
            depth: 0,
            counts: [0; 3],
            geom_depth: 0,
            has_geometry: false,
            promoted: false,
            point_open: false,
            point_coords: 0,
            feature_coords: 0,
            feature_closed: false,
            feat_is_null: false,
        })
    }

    /// The type of the array being built.
    pub fn data_type(&self) -> &GeoDataType {
        &self.data_type
    }

    /// The number of features appended so far.
    pub fn len(&self) -> usize {
        self.validity.len()
    }

    /// Whether no features were appended.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn n_levels(&self) -> usize {
        self.offsets.len()
    }

    fn open_level(&mut self) -> Result<()> {
        let d = self.depth;
        if d >= self.n_levels() {
            return Err(GeoArrowError::IncorrectGeometryType(
                format!("Geometry nested too deeply for a {} array", self.geometry_type).into(),
            ));
        }
        if d > 0 {
            self.counts[d - 1] += 1;
        }
        self.counts[d] = 0;
        self.depth += 1;
        Ok(())
    }

    fn close_level(&mut self) -> Result<()> {
        if self.depth == 0 {
            return Err(GeoArrowError::InvalidArgument(
                "Unbalanced geometry end in native builder".to_string(),
            ));
        }
        self.depth -= 1;
        let d = self.depth;
        self.offsets[d].try_push_usize(self.counts[d])?;
        if d == 0 {
            self.feature_closed = true;
        }
        Ok(())
    }

    fn unexpected(&self, geometry_type: GeometryType) -> GeoArrowError {
        GeoArrowError::IncorrectGeometryType(
            format!(
                "Can't append {geometry_type} to a {} array",
                self.geometry_type
            )
            .into(),
        )
    }

    fn rollback(&mut self) {
        self.coords.truncate(self.checkpoint.n_coords);
        for (offsets, len) in self.offsets.iter_mut().zip(self.checkpoint.n_offsets) {
            offsets.truncate(len);
        }
    }

    fn commit(&mut self) {
        self.checkpoint.n_coords = self.coords.len();
        for (len, offsets) in self.checkpoint.n_offsets.iter_mut().zip(self.offsets.iter()) {
            *len = offsets.len_proxy();
        }
    }

    /// Consume the accumulated features as an Arrow array, resetting the builder.
    pub fn finish(&mut self) -> Result<ArrayRef> {
        self.rollback();
        let validity = self.validity.finish();
        let (coord_nulls, mut list_nulls) = if self.n_levels() == 0 {
            (validity, None)
        } else {
            (None, validity)
        };

        let mut array = self.coords.finish(coord_nulls)?;
        let names = list_field_names(self.geometry_type);
        for i in (0..self.n_levels()).rev() {
            let nulls = if i == 0 { list_nulls.take() } else { None };
            let field = Field::new(names[i], array.data_type().clone(), false);
            array = Arc::new(ListArray::try_new(
                Arc::new(field),
                self.offsets[i].finish(),
                array,
                nulls,
            )?);
        }

        self.checkpoint = Checkpoint::default();
        Ok(array)
    }
}

impl GeoArrowVisitor for NativeBuilder {
    fn feat_start(&mut self) -> Result<()> {
        self.rollback();
        self.depth = 0;
        self.counts = [0; 3];
        self.geom_depth = 0;
        self.has_geometry = false;
        self.promoted = false;
        self.point_open = false;
        self.point_coords = 0;
        self.feature_coords = 0;
        self.feature_closed = false;
        self.feat_is_null = false;
        Ok(())
    }

    fn null_feat(&mut self) -> Result<()> {
        self.feat_is_null = true;
        Ok(())
    }

    fn geom_start(&mut self, geometry_type: GeometryType, _dim: Dimension) -> Result<()> {
        let target = self.geometry_type;
        if self.geom_depth == 0 {
            if self.has_geometry {
                return Err(GeoArrowError::InvalidArgument(
                    "A feature holds a single geometry".to_string(),
                ));
            }
            if geometry_type == target {
                self.promoted = false;
            } else if target.simple_type() == Some(geometry_type) {
                self.promoted = true;
            } else {
                return Err(self.unexpected(geometry_type));
            }
            self.has_geometry = true;
        } else if self.promoted
            || self.point_open
            || self.geom_depth != 1
            || target.simple_type() != Some(geometry_type)
        {
            return Err(self.unexpected(geometry_type));
        }
        self.geom_depth += 1;

        if geometry_type == GeometryType::Point {
            self.point_open = true;
            self.point_coords = 0;
            if self.promoted {
                self.open_level()?;
            }
            return Ok(());
        }

        if self.promoted {
            self.open_level()?;
        }
        self.open_level()
    }

    fn ring_start(&mut self) -> Result<()> {
        let is_polygon_level = matches!(
            self.geometry_type,
            GeometryType::Polygon | GeometryType::MultiPolygon
        ) && self.depth + 1 == self.n_levels();
        if !is_polygon_level {
            return Err(GeoArrowError::InvalidArgument(
                "Ring outside of a polygon".to_string(),
            ));
        }
        self.open_level()
    }

    fn coords(&mut self, coords: &CoordView) -> Result<()> {
        let n = coords.n_coords();
        if self.point_open {
            if self.point_coords + n > 1 {
                return Err(GeoArrowError::InvalidArgument(
                    "A point can hold at most one coordinate".to_string(),
                ));
            }
            self.point_coords += n;
        }
        if self.depth != self.n_levels() || (self.n_levels() == 0 && !self.point_open) {
            return Err(GeoArrowError::InvalidArgument(
                "Unexpected coordinates".to_string(),
            ));
        }

        if let Some(last) = self.n_levels().checked_sub(1) {
            self.counts[last] += n;
        }
        self.feature_coords += n;
        for coord in coords.coords_as(self.dim) {
            self.coords.push_coord(&coord);
        }
        Ok(())
    }

    fn ring_end(&mut self) -> Result<()> {
        self.close_level()
    }

    fn geom_end(&mut self) -> Result<()> {
        if self.geom_depth == 0 {
            return Err(GeoArrowError::InvalidArgument(
                "Unbalanced geometry end in native builder".to_string(),
            ));
        }
        self.geom_depth -= 1;

        if self.point_open {
            self.point_open = false;
            if self.promoted && self.geom_depth == 0 {
                self.close_level()?;
            }
            return Ok(());
        }

        if self.promoted && self.geom_depth == 0 {
            // An empty single-part geometry becomes a multi geometry without parts
            if self.counts[1] == 0 {
                self.depth -= 1;
                self.counts[0] -= 1;
            } else {
                self.close_level()?;
            }
        }
        self.close_level()
    }

    fn feat_end(&mut self) -> Result<()> {
        if self.feat_is_null {
            if self.n_levels() == 0 {
                self.coords.push_coord(&[f64::NAN; 4]);
            } else {
                self.offsets[0].extend_constant(1);
            }
            self.validity.append_null();
        } else {
            if self.geom_depth != 0 || self.depth != 0 {
                return Err(GeoArrowError::InvalidArgument(
                    "Feature ended inside an open geometry".to_string(),
                ));
            }
            if self.n_levels() == 0 {
                if self.feature_coords == 0 {
                    self.coords.push_coord(&[f64::NAN; 4]);
                }
            } else if !self.feature_closed {
                self.offsets[0].try_push_usize(0)?;
            }
            self.validity.append_non_null();
        }
        self.commit();
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use arrow_array::cast::AsArray;
    use arrow_array::types::Float64Type;
    use arrow_array::Array;

    use super::*;
    use crate::datatypes::CoordType;

    fn xy(values: &[f64]) -> CoordView<'_> {
        CoordView::interleaved(values, Dimension::XY)
    }

    fn point(b: &mut NativeBuilder, values: &[f64]) -> Result<()> {
        b.geom_start(GeometryType::Point, Dimension::XY)?;
        if !values.is_empty() {
            b.coords(&xy(values))?;
        }
        b.geom_end()
    }

    #[test]
    fn points_with_nulls_and_empties() {
        let mut builder =
            NativeBuilder::try_new(GeoDataType::Point(CoordType::Separated, Dimension::XY))
                .unwrap();
        builder.feat_start().unwrap();
        point(&mut builder, &[0., 1.]).unwrap();
        builder.feat_end().unwrap();

        builder.feat_start().unwrap();
        builder.null_feat().unwrap();
        builder.feat_end().unwrap();

        builder.feat_start().unwrap();
        point(&mut builder, &[]).unwrap();
        builder.feat_end().unwrap();

        let array = builder.finish().unwrap();
        assert_eq!(
            array.data_type(),
            &GeoDataType::Point(CoordType::Separated, Dimension::XY).to_data_type()
        );
        assert_eq!(array.len(), 3);
        assert!(array.is_valid(0));
        assert!(array.is_null(1));
        assert!(array.is_valid(2));

        let x = array.as_struct().column(0).as_primitive::<Float64Type>();
        assert_eq!(x.value(0), 0.);
        assert!(x.value(1).is_nan());
        assert!(x.value(2).is_nan());
    }

    #[test]
    fn polygon_offsets() {
        let data_type = GeoDataType::Polygon(CoordType::Interleaved, Dimension::XY);
        let mut builder = NativeBuilder::try_new(data_type).unwrap();

        builder.feat_start().unwrap();
        builder
            .geom_start(GeometryType::Polygon, Dimension::XY)
            .unwrap();
        for ring in [
            [0., 0., 10., 0., 10., 10., 0., 0.],
            [1., 1., 2., 1., 2., 2., 1., 1.],
        ] {
            builder.ring_start().unwrap();
            builder.coords(&xy(&ring)).unwrap();
            builder.ring_end().unwrap();
        }
        builder.geom_end().unwrap();
        builder.feat_end().unwrap();

        builder.feat_start().unwrap();
        builder
            .geom_start(GeometryType::Polygon, Dimension::XY)
            .unwrap();
        builder.geom_end().unwrap();
        builder.feat_end().unwrap();

        builder.feat_start().unwrap();
        builder.null_feat().unwrap();
        builder.feat_end().unwrap();

        let array = builder.finish().unwrap();
        assert_eq!(array.data_type(), &data_type.to_data_type());
        let polygons = array.as_list::<i32>();
        assert_eq!(polygons.value_offsets(), &[0, 2, 2, 2]);
        assert!(polygons.is_null(2));
        let rings = polygons.values().as_list::<i32>();
        assert_eq!(rings.value_offsets(), &[0, 4, 8]);
    }

    #[test]
    fn promotes_simple_geometries() {
        let data_type = GeoDataType::MultiPolygon(CoordType::Separated, Dimension::XY);
        let mut builder = NativeBuilder::try_new(data_type).unwrap();

        // Polygon into a multipolygon array
        builder.feat_start().unwrap();
        builder
            .geom_start(GeometryType::Polygon, Dimension::XY)
            .unwrap();
        builder.ring_start().unwrap();
        builder
            .coords(&xy(&[0., 0., 1., 0., 1., 1., 0., 0.]))
            .unwrap();
        builder.ring_end().unwrap();
        builder.geom_end().unwrap();
        builder.feat_end().unwrap();

        // Empty polygon becomes an empty multipolygon
        builder.feat_start().unwrap();
        builder
            .geom_start(GeometryType::Polygon, Dimension::XY)
            .unwrap();
        builder.geom_end().unwrap();
        builder.feat_end().unwrap();

        let array = builder.finish().unwrap();
        assert_eq!(array.data_type(), &data_type.to_data_type());
        let multi = array.as_list::<i32>();
        assert_eq!(multi.value_offsets(), &[0, 1, 1]);
        let polygons = multi.values().as_list::<i32>();
        assert_eq!(polygons.value_offsets(), &[0, 1]);
    }

    #[test]
    fn promotes_points() {
        let data_type = GeoDataType::MultiPoint(CoordType::Interleaved, Dimension::XY);
        let mut builder = NativeBuilder::try_new(data_type).unwrap();

        builder.feat_start().unwrap();
        point(&mut builder, &[0., 1.]).unwrap();
        builder.feat_end().unwrap();

        builder.feat_start().unwrap();
        builder
            .geom_start(GeometryType::MultiPoint, Dimension::XY)
            .unwrap();
        point(&mut builder, &[2., 3.]).unwrap();
        point(&mut builder, &[4., 5.]).unwrap();
        builder.geom_end().unwrap();
        builder.feat_end().unwrap();

        let array = builder.finish().unwrap();
        let multi = array.as_list::<i32>();
        assert_eq!(multi.value_offsets(), &[0, 1, 3]);
    }

    #[test]
    fn pads_missing_ordinates() {
        let data_type = GeoDataType::LineString(CoordType::Separated, Dimension::XYZ);
        let mut builder = NativeBuilder::try_new(data_type).unwrap();
        builder.feat_start().unwrap();
        builder
            .geom_start(GeometryType::LineString, Dimension::XY)
            .unwrap();
        builder.coords(&xy(&[0., 1., 2., 3.])).unwrap();
        builder.geom_end().unwrap();
        builder.feat_end().unwrap();

        let array = builder.finish().unwrap();
        let coords = array.as_list::<i32>().values().as_struct().clone();
        let z = coords.column(2).as_primitive::<Float64Type>();
        assert!(z.value(0).is_nan());
        assert!(z.value(1).is_nan());
    }

    #[test]
    fn rejects_and_rolls_back() {
        let data_type = GeoDataType::LineString(CoordType::Separated, Dimension::XY);
        let mut builder = NativeBuilder::try_new(data_type).unwrap();

        builder.feat_start().unwrap();
        let err = builder
            .geom_start(GeometryType::Polygon, Dimension::XY)
            .unwrap_err();
        assert!(matches!(err, GeoArrowError::IncorrectGeometryType(_)));

        // Half-written feature is discarded by the next one
        builder.feat_start().unwrap();
        builder
            .geom_start(GeometryType::LineString, Dimension::XY)
            .unwrap();
        builder.coords(&xy(&[0., 1., 2., 3.])).unwrap();

        builder.feat_start().unwrap();
        builder
            .geom_start(GeometryType::LineString, Dimension::XY)
            .unwrap();
        builder.coords(&xy(&[5., 6., 7., 8.])).unwrap();
        builder.geom_end().unwrap();
        builder.feat_end().unwrap();

        let array = builder.finish().unwrap();
        assert_eq!(array.len(), 1);
        let coords = array.as_list::<i32>().values().as_struct().clone();
        assert_eq!(coords.len(), 2);
        assert_eq!(
            coords.column(0).as_primitive::<Float64Type>().value(0),
            5.
        );

        assert!(NativeBuilder::try_new(GeoDataType::WKB).is_err());
    }
}

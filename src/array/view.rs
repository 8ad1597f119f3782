//! Typed, borrowed views over GeoArrow arrays, validated against a [`GeoDataType`].

use arrow_array::cast::AsArray;
use arrow_array::types::Float64Type;
use arrow_array::{
    Array, BinaryArray, LargeBinaryArray, LargeStringArray, StringArray,
};
use arrow_buffer::NullBuffer;

use crate::coord::CoordView;
use crate::datatypes::{CoordType, Dimension, GeoDataType, GeometryType};
use crate::error::{GeoArrowError, Result};

/// A native array: nested offsets over one coordinate buffer.
#[derive(Debug, Clone)]
pub struct NativeView<'a> {
    geometry_type: GeometryType,
    coords: CoordView<'a>,
    /// Offsets of each list level, outermost first. Values index into the next level.
    offsets: Vec<&'a [i32]>,
    nulls: Option<&'a NullBuffer>,
    len: usize,
}

impl<'a> NativeView<'a> {
    /// The geometry type of every row.
    pub fn geometry_type(&self) -> GeometryType {
        self.geometry_type
    }

    /// All coordinates of the array.
    pub fn coords(&self) -> &CoordView<'a> {
        &self.coords
    }

    /// The number of offset levels.
    pub fn n_levels(&self) -> usize {
        self.offsets.len()
    }

    /// The `[start, end)` range of item `i` of offset level `level`.
    pub fn range(&self, level: usize, i: usize) -> Result<(usize, usize)> {
        let offsets = self.offsets.get(level).ok_or_else(|| {
            GeoArrowError::InvalidGeoArrow(format!("No offsets at level {level}"))
        })?;
        match (offsets.get(i), offsets.get(i + 1)) {
            (Some(start), Some(end)) if start <= end && *start >= 0 => {
                Ok((*start as usize, *end as usize))
            }
            _ => Err(GeoArrowError::InvalidGeoArrow(format!(
                "Invalid offsets for item {i} at level {level}"
            ))),
        }
    }
}

/// A GeoArrow array bound to its [`GeoDataType`].
#[derive(Debug, Clone)]
pub enum ArrayView<'a> {
    /// Point, LineString, Polygon and their multi types.
    Native(NativeView<'a>),
    /// `geoarrow.wkt` with `i32` offsets
    Wkt(&'a StringArray),
    /// `geoarrow.wkt` with `i64` offsets
    LargeWkt(&'a LargeStringArray),
    /// `geoarrow.wkb` with `i32` offsets
    Wkb(&'a BinaryArray),
    /// `geoarrow.wkb` with `i64` offsets
    LargeWkb(&'a LargeBinaryArray),
}

fn layout_error(data_type: &GeoDataType, array: &dyn Array) -> GeoArrowError {
    GeoArrowError::InvalidArgument(format!(
        "Expected storage of {data_type:?}, got {}",
        array.data_type()
    ))
}

fn float_values<'a>(array: &'a dyn Array, data_type: &GeoDataType) -> Result<&'a [f64]> {
    array
        .as_primitive_opt::<Float64Type>()
        .map(|values| values.values().as_ref())
        .ok_or_else(|| layout_error(data_type, array))
}

fn coord_view<'a>(
    array: &'a dyn Array,
    coord_type: CoordType,
    dim: Dimension,
    data_type: &GeoDataType,
) -> Result<CoordView<'a>> {
    match coord_type {
        CoordType::Interleaved => {
            let fsl = array
                .as_fixed_size_list_opt()
                .filter(|fsl| fsl.value_length() as usize == dim.size())
                .ok_or_else(|| layout_error(data_type, array))?;
            let values = float_values(fsl.values().as_ref(), data_type)?;
            let n_values = fsl.len() * dim.size();
            let values = values
                .get(..n_values)
                .ok_or_else(|| layout_error(data_type, array))?;
            Ok(CoordView::interleaved(values, dim))
        }
        CoordType::Separated => {
            let coords = array
                .as_struct_opt()
                .filter(|coords| coords.num_columns() == dim.size())
                .ok_or_else(|| layout_error(data_type, array))?;
            let ordinates = coords
                .columns()
                .iter()
                .map(|column| float_values(column.as_ref(), data_type))
                .collect::<Result<Vec<_>>>()?;
            CoordView::separated(&ordinates, dim)
        }
    }
}

impl<'a> ArrayView<'a> {
    /// Bind `array` to `data_type`, checking that its layout matches.
    pub fn try_new(array: &'a dyn Array, data_type: &GeoDataType) -> Result<Self> {
        let view = match data_type {
            GeoDataType::WKT => ArrayView::Wkt(
                array
                    .as_string_opt::<i32>()
                    .ok_or_else(|| layout_error(data_type, array))?,
            ),
            GeoDataType::LargeWKT => ArrayView::LargeWkt(
                array
                    .as_string_opt::<i64>()
                    .ok_or_else(|| layout_error(data_type, array))?,
            ),
            GeoDataType::WKB => ArrayView::Wkb(
                array
                    .as_binary_opt::<i32>()
                    .ok_or_else(|| layout_error(data_type, array))?,
            ),
            GeoDataType::LargeWKB => ArrayView::LargeWkb(
                array
                    .as_binary_opt::<i64>()
                    .ok_or_else(|| layout_error(data_type, array))?,
            ),
            _ => {
                let (Some(coord_type), Some(dim)) = (data_type.coord_type(), data_type.dimension())
                else {
                    return Err(layout_error(data_type, array));
                };
                let geometry_type = data_type.geometry_type();
                let n_levels = match geometry_type {
                    GeometryType::Point => 0,
                    GeometryType::LineString | GeometryType::MultiPoint => 1,
                    GeometryType::Polygon | GeometryType::MultiLineString => 2,
                    GeometryType::MultiPolygon => 3,
                    GeometryType::Geometry | GeometryType::GeometryCollection => {
                        return Err(layout_error(data_type, array))
                    }
                };

                let mut offsets = Vec::with_capacity(n_levels);
                let mut current: &'a dyn Array = array;
                for _ in 0..n_levels {
                    let list = current
                        .as_list_opt::<i32>()
                        .ok_or_else(|| layout_error(data_type, array))?;
                    offsets.push(list.value_offsets());
                    current = list.values().as_ref();
                }

                ArrayView::Native(NativeView {
                    geometry_type,
                    coords: coord_view(current, coord_type, dim, data_type)?,
                    offsets,
                    nulls: array.nulls(),
                    len: array.len(),
                })
            }
        };
        Ok(view)
    }

    /// The number of rows.
    pub fn len(&self) -> usize {
        match self {
            ArrayView::Native(native) => native.len,
            ArrayView::Wkt(array) => array.len(),
            ArrayView::LargeWkt(array) => array.len(),
            ArrayView::Wkb(array) => array.len(),
            ArrayView::LargeWkb(array) => array.len(),
        }
    }

    /// Whether the array has no rows.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether row `i` is null.
    pub fn is_null(&self, i: usize) -> bool {
        match self {
            ArrayView::Native(native) => native.nulls.is_some_and(|nulls| nulls.is_null(i)),
            ArrayView::Wkt(array) => array.is_null(i),
            ArrayView::LargeWkt(array) => array.is_null(i),
            ArrayView::Wkb(array) => array.is_null(i),
            ArrayView::LargeWkb(array) => array.is_null(i),
        }
    }
}

//! Streaming ISO WKB serializer.

use std::sync::Arc;

use arrow_array::{ArrayRef, GenericBinaryArray, OffsetSizeTrait};
use arrow_buffer::{Buffer, NullBufferBuilder};
use byteorder::{ByteOrder, LittleEndian, WriteBytesExt};

use crate::array::offset_builder::OffsetsBuilder;
use crate::coord::CoordView;
use crate::datatypes::{Dimension, GeometryType};
use crate::error::{GeoArrowError, Result};
use crate::io::wkb::common::{Endianness, WkbType};
use crate::visitor::GeoArrowVisitor;

#[derive(Debug, Clone, Copy)]
struct Level {
    /// Where the element count lives; `None` for a Point, which has no count.
    count_position: Option<usize>,
    count: u32,
    dim: Dimension,
}

/// Serializes visited geometries to a `geoarrow.wkb` array (`Binary` or `LargeBinary`).
///
/// Geometries are written little-endian with ISO type codes. Element counts are written as
/// placeholders and patched when the element ends. Empty points are written with NaN ordinates.
#[derive(Debug)]
pub struct WkbWriter<O: OffsetSizeTrait> {
    values: Vec<u8>,
    offsets: OffsetsBuilder<O>,
    validity: NullBufferBuilder,
    levels: Vec<Level>,
    feat_is_null: bool,
}

impl<O: OffsetSizeTrait> Default for WkbWriter<O> {
    fn default() -> Self {
        Self::new()
    }
}

impl<O: OffsetSizeTrait> WkbWriter<O> {
    /// Creates a new, empty writer.
    pub fn new() -> Self {
        Self {
            values: vec![],
            offsets: OffsetsBuilder::new(),
            validity: NullBufferBuilder::new(0),
            levels: vec![],
            feat_is_null: false,
        }
    }

    /// The number of features written so far.
    pub fn len(&self) -> usize {
        self.offsets.len_proxy()
    }

    /// Whether no features were written.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn count_child(&mut self) -> Result<()> {
        if let Some(parent) = self.levels.last_mut() {
            parent.count = parent.count.checked_add(1).ok_or(GeoArrowError::Overflow)?;
        }
        Ok(())
    }

    fn push_count_placeholder(&mut self, dim: Dimension) -> Result<()> {
        let count_position = self.values.len();
        self.values.write_u32::<LittleEndian>(0)?;
        self.levels.push(Level {
            count_position: Some(count_position),
            count: 0,
            dim,
        });
        Ok(())
    }

    fn pop_level(&mut self) -> Result<()> {
        let level = self.levels.pop().ok_or_else(|| {
            GeoArrowError::InvalidArgument("Unbalanced geometry end in WKB writer".to_string())
        })?;
        match level.count_position {
            Some(position) => {
                LittleEndian::write_u32(&mut self.values[position..position + 4], level.count)
            }
            None if level.count == 0 => {
                for _ in 0..level.dim.size() {
                    self.values.write_f64::<LittleEndian>(f64::NAN)?;
                }
            }
            None => {}
        }
        Ok(())
    }

    /// Consume the accumulated features as an Arrow array, resetting the writer.
    pub fn finish(&mut self) -> Result<ArrayRef> {
        self.values.truncate(self.offsets.last_usize());
        let values = std::mem::take(&mut self.values);
        let array = GenericBinaryArray::<O>::try_new(
            self.offsets.finish(),
            Buffer::from_vec(values),
            self.validity.finish(),
        )?;
        Ok(Arc::new(array))
    }
}

impl<O: OffsetSizeTrait> GeoArrowVisitor for WkbWriter<O> {
    fn feat_start(&mut self) -> Result<()> {
        self.values.truncate(self.offsets.last_usize());
        self.levels.clear();
        self.feat_is_null = false;
        Ok(())
    }

    fn null_feat(&mut self) -> Result<()> {
        self.feat_is_null = true;
        Ok(())
    }

    fn geom_start(&mut self, geometry_type: GeometryType, dim: Dimension) -> Result<()> {
        if geometry_type == GeometryType::Geometry {
            return Err(GeoArrowError::IncorrectGeometryType(
                "Cannot write WKB for an unknown geometry type".into(),
            ));
        }
        self.count_child()?;
        self.values.write_u8(Endianness::LittleEndian.into())?;
        self.values
            .write_u32::<LittleEndian>(WkbType::new(geometry_type, dim).iso_code())?;

        if geometry_type == GeometryType::Point {
            self.levels.push(Level {
                count_position: None,
                count: 0,
                dim,
            });
            Ok(())
        } else {
            self.push_count_placeholder(dim)
        }
    }

    fn ring_start(&mut self) -> Result<()> {
        self.count_child()?;
        let dim = self.levels.last().map_or(Dimension::XY, |level| level.dim);
        self.push_count_placeholder(dim)
    }

    fn coords(&mut self, coords: &CoordView) -> Result<()> {
        let level = self.levels.last_mut().ok_or_else(|| {
            GeoArrowError::InvalidArgument("Coordinates outside of a geometry".to_string())
        })?;
        let n_coords = u32::try_from(coords.n_coords()).map_err(|_| GeoArrowError::Overflow)?;
        if level.count_position.is_none() && level.count + n_coords > 1 {
            return Err(GeoArrowError::InvalidArgument(
                "A point can hold at most one coordinate".to_string(),
            ));
        }
        level.count = level
            .count
            .checked_add(n_coords)
            .ok_or(GeoArrowError::Overflow)?;

        let dim = level.dim;
        for coord in coords.coords_as(dim) {
            for value in &coord[..dim.size()] {
                self.values.write_f64::<LittleEndian>(*value)?;
            }
        }
        Ok(())
    }

    fn ring_end(&mut self) -> Result<()> {
        self.pop_level()
    }

    fn geom_end(&mut self) -> Result<()> {
        self.pop_level()
    }

    fn feat_end(&mut self) -> Result<()> {
        if self.feat_is_null {
            self.values.truncate(self.offsets.last_usize());
            self.offsets.extend_constant(1);
            self.validity.append_null();
        } else {
            let length = self.values.len() - self.offsets.last_usize();
            self.offsets.try_push_usize(length)?;
            self.validity.append_non_null();
        }
        Ok(())
    }
}

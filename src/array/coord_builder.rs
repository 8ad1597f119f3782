//! Mutable coordinate buffers backing the native array builder.

use std::sync::Arc;

use arrow_array::{ArrayRef, FixedSizeListArray, Float64Array, StructArray};
use arrow_buffer::NullBuffer;
use arrow_schema::{DataType, Field, Fields};

use crate::datatypes::{CoordType, Dimension};
use crate::error::Result;

/// Stores coordinates as `xyxyxy`.
#[derive(Debug, Clone)]
pub struct InterleavedCoordBufferBuilder {
    coords: Vec<f64>,
    dim: Dimension,
}

impl InterleavedCoordBufferBuilder {
    /// Create a new empty builder with the given dimension
    pub fn new(dim: Dimension) -> Self {
        Self {
            coords: vec![],
            dim,
        }
    }

    /// The number of coordinates in this builder
    pub fn len(&self) -> usize {
        self.coords.len() / self.dim.size()
    }

    /// Whether this builder is empty
    pub fn is_empty(&self) -> bool {
        self.coords.is_empty()
    }

    /// Push one coordinate; `coord` holds at least `dim.size()` values.
    pub fn push_coord(&mut self, coord: &[f64]) {
        self.coords.extend_from_slice(&coord[..self.dim.size()]);
    }

    /// Keep only the first `len` coordinates.
    pub fn truncate(&mut self, len: usize) {
        self.coords.truncate(len * self.dim.size());
    }

    fn finish(&mut self, nulls: Option<NullBuffer>) -> Result<ArrayRef> {
        let values = Float64Array::from(std::mem::take(&mut self.coords));
        let values_field = Field::new(self.dim.interleaved_field_name(), DataType::Float64, false);
        Ok(Arc::new(FixedSizeListArray::try_new(
            Arc::new(values_field),
            self.dim.size() as i32,
            Arc::new(values),
            nulls,
        )?))
    }
}

/// Stores coordinates as `xxx`, `yyy`.
#[derive(Debug, Clone)]
pub struct SeparatedCoordBufferBuilder {
    buffers: [Vec<f64>; 4],
    dim: Dimension,
}

impl SeparatedCoordBufferBuilder {
    /// Create a new empty builder with the given dimension
    pub fn new(dim: Dimension) -> Self {
        Self {
            buffers: Default::default(),
            dim,
        }
    }

    /// The number of coordinates in this builder
    pub fn len(&self) -> usize {
        self.buffers[0].len()
    }

    /// Whether this builder is empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Push one coordinate; `coord` holds at least `dim.size()` values.
    pub fn push_coord(&mut self, coord: &[f64]) {
        for (buffer, value) in self.buffers.iter_mut().zip(coord).take(self.dim.size()) {
            buffer.push(*value);
        }
    }

    /// Keep only the first `len` coordinates.
    pub fn truncate(&mut self, len: usize) {
        self.buffers.iter_mut().for_each(|buffer| buffer.truncate(len));
    }

    fn finish(&mut self, nulls: Option<NullBuffer>) -> Result<ArrayRef> {
        let fields: Fields = self
            .dim
            .ordinate_names()
            .iter()
            .map(|name| Field::new(*name, DataType::Float64, false))
            .collect();
        let arrays: Vec<ArrayRef> = self
            .buffers
            .iter_mut()
            .take(self.dim.size())
            .map(|buffer| Arc::new(Float64Array::from(std::mem::take(buffer))) as ArrayRef)
            .collect();
        Ok(Arc::new(StructArray::try_new(fields, arrays, nulls)?))
    }
}

/// A coordinate buffer builder of either layout.
#[derive(Debug, Clone)]
pub enum CoordBufferBuilder {
    /// Interleaved coordinates
    Interleaved(InterleavedCoordBufferBuilder),
    /// Separated coordinates
    Separated(SeparatedCoordBufferBuilder),
}

impl CoordBufferBuilder {
    /// Create an empty builder of the given layout and dimension.
    pub fn new(coord_type: CoordType, dim: Dimension) -> Self {
        match coord_type {
            CoordType::Interleaved => {
                CoordBufferBuilder::Interleaved(InterleavedCoordBufferBuilder::new(dim))
            }
            CoordType::Separated => {
                CoordBufferBuilder::Separated(SeparatedCoordBufferBuilder::new(dim))
            }
        }
    }

    /// The number of coordinates
    pub fn len(&self) -> usize {
        match self {
            CoordBufferBuilder::Interleaved(cb) => cb.len(),
            CoordBufferBuilder::Separated(cb) => cb.len(),
        }
    }

    /// Whether the buffer is empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Push one coordinate; `coord` holds at least as many values as the buffer dimension.
    pub fn push_coord(&mut self, coord: &[f64]) {
        match self {
            CoordBufferBuilder::Interleaved(cb) => cb.push_coord(coord),
            CoordBufferBuilder::Separated(cb) => cb.push_coord(coord),
        }
    }

    /// Keep only the first `len` coordinates.
    pub fn truncate(&mut self, len: usize) {
        match self {
            CoordBufferBuilder::Interleaved(cb) => cb.truncate(len),
            CoordBufferBuilder::Separated(cb) => cb.truncate(len),
        }
    }

    /// Take the accumulated coordinates as an Arrow array, leaving the builder empty.
    pub fn finish(&mut self, nulls: Option<NullBuffer>) -> Result<ArrayRef> {
        match self {
            CoordBufferBuilder::Interleaved(cb) => cb.finish(nulls),
            CoordBufferBuilder::Separated(cb) => cb.finish(nulls),
        }
    }
}

//! Contains the declaration of [`OffsetsBuilder`]

use arrow_array::OffsetSizeTrait;
use arrow_buffer::OffsetBuffer;

use crate::error::{GeoArrowError, Result};

/// A wrapper type of [`Vec<O>`] representing the invariants of Arrow's offsets.
/// It is guaranteed to (sound to assume that):
/// * every element is `>= 0`
/// * element at position `i` is >= than element at position `i-1`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OffsetsBuilder<O: OffsetSizeTrait>(Vec<O>);

impl<O: OffsetSizeTrait> Default for OffsetsBuilder<O> {
    #[inline]
    fn default() -> Self {
        Self::new()
    }
}

impl<O: OffsetSizeTrait> OffsetsBuilder<O> {
    /// Returns an empty [`OffsetsBuilder`] (i.e. with a single element, the zero)
    #[inline]
    pub fn new() -> Self {
        Self(vec![O::zero()])
    }

    /// Returns a new [`OffsetsBuilder`] with a capacity, allocating at least `capacity + 1`
    /// entries.
    pub fn with_capacity(capacity: usize) -> Self {
        let mut offsets = Vec::with_capacity(capacity + 1);
        offsets.push(O::zero());
        Self(offsets)
    }

    /// Pushes a new element with a given length.
    /// # Error
    /// This function errors iff the new last item is larger than what `O` supports.
    #[inline]
    pub fn try_push_usize(&mut self, length: usize) -> Result<()> {
        let new_length = self
            .last_usize()
            .checked_add(length)
            .and_then(O::from_usize)
            .ok_or(GeoArrowError::Overflow)?;
        self.0.push(new_length);
        Ok(())
    }

    /// Returns the last offset of this container.
    #[inline]
    pub fn last(&self) -> O {
        self.0.last().copied().unwrap_or_else(O::zero)
    }

    /// Returns the last offset as a `usize`.
    #[inline]
    pub fn last_usize(&self) -> usize {
        self.last().as_usize()
    }

    /// Returns the length an array with these offsets would be.
    #[inline]
    pub fn len_proxy(&self) -> usize {
        self.0.len() - 1
    }

    /// Returns the byte slice stored in this buffer
    #[inline]
    pub fn as_slice(&self) -> &[O] {
        self.0.as_slice()
    }

    /// Extends itself with `additional` elements equal to the last offset.
    /// This is useful to extend offsets with empty values, e.g. for null slots.
    #[inline]
    pub fn extend_constant(&mut self, additional: usize) {
        let offset = self.last();
        self.0.resize(self.0.len() + additional, offset)
    }

    /// Keep only the first `len` elements.
    #[inline]
    pub fn truncate(&mut self, len: usize) {
        self.0.truncate(len + 1)
    }

    /// Take the accumulated offsets, leaving an empty builder behind.
    pub fn finish(&mut self) -> OffsetBuffer<O> {
        let offsets = std::mem::replace(&mut self.0, vec![O::zero()]);
        OffsetBuffer::new(offsets.into())
    }
}

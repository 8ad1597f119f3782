//! Exchange schemas and arrays through the Arrow C Data Interface.
//!
//! Exported structs own their buffers until the consumer calls their release callback, which the
//! `arrow` FFI types handle on drop.

use arrow::ffi::{FFI_ArrowArray, FFI_ArrowSchema};
use arrow_array::{make_array, Array};
use arrow_data::ArrayData;
use arrow_schema::Field;

use crate::array::ArrayMetadata;
use crate::engine::{GeomHandle, GeometryEngine};
use crate::error::Result;
use crate::reader::ArrayReader;
use crate::schema::{make_schema, Encoding};
use crate::writer::ArrayWriter;

/// Export the GeoArrow extension field for `encoding` and geometries of ISO WKB type `wkb_type`.
pub fn make_schema_ffi(encoding: Encoding, wkb_type: u32) -> Result<FFI_ArrowSchema> {
    let data_type = make_schema(encoding, wkb_type)?;
    let field = data_type.to_field_with_metadata("geometry", true, &ArrayMetadata::default())?;
    Ok(FFI_ArrowSchema::try_from(&field)?)
}

impl<'e, E: GeometryEngine + ?Sized> ArrayWriter<'e, E> {
    /// Create a writer from an exported GeoArrow extension field.
    pub fn try_new_ffi(engine: &'e E, schema: &FFI_ArrowSchema) -> Result<Self> {
        let field = Field::try_from(schema)?;
        Self::try_new(engine, &field)
    }

    /// Finish the current array and export it.
    pub fn finish_ffi(&mut self) -> Result<FFI_ArrowArray> {
        let array = self.finish()?;
        Ok(FFI_ArrowArray::new(&array.to_data()))
    }
}

impl<'e, E: GeometryEngine + ?Sized> ArrayReader<'e, E> {
    /// Create a reader from an exported GeoArrow extension field.
    pub fn try_new_ffi(engine: &'e E, schema: &FFI_ArrowSchema) -> Result<Self> {
        let field = Field::try_from(schema)?;
        Self::try_new(engine, &field)
    }

    /// Import `array`, which must match this reader's field, and read rows
    /// `offset..offset + length` from it.
    ///
    /// # Safety
    ///
    /// `array` must be a valid C Data Interface array whose layout matches this reader's field.
    /// Ownership of its buffers moves to this call and they are released when it returns.
    pub unsafe fn read_ffi(
        &mut self,
        array: FFI_ArrowArray,
        offset: usize,
        length: usize,
    ) -> Result<Vec<Option<GeomHandle>>> {
        let data = unsafe { import(array, self.field()) }?;
        let array = make_array(data);
        self.read(array.as_ref(), offset, length)
    }
}

/// # Safety
///
/// `array` must be a valid C Data Interface array described by `field`.
unsafe fn import(array: FFI_ArrowArray, field: &Field) -> Result<ArrayData> {
    let schema = FFI_ArrowSchema::try_from(field)?;
    // SAFETY: the caller guarantees `array` is valid and described by `schema`
    let data = unsafe { arrow::ffi::from_ffi(array, &schema) }?;
    data.validate_full()?;
    Ok(data)
}

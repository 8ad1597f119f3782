//! Read GeoArrow arrays into engine geometries.

use arrow_array::Array;
use arrow_schema::Field;
use log::{debug, trace};

use crate::array::{ArrayMetadata, ArrayView, NativeView};
use crate::coord::CoordView;
use crate::datatypes::{GeoDataType, GeometryType};
use crate::engine::{create_from_seq, type_id, EngineResultExt, GeomHandle, GeometryEngine};
use crate::error::{GeoArrowError, LastError, Result};
use crate::io::wkb::read_wkb;
use crate::io::wkt::read_wkt;
use crate::scratch::GeometryScratchPool;

/// Reconstructs engine geometries from GeoArrow arrays of one type.
///
/// Returned geometries are owned by the caller. Geometries under construction are kept in a
/// scratch pool that is emptied before and after every read and on drop.
pub struct ArrayReader<'e, E: GeometryEngine + ?Sized> {
    engine: &'e E,
    field: Field,
    data_type: GeoDataType,
    scratch: GeometryScratchPool<'e, E>,
    last_error: LastError,
}

impl<'e, E: GeometryEngine + ?Sized> ArrayReader<'e, E> {
    /// Create a reader for arrays of `data_type`.
    pub fn new(engine: &'e E, data_type: GeoDataType) -> Result<Self> {
        let field = data_type.to_field_with_metadata("geometry", true, &ArrayMetadata::default())?;
        Ok(Self::bind(engine, field, data_type))
    }

    /// Create a reader for arrays described by `field`.
    pub fn try_new(engine: &'e E, field: &Field) -> Result<Self> {
        let data_type = GeoDataType::try_from(field)?;
        ArrayMetadata::try_from(field)?;
        Ok(Self::bind(engine, field.clone(), data_type))
    }

    fn bind(engine: &'e E, field: Field, data_type: GeoDataType) -> Self {
        debug!("Binding array reader to {data_type:?}");
        Self {
            engine,
            field,
            data_type,
            scratch: GeometryScratchPool::new(engine),
            last_error: LastError::default(),
        }
    }

    /// The field describing the arrays this reader accepts.
    pub fn field(&self) -> &Field {
        &self.field
    }

    /// The type of the arrays this reader accepts.
    pub fn data_type(&self) -> &GeoDataType {
        &self.data_type
    }

    /// The message of the most recent failure, or an empty string.
    pub fn last_error(&self) -> &str {
        self.last_error.as_str()
    }

    /// Read rows `offset..offset + length` of `array`. Null rows are returned as `None`.
    ///
    /// On failure no geometry created by this call survives.
    pub fn read(
        &mut self,
        array: &dyn Array,
        offset: usize,
        length: usize,
    ) -> Result<Vec<Option<GeomHandle>>> {
        trace!("Reading {length} rows at offset {offset}");
        self.last_error.clear();
        self.scratch.reset();
        let result = self.read_rows(array, offset, length);
        self.scratch.reset();
        if let Err(err) = &result {
            self.last_error.set(err);
        }
        result
    }

    fn read_rows(
        &mut self,
        array: &dyn Array,
        offset: usize,
        length: usize,
    ) -> Result<Vec<Option<GeomHandle>>> {
        let view = ArrayView::try_new(array, &self.data_type)?;
        let end = offset.checked_add(length).unwrap_or(usize::MAX);
        if end > view.len() {
            return Err(GeoArrowError::InvalidArgument(format!(
                "Rows {offset}..{end} out of bounds for an array of length {}",
                view.len()
            )));
        }

        let mut out = vec![None; length];
        for (i, slot) in out.iter_mut().enumerate() {
            let row = offset + i;
            if view.is_null(row) {
                continue;
            }
            match self.read_row(&view, row) {
                Ok(geom) => *slot = Some(geom),
                Err(err) => {
                    out.iter().flatten().for_each(|geom| self.engine.destroy(*geom));
                    return Err(err.at_row(row));
                }
            }
        }
        Ok(out)
    }

    fn read_row(&mut self, view: &ArrayView, row: usize) -> Result<GeomHandle> {
        match view {
            ArrayView::Wkt(array) => read_wkt(&mut self.scratch, 0, array.value(row)),
            ArrayView::LargeWkt(array) => read_wkt(&mut self.scratch, 0, array.value(row)),
            ArrayView::Wkb(array) => read_wkb(&mut self.scratch, 0, array.value(row)),
            ArrayView::LargeWkb(array) => read_wkb(&mut self.scratch, 0, array.value(row)),
            ArrayView::Native(native) => match native.geometry_type() {
                GeometryType::Point => self.read_point(native, row),
                GeometryType::LineString => {
                    let (start, end) = native.range(0, row)?;
                    let seq = make_coord_seq(self.engine, native.coords(), start, end - start)?;
                    create_from_seq(self.engine, type_id::LINESTRING, seq)
                }
                GeometryType::Polygon => self.read_polygon(native, row),
                typ @ (GeometryType::MultiPoint
                | GeometryType::MultiLineString
                | GeometryType::MultiPolygon
                | GeometryType::GeometryCollection
                | GeometryType::Geometry) => Err(GeoArrowError::NotSupported(format!(
                    "Reading native {typ} arrays"
                ))),
            },
        }
    }

    fn read_point(&mut self, native: &NativeView, row: usize) -> Result<GeomHandle> {
        let coords = native.coords();
        let dim = coords.dim();
        // Empty points are stored as NaN coordinates
        let is_empty = (0..dim.size()).all(|j| coords.ordinate(row, j).is_nan());
        let length = if is_empty { 0 } else { 1 };
        let seq = make_coord_seq(self.engine, coords, row, length)?;
        create_from_seq(self.engine, type_id::POINT, seq)
    }

    fn read_polygon(&mut self, native: &NativeView, row: usize) -> Result<GeomHandle> {
        let (ring_start, ring_end) = native.range(0, row)?;
        self.scratch.reset_level(0);
        for ring in ring_start..ring_end {
            let (start, end) = native.range(1, ring)?;
            let seq = make_coord_seq(self.engine, native.coords(), start, end - start)?;
            let ring = create_from_seq(self.engine, type_id::LINEARRING, seq)?;
            self.scratch.push(0, ring);
        }
        self.scratch.finish_polygon(0)
    }
}

/// Build one engine coordinate sequence from `length` coordinates of `coords` starting at
/// `offset`.
pub fn make_coord_seq<E: GeometryEngine + ?Sized>(
    engine: &E,
    coords: &CoordView,
    offset: usize,
    length: usize,
) -> Result<E::CoordSeq> {
    if offset.saturating_add(length) > coords.n_coords() {
        return Err(GeoArrowError::InvalidGeoArrow(format!(
            "Coordinates {offset}..{} out of bounds for {} coordinates",
            offset.saturating_add(length),
            coords.n_coords()
        )));
    }

    match coords.slice(offset, length) {
        CoordView::Interleaved { values, dim } => engine
            .coord_seq_from_buffer(values, length, dim.has_z(), dim.has_m())
            .context("coord_seq_from_buffer"),
        CoordView::Separated { ordinates, dim } => {
            let z = dim.has_z().then_some(ordinates[2]);
            let m = dim.has_m().then_some(ordinates[dim.size() - 1]);
            engine
                .coord_seq_from_arrays(ordinates[0], ordinates[1], z, m)
                .context("coord_seq_from_arrays")
        }
    }
}

//! Streaming WKT serializer.

use std::fmt::Write;
use std::sync::Arc;

use arrow_array::{ArrayRef, GenericStringArray, OffsetSizeTrait};
use arrow_buffer::{Buffer, NullBufferBuilder};

use crate::array::offset_builder::OffsetsBuilder;
use crate::coord::CoordView;
use crate::datatypes::{Dimension, GeometryType};
use crate::error::{GeoArrowError, Result};
use crate::visitor::GeoArrowVisitor;

#[derive(Debug, Clone, Copy)]
struct Level {
    tagged: bool,
    n_children: usize,
    /// `None` for rings.
    geometry_type: Option<GeometryType>,
}

/// Serializes visited geometries to a `geoarrow.wkt` array (`Utf8` or `LargeUtf8`).
///
/// Output follows the `POINT (0 1)`, `POINT Z (0 1 2)`, `POLYGON EMPTY` style. Nested
/// geometries carry their type tag only inside a GeometryCollection. WKT has no spelling for an
/// empty point inside a MULTIPOINT, so such features fail.
#[derive(Debug)]
pub struct WktWriter<O: OffsetSizeTrait> {
    values: String,
    offsets: OffsetsBuilder<O>,
    validity: NullBufferBuilder,
    precision: Option<usize>,
    levels: Vec<Level>,
    collection_depths: Vec<usize>,
    feat_is_null: bool,
    dim: Dimension,
}

impl<O: OffsetSizeTrait> Default for WktWriter<O> {
    fn default() -> Self {
        Self::new()
    }
}

impl<O: OffsetSizeTrait> WktWriter<O> {
    /// Creates a new writer printing the shortest representation of every ordinate.
    pub fn new() -> Self {
        Self {
            values: String::new(),
            offsets: OffsetsBuilder::new(),
            validity: NullBufferBuilder::new(0),
            precision: None,
            levels: vec![],
            collection_depths: vec![],
            feat_is_null: false,
            dim: Dimension::XY,
        }
    }

    /// Print ordinates with at most `precision` decimal places.
    pub fn with_precision(mut self, precision: usize) -> Self {
        self.precision = Some(precision);
        self
    }

    /// The number of features written so far.
    pub fn len(&self) -> usize {
        self.offsets.len_proxy()
    }

    /// Whether no features were written.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Opens a child of the current level: a separator or the opening parenthesis.
    fn open_child(&mut self) {
        if let Some(level) = self.levels.last_mut() {
            if level.n_children == 0 {
                self.values.push_str(if level.tagged { " (" } else { "(" });
            } else {
                self.values.push_str(", ");
            }
            level.n_children += 1;
        }
    }

    fn push_level(&mut self, tagged: bool, geometry_type: Option<GeometryType>) {
        self.levels.push(Level {
            tagged,
            n_children: 0,
            geometry_type,
        });
    }

    fn pop_level(&mut self) -> Result<()> {
        let level = self.levels.pop().ok_or_else(|| {
            GeoArrowError::InvalidArgument("Unbalanced geometry end in WKT writer".to_string())
        })?;
        match (level.n_children, level.tagged) {
            (0, true) => self.values.push_str(" EMPTY"),
            (0, false) => self.values.push_str("EMPTY"),
            _ => self.values.push(')'),
        }
        Ok(())
    }

    fn write_ordinate(&mut self, value: f64) {
        match self.precision {
            Some(precision) => {
                let start = self.values.len();
                // Writing to a String cannot fail
                let _ = write!(self.values, "{value:.precision$}");
                if self.values[start..].contains('.') {
                    let trimmed = self.values.trim_end_matches('0').trim_end_matches('.').len();
                    self.values.truncate(trimmed);
                }
            }
            None => {
                let _ = write!(self.values, "{value}");
            }
        }
    }

    /// Consume the accumulated features as an Arrow array, resetting the writer.
    pub fn finish(&mut self) -> Result<ArrayRef> {
        self.values.truncate(self.offsets.last_usize());
        let values = std::mem::take(&mut self.values);
        let array = GenericStringArray::<O>::try_new(
            self.offsets.finish(),
            Buffer::from_vec(values.into_bytes()),
            self.validity.finish(),
        )?;
        Ok(Arc::new(array))
    }
}

impl<O: OffsetSizeTrait> GeoArrowVisitor for WktWriter<O> {
    fn feat_start(&mut self) -> Result<()> {
        // Drop anything a failed feature left behind
        self.values.truncate(self.offsets.last_usize());
        self.levels.clear();
        self.collection_depths.clear();
        self.feat_is_null = false;
        Ok(())
    }

    fn null_feat(&mut self) -> Result<()> {
        self.feat_is_null = true;
        Ok(())
    }

    fn geom_start(&mut self, geometry_type: GeometryType, dim: Dimension) -> Result<()> {
        let tagged = match self.collection_depths.last() {
            None => self.levels.is_empty(),
            Some(depth) => *depth == self.levels.len(),
        };
        self.open_child();

        if tagged {
            self.dim = dim;
            self.values.push_str(geometry_type.wkt_tag());
            match dim {
                Dimension::XY => {}
                Dimension::XYZ => self.values.push_str(" Z"),
                Dimension::XYM => self.values.push_str(" M"),
                Dimension::XYZM => self.values.push_str(" ZM"),
            }
        }

        if geometry_type == GeometryType::GeometryCollection {
            self.collection_depths.push(self.levels.len() + 1);
        }
        self.push_level(tagged, Some(geometry_type));
        Ok(())
    }

    fn ring_start(&mut self) -> Result<()> {
        self.open_child();
        self.push_level(false, None);
        Ok(())
    }

    fn coords(&mut self, coords: &CoordView) -> Result<()> {
        let dim = self.dim;
        for coord in coords.coords_as(dim) {
            self.open_child();
            for (j, value) in coord[..dim.size()].iter().enumerate() {
                if j > 0 {
                    self.values.push(' ');
                }
                self.write_ordinate(*value);
            }
        }
        Ok(())
    }

    fn ring_end(&mut self) -> Result<()> {
        self.pop_level()
    }

    fn geom_end(&mut self) -> Result<()> {
        if let [.., parent, current] = self.levels.as_slice() {
            if parent.geometry_type == Some(GeometryType::MultiPoint)
                && current.geometry_type == Some(GeometryType::Point)
                && current.n_children == 0
            {
                return Err(GeoArrowError::Wkt(
                    "Can't write an empty point inside a MULTIPOINT".to_string(),
                ));
            }
        }
        if self.collection_depths.last() == Some(&self.levels.len()) {
            self.collection_depths.pop();
        }
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

#[cfg(test)]
mod test {
    use arrow_array::{Array, StringArray};

    use super::*;

    fn write_with(f: impl FnOnce(&mut WktWriter<i32>) -> Result<()>) -> String {
        let mut writer = WktWriter::<i32>::new();
        writer.feat_start().unwrap();
        f(&mut writer).unwrap();
        writer.feat_end().unwrap();
        let array = writer.finish().unwrap();
        let array = array.as_any().downcast_ref::<StringArray>().unwrap();
        array.value(0).to_string()
    }

    #[test]
    fn point() {
        let wkt = write_with(|w| {
            w.geom_start(GeometryType::Point, Dimension::XY)?;
            w.coords(&CoordView::interleaved(&[0., 1.], Dimension::XY))?;
            w.geom_end()
        });
        assert_eq!(wkt, "POINT (0 1)");

        let wkt = write_with(|w| {
            w.geom_start(GeometryType::Point, Dimension::XYZ)?;
            w.coords(&CoordView::interleaved(&[0., 1., 2.5], Dimension::XYZ))?;
            w.geom_end()
        });
        assert_eq!(wkt, "POINT Z (0 1 2.5)");
    }

    #[test]
    fn empties() {
        let wkt = write_with(|w| {
            w.geom_start(GeometryType::Point, Dimension::XY)?;
            w.geom_end()
        });
        assert_eq!(wkt, "POINT EMPTY");

        let wkt = write_with(|w| {
            w.geom_start(GeometryType::Polygon, Dimension::XY)?;
            w.geom_end()
        });
        assert_eq!(wkt, "POLYGON EMPTY");
    }

    #[test]
    fn polygon_with_hole() {
        let wkt = write_with(|w| {
            w.geom_start(GeometryType::Polygon, Dimension::XY)?;
            w.ring_start()?;
            w.coords(&CoordView::interleaved(
                &[0., 0., 10., 0., 10., 10., 0., 0.],
                Dimension::XY,
            ))?;
            w.ring_end()?;
            w.ring_start()?;
            w.coords(&CoordView::interleaved(
                &[1., 1., 2., 1., 2., 2., 1., 1.],
                Dimension::XY,
            ))?;
            w.ring_end()?;
            w.geom_end()
        });
        assert_eq!(
            wkt,
            "POLYGON ((0 0, 10 0, 10 10, 0 0), (1 1, 2 1, 2 2, 1 1))"
        );
    }

    #[test]
    fn collection_tags_children() {
        let wkt = write_with(|w| {
            w.geom_start(GeometryType::GeometryCollection, Dimension::XY)?;
            w.geom_start(GeometryType::Point, Dimension::XY)?;
            w.coords(&CoordView::interleaved(&[0., 1.], Dimension::XY))?;
            w.geom_end()?;
            w.geom_start(GeometryType::MultiPoint, Dimension::XY)?;
            w.geom_start(GeometryType::Point, Dimension::XY)?;
            w.coords(&CoordView::interleaved(&[2., 3.], Dimension::XY))?;
            w.geom_end()?;
            w.geom_end()?;
            w.geom_start(GeometryType::Point, Dimension::XY)?;
            w.geom_end()?;
            w.geom_end()
        });
        assert_eq!(
            wkt,
            "GEOMETRYCOLLECTION (POINT (0 1), MULTIPOINT ((2 3)), POINT EMPTY)"
        );
    }

    #[test]
    fn empty_point_in_multipoint_fails() {
        let mut writer = WktWriter::<i32>::new();
        writer.feat_start().unwrap();
        writer
            .geom_start(GeometryType::MultiPoint, Dimension::XY)
            .unwrap();
        writer
            .geom_start(GeometryType::Point, Dimension::XY)
            .unwrap();
        writer
            .coords(&CoordView::interleaved(&[1., 2.], Dimension::XY))
            .unwrap();
        writer.geom_end().unwrap();
        writer
            .geom_start(GeometryType::Point, Dimension::XY)
            .unwrap();
        assert!(matches!(writer.geom_end(), Err(GeoArrowError::Wkt(_))));

        // The next feature starts clean
        writer.feat_start().unwrap();
        writer
            .geom_start(GeometryType::MultiPoint, Dimension::XY)
            .unwrap();
        writer.geom_end().unwrap();
        writer.feat_end().unwrap();
        let array = writer.finish().unwrap();
        let array = array.as_any().downcast_ref::<StringArray>().unwrap();
        assert_eq!(array.len(), 1);
        assert_eq!(array.value(0), "MULTIPOINT EMPTY");
    }

    #[test]
    fn precision() {
        let mut writer = WktWriter::<i32>::new().with_precision(3);
        writer.feat_start().unwrap();
        writer
            .geom_start(GeometryType::Point, Dimension::XY)
            .unwrap();
        writer
            .coords(&CoordView::interleaved(
                &[1.0 / 3.0, 2.5],
                Dimension::XY,
            ))
            .unwrap();
        writer.geom_end().unwrap();
        writer.feat_end().unwrap();
        let array = writer.finish().unwrap();
        let array = array.as_any().downcast_ref::<StringArray>().unwrap();
        assert_eq!(array.value(0), "POINT (0.333 2.5)");
    }

    #[test]
    fn nulls_and_partial_features() {
        let mut writer = WktWriter::<i64>::new();
        writer.feat_start().unwrap();
        writer.null_feat().unwrap();
        writer.feat_end().unwrap();

        // An abandoned feature leaves nothing behind
        writer.feat_start().unwrap();
        writer
            .geom_start(GeometryType::LineString, Dimension::XY)
            .unwrap();

        writer.feat_start().unwrap();
        writer
            .geom_start(GeometryType::LineString, Dimension::XY)
            .unwrap();
        writer.geom_end().unwrap();
        writer.feat_end().unwrap();

        let array = writer.finish().unwrap();
        assert_eq!(array.len(), 2);
        assert!(array.is_null(0));
        let array = array
            .as_any()
            .downcast_ref::<arrow_array::LargeStringArray>()
            .unwrap();
        assert_eq!(array.value(1), "LINESTRING EMPTY");
        assert!(writer.is_empty());
    }
}

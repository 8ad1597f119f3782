//! The streaming geometry protocol shared by the array writer and every output serializer.
//!
//! A feature is reported as
//!
//! ```text
//! feat_start (null_feat | geom_start ... geom_end) feat_end
//! ```
//!
//! where a geometry contains, depending on its type, `coords` batches (Point, LineString),
//! `ring_start coords... ring_end` triples (Polygon) or nested geometries (multi geometries and
//! collections). The first `Err` returned by a callback aborts the traversal and is propagated
//! unchanged.

use crate::coord::CoordView;
use crate::datatypes::{Dimension, GeometryType};
use crate::error::Result;

/// Receives the events of a geometry traversal.
#[allow(unused_variables)]
pub trait GeoArrowVisitor {
    /// A new feature begins.
    fn feat_start(&mut self) -> Result<()> {
        Ok(())
    }

    /// The current feature is null.
    fn null_feat(&mut self) -> Result<()> {
        Ok(())
    }

    /// A (possibly nested) geometry begins.
    fn geom_start(&mut self, geometry_type: GeometryType, dim: Dimension) -> Result<()> {
        Ok(())
    }

    /// A polygon ring begins.
    fn ring_start(&mut self) -> Result<()> {
        Ok(())
    }

    /// A batch of coordinates of the current geometry or ring.
    fn coords(&mut self, coords: &CoordView) -> Result<()> {
        Ok(())
    }

    /// The current polygon ring ends.
    fn ring_end(&mut self) -> Result<()> {
        Ok(())
    }

    /// The current geometry ends.
    fn geom_end(&mut self) -> Result<()> {
        Ok(())
    }

    /// The current feature ends.
    fn feat_end(&mut self) -> Result<()> {
        Ok(())
    }
}

impl<V: GeoArrowVisitor + ?Sized> GeoArrowVisitor for &mut V {
    fn feat_start(&mut self) -> Result<()> {
        (**self).feat_start()
    }

    fn null_feat(&mut self) -> Result<()> {
        (**self).null_feat()
    }

    fn geom_start(&mut self, geometry_type: GeometryType, dim: Dimension) -> Result<()> {
        (**self).geom_start(geometry_type, dim)
    }

    fn ring_start(&mut self) -> Result<()> {
        (**self).ring_start()
    }

    fn coords(&mut self, coords: &CoordView) -> Result<()> {
        (**self).coords(coords)
    }

    fn ring_end(&mut self) -> Result<()> {
        (**self).ring_end()
    }

    fn geom_end(&mut self) -> Result<()> {
        (**self).geom_end()
    }

    fn feat_end(&mut self) -> Result<()> {
        (**self).feat_end()
    }
}

//! Coordinate batches handed between engines and serializers.

use crate::datatypes::Dimension;
use crate::error::{GeoArrowError, Result};

/// A borrowed batch of coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CoordView<'a> {
    /// `x y [z] [m]` values, one coordinate after the other.
    Interleaved {
        /// The interleaved values; the length is a multiple of `dim.size()`.
        values: &'a [f64],
        /// The dimension of every coordinate.
        dim: Dimension,
    },
    /// One slice per ordinate, all of the same length.
    Separated {
        /// The `x`, `y` and optional third and fourth ordinate slices. Unused slots are empty.
        ordinates: [&'a [f64]; 4],
        /// The dimension of every coordinate.
        dim: Dimension,
    },
}

impl<'a> CoordView<'a> {
    /// A view over interleaved values.
    pub fn interleaved(values: &'a [f64], dim: Dimension) -> Self {
        Self::Interleaved { values, dim }
    }

    /// A view over separated ordinate slices, in `dim` order.
    pub fn separated(ordinates: &[&'a [f64]], dim: Dimension) -> Result<Self> {
        if ordinates.len() != dim.size() {
            return Err(GeoArrowError::InvalidArgument(format!(
                "Expected {} ordinate slices for {dim}, got {}",
                dim.size(),
                ordinates.len()
            )));
        }
        let n_coords = ordinates[0].len();
        if ordinates.iter().any(|o| o.len() != n_coords) {
            return Err(GeoArrowError::InvalidArgument(
                "Ordinate slices differ in length".to_string(),
            ));
        }

        let mut slots: [&'a [f64]; 4] = [&[]; 4];
        slots[..ordinates.len()].copy_from_slice(ordinates);
        Ok(Self::Separated {
            ordinates: slots,
            dim,
        })
    }

    /// The dimension of every coordinate.
    pub fn dim(&self) -> Dimension {
        match self {
            CoordView::Interleaved { dim, .. } | CoordView::Separated { dim, .. } => *dim,
        }
    }

    /// The number of coordinates.
    pub fn n_coords(&self) -> usize {
        match self {
            CoordView::Interleaved { values, dim } => values.len() / dim.size(),
            CoordView::Separated { ordinates, .. } => ordinates[0].len(),
        }
    }

    /// The number of values per coordinate.
    pub fn n_values(&self) -> usize {
        self.dim().size()
    }

    /// Whether the view holds no coordinates.
    pub fn is_empty(&self) -> bool {
        self.n_coords() == 0
    }

    /// Ordinate `j` of coordinate `i`.
    ///
    /// # Panics
    ///
    /// If `i >= n_coords()` or `j >= n_values()`.
    #[inline]
    pub fn ordinate(&self, i: usize, j: usize) -> f64 {
        match self {
            CoordView::Interleaved { values, dim } => values[i * dim.size() + j],
            CoordView::Separated { ordinates, .. } => ordinates[j][i],
        }
    }

    /// Iterate over the coordinates converted to `dim`.
    ///
    /// Ordinates are matched by name; ordinates of `dim` missing from the view are NaN. Only the
    /// first `dim.size()` values of each item are meaningful.
    pub fn coords_as(&self, dim: Dimension) -> impl Iterator<Item = [f64; 4]> + '_ {
        let source_names = self.dim().ordinate_names();
        let mut mapping = [None; 4];
        for (j, name) in dim.ordinate_names().iter().enumerate() {
            mapping[j] = source_names.iter().position(|source| source == name);
        }
        (0..self.n_coords()).map(move |i| {
            let mut coord = [f64::NAN; 4];
            for (value, source) in coord.iter_mut().zip(mapping.iter()) {
                if let Some(k) = source {
                    *value = self.ordinate(i, *k);
                }
            }
            coord
        })
    }

    /// A sub-view of `length` coordinates starting at coordinate `offset`.
    pub fn slice(&self, offset: usize, length: usize) -> Self {
        match self {
            CoordView::Interleaved { values, dim } => {
                let size = dim.size();
                CoordView::Interleaved {
                    values: &values[offset * size..(offset + length) * size],
                    dim: *dim,
                }
            }
            CoordView::Separated { ordinates, dim } => {
                let mut sliced: [&'a [f64]; 4] = [&[]; 4];
                for (dst, src) in sliced.iter_mut().zip(ordinates.iter()).take(dim.size()) {
                    *dst = &src[offset..offset + length];
                }
                CoordView::Separated {
                    ordinates: sliced,
                    dim: *dim,
                }
            }
        }
    }
}

/// A growable, interleaved coordinate buffer reused across geometries.
///
/// The buffer grows by doubling and never shrinks.
#[derive(Debug, Default, Clone)]
pub struct CoordScratch {
    values: Vec<f64>,
    n_coords: usize,
    dim: Option<Dimension>,
}

impl CoordScratch {
    /// Create an empty buffer.
    pub fn new() -> Self {
        Self::default()
    }

    /// The number of values the buffer holds without growing.
    pub fn capacity(&self) -> usize {
        self.values.len()
    }

    /// Make room for `n_coords` coordinates of dimension `dim` and make them the current batch.
    ///
    /// On allocation failure the current batch is reset to zero coordinates.
    pub fn ensure_capacity(&mut self, n_coords: usize, dim: Dimension) -> Result<()> {
        let Some(required) = n_coords.checked_mul(dim.size()) else {
            self.n_coords = 0;
            return Err(GeoArrowError::OutOfMemory(format!(
                "{n_coords} coordinates overflow the coordinate buffer"
            )));
        };

        if required > self.values.len() {
            let doubled = self.values.len() * 2;
            let new_len = if doubled > required {
                doubled
            } else {
                required
            };
            if let Err(err) = self.values.try_reserve_exact(new_len - self.values.len()) {
                log::warn!("Failed to grow coordinate buffer to {new_len} values: {err}");
                self.n_coords = 0;
                return Err(GeoArrowError::OutOfMemory(format!(
                    "Failed to allocate {new_len} coordinate values: {err}"
                )));
            }
            self.values.resize(new_len, 0.0);
        }

        self.n_coords = n_coords;
        self.dim = Some(dim);
        Ok(())
    }

    /// The writable values of the current batch.
    pub fn values_mut(&mut self) -> &mut [f64] {
        let n_values = self.n_coords * self.dim.map_or(0, |dim| dim.size());
        &mut self.values[..n_values]
    }

    /// A view of the current batch.
    pub fn view(&self) -> CoordView<'_> {
        let dim = self.dim.unwrap_or(Dimension::XY);
        CoordView::interleaved(&self.values[..self.n_coords * dim.size()], dim)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn capacity_doubles() {
        let mut scratch = CoordScratch::new();
        scratch.ensure_capacity(2, Dimension::XY).unwrap();
        assert_eq!(scratch.capacity(), 4);

        // Doubling exceeds the requirement
        scratch.ensure_capacity(3, Dimension::XY).unwrap();
        assert_eq!(scratch.capacity(), 8);

        // Requirement exceeds doubling
        scratch.ensure_capacity(100, Dimension::XYZ).unwrap();
        assert_eq!(scratch.capacity(), 300);

        // Never shrinks
        scratch.ensure_capacity(1, Dimension::XY).unwrap();
        assert_eq!(scratch.capacity(), 300);
        assert_eq!(scratch.values_mut().len(), 2);
    }

    #[test]
    fn overflow_resets_batch() {
        let mut scratch = CoordScratch::new();
        scratch.ensure_capacity(2, Dimension::XY).unwrap();
        let err = scratch
            .ensure_capacity(usize::MAX, Dimension::XYZ)
            .unwrap_err();
        assert!(matches!(err, GeoArrowError::OutOfMemory(_)));
        assert_eq!(scratch.view().n_coords(), 0);
    }

    #[test]
    fn views() {
        let values = [0., 1., 2., 3., 4., 5.];
        let view = CoordView::interleaved(&values, Dimension::XYZ);
        assert_eq!(view.n_coords(), 2);
        assert_eq!(view.n_values(), 3);
        assert_eq!(view.ordinate(1, 2), 5.);
        assert_eq!(view.slice(1, 1).ordinate(0, 0), 3.);

        let x = [0., 2., 4.];
        let y = [1., 3., 5.];
        let view = CoordView::separated(&[&x, &y], Dimension::XY).unwrap();
        assert_eq!(view.n_coords(), 3);
        assert_eq!(view.ordinate(2, 1), 5.);
        let sliced = view.slice(1, 2);
        assert_eq!(sliced.n_coords(), 2);
        assert_eq!(sliced.ordinate(0, 0), 2.);

        let coords: Vec<_> = sliced
            .coords_as(Dimension::XY)
            .map(|c| c[..2].to_vec())
            .collect();
        assert_eq!(coords, vec![vec![2., 3.], vec![4., 5.]]);

        assert!(CoordView::separated(&[&x], Dimension::XY).is_err());
        assert!(CoordView::separated(&[&x, &y[..2]], Dimension::XY).is_err());
    }

    #[test]
    fn convert_dimensions() {
        let values = [1., 2., 3.];
        let xym = CoordView::interleaved(&values, Dimension::XYM);
        let coord = xym.coords_as(Dimension::XYZM).next().unwrap();
        assert_eq!(coord[..2], [1., 2.]);
        assert!(coord[2].is_nan());
        assert_eq!(coord[3], 3.);

        let coord = xym.coords_as(Dimension::XY).next().unwrap();
        assert_eq!(coord[..2], [1., 2.]);
    }
}

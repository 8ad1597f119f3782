//! An in-process reference implementation of [`GeometryEngine`].

use std::cell::{Cell, RefCell};
use std::collections::HashMap;

use crate::datatypes::Dimension;
use crate::engine::{type_id, EngineError, EngineResult, GeomHandle, GeometryEngine};

/// An owned, interleaved coordinate sequence of an [`ArenaEngine`].
#[derive(Debug, Clone, PartialEq)]
pub struct ArenaCoordSeq {
    dim: Dimension,
    values: Vec<f64>,
}

impl ArenaCoordSeq {
    /// The number of coordinates.
    pub fn len(&self) -> usize {
        self.values.len() / self.dim.size()
    }

    /// Whether the sequence has no coordinates.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// The dimension of every coordinate.
    pub fn dim(&self) -> Dimension {
        self.dim
    }

    fn coord(&self, i: usize) -> &[f64] {
        let size = self.dim.size();
        &self.values[i * size..(i + 1) * size]
    }
}

#[derive(Debug, Clone)]
struct Node {
    type_id: i32,
    dim: Dimension,
    coords: ArenaCoordSeq,
    children: Vec<GeomHandle>,
    owned: bool,
}

/// A geometry engine storing geometries in a handle-addressed arena.
///
/// Type ids follow GEOS (see [`type_id`]). Handles are never reused, so a destroyed handle stays
/// invalid.
#[derive(Debug, Default)]
pub struct ArenaEngine {
    nodes: RefCell<HashMap<u64, Node>>,
    next_id: Cell<u64>,
}

impl ArenaEngine {
    /// Create an empty engine.
    pub fn new() -> Self {
        Self::default()
    }

    /// The number of geometries alive in the engine, including owned children.
    pub fn live_count(&self) -> usize {
        self.nodes.borrow().len()
    }

    fn insert(&self, node: Node) -> GeomHandle {
        let id = self.next_id.get();
        self.next_id.set(id + 1);
        self.nodes.borrow_mut().insert(id, node);
        GeomHandle::from_raw(id)
    }

    fn with_node<T>(
        &self,
        geom: GeomHandle,
        f: impl FnOnce(&Node) -> EngineResult<T>,
    ) -> EngineResult<T> {
        let nodes = self.nodes.borrow();
        let node = nodes.get(&geom.as_raw()).ok_or_else(|| {
            EngineError::new(format!("Unknown geometry handle {}", geom.as_raw()))
        })?;
        f(node)
    }

    fn with_sequence<T>(
        &self,
        geom: GeomHandle,
        f: impl FnOnce(&ArenaCoordSeq) -> EngineResult<T>,
    ) -> EngineResult<T> {
        self.with_node(geom, |node| match node.type_id {
            type_id::POINT | type_id::LINESTRING | type_id::LINEARRING => f(&node.coords),
            id => Err(EngineError::new(format!(
                "Geometry of type id {id} has no coordinate sequence"
            ))),
        })
    }

    fn child(&self, geom: GeomHandle, expected_type: &[i32], n: usize) -> EngineResult<GeomHandle> {
        self.with_node(geom, |node| {
            if !expected_type.contains(&node.type_id) {
                return Err(EngineError::new(format!(
                    "Geometry of type id {} has no such child",
                    node.type_id
                )));
            }
            node.children.get(n).copied().ok_or_else(|| {
                EngineError::new(format!("Child index {n} out of range"))
            })
        })
    }

    /// Check that every handle is a live, unowned geometry of one of the allowed types.
    fn check_consumable(&self, geoms: &[GeomHandle], allowed: &[i32]) -> EngineResult<Dimension> {
        let nodes = self.nodes.borrow();
        let mut dim = Dimension::XY;
        for (i, geom) in geoms.iter().enumerate() {
            if geoms[..i].contains(geom) {
                return Err(EngineError::new("The same geometry was passed twice"));
            }
            let node = nodes.get(&geom.as_raw()).ok_or_else(|| {
                EngineError::new(format!("Unknown geometry handle {}", geom.as_raw()))
            })?;
            if node.owned {
                return Err(EngineError::new("Geometry is already owned by another geometry"));
            }
            if !allowed.contains(&node.type_id) {
                return Err(EngineError::new(format!(
                    "Unexpected child geometry of type id {}",
                    node.type_id
                )));
            }
            dim = Dimension::from_flags(
                dim.has_z() || node.dim.has_z(),
                dim.has_m() || node.dim.has_m(),
            );
        }
        Ok(dim)
    }

    fn adopt(&self, parent: Node) -> GeomHandle {
        {
            let mut nodes = self.nodes.borrow_mut();
            for child in parent.children.iter() {
                if let Some(node) = nodes.get_mut(&child.as_raw()) {
                    node.owned = true;
                }
            }
        }
        self.insert(parent)
    }

    /// Structural equality: same types, dimensions, coordinates and parts. NaN ordinates compare
    /// equal to each other.
    pub fn equals_exact(&self, a: GeomHandle, b: GeomHandle) -> bool {
        let nodes = self.nodes.borrow();
        equals_exact_inner(&nodes, a, b)
    }
}

fn equals_exact_inner(nodes: &HashMap<u64, Node>, a: GeomHandle, b: GeomHandle) -> bool {
    let (Some(a), Some(b)) = (nodes.get(&a.as_raw()), nodes.get(&b.as_raw())) else {
        return false;
    };
    if a.type_id != b.type_id
        || a.dim != b.dim
        || a.children.len() != b.children.len()
        || a.coords.values.len() != b.coords.values.len()
    {
        return false;
    }
    let coords_equal = a
        .coords
        .values
        .iter()
        .zip(b.coords.values.iter())
        .all(|(x, y)| x == y || (x.is_nan() && y.is_nan()));
    coords_equal
        && a.children
            .iter()
            .zip(b.children.iter())
            .all(|(x, y)| equals_exact_inner(nodes, *x, *y))
}

pub(super) fn collection_members(collection_type: i32) -> EngineResult<&'static [i32]> {
    match collection_type {
        type_id::MULTIPOINT => Ok(&[type_id::POINT]),
        type_id::MULTILINESTRING => Ok(&[type_id::LINESTRING, type_id::LINEARRING]),
        type_id::MULTIPOLYGON => Ok(&[type_id::POLYGON]),
        type_id::GEOMETRYCOLLECTION => Ok(&[
            type_id::POINT,
            type_id::LINESTRING,
            type_id::LINEARRING,
            type_id::POLYGON,
            type_id::MULTIPOINT,
            type_id::MULTILINESTRING,
            type_id::MULTIPOLYGON,
            type_id::GEOMETRYCOLLECTION,
        ]),
        id => Err(EngineError::new(format!(
            "Type id {id} is not a collection type"
        ))),
    }
}

impl GeometryEngine for ArenaEngine {
    type CoordSeq = ArenaCoordSeq;

    fn type_id(&self, geom: GeomHandle) -> EngineResult<i32> {
        self.with_node(geom, |node| Ok(node.type_id))
    }

    fn coordinate_dimension(&self, geom: GeomHandle) -> EngineResult<i32> {
        self.with_node(geom, |node| Ok(node.dim.size() as i32))
    }

    fn is_empty(&self, geom: GeomHandle) -> EngineResult<bool> {
        self.with_node(geom, |node| match node.type_id {
            type_id::POINT | type_id::LINESTRING | type_id::LINEARRING => {
                Ok(node.coords.is_empty())
            }
            _ => Ok(node.children.is_empty()),
        })
    }

    fn coord_seq_size(&self, geom: GeomHandle) -> EngineResult<usize> {
        self.with_sequence(geom, |seq| Ok(seq.len()))
    }

    fn coord_seq_dimensions(&self, geom: GeomHandle) -> EngineResult<usize> {
        self.with_sequence(geom, |seq| Ok(seq.dim.size()))
    }

    fn copy_coords(
        &self,
        geom: GeomHandle,
        has_z: bool,
        has_m: bool,
        out: &mut [f64],
    ) -> EngineResult<()> {
        self.with_sequence(geom, |seq| {
            let stride = 2 + has_z as usize + has_m as usize;
            if out.len() < seq.len() * stride {
                return Err(EngineError::new(format!(
                    "Output buffer of {} values is too small for {} coordinates",
                    out.len(),
                    seq.len()
                )));
            }

            let z_index = seq.dim.has_z().then_some(2);
            let m_index = seq.dim.has_m().then_some(seq.dim.size() - 1);
            for (i, dst) in out.chunks_exact_mut(stride).take(seq.len()).enumerate() {
                let src = seq.coord(i);
                dst[0] = src[0];
                dst[1] = src[1];
                let mut j = 2;
                if has_z {
                    dst[j] = z_index.map_or(f64::NAN, |k| src[k]);
                    j += 1;
                }
                if has_m {
                    dst[j] = m_index.map_or(f64::NAN, |k| src[k]);
                }
            }
            Ok(())
        })
    }

    fn exterior_ring(&self, geom: GeomHandle) -> EngineResult<GeomHandle> {
        self.child(geom, &[type_id::POLYGON], 0)
    }

    fn num_interior_rings(&self, geom: GeomHandle) -> EngineResult<usize> {
        self.with_node(geom, |node| match node.type_id {
            type_id::POLYGON => Ok(node.children.len().saturating_sub(1)),
            id => Err(EngineError::new(format!(
                "Geometry of type id {id} is not a polygon"
            ))),
        })
    }

    fn interior_ring_n(&self, geom: GeomHandle, n: usize) -> EngineResult<GeomHandle> {
        self.child(geom, &[type_id::POLYGON], n + 1)
    }

    fn num_geometries(&self, geom: GeomHandle) -> EngineResult<usize> {
        self.with_node(geom, |node| match node.type_id {
            type_id::MULTIPOINT
            | type_id::MULTILINESTRING
            | type_id::MULTIPOLYGON
            | type_id::GEOMETRYCOLLECTION => Ok(node.children.len()),
            // GEOS reports one part for atomic geometries
            _ => Ok(1),
        })
    }

    fn geometry_n(&self, geom: GeomHandle, n: usize) -> EngineResult<GeomHandle> {
        self.child(
            geom,
            &[
                type_id::MULTIPOINT,
                type_id::MULTILINESTRING,
                type_id::MULTIPOLYGON,
                type_id::GEOMETRYCOLLECTION,
            ],
            n,
        )
    }

    fn coord_seq_from_buffer(
        &self,
        values: &[f64],
        n_coords: usize,
        has_z: bool,
        has_m: bool,
    ) -> EngineResult<ArenaCoordSeq> {
        let dim = Dimension::from_flags(has_z, has_m);
        let n_values = n_coords * dim.size();
        if values.len() < n_values {
            return Err(EngineError::new(format!(
                "Buffer of {} values is too small for {n_coords} {dim} coordinates",
                values.len()
            )));
        }
        Ok(ArenaCoordSeq {
            dim,
            values: values[..n_values].to_vec(),
        })
    }

    fn coord_seq_from_arrays(
        &self,
        x: &[f64],
        y: &[f64],
        z: Option<&[f64]>,
        m: Option<&[f64]>,
    ) -> EngineResult<ArenaCoordSeq> {
        let n_coords = x.len();
        let lengths_match = y.len() == n_coords
            && z.map_or(true, |z| z.len() == n_coords)
            && m.map_or(true, |m| m.len() == n_coords);
        if !lengths_match {
            return Err(EngineError::new("Ordinate arrays differ in length"));
        }

        let dim = Dimension::from_flags(z.is_some(), m.is_some());
        let mut values = Vec::with_capacity(n_coords * dim.size());
        for i in 0..n_coords {
            values.push(x[i]);
            values.push(y[i]);
            if let Some(z) = z {
                values.push(z[i]);
            }
            if let Some(m) = m {
                values.push(m[i]);
            }
        }
        Ok(ArenaCoordSeq { dim, values })
    }

    fn create_point(&self, seq: ArenaCoordSeq) -> EngineResult<GeomHandle> {
        if seq.len() > 1 {
            return Err(EngineError::new(format!(
                "Point coordinate sequence must have at most one coordinate, got {}",
                seq.len()
            )));
        }
        Ok(self.insert(Node {
            type_id: type_id::POINT,
            dim: seq.dim,
            coords: seq,
            children: vec![],
            owned: false,
        }))
    }

    fn create_line_string(&self, seq: ArenaCoordSeq) -> EngineResult<GeomHandle> {
        if seq.len() == 1 {
            return Err(EngineError::new(
                "Invalid number of points in LineString found 1 - must be 0 or >= 2",
            ));
        }
        Ok(self.insert(Node {
            type_id: type_id::LINESTRING,
            dim: seq.dim,
            coords: seq,
            children: vec![],
            owned: false,
        }))
    }

    fn create_linear_ring(&self, seq: ArenaCoordSeq) -> EngineResult<GeomHandle> {
        let n = seq.len();
        if n != 0 {
            if n < 4 {
                return Err(EngineError::new(format!(
                    "Invalid number of points in LinearRing found {n} - must be 0 or >= 4"
                )));
            }
            let (first, last) = (seq.coord(0), seq.coord(n - 1));
            if first[0] != last[0] || first[1] != last[1] {
                return Err(EngineError::new(
                    "Points of LinearRing do not form a closed linestring",
                ));
            }
        }
        Ok(self.insert(Node {
            type_id: type_id::LINEARRING,
            dim: seq.dim,
            coords: seq,
            children: vec![],
            owned: false,
        }))
    }

    fn create_polygon(&self, shell: GeomHandle, holes: &[GeomHandle]) -> EngineResult<GeomHandle> {
        let mut rings = Vec::with_capacity(holes.len() + 1);
        rings.push(shell);
        rings.extend_from_slice(holes);
        let dim = self.check_consumable(&rings, &[type_id::LINEARRING])?;
        Ok(self.adopt(Node {
            type_id: type_id::POLYGON,
            dim,
            coords: ArenaCoordSeq {
                dim,
                values: vec![],
            },
            children: rings,
            owned: false,
        }))
    }

    fn create_empty_polygon(&self) -> EngineResult<GeomHandle> {
        Ok(self.insert(Node {
            type_id: type_id::POLYGON,
            dim: Dimension::XY,
            coords: ArenaCoordSeq {
                dim: Dimension::XY,
                values: vec![],
            },
            children: vec![],
            owned: false,
        }))
    }

    fn create_collection(&self, type_id: i32, geoms: &[GeomHandle]) -> EngineResult<GeomHandle> {
        let allowed = collection_members(type_id)?;
        let dim = self.check_consumable(geoms, allowed)?;
        Ok(self.adopt(Node {
            type_id,
            dim,
            coords: ArenaCoordSeq {
                dim,
                values: vec![],
            },
            children: geoms.to_vec(),
            owned: false,
        }))
    }

    fn destroy(&self, geom: GeomHandle) {
        let mut nodes = self.nodes.borrow_mut();
        match nodes.get(&geom.as_raw()) {
            Some(node) if node.owned => {
                log::warn!(
                    "Refusing to destroy geometry {} owned by another geometry",
                    geom.as_raw()
                );
            }
            Some(_) => {
                let mut stack = vec![geom];
                while let Some(handle) = stack.pop() {
                    if let Some(node) = nodes.remove(&handle.as_raw()) {
                        stack.extend(node.children);
                    }
                }
            }
            None => log::warn!("Destroying unknown geometry handle {}", geom.as_raw()),
        }
    }
}

//! A [`GeometryEngine`] backed by GEOS through the `geos` crate.
//!
//! GEOS hands out rings and members as [`geos::ConstGeometry`] values borrowing their parent, so
//! they can't be stored next to it. Borrowed handles instead record their path from an owned
//! root geometry and are resolved again on every access.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;

use geos::{CoordSeq, Geom, Geometry, GeometryTypes};
use log::warn;

use crate::datatypes::Dimension;
use crate::engine::arena::collection_members;
use crate::engine::{type_id, EngineError, EngineResult, GeomHandle, GeometryEngine};

impl From<geos::Error> for EngineError {
    fn from(err: geos::Error) -> Self {
        EngineError::new(err.to_string())
    }
}

/// The version of the GEOS library the engine is linked against.
pub fn geos_version() -> EngineResult<String> {
    Ok(geos::version()?)
}

fn type_id_of(geometry_type: GeometryTypes) -> EngineResult<i32> {
    match geometry_type {
        GeometryTypes::Point => Ok(type_id::POINT),
        GeometryTypes::LineString => Ok(type_id::LINESTRING),
        GeometryTypes::LinearRing => Ok(type_id::LINEARRING),
        GeometryTypes::Polygon => Ok(type_id::POLYGON),
        GeometryTypes::MultiPoint => Ok(type_id::MULTIPOINT),
        GeometryTypes::MultiLineString => Ok(type_id::MULTILINESTRING),
        GeometryTypes::MultiPolygon => Ok(type_id::MULTIPOLYGON),
        GeometryTypes::GeometryCollection => Ok(type_id::GEOMETRYCOLLECTION),
        other => Err(EngineError::new(format!(
            "Unsupported GEOS geometry type {other:?}"
        ))),
    }
}

/// The queries the engine runs on a resolved geometry, owned or borrowed.
trait Inspect {
    fn kind(&self) -> EngineResult<i32>;
    fn three_d(&self) -> EngineResult<bool>;
    fn empty(&self) -> EngineResult<bool>;
    fn interior_count(&self) -> EngineResult<usize>;
    fn part_count(&self) -> EngineResult<usize>;
    fn sequence(&self) -> EngineResult<CoordSeq>;
}

impl<G: Geom> Inspect for G {
    fn kind(&self) -> EngineResult<i32> {
        type_id_of(self.geometry_type())
    }

    fn three_d(&self) -> EngineResult<bool> {
        Ok(self.has_z()?)
    }

    fn empty(&self) -> EngineResult<bool> {
        Ok(Geom::is_empty(self)?)
    }

    fn interior_count(&self) -> EngineResult<usize> {
        Ok(self.get_num_interior_rings()?)
    }

    fn part_count(&self) -> EngineResult<usize> {
        Ok(self.get_num_geometries()?)
    }

    fn sequence(&self) -> EngineResult<CoordSeq> {
        match self.kind()? {
            type_id::POINT | type_id::LINESTRING | type_id::LINEARRING => {
                Ok(self.get_coord_seq()?)
            }
            id => Err(EngineError::new(format!(
                "Geometry of type id {id} has no coordinate sequence"
            ))),
        }
    }
}

/// One step from a geometry to a borrowed part of it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Part {
    Exterior,
    Interior(usize),
    Member(usize),
}

fn walk<G: Geom, R>(
    geom: &G,
    path: &[Part],
    f: &mut dyn FnMut(&dyn Inspect) -> EngineResult<R>,
) -> EngineResult<R> {
    let Some((part, rest)) = path.split_first() else {
        return f(geom);
    };
    match *part {
        Part::Exterior => {
            if geom.kind()? != type_id::POLYGON || geom.empty()? {
                return Err(EngineError::new(
                    "Only a non-empty polygon has an exterior ring",
                ));
            }
            walk(&geom.get_exterior_ring()?, rest, f)
        }
        Part::Interior(n) => {
            if n >= geom.interior_count()? {
                return Err(EngineError::new(format!("Ring index {n} out of range")));
            }
            let index = n
                .try_into()
                .map_err(|_| EngineError::new(format!("Ring index {n} out of range")))?;
            walk(&geom.get_interior_ring_n(index)?, rest, f)
        }
        Part::Member(n) => {
            let is_collection = matches!(
                geom.kind()?,
                type_id::MULTIPOINT
                    | type_id::MULTILINESTRING
                    | type_id::MULTIPOLYGON
                    | type_id::GEOMETRYCOLLECTION
            );
            if !is_collection || n >= geom.part_count()? {
                return Err(EngineError::new(format!("Child index {n} out of range")));
            }
            walk(&geom.get_geometry_n(n)?, rest, f)
        }
    }
}

enum Slot {
    /// A geometry owned by the caller, with the handles already given out for its parts.
    Owned {
        geom: Geometry,
        parts: HashMap<Vec<Part>, u64>,
    },
    /// A part of an owned geometry.
    Borrowed { root: u64, path: Vec<Part> },
}

fn remove_root(slots: &mut HashMap<u64, Slot>, id: u64) {
    if let Some(Slot::Owned { parts, .. }) = slots.remove(&id) {
        for part in parts.into_values() {
            slots.remove(&part);
        }
    }
}

fn unknown(geom: GeomHandle) -> EngineError {
    EngineError::new(format!("Unknown geometry handle {}", geom.as_raw()))
}

/// A geometry engine creating and inspecting GEOS geometries.
///
/// Constructors that consume geometries hand clones to GEOS and drop the inputs only once GEOS
/// succeeded, so a failed constructor leaves its inputs with the caller.
#[derive(Default)]
pub struct GeosEngine {
    slots: RefCell<HashMap<u64, Slot>>,
    next_id: Cell<u64>,
}

impl GeosEngine {
    /// Create an empty engine.
    pub fn new() -> Self {
        Self::default()
    }

    /// The number of geometries owned by callers.
    pub fn live_count(&self) -> usize {
        self.slots
            .borrow()
            .values()
            .filter(|slot| matches!(slot, Slot::Owned { .. }))
            .count()
    }

    fn next_id(&self) -> u64 {
        let id = self.next_id.get();
        self.next_id.set(id + 1);
        id
    }

    /// Take ownership of a GEOS geometry.
    pub fn insert(&self, geom: Geometry) -> GeomHandle {
        let id = self.next_id();
        self.slots.borrow_mut().insert(
            id,
            Slot::Owned {
                geom,
                parts: HashMap::new(),
            },
        );
        GeomHandle::from_raw(id)
    }

    /// A copy of an owned geometry.
    pub fn to_geos(&self, geom: GeomHandle) -> EngineResult<Geometry> {
        match self.slots.borrow().get(&geom.as_raw()) {
            Some(Slot::Owned { geom, .. }) => Ok(geom.clone()),
            Some(Slot::Borrowed { .. }) => Err(EngineError::new(
                "Only geometries owned by the caller can be copied out",
            )),
            None => Err(unknown(geom)),
        }
    }

    fn locate(&self, geom: GeomHandle) -> EngineResult<(u64, Vec<Part>)> {
        match self.slots.borrow().get(&geom.as_raw()) {
            Some(Slot::Owned { .. }) => Ok((geom.as_raw(), vec![])),
            Some(Slot::Borrowed { root, path }) => Ok((*root, path.clone())),
            None => Err(unknown(geom)),
        }
    }

    fn resolve<R>(
        &self,
        root: u64,
        path: &[Part],
        f: &mut dyn FnMut(&dyn Inspect) -> EngineResult<R>,
    ) -> EngineResult<R> {
        let slots = self.slots.borrow();
        match slots.get(&root) {
            Some(Slot::Owned { geom, .. }) => walk(geom, path, f),
            _ => Err(EngineError::new(format!(
                "Parent geometry {root} was destroyed"
            ))),
        }
    }

    fn inspect<R>(
        &self,
        geom: GeomHandle,
        mut f: impl FnMut(&dyn Inspect) -> EngineResult<R>,
    ) -> EngineResult<R> {
        let (root, path) = self.locate(geom)?;
        self.resolve(root, &path, &mut f)
    }

    /// A borrowed handle for `part` of `parent`. Asking twice gives the same handle.
    fn part(&self, parent: GeomHandle, part: Part) -> EngineResult<GeomHandle> {
        let (root, mut path) = self.locate(parent)?;
        path.push(part);
        self.resolve(root, &path, &mut |_| Ok(()))?;

        let mut slots = self.slots.borrow_mut();
        if let Some(Slot::Owned { parts, .. }) = slots.get(&root) {
            if let Some(id) = parts.get(&path) {
                return Ok(GeomHandle::from_raw(*id));
            }
        }
        let id = self.next_id();
        if let Some(Slot::Owned { parts, .. }) = slots.get_mut(&root) {
            parts.insert(path.clone(), id);
        }
        slots.insert(id, Slot::Borrowed { root, path });
        Ok(GeomHandle::from_raw(id))
    }

    /// Copies of the owned geometries `geoms`, after checking they can be consumed.
    fn take(&self, geoms: &[GeomHandle], allowed: &[i32]) -> EngineResult<Vec<Geometry>> {
        let slots = self.slots.borrow();
        let mut taken = Vec::with_capacity(geoms.len());
        for (i, handle) in geoms.iter().enumerate() {
            if geoms[..i].contains(handle) {
                return Err(EngineError::new("The same geometry was passed twice"));
            }
            let geom = match slots.get(&handle.as_raw()) {
                Some(Slot::Owned { geom, .. }) => geom,
                Some(Slot::Borrowed { .. }) => {
                    return Err(EngineError::new(
                        "Geometry is already owned by another geometry",
                    ))
                }
                None => return Err(unknown(*handle)),
            };
            let kind = geom.kind()?;
            if !allowed.contains(&kind) {
                return Err(EngineError::new(format!(
                    "Unexpected child geometry of type id {kind}"
                )));
            }
            taken.push(geom.clone());
        }
        Ok(taken)
    }

    /// Drop geometries whose copies now belong to a new parent.
    fn release(&self, geoms: &[GeomHandle]) {
        let mut slots = self.slots.borrow_mut();
        for geom in geoms {
            remove_root(&mut slots, geom.as_raw());
        }
    }
}

impl GeometryEngine for GeosEngine {
    type CoordSeq = CoordSeq;

    fn type_id(&self, geom: GeomHandle) -> EngineResult<i32> {
        self.inspect(geom, |g| g.kind())
    }

    fn coordinate_dimension(&self, geom: GeomHandle) -> EngineResult<i32> {
        self.inspect(geom, |g| Ok(if g.three_d()? { 3 } else { 2 }))
    }

    fn is_empty(&self, geom: GeomHandle) -> EngineResult<bool> {
        self.inspect(geom, |g| g.empty())
    }

    fn coord_seq_size(&self, geom: GeomHandle) -> EngineResult<usize> {
        self.inspect(geom, |g| Ok(g.sequence()?.size()?))
    }

    fn coord_seq_dimensions(&self, geom: GeomHandle) -> EngineResult<usize> {
        self.inspect(geom, |g| {
            g.sequence()?;
            Ok(if g.three_d()? { 3 } else { 2 })
        })
    }

    fn copy_coords(
        &self,
        geom: GeomHandle,
        has_z: bool,
        has_m: bool,
        out: &mut [f64],
    ) -> EngineResult<()> {
        self.inspect(geom, |g| {
            let seq = g.sequence()?;
            let n_coords = seq.size()?;
            let source_z = g.three_d()?;
            let stride = Dimension::from_flags(has_z, has_m).size();
            if out.len() < n_coords * stride {
                return Err(EngineError::new(format!(
                    "Output buffer of {} values is too small for {n_coords} coordinates",
                    out.len()
                )));
            }

            for (i, dst) in out.chunks_exact_mut(stride).take(n_coords).enumerate() {
                dst[0] = seq.get_x(i)?;
                dst[1] = seq.get_y(i)?;
                if has_z {
                    dst[2] = if source_z { seq.get_z(i)? } else { f64::NAN };
                }
                // GEOS geometries carry no M ordinate here
                if has_m {
                    dst[stride - 1] = f64::NAN;
                }
            }
            Ok(())
        })
    }

    fn exterior_ring(&self, geom: GeomHandle) -> EngineResult<GeomHandle> {
        self.part(geom, Part::Exterior)
    }

    fn num_interior_rings(&self, geom: GeomHandle) -> EngineResult<usize> {
        self.inspect(geom, |g| match g.kind()? {
            type_id::POLYGON => g.interior_count(),
            id => Err(EngineError::new(format!(
                "Geometry of type id {id} is not a polygon"
            ))),
        })
    }

    fn interior_ring_n(&self, geom: GeomHandle, n: usize) -> EngineResult<GeomHandle> {
        self.part(geom, Part::Interior(n))
    }

    fn num_geometries(&self, geom: GeomHandle) -> EngineResult<usize> {
        self.inspect(geom, |g| g.part_count())
    }

    fn geometry_n(&self, geom: GeomHandle, n: usize) -> EngineResult<GeomHandle> {
        self.part(geom, Part::Member(n))
    }

    fn coord_seq_from_buffer(
        &self,
        values: &[f64],
        n_coords: usize,
        has_z: bool,
        has_m: bool,
    ) -> EngineResult<CoordSeq> {
        let dim = Dimension::from_flags(has_z, has_m);
        let n_values = n_coords * dim.size();
        if values.len() < n_values {
            return Err(EngineError::new(format!(
                "Buffer of {} values is too small for {n_coords} {dim} coordinates",
                values.len()
            )));
        }
        Ok(CoordSeq::new_from_buffer(
            &values[..n_values],
            n_coords,
            has_z,
            has_m,
        )?)
    }

    fn coord_seq_from_arrays(
        &self,
        x: &[f64],
        y: &[f64],
        z: Option<&[f64]>,
        m: Option<&[f64]>,
    ) -> EngineResult<CoordSeq> {
        let n_coords = x.len();
        let lengths_match = y.len() == n_coords
            && z.map_or(true, |z| z.len() == n_coords)
            && m.map_or(true, |m| m.len() == n_coords);
        if !lengths_match {
            return Err(EngineError::new("Ordinate arrays differ in length"));
        }
        Ok(CoordSeq::new_from_arrays(x, y, z, m)?)
    }

    fn create_point(&self, seq: CoordSeq) -> EngineResult<GeomHandle> {
        Ok(self.insert(Geometry::create_point(seq)?))
    }

    fn create_line_string(&self, seq: CoordSeq) -> EngineResult<GeomHandle> {
        Ok(self.insert(Geometry::create_line_string(seq)?))
    }

    fn create_linear_ring(&self, seq: CoordSeq) -> EngineResult<GeomHandle> {
        Ok(self.insert(Geometry::create_linear_ring(seq)?))
    }

    fn create_polygon(&self, shell: GeomHandle, holes: &[GeomHandle]) -> EngineResult<GeomHandle> {
        let mut rings = Vec::with_capacity(holes.len() + 1);
        rings.push(shell);
        rings.extend_from_slice(holes);
        let mut taken = self.take(&rings, &[type_id::LINEARRING])?;
        let exterior = taken.remove(0);
        let polygon = Geometry::create_polygon(exterior, taken)?;
        self.release(&rings);
        Ok(self.insert(polygon))
    }

    fn create_empty_polygon(&self) -> EngineResult<GeomHandle> {
        Ok(self.insert(Geometry::create_empty_polygon()?))
    }

    fn create_collection(&self, type_id: i32, geoms: &[GeomHandle]) -> EngineResult<GeomHandle> {
        let taken = self.take(geoms, collection_members(type_id)?)?;
        let collection = match type_id {
            type_id::MULTIPOINT => Geometry::create_multipoint(taken)?,
            type_id::MULTILINESTRING => Geometry::create_multiline_string(taken)?,
            type_id::MULTIPOLYGON => Geometry::create_multipolygon(taken)?,
            _ => Geometry::create_geometry_collection(taken)?,
        };
        self.release(geoms);
        Ok(self.insert(collection))
    }

    fn destroy(&self, geom: GeomHandle) {
        let mut slots = self.slots.borrow_mut();
        let owned = match slots.get(&geom.as_raw()) {
            Some(Slot::Owned { .. }) => true,
            Some(Slot::Borrowed { .. }) => {
                warn!(
                    "Refusing to destroy geometry {} borrowed from its parent",
                    geom.as_raw()
                );
                false
            }
            None => {
                warn!("Refusing to destroy unknown geometry {}", geom.as_raw());
                false
            }
        };
        if owned {
            remove_root(&mut slots, geom.as_raw());
        }
    }
}

#[cfg(test)]
mod test {
    use arrow_array::StringArray;

    use super::*;
    use crate::datatypes::{CoordType, GeoDataType};
    use crate::reader::ArrayReader;
    use crate::writer::ArrayWriter;

    const POLYGON: &str = "POLYGON ((-111 45, -111 41, -104 41, -104 45, -111 45), \
                           (-110 44, -110 42, -105 42, -105 44, -110 44))";

    fn insert_wkt(engine: &GeosEngine, wkt: &str) -> GeomHandle {
        engine.insert(Geometry::new_from_wkt(wkt).unwrap())
    }

    fn assert_same(engine: &GeosEngine, a: GeomHandle, b: GeomHandle) {
        let (a, b) = (engine.to_geos(a).unwrap(), engine.to_geos(b).unwrap());
        assert!(a.equals_exact(&b, 0.0).unwrap());
    }

    #[test]
    fn round_trip_every_encoding() {
        let engine = GeosEngine::new();
        let geoms = vec![
            Some(insert_wkt(&engine, POLYGON)),
            None,
            Some(insert_wkt(&engine, "POLYGON EMPTY")),
        ];

        for data_type in [
            GeoDataType::WKT,
            GeoDataType::LargeWKT,
            GeoDataType::WKB,
            GeoDataType::Polygon(CoordType::Separated, Dimension::XY),
            GeoDataType::Polygon(CoordType::Interleaved, Dimension::XY),
        ] {
            let mut writer = ArrayWriter::new(&engine, data_type).unwrap();
            assert_eq!(writer.append(&geoms).unwrap(), 3);
            let array = writer.finish().unwrap();

            let mut reader = ArrayReader::new(&engine, data_type).unwrap();
            let read = reader.read(array.as_ref(), 0, 3).unwrap();
            assert!(read[1].is_none());
            for i in [0, 2] {
                assert_same(&engine, geoms[i].unwrap(), read[i].unwrap());
                engine.destroy(read[i].unwrap());
            }
        }
        assert_eq!(engine.live_count(), 2);
    }

    #[test]
    fn round_trip_xyz() {
        let engine = GeosEngine::new();
        let point = insert_wkt(&engine, "POINT Z (1 2 3)");
        for data_type in [
            GeoDataType::WKB,
            GeoDataType::Point(CoordType::Separated, Dimension::XYZ),
        ] {
            let mut writer = ArrayWriter::new(&engine, data_type).unwrap();
            writer.append(&[Some(point)]).unwrap();
            let array = writer.finish().unwrap();

            let mut reader = ArrayReader::new(&engine, data_type).unwrap();
            let read = reader.read(array.as_ref(), 0, 1).unwrap()[0].unwrap();
            assert_eq!(engine.coordinate_dimension(read).unwrap(), 3);
            let mut coords = [0.0; 3];
            engine.copy_coords(read, true, false, &mut coords).unwrap();
            assert_eq!(coords, [1., 2., 3.]);
            engine.destroy(read);
        }
    }

    #[test]
    fn parts_are_borrowed() {
        let engine = GeosEngine::new();
        let polygon = insert_wkt(&engine, POLYGON);
        let shell = engine.exterior_ring(polygon).unwrap();
        assert_eq!(engine.exterior_ring(polygon).unwrap(), shell);
        assert_eq!(engine.type_id(shell).unwrap(), type_id::LINEARRING);
        assert_eq!(engine.coord_seq_size(shell).unwrap(), 5);
        assert_eq!(engine.num_interior_rings(polygon).unwrap(), 1);
        assert!(engine.interior_ring_n(polygon, 1).is_err());

        // Borrowed parts can't be destroyed or consumed
        engine.destroy(shell);
        assert_eq!(engine.type_id(shell).unwrap(), type_id::LINEARRING);
        assert!(engine.create_polygon(shell, &[]).is_err());

        engine.destroy(polygon);
        assert!(engine.type_id(shell).is_err());
        assert_eq!(engine.live_count(), 0);
    }

    #[test]
    fn failed_constructors_keep_ownership() {
        let engine = GeosEngine::new();
        let seq = engine
            .coord_seq_from_buffer(&[0., 0., 1., 0., 1., 1., 0., 1.], 4, false, false)
            .unwrap();
        assert!(engine.create_linear_ring(seq).is_err());
        assert_eq!(engine.live_count(), 0);

        let line = insert_wkt(&engine, "LINESTRING (0 0, 1 1)");
        assert!(engine.create_collection(type_id::MULTIPOINT, &[line]).is_err());
        assert!(engine.create_polygon(line, &[]).is_err());
        assert!(engine
            .create_collection(type_id::MULTILINESTRING, &[line, line])
            .is_err());
        assert_eq!(engine.type_id(line).unwrap(), type_id::LINESTRING);

        let multi = engine
            .create_collection(type_id::MULTILINESTRING, &[line])
            .unwrap();
        assert_eq!(engine.live_count(), 1);
        assert!(engine.type_id(line).is_err());
        assert_eq!(engine.num_geometries(multi).unwrap(), 1);
    }

    #[test]
    fn copy_coords_pads_missing_ordinates() {
        let engine = GeosEngine::new();
        let point = insert_wkt(&engine, "POINT (1 2)");
        let mut out = [0.0; 4];
        engine.copy_coords(point, true, true, &mut out).unwrap();
        assert_eq!(out[..2], [1., 2.]);
        assert!(out[2].is_nan());
        assert!(out[3].is_nan());
        assert!(engine.copy_coords(point, true, true, &mut out[..3]).is_err());
    }

    #[test]
    fn failed_reads_leak_nothing() {
        let engine = GeosEngine::new();
        // The second ring is not closed
        let array = StringArray::from(vec![
            "POLYGON ((0 0, 1 0, 1 1, 0 0))",
            "POLYGON ((0 0, 1 0, 1 1, 0 0), (0 0, 1 0, 1 1, 0 1))",
        ]);
        let mut reader = ArrayReader::new(&engine, GeoDataType::WKT).unwrap();
        assert!(reader.read(&array, 0, 2).is_err());
        assert!(!reader.last_error().is_empty());
        assert_eq!(engine.live_count(), 0);
    }

    #[test]
    fn reports_versions() {
        assert!(geos_version().unwrap().starts_with('3'));
        assert_eq!(crate::version(), env!("CARGO_PKG_VERSION"));
    }
}

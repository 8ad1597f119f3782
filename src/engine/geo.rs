//! Conversion between [`geo`] geometries and [`ArenaEngine`] geometries.

use geo::{
    Coord, Geometry, GeometryCollection, LineString, MultiLineString, MultiPoint, MultiPolygon,
    Point, Polygon,
};

use crate::engine::arena::ArenaEngine;
use crate::engine::{type_id, EngineError, EngineResult, GeomHandle, GeometryEngine};

impl ArenaEngine {
    /// Insert a 2D [`geo::Geometry`], returning an owned handle.
    ///
    /// Lines, rectangles and triangles are stored as LineStrings and Polygons.
    pub fn insert_geo(&self, geom: &Geometry) -> EngineResult<GeomHandle> {
        match geom {
            Geometry::Point(point) => self.insert_coords(type_id::POINT, &[point.0]),
            Geometry::Line(line) => {
                self.insert_coords(type_id::LINESTRING, &[line.start, line.end])
            }
            Geometry::LineString(line_string) => {
                self.insert_coords(type_id::LINESTRING, &line_string.0)
            }
            Geometry::Polygon(polygon) => self.insert_polygon(polygon),
            Geometry::MultiPoint(multi_point) => self.insert_parts(
                type_id::MULTIPOINT,
                multi_point.iter().map(|p| Geometry::Point(*p)),
            ),
            Geometry::MultiLineString(multi_line_string) => self.insert_parts(
                type_id::MULTILINESTRING,
                multi_line_string
                    .iter()
                    .map(|ls| Geometry::LineString(ls.clone())),
            ),
            Geometry::MultiPolygon(multi_polygon) => self.insert_parts(
                type_id::MULTIPOLYGON,
                multi_polygon.iter().map(|p| Geometry::Polygon(p.clone())),
            ),
            Geometry::GeometryCollection(collection) => self.insert_parts(
                type_id::GEOMETRYCOLLECTION,
                collection.iter().cloned(),
            ),
            Geometry::Rect(rect) => self.insert_polygon(&rect.to_polygon()),
            Geometry::Triangle(triangle) => self.insert_polygon(&triangle.to_polygon()),
        }
    }

    fn insert_coords(&self, type_id: i32, coords: &[Coord]) -> EngineResult<GeomHandle> {
        let x: Vec<f64> = coords.iter().map(|c| c.x).collect();
        let y: Vec<f64> = coords.iter().map(|c| c.y).collect();
        let seq = self.coord_seq_from_arrays(&x, &y, None, None)?;
        match type_id {
            type_id::POINT => self.create_point(seq),
            type_id::LINEARRING => self.create_linear_ring(seq),
            _ => self.create_line_string(seq),
        }
    }

    fn insert_polygon(&self, polygon: &Polygon) -> EngineResult<GeomHandle> {
        if polygon.exterior().0.is_empty() {
            return self.create_empty_polygon();
        }

        let mut rings = Vec::with_capacity(polygon.interiors().len() + 1);
        for ring in std::iter::once(polygon.exterior()).chain(polygon.interiors()) {
            match self.insert_coords(type_id::LINEARRING, &ring.0) {
                Ok(handle) => rings.push(handle),
                Err(err) => {
                    rings.iter().for_each(|r| self.destroy(*r));
                    return Err(err);
                }
            }
        }
        match self.create_polygon(rings[0], &rings[1..]) {
            Ok(handle) => Ok(handle),
            Err(err) => {
                rings.iter().for_each(|r| self.destroy(*r));
                Err(err)
            }
        }
    }

    fn insert_parts(
        &self,
        type_id: i32,
        parts: impl Iterator<Item = Geometry>,
    ) -> EngineResult<GeomHandle> {
        let mut handles = vec![];
        for part in parts {
            match self.insert_geo(&part) {
                Ok(handle) => handles.push(handle),
                Err(err) => {
                    handles.iter().for_each(|h| self.destroy(*h));
                    return Err(err);
                }
            }
        }
        match self.create_collection(type_id, &handles) {
            Ok(handle) => Ok(handle),
            Err(err) => {
                handles.iter().for_each(|h| self.destroy(*h));
                Err(err)
            }
        }
    }

    /// Convert a geometry back into a 2D [`geo::Geometry`], dropping Z and M.
    ///
    /// Empty points have no `geo` representation and are an error.
    pub fn to_geo(&self, geom: GeomHandle) -> EngineResult<Geometry> {
        let result = match self.type_id(geom)? {
            type_id::POINT => {
                let coords = self.xy_coords(geom)?;
                let coord = coords
                    .first()
                    .ok_or_else(|| EngineError::new("Empty points cannot be converted to geo"))?;
                Geometry::Point(Point(*coord))
            }
            type_id::LINESTRING | type_id::LINEARRING => {
                Geometry::LineString(LineString::new(self.xy_coords(geom)?))
            }
            type_id::POLYGON => Geometry::Polygon(self.to_geo_polygon(geom)?),
            type_id::MULTIPOINT => {
                let points = self
                    .parts(geom)?
                    .into_iter()
                    .map(|part| match part {
                        Geometry::Point(p) => Ok(p),
                        _ => Err(EngineError::new("MultiPoint part is not a point")),
                    })
                    .collect::<EngineResult<Vec<_>>>()?;
                Geometry::MultiPoint(MultiPoint::new(points))
            }
            type_id::MULTILINESTRING => {
                let line_strings = self
                    .parts(geom)?
                    .into_iter()
                    .map(|part| match part {
                        Geometry::LineString(ls) => Ok(ls),
                        _ => Err(EngineError::new("MultiLineString part is not a linestring")),
                    })
                    .collect::<EngineResult<Vec<_>>>()?;
                Geometry::MultiLineString(MultiLineString::new(line_strings))
            }
            type_id::MULTIPOLYGON => {
                let polygons = self
                    .parts(geom)?
                    .into_iter()
                    .map(|part| match part {
                        Geometry::Polygon(p) => Ok(p),
                        _ => Err(EngineError::new("MultiPolygon part is not a polygon")),
                    })
                    .collect::<EngineResult<Vec<_>>>()?;
                Geometry::MultiPolygon(MultiPolygon::new(polygons))
            }
            type_id::GEOMETRYCOLLECTION => {
                Geometry::GeometryCollection(GeometryCollection::new_from(self.parts(geom)?))
            }
            id => {
                return Err(EngineError::new(format!(
                    "Unexpected geometry type id: {id}"
                )))
            }
        };
        Ok(result)
    }

    fn to_geo_polygon(&self, geom: GeomHandle) -> EngineResult<Polygon> {
        if self.is_empty(geom)? {
            return Ok(Polygon::new(LineString::new(vec![]), vec![]));
        }
        let exterior = LineString::new(self.xy_coords(self.exterior_ring(geom)?)?);
        let interiors = (0..self.num_interior_rings(geom)?)
            .map(|i| Ok(LineString::new(self.xy_coords(self.interior_ring_n(geom, i)?)?)))
            .collect::<EngineResult<Vec<_>>>()?;
        Ok(Polygon::new(exterior, interiors))
    }

    fn parts(&self, geom: GeomHandle) -> EngineResult<Vec<Geometry>> {
        (0..self.num_geometries(geom)?)
            .map(|i| self.to_geo(self.geometry_n(geom, i)?))
            .collect()
    }

    fn xy_coords(&self, geom: GeomHandle) -> EngineResult<Vec<Coord>> {
        let n = self.coord_seq_size(geom)?;
        let mut values = vec![0.0; n * 2];
        self.copy_coords(geom, false, false, &mut values)?;
        Ok(values
            .chunks_exact(2)
            .map(|xy| Coord { x: xy[0], y: xy[1] })
            .collect())
    }
}

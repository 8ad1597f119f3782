//! Parse WKT into engine geometries.

use std::str::FromStr;

use geo_traits::{
    CoordTrait, Dimensions, GeometryCollectionTrait, GeometryTrait, LineStringTrait,
    MultiLineStringTrait, MultiPointTrait, MultiPolygonTrait, PointTrait, PolygonTrait,
};
use wkt::Wkt;

use crate::datatypes::{Dimension, GeometryType};
use crate::engine::{create_from_values, type_id, GeomHandle, GeometryEngine};
use crate::error::{GeoArrowError, Result};
use crate::scratch::GeometryScratchPool;

fn dimension(dim: Dimensions) -> Result<Dimension> {
    match dim {
        Dimensions::Xy | Dimensions::Unknown(2) => Ok(Dimension::XY),
        Dimensions::Xyz | Dimensions::Unknown(3) => Ok(Dimension::XYZ),
        Dimensions::Xym => Ok(Dimension::XYM),
        Dimensions::Xyzm | Dimensions::Unknown(4) => Ok(Dimension::XYZM),
        Dimensions::Unknown(n) => Err(GeoArrowError::Wkt(format!(
            "Unsupported coordinate dimension: {n}"
        ))),
    }
}

fn push_coord(
    values: &mut Vec<f64>,
    coord: &impl CoordTrait<T = f64>,
    dim: Dimension,
) -> Result<()> {
    if dimension(coord.dim())? != dim {
        return Err(GeoArrowError::Wkt(
            "Coordinates of one geometry have mixed dimensions".to_string(),
        ));
    }
    for n in 0..dim.size() {
        let value = coord
            .nth(n)
            .ok_or_else(|| GeoArrowError::Wkt(format!("Missing ordinate {n}")))?;
        values.push(value);
    }
    Ok(())
}

/// Parse one WKT string into an engine geometry owned by the caller.
///
/// Intermediate parts are kept in `scratch` from `level` on, so they are destroyed with it on
/// failure.
pub fn read_wkt<E: GeometryEngine + ?Sized>(
    scratch: &mut GeometryScratchPool<'_, E>,
    level: usize,
    text: &str,
) -> Result<GeomHandle> {
    let wkt = Wkt::<f64>::from_str(text).map_err(|err| GeoArrowError::Wkt(err.to_string()))?;
    build(scratch, level, &wkt)
}

// The dimension comes from the geometry itself so that tagged empties such as `POINT Z EMPTY`
// keep their ordinates.
fn build_point<E: GeometryEngine + ?Sized>(
    engine: &E,
    point: &impl PointTrait<T = f64>,
) -> Result<GeomHandle> {
    let dim = dimension(point.dim())?;
    let mut values = Vec::with_capacity(dim.size());
    if let Some(coord) = point.coord() {
        push_coord(&mut values, &coord, dim)?;
    }
    create_from_values(engine, type_id::POINT, &values, dim)
}

fn build_line<E: GeometryEngine + ?Sized>(
    engine: &E,
    id: i32,
    line: &impl LineStringTrait<T = f64>,
) -> Result<GeomHandle> {
    let dim = dimension(line.dim())?;
    let mut values = Vec::with_capacity(line.num_coords() * dim.size());
    for coord in line.coords() {
        push_coord(&mut values, &coord, dim)?;
    }
    create_from_values(engine, id, &values, dim)
}

fn build_polygon<E: GeometryEngine + ?Sized>(
    scratch: &mut GeometryScratchPool<'_, E>,
    level: usize,
    polygon: &impl PolygonTrait<T = f64>,
) -> Result<GeomHandle> {
    let engine = scratch.engine();
    if let Some(shell) = polygon.exterior() {
        let ring = build_line(engine, type_id::LINEARRING, &shell)?;
        scratch.push(level, ring);
        for hole in polygon.interiors() {
            let ring = build_line(engine, type_id::LINEARRING, &hole)?;
            scratch.push(level, ring);
        }
    }
    scratch.finish_polygon(level)
}

fn build<E: GeometryEngine + ?Sized>(
    scratch: &mut GeometryScratchPool<'_, E>,
    level: usize,
    geom: &impl GeometryTrait<T = f64>,
) -> Result<GeomHandle> {
    use geo_traits::GeometryType::*;

    let engine = scratch.engine();
    match geom.as_type() {
        Point(point) => build_point(engine, point),
        LineString(line_string) => build_line(engine, type_id::LINESTRING, line_string),
        Polygon(polygon) => build_polygon(scratch, level, polygon),
        MultiPoint(multi_point) => {
            for point in multi_point.points() {
                let part = build_point(engine, &point)?;
                scratch.push(level, part);
            }
            scratch.finish_collection(level, GeometryType::MultiPoint)
        }
        MultiLineString(multi_line_string) => {
            for line_string in multi_line_string.line_strings() {
                let part = build_line(engine, type_id::LINESTRING, &line_string)?;
                scratch.push(level, part);
            }
            scratch.finish_collection(level, GeometryType::MultiLineString)
        }
        MultiPolygon(multi_polygon) => {
            for polygon in multi_polygon.polygons() {
                let part = build_polygon(scratch, level + 1, &polygon)?;
                scratch.push(level, part);
            }
            scratch.finish_collection(level, GeometryType::MultiPolygon)
        }
        GeometryCollection(collection) => {
            for child in collection.geometries() {
                let part = build(scratch, level + 1, &child)?;
                scratch.push(level, part);
            }
            scratch.finish_collection(level, GeometryType::GeometryCollection)
        }
        Rect(_) | Triangle(_) | Line(_) => Err(GeoArrowError::NotSupported(
            "Rect, Triangle and Line geometries are not supported".to_string(),
        )),
    }
}

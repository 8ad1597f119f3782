//! Parse WKB into engine geometries.

use std::io::Cursor;

use byteorder::{BigEndian, LittleEndian, ReadBytesExt};

use crate::datatypes::{Dimension, GeometryType};
use crate::engine::{create_from_values, type_id, GeomHandle, GeometryEngine};
use crate::error::{GeoArrowError, Result};
use crate::io::wkb::common::{Endianness, WkbType};
use crate::scratch::GeometryScratchPool;

struct WkbCursor<'a> {
    reader: Cursor<&'a [u8]>,
    byte_order: Endianness,
}

impl<'a> WkbCursor<'a> {
    fn remaining(&self) -> usize {
        let len = self.reader.get_ref().len() as u64;
        len.saturating_sub(self.reader.position()) as usize
    }

    fn read_byte_order(&mut self) -> Result<()> {
        let byte = self.reader.read_u8()?;
        self.byte_order = Endianness::try_from(byte)
            .map_err(|_| GeoArrowError::Wkb(format!("Invalid byte order marker {byte}")))?;
        Ok(())
    }

    fn read_u32(&mut self) -> Result<u32> {
        let value = match self.byte_order {
            Endianness::BigEndian => self.reader.read_u32::<BigEndian>()?,
            Endianness::LittleEndian => self.reader.read_u32::<LittleEndian>()?,
        };
        Ok(value)
    }

    fn read_count(&mut self, item_size: usize) -> Result<usize> {
        let count = self.read_u32()? as usize;
        // Every item takes at least `item_size` bytes
        if count.saturating_mul(item_size) > self.remaining() {
            return Err(GeoArrowError::Wkb(format!(
                "Count {count} exceeds the remaining {} bytes",
                self.remaining()
            )));
        }
        Ok(count)
    }

    fn read_coords(&mut self, n_coords: usize, dim: Dimension) -> Result<Vec<f64>> {
        let n_values = n_coords * dim.size();
        let mut values = vec![0.0; n_values];
        match self.byte_order {
            Endianness::BigEndian => self.reader.read_f64_into::<BigEndian>(&mut values)?,
            Endianness::LittleEndian => self.reader.read_f64_into::<LittleEndian>(&mut values)?,
        }
        Ok(values)
    }
}

/// Parse one WKB geometry into an engine geometry owned by the caller.
///
/// Both byte orders are accepted, as are ISO dimension codes and EWKB Z/M/SRID flags. A point
/// whose ordinates are all NaN is read as an empty point. Intermediate parts are kept in `scratch`
/// from `level` on, so they are destroyed with it on failure.
pub fn read_wkb<E: GeometryEngine + ?Sized>(
    scratch: &mut GeometryScratchPool<'_, E>,
    level: usize,
    buf: &[u8],
) -> Result<GeomHandle> {
    let mut cursor = WkbCursor {
        reader: Cursor::new(buf),
        byte_order: Endianness::LittleEndian,
    };
    read_geometry(scratch, level, &mut cursor)
}

fn read_geometry<E: GeometryEngine + ?Sized>(
    scratch: &mut GeometryScratchPool<'_, E>,
    level: usize,
    cursor: &mut WkbCursor,
) -> Result<GeomHandle> {
    cursor.read_byte_order()?;
    let wkb_type = WkbType::decode(cursor.read_u32()?)?;
    if wkb_type.has_srid {
        cursor.read_u32()?;
    }
    let dim = wkb_type.dim;
    let engine = scratch.engine();

    match wkb_type.geometry_type {
        GeometryType::Point => {
            let values = cursor.read_coords(1, dim)?;
            let values = if values.iter().all(|v| v.is_nan()) {
                &values[..0]
            } else {
                &values[..]
            };
            create_from_values(engine, type_id::POINT, values, dim)
        }
        GeometryType::LineString => {
            let n_coords = cursor.read_count(dim.size() * 8)?;
            let values = cursor.read_coords(n_coords, dim)?;
            create_from_values(engine, type_id::LINESTRING, &values, dim)
        }
        GeometryType::Polygon => {
            let n_rings = cursor.read_count(4)?;
            for _ in 0..n_rings {
                let n_coords = cursor.read_count(dim.size() * 8)?;
                let values = cursor.read_coords(n_coords, dim)?;
                let ring = create_from_values(engine, type_id::LINEARRING, &values, dim)?;
                scratch.push(level, ring);
            }
            scratch.finish_polygon(level)
        }
        geometry_type @ (GeometryType::MultiPoint
        | GeometryType::MultiLineString
        | GeometryType::MultiPolygon
        | GeometryType::GeometryCollection) => {
            let n_parts = cursor.read_count(5)?;
            for _ in 0..n_parts {
                let part = read_geometry(scratch, level + 1, cursor)?;
                scratch.push(level, part);
            }
            scratch.finish_collection(level, geometry_type)
        }
        GeometryType::Geometry => Err(GeoArrowError::Wkb(
            "Unsupported WKB geometry type code 0".to_string(),
        )),
    }
}

#[cfg(test)]
mod test {
    use byteorder::WriteBytesExt;

    use super::*;
    use crate::engine::ArenaEngine;
    use crate::test::{multipoint, polygon};

    fn read(engine: &ArenaEngine, buf: &[u8]) -> Result<GeomHandle> {
        let mut scratch = GeometryScratchPool::new(engine);
        read_wkb(&mut scratch, 0, buf)
    }

    #[test]
    fn big_endian_point_z() {
        let mut buf = vec![0];
        buf.write_u32::<BigEndian>(1001).unwrap();
        for v in [1., 2., 3.] {
            buf.write_f64::<BigEndian>(v).unwrap();
        }

        let engine = ArenaEngine::new();
        let point = read(&engine, &buf).unwrap();
        assert_eq!(engine.coordinate_dimension(point).unwrap(), 3);
        let mut out = [0.; 3];
        engine.copy_coords(point, true, false, &mut out).unwrap();
        assert_eq!(out, [1., 2., 3.]);
    }

    #[test]
    fn ewkb_with_srid() {
        let mut buf = vec![1];
        buf.write_u32::<LittleEndian>(0x2000_0001).unwrap();
        buf.write_u32::<LittleEndian>(4326).unwrap();
        buf.write_f64::<LittleEndian>(0.).unwrap();
        buf.write_f64::<LittleEndian>(1.).unwrap();

        let engine = ArenaEngine::new();
        let point = read(&engine, &buf).unwrap();
        let expected = engine.insert_geo(&crate::test::point::p0().into()).unwrap();
        assert!(engine.equals_exact(point, expected));
    }

    #[test]
    fn nan_point_is_empty() {
        let mut buf = vec![1];
        buf.write_u32::<LittleEndian>(1).unwrap();
        buf.write_f64::<LittleEndian>(f64::NAN).unwrap();
        buf.write_f64::<LittleEndian>(f64::NAN).unwrap();

        let engine = ArenaEngine::new();
        let point = read(&engine, &buf).unwrap();
        assert!(engine.is_empty(point).unwrap());
    }

    #[test]
    fn nested_geometries() {
        use crate::io::wkb::WkbWriter;
        use crate::writer::visit_geometries;
        use arrow_array::cast::AsArray;
        use arrow_array::Array;

        let engine = ArenaEngine::new();
        let geoms = vec![
            Some(engine.insert_geo(&polygon::p1().into()).unwrap()),
            Some(engine.insert_geo(&multipoint::mp0().into()).unwrap()),
            Some(
                engine
                    .insert_geo(&geo::Geometry::GeometryCollection(geo::GeometryCollection(
                        vec![polygon::p0().into(), multipoint::mp1().into()],
                    )))
                    .unwrap(),
            ),
        ];
        let mut writer = WkbWriter::<i32>::new();
        let mut coords = crate::coord::CoordScratch::new();
        visit_geometries(&engine, &mut coords, &geoms, &mut writer).unwrap();
        let array = writer.finish().unwrap();
        let array = array.as_binary::<i32>();
        assert_eq!(array.len(), 3);

        for (i, expected) in geoms.iter().enumerate() {
            let geom = read(&engine, array.value(i)).unwrap();
            assert!(engine.equals_exact(geom, expected.unwrap()));
        }
    }

    #[test]
    fn truncated_input_leaks_nothing() {
        let engine = ArenaEngine::new();
        let expected = engine.insert_geo(&polygon::p1().into()).unwrap();

        let mut writer = crate::io::wkb::WkbWriter::<i32>::new();
        let mut coords = crate::coord::CoordScratch::new();
        crate::writer::visit_geometries(&engine, &mut coords, &[Some(expected)], &mut writer)
            .unwrap();
        let array = writer.finish().unwrap();
        let wkb = arrow_array::cast::AsArray::as_binary::<i32>(array.as_ref())
            .value(0)
            .to_vec();
        engine.destroy(expected);

        // Cut inside the second ring
        let cut = wkb.len() - 10;
        assert!(read(&engine, &wkb[..cut]).is_err());
        assert_eq!(engine.live_count(), 0);

        let mut bad_order = wkb.clone();
        bad_order[0] = 7;
        assert!(read(&engine, &bad_order).is_err());
        assert_eq!(engine.live_count(), 0);
    }
}

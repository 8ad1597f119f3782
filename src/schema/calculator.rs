//! Infer a GeoArrow data type from the geometries a caller is about to write.

use log::debug;

use crate::datatypes::{CoordType, Dimension, GeoDataType, GeometryType};
use crate::engine::{wkb_type_code, GeomHandle, GeometryEngine};
use crate::error::{GeoArrowError, Result};
use crate::schema::{decode_wkb_type, native_type, Encoding};

/// Infers the narrowest GeoArrow type able to hold a population of geometries.
///
/// Geometry kinds collapse to their multi type when both are seen and dimensions only ever
/// widen. Populations that no native type can hold are stored as WKB.
#[derive(Debug, Clone, Default)]
pub struct SchemaCalculator {
    /// Bit `n` is set when geometry type `n` has been seen.
    kinds: u8,
    has_z: bool,
    has_m: bool,
}

impl SchemaCalculator {
    /// Create a calculator that has seen no geometries.
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether nothing has been ingested yet.
    pub fn is_empty(&self) -> bool {
        self.kinds == 0
    }

    /// Ingest ISO WKB type codes.
    ///
    /// Codes are validated before any of them is recorded.
    pub fn ingest(&mut self, wkb_types: &[u32]) -> Result<()> {
        let decoded = wkb_types
            .iter()
            .map(|wkb_type| decode_wkb_type(*wkb_type))
            .collect::<Result<Vec<_>>>()?;
        for (geometry_type, dim) in decoded {
            self.kinds |= 1 << u32::from(geometry_type);
            self.has_z |= dim.has_z();
            self.has_m |= dim.has_m();
        }
        Ok(())
    }

    /// Ingest the type codes of engine geometries. `None` entries are skipped.
    pub fn ingest_geometries<E: GeometryEngine + ?Sized>(
        &mut self,
        engine: &E,
        geoms: &[Option<GeomHandle>],
    ) -> Result<()> {
        let mut wkb_types = Vec::with_capacity(geoms.len());
        for (i, geom) in geoms.iter().enumerate() {
            if let Some(geom) = geom {
                wkb_types.push(wkb_type_code(engine, *geom).map_err(|err| err.at_row(i))?);
            }
        }
        self.ingest(&wkb_types)
    }

    /// The single native geometry type able to hold every ingested kind, if any.
    fn geometry_type(&self) -> Option<GeometryType> {
        let single = |typ: GeometryType| 1u8 << u32::from(typ);
        [
            GeometryType::Point,
            GeometryType::LineString,
            GeometryType::Polygon,
            GeometryType::MultiPoint,
            GeometryType::MultiLineString,
            GeometryType::MultiPolygon,
        ]
        .into_iter()
        .find_map(|typ| {
            if self.kinds == single(typ) {
                return Some(typ);
            }
            let simple = typ.simple_type()?;
            let mask = single(simple) | single(typ);
            (self.kinds & !mask == 0).then_some(typ)
        })
    }

    /// The type to store the ingested population with `encoding`.
    pub fn finish(&self, encoding: Encoding) -> Result<GeoDataType> {
        if self.is_empty() {
            return match encoding {
                Encoding::Wkt => Ok(GeoDataType::WKT),
                Encoding::Wkb => Ok(GeoDataType::WKB),
                Encoding::GeoArrow | Encoding::GeoArrowInterleaved => {
                    Err(GeoArrowError::InvalidArgument(
                        "Can't infer a native type without geometries".to_string(),
                    ))
                }
            };
        }

        let Some(geometry_type) = self.geometry_type() else {
            debug!(
                "Mixed geometry types (mask {:#010b}), falling back to WKB",
                self.kinds
            );
            return Ok(GeoDataType::WKB);
        };
        let dim = Dimension::from_flags(self.has_z, self.has_m);
        match encoding {
            Encoding::Wkt => Ok(GeoDataType::WKT),
            Encoding::Wkb => Ok(GeoDataType::WKB),
            Encoding::GeoArrow => native_type(geometry_type, CoordType::Separated, dim),
            Encoding::GeoArrowInterleaved => {
                native_type(geometry_type, CoordType::Interleaved, dim)
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::engine::ArenaEngine;
    use crate::test::{linestring, multipolygon, point, polygon};

    fn infer(codes: &[u32], encoding: Encoding) -> Result<GeoDataType> {
        let mut calculator = SchemaCalculator::new();
        calculator.ingest(codes)?;
        calculator.finish(encoding)
    }

    #[test]
    fn single_kind() {
        assert_eq!(
            infer(&[2, 2, 2], Encoding::GeoArrow).unwrap(),
            GeoDataType::LineString(CoordType::Separated, Dimension::XY)
        );
        assert_eq!(
            infer(&[1003], Encoding::GeoArrowInterleaved).unwrap(),
            GeoDataType::Polygon(CoordType::Interleaved, Dimension::XYZ)
        );
        assert_eq!(infer(&[3], Encoding::Wkt).unwrap(), GeoDataType::WKT);
    }

    #[test]
    fn simple_and_multi_collapse() {
        assert_eq!(
            infer(&[1, 4, 1], Encoding::GeoArrow).unwrap(),
            GeoDataType::MultiPoint(CoordType::Separated, Dimension::XY)
        );
        assert_eq!(
            infer(&[5, 2], Encoding::GeoArrow).unwrap(),
            GeoDataType::MultiLineString(CoordType::Separated, Dimension::XY)
        );
        assert_eq!(
            infer(&[3, 6], Encoding::GeoArrowInterleaved).unwrap(),
            GeoDataType::MultiPolygon(CoordType::Interleaved, Dimension::XY)
        );
    }

    #[test]
    fn dimensions_widen() {
        let mut calculator = SchemaCalculator::new();
        let mut dims = vec![];
        for codes in [[1], [1001], [1], [2001]] {
            calculator.ingest(&codes).unwrap();
            dims.push(calculator.finish(Encoding::GeoArrow).unwrap().dimension());
        }
        assert_eq!(
            dims,
            vec![
                Some(Dimension::XY),
                Some(Dimension::XYZ),
                Some(Dimension::XYZ),
                Some(Dimension::XYZM)
            ]
        );
        assert_eq!(
            infer(&[2002, 2], Encoding::GeoArrow).unwrap(),
            GeoDataType::LineString(CoordType::Separated, Dimension::XYM)
        );

        // Z and M seen on different geometries combine, whatever the order
        for codes in [[2001, 1001], [1001, 2001]] {
            assert_eq!(
                infer(&codes, Encoding::GeoArrow).unwrap(),
                GeoDataType::Point(CoordType::Separated, Dimension::XYZM)
            );
        }
    }

    #[test]
    fn mixed_kinds_fall_back_to_wkb() {
        for codes in [&[1, 2][..], &[7], &[0], &[3, 4], &[1, 6]] {
            for encoding in [Encoding::Wkt, Encoding::Wkb, Encoding::GeoArrow] {
                assert_eq!(infer(codes, encoding).unwrap(), GeoDataType::WKB);
            }
        }

        // Once mixed, more geometries can't narrow the type again
        let mut calculator = SchemaCalculator::new();
        calculator.ingest(&[1, 2]).unwrap();
        calculator.ingest(&[1; 10]).unwrap();
        assert_eq!(
            calculator.finish(Encoding::GeoArrow).unwrap(),
            GeoDataType::WKB
        );
    }

    #[test]
    fn empty_population() {
        assert_eq!(infer(&[], Encoding::Wkt).unwrap(), GeoDataType::WKT);
        assert_eq!(infer(&[], Encoding::Wkb).unwrap(), GeoDataType::WKB);
        for encoding in [Encoding::GeoArrow, Encoding::GeoArrowInterleaved] {
            assert!(matches!(
                infer(&[], encoding),
                Err(GeoArrowError::InvalidArgument(_))
            ));
        }
    }

    #[test]
    fn invalid_codes() {
        for codes in [&[8][..], &[4001], &[1, 9]] {
            let mut calculator = SchemaCalculator::new();
            assert!(matches!(
                calculator.ingest(codes),
                Err(GeoArrowError::InvalidArgument(_))
            ));
            assert!(calculator.is_empty());
        }
    }

    #[test]
    fn engine_geometries() {
        let engine = ArenaEngine::new();
        let geoms = vec![
            Some(engine.insert_geo(&polygon::p0().into()).unwrap()),
            None,
            Some(engine.insert_geo(&multipolygon::mp0().into()).unwrap()),
        ];
        let mut calculator = SchemaCalculator::new();
        calculator.ingest_geometries(&engine, &geoms).unwrap();
        assert_eq!(
            calculator.finish(Encoding::GeoArrow).unwrap(),
            GeoDataType::MultiPolygon(CoordType::Separated, Dimension::XY)
        );

        let geoms = vec![
            Some(point::point_z(&engine, 0., 1., 2.)),
            Some(engine.insert_geo(&linestring::ls0().into()).unwrap()),
        ];
        let mut calculator = SchemaCalculator::new();
        calculator.ingest_geometries(&engine, &geoms).unwrap();
        assert_eq!(
            calculator.finish(Encoding::GeoArrow).unwrap(),
            GeoDataType::WKB
        );
    }
}

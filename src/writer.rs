//! Write engine geometries to GeoArrow arrays.

use arrow_array::ArrayRef;
use arrow_schema::Field;
use log::{debug, trace};

use crate::array::{ArrayMetadata, NativeBuilder};
use crate::coord::CoordScratch;
use crate::datatypes::{Dimension, GeoDataType, GeometryType};
use crate::engine::{
    dimension_from_coordinate_dimension, geometry_type_from_type_id, EngineResultExt, GeomHandle,
    GeometryEngine,
};
use crate::error::{AppendError, GeoArrowError, LastError, Result};
use crate::io::wkb::WkbWriter;
use crate::io::wkt::WktWriter;
use crate::visitor::GeoArrowVisitor;

/// Report `geoms` to `visitor`, one feature per element. `None` is reported as a null feature.
///
/// Returns the number of features visited. On failure, returns how many features were
/// completely visited before the failing one; the failing feature was started but not ended.
pub fn visit_geometries<E, V>(
    engine: &E,
    coords: &mut CoordScratch,
    geoms: &[Option<GeomHandle>],
    mut visitor: V,
) -> std::result::Result<usize, AppendError>
where
    E: GeometryEngine + ?Sized,
    V: GeoArrowVisitor,
{
    for (i, geom) in geoms.iter().enumerate() {
        visit_feature(engine, coords, *geom, &mut visitor).map_err(|source| AppendError {
            n_appended: i,
            source: source.at_row(i),
        })?;
    }
    Ok(geoms.len())
}

fn visit_feature<E, V>(
    engine: &E,
    coords: &mut CoordScratch,
    geom: Option<GeomHandle>,
    visitor: &mut V,
) -> Result<()>
where
    E: GeometryEngine + ?Sized,
    V: GeoArrowVisitor,
{
    visitor.feat_start()?;
    match geom {
        Some(geom) => visit_geometry(engine, coords, geom, visitor)?,
        None => visitor.null_feat()?,
    }
    visitor.feat_end()
}

fn visit_geometry<E, V>(
    engine: &E,
    coords: &mut CoordScratch,
    geom: GeomHandle,
    visitor: &mut V,
) -> Result<()>
where
    E: GeometryEngine + ?Sized,
    V: GeoArrowVisitor,
{
    let geometry_type = geometry_type_from_type_id(engine.type_id(geom).context("type_id")?)?;
    // TODO: map coordinate dimension 4 and M-only sequences once the engine can report which
    // ordinates it stores.
    let dim = dimension_from_coordinate_dimension(
        engine
            .coordinate_dimension(geom)
            .context("coordinate_dimension")?,
    )?;

    visitor.geom_start(geometry_type, dim)?;
    match geometry_type {
        GeometryType::Point | GeometryType::LineString => {
            visit_coords(engine, coords, geom, dim, visitor)?;
        }
        GeometryType::Polygon => {
            if !engine.is_empty(geom).context("is_empty")? {
                let shell = engine.exterior_ring(geom).context("exterior_ring")?;
                visit_ring(engine, coords, shell, dim, visitor)?;
                let n_holes = engine
                    .num_interior_rings(geom)
                    .context("num_interior_rings")?;
                for i in 0..n_holes {
                    let hole = engine
                        .interior_ring_n(geom, i)
                        .context("interior_ring_n")?;
                    visit_ring(engine, coords, hole, dim, visitor)?;
                }
            }
        }
        GeometryType::MultiPoint
        | GeometryType::MultiLineString
        | GeometryType::MultiPolygon
        | GeometryType::GeometryCollection => {
            let n_parts = engine.num_geometries(geom).context("num_geometries")?;
            for i in 0..n_parts {
                let part = engine.geometry_n(geom, i).context("geometry_n")?;
                visit_geometry(engine, coords, part, visitor)?;
            }
        }
        GeometryType::Geometry => {
            return Err(GeoArrowError::IncorrectGeometryType(
                "Cannot visit a geometry of unknown type".into(),
            ))
        }
    }
    visitor.geom_end()
}

fn visit_ring<E, V>(
    engine: &E,
    coords: &mut CoordScratch,
    ring: GeomHandle,
    dim: Dimension,
    visitor: &mut V,
) -> Result<()>
where
    E: GeometryEngine + ?Sized,
    V: GeoArrowVisitor,
{
    visitor.ring_start()?;
    visit_coords(engine, coords, ring, dim, visitor)?;
    visitor.ring_end()
}

fn visit_coords<E, V>(
    engine: &E,
    coords: &mut CoordScratch,
    geom: GeomHandle,
    dim: Dimension,
    visitor: &mut V,
) -> Result<()>
where
    E: GeometryEngine + ?Sized,
    V: GeoArrowVisitor,
{
    let n_coords = engine.coord_seq_size(geom).context("coord_seq_size")?;
    if n_coords == 0 {
        return Ok(());
    }

    coords.ensure_capacity(n_coords, dim)?;
    engine
        .copy_coords(geom, dim.has_z(), dim.has_m(), coords.values_mut())
        .context("copy_coords")?;
    visitor.coords(&coords.view())
}

#[derive(Debug)]
enum Serializer {
    Wkt(WktWriter<i32>),
    LargeWkt(WktWriter<i64>),
    Wkb(WkbWriter<i32>),
    LargeWkb(WkbWriter<i64>),
    Native(NativeBuilder),
}

impl Serializer {
    fn try_new(data_type: GeoDataType) -> Result<Self> {
        let serializer = match data_type {
            GeoDataType::WKT => Serializer::Wkt(WktWriter::new()),
            GeoDataType::LargeWKT => Serializer::LargeWkt(WktWriter::new()),
            GeoDataType::WKB => Serializer::Wkb(WkbWriter::new()),
            GeoDataType::LargeWKB => Serializer::LargeWkb(WkbWriter::new()),
            _ => Serializer::Native(NativeBuilder::try_new(data_type)?),
        };
        Ok(serializer)
    }

    fn visitor(&mut self) -> &mut dyn GeoArrowVisitor {
        match self {
            Serializer::Wkt(writer) => writer,
            Serializer::LargeWkt(writer) => writer,
            Serializer::Wkb(writer) => writer,
            Serializer::LargeWkb(writer) => writer,
            Serializer::Native(builder) => builder,
        }
    }

    fn finish(&mut self) -> Result<ArrayRef> {
        match self {
            Serializer::Wkt(writer) => writer.finish(),
            Serializer::LargeWkt(writer) => writer.finish(),
            Serializer::Wkb(writer) => writer.finish(),
            Serializer::LargeWkb(writer) => writer.finish(),
            Serializer::Native(builder) => builder.finish(),
        }
    }
}

/// Accumulates engine geometries into one GeoArrow array.
///
/// ```
/// use arrow_array::cast::AsArray;
/// use geoarrow_bridge::datatypes::GeoDataType;
/// use geoarrow_bridge::engine::ArenaEngine;
/// use geoarrow_bridge::writer::ArrayWriter;
///
/// let engine = ArenaEngine::new();
/// let point = engine
///     .insert_geo(&geo::Geometry::Point(geo::point!(x: 0., y: 1.)))
///     .unwrap();
///
/// let mut writer = ArrayWriter::new(&engine, GeoDataType::WKT).unwrap();
/// writer.append(&[Some(point), None]).unwrap();
/// let array = writer.finish().unwrap();
/// assert_eq!(array.as_string::<i32>().value(0), "POINT (0 1)");
/// ```
pub struct ArrayWriter<'e, E: GeometryEngine + ?Sized> {
    engine: &'e E,
    field: Field,
    data_type: GeoDataType,
    serializer: Serializer,
    coords: CoordScratch,
    last_error: LastError,
}

impl<'e, E: GeometryEngine + ?Sized> ArrayWriter<'e, E> {
    /// Create a writer producing arrays of `data_type`, described by a nullable field named
    /// `geometry`.
    pub fn new(engine: &'e E, data_type: GeoDataType) -> Result<Self> {
        let field = data_type.to_field_with_metadata("geometry", true, &ArrayMetadata::default())?;
        Self::bind(engine, field, data_type)
    }

    /// Create a writer producing arrays described by a GeoArrow extension field.
    pub fn try_new(engine: &'e E, field: &Field) -> Result<Self> {
        let data_type = GeoDataType::try_from(field)?;
        // Validate the extension metadata up front
        ArrayMetadata::try_from(field)?;
        Self::bind(engine, field.clone(), data_type)
    }

    fn bind(engine: &'e E, field: Field, data_type: GeoDataType) -> Result<Self> {
        debug!("Binding array writer to {data_type:?}");
        Ok(Self {
            engine,
            field,
            data_type,
            serializer: Serializer::try_new(data_type)?,
            coords: CoordScratch::new(),
            last_error: LastError::default(),
        })
    }

    /// Use at most `precision` decimal places when writing WKT.
    pub fn with_wkt_precision(mut self, precision: usize) -> Self {
        self.serializer = match self.serializer {
            Serializer::Wkt(writer) => Serializer::Wkt(writer.with_precision(precision)),
            Serializer::LargeWkt(writer) => {
                Serializer::LargeWkt(writer.with_precision(precision))
            }
            serializer => serializer,
        };
        self
    }

    /// The field describing the arrays this writer produces.
    pub fn field(&self) -> &Field {
        &self.field
    }

    /// The type of the arrays this writer produces.
    pub fn data_type(&self) -> &GeoDataType {
        &self.data_type
    }

    /// The message of the most recent failure, or an empty string.
    pub fn last_error(&self) -> &str {
        self.last_error.as_str()
    }

    /// Append one feature per element of `geoms`; `None` appends a null.
    ///
    /// On failure, the features before the failing one stay appended and the failing feature is
    /// discarded. [`AppendError::n_appended`] reports how many features of this call were kept.
    pub fn append(&mut self, geoms: &[Option<GeomHandle>]) -> std::result::Result<usize, AppendError> {
        trace!("Appending {} geometries", geoms.len());
        self.last_error.clear();
        let result = visit_geometries(
            self.engine,
            &mut self.coords,
            geoms,
            self.serializer.visitor(),
        );
        if let Err(err) = &result {
            self.last_error.set(err);
        }
        result
    }

    /// Take everything appended so far as one array, leaving the writer empty.
    pub fn finish(&mut self) -> Result<ArrayRef> {
        self.last_error.clear();
        let result = self.serializer.finish();
        if let Err(err) = &result {
            self.last_error.set(err);
        }
        result
    }
}

#[cfg(test)]
mod test {
    use arrow_array::cast::AsArray;
    use arrow_array::types::Float64Type;
    use arrow_array::Array;

    use super::*;
    use crate::datatypes::CoordType;
    use crate::engine::ArenaEngine;
    use crate::error::code;
    use crate::test::{linestring, point, polygon, EventRecorder, FaultyEngine};

    fn visit(engine: &ArenaEngine, geoms: &[Option<GeomHandle>]) -> Vec<String> {
        let mut recorder = EventRecorder::default();
        let mut coords = CoordScratch::new();
        visit_geometries(engine, &mut coords, geoms, &mut recorder).unwrap();
        recorder.events
    }

    #[test]
    fn point_events() {
        let engine = ArenaEngine::new();
        let p = engine.insert_geo(&point::p0().into()).unwrap();
        let empty = point::empty(&engine);
        assert_eq!(
            visit(&engine, &[Some(p), None, Some(empty)]),
            vec![
                "feat_start",
                "geom_start(POINT XY)",
                "coords(0 1)",
                "geom_end",
                "feat_end",
                "feat_start",
                "null_feat",
                "feat_end",
                "feat_start",
                "geom_start(POINT XY)",
                "geom_end",
                "feat_end",
            ]
        );
    }

    #[test]
    fn polygon_events_use_rings() {
        let engine = ArenaEngine::new();
        let p = polygon::p_z(&engine);
        let empty = polygon::empty(&engine);
        assert_eq!(
            visit(&engine, &[Some(p), Some(empty)]),
            vec![
                "feat_start",
                "geom_start(POLYGON XYZ)",
                "ring_start",
                "coords(0 0 1, 10 0 2, 10 10 3, 0 0 1)",
                "ring_end",
                "geom_end",
                "feat_end",
                "feat_start",
                "geom_start(POLYGON XY)",
                "geom_end",
                "feat_end",
            ]
        );
    }

    #[test]
    fn collection_events() {
        let engine = ArenaEngine::new();
        let mp = engine
            .insert_geo(&crate::test::multipoint::mp0().into())
            .unwrap();
        assert_eq!(
            visit(&engine, &[Some(mp)]),
            vec![
                "feat_start",
                "geom_start(MULTIPOINT XY)",
                "geom_start(POINT XY)",
                "coords(0 1)",
                "geom_end",
                "geom_start(POINT XY)",
                "coords(1 2)",
                "geom_end",
                "geom_end",
                "feat_end",
            ]
        );
    }

    #[test]
    fn linear_ring_is_a_linestring() {
        let engine = ArenaEngine::new();
        let seq = engine
            .coord_seq_from_buffer(&[0., 0., 1., 0., 1., 1., 0., 0.], 4, false, false)
            .unwrap();
        let ring = engine.create_linear_ring(seq).unwrap();
        let events = visit(&engine, &[Some(ring)]);
        assert_eq!(events[1], "geom_start(LINESTRING XY)");
    }

    #[test]
    fn visitor_errors_stop_the_batch() {
        let engine = ArenaEngine::new();
        let geoms: Vec<_> = [point::p0(), point::p1(), point::p2()]
            .into_iter()
            .map(|p| Some(engine.insert_geo(&p.into()).unwrap()))
            .collect();

        // Each point feature has 5 events; fail in the middle of the second
        let mut recorder = EventRecorder {
            fail_at: Some(7),
            ..Default::default()
        };
        let mut coords = CoordScratch::new();
        let err = visit_geometries(&engine, &mut coords, &geoms, &mut recorder).unwrap_err();
        assert_eq!(err.n_appended, 1);
        assert!(err.source.to_string().contains("refusing coords(1 2)"));
    }

    #[test]
    fn rejects_unknown_type_ids_and_dimensions() {
        let engine = FaultyEngine::new();
        let p = engine.inner.insert_geo(&point::p0().into()).unwrap();
        let q = engine.inner.insert_geo(&point::p1().into()).unwrap();
        engine.override_type_id(q, 42);

        let mut writer = ArrayWriter::new(&engine, GeoDataType::WKT).unwrap();
        let err = writer.append(&[Some(p), Some(q)]).unwrap_err();
        assert_eq!(err.n_appended, 1);
        assert_eq!(err.source.code(), code::EINVAL);
        assert!(writer.last_error().contains("Unexpected geometry type id: 42"));

        engine.override_type_id(q, 0);
        engine.override_dimension(q, 4);
        let err = writer.append(&[Some(q)]).unwrap_err();
        assert_eq!(err.n_appended, 0);
        assert!(err
            .source
            .to_string()
            .contains("Unexpected coordinate dimension: 4"));

        // Only the first point made it
        let array = writer.finish().unwrap();
        assert_eq!(array.len(), 1);
        assert_eq!(array.as_string::<i32>().value(0), "POINT (0 1)");
    }

    #[test]
    fn writes_every_encoding() {
        let engine = ArenaEngine::new();
        let geoms = vec![
            Some(engine.insert_geo(&linestring::ls0().into()).unwrap()),
            None,
            Some(linestring::empty(&engine)),
        ];

        for data_type in [
            GeoDataType::WKT,
            GeoDataType::LargeWKT,
            GeoDataType::WKB,
            GeoDataType::LargeWKB,
            GeoDataType::LineString(CoordType::Separated, Dimension::XY),
            GeoDataType::LineString(CoordType::Interleaved, Dimension::XYZ),
            GeoDataType::MultiLineString(CoordType::Separated, Dimension::XY),
        ] {
            let mut writer = ArrayWriter::new(&engine, data_type).unwrap();
            assert_eq!(writer.append(&geoms).unwrap(), 3);
            let array = writer.finish().unwrap();
            assert_eq!(array.data_type(), &data_type.to_data_type());
            assert_eq!(array.len(), 3);
            assert!(array.is_null(1));
            assert!(array.is_valid(2));

            // finish resets the writer
            let array = writer.finish().unwrap();
            assert_eq!(array.len(), 0);
        }
    }

    #[test]
    fn finish_without_features() {
        let engine = ArenaEngine::new();
        for data_type in [GeoDataType::WKT, GeoDataType::WKB] {
            let mut writer = ArrayWriter::new(&engine, data_type).unwrap();
            let array = writer.finish().unwrap();
            assert_eq!(array.len(), 0);
            // Offsets and data; validity is absent without nulls
            assert_eq!(array.to_data().buffers().len(), 2);
            assert!(array.nulls().is_none());
            assert_eq!(array.data_type(), &data_type.to_data_type());
        }
    }

    #[test]
    fn xym_is_written_as_xyz() {
        let engine = ArenaEngine::new();
        let seq = engine
            .coord_seq_from_buffer(&[1., 2., 3.], 1, false, true)
            .unwrap();
        let p = engine.create_point(seq).unwrap();

        let data_type = GeoDataType::Point(CoordType::Separated, Dimension::XYZ);
        let mut writer = ArrayWriter::new(&engine, data_type).unwrap();
        writer.append(&[Some(p)]).unwrap();
        let array = writer.finish().unwrap();
        let z = array.as_struct().column(2).as_primitive::<Float64Type>();
        assert!(z.value(0).is_nan());
    }

    #[test]
    fn wrong_native_type() {
        let engine = ArenaEngine::new();
        let p = engine.insert_geo(&polygon::p0().into()).unwrap();
        let mut writer = ArrayWriter::new(
            &engine,
            GeoDataType::Point(CoordType::Interleaved, Dimension::XY),
        )
        .unwrap();
        let err = writer.append(&[Some(p)]).unwrap_err();
        assert!(matches!(
            err.source,
            GeoArrowError::IncorrectGeometryType(_)
        ));
        assert!(!writer.last_error().is_empty());
        assert_eq!(writer.finish().unwrap().len(), 0);
        assert!(writer.last_error().is_empty());
    }

    #[test]
    fn empty_point_in_multipoint_needs_wkb() {
        let engine = ArenaEngine::new();
        let parts = [
            engine.insert_geo(&point::p1().into()).unwrap(),
            point::empty(&engine),
        ];
        let mp = engine
            .create_collection(crate::engine::type_id::MULTIPOINT, &parts)
            .unwrap();

        let mut writer = ArrayWriter::new(&engine, GeoDataType::WKT).unwrap();
        let err = writer.append(&[Some(mp)]).unwrap_err();
        assert_eq!(err.n_appended, 0);
        assert!(matches!(err.source, GeoArrowError::Wkt(_)));
        assert_eq!(writer.finish().unwrap().len(), 0);

        let mut writer = ArrayWriter::new(&engine, GeoDataType::WKB).unwrap();
        assert_eq!(writer.append(&[Some(mp)]).unwrap(), 1);
    }

    #[test]
    fn field_carries_extension() {
        let engine = ArenaEngine::new();
        let field = GeoDataType::WKB.to_field("geom", true);
        let writer = ArrayWriter::try_new(&engine, &field).unwrap();
        assert_eq!(writer.data_type(), &GeoDataType::WKB);
        assert_eq!(writer.field().name(), "geom");
    }
}

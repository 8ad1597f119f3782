use geo::{point, Point};

use crate::engine::{ArenaEngine, GeomHandle, GeometryEngine};

pub(crate) fn p0() -> Point {
    point!(
        x: 0., y: 1.
    )
}

pub(crate) fn p1() -> Point {
    point!(
        x: 1., y: 2.
    )
}

pub(crate) fn p2() -> Point {
    point!(
        x: 2., y: 3.
    )
}

pub(crate) fn point_z(engine: &ArenaEngine, x: f64, y: f64, z: f64) -> GeomHandle {
    let seq = engine
        .coord_seq_from_buffer(&[x, y, z], 1, true, false)
        .unwrap();
    engine.create_point(seq).unwrap()
}

pub(crate) fn empty(engine: &ArenaEngine) -> GeomHandle {
    let seq = engine.coord_seq_from_buffer(&[], 0, false, false).unwrap();
    engine.create_point(seq).unwrap()
}

pub(crate) fn empty_z(engine: &ArenaEngine) -> GeomHandle {
    let seq = engine.coord_seq_from_buffer(&[], 0, true, false).unwrap();
    engine.create_point(seq).unwrap()
}

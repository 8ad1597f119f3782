use geo::{polygon, MultiPolygon};

pub(crate) fn mp0() -> MultiPolygon {
    MultiPolygon::new(vec![
        crate::test::polygon::p1(),
        polygon![
            (x: -100., y: 40.),
            (x: -100., y: 35.),
            (x: -95., y: 35.),
            (x: -95., y: 40.),
        ],
    ])
}

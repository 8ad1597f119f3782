pub(crate) mod multilinestring;
pub(crate) mod multipolygon;
pub(crate) mod point;

pub(crate) use faulty::FaultyEngine;
pub(crate) use recorder::EventRecorder;

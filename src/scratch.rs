//! Owned geometries under construction.
//!
//! Readers build nested geometries bottom-up: the parts of level `n + 1` are created into a
//! scratch level and then handed to the constructor of a level `n` geometry. Anything still
//! owned by the pool when it is reset or dropped is destroyed through the engine.

use crate::datatypes::GeometryType;
use crate::engine::{collection_type_id, EngineResultExt, GeomHandle, GeometryEngine};
use crate::error::Result;

/// Levels of owned geometry slots.
pub struct GeometryScratchPool<'e, E: GeometryEngine + ?Sized> {
    engine: &'e E,
    levels: Vec<Vec<Option<GeomHandle>>>,
}

impl<'e, E: GeometryEngine + ?Sized> GeometryScratchPool<'e, E> {
    /// Create an empty pool destroying leftovers through `engine`.
    pub fn new(engine: &'e E) -> Self {
        Self {
            engine,
            levels: vec![],
        }
    }

    /// The engine geometries are destroyed with.
    pub fn engine(&self) -> &'e E {
        self.engine
    }

    fn level_mut(&mut self, level: usize) -> &mut Vec<Option<GeomHandle>> {
        if self.levels.len() <= level {
            self.levels.resize_with(level + 1, Vec::new);
        }
        &mut self.levels[level]
    }

    /// The number of slots of a level.
    pub fn len(&self, level: usize) -> usize {
        self.levels.get(level).map_or(0, Vec::len)
    }

    /// Whether no level holds any slot.
    pub fn is_empty(&self) -> bool {
        self.levels.iter().all(Vec::is_empty)
    }

    /// Destroy every owned geometry of every level and clear all levels.
    pub fn reset(&mut self) {
        for level in 0..self.levels.len() {
            self.reset_level(level);
        }
    }

    /// Destroy every owned geometry of one level and clear it.
    pub fn reset_level(&mut self, level: usize) {
        let engine = self.engine;
        if let Some(slots) = self.levels.get_mut(level) {
            slots.drain(..).flatten().for_each(|geom| engine.destroy(geom));
        }
    }

    /// Resize a level to `n` slots, destroying geometries in removed slots. New slots are empty.
    pub fn resize(&mut self, level: usize, n: usize) {
        let engine = self.engine;
        let slots = self.level_mut(level);
        if n < slots.len() {
            slots.drain(n..).flatten().for_each(|geom| engine.destroy(geom));
        } else {
            slots.resize(n, None);
        }
    }

    /// Append an owned geometry to a level.
    pub fn push(&mut self, level: usize, geom: GeomHandle) {
        self.level_mut(level).push(Some(geom));
    }

    /// Store an owned geometry in slot `i`, destroying any previous occupant.
    pub fn set(&mut self, level: usize, i: usize, geom: GeomHandle) {
        let engine = self.engine;
        let slots = self.level_mut(level);
        if slots.len() <= i {
            slots.resize(i + 1, None);
        }
        if let Some(previous) = slots[i].replace(geom) {
            engine.destroy(previous);
        }
    }

    /// The geometry in slot `i`, still owned by the pool.
    pub fn borrow(&self, level: usize, i: usize) -> Option<GeomHandle> {
        self.levels.get(level).and_then(|slots| slots.get(i).copied().flatten())
    }

    /// All geometries of a level, still owned by the pool.
    pub fn borrow_level(&self, level: usize) -> Vec<GeomHandle> {
        self.levels
            .get(level)
            .map(|slots| slots.iter().flatten().copied().collect())
            .unwrap_or_default()
    }

    /// Release slot `i` without destroying it; the caller now owns the geometry.
    pub fn take_ownership_of(&mut self, level: usize, i: usize) -> Option<GeomHandle> {
        self.levels
            .get_mut(level)
            .and_then(|slots| slots.get_mut(i))
            .and_then(Option::take)
    }

    /// Release every slot of a level without destroying; the caller now owns the geometries.
    ///
    /// Use after a constructor consumed [`GeometryScratchPool::borrow_level`].
    pub fn release_level(&mut self, level: usize) {
        if let Some(slots) = self.levels.get_mut(level) {
            slots.clear();
        }
    }

    /// Create a Polygon from the rings of `level`: the first ring is the shell and the others
    /// are holes. Creates an empty Polygon when the level is empty.
    ///
    /// On success the rings belong to the polygon and the level is cleared. On failure they stay
    /// in the pool.
    pub fn finish_polygon(&mut self, level: usize) -> Result<GeomHandle> {
        let rings = self.borrow_level(level);
        let polygon = match rings.split_first() {
            None => self
                .engine
                .create_empty_polygon()
                .context("create_empty_polygon")?,
            Some((shell, holes)) => self
                .engine
                .create_polygon(*shell, holes)
                .context("create_polygon")?,
        };
        self.release_level(level);
        Ok(polygon)
    }

    /// Create a multi geometry or collection from the parts of `level`, with the same ownership
    /// rules as [`GeometryScratchPool::finish_polygon`].
    pub fn finish_collection(
        &mut self,
        level: usize,
        geometry_type: GeometryType,
    ) -> Result<GeomHandle> {
        let id = collection_type_id(geometry_type)?;
        let parts = self.borrow_level(level);
        let collection = self
            .engine
            .create_collection(id, &parts)
            .context("create_collection")?;
        self.release_level(level);
        Ok(collection)
    }
}

impl<E: GeometryEngine + ?Sized> Drop for GeometryScratchPool<'_, E> {
    fn drop(&mut self) {
        self.reset();
    }
}

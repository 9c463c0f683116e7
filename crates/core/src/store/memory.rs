//! In-memory raster store

use super::{RasterName, RasterStore};
use crate::error::{Error, Result};
use crate::raster::Raster;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

/// Raster store backed by a shared in-memory map.
///
/// Reads hand out `Arc`s, so large inputs such as the elevation model are
/// never copied per worker.
#[derive(Debug, Default)]
pub struct MemoryStore {
    rasters: RwLock<HashMap<RasterName, Arc<Raster<f64>>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored rasters
    pub fn len(&self) -> usize {
        self.rasters.read().map(|m| m.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn poisoned<T>(_: T) -> Error {
    Error::Other("raster store lock poisoned".into())
}

impl RasterStore for MemoryStore {
    fn read(&self, name: &RasterName) -> Result<Arc<Raster<f64>>> {
        self.rasters
            .read()
            .map_err(poisoned)?
            .get(name)
            .cloned()
            .ok_or_else(|| Error::RasterNotFound(name.to_string()))
    }

    fn write(&self, name: &RasterName, raster: Raster<f64>) -> Result<()> {
        self.rasters
            .write()
            .map_err(poisoned)?
            .insert(name.clone(), Arc::new(raster));
        Ok(())
    }

    fn contains(&self, name: &RasterName) -> bool {
        self.rasters
            .read()
            .map(|m| m.contains_key(name))
            .unwrap_or(false)
    }

    fn remove(&self, name: &RasterName) -> Result<bool> {
        Ok(self.rasters.write().map_err(poisoned)?.remove(name).is_some())
    }

    fn names(&self) -> Result<Vec<RasterName>> {
        let mut names: Vec<_> = self.rasters.read().map_err(poisoned)?.keys().cloned().collect();
        names.sort();
        Ok(names)
    }
}

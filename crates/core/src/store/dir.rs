//! Directory-backed raster store (one GeoTIFF per raster)

use super::{RasterName, RasterStore};
use crate::error::{Error, Result};
use crate::io::{read_geotiff, write_geotiff};
use crate::raster::Raster;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

const EXTENSION: &str = "tif";

/// Raster store persisting each raster as `<dir>/<name>.tif`.
///
/// Writes go to a temporary file first and are renamed into place, so a
/// reader never observes a partially written raster.
#[derive(Debug, Clone)]
pub struct DirStore {
    root: PathBuf,
}

impl DirStore {
    /// Open a store rooted at `root`, creating the directory if needed
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// File path backing a raster name
    pub fn path_of(&self, name: &RasterName) -> PathBuf {
        self.root.join(format!("{}.{}", name, EXTENSION))
    }
}

impl RasterStore for DirStore {
    fn read(&self, name: &RasterName) -> Result<Arc<Raster<f64>>> {
        let path = self.path_of(name);
        if !path.is_file() {
            return Err(Error::RasterNotFound(name.to_string()));
        }
        Ok(Arc::new(read_geotiff(&path)?))
    }

    fn write(&self, name: &RasterName, raster: Raster<f64>) -> Result<()> {
        let path = self.path_of(name);
        let tmp = self.root.join(format!(".{}.{}.partial", name, EXTENSION));
        write_geotiff(&raster, &tmp)?;
        fs::rename(&tmp, &path)?;
        Ok(())
    }

    fn contains(&self, name: &RasterName) -> bool {
        self.path_of(name).is_file()
    }

    fn remove(&self, name: &RasterName) -> Result<bool> {
        match fs::remove_file(self.path_of(name)) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    fn names(&self) -> Result<Vec<RasterName>> {
        let mut names = Vec::new();
        for entry in fs::read_dir(&self.root)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some(EXTENSION) {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                if let Ok(name) = RasterName::new(stem) {
                    names.push(name);
                }
            }
        }
        names.sort();
        Ok(names)
    }
}

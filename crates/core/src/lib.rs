//! # CumView Core
//!
//! Core types and I/O for the CumView cumulative viewshed toolkit.
//!
//! This crate provides:
//! - `Raster<T>`: Generic georeferenced raster grid
//! - `GeoTransform` / `GridSpec`: Georeferencing and grid geometry
//! - Native GeoTIFF reading and writing
//! - `RasterStore`: Flat namespace of named rasters (memory or directory backed)

pub mod error;
pub mod io;
pub mod raster;
pub mod store;

pub use error::{Error, Result};
pub use raster::{GeoTransform, GridSpec, Raster, RasterElement};
pub use store::{DirStore, MemoryStore, RasterName, RasterStore};

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::error::{Error, Result};
    pub use crate::raster::{GeoTransform, GridSpec, Raster, RasterElement};
    pub use crate::store::{RasterName, RasterStore};
}

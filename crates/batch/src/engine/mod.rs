//! Visibility engines
//!
//! An engine owns a raster namespace and offers the two heavy services the
//! batch needs: a single-observer viewshed and a per-cell count across a set
//! of rasters.
//!
//! - [`NativeEngine`]: in-process kernels over a [`RasterStore`](cumview_core::RasterStore)
//! - [`GrassEngine`]: GRASS GIS modules run as child processes

mod grass;
mod native;

pub use grass::{parse_raster_info, GrassConfig, GrassEngine};
pub use native::NativeEngine;

use crate::error::EngineError;
use crate::region::Region;
use cumview_core::{GridSpec, RasterName};

/// One viewshed invocation
#[derive(Debug, Clone)]
pub struct ViewshedRequest<'a> {
    /// Elevation raster the observer stands on
    pub elevation: &'a RasterName,
    pub x: f64,
    pub y: f64,
    /// Maximum visibility distance; non-positive or infinite means unlimited
    pub max_distance: f64,
    /// Observer height above the ground
    pub observer_elevation: f64,
    /// Target height above the ground
    pub target_elevation: f64,
    /// Restrict the computation to this region
    pub region: Option<Region>,
    /// Name of the visibility raster to produce
    pub output: &'a RasterName,
}

/// Engine computing viewsheds and cell counts over named rasters.
///
/// Visibility rasters hold a defined value on visible cells and no-data
/// elsewhere. Implementations must be safe to call from several worker
/// threads at once; each call only sees the region passed with it.
pub trait VisibilityEngine: Send + Sync {
    /// Short engine name for logs
    fn name(&self) -> &'static str;

    /// Grid geometry of a raster
    fn grid(&self, raster: &RasterName) -> Result<GridSpec, EngineError>;

    /// Compute the viewshed described by `request`, writing `request.output`
    fn viewshed(&self, request: &ViewshedRequest<'_>) -> Result<RasterName, EngineError>;

    /// Count, per cell of `template`, how many `inputs` hold a defined
    /// value, writing the result to `output`. Zero counts are no-data; an
    /// empty `inputs` yields an all-no-data raster on `template`. Inputs
    /// not aligned to `template` give `GridMismatch`.
    fn count(&self, inputs: &[RasterName], template: &GridSpec, output: &RasterName) -> Result<RasterName, EngineError>;

    /// Delete a raster, returning whether it existed
    fn remove(&self, raster: &RasterName) -> Result<bool, EngineError>;
}

impl<E: VisibilityEngine + ?Sized> VisibilityEngine for &E {
    fn name(&self) -> &'static str {
        (**self).name()
    }

    fn grid(&self, raster: &RasterName) -> Result<GridSpec, EngineError> {
        (**self).grid(raster)
    }

    fn viewshed(&self, request: &ViewshedRequest<'_>) -> Result<RasterName, EngineError> {
        (**self).viewshed(request)
    }

    fn count(&self, inputs: &[RasterName], template: &GridSpec, output: &RasterName) -> Result<RasterName, EngineError> {
        (**self).count(inputs, template, output)
    }

    fn remove(&self, raster: &RasterName) -> Result<bool, EngineError> {
        (**self).remove(raster)
    }
}

/// Whether a distance bounds the viewshed
pub(crate) fn is_bounded(max_distance: f64) -> bool {
    max_distance > 0.0 && max_distance.is_finite()
}

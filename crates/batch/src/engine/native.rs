//! In-process visibility engine over a raster store

use super::{is_bounded, ViewshedRequest, VisibilityEngine};
use crate::error::EngineError;
use cumview_algorithms::statistics::count_defined;
use cumview_algorithms::terrain::{viewshed, ViewshedParams};
use cumview_core::{GridSpec, Raster, RasterName, RasterStore};
use std::sync::Arc;
use tracing::debug;

/// Engine running the native viewshed and count kernels.
///
/// Visibility rasters are stored as `f64` with 1 on visible cells and NaN
/// elsewhere; count rasters hold the count with NaN for zero.
#[derive(Debug, Clone)]
pub struct NativeEngine<S> {
    store: S,
}

impl<S: RasterStore> NativeEngine<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    fn read(&self, name: &RasterName) -> Result<Arc<Raster<f64>>, EngineError> {
        Ok(self.store.read(name)?)
    }
}

/// Kernel errors on the observer cell are per-point failures
fn observer_error(request: &ViewshedRequest<'_>, err: cumview_core::Error) -> EngineError {
    if matches!(
        err,
        cumview_core::Error::IndexOutOfBounds { .. } | cumview_core::Error::Algorithm(_)
    ) {
        EngineError::InvalidObserver {
            x: request.x,
            y: request.y,
            reason: err.to_string(),
        }
    } else {
        err.into()
    }
}

impl<S: RasterStore> VisibilityEngine for NativeEngine<S> {
    fn name(&self) -> &'static str {
        "native"
    }

    fn grid(&self, raster: &RasterName) -> Result<GridSpec, EngineError> {
        Ok(self.store.grid(raster)?)
    }

    fn viewshed(&self, request: &ViewshedRequest<'_>) -> Result<RasterName, EngineError> {
        let dem = self.read(request.elevation)?;
        let grid = dem.grid();

        let (row, col) = grid.cell_of(request.x, request.y).ok_or_else(|| EngineError::InvalidObserver {
            x: request.x,
            y: request.y,
            reason: format!("outside elevation raster '{}'", request.elevation),
        })?;

        let mut params = ViewshedParams {
            observer_row: row,
            observer_col: col,
            observer_height: request.observer_elevation,
            target_height: request.target_elevation,
            max_distance: if is_bounded(request.max_distance) {
                request.max_distance
            } else {
                f64::INFINITY
            },
            // Same ray set whether or not the run is windowed
            max_radius: Some(grid.rows + grid.cols),
        };

        let mut visible = Raster::from_grid(&grid, 0u8);
        visible.set_nodata(Some(0));

        match &request.region {
            Some(region) => {
                // One cell of margin keeps every ray of the search square
                // inside the window
                let window = region.window_in(&grid, 1).ok_or_else(|| {
                    EngineError::DegenerateRegion(format!("{:?} does not overlap the elevation grid", region))
                })?;
                let (local_row, local_col) = window.to_local(row, col).ok_or_else(|| EngineError::InvalidObserver {
                    x: request.x,
                    y: request.y,
                    reason: "outside the computation region".into(),
                })?;
                debug!(
                    "Native viewshed for {} on window {}x{} at ({}, {})",
                    request.output, window.rows, window.cols, window.row_offset, window.col_offset
                );

                let sub = dem.window(&window)?;
                params.observer_row = local_row;
                params.observer_col = local_col;
                let local = viewshed(&sub, params).map_err(|e| observer_error(request, e))?;
                visible.paste(&window, &local)?;
            }
            None => {
                visible = viewshed(&dem, params).map_err(|e| observer_error(request, e))?;
            }
        }

        self.store.write(request.output, visible.convert::<f64>())?;
        Ok(request.output.clone())
    }

    fn count(&self, inputs: &[RasterName], template: &GridSpec, output: &RasterName) -> Result<RasterName, EngineError> {
        let rasters = inputs
            .iter()
            .map(|name| -> Result<Arc<Raster<f64>>, EngineError> {
                let raster = self.read(name)?;
                template.ensure_matches(&raster.grid(), name.as_str())?;
                Ok(raster)
            })
            .collect::<Result<Vec<_>, _>>()?;

        let refs: Vec<&Raster<f64>> = rasters.iter().map(|r| r.as_ref()).collect();
        let counts = count_defined(&refs, template)?;
        self.store.write(output, counts.convert::<f64>())?;
        Ok(output.clone())
    }

    fn remove(&self, raster: &RasterName) -> Result<bool, EngineError> {
        Ok(self.store.remove(raster)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::region::Region;
    use crate::viewpoint::Viewpoint;
    use cumview_core::{GeoTransform, MemoryStore};

    fn name(s: &str) -> RasterName {
        RasterName::new(s).unwrap()
    }

    fn engine_with_dem() -> NativeEngine<MemoryStore> {
        let mut dem = Raster::new(40, 40);
        dem.set_transform(GeoTransform::new(0.0, 400.0, 10.0, -10.0));
        for row in 0..40 {
            for col in 0..40 {
                let h = ((row as f64 * 0.3).sin() + (col as f64 * 0.2).cos()) * 30.0;
                dem.set(row, col, 100.0 + h).unwrap();
            }
        }
        let store = MemoryStore::new();
        store.write(&name("dem"), dem).unwrap();
        NativeEngine::new(store)
    }

    fn request<'a>(elevation: &'a RasterName, output: &'a RasterName, x: f64, y: f64) -> ViewshedRequest<'a> {
        ViewshedRequest {
            elevation,
            x,
            y,
            max_distance: 80.0,
            observer_elevation: 1.75,
            target_elevation: 0.0,
            region: None,
            output,
        }
    }

    #[test]
    fn test_viewshed_writes_visibility_raster() {
        let engine = engine_with_dem();
        let (dem, out) = (name("dem"), name("vs_1"));

        let written = engine.viewshed(&request(&dem, &out, 205.0, 195.0)).unwrap();
        assert_eq!(written, out);

        let vis = engine.store().read(&out).unwrap();
        assert_eq!(vis.shape(), (40, 40));
        assert_eq!(vis.get(20, 20).unwrap(), 1.0, "observer cell is visible");
        assert!(vis.get(0, 0).unwrap().is_nan(), "beyond max distance");
    }

    #[test]
    fn test_region_restriction_matches_full_grid() {
        let engine = engine_with_dem();
        let dem = name("dem");
        let grid = engine.grid(&dem).unwrap();

        for (i, &(x, y)) in [(205.0, 195.0), (15.0, 385.0), (393.0, 7.0), (120.0, 260.0)].iter().enumerate() {
            let full_name = name(&format!("full_{}", i));
            let part_name = name(&format!("part_{}", i));

            engine.viewshed(&request(&dem, &full_name, x, y)).unwrap();

            let vp = Viewpoint::new(i as u64, x, y);
            let mut restricted = request(&dem, &part_name, x, y);
            restricted.region = Some(Region::from_viewpoint(&vp, 80.0, &grid).unwrap());
            engine.viewshed(&restricted).unwrap();

            let full = engine.store().read(&full_name).unwrap();
            let part = engine.store().read(&part_name).unwrap();
            for (a, b) in full.data().iter().zip(part.data().iter()) {
                assert!(a == b || (a.is_nan() && b.is_nan()), "point {} differs", i);
            }
        }
    }

    #[test]
    fn test_huge_distance_runs_on_whole_grid() {
        let engine = engine_with_dem();
        let dem = name("dem");
        let grid = engine.grid(&dem).unwrap();
        let (full_name, part_name) = (name("far_full"), name("far_part"));

        let mut full = request(&dem, &full_name, 205.0, 195.0);
        full.max_distance = 1.0e10;
        engine.viewshed(&full).unwrap();

        let vp = Viewpoint::new(1, 205.0, 195.0);
        let mut restricted = request(&dem, &part_name, 205.0, 195.0);
        restricted.max_distance = 1.0e10;
        restricted.region = Some(Region::from_viewpoint(&vp, 1.0e10, &grid).unwrap());
        engine.viewshed(&restricted).unwrap();

        let full = engine.store().read(&full_name).unwrap();
        let part = engine.store().read(&part_name).unwrap();
        assert!(full.defined_count() > 1);
        for (a, b) in full.data().iter().zip(part.data().iter()) {
            assert!(a == b || (a.is_nan() && b.is_nan()));
        }
    }

    #[test]
    fn test_observer_outside_grid_is_recoverable() {
        let engine = engine_with_dem();
        let (dem, out) = (name("dem"), name("vs_x"));
        let err = engine.viewshed(&request(&dem, &out, -50.0, 10.0)).unwrap_err();
        assert!(matches!(err, EngineError::InvalidObserver { .. }));
        assert!(err.is_recoverable());
        assert!(!engine.store().contains(&out));
    }

    #[test]
    fn test_observer_on_nodata_is_recoverable() {
        let store = MemoryStore::new();
        let mut dem = Raster::filled(5, 5, 10.0);
        dem.set(2, 2, f64::NAN).unwrap();
        store.write(&name("dem"), dem).unwrap();
        let engine = NativeEngine::new(store);

        let (dem, out) = (name("dem"), name("vs"));
        // default transform: origin (0, 0), cells of 1 with y decreasing
        let err = engine.viewshed(&request(&dem, &out, 2.5, -2.5)).unwrap_err();
        assert!(matches!(err, EngineError::InvalidObserver { .. }));
    }

    #[test]
    fn test_missing_elevation_is_unexpected() {
        let engine = NativeEngine::new(MemoryStore::new());
        let (dem, out) = (name("nope"), name("vs"));
        let err = engine.viewshed(&request(&dem, &out, 0.0, 0.0)).unwrap_err();
        assert!(matches!(err, EngineError::MissingRaster(_)));
        assert!(!err.is_recoverable());
    }

    #[test]
    fn test_count_rejects_misaligned_input() {
        let engine = engine_with_dem();
        let grid = engine.grid(&name("dem")).unwrap();
        engine.store().write(&name("small"), Raster::filled(3, 3, 1.0)).unwrap();

        let err = engine.count(&[name("dem"), name("small")], &grid, &name("cum")).unwrap_err();
        assert!(matches!(err, EngineError::GridMismatch(ref m) if m.contains("small")));
    }

    #[test]
    fn test_count_of_nothing_is_all_nodata() {
        let engine = engine_with_dem();
        let grid = engine.grid(&name("dem")).unwrap();

        engine.count(&[], &grid, &name("cum")).unwrap();
        let cum = engine.store().read(&name("cum")).unwrap();
        assert_eq!(cum.grid(), grid);
        assert_eq!(cum.defined_count(), 0);
    }
}

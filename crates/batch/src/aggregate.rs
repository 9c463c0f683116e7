//! Aggregator: fold per-point visibility rasters into a cumulative count

use crate::coordinator::BatchReport;
use crate::engine::VisibilityEngine;
use crate::error::EngineError;
use cumview_core::{GridSpec, RasterName};
use tracing::{info, warn};

/// Builds the cumulative viewshed from a batch's successful outputs
pub struct Aggregator<'a, E: ?Sized> {
    engine: &'a E,
}

impl<'a, E: VisibilityEngine + ?Sized> Aggregator<'a, E> {
    pub fn new(engine: &'a E) -> Self {
        Self { engine }
    }

    /// Count, per cell of `template`, how many of `inputs` see it.
    ///
    /// Every input must lie on whole cells of the template grid; inputs of a
    /// restricted run may cover only part of it. Cells seen by no input are
    /// no-data, and no inputs at all give an all-no-data raster.
    pub fn aggregate(&self, inputs: &[RasterName], template: &GridSpec, output: &RasterName) -> Result<RasterName, EngineError> {
        if inputs.is_empty() {
            warn!("No visibility rasters to aggregate; {} will be empty", output);
        }
        let name = self.engine.count(inputs, template, output)?;
        info!("Cumulative viewshed {} built from {} rasters", name, inputs.len());
        Ok(name)
    }

    /// Aggregate the successful outputs of a batch
    pub fn aggregate_report(&self, report: &BatchReport, template: &GridSpec, output: &RasterName) -> Result<RasterName, EngineError> {
        self.aggregate(&report.outputs(), template, output)
    }

    /// Remove the per-point rasters of a batch, returning how many existed
    pub fn cleanup(&self, report: &BatchReport) -> Result<usize, EngineError> {
        let mut removed = 0;
        for name in report.outputs() {
            if self.engine.remove(&name)? {
                removed += 1;
            }
        }
        info!("Removed {} per-point rasters", removed);
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::NativeEngine;
    use crate::error::FailureKind;
    use crate::viewpoint::ViewpointId;
    use crate::worker::PointFailure;
    use cumview_core::{GeoTransform, MemoryStore, Raster, RasterStore};

    fn name(s: &str) -> RasterName {
        RasterName::new(s).unwrap()
    }

    fn grid() -> GridSpec {
        GridSpec::new(GeoTransform::new(0.0, 2.0, 1.0, -1.0), 2, 2)
    }

    fn visibility(store: &MemoryStore, raster: &str, cells: &[(usize, usize)]) -> RasterName {
        let mut r = Raster::from_grid(&grid(), f64::NAN);
        for &(row, col) in cells {
            r.set(row, col, 1.0).unwrap();
        }
        let n = name(raster);
        store.write(&n, r).unwrap();
        n
    }

    #[test]
    fn test_aggregate_counts_visible_cells() {
        let store = MemoryStore::new();
        let a = visibility(&store, "vs_a", &[(0, 0), (0, 1)]);
        let b = visibility(&store, "vs_b", &[(0, 0)]);
        let engine = NativeEngine::new(store);

        let out = Aggregator::new(&engine).aggregate(&[a, b], &grid(), &name("cum")).unwrap();
        let cum = engine.store().read(&out).unwrap();
        assert_eq!(cum.get(0, 0).unwrap(), 2.0);
        assert_eq!(cum.get(0, 1).unwrap(), 1.0);
        assert!(cum.get(1, 0).unwrap().is_nan());
        assert!(cum.get(1, 1).unwrap().is_nan());
    }

    #[test]
    fn test_cleanup_removes_outputs() {
        let store = MemoryStore::new();
        let a = visibility(&store, "vs_1", &[(0, 0)]);
        let engine = NativeEngine::new(store);
        let report = BatchReport {
            succeeded: vec![(ViewpointId(1), a.clone())],
            failed: vec![(ViewpointId(2), PointFailure::new(FailureKind::Timeout, "timed out"))],
        };

        let aggregator = Aggregator::new(&engine);
        aggregator.aggregate_report(&report, &grid(), &name("cum")).unwrap();
        assert_eq!(aggregator.cleanup(&report).unwrap(), 1);
        assert!(!engine.store().contains(&a));
        assert!(engine.store().contains(&name("cum")));
    }
}

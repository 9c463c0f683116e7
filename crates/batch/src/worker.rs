//! Viewshed worker: one viewpoint in, one typed result out

use crate::engine::{is_bounded, ViewshedRequest, VisibilityEngine};
use crate::error::{EngineError, FailureKind};
use crate::region::Region;
use crate::viewpoint::{Viewpoint, ViewpointId};
use cumview_core::{GridSpec, RasterName};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::warn;

/// Settings shared by every worker of a batch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerConfig {
    /// Elevation raster the viewsheds are computed on
    pub elevation: RasterName,
    /// Maximum visibility distance in map units; non-positive means unlimited
    pub max_distance: f64,
    #[serde(default = "default_observer_elevation")]
    pub observer_elevation: f64,
    #[serde(default)]
    pub target_elevation: f64,
    /// Limit each computation to `viewpoint ± max_distance`
    #[serde(default)]
    pub restrict_region: bool,
    /// Per-point rasters are named `<prefix>_<id>`
    #[serde(default = "default_output_prefix")]
    pub output_prefix: String,
}

fn default_observer_elevation() -> f64 {
    1.75
}

fn default_output_prefix() -> String {
    "viewshed".to_string()
}

impl WorkerConfig {
    pub fn new(elevation: RasterName, max_distance: f64) -> Self {
        Self {
            elevation,
            max_distance,
            observer_elevation: default_observer_elevation(),
            target_elevation: 0.0,
            restrict_region: false,
            output_prefix: default_output_prefix(),
        }
    }

    /// Name of the visibility raster produced for a viewpoint
    pub fn output_name(&self, id: ViewpointId) -> Result<RasterName, EngineError> {
        Ok(RasterName::new(format!("{}_{}", self.output_prefix, id))?)
    }
}

/// Result of one worker invocation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum WorkResult {
    /// Visibility raster written under this name
    Success(RasterName),
    /// Recoverable failure for this viewpoint only
    Failure(PointFailure),
}

/// Why a viewpoint failed: the error kind and its message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PointFailure {
    pub kind: FailureKind,
    pub reason: String,
}

impl PointFailure {
    pub fn new(kind: FailureKind, reason: impl Into<String>) -> Self {
        Self {
            kind,
            reason: reason.into(),
        }
    }
}

impl fmt::Display for PointFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.reason)
    }
}

impl WorkResult {
    pub fn is_success(&self) -> bool {
        matches!(self, WorkResult::Success(_))
    }
}

/// A viewpoint together with its work result
#[derive(Debug, Clone, PartialEq)]
pub struct PointOutcome {
    pub viewpoint: Viewpoint,
    pub result: WorkResult,
}

/// Runs the engine's viewshed for single viewpoints
pub struct ViewshedWorker<'a, E: ?Sized> {
    engine: &'a E,
    config: &'a WorkerConfig,
    /// Elevation grid, looked up once when regions are needed
    grid: Option<GridSpec>,
}

impl<'a, E: VisibilityEngine + ?Sized> ViewshedWorker<'a, E> {
    /// Create a worker; fails when the elevation raster is unknown to the
    /// engine and region restriction needs its grid.
    pub fn new(engine: &'a E, config: &'a WorkerConfig) -> Result<Self, EngineError> {
        config.output_name(ViewpointId(0))?;

        let grid = if config.restrict_region && is_bounded(config.max_distance) {
            Some(engine.grid(&config.elevation)?)
        } else {
            None
        };
        Ok(Self { engine, config, grid })
    }

    pub fn config(&self) -> &WorkerConfig {
        self.config
    }

    pub fn engine(&self) -> &E {
        self.engine
    }

    /// Compute the viewshed for one viewpoint.
    ///
    /// Recoverable engine failures come back as `WorkResult::Failure`;
    /// unexpected ones are returned as errors.
    pub fn run(&self, viewpoint: &Viewpoint) -> Result<PointOutcome, EngineError> {
        let output = self.config.output_name(viewpoint.id)?;

        let attempt = self
            .region_for(viewpoint)
            .and_then(|region| {
                self.engine.viewshed(&ViewshedRequest {
                    elevation: &self.config.elevation,
                    x: viewpoint.x,
                    y: viewpoint.y,
                    max_distance: self.config.max_distance,
                    observer_elevation: self.config.observer_elevation,
                    target_elevation: self.config.target_elevation,
                    region,
                    output: &output,
                })
            });

        let result = match attempt {
            Ok(name) => WorkResult::Success(name),
            Err(e) => match e.failure_kind() {
                Some(kind) => {
                    warn!("Viewpoint {} failed: {}", viewpoint.id, e);
                    WorkResult::Failure(PointFailure::new(kind, e.to_string()))
                }
                None => return Err(e),
            },
        };

        Ok(PointOutcome {
            viewpoint: *viewpoint,
            result,
        })
    }

    fn region_for(&self, viewpoint: &Viewpoint) -> Result<Option<Region>, EngineError> {
        match &self.grid {
            Some(grid) => Region::from_viewpoint(viewpoint, self.config.max_distance, grid).map(Some),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::NativeEngine;
    use cumview_core::{GeoTransform, MemoryStore, Raster, RasterStore};

    fn name(s: &str) -> RasterName {
        RasterName::new(s).unwrap()
    }

    fn engine() -> NativeEngine<MemoryStore> {
        let store = MemoryStore::new();
        let mut dem = Raster::filled(30, 30, 50.0);
        dem.set_transform(GeoTransform::new(0.0, 300.0, 10.0, -10.0));
        store.write(&name("dem"), dem).unwrap();
        NativeEngine::new(store)
    }

    #[test]
    fn test_output_names() {
        let mut config = WorkerConfig::new(name("dem"), 100.0);
        config.output_prefix = "vs".into();
        assert_eq!(config.output_name(ViewpointId(12)).unwrap().as_str(), "vs_12");

        config.output_prefix = "bad prefix".into();
        assert!(config.output_name(ViewpointId(1)).is_err());
    }

    #[test]
    fn test_success_and_recoverable_failure() {
        let engine = engine();
        let config = WorkerConfig::new(name("dem"), 60.0);
        let worker = ViewshedWorker::new(&engine, &config).unwrap();

        let ok = worker.run(&Viewpoint::new(1, 150.0, 150.0)).unwrap();
        assert_eq!(ok.result, WorkResult::Success(name("viewshed_1")));
        assert!(engine.store().contains(&name("viewshed_1")));

        let outside = worker.run(&Viewpoint::new(2, -500.0, 150.0)).unwrap();
        match outside.result {
            WorkResult::Failure(failure) => assert_eq!(failure.kind, FailureKind::InvalidObserver),
            other => panic!("unexpected result: {other:?}"),
        }
        assert_eq!(outside.viewpoint.id, ViewpointId(2));
    }

    #[test]
    fn test_restricted_region_with_far_viewpoint_fails_softly() {
        let engine = engine();
        let mut config = WorkerConfig::new(name("dem"), 60.0);
        config.restrict_region = true;
        let worker = ViewshedWorker::new(&engine, &config).unwrap();

        let far = worker.run(&Viewpoint::new(3, 10_000.0, 10_000.0)).unwrap();
        assert!(matches!(
            far.result,
            WorkResult::Failure(ref f) if f.kind == FailureKind::DegenerateRegion && f.reason.contains("region")
        ));
    }

    #[test]
    fn test_unexpected_error_propagates() {
        let engine = engine();
        let config = WorkerConfig::new(name("missing_dem"), 60.0);
        let worker = ViewshedWorker::new(&engine, &config).unwrap();

        let err = worker.run(&Viewpoint::new(1, 150.0, 150.0)).unwrap_err();
        assert!(matches!(err, EngineError::MissingRaster(_)));
    }

    #[test]
    fn test_region_lookup_needs_elevation() {
        let engine = engine();
        let mut config = WorkerConfig::new(name("missing_dem"), 60.0);
        config.restrict_region = true;
        assert!(ViewshedWorker::new(&engine, &config).is_err());
    }
}

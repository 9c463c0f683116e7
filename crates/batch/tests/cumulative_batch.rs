//! End-to-end behaviour of the cumulative viewshed batch.
//!
//! A scripted engine drives the coordinator through chosen successes and
//! failures; the native engine covers pool-size and region invariance on a
//! synthetic terrain.

use cumview_batch::viewpoint::viewpoints_along_line;
use cumview_batch::{
    filter_by_height, Aggregator, BatchError, BatchReport, Coordinator, EngineError, FailureKind, NativeEngine,
    PointState, RunSummary, ViewshedRequest, ViewshedWorker, VisibilityEngine, Viewpoint, ViewpointId, WorkResult, WorkerConfig,
};
use cumview_core::io::write_geotiff_to_buffer;
use cumview_core::{DirStore, GeoTransform, GridSpec, MemoryStore, Raster, RasterName, RasterStore};
use geo::LineString;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

fn name(s: &str) -> RasterName {
    RasterName::new(s).unwrap()
}

// ── Scripted engine ───────────────────────────────────────────────────

/// What the scripted engine does for a viewpoint, keyed by its x coordinate
#[derive(Clone)]
enum Script {
    Sees(Vec<(usize, usize)>),
    Fails,
    Breaks,
}

/// Engine whose viewsheds are scripted; counting goes through the native
/// engine on the same store
struct ScriptedEngine {
    grid: GridSpec,
    script: HashMap<u64, Script>,
    native: NativeEngine<Arc<MemoryStore>>,
    calls: AtomicUsize,
}

impl ScriptedEngine {
    fn new(script: &[(u64, Script)]) -> Self {
        let grid = GridSpec::new(GeoTransform::new(0.0, 2.0, 1.0, -1.0), 2, 2);
        let store = Arc::new(MemoryStore::new());
        store.write(&name("dem"), Raster::from_grid(&grid, 10.0)).unwrap();
        Self {
            grid,
            script: script.iter().cloned().collect(),
            native: NativeEngine::new(store),
            calls: AtomicUsize::new(0),
        }
    }

    fn read(&self, raster: &RasterName) -> Arc<Raster<f64>> {
        self.native.store().read(raster).unwrap()
    }
}

impl VisibilityEngine for ScriptedEngine {
    fn name(&self) -> &'static str {
        "scripted"
    }

    fn grid(&self, raster: &RasterName) -> Result<GridSpec, EngineError> {
        self.native.grid(raster)
    }

    fn viewshed(&self, request: &ViewshedRequest<'_>) -> Result<RasterName, EngineError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match self.script.get(&(request.x as u64)) {
            Some(Script::Sees(cells)) => {
                let mut vis = Raster::from_grid(&self.grid, f64::NAN);
                for &(row, col) in cells {
                    vis.set(row, col, 1.0).unwrap();
                }
                self.native.store().write(request.output, vis)?;
                Ok(request.output.clone())
            }
            Some(Script::Fails) | None => Err(EngineError::Module {
                module: "r.viewshed".into(),
                status: "exit status: 1".into(),
                stderr: "ERROR: observer outside region".into(),
            }),
            Some(Script::Breaks) => Err(EngineError::MissingRaster("dem".into())),
        }
    }

    fn count(&self, inputs: &[RasterName], template: &GridSpec, output: &RasterName) -> Result<RasterName, EngineError> {
        self.native.count(inputs, template, output)
    }

    fn remove(&self, raster: &RasterName) -> Result<bool, EngineError> {
        self.native.remove(raster)
    }
}

fn run_scripted(engine: &ScriptedEngine, points: &[Viewpoint], workers: usize) -> Result<BatchReport, BatchError> {
    let config = WorkerConfig::new(name("dem"), 10.0);
    let worker = ViewshedWorker::new(engine, &config).unwrap();
    Coordinator::new(workers).unwrap().run(&worker, points)
}

fn abc() -> Vec<Viewpoint> {
    vec![
        Viewpoint::new(1, 0.0, 0.0),
        Viewpoint::new(2, 1.0, 0.0),
        Viewpoint::new(3, 2.0, 0.0),
    ]
}

fn abc_engine() -> ScriptedEngine {
    ScriptedEngine::new(&[
        (0, Script::Sees(vec![(0, 0), (0, 1)])),
        (1, Script::Sees(vec![(0, 0)])),
        (2, Script::Fails),
    ])
}

// ── Scripted scenarios ────────────────────────────────────────────────

#[test]
fn test_two_by_two_scenario() {
    let engine = abc_engine();
    let report = run_scripted(&engine, &abc(), 1).unwrap();

    assert_eq!(report.succeeded.len(), 2);
    assert_eq!(report.failed_ids(), vec![ViewpointId(3)]);
    let (_, failure) = &report.failed[0];
    assert_eq!(failure.kind, FailureKind::Module);
    assert!(failure.reason.contains("observer outside region"));
    assert_eq!(report.state_of(ViewpointId(3)), PointState::Failed);

    let out = Aggregator::new(&engine)
        .aggregate_report(&report, &engine.grid, &name("cumulative"))
        .unwrap();
    let cum = engine.read(&out);
    assert_eq!(cum.get(0, 0).unwrap(), 2.0);
    assert_eq!(cum.get(0, 1).unwrap(), 1.0);
    assert!(cum.get(1, 0).unwrap().is_nan());
    assert!(cum.get(1, 1).unwrap().is_nan());
}

#[test]
fn test_reversed_dispatch_order_gives_identical_raster() {
    let engine = abc_engine();
    let forward = run_scripted(&engine, &abc(), 1).unwrap();
    let a = Aggregator::new(&engine)
        .aggregate_report(&forward, &engine.grid, &name("forward"))
        .unwrap();

    let mut reversed_points = abc();
    reversed_points.reverse();
    let reversed = run_scripted(&engine, &reversed_points, 3).unwrap();
    assert_eq!(forward, reversed);

    let b = Aggregator::new(&engine)
        .aggregate_report(&reversed, &engine.grid, &name("reversed"))
        .unwrap();
    assert_eq!(
        write_geotiff_to_buffer(engine.read(&a).as_ref()).unwrap(),
        write_geotiff_to_buffer(engine.read(&b).as_ref()).unwrap()
    );
}

#[test]
fn test_all_failures_give_empty_cumulative_raster() {
    let engine = ScriptedEngine::new(&[(0, Script::Fails), (1, Script::Fails)]);
    let points = vec![Viewpoint::new(1, 0.0, 0.0), Viewpoint::new(2, 1.0, 0.0)];

    let report = run_scripted(&engine, &points, 2).unwrap();
    assert!(report.succeeded.is_empty());
    assert_eq!(report.failed.len(), 2);

    let out = Aggregator::new(&engine)
        .aggregate_report(&report, &engine.grid, &name("cumulative"))
        .unwrap();
    let cum = engine.read(&out);
    assert_eq!(cum.shape(), (2, 2));
    assert_eq!(cum.defined_count(), 0);
}

#[test]
fn test_unexpected_error_aborts_batch() {
    let engine = ScriptedEngine::new(&[
        (0, Script::Sees(vec![(0, 0)])),
        (1, Script::Breaks),
        (2, Script::Sees(vec![(1, 1)])),
        (3, Script::Sees(vec![(1, 0)])),
    ]);
    let points: Vec<Viewpoint> = (0..4u64).map(|i| Viewpoint::new(i + 1, i as f64, 0.0)).collect();

    let err = run_scripted(&engine, &points, 1).unwrap_err();
    match err {
        BatchError::Engine { id, source } => {
            assert_eq!(id, ViewpointId(2));
            assert!(matches!(source, EngineError::MissingRaster(_)));
        }
        other => panic!("unexpected error: {other}"),
    }
    // Sequential dispatch stops at the broken viewpoint
    assert_eq!(engine.calls.load(Ordering::SeqCst), 2);
}

#[test]
fn test_duplicate_ids_are_rejected() {
    let engine = abc_engine();
    let points = vec![Viewpoint::new(1, 0.0, 0.0), Viewpoint::new(1, 1.0, 0.0)];
    assert!(matches!(run_scripted(&engine, &points, 1), Err(BatchError::Config(_))));
    assert_eq!(engine.calls.load(Ordering::SeqCst), 0);
}

#[test]
fn test_progress_sees_every_viewpoint() {
    let engine = abc_engine();
    let config = WorkerConfig::new(name("dem"), 10.0);
    let worker = ViewshedWorker::new(&engine, &config).unwrap();
    let seen = AtomicUsize::new(0);
    let failed = AtomicUsize::new(0);

    Coordinator::new(2)
        .unwrap()
        .run_with_progress(&worker, &abc(), |outcome| {
            seen.fetch_add(1, Ordering::SeqCst);
            if matches!(outcome.result, WorkResult::Failure(_)) {
                failed.fetch_add(1, Ordering::SeqCst);
            }
        })
        .unwrap();

    assert_eq!(seen.load(Ordering::SeqCst), 3);
    assert_eq!(failed.load(Ordering::SeqCst), 1);
}

// ── Native engine on synthetic terrain ────────────────────────────────

/// 60x60 cells of 10 m with rolling hills, north-west corner at (0, 600)
fn terrain() -> Raster<f64> {
    let mut dem = Raster::new(60, 60);
    dem.set_transform(GeoTransform::new(0.0, 600.0, 10.0, -10.0));
    for row in 0..60 {
        for col in 0..60 {
            let hills = (row as f64 * 0.21).sin() * 25.0 + (col as f64 * 0.17).cos() * 18.0;
            let texture = ((row * 7 + col * 13) % 11) as f64;
            dem.set(row, col, 300.0 + hills + texture).unwrap();
        }
    }
    dem
}

fn trail() -> Vec<Viewpoint> {
    let line = LineString::from(vec![(35.0, 45.0), (305.0, 315.0), (575.0, 205.0)]);
    let points = viewpoints_along_line(&line, 75.0).unwrap();
    points.into_iter().take(10).collect()
}

fn native_cumulative(workers: usize, restrict_region: bool, output: &str) -> Vec<u8> {
    let store = MemoryStore::new();
    store.write(&name("dem"), terrain()).unwrap();
    let engine = NativeEngine::new(store);

    let mut config = WorkerConfig::new(name("dem"), 150.0);
    config.restrict_region = restrict_region;
    let worker = ViewshedWorker::new(&engine, &config).unwrap();

    let points = trail();
    assert_eq!(points.len(), 10);
    let report = Coordinator::new(workers).unwrap().run(&worker, &points).unwrap();
    assert_eq!(report.succeeded.len(), 10);

    let grid = engine.grid(&name("dem")).unwrap();
    let out = Aggregator::new(&engine)
        .aggregate_report(&report, &grid, &name(output))
        .unwrap();
    let cum = engine.store().read(&out).unwrap();
    write_geotiff_to_buffer(cum.as_ref()).unwrap()
}

#[test]
fn test_pool_size_does_not_change_output() {
    let sequential = native_cumulative(1, false, "cum");
    let pooled = native_cumulative(4, false, "cum");
    assert_eq!(sequential, pooled);
}

#[test]
fn test_region_restriction_does_not_change_output() {
    let unrestricted = native_cumulative(1, false, "cum");
    let restricted = native_cumulative(3, true, "cum");
    assert_eq!(unrestricted, restricted);
}

#[test]
fn test_huge_max_distance_completes() {
    let store = MemoryStore::new();
    let mut dem = Raster::filled(10, 10, 50.0);
    dem.set_transform(GeoTransform::new(0.0, 100.0, 10.0, -10.0));
    store.write(&name("dem"), dem).unwrap();
    let engine = NativeEngine::new(store);
    let points = [Viewpoint::new(1, 45.0, 55.0)];

    let mut outputs = Vec::new();
    for restrict_region in [false, true] {
        let mut config = WorkerConfig::new(name("dem"), 1.0e10);
        config.restrict_region = restrict_region;
        config.output_prefix = format!("vs{}", u8::from(restrict_region));
        let worker = ViewshedWorker::new(&engine, &config).unwrap();

        let report = Coordinator::new(1).unwrap().run(&worker, &points).unwrap();
        assert_eq!(report.succeeded.len(), 1);
        let vis = engine.store().read(&report.outputs()[0]).unwrap();
        assert_eq!(vis.defined_count(), 100);
        outputs.push(write_geotiff_to_buffer(vis.as_ref()).unwrap());
    }
    assert_eq!(outputs[0], outputs[1]);
}

// ── Full pipeline on a directory store ────────────────────────────────

#[test]
fn test_pipeline_with_directory_store() {
    let dir = tempfile::tempdir().unwrap();
    let store = DirStore::open(dir.path()).unwrap();
    store.write(&name("dem"), terrain()).unwrap();
    let engine = NativeEngine::new(store);

    // Height above ground: a 40 m building block in the north-east quarter
    let mut height = Raster::from_grid(&engine.grid(&name("dem")).unwrap(), 0.5);
    for row in 0..30 {
        for col in 30..60 {
            height.set(row, col, 40.0).unwrap();
        }
    }

    let points = trail();
    let filtered = filter_by_height(&points, &height, 2.0);
    assert!(!filtered.too_high.is_empty());
    assert!(filtered.unknown.is_empty());

    let mut config = WorkerConfig::new(name("dem"), 150.0);
    config.restrict_region = true;
    config.output_prefix = "vs".into();
    let worker = ViewshedWorker::new(&engine, &config).unwrap();
    let report = Coordinator::new(2).unwrap().run(&worker, &filtered.kept).unwrap();
    assert_eq!(report.succeeded.len(), filtered.kept.len());
    assert!(dir.path().join(format!("vs_{}.tif", filtered.kept[0].id)).is_file());

    let grid = engine.grid(&name("dem")).unwrap();
    let aggregator = Aggregator::new(&engine);
    let out = aggregator.aggregate_report(&report, &grid, &name("cumulative")).unwrap();
    let removed = aggregator.cleanup(&report).unwrap();
    assert_eq!(removed, filtered.kept.len());

    let names = engine.store().names().unwrap();
    assert_eq!(names, vec![name("cumulative"), name("dem")]);

    let cum = engine.store().read(&out).unwrap();
    let stats = cum.statistics();
    assert!(stats.valid_count > 0);
    assert!(stats.max.unwrap() <= filtered.kept.len() as f64);

    let summary = RunSummary::new("native", 2, points.len(), Some(&filtered), &report, out);
    assert_eq!(summary.kept + summary.filtered_too_high.len(), points.len());
    assert!(summary.failed.is_empty());
}

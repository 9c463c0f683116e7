//! # CumView Batch
//!
//! Cumulative viewshed as a fan-out/fan-in batch job.
//!
//! Stages, leaves first:
//! - [`viewpoint`]: viewpoints along a line, CSV exchange
//! - [`filter`]: drop viewpoints standing too high above ground
//! - [`worker`]: one viewshed per viewpoint, as a typed [`WorkResult`]
//! - [`coordinator`]: fixed-size worker pool, failures surfaced in a [`BatchReport`]
//! - [`aggregate`]: per-cell count of the successful visibility rasters
//!
//! Heavy raster work goes through a [`VisibilityEngine`]: the in-process
//! [`NativeEngine`] or the GRASS GIS command-line modules ([`GrassEngine`]).
//! Computation regions are values passed per invocation; no global region
//! state exists.

pub mod aggregate;
pub mod config;
pub mod coordinator;
pub mod engine;
pub mod error;
pub mod filter;
pub mod region;
pub mod summary;
pub mod viewpoint;
pub mod worker;

pub use aggregate::Aggregator;
pub use config::{EngineKind, JobConfig, PointSource};
pub use coordinator::{BatchReport, Coordinator, PointState};
pub use engine::{GrassConfig, GrassEngine, NativeEngine, ViewshedRequest, VisibilityEngine};
pub use error::{BatchError, ConfigError, EngineError, FailureKind, PointError};
pub use filter::{filter_by_height, FilterOutcome, HeightLookup};
pub use region::Region;
pub use summary::RunSummary;
pub use viewpoint::{Viewpoint, ViewpointId};
pub use worker::{PointFailure, PointOutcome, ViewshedWorker, WorkResult, WorkerConfig};

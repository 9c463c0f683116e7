//! Batch coordinator: fan viewpoints out over a fixed worker pool
//!
//! Each viewpoint moves `Pending → Dispatched → (Succeeded | Failed)`. A
//! recoverable failure only marks its own viewpoint as failed; an unexpected
//! engine error stops dispatching and aborts the batch. There are no
//! retries.

use crate::engine::VisibilityEngine;
use crate::error::BatchError;
use crate::viewpoint::{ensure_unique_ids, Viewpoint, ViewpointId};
use crate::worker::{PointFailure, PointOutcome, ViewshedWorker, WorkResult};
use cumview_core::RasterName;
use cumview_parallel::{ParallelStrategy, ProcessingMode};
use serde::Serialize;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Lifecycle of one viewpoint within a batch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PointState {
    Pending,
    Dispatched,
    Succeeded,
    Failed,
}

impl PointState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, PointState::Succeeded | PointState::Failed)
    }
}

/// Outcome of a completed batch
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BatchReport {
    /// Successful viewpoints with their visibility raster, sorted by id
    pub succeeded: Vec<(ViewpointId, RasterName)>,
    /// Failed viewpoints with the failure kind and reason, sorted by id
    pub failed: Vec<(ViewpointId, PointFailure)>,
}

impl BatchReport {
    fn from_outcomes(outcomes: Vec<PointOutcome>) -> Self {
        let mut report = BatchReport::default();
        for outcome in outcomes {
            match outcome.result {
                WorkResult::Success(name) => report.succeeded.push((outcome.viewpoint.id, name)),
                WorkResult::Failure(failure) => report.failed.push((outcome.viewpoint.id, failure)),
            }
        }
        report.succeeded.sort_by_key(|(id, _)| *id);
        report.failed.sort_by_key(|(id, _)| *id);
        report
    }

    /// Names of the successful visibility rasters, in viewpoint id order
    pub fn outputs(&self) -> Vec<RasterName> {
        self.succeeded.iter().map(|(_, name)| name.clone()).collect()
    }

    pub fn failed_ids(&self) -> Vec<ViewpointId> {
        self.failed.iter().map(|(id, _)| *id).collect()
    }

    /// Number of viewpoints that reached a terminal state
    pub fn total(&self) -> usize {
        self.succeeded.len() + self.failed.len()
    }

    /// Terminal state of a viewpoint, `Pending` when it was not part of the batch
    pub fn state_of(&self, id: ViewpointId) -> PointState {
        if self.succeeded.iter().any(|(i, _)| *i == id) {
            PointState::Succeeded
        } else if self.failed.iter().any(|(i, _)| *i == id) {
            PointState::Failed
        } else {
            PointState::Pending
        }
    }
}

/// Distributes viewpoints across a fixed-size pool of workers
#[derive(Debug, Clone, Copy)]
pub struct Coordinator {
    mode: ProcessingMode,
}

impl Coordinator {
    /// Coordinator with `workers` concurrent invocations.
    ///
    /// One worker runs sequentially on the calling thread; zero is a
    /// configuration error.
    pub fn new(workers: usize) -> Result<Self, BatchError> {
        Ok(Self {
            mode: ProcessingMode::with_workers(workers)?,
        })
    }

    pub fn workers(&self) -> usize {
        self.mode.workers()
    }

    /// Run every viewpoint through `worker`
    pub fn run<E>(&self, worker: &ViewshedWorker<'_, E>, viewpoints: &[Viewpoint]) -> Result<BatchReport, BatchError>
    where
        E: VisibilityEngine + ?Sized,
    {
        self.run_with_progress(worker, viewpoints, |_| {})
    }

    /// Run every viewpoint through `worker`, calling `progress` once per
    /// viewpoint as it reaches a terminal state
    pub fn run_with_progress<E, F>(
        &self,
        worker: &ViewshedWorker<'_, E>,
        viewpoints: &[Viewpoint],
        progress: F,
    ) -> Result<BatchReport, BatchError>
    where
        E: VisibilityEngine + ?Sized,
        F: Fn(&PointOutcome) + Sync + Send,
    {
        ensure_unique_ids(viewpoints).map_err(|e| BatchError::Config(e.to_string()))?;

        info!(
            "Dispatching {} viewpoints to {} worker(s) using the {} engine",
            viewpoints.len(),
            self.workers(),
            worker.engine().name()
        );
        let start = Instant::now();

        let outcomes = self.mode.try_map(viewpoints, |vp| -> Result<PointOutcome, BatchError> {
            debug!("Viewpoint {} {:?}", vp.id, PointState::Dispatched);
            let outcome = worker.run(vp).map_err(|source| BatchError::Engine { id: vp.id, source })?;
            let state = if outcome.result.is_success() {
                PointState::Succeeded
            } else {
                PointState::Failed
            };
            debug!("Viewpoint {} {:?}", vp.id, state);
            progress(&outcome);
            Ok(outcome)
        })?;

        let report = BatchReport::from_outcomes(outcomes);
        info!(
            "Batch finished in {:.2?}: {} succeeded, {} failed",
            start.elapsed(),
            report.succeeded.len(),
            report.failed.len()
        );
        if !report.failed.is_empty() {
            warn!(
                "Failed viewpoints: {}",
                report
                    .failed_ids()
                    .iter()
                    .map(ToString::to_string)
                    .collect::<Vec<_>>()
                    .join(", ")
            );
        }
        Ok(report)
    }
}

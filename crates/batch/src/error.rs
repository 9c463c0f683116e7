//! Error types for the batch job

use crate::viewpoint::ViewpointId;
use cumview_parallel::PoolError;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Errors raised while producing or exchanging viewpoints
#[derive(Error, Debug)]
pub enum PointError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Duplicate viewpoint id {0}")]
    DuplicateId(ViewpointId),

    #[error("Invalid line geometry: {0}")]
    InvalidLine(String),

    #[error(transparent)]
    Core(#[from] cumview_core::Error),
}

/// Errors reported by a visibility engine.
///
/// Kinds split into recoverable ones, which only concern the viewpoint being
/// processed, and unexpected ones, which point at a systemic problem and
/// abort the batch. See [`EngineError::is_recoverable`].
#[derive(Error, Debug)]
pub enum EngineError {
    /// An external module exited with a failure status
    #[error("{module} failed ({status}): {stderr}")]
    Module {
        module: String,
        status: String,
        stderr: String,
    },

    #[error("{module} timed out after {elapsed:?}")]
    Timeout { module: String, elapsed: Duration },

    #[error("Invalid observer at ({x}, {y}): {reason}")]
    InvalidObserver { x: f64, y: f64, reason: String },

    #[error("Degenerate region: {0}")]
    DegenerateRegion(String),

    #[error("Raster not found: {0}")]
    MissingRaster(String),

    /// The engine executable could not be started at all
    #[error("Failed to run {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Raster store error: {0}")]
    Store(#[source] cumview_core::Error),

    #[error("Grid mismatch: {0}")]
    GridMismatch(String),

    #[error("Failed to parse {what}: {detail}")]
    Parse { what: String, detail: String },
}

/// Kind of a recoverable failure, kept in reports next to the message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Module,
    Timeout,
    InvalidObserver,
    DegenerateRegion,
}

impl EngineError {
    /// Kind of a recoverable failure; `None` for unexpected errors
    pub fn failure_kind(&self) -> Option<FailureKind> {
        match self {
            EngineError::Module { .. } => Some(FailureKind::Module),
            EngineError::Timeout { .. } => Some(FailureKind::Timeout),
            EngineError::InvalidObserver { .. } => Some(FailureKind::InvalidObserver),
            EngineError::DegenerateRegion(_) => Some(FailureKind::DegenerateRegion),
            _ => None,
        }
    }

    /// Whether the failure only concerns the current viewpoint.
    ///
    /// Recoverable failures become `WorkResult::Failure`; anything else
    /// aborts the batch.
    pub fn is_recoverable(&self) -> bool {
        self.failure_kind().is_some()
    }
}

impl From<cumview_core::Error> for EngineError {
    fn from(err: cumview_core::Error) -> Self {
        match err {
            cumview_core::Error::RasterNotFound(name) => EngineError::MissingRaster(name),
            cumview_core::Error::GridMismatch { name, reason } => {
                EngineError::GridMismatch(format!("{}: {}", name, reason))
            }
            other => EngineError::Store(other),
        }
    }
}

/// Errors that abort a batch
#[derive(Error, Debug)]
pub enum BatchError {
    #[error("Invalid batch configuration: {0}")]
    Config(String),

    #[error("Worker pool error: {0}")]
    ThreadPool(#[source] PoolError),

    /// Unexpected engine failure while processing a viewpoint
    #[error("Viewpoint {id}: {source}")]
    Engine {
        id: ViewpointId,
        #[source]
        source: EngineError,
    },
}

impl From<PoolError> for BatchError {
    fn from(err: PoolError) -> Self {
        match err {
            PoolError::ZeroWorkers => BatchError::Config(err.to_string()),
            other => BatchError::ThreadPool(other),
        }
    }
}

/// Errors loading or validating a job file
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read job file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid job file: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Invalid value for '{field}': {reason}")]
    Invalid { field: &'static str, reason: String },
}

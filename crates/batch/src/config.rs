//! Job file: a whole cumulative viewshed run described in YAML
//!
//! ```yaml
//! engine: native
//! store: ./rasters
//! points:
//!   line:
//!     coordinates: "630100,220100;634900,221800"
//!     spacing: 250
//! height_filter:
//!   raster: ./height.tif
//!   max_height: 2.0
//! viewshed:
//!   elevation: dem
//!   max_distance: 3000
//!   restrict_region: true
//! workers: 4
//! output: cumulative
//! ```

use crate::engine::GrassConfig;
use crate::error::ConfigError;
use crate::viewpoint::ViewpointId;
use crate::worker::WorkerConfig;
use cumview_core::RasterName;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

// ============================================================================
// Job File Sections
// ============================================================================

/// Which visibility engine runs the job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EngineKind {
    /// In-process kernels over a directory of GeoTIFFs
    #[default]
    Native,
    /// GRASS GIS modules
    Grass,
}

/// Where the viewpoints come from
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PointSource {
    /// CSV file with an `id,x,y` header
    Csv { path: PathBuf },
    /// Points every `spacing` units along a line written `x,y;x,y;...`
    Line { coordinates: String, spacing: f64 },
}

/// Drop viewpoints standing higher than `max_height` above ground
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HeightFilterConfig {
    /// GeoTIFF holding height above ground (DSM minus DTM)
    pub raster: PathBuf,
    pub max_height: f64,
}

// ============================================================================
// Job Configuration
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobConfig {
    #[serde(default)]
    pub engine: EngineKind,
    /// Raster directory used by the native engine
    #[serde(default = "default_store")]
    pub store: PathBuf,
    pub points: PointSource,
    #[serde(default)]
    pub height_filter: Option<HeightFilterConfig>,
    pub viewshed: WorkerConfig,
    #[serde(default = "default_workers")]
    pub workers: usize,
    /// Name of the cumulative raster
    pub output: RasterName,
    /// Remove per-point rasters once the cumulative raster is written
    #[serde(default)]
    pub cleanup: bool,
    #[serde(default)]
    pub grass: GrassConfig,
}

fn default_store() -> PathBuf {
    PathBuf::from(".")
}

fn default_workers() -> usize {
    1
}

impl JobConfig {
    /// Parse and validate a job description
    pub fn from_yaml_str(text: &str) -> Result<Self, ConfigError> {
        let config: JobConfig = serde_yaml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a job file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml_str(&text)
    }

    pub fn to_yaml_string(&self) -> Result<String, ConfigError> {
        Ok(serde_yaml::to_string(self)?)
    }

    /// Check value ranges that the YAML types cannot express
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.workers == 0 {
            return Err(invalid("workers", "must be at least 1"));
        }

        let vs = &self.viewshed;
        if !(vs.max_distance > 0.0) {
            return Err(invalid("viewshed.max_distance", format!("must be positive, got {}", vs.max_distance)));
        }
        if !vs.observer_elevation.is_finite() || !vs.target_elevation.is_finite() {
            return Err(invalid("viewshed", "observer and target elevations must be finite"));
        }
        if let Err(e) = vs.output_name(ViewpointId(0)) {
            return Err(invalid("viewshed.output_prefix", e.to_string()));
        }

        match &self.points {
            PointSource::Csv { path } if path.as_os_str().is_empty() => {
                return Err(invalid("points.csv.path", "must not be empty"));
            }
            PointSource::Line { coordinates, .. } if coordinates.trim().is_empty() => {
                return Err(invalid("points.line.coordinates", "must not be empty"));
            }
            PointSource::Line { spacing, .. } if !(spacing.is_finite() && *spacing > 0.0) => {
                return Err(invalid("points.line.spacing", format!("must be positive, got {}", spacing)));
            }
            _ => {}
        }

        if let Some(filter) = &self.height_filter {
            if !filter.max_height.is_finite() {
                return Err(invalid("height_filter.max_height", "must be finite"));
            }
            if filter.raster.as_os_str().is_empty() {
                return Err(invalid("height_filter.raster", "must not be empty"));
            }
        }

        if self.engine == EngineKind::Grass && self.grass.timeout_secs == 0 {
            return Err(invalid("grass.timeout_secs", "must be at least 1"));
        }
        Ok(())
    }
}

fn invalid(field: &'static str, reason: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        field,
        reason: reason.into(),
    }
}

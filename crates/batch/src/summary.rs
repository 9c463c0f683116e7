//! Machine-readable summary of a run

use crate::coordinator::BatchReport;
use crate::error::FailureKind;
use crate::filter::FilterOutcome;
use crate::viewpoint::ViewpointId;
use cumview_core::RasterName;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Counts and identifiers describing one cumulative viewshed run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub engine: String,
    pub workers: usize,
    /// Viewpoints produced by the point source
    pub viewpoints: usize,
    /// Viewpoints left after the height filter
    pub kept: usize,
    pub filtered_too_high: Vec<ViewpointId>,
    pub filtered_unknown_height: Vec<ViewpointId>,
    pub succeeded: usize,
    /// Failed viewpoints with their kinds and reasons
    pub failed: Vec<FailedPoint>,
    pub output: RasterName,
    /// Per-point rasters removed after aggregation
    pub cleaned_up: usize,
    pub elapsed_secs: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailedPoint {
    pub id: ViewpointId,
    pub kind: FailureKind,
    pub reason: String,
}

impl RunSummary {
    pub fn new(
        engine: &str,
        workers: usize,
        viewpoints: usize,
        filter: Option<&FilterOutcome>,
        report: &BatchReport,
        output: RasterName,
    ) -> Self {
        Self {
            engine: engine.to_string(),
            workers,
            viewpoints,
            kept: filter.map_or(viewpoints, |f| f.kept.len()),
            filtered_too_high: filter.map(|f| f.too_high.clone()).unwrap_or_default(),
            filtered_unknown_height: filter.map(|f| f.unknown.clone()).unwrap_or_default(),
            succeeded: report.succeeded.len(),
            failed: report
                .failed
                .iter()
                .map(|(id, failure)| FailedPoint {
                    id: *id,
                    kind: failure.kind,
                    reason: failure.reason.clone(),
                })
                .collect(),
            output,
            cleaned_up: 0,
            elapsed_secs: 0.0,
        }
    }

    pub fn with_elapsed(mut self, elapsed: Duration) -> Self {
        self.elapsed_secs = elapsed.as_secs_f64();
        self
    }

    pub fn with_cleaned_up(mut self, removed: usize) -> Self {
        self.cleaned_up = removed;
        self
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::viewpoint::Viewpoint;
    use crate::worker::PointFailure;

    #[test]
    fn test_summary_json() {
        let report = BatchReport {
            succeeded: vec![(ViewpointId(1), RasterName::new("vs_1").unwrap())],
            failed: vec![(ViewpointId(3), PointFailure::new(FailureKind::Module, "outside"))],
        };
        let filter = FilterOutcome {
            kept: vec![Viewpoint::new(1, 0.0, 0.0), Viewpoint::new(3, 1.0, 0.0)],
            too_high: vec![ViewpointId(2)],
            unknown: vec![],
        };

        let summary = RunSummary::new("native", 2, 3, Some(&filter), &report, RasterName::new("cum").unwrap())
            .with_elapsed(Duration::from_millis(1500));

        assert_eq!(summary.kept, 2);
        assert_eq!(summary.succeeded, 1);
        assert_eq!(summary.elapsed_secs, 1.5);

        let json: serde_json::Value = serde_json::from_str(&summary.to_json().unwrap()).unwrap();
        assert_eq!(json["failed"][0]["id"], 3);
        assert_eq!(json["failed"][0]["kind"], "module");
        assert_eq!(json["failed"][0]["reason"], "outside");
        assert_eq!(json["filtered_too_high"][0], 2);
        assert_eq!(json["output"], "cum");
    }
}

//! Per-invocation computation regions
//!
//! A [`Region`] is a plain value handed to one engine invocation. The native
//! engine turns it into a window of the elevation grid; the GRASS engine
//! serializes it into the child process's own `GRASS_REGION` variable.

use crate::error::EngineError;
use crate::viewpoint::Viewpoint;
use cumview_core::raster::Window;
use cumview_core::{GeoTransform, GridSpec};
use serde::{Deserialize, Serialize};

/// Rectangular extent aligned to a raster grid
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Region {
    pub north: f64,
    pub south: f64,
    pub east: f64,
    pub west: f64,
    /// North-south cell size
    pub ns_res: f64,
    /// East-west cell size
    pub ew_res: f64,
    pub rows: usize,
    pub cols: usize,
}

impl Region {
    /// Region covering a whole grid
    pub fn from_grid(grid: &GridSpec) -> Self {
        let (west, south, east, north) = grid.bounds();
        Self {
            north,
            south,
            east,
            west,
            ns_res: grid.transform.cell_height(),
            ew_res: grid.transform.cell_size(),
            rows: grid.rows,
            cols: grid.cols,
        }
    }

    /// Region of `viewpoint ± max_distance`, snapped outward to `grid` and
    /// clipped to it.
    ///
    /// # Errors
    /// `DegenerateRegion` when the distance is not a positive finite value or
    /// the extent does not overlap the grid.
    pub fn from_viewpoint(viewpoint: &Viewpoint, max_distance: f64, grid: &GridSpec) -> Result<Self, EngineError> {
        if !(max_distance.is_finite() && max_distance > 0.0) {
            return Err(EngineError::DegenerateRegion(format!(
                "max distance {} does not bound a region",
                max_distance
            )));
        }

        let window = grid
            .window_covering(
                viewpoint.x - max_distance,
                viewpoint.y - max_distance,
                viewpoint.x + max_distance,
                viewpoint.y + max_distance,
            )
            .ok_or_else(|| {
                EngineError::DegenerateRegion(format!(
                    "extent around ({}, {}) does not overlap the elevation grid",
                    viewpoint.x, viewpoint.y
                ))
            })?;

        Ok(Self::from_grid(&grid.sub_grid(&window)))
    }

    /// Grid geometry of this region, north-up
    pub fn grid(&self) -> GridSpec {
        GridSpec::new(
            GeoTransform::new(self.west, self.north, self.ew_res, -self.ns_res),
            self.rows,
            self.cols,
        )
    }

    /// Window of `grid` covering this region, grown by `margin` cells on
    /// every side and clipped to the grid
    pub fn window_in(&self, grid: &GridSpec, margin: usize) -> Option<Window> {
        // Shrink by half a cell so edges lying on grid lines do not pull in
        // a neighbouring row or column
        let (hx, hy) = (self.ew_res * 0.5, self.ns_res * 0.5);
        let inner = grid.window_covering(self.west + hx, self.south + hy, self.east - hx, self.north - hy)?;

        let row_start = inner.row_offset.saturating_sub(margin);
        let col_start = inner.col_offset.saturating_sub(margin);
        let row_end = (inner.row_offset + inner.rows + margin).min(grid.rows);
        let col_end = (inner.col_offset + inner.cols + margin).min(grid.cols);
        Some(Window::new(row_start, col_start, row_end - row_start, col_end - col_start))
    }

    pub fn contains(&self, x: f64, y: f64) -> bool {
        x >= self.west && x <= self.east && y >= self.south && y <= self.north
    }

    /// Serialize as a GRASS `GRASS_REGION` value (WIND file format with `;`
    /// separators). `proj` and `zone` describe the location's projection.
    pub fn to_grass_region(&self, proj: i32, zone: i32) -> String {
        [
            format!("proj:{}", proj),
            format!("zone:{}", zone),
            format!("north:{}", self.north),
            format!("south:{}", self.south),
            format!("east:{}", self.east),
            format!("west:{}", self.west),
            format!("cols:{}", self.cols),
            format!("rows:{}", self.rows),
            format!("e-w resol:{}", self.ew_res),
            format!("n-s resol:{}", self.ns_res),
            "top:1".to_string(),
            "bottom:0".to_string(),
            format!("cols3:{}", self.cols),
            format!("rows3:{}", self.rows),
            "depths:1".to_string(),
            format!("e-w resol3:{}", self.ew_res),
            format!("n-s resol3:{}", self.ns_res),
            "t-b resol:1".to_string(),
        ]
        .join(";")
    }
}

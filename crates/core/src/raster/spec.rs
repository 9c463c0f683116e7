//! Grid geometry shared by equally-gridded rasters

use crate::error::{Error, Result};
use crate::raster::GeoTransform;
use serde::{Deserialize, Serialize};

/// Geometry of a raster grid: georeferencing plus dimensions.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GridSpec {
    pub transform: GeoTransform,
    pub rows: usize,
    pub cols: usize,
}

/// A rectangular block of cells inside a grid
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Window {
    /// Row offset in the parent grid
    pub row_offset: usize,
    /// Column offset in the parent grid
    pub col_offset: usize,
    /// Number of rows in this window
    pub rows: usize,
    /// Number of columns in this window
    pub cols: usize,
}

impl Window {
    pub fn new(row_offset: usize, col_offset: usize, rows: usize, cols: usize) -> Self {
        Self {
            row_offset,
            col_offset,
            rows,
            cols,
        }
    }

    /// Convert window-local coordinates to parent grid coordinates
    pub fn to_parent(&self, local_row: usize, local_col: usize) -> (usize, usize) {
        (self.row_offset + local_row, self.col_offset + local_col)
    }

    /// Convert parent grid coordinates to window-local coordinates
    pub fn to_local(&self, row: usize, col: usize) -> Option<(usize, usize)> {
        let r = row.checked_sub(self.row_offset)?;
        let c = col.checked_sub(self.col_offset)?;
        (r < self.rows && c < self.cols).then_some((r, c))
    }
}

impl GridSpec {
    pub fn new(transform: GeoTransform, rows: usize, cols: usize) -> Self {
        Self {
            transform,
            rows,
            cols,
        }
    }

    /// Map extent as (min_x, min_y, max_x, max_y)
    pub fn bounds(&self) -> (f64, f64, f64, f64) {
        self.transform.bounds(self.cols, self.rows)
    }

    /// Cell containing the map coordinate, if inside the grid
    pub fn cell_of(&self, x: f64, y: f64) -> Option<(usize, usize)> {
        let (col, row) = self.transform.geo_to_pixel(x, y);
        if !col.is_finite() || !row.is_finite() || col < 0.0 || row < 0.0 {
            return None;
        }
        let (row, col) = (row.floor() as usize, col.floor() as usize);
        (row < self.rows && col < self.cols).then_some((row, col))
    }

    /// Smallest window of whole cells covering the map rectangle, clipped to
    /// the grid. `None` when the rectangle does not overlap the grid.
    pub fn window_covering(&self, west: f64, south: f64, east: f64, north: f64) -> Option<Window> {
        let (c0, r0) = self.transform.geo_to_pixel(west, north);
        let (c1, r1) = self.transform.geo_to_pixel(east, south);
        if ![c0, r0, c1, r1].iter().all(|v| v.is_finite()) {
            return None;
        }

        let col_start = c0.min(c1).floor().max(0.0);
        let col_end = c0.max(c1).ceil().min(self.cols as f64);
        let row_start = r0.min(r1).floor().max(0.0);
        let row_end = r0.max(r1).ceil().min(self.rows as f64);

        if col_end <= col_start || row_end <= row_start {
            return None;
        }

        Some(Window::new(
            row_start as usize,
            col_start as usize,
            (row_end - row_start) as usize,
            (col_end - col_start) as usize,
        ))
    }

    /// Grid geometry of a window of this grid
    pub fn sub_grid(&self, window: &Window) -> GridSpec {
        GridSpec::new(
            self.transform.offset(window.row_offset, window.col_offset),
            window.rows,
            window.cols,
        )
    }

    /// Check that `other` describes the same grid, within a small fraction of
    /// a cell.
    pub fn ensure_matches(&self, other: &GridSpec, name: &str) -> Result<()> {
        if self.rows != other.rows || self.cols != other.cols {
            return Err(Error::GridMismatch {
                name: name.to_string(),
                reason: format!(
                    "expected {}x{} cells, got {}x{}",
                    self.cols, self.rows, other.cols, other.rows
                ),
            });
        }

        let a = &self.transform;
        let b = &other.transform;
        let tol = a.cell_size().min(a.cell_height()) * 1e-6;
        let close = |p: f64, q: f64| (p - q).abs() <= tol;
        if !(close(a.origin_x, b.origin_x)
            && close(a.origin_y, b.origin_y)
            && close(a.pixel_width, b.pixel_width)
            && close(a.pixel_height, b.pixel_height))
        {
            return Err(Error::GridMismatch {
                name: name.to_string(),
                reason: format!("georeferencing differs: {:?} vs {:?}", a, b),
            });
        }
        Ok(())
    }

    /// Check that `other` is a block of whole cells of this grid: same cell
    /// size, corners on this grid's cell edges, extent inside this grid.
    pub fn ensure_contains(&self, other: &GridSpec, name: &str) -> Result<()> {
        let mismatch = |reason: String| Error::GridMismatch {
            name: name.to_string(),
            reason,
        };

        let a = &self.transform;
        let b = &other.transform;
        let tol = a.cell_size().min(a.cell_height()) * 1e-6;
        if (a.pixel_width - b.pixel_width).abs() > tol || (a.pixel_height - b.pixel_height).abs() > tol {
            return Err(mismatch(format!(
                "resolution {}x{} differs from {}x{}",
                b.cell_size(),
                b.cell_height(),
                a.cell_size(),
                a.cell_height()
            )));
        }

        let col = (b.origin_x - a.origin_x) / a.pixel_width;
        let row = (b.origin_y - a.origin_y) / a.pixel_height;
        if (col - col.round()).abs() > 1e-6 || (row - row.round()).abs() > 1e-6 {
            return Err(mismatch(format!(
                "origin ({}, {}) is not on a cell corner of the template",
                b.origin_x, b.origin_y
            )));
        }

        let (col, row) = (col.round(), row.round());
        if col < 0.0
            || row < 0.0
            || col as usize + other.cols > self.cols
            || row as usize + other.rows > self.rows
        {
            return Err(mismatch(format!(
                "{}x{} cells at offset ({}, {}) exceed the {}x{} template",
                other.cols, other.rows, col, row, self.cols, self.rows
            )));
        }
        Ok(())
    }
}

//! Viewshed analysis
//!
//! Determines which cells are visible from an observer cell using
//! Bresenham-style ray tracing from the observer to every cell on the
//! perimeter of the search square. Rays are traced in parallel.
//!
//! Ray cells are computed from offsets relative to the observer, so the
//! result on a sub-window that contains the whole search radius is identical
//! to the result on the full grid. The native engine relies on this to run
//! restricted-region invocations.
//!
//! Reference:
//! Franklin, W.R. & Ray, C. (1994). Higher isn't necessarily better:
//! visibility algorithms and experiments. GIS/LIS.

use cumview_core::raster::Raster;
use cumview_core::{Error, Result};
use ndarray::Array2;
use rayon::prelude::*;

/// Parameters for viewshed analysis
#[derive(Debug, Clone)]
pub struct ViewshedParams {
    /// Observer row position
    pub observer_row: usize,
    /// Observer column position
    pub observer_col: usize,
    /// Observer height above ground (map units, default 1.75)
    pub observer_height: f64,
    /// Target height above ground (map units, default 0.0)
    pub target_height: f64,
    /// Maximum visibility distance in map units (non-positive or infinite = unlimited)
    pub max_distance: f64,
    /// Upper bound on the search radius in cells, applied to bounded
    /// distances. `None` uses `rows + cols` of the DEM. Callers running on a
    /// window pass the bound of the full grid so both runs trace the same rays.
    pub max_radius: Option<usize>,
}

impl Default for ViewshedParams {
    fn default() -> Self {
        Self {
            observer_row: 0,
            observer_col: 0,
            observer_height: 1.75,
            target_height: 0.0,
            max_distance: f64::INFINITY,
            max_radius: None,
        }
    }
}

impl ViewshedParams {
    /// Whether the visibility distance is bounded
    pub fn is_bounded(&self) -> bool {
        self.max_distance > 0.0 && self.max_distance.is_finite()
    }
}

/// Geometry shared by every ray of one viewshed run
struct RayContext<'a> {
    dem: &'a Raster<f64>,
    obs_r: isize,
    obs_c: isize,
    obs_z: f64,
    target_height: f64,
    cell_w: f64,
    cell_h: f64,
    max_distance: Option<f64>,
}

/// Compute the viewshed from a single observer cell.
///
/// # Returns
/// `Raster<u8>` on the DEM's grid where 1 = visible and 0 = not visible.
/// The no-data value is set to 0, so invisible cells read as no-data.
///
/// # Errors
/// - `IndexOutOfBounds` when the observer lies outside the DEM
/// - `Algorithm` when the observer cell holds no elevation
pub fn viewshed(dem: &Raster<f64>, params: ViewshedParams) -> Result<Raster<u8>> {
    let (rows, cols) = dem.shape();

    if params.observer_row >= rows || params.observer_col >= cols {
        return Err(Error::IndexOutOfBounds {
            row: params.observer_row,
            col: params.observer_col,
            rows,
            cols,
        });
    }

    let ground = dem.get(params.observer_row, params.observer_col)?;
    if dem.is_nodata(ground) {
        return Err(Error::Algorithm("Observer is on a no-data cell".into()));
    }

    let cell_w = dem.transform().cell_size();
    let cell_h = dem.transform().cell_height();
    if cell_w <= 0.0 || cell_h <= 0.0 {
        return Err(Error::InvalidParameter {
            name: "cell_size",
            value: format!("{}x{}", cell_w, cell_h),
            reason: "cell size must be positive".into(),
        });
    }

    let bounded = params.is_bounded();
    let radius: isize = if bounded {
        // Past rows + cols every ray has already left the grid
        let limit = params.max_radius.unwrap_or(rows + cols).max(1) as f64;
        ((params.max_distance / cell_w.min(cell_h)).ceil().min(limit) as isize).max(1)
    } else {
        rows.max(cols) as isize
    };

    let ctx = RayContext {
        dem,
        obs_r: params.observer_row as isize,
        obs_c: params.observer_col as isize,
        obs_z: ground + params.observer_height,
        target_height: params.target_height,
        cell_w,
        cell_h,
        max_distance: bounded.then_some(params.max_distance),
    };

    // Perimeter of the search square, as offsets from the observer
    let mut targets: Vec<(isize, isize)> = Vec::with_capacity(8 * radius as usize);
    for dc in -radius..=radius {
        targets.push((-radius, dc));
        targets.push((radius, dc));
    }
    for dr in (-radius + 1)..radius {
        targets.push((dr, -radius));
        targets.push((dr, radius));
    }

    let visibility_maps: Vec<Vec<(usize, usize)>> = targets
        .into_par_iter()
        .map(|(dr, dc)| trace_ray(&ctx, dr, dc))
        .collect();

    let mut output_data = Array2::<u8>::zeros((rows, cols));
    output_data[(params.observer_row, params.observer_col)] = 1;
    for visible_cells in &visibility_maps {
        for &(r, c) in visible_cells {
            output_data[(r, c)] = 1;
        }
    }

    let mut output = dem.with_same_meta::<u8>(rows, cols);
    output.set_nodata(Some(0));
    *output.data_mut() = output_data;

    Ok(output)
}

/// Trace one ray from the observer towards offset (`dr`, `dc`), returning
/// the visible cells along it
fn trace_ray(ctx: &RayContext<'_>, dr: isize, dc: isize) -> Vec<(usize, usize)> {
    let mut visible = Vec::new();
    let steps = dr.unsigned_abs().max(dc.unsigned_abs());
    if steps == 0 {
        return visible;
    }

    let (rows, cols) = ctx.dem.shape();
    let step_r = dr as f64 / steps as f64;
    let step_c = dc as f64 / steps as f64;
    let mut horizon = f64::NEG_INFINITY;

    for s in 1..=steps {
        let off_r = (step_r * s as f64).round();
        let off_c = (step_c * s as f64).round();

        let dist = ((off_r * ctx.cell_h).powi(2) + (off_c * ctx.cell_w).powi(2)).sqrt();
        if ctx.max_distance.is_some_and(|max| dist > max) {
            break;
        }
        if dist < f64::EPSILON {
            continue;
        }

        let cr = ctx.obs_r + off_r as isize;
        let cc = ctx.obs_c + off_c as isize;
        if cr < 0 || cc < 0 || cr as usize >= rows || cc as usize >= cols {
            break;
        }
        let (r, c) = (cr as usize, cc as usize);

        let z = unsafe { ctx.dem.get_unchecked(r, c) };
        if ctx.dem.is_nodata(z) {
            break;
        }

        let target_angle = (z + ctx.target_height - ctx.obs_z) / dist;
        if target_angle >= horizon {
            visible.push((r, c));
        }
        horizon = horizon.max((z - ctx.obs_z) / dist);
    }

    visible
}

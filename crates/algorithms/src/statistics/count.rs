//! Per-cell count of defined values

use cumview_core::raster::{GridSpec, Raster, RasterElement};
use cumview_core::{Error, Result};
use ndarray::Array2;
use rayon::prelude::*;

/// Count, per cell, how many inputs hold a defined (non no-data) value.
///
/// Every input must lie on `grid`; a mismatch is reported as
/// `GridMismatch` naming the input's position. The output is a `u32`
/// raster on `grid` whose no-data value is 0, so cells defined in no input
/// stay no-data. An empty input slice yields an all-no-data raster.
///
/// The reduction is commutative and associative: input order never changes
/// the result.
pub fn count_defined<T: RasterElement>(inputs: &[&Raster<T>], grid: &GridSpec) -> Result<Raster<u32>> {
    for (i, input) in inputs.iter().enumerate() {
        grid.ensure_matches(&input.grid(), &format!("input #{}", i))?;
    }

    let (rows, cols) = (grid.rows, grid.cols);

    let data: Vec<u32> = (0..rows)
        .into_par_iter()
        .flat_map(|row| {
            let mut row_data = vec![0u32; cols];
            for input in inputs {
                for (col, count) in row_data.iter_mut().enumerate() {
                    let v = unsafe { input.get_unchecked(row, col) };
                    if !input.is_nodata(v) {
                        *count += 1;
                    }
                }
            }
            row_data
        })
        .collect();

    let mut output = Raster::from_grid(grid, 0u32);
    output.set_nodata(Some(0));
    *output.data_mut() =
        Array2::from_shape_vec((rows, cols), data).map_err(|e| Error::Other(e.to_string()))?;
    Ok(output)
}

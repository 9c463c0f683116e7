//! Per-cell raster algebra

use cumview_core::raster::Raster;
use cumview_core::{Error, Result};
use ndarray::Array2;
use rayon::prelude::*;

/// Per-cell difference `a - b`.
///
/// Used to derive height above ground from a surface model and a terrain
/// model (`band_difference(dsm, dtm)`). Both rasters must share the same
/// grid; no-data in either input produces NaN in the output.
pub fn band_difference(a: &Raster<f64>, b: &Raster<f64>) -> Result<Raster<f64>> {
    zip_defined(a, b, "subtrahend", |va, vb| Some(va - vb))
}

/// Combine two rasters on the same grid cell by cell.
///
/// `f` only sees cells defined in both inputs; cells where either input is
/// no-data, or where `f` returns `None`, are NaN in the output.
pub(crate) fn zip_defined<F>(a: &Raster<f64>, b: &Raster<f64>, b_label: &str, f: F) -> Result<Raster<f64>>
where
    F: Fn(f64, f64) -> Option<f64> + Sync + Send,
{
    if a.shape() != b.shape() {
        return Err(Error::SizeMismatch {
            er: a.rows(),
            ec: a.cols(),
            ar: b.rows(),
            ac: b.cols(),
        });
    }
    a.grid().ensure_matches(&b.grid(), b_label)?;

    let (rows, cols) = a.shape();
    let (da, db) = (a.data(), b.data());

    let data: Vec<f64> = (0..rows)
        .into_par_iter()
        .flat_map_iter(|row| {
            da.row(row)
                .iter()
                .zip(db.row(row).iter())
                .map(|(&va, &vb)| {
                    if a.is_nodata(va) || b.is_nodata(vb) {
                        f64::NAN
                    } else {
                        f(va, vb).unwrap_or(f64::NAN)
                    }
                })
                .collect::<Vec<_>>()
        })
        .collect();

    let mut output = a.with_same_meta::<f64>(rows, cols);
    output.set_nodata(Some(f64::NAN));
    *output.data_mut() =
        Array2::from_shape_vec((rows, cols), data).map_err(|e| Error::Other(e.to_string()))?;
    Ok(output)
}

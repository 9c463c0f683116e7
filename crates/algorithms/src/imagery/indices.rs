//! Spectral vegetation index
//!
//! Indices operate on single-band rasters (one band per raster).

use super::band_math::zip_defined;
use cumview_core::raster::Raster;
use cumview_core::Result;

/// Normalized difference `(band_a - band_b) / (band_a + band_b)`, in [-1, 1].
///
/// Cells where the bands sum to zero, or where either band is no-data, are
/// NaN.
pub fn normalized_difference(band_a: &Raster<f64>, band_b: &Raster<f64>) -> Result<Raster<f64>> {
    zip_defined(band_a, band_b, "second band", |a, b| {
        let sum = a + b;
        (sum.abs() >= 1e-10).then(|| (a - b) / sum)
    })
}

/// Normalized Difference Vegetation Index
///
/// `NDVI = (NIR - Red) / (NIR + Red)`
///
/// Dense vegetation sits around 0.6 to 0.9, bare soil around 0.1 to 0.2 and
/// water below zero.
pub fn ndvi(nir: &Raster<f64>, red: &Raster<f64>) -> Result<Raster<f64>> {
    normalized_difference(nir, red)
}

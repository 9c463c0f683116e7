//! Pearson correlation between two rasters

use cumview_core::raster::{Raster, RasterElement};
use cumview_core::{Error, Result};

/// Result of a Pearson correlation over paired cells
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Correlation {
    /// Pearson correlation coefficient in [-1, 1]
    pub r: f64,
    /// Number of cell pairs used
    pub n: usize,
    pub mean_a: f64,
    pub mean_b: f64,
}

/// Pearson correlation between `a` and `b` over the cells defined in both.
///
/// Typical use: cumulative visibility counts against NDVI. Requires at least
/// two pairs and non-zero variance in both rasters.
pub fn pearson_correlation<A, B>(a: &Raster<A>, b: &Raster<B>) -> Result<Correlation>
where
    A: RasterElement,
    B: RasterElement,
{
    if a.shape() != b.shape() {
        return Err(Error::SizeMismatch {
            er: a.rows(),
            ec: a.cols(),
            ar: b.rows(),
            ac: b.cols(),
        });
    }

    let pairs: Vec<(f64, f64)> = a
        .data()
        .iter()
        .zip(b.data().iter())
        .filter(|&(&va, &vb)| !a.is_nodata(va) && !b.is_nodata(vb))
        .filter_map(|(&va, &vb)| Some((va.to_f64()?, vb.to_f64()?)))
        .collect();

    let n = pairs.len();
    if n < 2 {
        return Err(Error::Algorithm(format!(
            "correlation needs at least 2 paired cells, found {}",
            n
        )));
    }

    let nf = n as f64;
    let mean_a = pairs.iter().map(|p| p.0).sum::<f64>() / nf;
    let mean_b = pairs.iter().map(|p| p.1).sum::<f64>() / nf;

    let (mut cov, mut var_a, mut var_b) = (0.0, 0.0, 0.0);
    for &(x, y) in &pairs {
        let dx = x - mean_a;
        let dy = y - mean_b;
        cov += dx * dy;
        var_a += dx * dx;
        var_b += dy * dy;
    }

    if var_a <= f64::EPSILON || var_b <= f64::EPSILON {
        return Err(Error::Algorithm("correlation undefined for a constant raster".into()));
    }

    Ok(Correlation {
        r: (cov / (var_a.sqrt() * var_b.sqrt())).clamp(-1.0, 1.0),
        n,
        mean_a,
        mean_b,
    })
}

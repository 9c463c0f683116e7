//! Imagery and raster algebra
//!
//! - Band difference: per-cell `a - b` (e.g. DSM − DTM height above ground)
//! - Normalized difference / NDVI

mod band_math;
mod indices;

pub use band_math::band_difference;
pub use indices::{ndvi, normalized_difference};

//! # CumView Algorithms
//!
//! Raster and vector kernels used by the native visibility engine and the
//! analysis commands.
//!
//! ## Available Algorithm Categories
//!
//! - **terrain**: Line-of-sight viewshed
//! - **statistics**: Per-cell count of defined values, Pearson correlation
//! - **imagery**: Band difference (DSM − DTM), NDVI
//! - **vector**: Points at fixed spacing along a line

pub mod imagery;
pub mod statistics;
pub mod terrain;
pub mod vector;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::imagery::{band_difference, ndvi, normalized_difference};
    pub use crate::statistics::{count_defined, pearson_correlation, Correlation};
    pub use crate::terrain::{viewshed, ViewshedParams};
    pub use crate::vector::points_along_line;
    pub use cumview_core::prelude::*;
}

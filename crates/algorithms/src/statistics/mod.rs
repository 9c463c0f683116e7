//! Statistical reductions over rasters
//!
//! - **count**: per-cell count of defined values across equally-gridded rasters
//! - **correlation**: Pearson correlation between two rasters

mod correlation;
mod count;

pub use correlation::{pearson_correlation, Correlation};
pub use count::count_defined;

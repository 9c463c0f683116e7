//! Vector operations
//!
//! - Points along a line: viewpoint positions at a fixed spacing

mod points;

pub use points::points_along_line;

//! Terrain analysis algorithms
//!
//! - Viewshed: line-of-sight visibility from an observer cell

mod viewshed;

pub use viewshed::{viewshed, ViewshedParams};

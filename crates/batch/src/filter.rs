//! Height-above-ground filter for viewpoints

use crate::viewpoint::{Viewpoint, ViewpointId};
use cumview_core::Raster;
use std::collections::HashMap;
use tracing::debug;

/// Height above ground at a viewpoint.
///
/// `None` when the height is unknown (outside the raster, no-data, or
/// missing from a lookup table).
pub trait HeightLookup {
    fn height_at(&self, viewpoint: &Viewpoint) -> Option<f64>;
}

/// Sample an elevation-difference raster (DSM minus DTM) at the viewpoint
impl HeightLookup for Raster<f64> {
    fn height_at(&self, viewpoint: &Viewpoint) -> Option<f64> {
        self.sample(viewpoint.x, viewpoint.y)
    }
}

impl HeightLookup for HashMap<ViewpointId, f64> {
    fn height_at(&self, viewpoint: &Viewpoint) -> Option<f64> {
        self.get(&viewpoint.id).copied().filter(|h| h.is_finite())
    }
}

/// Viewpoints kept and dropped by [`filter_by_height`]
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FilterOutcome {
    /// Kept viewpoints, in input order
    pub kept: Vec<Viewpoint>,
    /// Viewpoints standing higher than the threshold
    pub too_high: Vec<ViewpointId>,
    /// Viewpoints whose height could not be looked up
    pub unknown: Vec<ViewpointId>,
}

impl FilterOutcome {
    pub fn dropped(&self) -> usize {
        self.too_high.len() + self.unknown.len()
    }
}

/// Keep the viewpoints whose height above ground is at most `max_height`.
///
/// Viewpoints with an unknown height are dropped and listed separately.
pub fn filter_by_height<L>(points: &[Viewpoint], lookup: &L, max_height: f64) -> FilterOutcome
where
    L: HeightLookup + ?Sized,
{
    let mut outcome = FilterOutcome::default();
    for vp in points {
        match lookup.height_at(vp) {
            Some(h) if h <= max_height => outcome.kept.push(*vp),
            Some(h) => {
                debug!("Viewpoint {} dropped: {:.2} above ground", vp.id, h);
                outcome.too_high.push(vp.id);
            }
            None => {
                debug!("Viewpoint {} dropped: height unknown", vp.id);
                outcome.unknown.push(vp.id);
            }
        }
    }
    outcome
}

#[cfg(test)]
mod tests {
    use super::*;
    use cumview_core::GeoTransform;

    #[test]
    fn test_filter_with_table() {
        let points = vec![
            Viewpoint::new(1, 0.0, 0.0),
            Viewpoint::new(2, 1.0, 0.0),
            Viewpoint::new(3, 2.0, 0.0),
            Viewpoint::new(4, 3.0, 0.0),
        ];
        let heights: HashMap<ViewpointId, f64> =
            [(ViewpointId(1), 0.5), (ViewpointId(2), 2.0), (ViewpointId(3), 7.5)]
                .into_iter()
                .collect();

        let out = filter_by_height(&points, &heights, 2.0);
        let kept: Vec<u64> = out.kept.iter().map(|p| p.id.0).collect();
        assert_eq!(kept, vec![1, 2], "threshold itself is kept");
        assert_eq!(out.too_high, vec![ViewpointId(3)]);
        assert_eq!(out.unknown, vec![ViewpointId(4)]);
        assert_eq!(out.dropped(), 2);
    }

    #[test]
    fn test_filter_with_raster() {
        // 2x2 cells of 10 units, north-west corner at (0, 20)
        let mut height = Raster::from_vec(vec![0.0, 12.0, f64::NAN, 1.0], 2, 2).unwrap();
        height.set_transform(GeoTransform::new(0.0, 20.0, 10.0, -10.0));

        let points = vec![
            Viewpoint::new(1, 5.0, 15.0),
            Viewpoint::new(2, 15.0, 15.0),
            Viewpoint::new(3, 5.0, 5.0),
            Viewpoint::new(4, 15.0, 5.0),
            Viewpoint::new(5, 50.0, 50.0),
        ];

        let out = filter_by_height(&points, &height, 3.0);
        let kept: Vec<u64> = out.kept.iter().map(|p| p.id.0).collect();
        assert_eq!(kept, vec![1, 4]);
        assert_eq!(out.too_high, vec![ViewpointId(2)]);
        assert_eq!(out.unknown, vec![ViewpointId(3), ViewpointId(5)]);
    }
}

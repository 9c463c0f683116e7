//! Points at a fixed spacing along a line

use cumview_core::{Error, Result};
use geo::{Coord, Euclidean, Length, LineString, Point};

/// Place points every `spacing` units along `line`, measured along its
/// length.
///
/// The first vertex is always emitted. The last vertex is emitted too unless
/// a spaced point already falls on it. Zero-length segments are skipped.
/// A line without vertices yields no points.
pub fn points_along_line(line: &LineString<f64>, spacing: f64) -> Result<Vec<Point<f64>>> {
    if !(spacing.is_finite() && spacing > 0.0) {
        return Err(Error::InvalidParameter {
            name: "spacing",
            value: spacing.to_string(),
            reason: "must be a positive finite distance".into(),
        });
    }

    let coords: Vec<Coord<f64>> = line.coords().copied().collect();
    let Some(&first) = coords.first() else {
        return Ok(Vec::new());
    };

    let total = line.length::<Euclidean>();
    let tolerance = spacing * 1e-9;
    let mut points = Vec::with_capacity((total / spacing) as usize + 2);
    points.push(Point::from(first));

    // Distance along the line of the next point to place
    let mut next = spacing;
    // Distance along the line at the start of the current segment
    let mut walked = 0.0;

    for pair in coords.windows(2) {
        let (a, b) = (pair[0], pair[1]);
        let seg_len = (b.x - a.x).hypot(b.y - a.y);
        if seg_len <= 0.0 {
            continue;
        }

        while next <= walked + seg_len + tolerance {
            let t = ((next - walked) / seg_len).min(1.0);
            points.push(Point::new(a.x + t * (b.x - a.x), a.y + t * (b.y - a.y)));
            next += spacing;
        }
        walked += seg_len;
    }

    if let Some(&last) = coords.last() {
        let placed = next - spacing;
        if coords.len() > 1 && total - placed > tolerance {
            points.push(Point::from(last));
        }
    }

    Ok(points)
}

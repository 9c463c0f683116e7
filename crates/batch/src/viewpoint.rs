//! Viewpoints: observer positions along a line
//!
//! Viewpoints are exchanged as CSV with the header `id,x,y`.

use crate::error::PointError;
use cumview_algorithms::vector::points_along_line;
use geo::{Coord, LineString, Point};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::io::{Read, Write};
use std::path::Path;

/// Identifier of a viewpoint, unique within a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ViewpointId(pub u64);

impl fmt::Display for ViewpointId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for ViewpointId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

/// An observer position in map coordinates
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Viewpoint {
    pub id: ViewpointId,
    pub x: f64,
    pub y: f64,
}

impl Viewpoint {
    pub fn new(id: u64, x: f64, y: f64) -> Self {
        Self {
            id: ViewpointId(id),
            x,
            y,
        }
    }

    pub fn point(&self) -> Point<f64> {
        Point::new(self.x, self.y)
    }
}

/// Viewpoints every `spacing` map units along `line`, numbered from 1.
pub fn viewpoints_along_line(line: &LineString<f64>, spacing: f64) -> Result<Vec<Viewpoint>, PointError> {
    let points = points_along_line(line, spacing)?;
    Ok(points
        .into_iter()
        .zip(1u64..)
        .map(|(p, id)| Viewpoint::new(id, p.x(), p.y()))
        .collect())
}

/// Parse a line written as `x,y;x,y;...`.
///
/// At least two vertices are required.
pub fn parse_line(text: &str) -> Result<LineString<f64>, PointError> {
    let mut coords = Vec::new();
    for (i, pair) in text.split(';').map(str::trim).filter(|s| !s.is_empty()).enumerate() {
        let (x, y) = pair
            .split_once(',')
            .ok_or_else(|| PointError::InvalidLine(format!("vertex {} '{}' is not 'x,y'", i + 1, pair)))?;
        let parse = |v: &str| {
            v.trim()
                .parse::<f64>()
                .ok()
                .filter(|v| v.is_finite())
                .ok_or_else(|| PointError::InvalidLine(format!("vertex {} has a bad coordinate '{}'", i + 1, v)))
        };
        coords.push(Coord { x: parse(x)?, y: parse(y)? });
    }

    if coords.len() < 2 {
        return Err(PointError::InvalidLine(format!(
            "need at least 2 vertices, got {}",
            coords.len()
        )));
    }
    Ok(LineString::new(coords))
}

/// Reject viewpoint lists that reuse an id
pub fn ensure_unique_ids(points: &[Viewpoint]) -> Result<(), PointError> {
    let mut seen = HashSet::with_capacity(points.len());
    for p in points {
        if !seen.insert(p.id) {
            return Err(PointError::DuplicateId(p.id));
        }
    }
    Ok(())
}

/// Read viewpoints from CSV with an `id,x,y` header
pub fn read_viewpoints<R: Read>(reader: R) -> Result<Vec<Viewpoint>, PointError> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(reader);

    let points = reader
        .deserialize::<Viewpoint>()
        .collect::<Result<Vec<_>, _>>()?;
    ensure_unique_ids(&points)?;
    Ok(points)
}

/// Write viewpoints as CSV with an `id,x,y` header
pub fn write_viewpoints<W: Write>(writer: W, points: &[Viewpoint]) -> Result<(), PointError> {
    let mut writer = csv::Writer::from_writer(writer);
    for p in points {
        writer.serialize(p)?;
    }
    writer.flush()?;
    Ok(())
}

pub fn read_viewpoints_file(path: impl AsRef<Path>) -> Result<Vec<Viewpoint>, PointError> {
    read_viewpoints(std::fs::File::open(path)?)
}

pub fn write_viewpoints_file(path: impl AsRef<Path>, points: &[Viewpoint]) -> Result<(), PointError> {
    write_viewpoints(std::fs::File::create(path)?, points)
}

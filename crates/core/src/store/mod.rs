//! Named raster stores
//!
//! A store is a flat namespace of raster artifacts. Names are unique per run;
//! writing an existing name replaces it. Two implementations are provided:
//! - [`MemoryStore`]: rasters kept in memory, shared between threads
//! - [`DirStore`]: one GeoTIFF per raster inside a directory

mod dir;
mod memory;

pub use dir::DirStore;
pub use memory::MemoryStore;

use crate::error::{Error, Result};
use crate::raster::{GridSpec, Raster};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// Validated raster name.
///
/// Allowed characters are ASCII letters, digits, `_`, `-` and `.`; the name
/// must not be empty or start with `.`. The same rules keep names usable as
/// file stems and as GRASS map names.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RasterName(String);

impl RasterName {
    pub const MAX_LEN: usize = 255;

    pub fn new(name: impl Into<String>) -> Result<Self> {
        let name = name.into();
        let reason = if name.is_empty() {
            Some("name is empty")
        } else if name.len() > Self::MAX_LEN {
            Some("name is too long")
        } else if name.starts_with('.') {
            Some("name starts with '.'")
        } else if !name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'))
        {
            Some("only ASCII letters, digits, '_', '-' and '.' are allowed")
        } else {
            None
        };

        match reason {
            Some(reason) => Err(Error::InvalidName { name, reason }),
            None => Ok(Self(name)),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RasterName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for RasterName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl FromStr for RasterName {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::new(s)
    }
}

impl TryFrom<String> for RasterName {
    type Error = Error;

    fn try_from(s: String) -> Result<Self> {
        Self::new(s)
    }
}

impl From<RasterName> for String {
    fn from(name: RasterName) -> Self {
        name.0
    }
}

/// Flat, thread-safe namespace of rasters.
///
/// Cells are stored as `f64`; no-data is NaN. Implementations must allow
/// concurrent writes of distinct names from multiple threads.
pub trait RasterStore: Send + Sync {
    /// Read a raster by name
    fn read(&self, name: &RasterName) -> Result<Arc<Raster<f64>>>;

    /// Write a raster, replacing any existing raster of the same name
    fn write(&self, name: &RasterName, raster: Raster<f64>) -> Result<()>;

    /// Whether a raster with this name exists
    fn contains(&self, name: &RasterName) -> bool;

    /// Remove a raster; returns whether it existed
    fn remove(&self, name: &RasterName) -> Result<bool>;

    /// All raster names, sorted
    fn names(&self) -> Result<Vec<RasterName>>;

    /// Grid geometry of a stored raster
    fn grid(&self, name: &RasterName) -> Result<GridSpec> {
        Ok(self.read(name)?.grid())
    }
}

impl<S: RasterStore + ?Sized> RasterStore for Arc<S> {
    fn read(&self, name: &RasterName) -> Result<Arc<Raster<f64>>> {
        (**self).read(name)
    }

    fn write(&self, name: &RasterName, raster: Raster<f64>) -> Result<()> {
        (**self).write(name, raster)
    }

    fn contains(&self, name: &RasterName) -> bool {
        (**self).contains(name)
    }

    fn remove(&self, name: &RasterName) -> Result<bool> {
        (**self).remove(name)
    }

    fn names(&self) -> Result<Vec<RasterName>> {
        (**self).names()
    }

    fn grid(&self, name: &RasterName) -> Result<GridSpec> {
        (**self).grid(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_names() {
        for name in ["dem", "viewshed_12", "cum-view.v2", "A1"] {
            assert!(RasterName::new(name).is_ok(), "{name} should be valid");
        }
    }

    #[test]
    fn test_invalid_names() {
        for name in ["", ".hidden", "a/b", "with space", "x@mapset", "a=b"] {
            assert!(
                matches!(RasterName::new(name), Err(Error::InvalidName { .. })),
                "{name:?} should be rejected"
            );
        }
        assert!(RasterName::new("x".repeat(256)).is_err());
    }

    #[test]
    fn test_name_parses_and_displays() {
        let name: RasterName = "viewshed_3".parse().unwrap();
        assert_eq!(name.to_string(), "viewshed_3");
        assert_eq!(name.as_str(), "viewshed_3");
    }
}

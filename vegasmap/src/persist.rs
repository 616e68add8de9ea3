//! Versioned on-disk records for grids and split maps.
//!
//! Both records store the edges dimension-major and are written as JSON.
//! Every record is validated before a live object is built from it; any
//! inconsistency surfaces as [`MapError::CorruptState`].

use std::io::{Read, Write};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::{MapError, Result};
use crate::grid::{validate_edges, Grid};
use crate::split::SplitMap;

/// Version written into every record.
pub const FORMAT_VERSION: u32 = 1;

/// Persisted form of a [`Grid`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersistedGrid {
    pub version: u32,
    pub dims: usize,
    pub bins: usize,
    /// `dims * (bins + 1)` edges, dimension-major.
    pub edges: Vec<f64>,
}

/// Persisted form of a [`SplitMap`], whose dimensions may differ in their
/// number of bins.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersistedSplitMap {
    pub version: u32,
    pub dims: usize,
    pub bins: Vec<usize>,
    /// `bins[d] + 1` edges for every dimension `d`, dimension-major.
    pub edges: Vec<f64>,
}

fn corrupt(err: impl std::fmt::Display) -> MapError {
    MapError::CorruptState(err.to_string())
}

fn check_version(version: u32) -> Result<()> {
    if version == FORMAT_VERSION {
        Ok(())
    } else {
        Err(corrupt(format!("unsupported format version {version}")))
    }
}

impl From<Grid> for PersistedGrid {
    fn from(grid: Grid) -> Self {
        Self {
            version: FORMAT_VERSION,
            dims: grid.dims(),
            bins: grid.n_bins(),
            edges: grid.flat_edges(),
        }
    }
}

impl TryFrom<PersistedGrid> for Grid {
    type Error = MapError;

    fn try_from(record: PersistedGrid) -> Result<Self> {
        check_version(record.version)?;
        Grid::from_flat(record.dims, record.bins, &record.edges).map_err(corrupt)
    }
}

impl From<SplitMap> for PersistedSplitMap {
    fn from(map: SplitMap) -> Self {
        let (edges, bins) = map.into_parts();
        Self {
            version: FORMAT_VERSION,
            dims: bins.len(),
            bins,
            edges,
        }
    }
}

impl TryFrom<PersistedSplitMap> for SplitMap {
    type Error = MapError;

    fn try_from(record: PersistedSplitMap) -> Result<Self> {
        check_version(record.version)?;
        if record.dims == 0 {
            return Err(corrupt(MapError::ZeroDimensions));
        }
        if record.bins.len() != record.dims {
            return Err(corrupt(format!(
                "header declares {} dimensions but lists {} bin counts",
                record.dims,
                record.bins.len()
            )));
        }

        let expected: usize = record.bins.iter().map(|b| b + 1).sum();
        if record.edges.len() != expected {
            return Err(corrupt(MapError::LengthMismatch {
                what: "flattened edges",
                expected,
                got: record.edges.len(),
            }));
        }

        let mut offset = 0;
        for (dim, &bins) in record.bins.iter().enumerate() {
            validate_edges(dim, &record.edges[offset..offset + bins + 1]).map_err(corrupt)?;
            offset += bins + 1;
        }

        Ok(SplitMap::from_parts_unchecked(record.edges, record.bins))
    }
}

/// Writes `value` as JSON.
pub(crate) fn write_json<W: Write, T: Serialize>(writer: W, value: &T) -> Result<()> {
    serde_json::to_writer(writer, value).map_err(|err| {
        if err.is_io() {
            MapError::Io(err.into())
        } else {
            corrupt(err)
        }
    })
}

/// Reads a JSON record, mapping anything but IO failures to [`MapError::CorruptState`].
pub(crate) fn read_json<R: Read, T: DeserializeOwned>(reader: R) -> Result<T> {
    serde_json::from_reader(reader).map_err(|err| {
        if err.is_io() {
            MapError::Io(err.into())
        } else {
            corrupt(err)
        }
    })
}

//! Training data collected between two adaptations of a grid.
//!
//! An [`Accumulator`] stores, for every `(dimension, bin)` pair, the sum of
//! the training weights that fell into the bin and the number of hits. The
//! division by the number of hits is deferred to the adaptation step, which
//! means accumulators filled independently (on different threads or
//! processes) can be combined by simple element-wise addition.

use std::ops::{Add, AddAssign};

use serde::{Deserialize, Serialize};

use crate::error::{MapError, Result};
use crate::grid::Grid;

/// Per-bin weight sums and hit counts, stored dimension-major.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawAccumulator")]
pub struct Accumulator {
    dims: usize,
    n_bins: usize,
    /// Accumulated training weight, of size `dims * n_bins`.
    sums: Vec<f64>,
    /// Number of training samples per bin, of size `dims * n_bins`.
    hits: Vec<u64>,
}

/// Unvalidated serialized form of an [`Accumulator`].
#[derive(Deserialize)]
struct RawAccumulator {
    dims: usize,
    n_bins: usize,
    sums: Vec<f64>,
    hits: Vec<u64>,
}

impl TryFrom<RawAccumulator> for Accumulator {
    type Error = MapError;

    fn try_from(raw: RawAccumulator) -> Result<Self> {
        Self::from_parts(raw.dims, raw.n_bins, raw.sums, raw.hits)
    }
}

fn check_weight(value: f64) -> Result<()> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(MapError::InvalidWeight(value))
    }
}

impl Accumulator {
    /// Creates an empty accumulator for `dims` dimensions of `n_bins` bins.
    /// Callers must pass a non-empty shape.
    pub(crate) fn new(dims: usize, n_bins: usize) -> Self {
        debug_assert!(dims > 0 && n_bins > 0);
        Self {
            dims,
            n_bins,
            sums: vec![0.0; dims * n_bins],
            hits: vec![0; dims * n_bins],
        }
    }

    /// Creates an empty accumulator with the shape of `grid`.
    pub fn for_grid(grid: &Grid) -> Self {
        Self::new(grid.dims(), grid.n_bins())
    }

    /// Rebuilds an accumulator from flat buffers, e.g. after a reduction
    /// across processes.
    pub fn from_parts(dims: usize, n_bins: usize, sums: Vec<f64>, hits: Vec<u64>) -> Result<Self> {
        if dims == 0 {
            return Err(MapError::ZeroDimensions);
        }
        if n_bins == 0 {
            return Err(MapError::ZeroBins);
        }

        let expected = dims * n_bins;
        for (what, got) in [("sums", sums.len()), ("hits", hits.len())] {
            if got != expected {
                return Err(MapError::LengthMismatch {
                    what,
                    expected,
                    got,
                });
            }
        }

        if let Some(&bad) = sums.iter().find(|s| !(s.is_finite() && **s >= 0.0)) {
            return Err(MapError::InvalidWeight(bad));
        }

        Ok(Self {
            dims,
            n_bins,
            sums,
            hits,
        })
    }

    pub fn dims(&self) -> usize {
        self.dims
    }

    pub fn n_bins(&self) -> usize {
        self.n_bins
    }

    /// `(dims, n_bins)`.
    pub fn shape(&self) -> (usize, usize) {
        (self.dims, self.n_bins)
    }

    pub fn sums(&self) -> &[f64] {
        &self.sums
    }

    pub fn hits(&self) -> &[u64] {
        &self.hits
    }

    /// The weight sums of dimension `dim`.
    pub fn sums_for(&self, dim: usize) -> &[f64] {
        &self.sums[dim * self.n_bins..(dim + 1) * self.n_bins]
    }

    /// The hit counts of dimension `dim`.
    pub fn hits_for(&self, dim: usize) -> &[u64] {
        &self.hits[dim * self.n_bins..(dim + 1) * self.n_bins]
    }

    /// Number of samples recorded since the last reset.
    pub fn samples(&self) -> u64 {
        // every sample hits exactly one bin per dimension
        self.hits[..self.n_bins].iter().sum()
    }

    pub fn is_empty(&self) -> bool {
        self.hits.iter().all(|&h| h == 0)
    }

    /// Clears all sums and counts, keeping the shape.
    pub fn reset(&mut self) {
        self.sums.fill(0.0);
        self.hits.fill(0);
    }

    /// Records `value` into the bins given by `bins`, one index per dimension.
    pub fn record(&mut self, bins: &[usize], value: f64) -> Result<()> {
        check_weight(value)?;
        if bins.len() != self.dims {
            return Err(MapError::DimensionMismatch {
                expected: self.dims,
                got: bins.len(),
            });
        }
        if let Some(dim) = bins.iter().position(|&b| b >= self.n_bins) {
            return Err(MapError::BinOutOfRange {
                dim,
                bin: bins[dim],
            });
        }

        self.record_unchecked(bins, value);
        Ok(())
    }

    /// Hot path for callers that obtained `bins` from the forward map of a
    /// grid with this accumulator's shape and checked `value`.
    pub(crate) fn record_unchecked(&mut self, bins: &[usize], value: f64) {
        for (dim, &bin) in bins.iter().enumerate() {
            let index = dim * self.n_bins + bin;
            self.sums[index] += value;
            self.hits[index] += 1;
        }
    }

    /// Locates `point` in `grid` and records `value` into the corresponding bins.
    ///
    /// Nothing is recorded if the point or the value is rejected.
    pub fn fill(&mut self, grid: &Grid, point: &[f64], value: f64) -> Result<()> {
        self.check_grid(grid)?;
        check_weight(value)?;

        let mut bins = vec![0; self.dims];
        grid.locate_into(point, &mut bins)?;
        self.record_unchecked(&bins, value);
        Ok(())
    }

    /// Adds the contents of `other`, which must have the same shape.
    pub fn merge(&mut self, other: &Self) -> Result<()> {
        if self.shape() != other.shape() {
            return Err(MapError::ShapeMismatch {
                left: self.shape(),
                right: other.shape(),
            });
        }

        *self += other;
        Ok(())
    }

    fn check_grid(&self, grid: &Grid) -> Result<()> {
        if self.shape() == (grid.dims(), grid.n_bins()) {
            Ok(())
        } else {
            Err(MapError::ShapeMismatch {
                left: self.shape(),
                right: (grid.dims(), grid.n_bins()),
            })
        }
    }
}

impl AddAssign<&Accumulator> for Accumulator {
    fn add_assign(&mut self, other: &Accumulator) {
        debug_assert_eq!(self.shape(), other.shape());

        for (a, b) in self.sums.iter_mut().zip(&other.sums) {
            *a += b;
        }
        for (a, b) in self.hits.iter_mut().zip(&other.hits) {
            *a += b;
        }
    }
}

impl Add for Accumulator {
    type Output = Self;

    fn add(mut self, other: Self) -> Self {
        self += &other;
        self
    }
}

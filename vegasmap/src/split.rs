//! A lighter-weight adaptive map that refines by splitting bins in place.
//!
//! Contrary to [`AdaptiveMap`](crate::map::AdaptiveMap), a [`SplitMap`] never
//! recomputes the whole partition. It inserts edges inside selected bins,
//! which is cheaper but gives up the equal-mass property of a full rebinning.
//! Dimensions may therefore end up with different numbers of bins.

use std::io::{Read, Write};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{MapError, Result};
use crate::persist::{self, PersistedSplitMap};

/// Into how many equal children a bin is split.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Split {
    #[default]
    Half,
    Third,
    Quarter,
}

impl Split {
    /// Number of children a split bin is replaced with.
    pub fn children(self) -> usize {
        match self {
            Self::Half => 2,
            Self::Third => 3,
            Self::Quarter => 4,
        }
    }
}

/// Flattened histogram of bin edges, `bins[d] + 1` edges per dimension `d`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(into = "PersistedSplitMap", try_from = "PersistedSplitMap")]
pub struct SplitMap {
    hist: Vec<f64>,
    bins: Vec<usize>,
    /// Index into `hist` of the first edge of every dimension.
    offsets: Vec<usize>,
}

fn offsets_of(bins: &[usize]) -> Vec<usize> {
    bins.iter()
        .scan(0, |offset, &b| {
            let start = *offset;
            *offset += b + 1;
            Some(start)
        })
        .collect()
}

impl SplitMap {
    /// Creates `dims` dimensions of `bins` equal-width bins over `[0, 1]`.
    pub fn new(dims: usize, bins: usize) -> Result<Self> {
        if dims == 0 {
            return Err(MapError::ZeroDimensions);
        }
        if bins == 0 {
            return Err(MapError::ZeroBins);
        }

        let axis: Vec<f64> = (0..=bins).map(|i| i as f64 / bins as f64).collect();
        let hist = axis.repeat(dims);

        Ok(Self::from_parts_unchecked(hist, vec![bins; dims]))
    }

    /// Callers must have validated `hist` against `bins`.
    pub(crate) fn from_parts_unchecked(hist: Vec<f64>, bins: Vec<usize>) -> Self {
        debug_assert_eq!(hist.len(), bins.iter().map(|b| b + 1).sum::<usize>());
        let offsets = offsets_of(&bins);
        Self {
            hist,
            bins,
            offsets,
        }
    }

    pub(crate) fn into_parts(self) -> (Vec<f64>, Vec<usize>) {
        (self.hist, self.bins)
    }

    pub fn dims(&self) -> usize {
        self.bins.len()
    }

    /// Number of bins of dimension `dim`.
    ///
    /// # Panics
    ///
    /// Panics if `dim >= self.dims()`.
    pub fn bins(&self, dim: usize) -> usize {
        self.bins[dim]
    }

    /// Number of bins summed over all dimensions.
    pub fn total_bins(&self) -> usize {
        self.bins.iter().sum()
    }

    /// All edges, dimension-major.
    pub fn edges(&self) -> &[f64] {
        &self.hist
    }

    /// The edges of dimension `dim`.
    pub fn edges_of(&self, dim: usize) -> &[f64] {
        let start = self.offsets[dim];
        &self.hist[start..start + self.bins[dim] + 1]
    }

    pub fn lower_edge(&self, dim: usize, bin: usize) -> f64 {
        self.edges_of(dim)[bin]
    }

    pub fn upper_edge(&self, dim: usize, bin: usize) -> f64 {
        self.edges_of(dim)[bin + 1]
    }

    pub fn width(&self, dim: usize, bin: usize) -> f64 {
        self.upper_edge(dim, bin) - self.lower_edge(dim, bin)
    }

    /// Maps the random numbers in `rans` onto the histogram in place and
    /// returns the weight of the point.
    pub fn map(&self, rans: &mut [f64]) -> Result<f64> {
        if rans.len() != self.dims() {
            return Err(MapError::DimensionMismatch {
                expected: self.dims(),
                got: rans.len(),
            });
        }
        if let Some(dim) = rans.iter().position(|r| !(0.0..=1.0).contains(r)) {
            return Err(MapError::OutOfUnitInterval {
                dim,
                value: rans[dim],
            });
        }

        let mut weight = 1.0;
        for (dim, r) in rans.iter_mut().enumerate() {
            let n_bins = self.bins[dim];
            let scaled = *r * n_bins as f64;
            let mut bin = scaled.floor() as usize;
            let mut frac = scaled - bin as f64;
            if bin >= n_bins {
                bin = n_bins - 1;
                frac = 1.0;
            }

            let lower = self.lower_edge(dim, bin);
            let width = self.width(dim, bin);
            *r = if frac >= 1.0 {
                self.upper_edge(dim, bin)
            } else {
                lower + frac * width
            };
            weight *= n_bins as f64 * width;
        }

        Ok(weight)
    }

    /// Splits every bin of every dimension.
    pub fn split(&mut self, split: Split) -> Result<()> {
        self.rebuild(split, |_, _| true).map(|_| ())
    }

    /// Splits a single bin.
    pub fn split_bin(&mut self, dim: usize, bin: usize, split: Split) -> Result<()> {
        if dim >= self.dims() || bin >= self.bins[dim] {
            return Err(MapError::BinOutOfRange { dim, bin });
        }

        self.rebuild(split, |d, b| d == dim && b == bin).map(|_| ())
    }

    /// Splits every bin whose adaptation signal exceeds `threshold` times the
    /// mean signal of its dimension. `data` holds one value per bin in the
    /// same order as the bins. Returns the number of bins that were split.
    pub fn adapt(&mut self, threshold: f64, data: &[f64], split: Split) -> Result<usize> {
        if !(threshold.is_finite() && threshold >= 0.0) {
            return Err(MapError::InvalidThreshold(threshold));
        }
        if data.len() != self.total_bins() {
            return Err(MapError::LengthMismatch {
                what: "adaptation data",
                expected: self.total_bins(),
                got: data.len(),
            });
        }
        if let Some(&bad) = data.iter().find(|v| !(v.is_finite() && **v >= 0.0)) {
            return Err(MapError::InvalidWeight(bad));
        }

        // per-dimension cut on the raw signal
        let mut start = 0;
        let mut cuts = Vec::with_capacity(self.dims());
        let mut starts = Vec::with_capacity(self.dims());
        for &bins in &self.bins {
            let total: f64 = data[start..start + bins].iter().sum();
            cuts.push(if total > 0.0 {
                threshold * total / bins as f64
            } else {
                f64::INFINITY
            });
            starts.push(start);
            start += bins;
        }

        let split_bins =
            self.rebuild(split, |dim, bin| data[starts[dim] + bin] > cuts[dim])?;

        debug!(split_bins, threshold, ?split, "split map adapted");
        Ok(split_bins)
    }

    /// Rebuilds the histogram, splitting every bin for which `select` returns
    /// `true`. The map is left unchanged if any split is degenerate.
    fn rebuild(&mut self, split: Split, select: impl Fn(usize, usize) -> bool) -> Result<usize> {
        let children = split.children();
        let mut hist = Vec::with_capacity(self.hist.len());
        let mut bins = Vec::with_capacity(self.dims());
        let mut split_bins = 0;

        for dim in 0..self.dims() {
            let edges = self.edges_of(dim);
            let mut n_bins = 0;
            for bin in 0..self.bins[dim] {
                let lower = edges[bin];
                let upper = edges[bin + 1];
                hist.push(lower);
                n_bins += 1;

                if !select(dim, bin) {
                    continue;
                }

                let width = upper - lower;
                let mut previous = lower;
                for child in 1..children {
                    let edge = lower + width * child as f64 / children as f64;
                    if !(edge > previous && edge < upper) {
                        return Err(MapError::DegenerateSplit { dim, bin });
                    }
                    hist.push(edge);
                    previous = edge;
                }
                n_bins += children - 1;
                split_bins += 1;
            }
            hist.push(edges[self.bins[dim]]);
            bins.push(n_bins);
        }

        *self = Self::from_parts_unchecked(hist, bins);
        Ok(split_bins)
    }

    /// Writes the map as a versioned JSON record.
    pub fn save<W: Write>(&self, writer: W) -> Result<()> {
        persist::write_json(writer, self)
    }

    /// Reads a map written by [`SplitMap::save`].
    pub fn load<R: Read>(reader: R) -> Result<Self> {
        persist::read_json(reader)
    }
}

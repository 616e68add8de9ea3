//! The adaptive grid: one [`Axis`] of bin edges per dimension.
//!
//! A [`Grid`] is immutable once built. Adaptation produces a new grid which
//! replaces the old one wholesale, so a grid can be shared between any number
//! of sampling threads without synchronization.

use std::fmt;

use serde::{Deserialize, Serialize};
use wide::f64x4;

use crate::error::{MapError, Result};
use crate::persist::PersistedGrid;

/// Number of edges printed per dimension by the [`fmt::Display`] implementation.
const DISPLAY_EDGES: usize = 5;

/// Checks that `edges` describe at least one bin and are finite and strictly increasing.
pub(crate) fn validate_edges(dim: usize, edges: &[f64]) -> Result<()> {
    if edges.len() < 2 {
        return Err(MapError::ZeroBins);
    }

    for (index, edge) in edges.iter().enumerate() {
        if !edge.is_finite() {
            return Err(MapError::NonFiniteEdge { dim, index });
        }
    }

    match edges.windows(2).position(|w| w[0] >= w[1]) {
        Some(index) => Err(MapError::NonIncreasingEdges {
            dim,
            index: index + 1,
        }),
        None => Ok(()),
    }
}

/// The bin edges of a single dimension.
#[derive(Debug, Clone, PartialEq)]
pub struct Axis {
    /// The bin boundaries, of size `n_bins + 1`, strictly increasing.
    edges: Vec<f64>,
}

impl Axis {
    /// Creates `n_bins` equal-width bins over `[0, 1]`.
    pub fn uniform(n_bins: usize) -> Result<Self> {
        Self::uniform_over(0, 0.0, 1.0, n_bins)
    }

    /// Creates `n_bins` equal-width bins over `[min, max]`. `dim` is only
    /// used for error reporting.
    pub fn uniform_over(dim: usize, min: f64, max: f64, n_bins: usize) -> Result<Self> {
        if n_bins == 0 {
            return Err(MapError::ZeroBins);
        }

        let mut edges: Vec<f64> = (0..n_bins)
            .map(|i| min + (max - min) * (i as f64 / n_bins as f64))
            .collect();
        edges.push(max);

        validate_edges(dim, &edges)?;
        Ok(Self { edges })
    }

    /// Creates an axis from caller-supplied edges. `dim` is only used for error reporting.
    pub fn from_edges(dim: usize, edges: Vec<f64>) -> Result<Self> {
        validate_edges(dim, &edges)?;
        Ok(Self { edges })
    }

    /// Callers must have validated `edges` already.
    pub(crate) fn from_edges_unchecked(edges: Vec<f64>) -> Self {
        debug_assert!(validate_edges(0, &edges).is_ok());
        Self { edges }
    }

    pub fn n_bins(&self) -> usize {
        self.edges.len() - 1
    }

    pub fn edges(&self) -> &[f64] {
        &self.edges
    }

    /// Lower end of the domain.
    pub fn min(&self) -> f64 {
        self.edges[0]
    }

    /// Upper end of the domain.
    pub fn max(&self) -> f64 {
        self.edges[self.edges.len() - 1]
    }

    /// Width of bin `bin`.
    ///
    /// # Panics
    ///
    /// Panics if `bin >= self.n_bins()`.
    pub fn width(&self, bin: usize) -> f64 {
        self.edges[bin + 1] - self.edges[bin]
    }

    /// Given a random number `y` in [0, 1], finds the corresponding grid bin,
    /// the mapped value `x`, and the jacobian for this dimension.
    ///
    /// `y == 1` (or rounding that pushes the bin index past the last bin) is
    /// mapped onto the upper edge of the last bin.
    pub fn map(&self, y: f64) -> (usize, f64, f64) {
        let n_bins = self.n_bins();
        let y_scaled = y * n_bins as f64;
        let mut bin_index = y_scaled.floor() as usize;
        let mut y_frac = y_scaled - bin_index as f64;

        if bin_index >= n_bins {
            bin_index = n_bins - 1;
            y_frac = 1.0;
        }

        let x_low = self.edges[bin_index];
        let width = self.edges[bin_index + 1] - x_low;

        let x = if y_frac >= 1.0 {
            self.edges[bin_index + 1]
        } else {
            x_low + y_frac * width
        };
        let jacobian = width * n_bins as f64;

        (bin_index, x, jacobian)
    }

    /// Maps a packet of four `y` values to `x` values and jacobians using SIMD.
    pub fn map_simd(&self, y_packet: f64x4) -> (f64x4, f64x4, [usize; 4]) {
        let n_bins = self.n_bins();
        let n_bins_v = f64x4::splat(n_bins as f64);
        let y_scaled = y_packet * n_bins_v;
        let bin_indices_v = y_scaled.floor();
        let mut y_frac = (y_scaled - bin_indices_v).to_array();

        let mut bin_indices = [0usize; 4];
        for (i, raw) in bin_indices_v.to_array().into_iter().enumerate() {
            let raw = raw as usize;
            if raw >= n_bins {
                bin_indices[i] = n_bins - 1;
                y_frac[i] = 1.0;
            } else {
                bin_indices[i] = raw;
            }
        }

        let x_low = f64x4::from(bin_indices.map(|k| self.edges[k]));
        let x_high = f64x4::from(bin_indices.map(|k| self.edges[k + 1]));

        let width = x_high - x_low;
        let x = x_low + f64x4::from(y_frac) * width;
        let jacobian = width * n_bins_v;

        (x, jacobian, bin_indices)
    }

    /// Returns the bin containing `x`, or `None` if `x` is outside `[min, max]`.
    /// The upper domain edge belongs to the last bin.
    pub fn locate(&self, x: f64) -> Option<usize> {
        if !(x >= self.min() && x <= self.max()) {
            return None;
        }

        let above = self.edges.partition_point(|&edge| edge <= x);
        Some((above - 1).min(self.n_bins() - 1))
    }

    /// Inverse of [`Axis::map`]: recovers the random number that maps onto
    /// `x` together with the jacobian at that point.
    pub fn invert(&self, x: f64) -> Option<(f64, f64)> {
        let bin_index = self.locate(x)?;
        let n_bins = self.n_bins() as f64;
        let width = self.width(bin_index);
        let y_frac = (x - self.edges[bin_index]) / width;
        let y = ((bin_index as f64 + y_frac) / n_bins).min(1.0);

        Some((y, width * n_bins))
    }
}

/// The adaptive grid: an [`Axis`] per dimension, all with the same number of bins.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(into = "PersistedGrid", try_from = "PersistedGrid")]
pub struct Grid {
    axes: Vec<Axis>,
}

impl Grid {
    /// Creates a grid of `dims` dimensions with `n_bins` equal-width bins over `[0, 1]` each.
    pub fn uniform(dims: usize, n_bins: usize) -> Result<Self> {
        if dims == 0 {
            return Err(MapError::ZeroDimensions);
        }

        let axis = Axis::uniform(n_bins)?;
        Ok(Self {
            axes: vec![axis; dims],
        })
    }

    /// Creates a grid from caller-supplied edges, one sequence per dimension.
    ///
    /// All sequences must have the same length and be strictly increasing.
    pub fn from_edges(edges: Vec<Vec<f64>>) -> Result<Self> {
        let expected = edges.first().map(Vec::len).ok_or(MapError::ZeroDimensions)?;

        let axes = edges
            .into_iter()
            .enumerate()
            .map(|(dim, edges)| {
                if edges.len() != expected {
                    return Err(MapError::LengthMismatch {
                        what: "edges",
                        expected,
                        got: edges.len(),
                    });
                }
                Axis::from_edges(dim, edges)
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self { axes })
    }

    /// Creates a grid from dimension-major flattened edges, `n_bins + 1` per dimension.
    pub fn from_flat(dims: usize, n_bins: usize, flat: &[f64]) -> Result<Self> {
        if dims == 0 {
            return Err(MapError::ZeroDimensions);
        }
        if n_bins == 0 {
            return Err(MapError::ZeroBins);
        }
        if flat.len() != dims * (n_bins + 1) {
            return Err(MapError::LengthMismatch {
                what: "flattened edges",
                expected: dims * (n_bins + 1),
                got: flat.len(),
            });
        }

        Self::from_edges(flat.chunks(n_bins + 1).map(<[f64]>::to_vec).collect())
    }

    /// Callers must guarantee that every axis has the same number of bins.
    pub(crate) fn from_axes(axes: Vec<Axis>) -> Self {
        debug_assert!(!axes.is_empty());
        debug_assert!(axes.iter().all(|a| a.n_bins() == axes[0].n_bins()));
        Self { axes }
    }

    pub fn dims(&self) -> usize {
        self.axes.len()
    }

    pub fn n_bins(&self) -> usize {
        self.axes[0].n_bins()
    }

    pub fn axes(&self) -> &[Axis] {
        &self.axes
    }

    /// # Panics
    ///
    /// Panics if `dim >= self.dims()`.
    pub fn axis(&self, dim: usize) -> &Axis {
        &self.axes[dim]
    }

    /// The `(min, max)` domain of dimension `dim`.
    pub fn region(&self, dim: usize) -> Result<(f64, f64)> {
        self.axes
            .get(dim)
            .map(|axis| (axis.min(), axis.max()))
            .ok_or(MapError::DimensionMismatch {
                expected: self.dims(),
                got: dim,
            })
    }

    /// Dimension-major flattened edges.
    pub fn flat_edges(&self) -> Vec<f64> {
        self.axes
            .iter()
            .flat_map(|axis| axis.edges().iter().copied())
            .collect()
    }

    /// Checks that `u` has the grid's dimension and lies within the unit hypercube.
    pub fn check_unit(&self, u: &[f64]) -> Result<()> {
        if u.len() != self.dims() {
            return Err(MapError::DimensionMismatch {
                expected: self.dims(),
                got: u.len(),
            });
        }

        match u.iter().position(|y| !(0.0..=1.0).contains(y)) {
            Some(dim) => Err(MapError::OutOfUnitInterval {
                dim,
                value: u[dim],
            }),
            None => Ok(()),
        }
    }

    /// Maps `u` onto `x`, writing the selected bins into `bins` and returning the jacobian.
    ///
    /// This is the unchecked hot path; see [`Grid::check_unit`].
    pub fn map_into(&self, u: &[f64], x: &mut [f64], bins: &mut [usize]) -> f64 {
        debug_assert_eq!(u.len(), self.dims());
        debug_assert_eq!(x.len(), self.dims());
        debug_assert_eq!(bins.len(), self.dims());

        let mut jacobian = 1.0;
        for (((axis, &y), x), bin) in self.axes.iter().zip(u).zip(x).zip(bins) {
            let (bin_index, x_mapped, jac) = axis.map(y);
            *x = x_mapped;
            *bin = bin_index;
            jacobian *= jac;
        }

        jacobian
    }

    /// Maps four points at once. `u[d]` holds the `d`-th coordinate of the four points.
    pub fn map_packet(&self, u: &[f64x4], x: &mut [f64x4]) -> f64x4 {
        debug_assert_eq!(u.len(), self.dims());
        debug_assert_eq!(x.len(), self.dims());

        let mut jacobian = f64x4::splat(1.0);
        for ((axis, &y), x) in self.axes.iter().zip(u).zip(x) {
            let (x_mapped, jac, _) = axis.map_simd(y);
            *x = x_mapped;
            jacobian = jacobian * jac;
        }

        jacobian
    }

    /// Writes the bin of every coordinate of `x` into `bins`.
    pub fn locate_into(&self, x: &[f64], bins: &mut [usize]) -> Result<()> {
        self.check_point(x)?;

        for (dim, (axis, bin)) in self.axes.iter().zip(bins).enumerate() {
            *bin = axis.locate(x[dim]).ok_or_else(|| self.out_of_domain(dim, x[dim]))?;
        }

        Ok(())
    }

    /// Recovers the random numbers that map onto `x`, returning the jacobian.
    pub fn invert_into(&self, x: &[f64], u: &mut [f64]) -> Result<f64> {
        self.check_point(x)?;
        if u.len() != self.dims() {
            return Err(MapError::DimensionMismatch {
                expected: self.dims(),
                got: u.len(),
            });
        }

        let mut jacobian = 1.0;
        for (dim, (axis, y)) in self.axes.iter().zip(u).enumerate() {
            let (y_inv, jac) = axis
                .invert(x[dim])
                .ok_or_else(|| self.out_of_domain(dim, x[dim]))?;
            *y = y_inv;
            jacobian *= jac;
        }

        Ok(jacobian)
    }

    fn check_point(&self, x: &[f64]) -> Result<()> {
        if x.len() == self.dims() {
            Ok(())
        } else {
            Err(MapError::DimensionMismatch {
                expected: self.dims(),
                got: x.len(),
            })
        }
    }

    fn out_of_domain(&self, dim: usize, value: f64) -> MapError {
        MapError::OutOfDomain {
            dim,
            value,
            min: self.axes[dim].min(),
            max: self.axes[dim].max(),
        }
    }

    /// Human-readable summary printing every `stride`-th edge of each dimension.
    pub fn summary(&self, stride: usize) -> String {
        let stride = stride.max(1);
        let mut out = format!(
            "Grid: {} dimensions, {} bins\n",
            self.dims(),
            self.n_bins()
        );

        for (dim, axis) in self.axes.iter().enumerate() {
            let shown: Vec<String> = axis
                .edges()
                .iter()
                .step_by(stride)
                .map(|edge| format!("{edge:.6e}"))
                .collect();
            out.push_str(&format!("  dim {dim}: [{}]\n", shown.join(", ")));
        }

        out
    }
}

impl fmt::Display for Grid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let stride = (self.n_bins() / DISPLAY_EDGES).max(1);
        f.write_str(self.summary(stride).trim_end())
    }
}

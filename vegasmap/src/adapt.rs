//! Grid refinement from accumulated training data.
//!
//! For every dimension the per-bin averages are smoothed, compressed with the
//! damping exponent `alpha` and used as a mass density; the new edges are
//! placed such that every new bin carries the same share of that mass. See
//! Eq. (17)-(19) of <https://arxiv.org/pdf/2009.05112>.

use tracing::{debug, warn};

use crate::accumulator::Accumulator;
use crate::error::{MapError, Result};
use crate::grid::{validate_edges, Axis, Grid};

/// Outcome of refining a single dimension.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Rebin {
    /// The edges were recomputed from the training data.
    Updated(Axis),
    /// The dimension carried no training mass and was left alone (or only
    /// re-partitioned evenly if the number of bins changed).
    NoMass(Axis),
    /// The computed edges were not strictly increasing and were discarded.
    Degenerate(Axis),
}

impl Rebin {
    pub(crate) fn into_axis(self) -> Axis {
        match self {
            Self::Updated(axis) | Self::NoMass(axis) | Self::Degenerate(axis) => axis,
        }
    }
}

pub(crate) fn check_alpha(alpha: f64) -> Result<()> {
    if (0.0..=1.0).contains(&alpha) {
        Ok(())
    } else {
        Err(MapError::InvalidAlpha(alpha))
    }
}

/// Average training weight per bin; bins without hits average to zero.
fn averages(sums: &[f64], hits: &[u64]) -> Vec<f64> {
    sums.iter()
        .zip(hits)
        .map(|(&sum, &hits)| if hits == 0 { 0.0 } else { sum / hits as f64 })
        .collect()
}

/// Three-point smoothing `(a[i-1] + 6 a[i] + a[i+1]) / 8`, replicating the
/// boundary bins.
fn smooth(d: &[f64]) -> Vec<f64> {
    let n = d.len();
    if n < 2 {
        return d.to_vec();
    }

    (0..n)
        .map(|i| {
            let prev = d[i.saturating_sub(1)];
            let next = d[(i + 1).min(n - 1)];
            (prev + 6.0 * d[i] + next) / 8.0
        })
        .collect()
}

/// Normalizes `smoothed` to unit sum and applies the damped compression
/// `((r - 1) / ln r)^alpha`. Returns `None` if there is no mass at all.
fn compress(smoothed: &[f64], alpha: f64) -> Option<Vec<f64>> {
    let total: f64 = smoothed.iter().sum();
    if !(total > 0.0 && total.is_finite()) {
        return None;
    }

    if alpha == 0.0 {
        return Some(vec![1.0; smoothed.len()]);
    }

    let compressed = smoothed
        .iter()
        .map(|&s| {
            let r = s / total;
            if r <= 0.0 {
                0.0
            } else if r >= 1.0 {
                1.0
            } else {
                ((r - 1.0) / r.ln()).powf(alpha)
            }
        })
        .collect();

    Some(compressed)
}

/// Places `n_bins - 1` interior edges such that each new bin holds the same
/// share of `mass`, interpolating linearly inside the old bins. The outer
/// edges are copied verbatim.
fn redistribute(edges: &[f64], mass: &[f64], n_bins: usize) -> Vec<f64> {
    debug_assert_eq!(edges.len(), mass.len() + 1);

    let total: f64 = mass.iter().sum();
    let per_bin = total / n_bins as f64;

    let mut new_edges = Vec::with_capacity(n_bins + 1);
    new_edges.push(edges[0]);

    // mass of the old bins left of `j`
    let mut acc = 0.0;
    let mut j = 0;

    for i in 1..n_bins {
        let target = per_bin * i as f64;
        while j + 1 < mass.len() && acc + mass[j] < target {
            acc += mass[j];
            j += 1;
        }

        let depth = if mass[j] > 0.0 {
            ((target - acc) / mass[j]).clamp(0.0, 1.0)
        } else {
            1.0
        };

        let edge = if depth >= 1.0 {
            edges[j + 1]
        } else {
            edges[j] + depth * (edges[j + 1] - edges[j])
        };
        new_edges.push(edge);
    }

    new_edges.push(edges[edges.len() - 1]);
    new_edges
}

/// Re-partitions `axis` into `n_bins` bins, interpolating its edges linearly
/// and falling back to equal widths over its domain if that collapses.
fn resize_evenly(dim: usize, axis: &Axis, n_bins: usize) -> Result<Axis> {
    if n_bins == axis.n_bins() {
        return Ok(axis.clone());
    }

    let even = vec![1.0; axis.n_bins()];
    let edges = redistribute(axis.edges(), &even, n_bins);
    if validate_edges(dim, &edges).is_ok() {
        return Ok(Axis::from_edges_unchecked(edges));
    }

    Axis::uniform_over(dim, axis.min(), axis.max(), n_bins)
}

/// Refines one axis from its training sums and hits.
pub(crate) fn rebin(
    dim: usize,
    axis: &Axis,
    sums: &[f64],
    hits: &[u64],
    alpha: f64,
    n_bins: usize,
) -> Result<Rebin> {
    let smoothed = smooth(&averages(sums, hits));

    let Some(mass) = compress(&smoothed, alpha) else {
        debug!(dim, "no training mass, dimension not adapted");
        return resize_evenly(dim, axis, n_bins).map(Rebin::NoMass);
    };

    let new_edges = redistribute(axis.edges(), &mass, n_bins);

    match validate_edges(dim, &new_edges) {
        Ok(()) => Ok(Rebin::Updated(Axis::from_edges_unchecked(new_edges))),
        Err(err) => {
            warn!(dim, %err, "discarding numerically degenerate rebinning");
            resize_evenly(dim, axis, n_bins).map(Rebin::Degenerate)
        }
    }
}

/// Produces a refined grid of `n_bins` bins per dimension from `grid` and
/// the training data in `training`.
pub fn refine(grid: &Grid, training: &Accumulator, alpha: f64, n_bins: usize) -> Result<Grid> {
    check_alpha(alpha)?;
    if n_bins == 0 {
        return Err(MapError::ZeroBins);
    }
    if training.shape() != (grid.dims(), grid.n_bins()) {
        return Err(MapError::ShapeMismatch {
            left: training.shape(),
            right: (grid.dims(), grid.n_bins()),
        });
    }

    let mut updated = 0;
    let axes = grid
        .axes()
        .iter()
        .enumerate()
        .map(|(dim, axis)| {
            let result = rebin(
                dim,
                axis,
                training.sums_for(dim),
                training.hits_for(dim),
                alpha,
                n_bins,
            )?;
            if matches!(result, Rebin::Updated(_)) {
                updated += 1;
            }
            Ok(result.into_axis())
        })
        .collect::<Result<Vec<_>>>()?;

    debug!(
        dims = grid.dims(),
        updated,
        n_bins,
        alpha,
        samples = training.samples(),
        "grid refined"
    );

    Ok(Grid::from_axes(axes))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_averages_ignore_empty_bins() {
        assert_eq!(averages(&[4.0, 0.0, 3.0], &[2, 0, 3]), vec![2.0, 0.0, 1.0]);
    }

    #[test]
    fn test_smooth_replicates_boundaries() {
        let smoothed = smooth(&[8.0, 0.0, 0.0, 8.0]);
        assert_eq!(smoothed, vec![7.0, 1.0, 1.0, 7.0]);
        assert_eq!(smooth(&[3.0]), vec![3.0]);
        // a constant input is a fixed point
        assert_eq!(smooth(&[2.0; 5]), vec![2.0; 5]);
    }

    #[test]
    fn test_compress() {
        assert_eq!(compress(&[0.0, 0.0], 1.0), None);
        assert_eq!(compress(&[1.0, 3.0], 0.0), Some(vec![1.0, 1.0]));
        assert_eq!(compress(&[0.0, 3.0], 1.0), Some(vec![0.0, 1.0]));

        let m = compress(&[1.0, 3.0], 1.0).unwrap();
        assert_relative_eq!(m[0], (0.25 - 1.0) / 0.25f64.ln(), max_relative = 1e-14);
        assert_relative_eq!(m[1], (0.75 - 1.0) / 0.75f64.ln(), max_relative = 1e-14);
        assert!(m[0] < m[1]);
    }

    #[test]
    fn test_redistribute_equal_mass_is_identity() {
        let edges = [0.0, 0.1, 0.5, 0.55, 1.0];
        assert_eq!(redistribute(&edges, &[1.0; 4], 4), edges.to_vec());
    }

    #[test]
    fn test_redistribute_concentrates_bins() {
        let edges = [0.0, 0.5, 1.0];
        let new_edges = redistribute(&edges, &[3.0, 1.0], 4);
        assert_eq!(new_edges.len(), 5);
        assert_relative_eq!(new_edges[1], 1.0 / 6.0, max_relative = 1e-14);
        assert_relative_eq!(new_edges[2], 1.0 / 3.0, max_relative = 1e-14);
        assert_relative_eq!(new_edges[3], 0.5, max_relative = 1e-14);
        assert_eq!(new_edges[4], 1.0);
    }

    #[test]
    fn test_redistribute_skips_massless_bins() {
        let edges = [0.0, 0.25, 0.5, 0.75, 1.0];
        let new_edges = redistribute(&edges, &[1.0, 0.0, 0.0, 1.0], 2);
        assert_eq!(new_edges, vec![0.0, 0.25, 1.0]);
    }

    #[test]
    fn test_rebin_without_mass_keeps_axis() {
        let axis = Axis::from_edges(0, vec![0.0, 0.2, 1.0]).unwrap();
        let result = rebin(0, &axis, &[0.0, 0.0], &[3, 0], 1.0, 2).unwrap();
        assert_eq!(result, Rebin::NoMass(axis.clone()));

        let result = rebin(0, &axis, &[0.0, 0.0], &[0, 0], 1.0, 4).unwrap();
        let Rebin::NoMass(resized) = result else {
            panic!("expected an untrained dimension");
        };
        assert_eq!(resized.n_bins(), 4);
        assert_relative_eq!(resized.edges()[1], 0.1, max_relative = 1e-14);
        assert_relative_eq!(resized.edges()[2], 0.2, max_relative = 1e-14);
        assert_relative_eq!(resized.edges()[3], 0.6, max_relative = 1e-14);
    }

    /// An axis with a bin one ulp wide at 0.5.
    fn axis_with_collapsed_bin() -> Axis {
        let mut edges: Vec<f64> = (0..=10).map(|i| i as f64 / 10.0).collect();
        edges.insert(6, 0.5 + f64::EPSILON / 2.0);
        Axis::from_edges(0, edges).unwrap()
    }

    #[test]
    fn test_rebin_discards_collapsed_edges() {
        let axis = axis_with_collapsed_bin();
        let mut sums = vec![0.0; 11];
        sums[5] = 1.0;
        let hits = vec![1; 11];

        // most of the mass sits in a bin too narrow to hold several new edges
        let result = rebin(0, &axis, &sums, &hits, 1.0, 11).unwrap();
        assert_eq!(result, Rebin::Degenerate(axis.clone()));

        let Rebin::Degenerate(resized) = rebin(0, &axis, &sums, &hits, 1.0, 40).unwrap() else {
            panic!("expected a discarded rebinning");
        };
        assert_eq!(resized.n_bins(), 40);
        assert_eq!(resized.min(), 0.0);
        assert_eq!(resized.max(), 1.0);
        assert!(validate_edges(0, resized.edges()).is_ok());
    }

    #[test]
    fn test_refine_keeps_grid_on_collapsed_edges() {
        let grid = Grid::from_axes(vec![axis_with_collapsed_bin()]);
        let mut training = Accumulator::for_grid(&grid);
        training.record(&[5], 1.0).unwrap();
        for bin in (0..11).filter(|&b| b != 5) {
            training.record(&[bin], 0.0).unwrap();
        }

        assert_eq!(refine(&grid, &training, 1.0, 11).unwrap(), grid);
    }

    #[test]
    fn test_refine_rejects_bad_arguments() {
        let grid = Grid::uniform(2, 4).unwrap();
        let training = Accumulator::for_grid(&grid);
        assert!(matches!(
            refine(&grid, &training, 1.5, 4),
            Err(MapError::InvalidAlpha(_))
        ));
        assert!(matches!(
            refine(&grid, &training, f64::NAN, 4),
            Err(MapError::InvalidAlpha(_))
        ));
        assert!(matches!(
            refine(&grid, &training, 0.5, 0),
            Err(MapError::ZeroBins)
        ));
        assert!(matches!(
            refine(&grid, &Accumulator::new(2, 3), 0.5, 4),
            Err(MapError::ShapeMismatch { .. })
        ));
    }

    #[test]
    fn test_refine_alpha_zero_keeps_grid() {
        let grid = Grid::from_edges(vec![vec![0.0, 0.1, 0.3, 1.0]]).unwrap();
        let mut training = Accumulator::for_grid(&grid);
        training.fill(&grid, &[0.05], 10.0).unwrap();
        training.fill(&grid, &[0.5], 1.0).unwrap();

        assert_eq!(refine(&grid, &training, 0.0, 3).unwrap(), grid);
    }
}

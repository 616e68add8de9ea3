//! The adaptive map: a grid snapshot together with its training data.

use std::io::{Read, Write};
use std::sync::Arc;

use rand::Rng;
use rayon::prelude::*;

use crate::accumulator::Accumulator;
use crate::adapt;
use crate::error::{MapError, Result};
use crate::grid::{Axis, Grid};
use crate::persist;

/// Number of edges shown per dimension when no stride is requested.
pub const DEFAULT_SETTINGS_STRIDE: usize = 5;

/// A point produced by the forward map.
#[derive(Debug, Clone, PartialEq)]
pub struct SamplePoint {
    /// The uniform random numbers the point was generated from.
    pub u: Vec<f64>,
    /// The mapped coordinates.
    pub x: Vec<f64>,
    /// The bin selected in every dimension.
    pub bins: Vec<usize>,
    /// The jacobian of the map at `u`.
    pub jacobian: f64,
}

/// Importance-sampling map that is trained between adaptation cycles.
///
/// Sampling only reads the current [`Grid`]; [`AdaptiveMap::snapshot`] hands
/// out a shared reference that stays valid after the map has been adapted.
/// Adapting requires `&mut self` and therefore cannot overlap with sampling
/// through the map itself.
#[derive(Debug, Clone)]
pub struct AdaptiveMap {
    pub(crate) grid: Arc<Grid>,
    pub(crate) training: Accumulator,
}

impl AdaptiveMap {
    /// Creates a map of `dims` dimensions with `n_bins` uniform bins each.
    pub fn new(dims: usize, n_bins: usize) -> Result<Self> {
        Ok(Self::from_grid(Grid::uniform(dims, n_bins)?))
    }

    /// Creates a map from caller-supplied edges, e.g. to resume a previous run.
    pub fn from_edges(edges: Vec<Vec<f64>>) -> Result<Self> {
        Ok(Self::from_grid(Grid::from_edges(edges)?))
    }

    /// Creates an untrained map around `grid`.
    pub fn from_grid(grid: Grid) -> Self {
        let training = Accumulator::for_grid(&grid);
        Self {
            grid: Arc::new(grid),
            training,
        }
    }

    pub fn dims(&self) -> usize {
        self.grid.dims()
    }

    pub fn bins(&self) -> usize {
        self.grid.n_bins()
    }

    /// The current grid.
    pub fn grid(&self) -> &Grid {
        &self.grid
    }

    /// A shared handle on the current grid that survives later adaptations.
    pub fn snapshot(&self) -> Arc<Grid> {
        Arc::clone(&self.grid)
    }

    /// The training data collected since the last adaptation.
    pub fn training(&self) -> &Accumulator {
        &self.training
    }

    /// The `(min, max)` domain of dimension `dim`.
    pub fn region(&self, dim: usize) -> Result<(f64, f64)> {
        self.grid.region(dim)
    }

    /// The `(min, max)` domains of all dimensions.
    pub fn all_regions(&self) -> Vec<(f64, f64)> {
        self.grid
            .axes()
            .iter()
            .map(|axis| (axis.min(), axis.max()))
            .collect()
    }

    /// Rebuilds an equal-width partition of `n_bins` bins over the domain of
    /// every dimension, discarding all training data.
    pub fn make_uniform(&mut self, n_bins: usize) -> Result<()> {
        let axes = self
            .grid
            .axes()
            .iter()
            .enumerate()
            .map(|(dim, axis)| Axis::uniform_over(dim, axis.min(), axis.max(), n_bins))
            .collect::<Result<Vec<_>>>()?;

        self.install_grid(Grid::from_axes(axes))
    }

    /// Replaces the edges with caller-supplied ones. The training data is
    /// discarded if `init` is set or if the number of bins changes.
    pub fn init_grid(&mut self, edges: Vec<Vec<f64>>, init: bool) -> Result<()> {
        if edges.len() != self.dims() {
            return Err(MapError::DimensionMismatch {
                expected: self.dims(),
                got: edges.len(),
            });
        }

        let grid = Grid::from_edges(edges)?;
        let reset = init || grid.n_bins() != self.bins();
        self.grid = Arc::new(grid);
        if reset {
            self.training = Accumulator::for_grid(&self.grid);
        }

        Ok(())
    }

    /// Installs a grid computed elsewhere, e.g. broadcast by the process
    /// that ran the adaptation, and resets the training data.
    pub fn install_grid(&mut self, grid: Grid) -> Result<()> {
        if grid.dims() != self.dims() {
            return Err(MapError::DimensionMismatch {
                expected: self.dims(),
                got: grid.dims(),
            });
        }

        self.training = Accumulator::for_grid(&grid);
        self.grid = Arc::new(grid);
        Ok(())
    }

    /// Maps the uniform random numbers `u` onto the grid.
    pub fn map(&self, u: &[f64]) -> Result<SamplePoint> {
        self.grid.check_unit(u)?;

        let mut x = vec![0.0; self.dims()];
        let mut bins = vec![0; self.dims()];
        let jacobian = self.grid.map_into(u, &mut x, &mut bins);

        Ok(SamplePoint {
            u: u.to_vec(),
            x,
            bins,
            jacobian,
        })
    }

    /// The jacobian of the forward map at `u`.
    pub fn jacobian(&self, u: &[f64]) -> Result<f64> {
        self.map(u).map(|point| point.jacobian)
    }

    /// Maps many points in parallel.
    pub fn map_batch(&self, us: &[Vec<f64>]) -> Result<Vec<SamplePoint>> {
        us.par_iter().map(|u| self.map(u)).collect()
    }

    /// Draws a uniform point from `rng` and maps it.
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> SamplePoint {
        let u: Vec<f64> = (0..self.dims()).map(|_| rng.gen()).collect();
        let mut x = vec![0.0; self.dims()];
        let mut bins = vec![0; self.dims()];
        let jacobian = self.grid.map_into(&u, &mut x, &mut bins);

        SamplePoint {
            u,
            x,
            bins,
            jacobian,
        }
    }

    /// Recovers the uniform random numbers that map onto `x`, together with
    /// the jacobian at that point.
    pub fn invert(&self, x: &[f64]) -> Result<(Vec<f64>, f64)> {
        let mut u = vec![0.0; self.dims()];
        let jacobian = self.grid.invert_into(x, &mut u)?;
        Ok((u, jacobian))
    }

    /// Records the training weight `value` at the mapped point `point`.
    pub fn add_training_data(&mut self, point: &[f64], value: f64) -> Result<()> {
        self.training.fill(&self.grid, point, value)
    }

    /// Records a batch of training data. Either every sample is recorded or,
    /// if any sample is rejected, none is.
    pub fn add_training_batch(&mut self, points: &[Vec<f64>], values: &[f64]) -> Result<()> {
        check_batch(points, values)?;

        let mut batch = self.worker_accumulator();
        for (point, &value) in points.iter().zip(values) {
            batch.fill(&self.grid, point, value)?;
        }

        self.training += &batch;
        Ok(())
    }

    /// Records a batch of training data with one accumulator per rayon
    /// worker, merged once all workers are done.
    pub fn train_parallel(&mut self, points: &[Vec<f64>], values: &[f64]) -> Result<()> {
        check_batch(points, values)?;

        let grid = &*self.grid;
        let merged = points
            .par_iter()
            .zip(values.par_iter())
            .try_fold(
                || Accumulator::for_grid(grid),
                |mut acc, (point, &value)| {
                    acc.fill(grid, point, value)?;
                    Ok::<_, MapError>(acc)
                },
            )
            .try_reduce(
                || Accumulator::for_grid(grid),
                |mut a, b| {
                    a += &b;
                    Ok(a)
                },
            )?;

        self.training += &merged;
        Ok(())
    }

    /// An empty accumulator with the shape of the current grid, to be filled
    /// by one worker and folded back with [`AdaptiveMap::merge_training`].
    pub fn worker_accumulator(&self) -> Accumulator {
        Accumulator::for_grid(&self.grid)
    }

    /// Folds a worker accumulator into the map's training data.
    pub fn merge_training(&mut self, other: &Accumulator) -> Result<()> {
        self.training.merge(other)
    }

    /// Refines the grid from the collected training data and resets it.
    ///
    /// `alpha` is the damping exponent in `[0, 1]`; `n_bins` optionally
    /// changes the number of bins, otherwise it is kept.
    pub fn adapt(&mut self, alpha: f64, n_bins: Option<usize>) -> Result<()> {
        let n_bins = n_bins.unwrap_or_else(|| self.bins());
        let grid = adapt::refine(&self.grid, &self.training, alpha, n_bins)?;

        self.training = Accumulator::for_grid(&grid);
        self.grid = Arc::new(grid);
        Ok(())
    }

    /// A human-readable summary showing every `stride`-th edge.
    pub fn settings(&self, stride: usize) -> String {
        self.grid.summary(stride)
    }

    /// Writes the grid as a versioned JSON record. Training data is not saved.
    pub fn save<W: Write>(&self, writer: W) -> Result<()> {
        persist::write_json(writer, &*self.grid)
    }

    /// Restores a map written by [`AdaptiveMap::save`], with empty training data.
    pub fn load<R: Read>(reader: R) -> Result<Self> {
        let grid: Grid = persist::read_json(reader)?;
        Ok(Self::from_grid(grid))
    }
}

fn check_batch(points: &[Vec<f64>], values: &[f64]) -> Result<()> {
    if points.len() == values.len() {
        Ok(())
    } else {
        Err(MapError::LengthMismatch {
            what: "training values",
            expected: points.len(),
            got: values.len(),
        })
    }
}

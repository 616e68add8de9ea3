//! The VEGAS integrator driving an [`AdaptiveMap`].

use rand::{Rng, SeedableRng};
use rand_pcg::Pcg64;
use rayon::prelude::*;
use tracing::info;

use crate::accumulator::Accumulator;
use crate::config::VegasConfig;
use crate::error::{MapError, Result};
use crate::integrand::Integrand;
use crate::map::AdaptiveMap;
use crate::mapper::Boundaries;

/// Stores the result of a VEGAS integration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VegasResult {
    /// The estimated value of the integral.
    pub value: f64,
    /// The estimated statistical error (one standard deviation).
    pub error: f64,
    /// The chi-squared per degree of freedom of the partial results.
    pub chi2_dof: f64,
}

/// Partial sums of one rayon worker.
struct Partial {
    sum_f: f64,
    sum_f2: f64,
    training: Accumulator,
}

/// The VEGAS Monte Carlo integrator.
pub struct Vegas {
    /// The number of integration iterations.
    n_iter: usize,
    /// The number of integrand evaluations per iteration.
    n_eval: usize,
    /// The grid damping exponent.
    alpha: f64,
    /// The random number generator.
    rng: Pcg64,
    /// The adaptive map shared by all dimensions.
    map: AdaptiveMap,
    /// The integration domain.
    boundaries: Boundaries,
}

impl Vegas {
    /// Creates a new VEGAS integrator.
    ///
    /// # Arguments
    ///
    /// * `n_iter`: The number of iterations to perform, the first being warm-up.
    /// * `n_eval`: The number of integrand evaluations per iteration.
    /// * `n_bins`: The number of bins for the adaptive grid in each dimension.
    /// * `alpha`: The grid damping exponent. Must be between 0.0 and 1.0.
    /// * `boundaries`: A slice of `(min, max)` tuples defining the integration domain for each dimension.
    pub fn new(
        n_iter: usize,
        n_eval: usize,
        n_bins: usize,
        alpha: f64,
        boundaries: &[(f64, f64)],
    ) -> Result<Self> {
        let config = VegasConfig {
            n_iter,
            n_eval,
            n_bins,
            alpha,
            seed: None,
        };
        Self::from_config(&config, boundaries)
    }

    /// Creates a new VEGAS integrator from validated settings.
    pub fn from_config(config: &VegasConfig, boundaries: &[(f64, f64)]) -> Result<Self> {
        config.validate()?;
        let boundaries = Boundaries::new(boundaries)?;
        let map = AdaptiveMap::new(boundaries.limits().len(), config.n_bins)?;
        let rng = match config.seed {
            Some(seed) => Pcg64::seed_from_u64(seed),
            None => Pcg64::from_entropy(),
        };

        Ok(Vegas {
            n_iter: config.n_iter,
            n_eval: config.n_eval,
            alpha: config.alpha,
            rng,
            map,
            boundaries,
        })
    }

    /// Reseeds the random number generator.
    pub fn set_seed(&mut self, seed: u64) {
        self.rng = Pcg64::seed_from_u64(seed);
    }

    /// Returns the number of dimensions of the integrator.
    pub fn dim(&self) -> usize {
        self.map.dims()
    }

    /// The adaptive map, as adapted by the last call to [`Vegas::integrate`].
    pub fn map(&self) -> &AdaptiveMap {
        &self.map
    }

    /// Integrates the given function using the VEGAS algorithm.
    pub fn integrate<F: Integrand + Sync>(&mut self, integrand: &F) -> Result<VegasResult> {
        if integrand.dim() != self.dim() {
            return Err(MapError::DimensionMismatch {
                expected: self.dim(),
                got: integrand.dim(),
            });
        }

        let mut iter_results = Vec::new();
        let mut iter_errors = Vec::new();

        for iter in 0..self.n_iter {
            let (iter_val, iter_err) = self.run_iteration(integrand)?;
            info!(
                iteration = iter,
                value = iter_val,
                error = iter_err,
                "iteration finished"
            );

            // the first iteration only trains the grid
            if iter > 0 {
                iter_results.push(iter_val);
                iter_errors.push(iter_err);
            }

            self.map.adapt(self.alpha, None)?;
        }

        Ok(combine_results(&iter_results, &iter_errors))
    }

    /// Runs a single iteration in parallel and feeds the training data into the map.
    fn run_iteration<F: Integrand + Sync>(&mut self, integrand: &F) -> Result<(f64, f64)> {
        let dim = self.dim();
        let grid = self.map.snapshot();
        let boundaries = &self.boundaries;

        // drawn sequentially so that results do not depend on the thread count
        let random_ys: Vec<Vec<f64>> = (0..self.n_eval)
            .map(|_| (0..dim).map(|_| self.rng.gen()).collect())
            .collect();

        let empty = || Partial {
            sum_f: 0.0,
            sum_f2: 0.0,
            training: Accumulator::for_grid(&grid),
        };

        let total = random_ys
            .par_iter()
            .fold(empty, |mut partial, y_vec| {
                let mut unit = vec![0.0; dim];
                let mut point = vec![0.0; dim];
                let mut bins = vec![0; dim];

                let mut jacobian = grid.map_into(y_vec, &mut unit, &mut bins);
                jacobian *= boundaries.rescale_into(&unit, &mut point);

                let f_val = integrand.eval(&point);
                let f_val = if f_val.is_finite() { f_val } else { 0.0 };
                let weighted_f = f_val * jacobian;
                let f2 = weighted_f * weighted_f;

                if f2.is_finite() {
                    partial.sum_f += weighted_f;
                    partial.sum_f2 += f2;
                    partial.training.record_unchecked(&bins, f2);
                }

                partial
            })
            .reduce(empty, |mut a, b| {
                a.sum_f += b.sum_f;
                a.sum_f2 += b.sum_f2;
                a.training += &b.training;
                a
            });

        self.map.merge_training(&total.training)?;

        let n_eval = self.n_eval as f64;
        let avg_f = total.sum_f / n_eval;
        let avg_f2 = total.sum_f2 / n_eval;
        let variance = (avg_f2 - avg_f * avg_f) / (self.n_eval - 1).max(1) as f64;
        let error = if variance > 0.0 { variance.sqrt() } else { 0.0 };

        Ok((avg_f, error))
    }
}

/// Combines the results from multiple iterations into a final estimate.
fn combine_results(values: &[f64], errors: &[f64]) -> VegasResult {
    let mut weighted_sum = 0.0;
    let mut total_weight = 0.0;

    for (&val, &err) in values.iter().zip(errors.iter()) {
        if err > 0.0 {
            let weight = 1.0 / (err * err);
            weighted_sum += val * weight;
            total_weight += weight;
        }
    }

    if total_weight == 0.0 {
        return VegasResult {
            value: values.last().copied().unwrap_or(0.0),
            error: 0.0,
            chi2_dof: 0.0,
        };
    }

    let final_value = weighted_sum / total_weight;
    let final_error = (1.0 / total_weight).sqrt();

    let mut chi2 = 0.0;
    for (&val, &err) in values.iter().zip(errors.iter()) {
        if err > 0.0 {
            chi2 += ((val - final_value) / err).powi(2);
        }
    }
    let dof = (values.len().saturating_sub(1)).max(1) as f64;

    VegasResult {
        value: final_value,
        error: final_error,
        chi2_dof: chi2 / dof,
    }
}

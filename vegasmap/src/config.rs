//! Settings of the [`Vegas`](crate::vegas::Vegas) driver.

use serde::{Deserialize, Serialize};

use crate::adapt::check_alpha;
use crate::error::{MapError, Result};

/// Driver settings. Missing fields take their default values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct VegasConfig {
    /// Number of iterations, including the warm-up iteration.
    pub n_iter: usize,
    /// Number of integrand evaluations per iteration.
    pub n_eval: usize,
    /// Number of bins per dimension.
    pub n_bins: usize,
    /// Damping exponent of the grid adaptation.
    pub alpha: f64,
    /// Seed of the random number generator; drawn from entropy if absent.
    pub seed: Option<u64>,
}

impl Default for VegasConfig {
    fn default() -> Self {
        Self {
            n_iter: 10,
            n_eval: 10_000,
            n_bins: 50,
            alpha: 0.5,
            seed: None,
        }
    }
}

impl VegasConfig {
    /// Parses and validates a JSON document.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self =
            serde_json::from_str(json).map_err(|err| MapError::InvalidConfig(err.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.n_iter < 2 {
            return Err(MapError::InvalidConfig(format!(
                "at least two iterations are required, got {}",
                self.n_iter
            )));
        }
        if self.n_eval < 2 {
            return Err(MapError::InvalidConfig(format!(
                "at least two evaluations per iteration are required, got {}",
                self.n_eval
            )));
        }
        if self.n_bins == 0 {
            return Err(MapError::ZeroBins);
        }
        check_alpha(self.alpha)
    }
}

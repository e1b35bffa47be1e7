//! Monte Carlo estimates of `E[F]`, `E[G]` and their gradients.
//!
//! A single recourse problem is built per estimate (per worker in the
//! parallel case); each sample only rewrites its renewable bounds.

use super::measure::RiskEvaluation;
use super::RiskAverseProblem;
use crate::dcopf::DeterministicSubproblem;
use gridrisk_core::{GridRiskError, GridRiskResult};
use rand::rngs::StdRng;
use rand::SeedableRng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Sample mean of [`RiskEvaluation`]s.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExpectationEstimate {
    pub mean: RiskEvaluation,
    pub samples: usize,
}

impl ExpectationEstimate {
    fn new(size_x: usize) -> Self {
        Self {
            mean: RiskEvaluation::zeros(size_x),
            samples: 0,
        }
    }

    /// Fold one more sample into the running mean.
    fn push(&mut self, value: &RiskEvaluation) {
        self.samples += 1;
        let w = 1.0 / self.samples as f64;
        blend(&mut self.mean, value, w);
    }

    /// Pool two estimates, weighting each by its sample count.
    fn merge(mut self, other: ExpectationEstimate) -> ExpectationEstimate {
        let total = self.samples + other.samples;
        if total == 0 {
            return self;
        }
        let w = other.samples as f64 / total as f64;
        blend(&mut self.mean, &other.mean, w);
        self.samples = total;
        self
    }
}

/// `mean += w (value - mean)` on every field.
fn blend(mean: &mut RiskEvaluation, value: &RiskEvaluation, w: f64) {
    mean.f += w * (value.f - mean.f);
    mean.g += w * (value.g - mean.g);
    mean.indicator += w * (value.indicator - mean.indicator);
    for (m, v) in mean.g_f.iter_mut().zip(&value.g_f) {
        *m += w * (v - *m);
    }
    for (m, v) in mean.j_g.iter_mut().zip(&value.j_g) {
        *m += w * (v - *m);
    }
}

/// Exact per-worker sample counts; workers past `num_samples` get none.
pub(crate) fn split_samples(num_samples: usize, num_workers: usize) -> Vec<usize> {
    let base = num_samples / num_workers;
    let rem = num_samples % num_workers;
    (0..num_workers)
        .map(|i| if i < rem { base + 1 } else { base })
        .filter(|&n| n > 0)
        .collect()
}

impl<D: DeterministicSubproblem> RiskAverseProblem<D> {
    /// Sequential estimate over `num_samples` scenarios.
    ///
    /// `seed = None` draws the seed from system entropy.
    pub fn eval_efg_sequential(
        &self,
        x: &[f64],
        num_samples: usize,
        seed: Option<u64>,
    ) -> GridRiskResult<ExpectationEstimate> {
        if num_samples == 0 {
            return Err(GridRiskError::Config("num_samples must be positive".into()));
        }
        let p = self.split_x(x)?.0;
        let mut rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let mut problem = self.dcopf.recourse_problem(p, &self.dcopf.data().er)?;
        let mut estimate = ExpectationEstimate::new(x.len());
        for _ in 0..num_samples {
            let r = self.dcopf.sample_w(&mut rng);
            problem.set_renewables(&r)?;
            let value = self.eval_fg_with(x, &problem)?;
            estimate.push(&value);
        }
        Ok(estimate)
    }

    /// Parallel estimate over `num_samples` scenarios on `num_procs` workers.
    ///
    /// Worker `i` samples with seed `seed + i`, so a fixed seed gives a
    /// reproducible estimate for a fixed worker count.
    pub fn eval_efg(&self, x: &[f64]) -> GridRiskResult<ExpectationEstimate> {
        let params = &self.params;
        self.split_x(x)?;
        let counts = split_samples(params.num_samples, params.num_procs);
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(params.num_procs)
            .build()
            .map_err(|e| GridRiskError::Parallel(e.to_string()))?;

        let partials = pool.install(|| {
            counts
                .par_iter()
                .enumerate()
                .map(|(i, &n)| {
                    let seed = params.seed.wrapping_add(i as u64);
                    debug!(worker = i, samples = n, seed, "expectation batch");
                    self.eval_efg_sequential(x, n, Some(seed))
                })
                .collect::<GridRiskResult<Vec<_>>>()
        })?;

        Ok(partials
            .into_iter()
            .fold(ExpectationEstimate::new(x.len()), ExpectationEstimate::merge))
    }
}

use rand::rngs::StdRng;
use rand::Rng;
use rayon::prelude::*;

use crate::stats::median_in_place;

/// Affine-invariant ensemble sampler (Goodman & Weare stretch move).
///
/// Walkers are split into two halves; each half is updated against the
/// other, so log-probabilities within a half are evaluated in parallel.
/// All random draws happen sequentially from one RNG, so a fixed seed gives
/// a fixed chain regardless of thread count.
#[derive(Clone, Debug)]
pub struct EnsembleSampler {
    pub walkers: usize,
    /// Stretch scale `a`.
    pub stretch: f64,
}

/// Post-burn-in samples of an ensemble run.
#[derive(Clone, Debug)]
pub struct Chain {
    pub dim: usize,
    /// Flattened samples, `dim` values each.
    pub samples: Vec<f64>,
    pub acceptance: f64,
}

impl Chain {
    pub fn len(&self) -> usize {
        if self.dim == 0 {
            0
        } else {
            self.samples.len() / self.dim
        }
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Per-parameter posterior median.
    pub fn median(&self) -> Vec<f64> {
        (0..self.dim)
            .map(|k| {
                let mut column: Vec<f64> = self.samples.iter().skip(k).step_by(self.dim).copied().collect();
                median_in_place(&mut column)
            })
            .collect()
    }
}

impl Default for EnsembleSampler {
    fn default() -> Self {
        Self {
            walkers: 32,
            stretch: 2.0,
        }
    }
}

impl EnsembleSampler {
    pub fn new(walkers: usize) -> Self {
        Self {
            walkers: walkers.max(4),
            ..Self::default()
        }
    }

    /// Run `steps` iterations from `initial` (one position per walker) and
    /// keep every position after `burn_in`.
    pub fn run<F>(
        &self,
        log_prob: F,
        initial: Vec<Vec<f64>>,
        steps: usize,
        burn_in: usize,
        rng: &mut StdRng,
    ) -> Chain
    where
        F: Fn(&[f64]) -> f64 + Sync,
    {
        let dim = initial.first().map_or(0, Vec::len);
        let mut positions = initial;
        let mut log_probs: Vec<f64> = positions.par_iter().map(|p| log_prob(p.as_slice())).collect();
        let n = positions.len();

        let mut samples = Vec::with_capacity(steps.saturating_sub(burn_in) * n * dim);
        let mut accepted = 0usize;
        let mut proposed = 0usize;

        for step in 0..steps {
            for half in 0..2 {
                let active: Vec<usize> = (0..n).filter(|i| i % 2 == half).collect();
                let others: Vec<usize> = (0..n).filter(|i| i % 2 != half).collect();
                if others.is_empty() {
                    continue;
                }

                let moves: Vec<(usize, Vec<f64>, f64, f64)> = active
                    .iter()
                    .map(|&i| {
                        let partner = &positions[others[rng.gen_range(0..others.len())]];
                        let u: f64 = rng.gen();
                        let z = ((self.stretch - 1.0) * u + 1.0).powi(2) / self.stretch;
                        let proposal: Vec<f64> = positions[i]
                            .iter()
                            .zip(partner)
                            .map(|(x, y)| y + z * (x - y))
                            .collect();
                        let log_u = rng.gen::<f64>().ln();
                        (i, proposal, z, log_u)
                    })
                    .collect();

                let proposal_lps: Vec<f64> = moves.par_iter().map(|(_, p, _, _)| log_prob(p.as_slice())).collect();

                for ((i, proposal, z, log_u), lp) in moves.into_iter().zip(proposal_lps) {
                    proposed += 1;
                    let log_ratio = (dim as f64 - 1.0) * z.ln() + lp - log_probs[i];
                    if lp.is_finite() && log_u < log_ratio {
                        positions[i] = proposal;
                        log_probs[i] = lp;
                        accepted += 1;
                    }
                }
            }

            if step >= burn_in {
                for p in &positions {
                    samples.extend_from_slice(p);
                }
            }
        }

        Chain {
            dim,
            samples,
            acceptance: if proposed == 0 {
                0.0
            } else {
                accepted as f64 / proposed as f64
            },
        }
    }
}

//! Model-agnostic Shapley estimates by permutation sampling.
//!
//! Coalitions are formed over groups of columns (one group per applicant
//! field). For every sampled permutation, and its reverse, each background
//! row is walked towards the explained row one group at a time and the
//! change in output is credited to the group just switched. The attributions
//! therefore sum exactly to `f(x) - mean(f(background))`.

use ndarray::{Array1, Array2, ArrayView1};
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use std::ops::Range;
use std::time::Instant;

pub const DEFAULT_SEED: u64 = 42;

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("sampling deadline exceeded")]
pub struct DeadlineExceeded;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PermutationSampler {
    /// Rows in the model's input space.
    pub background: Array2<f64>,
    /// Forward permutations drawn; each is also walked in reverse.
    pub permutations: usize,
    pub seed: u64,
}

impl PermutationSampler {
    pub fn new(background: Array2<f64>, permutations: usize) -> Self {
        Self {
            background,
            permutations: permutations.max(1),
            seed: DEFAULT_SEED,
        }
    }

    /// Mean model output over the background rows.
    pub fn expected_value<F>(&self, f: F) -> f64
    where
        F: Fn(ArrayView1<f64>) -> f64,
    {
        let n = self.background.nrows();
        if n == 0 {
            return 0.0;
        }
        self.background.rows().into_iter().map(&f).sum::<f64>() / n as f64
    }

    /// One attribution per group. `deadline` is checked between permutations.
    pub fn shapley<F>(
        &self,
        f: F,
        x: ArrayView1<f64>,
        groups: &[Range<usize>],
        deadline: Option<Instant>,
    ) -> Result<Array1<f64>, DeadlineExceeded>
    where
        F: Fn(ArrayView1<f64>) -> f64,
    {
        let mut phi = Array1::<f64>::zeros(groups.len());
        let n_background = self.background.nrows();
        if n_background == 0 || groups.is_empty() {
            return Ok(phi);
        }

        let mut rng = StdRng::seed_from_u64(self.seed);
        let mut order: Vec<usize> = (0..groups.len()).collect();
        let mut walks = 0usize;

        for _ in 0..self.permutations {
            if deadline.is_some_and(|d| Instant::now() >= d) {
                return Err(DeadlineExceeded);
            }
            order.shuffle(&mut rng);
            for forward in [true, false] {
                for base in self.background.rows() {
                    let mut current = base.to_owned();
                    let mut previous = f(current.view());
                    let mut step = |g: usize| {
                        for col in groups[g].clone() {
                            current[col] = x[col];
                        }
                        let value = f(current.view());
                        phi[g] += value - previous;
                        previous = value;
                    };
                    if forward {
                        order.iter().for_each(|&g| step(g));
                    } else {
                        order.iter().rev().for_each(|&g| step(g));
                    }
                    walks += 1;
                }
            }
        }

        phi /= walks as f64;
        Ok(phi)
    }
}

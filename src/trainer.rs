/**
 * SimLearn
 * Copyright (C) 2018 Sebastian Schelter
 *
 * This program is free software: you can redistribute it and/or modify
 * it under the terms of the GNU General Public License as published by
 * the Free Software Foundation, either version 3 of the License, or
 * (at your option) any later version.
 *
 * This program is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 * GNU General Public License for more details.
 *
 * You should have received a copy of the GNU General Public License
 * along with this program. If not, see <http://www.gnu.org/licenses/>.
 */

use std::time::Instant;

use rand::{Rng, SeedableRng};
use rand::rngs::StdRng;
use tracing::debug;

use config::TrainingConfig;
use errors::TrainingError;
use mask::InteractionMask;
use optimizer::AdaptiveOptimizer;
use similarity::SimilarityState;
use utils;

/// A sampled training example: `positive` is a known item of `user`, `negative` is not.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Triple {
    pub user: u32,
    pub positive: u32,
    pub negative: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EpochSummary {
    pub epoch: usize,
    pub samples: usize,
    /// Triples whose score gap was not a number, these leave the matrix untouched.
    pub skipped: usize,
    /// Mean of the loss gradient `sigmoid(-x)` over the applied triples.
    pub mean_gradient: f64,
    pub elapsed_millis: u64,
}

/// Runs BPR epochs over an item-based similarity matrix. The trainer owns the sampler and the
/// optimizer state; the matrix itself is handed in per epoch, so that nothing else can alias it
/// while it is being updated.
pub struct EpochTrainer<'a> {
    mask: &'a InteractionMask,
    optimizer: AdaptiveOptimizer,
    sampling_pool: Vec<u32>,
    samples_per_epoch: usize,
    lambda_i: f64,
    lambda_j: f64,
    symmetric: bool,
    rng: StdRng,
    epochs_run: usize,
}

impl<'a> EpochTrainer<'a> {

    pub fn new(mask: &'a InteractionMask, config: &TrainingConfig) -> Result<Self, TrainingError> {

        let num_items = mask.num_items();

        // Users without positives have nothing to rank, users who like everything have no
        // negative to sample. Both are left out rather than failing later.
        let sampling_pool: Vec<u32> = mask.users_with_positives()
            .into_iter()
            .filter(|user| mask.positives(*user).len() < num_items)
            .collect();

        if sampling_pool.is_empty() {
            return Err(TrainingError::Configuration(
                "no user has both positive and negative items, nothing to sample".to_string()));
        }

        let samples_per_epoch = config.samples_per_epoch.unwrap_or_else(|| mask.num_positives());

        debug!(
            eligible_users = sampling_pool.len(),
            samples_per_epoch,
            sgd_mode = %config.sgd_mode,
            "Prepared BPR sampler"
        );

        Ok(EpochTrainer {
            mask,
            optimizer: AdaptiveOptimizer::from_config(config),
            sampling_pool,
            samples_per_epoch,
            lambda_i: config.lambda_i,
            lambda_j: config.lambda_j,
            symmetric: config.symmetric,
            rng: StdRng::seed_from_u64(config.seed),
            epochs_run: 0,
        })
    }

    pub fn samples_per_epoch(&self) -> usize {
        self.samples_per_epoch
    }

    pub fn epochs_run(&self) -> usize {
        self.epochs_run
    }

    pub fn optimizer(&self) -> &AdaptiveOptimizer {
        &self.optimizer
    }

    /// Samples a user uniformly from the sampling pool, one of their positives uniformly, and a
    /// negative item uniformly from the items the user has no positive feedback for.
    pub fn sample_triple(&mut self) -> Triple {

        let user = self.sampling_pool[self.rng.gen_range(0..self.sampling_pool.len())];

        let positives = self.mask.positives(user);
        let positive = positives[self.rng.gen_range(0..positives.len())];

        let num_items = self.mask.num_items() as u32;
        let mut negative = self.rng.gen_range(0..num_items);
        while self.mask.is_positive(user, negative) {
            negative = self.rng.gen_range(0..num_items);
        }

        Triple { user, positive, negative }
    }

    /// Applies the pairwise update for a single triple and returns the loss gradient
    /// coefficient `σ(-x)`, or `None` if the score gap `x` is not a number.
    pub fn apply_triple(&mut self, state: &mut SimilarityState, triple: Triple) -> Option<f64> {

        let mask = self.mask;
        let positives = mask.positives(triple.user);
        let Triple { positive: i, negative: j, .. } = triple;

        let x = state.row_sum(i, positives) - state.row_sum(j, positives);

        if x.is_nan() {
            return None;
        }

        let gradient = utils::sigmoid(-x);

        for &l in positives {
            if l != i {
                let regularized = gradient - self.lambda_i * state.value(i, l);
                let delta = self.optimizer.step(i, l, regularized);
                state.apply_update(i, l, delta);
            }
        }

        for &l in positives {
            if l != j {
                let regularized = gradient + self.lambda_j * state.value(j, l);
                let delta = self.optimizer.step(j, l, regularized);
                state.apply_update(j, l, -delta);
            }
        }

        if self.symmetric {
            for &l in positives {
                if l != i {
                    state.mirror(i, l);
                }
                if l != j {
                    state.mirror(j, l);
                }
            }
        }

        Some(gradient)
    }

    pub fn run_epoch(&mut self, state: &mut SimilarityState) -> EpochSummary {

        assert_eq!(state.num_items(), self.mask.num_items(),
            "similarity matrix does not match the interaction matrix");

        let epoch_start = Instant::now();

        let mut skipped = 0;
        let mut gradient_sum = 0.0;

        for _ in 0..self.samples_per_epoch {
            let triple = self.sample_triple();
            match self.apply_triple(state, triple) {
                Some(gradient) => gradient_sum += gradient,
                None => skipped += 1,
            }
        }

        self.epochs_run += 1;

        let applied = self.samples_per_epoch - skipped;
        let mean_gradient = if applied > 0 { gradient_sum / applied as f64 } else { 0.0 };

        let summary = EpochSummary {
            epoch: self.epochs_run,
            samples: self.samples_per_epoch,
            skipped,
            mean_gradient,
            elapsed_millis: utils::to_millis(epoch_start.elapsed()),
        };

        debug!(
            epoch = summary.epoch,
            samples = summary.samples,
            skipped = summary.skipped,
            mean_gradient = summary.mean_gradient,
            elapsed_ms = summary.elapsed_millis,
            tracked_entries = self.optimizer.tracked_entries(),
            "Epoch finished"
        );

        summary
    }
}

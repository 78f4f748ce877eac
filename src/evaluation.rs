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

use tracing::debug;

use early_stopping::{Metrics, Validator};
use errors::TrainingError;
use mask::InteractionMask;
use recommend;
use similarity::SparseWeights;
use utils;

/// Ranking quality of a single user's recommendation list.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
struct UserScores {
    precision: f64,
    recall: f64,
    average_precision: f64,
    ndcg: f64,
}

/// Evaluates served weights against held-out positives: recommendations are computed from the
/// training histories (excluding already known items) and compared with the held-out items of
/// every user who has any. Reports `map`, `precision`, `recall` and `ndcg` at the cutoff.
pub struct HoldoutEvaluator<'a> {
    train: &'a InteractionMask,
    held_out: &'a InteractionMask,
    cutoff: usize,
}

impl<'a> HoldoutEvaluator<'a> {

    pub fn new(
        train: &'a InteractionMask,
        held_out: &'a InteractionMask,
        cutoff: usize,
    ) -> Result<Self, TrainingError> {

        if cutoff == 0 {
            return Err(TrainingError::Configuration("evaluation cutoff must be positive".to_string()));
        }

        if train.num_users() != held_out.num_users() || train.num_items() != held_out.num_items() {
            return Err(TrainingError::Configuration(format!(
                "held-out matrix is {}x{}, but the training matrix is {}x{}",
                held_out.num_users(), held_out.num_items(), train.num_users(), train.num_items())));
        }

        Ok(HoldoutEvaluator { train, held_out, cutoff })
    }

    pub fn evaluate_weights(&self, weights: &SparseWeights) -> Metrics {

        let evaluation_start = Instant::now();
        let transposed = weights.transpose();

        let mut totals = UserScores::default();
        let mut num_users_evaluated = 0;

        for user in 0..self.held_out.num_users() as u32 {

            let relevant = self.held_out.positives(user);
            if relevant.is_empty() {
                continue;
            }

            let recommended: Vec<u32> = recommend::recommend_for_user(
                    self.train.positives(user), &transposed, self.cutoff, true)
                .into_iter()
                .map(|scored_item| scored_item.item)
                .collect();

            let scores = score_ranking(&recommended, relevant);

            totals.precision += scores.precision;
            totals.recall += scores.recall;
            totals.average_precision += scores.average_precision;
            totals.ndcg += scores.ndcg;
            num_users_evaluated += 1;
        }

        let normalizer = if num_users_evaluated > 0 { num_users_evaluated as f64 } else { 1.0 };

        let mut metrics = Metrics::default();
        metrics.insert("precision".to_string(), totals.precision / normalizer);
        metrics.insert("recall".to_string(), totals.recall / normalizer);
        metrics.insert("map".to_string(), totals.average_precision / normalizer);
        metrics.insert("ndcg".to_string(), totals.ndcg / normalizer);

        debug!(
            users = num_users_evaluated,
            cutoff = self.cutoff,
            elapsed_ms = utils::to_millis(evaluation_start.elapsed()),
            "Evaluated recommendations"
        );

        metrics
    }
}

impl<'a> Validator for HoldoutEvaluator<'a> {
    fn evaluate(&mut self, weights: &SparseWeights) -> Result<Metrics, TrainingError> {
        Ok(self.evaluate_weights(weights))
    }
}

/// `relevant` has to be sorted. Precision is taken over the returned list, average precision is
/// normalized by the smaller of the number of relevant and of returned items.
fn score_ranking(recommended: &[u32], relevant: &[u32]) -> UserScores {

    if recommended.is_empty() {
        return UserScores::default();
    }

    let mut hits = 0;
    let mut precision_sum = 0.0;
    let mut dcg = 0.0;

    for (position, item) in recommended.iter().enumerate() {
        if relevant.binary_search(item).is_ok() {
            hits += 1;
            precision_sum += hits as f64 / (position + 1) as f64;
            dcg += 1.0 / ((position + 2) as f64).log2();
        }
    }

    let ideal_hits = relevant.len().min(recommended.len());
    let ideal_dcg: f64 = (0..ideal_hits).map(|position| 1.0 / ((position + 2) as f64).log2()).sum();

    UserScores {
        precision: hits as f64 / recommended.len() as f64,
        recall: hits as f64 / relevant.len() as f64,
        average_precision: precision_sum / ideal_hits as f64,
        ndcg: dcg / ideal_dcg,
    }
}

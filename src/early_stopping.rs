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

use fnv::FnvHashMap;
use tracing::{info, warn};

use config::{EarlyStoppingConfig, TopK, TrainingConfig};
use errors::TrainingError;
use similarity::{SimilarityState, SparseWeights};
use trainer::EpochTrainer;
use utils;

/// Named metric values reported by a validator, e.g. `"map" -> 0.21`.
pub type Metrics = FnvHashMap<String, f64>;

/// External quality signal used to drive early stopping. Calls are synchronous and may take as
/// long as they need; the controller waits for them.
pub trait Validator {
    fn evaluate(&mut self, weights: &SparseWeights) -> Result<Metrics, TrainingError>;
}

/// Adapts a closure into a `Validator`.
pub struct FnValidator<F> {
    evaluate: F,
}

pub fn validator_fn<F>(evaluate: F) -> FnValidator<F>
    where F: FnMut(&SparseWeights) -> Result<Metrics, TrainingError> {
    FnValidator { evaluate }
}

impl<F> Validator for FnValidator<F>
    where F: FnMut(&SparseWeights) -> Result<Metrics, TrainingError> {

    fn evaluate(&mut self, weights: &SparseWeights) -> Result<Metrics, TrainingError> {
        (self.evaluate)(weights)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControllerState {
    Training,
    Validating,
    Converged,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ValidationRecord {
    pub epoch: usize,
    pub metrics: Metrics,
}

/// Drives the epoch loop: validates every `validation_every_n` epochs, keeps the best snapshot
/// and decides when to stop. Without `stop_on_validation`, "best" is simply the latest state,
/// which we only sparsify once training is over.
pub struct EarlyStoppingController<'v> {
    config: EarlyStoppingConfig,
    max_epochs: usize,
    top_k: TopK,
    pool_size: usize,
    validator: Option<Box<dyn Validator + 'v>>,
    stop_on_validation: bool,
    state: ControllerState,
    epoch: usize,
    lower_validations_count: usize,
    best_metric: Option<f64>,
    best_epoch: usize,
    best: Option<SparseWeights>,
    history: Vec<ValidationRecord>,
}

impl<'v> EarlyStoppingController<'v> {

    /// `pool_size` is the number of threads used to sparsify snapshots.
    pub fn new(
        config: &TrainingConfig,
        validator: Option<Box<dyn Validator + 'v>>,
        pool_size: usize,
    ) -> Self {

        let early_stopping = config.early_stopping.clone();

        let stop_on_validation = early_stopping.stop_on_validation && validator.is_some();

        if early_stopping.stop_on_validation && validator.is_none() {
            warn!("Early stopping requested without validation data, keeping the latest state \
                instead of the best one");
        }

        let state = if config.epochs == 0 {
            ControllerState::Converged
        } else {
            ControllerState::Training
        };

        EarlyStoppingController {
            config: early_stopping,
            max_epochs: config.epochs,
            top_k: config.top_k,
            pool_size,
            validator,
            stop_on_validation,
            state,
            epoch: 0,
            lower_validations_count: 0,
            best_metric: None,
            best_epoch: 0,
            best: None,
            history: Vec::new(),
        }
    }

    pub fn state(&self) -> ControllerState {
        self.state
    }

    /// Number of completed epochs.
    pub fn epoch(&self) -> usize {
        self.epoch
    }

    /// Epoch the weights handed out by `into_best` stem from. Until a snapshot has been taken
    /// this is the latest epoch, since the latest state is what we would return.
    pub fn best_epoch(&self) -> usize {
        match self.best {
            Some(_) => self.best_epoch,
            None => self.epoch,
        }
    }

    pub fn best_metric(&self) -> Option<f64> {
        self.best_metric
    }

    pub fn history(&self) -> &[ValidationRecord] {
        &self.history
    }

    /// Whether early stopping is actually in effect, it is silently disabled without a validator.
    pub fn stops_on_validation(&self) -> bool {
        self.stop_on_validation
    }

    /// Bookkeeping after an epoch finished: validates if due, updates the best snapshot and
    /// patience, and returns the state the controller ends up in.
    pub fn on_epoch_end(
        &mut self,
        similarity: &SimilarityState,
    ) -> Result<ControllerState, TrainingError> {

        if self.state == ControllerState::Converged {
            return Ok(self.state);
        }

        self.epoch += 1;

        let validation_due = self.validator.is_some()
            && self.epoch % self.config.validation_every_n == 0;

        if validation_due {
            self.state = ControllerState::Validating;
            self.validate(similarity)?;
        }

        if self.state != ControllerState::Converged {
            self.state = if self.epoch >= self.max_epochs {
                ControllerState::Converged
            } else {
                ControllerState::Training
            };
        }

        Ok(self.state)
    }

    fn validate(&mut self, similarity: &SimilarityState) -> Result<(), TrainingError> {

        let weights = similarity.top_k_sparsify(
            self.top_k.width(similarity.num_items()), self.pool_size);

        let metrics = match self.validator {
            Some(ref mut validator) => validator.evaluate(&weights)?,
            None => return Ok(()),
        };

        info!(epoch = self.epoch, metrics = ?metrics, "Validation finished");

        if self.stop_on_validation {

            let metric_name = &self.config.validation_metric;

            let current_value = match metrics.get(metric_name) {
                Some(value) => *value,
                None => return Err(TrainingError::UnknownMetric(metric_name.clone())),
            };

            let improved = match self.best_metric {
                Some(best_value) => current_value > best_value,
                None => true,
            };

            if improved {
                self.best_metric = Some(current_value);
                self.best_epoch = self.epoch;
                self.best = Some(weights);
                self.lower_validations_count = 0;
            } else {
                self.lower_validations_count += 1;
            }

            if self.lower_validations_count >= self.config.lower_validations_allowed {
                self.state = ControllerState::Converged;
                info!(
                    epoch = self.epoch,
                    metric = %metric_name,
                    best_epoch = self.best_epoch,
                    best_value = self.best_metric.unwrap_or(current_value),
                    "Convergence reached"
                );
            }
        }

        self.history.push(ValidationRecord { epoch: self.epoch, metrics });

        Ok(())
    }

    /// Runs epochs until the controller converges.
    pub fn run(
        &mut self,
        trainer: &mut EpochTrainer,
        similarity: &mut SimilarityState,
    ) -> Result<(), TrainingError> {

        let start = Instant::now();

        while self.state != ControllerState::Converged {
            trainer.run_epoch(similarity);
            self.on_epoch_end(similarity)?;

            info!(
                epoch = self.epoch,
                max_epochs = self.max_epochs,
                elapsed_ms = utils::to_millis(start.elapsed()),
                "Epoch completed"
            );
        }

        Ok(())
    }

    /// The trained artifact: the best snapshot, or the sparsified latest state when no snapshot
    /// has been taken.
    pub fn into_best(self, similarity: &SimilarityState) -> SparseWeights {
        match self.best {
            Some(weights) => weights,
            None => similarity.top_k_sparsify(
                self.top_k.width(similarity.num_items()), self.pool_size),
        }
    }
}

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

extern crate bincode;
extern crate csv;
extern crate fnv;
extern crate rand;
extern crate scoped_pool;
extern crate serde;
#[macro_use]
extern crate serde_derive;
extern crate serde_json;
extern crate thiserror;
extern crate tracing;

#[cfg(test)]
extern crate proptest;
#[cfg(test)]
extern crate tempfile;

use std::path::Path;
use std::time::Instant;

use tracing::info;

pub mod config;
pub mod early_stopping;
pub mod errors;
pub mod evaluation;
pub mod io;
pub mod mask;
pub mod optimizer;
pub mod recommend;
pub mod similarity;
pub mod stats;
pub mod trainer;
pub mod types;
pub mod utils;


pub use config::{EarlyStoppingConfig, SgdMode, TopK, TrainingConfig};
pub use early_stopping::{EarlyStoppingController, Metrics, Validator, validator_fn};
pub use errors::TrainingError;
pub use evaluation::HoldoutEvaluator;
pub use mask::InteractionMask;
pub use similarity::{SimilarityState, SparseWeights};
pub use trainer::EpochTrainer;

use types::SparseBinaryMatrix;

/// Name prefix used for persisted models when the caller does not choose one.
pub const DEFAULT_MODEL_PREFIX: &str = "SLIM_BPR_";

/// Everything needed to reproduce how a trained model serves recommendations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelMetadata {
    pub num_items: usize,
    pub top_k: TopK,
    pub sgd_mode: SgdMode,
    pub symmetric: bool,
    pub sparse_training: bool,
    pub epochs_run: usize,
    pub best_epoch: usize,
    pub validation_metric: String,
    pub best_metric: Option<f64>,
}

/// The learned, sparsified item-to-item weights together with their metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct TrainedModel {
    weights: SparseWeights,
    metadata: ModelMetadata,
}

impl TrainedModel {

    pub fn new(weights: SparseWeights, metadata: ModelMetadata) -> Self {
        TrainedModel { weights, metadata }
    }

    pub fn weights(&self) -> &SparseWeights {
        &self.weights
    }

    pub fn metadata(&self) -> &ModelMetadata {
        &self.metadata
    }

    /// Top-`n` recommendations per user, aggregating the learned weights over each history.
    pub fn recommend(&self, histories: &SparseBinaryMatrix, n: usize) -> Vec<Vec<u32>> {
        recommend::recommend(histories, &self.weights, n, true)
    }

    /// Stores the model under `folder`, every file name starts with `prefix`.
    pub fn save<P: AsRef<Path>>(&self, folder: P, prefix: &str) -> Result<(), TrainingError> {
        let folder = folder.as_ref();

        info!(folder = %folder.display(), prefix, "Saving model");

        io::write_weights(&self.weights, &io::weights_path(folder, prefix))?;
        io::write_json(&self.metadata, &io::metadata_path(folder, prefix))?;

        Ok(())
    }

    pub fn load<P: AsRef<Path>>(folder: P, prefix: &str) -> Result<Self, TrainingError> {
        let folder = folder.as_ref();

        info!(folder = %folder.display(), prefix, "Loading model");

        let weights: SparseWeights = io::read_weights(&io::weights_path(folder, prefix))?;
        let metadata: ModelMetadata = io::read_json(&io::metadata_path(folder, prefix))?;

        if weights.num_items() != metadata.num_items {
            return Err(TrainingError::MalformedInput(format!(
                "stored weights cover {} items, metadata claims {}",
                weights.num_items(), metadata.num_items)));
        }

        Ok(TrainedModel { weights, metadata })
    }
}

/// Learns a sparse item-to-item similarity matrix with BPR ("SLIM BPR") from the positive
/// interactions of `mask`.
pub struct SlimBpr<'a> {
    mask: &'a InteractionMask,
    config: TrainingConfig,
    pool_size: usize,
}

impl<'a> SlimBpr<'a> {

    /// `pool_size` is the number of threads used to sparsify the learned matrix.
    pub fn new(mask: &'a InteractionMask, config: TrainingConfig, pool_size: usize) -> Self {
        SlimBpr { mask, config, pool_size: pool_size.max(1) }
    }

    pub fn config(&self) -> &TrainingConfig {
        &self.config
    }

    /// Trains until the early stopping controller converges and returns the best snapshot.
    /// Configuration problems surface before any memory is allocated for the matrix.
    pub fn fit<'v>(
        &self,
        validator: Option<Box<dyn Validator + 'v>>,
    ) -> Result<TrainedModel, TrainingError> {

        let config = &self.config;
        config.validate()?;

        let num_items = self.mask.num_items();
        let estimate = config.check_capacity(num_items)?;

        info!(
            users = self.mask.num_users(),
            items = num_items,
            positives = self.mask.num_positives(),
            dense_bytes = estimate.required_bytes,
            sparse_training = config.sparse_training,
            sgd_mode = %config.sgd_mode,
            top_k = %config.top_k,
            "Starting SLIM BPR training"
        );

        let training_start = Instant::now();

        let mut similarity = SimilarityState::for_config(num_items, config);

        let mut trainer = EpochTrainer::new(self.mask, config)?;
        let mut controller = EarlyStoppingController::new(config, validator, self.pool_size);

        controller.run(&mut trainer, &mut similarity)?;

        let metadata = ModelMetadata {
            num_items,
            top_k: config.top_k,
            sgd_mode: trainer.optimizer().mode(),
            symmetric: config.symmetric,
            sparse_training: similarity.is_sparse(),
            epochs_run: controller.epoch(),
            best_epoch: controller.best_epoch(),
            validation_metric: config.early_stopping.validation_metric.clone(),
            best_metric: controller.best_metric(),
        };

        let weights = controller.into_best(&similarity);

        info!(
            epochs = metadata.epochs_run,
            best_epoch = metadata.best_epoch,
            nnz = weights.nnz(),
            optimizer_entries = trainer.optimizer().tracked_entries(),
            elapsed_ms = utils::to_millis(training_start.elapsed()),
            "Training finished"
        );

        Ok(TrainedModel { weights, metadata })
    }

    /// Like `fit`, validating against held-out positives with a `HoldoutEvaluator`.
    pub fn fit_with_holdout(
        &self,
        held_out: &InteractionMask,
        cutoff: usize,
    ) -> Result<TrainedModel, TrainingError> {
        let evaluator = HoldoutEvaluator::new(self.mask, held_out, cutoff)?;
        self.fit(Some(Box::new(evaluator)))
    }
}


#[cfg(test)]
mod tests {

    use serde_json;
    use tempfile;

    use super::*;

    fn toy_mask() -> InteractionMask {
        InteractionMask::from_histories(
            vec![vec![0, 1, 2], vec![1, 2], vec![0, 2, 3], vec![3, 4], vec![1, 4]], 5).unwrap()
    }

    fn quick_config() -> TrainingConfig {
        TrainingConfig {
            epochs: 5,
            learning_rate: 0.05,
            top_k: TopK::Keep(2),
            samples_per_epoch: Some(50),
            ..TrainingConfig::default()
        }
    }

    #[test]
    fn invalid_topk_fails_before_training() {
        let mask = toy_mask();
        let config = TrainingConfig { top_k: TopK::Keep(0), ..quick_config() };

        let calls = ::std::cell::Cell::new(0);
        let validator = validator_fn(|_: &SparseWeights| {
            calls.set(calls.get() + 1);
            Ok(Metrics::default())
        });

        match SlimBpr::new(&mask, config, 1).fit(Some(Box::new(validator))) {
            Err(TrainingError::InvalidTopK(_)) => {},
            other => panic!("unexpected result {:?}", other),
        }
        assert_eq!(calls.get(), 0);
    }

    #[test]
    fn trained_model_respects_topk_and_diagonal() {
        let mask = toy_mask();
        let model = SlimBpr::new(&mask, quick_config(), 2).fit(None).unwrap();

        let weights = model.weights();
        for item in 0..5u32 {
            assert!(weights.row(item).len() <= 2);
            assert_eq!(weights.get(item, item), 0.0);
        }

        assert_eq!(model.metadata().epochs_run, 5);
        assert_eq!(model.metadata().best_epoch, 5);
        assert_eq!(model.metadata().best_metric, None);
    }

    #[test]
    fn topk_wider_than_the_catalog_keeps_whole_rows() {
        let mask = toy_mask();

        let config = TrainingConfig { top_k: TopK::Keep(usize::max_value()), ..quick_config() };
        let widest = SlimBpr::new(&mask, config, 2).fit(None).unwrap();

        let config = TrainingConfig { top_k: TopK::Disabled, ..quick_config() };
        let unpruned = SlimBpr::new(&mask, config, 2).fit(None).unwrap();

        assert_eq!(widest.weights(), unpruned.weights());

        let json = r#"{"epochs": 2, "top_k": 9223372036854775807, "samples_per_epoch": 10}"#;
        let config: TrainingConfig = serde_json::from_str(json).unwrap();
        let model = SlimBpr::new(&mask, config, 1).fit(None).unwrap();

        let held_out = InteractionMask::from_histories(
            vec![vec![3], vec![0], vec![1], vec![], vec![2]], 5).unwrap();
        let recommendations = model.recommend(mask.histories(), usize::max_value());
        assert_eq!(recommendations.len(), 5);
        assert!(SlimBpr::new(&mask, quick_config(), 1)
            .fit_with_holdout(&held_out, usize::max_value()).is_ok());
    }

    #[test]
    fn metadata_matches_the_trained_representation() {
        let mask = toy_mask();
        let config = TrainingConfig {
            sgd_mode: SgdMode::Adam,
            sparse_training: true,
            ..quick_config()
        };

        let model = SlimBpr::new(&mask, config, 1).fit(None).unwrap();

        assert_eq!(model.metadata().sgd_mode, SgdMode::Adam);
        assert!(model.metadata().sparse_training);
    }

    #[test]
    fn never_validated_model_stems_from_the_last_epoch() {
        let mask = toy_mask();
        let held_out = InteractionMask::from_histories(
            vec![vec![3], vec![0], vec![1], vec![], vec![2]], 5).unwrap();

        let mut config = quick_config();
        config.epochs = 3;
        config.early_stopping.stop_on_validation = true;
        config.early_stopping.validation_every_n = 10;

        let model = SlimBpr::new(&mask, config, 1).fit_with_holdout(&held_out, 3).unwrap();

        let metadata = model.metadata();
        assert_eq!(metadata.epochs_run, 3);
        assert_eq!(metadata.best_epoch, 3);
        assert_eq!(metadata.best_metric, None);
    }

    #[test]
    fn dense_and_sparse_training_learn_the_same_model() {
        let mask = toy_mask();

        let dense = SlimBpr::new(&mask, quick_config(), 1).fit(None).unwrap();
        let sparse_config = TrainingConfig { sparse_training: true, ..quick_config() };
        let sparse = SlimBpr::new(&mask, sparse_config, 1).fit(None).unwrap();

        assert_eq!(dense.weights(), sparse.weights());
    }

    #[test]
    fn oversized_dense_matrix_is_rejected() {
        let mask = toy_mask();
        let config = TrainingConfig { max_dense_bytes: 16, ..quick_config() };

        match SlimBpr::new(&mask, config.clone(), 1).fit(None) {
            Err(TrainingError::DenseAllocationRejected { required_bytes, .. }) => {
                assert_eq!(required_bytes, 200);
            },
            other => panic!("unexpected result {:?}", other),
        }

        let sparse = TrainingConfig { sparse_training: true, ..config };
        assert!(SlimBpr::new(&mask, sparse, 1).fit(None).is_ok());
    }

    #[test]
    fn holdout_validation_drives_training() {
        let mask = toy_mask();
        let held_out = InteractionMask::from_histories(
            vec![vec![3], vec![0], vec![1], vec![], vec![2]], 5).unwrap();

        let mut config = quick_config();
        config.early_stopping.stop_on_validation = true;
        config.early_stopping.lower_validations_allowed = 2;

        let model = SlimBpr::new(&mask, config, 1).fit_with_holdout(&held_out, 3).unwrap();

        let metadata = model.metadata();
        assert!(metadata.best_metric.is_some());
        assert!(metadata.best_epoch >= 1 && metadata.best_epoch <= metadata.epochs_run);
        assert_eq!(metadata.validation_metric, "map");
    }

    #[test]
    fn save_then_load_is_exact() {
        let mask = toy_mask();
        let model = SlimBpr::new(&mask, quick_config(), 1).fit(None).unwrap();

        let folder = tempfile::tempdir().unwrap();
        model.save(folder.path(), DEFAULT_MODEL_PREFIX).unwrap();

        let restored = TrainedModel::load(folder.path(), DEFAULT_MODEL_PREFIX).unwrap();
        assert_eq!(restored, model);
        assert_eq!(restored.recommend(mask.histories(), 2), model.recommend(mask.histories(), 2));
    }

    #[test]
    fn loading_from_a_missing_folder_fails_with_io_error() {
        let folder = tempfile::tempdir().unwrap();
        let missing = folder.path().join("nowhere");

        match TrainedModel::load(&missing, "model_") {
            Err(TrainingError::Io(_)) => {},
            other => panic!("unexpected result {:?}", other),
        }
    }
}

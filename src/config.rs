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

use std::cmp;
use std::convert::TryFrom;
use std::fmt;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::str::FromStr;

use serde_json;
use tracing::warn;

use errors::TrainingError;

/// Dense allocations beyond this many bytes have to be confirmed via `allow_large_dense`.
pub const DEFAULT_MAX_DENSE_BYTES: u64 = 2 * 1024 * 1024 * 1024;

/// Update rule used to turn a raw gradient into a step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SgdMode {
    Sgd,
    Adagrad,
    RmsProp,
    Adam,
}

impl FromStr for SgdMode {
    type Err = TrainingError;

    fn from_str(name: &str) -> Result<Self, Self::Err> {
        match name.trim().to_lowercase().as_str() {
            "sgd" => Ok(SgdMode::Sgd),
            "adagrad" => Ok(SgdMode::Adagrad),
            "rmsprop" => Ok(SgdMode::RmsProp),
            "adam" => Ok(SgdMode::Adam),
            other => Err(TrainingError::Configuration(
                format!("unknown sgd_mode '{}', expected one of sgd, adagrad, rmsprop, adam", other)
            )),
        }
    }
}

impl fmt::Display for SgdMode {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match *self {
            SgdMode::Sgd => "sgd",
            SgdMode::Adagrad => "adagrad",
            SgdMode::RmsProp => "rmsprop",
            SgdMode::Adam => "adam",
        };
        write!(f, "{}", name)
    }
}

/// Number of entries retained per row of the served matrix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawTopK", into = "RawTopK")]
pub enum TopK {
    Keep(usize),
    Disabled,
}

impl TopK {

    /// Row width to retain for a catalog of `num_items` items, never more than the catalog.
    pub fn width(&self, num_items: usize) -> usize {
        match *self {
            TopK::Keep(k) => cmp::min(k, num_items),
            TopK::Disabled => num_items,
        }
    }
}

impl fmt::Display for TopK {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            TopK::Keep(k) => write!(f, "{}", k),
            TopK::Disabled => write!(f, "disabled"),
        }
    }
}

impl FromStr for TopK {
    type Err = TrainingError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_lowercase().as_str() {
            "disabled" | "all" | "false" => Ok(TopK::Disabled),
            other => match other.parse::<usize>() {
                Ok(k) if k > 0 => Ok(TopK::Keep(k)),
                _ => Err(TrainingError::InvalidTopK(value.to_string())),
            }
        }
    }
}

/// Wire representation of `TopK`: a positive integer, `false`, or one of the disabling names.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
enum RawTopK {
    Width(u64),
    Negative(i64),
    Flag(bool),
    Name(String),
}

impl TryFrom<RawTopK> for TopK {
    type Error = TrainingError;

    fn try_from(raw: RawTopK) -> Result<Self, Self::Error> {
        match raw {
            RawTopK::Width(0) => Err(TrainingError::InvalidTopK("0".to_string())),
            RawTopK::Width(k) => Ok(TopK::Keep(usize::try_from(k).unwrap_or(usize::max_value()))),
            RawTopK::Negative(k) => Err(TrainingError::InvalidTopK(k.to_string())),
            RawTopK::Flag(false) => Ok(TopK::Disabled),
            RawTopK::Flag(true) => Err(TrainingError::InvalidTopK("true".to_string())),
            RawTopK::Name(name) => name.parse(),
        }
    }
}

impl From<TopK> for RawTopK {
    fn from(top_k: TopK) -> Self {
        match top_k {
            TopK::Keep(k) => RawTopK::Width(k as u64),
            TopK::Disabled => RawTopK::Name("disabled".to_string()),
        }
    }
}

/// Cadence and patience of the validation-driven early stopping.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EarlyStoppingConfig {
    pub validation_every_n: usize,
    pub lower_validations_allowed: usize,
    pub stop_on_validation: bool,
    pub validation_metric: String,
}

impl Default for EarlyStoppingConfig {
    fn default() -> Self {
        EarlyStoppingConfig {
            validation_every_n: 1,
            lower_validations_allowed: 5,
            stop_on_validation: false,
            validation_metric: String::from("map"),
        }
    }
}

/// All knobs of a training run. Every field has a default, so a JSON config only needs to
/// mention the values it wants to change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingConfig {
    pub epochs: usize,
    pub learning_rate: f64,
    pub lambda_i: f64,
    pub lambda_j: f64,
    pub top_k: TopK,
    pub sgd_mode: SgdMode,
    pub gamma: f64,
    pub beta_1: f64,
    pub beta_2: f64,
    pub epsilon: f64,
    pub symmetric: bool,
    pub sparse_training: bool,
    pub positive_threshold: f64,
    pub samples_per_epoch: Option<usize>,
    pub seed: u64,
    pub max_dense_bytes: u64,
    pub allow_large_dense: bool,
    pub early_stopping: EarlyStoppingConfig,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        TrainingConfig {
            epochs: 300,
            learning_rate: 1e-4,
            lambda_i: 0.0,
            lambda_j: 0.0,
            top_k: TopK::Keep(200),
            sgd_mode: SgdMode::Adagrad,
            gamma: 0.995,
            beta_1: 0.9,
            beta_2: 0.999,
            epsilon: 1e-8,
            symmetric: true,
            sparse_training: false,
            positive_threshold: 4.0,
            samples_per_epoch: None,
            seed: 42,
            max_dense_bytes: DEFAULT_MAX_DENSE_BYTES,
            allow_large_dense: false,
            early_stopping: EarlyStoppingConfig::default(),
        }
    }
}

impl TrainingConfig {

    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self, TrainingError> {
        let reader = BufReader::new(File::open(path)?);
        let config: TrainingConfig = serde_json::from_reader(reader)?;
        Ok(config)
    }

    /// Checks all values before any state gets allocated.
    pub fn validate(&self) -> Result<(), TrainingError> {

        if let TopK::Keep(0) = self.top_k {
            return Err(TrainingError::InvalidTopK("0".to_string()));
        }

        if !(self.learning_rate.is_finite() && self.learning_rate > 0.0) {
            return Err(invalid("learning_rate must be a positive number", self.learning_rate));
        }

        if !(self.lambda_i.is_finite() && self.lambda_i >= 0.0) {
            return Err(invalid("lambda_i must be non-negative", self.lambda_i));
        }

        if !(self.lambda_j.is_finite() && self.lambda_j >= 0.0) {
            return Err(invalid("lambda_j must be non-negative", self.lambda_j));
        }

        if !(self.gamma > 0.0 && self.gamma < 1.0) {
            return Err(invalid("gamma must lie in (0, 1)", self.gamma));
        }

        if !(self.beta_1 >= 0.0 && self.beta_1 < 1.0) {
            return Err(invalid("beta_1 must lie in [0, 1)", self.beta_1));
        }

        if !(self.beta_2 >= 0.0 && self.beta_2 < 1.0) {
            return Err(invalid("beta_2 must lie in [0, 1)", self.beta_2));
        }

        if !(self.epsilon.is_finite() && self.epsilon > 0.0) {
            return Err(invalid("epsilon must be a positive number", self.epsilon));
        }

        if !self.positive_threshold.is_finite() {
            return Err(invalid("positive_threshold must be finite", self.positive_threshold));
        }

        if let Some(0) = self.samples_per_epoch {
            return Err(TrainingError::Configuration(
                "samples_per_epoch must be positive when given".to_string()));
        }

        let early_stopping = &self.early_stopping;

        if early_stopping.validation_every_n == 0 {
            return Err(TrainingError::Configuration(
                "validation_every_n must be positive".to_string()));
        }

        if early_stopping.lower_validations_allowed == 0 {
            return Err(TrainingError::Configuration(
                "lower_validations_allowed must be positive".to_string()));
        }

        if early_stopping.validation_metric.trim().is_empty() {
            return Err(TrainingError::Configuration(
                "validation_metric must not be empty".to_string()));
        }

        Ok(())
    }

    /// Pre-flight check of the dense accumulator footprint. Never allocates and never blocks: an
    /// oversized dense allocation is rejected unless `allow_large_dense` is set, in which case the
    /// caller only gets a warning. Sparse training always passes.
    pub fn check_capacity(&self, num_items: usize) -> Result<MemoryEstimate, TrainingError> {

        let estimate = estimate_dense_memory(num_items, self.max_dense_bytes);

        if self.sparse_training || !estimate.exceeds_threshold() {
            return Ok(estimate);
        }

        if self.allow_large_dense {
            warn!(
                num_items,
                required_bytes = estimate.required_bytes,
                threshold_bytes = estimate.threshold_bytes,
                "Allocating a dense similarity matrix beyond the configured limit"
            );
            Ok(estimate)
        } else {
            Err(TrainingError::DenseAllocationRejected {
                required_bytes: estimate.required_bytes,
                threshold_bytes: estimate.threshold_bytes,
            })
        }
    }
}

fn invalid(message: &str, value: f64) -> TrainingError {
    TrainingError::Configuration(format!("{}, got {}", message, value))
}

/// Estimated footprint of a dense `items x items` accumulator of 64 bit floats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryEstimate {
    pub num_items: usize,
    pub required_bytes: u64,
    pub threshold_bytes: u64,
}

impl MemoryEstimate {
    pub fn exceeds_threshold(&self) -> bool {
        self.required_bytes > self.threshold_bytes
    }
}

pub fn estimate_dense_memory(num_items: usize, threshold_bytes: u64) -> MemoryEstimate {
    let n = num_items as u64;
    let required_bytes = n.saturating_mul(n).saturating_mul(8);

    MemoryEstimate { num_items, required_bytes, threshold_bytes }
}


#[cfg(test)]
mod tests {

    use serde_json;

    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = TrainingConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.sgd_mode, SgdMode::Adagrad);
        assert_eq!(config.top_k, TopK::Keep(200));
    }

    #[test]
    fn zero_topk_is_rejected() {
        let config = TrainingConfig { top_k: TopK::Keep(0), ..TrainingConfig::default() };

        match config.validate() {
            Err(TrainingError::InvalidTopK(value)) => assert_eq!(value, "0"),
            other => panic!("unexpected result {:?}", other),
        }
    }

    #[test]
    fn topk_parsing() {
        assert_eq!("disabled".parse::<TopK>().unwrap(), TopK::Disabled);
        assert_eq!("ALL".parse::<TopK>().unwrap(), TopK::Disabled);
        assert_eq!("15".parse::<TopK>().unwrap(), TopK::Keep(15));
        assert!("0".parse::<TopK>().is_err());
        assert!("-3".parse::<TopK>().is_err());
        assert!("many".parse::<TopK>().is_err());
    }

    #[test]
    fn width_never_exceeds_the_catalog() {
        assert_eq!(TopK::Keep(3).width(5), 3);
        assert_eq!(TopK::Keep(usize::max_value()).width(5), 5);
        assert_eq!(TopK::Disabled.width(5), 5);

        let widest: TopK = serde_json::from_str("9223372036854775807").unwrap();
        assert_eq!(widest.width(7), 7);

        let widest = TopK::Keep(usize::max_value());
        let as_json = serde_json::to_string(&widest).unwrap();
        assert_eq!(serde_json::from_str::<TopK>(&as_json).unwrap(), widest);
    }

    #[test]
    fn topk_from_json() {
        let width: TopK = serde_json::from_str("25").unwrap();
        assert_eq!(width, TopK::Keep(25));

        let disabled: TopK = serde_json::from_str("false").unwrap();
        assert_eq!(disabled, TopK::Disabled);

        let named: TopK = serde_json::from_str("\"disabled\"").unwrap();
        assert_eq!(named, TopK::Disabled);

        assert!(serde_json::from_str::<TopK>("0").is_err());
        assert!(serde_json::from_str::<TopK>("-1").is_err());
        assert!(serde_json::from_str::<TopK>("true").is_err());
    }

    #[test]
    fn partial_json_config() {
        let json = r#"{
            "epochs": 10,
            "sgd_mode": "rmsprop",
            "top_k": 50,
            "early_stopping": { "stop_on_validation": true, "lower_validations_allowed": 2 }
        }"#;

        let config: TrainingConfig = serde_json::from_str(json).unwrap();

        assert_eq!(config.epochs, 10);
        assert_eq!(config.sgd_mode, SgdMode::RmsProp);
        assert_eq!(config.top_k, TopK::Keep(50));
        assert!(config.early_stopping.stop_on_validation);
        assert_eq!(config.early_stopping.lower_validations_allowed, 2);
        assert_eq!(config.early_stopping.validation_metric, "map");
        assert!(config.symmetric);
    }

    #[test]
    fn config_survives_json() {
        let config = TrainingConfig {
            top_k: TopK::Disabled,
            sgd_mode: SgdMode::Adam,
            ..TrainingConfig::default()
        };

        let json = serde_json::to_string(&config).unwrap();
        let parsed: TrainingConfig = serde_json::from_str(&json).unwrap();

        assert_eq!(parsed, config);
    }

    #[test]
    fn sgd_mode_names() {
        assert_eq!("AdaGrad".parse::<SgdMode>().unwrap(), SgdMode::Adagrad);
        assert_eq!("rmsprop".parse::<SgdMode>().unwrap(), SgdMode::RmsProp);
        assert!("momentum".parse::<SgdMode>().is_err());
        assert_eq!(SgdMode::RmsProp.to_string(), "rmsprop");
    }

    #[test]
    fn invalid_values_are_rejected() {
        let negative_rate = TrainingConfig { learning_rate: -0.1, ..TrainingConfig::default() };
        assert!(negative_rate.validate().is_err());

        let nan_lambda = TrainingConfig { lambda_j: ::std::f64::NAN, ..TrainingConfig::default() };
        assert!(nan_lambda.validate().is_err());

        let mut no_patience = TrainingConfig::default();
        no_patience.early_stopping.lower_validations_allowed = 0;
        assert!(no_patience.validate().is_err());

        let mut never_validate = TrainingConfig::default();
        never_validate.early_stopping.validation_every_n = 0;
        assert!(never_validate.validate().is_err());
    }

    #[test]
    fn memory_estimate() {
        let estimate = estimate_dense_memory(1_000, 1_000_000);
        assert_eq!(estimate.required_bytes, 8_000_000);
        assert!(estimate.exceeds_threshold());

        let huge = estimate_dense_memory(::std::usize::MAX, 0);
        assert_eq!(huge.required_bytes, ::std::u64::MAX);
    }

    #[test]
    fn oversized_dense_allocation_needs_confirmation() {
        let config = TrainingConfig { max_dense_bytes: 1_000, ..TrainingConfig::default() };

        match config.check_capacity(100) {
            Err(TrainingError::DenseAllocationRejected { required_bytes, threshold_bytes }) => {
                assert_eq!(required_bytes, 80_000);
                assert_eq!(threshold_bytes, 1_000);
            },
            other => panic!("unexpected result {:?}", other),
        }

        let confirmed = TrainingConfig { allow_large_dense: true, ..config.clone() };
        assert!(confirmed.check_capacity(100).is_ok());

        let sparse = TrainingConfig { sparse_training: true, ..config };
        assert!(sparse.check_capacity(100).is_ok());
    }
}

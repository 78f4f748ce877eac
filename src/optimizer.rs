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

use fnv::FnvHashMap;

use config::{SgdMode, TrainingConfig};

/// First and second moment estimates of a single coordinate, together with the running powers
/// of the decay rates needed for bias correction.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Moments {
    pub first: f64,
    pub second: f64,
    beta_1_power: f64,
    beta_2_power: f64,
}

impl Default for Moments {
    fn default() -> Self {
        Moments { first: 0.0, second: 0.0, beta_1_power: 1.0, beta_2_power: 1.0 }
    }
}

/// Turns the raw gradient of a matrix coordinate into the step actually applied. The update
/// rule is fixed when the optimizer is built; the per-coordinate caches only get an entry once
/// the coordinate receives its first gradient.
#[derive(Debug, Clone)]
pub enum AdaptiveOptimizer {
    Sgd {
        learning_rate: f64,
    },
    Adagrad {
        learning_rate: f64,
        epsilon: f64,
        cache: FnvHashMap<u64, f64>,
    },
    RmsProp {
        learning_rate: f64,
        gamma: f64,
        epsilon: f64,
        cache: FnvHashMap<u64, f64>,
    },
    Adam {
        learning_rate: f64,
        beta_1: f64,
        beta_2: f64,
        epsilon: f64,
        moments: FnvHashMap<u64, Moments>,
    },
}

#[inline(always)]
fn coordinate(row: u32, col: u32) -> u64 {
    (row as u64) << 32 | col as u64
}

impl AdaptiveOptimizer {

    pub fn from_config(config: &TrainingConfig) -> Self {
        let learning_rate = config.learning_rate;
        let epsilon = config.epsilon;

        match config.sgd_mode {
            SgdMode::Sgd => AdaptiveOptimizer::Sgd { learning_rate },
            SgdMode::Adagrad => AdaptiveOptimizer::Adagrad {
                learning_rate,
                epsilon,
                cache: FnvHashMap::default(),
            },
            SgdMode::RmsProp => AdaptiveOptimizer::RmsProp {
                learning_rate,
                gamma: config.gamma,
                epsilon,
                cache: FnvHashMap::default(),
            },
            SgdMode::Adam => AdaptiveOptimizer::Adam {
                learning_rate,
                beta_1: config.beta_1,
                beta_2: config.beta_2,
                epsilon,
                moments: FnvHashMap::default(),
            },
        }
    }

    pub fn mode(&self) -> SgdMode {
        match *self {
            AdaptiveOptimizer::Sgd { .. } => SgdMode::Sgd,
            AdaptiveOptimizer::Adagrad { .. } => SgdMode::Adagrad,
            AdaptiveOptimizer::RmsProp { .. } => SgdMode::RmsProp,
            AdaptiveOptimizer::Adam { .. } => SgdMode::Adam,
        }
    }

    /// Returns the step for `gradient` at `(row, col)` and advances that coordinate's state.
    #[inline]
    pub fn step(&mut self, row: u32, col: u32, gradient: f64) -> f64 {
        match *self {
            AdaptiveOptimizer::Sgd { learning_rate } => learning_rate * gradient,

            AdaptiveOptimizer::Adagrad { learning_rate, epsilon, ref mut cache } => {
                let accumulated = cache.entry(coordinate(row, col)).or_insert(0.0);
                *accumulated += gradient * gradient;

                learning_rate * gradient / (accumulated.sqrt() + epsilon)
            },

            AdaptiveOptimizer::RmsProp { learning_rate, gamma, epsilon, ref mut cache } => {
                let accumulated = cache.entry(coordinate(row, col)).or_insert(0.0);
                *accumulated = gamma * *accumulated + (1.0 - gamma) * gradient * gradient;

                learning_rate * gradient / (accumulated.sqrt() + epsilon)
            },

            AdaptiveOptimizer::Adam { learning_rate, beta_1, beta_2, epsilon, ref mut moments } => {
                let state = moments.entry(coordinate(row, col)).or_insert_with(Moments::default);

                state.first = beta_1 * state.first + (1.0 - beta_1) * gradient;
                state.second = beta_2 * state.second + (1.0 - beta_2) * gradient * gradient;
                state.beta_1_power *= beta_1;
                state.beta_2_power *= beta_2;

                let first_corrected = state.first / (1.0 - state.beta_1_power);
                let second_corrected = state.second / (1.0 - state.beta_2_power);

                learning_rate * first_corrected / (second_corrected.sqrt() + epsilon)
            },
        }
    }

    /// Number of coordinates which carry optimizer state.
    pub fn tracked_entries(&self) -> usize {
        match *self {
            AdaptiveOptimizer::Sgd { .. } => 0,
            AdaptiveOptimizer::Adagrad { ref cache, .. } => cache.len(),
            AdaptiveOptimizer::RmsProp { ref cache, .. } => cache.len(),
            AdaptiveOptimizer::Adam { ref moments, .. } => moments.len(),
        }
    }
}


#[cfg(test)]
mod tests {

    use super::AdaptiveOptimizer;
    use config::{SgdMode, TrainingConfig};

    fn optimizer(sgd_mode: SgdMode) -> AdaptiveOptimizer {
        let config = TrainingConfig {
            sgd_mode,
            learning_rate: 0.1,
            epsilon: 1e-8,
            gamma: 0.9,
            ..TrainingConfig::default()
        };
        AdaptiveOptimizer::from_config(&config)
    }

    fn close_enough_to(value: f64, expected: f64) -> bool {
        (value - expected).abs() < 1e-12
    }

    #[test]
    fn sgd_scales_by_learning_rate() {
        let mut sgd = optimizer(SgdMode::Sgd);

        assert!(close_enough_to(sgd.step(0, 1, 0.5), 0.05));
        assert!(close_enough_to(sgd.step(0, 1, -2.0), -0.2));
        assert_eq!(sgd.tracked_entries(), 0);
        assert_eq!(sgd.mode(), SgdMode::Sgd);
    }

    #[test]
    fn adagrad_accumulates_squared_gradients() {
        let mut adagrad = optimizer(SgdMode::Adagrad);

        assert!(close_enough_to(adagrad.step(0, 1, 1.0), 0.1 / (1.0 + 1e-8)));
        assert!(close_enough_to(adagrad.step(0, 1, 1.0), 0.1 / (2.0f64.sqrt() + 1e-8)));
        // Other coordinates start from scratch
        assert!(close_enough_to(adagrad.step(1, 0, 2.0), 0.1 * 2.0 / (2.0 + 1e-8)));
        assert_eq!(adagrad.tracked_entries(), 2);
    }

    #[test]
    fn rmsprop_decays_the_cache() {
        let mut rmsprop = optimizer(SgdMode::RmsProp);

        let first_cache: f64 = 0.1 * 4.0;
        assert!(close_enough_to(rmsprop.step(2, 3, 2.0), 0.1 * 2.0 / (first_cache.sqrt() + 1e-8)));

        let second_cache = 0.9 * first_cache + 0.1 * 1.0;
        assert!(close_enough_to(rmsprop.step(2, 3, 1.0), 0.1 / (second_cache.sqrt() + 1e-8)));
    }

    #[test]
    fn adam_bias_correction() {
        let mut adam = optimizer(SgdMode::Adam);

        // After bias correction, the first step is learning_rate * sign(gradient)
        assert!((adam.step(0, 2, 3.0) - 0.1).abs() < 1e-8);
        assert!((adam.step(1, 2, -0.5) + 0.1).abs() < 1e-6);

        // Second step on the same coordinate with a consistent gradient stays at the same size
        assert!((adam.step(0, 2, 3.0) - 0.1).abs() < 1e-8);
        assert_eq!(adam.tracked_entries(), 2);
    }

    #[test]
    fn zero_gradient_never_divides_by_zero() {
        for sgd_mode in &[SgdMode::Adagrad, SgdMode::RmsProp, SgdMode::Adam] {
            let mut optimizer = optimizer(*sgd_mode);
            let step = optimizer.step(0, 1, 0.0);
            assert_eq!(step, 0.0);
        }
    }
}

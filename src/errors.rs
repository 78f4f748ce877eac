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

use std::io;

use bincode;
use csv;
use serde_json;
use thiserror::Error;

/// Everything that can go wrong while configuring, training, validating or persisting a model.
#[derive(Debug, Error)]
pub enum TrainingError {
    #[error("TopK not valid. Acceptable values are either 'disabled' or a positive integer value. \
        Provided value was '{0}'")]
    InvalidTopK(String),

    #[error("invalid configuration: {0}")]
    Configuration(String),

    #[error("dense similarity matrix would require {required_bytes} bytes, which exceeds the \
        configured limit of {threshold_bytes} bytes; enable sparse training or allow large dense \
        allocations")]
    DenseAllocationRejected { required_bytes: u64, threshold_bytes: u64 },

    #[error("interaction ({user}, {item}) lies outside of the interaction matrix")]
    InvalidInteraction { user: u32, item: u32 },

    #[error("malformed input: {0}")]
    MalformedInput(String),

    #[error("validator did not report metric '{0}'")]
    UnknownMetric(String),

    #[error("validation failed: {0}")]
    Validation(String),

    #[error(transparent)]
    Io(#[from] io::Error),

    #[error("unable to encode or decode model weights: {0}")]
    Encoding(bincode::Error),

    #[error("unable to encode or decode model metadata: {0}")]
    Json(#[from] serde_json::Error),

    #[error("unable to read interactions: {0}")]
    Csv(#[from] csv::Error),
}

impl From<bincode::Error> for TrainingError {

    /// I/O failures surface unchanged, so that callers can match on the underlying `io::Error`.
    fn from(error: bincode::Error) -> Self {
        match *error {
            bincode::ErrorKind::Io(io_error) => TrainingError::Io(io_error),
            other => TrainingError::Encoding(Box::new(other)),
        }
    }
}

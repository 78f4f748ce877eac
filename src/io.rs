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

use std;
use std::fs::File;
use std::io;
use std::io::prelude::*;
use std::io::{stdout, BufReader, BufWriter};
use std::path::{Path, PathBuf};

use bincode;
use csv;
use serde_json;

use errors::TrainingError;
use similarity::SparseWeights;
use stats::Renaming;

/// A user, an item and the strength of the feedback between them.
pub type Interaction = (String, String, f64);

/// Reads a CSV input file. We expect NO headers, and a user-item-value triple per line with tab
/// separation. The value column may be omitted, it defaults to 1.0.
pub fn csv_reader(file: &str) -> Result<csv::Reader<File>, csv::Error> {
    csv::ReaderBuilder::new()
        .has_headers(false)
        .delimiter(b'\t')
        .flexible(true)
        .from_path(file)
}

pub fn read_interactions<R>(reader: &mut csv::Reader<R>) -> Result<Vec<Interaction>, TrainingError>
    where R: std::io::Read {

    let mut interactions = Vec::new();

    for (line, result) in reader.records().enumerate() {
        let record = result?;

        let (user, item) = match (record.get(0), record.get(1)) {
            (Some(user), Some(item)) => (user.to_string(), item.to_string()),
            _ => return Err(malformed(line, "expected at least a user and an item")),
        };

        let value = match record.get(2) {
            Some(value) => value.trim().parse::<f64>()
                .map_err(|_| malformed(line, &format!("'{}' is not a number", value)))?,
            None => 1.0,
        };

        interactions.push((user, item, value));
    }

    Ok(interactions)
}

fn malformed(line: usize, problem: &str) -> TrainingError {
    TrainingError::MalformedInput(format!("line {}: {}", line + 1, problem))
}

/// Struct used for JSON serialization of learned neighbors. Field names will be used in JSON.
#[derive(Serialize)]
struct SimilarItems<'a> {
    for_item: &'a str,
    similar_items: Vec<SimilarItem<'a>>,
}

#[derive(Serialize)]
struct SimilarItem<'a> {
    item: &'a str,
    weight: f64,
}

/// Output the learned weights in JSON format, one line per item, using the original identifiers
/// from the inputfile. If an `output_path` is supplied, we write to a file at the specified path,
/// otherwise, we output to stdout.
pub fn write_similar_items(
    weights: &SparseWeights,
    renaming: &Renaming,
    output_path: Option<String>,
) -> io::Result<()> {

    let mut out: Box<dyn Write> = match output_path {
        Some(path) => Box::new(BufWriter::new(File::create(&Path::new(&path))?)),
        _ => Box::new(stdout())
    };

    for (item_index, entries) in weights.rows().iter().enumerate() {

        let for_item = renaming.item_name(item_index as u32);

        let similar_items: Vec<SimilarItem> = entries.iter()
            .map(|&(other_item, weight)| {
                SimilarItem { item: renaming.item_name(other_item), weight }
            })
            .collect();

        let as_json = serde_json::to_string(&SimilarItems { for_item, similar_items })?;

        writeln!(out, "{}", as_json)?;
    }

    out.flush()
}

fn path_for(folder: &Path, prefix: &str, suffix: &str) -> PathBuf {
    folder.join(format!("{}{}", prefix, suffix))
}

pub fn weights_path(folder: &Path, prefix: &str) -> PathBuf {
    path_for(folder, prefix, "weights.bin")
}

pub fn metadata_path(folder: &Path, prefix: &str) -> PathBuf {
    path_for(folder, prefix, "metadata.json")
}

/// Weights are stored in binary form, which keeps every bit of the floating point values.
pub fn write_weights(weights: &SparseWeights, path: &Path) -> Result<(), TrainingError> {
    let mut writer = BufWriter::new(File::create(path)?);
    bincode::serialize_into(&mut writer, weights)?;
    writer.flush()?;
    Ok(())
}

pub fn read_weights(path: &Path) -> Result<SparseWeights, TrainingError> {
    let reader = BufReader::new(File::open(path)?);
    let weights = bincode::deserialize_from(reader)?;
    Ok(weights)
}

pub fn write_json<T: ::serde::Serialize>(value: &T, path: &Path) -> Result<(), TrainingError> {
    let mut writer = BufWriter::new(File::create(path)?);
    serde_json::to_writer_pretty(&mut writer, value)?;
    writer.flush()?;
    Ok(())
}

pub fn read_json<T: ::serde::de::DeserializeOwned>(path: &Path) -> Result<T, TrainingError> {
    let reader = BufReader::new(File::open(path)?);
    let value = serde_json::from_reader(reader)?;
    Ok(value)
}

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

extern crate getopts;
extern crate num_cpus;
extern crate simlearn;
extern crate tracing;
extern crate tracing_subscriber;

use std::env;
use std::error::Error;
use std::process;

use getopts::{Matches, Options};
use tracing::{error, info, warn};

use simlearn::io;
use simlearn::stats::{DataDictionary, Renaming};
use simlearn::{InteractionMask, SlimBpr, TopK, TrainingConfig, DEFAULT_MODEL_PREFIX};

/// Number of recommendations per user scored during validation.
const DEFAULT_CUTOFF: usize = 10;

fn main() {

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_max_level(tracing::Level::INFO)
        .init();

    let args: Vec<String> = env::args().collect();
    let program = args[0].clone();

    let mut opts = Options::new();
    opts.optopt("i", "inputfile", "Input file name (required). The input consists of interactions \
        between user and items. The input file must contain a user, an item and optionally the \
        strength of the feedback per line, separated by tabs.", "PATH");
    opts.optopt("v", "validationfile", "Held-out interactions in the same format as the input \
        (optional). Enables validation and early stopping.", "PATH");
    opts.optopt("c", "config", "Training configuration in JSON format (optional).", "PATH");
    opts.optopt("o", "outputfolder", "Folder to store the trained model in (optional).", "PATH");
    opts.optopt("p", "prefix", "Name prefix of the stored model files (optional, defaults to \
        SLIM_BPR_).", "PREFIX");
    opts.optopt("w", "similarfile", "File to write the learned similar items to in JSON format \
        (optional, output will be written to stdout by default).", "PATH");
    opts.optopt("n", "topk", "Number of similar items to keep per item, or 'disabled' \
        (optional, overrides the configuration).", "NUMBER");
    opts.optopt("e", "epochs", "Maximum number of training epochs (optional, overrides the \
        configuration).", "NUMBER");
    opts.optopt("k", "cutoff", "Length of the recommendation lists scored during validation \
        (optional, defaults to 10).", "NUMBER");
    opts.optflag("s", "sparse", "Train with a sparse similarity matrix, for large catalogs.");
    opts.optflag("h", "help", "Print this help menu");

    let matches = match opts.parse(&args[1..]) {
        Ok(matches) => matches,
        Err(failure) => {
            let hint = failure.to_string();
            return print_usage_and_exit(&program, opts, Some(&hint))
        },
    };

    if matches.opt_present("h") {
        return print_usage_and_exit(&program, opts, None);
    }

    let interactions_path = match matches.opt_str("i") {
        Some(path) => path,
        None => return print_usage_and_exit(
            &program,
            opts,
            Some("Please specify an inputfile via --inputfile."),
        ),
    };

    let config = match configuration(&matches) {
        Ok(config) => config,
        Err(failure) => {
            let hint = format!("Invalid configuration: {}", failure);
            return print_usage_and_exit(&program, opts, Some(&hint))
        },
    };

    let cutoff: usize = match matches.opt_get_default("k", DEFAULT_CUTOFF) {
        Ok(cutoff) => cutoff,
        Err(failure) => {
            let hint = format!("Problem with option 'k': {}", failure);
            return print_usage_and_exit(&program, opts, Some(&hint))
        },
    };

    if let Err(failure) = learn_similarities(&interactions_path, &matches, config, cutoff) {
        error!("{}", failure);
        process::exit(1);
    }
}

fn print_usage_and_exit(
    program: &str,
    opts: Options,
    hint: Option<&str>
) -> ! {

    if let Some(hint) = hint {
        eprintln!("\n{}\n", hint);
    }

    let brief = format!("Usage: {} [options]", program);
    eprint!("{}", opts.usage(&brief));

    process::exit(if hint.is_some() { 1 } else { 0 })
}

/// Loads the JSON configuration if one was given and applies the command line overrides.
fn configuration(matches: &Matches) -> Result<TrainingConfig, Box<dyn Error>> {

    let mut config = match matches.opt_str("c") {
        Some(path) => TrainingConfig::from_json_file(&path)?,
        None => TrainingConfig::default(),
    };

    if let Some(top_k) = matches.opt_str("n") {
        config.top_k = top_k.parse::<TopK>()?;
    }

    if let Some(epochs) = matches.opt_str("e") {
        config.epochs = epochs.parse()?;
    }

    if matches.opt_present("s") {
        config.sparse_training = true;
    }

    Ok(config)
}

fn learn_similarities(
    interactions_path: &str,
    matches: &Matches,
    config: TrainingConfig,
    cutoff: usize,
) -> Result<(), Box<dyn Error>> {

    info!("Reading {} to compute data statistics", interactions_path);

    let mut reader = io::csv_reader(interactions_path)?;
    let interactions = io::read_interactions(&mut reader)?;
    let data_dict = DataDictionary::from_interactions(&interactions);

    info!(
        "Found {} interactions between {} users and {} items.",
        data_dict.num_interactions(),
        data_dict.num_users(),
        data_dict.num_items(),
    );

    let (indexed, _) = data_dict.index(&interactions);
    let mask = InteractionMask::from_triples(
        indexed,
        data_dict.num_users(),
        data_dict.num_items(),
        config.positive_threshold,
    )?;

    let held_out = match matches.opt_str("v") {
        Some(validation_path) => {
            info!("Reading held-out interactions from {}", validation_path);

            let mut reader = io::csv_reader(&validation_path)?;
            let validation_interactions = io::read_interactions(&mut reader)?;
            let (indexed, num_dropped) = data_dict.index(&validation_interactions);

            if num_dropped > 0 {
                warn!("Ignoring {} held-out interactions with unknown users or items", num_dropped);
            }

            Some(InteractionMask::from_triples(
                indexed,
                data_dict.num_users(),
                data_dict.num_items(),
                config.positive_threshold,
            )?)
        },
        None => None,
    };

    let slim_bpr = SlimBpr::new(&mask, config, num_cpus::get());

    let model = match held_out {
        Some(ref held_out) => slim_bpr.fit_with_holdout(held_out, cutoff)?,
        None => slim_bpr.fit(None)?,
    };

    if let Some(folder) = matches.opt_str("o") {
        let prefix = matches.opt_str("p").unwrap_or_else(|| DEFAULT_MODEL_PREFIX.to_string());
        model.save(&folder, &prefix)?;
    }

    // Build reverse index, make sure we consume the data dictionary
    let renaming: Renaming = data_dict.into();

    info!("Writing similar items...");
    io::write_similar_items(model.weights(), &renaming, matches.opt_str("w"))?;

    Ok(())
}

mod cell_classifier;
mod chrom_bounds;
mod cli;
mod clone;
mod copy_number_model;
mod copy_number_segmentation;
mod errors;
mod expression;
mod feature_matrix;
mod gene_binning;
mod gene_map;
mod globals;
mod logger;
mod mpack_utils;
mod npy_utils;
mod pipeline;
mod run_stats;
mod stats_utils;
mod tsv_utils;

use std::process;

use hhmmss::Hhmmss;
use log::{error, info};

use crate::cli::Commands;
use crate::errors::CnvResult;
use crate::globals::{PROGRAM_NAME, PROGRAM_VERSION};
use crate::logger::setup_output_dir_and_logger;
use crate::pipeline::{run_bin, run_segment};

fn run(settings: &cli::Settings) -> CnvResult<()> {
    info!("Starting {PROGRAM_NAME} {PROGRAM_VERSION}");
    info!(
        "cmdline: {}",
        std::env::args().collect::<Vec<_>>().join(" ")
    );
    info!("Running on {} threads", settings.shared.thread_count);

    let start = std::time::Instant::now();

    match &settings.command {
        Commands::Bin(x) => {
            run_bin(x)?;
        }
        Commands::Segment(x) => {
            run_segment(&settings.shared, x)?;
        }
    }

    info!(
        "{PROGRAM_NAME} completed. Total Runtime: {}",
        start.elapsed().hhmmssxxx()
    );
    Ok(())
}

fn main() {
    let settings = cli::validate_and_fix_settings(cli::parse_settings());

    // Setup logger, including creation of the output directory for the log file:
    setup_output_dir_and_logger(
        settings.get_output_dir(),
        settings.shared.clobber,
        settings.shared.debug,
    );

    if let Err(err) = run(&settings) {
        error!("{err}");
        process::exit(2);
    }
}

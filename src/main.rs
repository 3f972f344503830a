mod chain;
mod chain_clusters;
mod chain_finder;
mod chain_output;
mod cli;
mod cluster;
mod cluster_input;
mod filenames;
mod globals;
mod linked_pair;
mod log_utils;
mod logger;
mod os_utils;
mod run_stats;
mod sv_model;
#[cfg(test)]
mod test_utils;
mod ti_length;

use std::{error, process};

use hhmmss::Hhmmss;
use log::info;

use crate::chain_clusters::run_chain;
use crate::cli::Commands;
use crate::globals::{PROGRAM_NAME, PROGRAM_VERSION};
use crate::logger::setup_output_dir_and_logger;

fn run(settings: &cli::Settings) -> Result<(), Box<dyn error::Error>> {
    info!("Starting {PROGRAM_NAME} {PROGRAM_VERSION}");
    info!(
        "cmdline: {}",
        std::env::args().collect::<Vec<_>>().join(" ")
    );
    info!("Running on {} threads", settings.shared.thread_count);

    let start = std::time::Instant::now();

    match &settings.command {
        Commands::Chain(x) => {
            run_chain(&settings.shared, x)?;
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
        eprintln!("{err}");
        process::exit(2);
    }
}

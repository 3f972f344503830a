use camino::{Utf8Path, Utf8PathBuf};
use clap::Args;
use const_format::concatcp;
use log::info;
use serde::{Deserialize, Serialize};
use simple_error::{SimpleResult, bail, try_with};
use unwrap::unwrap;

use super::utils::check_required_filename;
use crate::chain_finder::{
    ChainFinderConfig, DEFAULT_MAX_STALLED_ITERATIONS, DEFAULT_PROXIMITY_DISTANCE,
    max_possible_links_cap,
};
use crate::filenames::SETTINGS_FILENAME;
use crate::ti_length::MIN_TEMPLATED_INSERTION_LENGTH;

#[derive(Args, Default, Deserialize, Serialize)]
pub struct ChainSettings {
    /// Directory for all chain command output (must not already exist)
    #[arg(long, value_name = "DIR", default_value = concatcp!(env!("CARGO_PKG_NAME"), "_output"))]
    pub output_dir: Utf8PathBuf,

    /// SV clusters to chain, in JSON format
    #[arg(long = "clusters", value_name = "FILE")]
    pub clusters_filename: Utf8PathBuf,

    /// Maximum number of ploidy-matched candidate links found eagerly per breakend
    ///
    /// Further candidates are only searched for once the earlier ones are used up. A value of
    /// 0 disables the limit, and any other value below 2 is raised to 2.
    ///
    #[arg(long, default_value_t = 0)]
    pub max_possible_links: usize,

    /// Use breakend allele ploidies to stop candidate links from crossing low ploidy segments
    #[arg(long)]
    pub use_allele_ploidies: bool,

    /// Check the chain search state after every added link
    #[arg(long)]
    pub run_validation: bool,

    /// Stop after adding assembly-confirmed links
    #[arg(hide = true, long)]
    pub assembled_links_only: bool,

    /// Number of consecutive iterations without a new link before the chain search of a cluster
    /// is abandoned
    #[arg(long, default_value_t = DEFAULT_MAX_STALLED_ITERATIONS)]
    pub max_stalled_iterations: usize,

    /// Shortest templated insertion which can be inferred between two breakends, raised per
    /// link to the breakend homology length
    #[arg(long, default_value_t = MIN_TEMPLATED_INSERTION_LENGTH)]
    pub min_ti_length: i64,

    /// Largest gap between neighboring breakends grouped into one allele ploidy run
    #[arg(long, default_value_t = DEFAULT_PROXIMITY_DISTANCE)]
    pub proximity_distance: i64,

    /// Trace all chain search steps of a single cluster to stderr
    #[arg(hide = true, long, value_name = "CLUSTER_ID")]
    pub verbose_cluster: Option<usize>,
}

impl ChainSettings {
    pub fn to_chain_finder_config(&self) -> ChainFinderConfig {
        ChainFinderConfig {
            max_possible_links: max_possible_links_cap(self.max_possible_links),
            use_allele_ploidies: self.use_allele_ploidies,
            run_validation: self.run_validation,
            assembled_links_only: self.assembled_links_only,
            max_stalled_iterations: self.max_stalled_iterations,
            proximity_distance: self.proximity_distance,
        }
    }
}

pub fn validate_and_fix_chain_settings(mut settings: ChainSettings) -> SimpleResult<ChainSettings> {
    check_required_filename(settings.clusters_filename.as_str(), "cluster")?;

    if settings.max_stalled_iterations == 0 {
        bail!("--max-stalled-iterations argument must be greater than 0");
    }
    if settings.min_ti_length < 0 {
        bail!("--min-ti-length argument must not be negative");
    }
    if settings.proximity_distance < 0 {
        bail!("--proximity-distance argument must not be negative");
    }

    settings.clusters_filename = try_with!(
        settings.clusters_filename.canonicalize_utf8(),
        "Unable to resolve cluster file path: '{}'",
        settings.clusters_filename
    );

    Ok(settings)
}

/// Write the chain command settings to the output directory
pub fn write_chain_settings(output_dir: &Utf8Path, settings: &ChainSettings) {
    let filename = output_dir.join(SETTINGS_FILENAME);

    info!("Writing chain settings to file: '{filename}'");

    let f = unwrap!(
        std::fs::File::create(&filename),
        "Unable to create chain settings json file: '{filename}'"
    );

    unwrap!(
        serde_json::to_writer_pretty(&f, &settings),
        "Unable to write chain settings json file: '{filename}'"
    );
}

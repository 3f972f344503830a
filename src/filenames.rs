//! Names of files written to the output directory
//!

pub const SETTINGS_FILENAME: &str = "chain.settings.json";

pub const CHAINS_FILENAME: &str = "chains.json";

pub const RUN_STATS_FILENAME: &str = "run_stats.json";

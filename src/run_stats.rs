//! Track stats for the whole chaining run
//!

use std::collections::BTreeMap;
use std::fs::File;

use camino::Utf8Path;
use log::info;
use serde::{Deserialize, Serialize};
use strum::IntoEnumIterator;
use unwrap::unwrap;

use crate::chain_finder::{ChainingOutcome, ChainingStatus};
use crate::cluster::Cluster;
use crate::filenames::RUN_STATS_FILENAME;
use crate::linked_pair::LinkReason;

#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
pub struct ChainStatusCounts {
    pub complete: usize,
    pub nothing_to_chain: usize,
    pub failed: usize,
}

impl ChainStatusCounts {
    pub fn add(&mut self, status: &ChainingStatus) {
        match status {
            ChainingStatus::Complete => self.complete += 1,
            ChainingStatus::NothingToChain => self.nothing_to_chain += 1,
            ChainingStatus::Failed(_) => self.failed += 1,
        }
    }

    pub fn merge(&mut self, other: &Self) {
        self.complete += other.complete;
        self.nothing_to_chain += other.nothing_to_chain;
        self.failed += other.failed;
    }
}

#[derive(Default, Deserialize, Serialize)]
pub struct ChainRunStats {
    pub cluster_count: usize,
    pub sv_count: usize,
    pub cluster_status: ChainStatusCounts,
    pub chain_count: usize,
    pub link_count: usize,

    /// Registered chain links by the code of the rule which selected them
    pub links_by_reason: BTreeMap<String, usize>,

    /// Candidate pairs left deferred at the end of each search
    pub skipped_pair_count: usize,

    pub total_chaining_time_secs: f64,
}

impl ChainRunStats {
    pub fn add_cluster(&mut self, cluster: &Cluster, outcome: &ChainingOutcome, elapsed_secs: f64) {
        self.cluster_count += 1;
        self.sv_count += cluster.svs().len();
        self.cluster_status.add(&outcome.status);
        self.chain_count += cluster.chains().len();
        self.skipped_pair_count += outcome.skipped_pairs.len();
        for reason in LinkReason::iter() {
            let count = outcome.link_reason_counts[reason as usize];
            if count > 0 {
                self.link_count += count;
                *self.links_by_reason.entry(reason.to_string()).or_default() += count;
            }
        }
        self.total_chaining_time_secs += elapsed_secs;
    }

    pub fn merge(&mut self, other: &Self) {
        self.cluster_count += other.cluster_count;
        self.sv_count += other.sv_count;
        self.cluster_status.merge(&other.cluster_status);
        self.chain_count += other.chain_count;
        self.link_count += other.link_count;
        for (reason, count) in other.links_by_reason.iter() {
            *self.links_by_reason.entry(reason.clone()).or_default() += count;
        }
        self.skipped_pair_count += other.skipped_pair_count;
        self.total_chaining_time_secs += other.total_chaining_time_secs;
    }
}

/// Write run_stats structure out in json format
pub fn write_run_stats(output_dir: &Utf8Path, run_stats: &ChainRunStats) {
    let filename = output_dir.join(RUN_STATS_FILENAME);

    info!("Writing run statistics to file: '{filename}'");

    let f = unwrap!(
        File::create(&filename),
        "Unable to create run statistics json file: '{filename}'"
    );

    unwrap!(
        serde_json::to_writer_pretty(&f, &run_stats),
        "Unable to write run statistics json file: '{filename}'"
    );
}

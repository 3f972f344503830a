//! Write chain finding results for all clusters in json format
//!

use std::fs::File;

use camino::Utf8Path;
use log::info;
use serde::Serialize;
use unwrap::unwrap;

use crate::chain::{Chain, ChainMetrics};
use crate::chain_finder::{ChainingOutcome, ChainingStatus};
use crate::cluster::{Cluster, ClusterLinkedPair};
use crate::filenames::CHAINS_FILENAME;
use crate::linked_pair::{ChainLink, LinkReason, LinkedPair};
use crate::sv_model::{BreakendId, BreakendInstance, SvInstance};

#[derive(Debug, PartialEq, Serialize)]
pub struct BreakendReport {
    pub sv_id: String,
    pub is_start: bool,
    pub chrom: String,
    pub position: i64,
}

impl BreakendReport {
    fn new(cluster: &Cluster, id: BreakendId) -> Self {
        let breakend = cluster.breakend(id);
        Self {
            sv_id: cluster.sv(id.sv_index).id.clone(),
            is_start: id.side.is_start(),
            chrom: breakend.chrom.clone(),
            position: breakend.position,
        }
    }
}

#[derive(Serialize)]
pub struct BreakendInstanceReport {
    #[serde(flatten)]
    pub breakend: BreakendReport,
    pub replica: usize,
}

impl BreakendInstanceReport {
    fn new(cluster: &Cluster, breakend: BreakendInstance) -> Self {
        Self {
            breakend: BreakendReport::new(cluster, breakend.id()),
            replica: breakend.sv.replica,
        }
    }
}

#[derive(Serialize)]
pub struct LinkReport {
    pub first: BreakendInstanceReport,
    pub second: BreakendInstanceReport,
    pub length: i64,
    pub assembled: bool,
    pub reason: LinkReason,
}

impl LinkReport {
    fn new(cluster: &Cluster, link: &ChainLink) -> Self {
        Self {
            first: BreakendInstanceReport::new(cluster, link.first),
            second: BreakendInstanceReport::new(cluster, link.second),
            length: link.length(),
            assembled: link.is_assembled(),
            reason: link.reason,
        }
    }
}

#[derive(Serialize)]
pub struct ChainReport {
    pub id: usize,
    pub replication_count: usize,
    pub metrics: ChainMetrics,
    pub links: Vec<LinkReport>,
}

impl ChainReport {
    fn new(cluster: &Cluster, chain: &Chain) -> Self {
        Self {
            id: chain.id,
            replication_count: chain.replication_count(),
            metrics: chain.metrics(),
            links: chain
                .links()
                .iter()
                .map(|x| LinkReport::new(cluster, x))
                .collect(),
        }
    }
}

#[derive(Serialize)]
pub struct PairReport {
    pub lower: BreakendReport,
    pub upper: BreakendReport,
    pub length: i64,
}

impl PairReport {
    fn new(cluster: &Cluster, pair: &LinkedPair) -> Self {
        Self {
            lower: BreakendReport::new(cluster, pair.lower),
            upper: BreakendReport::new(cluster, pair.upper),
            length: pair.length,
        }
    }
}

#[derive(Serialize)]
pub struct LinkedPairReport {
    #[serde(flatten)]
    pub pair: PairReport,
    pub reason: LinkReason,
    pub use_count: usize,
}

impl LinkedPairReport {
    fn new(cluster: &Cluster, linked_pair: &ClusterLinkedPair) -> Self {
        Self {
            pair: PairReport::new(cluster, &linked_pair.pair),
            reason: linked_pair.reason,
            use_count: linked_pair.use_count,
        }
    }
}

fn sv_instance_label(cluster: &Cluster, sv: SvInstance) -> String {
    let id = &cluster.sv(sv.sv_index).id;
    if sv.is_replicated() {
        format!("{id}:{}", sv.replica)
    } else {
        id.clone()
    }
}

#[derive(Serialize)]
pub struct SvChainReport {
    pub sv_id: String,

    /// First chain containing any instance of the SV
    pub chain_id: Option<usize>,
}

/// Chain finding results for one cluster
#[derive(Serialize)]
pub struct ClusterChainReport {
    pub cluster_id: usize,
    pub status: &'static str,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,

    pub valid_allele_ploidy_segment_perc: f64,
    pub metrics: ChainMetrics,
    pub chains: Vec<ChainReport>,
    pub linked_pairs: Vec<LinkedPairReport>,

    /// Candidate pairs deferred because they would have closed a chain
    pub skipped_pairs: Vec<PairReport>,

    /// SV instances not used by any chain, with the replica index appended to replicated SVs
    pub unchained_svs: Vec<String>,

    pub fully_chained: bool,
    pub sv_chains: Vec<SvChainReport>,
}

impl ClusterChainReport {
    pub fn new(cluster: &Cluster, outcome: &ChainingOutcome) -> Self {
        let failure_reason = match &outcome.status {
            ChainingStatus::Failed(err) => Some(err.to_string()),
            _ => None,
        };
        let linked_pairs = cluster
            .linked_pairs()
            .iter()
            .map(|x| LinkedPairReport::new(cluster, x))
            .collect();
        let skipped_pairs = outcome
            .skipped_pairs
            .iter()
            .map(|x| PairReport::new(cluster, x))
            .collect();
        let sv_chains = cluster
            .svs()
            .iter()
            .enumerate()
            .map(|(sv_index, sv)| SvChainReport {
                sv_id: sv.id.clone(),
                chain_id: cluster.find_chain(sv_index).map(|x| x.id),
            })
            .collect();
        let unchained_svs = if outcome.is_success() {
            cluster
                .unchained_svs()
                .into_iter()
                .map(|x| sv_instance_label(cluster, x))
                .collect()
        } else {
            Vec::new()
        };

        Self {
            cluster_id: cluster.id,
            status: outcome.status.label(),
            failure_reason,
            valid_allele_ploidy_segment_perc: cluster.valid_allele_ploidy_segment_perc(),
            metrics: cluster.chain_metrics(),
            chains: cluster
                .chains()
                .iter()
                .map(|x| ChainReport::new(cluster, x))
                .collect(),
            linked_pairs,
            skipped_pairs,
            unchained_svs,
            fully_chained: cluster.is_fully_chained(),
            sv_chains,
        }
    }
}

#[derive(Serialize)]
struct ChainsOutput<'a> {
    clusters: &'a [ClusterChainReport],
}

/// Write chain reports for all clusters to the output directory
pub fn write_chain_reports(output_dir: &Utf8Path, reports: &[ClusterChainReport]) {
    let filename = output_dir.join(CHAINS_FILENAME);

    info!("Writing chains for {} clusters to file: '{filename}'", reports.len());

    let f = unwrap!(
        File::create(&filename),
        "Unable to create chains json file: '{filename}'"
    );

    let output = ChainsOutput { clusters: reports };
    unwrap!(
        serde_json::to_writer_pretty(&f, &output),
        "Unable to write chains json file: '{filename}'"
    );
}

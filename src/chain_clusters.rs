//! Run the chain finder over all input clusters
//!

use std::sync::mpsc::{Sender, channel};
use std::time::Instant;

use log::info;
use simple_error::{SimpleResult, try_with};
use unwrap::unwrap;

use crate::chain_finder::{
    ChainDiagnostics, ChainFinderConfig, ChainingOutcome, find_cluster_chains,
};
use crate::chain_output::{ClusterChainReport, write_chain_reports};
use crate::cli::{ChainSettings, SharedSettings, write_chain_settings};
use crate::cluster::Cluster;
use crate::cluster_input::read_cluster_file;
use crate::run_stats::{ChainRunStats, write_run_stats};
use crate::ti_length::{HomologyTiLength, MinTiLength};

pub struct ClusterChainResult {
    pub cluster: Cluster,
    pub outcome: ChainingOutcome,
    pub elapsed_secs: f64,
}

fn chain_cluster_wrapper(
    tx: Sender<ClusterChainResult>,
    mut cluster: Cluster,
    config: &ChainFinderConfig,
    ti_length: &dyn MinTiLength,
    verbose: bool,
) {
    let start = Instant::now();
    let mut diagnostics = ChainDiagnostics {
        verbose,
        run_validation: config.run_validation,
    };
    let outcome = find_cluster_chains(&mut cluster, config, ti_length, &mut diagnostics);
    let result = ClusterChainResult {
        cluster,
        outcome,
        elapsed_secs: start.elapsed().as_secs_f64(),
    };
    unwrap!(tx.send(result), "Unable to send cluster chaining result");
}

/// Find chains for every cluster on a thread pool
///
/// Each cluster is searched independently. Results are returned in cluster id order.
///
/// * `verbose_cluster` - id of a single cluster whose search is traced to stderr
///
pub fn chain_all_clusters(
    thread_count: usize,
    clusters: Vec<Cluster>,
    config: &ChainFinderConfig,
    ti_length: &dyn MinTiLength,
    verbose_cluster: Option<usize>,
) -> SimpleResult<Vec<ClusterChainResult>> {
    let worker_pool = try_with!(
        rayon::ThreadPoolBuilder::new()
            .num_threads(thread_count)
            .build(),
        "Unable to create chaining thread pool"
    );

    let (tx, rx) = channel();
    worker_pool.scope(move |scope| {
        for cluster in clusters {
            let verbose = verbose_cluster == Some(cluster.id);
            let tx = tx.clone();
            scope.spawn(move |_| {
                chain_cluster_wrapper(tx, cluster, config, ti_length, verbose);
            });
        }
    });

    let mut results = rx.into_iter().collect::<Vec<_>>();
    results.sort_by_key(|x| x.cluster.id);
    Ok(results)
}

/// Run the chain command
pub fn run_chain(shared_settings: &SharedSettings, settings: &ChainSettings) -> SimpleResult<()> {
    write_chain_settings(&settings.output_dir, settings);

    let clusters = read_cluster_file(&settings.clusters_filename)?;
    let config = settings.to_chain_finder_config();
    let ti_length = HomologyTiLength {
        base_length: settings.min_ti_length,
    };

    info!("Finding chains in {} clusters", clusters.len());
    let results = chain_all_clusters(
        shared_settings.thread_count,
        clusters,
        &config,
        &ti_length,
        settings.verbose_cluster,
    )?;

    let mut run_stats = ChainRunStats::default();
    let mut reports = Vec::new();
    for result in results.iter() {
        run_stats.add_cluster(&result.cluster, &result.outcome, result.elapsed_secs);
        reports.push(ClusterChainReport::new(&result.cluster, &result.outcome));
    }
    info!(
        "Finished chaining: {} chains from {} clusters, {} clusters failed",
        run_stats.chain_count, run_stats.cluster_count, run_stats.cluster_status.failed
    );

    write_chain_reports(&settings.output_dir, &reports);
    write_run_stats(&settings.output_dir, &run_stats);
    Ok(())
}

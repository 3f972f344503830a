//! Reconstruct chains of templated insertions from the SVs of one cluster
//!
//! The finder first adds assembly-confirmed links, then enumerates every plausible templated
//! insertion between facing breakends and repeatedly commits the links chosen by a fixed rule
//! cascade until no candidates remain. Each run owns all of its working state, so clusters can
//! be chained concurrently.
//!

mod allele_ploidy;
mod link_commit;
mod link_rules;
mod observer;
mod possible_links;
mod reconcile;
mod search_state;

use log::{info, warn};
use serde::{Deserialize, Serialize};
use strum::EnumCount;

use self::allele_ploidy::compute_allele_ploidy_segments;
pub use self::observer::{ChainDiagnostics, ChainObserver};
use self::search_state::{SearchContext, SearchState};
use crate::cluster::Cluster;
use crate::linked_pair::{LinkReason, LinkedPair};
use crate::sv_model::SvInstance;
use crate::ti_length::MinTiLength;

/// Default count of consecutive iterations without a new link before a search is abandoned
pub const DEFAULT_MAX_STALLED_ITERATIONS: usize = 5;

/// Default largest gap between breakends of one allele ploidy run
pub const DEFAULT_PROXIMITY_DISTANCE: i64 = 5000;

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct ChainFinderConfig {
    /// Cap on ploidy-matched candidate links found eagerly per breakend, 0 for no cap
    pub max_possible_links: usize,

    /// Derive allele ploidy segments and stop candidate links at low cluster ploidy
    pub use_allele_ploidies: bool,

    /// Check the search state after every committed link
    pub run_validation: bool,

    /// Stop after adding assembly-confirmed links
    pub assembled_links_only: bool,

    pub max_stalled_iterations: usize,

    pub proximity_distance: i64,
}

impl Default for ChainFinderConfig {
    fn default() -> Self {
        Self {
            max_possible_links: 0,
            use_allele_ploidies: false,
            run_validation: false,
            assembled_links_only: false,
            max_stalled_iterations: DEFAULT_MAX_STALLED_ITERATIONS,
            proximity_distance: DEFAULT_PROXIMITY_DISTANCE,
        }
    }
}

/// Convert a requested maximum candidate link count to the cap used by the search
///
/// Any cap below 2 would prevent a breakend from ever showing a choice, so it is raised to 2.
///
pub fn max_possible_links_cap(requested: usize) -> usize {
    if requested == 0 { 0 } else { requested.max(2) }
}

#[derive(Clone, Debug, Eq, PartialEq, thiserror::Error)]
pub enum ChainFindingError {
    #[error("no link added in {iterations} consecutive iterations")]
    StalledSearch { iterations: usize },

    #[error("inconsistent search state: {0}")]
    InconsistentState(String),
}

#[derive(Clone, Debug, PartialEq)]
pub enum ChainingStatus {
    Complete,

    /// Fewer than two SV instances, nothing was attempted
    NothingToChain,

    Failed(ChainFindingError),
}

impl ChainingStatus {
    pub fn label(&self) -> &'static str {
        match self {
            ChainingStatus::Complete => "Complete",
            ChainingStatus::NothingToChain => "NothingToChain",
            ChainingStatus::Failed(_) => "Failed",
        }
    }
}

/// Result of running the chain finder on one cluster
///
/// Finished chains are registered on the cluster itself.
///
#[derive(Debug)]
pub struct ChainingOutcome {
    pub status: ChainingStatus,

    /// Candidate pairs deferred because they would have closed a chain
    pub skipped_pairs: Vec<LinkedPair>,

    /// SV instances which never took part in a link
    pub unlinked_svs: Vec<SvInstance>,

    /// Count of registered chain links by the rule which selected them
    pub link_reason_counts: [usize; LinkReason::COUNT],
}

impl ChainingOutcome {
    fn new(status: ChainingStatus) -> Self {
        Self {
            status,
            skipped_pairs: Vec::new(),
            unlinked_svs: Vec::new(),
            link_reason_counts: [0; LinkReason::COUNT],
        }
    }

    pub fn is_success(&self) -> bool {
        !matches!(self.status, ChainingStatus::Failed(_))
    }
}

/// Find chains for all SVs of the cluster and register them on it
///
/// Any chains from an earlier run are cleared first. A failed search registers no chains.
///
pub fn find_cluster_chains(
    cluster: &mut Cluster,
    config: &ChainFinderConfig,
    ti_length: &dyn MinTiLength,
    observer: &mut dyn ChainObserver,
) -> ChainingOutcome {
    cluster.clear_chains();
    cluster.set_valid_allele_ploidy_segment_perc(0.0);

    if cluster.sv_instance_count() < 2 {
        return ChainingOutcome::new(ChainingStatus::NothingToChain);
    }

    let has_replication = cluster.has_replication();
    let search_result = {
        let ctx = SearchContext::new(cluster, config, ti_length);
        build_chains(&ctx, observer)
    };

    let state = match search_result {
        Ok(x) => x,
        Err(err) => {
            warn!("cluster({}) chain finding failed: {}", cluster.id, err);
            return ChainingOutcome::new(ChainingStatus::Failed(err));
        }
    };

    let mut outcome = ChainingOutcome::new(ChainingStatus::Complete);
    outcome.skipped_pairs = state.skipped_pairs.clone();
    outcome.unlinked_svs = state.unlinked_svs.iter().copied().collect();
    if let Some(allele_ploidies) = &state.allele_ploidies {
        cluster.set_valid_allele_ploidy_segment_perc(allele_ploidies.valid_segment_perc());
    }

    for chain in state.chains {
        cluster.register_chain(chain, has_replication);
    }
    cluster.cache_linked_pairs();

    for link in cluster.chains().iter().flat_map(|x| x.links().iter()) {
        outcome.link_reason_counts[link.reason as usize] += 1;
    }
    outcome
}

/// Run the full link search and return the final search state
fn build_chains(
    ctx: &SearchContext,
    observer: &mut dyn ChainObserver,
) -> Result<SearchState, ChainFindingError> {
    let mut state = SearchState::new(ctx);

    link_commit::add_assembly_links(ctx, &mut state, observer)?;
    if ctx.config.assembled_links_only {
        return Ok(state);
    }

    state.set_sv_replication_counts(ctx);

    if ctx.config.use_allele_ploidies {
        state.allele_ploidies = Some(compute_allele_ploidy_segments(
            ctx.cluster,
            ctx.config.proximity_distance,
        ));
    }

    possible_links::determine_possible_links(ctx, &mut state);
    observer.on_links_enumerated(ctx, &state);

    let mut stalled_iterations = 0;
    loop {
        state.pair_skipped = false;
        let last_link_index = state.link_index;

        match link_rules::find_possible_pairs(ctx, &mut state) {
            Some(candidates) => {
                link_commit::process_possible_pairs(ctx, &mut state, observer, candidates)?;
            }
            None => {
                if !state.pair_skipped {
                    break;
                }
            }
        }

        if state.link_index == last_link_index {
            stalled_iterations += 1;
            if stalled_iterations >= ctx.config.max_stalled_iterations {
                return Err(ChainFindingError::StalledSearch {
                    iterations: stalled_iterations,
                });
            }
        } else {
            stalled_iterations = 0;
        }
    }

    observer.on_search_complete(ctx, &state);

    if state.link_index > 0 && ctx.cluster.sv_instance_count() >= link_commit::PROGRESS_SV_COUNT {
        info!(
            "cluster({}) chaining complete: {} links in {} chains",
            ctx.cluster.id,
            state.link_index,
            state.chains.len()
        );
    }

    Ok(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::ChainEnd;
    use crate::sv_model::BreakendSide::{End, Start};
    use crate::sv_model::{BreakendId, BreakendInstance};
    use crate::test_utils::*;
    use crate::ti_length::HomologyTiLength;
    use observer::NoopObserver;

    fn run_finder(cluster: &mut Cluster, config: &ChainFinderConfig) -> ChainingOutcome {
        let ti_length = HomologyTiLength::default();
        let mut diagnostics = ChainDiagnostics {
            verbose: false,
            run_validation: true,
        };
        find_cluster_chains(cluster, config, &ti_length, &mut diagnostics)
    }

    fn reasons(cluster: &Cluster, chain_index: usize) -> Vec<LinkReason> {
        cluster.chains()[chain_index]
            .links()
            .iter()
            .map(|x| x.reason)
            .collect()
    }

    /// Three SVs which could be joined into a loop: A(-)..B(+) B(-)..C(+) C(-)..A(+)
    fn make_loop_svs(chrom: &str) -> Vec<crate::sv_model::SvVariant> {
        vec![
            make_sv(&format!("A{chrom}"), chrom, 100, -1, chrom, 600, 1),
            make_sv(&format!("B{chrom}"), chrom, 200, 1, chrom, 300, -1),
            make_sv(&format!("C{chrom}"), chrom, 400, 1, chrom, 500, -1),
        ]
    }

    /// Foldback E doubling back into the replicated SV F, followed by G
    fn make_foldback_cluster() -> Cluster {
        let mut sv_e = make_sv("E", "1", 1000, -1, "1", 1100, -1);
        sv_e.ploidy = 1.0;
        let mut sv_f = make_sv("F", "2", 500, 1, "1", 2000, 1);
        set_replication(&mut sv_f, 2);
        let sv_g = make_sv("G", "1", 3000, 1, "3", 100, -1);
        let mut svs = vec![sv_e, sv_f, sv_g];
        set_foldback_partners(&mut svs, BreakendId::new(0, Start), BreakendId::new(0, End));
        make_cluster(svs)
    }

    #[test]
    fn test_too_few_svs() {
        let config = ChainFinderConfig::default();

        let mut cluster = make_cluster(Vec::new());
        let outcome = run_finder(&mut cluster, &config);
        assert_eq!(outcome.status, ChainingStatus::NothingToChain);
        assert!(outcome.is_success());

        let mut cluster = make_cluster(vec![make_sv("A", "1", 100, 1, "1", 200, -1)]);
        let outcome = run_finder(&mut cluster, &config);
        assert_eq!(outcome.status, ChainingStatus::NothingToChain);
        assert!(cluster.chains().is_empty());
    }

    #[test]
    fn test_single_option_link() {
        let mut cluster = make_cluster(vec![
            make_sv("A", "1", 100, 1, "1", 200, -1),
            make_sv("B", "1", 300, 1, "1", 400, -1),
        ]);
        let outcome = run_finder(&mut cluster, &ChainFinderConfig::default());
        assert_eq!(outcome.status, ChainingStatus::Complete);

        assert_eq!(cluster.chains().len(), 1);
        let link = cluster.chains()[0].links()[0];
        assert_eq!(link.length(), 100);
        assert_eq!(link.reason, LinkReason::SingleOption);
        assert_eq!(link.pair.lower, BreakendId::new(0, End));
        assert_eq!(link.pair.upper, BreakendId::new(1, Start));
        assert_eq!(outcome.link_reason_counts[LinkReason::SingleOption as usize], 1);
        assert!(cluster.is_fully_chained());
        assert_eq!(cluster.linked_pairs().len(), 1);
    }

    #[test]
    fn test_assembly_link_seeds_chain() {
        let mut sv_c = make_sv("C", "1", 100, 1, "1", 200, -1);
        let mut sv_d = make_sv("D", "1", 260, 1, "1", 400, -1);
        add_assembly_tag(&mut sv_c, End, "asm1");
        add_assembly_tag(&mut sv_d, Start, "asm1");
        let svs = vec![sv_c, sv_d, make_sv("E", "1", 500, 1, "1", 600, -1)];

        let mut cluster = make_cluster(svs.clone());
        let outcome = run_finder(&mut cluster, &ChainFinderConfig::default());
        assert_eq!(outcome.status, ChainingStatus::Complete);
        assert_eq!(cluster.chains().len(), 1);
        assert_eq!(
            reasons(&cluster, 0),
            vec![LinkReason::Assembly, LinkReason::SingleOption]
        );
        assert!(cluster.chains()[0].links()[0].is_assembled());

        let config = ChainFinderConfig {
            assembled_links_only: true,
            ..Default::default()
        };
        let mut cluster = make_cluster(svs);
        run_finder(&mut cluster, &config);
        assert_eq!(cluster.chains().len(), 1);
        assert_eq!(reasons(&cluster, 0), vec![LinkReason::Assembly]);
        assert_eq!(cluster.unchained_svs().len(), 1);
    }

    #[test]
    fn test_foldback_duplication_links() {
        let mut cluster = make_foldback_cluster();
        let outcome = run_finder(&mut cluster, &ChainFinderConfig::default());
        assert_eq!(outcome.status, ChainingStatus::Complete);

        assert_eq!(cluster.chains().len(), 1);
        let chain = &cluster.chains()[0];
        assert_eq!(chain.link_count(), 2);
        assert!(chain.is_consistent());
        assert_eq!(
            reasons(&cluster, 0),
            vec![LinkReason::Duplication, LinkReason::Duplication]
        );

        // Both replicas of F are used, entered through the same breakend
        let f_instances = chain
            .sv_instances()
            .into_iter()
            .filter(|x| x.sv_index == 1)
            .count();
        assert_eq!(f_instances, 2);
        assert_eq!(outcome.unlinked_svs, vec![SvInstance::new(2, 0)]);
    }

    #[test]
    fn test_sv_instance_accounting() {
        let mut cluster = make_foldback_cluster();
        let replication_counts = cluster
            .svs()
            .iter()
            .map(|x| x.replication_count)
            .collect::<Vec<_>>();
        let outcome = run_finder(&mut cluster, &ChainFinderConfig::default());

        let chained = cluster
            .chains()
            .iter()
            .flat_map(|x| x.sv_instances())
            .collect::<Vec<_>>();
        for (sv_index, &replication_count) in replication_counts.iter().enumerate() {
            let chained_count = chained.iter().filter(|x| x.sv_index == sv_index).count();
            let unlinked_count = outcome
                .unlinked_svs
                .iter()
                .filter(|x| x.sv_index == sv_index)
                .count();
            assert_eq!(chained_count + unlinked_count, replication_count);
        }
    }

    #[test]
    fn test_loop_closing_pair_is_skipped() {
        let mut cluster = make_cluster(make_loop_svs("1"));
        let outcome = run_finder(&mut cluster, &ChainFinderConfig::default());
        assert_eq!(outcome.status, ChainingStatus::Complete);

        assert_eq!(cluster.chains().len(), 1);
        assert_eq!(cluster.chains()[0].link_count(), 2);
        assert_eq!(outcome.skipped_pairs.len(), 1);

        let skipped = outcome.skipped_pairs[0];
        assert_eq!(skipped.lower, BreakendId::new(1, End));
        assert_eq!(skipped.upper, BreakendId::new(2, Start));
    }

    #[test]
    fn test_loop_closing_pair_uses_other_replica() {
        let mut svs = make_loop_svs("1");
        set_replication(&mut svs[1], 2);
        let mut cluster = make_cluster(svs);
        let outcome = run_finder(&mut cluster, &ChainFinderConfig::default());
        assert_eq!(outcome.status, ChainingStatus::Complete);
        assert!(outcome.skipped_pairs.is_empty());

        assert_eq!(cluster.chains().len(), 1);
        let chain = &cluster.chains()[0];
        assert_eq!(chain.link_count(), 3);
        assert!(chain.is_consistent());

        // B.end -> C.start is taken by the second copy of B rather than closing the loop
        let closing = chain.links()[0];
        assert_eq!(closing.first, BreakendInstance::new(BreakendId::new(1, End), 1));
        assert_eq!(closing.second, BreakendInstance::new(BreakendId::new(2, Start), 0));
        assert_eq!(closing.reason, LinkReason::SingleOption);

        assert_eq!(chain.terminal_breakend(ChainEnd::Start).sv, SvInstance::new(1, 1));
        assert_eq!(chain.terminal_breakend(ChainEnd::End).sv, SvInstance::new(1, 0));
        assert!(outcome.unlinked_svs.is_empty());
        assert!(cluster.is_fully_chained());
    }

    #[test]
    fn test_max_replication_links() {
        // Replicated R faces three left-anchored single breakends, as do single breakends a and b
        let mut sv_r = make_sv("R", "1", 100, -1, "2", 100, -1);
        set_replication(&mut sv_r, 2);
        let mut cluster = make_cluster(vec![
            sv_r,
            make_sgl("a", "1", 200, -1),
            make_sgl("b", "1", 290, -1),
            make_sgl("c", "1", 300, 1),
            make_sgl("d", "1", 400, 1),
            make_sgl("e", "1", 500, 1),
        ]);
        let outcome = run_finder(&mut cluster, &ChainFinderConfig::default());
        assert_eq!(outcome.status, ChainingStatus::Complete);

        assert_eq!(cluster.chains().len(), 3);
        assert_eq!(outcome.link_reason_counts[LinkReason::MaxReplication as usize], 3);
        assert_eq!(
            outcome.link_reason_counts.iter().sum::<usize>(),
            outcome.link_reason_counts[LinkReason::MaxReplication as usize]
        );

        let sgl = |sv_index| BreakendId::new(sv_index, Start);
        let linked = cluster
            .linked_pairs()
            .iter()
            .map(|x| (x.pair.lower, x.pair.upper, x.pair.length, x.reason))
            .collect::<Vec<_>>();
        assert_eq!(
            linked,
            vec![
                (sgl(1), sgl(3), 100, LinkReason::MaxReplication),
                (sgl(2), sgl(4), 110, LinkReason::MaxReplication),
                (sgl(0), sgl(5), 400, LinkReason::MaxReplication),
            ]
        );
        assert_eq!(outcome.unlinked_svs, vec![SvInstance::new(0, 1)]);
        assert_eq!(cluster.unchained_svs(), vec![SvInstance::new(0, 1)]);
    }

    #[test]
    fn test_shortest_links() {
        // Every breakend has at least two candidates and no neighbors can be linked
        let mut cluster = make_cluster(vec![
            make_sgl("a", "1", 100, -1),
            make_sgl("b", "1", 200, -1),
            make_sgl("c", "1", 290, -1),
            make_sgl("d", "1", 300, 1),
            make_sgl("e", "1", 400, 1),
            make_sgl("f", "1", 500, 1),
        ]);
        let outcome = run_finder(&mut cluster, &ChainFinderConfig::default());
        assert_eq!(outcome.status, ChainingStatus::Complete);

        assert_eq!(cluster.chains().len(), 3);
        assert_eq!(outcome.link_reason_counts[LinkReason::Shortest as usize], 3);
        assert_eq!(outcome.link_reason_counts[LinkReason::SingleOption as usize], 0);
        assert_eq!(outcome.link_reason_counts[LinkReason::AdjacentMatch as usize], 0);

        let sgl = |sv_index| BreakendId::new(sv_index, Start);
        let linked = cluster
            .linked_pairs()
            .iter()
            .map(|x| (x.pair.lower, x.pair.upper, x.pair.length, x.reason))
            .collect::<Vec<_>>();
        assert_eq!(
            linked,
            vec![
                (sgl(1), sgl(3), 100, LinkReason::Shortest),
                (sgl(2), sgl(4), 110, LinkReason::Shortest),
                (sgl(0), sgl(5), 400, LinkReason::Shortest),
            ]
        );
        assert!(cluster.is_fully_chained());
    }

    #[test]
    fn test_stalled_search_fails() {
        let loop_cluster = |loop_count: usize| {
            let svs = (1..=loop_count)
                .flat_map(|x| make_loop_svs(&x.to_string()))
                .collect::<Vec<_>>();
            make_cluster(svs)
        };

        let mut cluster = loop_cluster(3);
        let outcome = run_finder(&mut cluster, &ChainFinderConfig::default());
        assert_eq!(outcome.status, ChainingStatus::Complete);
        assert_eq!(cluster.chains().len(), 3);
        assert_eq!(outcome.skipped_pairs.len(), 3);

        let mut cluster = loop_cluster(4);
        let outcome = run_finder(&mut cluster, &ChainFinderConfig::default());
        assert_eq!(
            outcome.status,
            ChainingStatus::Failed(ChainFindingError::StalledSearch { iterations: 5 })
        );
        assert!(!outcome.is_success());
        assert!(cluster.chains().is_empty());

        let config = ChainFinderConfig {
            max_stalled_iterations: 3,
            ..Default::default()
        };
        let mut cluster = loop_cluster(3);
        let outcome = run_finder(&mut cluster, &config);
        assert_eq!(
            outcome.status,
            ChainingStatus::Failed(ChainFindingError::StalledSearch { iterations: 3 })
        );
    }

    #[test]
    fn test_low_cluster_allele_ploidy_blocks_links() {
        let config = ChainFinderConfig {
            use_allele_ploidies: true,
            ..Default::default()
        };
        let mut cluster = make_allele_ploidy_barrier_cluster();
        run_finder(&mut cluster, &config);
        assert_eq!(cluster.chains().len(), 1);
        assert!(cluster.find_chain(1).is_some());
        assert!(cluster.find_chain(3).is_none());
        approx::assert_ulps_eq!(cluster.valid_allele_ploidy_segment_perc(), 1.0);

        let mut cluster = make_allele_ploidy_barrier_cluster();
        run_finder(&mut cluster, &ChainFinderConfig::default());
        assert_eq!(cluster.chains().len(), 2);
        assert!(cluster.find_chain(3).is_some());
        approx::assert_ulps_eq!(cluster.valid_allele_ploidy_segment_perc(), 0.0);
    }

    #[test]
    fn test_repeat_runs_match() {
        let run = || {
            let mut svs = make_loop_svs("1");
            svs.push(make_sv("D", "1", 700, 1, "2", 100, -1));
            svs.push(make_sv("E", "2", 300, 1, "2", 400, -1));
            let mut cluster = make_cluster(svs);
            let ti_length = HomologyTiLength::default();
            find_cluster_chains(
                &mut cluster,
                &ChainFinderConfig::default(),
                &ti_length,
                &mut NoopObserver,
            );
            cluster
        };
        let cluster1 = run();
        let cluster2 = run();
        assert!(!cluster1.chains().is_empty());
        assert_eq!(cluster1.chains().len(), cluster2.chains().len());
        for (chain1, chain2) in cluster1.chains().iter().zip(cluster2.chains().iter()) {
            assert_eq!(chain1.id, chain2.id);
            assert_eq!(chain1.links(), chain2.links());
        }
    }

    #[test]
    fn test_max_possible_links_cap() {
        assert_eq!(max_possible_links_cap(0), 0);
        assert_eq!(max_possible_links_cap(1), 2);
        assert_eq!(max_possible_links_cap(5), 5);
    }
}

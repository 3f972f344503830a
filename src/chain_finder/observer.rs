//! Extension points for diagnostics during a chain search
//!

use itertools::Itertools;
use log::{error, info};

use super::link_commit::PROGRESS_SV_COUNT;
use super::search_state::{SearchContext, SearchState};
use super::ChainFindingError;
use crate::chain::Chain;
use crate::linked_pair::ChainLink;
use crate::log_utils::cluster_msg;

/// Number of committed links between progress reports on large clusters
const PROGRESS_LINK_INTERVAL: usize = 100;

/// Hooks called by the chain finder at fixed points of the search
///
/// All hooks default to doing nothing.
///
pub trait ChainObserver {
    /// Called once the candidate link index has been built
    fn on_links_enumerated(&mut self, _ctx: &SearchContext, _state: &SearchState) {}

    /// Called after each committed link, an error aborts the search
    fn on_link_added(
        &mut self,
        _ctx: &SearchContext,
        _state: &SearchState,
        _link: &ChainLink,
        _chain_id: usize,
    ) -> Result<(), ChainFindingError> {
        Ok(())
    }

    /// Called after the chain with `merged_chain_id` has been absorbed into `target`
    fn on_chains_merged(&mut self, _ctx: &SearchContext, _target: &Chain, _merged_chain_id: usize) {}

    fn on_search_complete(&mut self, _ctx: &SearchContext, _state: &SearchState) {}
}

/// Observer which does nothing
#[cfg(test)]
pub struct NoopObserver;

#[cfg(test)]
impl ChainObserver for NoopObserver {}

/// Logging and optional state validation for a chain search
pub struct ChainDiagnostics {
    /// Trace every search step of this cluster to stderr
    pub verbose: bool,

    /// Check the search state after each committed link
    pub run_validation: bool,
}

impl ChainObserver for ChainDiagnostics {
    fn on_links_enumerated(&mut self, ctx: &SearchContext, state: &SearchState) {
        let possible_links = &state.possible_links;
        for id in possible_links.breakend_ids() {
            let links = possible_links.links(id).unwrap_or_default();
            cluster_msg!(
                self.verbose,
                ctx.cluster.id,
                "breakend {:?} candidates: {}",
                id,
                links.iter().map(|x| format!("{x:?}")).join(", ")
            );
        }
        if !state.complex_dups.is_empty() {
            cluster_msg!(
                self.verbose,
                ctx.cluster.id,
                "complex dup candidates: {}",
                state
                    .complex_dups
                    .iter()
                    .map(|&x| ctx.cluster.sv(x).id.as_str())
                    .join(", ")
            );
        }
    }

    fn on_link_added(
        &mut self,
        ctx: &SearchContext,
        state: &SearchState,
        link: &ChainLink,
        chain_id: usize,
    ) -> Result<(), ChainFindingError> {
        cluster_msg!(
            self.verbose,
            ctx.cluster.id,
            "index({}) {:?} on chain({})",
            state.link_index,
            link,
            chain_id
        );

        if ctx.has_replication
            && ctx.cluster.sv_instance_count() >= PROGRESS_SV_COUNT
            && state.link_index % PROGRESS_LINK_INTERVAL == 0
        {
            info!(
                "cluster({}) chaining progress: SVs({}) links({}) partial chains({}) unlinked SVs({}) replicated SVs({}) candidate breakends({})",
                ctx.cluster.id,
                ctx.cluster.sv_instance_count(),
                state.link_index,
                state.chains.len(),
                state.unlinked_svs.len(),
                state.sv_replication.len(),
                state.possible_links.breakend_ids().len()
            );
        }

        if self.run_validation {
            let invalid_chain = state.chains.iter().find(|x| !x.is_consistent());
            if let Some(chain) = invalid_chain {
                let msg = format!("chain {chain:?} has inconsistent links");
                error!("cluster({}) {}", ctx.cluster.id, msg);
                return Err(ChainFindingError::InconsistentState(msg));
            }
            if let Err(msg) = state.check_has_valid_state() {
                error!("cluster({}) {}", ctx.cluster.id, msg);
                return Err(ChainFindingError::InconsistentState(msg));
            }
        }
        Ok(())
    }

    fn on_chains_merged(&mut self, ctx: &SearchContext, target: &Chain, merged_chain_id: usize) {
        cluster_msg!(
            self.verbose,
            ctx.cluster.id,
            "merged chain({}) into {:?}",
            merged_chain_id,
            target
        );
    }

    fn on_search_complete(&mut self, ctx: &SearchContext, state: &SearchState) {
        cluster_msg!(
            self.verbose,
            ctx.cluster.id,
            "search complete: links({}) chains({}) skipped pairs({}) unlinked SVs({})",
            state.link_index,
            state.chains.len(),
            state.skipped_pairs.len(),
            state.unlinked_svs.len()
        );
    }
}

//! Commit selected pairs as chain links and keep the search bookkeeping current
//!

use log::{debug, warn};

use super::link_rules::{self, CandidateSet};
use super::observer::ChainObserver;
use super::reconcile::reconcile_chains;
use super::search_state::{SearchContext, SearchState};
use super::ChainFindingError;
use crate::chain::{Chain, ChainEnd};
use crate::linked_pair::{ChainLink, LinkReason, LinkedPair};

/// Clusters with at least this many SV instances report search progress
pub const PROGRESS_SV_COUNT: usize = 100;

/// Seed chains from all assembly-confirmed links of the cluster
pub fn add_assembly_links(
    ctx: &SearchContext,
    state: &mut SearchState,
    observer: &mut dyn ChainObserver,
) -> Result<(), ChainFindingError> {
    let assembly_links = ctx.cluster.assembly_links();
    if assembly_links.is_empty() {
        return Ok(());
    }

    state.link_reason = LinkReason::Assembly;
    for pair in assembly_links.iter() {
        add_pair_to_chain(ctx, state, observer, pair)?;
    }

    debug!(
        "cluster({}) created {} chains from {} assembly links",
        ctx.cluster.id,
        state.chains.len(),
        assembly_links.len()
    );
    Ok(())
}

/// Remove and return the shortest pair, keeping the first seen on ties
fn take_shortest_pair(pairs: &mut Vec<LinkedPair>) -> Option<LinkedPair> {
    let mut shortest_index = None;
    for (index, pair) in pairs.iter().enumerate() {
        if shortest_index.is_none_or(|x: usize| pair.length < pairs[x].length) {
            shortest_index = Some(index);
        }
    }
    shortest_index.map(|x| pairs.remove(x))
}

/// Drop candidates which can no longer be committed alongside the pair just committed
fn prune_after_commit(
    ctx: &SearchContext,
    state: &SearchState,
    pairs: Vec<LinkedPair>,
    committed: &LinkedPair,
) -> Vec<LinkedPair> {
    pairs
        .into_iter()
        .filter(|pair| {
            if pair.opposite_match(committed) {
                return false;
            }
            if ctx.has_replication {
                state.has_unlinked_capacity(pair)
            } else {
                !pair.has_link_clash(committed)
            }
        })
        .collect()
}

/// Commit the pairs proposed by one rule, shortest first
///
/// Pairs are repeated up to the replication they share. After each commit the single option
/// rule is checked again, and any pairs it forces replace the rest of the proposal.
///
pub fn process_possible_pairs(
    ctx: &SearchContext,
    state: &mut SearchState,
    observer: &mut dyn ChainObserver,
    candidates: CandidateSet,
) -> Result<(), ChainFindingError> {
    let CandidateSet { reason, mut pairs } = candidates;
    state.link_reason = reason;
    let mut is_restricted = reason == LinkReason::SingleOption;
    let mut link_added = false;

    while let Some(shortest) = take_shortest_pair(&mut pairs) {
        if !state.has_unlinked_capacity(&shortest) {
            debug!(
                "cluster({}) dropping exhausted {:?}",
                ctx.cluster.id, shortest
            );
            continue;
        }

        let mut repeat_count = 1;
        if ctx.has_replication {
            let lower_count = state.unlinked.count(shortest.lower);
            let upper_count = state.unlinked.count(shortest.upper);
            if lower_count > 1 && upper_count > 1 {
                repeat_count = lower_count.min(upper_count);
                debug!("repeating {:?} {} times", shortest, repeat_count);
            }
        }

        for _ in 0..repeat_count {
            link_added |= add_pair_to_chain(ctx, state, observer, &shortest)?;
        }

        if !is_restricted {
            let forced_pairs = link_rules::find_single_option_pairs(ctx, state);
            if !forced_pairs.is_empty() {
                pairs = forced_pairs;
                is_restricted = true;
            }
        }

        if !is_restricted {
            pairs = prune_after_commit(ctx, state, pairs, &shortest);
        }
    }

    if link_added {
        // Deferred pairs may fit now that the chains have changed
        state.skipped_pairs.clear();
    }
    Ok(())
}

/// Add one instance of `pair` to the chains
///
/// The pair extends an existing chain where one of its breakends is that chain's open breakend,
/// and otherwise starts a new chain. Pairs which would close a chain into a loop are deferred,
/// unless another replica of the chain's end SV can take the link instead.
///
/// Returns true if a link was added.
///
pub fn add_pair_to_chain(
    ctx: &SearchContext,
    state: &mut SearchState,
    observer: &mut dyn ChainObserver,
    pair: &LinkedPair,
) -> Result<bool, ChainFindingError> {
    let (Some(first), Some(second)) = (
        state.unlinked.first(pair.lower),
        state.unlinked.first(pair.upper),
    ) else {
        if pair.is_assembled {
            warn!("cluster({}) missed assembly link", ctx.cluster.id);
            return Ok(false);
        }
        return Err(ChainFindingError::InconsistentState(format!(
            "no unlinked breakend instance for {pair:?}"
        )));
    };

    let mut link = ChainLink::new(first, second, pair, state.link_reason);
    let mut extended_chain_id = None;
    let mut closes_chain = false;

    for chain in state.chains.iter_mut() {
        let start_side = chain.matching_link_side(&link, ChainEnd::Start);
        let end_side = chain.matching_link_side(&link, ChainEnd::End);

        let add_end = match (start_side, end_side) {
            (None, None) => continue,
            (Some(side), None) => {
                link.set_breakend(side, chain.open_breakend(ChainEnd::Start));
                ChainEnd::Start
            }
            (None, Some(side)) => {
                link.set_breakend(side, chain.open_breakend(ChainEnd::End));
                ChainEnd::End
            }
            (Some(start_side), Some(end_side)) if start_side == end_side => {
                // One breakend matches the open breakend at both chain ends
                link.set_breakend(end_side, chain.open_breakend(ChainEnd::End));
                ChainEnd::End
            }
            (Some(start_side), Some(end_side)) => {
                // Both breakends of the link attach to this chain, which would close it
                let mut closing_link = link;
                closing_link.set_breakend(start_side, chain.open_breakend(ChainEnd::Start));
                closing_link.set_breakend(end_side, chain.open_breakend(ChainEnd::End));

                let alternative = if ctx.has_replication {
                    ChainEnd::BOTH.into_iter().find_map(|end| {
                        let open = chain.open_breakend(end);
                        state
                            .unlinked
                            .alternatives(open.id(), open.sv.replica)
                            .first()
                            .map(|&x| (end, x))
                    })
                } else {
                    None
                };

                let Some((replaced_end, replacement)) = alternative else {
                    debug!(
                        "cluster({}) skipping {:?} which would close {:?}",
                        ctx.cluster.id, pair, chain
                    );
                    if !state.skipped_pairs.contains(pair) {
                        state.skipped_pairs.push(*pair);
                        state.pair_skipped = true;
                    }
                    closes_chain = true;
                    continue;
                };

                let replaced_side = match replaced_end {
                    ChainEnd::Start => start_side,
                    ChainEnd::End => end_side,
                };
                closing_link.set_breakend(replaced_side, replacement);
                link = closing_link;
                replaced_end.other()
            }
        };

        chain.add_link(link, add_end);
        extended_chain_id = Some(chain.id);
        debug!(
            "cluster({}) index({}) reason({}) adding {:?} to {:?} at {:?}",
            ctx.cluster.id, state.link_index, state.link_reason, link, chain, add_end
        );
        break;
    }

    if extended_chain_id.is_none() {
        if closes_chain {
            return Ok(false);
        }
        let chain = Chain::new(state.next_chain_id, link);
        state.next_chain_id += 1;
        debug!(
            "cluster({}) index({}) reason({}) adding {:?} to new {:?}",
            ctx.cluster.id, state.link_index, state.link_reason, link, chain
        );
        state.chains.push(chain);
    }

    register_new_link(ctx, state, &link)?;
    state.link_index += 1;

    let chain_id = extended_chain_id.unwrap_or(state.next_chain_id - 1);
    observer.on_link_added(ctx, state, &link, chain_id)?;

    if extended_chain_id.is_some() {
        reconcile_chains(ctx, state, observer);
    }
    Ok(true)
}

/// Consume the breakend instances of a committed link and update the candidate index
fn register_new_link(
    ctx: &SearchContext,
    state: &mut SearchState,
    link: &ChainLink,
) -> Result<(), ChainFindingError> {
    for (breakend, partner) in [(link.first, link.second), (link.second, link.first)] {
        state.unlinked_svs.remove(&breakend.sv);

        if !state.unlinked.take(breakend) {
            return Err(ChainFindingError::InconsistentState(format!(
                "breakend {breakend:?} already linked"
            )));
        }

        let id = breakend.id();
        let other_id = id.other_side();
        if state.unlinked.count(id) == 0 {
            if state.unlinked.count(other_id) == 0 {
                state.foldbacks.retain(|&x| x != id.sv_index);
                state.complex_dups.retain(|&x| x != id.sv_index);
            }
            state.remove_possible_links(ctx, id);
        }

        // The same two SVs cannot also be joined through their other breakends
        let partner_other_id = partner.id().other_side();
        if ctx.cluster.has_breakend(other_id) && ctx.cluster.has_breakend(partner_other_id) {
            state
                .possible_links
                .remove_first_pair_matching(other_id, partner_other_id);
        }

        if ctx.has_replication {
            state.update_sv_replication(ctx, id.sv_index);
        }
    }

    if !state.matches_existing_pair(&link.pair) {
        state.unique_pairs.push(link.pair);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sv_model::BreakendId;
    use crate::sv_model::BreakendSide::{End, Start};

    #[test]
    fn test_take_shortest_pair_keeps_first_on_tie() {
        let a = LinkedPair::new(BreakendId::new(0, End), BreakendId::new(1, Start), 100);
        let b = LinkedPair::new(BreakendId::new(2, End), BreakendId::new(3, Start), 50);
        let c = LinkedPair::new(BreakendId::new(4, End), BreakendId::new(5, Start), 50);
        let mut pairs = vec![a, b, c];
        assert_eq!(take_shortest_pair(&mut pairs), Some(b));
        assert_eq!(take_shortest_pair(&mut pairs), Some(c));
        assert_eq!(take_shortest_pair(&mut pairs), Some(a));
        assert_eq!(take_shortest_pair(&mut pairs), None);
    }
}

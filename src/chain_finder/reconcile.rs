use super::observer::ChainObserver;
use super::search_state::{SearchContext, SearchState};
use crate::chain::{Chain, ChainEnd};

/// Find two chains where the open breakend of the first is used by the second
fn find_joinable_chains(chains: &[Chain]) -> Option<(usize, ChainEnd, usize, ChainEnd)> {
    for (index1, chain1) in chains.iter().enumerate() {
        for (index2, chain2) in chains.iter().enumerate() {
            if index1 == index2 {
                continue;
            }
            for end1 in ChainEnd::BOTH {
                for end2 in ChainEnd::BOTH {
                    if chain1.can_join(end1, chain2, end2) {
                        return Some((index1, end1, index2, end2));
                    }
                }
            }
        }
    }
    None
}

/// Merge partial chains until no two chains can be joined
pub fn reconcile_chains(
    ctx: &SearchContext,
    state: &mut SearchState,
    observer: &mut dyn ChainObserver,
) {
    while let Some((index1, end1, index2, end2)) = find_joinable_chains(&state.chains) {
        let other = state.chains.remove(index2);
        let target_index = if index2 < index1 { index1 - 1 } else { index1 };
        let merged_chain_id = other.id;

        let target = &mut state.chains[target_index];
        target.absorb(end1, other, end2);
        observer.on_chains_merged(ctx, target, merged_chain_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain_finder::{ChainFinderConfig, observer::NoopObserver};
    use crate::linked_pair::{ChainLink, LinkReason, LinkedPair};
    use crate::sv_model::BreakendSide::{End, Start};
    use crate::sv_model::{BreakendId, BreakendInstance};
    use crate::test_utils::*;
    use crate::ti_length::HomologyTiLength;

    fn make_link(lower: BreakendId, upper: BreakendId) -> ChainLink {
        let pair = LinkedPair::new(lower, upper, 100);
        ChainLink::new(
            BreakendInstance::new(lower, 0),
            BreakendInstance::new(upper, 0),
            &pair,
            LinkReason::Shortest,
        )
    }

    #[test]
    fn test_partial_chains_are_merged() {
        let cluster = make_cluster(vec![
            make_sv("A", "1", 100, 1, "1", 200, -1),
            make_sv("B", "1", 300, 1, "1", 400, -1),
            make_sv("C", "1", 500, 1, "1", 600, -1),
        ]);
        let config = ChainFinderConfig::default();
        let ti_length = HomologyTiLength::default();
        let ctx = SearchContext::new(&cluster, &config, &ti_length);
        let mut state = SearchState::new(&ctx);

        // Chain 0 holds B-C, chain 1 holds A-B, sharing SV B
        state.chains.push(Chain::new(
            0,
            make_link(BreakendId::new(1, End), BreakendId::new(2, Start)),
        ));
        state.chains.push(Chain::new(
            1,
            make_link(BreakendId::new(0, End), BreakendId::new(1, Start)),
        ));

        reconcile_chains(&ctx, &mut state, &mut NoopObserver);
        assert_eq!(state.chains.len(), 1);

        let chain = &state.chains[0];
        assert_eq!(chain.id, 0);
        assert_eq!(chain.link_count(), 2);
        assert!(chain.is_consistent());
        assert_eq!(chain.links()[0].first.id(), BreakendId::new(0, End));
        assert_eq!(chain.links()[1].second.id(), BreakendId::new(2, Start));
    }
}

//! Ordered rules proposing the next set of links to commit
//!
//! Each rule inspects the candidate link index and either proposes a non-empty set of pairs or
//! defers to the next rule. Rules which only make sense for replicated SVs are skipped in
//! clusters without replication.
//!

use log::debug;

use super::search_state::{SearchContext, SearchState};
use crate::linked_pair::{LinkReason, LinkedPair};
use crate::sv_model::{BreakendId, BreakendSide};

/// Candidate pairs proposed by one rule
#[derive(Debug)]
pub struct CandidateSet {
    pub reason: LinkReason,
    pub pairs: Vec<LinkedPair>,
}

type LinkRuleFn = fn(&SearchContext, &mut SearchState) -> Vec<LinkedPair>;

struct LinkRule {
    reason: LinkReason,
    requires_replication: bool,
    find_pairs: LinkRuleFn,
}

const LINK_RULE_CASCADE: [LinkRule; 6] = [
    LinkRule {
        reason: LinkReason::SingleOption,
        requires_replication: false,
        find_pairs: find_single_option_pairs,
    },
    LinkRule {
        reason: LinkReason::Duplication,
        requires_replication: true,
        find_pairs: find_duplication_pairs,
    },
    LinkRule {
        reason: LinkReason::AdjacentMatch,
        requires_replication: false,
        find_pairs: find_adjacent_matching_pairs,
    },
    LinkRule {
        reason: LinkReason::PloidyMatch,
        requires_replication: true,
        find_pairs: find_ploidy_match_pairs,
    },
    LinkRule {
        reason: LinkReason::MaxReplication,
        requires_replication: true,
        find_pairs: find_max_replication_pairs,
    },
    LinkRule {
        reason: LinkReason::Shortest,
        requires_replication: false,
        find_pairs: find_shortest_pairs,
    },
];

/// Apply the rule cascade, returning the first non-empty candidate set
pub fn find_possible_pairs(ctx: &SearchContext, state: &mut SearchState) -> Option<CandidateSet> {
    for rule in LINK_RULE_CASCADE.iter() {
        if rule.requires_replication && !ctx.has_replication {
            continue;
        }
        let pairs = (rule.find_pairs)(ctx, state);
        if !pairs.is_empty() {
            return Some(CandidateSet {
                reason: rule.reason,
                pairs,
            });
        }
    }
    None
}

fn remove_skipped_pairs(state: &SearchState, pairs: &mut Vec<LinkedPair>) {
    if !state.skipped_pairs.is_empty() {
        pairs.retain(|x| !state.skipped_pairs.contains(x));
    }
}

/// True if single option pair `a` should replace the conflicting pair `b`
///
/// Pairs with more unlinked instances on both breakends win, followed by shorter pairs, and then
/// the pair whose lower breakend comes first on the genome.
///
fn is_preferred_single_option(
    ctx: &SearchContext,
    state: &SearchState,
    a: &LinkedPair,
    b: &LinkedPair,
) -> bool {
    let a_count = state.min_unlinked_count(a);
    let b_count = state.min_unlinked_count(b);
    if a_count != b_count {
        return a_count > b_count;
    }
    if a.length != b.length {
        return a.length < b.length;
    }
    let position = |x: &LinkedPair| {
        let breakend = ctx.cluster.breakend(x.lower);
        (breakend.chrom.clone(), breakend.position)
    };
    position(a) < position(b)
}

/// Pairs which are the only remaining candidate of one of their breakends
pub fn find_single_option_pairs(ctx: &SearchContext, state: &mut SearchState) -> Vec<LinkedPair> {
    let mut restricted_pairs: Vec<LinkedPair> = Vec::new();

    for id in state.possible_links.single_option_breakends() {
        // A capped breakend may still find more candidates
        if ctx.max_possible_links > 0 && state.add_more_possible_links(ctx, id, true) {
            continue;
        }

        let Some(&[pair]) = state.possible_links.links(id) else {
            continue;
        };
        if state.skipped_pairs.contains(&pair) {
            continue;
        }

        let mut can_add = true;
        let mut index = 0;
        while index < restricted_pairs.len() {
            let other = restricted_pairs[index];
            if other == pair {
                can_add = false;
                break;
            }
            if !other.has_link_clash(&pair) && !other.opposite_match(&pair) {
                index += 1;
                continue;
            }
            if is_preferred_single_option(ctx, state, &pair, &other) {
                restricted_pairs.remove(index);
            } else {
                can_add = false;
                break;
            }
        }

        if can_add {
            debug!(
                "cluster({}) single option {:?} limited by breakend {:?}",
                ctx.cluster.id, pair, id
            );
            restricted_pairs.push(pair);
        }
    }
    restricted_pairs
}

/// Links from the duplicated SV into one end of a higher ploidy SV
#[derive(Default)]
struct DuplicationRoute {
    links: Vec<LinkedPair>,
    max_link_count: usize,
    min_length: Option<i64>,
}

impl DuplicationRoute {
    fn add(&mut self, pair: LinkedPair, link_count: usize) {
        self.max_link_count = self.max_link_count.max(link_count);
        self.min_length = Some(self.min_length.map_or(pair.length, |x| x.min(pair.length)));
        self.links.push(pair);
    }

    fn is_dual(&self) -> bool {
        self.links.len() >= 2
    }

    fn shorter_link_count(&self, length: i64) -> usize {
        if self.is_dual() {
            self.links.iter().filter(|x| x.length < length).count()
        } else {
            0
        }
    }
}

/// Pairs routing both ends of a foldback or complex duplication into one end of a higher ploidy SV
///
/// For A - B - A, where A has double the ploidy of B and both ends of B link to the same end of A,
/// B is the duplicated SV checked here.
///
fn find_duplication_pairs(ctx: &SearchContext, state: &mut SearchState) -> Vec<LinkedPair> {
    let cluster = ctx.cluster;
    let mut replicating_svs = state.foldbacks.clone();
    for &sv_index in state.complex_dups.iter() {
        if !replicating_svs.contains(&sv_index) {
            replicating_svs.push(sv_index);
        }
    }

    let mut possible_pairs: Vec<LinkedPair> = Vec::new();
    for sv_index in replicating_svs {
        let sv = cluster.sv(sv_index);
        let is_foldback = sv.is_foldback();

        let sv_pairs = sv
            .sides()
            .iter()
            .filter(|&&side| !is_foldback || sv.is_foldback_breakend(side))
            .flat_map(|&side| {
                state
                    .possible_links
                    .links(BreakendId::new(sv_index, side))
                    .unwrap_or_default()
                    .iter()
                    .copied()
            })
            .collect::<Vec<_>>();

        let mut other_svs = Vec::new();
        for pair in sv_pairs.iter() {
            let Some(other_sv_index) = pair.other_sv(sv_index) else {
                continue;
            };
            if sv.ploidy > cluster.sv(other_sv_index).ploidy || other_svs.contains(&other_sv_index)
            {
                continue;
            }
            other_svs.push(other_sv_index);

            let mut routes = [DuplicationRoute::default(), DuplicationRoute::default()];
            for &route_pair in sv_pairs.iter() {
                let link_count = state.min_unlinked_count(&route_pair);
                if link_count == 0 {
                    continue;
                }
                let Some(other_id) = route_pair.breakend_for_sv(other_sv_index) else {
                    continue;
                };
                if state.unlinked.count(other_id) > 1 {
                    routes[other_id.side.index()].add(route_pair, link_count);
                }
            }

            let [start_route, end_route] = &routes;
            if !start_route.is_dual() && !end_route.is_dual() {
                continue;
            }

            debug!(
                "cluster({}) duplication of {} into {}: start links {} max {}, end links {} max {}",
                cluster.id,
                sv.id,
                cluster.sv(other_sv_index).id,
                start_route.links.len(),
                start_route.max_link_count,
                end_route.links.len(),
                end_route.max_link_count
            );

            // Conflicts with pairs already proposed for either SV go to the shorter links
            let mut has_clashes = false;
            let mut replace_existing = false;
            for existing in possible_pairs.iter() {
                if !existing.has_sv(sv_index) && !existing.has_sv(other_sv_index) {
                    continue;
                }
                has_clashes = true;
                let shorter_count = start_route.shorter_link_count(existing.length)
                    + end_route.shorter_link_count(existing.length);
                if shorter_count > 0 {
                    replace_existing = true;
                    break;
                }
            }
            if replace_existing {
                possible_pairs.clear();
            } else if has_clashes {
                continue;
            }

            let route = if start_route.is_dual() && end_route.is_dual() {
                let use_start = if start_route.max_link_count != end_route.max_link_count {
                    start_route.max_link_count > end_route.max_link_count
                } else {
                    start_route.min_length <= end_route.min_length
                };
                if use_start { start_route } else { end_route }
            } else if start_route.is_dual() {
                start_route
            } else {
                end_route
            };
            possible_pairs.extend(route.links.iter().copied());
        }
    }

    remove_skipped_pairs(state, &mut possible_pairs);
    possible_pairs
}

/// Next queued ploidy-matched pair of neighboring breakends which can still be linked
fn find_adjacent_matching_pairs(_ctx: &SearchContext, state: &mut SearchState) -> Vec<LinkedPair> {
    while let Some(pair) = state.possible_links.pop_adjacent() {
        if state.matches_existing_pair(&pair) || !state.has_unlinked_capacity(&pair) {
            continue;
        }
        return vec![pair];
    }
    Vec::new()
}

/// Candidate pairs between SVs sharing the highest remaining replication count
fn find_ploidy_match_pairs(_ctx: &SearchContext, state: &mut SearchState) -> Vec<LinkedPair> {
    let mut possible_pairs: Vec<LinkedPair> = Vec::new();
    let mut max_rep_count = 1;

    for (&sv_index, &rep_count) in state.sv_replication.iter() {
        if rep_count <= 1 || rep_count < max_rep_count {
            continue;
        }

        let mut new_pairs = Vec::new();
        for side in BreakendSide::BOTH {
            let Some(sv_links) = state.possible_links.links(BreakendId::new(sv_index, side)) else {
                continue;
            };
            for pair in sv_links.iter() {
                if possible_pairs.contains(pair)
                    || new_pairs.contains(pair)
                    || state.skipped_pairs.contains(pair)
                {
                    continue;
                }
                let other_rep_count = pair
                    .other_sv(sv_index)
                    .and_then(|x| state.sv_replication.get(&x));
                if other_rep_count == Some(&rep_count) {
                    new_pairs.push(*pair);
                }
            }
        }

        if new_pairs.is_empty() {
            continue;
        }
        if rep_count > max_rep_count {
            max_rep_count = rep_count;
            possible_pairs.clear();
        }
        possible_pairs.extend(new_pairs);
    }

    remove_skipped_pairs(state, &mut possible_pairs);
    possible_pairs
}

/// SVs with the highest remaining replication count
fn max_replication_svs(state: &SearchState) -> Vec<usize> {
    let Some(&max_rep_count) = state.sv_replication.values().max() else {
        return Vec::new();
    };
    if max_rep_count <= 1 {
        return Vec::new();
    }
    state
        .sv_replication
        .iter()
        .filter(|(_, x)| **x == max_rep_count)
        .map(|(&sv_index, _)| sv_index)
        .collect()
}

/// Fewest-option pairs restricted to the breakends of the most replicated SVs
///
/// If these SVs have no candidates at all they are dropped from replication tracking.
///
fn find_max_replication_pairs(ctx: &SearchContext, state: &mut SearchState) -> Vec<LinkedPair> {
    let max_rep_svs = max_replication_svs(state);
    if max_rep_svs.is_empty() {
        return Vec::new();
    }

    let breakend_ids = state
        .unlinked
        .breakend_ids()
        .into_iter()
        .filter(|x| max_rep_svs.contains(&x.sv_index))
        .collect::<Vec<_>>();
    if breakend_ids.is_empty() {
        return Vec::new();
    }

    for &sv_index in max_rep_svs.iter() {
        debug!(
            "cluster({}) restricted to replicated SV {} rep {:?}",
            ctx.cluster.id,
            ctx.cluster.sv(sv_index).id,
            state.sv_replication.get(&sv_index)
        );
    }

    let possible_pairs = find_fewest_option_pairs(state, &breakend_ids, true);
    if possible_pairs.is_empty() {
        for sv_index in max_rep_svs {
            debug!(
                "cluster({}) removing replicated SV {} without candidate links",
                ctx.cluster.id,
                ctx.cluster.sv(sv_index).id
            );
            state.sv_replication.remove(&sv_index);
        }
    }
    possible_pairs
}

/// Fewest-option pairs over every breakend with unlinked instances
fn find_shortest_pairs(_ctx: &SearchContext, state: &mut SearchState) -> Vec<LinkedPair> {
    let breakend_ids = state.unlinked.breakend_ids();
    find_fewest_option_pairs(state, &breakend_ids, false)
}

/// Collect the candidate pairs of the breakends with the fewest candidates
///
/// In restricted mode the candidate lists of each pair's other breakend are also considered, so
/// a breakend with few alternatives on the far side of a link is favored.
///
pub fn find_fewest_option_pairs(
    state: &SearchState,
    breakend_ids: &[BreakendId],
    is_restricted: bool,
) -> Vec<LinkedPair> {
    let mut min_pair_count = 0;
    let mut min_link_pairs: Vec<LinkedPair> = Vec::new();

    let mut check_list = |pairs: &[LinkedPair]| {
        if min_pair_count == 0 || pairs.len() < min_pair_count {
            min_link_pairs.clear();
            min_pair_count = pairs.len();
        }
        if pairs.len() == min_pair_count {
            for pair in pairs.iter() {
                if !min_link_pairs.contains(pair) {
                    min_link_pairs.push(*pair);
                }
            }
        }
    };

    for &id in breakend_ids.iter() {
        let Some(pairs) = state.possible_links.links(id) else {
            continue;
        };
        if pairs.is_empty() {
            continue;
        }
        check_list(pairs);

        if is_restricted {
            for pair in pairs.iter() {
                let Some(other_pairs) = pair
                    .other_breakend(id)
                    .and_then(|x| state.possible_links.links(x))
                else {
                    continue;
                };
                if !other_pairs.is_empty() {
                    check_list(other_pairs);
                }
            }
        }
    }

    remove_skipped_pairs(state, &mut min_link_pairs);
    min_link_pairs
}

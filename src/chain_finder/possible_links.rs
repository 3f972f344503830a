//! Candidate link index
//!
//! Every right-anchored breakend scans up its chromosome for left-anchored breakends it could
//! join through a templated insertion. Scans may pause once a breakend holds enough
//! ploidy-matched candidates, leaving a cursor from which the scan resumes when more candidates
//! are needed.
//!

use std::collections::{BTreeMap, VecDeque};

use log::debug;

use super::allele_ploidy::AllelePloidyTable;
use super::search_state::{SearchContext, SearchState, UnlinkedBreakends};
use crate::linked_pair::LinkedPair;
use crate::sv_model::{BreakendDirection, BreakendId, SvType};

/// Position reached by a paused candidate scan
#[derive(Clone, Copy, Debug)]
struct ScanCursor {
    last_index: usize,
}

#[derive(Default)]
pub struct PossibleLinks {
    /// Candidate pairs of each breakend, nearest first
    links: BTreeMap<BreakendId, Vec<LinkedPair>>,

    cursors: BTreeMap<BreakendId, ScanCursor>,

    /// Ploidy-matched pairs of neighboring breakends, in discovery order
    adjacent_matching: VecDeque<LinkedPair>,
}

impl PossibleLinks {
    pub fn links(&self, id: BreakendId) -> Option<&[LinkedPair]> {
        self.links.get(&id).map(|x| x.as_slice())
    }

    /// Number of candidate pairs of a breakend, 0 if it has no entry
    pub fn link_count(&self, id: BreakendId) -> usize {
        self.links.get(&id).map_or(0, |x| x.len())
    }

    pub fn breakend_ids(&self) -> Vec<BreakendId> {
        self.links.keys().copied().collect()
    }

    /// Breakends with exactly one candidate pair
    pub fn single_option_breakends(&self) -> Vec<BreakendId> {
        self.links
            .iter()
            .filter(|(_, x)| x.len() == 1)
            .map(|(&id, _)| id)
            .collect()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.links.is_empty()
    }

    pub fn pop_adjacent(&mut self) -> Option<LinkedPair> {
        self.adjacent_matching.pop_front()
    }

    pub fn adjacent_count(&self) -> usize {
        self.adjacent_matching.len()
    }

    #[cfg(test)]
    pub fn has_cursor(&self, id: BreakendId) -> bool {
        self.cursors.contains_key(&id)
    }

    pub fn clear_cursor(&mut self, id: BreakendId) {
        self.cursors.remove(&id);
    }

    pub fn remove_breakend(&mut self, id: BreakendId) -> Option<Vec<LinkedPair>> {
        self.links.remove(&id)
    }

    /// Remove `pair` from the candidates of breakend `id`
    ///
    /// Returns true if the breakend's candidate list became empty as a result.
    ///
    pub fn remove_pair(&mut self, id: BreakendId, pair: &LinkedPair) -> bool {
        let Some(list) = self.links.get_mut(&id) else {
            return false;
        };
        let Some(pos) = list.iter().position(|x| x == pair) else {
            return false;
        };
        list.remove(pos);
        list.is_empty()
    }

    /// Remove the first candidate of breakend `id` connecting it to `other`
    pub fn remove_first_pair_matching(&mut self, id: BreakendId, other: BreakendId) {
        if let Some(list) = self.links.get_mut(&id)
            && let Some(pos) = list.iter().position(|x| x.has_breakend(id) && x.has_breakend(other))
        {
            list.remove(pos);
        }
    }

    fn ensure_entry(&mut self, id: BreakendId) -> &mut Vec<LinkedPair> {
        self.links.entry(id).or_default()
    }

    /// Resume the candidate scan of a breakend from its cursor
    ///
    /// Right-anchored breakends scan up their chromosome and left-anchored breakends scan down.
    /// When `apply_max` is set the scan pauses again once the breakend holds a ploidy-matched
    /// candidate and reaches the candidate cap. Returns true if any candidate was added.
    ///
    pub fn extend_from_cursor(
        &mut self,
        ctx: &SearchContext,
        id: BreakendId,
        apply_max: bool,
        unlinked: &UnlinkedBreakends,
        unique_pairs: &[LinkedPair],
        allele_ploidies: Option<&AllelePloidyTable>,
    ) -> bool {
        let Some(cursor) = self.cursors.get(&id).copied() else {
            return false;
        };
        if unlinked.count(id) == 0 {
            self.cursors.remove(&id);
            return false;
        }
        if !self.links.contains_key(&id) {
            return false;
        }

        let cluster = ctx.cluster;
        let breakend = cluster.breakend(id);
        let breakend_list = cluster.chrom_breakends(&breakend.chrom);
        let traverse_up = breakend.dir == BreakendDirection::RightAnchor;

        let mut index = cursor.last_index;
        let mut links_added = 0;
        let mut matched_ploidy = false;
        let mut cursor_valid = true;
        loop {
            let next_index = if traverse_up {
                index + 1
            } else if index > 0 {
                index - 1
            } else {
                cursor_valid = false;
                break;
            };
            if next_index >= breakend_list.len() {
                cursor_valid = false;
                break;
            }

            let crossed_segment = index.min(next_index);
            if let Some(allele_ploidies) = allele_ploidies
                && allele_ploidies.is_low_cluster_ploidy(&breakend.chrom, crossed_segment)
            {
                debug!(
                    "cluster({}) breakend {:?} scan stopped at low cluster allele ploidy segment {}",
                    cluster.id, id, crossed_segment
                );
                cursor_valid = false;
                break;
            }
            index = next_index;

            let other_id = breakend_list[index];
            let other = cluster.breakend(other_id);
            if other.dir == breakend.dir
                || other_id.sv_index == id.sv_index
                || unlinked.count(other_id) == 0
            {
                continue;
            }

            let (lower, upper) = if traverse_up {
                (id, other_id)
            } else {
                (other_id, id)
            };
            let lower_breakend = cluster.breakend(lower);
            let upper_breakend = cluster.breakend(upper);
            let length = upper_breakend.position - lower_breakend.position;
            if length < ctx.ti_length.min_length(lower_breakend, upper_breakend) {
                continue;
            }
            if !self.links.contains_key(&other_id) {
                continue;
            }

            let pair = LinkedPair::new(lower, upper, length);
            let is_listed = |list: Option<&Vec<LinkedPair>>| {
                list.is_some_and(|x| x.iter().any(|p| p.matches(&pair)))
            };
            if is_listed(self.links.get(&id)) || is_listed(self.links.get(&other_id)) {
                continue;
            }
            if unique_pairs.iter().any(|x| x.opposite_match(&pair)) {
                continue;
            }

            self.ensure_entry(id).push(pair);
            self.ensure_entry(other_id).push(pair);
            links_added += 1;

            if !matched_ploidy {
                matched_ploidy = cluster.sv(lower.sv_index).replication_count
                    == cluster.sv(upper.sv_index).replication_count;
            }

            if apply_max && matched_ploidy && ctx.exceeds_max_possible_links(self.link_count(id)) {
                break;
            }
        }

        if cursor_valid {
            self.cursors.insert(id, ScanCursor { last_index: index });
        } else {
            self.cursors.remove(&id);
        }
        links_added > 0
    }
}

/// Build the candidate link index for every breakend of the cluster
pub fn determine_possible_links(ctx: &SearchContext, state: &mut SearchState) {
    let cluster = ctx.cluster;

    for breakend_list in cluster.chr_breakend_map().values() {
        for (i, &lower_id) in breakend_list.iter().enumerate() {
            let lower = cluster.breakend(lower_id);
            if lower.dir != BreakendDirection::RightAnchor || state.is_assembly_linked(ctx, lower_id)
            {
                continue;
            }

            state.possible_links.ensure_entry(lower_id);
            let lower_sv = cluster.sv(lower_id.sv_index);
            let lower_is_foldback = lower_sv.is_foldback_breakend(lower_id.side);

            let mut matched_ploidy = false;

            // First breakend past the lower one which is not part of an assembled link
            let mut skipped_non_assembled = None;

            for j in (i + 1)..breakend_list.len() {
                if let Some(allele_ploidies) = &state.allele_ploidies
                    && allele_ploidies.is_low_cluster_ploidy(&lower.chrom, j - 1)
                {
                    debug!(
                        "cluster({}) breakend {:?} limited at index {} by low cluster allele ploidy",
                        cluster.id, lower_id, j
                    );
                    break;
                }

                let upper_id = breakend_list[j];
                let upper = cluster.breakend(upper_id);

                if skipped_non_assembled.is_none() && !upper.is_assembled_link {
                    skipped_non_assembled = Some(j);
                }

                if upper.dir != BreakendDirection::LeftAnchor
                    || upper_id.sv_index == lower_id.sv_index
                    || state.is_assembly_linked(ctx, upper_id)
                {
                    continue;
                }

                let length = upper.position - lower.position;
                if length < ctx.ti_length.min_length(lower, upper) {
                    continue;
                }

                let pair = LinkedPair::new(lower_id, upper_id, length);
                if state.original_replication(ctx, lower_id.sv_index)
                    == state.original_replication(ctx, upper_id.sv_index)
                {
                    matched_ploidy = true;
                    if j == i + 1 {
                        state.possible_links.adjacent_matching.push_back(pair);
                    }
                }

                let possible_links = &mut state.possible_links;
                possible_links.ensure_entry(lower_id).push(pair);
                if !possible_links.links.contains_key(&upper_id) {
                    // The upper breakend's own scan has not started yet
                    possible_links.cursors.insert(
                        upper_id,
                        ScanCursor {
                            last_index: upper.chrom_list_index,
                        },
                    );
                }
                possible_links.ensure_entry(upper_id).insert(0, pair);

                if skipped_non_assembled.is_none_or(|x| x == j) {
                    if !lower_sv.is_foldback() {
                        check_is_complex_dup(ctx, state, lower_id, upper_id);
                    }
                    if !cluster.sv(upper_id.sv_index).is_foldback() {
                        check_is_complex_dup(ctx, state, upper_id, lower_id);
                    }
                }

                if matched_ploidy
                    && ctx.exceeds_max_possible_links(state.possible_links.link_count(lower_id))
                    && !lower_is_foldback
                {
                    state
                        .possible_links
                        .cursors
                        .insert(lower_id, ScanCursor { last_index: j });
                    break;
                }
            }
        }
    }

    // Left-anchored foldback breakends never scan as the lower breakend, so give them a full
    // downward scan
    let reverse_foldback_breakends = cluster
        .foldbacks()
        .iter()
        .flat_map(|&sv_index| {
            let sv = cluster.sv(sv_index);
            sv.sides()
                .iter()
                .filter(move |&&side| {
                    sv.is_foldback_breakend(side)
                        && sv.breakend(side).is_some_and(|x| x.dir == BreakendDirection::LeftAnchor)
                })
                .map(move |&side| BreakendId::new(sv_index, side))
        })
        .collect::<Vec<_>>();

    for id in reverse_foldback_breakends {
        if state.unlinked.count(id) == 0 {
            continue;
        }
        state.possible_links.ensure_entry(id);
        state.possible_links.cursors.insert(
            id,
            ScanCursor {
                last_index: cluster.breakend(id).chrom_list_index,
            },
        );
        state.add_more_possible_links(ctx, id, false);
        if state.possible_links.link_count(id) == 0 {
            state.possible_links.links.remove(&id);
        }
    }

    // Right-anchored breakends which found nothing have no use for an entry
    state.possible_links.links.retain(|_, x| !x.is_empty());

    debug!(
        "cluster({}) candidate links: {} breakends, {} adjacent matching pairs, {} complex dup candidates",
        cluster.id,
        state.possible_links.links.len(),
        state.possible_links.adjacent_count(),
        state.complex_dups.len()
    );
}

/// Mark the SV of `low_id` as a complex duplication candidate if both of its breakends run into
/// SVs of at least twice its ploidy
fn check_is_complex_dup(
    ctx: &SearchContext,
    state: &mut SearchState,
    low_id: BreakendId,
    high_id: BreakendId,
) {
    let cluster = ctx.cluster;
    let sv = cluster.sv(low_id.sv_index);
    if sv.is_single_breakend() || sv.sv_type == SvType::Del {
        return;
    }
    if state.complex_dups.contains(&low_id.sv_index) {
        return;
    }

    let high_sv = cluster.sv(high_id.sv_index);
    if sv.ploidy_min * 2.0 > high_sv.ploidy_max {
        return;
    }
    let less_than_max = sv.ploidy_max < high_sv.ploidy_min;

    let other_id = low_id.other_side();
    let other = cluster.breakend(other_id);
    let breakend_list = cluster.chrom_breakends(&other.chrom);
    let traverse_up = other.dir == BreakendDirection::RightAnchor;

    let mut index = other.chrom_list_index;
    loop {
        index = if traverse_up {
            index + 1
        } else if index > 0 {
            index - 1
        } else {
            break;
        };
        let Some(&next_id) = breakend_list.get(index) else {
            break;
        };
        if next_id == low_id {
            break;
        }

        let next = cluster.breakend(next_id);
        if next.is_assembled_link {
            continue;
        }
        if next.dir == other.dir {
            break;
        }

        let next_sv = cluster.sv(next_id.sv_index);
        if sv.ploidy_min * 2.0 <= next_sv.ploidy_max
            && (less_than_max || sv.ploidy_max < next_sv.ploidy_min)
        {
            debug!(
                "cluster({}) complex dup candidate {} vs SVs {} and {}",
                cluster.id, sv.id, high_sv.id, next_sv.id
            );
            state.complex_dups.push(low_id.sv_index);
        }
        break;
    }
}

use std::collections::{BTreeMap, BTreeSet};

use super::allele_ploidy::AllelePloidyTable;
use super::possible_links::PossibleLinks;
use super::{ChainFinderConfig, max_possible_links_cap};
use crate::chain::Chain;
use crate::cluster::{Cluster, sv_breakend_ids};
use crate::linked_pair::{LinkReason, LinkedPair};
use crate::sv_model::{BreakendId, BreakendInstance, SvInstance};
use crate::ti_length::MinTiLength;

/// Read-only inputs of one chain finding run
pub struct SearchContext<'a> {
    pub cluster: &'a Cluster,
    pub config: &'a ChainFinderConfig,
    pub ti_length: &'a dyn MinTiLength,
    pub has_replication: bool,

    /// Effective cap on eagerly enumerated candidate links per breakend, 0 for no cap
    pub max_possible_links: usize,
}

impl<'a> SearchContext<'a> {
    pub fn new(
        cluster: &'a Cluster,
        config: &'a ChainFinderConfig,
        ti_length: &'a dyn MinTiLength,
    ) -> Self {
        Self {
            cluster,
            config,
            ti_length,
            has_replication: cluster.has_replication(),
            max_possible_links: max_possible_links_cap(config.max_possible_links),
        }
    }

    /// True if a breakend has collected as many candidate links as the cap allows
    pub fn exceeds_max_possible_links(&self, link_count: usize) -> bool {
        self.max_possible_links > 0 && link_count >= self.max_possible_links
    }
}

/// Free lists of the replicas still available at each original breakend
///
/// Consuming a breakend instance removes its replica index from the list of its original
/// breakend. Breakends with no remaining replicas have no entry.
///
#[derive(Default)]
pub struct UnlinkedBreakends {
    replicas: BTreeMap<BreakendId, Vec<usize>>,
}

impl UnlinkedBreakends {
    pub fn new(cluster: &Cluster) -> Self {
        let mut replicas = BTreeMap::new();
        for (sv_index, sv) in cluster.svs().iter().enumerate() {
            for id in sv_breakend_ids(sv_index, sv) {
                replicas.insert(id, (0..sv.replication_count).collect());
            }
        }
        Self { replicas }
    }

    pub fn count(&self, id: BreakendId) -> usize {
        self.replicas.get(&id).map_or(0, |x| x.len())
    }

    /// The next available instance of a breakend
    pub fn first(&self, id: BreakendId) -> Option<BreakendInstance> {
        self.replicas
            .get(&id)
            .and_then(|x| x.first())
            .map(|&replica| BreakendInstance::new(id, replica))
    }

    /// Available instances of a breakend other than the given replica
    pub fn alternatives(&self, id: BreakendId, replica: usize) -> Vec<BreakendInstance> {
        self.replicas.get(&id).map_or(Vec::new(), |x| {
            x.iter()
                .filter(|&&r| r != replica)
                .map(|&r| BreakendInstance::new(id, r))
                .collect()
        })
    }

    /// Consume one breakend instance, returning false if it was not available
    pub fn take(&mut self, breakend: BreakendInstance) -> bool {
        let id = breakend.id();
        let Some(list) = self.replicas.get_mut(&id) else {
            return false;
        };
        let Some(pos) = list.iter().position(|&x| x == breakend.sv.replica) else {
            return false;
        };
        list.remove(pos);
        if list.is_empty() {
            self.replicas.remove(&id);
        }
        true
    }

    pub fn contains(&self, id: BreakendId) -> bool {
        self.replicas.contains_key(&id)
    }

    pub fn breakend_ids(&self) -> Vec<BreakendId> {
        self.replicas.keys().copied().collect()
    }
}

/// All mutable state of one chain finding run
pub struct SearchState {
    pub unlinked: UnlinkedBreakends,

    /// SV instances which have not been used by any link
    pub unlinked_svs: BTreeSet<SvInstance>,

    /// Remaining replication of each SV still considered replicated
    pub sv_replication: BTreeMap<usize, usize>,

    pub possible_links: PossibleLinks,

    /// Foldback SVs with unlinked breakends remaining
    pub foldbacks: Vec<usize>,

    /// Complex duplication candidates found during enumeration
    pub complex_dups: Vec<usize>,

    /// Pairs deferred because they would close a chain
    pub skipped_pairs: Vec<LinkedPair>,

    /// Set when a pair is deferred in the current iteration
    pub pair_skipped: bool,

    /// Every distinct committed pair
    pub unique_pairs: Vec<LinkedPair>,

    pub chains: Vec<Chain>,
    pub next_chain_id: usize,

    /// Count of committed links
    pub link_index: usize,

    /// Rule which selected the links currently being committed
    pub link_reason: LinkReason,

    pub allele_ploidies: Option<AllelePloidyTable>,
}

impl SearchState {
    pub fn new(ctx: &SearchContext) -> Self {
        let cluster = ctx.cluster;
        let unlinked_svs = cluster
            .svs()
            .iter()
            .enumerate()
            .flat_map(|(sv_index, sv)| {
                (0..sv.replication_count).map(move |replica| SvInstance::new(sv_index, replica))
            })
            .collect();

        Self {
            unlinked: UnlinkedBreakends::new(cluster),
            unlinked_svs,
            sv_replication: BTreeMap::new(),
            possible_links: PossibleLinks::default(),
            foldbacks: cluster.foldbacks().to_vec(),
            complex_dups: Vec::new(),
            skipped_pairs: Vec::new(),
            pair_skipped: false,
            unique_pairs: Vec::new(),
            chains: Vec::new(),
            next_chain_id: 0,
            link_index: 0,
            link_reason: LinkReason::Assembly,
            allele_ploidies: None,
        }
    }

    /// Remaining replication of an SV, from its least consumed breakend
    pub fn remaining_replication(&self, ctx: &SearchContext, sv_index: usize) -> usize {
        sv_breakend_ids(sv_index, ctx.cluster.sv(sv_index))
            .map(|x| self.unlinked.count(x))
            .max()
            .unwrap_or(0)
    }

    /// Start tracking replication for all SVs which still have more than one unlinked copy
    pub fn set_sv_replication_counts(&mut self, ctx: &SearchContext) {
        if !ctx.has_replication {
            return;
        }
        for (sv_index, sv) in ctx.cluster.svs().iter().enumerate() {
            if !sv.is_replicated() {
                continue;
            }
            let remaining = self.remaining_replication(ctx, sv_index);
            if remaining > 1 {
                self.sv_replication.insert(sv_index, remaining);
            }
        }
    }

    /// Refresh one SV's replication entry after one of its breakends was consumed
    ///
    /// SVs dropping to a single copy leave the map, and SVs already removed are never re-added.
    ///
    pub fn update_sv_replication(&mut self, ctx: &SearchContext, sv_index: usize) {
        if !self.sv_replication.contains_key(&sv_index) {
            return;
        }
        let remaining = self.remaining_replication(ctx, sv_index);
        if remaining > 1 {
            self.sv_replication.insert(sv_index, remaining);
        } else {
            self.sv_replication.remove(&sv_index);
        }
    }

    /// Original replication count of an SV
    pub fn original_replication(&self, ctx: &SearchContext, sv_index: usize) -> usize {
        ctx.cluster.sv(sv_index).replication_count
    }

    /// Smaller of the unlinked instance counts at either breakend of the pair
    pub fn min_unlinked_count(&self, pair: &LinkedPair) -> usize {
        self.unlinked
            .count(pair.lower)
            .min(self.unlinked.count(pair.upper))
    }

    /// True if both breakends of the pair have an unlinked instance
    pub fn has_unlinked_capacity(&self, pair: &LinkedPair) -> bool {
        self.min_unlinked_count(pair) > 0
    }

    /// A breakend consumed entirely by assembly-confirmed links
    pub fn is_assembly_linked(&self, ctx: &SearchContext, id: BreakendId) -> bool {
        ctx.cluster.breakend(id).is_assembled_link && self.unlinked.count(id) == 0
    }

    pub fn matches_existing_pair(&self, pair: &LinkedPair) -> bool {
        self.unique_pairs.iter().any(|x| x.matches(pair))
    }

    /// Remove all candidate links of a breakend which has no unlinked instances left
    ///
    /// Each partner breakend loses the link as well. A partner left without candidates tries to
    /// extend its scan before its entry is dropped.
    ///
    pub fn remove_possible_links(&mut self, ctx: &SearchContext, id: BreakendId) {
        self.possible_links.clear_cursor(id);
        let Some(links) = self.possible_links.remove_breakend(id) else {
            return;
        };
        for pair in links {
            let Some(other) = pair.other_breakend(id) else {
                continue;
            };
            let is_emptied = self.possible_links.remove_pair(other, &pair);
            if is_emptied && !self.add_more_possible_links(ctx, other, true) {
                self.possible_links.remove_breakend(other);
            }
        }
    }

    /// Resume the candidate scan of a breakend from its cursor
    pub fn add_more_possible_links(
        &mut self,
        ctx: &SearchContext,
        id: BreakendId,
        apply_max: bool,
    ) -> bool {
        let Self {
            possible_links,
            unlinked,
            unique_pairs,
            allele_ploidies,
            ..
        } = self;
        possible_links.extend_from_cursor(
            ctx,
            id,
            apply_max,
            unlinked,
            unique_pairs,
            allele_ploidies.as_ref(),
        )
    }

    /// Confirm the candidate index only refers to breakends with unlinked instances
    pub fn check_has_valid_state(&self) -> Result<(), String> {
        for id in self.possible_links.breakend_ids() {
            if !self.unlinked.contains(id) {
                return Err(format!(
                    "breakend {id:?} has candidate links but no unlinked instances"
                ));
            }
        }
        Ok(())
    }
}

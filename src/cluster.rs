//! SV cluster context shared by the chain finder and its reporting
//!

use std::collections::{BTreeMap, BTreeSet, HashSet};

use log::debug;
use simple_error::{SimpleResult, bail};

use crate::chain::{Chain, ChainMetrics};
use crate::linked_pair::{LinkReason, LinkedPair};
use crate::sv_model::{Breakend, BreakendDirection, BreakendId, BreakendSide, SvInstance, SvVariant};

/// A unique link used by the chains of a cluster
#[derive(Clone, Debug)]
pub struct ClusterLinkedPair {
    pub pair: LinkedPair,
    pub reason: LinkReason,

    /// Number of chain links using this pair
    pub use_count: usize,
}

/// The SVs of one rearrangement event, with the indices and results of chaining
///
pub struct Cluster {
    pub id: usize,

    svs: Vec<SvVariant>,

    /// Original breakends on each chromosome, in position order
    chr_breakend_map: BTreeMap<String, Vec<BreakendId>>,

    /// Links confirmed by assembly, derived from breakend assembly tags
    assembly_links: Vec<LinkedPair>,

    foldbacks: Vec<usize>,

    chains: Vec<Chain>,

    linked_pairs: Vec<ClusterLinkedPair>,

    /// SV replicas dropped when a duplicate chain was folded into an existing one
    removed_replicas: BTreeSet<SvInstance>,

    valid_allele_ploidy_segment_perc: f64,
}

impl Cluster {
    pub fn new(id: usize, svs: Vec<SvVariant>) -> SimpleResult<Self> {
        validate_svs(&svs)?;

        let mut cluster = Self {
            id,
            svs,
            chr_breakend_map: BTreeMap::new(),
            assembly_links: Vec::new(),
            foldbacks: Vec::new(),
            chains: Vec::new(),
            linked_pairs: Vec::new(),
            removed_replicas: BTreeSet::new(),
            valid_allele_ploidy_segment_perc: 0.0,
        };
        cluster.build_chr_breakend_map();
        cluster.find_assembly_links();
        cluster.foldbacks = (0..cluster.svs.len())
            .filter(|&x| cluster.svs[x].is_foldback())
            .collect();
        Ok(cluster)
    }

    fn build_chr_breakend_map(&mut self) {
        let mut chr_breakend_map: BTreeMap<String, Vec<BreakendId>> = BTreeMap::new();
        for (sv_index, sv) in self.svs.iter().enumerate() {
            for &side in sv.sides() {
                let breakend = &sv.breakends[side.index()];
                chr_breakend_map
                    .entry(breakend.chrom.clone())
                    .or_default()
                    .push(BreakendId::new(sv_index, side));
            }
        }

        for breakend_list in chr_breakend_map.values_mut() {
            breakend_list.sort_by_key(|&x| (self.breakend(x).position_key(), x));
            for (list_index, &id) in breakend_list.iter().enumerate() {
                self.svs[id.sv_index].breakends[id.side.index()].chrom_list_index = list_index;
            }
        }
        self.chr_breakend_map = chr_breakend_map;
    }

    /// Pair up facing breakends sharing an assembly tag
    ///
    /// Each tag confirms at most one link.
    ///
    fn find_assembly_links(&mut self) {
        let mut used_tags = HashSet::new();
        let mut assembly_links = Vec::new();
        for breakend_list in self.chr_breakend_map.values() {
            for (i, &lower_id) in breakend_list.iter().enumerate() {
                let lower = self.breakend(lower_id);
                if lower.dir != BreakendDirection::RightAnchor {
                    continue;
                }
                for tag in lower.assembly_tags.iter() {
                    if used_tags.contains(tag) {
                        continue;
                    }
                    let upper_id = breakend_list[i + 1..].iter().copied().find(|&x| {
                        let upper = self.breakend(x);
                        x.sv_index != lower_id.sv_index
                            && upper.dir == BreakendDirection::LeftAnchor
                            && upper.assembly_tags.contains(tag)
                    });
                    if let Some(upper_id) = upper_id {
                        let length = self.breakend(upper_id).position - lower.position;
                        assembly_links.push(LinkedPair::new_assembled(lower_id, upper_id, length));
                        used_tags.insert(tag.clone());
                    }
                }
            }
        }

        for pair in assembly_links.iter() {
            for id in pair.breakends() {
                self.svs[id.sv_index].breakends[id.side.index()].is_assembled_link = true;
            }
        }
        self.assembly_links = assembly_links;
    }

    pub fn svs(&self) -> &[SvVariant] {
        &self.svs
    }

    pub fn sv(&self, sv_index: usize) -> &SvVariant {
        &self.svs[sv_index]
    }

    pub fn breakend(&self, id: BreakendId) -> &Breakend {
        &self.svs[id.sv_index].breakends[id.side.index()]
    }

    pub fn has_breakend(&self, id: BreakendId) -> bool {
        self.svs
            .get(id.sv_index)
            .is_some_and(|x| x.breakend(id.side).is_some())
    }

    pub fn chr_breakend_map(&self) -> &BTreeMap<String, Vec<BreakendId>> {
        &self.chr_breakend_map
    }

    pub fn chrom_breakends(&self, chrom: &str) -> &[BreakendId] {
        self.chr_breakend_map
            .get(chrom)
            .map(|x| x.as_slice())
            .unwrap_or_default()
    }

    pub fn assembly_links(&self) -> &[LinkedPair] {
        &self.assembly_links
    }

    pub fn foldbacks(&self) -> &[usize] {
        &self.foldbacks
    }

    /// Count of SVs including all replicas
    pub fn sv_instance_count(&self) -> usize {
        self.svs.iter().map(|x| x.replication_count).sum()
    }

    pub fn has_replication(&self) -> bool {
        self.svs.iter().any(|x| x.is_replicated())
    }

    pub fn valid_allele_ploidy_segment_perc(&self) -> f64 {
        self.valid_allele_ploidy_segment_perc
    }

    pub fn set_valid_allele_ploidy_segment_perc(&mut self, perc: f64) {
        self.valid_allele_ploidy_segment_perc = perc;
    }

    pub fn chains(&self) -> &[Chain] {
        &self.chains
    }

    /// Remove all chain results, restoring any replicas dropped by duplicate chain folding
    pub fn clear_chains(&mut self) {
        self.chains.clear();
        self.linked_pairs.clear();
        for sv in std::mem::take(&mut self.removed_replicas) {
            self.svs[sv.sv_index].replication_count += 1;
        }
    }

    /// Add a finished chain to the cluster
    ///
    /// With replication, a chain identical to one already registered is folded into the existing
    /// chain's replication count. If the duplicate was built only from replicas, those replicas
    /// are removed from the cluster.
    ///
    pub fn register_chain(&mut self, mut chain: Chain, has_replication: bool) {
        if has_replication {
            if let Some(existing) = self.chains.iter_mut().find(|x| x.is_identical(&chain)) {
                existing.add_replication();
                debug!(
                    "cluster({}) duplicate chain folded into chain({}) replication={}",
                    self.id,
                    existing.id,
                    existing.replication_count()
                );
                if chain.is_all_replicated() {
                    for sv in chain.sv_instances() {
                        self.remove_replicated_sv(sv);
                    }
                }
                return;
            }
        }

        chain.id = self.chains.len();
        self.chains.push(chain);
    }

    /// Drop one replica of an SV from the cluster
    ///
    /// The replica's index is retained so that the other replicas keep their identity.
    ///
    pub fn remove_replicated_sv(&mut self, sv: SvInstance) {
        if !sv.is_replicated() || self.removed_replicas.contains(&sv) {
            return;
        }
        let original = &mut self.svs[sv.sv_index];
        if original.replication_count > 1 {
            original.replication_count -= 1;
            self.removed_replicas.insert(sv);
        }
    }

    /// Cache the unique links used by the cluster's chains
    ///
    /// Links between two replicas are skipped. A link repeated across or within chains is listed
    /// once, with its use count.
    ///
    pub fn cache_linked_pairs(&mut self) {
        let mut linked_pairs: Vec<ClusterLinkedPair> = Vec::new();
        for link in self.chains.iter().flat_map(|x| x.links().iter()) {
            if link.first.sv.is_replicated() && link.second.sv.is_replicated() {
                continue;
            }
            match linked_pairs.iter_mut().find(|x| x.pair.matches(&link.pair)) {
                Some(existing) => existing.use_count += 1,
                None => linked_pairs.push(ClusterLinkedPair {
                    pair: link.pair,
                    reason: link.reason,
                    use_count: 1,
                }),
            }
        }
        self.linked_pairs = linked_pairs;
    }

    pub fn linked_pairs(&self) -> &[ClusterLinkedPair] {
        &self.linked_pairs
    }

    /// SV instances not used by any chain, excluding removed replicas
    pub fn unchained_svs(&self) -> Vec<SvInstance> {
        let chained = self
            .chains
            .iter()
            .flat_map(|x| x.sv_instances())
            .collect::<BTreeSet<_>>();
        self.svs
            .iter()
            .enumerate()
            .flat_map(|(sv_index, sv)| {
                let removed_count = self
                    .removed_replicas
                    .range(SvInstance::new(sv_index, 0)..SvInstance::new(sv_index + 1, 0))
                    .count();
                (0..sv.replication_count + removed_count)
                    .map(move |replica| SvInstance::new(sv_index, replica))
            })
            .filter(|x| !self.removed_replicas.contains(x) && !chained.contains(x))
            .collect()
    }

    pub fn is_fully_chained(&self) -> bool {
        !self.chains.is_empty() && self.unchained_svs().is_empty()
    }

    /// First chain containing any instance of the SV
    pub fn find_chain(&self, sv_index: usize) -> Option<&Chain> {
        self.chains.iter().find(|x| x.has_sv(sv_index))
    }

    pub fn chain_metrics(&self) -> ChainMetrics {
        let mut metrics = ChainMetrics::default();
        for chain in self.chains.iter() {
            metrics.merge(&chain.metrics());
        }
        metrics
    }
}

fn validate_svs(svs: &[SvVariant]) -> SimpleResult<()> {
    let mut ids = HashSet::new();
    for sv in svs.iter() {
        if !ids.insert(sv.id.as_str()) {
            bail!("Duplicate SV id '{}'", sv.id);
        }
        let expected_breakend_count = if sv.sv_type.is_single_breakend() { 1 } else { 2 };
        if sv.breakends.len() != expected_breakend_count {
            bail!(
                "SV '{}' of type {} has {} breakends, expected {}",
                sv.id,
                sv.sv_type,
                sv.breakends.len(),
                expected_breakend_count
            );
        }
        if sv.replication_count == 0 {
            bail!("SV '{}' has a replication count of zero", sv.id);
        }
        if sv.ploidy_min > sv.ploidy_max {
            bail!(
                "SV '{}' has ploidy min {} above ploidy max {}",
                sv.id,
                sv.ploidy_min,
                sv.ploidy_max
            );
        }
    }

    for sv in svs.iter() {
        for breakend in sv.breakends.iter() {
            if let Some(partner) = breakend.foldback_partner {
                let partner_exists = svs
                    .get(partner.sv_index)
                    .is_some_and(|x| x.breakend(partner.side).is_some());
                if !partner_exists {
                    bail!("SV '{}' refers to a missing foldback partner breakend", sv.id);
                }
            }
        }
    }
    Ok(())
}

/// Iterate over the sides of an SV which carry a breakend, paired with their ids
pub fn sv_breakend_ids(sv_index: usize, sv: &SvVariant) -> impl Iterator<Item = BreakendId> + '_ {
    sv.sides()
        .iter()
        .map(move |&side: &BreakendSide| BreakendId::new(sv_index, side))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::linked_pair::ChainLink;
    use crate::sv_model::BreakendInstance;
    use crate::sv_model::BreakendSide::{End, Start};
    use crate::test_utils::*;

    #[test]
    fn test_chr_breakend_map_order() {
        let cluster = make_cluster(vec![
            make_sv("A", "1", 500, -1, "1", 900, 1),
            make_sv("B", "1", 100, 1, "2", 300, -1),
        ]);
        let chr1 = cluster.chrom_breakends("1");
        assert_eq!(
            chr1,
            &[
                BreakendId::new(1, Start),
                BreakendId::new(0, Start),
                BreakendId::new(0, End)
            ]
        );
        assert_eq!(cluster.breakend(BreakendId::new(0, End)).chrom_list_index, 2);
        assert_eq!(cluster.chrom_breakends("2").len(), 1);
        assert!(cluster.chrom_breakends("X").is_empty());
    }

    #[test]
    fn test_assembly_links_from_shared_tags() {
        let mut sv_a = make_sv("A", "1", 100, 1, "1", 200, -1);
        let mut sv_b = make_sv("B", "1", 260, 1, "1", 900, -1);
        sv_a.breakends[1].assembly_tags.push("asm1".to_string());
        sv_b.breakends[0].assembly_tags.push("asm1".to_string());
        let cluster = make_cluster(vec![sv_a, sv_b]);

        assert_eq!(cluster.assembly_links().len(), 1);
        let pair = cluster.assembly_links()[0];
        assert_eq!(pair.lower, BreakendId::new(0, End));
        assert_eq!(pair.upper, BreakendId::new(1, Start));
        assert_eq!(pair.length, 60);
        assert!(pair.is_assembled);
        assert!(cluster.breakend(BreakendId::new(1, Start)).is_assembled_link);
    }

    #[test]
    fn test_invalid_svs_rejected() {
        let sv = make_sv("A", "1", 100, 1, "1", 200, -1);
        assert!(Cluster::new(0, vec![sv.clone(), sv.clone()]).is_err());

        let mut zero_rep = sv.clone();
        zero_rep.replication_count = 0;
        assert!(Cluster::new(0, vec![zero_rep]).is_err());

        let mut sgl_with_two = sv;
        sgl_with_two.sv_type = crate::sv_model::SvType::Sgl;
        assert!(Cluster::new(0, vec![sgl_with_two]).is_err());
    }

    #[test]
    fn test_register_duplicate_chain() {
        let mut sv_a = make_sv("A", "1", 100, 1, "1", 200, -1);
        let mut sv_b = make_sv("B", "1", 300, 1, "1", 400, -1);
        sv_a.replication_count = 2;
        sv_b.replication_count = 2;
        let mut cluster = make_cluster(vec![sv_a, sv_b]);

        let pair = LinkedPair::new(BreakendId::new(0, End), BreakendId::new(1, Start), 100);
        let make_chain = |replica| {
            Chain::new(
                0,
                ChainLink::new(
                    BreakendInstance::new(pair.lower, replica),
                    BreakendInstance::new(pair.upper, replica),
                    &pair,
                    LinkReason::SingleOption,
                ),
            )
        };

        cluster.register_chain(make_chain(0), true);
        cluster.register_chain(make_chain(1), true);

        assert_eq!(cluster.chains().len(), 1);
        assert_eq!(cluster.chains()[0].replication_count(), 2);
        assert_eq!(cluster.sv(0).replication_count, 1);
        assert_eq!(cluster.sv(1).replication_count, 1);
        assert!(cluster.is_fully_chained());

        cluster.cache_linked_pairs();
        assert_eq!(cluster.linked_pairs().len(), 1);
        assert_eq!(cluster.linked_pairs()[0].use_count, 1);
        assert_eq!(cluster.find_chain(1).map(|x| x.id), Some(0));
    }

    #[test]
    fn test_fold_middle_replica() {
        let mut sv_a = make_sv("A", "1", 100, 1, "1", 200, -1);
        let mut sv_b = make_sv("B", "1", 300, 1, "1", 400, -1);
        sv_a.replication_count = 3;
        sv_b.replication_count = 2;
        let sv_c = make_sv("C", "1", 10, -1, "1", 50, 1);
        let mut cluster = make_cluster(vec![sv_a, sv_b, sv_c]);

        let ab_pair = LinkedPair::new(BreakendId::new(0, End), BreakendId::new(1, Start), 100);
        let ab_chain = |replica| {
            Chain::new(
                0,
                ChainLink::new(
                    BreakendInstance::new(ab_pair.lower, replica),
                    BreakendInstance::new(ab_pair.upper, replica),
                    &ab_pair,
                    LinkReason::SingleOption,
                ),
            )
        };
        let ca_pair = LinkedPair::new(BreakendId::new(2, End), BreakendId::new(0, Start), 50);
        let ca_chain = Chain::new(
            0,
            ChainLink::new(
                BreakendInstance::new(ca_pair.lower, 0),
                BreakendInstance::new(ca_pair.upper, 2),
                &ca_pair,
                LinkReason::SingleOption,
            ),
        );

        cluster.register_chain(ab_chain(0), true);
        cluster.register_chain(ab_chain(1), true);
        cluster.register_chain(ca_chain, true);

        assert_eq!(cluster.chains().len(), 2);
        assert_eq!(cluster.sv(0).replication_count, 2);
        assert_eq!(cluster.sv(1).replication_count, 1);
        assert!(cluster.unchained_svs().is_empty());
        assert!(cluster.is_fully_chained());

        cluster.clear_chains();
        assert_eq!(cluster.sv(0).replication_count, 3);
        assert_eq!(cluster.sv(1).replication_count, 2);
        assert_eq!(cluster.unchained_svs().len(), 6);
    }
}

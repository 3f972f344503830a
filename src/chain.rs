//! Chains of templated insertion links
//!

use std::collections::BTreeSet;
use std::fmt;

use serde::Serialize;

use crate::linked_pair::{ChainLink, LinkSide};
use crate::sv_model::{BreakendInstance, SvInstance};

/// TIs at or below this length are counted as short
pub const SHORT_TI_LENGTH: i64 = 1000;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ChainEnd {
    Start,
    End,
}

impl ChainEnd {
    pub const BOTH: [ChainEnd; 2] = [ChainEnd::Start, ChainEnd::End];

    pub fn other(&self) -> Self {
        match self {
            ChainEnd::Start => ChainEnd::End,
            ChainEnd::End => ChainEnd::Start,
        }
    }
}

/// Summary counts describing a chain, or all chains of a cluster
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct ChainMetrics {
    pub link_count: usize,
    pub assembled_link_count: usize,
    pub inferred_link_count: usize,
    pub short_ti_count: usize,
    pub total_ti_length: i64,
}

impl ChainMetrics {
    pub fn merge(&mut self, other: &Self) {
        self.link_count += other.link_count;
        self.assembled_link_count += other.assembled_link_count;
        self.inferred_link_count += other.inferred_link_count;
        self.short_ti_count += other.short_ti_count;
        self.total_ti_length += other.total_ti_length;
    }
}

/// An ordered path of links through SV instances
///
/// Consecutive links share one SV instance, entering it through one breakend and leaving
/// through the other. The breakend of the terminal SV instance on each end which is not used by
/// the chain is that end's open breakend.
///
#[derive(Clone)]
pub struct Chain {
    pub id: usize,
    links: Vec<ChainLink>,

    /// Number of identical chains this chain represents
    replication_count: usize,
}

impl Chain {
    pub fn new(id: usize, link: ChainLink) -> Self {
        Self {
            id,
            links: vec![link],
            replication_count: 1,
        }
    }

    pub fn links(&self) -> &[ChainLink] {
        &self.links
    }

    pub fn link_count(&self) -> usize {
        self.links.len()
    }

    pub fn replication_count(&self) -> usize {
        self.replication_count
    }

    pub fn add_replication(&mut self) {
        self.replication_count += 1;
    }

    /// Breakend of the terminal SV instance used by the chain at this end
    pub fn terminal_breakend(&self, end: ChainEnd) -> BreakendInstance {
        match end {
            ChainEnd::Start => self.links[0].first,
            ChainEnd::End => self.links[self.links.len() - 1].second,
        }
    }

    /// Unused breakend of the terminal SV instance at this end
    ///
    /// For a single breakend SV this refers to a breakend which does not exist, so it never
    /// matches any link.
    ///
    pub fn open_breakend(&self, end: ChainEnd) -> BreakendInstance {
        self.terminal_breakend(end).other_side()
    }

    /// Return the side of `link` which can attach to this end of the chain
    ///
    /// Matching is on original breakend identity, so a link built from any replica of the open
    /// breakend's SV matches.
    ///
    pub fn matching_link_side(&self, link: &ChainLink, end: ChainEnd) -> Option<LinkSide> {
        link.side_of(self.open_breakend(end).id())
    }

    /// Extend the chain with `link` at the given end
    ///
    /// The link must already use the chain's open breakend instance at that end.
    ///
    pub fn add_link(&mut self, link: ChainLink, end: ChainEnd) {
        let open = self.open_breakend(end);
        match end {
            ChainEnd::Start => {
                let link = if link.second == open {
                    link
                } else {
                    link.reversed()
                };
                debug_assert_eq!(link.second, open);
                self.links.insert(0, link);
            }
            ChainEnd::End => {
                let link = if link.first == open {
                    link
                } else {
                    link.reversed()
                };
                debug_assert_eq!(link.first, open);
                self.links.push(link);
            }
        }
    }

    /// True if this chain's open breakend at `end` is the breakend used by `other` at `other_end`
    pub fn can_join(&self, end: ChainEnd, other: &Chain, other_end: ChainEnd) -> bool {
        self.open_breakend(end) == other.terminal_breakend(other_end)
    }

    /// Splice all links of `other` onto this chain, given that `can_join` holds for these ends
    pub fn absorb(&mut self, end: ChainEnd, other: Chain, other_end: ChainEnd) {
        let in_order = match end {
            ChainEnd::Start => other_end == ChainEnd::End,
            ChainEnd::End => other_end == ChainEnd::Start,
        };
        let other_links: Vec<ChainLink> = if in_order {
            other.links
        } else {
            other.links.iter().rev().map(|x| x.reversed()).collect()
        };
        match end {
            ChainEnd::Start => {
                self.links.splice(0..0, other_links);
            }
            ChainEnd::End => {
                self.links.extend(other_links);
            }
        }
    }

    pub fn sv_instances(&self) -> BTreeSet<SvInstance> {
        self.links.iter().flat_map(|x| x.sv_instances()).collect()
    }

    pub fn has_sv(&self, sv_index: usize) -> bool {
        self.links
            .iter()
            .any(|x| x.first.sv.sv_index == sv_index || x.second.sv.sv_index == sv_index)
    }

    /// True if every SV instance in the chain is a replica
    pub fn is_all_replicated(&self) -> bool {
        self.sv_instances().iter().all(|x| x.is_replicated())
    }

    /// True if both chains connect the same original breakends in the same order, read in either
    /// direction
    pub fn is_identical(&self, other: &Chain) -> bool {
        if self.links.len() != other.links.len() {
            return false;
        }
        let link_matches = |a: &ChainLink, b: &ChainLink| a.pair.matches(&b.pair);
        let forward = self
            .links
            .iter()
            .zip(other.links.iter())
            .all(|(a, b)| link_matches(a, b));
        forward
            || self
                .links
                .iter()
                .zip(other.links.iter().rev())
                .all(|(a, b)| link_matches(a, b))
    }

    /// Check that each pair of consecutive links passes through one SV instance
    pub fn is_consistent(&self) -> bool {
        self.links.windows(2).all(|x| {
            let (a, b) = (x[0].second, x[1].first);
            a.sv == b.sv && a.side != b.side
        })
    }

    pub fn metrics(&self) -> ChainMetrics {
        let mut metrics = ChainMetrics::default();
        for link in self.links.iter() {
            metrics.link_count += 1;
            if link.is_assembled() {
                metrics.assembled_link_count += 1;
            } else {
                metrics.inferred_link_count += 1;
            }
            if link.length() <= SHORT_TI_LENGTH {
                metrics.short_ti_count += 1;
            }
            metrics.total_ti_length += link.length();
        }
        metrics
    }
}

impl fmt::Debug for Chain {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "chain({}) links={}", self.id, self.links.len())?;
        if self.replication_count > 1 {
            write!(f, " rep={}", self.replication_count)?;
        }
        Ok(())
    }
}

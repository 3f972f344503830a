//! Templated insertion links between the breakends of two SVs
//!

use std::fmt;

use serde::Serialize;

use crate::sv_model::{BreakendId, BreakendInstance, SvInstance};

/// The chaining rule which selected a link
///
/// Listed in the order the rules are applied.
///
#[derive(
    Clone, Copy, Debug, Eq, PartialEq, Serialize, strum::Display, strum::EnumCount, strum::EnumIter,
)]
pub enum LinkReason {
    /// Assembly-confirmed link
    #[strum(serialize = "ASMB")]
    #[serde(rename = "ASMB")]
    Assembly,

    /// Only candidate for one of its breakends
    #[strum(serialize = "ONLY")]
    #[serde(rename = "ONLY")]
    SingleOption,

    /// Foldback or complex duplication routed twice into the same breakend
    #[strum(serialize = "FB_DUP")]
    #[serde(rename = "FB_DUP")]
    Duplication,

    /// Ploidy-matched breakends adjacent on their chromosome
    #[strum(serialize = "ADJAC")]
    #[serde(rename = "ADJAC")]
    AdjacentMatch,

    #[strum(serialize = "PL_MAT")]
    #[serde(rename = "PL_MAT")]
    PloidyMatch,

    #[strum(serialize = "PL_MAX")]
    #[serde(rename = "PL_MAX")]
    MaxReplication,

    #[strum(serialize = "SHORT")]
    #[serde(rename = "SHORT")]
    Shortest,
}

/// A candidate or assembled templated insertion between two original breakends
///
/// The lower breakend is right-anchored and the upper breakend left-anchored, with the lower
/// position never greater than the upper.
///
#[derive(Clone, Copy, Eq, PartialEq)]
pub struct LinkedPair {
    pub lower: BreakendId,
    pub upper: BreakendId,
    pub length: i64,
    pub is_assembled: bool,
}

impl LinkedPair {
    pub fn new(lower: BreakendId, upper: BreakendId, length: i64) -> Self {
        Self {
            lower,
            upper,
            length,
            is_assembled: false,
        }
    }

    pub fn new_assembled(lower: BreakendId, upper: BreakendId, length: i64) -> Self {
        Self {
            is_assembled: true,
            ..Self::new(lower, upper, length)
        }
    }

    pub fn breakends(&self) -> [BreakendId; 2] {
        [self.lower, self.upper]
    }

    pub fn has_breakend(&self, id: BreakendId) -> bool {
        self.lower == id || self.upper == id
    }

    pub fn other_breakend(&self, id: BreakendId) -> Option<BreakendId> {
        if self.lower == id {
            Some(self.upper)
        } else if self.upper == id {
            Some(self.lower)
        } else {
            None
        }
    }

    pub fn has_sv(&self, sv_index: usize) -> bool {
        self.lower.sv_index == sv_index || self.upper.sv_index == sv_index
    }

    pub fn other_sv(&self, sv_index: usize) -> Option<usize> {
        if self.lower.sv_index == sv_index {
            Some(self.upper.sv_index)
        } else if self.upper.sv_index == sv_index {
            Some(self.lower.sv_index)
        } else {
            None
        }
    }

    /// Breakend used by this pair on the given SV
    pub fn breakend_for_sv(&self, sv_index: usize) -> Option<BreakendId> {
        self.breakends().into_iter().find(|x| x.sv_index == sv_index)
    }

    /// True if both pairs connect the same breakends, in either order
    pub fn matches(&self, other: &LinkedPair) -> bool {
        (self.lower == other.lower && self.upper == other.upper)
            || (self.lower == other.upper && self.upper == other.lower)
    }

    /// True if the two pairs compete for any breakend
    pub fn has_link_clash(&self, other: &LinkedPair) -> bool {
        self.breakends()
            .iter()
            .any(|&x| other.has_breakend(x))
    }

    /// True if the two pairs join the same two SVs through the opposite breakend of each SV
    pub fn opposite_match(&self, other: &LinkedPair) -> bool {
        let same_svs = (self.lower.sv_index == other.lower.sv_index
            && self.upper.sv_index == other.upper.sv_index)
            || (self.lower.sv_index == other.upper.sv_index
                && self.upper.sv_index == other.lower.sv_index);
        if !same_svs {
            return false;
        }
        self.breakends().iter().all(|x| {
            other
                .breakend_for_sv(x.sv_index)
                .is_some_and(|y| y.side != x.side)
        })
    }
}

impl fmt::Debug for LinkedPair {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "pair({:?} & {:?}) {} len={}",
            self.lower,
            self.upper,
            if self.is_assembled { "asmb" } else { "inf" },
            self.length
        )
    }
}

/// Which breakend of a chain link
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum LinkSide {
    First,
    Second,
}

/// A committed templated insertion between two SV instances
///
/// Inside a chain the link is oriented so that `second` shares its SV instance with `first` of
/// the next link.
///
#[derive(Clone, Copy, Eq, PartialEq)]
pub struct ChainLink {
    pub first: BreakendInstance,
    pub second: BreakendInstance,

    /// The originating pair between original breakends
    pub pair: LinkedPair,
    pub reason: LinkReason,
}

impl ChainLink {
    pub fn new(
        first: BreakendInstance,
        second: BreakendInstance,
        pair: &LinkedPair,
        reason: LinkReason,
    ) -> Self {
        Self {
            first,
            second,
            pair: *pair,
            reason,
        }
    }

    pub fn set_breakend(&mut self, side: LinkSide, breakend: BreakendInstance) {
        match side {
            LinkSide::First => self.first = breakend,
            LinkSide::Second => self.second = breakend,
        }
    }

    /// Side of the link using the given original breakend
    pub fn side_of(&self, id: BreakendId) -> Option<LinkSide> {
        if self.first.id() == id {
            Some(LinkSide::First)
        } else if self.second.id() == id {
            Some(LinkSide::Second)
        } else {
            None
        }
    }

    pub fn reversed(&self) -> Self {
        Self {
            first: self.second,
            second: self.first,
            ..*self
        }
    }

    pub fn sv_instances(&self) -> [SvInstance; 2] {
        [self.first.sv, self.second.sv]
    }

    pub fn length(&self) -> i64 {
        self.pair.length
    }

    pub fn is_assembled(&self) -> bool {
        self.pair.is_assembled
    }
}

impl fmt::Debug for ChainLink {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "link({:?} & {:?}) {} len={} reason={}",
            self.first,
            self.second,
            if self.is_assembled() { "asmb" } else { "inf" },
            self.length(),
            self.reason
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sv_model::BreakendSide::{End, Start};

    fn be(sv_index: usize, side: crate::sv_model::BreakendSide) -> BreakendId {
        BreakendId::new(sv_index, side)
    }

    #[test]
    fn test_link_clash() {
        let p1 = LinkedPair::new(be(0, End), be(1, Start), 100);
        let p2 = LinkedPair::new(be(0, End), be(2, Start), 300);
        let p3 = LinkedPair::new(be(2, End), be(3, Start), 300);
        assert!(p1.has_link_clash(&p2));
        assert!(!p1.has_link_clash(&p3));
    }

    #[test]
    fn test_opposite_match() {
        let p1 = LinkedPair::new(be(0, Start), be(1, Start), 100);
        let p2 = LinkedPair::new(be(1, End), be(0, End), 100);
        let p3 = LinkedPair::new(be(0, Start), be(1, End), 100);
        assert!(p1.opposite_match(&p2));
        assert!(p2.opposite_match(&p1));
        assert!(!p1.opposite_match(&p3));
        assert!(!p1.opposite_match(&p1));
    }

    #[test]
    fn test_matches_either_order() {
        let p1 = LinkedPair::new(be(0, End), be(1, Start), 100);
        let p2 = LinkedPair::new(be(1, Start), be(0, End), 100);
        assert!(p1.matches(&p2));
        assert!(p1.other_breakend(be(0, End)) == Some(be(1, Start)));
        assert_eq!(p1.other_sv(1), Some(0));
        assert_eq!(p1.other_sv(4), None);
    }

    #[test]
    fn test_reason_codes() {
        assert_eq!(LinkReason::Assembly.to_string(), "ASMB");
        assert_eq!(LinkReason::Duplication.to_string(), "FB_DUP");
        assert_eq!(LinkReason::MaxReplication.to_string(), "PL_MAX");
    }

    #[test]
    fn test_chain_link_sides() {
        let pair = LinkedPair::new(be(0, End), be(1, Start), 100);
        let link = ChainLink::new(
            BreakendInstance::new(be(1, Start), 1),
            BreakendInstance::new(be(0, End), 0),
            &pair,
            LinkReason::Shortest,
        );
        assert_eq!(link.side_of(be(0, End)), Some(LinkSide::Second));
        assert_eq!(link.side_of(be(0, Start)), None);
        assert_eq!(link.reversed().first.id(), be(0, End));
        assert_eq!(link.reversed().length(), 100);
    }
}

//! Breakend and SV records consumed by the chain finder
//!

use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize, strum::Display)]
#[serde(rename_all = "UPPERCASE")]
#[strum(serialize_all = "UPPERCASE")]
pub enum SvType {
    Del,
    Dup,
    Inv,
    Bnd,
    Ins,
    Sgl,
    /// Breakend inferred from copy number without SV support
    Inf,
}

impl SvType {
    /// True for SV types described by a single breakend
    pub fn is_single_breakend(&self) -> bool {
        matches!(self, SvType::Sgl | SvType::Inf)
    }
}

/// Direction of a breakend
///
/// 'LeftAnchor' means that the sequence to the left side of the breakend is retained, which is
/// orientation +1. A 'LeftAnchor' breakend would correspond to the left side of a simple deletion.
///
/// A templated insertion is always bounded by a 'RightAnchor' breakend on its lower side and a
/// 'LeftAnchor' breakend on its upper side.
///
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, PartialOrd, Ord)]
pub enum BreakendDirection {
    LeftAnchor,
    RightAnchor,
}

impl BreakendDirection {
    pub fn from_orientation(orientation: i8) -> Option<Self> {
        match orientation {
            1 => Some(BreakendDirection::LeftAnchor),
            -1 => Some(BreakendDirection::RightAnchor),
            _ => None,
        }
    }

    pub fn orientation(&self) -> i8 {
        match self {
            BreakendDirection::LeftAnchor => 1,
            BreakendDirection::RightAnchor => -1,
        }
    }
}

/// Which end of its SV a breakend represents
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, PartialOrd, Ord, Serialize)]
pub enum BreakendSide {
    Start,
    End,
}

impl BreakendSide {
    pub const BOTH: [BreakendSide; 2] = [BreakendSide::Start, BreakendSide::End];

    pub fn other(&self) -> Self {
        match self {
            BreakendSide::Start => BreakendSide::End,
            BreakendSide::End => BreakendSide::Start,
        }
    }

    pub fn index(&self) -> usize {
        match self {
            BreakendSide::Start => 0,
            BreakendSide::End => 1,
        }
    }

    pub fn is_start(&self) -> bool {
        *self == BreakendSide::Start
    }
}

/// Identity of an original (non-replicated) breakend within a cluster
#[derive(Clone, Copy, Eq, Hash, PartialEq, PartialOrd, Ord)]
pub struct BreakendId {
    pub sv_index: usize,
    pub side: BreakendSide,
}

impl BreakendId {
    pub fn new(sv_index: usize, side: BreakendSide) -> Self {
        Self { sv_index, side }
    }

    pub fn other_side(&self) -> Self {
        Self::new(self.sv_index, self.side.other())
    }
}

impl fmt::Debug for BreakendId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let side = if self.side.is_start() { "s" } else { "e" };
        write!(f, "{}:{}", self.sv_index, side)
    }
}

/// One logical copy of an SV
///
/// Replica 0 is the original SV, higher replica indices are the additional copies implied by its
/// replication count.
///
#[derive(Clone, Copy, Eq, Hash, PartialEq, PartialOrd, Ord)]
pub struct SvInstance {
    pub sv_index: usize,
    pub replica: usize,
}

impl SvInstance {
    pub fn new(sv_index: usize, replica: usize) -> Self {
        Self {
            sv_index,
            replica,
        }
    }

    pub fn is_replicated(&self) -> bool {
        self.replica > 0
    }
}

impl fmt::Debug for SvInstance {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if self.is_replicated() {
            write!(f, "{}r{}", self.sv_index, self.replica)
        } else {
            write!(f, "{}", self.sv_index)
        }
    }
}

/// A breakend of one specific SV instance
#[derive(Clone, Copy, Eq, Hash, PartialEq, PartialOrd, Ord)]
pub struct BreakendInstance {
    pub sv: SvInstance,
    pub side: BreakendSide,
}

impl BreakendInstance {
    pub fn new(id: BreakendId, replica: usize) -> Self {
        Self {
            sv: SvInstance::new(id.sv_index, replica),
            side: id.side,
        }
    }

    /// Original breakend this instance was replicated from
    pub fn id(&self) -> BreakendId {
        BreakendId::new(self.sv.sv_index, self.side)
    }

    pub fn other_side(&self) -> Self {
        Self {
            sv: self.sv,
            side: self.side.other(),
        }
    }
}

impl fmt::Debug for BreakendInstance {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let side = if self.side.is_start() { "s" } else { "e" };
        write!(f, "{:?}:{}", self.sv, side)
    }
}

/// Allele ploidy of the copy number segments on either side of a breakend
#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Serialize)]
pub struct BreakendAllelePloidy {
    pub major_before: f64,
    pub minor_before: f64,
    pub major_after: f64,
    pub minor_after: f64,
}

#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq, Serialize, strum::Display)]
pub enum ChromosomeArm {
    #[default]
    P,
    Q,
}

/// One end of an SV
#[derive(Clone, Debug)]
pub struct Breakend {
    pub chrom: String,
    pub arm: ChromosomeArm,
    pub position: i64,
    pub dir: BreakendDirection,

    /// Length of breakend homology, used to bound the shortest templated insertion at this breakend
    pub homology_len: i64,

    /// Assembly identifiers shared with the breakends this breakend was assembled to
    pub assembly_tags: Vec<String>,

    /// Set by the cluster when an assembly-confirmed link is found for this breakend
    pub is_assembled_link: bool,

    /// The other breakend of a foldback this breakend takes part in
    pub foldback_partner: Option<BreakendId>,

    pub allele_ploidy: Option<BreakendAllelePloidy>,

    /// Index of the breakend in its chromosome's ordered cluster breakend list, set by the cluster
    pub chrom_list_index: usize,
}

impl Breakend {
    pub fn new(chrom: &str, position: i64, dir: BreakendDirection) -> Self {
        Self {
            chrom: chrom.to_string(),
            arm: ChromosomeArm::default(),
            position,
            dir,
            homology_len: 0,
            assembly_tags: Vec::new(),
            is_assembled_link: false,
            foldback_partner: None,
            allele_ploidy: None,
            chrom_list_index: 0,
        }
    }

    pub fn orientation(&self) -> i8 {
        self.dir.orientation()
    }

    /// Sort key used to order breakends along a chromosome
    ///
    /// At equal positions the right-anchored breakend is listed first.
    ///
    pub fn position_key(&self) -> (i64, i8) {
        (self.position, self.orientation())
    }
}

/// A structural variant with one or two breakends
#[derive(Clone, Debug)]
pub struct SvVariant {
    pub id: String,
    pub sv_type: SvType,

    /// Start breakend, followed by the end breakend for all but single breakend types
    pub breakends: Vec<Breakend>,

    pub ploidy_min: f64,
    pub ploidy_max: f64,

    /// Estimated ploidy of the SV
    pub ploidy: f64,

    /// Number of copies of the SV available for chaining, always at least 1
    pub replication_count: usize,
}

impl SvVariant {
    pub fn new(
        id: &str,
        sv_type: SvType,
        breakends: Vec<Breakend>,
        ploidy_min: f64,
        ploidy_max: f64,
    ) -> Self {
        Self {
            id: id.to_string(),
            sv_type,
            breakends,
            ploidy_min,
            ploidy_max,
            ploidy: ((ploidy_min + ploidy_max) / 2.0).round(),
            replication_count: 1,
        }
    }

    pub fn breakend(&self, side: BreakendSide) -> Option<&Breakend> {
        self.breakends.get(side.index())
    }

    /// Sides of this SV which carry a breakend
    pub fn sides(&self) -> &'static [BreakendSide] {
        if self.breakends.len() > 1 {
            &BreakendSide::BOTH
        } else {
            &BreakendSide::BOTH[..1]
        }
    }

    pub fn is_single_breakend(&self) -> bool {
        self.breakends.len() == 1
    }

    pub fn is_foldback(&self) -> bool {
        self.breakends.iter().any(|x| x.foldback_partner.is_some())
    }

    /// True if the breakend on this side forms a foldback
    pub fn is_foldback_breakend(&self, side: BreakendSide) -> bool {
        self.breakend(side)
            .is_some_and(|x| x.foldback_partner.is_some())
    }

    pub fn is_replicated(&self) -> bool {
        self.replication_count > 1
    }
}

//! Cluster fixtures shared by unit tests
//!

use crate::cluster::Cluster;
use crate::sv_model::{
    Breakend, BreakendAllelePloidy, BreakendDirection, BreakendId, BreakendSide, SvType, SvVariant,
};

pub fn make_breakend(chrom: &str, position: i64, orientation: i8) -> Breakend {
    let dir = BreakendDirection::from_orientation(orientation).unwrap();
    Breakend::new(chrom, position, dir)
}

/// Two-breakend SV with ploidy 1, typed from its breakend layout
pub fn make_sv(
    id: &str,
    chrom1: &str,
    pos1: i64,
    orient1: i8,
    chrom2: &str,
    pos2: i64,
    orient2: i8,
) -> SvVariant {
    let sv_type = if chrom1 != chrom2 {
        SvType::Bnd
    } else if orient1 == orient2 {
        SvType::Inv
    } else if orient1 == 1 {
        SvType::Del
    } else {
        SvType::Dup
    };
    let breakends = vec![
        make_breakend(chrom1, pos1, orient1),
        make_breakend(chrom2, pos2, orient2),
    ];
    SvVariant::new(id, sv_type, breakends, 1.0, 1.0)
}

pub fn make_sgl(id: &str, chrom: &str, pos: i64, orient: i8) -> SvVariant {
    let breakends = vec![make_breakend(chrom, pos, orient)];
    SvVariant::new(id, SvType::Sgl, breakends, 1.0, 1.0)
}

pub fn make_cluster(svs: Vec<SvVariant>) -> Cluster {
    make_cluster_with_id(0, svs)
}

pub fn make_cluster_with_id(id: usize, svs: Vec<SvVariant>) -> Cluster {
    Cluster::new(id, svs).unwrap()
}

/// Set the replication count and ploidy of an SV together
pub fn set_replication(sv: &mut SvVariant, replication_count: usize) {
    let ploidy = replication_count as f64;
    sv.replication_count = replication_count;
    sv.ploidy = ploidy;
    sv.ploidy_min = ploidy;
    sv.ploidy_max = ploidy;
}

/// Make two breakends foldback partners of each other
pub fn set_foldback_partners(svs: &mut [SvVariant], first: BreakendId, second: BreakendId) {
    svs[first.sv_index].breakends[first.side.index()].foldback_partner = Some(second);
    svs[second.sv_index].breakends[second.side.index()].foldback_partner = Some(first);
}

pub fn add_assembly_tag(sv: &mut SvVariant, side: BreakendSide, tag: &str) {
    sv.breakends[side.index()].assembly_tags.push(tag.to_string());
}

/// Four single breakends on chromosome 1, where the segment between the third and fourth breakend
/// carries almost no cluster allele ploidy
///
/// In position order: 'a1' at 100(-), 'B' at 300(+), 'D' at 500(-) and 'C' at 700(+).
///
pub fn make_allele_ploidy_barrier_cluster() -> Cluster {
    let ap = |minor_before, minor_after| BreakendAllelePloidy {
        major_before: 1.0,
        minor_before,
        major_after: 1.0,
        minor_after,
    };
    let mut svs = vec![
        make_sgl("a1", "1", 100, -1),
        make_sgl("B", "1", 300, 1),
        make_sgl("D", "1", 500, -1),
        make_sgl("C", "1", 700, 1),
    ];
    svs[0].breakends[0].allele_ploidy = Some(ap(0.0, 1.0));
    svs[1].breakends[0].allele_ploidy = Some(ap(1.0, 1.0));
    svs[2].breakends[0].allele_ploidy = Some(ap(1.0, 0.05));
    svs[3].breakends[0].allele_ploidy = Some(ap(0.05, 1.0));
    make_cluster(svs)
}

//! Allele ploidy segmentation of the chromosomes spanned by a cluster
//!
//! Each cluster breakend starts a segment running to the next breakend on the chromosome.
//! Breakends close together form runs, and within a run the allele ploidy unaffected by the
//! cluster ("A") and the lowest other allele ploidy ("B") are estimated, which leaves the ploidy
//! contributed by the cluster itself on each segment. Chaining cannot pass through a segment
//! where almost nothing of the cluster remains.
//!

use std::collections::BTreeMap;

use log::debug;

use crate::cluster::Cluster;
use crate::sv_model::{BreakendAllelePloidy, BreakendId};

/// Allele ploidy values this close to an integer are treated as integral
const PLOIDY_INTEGER_TOLERANCE: f64 = 0.25;

/// Fraction of a run's breakends which must share the fixed allele ploidy for the run to be valid
const FIXED_PLOIDY_MIN_FRACTION: f64 = 0.9;

/// Segments with a cluster allele ploidy below this cannot be spanned by a templated insertion
pub const MIN_CLUSTER_ALLELE_PLOIDY: f64 = 0.15;

/// Allele ploidy estimates for the segment following one breakend
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SegmentPloidy {
    pub major: f64,
    pub minor: f64,

    /// Allele ploidy unaffected by the cluster in this run
    pub fixed_a: f64,

    /// Lowest ploidy of the allele carrying the cluster, outside of the cluster's own contribution
    pub non_disrupted_b: f64,

    /// Ploidy contributed by the cluster on this segment
    pub cluster: f64,

    pub valid: bool,
}

pub struct AllelePloidyTable {
    segments: BTreeMap<String, Vec<SegmentPloidy>>,
    valid_segment_perc: f64,
}

impl AllelePloidyTable {
    #[cfg(test)]
    pub fn segments(&self, chrom: &str) -> Option<&[SegmentPloidy]> {
        self.segments.get(chrom).map(|x| x.as_slice())
    }

    pub fn valid_segment_perc(&self) -> f64 {
        self.valid_segment_perc
    }

    /// True if the segment after the breakend at `segment_index` is valid and carries too little
    /// cluster ploidy to be spanned
    pub fn is_low_cluster_ploidy(&self, chrom: &str, segment_index: usize) -> bool {
        self.segments
            .get(chrom)
            .and_then(|x| x.get(segment_index))
            .is_some_and(|x| x.valid && x.cluster < MIN_CLUSTER_ALLELE_PLOIDY)
    }
}

fn is_close_to_integer(ploidy: f64) -> bool {
    (ploidy - ploidy.round()).abs() <= PLOIDY_INTEGER_TOLERANCE
}

pub fn compute_allele_ploidy_segments(cluster: &Cluster, proximity_distance: i64) -> AllelePloidyTable {
    let mut segments = BTreeMap::new();
    let mut total_count = 0;
    let mut valid_count = 0;

    for (chrom, breakend_list) in cluster.chr_breakend_map().iter() {
        let chrom_segments = compute_chrom_segments(cluster, breakend_list, proximity_distance);
        for (index, segment) in chrom_segments.iter().enumerate().filter(|(_, x)| x.valid) {
            debug!(
                "cluster({}) chr({chrom}) segment({index}): A({}) B({}) cluster({:.2})",
                cluster.id, segment.fixed_a, segment.non_disrupted_b, segment.cluster
            );
        }
        total_count += chrom_segments.len();
        valid_count += chrom_segments.iter().filter(|x| x.valid).count();
        segments.insert(chrom.clone(), chrom_segments);
    }

    let valid_segment_perc = if total_count > 0 {
        valid_count as f64 / total_count as f64
    } else {
        0.0
    };

    debug!(
        "cluster({}) allele ploidy segments: {valid_count} of {total_count} valid",
        cluster.id
    );

    AllelePloidyTable {
        segments,
        valid_segment_perc,
    }
}

fn compute_chrom_segments(
    cluster: &Cluster,
    breakend_list: &[BreakendId],
    proximity_distance: i64,
) -> Vec<SegmentPloidy> {
    let allele_ploidies = breakend_list
        .iter()
        .map(|&x| cluster.breakend(x).allele_ploidy)
        .collect::<Vec<_>>();

    let mut segments = allele_ploidies
        .iter()
        .map(|x| match x {
            Some(ap) => SegmentPloidy {
                major: ap.major_after,
                minor: ap.minor_after,
                ..Default::default()
            },
            None => SegmentPloidy::default(),
        })
        .collect::<Vec<_>>();

    // Runs of breakends with allele ploidy data and no large gap between neighbors
    let mut run_start = None;
    for index in 0..breakend_list.len() {
        if allele_ploidies[index].is_none() {
            continue;
        }
        let start = *run_start.get_or_insert(index);

        let is_run_end = match breakend_list.get(index + 1) {
            Some(&next_id) => {
                let gap = cluster.breakend(next_id).position
                    - cluster.breakend(breakend_list[index]).position;
                allele_ploidies[index + 1].is_none() || gap > proximity_distance
            }
            None => true,
        };

        if is_run_end {
            set_run_ploidies(cluster, &breakend_list[start..=index], &mut segments[start..=index]);
            run_start = None;
        }
    }
    segments
}

/// Modal rounded allele ploidy over a run, with the count supporting it
///
/// Minor values are counted only where they round differently from the major value. Ties go to
/// the lower ploidy.
///
fn modal_allele_ploidy(segments: &[SegmentPloidy]) -> (i64, usize) {
    let mut counts: BTreeMap<i64, usize> = BTreeMap::new();
    for segment in segments.iter() {
        let major = segment.major.round() as i64;
        let minor = segment.minor.round() as i64;
        *counts.entry(major).or_default() += 1;
        if minor != major {
            *counts.entry(minor).or_default() += 1;
        }
    }

    let mut modal = (0, 0);
    for (&ploidy, &count) in counts.iter() {
        if count > modal.1 {
            modal = (ploidy, count);
        }
    }
    modal
}

/// Fill in A, B and cluster ploidy for one run of breakends
fn set_run_ploidies(cluster: &Cluster, run: &[BreakendId], segments: &mut [SegmentPloidy]) {
    let (fixed_a, a_count) = modal_allele_ploidy(segments);
    if (a_count as f64) < FIXED_PLOIDY_MIN_FRACTION * segments.len() as f64 {
        return;
    }
    let fixed_a = fixed_a as f64;

    // The run start is bounded by the segment before its first breakend
    let start_id = run[0];
    let start_breakend = cluster.breakend(start_id);
    let start_cluster_ploidy = if start_breakend.orientation() == 1 {
        cluster.sv(start_id.sv_index).ploidy
    } else {
        0.0
    };

    let mut non_disrupted_b = start_breakend
        .allele_ploidy
        .and_then(|ap: BreakendAllelePloidy| {
            if is_close_to_integer(ap.major_before) && ap.major_before.round() == fixed_a {
                Some(ap.minor_before - start_cluster_ploidy)
            } else if is_close_to_integer(ap.minor_before) && ap.minor_before.round() == fixed_a {
                Some(ap.major_before - start_cluster_ploidy)
            } else {
                None
            }
        });

    let end_id = run[run.len() - 1];
    let end_cluster_ploidy = if cluster.breakend(end_id).orientation() == -1 {
        cluster.sv(end_id.sv_index).ploidy
    } else {
        0.0
    };

    let last_index = segments.len() - 1;
    for (index, segment) in segments.iter().enumerate() {
        let major = segment.major.round();
        let minor = segment.minor.round();
        let other_allele = if major == fixed_a {
            Some(minor)
        } else if minor == fixed_a {
            Some(major)
        } else {
            None
        };
        if let Some(mut other_allele) = other_allele {
            if index == last_index {
                other_allele -= end_cluster_ploidy;
            }
            non_disrupted_b = Some(non_disrupted_b.map_or(other_allele, |x| x.min(other_allele)));
        }
    }
    let non_disrupted_b = non_disrupted_b.unwrap_or(0.0).max(0.0);

    for segment in segments.iter_mut() {
        let cluster_allele = if segment.major > fixed_a + 0.5 {
            segment.major
        } else {
            segment.minor
        };
        segment.fixed_a = fixed_a;
        segment.non_disrupted_b = non_disrupted_b;
        segment.cluster = (cluster_allele - non_disrupted_b).max(0.0);
        segment.valid = true;
    }
}

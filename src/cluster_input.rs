//! Read SV clusters from the JSON cluster file
//!

use std::collections::{HashMap, HashSet};
use std::fs::File;
use std::io::{BufReader, Read};

use camino::Utf8Path;
use log::info;
use serde::Deserialize;
use simple_error::{SimpleResult, bail, try_with};

use crate::cluster::Cluster;
use crate::sv_model::{
    Breakend, BreakendAllelePloidy, BreakendDirection, BreakendId, BreakendSide, ChromosomeArm,
    SvType, SvVariant,
};

#[derive(Deserialize)]
struct ClusterFileInput {
    clusters: Vec<ClusterInput>,
}

#[derive(Deserialize)]
struct ClusterInput {
    id: usize,
    svs: Vec<SvInput>,
}

#[derive(Deserialize)]
struct FoldbackPartnerInput {
    sv_id: String,
    is_start: bool,
}

#[derive(Deserialize)]
struct BreakendInput {
    chrom: String,

    #[serde(default)]
    arm: ChromosomeArm,

    position: i64,

    /// +1 if sequence to the left of the breakend is retained, -1 for the right
    orientation: i8,

    #[serde(default)]
    homology_len: i64,

    /// Assembly tags shared with the breakends this breakend assembled to
    #[serde(default)]
    assembly_links: Vec<String>,

    foldback_partner: Option<FoldbackPartnerInput>,

    allele_ploidy: Option<BreakendAllelePloidy>,
}

fn default_replication_count() -> usize {
    1
}

#[derive(Deserialize)]
struct SvInput {
    id: String,
    sv_type: SvType,
    ploidy_min: f64,
    ploidy_max: f64,

    /// Implied ploidy, the rounded mean of min and max when absent
    ploidy: Option<f64>,

    #[serde(default = "default_replication_count")]
    replication_count: usize,

    start: BreakendInput,
    end: Option<BreakendInput>,
}

fn convert_breakend(
    sv_id: &str,
    input: &BreakendInput,
    sv_indices: &HashMap<&str, usize>,
) -> SimpleResult<Breakend> {
    let dir = match BreakendDirection::from_orientation(input.orientation) {
        Some(x) => x,
        None => bail!(
            "SV '{sv_id}' has breakend orientation {}, expected 1 or -1",
            input.orientation
        ),
    };
    if input.position < 0 {
        bail!("SV '{sv_id}' has negative breakend position {}", input.position);
    }

    let mut breakend = Breakend::new(&input.chrom, input.position, dir);
    breakend.arm = input.arm;
    breakend.homology_len = input.homology_len;
    breakend.assembly_tags = input.assembly_links.clone();
    breakend.allele_ploidy = input.allele_ploidy;
    if let Some(partner) = &input.foldback_partner {
        let partner_index = match sv_indices.get(partner.sv_id.as_str()) {
            Some(&x) => x,
            None => bail!(
                "SV '{sv_id}' has foldback partner '{}' which is not in the cluster",
                partner.sv_id
            ),
        };
        let side = if partner.is_start {
            BreakendSide::Start
        } else {
            BreakendSide::End
        };
        breakend.foldback_partner = Some(BreakendId::new(partner_index, side));
    }
    Ok(breakend)
}

fn convert_sv(input: &SvInput, sv_indices: &HashMap<&str, usize>) -> SimpleResult<SvVariant> {
    let mut breakends = vec![convert_breakend(&input.id, &input.start, sv_indices)?];
    if let Some(end) = &input.end {
        breakends.push(convert_breakend(&input.id, end, sv_indices)?);
    }

    let mut sv = SvVariant::new(
        &input.id,
        input.sv_type,
        breakends,
        input.ploidy_min,
        input.ploidy_max,
    );
    if let Some(ploidy) = input.ploidy {
        sv.ploidy = ploidy;
    }
    sv.replication_count = input.replication_count;
    Ok(sv)
}

fn convert_cluster(input: &ClusterInput) -> SimpleResult<Cluster> {
    let mut sv_indices = HashMap::new();
    for (sv_index, sv) in input.svs.iter().enumerate() {
        if sv_indices.insert(sv.id.as_str(), sv_index).is_some() {
            bail!("Cluster {} has duplicate SV id '{}'", input.id, sv.id);
        }
    }

    let svs = input
        .svs
        .iter()
        .map(|x| convert_sv(x, &sv_indices))
        .collect::<SimpleResult<Vec<_>>>()?;

    let cluster = try_with!(
        Cluster::new(input.id, svs),
        "Invalid SV input in cluster {}",
        input.id
    );
    Ok(cluster)
}

/// Parse all clusters from a JSON cluster document
pub fn parse_clusters<R: Read>(reader: R) -> SimpleResult<Vec<Cluster>> {
    let file_input: ClusterFileInput =
        try_with!(serde_json::from_reader(reader), "Unable to parse cluster json");

    let mut cluster_ids = HashSet::new();
    let mut clusters = Vec::new();
    for cluster_input in file_input.clusters.iter() {
        if !cluster_ids.insert(cluster_input.id) {
            bail!("Duplicate cluster id {}", cluster_input.id);
        }
        clusters.push(convert_cluster(cluster_input)?);
    }
    Ok(clusters)
}

/// Read all clusters from the JSON cluster file
pub fn read_cluster_file(filename: &Utf8Path) -> SimpleResult<Vec<Cluster>> {
    info!("Reading clusters from file: '{filename}'");

    let file = try_with!(
        File::open(filename),
        "Unable to open cluster json file: '{filename}'"
    );
    let clusters = try_with!(
        parse_clusters(BufReader::new(file)),
        "Unable to read clusters from file: '{filename}'"
    );

    let sv_count = clusters.iter().map(|x| x.svs().len()).sum::<usize>();
    info!("Read {} clusters with {sv_count} SVs", clusters.len());
    Ok(clusters)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sv_model::BreakendSide::{End, Start};
    use approx::assert_ulps_eq;

    const FOLDBACK_JSON: &str = r#"{
        "clusters": [
            {
                "id": 7,
                "svs": [
                    {
                        "id": "E",
                        "sv_type": "INV",
                        "ploidy_min": 0.8,
                        "ploidy_max": 1.3,
                        "start": {
                            "chrom": "1",
                            "position": 1000,
                            "orientation": -1,
                            "foldback_partner": { "sv_id": "E", "is_start": false }
                        },
                        "end": {
                            "chrom": "1",
                            "position": 1100,
                            "orientation": -1,
                            "foldback_partner": { "sv_id": "E", "is_start": true }
                        }
                    },
                    {
                        "id": "F",
                        "sv_type": "BND",
                        "ploidy_min": 1.8,
                        "ploidy_max": 2.2,
                        "ploidy": 2.0,
                        "replication_count": 2,
                        "start": {
                            "chrom": "2",
                            "arm": "Q",
                            "position": 500,
                            "orientation": 1,
                            "homology_len": 12,
                            "assembly_links": ["asm1"]
                        },
                        "end": {
                            "chrom": "1",
                            "position": 2000,
                            "orientation": 1,
                            "allele_ploidy": {
                                "major_before": 2.0,
                                "minor_before": 1.0,
                                "major_after": 2.0,
                                "minor_after": 0.0
                            }
                        }
                    },
                    {
                        "id": "S",
                        "sv_type": "SGL",
                        "ploidy_min": 1.0,
                        "ploidy_max": 1.0,
                        "start": { "chrom": "3", "position": 50, "orientation": 1 }
                    }
                ]
            }
        ]
    }"#;

    fn parse_str(json: &str) -> SimpleResult<Vec<Cluster>> {
        parse_clusters(json.as_bytes())
    }

    #[test]
    fn test_parse_cluster_file() {
        let clusters = parse_str(FOLDBACK_JSON).unwrap();
        assert_eq!(clusters.len(), 1);
        let cluster = &clusters[0];
        assert_eq!(cluster.id, 7);
        assert_eq!(cluster.svs().len(), 3);
        assert_eq!(cluster.foldbacks(), &[0]);
        assert_eq!(cluster.sv_instance_count(), 4);

        let sv_e = cluster.sv(0);
        assert_ulps_eq!(sv_e.ploidy, 1.0);
        assert_eq!(sv_e.replication_count, 1);
        assert_eq!(
            sv_e.breakends[0].foldback_partner,
            Some(BreakendId::new(0, End))
        );

        let sv_f = cluster.sv(1);
        assert_eq!(sv_f.replication_count, 2);
        assert_ulps_eq!(sv_f.ploidy, 2.0);
        let f_start = cluster.breakend(BreakendId::new(1, Start));
        assert_eq!(f_start.arm, ChromosomeArm::Q);
        assert_eq!(f_start.dir, BreakendDirection::LeftAnchor);
        assert_eq!(f_start.homology_len, 12);
        assert_eq!(f_start.assembly_tags, vec!["asm1".to_string()]);
        let f_end = cluster.breakend(BreakendId::new(1, End));
        assert_ulps_eq!(f_end.allele_ploidy.unwrap().minor_before, 1.0);

        assert!(cluster.sv(2).is_single_breakend());
    }

    #[test]
    fn test_reject_bad_orientation() {
        let json = FOLDBACK_JSON.replace(
            r#""position": 50, "orientation": 1 }"#,
            r#""position": 50, "orientation": 0 }"#,
        );
        let err = parse_str(&json).err().unwrap();
        assert!(err.as_str().contains("orientation 0"));
    }

    #[test]
    fn test_reject_missing_foldback_partner() {
        let json = FOLDBACK_JSON.replace(
            r#""sv_id": "E", "is_start": true"#,
            r#""sv_id": "X", "is_start": true"#,
        );
        let err = parse_str(&json).err().unwrap();
        assert!(err.as_str().contains("foldback partner 'X'"));
    }

    #[test]
    fn test_reject_duplicate_cluster() {
        let json = r#"{ "clusters": [ { "id": 1, "svs": [] }, { "id": 1, "svs": [] } ] }"#;
        assert!(parse_str(json).is_err());
        let json = r#"{ "clusters": [ { "id": 1, "svs": [] }, { "id": 2, "svs": [] } ] }"#;
        assert_eq!(parse_str(json).unwrap().len(), 2);
    }

    #[test]
    fn test_reject_sgl_with_end() {
        let json = FOLDBACK_JSON.replace(
            r#""start": { "chrom": "3", "position": 50, "orientation": 1 }"#,
            r#""start": { "chrom": "3", "position": 50, "orientation": 1 },
                        "end": { "chrom": "3", "position": 90, "orientation": -1 }"#,
        );
        let err = parse_str(&json).err().unwrap();
        assert!(err.as_str().contains("cluster 7"));
    }
}

use serde::{Deserialize, Serialize};

use crate::sv_model::Breakend;

/// Default shortest templated insertion which can be inferred between two breakends
pub const MIN_TEMPLATED_INSERTION_LENGTH: i64 = 30;

/// Source of the minimum templated insertion length allowed between two facing breakends
pub trait MinTiLength: Sync {
    fn min_length(&self, lower: &Breakend, upper: &Breakend) -> i64;
}

/// Minimum TI length from a fixed floor, raised to cover the longer breakend homology
#[derive(Clone, Copy, Debug, Deserialize, Serialize)]
pub struct HomologyTiLength {
    pub base_length: i64,
}

impl Default for HomologyTiLength {
    fn default() -> Self {
        Self {
            base_length: MIN_TEMPLATED_INSERTION_LENGTH,
        }
    }
}

impl MinTiLength for HomologyTiLength {
    fn min_length(&self, lower: &Breakend, upper: &Breakend) -> i64 {
        self.base_length
            .max(lower.homology_len)
            .max(upper.homology_len)
    }
}

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::validate::{check_finite, FieldError, Validate};

pub const FORCE_WEIGHTS: [(&str, f64); 5] = [
    ("supplier", 1.0),
    ("buyer", 1.0),
    ("rivalry", 1.0),
    ("substitutes", 1.0),
    ("new_entrants", 1.0),
];

/// Force name to intensity. Keys outside [`FORCE_WEIGHTS`] are kept but not scored.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ForceIntensities(pub BTreeMap<String, f64>);

impl Validate for ForceIntensities {
    fn collect_errors(&self, prefix: &str, errors: &mut Vec<FieldError>) {
        for (force, value) in &self.0 {
            check_finite(prefix, force, *value, errors);
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ForcesScore {
    pub per_force: ForceIntensities,
    pub overall: f64,
}

pub fn forces_index(inputs: ForceIntensities) -> ForcesScore {
    let total: f64 = FORCE_WEIGHTS.iter().map(|(_, w)| w).sum();
    let intensity = |force: &str| inputs.0.get(force).copied().unwrap_or(0.0);
    let weighted: f64 = FORCE_WEIGHTS
        .iter()
        .map(|(force, weight)| intensity(force) * weight)
        .sum();
    // Huge finite inputs overflow the plain sum; scale each term first instead.
    let overall = if weighted.is_finite() {
        weighted / total
    } else {
        FORCE_WEIGHTS
            .iter()
            .map(|(force, weight)| intensity(force) * (weight / total))
            .sum()
    };
    ForcesScore {
        per_force: inputs,
        overall,
    }
}

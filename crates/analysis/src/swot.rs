use serde::{Deserialize, Serialize};

use crate::validate::{FieldError, Validate};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Swot {
    pub strengths: Vec<String>,
    pub weaknesses: Vec<String>,
    pub opportunities: Vec<String>,
    pub threats: Vec<String>,
}

impl Validate for Swot {
    // any list of strings is acceptable
    fn collect_errors(&self, _prefix: &str, _errors: &mut Vec<FieldError>) {}
}

pub fn build_swot(swot: Swot) -> Swot {
    swot
}

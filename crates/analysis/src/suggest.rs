//! Rule-based SWOT suggestions derived from market growth, BCG positions and
//! the company/industry labels.
//!
//! The output is deterministic: the same request always yields the same lists.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::bcg::{is_high_growth, is_leader, relative_market_share, BcgPoint, Quadrant};
use crate::swot::Swot;
use crate::validate::{
    check_finite, check_fraction, check_max_len, check_name, FieldError, Validate,
};

pub const MAX_ITEMS_PER_LIST: usize = 8;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketContext {
    pub name: String,
    pub growth_rate: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductContext {
    pub name: String,
    pub market_share: f64,
    pub largest_rival_share: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SuggestSwotRequest {
    #[serde(default)]
    pub company: Option<String>,
    #[serde(default)]
    pub industry: Option<String>,
    #[serde(default)]
    pub markets: Vec<MarketContext>,
    #[serde(default)]
    pub products: Vec<ProductContext>,
    /// Precomputed positions; when non-empty these replace the products.
    #[serde(default)]
    pub points: Option<Vec<BcgPoint>>,
}

impl Validate for MarketContext {
    fn collect_errors(&self, prefix: &str, errors: &mut Vec<FieldError>) {
        check_name(prefix, "name", &self.name, errors);
        check_finite(prefix, "growth_rate", self.growth_rate, errors);
    }
}

impl Validate for ProductContext {
    fn collect_errors(&self, prefix: &str, errors: &mut Vec<FieldError>) {
        check_name(prefix, "name", &self.name, errors);
        check_fraction(prefix, "market_share", self.market_share, errors);
        check_fraction(prefix, "largest_rival_share", self.largest_rival_share, errors);
    }
}

impl Validate for SuggestSwotRequest {
    fn collect_errors(&self, _prefix: &str, errors: &mut Vec<FieldError>) {
        check_max_len("", "company", self.company.as_deref(), errors);
        check_max_len("", "industry", self.industry.as_deref(), errors);
        self.markets.collect_errors("markets", errors);
        self.products.collect_errors("products", errors);
        self.points.collect_errors("points", errors);
    }
}

// Blank labels count as absent; others are used verbatim.
fn label(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|s| !s.trim().is_empty())
}

fn synthesize_points(products: &[ProductContext]) -> Vec<BcgPoint> {
    products
        .iter()
        .filter(|p| p.largest_rival_share > 0.0)
        .map(|p| BcgPoint {
            name: p.name.clone(),
            rms: relative_market_share(p.market_share, p.largest_rival_share),
            growth: 0.0,
            quadrant: Quadrant::QuestionMark,
        })
        .collect()
}

/// Trims, drops blanks and case-insensitive repeats, then caps the list length.
pub fn dedup_and_cap(items: Vec<String>) -> Vec<String> {
    let mut seen = HashSet::new();
    items
        .into_iter()
        .filter_map(|item| {
            let trimmed = item.trim();
            let key = trimmed.to_lowercase();
            (!key.is_empty() && seen.insert(key)).then(|| trimmed.to_string())
        })
        .take(MAX_ITEMS_PER_LIST)
        .collect()
}

pub fn suggest_swot(request: &SuggestSwotRequest) -> Swot {
    let mut draft = Swot::default();

    let points = match &request.points {
        Some(points) if !points.is_empty() => points.clone(),
        _ => synthesize_points(&request.products),
    };

    if request.markets.iter().any(|m| is_high_growth(m.growth_rate)) {
        draft
            .opportunities
            .push("High growth market tailwinds".to_string());
    }

    for point in &points {
        match (is_leader(point.rms), is_high_growth(point.growth)) {
            (true, true) => draft
                .strengths
                .push(format!("Leadership in high-growth segment ({})", point.name)),
            (true, false) => draft
                .strengths
                .push(format!("Strong relative share: {}", point.name)),
            (false, true) => draft
                .opportunities
                .push(format!("Gain share in fast-growing {}", point.name)),
            (false, false) => draft
                .weaknesses
                .push(format!("Low relative share: {}", point.name)),
        }
    }

    if let Some(industry) = label(&request.industry) {
        draft
            .opportunities
            .push(format!("Evolving {industry} customer needs"));
        draft
            .threats
            .push(format!("Intense competition in {industry}"));
    }

    if let Some(company) = label(&request.company) {
        draft.strengths.push(format!("Brand equity for {company}"));
    }

    Swot {
        strengths: dedup_and_cap(draft.strengths),
        weaknesses: dedup_and_cap(draft.weaknesses),
        opportunities: dedup_and_cap(draft.opportunities),
        threats: dedup_and_cap(draft.threats),
    }
}

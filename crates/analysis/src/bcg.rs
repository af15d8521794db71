//! Boston Consulting Group growth-share matrix.

use serde::{Deserialize, Serialize};

use crate::validate::{check_finite, check_fraction, check_name, FieldError, Validate};

/// Market growth (percent) at or above which a market counts as high growth.
pub const GROWTH_THRESHOLD: f64 = 10.0;
/// Relative share at or above which a product leads its market.
pub const RMS_THRESHOLD: f64 = 1.0;

const RIVAL_SHARE_FLOOR: f64 = 1e-9;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Quadrant {
    Star,
    #[serde(rename = "Cash Cow")]
    CashCow,
    #[serde(rename = "Question Mark")]
    QuestionMark,
    Dog,
}

impl Quadrant {
    pub fn locate(growth: f64, rms: f64) -> Self {
        match (is_high_growth(growth), is_leader(rms)) {
            (true, true) => Quadrant::Star,
            (false, true) => Quadrant::CashCow,
            (true, false) => Quadrant::QuestionMark,
            (false, false) => Quadrant::Dog,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Quadrant::Star => "Star",
            Quadrant::CashCow => "Cash Cow",
            Quadrant::QuestionMark => "Question Mark",
            Quadrant::Dog => "Dog",
        }
    }
}

pub fn is_high_growth(growth: f64) -> bool {
    growth >= GROWTH_THRESHOLD
}

pub fn is_leader(rms: f64) -> bool {
    rms >= RMS_THRESHOLD
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductInput {
    pub name: String,
    pub market_share: f64,
    pub largest_rival_share: f64,
    /// Percent, e.g. `12` for 12%.
    pub market_growth_rate: f64,
}

impl Validate for ProductInput {
    fn collect_errors(&self, prefix: &str, errors: &mut Vec<FieldError>) {
        check_name(prefix, "name", &self.name, errors);
        check_fraction(prefix, "market_share", self.market_share, errors);
        check_fraction(prefix, "largest_rival_share", self.largest_rival_share, errors);
        check_finite(prefix, "market_growth_rate", self.market_growth_rate, errors);
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BcgPoint {
    pub name: String,
    pub rms: f64,
    pub growth: f64,
    pub quadrant: Quadrant,
}

impl Validate for BcgPoint {
    fn collect_errors(&self, prefix: &str, errors: &mut Vec<FieldError>) {
        check_name(prefix, "name", &self.name, errors);
        check_finite(prefix, "rms", self.rms, errors);
        check_finite(prefix, "growth", self.growth, errors);
    }
}

/// Share divided by the largest rival's share. A zero rival share is floored
/// so the ratio stays finite.
pub fn relative_market_share(market_share: f64, largest_rival_share: f64) -> f64 {
    market_share / largest_rival_share.max(RIVAL_SHARE_FLOOR)
}

pub fn classify_bcg(products: &[ProductInput]) -> Vec<BcgPoint> {
    products
        .iter()
        .map(|p| {
            let rms = relative_market_share(p.market_share, p.largest_rival_share);
            BcgPoint {
                name: p.name.clone(),
                rms,
                growth: p.market_growth_rate,
                quadrant: Quadrant::locate(p.market_growth_rate, rms),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn product(name: &str, share: f64, rival: f64, growth: f64) -> ProductInput {
        ProductInput {
            name: name.to_string(),
            market_share: share,
            largest_rival_share: rival,
            market_growth_rate: growth,
        }
    }

    #[test]
    fn leader_in_fast_market_is_a_star() {
        let points = classify_bcg(&[product("A", 0.4, 0.2, 15.0)]);
        assert_eq!(
            points,
            vec![BcgPoint {
                name: "A".into(),
                rms: 2.0,
                growth: 15.0,
                quadrant: Quadrant::Star,
            }]
        );
        let json = serde_json::to_value(&points).expect("serialize");
        assert_eq!(
            json,
            serde_json::json!([{"name": "A", "rms": 2.0, "growth": 15.0, "quadrant": "Star"}])
        );
    }

    #[test]
    fn thresholds_are_inclusive() {
        let points = classify_bcg(&[
            product("edge", 0.3, 0.3, 10.0),
            product("cow", 0.3, 0.3, 9.99),
            product("question", 0.29, 0.3, 10.0),
            product("dog", 0.29, 0.3, 9.99),
        ]);
        let quadrants: Vec<_> = points.iter().map(|p| p.quadrant).collect();
        assert_eq!(
            quadrants,
            vec![
                Quadrant::Star,
                Quadrant::CashCow,
                Quadrant::QuestionMark,
                Quadrant::Dog,
            ]
        );
    }

    #[test]
    fn zero_rival_share_stays_finite() {
        let points = classify_bcg(&[product("solo", 0.5, 0.0, 3.0)]);
        assert!(points[0].rms.is_finite());
        assert!(points[0].rms > 1e8);
        assert_eq!(points[0].quadrant, Quadrant::CashCow);

        let empty = classify_bcg(&[product("none", 0.0, 0.0, 30.0)]);
        assert_eq!(empty[0].rms, 0.0);
        assert_eq!(empty[0].quadrant, Quadrant::QuestionMark);
    }

    #[test]
    fn preserves_input_order() {
        let names: Vec<_> = classify_bcg(&[
            product("z", 0.1, 0.2, 1.0),
            product("a", 0.1, 0.2, 1.0),
            product("m", 0.1, 0.2, 1.0),
        ])
        .into_iter()
        .map(|p| p.name)
        .collect();
        assert_eq!(names, ["z", "a", "m"]);
    }

    #[test]
    fn quadrant_labels_round_trip_through_serde() {
        for quadrant in [
            Quadrant::Star,
            Quadrant::CashCow,
            Quadrant::QuestionMark,
            Quadrant::Dog,
        ] {
            let json = serde_json::to_string(&quadrant).expect("serialize");
            assert_eq!(json, format!("\"{}\"", quadrant.label()));
        }
    }

    #[test]
    fn rejects_out_of_range_shares() {
        let err = vec![product("A", 1.5, -0.1, 5.0)]
            .validate()
            .expect_err("shares out of range");
        let fields: Vec<_> = err.0.iter().map(|e| e.field.as_str()).collect();
        assert_eq!(fields, ["[0].market_share", "[0].largest_rival_share"]);
    }

    proptest! {
        #[test]
        fn rms_is_plain_ratio_for_positive_rivals(
            share in 0.0f64..=1.0,
            rival in 1e-6f64..=1.0,
            growth in -50.0f64..50.0,
        ) {
            let point = &classify_bcg(&[product("p", share, rival, growth)])[0];
            prop_assert_eq!(point.rms, share / rival);
            prop_assert_eq!(point.growth, growth);
            prop_assert_eq!(point.quadrant, Quadrant::locate(growth, share / rival));
        }
    }
}

use std::fmt;
use std::str::FromStr;

use analysis::validate::{
    check_finite, check_fraction, check_max_len, check_name, check_non_negative, FieldError,
    Validate,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SnapshotKind {
    Swot,
    Bcg,
    Pestle,
    Porter,
    Vrio,
    Ansoff,
}

impl SnapshotKind {
    pub const ALL: [SnapshotKind; 6] = [
        SnapshotKind::Swot,
        SnapshotKind::Bcg,
        SnapshotKind::Pestle,
        SnapshotKind::Porter,
        SnapshotKind::Vrio,
        SnapshotKind::Ansoff,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            SnapshotKind::Swot => "SWOT",
            SnapshotKind::Bcg => "BCG",
            SnapshotKind::Pestle => "PESTLE",
            SnapshotKind::Porter => "PORTER",
            SnapshotKind::Vrio => "VRIO",
            SnapshotKind::Ansoff => "ANSOFF",
        }
    }
}

impl fmt::Display for SnapshotKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SnapshotKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| anyhow::anyhow!("unknown snapshot kind `{s}`"))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewSnapshot {
    pub kind: SnapshotKind,
    /// Stored verbatim; only required to be a JSON object.
    pub payload: Map<String, Value>,
    #[serde(default)]
    pub note: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisSnapshot {
    pub id: Uuid,
    pub kind: SnapshotKind,
    pub payload: Map<String, Value>,
    pub note: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewCompany {
    pub name: String,
    #[serde(default)]
    pub industry: Option<String>,
    #[serde(default)]
    pub region: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Company {
    pub id: Uuid,
    pub name: String,
    pub industry: Option<String>,
    pub region: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewMarket {
    #[serde(default)]
    pub company_id: Option<Uuid>,
    pub name: String,
    /// Percent; negative and very large values are allowed.
    pub growth_rate: f64,
    #[serde(default)]
    pub size: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Market {
    pub id: Uuid,
    pub company_id: Option<Uuid>,
    pub name: String,
    pub growth_rate: f64,
    pub size: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewProduct {
    #[serde(default)]
    pub company_id: Option<Uuid>,
    #[serde(default)]
    pub market_id: Option<Uuid>,
    pub name: String,
    #[serde(default)]
    pub market_share: Option<f64>,
    #[serde(default)]
    pub largest_rival_share: Option<f64>,
    #[serde(default)]
    pub price: Option<f64>,
    #[serde(default)]
    pub revenue: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    pub id: Uuid,
    pub company_id: Option<Uuid>,
    pub market_id: Option<Uuid>,
    pub name: String,
    pub market_share: Option<f64>,
    pub largest_rival_share: Option<f64>,
    pub price: Option<f64>,
    pub revenue: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct SnapshotFilter {
    #[serde(default)]
    pub kind: Option<SnapshotKind>,
    #[serde(default)]
    pub limit: Option<u32>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct CompanyFilter {
    #[serde(default)]
    pub limit: Option<u32>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct MarketFilter {
    #[serde(default)]
    pub company_id: Option<Uuid>,
    #[serde(default)]
    pub limit: Option<u32>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ProductFilter {
    #[serde(default)]
    pub company_id: Option<Uuid>,
    #[serde(default)]
    pub market_id: Option<Uuid>,
    #[serde(default)]
    pub limit: Option<u32>,
}

impl Validate for NewSnapshot {
    fn collect_errors(&self, prefix: &str, errors: &mut Vec<FieldError>) {
        check_max_len(prefix, "note", self.note.as_deref(), errors);
    }
}

impl Validate for NewCompany {
    fn collect_errors(&self, prefix: &str, errors: &mut Vec<FieldError>) {
        check_name(prefix, "name", &self.name, errors);
        check_max_len(prefix, "industry", self.industry.as_deref(), errors);
        check_max_len(prefix, "region", self.region.as_deref(), errors);
    }
}

impl Validate for NewMarket {
    fn collect_errors(&self, prefix: &str, errors: &mut Vec<FieldError>) {
        check_name(prefix, "name", &self.name, errors);
        check_finite(prefix, "growth_rate", self.growth_rate, errors);
        check_non_negative(prefix, "size", self.size, errors);
    }
}

impl Validate for NewProduct {
    fn collect_errors(&self, prefix: &str, errors: &mut Vec<FieldError>) {
        check_name(prefix, "name", &self.name, errors);
        for (name, share) in [
            ("market_share", self.market_share),
            ("largest_rival_share", self.largest_rival_share),
        ] {
            if let Some(share) = share {
                check_fraction(prefix, name, share, errors);
            }
        }
        check_non_negative(prefix, "price", self.price, errors);
        check_non_negative(prefix, "revenue", self.revenue, errors);
    }
}

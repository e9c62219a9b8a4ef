//! Values exchanged with the analytics service.
//!
//! Everything here is an immutable snapshot of something the remote service
//! computed; the client never derives statistics or risk on its own.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{Result, WhosNextError};

/// One attribute value of an employee profile.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttributeValue {
    Number(f64),
    Text(String),
}

/// Whether an attribute is numeric or categorical
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttributeKind {
    Numeric,
    Categorical,
}

impl AttributeValue {
    /// Parse raw operator or CSV input: anything that reads as a number is numeric.
    pub fn parse(raw: &str) -> Self {
        let trimmed = raw.trim();
        match trimmed.parse::<f64>() {
            Ok(n) if n.is_finite() => AttributeValue::Number(n),
            _ => AttributeValue::Text(trimmed.to_string()),
        }
    }

    pub fn kind(&self) -> AttributeKind {
        match self {
            AttributeValue::Number(_) => AttributeKind::Numeric,
            AttributeValue::Text(_) => AttributeKind::Categorical,
        }
    }
}

impl fmt::Display for AttributeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttributeValue::Number(n) if n.fract() == 0.0 && n.abs() < 1e15 => {
                write!(f, "{}", *n as i64)
            }
            AttributeValue::Number(n) => write!(f, "{}", n),
            AttributeValue::Text(s) => f.write_str(s),
        }
    }
}

impl From<f64> for AttributeValue {
    fn from(value: f64) -> Self {
        AttributeValue::Number(value)
    }
}

impl From<&str> for AttributeValue {
    fn from(value: &str) -> Self {
        AttributeValue::Text(value.to_string())
    }
}

/// An employee's baseline profile, as fetched.
pub type EmployeeRecord = BTreeMap<String, AttributeValue>;

/// Sparse "what-if" replacements keyed by attribute name.
pub type OverrideDelta = BTreeMap<String, AttributeValue>;

/// Override-wins merge of a record and a delta. Attributes absent from the
/// delta pass through unchanged.
pub fn merge(record: &EmployeeRecord, delta: &OverrideDelta) -> EmployeeRecord {
    let mut merged = record.clone();
    for (name, value) in delta {
        merged.insert(name.clone(), value.clone());
    }
    merged
}

/// One bar of a breakdown chart.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryCount {
    pub category: String,
    pub count: u64,
}

/// Aggregate statistics for one filter selection, replaced wholesale.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OverviewSnapshot {
    pub kpis: BTreeMap<String, f64>,
    pub breakdowns: BTreeMap<String, Vec<CategoryCount>>,
}

impl OverviewSnapshot {
    pub fn kpi(&self, name: &str) -> Option<f64> {
        self.kpis.get(name).copied()
    }

    pub fn breakdown(&self, dimension: &str) -> &[CategoryCount] {
        self.breakdowns
            .get(dimension)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RiskLevel {
    #[serde(alias = "Low", alias = "low")]
    Low,
    #[serde(alias = "Medium", alias = "medium")]
    Medium,
    #[serde(alias = "High", alias = "high")]
    High,
    #[serde(alias = "Critical", alias = "critical")]
    Critical,
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            RiskLevel::Low => "LOW",
            RiskLevel::Medium => "MEDIUM",
            RiskLevel::High => "HIGH",
            RiskLevel::Critical => "CRITICAL",
        };
        f.write_str(label)
    }
}

/// A factor the scoring service reports as contributing to a prediction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Driver {
    pub factor: String,
    pub magnitude: f64,
    #[serde(alias = "impact")]
    pub qualitative_impact: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionResult {
    pub probability: f64,
    pub risk_level: RiskLevel,
    #[serde(default)]
    pub drivers: Vec<Driver>,
    #[serde(alias = "model")]
    pub model_id: String,
    #[serde(default, alias = "reliability", skip_serializing_if = "Option::is_none")]
    pub reliability_metrics: Option<BTreeMap<String, f64>>,
}

impl PredictionResult {
    /// Reject results the service should never have produced.
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.probability) {
            return Err(WhosNextError::Serialization {
                message: format!(
                    "prediction probability {} outside [0, 1]",
                    self.probability
                ),
            });
        }
        Ok(())
    }
}

/// Natural-language actions explaining one prediction.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RecommendationSet {
    pub actions: Vec<String>,
}

/// What the recommendation endpoint returns: the actions plus the
/// authoritative credit balance after the call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecommendationResponse {
    pub recommendations: Vec<String>,
    #[serde(alias = "remaining")]
    pub remaining_credits: u32,
}

/// Payload for one scoring call. `features` is the record with overrides
/// already merged in.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PredictionRequest {
    pub employee_id: String,
    #[serde(rename = "model")]
    pub model_id: String,
    pub features: EmployeeRecord,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecommendationRequest {
    pub employee_id: String,
    pub probability: f64,
    pub risk_level: RiskLevel,
    pub drivers: Vec<Driver>,
}

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// --- Entities ---

/// A harvested list member. `metric == 0` means "unknown", not "zero".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entity {
    pub id: String,
    pub metric: u64,
}

impl Entity {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            metric: 0,
        }
    }

    pub fn with_metric(id: impl Into<String>, metric: u64) -> Self {
        Self {
            id: id.into(),
            metric,
        }
    }

    pub fn first_digit(&self) -> Option<u8> {
        first_digit(self.metric as i128)
    }
}

/// Per-post engagement counts. Zeros are unknowns, same as `Entity::metric`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostSample {
    pub id: String,
    pub likes: u64,
    pub comments: u64,
}

/// Leading decimal digit of `|value|`; `None` for zero.
pub fn first_digit(value: i128) -> Option<u8> {
    let mut v = value.unsigned_abs();
    if v == 0 {
        return None;
    }
    while v >= 10 {
        v /= 10;
    }
    Some(v as u8)
}

// --- Distributions ---

/// Observed-vs-expected first-digit histogram for one numeric field.
///
/// All maps are empty when `total_samples == 0`; that state means
/// "insufficient data", never "perfect fit".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DigitDistribution {
    pub field: String,
    pub counts: BTreeMap<u8, u64>,
    pub observed_pct: BTreeMap<u8, f64>,
    pub expected_pct: BTreeMap<u8, f64>,
    pub avg_deviation: f64,
    pub chi_squared: f64,
    pub total_samples: u64,
}

impl DigitDistribution {
    pub fn empty(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            counts: BTreeMap::new(),
            observed_pct: BTreeMap::new(),
            expected_pct: BTreeMap::new(),
            avg_deviation: 0.0,
            chi_squared: 0.0,
            total_samples: 0,
        }
    }

    pub fn has_data(&self) -> bool {
        self.total_samples > 0
    }
}

// --- Verdicts ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Verdict {
    Real,
    LikelyReal,
    Suspicious,
    LikelyBot,
    InsufficientData,
}

impl Verdict {
    pub fn as_str(&self) -> &'static str {
        match self {
            Verdict::Real => "REAL",
            Verdict::LikelyReal => "LIKELY_REAL",
            Verdict::Suspicious => "SUSPICIOUS",
            Verdict::LikelyBot => "LIKELY_BOT",
            Verdict::InsufficientData => "INSUFFICIENT_DATA",
        }
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreResult {
    pub score: u32,
    pub max_score: u32,
    pub reasons: Vec<String>,
    pub verdict: Verdict,
}

impl ScoreResult {
    /// `100 * score / max_score`, or `None` when no criterion was evaluated.
    pub fn percentage(&self) -> Option<f64> {
        (self.max_score > 0).then(|| 100.0 * self.score as f64 / self.max_score as f64)
    }
}

// --- Report records ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditMode {
    Followers,
    Engagement,
}

impl AuditMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditMode::Followers => "followers",
            AuditMode::Engagement => "engagement",
        }
    }
}

/// One row of the entity table: `(id, field, metric, firstDigit | "N/A")`.
/// Multi-field runs (likes and comments per post) emit one row per field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityRow {
    pub id: String,
    pub field: String,
    pub metric: u64,
    pub first_digit: String,
}

impl EntityRow {
    pub fn new(entity: &Entity, field: &str) -> Self {
        Self {
            id: entity.id.clone(),
            field: field.to_string(),
            metric: entity.metric,
            first_digit: entity
                .first_digit()
                .map(|d| d.to_string())
                .unwrap_or_else(|| "N/A".to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DigitRow {
    pub digit: u8,
    pub count: u64,
    pub observed_pct: f64,
    pub expected_pct: f64,
    pub deviation_pct: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DistributionTable {
    pub field: String,
    pub rows: Vec<DigitRow>,
    pub avg_deviation: f64,
    pub chi_squared: f64,
    pub total_samples: u64,
    pub verdict: Verdict,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummaryRecord {
    pub run_id: Uuid,
    pub profile_id: String,
    pub mode: AuditMode,
    pub timestamp: DateTime<Utc>,
    /// The audited profile's own metric (e.g. its follower total), when known.
    pub profile_metric: Option<u64>,
    pub total_harvested: usize,
    pub total_analyzed: u64,
    pub score: u32,
    pub max_score: u32,
    pub verdict: Verdict,
    pub reasons: Vec<String>,
    pub termination: String,
    /// Set when a session failure cut the run short; the report is partial.
    pub aborted: Option<String>,
}

/// Everything one audit run hands to the report emitter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    pub summary: SummaryRecord,
    pub entities: Vec<EntityRow>,
    pub distributions: Vec<DistributionTable>,
}

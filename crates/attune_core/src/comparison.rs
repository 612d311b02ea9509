//! Comparison-result value types emitted by the comparison engine.

use serde::{Deserialize, Serialize};

/// Suffix appended to `objective_state` when a baseline was applied.
pub const BASELINE_ADJUSTED_SUFFIX: &str = " (baseline-adjusted)";

/// Subjective-state string used when no recent entry was available.
pub const NO_RECENT_ENTRY: &str = "No recent entry";

/// Marker appended to `fatigue_aus` when the low-expressiveness term fired.
pub const LOW_EXPRESSIVENESS_MARKER: &str = "low-expressiveness";

/// AU-grounded smile classification. Never a discrete emotion label.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SmileType {
    Genuine,
    Social,
    #[default]
    None,
}

impl SmileType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Genuine => "genuine",
            Self::Social => "social",
            Self::None => "none",
        }
    }
}

impl std::fmt::Display for SmileType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// AU-level evidence backing a comparison result.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FacsInsights {
    #[serde(alias = "smile_type")]
    pub smile_type: SmileType,
    #[serde(rename = "tensionAUs", alias = "tension_aus")]
    pub tension_aus: Vec<String>,
    #[serde(rename = "fatigueAUs", alias = "fatigue_aus")]
    pub fatigue_aus: Vec<String>,
    #[serde(rename = "detectedAUs", alias = "detected_aus")]
    pub detected_aus: Vec<String>,
}

/// The calibrated disagreement between reported mood and facial signal.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ComparisonResult {
    /// 0..=100 inclusive, always clamped.
    #[serde(alias = "discrepancy_score")]
    pub discrepancy_score: u8,
    #[serde(alias = "subjective_state")]
    pub subjective_state: String,
    /// Contains `baseline-adjusted` iff a baseline was applied.
    #[serde(alias = "objective_state")]
    pub objective_state: String,
    #[serde(alias = "is_masking_likely")]
    pub is_masking_likely: bool,
    #[serde(alias = "baseline_applied")]
    pub baseline_applied: bool,
    #[serde(alias = "facs_insights")]
    pub facs_insights: FacsInsights,
}

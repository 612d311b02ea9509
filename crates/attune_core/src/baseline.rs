//! Per-user neutral-rest calibration.
//!
//! One baseline is active at a time; saving a new one supersedes the old.
//! A missing baseline is a first-class state, not an error.

use crate::facs::clamp01;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Neutral-rest tension/fatigue/masking levels, subtracted from raw derived
/// signals before comparison.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FacialBaseline {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    #[serde(alias = "neutral_tension")]
    pub neutral_tension: f32,
    #[serde(alias = "neutral_fatigue")]
    pub neutral_fatigue: f32,
    #[serde(alias = "neutral_masking")]
    pub neutral_masking: f32,
}

impl FacialBaseline {
    pub fn new(neutral_tension: f32, neutral_fatigue: f32, neutral_masking: f32) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            neutral_tension: clamp01(neutral_tension),
            neutral_fatigue: clamp01(neutral_fatigue),
            neutral_masking: clamp01(neutral_masking),
        }
    }

    /// A baseline only participates in adjustment when every neutral field
    /// is finite. Deserialized records from older schema versions may not be.
    pub fn is_valid(&self) -> bool {
        self.neutral_tension.is_finite()
            && self.neutral_fatigue.is_finite()
            && self.neutral_masking.is_finite()
    }
}

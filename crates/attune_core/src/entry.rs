//! Subjective self-report types.
//!
//! The journaling layer produces much richer entries; the comparison core
//! reads only mood, the capacity dimensions, and the spoon level. Values are
//! clamped on ingestion, never rejected.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

fn deserialize_mood<'de, D>(deserializer: D) -> Result<u8, D::Error>
where
    D: Deserializer<'de>,
{
    let v = i64::deserialize(deserializer)?;
    Ok(v.clamp(1, 5) as u8)
}

fn deserialize_scale10<'de, D>(deserializer: D) -> Result<u8, D::Error>
where
    D: Deserializer<'de>,
{
    let v = i64::deserialize(deserializer)?;
    Ok(v.clamp(0, 10) as u8)
}

fn default_mood() -> u8 {
    3
}

/// A self-reported mood + capacity snapshot at a point in time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubjectiveEntry {
    /// 1..=5 inclusive; out-of-range input clamps to the boundary.
    #[serde(default = "default_mood", deserialize_with = "deserialize_mood")]
    pub mood: u8,
    /// Opaque to the core; echoed into the comparison result.
    #[serde(default, alias = "mood_label")]
    pub mood_label: String,
    #[serde(default, alias = "neuro_metrics")]
    pub neuro_metrics: NeuroMetrics,
    pub timestamp: DateTime<Utc>,
}

impl SubjectiveEntry {
    pub fn new(mood: i64, mood_label: &str, timestamp: DateTime<Utc>) -> Self {
        Self {
            mood: mood.clamp(1, 5) as u8,
            mood_label: mood_label.to_string(),
            neuro_metrics: NeuroMetrics::default(),
            timestamp,
        }
    }

    /// High reported mood is the precondition for every discrepancy rule.
    pub fn mood_is_high(&self) -> bool {
        self.mood >= 4
    }
}

/// Capacity self-assessment across the seven tracked dimensions.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NeuroMetrics {
    pub capacity: CapacityProfile,
    /// Derived upstream from the capacity profile; the core only reads it.
    #[serde(alias = "spoon_level", deserialize_with = "deserialize_scale10")]
    pub spoon_level: u8,
}

/// Seven capacity dimensions, each 0..=10.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CapacityProfile {
    #[serde(deserialize_with = "deserialize_scale10")]
    pub focus: u8,
    #[serde(deserialize_with = "deserialize_scale10")]
    pub social: u8,
    #[serde(deserialize_with = "deserialize_scale10")]
    pub structure: u8,
    #[serde(deserialize_with = "deserialize_scale10")]
    pub emotional: u8,
    #[serde(deserialize_with = "deserialize_scale10")]
    pub physical: u8,
    #[serde(deserialize_with = "deserialize_scale10")]
    pub sensory: u8,
    #[serde(deserialize_with = "deserialize_scale10")]
    pub executive: u8,
}

//! Detection-quality scoring.
//!
//! The gate is advisory: it never blocks downstream use. Low-quality
//! analyses still flow through comparison and persistence; the report just
//! tells the UI how much to trust the frame and what would improve the next
//! one.

use attune_core::facs::{FacialAnalysis, Severity, CRITICAL_AUS, PRESENCE_THRESHOLD};
use serde::{Deserialize, Serialize};

pub const SUGGEST_LIGHTING: &str =
    "Improve lighting: face the brightest light source and avoid backlighting.";
pub const SUGGEST_POSITIONING: &str =
    "Center your face in the frame and move a little closer to the camera.";
pub const SUGGEST_ENVIRONMENTAL: &str =
    "Remove anything covering part of your face, such as a hand, hair, or a mask.";
pub const SUGGEST_TECHNICAL: &str =
    "Try again with a steadier camera and a clearer view of your face.";

const OBSTRUCTION_KEYWORDS: [&str; 7] = [
    "mask", "glasses", "hand", "hair", "obstruct", "covered", "occlu",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QualityLevel {
    Low,
    Medium,
    High,
}

impl QualityLevel {
    pub fn from_score(score: u8) -> Self {
        match score {
            0..=29 => Self::Low,
            30..=59 => Self::Medium,
            _ => Self::High,
        }
    }
}

/// Advisory reliability report over a canonical analysis.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QualityReport {
    /// 0..=100.
    pub score: u8,
    pub level: QualityLevel,
    /// Always true. The gate advises; it does not gate.
    pub can_proceed: bool,
    /// Deterministic, priority-ordered. Empty when level is high.
    pub suggestions: Vec<String>,
}

/// Number of critical AUs present at the intensity threshold.
fn critical_aus_present(analysis: &FacialAnalysis) -> usize {
    CRITICAL_AUS
        .iter()
        .filter(|code| {
            analysis
                .max_intensity_of(code)
                .is_some_and(|i| i >= PRESENCE_THRESHOLD)
        })
        .count()
}

/// Score detection completeness on 0..=100.
///
/// Weights: 40 for provider confidence, 30 for AU coverage (saturating at
/// eight units), 30 for critical-AU presence (saturating at two).
pub fn assess(analysis: &FacialAnalysis) -> QualityReport {
    let critical_present = critical_aus_present(analysis);

    let confidence_term = 40.0 * f64::from(analysis.confidence.clamp(0.0, 1.0));
    let coverage_term = 30.0 * (analysis.action_units.len() as f64 / 8.0).min(1.0);
    let critical_term = 30.0 * (critical_present as f64 / 2.0).min(1.0);

    let score = (confidence_term + coverage_term + critical_term)
        .round()
        .clamp(0.0, 100.0) as u8;
    let level = QualityLevel::from_score(score);

    let mut suggestions = Vec::new();
    if level != QualityLevel::High {
        if analysis.lighting_severity >= Severity::Moderate {
            suggestions.push(SUGGEST_LIGHTING.to_string());
        }
        if critical_present == 0 {
            suggestions.push(SUGGEST_POSITIONING.to_string());
        }
        let obstructed = analysis.environmental_clues.iter().any(|clue| {
            let lower = clue.to_ascii_lowercase();
            OBSTRUCTION_KEYWORDS.iter().any(|kw| lower.contains(kw))
        });
        if obstructed {
            suggestions.push(SUGGEST_ENVIRONMENTAL.to_string());
        }
        if level == QualityLevel::Low {
            suggestions.push(SUGGEST_TECHNICAL.to_string());
        }
    }

    QualityReport {
        score,
        level,
        can_proceed: true,
        suggestions,
    }
}

//! The comparison engine: subjective self-report vs. derived facial signal.
//!
//! The engine reports that a discrepancy exists and classifies it; it never
//! judges why. All rules are additive with non-negative weights, so
//! evaluation order cannot change the total, and the final score is clamped
//! to 0..=100.

use crate::derive;
use attune_core::comparison::{
    ComparisonResult, FacsInsights, SmileType, BASELINE_ADJUSTED_SUFFIX,
    LOW_EXPRESSIVENESS_MARKER, NO_RECENT_ENTRY,
};
use attune_core::facs::{clamp01, FacialAnalysis, FATIGUE_AUS, TENSION_AUS};
use attune_core::{FacialBaseline, SubjectiveEntry};

/// Rule weights. The objective-state classification follows these: the
/// highest-weighted rule that fired names the state.
const TENSION_RULE_WEIGHT: u32 = 60;
const SOCIAL_SMILE_RULE_WEIGHT: u32 = 50;
const FATIGUE_RULE_WEIGHT: u32 = 40;

const INDICATOR_CAP: usize = 4;
const MASKING_INDICATOR_WEIGHT: u32 = 5;
const FATIGUE_INDICATOR_WEIGHT: u32 = 3;
const TENSION_INDICATOR_WEIGHT: u32 = 3;

/// Thresholds on the baseline-adjusted scalars.
const SIGNAL_THRESHOLD: f32 = 0.3;
const STRONG_TENSION_THRESHOLD: f32 = 0.5;
const LOW_EXPRESSIVENESS_THRESHOLD: f32 = 0.3;

/// Derived signals after baseline adjustment.
#[derive(Debug, Clone, Copy)]
struct AdjustedSignals {
    tension: f32,
    fatigue: f32,
    baseline_applied: bool,
}

fn adjust(analysis: &FacialAnalysis, baseline: Option<&FacialBaseline>) -> AdjustedSignals {
    let tension = derive::tension_score(analysis);
    let fatigue = derive::fatigue_score(analysis);
    match baseline.filter(|b| b.is_valid()) {
        Some(b) => AdjustedSignals {
            tension: clamp01(tension - b.neutral_tension),
            fatigue: clamp01(fatigue - b.neutral_fatigue),
            baseline_applied: true,
        },
        None => AdjustedSignals {
            tension,
            fatigue,
            baseline_applied: false,
        },
    }
}

fn insights(analysis: &FacialAnalysis) -> FacsInsights {
    let detected = derive::detected_aus(analysis);
    let tension_aus = detected
        .iter()
        .filter(|code| TENSION_AUS.iter().any(|t| code.eq_ignore_ascii_case(t)))
        .cloned()
        .collect();
    let mut fatigue_aus: Vec<String> = detected
        .iter()
        .filter(|code| FATIGUE_AUS.iter().any(|f| code.eq_ignore_ascii_case(f)))
        .cloned()
        .collect();
    if derive::low_expressiveness(&analysis.action_units) > LOW_EXPRESSIVENESS_THRESHOLD {
        fatigue_aus.push(LOW_EXPRESSIVENESS_MARKER.to_string());
    }
    FacsInsights {
        smile_type: derive::smile_type(analysis),
        tension_aus,
        fatigue_aus,
        detected_aus: detected,
    }
}

fn objective_state(
    tense_fired: bool,
    social_fired: bool,
    fatigued_fired: bool,
    masking_likely: bool,
    baseline_applied: bool,
) -> String {
    let base = if tense_fired {
        "tense"
    } else if social_fired {
        "masked"
    } else if fatigued_fired {
        "fatigued"
    } else if masking_likely {
        "masked"
    } else {
        "neutral"
    };
    if baseline_applied {
        format!("{}{}", base, BASELINE_ADJUSTED_SUFFIX)
    } else {
        base.to_string()
    }
}

/// Compare a subjective entry against a canonical analysis.
///
/// A missing entry is a first-class state: the result carries a zero score,
/// no masking flag, and insights reduced to the AU-derived smile type.
pub fn compare(
    entry: Option<&SubjectiveEntry>,
    analysis: &FacialAnalysis,
    baseline: Option<&FacialBaseline>,
) -> ComparisonResult {
    let baseline_applied = baseline.is_some_and(FacialBaseline::is_valid);

    let Some(entry) = entry else {
        return ComparisonResult {
            discrepancy_score: 0,
            subjective_state: NO_RECENT_ENTRY.to_string(),
            objective_state: objective_state(false, false, false, false, baseline_applied),
            is_masking_likely: false,
            baseline_applied,
            facs_insights: FacsInsights {
                smile_type: derive::smile_type(analysis),
                ..Default::default()
            },
        };
    };

    let signals = adjust(analysis, baseline);
    let insights = insights(analysis);
    let interp = &analysis.facs_interpretation;
    let mood_high = entry.mood_is_high();

    let tense_fired = mood_high && signals.tension > SIGNAL_THRESHOLD;
    let fatigued_fired = mood_high && signals.fatigue > SIGNAL_THRESHOLD;
    let social_fired = insights.smile_type == SmileType::Social && mood_high;

    let mut score: u32 = 0;
    if tense_fired {
        score += TENSION_RULE_WEIGHT;
    }
    if fatigued_fired {
        score += FATIGUE_RULE_WEIGHT;
    }
    if social_fired {
        score += SOCIAL_SMILE_RULE_WEIGHT;
    }
    score += MASKING_INDICATOR_WEIGHT * interp.masking_indicators.len().min(INDICATOR_CAP) as u32;
    score += FATIGUE_INDICATOR_WEIGHT * interp.fatigue_indicators.len().min(INDICATOR_CAP) as u32;
    score += TENSION_INDICATOR_WEIGHT * interp.tension_indicators.len().min(INDICATOR_CAP) as u32;
    let discrepancy_score = score.min(100) as u8;

    let is_masking_likely = social_fired
        || (mood_high && signals.tension > STRONG_TENSION_THRESHOLD)
        || interp.masking_indicators.len() >= 2;

    // The label is opaque to the core and echoed verbatim; only a missing
    // entry gets the "No recent entry" stand-in.
    let subjective_state = entry.mood_label.clone();

    tracing::debug!(
        score = discrepancy_score,
        masking = is_masking_likely,
        baseline = signals.baseline_applied,
        smile = %insights.smile_type,
        "comparison complete"
    );

    ComparisonResult {
        discrepancy_score,
        subjective_state,
        objective_state: objective_state(
            tense_fired,
            social_fired,
            fatigued_fired,
            is_masking_likely,
            signals.baseline_applied,
        ),
        is_masking_likely,
        baseline_applied: signals.baseline_applied,
        facs_insights: insights,
    }
}

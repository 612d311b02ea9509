//! Signals derived from the canonical AU set.
//!
//! Pure functions over the analysis: weighted, bounded scalars plus the
//! smile-type classification. Absent AUs contribute zero, never NaN.

use attune_core::comparison::SmileType;
use attune_core::facs::{clamp01, ActionUnit, FacialAnalysis, PRESENCE_THRESHOLD};

/// Normalized intensity of one AU: max observed intensity / 5, or 0 when
/// the AU is absent.
pub fn norm(analysis: &FacialAnalysis, code: &str) -> f32 {
    analysis
        .max_intensity_of(code)
        .map(|i| f32::from(i) / 5.0)
        .unwrap_or(0.0)
}

/// True iff any AU with the given code reaches the numeric intensity.
/// Codes compare case-insensitively.
pub fn has_au_with_intensity(aus: &[ActionUnit], code: &str, min_numeric: u8) -> bool {
    aus.iter()
        .any(|au| au.matches_code(code) && au.intensity_numeric >= min_numeric)
}

/// Tension scalar: brow lowerer and lip pressor dominate, dimpler
/// contributes a fifth.
pub fn tension_score(analysis: &FacialAnalysis) -> f32 {
    clamp01(0.4 * norm(analysis, "AU4") + 0.4 * norm(analysis, "AU24") + 0.2 * norm(analysis, "AU14"))
}

/// Flat-affect term: how far the mean intensity sits below maximum.
/// Zero for an empty AU set (no face data is not the same as a flat face).
pub fn low_expressiveness(aus: &[ActionUnit]) -> f32 {
    if aus.is_empty() {
        return 0.0;
    }
    let mean = aus
        .iter()
        .map(|au| f32::from(au.intensity_numeric))
        .sum::<f32>()
        / aus.len() as f32;
    (1.0 - mean / 5.0).max(0.0)
}

/// Fatigue scalar: eye closure, lid tightening, and flat affect.
pub fn fatigue_score(analysis: &FacialAnalysis) -> f32 {
    clamp01(
        0.5 * norm(analysis, "AU43")
            + 0.3 * norm(analysis, "AU7")
            + 0.2 * low_expressiveness(&analysis.action_units),
    )
}

/// Classify the smile pattern.
///
/// Interpretation flags take precedence over raw-AU inference; the Duchenne
/// pattern is checked first because AU6 co-presence rules out a social
/// smile.
pub fn smile_type(analysis: &FacialAnalysis) -> SmileType {
    let interp = &analysis.facs_interpretation;
    let aus = &analysis.action_units;
    let au6 = has_au_with_intensity(aus, "AU6", PRESENCE_THRESHOLD);
    let au12 = has_au_with_intensity(aus, "AU12", PRESENCE_THRESHOLD);

    if interp.duchenne_smile || (au6 && au12) {
        SmileType::Genuine
    } else if interp.social_smile || (au12 && !au6) {
        SmileType::Social
    } else {
        SmileType::None
    }
}

/// Codes detected at the presence threshold, preserving canonical order.
pub fn detected_aus(analysis: &FacialAnalysis) -> Vec<String> {
    analysis
        .action_units
        .iter()
        .filter(|au| au.intensity_numeric >= PRESENCE_THRESHOLD)
        .map(|au| au.au_code.clone())
        .collect()
}

/// Populate the legacy derived scalars on an analysis.
pub fn with_derived_scalars(mut analysis: FacialAnalysis) -> FacialAnalysis {
    analysis.jaw_tension = Some(tension_score(&analysis));
    analysis.eye_fatigue = Some(fatigue_score(&analysis));
    analysis
}

//! End-to-end comparison scenarios over literal inputs.

use attune_compare::compare;
use attune_core::comparison::SmileType;
use attune_core::facs::{ActionUnit, FacialAnalysis};
use attune_core::{FacialBaseline, SubjectiveEntry};
use attune_vision::{assess, QualityLevel};
use chrono::Utc;
use proptest::prelude::*;

fn entry(mood: i64, label: &str) -> SubjectiveEntry {
    SubjectiveEntry::new(mood, label, Utc::now())
}

/// Duchenne smile with a high reported mood: no discrepancy at all.
#[test]
fn duchenne_smile_high_mood_no_baseline() {
    let analysis = FacialAnalysis {
        confidence: 0.9,
        action_units: vec![
            ActionUnit::new("AU6", "Cheek Raiser", 3, 0.9),
            ActionUnit::new("AU12", "Lip Corner Puller", 4, 0.95),
        ],
        ..Default::default()
    };

    let result = compare(Some(&entry(5, "Great")), &analysis, None);
    assert_eq!(result.facs_insights.smile_type, SmileType::Genuine);
    assert!(!result.is_masking_likely);
    assert_eq!(result.discrepancy_score, 0);
    assert!(!result.baseline_applied);
    assert_eq!(result.subjective_state, "Great");

    let quality = assess(&analysis);
    assert_eq!(quality.level, QualityLevel::High);
}

/// Social smile with a high reported mood: masking likely, score at least 50.
#[test]
fn social_smile_high_mood_no_baseline() {
    let analysis = FacialAnalysis {
        confidence: 0.8,
        action_units: vec![ActionUnit::new("AU12", "Lip Corner Puller", 3, 0.9)],
        ..Default::default()
    };

    let result = compare(Some(&entry(5, "Great")), &analysis, None);
    assert_eq!(result.facs_insights.smile_type, SmileType::Social);
    assert!(result.is_masking_likely);
    assert!(result.discrepancy_score >= 50);
    assert!(!result.baseline_applied);
}

/// A calibrated baseline neutralizes habitual tension: the tension rule
/// stops firing once the neutral level is subtracted.
#[test]
fn baseline_neutralizes_habitual_tension() {
    let analysis = FacialAnalysis {
        confidence: 0.9,
        action_units: vec![
            ActionUnit::new("AU4", "Brow Lowerer", 4, 0.9),
            ActionUnit::new("AU24", "Lip Pressor", 3, 0.85),
        ],
        ..Default::default()
    };
    let baseline = FacialBaseline::new(0.6, 0.0, 0.0);

    let result = compare(Some(&entry(4, "Good")), &analysis, Some(&baseline));
    assert!(result.baseline_applied);
    assert!(result.objective_state.contains("baseline-adjusted"));
    // Raw tension 0.56 minus the 0.6 neutral level clamps to 0: below the
    // 0.3 firing threshold, so the +60 rule stays silent.
    assert!(result.discrepancy_score < 60);

    // Without the baseline the same face fires the tension rule.
    let unadjusted = compare(Some(&entry(4, "Good")), &analysis, None);
    assert!(unadjusted.discrepancy_score >= 60);
    assert_eq!(unadjusted.objective_state, "tense");
}

/// The offline fallback pairs with any entry as a zero-discrepancy result.
#[test]
fn offline_fallback_scores_zero_with_any_entry() {
    let fallback = FacialAnalysis::offline_fallback();
    for mood in 1..=5 {
        let result = compare(Some(&entry(mood, "whatever")), &fallback, None);
        assert_eq!(result.discrepancy_score, 0, "mood {}", mood);
        assert_eq!(result.facs_insights.smile_type, SmileType::None);
        assert!(!result.is_masking_likely);
    }
}

proptest! {
    /// Discrepancy is always inside 0..=100, whatever the inputs.
    #[test]
    fn discrepancy_always_bounded(
        mood in 1i64..=5,
        codes in proptest::collection::vec(("AU[0-9]{1,2}", 1i64..=5), 0..10),
        masking in 0usize..8,
        with_baseline in any::<bool>(),
        neutral in 0.0f32..=1.0,
    ) {
        let mut analysis = FacialAnalysis {
            confidence: 0.9,
            action_units: codes
                .iter()
                .map(|(code, n)| ActionUnit::new(code, "", *n, 0.9))
                .collect(),
            ..Default::default()
        };
        analysis.facs_interpretation.masking_indicators =
            (0..masking).map(|i| format!("note {}", i)).collect();
        let baseline = with_baseline.then(|| FacialBaseline::new(neutral, neutral, neutral));

        let result = compare(Some(&entry(mood, "label")), &analysis, baseline.as_ref());
        prop_assert!(result.discrepancy_score <= 100);
        prop_assert_eq!(result.baseline_applied, with_baseline);
        prop_assert_eq!(
            result.objective_state.contains("baseline-adjusted"),
            with_baseline
        );
    }
}

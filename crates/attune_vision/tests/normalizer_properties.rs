//! Property-based tests for the response normalizer and quality gate.
//!
//! The universal invariants: normalization is total and idempotent over
//! arbitrary payloads, and the quality score is always bounded with
//! `can_proceed` fixed at true.

use attune_vision::{assess, Normalizer, QualityLevel};
use proptest::prelude::*;
use serde_json::{json, Value};

/// Arbitrary JSON leaf values.
fn arb_leaf() -> impl Strategy<Value = Value> {
    prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::Bool),
        any::<i32>().prop_map(|n| json!(n)),
        (-1e6f64..1e6).prop_map(|f| json!(f)),
        "[a-zA-Z0-9 _-]{0,12}".prop_map(Value::String),
    ]
}

/// Arbitrary shallow payload objects with plausible and implausible fields.
fn arb_payload() -> impl Strategy<Value = Value> {
    let field_name = prop_oneof![
        Just("confidence".to_string()),
        Just("actionUnits".to_string()),
        Just("action_units_detected".to_string()),
        Just("aus".to_string()),
        Just("facsInterpretation".to_string()),
        Just("lighting".to_string()),
        Just("lightingSeverity".to_string()),
        Just("environmentalClues".to_string()),
        "[a-z_]{1,10}",
    ];
    let au_entry = prop_oneof![
        arb_leaf(),
        ("AU[0-9]{1,2}", 0i64..8, proptest::option::of(-2.0f64..3.0)).prop_map(
            |(code, numeric, conf)| {
                let mut obj = serde_json::Map::new();
                obj.insert("auCode".to_string(), json!(code));
                obj.insert("intensityNumeric".to_string(), json!(numeric));
                if let Some(c) = conf {
                    obj.insert("confidence".to_string(), json!(c));
                }
                Value::Object(obj)
            }
        ),
    ];
    let field_value = prop_oneof![
        arb_leaf(),
        proptest::collection::vec(au_entry, 0..6).prop_map(Value::Array),
    ];
    proptest::collection::btree_map(field_name, field_value, 0..6).prop_map(|m| {
        Value::Object(m.into_iter().collect())
    })
}

proptest! {
    /// Normalization terminates on any object payload and yields a record
    /// with bounded confidence and every AU intensity in 1..=5.
    #[test]
    fn normalize_is_total_and_bounded(payload in arb_payload()) {
        let mut normalizer = Normalizer::new();
        let analysis = normalizer.normalize_value(&payload);
        prop_assert!(analysis.confidence.is_finite());
        prop_assert!((0.0..=1.0).contains(&analysis.confidence));
        for au in &analysis.action_units {
            prop_assert!((1..=5).contains(&au.intensity_numeric));
            prop_assert_eq!(au.intensity.as_numeric(), au.intensity_numeric);
            prop_assert!((0.0..=1.0).contains(&au.confidence));
            prop_assert_eq!(au.au_code.clone(), au.au_code.to_ascii_uppercase());
        }
    }

    /// normalize(normalize(P)) == normalize(P).
    #[test]
    fn normalize_is_idempotent(payload in arb_payload()) {
        let mut normalizer = Normalizer::new();
        let once = normalizer.normalize_value(&payload);
        let round_tripped = serde_json::to_value(&once).unwrap();
        let twice = normalizer.normalize_value(&round_tripped);
        prop_assert_eq!(once, twice);
    }

    /// Quality score is bounded and the gate never blocks.
    #[test]
    fn quality_always_bounded_and_advisory(payload in arb_payload()) {
        let mut normalizer = Normalizer::new();
        let analysis = normalizer.normalize_value(&payload);
        let report = assess(&analysis);
        prop_assert!(report.score <= 100);
        prop_assert!(report.can_proceed);
        match report.level {
            QualityLevel::Low => prop_assert!(report.score <= 29),
            QualityLevel::Medium => prop_assert!((30..=59).contains(&report.score)),
            QualityLevel::High => prop_assert!(report.score >= 60),
        }
    }

    /// Arbitrary free text either salvages into a record or fails with the
    /// malformed error; it never panics.
    #[test]
    fn normalize_text_never_panics(text in "[ -~\\n]{0,200}") {
        let mut normalizer = Normalizer::new();
        let _ = normalizer.normalize_text(&text);
    }
}

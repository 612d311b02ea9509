//! Response normalizer: heterogeneous provider payloads in, canonical
//! facial-analysis records out.
//!
//! Providers return the analysis under different wrappers, field spellings,
//! and intensity encodings, sometimes buried in markdown. The normalizer is
//! the boundary: everything downstream operates on the canonical type only.
//! It defaults instead of failing; the only hard error is text no salvage
//! strategy can parse.

use attune_core::facs::{
    clamp01, ActionUnit, FacialAnalysis, FacsIntensity, FacsInterpretation, Observation, Severity,
};
use attune_core::AttuneError;
use serde_json::{Map, Value};
use std::collections::VecDeque;

/// Anatomical labels for the AU codes this engine reasons about.
pub fn anatomical_name(code: &str) -> Option<&'static str> {
    match code.to_ascii_uppercase().as_str() {
        "AU4" => Some("Brow Lowerer"),
        "AU6" => Some("Cheek Raiser"),
        "AU7" => Some("Lid Tightener"),
        "AU12" => Some("Lip Corner Puller"),
        "AU14" => Some("Dimpler"),
        "AU24" => Some("Lip Pressor"),
        "AU43" => Some("Eyes Closed"),
        _ => None,
    }
}

/// One recorded coercion: what field was touched and what was done to it.
/// Kept in-process for debugging; never persisted.
#[derive(Debug, Clone)]
pub struct Coercion {
    pub field: String,
    pub action: String,
}

const TRAIL_CAPACITY: usize = 64;

/// Stateful normalizer carrying a bounded ring buffer of coercions.
#[derive(Debug, Default)]
pub struct Normalizer {
    trail: VecDeque<Coercion>,
}

impl Normalizer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Coercions recorded so far, oldest first. The buffer is bounded;
    /// older entries fall off.
    pub fn trail(&self) -> impl Iterator<Item = &Coercion> {
        self.trail.iter()
    }

    fn record(&mut self, field: &str, action: impl Into<String>) {
        let action = action.into();
        tracing::debug!(field, %action, "normalizer coercion");
        if self.trail.len() == TRAIL_CAPACITY {
            self.trail.pop_front();
        }
        self.trail.push_back(Coercion {
            field: field.to_string(),
            action,
        });
    }

    /// Normalize a raw textual provider payload.
    ///
    /// Empty or whitespace-only text yields the offline fallback — a valid
    /// result, never an error. Unparseable text fails with
    /// `MalformedResponse` unless a salvage strategy recovers a JSON object.
    pub fn normalize_text(&mut self, text: &str) -> Result<FacialAnalysis, AttuneError> {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            self.record("payload", "empty text, substituting offline fallback");
            return Ok(FacialAnalysis::offline_fallback());
        }
        match salvage_json(trimmed) {
            Some(value) => {
                if !matches!(value, Value::Object(_)) {
                    self.record("payload", "non-object JSON, substituting offline fallback");
                    return Ok(FacialAnalysis::offline_fallback());
                }
                Ok(self.normalize_value(&value))
            }
            None => Err(AttuneError::MalformedResponse(
                trimmed.chars().take(200).collect(),
            )),
        }
    }

    /// Normalize an already-parsed payload. Total: every JSON value maps to
    /// a canonical record. Null and non-objects become the offline fallback.
    pub fn normalize_value(&mut self, value: &Value) -> FacialAnalysis {
        let obj = match value {
            Value::Object(obj) => obj,
            Value::Null => {
                self.record("payload", "null payload, substituting offline fallback");
                return FacialAnalysis::offline_fallback();
            }
            other => {
                self.record(
                    "payload",
                    format!("non-object payload ({}), substituting offline fallback", json_kind(other)),
                );
                return FacialAnalysis::offline_fallback();
            }
        };

        // Rule 1: unwrap a lone `facs_analysis` envelope, any casing.
        let obj = match self.unwrap_envelope(obj) {
            Some(inner) => inner,
            None => obj,
        };

        let confidence = self.normalize_confidence(obj);
        let action_units = self.normalize_action_units(obj);
        let facs_interpretation = self.normalize_interpretation(obj);
        let observations = self.normalize_observations(obj);
        let lighting = get_any(obj, &["lighting"])
            .and_then(Value::as_str)
            .unwrap_or("")
            .to_string();
        let lighting_severity = self.normalize_lighting_severity(obj);
        let environmental_clues = self.normalize_clues(obj);
        let jaw_tension = self.optional_scalar(obj, &["jawTension", "jaw_tension"]);
        let eye_fatigue = self.optional_scalar(obj, &["eyeFatigue", "eye_fatigue"]);

        FacialAnalysis {
            confidence,
            action_units,
            facs_interpretation,
            observations,
            lighting,
            lighting_severity,
            environmental_clues,
            jaw_tension,
            eye_fatigue,
        }
    }

    fn unwrap_envelope<'a>(&mut self, obj: &'a Map<String, Value>) -> Option<&'a Map<String, Value>> {
        if obj.len() != 1 {
            return None;
        }
        let (key, inner) = obj.iter().next()?;
        let folded: String = key
            .chars()
            .filter(|c| *c != '_')
            .collect::<String>()
            .to_ascii_lowercase();
        if folded == "facsanalysis" {
            if let Value::Object(inner) = inner {
                self.record(key, "unwrapped analysis envelope");
                return Some(inner);
            }
        }
        None
    }

    fn normalize_confidence(&mut self, obj: &Map<String, Value>) -> f32 {
        match get_any(obj, &["confidence"]).and_then(as_finite_f32) {
            Some(raw) => {
                let clamped = clamp01(raw);
                if (clamped - raw).abs() > f32::EPSILON {
                    self.record("confidence", format!("clamped {} to {}", raw, clamped));
                }
                clamped
            }
            None => {
                self.record("confidence", "missing, defaulted to 0.5");
                0.5
            }
        }
    }

    // Rule 2 + 3: accept the known AU field names, normalize each element,
    // then collapse duplicates keeping the strongest observation.
    fn normalize_action_units(&mut self, obj: &Map<String, Value>) -> Vec<ActionUnit> {
        let raw = match get_any(obj, &["actionUnits", "action_units", "action_units_detected", "aus"])
        {
            Some(Value::Array(items)) => items,
            Some(_) => {
                self.record("actionUnits", "non-array AU field, treated as empty");
                return Vec::new();
            }
            None => return Vec::new(),
        };

        let mut units: Vec<ActionUnit> = Vec::new();
        for (i, item) in raw.iter().enumerate() {
            match self.normalize_au(item) {
                Some(au) => units.push(au),
                None => self.record(
                    &format!("actionUnits[{}]", i),
                    "dropped entry without a usable AU code",
                ),
            }
        }
        self.dedupe_aus(units)
    }

    fn normalize_au(&mut self, item: &Value) -> Option<ActionUnit> {
        let obj = item.as_object()?;
        let code_raw = get_any(obj, &["auCode", "au_code"]).and_then(Value::as_str)?;
        let code = code_raw.trim().to_ascii_uppercase();
        if !is_au_code(&code) {
            return None;
        }

        let letter = get_any(obj, &["intensity"])
            .and_then(Value::as_str)
            .and_then(FacsIntensity::from_letter);
        let numeric = get_any(obj, &["intensityNumeric", "intensity_numeric"]).and_then(as_i64);

        let intensity = match (letter, numeric) {
            (_, Some(n)) => {
                let clamped = FacsIntensity::from_numeric(n);
                if !(1..=5).contains(&n) {
                    self.record(&code, format!("intensity {} clamped to {}", n, clamped.as_numeric()));
                }
                clamped
            }
            (Some(l), None) => l,
            (None, None) => {
                self.record(&code, "unknown intensity, defaulted to A");
                FacsIntensity::A
            }
        };

        let confidence = match get_any(obj, &["confidence"]).and_then(as_finite_f32) {
            Some(c) => clamp01(c),
            None => {
                self.record(&code, "missing AU confidence, defaulted to 0.5");
                0.5
            }
        };

        let name = get_any(obj, &["name"])
            .and_then(Value::as_str)
            .map(str::to_string)
            .or_else(|| anatomical_name(&code).map(str::to_string))
            .unwrap_or_default();

        Some(ActionUnit {
            au_code: code,
            name,
            intensity,
            intensity_numeric: intensity.as_numeric(),
            confidence,
        })
    }

    /// Collapse duplicate codes, keeping max intensity and breaking ties by
    /// higher confidence. Order of first occurrence is preserved.
    fn dedupe_aus(&mut self, units: Vec<ActionUnit>) -> Vec<ActionUnit> {
        let mut out: Vec<ActionUnit> = Vec::with_capacity(units.len());
        for au in units {
            match out.iter_mut().find(|existing| existing.matches_code(&au.au_code)) {
                Some(existing) => {
                    let stronger = au.intensity_numeric > existing.intensity_numeric
                        || (au.intensity_numeric == existing.intensity_numeric
                            && au.confidence > existing.confidence);
                    if stronger {
                        *existing = au;
                    }
                    self.record(&existing.au_code, "collapsed duplicate AU entry");
                }
                None => out.push(au),
            }
        }
        out
    }

    // Rule 4: flags accept both casings; the canonical struct carries the
    // aliases, so a serde pass does the renaming.
    fn normalize_interpretation(&mut self, obj: &Map<String, Value>) -> FacsInterpretation {
        let mut interp = get_any(obj, &["facsInterpretation", "facs_interpretation"])
            .and_then(|v| serde_json::from_value::<FacsInterpretation>(v.clone()).ok())
            .unwrap_or_default();
        // A record claiming both smile patterns is contradictory; the
        // Duchenne pattern subsumes the social one.
        if interp.duchenne_smile && interp.social_smile {
            self.record("facsInterpretation", "both smile flags set, kept duchenne only");
            interp.social_smile = false;
        }
        interp
    }

    // Rule 6: observations pass through with severity/category defaults.
    fn normalize_observations(&mut self, obj: &Map<String, Value>) -> Vec<Observation> {
        let raw = match get_any(obj, &["observations"]) {
            Some(Value::Array(items)) => items,
            _ => return Vec::new(),
        };
        let mut out = Vec::with_capacity(raw.len());
        for (i, item) in raw.iter().enumerate() {
            match serde_json::from_value::<Observation>(item.clone()) {
                Ok(mut obs) => {
                    if item.get("severity").is_none() {
                        self.record(
                            &format!("observations[{}]", i),
                            "missing severity, defaulted to low",
                        );
                        obs.severity = Severity::Low;
                    }
                    if item.get("category").is_none() {
                        self.record(
                            &format!("observations[{}]", i),
                            "missing category, defaulted to environmental",
                        );
                    }
                    out.push(obs);
                }
                Err(_) => self.record(
                    &format!("observations[{}]", i),
                    "dropped non-object observation",
                ),
            }
        }
        out
    }

    fn normalize_lighting_severity(&mut self, obj: &Map<String, Value>) -> Severity {
        match get_any(obj, &["lightingSeverity", "lighting_severity"]).and_then(Value::as_str) {
            Some(s) => match s.to_ascii_lowercase().as_str() {
                "low" => Severity::Low,
                "moderate" => Severity::Moderate,
                "high" => Severity::High,
                other => {
                    self.record("lightingSeverity", format!("unknown value '{}', defaulted to low", other));
                    Severity::Low
                }
            },
            None => Severity::Low,
        }
    }

    fn normalize_clues(&mut self, obj: &Map<String, Value>) -> Vec<String> {
        match get_any(obj, &["environmentalClues", "environmental_clues"]) {
            Some(Value::Array(items)) => items
                .iter()
                .filter_map(|v| v.as_str().map(str::to_string))
                .collect(),
            _ => Vec::new(),
        }
    }

    fn optional_scalar(&mut self, obj: &Map<String, Value>, names: &[&str]) -> Option<f32> {
        get_any(obj, names).and_then(as_finite_f32).map(clamp01)
    }
}

// ============================================================================
// Salvage parsing
// ============================================================================

/// Recover a JSON value from provider text, trying in order:
/// 1. Direct parse
/// 2. Markdown code fence contents
/// 3. First balanced `{...}` object
/// 4. Outermost-brace slice with trailing-comma repair
pub fn salvage_json(text: &str) -> Option<Value> {
    let trimmed = text.trim();

    if let Ok(v) = serde_json::from_str::<Value>(trimmed) {
        return Some(v);
    }

    let code_block_re = regex::Regex::new(r"```(?:json)?\s*\n?([\s\S]*?)\n?\s*```").unwrap();
    if let Some(caps) = code_block_re.captures(trimmed) {
        let inner = caps.get(1).map_or("", |m| m.as_str()).trim();
        if let Ok(v) = serde_json::from_str::<Value>(inner) {
            return Some(v);
        }
        if let Some(json_str) = extract_balanced_braces(inner) {
            if let Ok(v) = serde_json::from_str::<Value>(&json_str) {
                return Some(v);
            }
        }
    }

    if let Some(json_str) = extract_balanced_braces(trimmed) {
        if let Ok(v) = serde_json::from_str::<Value>(&json_str) {
            return Some(v);
        }
        let repaired = repair_json(&json_str);
        if let Ok(v) = serde_json::from_str::<Value>(&repaired) {
            return Some(v);
        }
    }

    // Last resort: widest brace-to-brace slice, repaired.
    let (start, end) = (trimmed.find('{')?, trimmed.rfind('}')?);
    if start < end {
        let repaired = repair_json(&trimmed[start..=end]);
        if let Ok(v) = serde_json::from_str::<Value>(&repaired) {
            return Some(v);
        }
    }
    None
}

/// Extract the outermost balanced `{...}` substring.
fn extract_balanced_braces(text: &str) -> Option<String> {
    let start = text.find('{')?;
    let mut depth = 0i32;
    let mut in_string = false;
    let mut escape_next = false;

    for (i, ch) in text[start..].char_indices() {
        if escape_next {
            escape_next = false;
            continue;
        }
        match ch {
            '\\' if in_string => {
                escape_next = true;
            }
            '"' => {
                in_string = !in_string;
            }
            '{' if !in_string => {
                depth += 1;
            }
            '}' if !in_string => {
                depth -= 1;
                if depth == 0 {
                    return Some(text[start..start + i + 1].to_string());
                }
            }
            _ => {}
        }
    }
    None
}

/// Repair common formatting slips in model-produced JSON.
fn repair_json(text: &str) -> String {
    let mut result = text.to_string();

    // Trailing commas before } or ]
    let trailing_comma = regex::Regex::new(r",\s*([}\]])").unwrap();
    result = trailing_comma.replace_all(&result, "$1").to_string();

    // Single quotes throughout (only when no double quotes exist at all)
    if !result.contains('"') {
        result = result.replace('\'', "\"");
    }

    result
}

fn get_any<'a>(obj: &'a Map<String, Value>, names: &[&str]) -> Option<&'a Value> {
    names.iter().find_map(|n| obj.get(*n))
}

fn as_finite_f32(v: &Value) -> Option<f32> {
    let f = v.as_f64()? as f32;
    f.is_finite().then_some(f)
}

fn as_i64(v: &Value) -> Option<i64> {
    v.as_i64().or_else(|| v.as_f64().map(|f| f.round() as i64))
}

fn is_au_code(code: &str) -> bool {
    code.len() > 2
        && code.starts_with("AU")
        && code[2..].chars().all(|c| c.is_ascii_digit())
}

fn json_kind(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use attune_core::facs::OFFLINE_CLUE;
    use serde_json::json;

    #[test]
    fn test_normalize_clean_payload() {
        let payload = json!({
            "confidence": 0.9,
            "actionUnits": [
                {"auCode": "AU6", "intensity": "C", "intensityNumeric": 3, "confidence": 0.9},
                {"auCode": "AU12", "intensity": "D", "intensityNumeric": 4, "confidence": 0.95}
            ]
        });
        let mut n = Normalizer::new();
        let analysis = n.normalize_value(&payload);
        assert!((analysis.confidence - 0.9).abs() < 1e-6);
        assert_eq!(analysis.action_units.len(), 2);
        assert_eq!(analysis.action_units[0].au_code, "AU6");
    }

    #[test]
    fn test_unwrap_snake_case_envelope() {
        // Wrapped payload with snake_case fields and a lowercase code.
        let payload = json!({
            "facs_analysis": {
                "action_units_detected": [{"au_code": "au12", "intensity": "C"}],
                "confidence": 0.7
            }
        });
        let mut n = Normalizer::new();
        let analysis = n.normalize_value(&payload);
        assert_eq!(analysis.action_units.len(), 1);
        let au = &analysis.action_units[0];
        assert_eq!(au.au_code, "AU12");
        assert_eq!(au.intensity_numeric, 3);
        assert_eq!(au.intensity, FacsIntensity::C);
        assert!((analysis.confidence - 0.7).abs() < 1e-6);
    }

    #[test]
    fn test_letter_only_derives_numeric() {
        let payload = json!({"aus": [{"auCode": "AU4", "intensity": "E"}], "confidence": 1.0});
        let mut n = Normalizer::new();
        let analysis = n.normalize_value(&payload);
        assert_eq!(analysis.action_units[0].intensity_numeric, 5);
    }

    #[test]
    fn test_numeric_only_derives_letter_and_clamps() {
        let payload = json!({
            "actionUnits": [{"auCode": "AU24", "intensityNumeric": 9}],
            "confidence": 1.0
        });
        let mut n = Normalizer::new();
        let analysis = n.normalize_value(&payload);
        assert_eq!(analysis.action_units[0].intensity, FacsIntensity::E);
        assert_eq!(analysis.action_units[0].intensity_numeric, 5);
    }

    #[test]
    fn test_unknown_intensity_defaults_to_trace() {
        let payload = json!({"actionUnits": [{"auCode": "AU6"}], "confidence": 0.8});
        let mut n = Normalizer::new();
        let analysis = n.normalize_value(&payload);
        assert_eq!(analysis.action_units[0].intensity, FacsIntensity::A);
        assert_eq!(analysis.action_units[0].intensity_numeric, 1);
        assert!(n.trail().any(|c| c.action.contains("defaulted to A")));
    }

    #[test]
    fn test_dedupe_keeps_max_intensity_then_confidence() {
        let payload = json!({
            "actionUnits": [
                {"auCode": "AU12", "intensityNumeric": 2, "confidence": 0.9},
                {"auCode": "au12", "intensityNumeric": 4, "confidence": 0.5},
                {"auCode": "AU12", "intensityNumeric": 4, "confidence": 0.8}
            ],
            "confidence": 1.0
        });
        let mut n = Normalizer::new();
        let analysis = n.normalize_value(&payload);
        assert_eq!(analysis.action_units.len(), 1);
        let au = &analysis.action_units[0];
        assert_eq!(au.intensity_numeric, 4);
        assert!((au.confidence - 0.8).abs() < 1e-6);
    }

    #[test]
    fn test_null_payload_becomes_offline_fallback() {
        let mut n = Normalizer::new();
        let analysis = n.normalize_value(&Value::Null);
        assert!(analysis.is_offline_fallback());
        assert!((analysis.confidence - 0.3).abs() < 1e-6);
        assert!(analysis.action_units.is_empty());
        assert!(analysis.environmental_clues.iter().any(|c| c == OFFLINE_CLUE));
    }

    #[test]
    fn test_empty_text_becomes_offline_fallback() {
        let mut n = Normalizer::new();
        let analysis = n.normalize_text("   \n ").unwrap();
        assert!(analysis.is_offline_fallback());
    }

    #[test]
    fn test_markdown_wrapped_payload_salvaged() {
        let text = "Here is the analysis:\n```json\n{\"confidence\": 0.8, \"actionUnits\": []}\n```\nDone.";
        let mut n = Normalizer::new();
        let analysis = n.normalize_text(text).unwrap();
        assert!((analysis.confidence - 0.8).abs() < 1e-6);
    }

    #[test]
    fn test_preamble_payload_salvaged_by_brace_scan() {
        let text = "Sure! {\"confidence\": 0.6, \"actionUnits\": [{\"auCode\": \"AU6\", \"intensity\": \"B\"}]} hope that helps";
        let mut n = Normalizer::new();
        let analysis = n.normalize_text(text).unwrap();
        assert_eq!(analysis.action_units.len(), 1);
    }

    #[test]
    fn test_trailing_comma_repaired() {
        let text = r#"{"confidence": 0.7, "actionUnits": [{"auCode": "AU4", "intensity": "B"},]}"#;
        let mut n = Normalizer::new();
        let analysis = n.normalize_text(text).unwrap();
        assert_eq!(analysis.action_units.len(), 1);
    }

    #[test]
    fn test_garbage_text_is_malformed() {
        let mut n = Normalizer::new();
        let err = n.normalize_text("no json to be found here").unwrap_err();
        assert!(matches!(err, AttuneError::MalformedResponse(_)));
    }

    #[test]
    fn test_confidence_clamped_and_defaulted() {
        let mut n = Normalizer::new();
        let clamped = n.normalize_value(&json!({"confidence": 3.5}));
        assert_eq!(clamped.confidence, 1.0);

        let defaulted = n.normalize_value(&json!({"actionUnits": []}));
        assert!((defaulted.confidence - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_observation_defaults() {
        let payload = json!({
            "confidence": 0.9,
            "observations": [{"value": "jaw clenched"}]
        });
        let mut n = Normalizer::new();
        let analysis = n.normalize_value(&payload);
        assert_eq!(analysis.observations.len(), 1);
        assert_eq!(analysis.observations[0].category, "environmental");
        assert_eq!(analysis.observations[0].severity, Severity::Low);
    }

    #[test]
    fn test_contradictory_smile_flags_resolved() {
        let payload = json!({
            "confidence": 0.9,
            "facsInterpretation": {"duchenneSmile": true, "socialSmile": true}
        });
        let mut n = Normalizer::new();
        let analysis = n.normalize_value(&payload);
        assert!(analysis.facs_interpretation.duchenne_smile);
        assert!(!analysis.facs_interpretation.social_smile);
    }

    #[test]
    fn test_invalid_au_codes_dropped() {
        let payload = json!({
            "confidence": 0.9,
            "actionUnits": [
                {"auCode": "AU12", "intensity": "C"},
                {"auCode": "smile", "intensity": "C"},
                {"intensity": "B"},
                "not an object"
            ]
        });
        let mut n = Normalizer::new();
        let analysis = n.normalize_value(&payload);
        assert_eq!(analysis.action_units.len(), 1);
        assert_eq!(analysis.action_units[0].au_code, "AU12");
    }

    #[test]
    fn test_idempotence_on_canonical_record() {
        let payload = json!({
            "facs_analysis": {
                "confidence": 1.4,
                "action_units_detected": [
                    {"au_code": "au6", "intensity": "c"},
                    {"au_code": "AU6", "intensity_numeric": 2},
                    {"au_code": "AU12", "intensity_numeric": 4, "confidence": 0.95}
                ],
                "facs_interpretation": {"duchenne_smile": true},
                "observations": [{"value": "soft light"}],
                "lighting": "warm lamp",
                "lighting_severity": "moderate",
                "environmental_clues": ["window to the left"]
            }
        });
        let mut n = Normalizer::new();
        let once = n.normalize_value(&payload);
        let round_tripped = serde_json::to_value(&once).unwrap();
        let twice = n.normalize_value(&round_tripped);
        assert_eq!(once, twice);
    }

    #[test]
    fn test_trail_is_bounded() {
        let mut n = Normalizer::new();
        for _ in 0..(TRAIL_CAPACITY * 2) {
            n.normalize_value(&Value::Null);
        }
        assert_eq!(n.trail().count(), TRAIL_CAPACITY);
    }

    #[test]
    fn test_anatomical_name_fills_missing_label() {
        let payload = json!({"confidence": 1.0, "actionUnits": [{"auCode": "AU6", "intensity": "C"}]});
        let mut n = Normalizer::new();
        let analysis = n.normalize_value(&payload);
        assert_eq!(analysis.action_units[0].name, "Cheek Raiser");
    }
}

//! Canonical FACS record types.
//!
//! Everything downstream of the response normalizer operates on these types.
//! Constructors clamp instead of rejecting: a provider payload can be sloppy,
//! a canonical record cannot.

use serde::{Deserialize, Deserializer, Serialize};

/// AUs whose presence drives the detection-quality score.
pub const CRITICAL_AUS: [&str; 4] = ["AU6", "AU12", "AU4", "AU24"];

/// AUs that feed the tension scalar.
pub const TENSION_AUS: [&str; 3] = ["AU4", "AU14", "AU24"];

/// AUs that feed the fatigue scalar.
pub const FATIGUE_AUS: [&str; 2] = ["AU7", "AU43"];

/// Sentinel placed in `environmental_clues` when the vision capability was
/// unavailable and the record was synthesized locally.
pub const OFFLINE_CLUE: &str = "Offline analysis";

/// Companion note carried in `environmental_clues` by the offline fallback
/// record. Never placed in the interpretation indicator lists: those are
/// scored as observed facial signals, and the fallback observed nothing.
pub const OFFLINE_UNAVAILABLE_NOTE: &str = "Unable to analyze - offline mode";

/// The smallest numeric intensity at which an AU counts as "present" for
/// smile-type and critical-AU checks.
pub const PRESENCE_THRESHOLD: u8 = 2;

/// Deserialize an `f32`, mapping NaN/infinity to 0.0.
pub fn deserialize_safe_f32<'de, D>(deserializer: D) -> Result<f32, D::Error>
where
    D: Deserializer<'de>,
{
    let v = f32::deserialize(deserializer)?;
    if v.is_finite() {
        Ok(v)
    } else {
        Ok(0.0)
    }
}

/// Clamp a real to [0, 1]; non-finite values collapse to 0.
pub fn clamp01(x: f32) -> f32 {
    if x.is_finite() {
        x.clamp(0.0, 1.0)
    } else {
        0.0
    }
}

// ============================================================================
// Intensity scale
// ============================================================================

/// FACS five-step intensity scale, trace (A) through maximum (E).
///
/// The numeric form (1..=5) is the source of truth for derivation math; the
/// letter is the user-visible form. The two always agree on a canonical
/// record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum FacsIntensity {
    A,
    B,
    C,
    D,
    E,
}

impl FacsIntensity {
    /// Map a numeric intensity to its letter, clamping to 1..=5.
    pub fn from_numeric(n: i64) -> Self {
        match n.clamp(1, 5) {
            1 => Self::A,
            2 => Self::B,
            3 => Self::C,
            4 => Self::D,
            _ => Self::E,
        }
    }

    /// Parse a letter (case-insensitive). Returns None for anything else.
    pub fn from_letter(s: &str) -> Option<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "A" => Some(Self::A),
            "B" => Some(Self::B),
            "C" => Some(Self::C),
            "D" => Some(Self::D),
            "E" => Some(Self::E),
            _ => None,
        }
    }

    pub fn as_numeric(self) -> u8 {
        match self {
            Self::A => 1,
            Self::B => 2,
            Self::C => 3,
            Self::D => 4,
            Self::E => 5,
        }
    }

    pub fn as_letter(self) -> char {
        match self {
            Self::A => 'A',
            Self::B => 'B',
            Self::C => 'C',
            Self::D => 'D',
            Self::E => 'E',
        }
    }
}

impl Default for FacsIntensity {
    fn default() -> Self {
        Self::A
    }
}

// ============================================================================
// Action units
// ============================================================================

fn default_au_confidence() -> f32 {
    0.5
}

/// A single observed facial muscle action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionUnit {
    /// Canonical uppercase code matching `AU\d+`.
    #[serde(alias = "au_code")]
    pub au_code: String,
    /// Human-readable anatomical label (e.g. "Cheek Raiser").
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub intensity: FacsIntensity,
    /// 1..=5, always agreeing with `intensity`.
    #[serde(default, alias = "intensity_numeric")]
    pub intensity_numeric: u8,
    #[serde(
        default = "default_au_confidence",
        deserialize_with = "deserialize_safe_f32"
    )]
    pub confidence: f32,
}

impl ActionUnit {
    /// Build a canonical AU from a numeric intensity, clamping everything.
    pub fn new(code: &str, name: &str, intensity_numeric: i64, confidence: f32) -> Self {
        let intensity = FacsIntensity::from_numeric(intensity_numeric);
        Self {
            au_code: code.trim().to_ascii_uppercase(),
            name: name.to_string(),
            intensity,
            intensity_numeric: intensity.as_numeric(),
            confidence: clamp01(confidence),
        }
    }

    /// Re-establish the canonical invariants on a deserialized AU: uppercase
    /// code, letter/numeric agreement (numeric wins when both are set and
    /// disagree, letter fills in a missing numeric), clamped confidence.
    pub fn canonicalized(mut self) -> Self {
        self.au_code = self.au_code.trim().to_ascii_uppercase();
        if self.intensity_numeric == 0 {
            self.intensity_numeric = self.intensity.as_numeric();
        } else {
            self.intensity_numeric = self.intensity_numeric.clamp(1, 5);
            self.intensity = FacsIntensity::from_numeric(self.intensity_numeric as i64);
        }
        self.confidence = clamp01(self.confidence);
        self
    }

    /// Case-insensitive code match.
    pub fn matches_code(&self, code: &str) -> bool {
        self.au_code.eq_ignore_ascii_case(code.trim())
    }
}

// ============================================================================
// Interpretation and observations
// ============================================================================

/// Summary flags over a set of AUs. At most one of the two smile flags is
/// true; both false is a valid state.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FacsInterpretation {
    #[serde(alias = "duchenne_smile")]
    pub duchenne_smile: bool,
    #[serde(alias = "social_smile")]
    pub social_smile: bool,
    #[serde(alias = "masking_indicators")]
    pub masking_indicators: Vec<String>,
    #[serde(alias = "fatigue_indicators")]
    pub fatigue_indicators: Vec<String>,
    #[serde(alias = "tension_indicators")]
    pub tension_indicators: Vec<String>,
}

impl FacsInterpretation {
    pub fn is_empty(&self) -> bool {
        !self.duchenne_smile
            && !self.social_smile
            && self.masking_indicators.is_empty()
            && self.fatigue_indicators.is_empty()
            && self.tension_indicators.is_empty()
    }
}

/// Advisory severity used for lighting and observations.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    #[default]
    Low,
    Moderate,
    High,
}

fn default_observation_category() -> String {
    "environmental".to_string()
}

/// A domain-tagged observation attached to an analysis
/// (tension / fatigue / lighting / environmental).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Observation {
    #[serde(default = "default_observation_category")]
    pub category: String,
    #[serde(default)]
    pub value: String,
    #[serde(default)]
    pub evidence: String,
    #[serde(default)]
    pub severity: Severity,
}

// ============================================================================
// Canonical analysis
// ============================================================================

/// The single in-memory form all downstream logic consumes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FacialAnalysis {
    /// Provider's overall confidence, clamped to [0, 1].
    #[serde(deserialize_with = "deserialize_safe_f32")]
    pub confidence: f32,
    #[serde(alias = "action_units")]
    pub action_units: Vec<ActionUnit>,
    #[serde(alias = "facs_interpretation")]
    pub facs_interpretation: FacsInterpretation,
    pub observations: Vec<Observation>,
    pub lighting: String,
    #[serde(alias = "lighting_severity")]
    pub lighting_severity: Severity,
    #[serde(alias = "environmental_clues")]
    pub environmental_clues: Vec<String>,
    /// Legacy derived scalar; populated by the derivation layer.
    #[serde(alias = "jaw_tension", skip_serializing_if = "Option::is_none")]
    pub jaw_tension: Option<f32>,
    /// Legacy derived scalar; populated by the derivation layer.
    #[serde(alias = "eye_fatigue", skip_serializing_if = "Option::is_none")]
    pub eye_fatigue: Option<f32>,
}

impl FacialAnalysis {
    /// The record synthesized when the vision capability is unavailable.
    /// This is a valid result, never an error. The interpretation stays
    /// empty so nothing downstream scores a signal that was never observed;
    /// the offline notes ride in `environmental_clues`.
    pub fn offline_fallback() -> Self {
        Self {
            confidence: 0.3,
            action_units: Vec::new(),
            facs_interpretation: FacsInterpretation::default(),
            observations: Vec::new(),
            lighting: "unknown".to_string(),
            lighting_severity: Severity::Low,
            environmental_clues: vec![OFFLINE_CLUE.to_string(), OFFLINE_UNAVAILABLE_NOTE.to_string()],
            jaw_tension: None,
            eye_fatigue: None,
        }
    }

    pub fn is_offline_fallback(&self) -> bool {
        self.environmental_clues.iter().any(|c| c == OFFLINE_CLUE)
    }

    /// Highest numeric intensity among AUs with the given code, or None when
    /// the AU was not observed. Codes compare case-insensitively.
    pub fn max_intensity_of(&self, code: &str) -> Option<u8> {
        self.action_units
            .iter()
            .filter(|au| au.matches_code(code))
            .map(|au| au.intensity_numeric)
            .max()
    }
}

// ============================================================================
// Tests
// ============================================================================

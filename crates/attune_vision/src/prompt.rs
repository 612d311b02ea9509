//! The fixed capture-analysis prompt and its response schema.
//!
//! The normalizer is built against this contract; providers that drift from
//! it (extra prose, markdown fences, snake_case fields) are salvaged rather
//! than rejected.

use serde_json::{json, Value};

/// Prompt handed to the vision capability along with the capture.
pub const FACS_PROMPT: &str = "\
You are a Facial Action Coding System (FACS) annotator. Examine the face in \
the image and report observable muscle actions only. Do not infer emotions, \
identity, age, or any attribute beyond muscle movement.

Return a single JSON object with these fields:
- confidence: number 0..1, your overall detection confidence
- actionUnits: array of { auCode (e.g. \"AU6\"), name, intensity (A-E), \
intensityNumeric (1-5), confidence (0..1) }
- facsInterpretation: { duchenneSmile, socialSmile, maskingIndicators, \
fatigueIndicators, tensionIndicators } where the indicator lists hold short \
anatomical notes such as \"AU14 suppression over AU12\"
- observations: array of { category (tension|fatigue|lighting|environmental), \
value, evidence, severity (low|moderate|high) }
- lighting: short descriptor
- lightingSeverity: low|moderate|high
- environmentalClues: array of short strings

Report only what is visible. Respond with the JSON object and nothing else.";

/// JSON schema forwarded to providers that support constrained output.
pub fn response_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "confidence": { "type": "number", "minimum": 0, "maximum": 1 },
            "actionUnits": {
                "type": "array",
                "items": {
                    "type": "object",
                    "properties": {
                        "auCode": { "type": "string", "pattern": "^AU\\d+$" },
                        "name": { "type": "string" },
                        "intensity": { "type": "string", "enum": ["A", "B", "C", "D", "E"] },
                        "intensityNumeric": { "type": "integer", "minimum": 1, "maximum": 5 },
                        "confidence": { "type": "number", "minimum": 0, "maximum": 1 }
                    },
                    "required": ["auCode"]
                }
            },
            "facsInterpretation": {
                "type": "object",
                "properties": {
                    "duchenneSmile": { "type": "boolean" },
                    "socialSmile": { "type": "boolean" },
                    "maskingIndicators": { "type": "array", "items": { "type": "string" } },
                    "fatigueIndicators": { "type": "array", "items": { "type": "string" } },
                    "tensionIndicators": { "type": "array", "items": { "type": "string" } }
                }
            },
            "observations": {
                "type": "array",
                "items": {
                    "type": "object",
                    "properties": {
                        "category": { "type": "string" },
                        "value": { "type": "string" },
                        "evidence": { "type": "string" },
                        "severity": { "type": "string", "enum": ["low", "moderate", "high"] }
                    }
                }
            },
            "lighting": { "type": "string" },
            "lightingSeverity": { "type": "string", "enum": ["low", "moderate", "high"] },
            "environmentalClues": { "type": "array", "items": { "type": "string" } }
        },
        "required": ["confidence", "actionUnits"]
    })
}

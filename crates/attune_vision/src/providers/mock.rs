//! Mock vision capability — deterministic payloads for testing and offline
//! development without a provider account.

use attune_core::{AttuneError, VisionCapability, VisionRequest, VisionResponse};
use std::time::Duration;

/// A realistic provider payload: markdown-fenced, mixed casing, the kind of
/// thing the normalizer exists to absorb.
pub const SAMPLE_FACS_PAYLOAD: &str = r#"```json
{
  "confidence": 0.88,
  "actionUnits": [
    {"auCode": "AU6", "name": "Cheek Raiser", "intensity": "C", "intensityNumeric": 3, "confidence": 0.9},
    {"auCode": "AU12", "name": "Lip Corner Puller", "intensity": "D", "intensityNumeric": 4, "confidence": 0.95}
  ],
  "facsInterpretation": {
    "duchenneSmile": true,
    "socialSmile": false,
    "maskingIndicators": [],
    "fatigueIndicators": [],
    "tensionIndicators": []
  },
  "observations": [
    {"category": "lighting", "value": "even front light", "evidence": "no harsh shadows", "severity": "low"}
  ],
  "lighting": "even front light",
  "lightingSeverity": "low",
  "environmentalClues": []
}
```"#;

#[derive(Debug, Clone)]
pub enum MockBehavior {
    /// Return this payload verbatim.
    Canned(String),
    /// Report the provider as unavailable (returns null).
    Unavailable,
    /// Sleep this long before answering; pairs with deadline tests.
    Slow(Duration),
}

#[derive(Debug, Clone)]
pub struct MockVision {
    behavior: MockBehavior,
}

impl MockVision {
    pub fn new(behavior: MockBehavior) -> Self {
        Self { behavior }
    }

    /// A mock that answers with a plausible Duchenne-smile payload.
    pub fn canned_facs() -> Self {
        Self::new(MockBehavior::Canned(SAMPLE_FACS_PAYLOAD.to_string()))
    }
}

#[async_trait::async_trait]
impl VisionCapability for MockVision {
    async fn analyze(&self, request: VisionRequest) -> Result<Option<VisionResponse>, AttuneError> {
        // Simulated network latency, interruptible like a real transport.
        let latency = match &self.behavior {
            MockBehavior::Slow(d) => *d,
            _ => Duration::from_millis(50),
        };
        match &request.signal {
            Some(token) => {
                tokio::select! {
                    _ = token.cancelled() => return Err(AttuneError::Canceled),
                    _ = tokio::time::sleep(latency) => {}
                }
            }
            None => tokio::time::sleep(latency).await,
        }

        let content = match &self.behavior {
            MockBehavior::Unavailable => return Ok(None),
            MockBehavior::Canned(payload) => payload.clone(),
            MockBehavior::Slow(_) => SAMPLE_FACS_PAYLOAD.to_string(),
        };
        Ok(Some(VisionResponse { content }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_canned_returns_payload() {
        let mock = MockVision::canned_facs();
        let response = mock
            .analyze(VisionRequest {
                image_base64: "aGVsbG8=".to_string(),
                prompt: String::new(),
                schema: None,
                signal: None,
            })
            .await
            .unwrap();
        assert!(response.unwrap().content.contains("AU6"));
    }

    #[tokio::test]
    async fn test_unavailable_returns_none() {
        let mock = MockVision::new(MockBehavior::Unavailable);
        let response = mock
            .analyze(VisionRequest {
                image_base64: String::new(),
                prompt: String::new(),
                schema: None,
                signal: None,
            })
            .await
            .unwrap();
        assert!(response.is_none());
    }
}

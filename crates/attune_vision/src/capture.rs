//! Deadline and recovery wrapper around the vision capability.
//!
//! Provider failures (unavailable, deadline, unparseable payload) collapse
//! into the offline-fallback analysis; only caller-requested cancellation
//! propagates. The UI never sees an error from this path.

use crate::normalize::Normalizer;
use crate::prompt;
use attune_core::{AttuneError, FacialAnalysis, VisionCapability, VisionRequest};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

pub struct CaptureAnalyzer {
    capability: Arc<dyn VisionCapability>,
    deadline: Duration,
}

impl CaptureAnalyzer {
    pub fn new(capability: Arc<dyn VisionCapability>, deadline_secs: u64) -> Self {
        Self {
            capability,
            deadline: Duration::from_secs(deadline_secs),
        }
    }

    /// Analyze one capture. Returns a canonical analysis in every case
    /// except caller cancellation.
    pub async fn analyze(
        &self,
        image_base64: String,
        signal: Option<CancellationToken>,
    ) -> Result<FacialAnalysis, AttuneError> {
        if let Some(token) = &signal {
            if token.is_cancelled() {
                return Err(AttuneError::Canceled);
            }
        }

        let request = VisionRequest {
            image_base64,
            prompt: prompt::FACS_PROMPT.to_string(),
            schema: Some(prompt::response_schema()),
            signal: signal.clone(),
        };

        let call = self.capability.analyze(request);
        let outcome = match &signal {
            Some(token) => {
                tokio::select! {
                    _ = token.cancelled() => return Err(AttuneError::Canceled),
                    outcome = tokio::time::timeout(self.deadline, call) => outcome,
                }
            }
            None => tokio::time::timeout(self.deadline, call).await,
        };

        let response = match outcome {
            Err(_elapsed) => {
                tracing::warn!(
                    deadline_secs = self.deadline.as_secs(),
                    "vision call exceeded deadline, using offline fallback"
                );
                return Ok(FacialAnalysis::offline_fallback());
            }
            Ok(Err(AttuneError::Canceled)) => return Err(AttuneError::Canceled),
            Ok(Err(e)) => {
                tracing::warn!(error = %e, "vision capability failed, using offline fallback");
                return Ok(FacialAnalysis::offline_fallback());
            }
            Ok(Ok(None)) => {
                tracing::info!("vision capability unavailable, using offline fallback");
                return Ok(FacialAnalysis::offline_fallback());
            }
            Ok(Ok(Some(response))) => response,
        };

        let mut normalizer = Normalizer::new();
        match normalizer.normalize_text(&response.content) {
            Ok(analysis) => Ok(analysis),
            Err(AttuneError::MalformedResponse(snippet)) => {
                tracing::warn!(
                    snippet = %snippet,
                    "unparseable vision payload, using offline fallback"
                );
                Ok(FacialAnalysis::offline_fallback())
            }
            Err(other) => Err(other),
        }
    }
}

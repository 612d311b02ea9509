//! One state check end-to-end.
//!
//! The pipeline is the single orchestration seam over the external
//! collaborators: it drives the vision capability (with deadline and
//! cancellation), normalizes the payload, scores quality, pulls the latest
//! subjective entry, compares against the active baseline, and persists the
//! encrypted record. Vision-side failures never surface — the offline
//! fallback stands in. Cancellation before the save leaves no partial state.

use attune_compare::{compare, fatigue_score, tension_score, with_derived_scalars};
use attune_core::comparison::ComparisonResult;
use attune_core::{
    AttuneConfig, AttuneError, FacialAnalysis, FacialBaseline, SubjectiveSource, VisionCapability,
};
use attune_store::{StateCheckDraft, StateCheckRepository};
use attune_vision::{assess, CaptureAnalyzer, QualityReport};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Everything one completed state check produces.
#[derive(Debug, Clone)]
pub struct StateCheckOutcome {
    pub id: String,
    pub analysis: FacialAnalysis,
    pub quality: QualityReport,
    pub comparison: ComparisonResult,
}

pub struct StateCheckPipeline {
    analyzer: CaptureAnalyzer,
    subjective: Arc<dyn SubjectiveSource>,
    repository: Arc<StateCheckRepository>,
}

impl StateCheckPipeline {
    pub fn new(
        capability: Arc<dyn VisionCapability>,
        subjective: Arc<dyn SubjectiveSource>,
        repository: Arc<StateCheckRepository>,
        config: &AttuneConfig,
    ) -> Self {
        Self {
            analyzer: CaptureAnalyzer::new(capability, config.vision.deadline_secs),
            subjective,
            repository,
        }
    }

    /// Run one capture through analysis, comparison, and persistence.
    ///
    /// `image` is the compressed capture; it is base64-encoded for the
    /// provider and stored encrypted alongside the analysis. Only
    /// caller-requested cancellation (before the write begins) and
    /// repository failures surface as errors.
    pub async fn run_state_check(
        &self,
        image: &[u8],
        user_note: Option<String>,
        signal: Option<CancellationToken>,
    ) -> Result<StateCheckOutcome, AttuneError> {
        let analysis = self
            .analyzer
            .analyze(BASE64.encode(image), signal.clone())
            .await?;
        let analysis = with_derived_scalars(analysis);

        let quality = assess(&analysis);
        tracing::debug!(
            score = quality.score,
            offline = analysis.is_offline_fallback(),
            "capture analyzed"
        );

        let entry = match self.subjective.most_recent_entry().await {
            Ok(entry) => entry,
            Err(e) => {
                tracing::warn!(error = %e, "subjective source failed, comparing without entry");
                None
            }
        };
        let baseline = self.repository.get_baseline().await?;
        let comparison = compare(entry.as_ref(), &analysis, baseline.as_ref());

        // Last cancel point: once the save starts it commits or fails.
        if signal.is_some_and(|token| token.is_cancelled()) {
            return Err(AttuneError::Canceled);
        }

        let draft = StateCheckDraft {
            user_note,
            ..StateCheckDraft::from_analysis(&analysis)
        };
        let id = self.repository.save_state_check(draft, Some(image)).await?;

        Ok(StateCheckOutcome {
            id,
            analysis,
            quality,
            comparison,
        })
    }

    /// Capture a neutral-rest frame and store it as the active baseline,
    /// superseding any previous one.
    pub async fn calibrate_baseline(
        &self,
        image: &[u8],
        signal: Option<CancellationToken>,
    ) -> Result<FacialBaseline, AttuneError> {
        let analysis = self
            .analyzer
            .analyze(BASE64.encode(image), signal)
            .await?;

        let masking_count = analysis.facs_interpretation.masking_indicators.len().min(4);
        let baseline = FacialBaseline::new(
            tension_score(&analysis),
            fatigue_score(&analysis),
            masking_count as f32 / 4.0,
        );
        self.repository.save_baseline(&baseline).await?;
        tracing::info!(id = %baseline.id, "baseline calibrated");
        Ok(baseline)
    }
}

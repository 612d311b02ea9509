pub mod baseline;
pub mod comparison;
pub mod config;
pub mod entry;
pub mod error;
pub mod facs;
pub mod prelude;

pub use baseline::FacialBaseline;
pub use comparison::{ComparisonResult, FacsInsights, SmileType};
pub use config::{AttuneConfig, CryptoConfig, RetryScheduleConfig, StorageConfig, VisionConfig};
pub use entry::{CapacityProfile, NeuroMetrics, SubjectiveEntry};
pub use error::AttuneError;
pub use facs::{
    ActionUnit, FacialAnalysis, FacsIntensity, FacsInterpretation, Observation, Severity,
};

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

/// One request into the multimodal vision provider.
///
/// The capability owns its own transport, rate limiting, and circuit
/// breaking; the core only hands it an image, a prompt, and a cancel handle.
#[derive(Debug, Clone)]
pub struct VisionRequest {
    /// Compressed capture, base64-encoded.
    pub image_base64: String,
    pub prompt: String,
    /// Optional response schema forwarded to providers that support one.
    pub schema: Option<serde_json::Value>,
    /// Caller-requested cancellation. Cancel surfaces `AttuneError::Canceled`.
    pub signal: Option<CancellationToken>,
}

/// Raw textual payload returned by the vision provider.
#[derive(Debug, Clone)]
pub struct VisionResponse {
    pub content: String,
}

/// The opaque async vision capability the comparison pipeline consumes.
///
/// `Ok(None)` means "provider unavailable" and is never an error: the
/// pipeline substitutes the offline-fallback analysis. Any other payload is
/// fed to the response normalizer.
#[async_trait]
pub trait VisionCapability: Send + Sync {
    async fn analyze(&self, request: VisionRequest) -> Result<Option<VisionResponse>, AttuneError>;
}

/// Pull source for the user's most recent subjective entry.
///
/// The core does not filter by age; whether an entry is fresh enough to
/// compare against a capture is the caller's judgment.
#[async_trait]
pub trait SubjectiveSource: Send + Sync {
    async fn most_recent_entry(&self) -> anyhow::Result<Option<SubjectiveEntry>>;
}

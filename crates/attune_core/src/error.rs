//! Error taxonomy for the comparison core.
//!
//! Each kind carries its handling policy: vision-side failures collapse into
//! the offline fallback, cancellation propagates with no side effects, and
//! repository failures surface to the caller. No variant ever carries
//! plaintext key material.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AttuneError {
    /// The normalizer could not parse the provider payload, even after the
    /// salvage strategies. Upstream replaces this with the offline fallback.
    #[error("provider response could not be parsed: {0}")]
    MalformedResponse(String),

    /// The vision capability reported itself unavailable (returned null).
    /// Swallowed by the pipeline; the offline fallback stands in.
    #[error("vision capability unavailable")]
    VisionUnavailable,

    /// Caller-requested cancellation. Propagates; no partial saves.
    #[error("operation canceled by caller")]
    Canceled,

    /// The vision call exceeded its deadline. Treated as unavailability.
    #[error("vision call exceeded the {0}s deadline")]
    Deadline(u64),

    /// Generic repository failure after the retry schedule was exhausted.
    #[error("storage failure: {0}")]
    Storage(String),

    /// The underlying store is full. Fails fast, no retry.
    #[error("storage quota exceeded")]
    StorageQuota,

    /// Persisted schema is newer than this build understands. The store
    /// opens read-only; writes surface this error.
    #[error("stored schema v{found} is newer than supported v{supported}")]
    SchemaMismatch { found: u32, supported: u32 },

    /// Ciphertext failed authentication. Skipped in bulk reads, surfaced on
    /// single reads.
    #[error("ciphertext failed authentication")]
    Decrypt,
}

impl AttuneError {
    /// Failures the comparison pipeline recovers from locally by
    /// substituting the offline-fallback analysis.
    pub fn is_provider_failure(&self) -> bool {
        matches!(
            self,
            Self::VisionUnavailable | Self::Deadline(_) | Self::MalformedResponse(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_failures_recoverable() {
        assert!(AttuneError::VisionUnavailable.is_provider_failure());
        assert!(AttuneError::Deadline(45).is_provider_failure());
        assert!(AttuneError::MalformedResponse("x".into()).is_provider_failure());
        assert!(!AttuneError::Canceled.is_provider_failure());
        assert!(!AttuneError::StorageQuota.is_provider_failure());
    }

    #[test]
    fn test_display_messages() {
        let e = AttuneError::SchemaMismatch {
            found: 3,
            supported: 2,
        };
        assert!(e.to_string().contains("v3"));
        assert!(e.to_string().contains("v2"));
    }
}

//! Convenience re-exports for downstream crates.

pub use crate::baseline::FacialBaseline;
pub use crate::comparison::{ComparisonResult, FacsInsights, SmileType};
pub use crate::config::AttuneConfig;
pub use crate::entry::SubjectiveEntry;
pub use crate::error::AttuneError;
pub use crate::facs::{
    clamp01, ActionUnit, FacialAnalysis, FacsIntensity, FacsInterpretation, Observation, Severity,
    CRITICAL_AUS, FATIGUE_AUS, OFFLINE_CLUE, PRESENCE_THRESHOLD, TENSION_AUS,
};
pub use crate::{SubjectiveSource, VisionCapability, VisionRequest, VisionResponse};

pub mod capture;
pub mod normalize;
pub mod prompt;
pub mod providers;
pub mod quality;

pub use capture::CaptureAnalyzer;
pub use normalize::{anatomical_name, salvage_json, Coercion, Normalizer};
pub use providers::{MockBehavior, MockVision};
pub use quality::{assess, QualityLevel, QualityReport};

pub mod derive;
pub mod engine;

pub use derive::{
    detected_aus, fatigue_score, has_au_with_intensity, low_expressiveness, norm, smile_type,
    tension_score, with_derived_scalars,
};
pub use engine::compare;

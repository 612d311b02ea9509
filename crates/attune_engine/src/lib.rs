pub mod pipeline;

pub use pipeline::{StateCheckOutcome, StateCheckPipeline};

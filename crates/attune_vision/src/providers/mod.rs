pub mod mock;

pub use mock::{MockBehavior, MockVision};

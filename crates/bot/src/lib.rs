pub mod metrics;
pub mod orchestrator;
pub mod pipeline;
pub mod state;

pub use orchestrator::{SniperLoop, SweepReport};
pub use pipeline::{Pipeline, ProcessOutcome};

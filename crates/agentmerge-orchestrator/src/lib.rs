pub mod apply;
pub mod orchestrator;

pub use apply::apply_merged;
pub use orchestrator::{aggregate_file, MergeOrchestrator};

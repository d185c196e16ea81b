pub mod ai;
pub mod events;
pub mod fairness;
pub mod fallback;
pub mod providers;
pub mod rate_limit;
pub mod recommendations;
pub mod upstream;

pub use recommendations::{Orchestrator, PipelineSettings};

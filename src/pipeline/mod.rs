pub mod config;
pub mod context;
pub mod failure;
pub mod orchestrator;
pub mod phase_trait;
pub mod phases;
pub mod report;
pub mod reproducible;
pub mod stage;

pub use config::PipelineConfig;
pub use context::PipelineContext;
pub use orchestrator::PipelineOrchestrator;
pub use report::BuildReport;
pub use reproducible::{verify_reproducible, ReproducibilityReport};

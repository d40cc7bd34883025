//! Turning a `PipelineSpec` and a source tree into what the engine consumes

pub mod context;
pub mod dockerfile;

pub use context::{default_ignore_patterns, render_dockerignore, BuildContext};
pub use dockerfile::DockerfileRenderer;

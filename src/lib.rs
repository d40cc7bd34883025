//! riskbox - two-stage container image pipeline for the `risk_model` service
//!
//! A [`PipelineSpec`] describes a `builder` stage that compiles one release
//! executable in a pinned toolchain image and a `production` stage that ships
//! only that executable with its runtime libraries. riskbox validates the
//! spec, renders it to a multi-stage Dockerfile, drives a container engine
//! through both stages and checks that the production image holds the
//! artifact and nothing of the toolchain.
//!
//! # Example Usage
//!
//! ```ignore
//! use riskbox::pipeline::{PipelineConfig, PipelineContext, PipelineOrchestrator};
//! use riskbox::engine::DockerEngine;
//! use riskbox::PipelineSpec;
//! use std::sync::Arc;
//!
//! async fn build() -> anyhow::Result<()> {
//!     let spec = PipelineSpec::discover(".".as_ref())?;
//!     let engine = Arc::new(DockerEngine::connect()?);
//!     let mut context = PipelineContext::new(engine, spec, ".".into(), PipelineConfig::default());
//!
//!     let report = PipelineOrchestrator::new().execute(&mut context).await?;
//!     println!("{}", report.to_human());
//!     Ok(())
//! }
//! ```
//!
//! # Project Structure
//!
//! - [`output`]: the `PipelineSpec` schema
//! - [`validation`]: image rules checked before anything is built
//! - [`render`]: Dockerfile rendering and build context packaging
//! - [`engine`]: container engine abstraction over the Docker API
//! - [`pipeline`]: phases, orchestration and verification

pub mod cli;
pub mod config;
pub mod engine;
pub mod error;
pub mod image;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod render;
pub mod stack;
pub mod util;
pub mod validation;

pub use config::{ConfigError, RiskboxConfig};
pub use error::PipelineError;
pub use output::PipelineSpec;
pub use util::{init_from_env, init_logging, LoggingConfig};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");

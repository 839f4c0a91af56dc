//! # vigil-server
//!
//! Composition root and process shell for the Vigil guard.
//!
//! - [`config`] - layered TOML and `VIGIL__*` environment configuration
//! - [`observability`] - tracing setup with a reloadable level filter
//! - [`pipeline`] - assembles the audit service, session store and stages
//!   into a [`GuardPipeline`]

pub mod config;
pub mod observability;
pub mod pipeline;

pub use config::{AppConfig, LoggingConfig};
pub use observability::{apply_logging_level, init_tracing_with};
pub use pipeline::{GuardPipeline, GuardPipelineBuilder, PipelineError};

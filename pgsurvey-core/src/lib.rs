//! Core library for pgsurvey.
//!
//! This crate holds everything behind the `pgsurvey` command line: option
//! validation, the report model, report sources (saved file or live
//! collection), the encoders, and output routing.
//!
//! # Security Guarantees
//! - All database sessions are read-only
//! - Passwords are never logged or serialized, and are zeroed on drop
//! - Connection behavior does not depend on ignored libpq variables
//!
//! # Pipeline
//! A run flows through four stages, each usable on its own:
//! 1. [`config::ConfigValidator`] turns raw options into a [`Configuration`]
//! 2. [`source::ReportSource`] loads or collects a [`Report`]
//! 3. [`render::render`] encodes it with exactly one [`render::Encoder`]
//! 4. [`output::Destination`] delivers the bytes to stdout, a file or a pager

pub mod collector;
pub mod config;
pub mod environment;
pub mod error;
pub mod logging;
pub mod models;
pub mod output;
pub mod render;
pub mod security;
pub mod source;

// Re-export commonly used types
pub use collector::Collector;
#[cfg(feature = "postgresql")]
pub use collector::PostgresCollector;
pub use config::{
    ConfigValidator, Configuration, Invocation, OutputFormat, RawOptions, RunRequest,
};
pub use environment::Environment;
pub use error::{ConfigError, PgSurveyError, Result};
pub use models::Report;
pub use output::Destination;
pub use source::ReportSource;

//! IdeaForge Common Library
//!
//! Shared code for the IdeaForge services including:
//! - Submission and prompt fragment storage (Postgres and in-memory)
//! - Text generation client abstraction
//! - Retry policy for remote calls
//! - The submission pipeline
//! - Error types and handling
//! - Configuration management
//! - Metrics and observability

pub mod config;
pub mod db;
pub mod errors;
pub mod llm;
pub mod metrics;
pub mod pipeline;
pub mod retry;

// Re-export commonly used types
pub use errors::{AppError, Result};
pub use config::AppConfig;
pub use db::{IdeaStore, MemoryStore, Repository};
pub use llm::TextGenerator;
pub use pipeline::SubmissionPipeline;

/// Application version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default text generation model
pub const DEFAULT_TEXT_MODEL: &str = "gpt-5-nano-2025-08-07";

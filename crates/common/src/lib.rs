//! Chronoscope Common Library
//!
//! Shared code for the Chronoscope services including:
//! - Database models, store traits and the Postgres repository
//! - Lexicon matching of texts against dated language layers
//! - Research request lifecycle and result ingestion
//! - Dispatch to the external computation service
//! - Error types and handling
//! - Configuration management
//! - Authentication utilities
//! - Metrics and observability

pub mod auth;
pub mod config;
pub mod db;
pub mod dispatch;
pub mod errors;
pub mod ingestion;
pub mod lifecycle;
pub mod matching;
pub mod metrics;

// Re-export commonly used types
pub use config::AppConfig;
pub use db::{MemoryStore, Repository, Store};
pub use errors::{AppError, Result};
pub use ingestion::ResultIngestion;
pub use lifecycle::RequestLifecycle;

/// Application version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

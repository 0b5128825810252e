//! Index Lifecycle Library
//!
//! Keeps a set of search-engine indices in line with a declared schema and
//! moves their contents in and out of zip backups.

pub mod admin;
pub mod backup;
pub mod config;
pub mod engine;
pub mod lifecycle;
pub mod rebuild;
pub mod report;
pub mod schema;
pub mod utils;

// Re-export commonly used types
pub use config::Config;
pub use lifecycle::LifecycleOrchestrator;
pub use utils::errors::LifecycleError;
pub type Result<T> = std::result::Result<T, LifecycleError>;

//! Utility modules for the index lifecycle core.

pub mod errors;
pub mod logger;

pub use errors::{LifecycleError, Result};

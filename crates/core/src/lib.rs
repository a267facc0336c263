//! PhysRAG Core Library
//!
//! This crate provides the foundational utilities shared by every PhysRAG crate:
//! - Error handling (`AppError`, `AppResult`)
//! - Logging infrastructure
//! - Layered configuration (`RagConfig`)

pub mod config;
pub mod error;
pub mod logging;

// Re-export commonly used types
pub use config::RagConfig;
pub use error::{AppError, AppResult};

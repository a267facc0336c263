//! Prompt system for PhysRAG.
//!
//! This crate provides the instruction templates wrapped around the
//! grounding context:
//! - YAML-based prompt definitions (built-in and workspace overrides)
//! - Handlebars template rendering

pub mod builder;
pub mod loader;
pub mod types;

// Re-export main types
pub use builder::PromptSet;
pub use loader::{builtin_prompt, load_overrides};
pub use types::{BuiltPrompt, PromptDefinition, PromptKind, PromptVars};

//! Command handlers for the PhysRAG CLI.

pub mod chat;
pub mod search;
pub mod status;

pub use chat::{ChatCommand, ExplainCommand};
pub use search::{SearchCommand, SimilarCommand};
pub use status::{HealthCommand, StatsCommand};

//! Answering commands.

use crate::output::{print_json, print_turn, report_failure};
use clap::Args;
use physrag_core::AppResult;
use physrag_knowledge::{RagEngine, SearchType};

/// Ask a question and get a grounded answer
#[derive(Args, Debug)]
pub struct ChatCommand {
    /// The question to ask
    pub message: String,

    /// Search type used to find passages (hybrid, vector, keyword)
    #[arg(short = 't', long = "type", default_value = "hybrid")]
    pub search_type: SearchType,

    /// Number of passages to retrieve
    #[arg(short = 'k', long)]
    pub top_k: Option<usize>,

    /// Leave citations out of the response
    #[arg(long)]
    pub no_sources: bool,
}

impl ChatCommand {
    pub async fn execute(&self, engine: &RagEngine, json: bool) -> AppResult<()> {
        tracing::debug!("Chat options: {:?}", self);

        let turn = engine
            .chat(&self.message, !self.no_sources, self.search_type, self.top_k)
            .await
            .map_err(report_failure)?;

        if json {
            print_json(&turn)
        } else {
            print_turn(&turn);
            Ok(())
        }
    }
}

/// Explain a physics concept
#[derive(Args, Debug)]
pub struct ExplainCommand {
    /// Concept to explain, e.g. "inertia"
    pub concept: String,

    /// Number of passages to retrieve
    #[arg(short = 'k', long)]
    pub top_k: Option<usize>,
}

impl ExplainCommand {
    pub async fn execute(&self, engine: &RagEngine, json: bool) -> AppResult<()> {
        let turn = engine
            .explain(&self.concept, self.top_k)
            .await
            .map_err(report_failure)?;

        if json {
            print_json(&turn)
        } else {
            print_turn(&turn);
            Ok(())
        }
    }
}

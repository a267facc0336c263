//! Retrieval-only commands.

use crate::output::{print_json, print_results, report_failure};
use clap::Args;
use physrag_core::AppResult;
use physrag_knowledge::{RagEngine, SearchType};

const PREVIEW_CHARS: usize = 160;

/// Rank textbook passages for a query
#[derive(Args, Debug)]
pub struct SearchCommand {
    /// Query text
    pub query: String,

    /// Search type (hybrid, vector, keyword)
    #[arg(short = 't', long = "type", default_value = "hybrid")]
    pub search_type: SearchType,

    /// Number of passages to return
    #[arg(short = 'k', long)]
    pub top_k: Option<usize>,
}

impl SearchCommand {
    pub async fn execute(&self, engine: &RagEngine, json: bool) -> AppResult<()> {
        tracing::debug!("Search options: {:?}", self);

        let result = engine
            .search(&self.query, self.search_type, self.top_k, None)
            .await
            .map_err(report_failure)?;

        if json {
            print_json(&result)
        } else {
            print_results(&result, PREVIEW_CHARS);
            Ok(())
        }
    }
}

/// Find passages semantically close to a text
#[derive(Args, Debug)]
pub struct SimilarCommand {
    /// Text to compare against
    pub text: String,

    /// Number of passages to return
    #[arg(short = 'k', long)]
    pub top_k: Option<usize>,
}

impl SimilarCommand {
    pub async fn execute(&self, engine: &RagEngine, json: bool) -> AppResult<()> {
        let result = engine
            .similar(&self.text, self.top_k)
            .await
            .map_err(report_failure)?;

        if json {
            print_json(&result)
        } else {
            print_results(&result, PREVIEW_CHARS);
            Ok(())
        }
    }
}

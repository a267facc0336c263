//! Health and stats commands.

use crate::output::print_json;
use clap::Args;
use physrag_core::{AppError, AppResult};
use physrag_knowledge::{RagEngine, ServiceStatus};

/// Check provider reachability
#[derive(Args, Debug)]
pub struct HealthCommand {
    /// Exit with an error when any provider is down
    #[arg(long)]
    pub strict: bool,
}

impl HealthCommand {
    pub async fn execute(&self, engine: &RagEngine, json: bool) -> AppResult<()> {
        let report = engine.health().await;

        if json {
            print_json(&report)?;
        } else {
            println!("Status: {:?}", report.status);
            for (name, service) in &report.services {
                let mark = match service.status {
                    ServiceStatus::Up => "up",
                    ServiceStatus::Down => "down",
                };
                print!("  {:<11} {:<5} {} ({} ms)", name, mark, service.provider, service.latency_ms);
                if let Some(error) = &service.error {
                    print!(" - {}", error);
                }
                println!();
            }
            if let Some(size) = report.corpus_size {
                println!("  Corpus: {} chunks", size);
            }
            println!("  Checked: {}", report.checked_at.to_rfc3339());
        }

        if self.strict && !report.is_healthy() {
            return Err(AppError::Config(
                "one or more providers are unavailable".to_string(),
            ));
        }
        Ok(())
    }
}

/// Show engine configuration and corpus size
#[derive(Args, Debug)]
pub struct StatsCommand {}

impl StatsCommand {
    pub async fn execute(&self, engine: &RagEngine, json: bool) -> AppResult<()> {
        let stats = engine.stats().await;

        if json {
            return print_json(&stats);
        }

        println!(
            "Embedding:  {} / {} ({} dims)",
            stats.embedding_provider, stats.embedding_model, stats.embedding_dimensions
        );
        println!("Index:      {} / {}", stats.index_backend, stats.collection);
        match stats.corpus_size {
            Some(size) => println!("Corpus:     {} chunks", size),
            None => println!("Corpus:     unknown"),
        }
        println!(
            "Generation: {} / {} (max tokens {}, temperature {})",
            stats.generation_provider, stats.generation_model, stats.max_tokens, stats.temperature
        );
        println!(
            "Retrieval:  top_k {} (max {}), alpha {}, context {} chars",
            stats.default_top_k, stats.max_top_k, stats.hybrid_alpha, stats.max_context_chars
        );
        Ok(())
    }
}

//! Terminal and JSON rendering of engine results.

use physrag_core::{AppError, AppResult};
use physrag_knowledge::{ChatTurn, Citation, RagFailure, RetrievalResult};
use serde::Serialize;

pub fn print_json<T: Serialize>(value: &T) -> AppResult<()> {
    let text = serde_json::to_string_pretty(value)?;
    println!("{}", text);
    Ok(())
}

/// Log where a request failed and hand back the underlying error.
pub fn report_failure(failure: RagFailure) -> AppError {
    tracing::error!(
        stage = %failure.stage,
        state = ?failure.state,
        search_secs = failure.timings.search_time.as_secs_f64(),
        generation_secs = failure.timings.generation_time.as_secs_f64(),
        "Request failed"
    );
    failure.into_error()
}

fn location(chapter: Option<&str>, section: Option<&str>) -> String {
    match (chapter, section) {
        (Some(c), Some(s)) => format!("{} / {}", c, s),
        (Some(c), None) => c.to_string(),
        (None, Some(s)) => s.to_string(),
        (None, None) => "(unlabelled)".to_string(),
    }
}

pub fn print_results(result: &RetrievalResult, preview_chars: usize) {
    if result.degraded {
        println!("Note: one search branch was unavailable; results may be incomplete.");
    }

    if result.is_empty() {
        println!("No matching passages.");
    }

    for (i, scored) in result.chunks.iter().enumerate() {
        let chunk = &scored.chunk;
        println!(
            "{}. [{:.3}] {} ({})",
            i + 1,
            scored.score,
            chunk.id,
            location(chunk.chapter.as_deref(), chunk.section.as_deref())
        );
        println!(
            "   {}",
            physrag_knowledge::types::truncate_preview(&chunk.content, preview_chars)
        );
    }

    println!();
    println!(
        "{} results, {} search in {:.2}s",
        result.len(),
        result.search_type,
        result.search_time.as_secs_f64()
    );
}

fn print_citation(citation: &Citation) {
    println!(
        "[{}] {} ({}) score {:.3}",
        citation.rank,
        citation.chunk_id,
        location(citation.chapter.as_deref(), citation.section.as_deref()),
        citation.score
    );
    println!("    {}", citation.preview);
}

pub fn print_turn(turn: &ChatTurn) {
    if turn.degraded {
        println!("Note: one search branch was unavailable; sources may be incomplete.");
    }

    println!("Answer:");
    println!("{}", turn.answer);
    println!();

    if turn.citations.is_empty() {
        println!("Sources: (none)");
    } else {
        println!("Sources:");
        for citation in &turn.citations {
            print_citation(citation);
        }
    }

    println!();
    println!(
        "{} passages retrieved ({}), confidence {:.2}, search {:.2}s, generation {:.2}s",
        turn.search_results_count,
        turn.search_type,
        turn.confidence,
        turn.search_time.as_secs_f64(),
        turn.generation_time.as_secs_f64()
    );
}

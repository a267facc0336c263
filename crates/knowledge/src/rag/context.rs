//! Grounding context assembly.
//!
//! Chunks are taken in ranked order and appended whole while the running
//! text stays within the character budget; the first chunk that does not
//! fit ends assembly. A chunk is never split.

use crate::types::{Citation, ScoredChunk};

const SEPARATOR: &str = "\n\n---\n\n";

/// Context text plus the chunks it was built from.
#[derive(Debug, Clone, Default)]
pub struct AssembledContext {
    pub text: String,
    /// Exactly the chunks present in `text`, in order
    pub included: Vec<ScoredChunk>,
    /// Ranked chunks left out by the budget or the chunk cap
    pub dropped: usize,
}

impl AssembledContext {
    pub fn is_empty(&self) -> bool {
        self.included.is_empty()
    }

    /// Highest score among included chunks, 0 when nothing was included.
    pub fn confidence(&self) -> f32 {
        self.included
            .iter()
            .map(|c| c.score)
            .fold(0.0f32, f32::max)
            .clamp(0.0, 1.0)
    }

    /// One citation per included chunk, optionally capped.
    pub fn citations(&self, max_citations: Option<usize>, preview_chars: usize) -> Vec<Citation> {
        let limit = max_citations.unwrap_or(usize::MAX);
        self.included
            .iter()
            .take(limit)
            .enumerate()
            .map(|(i, scored)| Citation::from_scored(i + 1, scored, preview_chars))
            .collect()
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ContextAssembler {
    max_chars: usize,
}

impl ContextAssembler {
    pub fn new(max_chars: usize) -> Self {
        Self { max_chars }
    }

    pub fn max_chars(&self) -> usize {
        self.max_chars
    }

    /// Build the greedy prefix of `ranked` that fits the budget.
    ///
    /// `max_chunks` additionally caps how many chunks may be included.
    pub fn assemble(&self, ranked: &[ScoredChunk], max_chunks: Option<usize>) -> AssembledContext {
        let cap = max_chunks.unwrap_or(usize::MAX);
        let mut text = String::new();
        let mut used = 0usize;
        let mut included = Vec::new();

        for scored in ranked.iter().take(cap) {
            let block = format_block(included.len() + 1, scored);
            let extra = block.chars().count()
                + if included.is_empty() {
                    0
                } else {
                    SEPARATOR.chars().count()
                };

            if used + extra > self.max_chars {
                tracing::debug!(
                    chunk = %scored.chunk.id,
                    used,
                    budget = self.max_chars,
                    "Context budget reached"
                );
                break;
            }

            if !included.is_empty() {
                text.push_str(SEPARATOR);
            }
            text.push_str(&block);
            used += extra;
            included.push(scored.clone());
        }

        AssembledContext {
            text,
            dropped: ranked.len() - included.len(),
            included,
        }
    }
}

/// `[Source n] Chapter: X | Section: Y` header followed by the chunk text.
fn format_block(n: usize, scored: &ScoredChunk) -> String {
    let chunk = &scored.chunk;
    let mut header = format!("[Source {}]", n);

    let mut labels = Vec::new();
    if let Some(chapter) = chunk.chapter.as_deref().filter(|c| !c.is_empty()) {
        labels.push(format!("Chapter: {}", chapter));
    }
    if let Some(section) = chunk.section.as_deref().filter(|s| !s.is_empty()) {
        labels.push(format!("Section: {}", section));
    }
    if !labels.is_empty() {
        header.push(' ');
        header.push_str(&labels.join(" | "));
    }

    format!("{}\n{}", header, chunk.content)
}

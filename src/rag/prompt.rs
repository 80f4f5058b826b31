//! Prompt assembly for grounded answers.
//!
//! The template asks for a short synthesis followed by key-fact bullets,
//! inline `[Title]` citations and cautious wording when the context is thin.

use super::store::RetrievalHit;

const EMPTY_CONTEXT: &str = "None";

/// Renders the generation prompt from the first `max_context_chunks` hits.
///
/// Each excerpt is the trimmed chunk text cut to at most `max_chunk_chars`
/// characters. With no hits the context section reads `None`.
pub fn build_prompt(
    question: &str,
    hits: &[RetrievalHit],
    max_context_chunks: usize,
    max_chunk_chars: usize,
) -> String {
    let context = format_context(hits, max_context_chunks, max_chunk_chars);

    format!(
        "You are a meticulous research assistant. Use the provided context snippets (which may come from different\n\
papers) to answer the user's question succinctly, with citations to titles. If the context is insufficient,\n\
say so briefly and suggest what to search for next.\n\
\n\
Question:\n\
{question}\n\
\n\
Context snippets:\n\
{context}\n\
\n\
Instructions:\n\
- Write a short synthesis (3–6 sentences).\n\
- Then list 3–5 bullet points of key facts.\n\
- Cite supporting titles inline like [Title].\n\
- Avoid guessing; prefer cautious wording if uncertain.\n",
        question = question,
        context = context,
    )
}

fn format_context(hits: &[RetrievalHit], max_context_chunks: usize, max_chunk_chars: usize) -> String {
    let bullets: Vec<String> = hits
        .iter()
        .take(max_context_chunks)
        .map(|hit| {
            format!(
                "- TITLE: {}\n  EXCERPT: {}",
                hit.title,
                truncate_chars(hit.chunk_text.trim(), max_chunk_chars)
            )
        })
        .collect();

    if bullets.is_empty() {
        EMPTY_CONTEXT.to_string()
    } else {
        bullets.join("\n")
    }
}

/// Cuts on a char boundary; byte slicing would split multi-byte characters.
fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((byte_index, _)) => &text[..byte_index],
        None => text,
    }
}

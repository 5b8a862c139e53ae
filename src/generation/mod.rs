// Generation module
// Prompt assembly, answer generation and document summaries


use async_trait::async_trait;
use std::fmt::Write as _;
use tracing::debug;

use crate::Result;
use crate::retrieval::{ContextFragment, format_context};

/// Returned instead of calling the model when retrieval found nothing
pub const NO_CONTEXT_MESSAGE: &str =
    "No relevant context found in the uploaded documents. Please try a different question.";

const SYSTEM_PREAMBLE: &str = "You are a helpful assistant. Use the provided document context and chat history to answer accurately.";

const SUMMARY_PLACEHOLDER: &str = "...";

/// A text generation model
#[async_trait]
pub trait Generator: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<String>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatTurn {
    pub role: Role,
    pub content: String,
}

impl ChatTurn {
    #[inline]
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    #[inline]
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Answer {
    pub text: String,
    /// Fragments the answer was generated from, in rank order
    pub context: Vec<ContextFragment>,
}

/// Assemble the generation prompt from the retrieved context and the last
/// `history_turns` turns of the conversation
#[inline]
pub fn build_prompt(
    query: &str,
    fragments: &[ContextFragment],
    history: &[ChatTurn],
    history_turns: usize,
) -> String {
    let recent = &history[history.len().saturating_sub(history_turns)..];

    let mut history_block = String::new();
    for turn in recent {
        let speaker = match turn.role {
            Role::User => "User",
            Role::Assistant => "AI",
        };
        let _ = writeln!(history_block, "{}: {}", speaker, turn.content);
    }

    format!(
        "{SYSTEM_PREAMBLE}\n\nChat History:\n{history_block}\n\nContext:\n{}\n\nQuestion: {query}\n\nAnswer:",
        format_context(fragments)
    )
}

/// Generate an answer to `query` from `fragments`.
///
/// With no fragments the model is not called and [`NO_CONTEXT_MESSAGE`] is
/// returned.
#[inline]
pub async fn answer(
    generator: &dyn Generator,
    query: &str,
    fragments: Vec<ContextFragment>,
    history: &[ChatTurn],
    history_turns: usize,
) -> Result<Answer> {
    if fragments.is_empty() {
        debug!("No context retrieved, skipping generation");
        return Ok(Answer {
            text: NO_CONTEXT_MESSAGE.to_string(),
            context: fragments,
        });
    }

    let prompt = build_prompt(query, &fragments, history, history_turns);
    debug!(
        "Generating answer from {} fragments ({} prompt chars)",
        fragments.len(),
        prompt.len()
    );
    let text = generator.generate(&prompt).await?;

    Ok(Answer {
        text: text.trim().to_string(),
        context: fragments,
    })
}

/// Collapse whitespace and shorten `text` to at most `width` characters,
/// cutting on word boundaries and marking the cut with `...`
#[inline]
pub fn summarize(text: &str, width: usize) -> String {
    let words = text.split_whitespace().collect::<Vec<_>>();
    let collapsed = words.join(" ");
    if collapsed.chars().count() <= width {
        return collapsed;
    }

    let budget = width.saturating_sub(SUMMARY_PLACEHOLDER.len());
    let mut summary = String::new();
    let mut used = 0;
    for word in words {
        let separator = usize::from(!summary.is_empty());
        let needed = separator + word.chars().count();
        if used + needed > budget {
            break;
        }
        if separator == 1 {
            summary.push(' ');
        }
        summary.push_str(word);
        used += needed;
    }

    summary.push_str(SUMMARY_PLACEHOLDER);
    summary
}

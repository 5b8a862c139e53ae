#[cfg(test)]
mod tests;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{QaError, Result};

/// Configuration for word-window chunking
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkingConfig {
    /// Number of words per chunk
    pub max_length: usize,
    /// Number of words shared by adjacent chunks
    pub overlap: usize,
}

impl Default for ChunkingConfig {
    #[inline]
    fn default() -> Self {
        Self {
            max_length: 500,
            overlap: 50,
        }
    }
}

impl ChunkingConfig {
    /// Words the window advances per chunk
    #[inline]
    pub fn step(&self) -> Result<usize> {
        if self.max_length == 0 || self.overlap >= self.max_length {
            return Err(QaError::InvalidChunking {
                max_length: self.max_length,
                overlap: self.overlap,
            });
        }
        Ok(self.max_length - self.overlap)
    }

    #[inline]
    pub fn chunk(&self, text: &str) -> Result<Vec<String>> {
        chunk_text(text, self.max_length, self.overlap)
    }
}

/// Split text into windows of `max_length` whitespace-delimited words, each
/// starting `max_length - overlap` words after the previous one.
///
/// Words inside a chunk are joined by a single space. Blank input yields no
/// chunks. Every start offset below the word count opens a window, so the
/// tail of the text may also appear as shorter overlap-only windows.
#[inline]
pub fn chunk_text(text: &str, max_length: usize, overlap: usize) -> Result<Vec<String>> {
    let step = ChunkingConfig {
        max_length,
        overlap,
    }
    .step()?;

    let words = text.split_whitespace().collect::<Vec<_>>();
    let mut chunks = Vec::with_capacity(words.len().div_ceil(step));

    let mut start = 0;
    while start < words.len() {
        let end = (start + max_length).min(words.len());
        chunks.push(words[start..end].join(" "));
        start += step;
    }

    debug!(
        "Chunked {} words into {} chunks (window {}, overlap {})",
        words.len(),
        chunks.len(),
        max_length,
        overlap
    );

    Ok(chunks)
}

// Retrieval module
// Nearest-neighbour search over the index store, source/type filtering and
// context formatting


use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::Result;
use crate::config::ConfigError;
use crate::database::{ChunkRecord, IndexStore, LoadedIndex};
use crate::embeddings::{Embedder, embed_query};
use crate::extraction::normalize_extension;

/// Separator placed between fragments when they are joined into one context
pub const CONTEXT_SEPARATOR: &str = "\n---\n";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    /// Number of nearest candidates fetched before filtering
    pub top_k: usize,
    /// Truncate each fragment's text to this many characters
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context_char_limit: Option<usize>,
    /// Chat turns carried into the generation prompt
    pub history_turns: usize,
}

impl Default for RetrievalConfig {
    #[inline]
    fn default() -> Self {
        Self {
            top_k: 10,
            context_char_limit: None,
            history_turns: 4,
        }
    }
}

impl RetrievalConfig {
    #[inline]
    pub fn validate(&self) -> std::result::Result<(), ConfigError> {
        if !(1..=1000).contains(&self.top_k) {
            return Err(ConfigError::InvalidTopK(self.top_k));
        }

        if self.context_char_limit == Some(0) {
            return Err(ConfigError::InvalidContextLimit(0));
        }

        Ok(())
    }
}

/// Restricts search results by source filename and file type. Empty lists
/// mean "no restriction".
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchFilters {
    pub sources: Vec<String>,
    pub file_types: Vec<String>,
}

impl SearchFilters {
    #[inline]
    #[must_use]
    pub fn with_sources<I, S>(mut self, sources: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.sources.extend(sources.into_iter().map(Into::into));
        self
    }

    /// File types are normalised to a lowercase extension with a leading dot
    #[inline]
    #[must_use]
    pub fn with_file_types<I, S>(mut self, file_types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.file_types.extend(
            file_types
                .into_iter()
                .map(|t| normalize_extension(t.as_ref()))
                .filter(|t| !t.is_empty()),
        );
        self
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.sources.is_empty() && self.file_types.is_empty()
    }

    #[inline]
    pub fn matches(&self, row: &ChunkRecord) -> bool {
        if !self.sources.is_empty() && !self.sources.contains(&row.source) {
            return false;
        }

        if !self.file_types.is_empty() {
            let Some(file_type) = row.file_type.as_deref() else {
                return false;
            };
            let file_type = normalize_extension(file_type);
            if !self.file_types.contains(&file_type) {
                return false;
            }
        }

        true
    }
}

/// A retrieved chunk, labelled with its source document
#[derive(Debug, Clone, PartialEq)]
pub struct ContextFragment {
    pub source: String,
    pub text: String,
    pub file_type: Option<String>,
    /// Position among the nearest-neighbour candidates, before filtering
    pub rank: usize,
    pub distance: f32,
}

impl ContextFragment {
    fn from_row(row: &ChunkRecord, rank: usize, distance: f32, char_limit: Option<usize>) -> Self {
        let text = row.text.trim();
        let text = match char_limit {
            Some(limit) => text.chars().take(limit).collect(),
            None => text.to_string(),
        };

        Self {
            source: row.source.clone(),
            text,
            file_type: row.file_type.clone(),
            rank,
            distance,
        }
    }
}

impl fmt::Display for ContextFragment {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}]: {}", self.source, self.text)
    }
}

/// Join fragments into the context block handed to the generator
#[inline]
pub fn format_context(fragments: &[ContextFragment]) -> String {
    fragments
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(CONTEXT_SEPARATOR)
}

/// Search a loaded index snapshot.
///
/// Filters are applied to the `k` nearest candidates only, so restrictive
/// filters can return fewer than `k` fragments. Candidate positions without a
/// metadata row are skipped.
#[inline]
pub fn search_loaded(
    loaded: &LoadedIndex,
    query_vector: &[f32],
    k: usize,
    filters: &SearchFilters,
    char_limit: Option<usize>,
) -> Result<Vec<ContextFragment>> {
    let Some(index) = loaded.index.as_ref() else {
        return Ok(Vec::new());
    };
    if index.is_empty() || loaded.metadata.is_empty() {
        return Ok(Vec::new());
    }

    let neighbors = index.search(query_vector, k)?;
    let candidates = neighbors.len();

    let mut fragments = Vec::with_capacity(candidates);
    for (rank, neighbor) in neighbors.into_iter().enumerate() {
        let Some(row) = loaded.metadata.get(neighbor.position) else {
            warn!(
                "Skipping candidate {} with no metadata row ({} rows)",
                neighbor.position,
                loaded.metadata.len()
            );
            continue;
        };

        if filters.matches(row) {
            fragments.push(ContextFragment::from_row(
                row,
                rank,
                neighbor.distance,
                char_limit,
            ));
        }
    }

    debug!(
        "Retrieved {} of {} candidates after filtering",
        fragments.len(),
        candidates
    );

    Ok(fragments)
}

pub struct Retriever {
    store: Arc<IndexStore>,
    embedder: Arc<dyn Embedder>,
    config: RetrievalConfig,
}

impl Retriever {
    #[inline]
    pub fn new(store: Arc<IndexStore>, embedder: Arc<dyn Embedder>, config: RetrievalConfig) -> Self {
        Self {
            store,
            embedder,
            config,
        }
    }

    #[inline]
    pub fn config(&self) -> &RetrievalConfig {
        &self.config
    }

    /// The `k` nearest fragments to `query_vector` that pass `filters`
    #[inline]
    pub async fn search(
        &self,
        query_vector: &[f32],
        k: usize,
        filters: &SearchFilters,
    ) -> Result<Vec<ContextFragment>> {
        let loaded = self.store.load().await?;
        search_loaded(
            &loaded,
            query_vector,
            k,
            filters,
            self.config.context_char_limit,
        )
    }

    /// Embed `query_text` and return the filtered fragments among the
    /// configured `top_k` nearest chunks
    #[inline]
    pub async fn answer_query(
        &self,
        query_text: &str,
        filters: &SearchFilters,
    ) -> Result<Vec<ContextFragment>> {
        self.answer_query_with_k(query_text, self.config.top_k, filters)
            .await
    }

    #[inline]
    pub async fn answer_query_with_k(
        &self,
        query_text: &str,
        k: usize,
        filters: &SearchFilters,
    ) -> Result<Vec<ContextFragment>> {
        let loaded = self.store.load().await?;
        if loaded.is_empty() {
            debug!("Index is empty, nothing to retrieve");
            return Ok(Vec::new());
        }

        let query_vector = embed_query(self.embedder.as_ref(), query_text).await?;
        search_loaded(
            &loaded,
            &query_vector,
            k,
            filters,
            self.config.context_char_limit,
        )
    }
}

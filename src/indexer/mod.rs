// Indexer module
// Ingests uploaded files: store, extract, chunk, embed, then one merge per batch

pub mod consistency;


use std::collections::BTreeSet;
use std::fmt;
use std::path::Path;
use std::sync::Arc;

use chrono::Local;
use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use crate::config::ConfigError;
use crate::database::{ChunkRecord, IndexStore, validate_filename};
use crate::embeddings::chunking::ChunkingConfig;
use crate::embeddings::{Embedder, embed_texts};
use crate::extraction::{TextExtractor, file_extension};
use crate::generation::summarize;
use crate::{QaError, Result};

pub use consistency::{ConsistencyReport, ConsistencyValidator};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestionConfig {
    /// Attach a short summary of each indexed file to its outcome
    pub summarize: bool,
    /// Maximum summary length in characters
    pub summary_width: usize,
    /// Files extracted and embedded at the same time
    pub concurrency: usize,
}

impl Default for IngestionConfig {
    #[inline]
    fn default() -> Self {
        Self {
            summarize: true,
            summary_width: 350,
            concurrency: 4,
        }
    }
}

impl IngestionConfig {
    #[inline]
    pub fn validate(&self) -> std::result::Result<(), ConfigError> {
        if !(20..=4096).contains(&self.summary_width) {
            return Err(ConfigError::InvalidSummaryWidth(self.summary_width));
        }

        if !(1..=64).contains(&self.concurrency) {
            return Err(ConfigError::InvalidConcurrency(self.concurrency));
        }

        Ok(())
    }
}

/// One file submitted for ingestion
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadedFile {
    pub filename: String,
    pub bytes: Vec<u8>,
}

impl UploadedFile {
    #[inline]
    pub fn new(filename: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            filename: filename.into(),
            bytes: bytes.into(),
        }
    }

    /// Read a file from disk, keeping only its file name
    #[inline]
    pub async fn from_path(path: &Path) -> Result<Self> {
        let filename = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .ok_or_else(|| QaError::InvalidFilename(path.display().to_string()))?;
        let bytes = tokio::fs::read(path).await?;
        Ok(Self { filename, bytes })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    AlreadyIndexed,
    NoText,
    NoChunks,
}

impl fmt::Display for SkipReason {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AlreadyIndexed => write!(f, "already indexed"),
            Self::NoText => write!(f, "no text content"),
            Self::NoChunks => write!(f, "no chunks produced"),
        }
    }
}

/// Terminal status of one file in an upload batch
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileOutcome {
    Indexed {
        chunks: usize,
        summary: Option<String>,
    },
    Skipped(SkipReason),
    Failed(String),
}

impl fmt::Display for FileOutcome {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Indexed { chunks, .. } => write!(f, "indexed ({} chunks)", chunks),
            Self::Skipped(reason) => write!(f, "skipped: {}", reason),
            Self::Failed(reason) => write!(f, "failed: {}", reason),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileReport {
    pub filename: String,
    pub outcome: FileOutcome,
}

/// Outcome of one `handle_upload` call, one entry per submitted file in
/// submission order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UploadReport {
    pub files: Vec<FileReport>,
    pub chunks_added: usize,
}

impl UploadReport {
    #[inline]
    pub fn indexed(&self) -> usize {
        self.count(|outcome| matches!(outcome, FileOutcome::Indexed { .. }))
    }

    #[inline]
    pub fn skipped(&self) -> usize {
        self.count(|outcome| matches!(outcome, FileOutcome::Skipped(_)))
    }

    #[inline]
    pub fn failed(&self) -> usize {
        self.count(|outcome| matches!(outcome, FileOutcome::Failed(_)))
    }

    fn count(&self, predicate: impl Fn(&FileOutcome) -> bool) -> usize {
        self.files.iter().filter(|f| predicate(&f.outcome)).count()
    }
}

/// A file that made it through embedding and waits for the batch merge
struct EmbeddedFile {
    chunks: Vec<String>,
    vectors: Vec<Vec<f32>>,
    file_type: String,
    summary: Option<String>,
}

enum Processed {
    Embedded(EmbeddedFile),
    Done(FileOutcome),
}

/// Coordinates ingestion of uploaded files into the index store
pub struct Indexer {
    store: Arc<IndexStore>,
    embedder: Arc<dyn Embedder>,
    extractor: Arc<dyn TextExtractor>,
    chunking: ChunkingConfig,
    ingestion: IngestionConfig,
    upload_lock: Mutex<()>,
}

impl Indexer {
    /// Invalid chunking parameters are rejected here rather than per file
    #[inline]
    pub fn new(
        store: Arc<IndexStore>,
        embedder: Arc<dyn Embedder>,
        extractor: Arc<dyn TextExtractor>,
        chunking: ChunkingConfig,
        ingestion: IngestionConfig,
    ) -> Result<Self> {
        chunking.step()?;
        ingestion.validate()?;

        Ok(Self {
            store,
            embedder,
            extractor,
            chunking,
            ingestion,
            upload_lock: Mutex::new(()),
        })
    }

    #[inline]
    pub fn store(&self) -> &Arc<IndexStore> {
        &self.store
    }

    /// Ingest `files`, reporting exactly one outcome per file.
    ///
    /// Per-file problems become `Skipped` or `Failed` outcomes. Only a failure
    /// of the final merge is returned as an error; in that case the batch's
    /// stored documents are removed and the persisted index is unchanged.
    #[inline]
    pub async fn handle_upload(&self, files: Vec<UploadedFile>) -> Result<UploadReport> {
        let _guard = self.upload_lock.lock().await;
        info!("Processing upload of {} files", files.len());

        let mut seen = self.store.indexed_documents().await?;
        let upload_date = Local::now().format("%Y-%m-%d").to_string();

        let mut filenames = Vec::with_capacity(files.len());
        let mut outcomes: Vec<Option<FileOutcome>> = Vec::with_capacity(files.len());
        let mut pending = Vec::new();

        for (slot, file) in files.into_iter().enumerate() {
            filenames.push(file.filename.clone());
            if seen.contains(&file.filename) {
                debug!("Skipping {}: already indexed", file.filename);
                outcomes.push(Some(FileOutcome::Skipped(SkipReason::AlreadyIndexed)));
            } else {
                seen.insert(file.filename.clone());
                outcomes.push(None);
                pending.push((slot, file));
            }
        }

        let processed = stream::iter(pending)
            .map(|(slot, file)| async move { (slot, self.process_file(file).await) })
            .buffered(self.ingestion.concurrency)
            .collect::<Vec<_>>()
            .await;

        let mut vectors = Vec::new();
        let mut rows = Vec::new();
        let mut embedded = Vec::new();

        for (slot, result) in processed {
            match result {
                Processed::Done(outcome) => outcomes[slot] = Some(outcome),
                Processed::Embedded(file) => {
                    let source = &filenames[slot];
                    rows.extend(file.chunks.iter().map(|chunk| {
                        ChunkRecord::new(source.as_str(), chunk.as_str())
                            .with_file_type(file.file_type.as_str())
                            .with_upload_date(upload_date.as_str())
                    }));
                    vectors.extend(file.vectors);
                    embedded.push((slot, file.chunks.len(), file.summary));
                }
            }
        }

        if let Err(e) = self.store.merge(&vectors, rows).await {
            error!("Merge of upload batch failed: {}", e);
            let stored = embedded
                .iter()
                .map(|(slot, ..)| filenames[*slot].as_str())
                .collect::<BTreeSet<_>>();
            self.discard_documents(stored).await;
            return Err(e);
        }

        for (slot, chunks, summary) in embedded {
            outcomes[slot] = Some(FileOutcome::Indexed { chunks, summary });
        }

        let report = UploadReport {
            files: filenames
                .into_iter()
                .zip(outcomes)
                .map(|(filename, outcome)| FileReport {
                    filename,
                    outcome: outcome.unwrap_or_else(|| {
                        FileOutcome::Failed("file was not processed".to_string())
                    }),
                })
                .collect(),
            chunks_added: vectors.len(),
        };

        info!(
            "Upload finished: {} indexed, {} skipped, {} failed, {} chunks added",
            report.indexed(),
            report.skipped(),
            report.failed(),
            report.chunks_added
        );

        Ok(report)
    }

    /// Clear the index, metadata and every stored document
    #[inline]
    pub async fn reset_all(&self) -> Result<()> {
        let _guard = self.upload_lock.lock().await;
        self.store.reset().await
    }

    /// Validate the store and delete stored documents without index rows.
    ///
    /// Holds the upload lock, so files of an upload still in progress are
    /// never mistaken for orphans.
    #[inline]
    pub async fn cleanup_orphaned_documents(&self) -> Result<usize> {
        let _guard = self.upload_lock.lock().await;
        let validator = ConsistencyValidator::new(&self.store);
        let report = validator.validate_consistency().await?;
        validator.cleanup_orphaned_documents(&report).await
    }

    async fn process_file(&self, file: UploadedFile) -> Processed {
        let UploadedFile { filename, bytes } = file;

        if let Err(e) = validate_filename(&filename) {
            warn!("Rejecting upload: {}", e);
            return Processed::Done(FileOutcome::Failed(e.to_string()));
        }

        if let Err(e) = self.store.store_document(&filename, &bytes).await {
            warn!("Failed to store {}: {}", filename, e);
            self.discard_documents([filename.as_str()]).await;
            return Processed::Done(FileOutcome::Failed(e.to_string()));
        }

        let outcome = self.extract_and_embed(&filename, bytes).await;
        if let Processed::Done(outcome) = &outcome {
            match outcome {
                FileOutcome::Failed(reason) => warn!("Failed to ingest {}: {}", filename, reason),
                other => debug!("{}: {}", filename, other),
            }
            self.discard_documents([filename.as_str()]).await;
        }
        outcome
    }

    async fn extract_and_embed(&self, filename: &str, bytes: Vec<u8>) -> Processed {
        let file_type = file_extension(filename);

        let extractor = Arc::clone(&self.extractor);
        let extension = file_type.clone();
        let extracted =
            tokio::task::spawn_blocking(move || extractor.extract(&bytes, &extension)).await;
        let text = match extracted {
            Ok(Ok(text)) => text,
            Ok(Err(e)) => return Processed::Done(FileOutcome::Failed(e.to_string())),
            Err(e) => {
                return Processed::Done(FileOutcome::Failed(format!(
                    "extraction task failed: {e}"
                )));
            }
        };

        if text.trim().is_empty() {
            return Processed::Done(FileOutcome::Skipped(SkipReason::NoText));
        }

        let chunks = match self.chunking.chunk(&text) {
            Ok(chunks) if chunks.is_empty() => {
                return Processed::Done(FileOutcome::Skipped(SkipReason::NoChunks));
            }
            Ok(chunks) => chunks,
            Err(e) => return Processed::Done(FileOutcome::Failed(e.to_string())),
        };

        let vectors = match embed_texts(self.embedder.as_ref(), &chunks).await {
            Ok(vectors) => vectors,
            Err(e) => return Processed::Done(FileOutcome::Failed(e.to_string())),
        };

        let summary = self
            .ingestion
            .summarize
            .then(|| summarize(&text, self.ingestion.summary_width));

        debug!("Embedded {} chunks from {}", chunks.len(), filename);

        Processed::Embedded(EmbeddedFile {
            chunks,
            vectors,
            file_type,
            summary,
        })
    }

    async fn discard_documents<'a>(&self, filenames: impl IntoIterator<Item = &'a str>) {
        for filename in filenames {
            if let Err(e) = self.store.remove_document(filename).await {
                warn!("Failed to remove stored document {}: {}", filename, e);
            }
        }
    }
}

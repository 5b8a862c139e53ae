use thiserror::Error;

pub type Result<T> = std::result::Result<T, QaError>;

#[derive(Error, Debug)]
pub enum QaError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid chunking parameters: overlap {overlap} must be smaller than max length {max_length}")]
    InvalidChunking { max_length: usize, overlap: usize },

    #[error("Invalid document filename: {0:?}")]
    InvalidFilename(String),

    #[error("Extraction error: {0}")]
    Extraction(String),

    #[error("Embedding error: {0}")]
    Embedding(String),

    #[error("Vector dimension mismatch: index uses {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Misaligned merge: {vectors} vectors for {rows} metadata rows")]
    MisalignedMerge { vectors: usize, rows: usize },

    #[error("Corrupt index state: {0}")]
    CorruptIndexState(String),

    #[error("Generation error: {0}")]
    Generation(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Other error: {0}")]
    Other(#[from] anyhow::Error),
}

pub mod commands;
pub mod config;
pub mod database;
pub mod embeddings;
pub mod extraction;
pub mod generation;
pub mod indexer;
pub mod retrieval;

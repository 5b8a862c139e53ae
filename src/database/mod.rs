// Database module
// Flat vector index and its positionally aligned metadata table, persisted as a pair

pub mod metadata;
pub mod store;
pub mod vector_index;

pub use metadata::ChunkRecord;
pub use store::{IndexStore, LoadedIndex, MergeSummary, StorePaths, validate_filename};
pub use vector_index::{FlatIndex, Neighbor};

// Consistency validation module
// Cross-checks the indexed sources against the raw document store

#[cfg(test)]
mod tests;

use tracing::{debug, info, warn};

use crate::Result;
use crate::database::IndexStore;
use crate::database::metadata::sources;

/// Comparison of what the index knows about and what the document store holds
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConsistencyReport {
    /// Number of vectors in the index
    pub index_vectors: usize,
    /// Number of rows in the metadata table
    pub metadata_rows: usize,
    /// Vector dimension, if an index exists
    pub dimension: Option<usize>,
    /// Distinct sources referenced by the metadata table
    pub indexed_sources: Vec<String>,
    /// Files present in the document store
    pub stored_documents: Vec<String>,
    /// Stored files that have no chunks in the index
    pub orphaned_documents: Vec<String>,
    /// Indexed sources whose raw file is gone from the document store
    pub missing_documents: Vec<String>,
    pub is_consistent: bool,
}

impl ConsistencyReport {
    #[inline]
    pub fn summary(&self) -> String {
        if self.is_consistent {
            format!(
                "Index is consistent: {} chunks from {} documents",
                self.metadata_rows,
                self.indexed_sources.len()
            )
        } else {
            format!(
                "Index inconsistencies found: {} orphaned documents, {} missing documents",
                self.orphaned_documents.len(),
                self.missing_documents.len()
            )
        }
    }

    #[inline]
    pub fn total_issues(&self) -> usize {
        self.orphaned_documents.len() + self.missing_documents.len()
    }
}

pub struct ConsistencyValidator<'a> {
    store: &'a IndexStore,
}

impl<'a> ConsistencyValidator<'a> {
    #[inline]
    pub fn new(store: &'a IndexStore) -> Self {
        Self { store }
    }

    /// Load the persisted state and compare it with the document store.
    ///
    /// A corrupt index is returned as an error rather than reported.
    #[inline]
    pub async fn validate_consistency(&self) -> Result<ConsistencyReport> {
        info!("Starting index consistency validation");

        let (loaded, stored_documents) = self.store.load_with_documents().await?;
        let indexed = sources(&loaded.metadata);
        debug!(
            "Found {} indexed sources and {} stored documents",
            indexed.len(),
            stored_documents.len()
        );

        let orphaned_documents = stored_documents
            .iter()
            .filter(|name| !indexed.contains(*name))
            .cloned()
            .collect::<Vec<_>>();
        let missing_documents = indexed
            .iter()
            .filter(|name| stored_documents.binary_search(*name).is_err())
            .cloned()
            .collect::<Vec<_>>();

        let is_consistent = orphaned_documents.is_empty() && missing_documents.is_empty();

        let report = ConsistencyReport {
            index_vectors: loaded.index.as_ref().map_or(0, |index| index.len()),
            metadata_rows: loaded.metadata.len(),
            dimension: loaded.index.as_ref().map(|index| index.dimension()),
            indexed_sources: indexed.into_iter().collect(),
            stored_documents,
            orphaned_documents,
            missing_documents,
            is_consistent,
        };

        if report.is_consistent {
            info!("Index consistency validation passed");
        } else {
            warn!("Index consistency validation found issues");
            Self::log_consistency_issues(&report);
        }

        Ok(report)
    }

    /// Remove stored documents that never made it into the index, so they no
    /// longer block re-uploading the same filename.
    ///
    /// Documents indexed after `report` was taken are kept. Uploads in flight
    /// from this process are excluded by going through
    /// [`Indexer::cleanup_orphaned_documents`](super::Indexer::cleanup_orphaned_documents).
    #[inline]
    pub async fn cleanup_orphaned_documents(&self, report: &ConsistencyReport) -> Result<usize> {
        let removed = self
            .store
            .remove_unindexed_documents(&report.orphaned_documents)
            .await?;

        if !removed.is_empty() {
            info!("Cleaned up {} orphaned documents", removed.len());
        }
        Ok(removed.len())
    }

    fn log_consistency_issues(report: &ConsistencyReport) {
        if !report.orphaned_documents.is_empty() {
            warn!(
                "Found {} stored documents without indexed chunks",
                report.orphaned_documents.len()
            );
        }

        if !report.missing_documents.is_empty() {
            warn!(
                "Found {} indexed sources missing from the document store",
                report.missing_documents.len()
            );
        }
    }
}

use std::fs;

use super::*;
use crate::database::{ChunkRecord, StorePaths};
use tempfile::TempDir;

#[test]
fn consistent_report() {
    let report = ConsistencyReport {
        index_vectors: 10,
        metadata_rows: 10,
        dimension: Some(4),
        indexed_sources: vec!["a.pdf".to_string()],
        stored_documents: vec!["a.pdf".to_string()],
        is_consistent: true,
        ..ConsistencyReport::default()
    };

    assert_eq!(report.total_issues(), 0);
    assert!(report.summary().contains("Index is consistent"));
    assert!(report.summary().contains("10 chunks from 1 documents"));
}

#[test]
fn inconsistent_report_summary() {
    let report = ConsistencyReport {
        orphaned_documents: vec!["stray.txt".to_string()],
        missing_documents: vec!["gone.pdf".to_string(), "lost.csv".to_string()],
        is_consistent: false,
        ..ConsistencyReport::default()
    };

    assert_eq!(report.total_issues(), 3);
    assert_eq!(
        report.summary(),
        "Index inconsistencies found: 1 orphaned documents, 2 missing documents"
    );
}

#[tokio::test]
async fn detects_orphaned_and_missing_documents() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let store = IndexStore::new(StorePaths::in_dir(temp_dir.path()));

    store
        .merge(
            &[vec![1.0, 0.0], vec![0.0, 1.0]],
            vec![ChunkRecord::new("kept.txt", "a"), ChunkRecord::new("gone.txt", "b")],
        )
        .await
        .expect("merge succeeds");
    store
        .store_document("kept.txt", b"a")
        .await
        .expect("can store document");
    store
        .store_document("stray.txt", b"c")
        .await
        .expect("can store document");

    let validator = ConsistencyValidator::new(&store);
    let report = validator
        .validate_consistency()
        .await
        .expect("validation runs");

    assert!(!report.is_consistent);
    assert_eq!(report.index_vectors, 2);
    assert_eq!(report.metadata_rows, 2);
    assert_eq!(report.dimension, Some(2));
    assert_eq!(report.orphaned_documents, vec!["stray.txt".to_string()]);
    assert_eq!(report.missing_documents, vec!["gone.txt".to_string()]);

    let removed = validator
        .cleanup_orphaned_documents(&report)
        .await
        .expect("cleanup succeeds");
    assert_eq!(removed, 1);
    assert!(!temp_dir.path().join("docs").join("stray.txt").exists());
}

#[tokio::test]
async fn empty_store_is_consistent() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let store = IndexStore::new(StorePaths::in_dir(temp_dir.path()));

    let report = ConsistencyValidator::new(&store)
        .validate_consistency()
        .await
        .expect("validation runs");

    assert!(report.is_consistent);
    assert_eq!(report.dimension, None);
    assert_eq!(report.index_vectors, 0);
}

#[tokio::test]
async fn corrupt_store_is_an_error() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let store = IndexStore::new(StorePaths::in_dir(temp_dir.path()));
    fs::create_dir_all(temp_dir.path().join("index")).expect("can create index dir");
    fs::write(temp_dir.path().join("index").join("metadata.json"), "[]")
        .expect("can write metadata");

    let result = ConsistencyValidator::new(&store).validate_consistency().await;
    assert!(matches!(result, Err(crate::QaError::CorruptIndexState(_))));
}

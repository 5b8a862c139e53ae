#![expect(
    clippy::tests_outside_test_module,
    reason = "integration tests are only compiled in test mode"
)]

// End-to-end ingestion and retrieval tests
// Exercises the indexer, index store and retriever together with an in-process embedder

use std::collections::hash_map::DefaultHasher;
use std::fs;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use async_trait::async_trait;
use tempfile::TempDir;

use docs_qa::config::Config;
use docs_qa::database::{ChunkRecord, IndexStore};
use docs_qa::embeddings::{Embedder, chunk_text};
use docs_qa::extraction::DocumentExtractor;
use docs_qa::indexer::{FileOutcome, Indexer, SkipReason, UploadedFile};
use docs_qa::retrieval::{Retriever, SearchFilters};
use docs_qa::{QaError, Result};

/// Deterministic bag-of-words embedder
struct HashingEmbedder {
    dimension: usize,
}

#[async_trait]
impl Embedder for HashingEmbedder {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts
            .iter()
            .map(|text| {
                let mut vector = vec![0.0; self.dimension];
                for word in text.split_whitespace() {
                    let mut hasher = DefaultHasher::new();
                    word.trim_matches(|c: char| !c.is_alphanumeric())
                        .to_lowercase()
                        .hash(&mut hasher);
                    vector[(hasher.finish() % self.dimension as u64) as usize] += 1.0;
                }
                vector
            })
            .collect())
    }

    fn model_name(&self) -> &str {
        "hashing"
    }
}

struct TestApp {
    _temp_dir: TempDir,
    config: Config,
    store: Arc<IndexStore>,
    indexer: Indexer,
    retriever: Retriever,
}

fn create_test_app(dimension: usize) -> TestApp {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let config = Config::load_from(temp_dir.path()).expect("default config loads");
    create_app_in(temp_dir, config, dimension)
}

fn create_app_in(temp_dir: TempDir, config: Config, dimension: usize) -> TestApp {
    let store = Arc::new(IndexStore::from_config(&config).expect("store paths resolve"));
    let embedder: Arc<dyn Embedder> = Arc::new(HashingEmbedder { dimension });

    let indexer = Indexer::new(
        Arc::clone(&store),
        Arc::clone(&embedder),
        Arc::new(DocumentExtractor),
        config.chunking.clone(),
        config.ingestion.clone(),
    )
    .expect("valid indexer configuration");
    let retriever = Retriever::new(Arc::clone(&store), embedder, config.retrieval.clone());

    TestApp {
        _temp_dir: temp_dir,
        config,
        store,
        indexer,
        retriever,
    }
}

fn hello_document() -> UploadedFile {
    UploadedFile::new("doc1.txt", "Hello world. ".repeat(2000))
}

#[tokio::test]
async fn upload_into_empty_index() {
    let app = create_test_app(32);
    assert!(app.store.load().await.expect("store loads").index.is_none());

    let report = app
        .indexer
        .handle_upload(vec![hello_document()])
        .await
        .expect("upload succeeds");

    let expected_chunks = chunk_text(
        &"Hello world. ".repeat(2000),
        app.config.chunking.max_length,
        app.config.chunking.overlap,
    )
    .expect("valid chunking")
    .len();
    assert!(expected_chunks >= 1);
    assert!(matches!(
        &report.files[0].outcome,
        FileOutcome::Indexed { chunks, .. } if *chunks == expected_chunks
    ));

    let loaded = app.store.load().await.expect("store loads");
    assert_eq!(loaded.index.expect("index exists").len(), expected_chunks);
    assert_eq!(loaded.metadata.len(), expected_chunks);
}

#[tokio::test]
async fn second_upload_of_same_file_is_skipped() {
    let app = create_test_app(32);

    app.indexer
        .handle_upload(vec![hello_document()])
        .await
        .expect("first upload succeeds");
    let size_before = app.store.load().await.expect("store loads").len();

    let report = app
        .indexer
        .handle_upload(vec![hello_document()])
        .await
        .expect("second upload succeeds");

    assert_eq!(
        report.files[0].outcome,
        FileOutcome::Skipped(SkipReason::AlreadyIndexed)
    );
    assert_eq!(app.store.load().await.expect("store loads").len(), size_before);
}

#[tokio::test]
async fn query_returns_labelled_fragments() {
    let app = create_test_app(32);
    app.indexer
        .handle_upload(vec![hello_document()])
        .await
        .expect("upload succeeds");

    let fragments = app
        .retriever
        .answer_query_with_k("Hello", 3, &SearchFilters::default())
        .await
        .expect("query succeeds");

    assert!(!fragments.is_empty());
    assert!(fragments.len() <= 3);
    for fragment in &fragments {
        assert!(fragment.to_string().starts_with("[doc1.txt]: Hello world."));
    }

    let fragments = app
        .retriever
        .answer_query(
            "Hello",
            &SearchFilters::default().with_sources(["unknown.pdf"]),
        )
        .await
        .expect("unknown source is not an error");
    assert!(fragments.is_empty());
}

#[tokio::test]
async fn reset_then_load_reports_absent() {
    let app = create_test_app(32);
    app.indexer
        .handle_upload(vec![
            hello_document(),
            UploadedFile::new("notes.md", "# Notes\n\nSome other text"),
        ])
        .await
        .expect("upload succeeds");

    app.indexer.reset_all().await.expect("reset succeeds");

    let loaded = app.store.load().await.expect("store loads");
    assert!(loaded.index.is_none());
    assert!(loaded.metadata.is_empty());
    let documents_dir = app.config.documents_dir().expect("documents dir");
    assert_eq!(
        fs::read_dir(documents_dir)
            .expect("documents dir exists")
            .count(),
        0
    );
}

#[tokio::test]
async fn mismatched_dimension_leaves_state_untouched() {
    let wide = create_test_app(768);
    wide.store
        .merge(
            &[vec![0.5; 768]],
            vec![ChunkRecord::new("existing.pdf", "existing text").with_file_type(".pdf")],
        )
        .await
        .expect("initial merge succeeds");

    let index_file = wide.config.index_file_path().expect("index path");
    let metadata_file = wide.config.metadata_file_path().expect("metadata path");
    let index_before = fs::read(&index_file).expect("index file exists");
    let metadata_before = fs::read(&metadata_file).expect("metadata file exists");

    let result = wide
        .store
        .merge(
            &[vec![0.5; 384], vec![0.25; 384]],
            vec![
                ChunkRecord::new("new.pdf", "first"),
                ChunkRecord::new("new.pdf", "second"),
            ],
        )
        .await;
    assert!(matches!(
        result,
        Err(QaError::DimensionMismatch {
            expected: 768,
            actual: 384
        })
    ));

    assert_eq!(fs::read(&index_file).expect("index file exists"), index_before);
    assert_eq!(
        fs::read(&metadata_file).expect("metadata file exists"),
        metadata_before
    );

    // The same mismatch arriving through an upload fails the whole batch
    let TestApp {
        _temp_dir: temp_dir,
        config,
        ..
    } = wide;
    let narrow = create_app_in(temp_dir, config, 384);
    let result = narrow
        .indexer
        .handle_upload(vec![UploadedFile::new("new.txt", "fresh content")])
        .await;
    assert!(matches!(result, Err(QaError::DimensionMismatch { .. })));
    assert_eq!(fs::read(&index_file).expect("index file exists"), index_before);
    assert!(
        !narrow
            .store
            .is_indexed("new.txt")
            .await
            .expect("dedup check")
    );
}

#[tokio::test]
async fn merges_keep_vectors_and_rows_aligned() {
    let app = create_test_app(16);

    for batch in 0..3 {
        let files = (0..3)
            .map(|i| {
                UploadedFile::new(
                    format!("batch{batch}_file{i}.txt"),
                    format!("batch {batch} file {i} unique{batch}x{i}"),
                )
            })
            .collect::<Vec<_>>();
        app.indexer
            .handle_upload(files)
            .await
            .expect("upload succeeds");
    }

    let loaded = app.store.load().await.expect("store loads");
    let index = loaded.index.expect("index exists");
    assert_eq!(index.len(), 9);

    let embedder = HashingEmbedder { dimension: 16 };
    for (position, row) in loaded.metadata.iter().enumerate() {
        let expected = embedder
            .embed(std::slice::from_ref(&row.text))
            .await
            .expect("embedding succeeds");
        assert_eq!(index.vector(position), Some(expected[0].as_slice()));
    }
}

#[tokio::test]
async fn corrupt_state_is_not_treated_as_empty() {
    let app = create_test_app(8);
    app.indexer
        .handle_upload(vec![UploadedFile::new("a.txt", "alpha beta")])
        .await
        .expect("upload succeeds");

    fs::remove_file(app.config.index_file_path().expect("index path"))
        .expect("can remove index file");

    assert!(matches!(
        app.store.load().await,
        Err(QaError::CorruptIndexState(_))
    ));
    assert!(matches!(
        app.retriever
            .answer_query("alpha", &SearchFilters::default())
            .await,
        Err(QaError::CorruptIndexState(_))
    ));
    assert!(matches!(
        app.indexer
            .handle_upload(vec![UploadedFile::new("b.txt", "gamma")])
            .await,
        Err(QaError::CorruptIndexState(_))
    ));
}

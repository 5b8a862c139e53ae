use anyhow::{Context, Result};
use console::style;
use dialoguer::{Confirm, Input};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use crate::config::Config;
use crate::database::IndexStore;
use crate::embeddings::{Embedder, OllamaClient};
use crate::extraction::{DocumentExtractor, TextExtractor, file_extension};
use crate::generation::{ChatTurn, Generator, answer};
use crate::indexer::{ConsistencyValidator, FileOutcome, Indexer, UploadedFile};
use crate::retrieval::{ContextFragment, Retriever, SearchFilters};

/// Long-lived handles shared by every command
struct Session {
    config: Config,
    store: Arc<IndexStore>,
    client: Arc<OllamaClient>,
}

impl Session {
    fn open() -> Result<Self> {
        let config = Config::load().context("Failed to load configuration")?;
        let store = Arc::new(IndexStore::from_config(&config)?);
        let client = Arc::new(
            OllamaClient::new(&config.ollama).context("Failed to initialize Ollama client")?,
        );

        Ok(Self {
            config,
            store,
            client,
        })
    }

    fn indexer(&self) -> Result<Indexer> {
        let embedder: Arc<dyn Embedder> = Arc::clone(&self.client) as Arc<dyn Embedder>;
        let extractor: Arc<dyn TextExtractor> = Arc::new(DocumentExtractor);
        Ok(Indexer::new(
            Arc::clone(&self.store),
            embedder,
            extractor,
            self.config.chunking.clone(),
            self.config.ingestion.clone(),
        )?)
    }

    fn retriever(&self) -> Retriever {
        Retriever::new(
            Arc::clone(&self.store),
            Arc::clone(&self.client) as Arc<dyn Embedder>,
            self.config.retrieval.clone(),
        )
    }
}

#[inline]
pub fn build_filters(sources: Vec<String>, file_types: &[String]) -> SearchFilters {
    SearchFilters::default()
        .with_sources(sources)
        .with_file_types(file_types)
}

/// Upload files, or every supported file directly inside a directory
#[inline]
pub async fn upload_documents(paths: &[PathBuf]) -> Result<()> {
    let session = Session::open()?;
    let indexer = session.indexer()?;

    let mut files = Vec::new();
    for path in collect_upload_paths(paths, DocumentExtractor.supported_extensions())? {
        let file = UploadedFile::from_path(&path)
            .await
            .with_context(|| format!("Failed to read {}", path.display()))?;
        files.push(file);
    }

    if files.is_empty() {
        println!("No documents to upload.");
        return Ok(());
    }

    let bar = if console::user_attended_stderr() {
        ProgressBar::new_spinner().with_style(
            ProgressStyle::with_template("{spinner} {msg}")
                .context("Invalid progress template")?,
        )
    } else {
        ProgressBar::hidden()
    };
    bar.set_message(format!("Indexing {} documents", files.len()));
    bar.enable_steady_tick(Duration::from_millis(120));

    let result = indexer.handle_upload(files).await;
    bar.finish_and_clear();
    let report = result.context("Upload failed, no documents were indexed")?;

    for file in &report.files {
        match &file.outcome {
            FileOutcome::Indexed { chunks, summary } => {
                println!("✅ {} indexed ({} chunks)", style(&file.filename).cyan(), chunks);
                if let Some(summary) = summary {
                    println!("   Summary: {}", summary);
                }
            }
            FileOutcome::Skipped(reason) => {
                println!("⏭️  {} skipped: {}", style(&file.filename).cyan(), reason);
            }
            FileOutcome::Failed(reason) => {
                println!("❌ {} failed: {}", style(&file.filename).cyan(), reason);
            }
        }
    }

    println!();
    println!(
        "{} indexed, {} skipped, {} failed, {} chunks added",
        report.indexed(),
        report.skipped(),
        report.failed(),
        report.chunks_added
    );

    Ok(())
}

fn collect_upload_paths(paths: &[PathBuf], supported: &[&str]) -> Result<Vec<PathBuf>> {
    let mut collected = Vec::new();

    for path in paths {
        if path.is_dir() {
            let mut entries = std::fs::read_dir(path)
                .with_context(|| format!("Failed to read directory {}", path.display()))?
                .filter_map(|entry| entry.ok().map(|e| e.path()))
                .filter(|p| p.is_file() && is_supported(p, supported))
                .collect::<Vec<_>>();
            entries.sort();
            debug!("Found {} documents in {}", entries.len(), path.display());
            collected.extend(entries);
        } else {
            collected.push(path.clone());
        }
    }

    Ok(collected)
}

fn is_supported(path: &Path, supported: &[&str]) -> bool {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    supported.contains(&file_extension(&name).as_str())
}

/// Print the context fragments retrieved for `query`
#[inline]
pub async fn query_documents(query: &str, filters: &SearchFilters, k: Option<usize>) -> Result<()> {
    let session = Session::open()?;
    let retriever = session.retriever();
    let k = k.unwrap_or(session.config.retrieval.top_k);

    let fragments = retriever
        .answer_query_with_k(query, k, filters)
        .await
        .context("Search failed")?;

    if fragments.is_empty() {
        println!("No matching context found.");
        return Ok(());
    }

    for fragment in &fragments {
        println!(
            "{} {}",
            style(format!("#{} ({:.3})", fragment.rank + 1, fragment.distance)).dim(),
            fragment
        );
        println!();
    }

    Ok(())
}

/// Answer `question` from the indexed documents. Without a question, start an
/// interactive chat that carries recent turns into each prompt.
#[inline]
pub async fn ask_question(question: Option<String>, filters: &SearchFilters) -> Result<()> {
    let session = Session::open()?;
    let retriever = session.retriever();
    let generator: &dyn Generator = session.client.as_ref();
    let history_turns = session.config.retrieval.history_turns;

    if let Some(question) = question {
        let fragments = retriever.answer_query(&question, filters).await?;
        let answer = answer(generator, &question, fragments, &[], history_turns).await?;
        print_answer(&answer.text, &answer.context);
        return Ok(());
    }

    let mut history = Vec::new();
    loop {
        let question: String = Input::new()
            .with_prompt("Question (empty to quit)")
            .allow_empty(true)
            .interact_text()?;
        let question = question.trim().to_string();
        if question.is_empty() {
            break;
        }

        let fragments = retriever.answer_query(&question, filters).await?;
        let answer = answer(generator, &question, fragments, &history, history_turns).await?;
        print_answer(&answer.text, &answer.context);

        history.push(ChatTurn::user(question));
        history.push(ChatTurn::assistant(answer.text));
    }

    Ok(())
}

fn print_answer(text: &str, context: &[ContextFragment]) {
    println!("{} {}", style("Answer:").bold().green(), text);

    if !context.is_empty() {
        let mut sources: Vec<&str> = Vec::new();
        for fragment in context {
            if !sources.contains(&fragment.source.as_str()) {
                sources.push(&fragment.source);
            }
        }
        println!("{} {}", style("Sources:").dim(), sources.join(", "));
    }
    println!();
}

/// Delete the index, metadata and every uploaded document
#[inline]
pub async fn reset_index(assume_yes: bool) -> Result<()> {
    let session = Session::open()?;

    if !assume_yes
        && !Confirm::new()
            .with_prompt("Delete the index and all uploaded documents?")
            .default(false)
            .interact()?
    {
        println!("Reset cancelled.");
        return Ok(());
    }

    session.indexer()?.reset_all().await?;
    info!("Reset completed");
    println!("🗑️  Index and documents cleared.");
    Ok(())
}

/// Show configuration, Ollama health and index consistency
#[inline]
pub async fn show_status(fix: bool) -> Result<()> {
    let session = Session::open()?;
    let config = &session.config;

    println!("📊 Docs QA Status Report");
    println!("{}", "=".repeat(50));
    println!();

    println!("🤖 Ollama Status:");
    match session.client.health_check() {
        Ok(()) => {
            println!(
                "   ✅ Ollama: Connected ({}:{})",
                config.ollama.host, config.ollama.port
            );
        }
        Err(e) => println!("   ⚠️  Ollama: Unavailable - {:#}", e),
    }
    println!("   📋 Embedding model: {}", config.ollama.model);
    println!("   💬 Generation model: {}", config.ollama.generation_model);
    println!();

    println!("🔍 Index Status:");
    let validator = ConsistencyValidator::new(&session.store);
    let report = match validator.validate_consistency().await {
        Ok(report) => report,
        Err(e) => {
            println!("   ❌ Index could not be loaded - {}", e);
            println!("   Run 'docs-qa reset' to start over.");
            return Ok(());
        }
    };

    match report.dimension {
        Some(dimension) => println!(
            "   🧮 Chunks: {} ({} dimensions)",
            report.index_vectors, dimension
        ),
        None => println!("   💤 Nothing indexed yet"),
    }
    println!("   📚 Documents: {}", report.indexed_sources.len());
    for source in &report.indexed_sources {
        println!("      - {}", source);
    }

    if report.is_consistent {
        println!("   ✅ {}", report.summary());
        return Ok(());
    }

    println!("   ⚠️  {}", report.summary());
    for name in &report.orphaned_documents {
        println!("      stored but not indexed: {}", name);
    }
    for name in &report.missing_documents {
        println!("      indexed but file missing: {}", name);
    }

    if fix {
        let removed = session.indexer()?.cleanup_orphaned_documents().await?;
        println!("   🧹 Removed {} orphaned documents", removed);
    } else if !report.orphaned_documents.is_empty() {
        println!("   Run 'docs-qa status --fix' to remove orphaned documents.");
    }

    Ok(())
}

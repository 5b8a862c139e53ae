use std::path::PathBuf;

use clap::{Parser, Subcommand};
use docs_qa::Result;
use docs_qa::commands::{
    ask_question, build_filters, query_documents, reset_index, show_status, upload_documents,
};
use docs_qa::config::{run_interactive_config, show_config};

#[derive(Parser)]
#[command(name = "docs-qa")]
#[command(about = "Ask questions answered from your own documents")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Configure Ollama connection and settings
    Config {
        /// Show current configuration
        #[arg(long)]
        show: bool,
    },
    /// Index documents (PDF, DOCX, XLSX, CSV, TXT, MD) or directories of them
    Upload {
        #[arg(required = true)]
        paths: Vec<PathBuf>,
    },
    /// Show the document fragments most relevant to a query
    Query {
        text: String,
        /// Only keep fragments from this source file (repeatable)
        #[arg(long = "source")]
        sources: Vec<String>,
        /// Only keep fragments of this file type, e.g. "pdf" (repeatable)
        #[arg(long = "type")]
        file_types: Vec<String>,
        /// Number of candidates to retrieve before filtering
        #[arg(short, long)]
        k: Option<usize>,
    },
    /// Answer a question from the indexed documents; omit it to start a chat
    Ask {
        text: Option<String>,
        #[arg(long = "source")]
        sources: Vec<String>,
        #[arg(long = "type")]
        file_types: Vec<String>,
    },
    /// Delete the index and all uploaded documents
    Reset {
        /// Skip the confirmation prompt
        #[arg(long, short)]
        yes: bool,
    },
    /// Show Ollama health and index consistency
    Status {
        /// Remove stored documents that were never indexed
        #[arg(long)]
        fix: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Config { show } => {
            if show {
                show_config()?;
            } else {
                run_interactive_config()?;
            }
        }
        Commands::Upload { paths } => {
            upload_documents(&paths).await?;
        }
        Commands::Query {
            text,
            sources,
            file_types,
            k,
        } => {
            let filters = build_filters(sources, &file_types);
            query_documents(&text, &filters, k).await?;
        }
        Commands::Ask {
            text,
            sources,
            file_types,
        } => {
            let filters = build_filters(sources, &file_types);
            ask_question(text, &filters).await?;
        }
        Commands::Reset { yes } => {
            reset_index(yes).await?;
        }
        Commands::Status { fix } => {
            show_status(fix).await?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::error::ErrorKind;

    #[test]
    fn upload_requires_paths() {
        let cli = Cli::try_parse_from(["docs-qa", "upload"]);
        assert!(cli.is_err());

        let cli = Cli::try_parse_from(["docs-qa", "upload", "a.pdf", "docs/"])
            .expect("upload with paths parses");
        if let Commands::Upload { paths } = cli.command {
            assert_eq!(paths, vec![PathBuf::from("a.pdf"), PathBuf::from("docs/")]);
        } else {
            panic!("expected upload command");
        }
    }

    #[test]
    fn query_with_filters() {
        let cli = Cli::try_parse_from([
            "docs-qa",
            "query",
            "quarterly revenue",
            "--source",
            "report.pdf",
            "--source",
            "sales.xlsx",
            "--type",
            "pdf",
            "-k",
            "5",
        ])
        .expect("query parses");

        if let Commands::Query {
            text,
            sources,
            file_types,
            k,
        } = cli.command
        {
            assert_eq!(text, "quarterly revenue");
            assert_eq!(sources, vec!["report.pdf", "sales.xlsx"]);
            assert_eq!(file_types, vec!["pdf"]);
            assert_eq!(k, Some(5));
        } else {
            panic!("expected query command");
        }
    }

    #[test]
    fn ask_without_question_starts_chat() {
        let cli = Cli::try_parse_from(["docs-qa", "ask"]).expect("ask parses");
        assert!(matches!(cli.command, Commands::Ask { text: None, .. }));
    }

    #[test]
    fn reset_flags() {
        let cli = Cli::try_parse_from(["docs-qa", "reset", "--yes"]).expect("reset parses");
        assert!(matches!(cli.command, Commands::Reset { yes: true }));

        let cli = Cli::try_parse_from(["docs-qa", "reset"]).expect("reset parses");
        assert!(matches!(cli.command, Commands::Reset { yes: false }));
    }

    #[test]
    fn config_show_flag() {
        let cli = Cli::try_parse_from(["docs-qa", "config", "--show"]).expect("config parses");
        assert!(matches!(cli.command, Commands::Config { show: true }));
    }

    #[test]
    fn status_fix_flag() {
        let cli = Cli::try_parse_from(["docs-qa", "status", "--fix"]).expect("status parses");
        assert!(matches!(cli.command, Commands::Status { fix: true }));
    }

    #[test]
    fn invalid_command() {
        let cli = Cli::try_parse_from(["docs-qa", "invalid"]);
        assert!(cli.is_err());

        if let Err(err) = cli {
            assert_eq!(err.kind(), ErrorKind::InvalidSubcommand);
        }
    }

    #[test]
    fn help_message() {
        let cli = Cli::try_parse_from(["docs-qa", "--help"]);
        assert!(cli.is_err());

        if let Err(err) = cli {
            assert_eq!(err.kind(), ErrorKind::DisplayHelp);
        }
    }
}

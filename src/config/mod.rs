// Configuration management module
// TOML settings for the Ollama connection, chunking, retrieval and ingestion

pub mod interactive;
pub mod settings;


pub use interactive::{run_interactive_config, show_config};
pub use settings::{Config, ConfigError, OllamaConfig};

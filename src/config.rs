use std::env;
use std::fs;
use std::path::PathBuf;

use anyhow::Context;
use serde::{Deserialize, Serialize};

/// How conversation history is keyed across requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MemoryMode {
    /// One history buffer shared by every client. This mirrors a chatbot
    /// serving a single local user.
    Shared,
    /// Separate buffers keyed by the `session_id` field of chat requests.
    PerSession,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AppConfig {
    /// The one PDF this instance answers questions about.
    pub document_path: PathBuf,
    /// Directory holding the persisted vector index database.
    pub index_dir: PathBuf,
    /// Directory for rolling log files.
    pub log_dir: PathBuf,
    pub host: String,
    pub port: u16,
    pub ollama_url: String,
    pub embedding_model: String,
    pub chat_model: String,
    /// Wall-clock budget for the whole startup pipeline.
    pub init_timeout_secs: u64,
    /// Budget for each request when probing whether Ollama is reachable.
    pub ollama_probe_timeout_secs: u64,
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    pub retrieval_top_k: usize,
    pub memory_mode: MemoryMode,
    /// Oldest turns are dropped once a history buffer exceeds this.
    pub max_history_turns: usize,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            document_path: PathBuf::from("data/document.pdf"),
            index_dir: PathBuf::from("index"),
            log_dir: PathBuf::from("logs"),
            host: "0.0.0.0".to_string(),
            port: 5000,
            ollama_url: "http://localhost:11434".to_string(),
            embedding_model: "nomic-embed-text".to_string(),
            chat_model: "mistral".to_string(),
            init_timeout_secs: 600,
            ollama_probe_timeout_secs: 5,
            chunk_size: 500,
            chunk_overlap: 50,
            retrieval_top_k: 4,
            memory_mode: MemoryMode::Shared,
            max_history_turns: 8,
        }
    }
}

impl AppConfig {
    /// Loads the config file, applies environment overrides and validates.
    ///
    /// The file is `$ASKPAPER_CONFIG` if set, otherwise `./askpaper.yml`.
    /// A missing file is not an error; defaults apply.
    pub fn load() -> anyhow::Result<Self> {
        let path = env::var("ASKPAPER_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("askpaper.yml"));

        let mut config = if path.exists() {
            let contents = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read config file {}", path.display()))?;
            Self::from_yaml(&contents)
                .with_context(|| format!("Failed to parse config file {}", path.display()))?
        } else {
            Self::default()
        };

        if let Ok(document) = env::var("ASKPAPER_DOCUMENT") {
            config.document_path = PathBuf::from(document);
        }
        if let Some(port) = env::var("PORT").ok().and_then(|val| val.parse::<u16>().ok()) {
            config.port = port;
        }

        config.validate()?;
        Ok(config)
    }

    pub fn from_yaml(contents: &str) -> Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(contents)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.chunk_size == 0 {
            anyhow::bail!("chunk_size must be at least 1");
        }
        if self.chunk_overlap >= self.chunk_size {
            anyhow::bail!(
                "chunk_overlap ({}) must be smaller than chunk_size ({})",
                self.chunk_overlap,
                self.chunk_size
            );
        }
        if self.retrieval_top_k == 0 {
            anyhow::bail!("retrieval_top_k must be at least 1");
        }
        if self.max_history_turns == 0 {
            anyhow::bail!("max_history_turns must be at least 1");
        }
        if self.init_timeout_secs == 0 {
            anyhow::bail!("init_timeout_secs must be at least 1");
        }
        if self.embedding_model.trim().is_empty() {
            anyhow::bail!("embedding_model cannot be empty");
        }
        if self.chat_model.trim().is_empty() {
            anyhow::bail!("chat_model cannot be empty");
        }
        if self.ollama_url.trim().is_empty() {
            anyhow::bail!("ollama_url cannot be empty");
        }
        Ok(())
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn index_db_path(&self) -> PathBuf {
        self.index_dir.join("index.db")
    }
}

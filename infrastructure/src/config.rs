use dotenvy::dotenv;
use shared::types::{Error, Result};
use std::env;
use std::str::FromStr;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmbeddingBackend {
    /// Local feature-hashing embedder; no network.
    Hashing,
    Ollama,
}

impl FromStr for EmbeddingBackend {
    type Err = Error;

    fn from_str(raw: &str) -> Result<Self> {
        match raw.trim().to_lowercase().as_str() {
            "hashing" => Ok(EmbeddingBackend::Hashing),
            "ollama" => Ok(EmbeddingBackend::Ollama),
            other => Err(Error::config(format!(
                "unknown EMBEDDING_BACKEND '{other}' (expected hashing or ollama)"
            ))),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub ollama_base_url: String,
    pub ollama_model: String,
    pub ollama_embed_model: String,
    pub embedding_backend: EmbeddingBackend,
    pub embedding_dimension: usize,
    pub inventory_db_path: String,
    /// `None` disables index snapshot persistence.
    pub index_db_path: Option<String>,
    pub retrieval_top_k: usize,
    pub generation_timeout: Duration,
    pub bind_addr: String,
}

impl Config {
    /// Reads `.env` (if present) and then the process environment.
    pub fn load() -> Result<Self> {
        dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let text = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());

        let embedding_backend = text("EMBEDDING_BACKEND", "hashing").parse()?;
        let embedding_dimension = parse_number(&lookup, "EMBEDDING_DIMENSION", 384)?;
        if embedding_dimension == 0 {
            return Err(Error::config("EMBEDDING_DIMENSION must be positive"));
        }
        let retrieval_top_k = parse_number(&lookup, "RETRIEVAL_TOP_K", 10)?;
        if retrieval_top_k == 0 {
            return Err(Error::config("RETRIEVAL_TOP_K must be positive"));
        }
        let timeout_secs: u64 = parse_number(&lookup, "GENERATION_TIMEOUT_SECS", 60)?;
        if timeout_secs == 0 {
            return Err(Error::config("GENERATION_TIMEOUT_SECS must be positive"));
        }
        let index_db_path = text("INDEX_DB_PATH", "indices/index.db");

        Ok(Self {
            ollama_base_url: text("OLLAMA_BASE_URL", "http://localhost:11434"),
            ollama_model: text("OLLAMA_MODEL", "qwen2.5:7b-instruct"),
            ollama_embed_model: text("OLLAMA_EMBED_MODEL", "all-minilm"),
            embedding_backend,
            embedding_dimension,
            inventory_db_path: text("INVENTORY_DB_PATH", "inventory.db"),
            index_db_path: if index_db_path.trim().is_empty() {
                None
            } else {
                Some(index_db_path)
            },
            retrieval_top_k,
            generation_timeout: Duration::from_secs(timeout_secs),
            bind_addr: text("BIND_ADDR", "0.0.0.0:7000"),
        })
    }
}

fn parse_number<F, T>(lookup: &F, key: &str, default: T) -> Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(key) {
        None => Ok(default),
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| Error::config(format!("{key} must be a positive integer, got '{raw}'"))),
    }
}

pub mod config;
pub mod embedder;
pub mod index_snapshot;
pub mod inventory_store;
pub mod ollama_client;
pub mod search;

pub mod classifier;
pub mod index_registry;
pub mod parser;
pub mod prompts;
pub mod rag_service;
pub mod retriever;

pub mod bootstrap;
pub mod chain;
pub mod chunker;
pub mod config;
pub mod document;
pub mod embeddings;
pub mod errors;
pub mod index;
pub mod llm;
pub mod logging;
pub mod memory;
pub mod server;
pub mod state;

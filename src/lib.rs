//! Document question-answering backend.
//!
//! Ingests one document at a time into a SQLite-backed vector index,
//! answers questions over it with a local model server, and mirrors the
//! index directory to an object store across restarts.

pub mod core;
pub mod document;
pub mod llm;
pub mod rag;
pub mod server;
pub mod state;
pub mod storage;

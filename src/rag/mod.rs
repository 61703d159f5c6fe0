//! Retrieval-augmented question answering.
//!
//! - `Chunker`: splits document pages into overlapping windows
//! - `SqliteIndex`: durable chunk/embedding store with cosine search
//! - `Retriever`: one query's `(k, threshold)` bound to an index snapshot
//! - `Synthesizer`: turns retrieved context into a single generation call
//! - `RagEngine`: the `Empty`/`Ready` state machine tying them together

pub mod chunker;
pub mod engine;
pub mod index;
pub mod retriever;
pub mod synthesizer;

pub use chunker::{Chunk, Chunker};
pub use engine::{AskOutcome, EngineState, EngineStatus, IngestOutcome, RagEngine};
pub use index::{ScoredChunk, SqliteIndex};
pub use retriever::{RetrievalParams, Retriever};
pub use synthesizer::Synthesizer;

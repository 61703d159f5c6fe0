pub const DEFAULT_PORT: u16 = 5001;
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 16 * 1024 * 1024;

pub const DEFAULT_PROVIDER_URL: &str = "http://localhost:11434";
pub const DEFAULT_EMBEDDING_MODEL: &str = "mxbai-embed-large";
pub const DEFAULT_GENERATION_MODEL: &str = "deepseek-r1:1.5B";
pub const DEFAULT_EMBED_BATCH_SIZE: usize = 32;

pub const DEFAULT_INDEX_DIR: &str = "index_db";

pub const DEFAULT_CHUNK_SIZE: usize = 512;
pub const DEFAULT_CHUNK_OVERLAP: usize = 200;

pub const DEFAULT_TOP_K: usize = 5;
pub const DEFAULT_SCORE_THRESHOLD: f32 = 0.2;

pub const DEFAULT_SYSTEM_INSTRUCTION: &str = "You answer questions about the contents of a single document. \
Use only the context information provided with each question, not prior knowledge. \
If the answer cannot be determined from the context, say \"I don't have enough information \
to answer that based on the document.\" Answer concisely and accurately in three sentences or less.";

pub const DEFAULT_NO_CONTEXT_ANSWER: &str =
    "No relevant information found in the document to answer your question.";

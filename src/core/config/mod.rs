pub mod defaults;
pub mod paths;
pub mod service;
pub mod validation;

pub use paths::AppPaths;
pub use service::{
    AppConfig, ChunkingConfig, ConfigService, PromptConfig, ProviderConfig, RetrievalConfig,
    ServerConfig, StorageBackendKind, StorageConfig,
};
pub use validation::ConfigError;

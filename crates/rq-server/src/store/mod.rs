pub mod chat;
pub mod data_sources;
pub mod memory;
pub mod models;
pub mod secrets;

pub use chat::{ChatHistoryStore, ChatMessage};
pub use data_sources::{DataSource, DataSourceStore, StoreCloneUrls};
pub use memory::{MemoryStore, RepoSummary};
pub use models::{ConfiguredModel, ModelStore};
pub use secrets::SqlSecretStore;

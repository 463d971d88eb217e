//! Secret store abstraction.
//!
//! The platform stores provider credentials (LLM API keys, git access
//! tokens) under opaque service names. Encryption at rest belongs to the
//! implementation behind this trait, not to its callers.

use async_trait::async_trait;

use crate::Result;

/// Key-value access to stored secrets.
#[async_trait]
pub trait SecretStore: Send + Sync + 'static {
    /// Fetch the plaintext secret for a service name, if one is stored.
    async fn get(&self, service_name: &str) -> Result<Option<String>>;

    /// Store (or replace) the secret for a service name.
    async fn put(&self, service_name: &str, plaintext: &str) -> Result<()>;
}

/// Well-known service names used by the core components.
pub mod services {
    /// Default LLM provider key, used by background tasks.
    pub const LLM_API_KEY: &str = "llm-api-key";
    /// Access token spliced into clone URLs.
    pub const GIT_ACCESS_TOKEN: &str = "git-access-token";
}

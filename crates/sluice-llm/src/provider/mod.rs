pub mod config;
pub mod base;
pub mod metadata;

pub use config::{ProviderConfig, AuthConfig};
pub use base::BaseProvider;
pub use metadata::{ProviderMetadata, LLMProvider};

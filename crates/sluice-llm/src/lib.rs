pub mod transformer;
pub mod provider;
pub mod providers;
pub mod error;
pub mod auth;
pub mod stream;

// Re-export core types
pub use error::{LLMError, ConversionError, Result};
pub use transformer::{SchemaTransformer, LLMStream, OpenAiTransformer};
pub use provider::{LLMProvider, BaseProvider, ProviderConfig, AuthConfig, ProviderMetadata};
pub use auth::{Authenticator, ApiKeyAuth, EnvKeyAuth, NoAuth};
pub use providers::{OpenAiProvider, MockProvider};
pub use stream::{BackendStream, StreamEvent, StreamHandle};

use crate::error::{LLMError, Result};

/// Supplies the authentication header for backend requests
pub trait Authenticator: Send + Sync {
    /// Get the authentication header (header_name, header_value).
    /// Returns `None` if no authentication is needed.
    fn get_auth_header(&self) -> Result<Option<(String, String)>>;

    /// Whether a credential is available right now
    fn is_configured(&self) -> bool;
}

/// Static API key authenticator
#[derive(Debug, Clone)]
pub struct ApiKeyAuth {
    api_key: String,
}

impl ApiKeyAuth {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
        }
    }
}

impl Authenticator for ApiKeyAuth {
    fn get_auth_header(&self) -> Result<Option<(String, String)>> {
        if self.api_key.is_empty() {
            return Err(LLMError::MissingCredential("API key is empty".to_string()));
        }
        Ok(Some((
            "Authorization".to_string(),
            format!("Bearer {}", self.api_key),
        )))
    }

    fn is_configured(&self) -> bool {
        !self.api_key.is_empty()
    }
}

/// API key read from an environment variable on every request, so a key
/// exported after startup is picked up without a restart.
#[derive(Debug, Clone)]
pub struct EnvKeyAuth {
    env: String,
}

impl EnvKeyAuth {
    pub fn new(env: impl Into<String>) -> Self {
        Self { env: env.into() }
    }

    fn key(&self) -> Option<String> {
        std::env::var(&self.env).ok().filter(|k| !k.trim().is_empty())
    }
}

impl Authenticator for EnvKeyAuth {
    fn get_auth_header(&self) -> Result<Option<(String, String)>> {
        let key = self.key().ok_or_else(|| {
            LLMError::MissingCredential(format!("API key not configured (set {})", self.env))
        })?;
        Ok(Some(("Authorization".to_string(), format!("Bearer {}", key))))
    }

    fn is_configured(&self) -> bool {
        self.key().is_some()
    }
}

/// No authentication (local backends)
#[derive(Debug, Clone, Default)]
pub struct NoAuth;

impl Authenticator for NoAuth {
    fn get_auth_header(&self) -> Result<Option<(String, String)>> {
        Ok(None)
    }

    fn is_configured(&self) -> bool {
        true
    }
}

//! Credential resolution for tool targets.
//!
//! Credentials are looked up on every call and never cached by the gateway, so
//! a rotated secret takes effect on the next call.

use async_trait::async_trait;
use std::collections::HashMap;

use crate::error::{PipelineError, Result};

/// Resolves a credential key to a secret.
#[async_trait]
pub trait CredentialProvider: Send + Sync {
    /// Returns the current secret for `key`.
    async fn resolve(&self, key: &str) -> Result<String>;
}

/// Reads credentials from environment variables named by the key.
#[derive(Debug, Clone, Copy, Default)]
pub struct EnvCredentialProvider;

#[async_trait]
impl CredentialProvider for EnvCredentialProvider {
    #[allow(clippy::disallowed_methods)] // env::var is the credential source
    async fn resolve(&self, key: &str) -> Result<String> {
        match std::env::var(key) {
            Ok(value) if !value.trim().is_empty() => Ok(value),
            _ => Err(PipelineError::CredentialUnavailable {
                reason: format!("environment variable {key} is not set"),
            }),
        }
    }
}

/// Fixed credentials, for tests and embedded use.
#[derive(Debug, Clone, Default)]
pub struct StaticCredentialProvider {
    values: HashMap<String, String>,
}

impl StaticCredentialProvider {
    /// An empty provider.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a credential.
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.values.insert(key.into(), value.into());
        self
    }
}

#[async_trait]
impl CredentialProvider for StaticCredentialProvider {
    async fn resolve(&self, key: &str) -> Result<String> {
        self.values.get(key).cloned().ok_or_else(|| PipelineError::CredentialUnavailable {
            reason: format!("no credential named {key}"),
        })
    }
}

use std::env;

use crate::DeepResearchError;

/// API key or token that must never reach logs.
#[derive(Clone)]
pub struct SecretValue(String);

impl SecretValue {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for SecretValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "***redacted***")
    }
}

/// Require that a given environment variable is set and non-empty.
pub fn require_env(var: &str) -> Result<SecretValue, DeepResearchError> {
    optional_env(var).ok_or_else(|| DeepResearchError::MissingSecret(var.to_string()))
}

/// Read a secret if present; blank values count as absent.
pub fn optional_env(var: &str) -> Option<SecretValue> {
    match env::var(var) {
        Ok(value) if !value.trim().is_empty() => Some(SecretValue(value)),
        _ => None,
    }
}

//! In-memory credential management with redacted debug output.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use crate::{ProviderError, ProviderId};

#[derive(PartialEq, Eq)]
pub struct SecretString {
    value: String,
}

impl SecretString {
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
        }
    }

    pub fn expose(&self) -> &str {
        self.value.as_str()
    }

    pub fn is_empty(&self) -> bool {
        self.value.is_empty()
    }
}

impl std::fmt::Debug for SecretString {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("[REDACTED]")
    }
}

impl Drop for SecretString {
    fn drop(&mut self) {
        unsafe {
            self.value.as_mut_vec().fill(0);
        }
    }
}

/// Per-vendor API keys. Missing keys surface as configuration errors at
/// provider construction, leaving other vendors unaffected.
#[derive(Default)]
pub struct CredentialStore {
    keys: Mutex<HashMap<ProviderId, SecretString>>,
}

impl CredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_api_key(
        &self,
        provider: ProviderId,
        api_key: impl Into<String>,
    ) -> Result<(), ProviderError> {
        let api_key = SecretString::new(api_key);
        if api_key.is_empty() {
            return Err(ProviderError::authentication("api key must not be empty"));
        }

        self.keys_mut()?.insert(provider, api_key);
        Ok(())
    }

    /// Loads a key from the environment variable conventionally used for the
    /// vendor, when present.
    pub fn load_from_env(&self, provider: ProviderId) -> Result<bool, ProviderError> {
        let variable = match provider {
            ProviderId::OpenAi => "OPENAI_API_KEY",
            ProviderId::Gemini => "GEMINI_API_KEY",
            ProviderId::Ollama => return Ok(false),
        };

        match std::env::var(variable) {
            Ok(value) if !value.trim().is_empty() => {
                self.set_api_key(provider, value)?;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    pub fn has_api_key(&self, provider: ProviderId) -> Result<bool, ProviderError> {
        Ok(self.keys_ref()?.contains_key(&provider))
    }

    pub fn api_key(&self, provider: ProviderId) -> Result<Option<String>, ProviderError> {
        Ok(self
            .keys_ref()?
            .get(&provider)
            .map(|secret| secret.expose().to_string()))
    }

    /// Fails fast with a configuration error when the vendor has no key.
    pub fn require_api_key(&self, provider: ProviderId) -> Result<(), ProviderError> {
        if self.has_api_key(provider)? {
            return Ok(());
        }

        Err(ProviderError::configuration(format!(
            "no API key configured for provider '{provider}'"
        )))
    }

    pub fn clear(&self, provider: ProviderId) -> Result<bool, ProviderError> {
        Ok(self.keys_mut()?.remove(&provider).is_some())
    }

    fn keys_ref(
        &self,
    ) -> Result<MutexGuard<'_, HashMap<ProviderId, SecretString>>, ProviderError> {
        self.keys
            .lock()
            .map_err(|_| ProviderError::other("credential store lock poisoned"))
    }

    fn keys_mut(
        &self,
    ) -> Result<MutexGuard<'_, HashMap<ProviderId, SecretString>>, ProviderError> {
        self.keys
            .lock()
            .map_err(|_| ProviderError::other("credential store lock poisoned"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ProviderErrorKind;

    #[test]
    fn secret_string_redacts_debug_output() {
        let secret = SecretString::new("sk-super-secret");
        assert_eq!(format!("{secret:?}"), "[REDACTED]");
        assert_eq!(secret.expose(), "sk-super-secret");
    }

    #[test]
    fn store_round_trips_keys_per_provider() {
        let store = CredentialStore::new();
        store
            .set_api_key(ProviderId::OpenAi, "sk-abc")
            .expect("key should store");

        assert!(store
            .has_api_key(ProviderId::OpenAi)
            .expect("lookup should work"));
        assert!(!store
            .has_api_key(ProviderId::Gemini)
            .expect("lookup should work"));
        assert_eq!(
            store.api_key(ProviderId::OpenAi).expect("lookup should work"),
            Some("sk-abc".to_string())
        );

        assert!(store.clear(ProviderId::OpenAi).expect("clear should work"));
        assert!(!store.clear(ProviderId::OpenAi).expect("clear should work"));
    }

    #[test]
    fn empty_key_is_rejected() {
        let store = CredentialStore::new();
        let error = store
            .set_api_key(ProviderId::OpenAi, "")
            .expect_err("empty key should fail");
        assert_eq!(error.kind, ProviderErrorKind::Authentication);
    }

    #[test]
    fn require_api_key_reports_configuration_error() {
        let store = CredentialStore::new();
        let error = store
            .require_api_key(ProviderId::Gemini)
            .expect_err("missing key should fail");
        assert_eq!(error.kind, ProviderErrorKind::Configuration);
        assert!(!error.retryable);
    }
}

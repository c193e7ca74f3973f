//! Stable provider construction surface for facade consumers.

use std::sync::Arc;

use reqwest::Client;

use crate::{
    CredentialStore, FallbackChain, GeminiProvider, ModelProvider, OllamaProvider,
    OpenAiHttpTransport, OpenAiProvider, ProviderError, ProviderId,
};

pub fn parse_provider_id(value: &str) -> Option<ProviderId> {
    match value.trim().to_ascii_lowercase().as_str() {
        "openai" => Some(ProviderId::OpenAi),
        "gemini" => Some(ProviderId::Gemini),
        "ollama" => Some(ProviderId::Ollama),
        _ => None,
    }
}

pub fn build_provider(
    provider_id: ProviderId,
    credentials: Arc<CredentialStore>,
    client: Client,
) -> Result<Arc<dyn ModelProvider>, ProviderError> {
    match provider_id {
        ProviderId::OpenAi => {
            let transport = Arc::new(OpenAiHttpTransport::new(client));
            Ok(Arc::new(OpenAiProvider::new(credentials, transport)?))
        }
        ProviderId::Gemini => {
            let transport = Arc::new(GeminiProvider::default_http_transport(client));
            Ok(Arc::new(GeminiProvider::new(credentials, transport)?))
        }
        ProviderId::Ollama => {
            let transport = Arc::new(OllamaProvider::default_http_transport(client));
            Ok(Arc::new(OllamaProvider::new(transport)))
        }
    }
}

/// Builds the ranked fallback chain from whatever vendors are configured.
///
/// Rank order comes from `BELLHOP_PROVIDER_ORDER` (comma-separated provider
/// names) and defaults to `openai,gemini,ollama`. A vendor that fails its
/// configuration check is skipped; other vendors are unaffected. Only an
/// empty result is a hard error.
pub fn build_provider_chain(
    credentials: Arc<CredentialStore>,
    client: Client,
) -> Result<FallbackChain, ProviderError> {
    let order = std::env::var("BELLHOP_PROVIDER_ORDER")
        .unwrap_or_else(|_| "openai,gemini,ollama".to_string());

    let ranked: Vec<ProviderId> = order
        .split(',')
        .filter_map(parse_provider_id)
        .collect();

    let mut providers: Vec<Arc<dyn ModelProvider>> = Vec::new();
    for provider_id in ranked {
        if let Ok(provider) =
            build_provider(provider_id, Arc::clone(&credentials), client.clone())
        {
            providers.push(provider);
        }
    }

    FallbackChain::new(providers)
}

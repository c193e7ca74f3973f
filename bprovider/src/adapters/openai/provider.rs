//! OpenAI provider implementation over transport and shared models.

use std::sync::Arc;

use async_stream::try_stream;
use futures_util::StreamExt;

use crate::{
    BoxedEventStream, CredentialStore, ModelProvider, ModelRequest, ModelResponse, ProviderError,
    ProviderFuture, ProviderId,
};

use super::transport::OpenAiTransport;
use super::types::{OpenAiAuth, OpenAiMessage, OpenAiRequest, OpenAiTool};

#[derive(Clone)]
pub struct OpenAiProvider {
    credentials: Arc<CredentialStore>,
    transport: Arc<dyn OpenAiTransport>,
    fallback_model: String,
    embedding_model: String,
    reduced_embedding_model: String,
}

impl OpenAiProvider {
    /// Fails fast when no API key is configured; other vendors are
    /// unaffected by this vendor's configuration.
    pub fn new(
        credentials: Arc<CredentialStore>,
        transport: Arc<dyn OpenAiTransport>,
    ) -> Result<Self, ProviderError> {
        credentials.require_api_key(ProviderId::OpenAi)?;

        Ok(Self {
            credentials,
            transport,
            fallback_model: "gpt-4o-mini".to_string(),
            embedding_model: "text-embedding-3-large".to_string(),
            reduced_embedding_model: "text-embedding-3-small".to_string(),
        })
    }

    pub fn with_fallback_model(mut self, model: impl Into<String>) -> Self {
        self.fallback_model = model.into();
        self
    }

    fn resolve_auth(&self) -> Result<OpenAiAuth, ProviderError> {
        match self.credentials.api_key(ProviderId::OpenAi)? {
            Some(key) => Ok(OpenAiAuth::Bearer(key)),
            None => Err(ProviderError::authentication("no OpenAI API key configured")),
        }
    }

    fn build_wire_request(&self, request: ModelRequest, stream: bool) -> OpenAiRequest {
        let model = if request.model.trim().is_empty() {
            self.fallback_model.clone()
        } else {
            request.model
        };

        let mut messages = request
            .messages
            .into_iter()
            .map(OpenAiMessage::from)
            .collect::<Vec<_>>();

        for tool_result in request.tool_results {
            messages.push(OpenAiMessage::tool_result(tool_result));
        }

        let tools = request
            .tools
            .into_iter()
            .map(OpenAiTool::from)
            .collect::<Vec<_>>();

        OpenAiRequest {
            model,
            messages,
            tools,
            temperature: request.options.temperature,
            max_tokens: request.options.max_tokens,
            stream,
        }
    }
}

impl ModelProvider for OpenAiProvider {
    fn id(&self) -> ProviderId {
        ProviderId::OpenAi
    }

    fn complete<'a>(
        &'a self,
        request: ModelRequest,
    ) -> ProviderFuture<'a, Result<ModelResponse, ProviderError>> {
        Box::pin(async move {
            request.validate()?;
            let auth = self.resolve_auth()?;
            let wire_request = self.build_wire_request(request, false);
            let response = self.transport.complete(wire_request, auth).await?;
            Ok(response.into_model_response(ProviderId::OpenAi))
        })
    }

    fn stream<'a>(
        &'a self,
        request: ModelRequest,
    ) -> ProviderFuture<'a, Result<BoxedEventStream<'a>, ProviderError>> {
        Box::pin(async move {
            request.validate()?;
            let auth = self.resolve_auth()?;
            let wire_request = self.build_wire_request(request, true);
            let mut chunks = self.transport.stream(wire_request, auth).await?;

            let stream = try_stream! {
                while let Some(chunk) = chunks.next().await {
                    yield chunk?.into_stream_event(ProviderId::OpenAi);
                }
            };

            Ok(Box::pin(stream) as BoxedEventStream<'a>)
        })
    }

    fn embed<'a>(
        &'a self,
        text: String,
    ) -> ProviderFuture<'a, Result<Vec<f32>, ProviderError>> {
        Box::pin(async move {
            let auth = self.resolve_auth()?;
            let primary = self
                .transport
                .embed(self.embedding_model.clone(), text.clone(), auth.clone())
                .await;

            match primary {
                Ok(vector) => Ok(vector),
                // Smaller model variant before giving up on this vendor.
                Err(_) => {
                    self.transport
                        .embed(self.reduced_embedding_model.clone(), text, auth)
                        .await
                }
            }
        })
    }
}

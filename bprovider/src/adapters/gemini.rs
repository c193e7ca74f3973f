//! Gemini provider implemented over the OpenAI-compatible transport.

use std::sync::Arc;

use async_stream::try_stream;
use futures_util::StreamExt;
use reqwest::Client;

use crate::adapters::openai::{
    OpenAiAuth, OpenAiHttpTransport, OpenAiMessage, OpenAiRequest, OpenAiTool, OpenAiTransport,
};
use crate::{
    BoxedEventStream, CredentialStore, ModelProvider, ModelRequest, ModelResponse, ProviderError,
    ProviderFuture, ProviderId,
};

pub const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta/openai";

#[derive(Clone)]
pub struct GeminiProvider {
    credentials: Arc<CredentialStore>,
    transport: Arc<dyn OpenAiTransport>,
    fallback_model: String,
    embedding_model: String,
    reduced_embedding_model: String,
}

impl GeminiProvider {
    pub fn new(
        credentials: Arc<CredentialStore>,
        transport: Arc<dyn OpenAiTransport>,
    ) -> Result<Self, ProviderError> {
        credentials.require_api_key(ProviderId::Gemini)?;

        Ok(Self {
            credentials,
            transport,
            fallback_model: "gemini-2.0-flash".to_string(),
            embedding_model: "gemini-embedding-001".to_string(),
            reduced_embedding_model: "text-embedding-004".to_string(),
        })
    }

    pub fn with_fallback_model(mut self, model: impl Into<String>) -> Self {
        self.fallback_model = model.into();
        self
    }

    pub fn default_http_transport(client: Client) -> OpenAiHttpTransport {
        OpenAiHttpTransport::new(client).with_base_url(GEMINI_BASE_URL)
    }

    fn resolve_auth(&self) -> Result<OpenAiAuth, ProviderError> {
        match self.credentials.api_key(ProviderId::Gemini)? {
            Some(key) => Ok(OpenAiAuth::Bearer(key)),
            None => Err(ProviderError::authentication("no Gemini API key configured")),
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

impl ModelProvider for GeminiProvider {
    fn id(&self) -> ProviderId {
        ProviderId::Gemini
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
            Ok(response.into_model_response(ProviderId::Gemini))
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
                    yield chunk?.into_stream_event(ProviderId::Gemini);
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
                Err(_) => {
                    self.transport
                        .embed(self.reduced_embedding_model.clone(), text, auth)
                        .await
                }
            }
        })
    }
}

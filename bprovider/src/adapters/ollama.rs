//! Ollama provider for local, credential-free inference over the
//! OpenAI-compatible transport.

use std::sync::Arc;

use async_stream::try_stream;
use futures_util::StreamExt;
use reqwest::Client;

use crate::adapters::openai::{
    OpenAiAuth, OpenAiHttpTransport, OpenAiMessage, OpenAiRequest, OpenAiTool, OpenAiTransport,
};
use crate::{
    BoxedEventStream, ModelProvider, ModelRequest, ModelResponse, ProviderError, ProviderFuture,
    ProviderId,
};

pub const OLLAMA_BASE_URL: &str = "http://localhost:11434/v1";

#[derive(Clone)]
pub struct OllamaProvider {
    transport: Arc<dyn OpenAiTransport>,
    fallback_model: String,
    embedding_model: String,
}

impl OllamaProvider {
    pub fn new(transport: Arc<dyn OpenAiTransport>) -> Self {
        Self {
            transport,
            fallback_model: "llama3.2".to_string(),
            embedding_model: "nomic-embed-text".to_string(),
        }
    }

    pub fn with_fallback_model(mut self, model: impl Into<String>) -> Self {
        self.fallback_model = model.into();
        self
    }

    pub fn default_http_transport(client: Client) -> OpenAiHttpTransport {
        OpenAiHttpTransport::new(client).with_base_url(OLLAMA_BASE_URL)
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

impl ModelProvider for OllamaProvider {
    fn id(&self) -> ProviderId {
        ProviderId::Ollama
    }

    fn complete<'a>(
        &'a self,
        request: ModelRequest,
    ) -> ProviderFuture<'a, Result<ModelResponse, ProviderError>> {
        Box::pin(async move {
            request.validate()?;
            let wire_request = self.build_wire_request(request, false);
            let response = self
                .transport
                .complete(wire_request, OpenAiAuth::None)
                .await?;
            Ok(response.into_model_response(ProviderId::Ollama))
        })
    }

    fn stream<'a>(
        &'a self,
        request: ModelRequest,
    ) -> ProviderFuture<'a, Result<BoxedEventStream<'a>, ProviderError>> {
        Box::pin(async move {
            request.validate()?;
            let wire_request = self.build_wire_request(request, true);
            let mut chunks = self.transport.stream(wire_request, OpenAiAuth::None).await?;

            let stream = try_stream! {
                while let Some(chunk) = chunks.next().await {
                    yield chunk?.into_stream_event(ProviderId::Ollama);
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
            self.transport
                .embed(self.embedding_model.clone(), text, OpenAiAuth::None)
                .await
        })
    }
}

//! OpenAI transport trait and reqwest-based HTTP implementation.

use std::collections::BTreeMap;
use std::pin::Pin;

use async_stream::try_stream;
use futures_core::Stream;
use futures_util::StreamExt;
use reqwest::{Client, Response, StatusCode};

use crate::{ProviderError, ProviderFuture};

use super::serde_api::{
    OpenAiApiEmbeddingRequest, OpenAiApiEmbeddingResponse, OpenAiApiResponse,
    OpenAiApiStreamResponse, build_api_request, extract_error_message, parse_finish_reason,
};
use super::types::{
    OpenAiAssistantMessage, OpenAiAuth, OpenAiFinishReason, OpenAiRequest, OpenAiResponse,
    OpenAiStreamChunk, OpenAiToolCall, OpenAiUsage,
};

pub type OpenAiChunkStream<'a> =
    Pin<Box<dyn Stream<Item = Result<OpenAiStreamChunk, ProviderError>> + Send + 'a>>;

pub trait OpenAiTransport: Send + Sync {
    fn complete<'a>(
        &'a self,
        request: OpenAiRequest,
        auth: OpenAiAuth,
    ) -> ProviderFuture<'a, Result<OpenAiResponse, ProviderError>>;

    fn stream<'a>(
        &'a self,
        request: OpenAiRequest,
        auth: OpenAiAuth,
    ) -> ProviderFuture<'a, Result<OpenAiChunkStream<'a>, ProviderError>>;

    fn embed<'a>(
        &'a self,
        model: String,
        input: String,
        auth: OpenAiAuth,
    ) -> ProviderFuture<'a, Result<Vec<f32>, ProviderError>>;
}

#[derive(Debug, Clone)]
pub struct OpenAiHttpTransport {
    client: Client,
    base_url: String,
}

impl OpenAiHttpTransport {
    pub fn new(client: Client) -> Self {
        Self {
            client,
            base_url: "https://api.openai.com/v1".to_string(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base_url.trim_end_matches('/'), path)
    }

    fn apply_auth(
        &self,
        builder: reqwest::RequestBuilder,
        auth: &OpenAiAuth,
    ) -> reqwest::RequestBuilder {
        match auth {
            OpenAiAuth::Bearer(key) => builder.bearer_auth(key),
            OpenAiAuth::None => builder,
        }
    }

    fn map_send_error(error: reqwest::Error) -> ProviderError {
        if error.is_timeout() {
            ProviderError::timeout(error.to_string())
        } else if error.is_connect() {
            ProviderError::unavailable(error.to_string())
        } else {
            ProviderError::transport(error.to_string())
        }
    }

    async fn parse_error(response: Response) -> ProviderError {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        let message = extract_error_message(&body)
            .unwrap_or_else(|| format!("request failed with status {status}"));

        match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                ProviderError::authentication(message)
            }
            StatusCode::TOO_MANY_REQUESTS => ProviderError::rate_limited(message),
            StatusCode::REQUEST_TIMEOUT | StatusCode::GATEWAY_TIMEOUT => {
                ProviderError::timeout(message)
            }
            StatusCode::BAD_REQUEST | StatusCode::UNPROCESSABLE_ENTITY => {
                ProviderError::invalid_request(message)
            }
            StatusCode::SERVICE_UNAVAILABLE | StatusCode::BAD_GATEWAY => {
                ProviderError::unavailable(message)
            }
            _ => ProviderError::transport(message),
        }
    }
}

impl OpenAiTransport for OpenAiHttpTransport {
    fn complete<'a>(
        &'a self,
        request: OpenAiRequest,
        auth: OpenAiAuth,
    ) -> ProviderFuture<'a, Result<OpenAiResponse, ProviderError>> {
        Box::pin(async move {
            let api_request = build_api_request(request)?;
            let url = self.endpoint("chat/completions");
            let builder = self.client.post(url).json(&api_request);
            let response = self
                .apply_auth(builder, &auth)
                .send()
                .await
                .map_err(Self::map_send_error)?;

            if !response.status().is_success() {
                return Err(Self::parse_error(response).await);
            }

            let parsed: OpenAiApiResponse = response
                .json()
                .await
                .map_err(|error| ProviderError::transport(error.to_string()))?;

            OpenAiResponse::try_from(parsed)
        })
    }

    fn stream<'a>(
        &'a self,
        mut request: OpenAiRequest,
        auth: OpenAiAuth,
    ) -> ProviderFuture<'a, Result<OpenAiChunkStream<'a>, ProviderError>> {
        Box::pin(async move {
            request.stream = true;
            let model_for_fallback = request.model.clone();
            let api_request = build_api_request(request)?;
            let url = self.endpoint("chat/completions");
            let builder = self.client.post(url).json(&api_request);
            let response = self
                .apply_auth(builder, &auth)
                .send()
                .await
                .map_err(Self::map_send_error)?;

            if !response.status().is_success() {
                return Err(Self::parse_error(response).await);
            }

            let stream = try_stream! {
                let mut chunks = response.bytes_stream();
                let mut sse_buffer = String::new();
                let mut finished = false;
                let mut content = String::new();
                let mut tool_calls: BTreeMap<u32, OpenAiToolCall> = BTreeMap::new();
                let mut model = None::<String>;
                let mut finish_reason = OpenAiFinishReason::Other;

                while let Some(item) = chunks.next().await {
                    let bytes = item.map_err(|error| ProviderError::transport(error.to_string()))?;
                    let text = std::str::from_utf8(&bytes)
                        .map_err(|error| ProviderError::transport(error.to_string()))?;
                    sse_buffer.push_str(text);

                    while let Some(newline_index) = sse_buffer.find('\n') {
                        let line = sse_buffer.drain(..=newline_index).collect::<String>();
                        let line = line.trim();

                        if !line.starts_with("data:") {
                            continue;
                        }

                        let payload = line.trim_start_matches("data:").trim();
                        if payload == "[DONE]" {
                            finished = true;
                            break;
                        }

                        let parsed: OpenAiApiStreamResponse = serde_json::from_str(payload)
                            .map_err(|error| ProviderError::transport(error.to_string()))?;

                        if model.is_none() {
                            model = Some(parsed.model.clone());
                        }

                        if let Some(choice) = parsed.choices.first() {
                            if let Some(delta_content) = &choice.delta.content
                                && !delta_content.is_empty()
                            {
                                content.push_str(delta_content);
                                yield OpenAiStreamChunk::TextDelta(delta_content.clone());
                            }

                            if let Some(delta_tool_calls) = &choice.delta.tool_calls {
                                for delta_call in delta_tool_calls {
                                    let index = delta_call.index.unwrap_or(0);
                                    let entry =
                                        tool_calls.entry(index).or_insert_with(|| OpenAiToolCall {
                                            id: String::new(),
                                            name: String::new(),
                                            arguments: String::new(),
                                        });

                                    if let Some(id) = &delta_call.id {
                                        entry.id = id.clone();
                                    }

                                    if let Some(function) = &delta_call.function {
                                        if let Some(name) = &function.name {
                                            entry.name = name.clone();
                                        }

                                        if let Some(arguments) = &function.arguments {
                                            entry.arguments.push_str(arguments);
                                        }
                                    }

                                    yield OpenAiStreamChunk::ToolCallDelta(entry.clone());
                                }
                            }

                            if let Some(reason) = &choice.finish_reason {
                                finish_reason = parse_finish_reason(Some(reason.as_str()));
                            }
                        }
                    }

                    if finished {
                        break;
                    }
                }

                let response = OpenAiResponse {
                    model: model.unwrap_or(model_for_fallback),
                    message: OpenAiAssistantMessage {
                        content,
                        tool_calls: tool_calls.into_values().collect(),
                    },
                    finish_reason,
                    usage: OpenAiUsage::default(),
                };
                yield OpenAiStreamChunk::Completed(response);
            };

            Ok(Box::pin(stream) as OpenAiChunkStream<'a>)
        })
    }

    fn embed<'a>(
        &'a self,
        model: String,
        input: String,
        auth: OpenAiAuth,
    ) -> ProviderFuture<'a, Result<Vec<f32>, ProviderError>> {
        Box::pin(async move {
            let api_request = OpenAiApiEmbeddingRequest { model, input };
            let url = self.endpoint("embeddings");
            let builder = self.client.post(url).json(&api_request);
            let response = self
                .apply_auth(builder, &auth)
                .send()
                .await
                .map_err(Self::map_send_error)?;

            if !response.status().is_success() {
                return Err(Self::parse_error(response).await);
            }

            let parsed: OpenAiApiEmbeddingResponse = response
                .json()
                .await
                .map_err(|error| ProviderError::transport(error.to_string()))?;

            parsed
                .data
                .into_iter()
                .next()
                .map(|item| item.embedding)
                .ok_or_else(|| {
                    ProviderError::transport("embedding response did not include data")
                })
        })
    }
}

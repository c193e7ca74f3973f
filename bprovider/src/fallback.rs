//! Ranked provider fallback chain.
//!
//! Vendors are tried in rank order instead of flipping fallback flags on a
//! shared object. Content generation never errors out of the chain: when
//! every vendor fails, callers get a clearly marked placeholder response,
//! and embedding degrades to the all-zero "no semantic signal" vector.

use std::sync::Arc;

use crate::{
    Message, ModelProvider, ModelRequest, ModelResponse, NoopOperationHooks, OutputItem,
    ProviderError, ProviderFuture, ProviderId, ProviderOperationHooks, RetryPolicy, Role,
    StopReason, StreamEvent, TokenUsage, VecEventStream, estimate_tokens, execute_with_retry,
    zero_embedding,
};
use crate::stream::BoxedEventStream;

/// Marks responses produced without any reachable vendor.
pub const PLACEHOLDER_PREFIX: &str = "[assistant unavailable]";

pub struct FallbackChain {
    providers: Vec<Arc<dyn ModelProvider>>,
    policy: RetryPolicy,
    hooks: Arc<dyn ProviderOperationHooks>,
}

impl FallbackChain {
    /// Builds the chain from ranked providers. An empty list is the one hard
    /// configuration failure: no degraded answer exists without a vendor.
    pub fn new(providers: Vec<Arc<dyn ModelProvider>>) -> Result<Self, ProviderError> {
        if providers.is_empty() {
            return Err(ProviderError::configuration(
                "fallback chain requires at least one provider",
            ));
        }

        Ok(Self {
            providers,
            policy: RetryPolicy::default(),
            hooks: Arc::new(NoopOperationHooks),
        })
    }

    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_hooks(mut self, hooks: Arc<dyn ProviderOperationHooks>) -> Self {
        self.hooks = hooks;
        self
    }

    pub fn ranked_ids(&self) -> Vec<ProviderId> {
        self.providers.iter().map(|provider| provider.id()).collect()
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }

    fn placeholder_response(&self, request: &ModelRequest) -> ModelResponse {
        let content = format!(
            "{PLACEHOLDER_PREFIX} No language model vendor could be reached. \
             Check provider credentials and connectivity."
        );
        let input_text = request
            .messages
            .iter()
            .map(|message| message.content.as_str())
            .collect::<Vec<_>>()
            .join("\n");
        let input_tokens = estimate_tokens(&input_text);
        let output_tokens = estimate_tokens(&content);

        ModelResponse {
            provider: self.providers[0].id(),
            model: request.model.clone(),
            output: vec![OutputItem::Message(Message::new(Role::Assistant, content))],
            stop_reason: StopReason::Other,
            usage: TokenUsage {
                input_tokens,
                output_tokens,
                total_tokens: input_tokens + output_tokens,
            },
        }
    }

    fn note_fallback(&self, index: usize, operation: &str) {
        if let (Some(from), Some(to)) = (
            self.providers.get(index),
            self.providers.get(index + 1),
        ) {
            self.hooks.on_fallback(from.id(), to.id(), operation);
        }
    }
}

impl ModelProvider for FallbackChain {
    fn id(&self) -> ProviderId {
        self.providers[0].id()
    }

    fn complete<'a>(
        &'a self,
        request: ModelRequest,
    ) -> ProviderFuture<'a, Result<ModelResponse, ProviderError>> {
        Box::pin(async move {
            for (index, provider) in self.providers.iter().enumerate() {
                let attempt = execute_with_retry(
                    provider.id(),
                    "complete",
                    &self.policy,
                    self.hooks.as_ref(),
                    |_| provider.complete(request.clone()),
                    |delay| tokio::time::sleep(delay),
                )
                .await;

                match attempt {
                    Ok(response) => return Ok(response),
                    Err(_) => self.note_fallback(index, "complete"),
                }
            }

            Ok(self.placeholder_response(&request))
        })
    }

    fn stream<'a>(
        &'a self,
        request: ModelRequest,
    ) -> ProviderFuture<'a, Result<BoxedEventStream<'a>, ProviderError>> {
        Box::pin(async move {
            for (index, provider) in self.providers.iter().enumerate() {
                let attempt = execute_with_retry(
                    provider.id(),
                    "stream",
                    &self.policy,
                    self.hooks.as_ref(),
                    |_| provider.stream(request.clone()),
                    |delay| tokio::time::sleep(delay),
                )
                .await;

                match attempt {
                    Ok(stream) => return Ok(stream),
                    Err(_) => self.note_fallback(index, "stream"),
                }
            }

            let placeholder = self.placeholder_response(&request);
            let (text, _) = placeholder.clone().collect_output();
            let stream = VecEventStream::new(vec![
                Ok(StreamEvent::TextDelta(text)),
                Ok(StreamEvent::ResponseComplete(placeholder)),
            ]);
            Ok(Box::pin(stream) as BoxedEventStream<'a>)
        })
    }

    fn embed<'a>(
        &'a self,
        text: String,
    ) -> ProviderFuture<'a, Result<Vec<f32>, ProviderError>> {
        Box::pin(async move {
            for (index, provider) in self.providers.iter().enumerate() {
                let attempt = execute_with_retry(
                    provider.id(),
                    "embed",
                    &self.policy,
                    self.hooks.as_ref(),
                    |_| provider.embed(text.clone()),
                    |delay| tokio::time::sleep(delay),
                )
                .await;

                match attempt {
                    Ok(vector) => return Ok(vector),
                    Err(_) => self.note_fallback(index, "embed"),
                }
            }

            Ok(zero_embedding())
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use futures_util::StreamExt;

    use super::*;
    use crate::{EMBEDDING_DIMENSIONS, ProviderErrorKind, is_zero_embedding};

    struct ScriptedProvider {
        id: ProviderId,
        healthy: bool,
        calls: Mutex<Vec<String>>,
    }

    impl ScriptedProvider {
        fn healthy(id: ProviderId) -> Self {
            Self {
                id,
                healthy: true,
                calls: Mutex::new(Vec::new()),
            }
        }

        fn failing(id: ProviderId) -> Self {
            Self {
                id,
                healthy: false,
                calls: Mutex::new(Vec::new()),
            }
        }

        fn note(&self, operation: &str) {
            self.calls
                .lock()
                .expect("calls lock")
                .push(operation.to_string());
        }
    }

    impl ModelProvider for ScriptedProvider {
        fn id(&self) -> ProviderId {
            self.id
        }

        fn complete<'a>(
            &'a self,
            request: ModelRequest,
        ) -> ProviderFuture<'a, Result<ModelResponse, ProviderError>> {
            Box::pin(async move {
                self.note("complete");
                if !self.healthy {
                    return Err(ProviderError::unavailable("vendor down"));
                }

                Ok(ModelResponse {
                    provider: self.id,
                    model: request.model,
                    output: vec![OutputItem::Message(Message::new(
                        Role::Assistant,
                        format!("answer from {}", self.id),
                    ))],
                    stop_reason: StopReason::EndTurn,
                    usage: TokenUsage::default(),
                })
            })
        }

        fn stream<'a>(
            &'a self,
            request: ModelRequest,
        ) -> ProviderFuture<'a, Result<BoxedEventStream<'a>, ProviderError>> {
            Box::pin(async move {
                self.note("stream");
                if !self.healthy {
                    return Err(ProviderError::unavailable("vendor down"));
                }

                let response = ModelResponse {
                    provider: self.id,
                    model: request.model,
                    output: vec![OutputItem::Message(Message::new(Role::Assistant, "hi"))],
                    stop_reason: StopReason::EndTurn,
                    usage: TokenUsage::default(),
                };
                let stream = VecEventStream::new(vec![
                    Ok(StreamEvent::TextDelta("hi".to_string())),
                    Ok(StreamEvent::ResponseComplete(response)),
                ]);
                Ok(Box::pin(stream) as BoxedEventStream<'a>)
            })
        }

        fn embed<'a>(
            &'a self,
            _text: String,
        ) -> ProviderFuture<'a, Result<Vec<f32>, ProviderError>> {
            Box::pin(async move {
                self.note("embed");
                if !self.healthy {
                    return Err(ProviderError::unavailable("vendor down"));
                }

                Ok(vec![0.5; EMBEDDING_DIMENSIONS])
            })
        }
    }

    fn request() -> ModelRequest {
        ModelRequest::new(
            "gpt-4o-mini",
            vec![Message::new(Role::User, "How do I submit a leave request?")],
        )
    }

    #[test]
    fn empty_chain_is_a_configuration_error() {
        let error = FallbackChain::new(Vec::new()).err().expect("empty must fail");
        assert_eq!(error.kind, ProviderErrorKind::Configuration);
    }

    #[tokio::test]
    async fn healthy_primary_answers_without_fallback() {
        let chain = FallbackChain::new(vec![
            Arc::new(ScriptedProvider::healthy(ProviderId::OpenAi)),
            Arc::new(ScriptedProvider::healthy(ProviderId::Gemini)),
        ])
        .expect("chain should build");

        let response = chain
            .complete(request())
            .await
            .expect("completion should succeed");
        assert_eq!(response.provider, ProviderId::OpenAi);
    }

    #[tokio::test]
    async fn failed_primary_falls_through_to_next_rank() {
        let chain = FallbackChain::new(vec![
            Arc::new(ScriptedProvider::failing(ProviderId::OpenAi)),
            Arc::new(ScriptedProvider::healthy(ProviderId::Gemini)),
        ])
        .expect("chain should build")
        .with_policy(RetryPolicy::new(1));

        let response = chain
            .complete(request())
            .await
            .expect("completion should succeed");
        assert_eq!(response.provider, ProviderId::Gemini);
    }

    #[tokio::test]
    async fn total_failure_yields_marked_placeholder_not_error() {
        let chain = FallbackChain::new(vec![
            Arc::new(ScriptedProvider::failing(ProviderId::OpenAi)),
            Arc::new(ScriptedProvider::failing(ProviderId::Gemini)),
            Arc::new(ScriptedProvider::failing(ProviderId::Ollama)),
        ])
        .expect("chain should build")
        .with_policy(RetryPolicy::new(1));

        let response = chain
            .complete(request())
            .await
            .expect("placeholder must not be an error");
        let (text, _) = response.collect_output();
        assert!(text.starts_with(PLACEHOLDER_PREFIX));
    }

    #[tokio::test]
    async fn total_stream_failure_yields_placeholder_fragments() {
        let chain = FallbackChain::new(vec![Arc::new(ScriptedProvider::failing(
            ProviderId::OpenAi,
        ))])
        .expect("chain should build")
        .with_policy(RetryPolicy::new(1));

        let mut stream = chain
            .stream(request().enable_streaming())
            .await
            .expect("placeholder stream must not be an error");

        let first = stream
            .next()
            .await
            .expect("fragment expected")
            .expect("fragment should be ok");
        let StreamEvent::TextDelta(text) = first else {
            panic!("expected a text fragment first");
        };
        assert!(text.starts_with(PLACEHOLDER_PREFIX));

        let last = stream
            .next()
            .await
            .expect("terminal event expected")
            .expect("terminal event should be ok");
        assert!(matches!(last, StreamEvent::ResponseComplete(_)));
    }

    #[tokio::test]
    async fn embedding_total_failure_yields_exact_zero_vector() {
        let chain = FallbackChain::new(vec![
            Arc::new(ScriptedProvider::failing(ProviderId::OpenAi)),
            Arc::new(ScriptedProvider::failing(ProviderId::Gemini)),
        ])
        .expect("chain should build")
        .with_policy(RetryPolicy::new(1));

        let vector = chain
            .embed("leave policy".to_string())
            .await
            .expect("embedding must not be an error");
        assert_eq!(vector.len(), EMBEDDING_DIMENSIONS);
        assert!(is_zero_embedding(&vector));
    }

    #[tokio::test]
    async fn embedding_success_passes_vendor_vector_through() {
        let chain = FallbackChain::new(vec![Arc::new(ScriptedProvider::healthy(
            ProviderId::OpenAi,
        ))])
        .expect("chain should build");

        let vector = chain
            .embed("leave policy".to_string())
            .await
            .expect("embedding should succeed");
        assert!(!is_zero_embedding(&vector));
    }
}

//! Chat orchestration: embed, retrieve, reason, synthesize, persist — in
//! blocking and incremental forms.

use std::sync::Arc;
use std::time::Instant;

use async_stream::stream;
use bmemory::{ConversationMemory, SessionKey, StoreError};
use bprovider::{
    Message, ModelProvider, ModelRequest, Role, StreamEvent, TokenUsage, ToolDefinition,
    estimate_tokens, is_zero_embedding,
};
use btooling::{ToolExecutionContext, ToolUsageLog};
use futures_util::StreamExt;
use tokio::sync::Semaphore;

use crate::agent::{AgentInvocation, ReasoningAgent};
use crate::hooks::{ChatPhase, ChatPhaseHooks, NoopChatHooks};
use crate::retrieval::{DEFAULT_SEARCH_LIMIT, Retriever, format_chunks};
use crate::{AnswerEvent, AnswerStream, ChatError, ChatReply, ChatTurnRequest};

/// Simultaneous end-to-end requests admitted before callers start waiting.
pub const DEFAULT_MAX_CONCURRENT_REQUESTS: usize = 50;

/// User-visible text when answer synthesis itself fails.
pub const SYNTHESIS_APOLOGY: &str = "I'm sorry, I wasn't able to put together an answer \
this time. Please try again in a moment.";

const DEFAULT_SYSTEM_PROMPT: &str = "You are a helpful internal assistant for company \
employees. Ground your answers in internal documents and policies when they are \
available, and answer directly.";

const DEFAULT_MODEL: &str = "gpt-4o-mini";

pub struct ChatService {
    provider: Arc<dyn ModelProvider>,
    agent: Arc<dyn ReasoningAgent>,
    memory: Arc<ConversationMemory>,
    retriever: Option<Arc<dyn Retriever>>,
    tools: Vec<ToolDefinition>,
    system_prompt: String,
    model: String,
    retrieval_limit: usize,
    admission: Arc<Semaphore>,
    hooks: Arc<dyn ChatPhaseHooks>,
}

pub struct ChatServiceBuilder {
    provider: Arc<dyn ModelProvider>,
    agent: Arc<dyn ReasoningAgent>,
    memory: Arc<ConversationMemory>,
    retriever: Option<Arc<dyn Retriever>>,
    tools: Vec<ToolDefinition>,
    system_prompt: String,
    model: String,
    retrieval_limit: usize,
    max_concurrent_requests: usize,
    hooks: Arc<dyn ChatPhaseHooks>,
}

impl ChatServiceBuilder {
    pub fn retriever(mut self, retriever: Arc<dyn Retriever>) -> Self {
        self.retriever = Some(retriever);
        self
    }

    /// Tool definitions advertised to the reasoning step.
    pub fn tools(mut self, tools: Vec<ToolDefinition>) -> Self {
        self.tools = tools;
        self
    }

    pub fn system_prompt(mut self, system_prompt: impl Into<String>) -> Self {
        self.system_prompt = system_prompt.into();
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn retrieval_limit(mut self, retrieval_limit: usize) -> Self {
        self.retrieval_limit = retrieval_limit.max(1);
        self
    }

    pub fn max_concurrent_requests(mut self, bound: usize) -> Self {
        self.max_concurrent_requests = bound.max(1);
        self
    }

    pub fn hooks(mut self, hooks: Arc<dyn ChatPhaseHooks>) -> Self {
        self.hooks = hooks;
        self
    }

    pub fn build(self) -> ChatService {
        ChatService {
            provider: self.provider,
            agent: self.agent,
            memory: self.memory,
            retriever: self.retriever,
            tools: self.tools,
            system_prompt: self.system_prompt,
            model: self.model,
            retrieval_limit: self.retrieval_limit,
            admission: Arc::new(Semaphore::new(self.max_concurrent_requests)),
            hooks: self.hooks,
        }
    }
}

struct PreparedTurn {
    synthesis_request: ModelRequest,
    usage_log: Arc<ToolUsageLog>,
    started: Instant,
}

impl ChatService {
    pub fn builder(
        provider: Arc<dyn ModelProvider>,
        agent: Arc<dyn ReasoningAgent>,
        memory: Arc<ConversationMemory>,
    ) -> ChatServiceBuilder {
        ChatServiceBuilder {
            provider,
            agent,
            memory,
            retriever: None,
            tools: Vec::new(),
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            model: DEFAULT_MODEL.to_string(),
            retrieval_limit: DEFAULT_SEARCH_LIMIT,
            max_concurrent_requests: DEFAULT_MAX_CONCURRENT_REQUESTS,
            hooks: Arc::new(NoopChatHooks),
        }
    }

    pub fn memory(&self) -> Arc<ConversationMemory> {
        Arc::clone(&self.memory)
    }

    pub async fn init_session(&self, key: &SessionKey) -> Result<String, StoreError> {
        self.memory.init_session(key).await
    }

    pub async fn clear_memory(&self) -> Result<u64, StoreError> {
        self.memory.clear().await
    }

    /// Runs the full pipeline to completion and returns one reply.
    pub async fn chat(&self, request: ChatTurnRequest) -> Result<ChatReply, ChatError> {
        let _permit = Arc::clone(&self.admission)
            .acquire_owned()
            .await
            .map_err(|_| ChatError::admission("admission gate closed"))?;

        let prepared = self.prepare_turn(&request).await?;

        self.hooks.on_phase_start(ChatPhase::SynthesizingAnswer);
        let (content, usage) = match self
            .provider
            .complete(prepared.synthesis_request.clone())
            .await
        {
            Ok(response) => {
                let usage = response.usage;
                let (text, _) = response.collect_output();
                if text.is_empty() {
                    (SYNTHESIS_APOLOGY.to_string(), usage)
                } else {
                    (text, usage)
                }
            }
            Err(error) => {
                self.hooks
                    .on_degraded(ChatPhase::SynthesizingAnswer, &error.to_string());
                (SYNTHESIS_APOLOGY.to_string(), TokenUsage::default())
            }
        };

        self.persist_turn(&request.prompt, &content).await;

        let usage = if usage.is_empty() {
            estimated_usage(&prepared.synthesis_request, &content)
        } else {
            usage
        };

        let elapsed = prepared.started.elapsed();
        self.hooks.on_turn_complete(elapsed);
        self.hooks.on_phase_start(ChatPhase::Done);

        Ok(ChatReply {
            content,
            tool_usages: prepared.usage_log.drain(),
            usage,
            time_response: elapsed.as_secs_f64(),
        })
    }

    /// Runs reasoning to completion, then streams only answer synthesis.
    ///
    /// A mid-stream provider failure falls back to one blocking completion
    /// yielded as a single fragment. Whatever happens, exactly one assistant
    /// message lands in history, after the stream terminates.
    pub async fn chat_stream(
        &self,
        request: ChatTurnRequest,
    ) -> Result<AnswerStream<'_>, ChatError> {
        let permit = Arc::clone(&self.admission)
            .acquire_owned()
            .await
            .map_err(|_| ChatError::admission("admission gate closed"))?;

        let prepared = self.prepare_turn(&request).await?;

        let events = stream! {
            let _permit = permit;
            self.hooks.on_phase_start(ChatPhase::SynthesizingAnswer);

            let mut assembled = String::new();
            let mut fall_back = false;

            match self
                .provider
                .stream(prepared.synthesis_request.clone().enable_streaming())
                .await
            {
                Ok(mut fragments) => {
                    while let Some(event) = fragments.next().await {
                        match event {
                            Ok(StreamEvent::TextDelta(delta)) => {
                                assembled.push_str(&delta);
                                yield AnswerEvent::fragment(delta, &request);
                            }
                            Ok(StreamEvent::ResponseComplete(response)) => {
                                let (text, _) = response.collect_output();
                                if !text.is_empty() {
                                    if assembled.is_empty() {
                                        yield AnswerEvent::fragment(text.clone(), &request);
                                    }
                                    assembled = text;
                                }
                            }
                            Ok(_) => {}
                            Err(error) => {
                                self.hooks.on_degraded(
                                    ChatPhase::SynthesizingAnswer,
                                    &error.to_string(),
                                );
                                yield AnswerEvent::error(error.to_string(), &request);
                                fall_back = true;
                                break;
                            }
                        }
                    }
                }
                Err(error) => {
                    self.hooks
                        .on_degraded(ChatPhase::SynthesizingAnswer, &error.to_string());
                    fall_back = true;
                }
            }

            if fall_back {
                assembled = match self
                    .provider
                    .complete(prepared.synthesis_request.clone())
                    .await
                {
                    Ok(response) => {
                        let (text, _) = response.collect_output();
                        if text.is_empty() {
                            SYNTHESIS_APOLOGY.to_string()
                        } else {
                            text
                        }
                    }
                    Err(_) => SYNTHESIS_APOLOGY.to_string(),
                };
                yield AnswerEvent::fragment(assembled.clone(), &request);
            } else if assembled.is_empty() {
                assembled = SYNTHESIS_APOLOGY.to_string();
                yield AnswerEvent::fragment(assembled.clone(), &request);
            }

            self.persist_turn(&request.prompt, &assembled).await;

            let elapsed = prepared.started.elapsed();
            self.hooks.on_turn_complete(elapsed);
            self.hooks.on_phase_start(ChatPhase::Done);

            yield AnswerEvent::Done {
                tool_usages: prepared.usage_log.drain(),
                time_response: elapsed.as_secs_f64(),
            };
        };

        let boxed: AnswerStream<'_> = Box::pin(events);
        Ok(boxed)
    }

    async fn prepare_turn(
        &self,
        request: &ChatTurnRequest,
    ) -> Result<PreparedTurn, ChatError> {
        if request.prompt.trim().is_empty() {
            return Err(ChatError::invalid_request("prompt must not be empty"));
        }

        let started = Instant::now();

        self.hooks.on_phase_start(ChatPhase::EmbeddingQuery);
        let query_vector = match self.provider.embed(request.prompt.clone()).await {
            Ok(vector) => vector,
            Err(error) => {
                self.hooks
                    .on_degraded(ChatPhase::EmbeddingQuery, &error.to_string());
                bprovider::zero_embedding()
            }
        };

        // An all-zero vector carries no semantic signal; retrieval would
        // only return noise.
        let grounding = match (&self.retriever, is_zero_embedding(&query_vector)) {
            (Some(retriever), false) => {
                match retriever
                    .search(query_vector, self.retrieval_limit, None)
                    .await
                {
                    Ok(chunks) => format_chunks(&chunks),
                    Err(error) => {
                        self.hooks
                            .on_degraded(ChatPhase::EmbeddingQuery, &error.to_string());
                        String::new()
                    }
                }
            }
            _ => String::new(),
        };

        let history = self.memory.history().await;
        let usage_log = Arc::new(ToolUsageLog::new());

        let session_id = self
            .memory
            .active_session()
            .map(|session| session.id)
            .unwrap_or_else(|| {
                if request.session_name.is_empty() {
                    "anonymous".to_string()
                } else {
                    request.session_name.clone()
                }
            });

        let context = ToolExecutionContext::new(session_id)
            .with_metadata("mode", request.mode.as_str())
            .with_metadata("topic", request.topic.clone())
            .with_usage_log(Arc::clone(&usage_log));

        self.hooks.on_phase_start(ChatPhase::Reasoning);
        let agent_input = if grounding.is_empty() {
            request.prompt.clone()
        } else {
            format!(
                "{}\n\nRelevant internal documents:\n{}",
                request.prompt, grounding
            )
        };

        let analysis = match self
            .agent
            .invoke(AgentInvocation {
                input: agent_input,
                chat_history: history.clone(),
                tools: self.tools.clone(),
                mode: request.mode,
                context,
            })
            .await
        {
            Ok(output) => output,
            Err(error) => {
                self.hooks
                    .on_degraded(ChatPhase::Reasoning, &error.to_string());
                format!(
                    "The analysis step was unavailable ({}). Answer from the \
                     conversation context and general policy knowledge.",
                    error.message
                )
            }
        };

        // The second pass is not optional: agent output is untrusted free
        // text and is always restated against the original question.
        let synthesis_prompt = format!(
            "Based on my question:\n{}\nand the analysis result:\n{}\nWrite the final \
             answer. Be detailed and specific, and answer the question directly.",
            request.prompt, analysis
        );

        let mut messages = vec![Message::new(Role::System, self.system_prompt.clone())];
        messages.extend(history);
        messages.push(Message::new(Role::User, synthesis_prompt));

        Ok(PreparedTurn {
            synthesis_request: ModelRequest::new(self.model.clone(), messages),
            usage_log,
            started,
        })
    }

    /// History loss is preferred over answer loss: store failures are
    /// reported and the reply still goes out.
    async fn persist_turn(&self, prompt: &str, content: &str) {
        self.hooks.on_phase_start(ChatPhase::Persisting);

        if let Err(error) = self.memory.append(Role::User, prompt).await {
            self.hooks
                .on_degraded(ChatPhase::Persisting, &error.to_string());
        }

        if let Err(error) = self.memory.append(Role::Assistant, content).await {
            self.hooks
                .on_degraded(ChatPhase::Persisting, &error.to_string());
        }
    }
}

fn estimated_usage(request: &ModelRequest, content: &str) -> TokenUsage {
    let input_text = request
        .messages
        .iter()
        .map(|message| message.content.as_str())
        .collect::<Vec<_>>()
        .join("\n");
    let input_tokens = estimate_tokens(&input_text);
    let output_tokens = estimate_tokens(content);

    TokenUsage {
        input_tokens,
        output_tokens,
        total_tokens: input_tokens + output_tokens,
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use bcommon::BoxFuture;
    use bprovider::{
        BoxedEventStream, EMBEDDING_DIMENSIONS, ModelResponse, OutputItem, ProviderError,
        ProviderFuture, ProviderId, StopReason, VecEventStream,
    };

    use super::*;
    use crate::ChatMode;

    struct FakeAgent {
        analysis: Result<String, ChatError>,
    }

    impl ReasoningAgent for FakeAgent {
        fn invoke<'a>(
            &'a self,
            _invocation: AgentInvocation,
        ) -> BoxFuture<'a, Result<String, ChatError>> {
            let outcome = self.analysis.clone();
            Box::pin(async move { outcome })
        }
    }

    #[derive(Clone, Copy, PartialEq)]
    enum StreamScript {
        Clean,
        MidFailure,
        Unreachable,
    }

    struct FakeSynthesisProvider {
        script: StreamScript,
        complete_fails: bool,
        completions: Mutex<u32>,
    }

    impl FakeSynthesisProvider {
        fn new(script: StreamScript) -> Self {
            Self {
                script,
                complete_fails: false,
                completions: Mutex::new(0),
            }
        }

        fn with_failing_completion(mut self) -> Self {
            self.complete_fails = true;
            self
        }

        fn response(text: &str) -> ModelResponse {
            ModelResponse {
                provider: ProviderId::OpenAi,
                model: "gpt-4o-mini".to_string(),
                output: vec![OutputItem::Message(Message::new(Role::Assistant, text))],
                stop_reason: StopReason::EndTurn,
                usage: TokenUsage::default(),
            }
        }
    }

    impl ModelProvider for FakeSynthesisProvider {
        fn id(&self) -> ProviderId {
            ProviderId::OpenAi
        }

        fn complete<'a>(
            &'a self,
            _request: ModelRequest,
        ) -> ProviderFuture<'a, Result<ModelResponse, ProviderError>> {
            Box::pin(async move {
                *self.completions.lock().expect("completions lock") += 1;
                if self.complete_fails {
                    return Err(ProviderError::unavailable("vendor down"));
                }
                Ok(Self::response(
                    "You have 12 vacation days left this year.",
                ))
            })
        }

        fn stream<'a>(
            &'a self,
            _request: ModelRequest,
        ) -> ProviderFuture<'a, Result<BoxedEventStream<'a>, ProviderError>> {
            Box::pin(async move {
                let events = match self.script {
                    StreamScript::Clean => vec![
                        Ok(StreamEvent::TextDelta("You have ".to_string())),
                        Ok(StreamEvent::TextDelta("12 vacation days left.".to_string())),
                        Ok(StreamEvent::ResponseComplete(Self::response(
                            "You have 12 vacation days left.",
                        ))),
                    ],
                    StreamScript::MidFailure => vec![
                        Ok(StreamEvent::TextDelta("You have ".to_string())),
                        Err(ProviderError::transport("connection reset")),
                    ],
                    StreamScript::Unreachable => {
                        return Err(ProviderError::unavailable("no stream"));
                    }
                };
                Ok(Box::pin(VecEventStream::new(events)) as BoxedEventStream<'a>)
            })
        }

        fn embed<'a>(
            &'a self,
            _text: String,
        ) -> ProviderFuture<'a, Result<Vec<f32>, ProviderError>> {
            Box::pin(async move { Ok(vec![0.1; EMBEDDING_DIMENSIONS]) })
        }
    }

    fn service(provider: FakeSynthesisProvider, agent: FakeAgent) -> ChatService {
        ChatService::builder(
            Arc::new(provider),
            Arc::new(agent),
            Arc::new(ConversationMemory::detached()),
        )
        .build()
    }

    fn request() -> ChatTurnRequest {
        ChatTurnRequest::new("How many vacation days do I have left?")
            .with_mode(ChatMode::Normal)
            .with_topic("HR")
            .with_session_name("leave-plan")
    }

    #[tokio::test]
    async fn blocking_chat_returns_answer_and_persists_one_turn() {
        let service = service(
            FakeSynthesisProvider::new(StreamScript::Clean),
            FakeAgent {
                analysis: Ok("12 days remain per the leave ledger.".to_string()),
            },
        );

        let reply = service.chat(request()).await.expect("chat should work");
        assert!(!reply.content.is_empty());
        assert!(reply.usage.total_tokens > 0);
        assert!(reply.time_response >= 0.0);

        let history = service.memory().history().await;
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].role, Role::User);
        assert_eq!(history[1].role, Role::Assistant);
    }

    #[tokio::test]
    async fn empty_prompt_is_rejected_before_any_work() {
        let service = service(
            FakeSynthesisProvider::new(StreamScript::Clean),
            FakeAgent {
                analysis: Ok("unused".to_string()),
            },
        );

        let error = service
            .chat(ChatTurnRequest::new("   "))
            .await
            .expect_err("blank prompt should fail");
        assert_eq!(error.kind, crate::ChatErrorKind::InvalidRequest);
    }

    #[tokio::test]
    async fn reasoning_failure_still_produces_a_synthesized_answer() {
        let service = service(
            FakeSynthesisProvider::new(StreamScript::Clean),
            FakeAgent {
                analysis: Err(ChatError::agent("agent timed out")),
            },
        );

        let reply = service.chat(request()).await.expect("chat should work");
        assert!(!reply.content.is_empty());
        assert_ne!(reply.content, SYNTHESIS_APOLOGY);
    }

    #[tokio::test]
    async fn synthesis_failure_produces_apology_and_still_persists() {
        let service = service(
            FakeSynthesisProvider::new(StreamScript::Clean).with_failing_completion(),
            FakeAgent {
                analysis: Ok("analysis".to_string()),
            },
        );

        let reply = service.chat(request()).await.expect("chat should work");
        assert_eq!(reply.content, SYNTHESIS_APOLOGY);

        let history = service.memory().history().await;
        assert_eq!(history.len(), 2);
        assert_eq!(history[1].content, SYNTHESIS_APOLOGY);
    }

    #[tokio::test]
    async fn stream_yields_fragments_then_terminal_aggregates() {
        let service = service(
            FakeSynthesisProvider::new(StreamScript::Clean),
            FakeAgent {
                analysis: Ok("analysis".to_string()),
            },
        );

        let mut events = service
            .chat_stream(request())
            .await
            .expect("stream should start");
        let mut collected = Vec::new();
        while let Some(event) = events.next().await {
            collected.push(event);
        }
        drop(events);

        assert!(collected.len() >= 3);
        assert!(matches!(collected[0], AnswerEvent::Fragment { .. }));
        assert!(matches!(
            collected.last().expect("terminal event"),
            AnswerEvent::Done { .. }
        ));

        let history = service.memory().history().await;
        assert_eq!(history.len(), 2);
        assert_eq!(history[1].role, Role::Assistant);
        assert_eq!(history[1].content, "You have 12 vacation days left.");
    }

    #[tokio::test]
    async fn mid_stream_failure_falls_back_to_one_blocking_fragment() {
        let service = service(
            FakeSynthesisProvider::new(StreamScript::MidFailure),
            FakeAgent {
                analysis: Ok("analysis".to_string()),
            },
        );

        let mut events = service
            .chat_stream(request())
            .await
            .expect("stream should start");
        let mut fragments = Vec::new();
        let mut errors = 0;
        while let Some(event) = events.next().await {
            match event {
                AnswerEvent::Fragment { content, .. } => fragments.push(content),
                AnswerEvent::Error { .. } => errors += 1,
                AnswerEvent::Done { .. } => {}
            }
        }
        drop(events);

        assert_eq!(errors, 1);
        assert_eq!(
            fragments.last().expect("fallback fragment"),
            "You have 12 vacation days left this year."
        );

        let history = service.memory().history().await;
        let assistant_turns: Vec<_> = history
            .iter()
            .filter(|message| message.role == Role::Assistant)
            .collect();
        assert_eq!(assistant_turns.len(), 1);
        assert_eq!(
            assistant_turns[0].content,
            "You have 12 vacation days left this year."
        );
    }

    #[tokio::test]
    async fn unreachable_stream_still_ends_with_one_coherent_message() {
        let service = service(
            FakeSynthesisProvider::new(StreamScript::Unreachable),
            FakeAgent {
                analysis: Ok("analysis".to_string()),
            },
        );

        let mut events = service
            .chat_stream(request())
            .await
            .expect("stream should start");
        let mut fragments = Vec::new();
        while let Some(event) = events.next().await {
            if let AnswerEvent::Fragment { content, .. } = event {
                fragments.push(content);
            }
        }
        drop(events);

        assert_eq!(fragments.len(), 1);

        let history = service.memory().history().await;
        assert_eq!(history.len(), 2);
    }
}

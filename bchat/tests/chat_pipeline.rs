//! End-to-end pipeline behavior over a real (in-process) store.

use std::sync::Arc;

use bchat::{
    AgentInvocation, AnswerEvent, ChatService, ChatTurnRequest, ReasoningAgent,
};
use bcommon::BoxFuture;
use bmemory::{
    ConversationMemory, MessageRepository, SessionKey, SessionRepository, StoreConfig,
    build_pool,
};
use bprovider::{
    BoxedEventStream, Message, ModelProvider, ModelRequest, ModelResponse, OutputItem,
    ProviderError, ProviderFuture, ProviderId, Role, StopReason, StreamEvent, TokenUsage,
    VecEventStream, zero_embedding,
};
use futures_util::StreamExt;

/// Echoes the final user message back as the assistant answer. The synthesis
/// prompt embeds the original question, so replies stay correlated with the
/// turn that produced them.
struct EchoProvider;

impl EchoProvider {
    fn answer(request: &ModelRequest) -> String {
        let last = request
            .messages
            .last()
            .map(|message| message.content.clone())
            .unwrap_or_default();
        format!("echo: {last}")
    }
}

impl ModelProvider for EchoProvider {
    fn id(&self) -> ProviderId {
        ProviderId::OpenAi
    }

    fn complete<'a>(
        &'a self,
        request: ModelRequest,
    ) -> ProviderFuture<'a, Result<ModelResponse, ProviderError>> {
        Box::pin(async move {
            let content = Self::answer(&request);
            Ok(ModelResponse {
                provider: ProviderId::OpenAi,
                model: request.model,
                output: vec![OutputItem::Message(Message::new(Role::Assistant, content))],
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
            let content = Self::answer(&request);
            let response = ModelResponse {
                provider: ProviderId::OpenAi,
                model: request.model,
                output: vec![OutputItem::Message(Message::new(
                    Role::Assistant,
                    content.clone(),
                ))],
                stop_reason: StopReason::EndTurn,
                usage: TokenUsage::default(),
            };
            let events = vec![
                Ok(StreamEvent::TextDelta(content)),
                Ok(StreamEvent::ResponseComplete(response)),
            ];
            Ok(Box::pin(VecEventStream::new(events)) as BoxedEventStream<'a>)
        })
    }

    fn embed<'a>(
        &'a self,
        _text: String,
    ) -> ProviderFuture<'a, Result<Vec<f32>, ProviderError>> {
        Box::pin(async move { Ok(zero_embedding()) })
    }
}

struct RelayAgent;

impl ReasoningAgent for RelayAgent {
    fn invoke<'a>(
        &'a self,
        invocation: AgentInvocation,
    ) -> BoxFuture<'a, Result<String, bchat::ChatError>> {
        Box::pin(async move { Ok(format!("analysis of: {}", invocation.input)) })
    }
}

async fn memory_over_fresh_store() -> (SessionRepository, MessageRepository) {
    let pool = build_pool(&StoreConfig::in_memory())
        .await
        .expect("pool should build");
    let sessions = SessionRepository::with_pool(pool.clone())
        .await
        .expect("session repository should build");
    let messages = MessageRepository::with_pool(pool)
        .await
        .expect("message repository should build");
    (sessions, messages)
}

fn service_over(memory: Arc<ConversationMemory>) -> ChatService {
    ChatService::builder(Arc::new(EchoProvider), Arc::new(RelayAgent), memory).build()
}

#[tokio::test]
async fn vacation_question_round_trips_through_store_and_pipeline() {
    let (sessions, messages) = memory_over_fresh_store().await;
    let memory = Arc::new(ConversationMemory::from_repositories(sessions, messages));
    let service = service_over(Arc::clone(&memory));

    let key = SessionKey::new("leave-plan", "alice@x.com", "HR");
    let first_id = memory.init_session(&key).await.expect("init should work");
    let second_id = memory.init_session(&key).await.expect("init should work");
    assert_eq!(first_id, second_id);

    let reply = service
        .chat(
            ChatTurnRequest::new("How many vacation days do I have left?")
                .with_topic("HR")
                .with_session_name("leave-plan"),
        )
        .await
        .expect("chat should work");

    assert!(!reply.content.is_empty());
    assert!(reply.time_response >= 0.0);
    // No tools are registered for this service; the list is simply empty.
    assert!(reply.tool_usages.is_empty());

    let history = memory.history().await;
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].role, Role::User);
    assert_eq!(history[0].content, "How many vacation days do I have left?");
    assert_eq!(history[1].role, Role::Assistant);
}

#[tokio::test]
async fn streaming_turn_persists_exactly_one_assistant_message() {
    let (sessions, messages) = memory_over_fresh_store().await;
    let memory = Arc::new(ConversationMemory::from_repositories(sessions, messages));
    let service = service_over(Arc::clone(&memory));

    memory
        .init_session(&SessionKey::new("stream", "bob@x.com", "IT"))
        .await
        .expect("init should work");

    let mut events = service
        .chat_stream(
            ChatTurnRequest::new("Is the VPN portal down?")
                .with_topic("IT")
                .with_session_name("stream"),
        )
        .await
        .expect("stream should start");

    let mut saw_terminal = false;
    while let Some(event) = events.next().await {
        if matches!(event, AnswerEvent::Done { .. }) {
            saw_terminal = true;
        }
    }
    drop(events);
    assert!(saw_terminal);

    let history = memory.history().await;
    let assistant_count = history
        .iter()
        .filter(|message| message.role == Role::Assistant)
        .count();
    assert_eq!(assistant_count, 1);
}

#[tokio::test]
async fn delete_session_for_unknown_triple_reports_false() {
    let (sessions, messages) = memory_over_fresh_store().await;
    let memory = Arc::new(ConversationMemory::from_repositories(sessions, messages));

    let deleted = memory
        .delete_session(&SessionKey::new("never-created", "nobody@x.com", "HR"))
        .await
        .expect("delete should not error");
    assert!(!deleted);
}

#[tokio::test(flavor = "multi_thread")]
async fn concurrent_sessions_interleave_without_corruption() {
    let (sessions, messages) = memory_over_fresh_store().await;

    let memory_a = Arc::new(ConversationMemory::from_repositories(
        sessions.clone(),
        messages.clone(),
    ));
    let memory_b = Arc::new(ConversationMemory::from_repositories(sessions, messages));

    memory_a
        .init_session(&SessionKey::new("payroll", "alice@x.com", "Finance"))
        .await
        .expect("init should work");
    memory_b
        .init_session(&SessionKey::new("equipment", "bob@x.com", "IT"))
        .await
        .expect("init should work");

    let service_a = Arc::new(service_over(Arc::clone(&memory_a)));
    let service_b = Arc::new(service_over(Arc::clone(&memory_b)));

    let task_a = {
        let service = Arc::clone(&service_a);
        tokio::spawn(async move {
            for index in 0..3 {
                service
                    .chat(ChatTurnRequest::new(format!("payroll question {index}")))
                    .await
                    .expect("chat should work");
            }
        })
    };

    let task_b = {
        let service = Arc::clone(&service_b);
        tokio::spawn(async move {
            for index in 0..3 {
                service
                    .chat(ChatTurnRequest::new(format!("equipment question {index}")))
                    .await
                    .expect("chat should work");
            }
        })
    };

    task_a.await.expect("task a should finish");
    task_b.await.expect("task b should finish");

    for (memory, label) in [(memory_a, "payroll"), (memory_b, "equipment")] {
        let history = memory.history().await;
        assert_eq!(history.len(), 6, "{label} history should hold three turns");

        for (index, pair) in history.chunks(2).enumerate() {
            assert_eq!(pair[0].role, Role::User);
            assert_eq!(pair[0].content, format!("{label} question {index}"));
            assert_eq!(pair[1].role, Role::Assistant);
            assert!(
                pair[1].content.contains(&format!("{label} question {index}")),
                "{label} reply {index} should answer its own prompt"
            );
        }
    }
}

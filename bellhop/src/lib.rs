//! Unified facade over the bellhop workspace crates.
//!
//! This crate is designed to be the single dependency for most applications:
//! it re-exports the core crates and provides wiring helpers that assemble
//! the assistant on the shared runtime.

mod providers;
mod runtime;
mod util;

pub mod prelude;

pub use bchat;
pub use bcommon;
pub use bmemory;
pub use bobserve;
pub use bprovider;
pub use bruntime;
pub use btooling;

pub use bchat::{
    AgentInvocation, AnswerEvent, AnswerStream, ChatError, ChatErrorKind, ChatMode, ChatPhase,
    ChatPhaseHooks, ChatReply, ChatService, ChatServiceBuilder, ChatTurnRequest, HttpRetriever,
    NoopChatHooks, ReasoningAgent, Retriever, SYNTHESIS_APOLOGY, ScoredChunk,
    SearchDocumentsTool, ToolLoopAgent,
};
pub use bcommon::{BoxFuture, MetadataMap, SessionId, TraceId};
pub use bmemory::{
    ConversationMemory, DEFAULT_HISTORY_LIMIT, MessageRepository, SessionKey, SessionRepository,
    StoreConfig, StoreError, StoreErrorKind,
};
pub use bobserve::{MetricsObservabilityHooks, TracingObservabilityHooks};
pub use bprovider::{
    BoxedEventStream, CredentialStore, EMBEDDING_DIMENSIONS, FallbackChain, Message,
    ModelEventStream, ModelProvider, ModelRequest, ModelRequestBuilder, ModelResponse,
    NoopOperationHooks, OutputItem, PLACEHOLDER_PREFIX, ProviderError, ProviderErrorKind,
    ProviderFuture, ProviderId, ProviderOperationHooks, RetryPolicy, Role, SecretString,
    StopReason, StreamEvent, TokenUsage, ToolCall, ToolDefinition, ToolResult, VecEventStream,
    estimate_tokens, execute_with_retry, is_zero_embedding, zero_embedding,
};
pub use bprovider::adapters::gemini::GeminiProvider;
pub use bprovider::adapters::ollama::OllamaProvider;
pub use bprovider::adapters::openai::{OpenAiHttpTransport, OpenAiProvider, OpenAiTransport};
pub use bruntime::{
    BlockingStream, HttpClientConfig, LoopDriver, RuntimeError, RuntimeErrorKind, SharedRuntime,
};
pub use btooling::{
    CompanyInfoTool, CurrentDatetimeTool, DefaultToolRuntime, DepartmentDirectoryTool,
    FunctionTool, HookedToolRuntime, NoopToolHooks, Tool, ToolError, ToolErrorKind,
    ToolExecutionContext, ToolExecutionResult, ToolRegistry, ToolRuntime, ToolRuntimeHooks,
    ToolServiceConfig, ToolUsageLog, ToolUsageRecord,
};

pub use providers::{build_provider, build_provider_chain, parse_provider_id};
pub use runtime::{
    AssistantBundle, AssistantConfig, build_assistant, default_tool_registry, run_turn,
    stream_turn,
};
pub use util::{assistant_message, system_message, turn, user_message};

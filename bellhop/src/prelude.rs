//! Common imports for most bellhop applications.

pub use crate::{
    AssistantBundle, AssistantConfig, assistant_message, build_assistant, build_provider,
    build_provider_chain, default_tool_registry, parse_provider_id, run_turn, stream_turn,
    system_message, turn, user_message,
};
pub use crate::{
    AnswerEvent, AnswerStream, BlockingStream, BoxFuture, ChatError, ChatErrorKind, ChatMode,
    ChatPhase, ChatPhaseHooks, ChatReply, ChatService, ChatServiceBuilder, ChatTurnRequest,
    ConversationMemory, CredentialStore, FallbackChain, HttpRetriever, Message, MetadataMap,
    ModelProvider, ModelRequest, ProviderError, ProviderId, ReasoningAgent, Retriever, Role,
    SessionId, SessionKey, SharedRuntime, StoreConfig, Tool, ToolDefinition, ToolLoopAgent,
    ToolRegistry, ToolRuntime, ToolServiceConfig, ToolUsageLog, ToolUsageRecord, TraceId,
};
pub use crate::{MetricsObservabilityHooks, TracingObservabilityHooks};

//! Vendor-agnostic LLM access: one-shot completion, streamed completion, and
//! text embedding behind a ranked fallback chain.

pub mod adapters;
mod credentials;
mod error;
mod fallback;
mod model;
mod provider;
mod resilience;
mod stream;

pub mod prelude {
    pub use crate::{
        BoxedEventStream, CredentialStore, EMBEDDING_DIMENSIONS, FallbackChain, Message,
        ModelEventStream, ModelProvider, ModelRequest, ModelRequestBuilder, ModelResponse,
        NoopOperationHooks, OutputItem, PLACEHOLDER_PREFIX, ProviderError, ProviderErrorKind,
        ProviderFuture, ProviderId, ProviderOperationHooks, RetryPolicy, Role, SecretString,
        StopReason, StreamEvent, TokenUsage, ToolCall, ToolDefinition, ToolResult,
        VecEventStream, estimate_tokens, is_zero_embedding, zero_embedding,
    };
    pub use crate::adapters::gemini::GeminiProvider;
    pub use crate::adapters::ollama::OllamaProvider;
    pub use crate::adapters::openai::OpenAiProvider;
}

pub use credentials::{CredentialStore, SecretString};
pub use error::{ProviderError, ProviderErrorKind};
pub use fallback::{FallbackChain, PLACEHOLDER_PREFIX};
pub use model::{
    Message, ModelRequest, ModelRequestBuilder, ModelResponse, OutputItem, ProviderId, Role,
    StopReason, TokenUsage, ToolCall, ToolDefinition, ToolResult, estimate_tokens,
};
pub use provider::{
    EMBEDDING_DIMENSIONS, ModelProvider, ProviderFuture, is_zero_embedding, zero_embedding,
};
pub use resilience::{
    NoopOperationHooks, ProviderOperationHooks, RetryPolicy, execute_with_retry,
};
pub use stream::{BoxedEventStream, ModelEventStream, StreamEvent, VecEventStream};

//! Conversational orchestration: grounded, tool-augmented answers over model
//! providers, with persistent multi-turn memory and a streaming form.

mod agent;
mod error;
mod hooks;
mod retrieval;
mod service;
mod types;

pub mod prelude {
    pub use crate::{
        AgentInvocation, AnswerEvent, AnswerStream, ChatError, ChatErrorKind, ChatMode,
        ChatPhase, ChatPhaseHooks, ChatReply, ChatService, ChatServiceBuilder, ChatTurnRequest,
        DEFAULT_MAX_CONCURRENT_REQUESTS, DEFAULT_MAX_ITERATIONS, DEFAULT_SEARCH_LIMIT,
        HttpRetriever, NoopChatHooks, ReasoningAgent, Retriever, SYNTHESIS_APOLOGY, ScoredChunk,
        SearchDocumentsTool, ToolLoopAgent, format_chunks,
    };
    pub use bmemory::{ConversationMemory, SessionKey};
}

pub use agent::{AgentInvocation, DEFAULT_MAX_ITERATIONS, ReasoningAgent, ToolLoopAgent};
pub use error::{ChatError, ChatErrorKind};
pub use hooks::{ChatPhase, ChatPhaseHooks, NoopChatHooks};
pub use retrieval::{
    DEFAULT_SEARCH_LIMIT, HttpRetriever, Retriever, ScoredChunk, SearchDocumentsTool,
    format_chunks,
};
pub use service::{
    ChatService, ChatServiceBuilder, DEFAULT_MAX_CONCURRENT_REQUESTS, SYNTHESIS_APOLOGY,
};
pub use types::{AnswerEvent, AnswerStream, ChatMode, ChatReply, ChatTurnRequest};

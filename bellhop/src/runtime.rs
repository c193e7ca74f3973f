//! Runtime wiring helpers for assembling the assistant.

use std::sync::Arc;

use bchat::{
    ChatPhaseHooks, ChatReply, ChatService, ChatTurnRequest, HttpRetriever, Retriever,
    SearchDocumentsTool, ToolLoopAgent,
};
use bmemory::{ConversationMemory, StoreConfig};
use bobserve::TracingObservabilityHooks;
use bruntime::{BlockingStream, SharedRuntime};
use btooling::{
    CompanyInfoTool, CurrentDatetimeTool, DepartmentDirectoryTool, HookedToolRuntime,
    ToolRegistry, ToolServiceConfig,
};
use reqwest::Client;

use crate::{ChatError, CredentialStore, ModelProvider, ProviderError};

/// Everything one front end needs to serve chat traffic.
pub struct AssistantBundle {
    pub service: Arc<ChatService>,
    pub memory: Arc<ConversationMemory>,
    pub provider: Arc<dyn ModelProvider>,
}

#[derive(Debug, Clone)]
pub struct AssistantConfig {
    pub model: String,
    pub system_prompt: Option<String>,
    pub store: Option<StoreConfig>,
    pub history_limit: Option<usize>,
    pub tool_service: ToolServiceConfig,
    pub search_enabled: bool,
}

impl Default for AssistantConfig {
    fn default() -> Self {
        Self {
            model: "gpt-4o-mini".to_string(),
            system_prompt: None,
            store: Some(StoreConfig::default()),
            history_limit: None,
            tool_service: ToolServiceConfig::default(),
            search_enabled: true,
        }
    }
}

impl AssistantConfig {
    pub fn from_env() -> Self {
        let model = std::env::var("BELLHOP_MODEL")
            .ok()
            .filter(|value| !value.trim().is_empty())
            .unwrap_or_else(|| "gpt-4o-mini".to_string());

        Self {
            model,
            store: Some(StoreConfig::from_env()),
            tool_service: ToolServiceConfig::from_env(),
            ..Self::default()
        }
    }
}

/// Registry with the standard tool set: HTTP collaborators plus document
/// search over the retrieval service.
pub fn default_tool_registry(
    client: Client,
    tool_service: ToolServiceConfig,
    provider: Option<Arc<dyn ModelProvider>>,
    retriever: Option<Arc<dyn Retriever>>,
) -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    registry.register(DepartmentDirectoryTool::new(
        client.clone(),
        tool_service.clone(),
    ));
    registry.register(CurrentDatetimeTool::new(client.clone(), tool_service.clone()));
    registry.register(CompanyInfoTool::new(client, tool_service));

    if let (Some(provider), Some(retriever)) = (provider, retriever) {
        registry.register(SearchDocumentsTool::new(provider, retriever));
    }

    registry
}

/// Builds the full assistant on the shared runtime: pooled client, ranked
/// provider chain, tool registry, retrieval client, persistent memory, and
/// the orchestrator, all observed through the tracing hooks.
pub async fn build_assistant(config: AssistantConfig) -> Result<AssistantBundle, ChatError> {
    let runtime = SharedRuntime::global();
    let client = runtime
        .http_client()
        .map_err(|error| ChatError::runtime(error.to_string()))?;

    let credentials = Arc::new(CredentialStore::new());
    for provider_id in [crate::ProviderId::OpenAi, crate::ProviderId::Gemini] {
        credentials
            .load_from_env(provider_id)
            .map_err(|error: ProviderError| ChatError::provider(error.to_string()))?;
    }

    let hooks = Arc::new(TracingObservabilityHooks);
    let chain = crate::build_provider_chain(Arc::clone(&credentials), client.clone())
        .map_err(|error| ChatError::provider(error.to_string()))?
        .with_hooks(hooks.clone());
    let provider: Arc<dyn ModelProvider> = Arc::new(chain);

    let retriever: Option<Arc<dyn Retriever>> = if config.search_enabled {
        Some(Arc::new(HttpRetriever::from_env(client.clone())))
    } else {
        None
    };

    // Store trouble at startup degrades to the in-process mirror; answers
    // beat history.
    let memory = match &config.store {
        Some(store_config) => match ConversationMemory::connect(store_config).await {
            Ok(memory) => memory,
            Err(_) => ConversationMemory::detached(),
        },
        None => ConversationMemory::detached(),
    };
    let memory = Arc::new(match config.history_limit {
        Some(limit) => memory.with_history_limit(limit),
        None => memory,
    });

    let registry = Arc::new(default_tool_registry(
        client,
        config.tool_service.clone(),
        Some(Arc::clone(&provider)),
        retriever.clone(),
    ));
    let definitions = registry.definitions();
    let tool_runtime = Arc::new(HookedToolRuntime::new(registry, hooks.clone()));

    let agent = Arc::new(ToolLoopAgent::new(
        Arc::clone(&provider),
        tool_runtime,
        config.model.clone(),
    ));

    let mut builder = ChatService::builder(
        Arc::clone(&provider),
        agent,
        Arc::clone(&memory),
    )
    .model(config.model)
    .tools(definitions)
    .hooks(hooks as Arc<dyn ChatPhaseHooks>);

    if let Some(system_prompt) = config.system_prompt {
        builder = builder.system_prompt(system_prompt);
    }

    if let Some(retriever) = retriever {
        builder = builder.retriever(retriever);
    }

    Ok(AssistantBundle {
        service: Arc::new(builder.build()),
        memory,
        provider,
    })
}

/// Drives one blocking turn from a synchronous call site (CLI, tests) on the
/// shared runtime.
pub fn run_turn(
    service: &ChatService,
    request: ChatTurnRequest,
) -> Result<ChatReply, ChatError> {
    SharedRuntime::global()
        .run(service.chat(request))
        .map_err(|error| ChatError::runtime(error.to_string()))?
}

/// Streams one turn to a synchronous consumer: each iterator step drives the
/// shared loop through exactly one answer event.
pub fn stream_turn<'a>(
    service: &'a ChatService,
    request: ChatTurnRequest,
) -> Result<BlockingStream<bchat::AnswerStream<'a>>, ChatError> {
    let runtime = SharedRuntime::global();
    let stream = runtime
        .run(service.chat_stream(request))
        .map_err(|error| ChatError::runtime(error.to_string()))??;

    BlockingStream::new(runtime, stream)
        .map_err(|error| ChatError::runtime(error.to_string()))
}

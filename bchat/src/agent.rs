//! Reasoning-agent collaborator: tool-augmented analysis of one question.

use std::sync::Arc;

use bcommon::BoxFuture;
use bprovider::{
    Message, ModelProvider, ModelRequest, Role, StopReason, ToolDefinition, ToolResult,
};
use btooling::{ToolExecutionContext, ToolRuntime};

use crate::{ChatError, ChatMode};

pub const DEFAULT_MAX_ITERATIONS: usize = 5;

const THINK_FRAMING: &str = "You are an internal company assistant. Read the chat history \
first to establish context, then reason step by step about the employee's request. Use the \
available tools whenever internal information is needed, observe their results, and only \
then produce your analysis. If the request is outside internal company matters, say so \
politely.";

const NORMAL_FRAMING: &str = "You are an internal company assistant. Use the available \
tools when internal information is needed and answer the employee's request directly and \
helpfully. If the request is outside internal company matters, say so politely.";

/// One reasoning invocation: the question, prior turns, and the tools the
/// agent may call.
#[derive(Clone)]
pub struct AgentInvocation {
    pub input: String,
    pub chat_history: Vec<Message>,
    pub tools: Vec<ToolDefinition>,
    pub mode: ChatMode,
    pub context: ToolExecutionContext,
}

pub trait ReasoningAgent: Send + Sync {
    /// Produces free-text analysis. The output is untrusted and is always
    /// re-synthesized against the original question before users see it.
    fn invoke<'a>(
        &'a self,
        invocation: AgentInvocation,
    ) -> BoxFuture<'a, Result<String, ChatError>>;
}

/// Default reasoning agent: drives the provider with tool definitions and
/// executes requested tool calls until the model stops asking for tools or
/// the iteration bound is hit. The bound guarantees termination.
pub struct ToolLoopAgent {
    provider: Arc<dyn ModelProvider>,
    tool_runtime: Arc<dyn ToolRuntime>,
    model: String,
    max_iterations: usize,
}

impl ToolLoopAgent {
    pub fn new(
        provider: Arc<dyn ModelProvider>,
        tool_runtime: Arc<dyn ToolRuntime>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            provider,
            tool_runtime,
            model: model.into(),
            max_iterations: DEFAULT_MAX_ITERATIONS,
        }
    }

    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations.max(1);
        self
    }

    fn framing(mode: ChatMode) -> &'static str {
        match mode {
            ChatMode::Think => THINK_FRAMING,
            ChatMode::Normal => NORMAL_FRAMING,
        }
    }
}

impl ReasoningAgent for ToolLoopAgent {
    fn invoke<'a>(
        &'a self,
        invocation: AgentInvocation,
    ) -> BoxFuture<'a, Result<String, ChatError>> {
        Box::pin(async move {
            let AgentInvocation {
                input,
                chat_history,
                tools,
                mode,
                context,
            } = invocation;

            let mut messages = vec![Message::new(Role::System, Self::framing(mode))];
            messages.extend(chat_history);
            messages.push(Message::new(Role::User, input));

            let mut tool_results: Vec<ToolResult> = Vec::new();
            let mut last_text = String::new();

            for _ in 0..self.max_iterations {
                let request = ModelRequest::new(self.model.clone(), messages.clone())
                    .with_tools(tools.clone())
                    .with_tool_results(tool_results.clone());

                let response = self.provider.complete(request).await?;
                let stop_reason = response.stop_reason;
                let (text, tool_calls) = response.collect_output();

                if !text.is_empty() {
                    last_text = text;
                }

                if tool_calls.is_empty() && stop_reason != StopReason::ToolUse {
                    return Ok(last_text);
                }

                for tool_call in tool_calls {
                    let call_id = tool_call.id.clone();
                    let outcome = self
                        .tool_runtime
                        .execute(tool_call.clone(), context.clone())
                        .await;

                    // A broken tool becomes an observation, not an abort.
                    let output = match outcome {
                        Ok(result) => result.output,
                        Err(error) => format!(
                            "Tool '{}' failed: {}",
                            tool_call.name, error.message
                        ),
                    };

                    tool_results.push(ToolResult {
                        tool_call_id: call_id,
                        output,
                    });
                }
            }

            if last_text.is_empty() {
                Ok(format!(
                    "The analysis stopped after {} tool iterations without a final \
                     statement.",
                    self.max_iterations
                ))
            } else {
                Ok(last_text)
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use bprovider::{
        BoxedEventStream, ModelResponse, OutputItem, ProviderError, ProviderFuture, ProviderId,
        TokenUsage, ToolCall, VecEventStream,
    };
    use btooling::{DefaultToolRuntime, FunctionTool, ToolRegistry};

    use super::*;

    /// Emits a scripted sequence of responses, one per completion call.
    struct ScriptedProvider {
        responses: Mutex<Vec<ModelResponse>>,
    }

    impl ScriptedProvider {
        fn new(mut responses: Vec<ModelResponse>) -> Self {
            responses.reverse();
            Self {
                responses: Mutex::new(responses),
            }
        }

        fn text_response(text: &str) -> ModelResponse {
            ModelResponse {
                provider: ProviderId::OpenAi,
                model: "gpt-4o-mini".to_string(),
                output: vec![OutputItem::Message(Message::new(Role::Assistant, text))],
                stop_reason: StopReason::EndTurn,
                usage: TokenUsage::default(),
            }
        }

        fn tool_call_response(name: &str) -> ModelResponse {
            ModelResponse {
                provider: ProviderId::OpenAi,
                model: "gpt-4o-mini".to_string(),
                output: vec![OutputItem::ToolCall(ToolCall {
                    id: format!("call_{name}"),
                    name: name.to_string(),
                    arguments: "{}".to_string(),
                })],
                stop_reason: StopReason::ToolUse,
                usage: TokenUsage::default(),
            }
        }
    }

    impl ModelProvider for ScriptedProvider {
        fn id(&self) -> ProviderId {
            ProviderId::OpenAi
        }

        fn complete<'a>(
            &'a self,
            _request: ModelRequest,
        ) -> ProviderFuture<'a, Result<ModelResponse, ProviderError>> {
            Box::pin(async move {
                self.responses
                    .lock()
                    .expect("responses lock")
                    .pop()
                    .ok_or_else(|| ProviderError::other("script exhausted"))
            })
        }

        fn stream<'a>(
            &'a self,
            _request: ModelRequest,
        ) -> ProviderFuture<'a, Result<BoxedEventStream<'a>, ProviderError>> {
            Box::pin(async move {
                Ok(Box::pin(VecEventStream::new(Vec::new())) as BoxedEventStream<'a>)
            })
        }

        fn embed<'a>(
            &'a self,
            _text: String,
        ) -> ProviderFuture<'a, Result<Vec<f32>, ProviderError>> {
            Box::pin(async move { Ok(bprovider::zero_embedding()) })
        }
    }

    fn echo_registry() -> ToolRegistry {
        let mut registry = ToolRegistry::new();
        registry.register(FunctionTool::new(
            ToolDefinition {
                name: "get_current_datetime".to_string(),
                description: "time".to_string(),
                input_schema: "{}".to_string(),
            },
            |_args, _ctx| async move { Ok("Friday, 2026-08-07".to_string()) },
        ));
        registry
    }

    fn invocation(tools: Vec<ToolDefinition>) -> AgentInvocation {
        AgentInvocation {
            input: "What day is it today?".to_string(),
            chat_history: Vec::new(),
            tools,
            mode: ChatMode::Think,
            context: ToolExecutionContext::new("session-agent"),
        }
    }

    #[tokio::test]
    async fn agent_runs_tool_loop_then_returns_analysis() {
        let provider = Arc::new(ScriptedProvider::new(vec![
            ScriptedProvider::tool_call_response("get_current_datetime"),
            ScriptedProvider::text_response("Today is Friday."),
        ]));
        let registry = Arc::new(echo_registry());
        let definitions = registry.definitions();
        let runtime = Arc::new(DefaultToolRuntime::new(registry));

        let agent = ToolLoopAgent::new(provider, runtime, "gpt-4o-mini");
        let output = agent
            .invoke(invocation(definitions))
            .await
            .expect("agent should finish");
        assert_eq!(output, "Today is Friday.");
    }

    #[tokio::test]
    async fn agent_substitutes_error_strings_for_missing_tools() {
        let provider = Arc::new(ScriptedProvider::new(vec![
            ScriptedProvider::tool_call_response("unknown_tool"),
            ScriptedProvider::text_response("Answered without that tool."),
        ]));
        let runtime = Arc::new(DefaultToolRuntime::new(Arc::new(ToolRegistry::new())));

        let agent = ToolLoopAgent::new(provider, runtime, "gpt-4o-mini");
        let output = agent
            .invoke(invocation(Vec::new()))
            .await
            .expect("agent should finish despite the broken tool");
        assert_eq!(output, "Answered without that tool.");
    }

    #[tokio::test]
    async fn iteration_bound_guarantees_termination() {
        // Every response demands another tool call; the bound must cut in.
        let responses = (0..10)
            .map(|_| ScriptedProvider::tool_call_response("get_current_datetime"))
            .collect();
        let provider = Arc::new(ScriptedProvider::new(responses));
        let registry = Arc::new(echo_registry());
        let definitions = registry.definitions();
        let runtime = Arc::new(DefaultToolRuntime::new(registry));

        let agent =
            ToolLoopAgent::new(provider, runtime, "gpt-4o-mini").with_max_iterations(3);
        let output = agent
            .invoke(invocation(definitions))
            .await
            .expect("agent should terminate");
        assert!(output.contains("3 tool iterations"));
    }
}

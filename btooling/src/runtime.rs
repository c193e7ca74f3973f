//! Tool runtime trait and default registry-backed executor.

use std::sync::Arc;
use std::time::Instant;

use bprovider::ToolCall;

use crate::{
    NoopToolHooks, ToolError, ToolExecutionContext, ToolExecutionResult, ToolFuture,
    ToolRegistry, ToolRuntimeHooks, ToolUsageRecord,
};

pub trait ToolRuntime: Send + Sync {
    fn execute<'a>(
        &'a self,
        tool_call: ToolCall,
        context: ToolExecutionContext,
    ) -> ToolFuture<'a, Result<ToolExecutionResult, ToolError>>;
}

#[derive(Clone, Default)]
pub struct DefaultToolRuntime {
    registry: Arc<ToolRegistry>,
    hooks: Arc<NoopToolHooks>,
}

/// Registry-backed executor that times every invocation, reports it to the
/// hooks, and records it in the request's usage log when one is present.
#[derive(Clone)]
pub struct HookedToolRuntime {
    registry: Arc<ToolRegistry>,
    hooks: Arc<dyn ToolRuntimeHooks>,
}

impl DefaultToolRuntime {
    pub fn new(registry: Arc<ToolRegistry>) -> Self {
        Self {
            registry,
            hooks: Arc::new(NoopToolHooks),
        }
    }

    pub fn registry(&self) -> Arc<ToolRegistry> {
        Arc::clone(&self.registry)
    }
}

impl HookedToolRuntime {
    pub fn new(registry: Arc<ToolRegistry>, hooks: Arc<dyn ToolRuntimeHooks>) -> Self {
        Self { registry, hooks }
    }

    pub fn registry(&self) -> Arc<ToolRegistry> {
        Arc::clone(&self.registry)
    }
}

async fn run_tool(
    registry: &ToolRegistry,
    hooks: &dyn ToolRuntimeHooks,
    tool_call: ToolCall,
    context: ToolExecutionContext,
) -> Result<ToolExecutionResult, ToolError> {
    let tool = registry.get(&tool_call.name).ok_or_else(|| {
        ToolError::not_found(format!("tool '{}' is not registered", tool_call.name))
    })?;

    hooks.on_execution_start(&tool_call, &context);
    let started = Instant::now();
    let outcome = tool.invoke(&tool_call.arguments, &context).await;
    let elapsed = started.elapsed();

    if let Some(usage) = &context.usage {
        usage.record(ToolUsageRecord::new(
            tool_call.name.clone(),
            tool_call.arguments.clone(),
            elapsed,
        ));
    }

    match outcome {
        Ok(output) => {
            let result = ToolExecutionResult::from_call(&tool_call, output);
            hooks.on_execution_success(&tool_call, &context, &result, elapsed);
            Ok(result)
        }
        Err(error) => {
            hooks.on_execution_failure(&tool_call, &context, &error, elapsed);
            Err(error)
        }
    }
}

impl ToolRuntime for DefaultToolRuntime {
    fn execute<'a>(
        &'a self,
        tool_call: ToolCall,
        context: ToolExecutionContext,
    ) -> ToolFuture<'a, Result<ToolExecutionResult, ToolError>> {
        Box::pin(run_tool(
            &self.registry,
            self.hooks.as_ref(),
            tool_call,
            context,
        ))
    }
}

impl ToolRuntime for HookedToolRuntime {
    fn execute<'a>(
        &'a self,
        tool_call: ToolCall,
        context: ToolExecutionContext,
    ) -> ToolFuture<'a, Result<ToolExecutionResult, ToolError>> {
        Box::pin(run_tool(
            &self.registry,
            self.hooks.as_ref(),
            tool_call,
            context,
        ))
    }
}

//! Tracing-based observability hooks for provider, tool, and chat phases.
//!
//! ```rust
//! use bobserve::TracingObservabilityHooks;
//! use bchat::ChatPhaseHooks;
//!
//! fn accepts_chat_hooks(_hooks: &dyn ChatPhaseHooks) {}
//!
//! let hooks = TracingObservabilityHooks;
//! accepts_chat_hooks(&hooks);
//! ```

use std::time::Duration;

use bchat::{ChatPhase, ChatPhaseHooks};
use bprovider::{ProviderError, ProviderId, ProviderOperationHooks, ToolCall};
use btooling::{ToolError, ToolExecutionContext, ToolExecutionResult, ToolRuntimeHooks};

#[derive(Debug, Clone, Copy, Default)]
pub struct TracingObservabilityHooks;

impl ProviderOperationHooks for TracingObservabilityHooks {
    fn on_attempt_start(&self, provider: ProviderId, operation: &str, attempt: u32) {
        tracing::info!(
            phase = "provider",
            event = "attempt_start",
            provider = %provider,
            operation,
            attempt
        );
    }

    fn on_retry_scheduled(
        &self,
        provider: ProviderId,
        operation: &str,
        attempt: u32,
        delay: Duration,
        error: &ProviderError,
    ) {
        tracing::warn!(
            phase = "provider",
            event = "retry_scheduled",
            provider = %provider,
            operation,
            attempt,
            delay_ms = delay.as_millis() as u64,
            error_kind = ?error.kind,
            retryable = error.retryable,
            error = %error
        );
    }

    fn on_success(&self, provider: ProviderId, operation: &str, attempts: u32) {
        tracing::info!(
            phase = "provider",
            event = "success",
            provider = %provider,
            operation,
            attempts
        );
    }

    fn on_failure(
        &self,
        provider: ProviderId,
        operation: &str,
        attempts: u32,
        error: &ProviderError,
    ) {
        tracing::error!(
            phase = "provider",
            event = "failure",
            provider = %provider,
            operation,
            attempts,
            error_kind = ?error.kind,
            retryable = error.retryable,
            error = %error
        );
    }

    fn on_fallback(&self, from: ProviderId, to: ProviderId, operation: &str) {
        tracing::warn!(
            phase = "provider",
            event = "fallback",
            from = %from,
            to = %to,
            operation
        );
    }
}

impl ToolRuntimeHooks for TracingObservabilityHooks {
    fn on_execution_start(&self, tool_call: &ToolCall, context: &ToolExecutionContext) {
        tracing::info!(
            phase = "tool",
            event = "execution_start",
            tool_name = tool_call.name,
            tool_call_id = tool_call.id,
            session_id = %context.session_id,
            trace_id = context.trace_id.as_ref().map(|id| id.as_str())
        );
    }

    fn on_execution_success(
        &self,
        tool_call: &ToolCall,
        context: &ToolExecutionContext,
        _result: &ToolExecutionResult,
        elapsed: Duration,
    ) {
        tracing::info!(
            phase = "tool",
            event = "execution_success",
            tool_name = tool_call.name,
            tool_call_id = tool_call.id,
            session_id = %context.session_id,
            elapsed_ms = elapsed.as_millis() as u64
        );
    }

    fn on_execution_failure(
        &self,
        tool_call: &ToolCall,
        context: &ToolExecutionContext,
        error: &ToolError,
        elapsed: Duration,
    ) {
        tracing::error!(
            phase = "tool",
            event = "execution_failure",
            tool_name = tool_call.name,
            tool_call_id = tool_call.id,
            session_id = %context.session_id,
            error_kind = ?error.kind,
            error = %error,
            elapsed_ms = elapsed.as_millis() as u64
        );
    }
}

impl ChatPhaseHooks for TracingObservabilityHooks {
    fn on_phase_start(&self, phase: ChatPhase) {
        tracing::info!(phase = "chat", event = "phase_start", step = phase.as_str());
    }

    fn on_degraded(&self, phase: ChatPhase, detail: &str) {
        tracing::warn!(
            phase = "chat",
            event = "degraded",
            step = phase.as_str(),
            detail
        );
    }

    fn on_turn_complete(&self, elapsed: Duration) {
        tracing::info!(
            phase = "chat",
            event = "turn_complete",
            elapsed_ms = elapsed.as_millis() as u64
        );
    }
}

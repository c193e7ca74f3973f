//! Tool execution context, results, and the request-scoped usage log.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use bcommon::{MetadataMap, SessionId, TraceId};
use bprovider::{ToolCall, ToolResult};
use serde::{Deserialize, Serialize};

/// One recorded tool invocation: which tool, with what input, how long.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolUsageRecord {
    pub tool_name: String,
    pub input: String,
    pub latency_seconds: f64,
}

impl ToolUsageRecord {
    pub fn new(
        tool_name: impl Into<String>,
        input: impl Into<String>,
        latency: Duration,
    ) -> Self {
        Self {
            tool_name: tool_name.into(),
            input: input.into(),
            latency_seconds: latency.as_secs_f64(),
        }
    }
}

/// Accumulates tool invocations for exactly one request.
///
/// The log is created per request and carried through the execution context,
/// so concurrent requests never share a buffer. `drain` is read-and-clear
/// and is expected to run once, when the request's reply is assembled.
#[derive(Debug, Default)]
pub struct ToolUsageLog {
    records: Mutex<Vec<ToolUsageRecord>>,
}

impl ToolUsageLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, record: ToolUsageRecord) {
        if let Ok(mut records) = self.records.lock() {
            records.push(record);
        }
    }

    /// Reads and clears the accumulated records.
    pub fn drain(&self) -> Vec<ToolUsageRecord> {
        self.records
            .lock()
            .map(|mut records| std::mem::take(&mut *records))
            .unwrap_or_default()
    }

    pub fn clear(&self) {
        if let Ok(mut records) = self.records.lock() {
            records.clear();
        }
    }

    pub fn snapshot(&self) -> Vec<ToolUsageRecord> {
        self.records
            .lock()
            .map(|records| records.clone())
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.records.lock().map(|records| records.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, Clone)]
pub struct ToolExecutionContext {
    pub session_id: SessionId,
    pub trace_id: Option<TraceId>,
    pub metadata: MetadataMap,
    pub usage: Option<Arc<ToolUsageLog>>,
}

impl ToolExecutionContext {
    pub fn new(session_id: impl Into<SessionId>) -> Self {
        Self {
            session_id: session_id.into(),
            trace_id: None,
            metadata: MetadataMap::new(),
            usage: None,
        }
    }

    pub fn with_trace_id(mut self, trace_id: impl Into<TraceId>) -> Self {
        self.trace_id = Some(trace_id.into());
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    pub fn with_usage_log(mut self, usage: Arc<ToolUsageLog>) -> Self {
        self.usage = Some(usage);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolExecutionResult {
    pub tool_call_id: String,
    pub output: String,
}

impl ToolExecutionResult {
    pub fn new(tool_call_id: impl Into<String>, output: impl Into<String>) -> Self {
        Self {
            tool_call_id: tool_call_id.into(),
            output: output.into(),
        }
    }

    pub fn from_call(call: &ToolCall, output: impl Into<String>) -> Self {
        Self::new(call.id.clone(), output)
    }

    pub fn into_tool_result(self) -> ToolResult {
        ToolResult {
            tool_call_id: self.tool_call_id,
            output: self.output,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drain_reads_in_order_and_clears() {
        let log = ToolUsageLog::new();
        log.clear();
        log.record(ToolUsageRecord::new(
            "search_documents",
            "{\"query\":\"leave policy\"}",
            Duration::from_millis(120),
        ));
        log.record(ToolUsageRecord::new(
            "get_current_datetime",
            "{}",
            Duration::from_millis(15),
        ));

        let drained = log.drain();
        assert_eq!(drained.len(), 2);
        assert_eq!(drained[0].tool_name, "search_documents");
        assert_eq!(drained[1].tool_name, "get_current_datetime");

        assert!(log.drain().is_empty());
    }

    #[test]
    fn independent_logs_do_not_observe_each_other() {
        let first = Arc::new(ToolUsageLog::new());
        let second = Arc::new(ToolUsageLog::new());

        let first_ctx =
            ToolExecutionContext::new("session-a").with_usage_log(Arc::clone(&first));
        let second_ctx =
            ToolExecutionContext::new("session-b").with_usage_log(Arc::clone(&second));

        if let Some(log) = first_ctx.usage.as_ref() {
            log.record(ToolUsageRecord::new(
                "list_departments",
                "{}",
                Duration::from_millis(10),
            ));
        }

        assert_eq!(first.len(), 1);
        assert!(second.is_empty());
        assert_eq!(second_ctx.session_id.as_str(), "session-b");
    }

    #[test]
    fn usage_record_serializes_for_the_wire() {
        let record = ToolUsageRecord::new("company_info", "{}", Duration::from_millis(250));
        let json = serde_json::to_value(&record).expect("record should serialize");
        assert_eq!(json["tool_name"], "company_info");
        assert_eq!(json["latency_seconds"], 0.25);
    }
}

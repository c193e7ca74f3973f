//! Tool contracts, registry, runtime, and per-request usage tracking.

mod error;
mod hooks;
mod http_tools;
mod registry;
mod runtime;
mod tool;
mod types;

pub mod prelude {
    pub use crate::{
        CompanyInfoTool, CurrentDatetimeTool, DefaultToolRuntime, DepartmentDirectoryTool,
        FunctionTool, HookedToolRuntime, NoopToolHooks, Tool, ToolError, ToolErrorKind,
        ToolExecutionContext, ToolExecutionResult, ToolFuture, ToolRegistry, ToolRuntime,
        ToolRuntimeHooks, ToolServiceConfig, ToolUsageLog, ToolUsageRecord,
    };
}

pub use error::{ToolError, ToolErrorKind};
pub use hooks::{NoopToolHooks, ToolRuntimeHooks};
pub use http_tools::{
    CompanyInfoTool, CurrentDatetimeTool, DepartmentDirectoryTool, ToolServiceConfig,
};
pub use registry::ToolRegistry;
pub use runtime::{DefaultToolRuntime, HookedToolRuntime, ToolRuntime};
pub use tool::{FunctionTool, Tool, ToolFuture};
pub use types::{ToolExecutionContext, ToolExecutionResult, ToolUsageLog, ToolUsageRecord};

//! HTTP-backed tools calling the internal tools service.
//!
//! Each tool is one request/response call. Every tool is fallible and the
//! reasoning loop substitutes an error string for a failed call; a broken
//! tool never aborts the surrounding request.

use reqwest::Client;
use serde::Deserialize;

use bprovider::ToolDefinition;

use crate::{Tool, ToolError, ToolExecutionContext, ToolFuture};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolServiceConfig {
    pub base_url: String,
}

impl Default for ToolServiceConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8001".to_string(),
        }
    }
}

impl ToolServiceConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
        }
    }

    pub fn from_env() -> Self {
        match std::env::var("BELLHOP_TOOLS_URL") {
            Ok(url) if !url.trim().is_empty() => Self::new(url),
            _ => Self::default(),
        }
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base_url.trim_end_matches('/'), path)
    }
}

#[derive(Debug, Deserialize)]
struct DirectoryPayload {
    departments: Vec<String>,
}

fn format_directory(departments: &[String]) -> String {
    let mut output = String::from("Company departments:\n");
    for (index, department) in departments.iter().enumerate() {
        output.push_str(&format!("{}. {}\n", index + 1, department));
    }
    output
}

/// Accepts either `{"query": "..."}` or a bare string argument.
fn lookup_query(args_json: &str) -> Result<String, ToolError> {
    let trimmed = args_json.trim();
    if trimmed.is_empty() {
        return Err(ToolError::invalid_arguments("a query argument is required"));
    }

    match serde_json::from_str::<serde_json::Value>(trimmed) {
        Ok(serde_json::Value::Object(map)) => map
            .get("query")
            .and_then(|value| value.as_str())
            .map(str::to_string)
            .filter(|query| !query.trim().is_empty())
            .ok_or_else(|| {
                ToolError::invalid_arguments("expected a non-empty 'query' field")
            }),
        Ok(serde_json::Value::String(query)) if !query.trim().is_empty() => Ok(query),
        Ok(_) => Err(ToolError::invalid_arguments(
            "expected an object with a 'query' field",
        )),
        Err(_) => Ok(trimmed.to_string()),
    }
}

fn transport_error(error: reqwest::Error) -> ToolError {
    ToolError::transport(error.to_string())
}

/// Lists the departments known to the internal directory service.
pub struct DepartmentDirectoryTool {
    client: Client,
    config: ToolServiceConfig,
}

impl DepartmentDirectoryTool {
    pub fn new(client: Client, config: ToolServiceConfig) -> Self {
        Self { client, config }
    }
}

impl Tool for DepartmentDirectoryTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: "list_departments".to_string(),
            description: "Lists the departments in the company directory.".to_string(),
            input_schema: r#"{"type":"object","properties":{}}"#.to_string(),
        }
    }

    fn invoke<'a>(
        &'a self,
        _args_json: &'a str,
        _context: &'a ToolExecutionContext,
    ) -> ToolFuture<'a, Result<String, ToolError>> {
        Box::pin(async move {
            let response = self
                .client
                .get(self.config.endpoint("tools/list_departments"))
                .send()
                .await
                .map_err(transport_error)?
                .error_for_status()
                .map_err(transport_error)?;

            let payload: DirectoryPayload = response.json().await.map_err(transport_error)?;
            Ok(format_directory(&payload.departments))
        })
    }
}

/// Reports the current date and time from the internal time service.
pub struct CurrentDatetimeTool {
    client: Client,
    config: ToolServiceConfig,
}

impl CurrentDatetimeTool {
    pub fn new(client: Client, config: ToolServiceConfig) -> Self {
        Self { client, config }
    }
}

impl Tool for CurrentDatetimeTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: "get_current_datetime".to_string(),
            description: "Returns the current date and time.".to_string(),
            input_schema: r#"{"type":"object","properties":{}}"#.to_string(),
        }
    }

    fn invoke<'a>(
        &'a self,
        _args_json: &'a str,
        _context: &'a ToolExecutionContext,
    ) -> ToolFuture<'a, Result<String, ToolError>> {
        Box::pin(async move {
            let response = self
                .client
                .get(self.config.endpoint("tools/get_current_datetime"))
                .send()
                .await
                .map_err(transport_error)?
                .error_for_status()
                .map_err(transport_error)?;

            response
                .json::<String>()
                .await
                .map_err(transport_error)
        })
    }
}

/// Looks up general company information by free-text query.
pub struct CompanyInfoTool {
    client: Client,
    config: ToolServiceConfig,
}

impl CompanyInfoTool {
    pub fn new(client: Client, config: ToolServiceConfig) -> Self {
        Self { client, config }
    }
}

impl Tool for CompanyInfoTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: "company_info".to_string(),
            description: "Looks up company information for a free-text query.".to_string(),
            input_schema:
                r#"{"type":"object","properties":{"query":{"type":"string"}},"required":["query"]}"#
                    .to_string(),
        }
    }

    fn invoke<'a>(
        &'a self,
        args_json: &'a str,
        _context: &'a ToolExecutionContext,
    ) -> ToolFuture<'a, Result<String, ToolError>> {
        Box::pin(async move {
            let query = lookup_query(args_json)?;
            let response = self
                .client
                .get(self.config.endpoint("tools/company_info"))
                .query(&[("query", query.as_str())])
                .send()
                .await
                .map_err(transport_error)?
                .error_for_status()
                .map_err(transport_error)?;

            response.text().await.map_err(transport_error)
        })
    }
}

//! Tool dispatch onto the memory service

use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};

use super::protocol::{codes, methods, InitializeResult, McpHandler, McpRequest, McpResponse, ToolCallResult};
use super::tools::get_tool_definitions;
use crate::error::{RecallError, Result};
use crate::service::MemoryService;
use crate::types::{
    BuildStoreInput, CreateMemoryInput, ListOptions, MemoryId, MemoryType, RelateMemoriesInput,
    SearchOptions, TagMemoryInput, UpdateMemoryInput,
};

#[derive(Deserialize)]
struct IdArgs {
    id: MemoryId,
}

#[derive(Deserialize)]
struct GetArgs {
    id: MemoryId,
    #[serde(rename = "type")]
    memory_type: MemoryType,
}

#[derive(Deserialize)]
struct SearchArgs {
    query: String,
    #[serde(flatten)]
    options: SearchOptions,
}

/// MCP request handler backed by a [`MemoryService`]
pub struct RecallHandler {
    service: MemoryService,
}

impl RecallHandler {
    pub fn new(service: MemoryService) -> Self {
        Self { service }
    }

    pub fn service(&self) -> &MemoryService {
        &self.service
    }

    /// Run one tool. Failures become error results, never protocol errors.
    pub fn handle_tool_call(&self, name: &str, arguments: Value) -> ToolCallResult {
        match self.dispatch(name, arguments) {
            Ok(result) => result,
            Err(e) => {
                if e.is_recoverable() {
                    tracing::debug!(tool = name, code = e.code(), "Tool call failed: {}", e);
                } else {
                    tracing::warn!(tool = name, code = e.code(), "Tool call failed: {}", e);
                }
                ToolCallResult::error(format!("Error: {}", e))
            }
        }
    }

    fn dispatch(&self, name: &str, arguments: Value) -> Result<ToolCallResult> {
        let result = match name {
            "build_memory_store" => {
                let input: BuildStoreInput = parse(arguments)?;
                let root = self.service.build_store(input)?;
                ToolCallResult::text(format!(
                    "Memory store successfully built in directory: {}",
                    root.display()
                ))
            }
            "create_memory" => {
                let memory = self.service.create(parse::<CreateMemoryInput>(arguments)?)?;
                ToolCallResult::text(format!("Memory created with ID: {}", memory.id))
            }
            "update_memory" => {
                let memory = self.service.update(parse::<UpdateMemoryInput>(arguments)?)?;
                ToolCallResult::text(format!("Memory {} updated successfully", memory.id))
            }
            "delete_memory" => {
                let IdArgs { id } = parse(arguments)?;
                if self.service.delete(&id)? {
                    ToolCallResult::text(format!("Memory {} deleted successfully", id))
                } else {
                    ToolCallResult::text(format!("Memory {} did not exist", id))
                }
            }
            "get_memory" => {
                let GetArgs { id, memory_type } = parse(arguments)?;
                ToolCallResult::json(&self.service.get(&id, memory_type)?)
            }
            "search_memories" => {
                let SearchArgs { query, options } = parse(arguments)?;
                ToolCallResult::json(&self.service.search(&query, &options))
            }
            "list_memories" => {
                let options: ListOptions = parse(arguments)?;
                ToolCallResult::json(&self.service.list(&options))
            }
            "add_tags" => {
                let memory = self.service.add_tags(parse::<TagMemoryInput>(arguments)?)?;
                ToolCallResult::text(format!("Tags added to memory {}", memory.id))
            }
            "remove_tags" => {
                let memory = self.service.remove_tags(parse::<TagMemoryInput>(arguments)?)?;
                ToolCallResult::text(format!("Tags removed from memory {}", memory.id))
            }
            "relate_memories" => {
                let memory = self.service.relate(parse::<RelateMemoriesInput>(arguments)?)?;
                ToolCallResult::text(format!("Relationships created for memory {}", memory.id))
            }
            "unrelate_memories" => {
                let memory = self.service.unrelate(parse::<RelateMemoriesInput>(arguments)?)?;
                ToolCallResult::text(format!("Relationships removed for memory {}", memory.id))
            }
            "rebuild_index" => {
                let report = self.service.rebuild_index()?;
                if report.warnings.is_empty() {
                    ToolCallResult::text(format!(
                        "Search index rebuilt successfully ({} memories)",
                        report.indexed
                    ))
                } else {
                    ToolCallResult::json(&report)
                }
            }
            "memory_stats" => ToolCallResult::json(&self.service.stats()?),
            _ => return Err(RecallError::InvalidInput(format!("Unknown tool: {}", name))),
        };
        Ok(result)
    }
}

/// Decode tool arguments, treating a missing object as empty
fn parse<T: DeserializeOwned>(arguments: Value) -> Result<T> {
    let arguments = if arguments.is_null() { json!({}) } else { arguments };
    serde_json::from_value(arguments).map_err(|e| RecallError::InvalidInput(e.to_string()))
}

impl McpHandler for RecallHandler {
    fn handle_request(&self, request: McpRequest) -> McpResponse {
        match request.method.as_str() {
            methods::INITIALIZE => {
                let result = InitializeResult::default();
                McpResponse::success(request.id, json!(result))
            }
            methods::INITIALIZED => McpResponse::success(request.id, json!({})),
            methods::LIST_TOOLS => {
                let tools = get_tool_definitions();
                McpResponse::success(request.id, json!({"tools": tools}))
            }
            methods::CALL_TOOL => {
                let Some(name) = request.params.get("name").and_then(|v| v.as_str()) else {
                    return McpResponse::error(request.id, codes::INVALID_PARAMS, "Missing tool name");
                };
                let arguments = request
                    .params
                    .get("arguments")
                    .cloned()
                    .unwrap_or(Value::Null);

                let result = self.handle_tool_call(name, arguments);
                McpResponse::success(request.id, json!(result))
            }
            _ => McpResponse::error(
                request.id,
                codes::METHOD_NOT_FOUND,
                format!("Method not found: {}", request.method),
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::StoreConfig;
    use tempfile::TempDir;

    fn handler() -> (TempDir, RecallHandler) {
        let dir = TempDir::new().unwrap();
        let service = MemoryService::open(StoreConfig::new(dir.path().join("store"))).unwrap();
        (dir, RecallHandler::new(service))
    }

    fn created_id(result: &ToolCallResult) -> String {
        result
            .text_content()
            .trim_start_matches("Memory created with ID: ")
            .to_string()
    }

    #[test]
    fn test_create_then_get() {
        let (_dir, handler) = handler();
        let created = handler.handle_tool_call(
            "create_memory",
            json!({"title": "Trip to Paris", "type": "concept", "tags": ["travel"], "content": "Eiffel"}),
        );
        assert!(!created.is_error());
        let id = created_id(&created);

        let fetched = handler.handle_tool_call("get_memory", json!({"id": id, "type": "concept"}));
        let memory: Value = serde_json::from_str(&fetched.text_content()).unwrap();
        assert_eq!(memory["title"], "Trip to Paris");
        assert_eq!(memory["type"], "concept");

        let missing = handler.handle_tool_call("get_memory", json!({"id": id, "type": "entity"}));
        assert!(missing.is_error());
    }

    #[test]
    fn test_bad_arguments_are_tool_errors() {
        let (_dir, handler) = handler();
        let result = handler.handle_tool_call("create_memory", json!({"title": "x"}));
        assert!(result.is_error());
        let result = handler.handle_tool_call("create_memory", json!({"title": "x", "type": "note", "content": ""}));
        assert!(result.is_error());
        let result = handler.handle_tool_call("nope", json!({}));
        assert!(result.text_content().contains("Unknown tool"));
    }

    #[test]
    fn test_search_and_list_return_json() {
        let (_dir, handler) = handler();
        handler.handle_tool_call(
            "create_memory",
            json!({"title": "Rust", "type": "concept", "tags": ["code"], "content": "Ownership rules"}),
        );

        let results = handler.handle_tool_call("search_memories", json!({"query": "ownership", "types": ["concept"]}));
        let results: Vec<Value> = serde_json::from_str(&results.text_content()).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0]["title"], "Rust");

        let listed = handler.handle_tool_call("list_memories", Value::Null);
        let listed: Vec<Value> = serde_json::from_str(&listed.text_content()).unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0]["score"], 1.0);
    }

    #[test]
    fn test_protocol_methods() {
        let (_dir, handler) = handler();
        let request = |method: &str, params: Value| McpRequest {
            jsonrpc: "2.0".to_string(),
            id: Some(json!(1)),
            method: method.to_string(),
            params,
        };

        let response = handler.handle_request(request("tools/list", Value::Null));
        assert_eq!(response.result.unwrap()["tools"].as_array().unwrap().len(), 13);

        let response = handler.handle_request(request("tools/call", json!({"name": "memory_stats"})));
        let result = response.result.unwrap();
        assert!(result.get("isError").is_none());

        let response = handler.handle_request(request("resources/list", Value::Null));
        assert_eq!(response.error.unwrap().code, codes::METHOD_NOT_FOUND);
    }
}

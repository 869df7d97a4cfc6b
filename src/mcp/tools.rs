//! MCP tool definitions for Recall

use serde_json::json;

use super::protocol::ToolDefinition;

/// All tool definitions for Recall
pub const TOOL_DEFINITIONS: &[(&str, &str, &str)] = &[
    // Store management
    (
        "build_memory_store",
        "Build a new memory store in the specified directory",
        r#"{
            "type": "object",
            "properties": {
                "directory": {"type": "string", "description": "Directory to create the store in (~ is expanded)"},
                "overwrite": {"type": "boolean", "default": false, "description": "Replace an existing store in this directory"}
            },
            "required": ["directory"]
        }"#,
    ),
    // Memory CRUD
    (
        "create_memory",
        "Create a new memory",
        r#"{
            "type": "object",
            "properties": {
                "title": {"type": "string", "description": "Short title of the memory"},
                "type": {"type": "string", "enum": ["entity", "concept", "session"]},
                "tags": {"type": "array", "items": {"type": "string"}},
                "related": {"type": "array", "items": {"type": "string"}, "description": "IDs of related memories"},
                "importance": {"type": "number", "minimum": 0, "maximum": 1, "default": 0.5},
                "content": {"type": "string", "description": "Body of the memory"}
            },
            "required": ["title", "type", "content"]
        }"#,
    ),
    (
        "update_memory",
        "Update an existing memory",
        r#"{
            "type": "object",
            "properties": {
                "id": {"type": "string", "description": "Memory ID"},
                "title": {"type": "string"},
                "tags": {"type": "array", "items": {"type": "string"}, "description": "Replaces the tag list"},
                "related": {"type": "array", "items": {"type": "string"}, "description": "Replaces the related list"},
                "importance": {"type": "number", "minimum": 0, "maximum": 1},
                "content": {"type": "string"}
            },
            "required": ["id"]
        }"#,
    ),
    (
        "delete_memory",
        "Delete a memory",
        r#"{
            "type": "object",
            "properties": {
                "id": {"type": "string", "description": "Memory ID"}
            },
            "required": ["id"]
        }"#,
    ),
    (
        "get_memory",
        "Get a memory by ID and type",
        r#"{
            "type": "object",
            "properties": {
                "id": {"type": "string", "description": "Memory ID"},
                "type": {"type": "string", "enum": ["entity", "concept", "session"]}
            },
            "required": ["id", "type"]
        }"#,
    ),
    // Retrieval
    (
        "search_memories",
        "Search memories by query, type, and tags. Terms may be prefixed with + (required) or - (excluded) and scoped with title:, tags:, content: or type:",
        r#"{
            "type": "object",
            "properties": {
                "query": {"type": "string", "description": "Free-text query"},
                "types": {"type": "array", "items": {"type": "string", "enum": ["entity", "concept", "session"]}, "description": "Match any of these types"},
                "tags": {"type": "array", "items": {"type": "string"}, "description": "Every tag must be present"},
                "limit": {"type": "integer", "minimum": 1, "default": 10}
            },
            "required": ["query"]
        }"#,
    ),
    (
        "list_memories",
        "List memories with optional filtering by type and tags, most recently updated first",
        r#"{
            "type": "object",
            "properties": {
                "types": {"type": "array", "items": {"type": "string", "enum": ["entity", "concept", "session"]}, "description": "Match any of these types"},
                "tags": {"type": "array", "items": {"type": "string"}, "description": "Match any of these tags"},
                "limit": {"type": "integer", "minimum": 1}
            }
        }"#,
    ),
    // Tags and relations
    (
        "add_tags",
        "Add tags to a memory",
        r#"{
            "type": "object",
            "properties": {
                "id": {"type": "string", "description": "Memory ID"},
                "tags": {"type": "array", "items": {"type": "string"}}
            },
            "required": ["id", "tags"]
        }"#,
    ),
    (
        "remove_tags",
        "Remove tags from a memory",
        r#"{
            "type": "object",
            "properties": {
                "id": {"type": "string", "description": "Memory ID"},
                "tags": {"type": "array", "items": {"type": "string"}}
            },
            "required": ["id", "tags"]
        }"#,
    ),
    (
        "relate_memories",
        "Create relationships between memories. Relations are one-way from the source.",
        r#"{
            "type": "object",
            "properties": {
                "sourceId": {"type": "string"},
                "targetIds": {"type": "array", "items": {"type": "string"}}
            },
            "required": ["sourceId", "targetIds"]
        }"#,
    ),
    (
        "unrelate_memories",
        "Remove relationships between memories",
        r#"{
            "type": "object",
            "properties": {
                "sourceId": {"type": "string"},
                "targetIds": {"type": "array", "items": {"type": "string"}}
            },
            "required": ["sourceId", "targetIds"]
        }"#,
    ),
    // Maintenance
    (
        "rebuild_index",
        "Rebuild the search index",
        r#"{
            "type": "object",
            "properties": {}
        }"#,
    ),
    (
        "memory_stats",
        "Get statistics about the memory store",
        r#"{
            "type": "object",
            "properties": {}
        }"#,
    ),
];

/// Get all tool definitions as ToolDefinition structs
pub fn get_tool_definitions() -> Vec<ToolDefinition> {
    TOOL_DEFINITIONS
        .iter()
        .map(|(name, description, schema)| ToolDefinition {
            name: name.to_string(),
            description: description.to_string(),
            input_schema: serde_json::from_str(schema).unwrap_or(json!({})),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schemas_parse() {
        for (name, _, schema) in TOOL_DEFINITIONS {
            let value: serde_json::Value = serde_json::from_str(schema)
                .unwrap_or_else(|e| panic!("schema for {} is invalid: {}", name, e));
            assert_eq!(value["type"], "object", "{}", name);
        }
    }

    #[test]
    fn test_tool_names_unique() {
        let tools = get_tool_definitions();
        let mut names: Vec<_> = tools.iter().map(|t| t.name.as_str()).collect();
        names.sort();
        names.dedup();
        assert_eq!(names.len(), TOOL_DEFINITIONS.len());
        assert_eq!(names.len(), 13);
    }
}

//! MCP (Model Context Protocol) server implementation
//!
//! JSON-RPC over stdio for AI tool integration.

pub mod handler;
pub mod protocol;
pub mod tools;

pub use handler::RecallHandler;
pub use protocol::{
    methods, InitializeResult, McpHandler, McpRequest, McpResponse, McpServer, ToolCallResult,
};
pub use tools::{get_tool_definitions, TOOL_DEFINITIONS};

//! Recall - persistent memory for AI agents
//!
//! Memories are stored as individual text records partitioned by type, with
//! a derived full-text index kept in step with every change and exposed to
//! agents as MCP tools.

pub mod error;
pub mod mcp;
pub mod search;
pub mod service;
pub mod storage;
pub mod types;

pub use error::{RecallError, Result};
pub use service::MemoryService;
pub use storage::RecordStore;
pub use types::*;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

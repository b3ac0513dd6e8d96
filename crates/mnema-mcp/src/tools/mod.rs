//! MCP tools
//!
//! One module per published tool. Each exposes `schema()` describing its
//! input and `execute()` returning a structured JSON payload or an error
//! string; the server wraps either into a tool-call result.

pub mod boot;
pub mod forget;
pub mod link;
pub mod recall;
pub mod recall_path;
pub mod reflect;
pub mod remember;
pub mod snapshot;
pub mod status;

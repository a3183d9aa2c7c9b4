//! MCP server integration.
//!
//! Binds the tool handlers to the MCP protocol through rmcp.

pub mod service;

pub use service::GatewayService;

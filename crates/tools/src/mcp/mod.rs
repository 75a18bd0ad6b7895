//! Model Context Protocol server side: JSON-RPC dispatch onto the tool registry.

pub mod protocol;
pub mod server;

pub use server::McpServer;

//! # docstore-mcp
//!
//! MCP (Model Context Protocol) tool-invocation engine with an in-memory
//! document store behind it.
//!
//! Providers export [`ToolDef`]s through the [`ToolProvider`] trait; the
//! [`ToolRegistry`] collects them once at startup into an immutable snapshot.
//! [`McpServer`] speaks line-delimited JSON-RPC 2.0 over stdin/stdout, answers
//! discovery with a JSON Schema per tool ([`schema_for`]) and coerces loosely
//! typed JSON arguments into each tool's declared parameter types ([`bind`]).
//!
//! ## Usage
//!
//! The server is typically run as an executable and configured in AI tools like Claude Desktop:
//!
//! ```json
//! {
//!   "mcpServers": {
//!     "docstore": {
//!       "command": "/path/to/docstore-mcp",
//!       "args": ["--exposure", "all"]
//!     }
//!   }
//! }
//! ```
//!
//! ## Library Usage
//!
//! ```no_run
//! use std::sync::Arc;
//! use docstore_mcp::{resolve_providers, DocStore, McpServer, ServerConfig, ToolRegistry};
//!
//! let config = ServerConfig::default();
//! let store = Arc::new(DocStore::new());
//! let providers = resolve_providers(&config.provider_names(), &store);
//! let registry = ToolRegistry::register(&providers, config.collision).expect("registry");
//! let mut server = McpServer::new(Arc::new(registry), config);
//!
//! // Run the server (reads from stdin, writes to stdout)
//! server.run_sync().expect("Server error");
//! ```

#![warn(missing_docs)]

pub mod config;
pub mod convert;
pub mod error;
pub mod schema;
pub mod server;
pub mod store;
pub mod tools;

pub use config::{Exposure, ServerConfig};
pub use convert::{bind, ArgValue, BoundArgs};
pub use error::{McpError, Result};
pub use schema::schema_for;
pub use server::{JsonRpcRequest, JsonRpcResponse, McpServer, SessionState};
pub use store::DocStore;
pub use tools::{
    resolve_providers, CollisionPolicy, ParamDef, ParamType, ToolDef, ToolProvider, ToolRegistry,
    PROVIDER_NAMES,
};

//! Error types for the MCP server.
//!
//! Every failure the dispatcher can observe is an [`McpError`]; each variant
//! maps onto a JSON-RPC error code via [`McpError::rpc_code`].

use serde::{Deserialize, Serialize};

/// MCP server errors.
#[derive(Debug, Clone, thiserror::Error, Serialize, Deserialize)]
pub enum McpError {
    /// Unknown tool requested.
    #[error("Tool not found: {0}")]
    UnknownTool(String),

    /// Unknown JSON-RPC method.
    #[error("Method not found: {0}")]
    UnknownMethod(String),

    /// A structural field of the request params is missing or malformed.
    #[error("{0}")]
    InvalidParams(String),

    /// A tool read a required argument that was not supplied.
    #[error("missing required argument: {0}")]
    MissingArg(String),

    /// An argument could not be converted to its declared type.
    #[error("cannot convert argument '{name}' to {expected}: {reason}")]
    Conversion {
        /// Parameter name
        name: String,
        /// Declared parameter type
        expected: String,
        /// Why the conversion failed
        reason: String,
    },

    /// Two providers exported a tool with the same name.
    #[error("duplicate tool name: {0}")]
    DuplicateTool(String),

    /// A tool descriptor failed validation while being built.
    #[error("invalid tool descriptor: {0}")]
    InvalidDescriptor(String),

    /// Binding or invoking a tool failed; reported to the client as an internal error.
    #[error("Tool execution failed: {0}")]
    Execution(String),

    /// A call arrived before `initialize` while the strict policy is on.
    #[error("Server not initialized")]
    NotInitialized,

    /// JSON-RPC protocol error.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(String),

    /// Internal error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl From<std::io::Error> for McpError {
    fn from(err: std::io::Error) -> Self {
        McpError::Io(err.to_string())
    }
}

impl From<serde_json::Error> for McpError {
    fn from(err: serde_json::Error) -> Self {
        McpError::Protocol(format!("JSON error: {}", err))
    }
}

/// JSON-RPC error codes.
pub mod rpc_codes {
    /// Generic failure used for lines that are not valid JSON.
    pub const GENERIC_ERROR: i32 = -1;
    /// Invalid Request - The JSON sent is not a valid Request object.
    pub const INVALID_REQUEST: i32 = -32600;
    /// Method not found - The method does not exist / is not available.
    pub const METHOD_NOT_FOUND: i32 = -32601;
    /// Invalid params - Invalid method parameter(s).
    pub const INVALID_PARAMS: i32 = -32602;
    /// Internal error - Internal JSON-RPC error.
    pub const INTERNAL_ERROR: i32 = -32603;
}

impl McpError {
    /// Convert to JSON-RPC error code.
    pub fn rpc_code(&self) -> i32 {
        match self {
            McpError::UnknownTool(_) | McpError::UnknownMethod(_) => rpc_codes::METHOD_NOT_FOUND,
            McpError::InvalidParams(_) => rpc_codes::INVALID_PARAMS,
            McpError::Protocol(_) | McpError::NotInitialized => rpc_codes::INVALID_REQUEST,
            _ => rpc_codes::INTERNAL_ERROR,
        }
    }
}

/// Result type for MCP operations.
pub type Result<T> = std::result::Result<T, McpError>;

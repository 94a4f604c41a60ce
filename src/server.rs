//! MCP server implementation.
//!
//! Handles JSON-RPC 2.0 over stdio according to the MCP protocol specification.
//! [`McpServer::handle_line`] is the dispatcher; [`McpServer::serve`] and
//! [`McpServer::serve_sync`] are the transport loops around it.

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value as JsonValue};
use std::io::{BufRead, Write};
use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tracing::{debug, error, info, warn};

use crate::config::ServerConfig;
use crate::convert::bind;
use crate::error::{rpc_codes, McpError, Result};
use crate::tools::ToolRegistry;

/// MCP protocol version we support.
pub const PROTOCOL_VERSION: &str = "2024-11-05";

/// Server information.
const SERVER_NAME: &str = "docstore-mcp";
const SERVER_VERSION: &str = env!("CARGO_PKG_VERSION");
const SERVER_DESCRIPTION: &str = "In-memory document store exposed as MCP tools";

/// URI of the single informational resource.
const INFO_RESOURCE_URI: &str = "docstore://info";

/// JSON-RPC 2.0 request.
///
/// Every member is optional so that malformed-but-parseable messages still
/// reach the dispatcher and can be answered (or ignored) individually.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct JsonRpcRequest {
    /// Protocol version; must be "2.0" when present
    #[serde(default)]
    pub jsonrpc: Option<String>,
    /// Correlation id; absent for notifications
    #[serde(default)]
    pub id: Option<JsonValue>,
    /// Method name
    #[serde(default)]
    pub method: Option<String>,
    /// Method parameters
    #[serde(default)]
    pub params: Option<JsonValue>,
}

/// JSON-RPC 2.0 response.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JsonRpcResponse {
    /// Always "2.0"
    pub jsonrpc: String,
    /// Echo of the request id
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<JsonValue>,
    /// Result on success
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<JsonValue>,
    /// Error on failure
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
}

/// JSON-RPC 2.0 error object.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JsonRpcError {
    /// Error code
    pub code: i32,
    /// Human-readable message
    pub message: String,
    /// Optional extra payload
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<JsonValue>,
}

impl JsonRpcResponse {
    /// Create a success response.
    pub fn success(id: Option<JsonValue>, result: JsonValue) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id,
            result: Some(result),
            error: None,
        }
    }

    /// Create an error response.
    pub fn error(id: Option<JsonValue>, code: i32, message: String) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id,
            result: None,
            error: Some(JsonRpcError {
                code,
                message,
                data: None,
            }),
        }
    }

    /// Create an error response from an McpError.
    pub fn from_error(id: Option<JsonValue>, err: McpError) -> Self {
        Self::error(id, err.rpc_code(), err.to_string())
    }
}

/// Protocol session state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionState {
    /// No `initialize` seen yet
    #[default]
    Uninitialized,
    /// `initialize` has been handled
    Initialized,
}

/// MCP server.
pub struct McpServer {
    registry: Arc<ToolRegistry>,
    config: ServerConfig,
    state: SessionState,
}

impl McpServer {
    /// Create a server over a built registry.
    pub fn new(registry: Arc<ToolRegistry>, config: ServerConfig) -> Self {
        Self {
            registry,
            config,
            state: SessionState::Uninitialized,
        }
    }

    /// Current session state.
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// The registry this server dispatches into.
    pub fn registry(&self) -> &Arc<ToolRegistry> {
        &self.registry
    }

    /// Run the server, reading from stdin and writing to stdout.
    pub async fn run(&mut self) -> Result<()> {
        self.serve(BufReader::new(tokio::io::stdin()), tokio::io::stdout())
            .await
    }

    /// Serve line-delimited requests from `reader` until EOF.
    pub async fn serve<R, W>(&mut self, mut reader: R, mut writer: W) -> Result<()>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let mut buf = Vec::new();

        loop {
            buf.clear();
            let bytes_read = reader.read_until(b'\n', &mut buf).await?;

            if bytes_read == 0 {
                // EOF - client disconnected
                break;
            }

            let line = String::from_utf8_lossy(&buf);
            let line = line.trim();
            if line.is_empty() {
                continue;
            }

            if let Some(response) = self.handle_line(line) {
                let response_json = serde_json::to_string(&response)?;
                writer.write_all(response_json.as_bytes()).await?;
                writer.write_all(b"\n").await?;
                writer.flush().await?;
            }
        }

        info!("Input closed, shutting down");
        Ok(())
    }

    /// Run the server synchronously (for non-tokio environments).
    pub fn run_sync(&mut self) -> Result<()> {
        let stdin = std::io::stdin();
        self.serve_sync(stdin.lock(), std::io::stdout())
    }

    /// Blocking counterpart of [`McpServer::serve`].
    pub fn serve_sync<R: BufRead, W: Write>(&mut self, mut reader: R, mut writer: W) -> Result<()> {
        let mut buf = Vec::new();

        loop {
            buf.clear();
            let bytes_read = reader.read_until(b'\n', &mut buf)?;

            if bytes_read == 0 {
                break;
            }

            let line = String::from_utf8_lossy(&buf);
            let line = line.trim();
            if line.is_empty() {
                continue;
            }

            if let Some(response) = self.handle_line(line) {
                let response_json = serde_json::to_string(&response)?;
                writeln!(writer, "{}", response_json)?;
                writer.flush()?;
            }
        }

        info!("Input closed, shutting down");
        Ok(())
    }

    /// Handle one raw input line. Returns `None` when nothing should be written.
    pub fn handle_line(&mut self, line: &str) -> Option<JsonRpcResponse> {
        let message: JsonValue = match serde_json::from_str(line) {
            Ok(v) => v,
            Err(e) => {
                warn!("Unparseable input line: {}", e);
                return Some(JsonRpcResponse::error(
                    None,
                    rpc_codes::GENERIC_ERROR,
                    format!("Parse error: {}", e),
                ));
            }
        };

        match serde_json::from_value::<JsonRpcRequest>(message.clone()) {
            Ok(request) => self.handle_request(request),
            Err(e) => {
                // Wrong member types; answer only if there is an id to answer to
                let id = message.get("id").filter(|v| !v.is_null()).cloned();
                debug!("Malformed request: {}", e);
                id.map(|id| {
                    JsonRpcResponse::error(
                        Some(id),
                        rpc_codes::INVALID_REQUEST,
                        format!("Invalid request: {}", e),
                    )
                })
            }
        }
    }

    /// Handle a single JSON-RPC request.
    ///
    /// Notifications (no `id`) are processed but never answered; a message
    /// without a `method` is ignored.
    pub fn handle_request(&mut self, request: JsonRpcRequest) -> Option<JsonRpcResponse> {
        let Some(method) = request.method.clone() else {
            debug!("Ignoring message without method");
            return None;
        };
        let id = request.id.clone().filter(|v| !v.is_null());

        let response = self.dispatch(&method, request);

        if id.is_none() {
            debug!("Notification '{}' handled, response discarded", method);
            return None;
        }
        Some(response)
    }

    fn dispatch(&mut self, method: &str, request: JsonRpcRequest) -> JsonRpcResponse {
        let id = request.id.filter(|v| !v.is_null());

        // Validate JSON-RPC version
        if let Some(version) = request.jsonrpc.as_deref() {
            if version != "2.0" {
                return JsonRpcResponse::error(
                    id,
                    rpc_codes::INVALID_REQUEST,
                    "Invalid JSON-RPC version".to_string(),
                );
            }
        }

        if self.config.require_initialize
            && self.state == SessionState::Uninitialized
            && method != "initialize"
        {
            debug!("Rejecting '{}' before initialize", method);
            return JsonRpcResponse::from_error(id, McpError::NotInitialized);
        }

        debug!("Handling method '{}'", method);
        let params = request.params;
        let result = match method {
            "initialize" => Ok(self.handle_initialize()),
            "tools/list" => Ok(self.handle_tools_list()),
            "tools/call" => self.handle_tools_call(params),
            "resources/list" => Ok(self.handle_resources_list()),
            "resources/read" => self.handle_resources_read(params),
            other => Err(McpError::UnknownMethod(other.to_string())),
        };

        match result {
            Ok(value) => JsonRpcResponse::success(id, value),
            Err(err) => {
                debug!("Method '{}' failed: {}", method, err);
                JsonRpcResponse::from_error(id, err)
            }
        }
    }

    /// Handle the initialize request.
    fn handle_initialize(&mut self) -> JsonValue {
        if self.state == SessionState::Initialized {
            debug!("Repeated initialize");
        }
        self.state = SessionState::Initialized;
        info!("Client initialized");

        json!({
            "protocolVersion": PROTOCOL_VERSION,
            "capabilities": {
                "tools": { "listChanged": false },
                "resources": { "subscribe": false, "listChanged": false }
            },
            "serverInfo": {
                "name": SERVER_NAME,
                "version": SERVER_VERSION,
                "description": SERVER_DESCRIPTION
            }
        })
    }

    /// Handle the tools/list request.
    fn handle_tools_list(&self) -> JsonValue {
        let tools: Vec<JsonValue> = self.registry.list_all().iter().map(|t| t.to_json()).collect();
        json!({ "tools": tools })
    }

    /// Handle the tools/call request.
    fn handle_tools_call(&self, params: Option<JsonValue>) -> Result<JsonValue> {
        let params = params_object(params)?;

        let name = params
            .get("name")
            .and_then(|v| v.as_str())
            .ok_or_else(|| McpError::InvalidParams("Missing tool name".to_string()))?;

        let arguments = match params.get("arguments") {
            Some(JsonValue::Object(obj)) => obj.clone(),
            Some(JsonValue::Null) | None => Map::new(),
            _ => {
                return Err(McpError::InvalidParams(
                    "'arguments' must be an object".to_string(),
                ))
            }
        };

        let tool = self.registry.lookup(name)?;
        debug!("Calling tool '{}'", name);

        let output = bind(tool, &arguments)
            .and_then(|args| tool.invoke(args))
            .map_err(|e| {
                error!("Tool '{}' failed: {}", name, e);
                McpError::Execution(e.to_string())
            })?;

        // MCP tool responses are wrapped in content array
        Ok(json!({
            "content": [{
                "type": "text",
                "text": render_text(&output)
            }],
            "isError": false
        }))
    }

    /// Handle the resources/list request.
    fn handle_resources_list(&self) -> JsonValue {
        json!({
            "resources": [{
                "uri": INFO_RESOURCE_URI,
                "name": "Server information",
                "description": "Registered tools and providers of this server",
                "mimeType": "application/json"
            }]
        })
    }

    /// Handle the resources/read request.
    fn handle_resources_read(&self, params: Option<JsonValue>) -> Result<JsonValue> {
        let params = params_object(params)?;
        let uri = params
            .get("uri")
            .and_then(|v| v.as_str())
            .ok_or_else(|| McpError::InvalidParams("Missing resource uri".to_string()))?;

        if uri != INFO_RESOURCE_URI {
            return Err(McpError::InvalidParams(format!("Unknown resource: {}", uri)));
        }

        let info = json!({
            "name": SERVER_NAME,
            "version": SERVER_VERSION,
            "status": "running",
            "initialized": self.state == SessionState::Initialized,
            "tools_registered": self.registry.len(),
            "providers": self.registry.provider_names(),
        });

        Ok(json!({
            "contents": [{
                "uri": INFO_RESOURCE_URI,
                "mimeType": "application/json",
                "text": info.to_string()
            }]
        }))
    }
}

/// Params must be an object when present; absent params read as empty.
fn params_object(params: Option<JsonValue>) -> Result<Map<String, JsonValue>> {
    match params {
        Some(JsonValue::Object(obj)) => Ok(obj),
        Some(JsonValue::Null) | None => Ok(Map::new()),
        Some(_) => Err(McpError::InvalidParams("params must be an object".to_string())),
    }
}

/// A JSON string is used verbatim; anything else as compact JSON.
fn render_text(value: &JsonValue) -> String {
    match value {
        JsonValue::String(s) => s.clone(),
        other => other.to_string(),
    }
}

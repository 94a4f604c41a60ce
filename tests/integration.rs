//! Integration tests for the MCP server.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use docstore_mcp::{
    bind, resolve_providers, schema_for, ArgValue, DocStore, Exposure, McpError, McpServer,
    ParamType, ServerConfig, SessionState, ToolDef, ToolProvider, ToolRegistry,
};
use serde_json::{json, Map, Value as JsonValue};

/// Provider with a zero-argument `ping` and a tool that records invocation.
struct CheckTools {
    invoked: Arc<AtomicBool>,
}

impl ToolProvider for CheckTools {
    fn name(&self) -> &str {
        "checks"
    }

    fn tools(&self) -> docstore_mcp::Result<Vec<ToolDef>> {
        let ping = ToolDef::builder("ping", "Liveness check")
            .handler(|_| Ok(json!("pong")))
            .build()?;

        let invoked = self.invoked.clone();
        let touch = ToolDef::builder("touch", "Record that a tool ran")
            .handler(move |_| {
                invoked.store(true, Ordering::SeqCst);
                Ok(json!("touched"))
            })
            .build()?;

        let page = ToolDef::builder("page", "Page through a database")
            .param("dbName", ParamType::String)
            .param("limit", ParamType::Integer)
            .handler(|args| Ok(json!({ "db": args.string(0)?, "limit": args.integer(1)? })))
            .build()?;

        Ok(vec![ping, touch, page])
    }
}

fn check_server() -> (McpServer, Arc<AtomicBool>) {
    let invoked = Arc::new(AtomicBool::new(false));
    let providers: Vec<Box<dyn ToolProvider>> = vec![Box::new(CheckTools {
        invoked: invoked.clone(),
    })];
    let config = ServerConfig::default();
    let registry = ToolRegistry::register(&providers, config.collision).expect("registry");
    (McpServer::new(Arc::new(registry), config), invoked)
}

/// Server over the document store with the given exposure.
fn docstore_server(exposure: Exposure) -> McpServer {
    let config = ServerConfig {
        exposure,
        ..Default::default()
    };
    let store = Arc::new(DocStore::new());
    let providers = resolve_providers(&config.provider_names(), &store);
    let registry = ToolRegistry::register(&providers, config.collision).expect("registry");
    McpServer::new(Arc::new(registry), config)
}

/// Send one request line and return the parsed response.
fn send(server: &mut McpServer, request: JsonValue) -> JsonValue {
    let response = server
        .handle_line(&request.to_string())
        .unwrap_or_else(|| panic!("no response to {}", request));
    serde_json::to_value(response).expect("serialize response")
}

/// Call a tool and return the text of its first content item.
fn call_text(server: &mut McpServer, id: i64, name: &str, arguments: JsonValue) -> String {
    let response = send(
        server,
        json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": "tools/call",
            "params": { "name": name, "arguments": arguments }
        }),
    );
    response["result"]["content"][0]["text"]
        .as_str()
        .unwrap_or_else(|| panic!("tool {} failed: {}", name, response))
        .to_string()
}

// =============================================================================
// Protocol
// =============================================================================

#[test]
fn test_initialize_echoes_id_and_changes_state() {
    let (mut server, _) = check_server();
    assert_eq!(server.state(), SessionState::Uninitialized);

    let response = send(&mut server, json!({"jsonrpc": "2.0", "id": 1, "method": "initialize"}));
    assert_eq!(response["id"], 1);
    assert_eq!(response["result"]["protocolVersion"], "2024-11-05");
    assert_eq!(response["result"]["serverInfo"]["name"], "docstore-mcp");
    assert!(response["result"]["capabilities"]["tools"].is_object());
    assert!(response["result"]["capabilities"]["resources"].is_object());
    assert_eq!(server.state(), SessionState::Initialized);
}

#[test]
fn test_ping_exact_response() {
    let (mut server, _) = check_server();
    let response = server
        .handle_line(r#"{"jsonrpc":"2.0","id":2,"method":"tools/call","params":{"name":"ping"}}"#)
        .expect("response");
    assert_eq!(
        serde_json::to_string(&response).unwrap(),
        concat!(
            r#"{"jsonrpc":"2.0","id":2,"result":"#,
            r#"{"content":[{"type":"text","text":"pong"}],"isError":false}}"#
        )
    );
}

#[test]
fn test_unknown_tool_invokes_nothing() {
    let (mut server, invoked) = check_server();
    let response = send(
        &mut server,
        json!({"jsonrpc": "2.0", "id": 3, "method": "tools/call", "params": {"name": "nope"}}),
    );
    assert_eq!(response["error"]["code"], -32601);
    assert_eq!(response["error"]["message"], "Tool not found: nope");
    assert!(!invoked.load(Ordering::SeqCst));

    call_text(&mut server, 4, "touch", json!({}));
    assert!(invoked.load(Ordering::SeqCst));
}

#[test]
fn test_missing_tool_name() {
    let (mut server, invoked) = check_server();
    let response = send(
        &mut server,
        json!({"jsonrpc": "2.0", "id": 5, "method": "tools/call", "params": {"arguments": {}}}),
    );
    assert_eq!(response["error"]["code"], -32602);
    assert_eq!(response["error"]["message"], "Missing tool name");
    assert!(!invoked.load(Ordering::SeqCst));
}

#[test]
fn test_tools_list_carries_schemas() {
    let (mut server, _) = check_server();
    let response = send(&mut server, json!({"jsonrpc": "2.0", "id": 6, "method": "tools/list"}));
    let tools = response["result"]["tools"].as_array().expect("tools array");
    let names: Vec<&str> = tools.iter().filter_map(|t| t["name"].as_str()).collect();
    assert_eq!(names, vec!["ping", "touch", "page"]);

    let page = &tools[2];
    assert_eq!(page["inputSchema"]["properties"]["dbName"]["type"], "string");
    assert_eq!(page["inputSchema"]["properties"]["limit"]["type"], "integer");
    assert_eq!(page["inputSchema"]["required"], json!(["dbName"]));
    assert!(tools[0]["inputSchema"].get("required").is_none());
}

#[test]
fn test_notifications_get_no_response() {
    let (mut server, invoked) = check_server();
    assert!(server
        .handle_line(r#"{"jsonrpc":"2.0","method":"tools/call","params":{"name":"touch"}}"#)
        .is_none());
    // Dispatched even though unanswered
    assert!(invoked.load(Ordering::SeqCst));
    assert!(server
        .handle_line(r#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#)
        .is_none());
}

#[test]
fn test_require_initialize() {
    let providers = resolve_providers(&["database".to_string()], &Arc::new(DocStore::new()));
    let config = ServerConfig {
        require_initialize: true,
        ..Default::default()
    };
    let registry = ToolRegistry::register(&providers, config.collision).unwrap();
    let mut server = McpServer::new(Arc::new(registry), config);

    let response = send(
        &mut server,
        json!({"jsonrpc": "2.0", "id": 1, "method": "tools/call", "params": {"name": "ping"}}),
    );
    assert_eq!(response["error"]["code"], -32600);

    send(&mut server, json!({"jsonrpc": "2.0", "id": 2, "method": "initialize"}));
    assert_eq!(
        call_text(&mut server, 3, "ping", json!({})),
        "Database connection is healthy - ping successful."
    );
}

// =============================================================================
// Schema and binding
// =============================================================================

#[test]
fn test_schema_is_deterministic() {
    let (server, _) = check_server();
    let page = server.registry().lookup("page").unwrap();
    assert_eq!(schema_for(page), schema_for(page));
    assert_eq!(
        schema_for(page).to_string(),
        server.registry().lookup("page").map(schema_for).unwrap().to_string()
    );
}

#[test]
fn test_bind_numeric_string_and_default() {
    let (server, _) = check_server();
    let page = server.registry().lookup("page").unwrap();

    let mut args = Map::new();
    args.insert("limit".to_string(), json!("42"));
    let bound = bind(page, &args).unwrap();
    assert_eq!(bound.get(1), Some(&ArgValue::Integer(42)));

    let bound = bind(page, &Map::new()).unwrap();
    assert_eq!(bound.get(1), Some(&ArgValue::Integer(0)));
    assert_eq!(bound.get(0), Some(&ArgValue::Absent));
}

#[test]
fn test_bind_rejects_garbage_integer() {
    let (server, _) = check_server();
    let page = server.registry().lookup("page").unwrap();
    let mut args = Map::new();
    args.insert("limit".to_string(), json!("lots"));
    match bind(page, &args) {
        Err(McpError::Conversion { name, .. }) => assert_eq!(name, "limit"),
        other => panic!("expected conversion error, got {:?}", other),
    }
}

// =============================================================================
// Transport
// =============================================================================

#[test]
fn test_serve_sync_recovers_from_bad_line() {
    let (mut server, _) = check_server();
    let input = concat!(
        "not-json\n",
        "\n",
        r#"{"jsonrpc":"2.0","id":1,"method":"initialize"}"#,
        "\n",
        r#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#,
        "\n",
        r#"{"jsonrpc":"2.0","id":2,"method":"tools/call","params":{"name":"ping"}}"#,
        "\n",
    );
    let mut output = Vec::new();
    server.serve_sync(input.as_bytes(), &mut output).unwrap();

    let lines: Vec<JsonValue> = String::from_utf8(output)
        .unwrap()
        .lines()
        .map(|l| serde_json::from_str(l).unwrap())
        .collect();
    assert_eq!(lines.len(), 3);
    assert_eq!(lines[0]["error"]["code"], -1);
    assert!(lines[0].get("id").is_none());
    assert_eq!(lines[1]["id"], 1);
    assert_eq!(lines[2]["result"]["content"][0]["text"], "pong");
}

#[tokio::test]
async fn test_serve_async_over_byte_streams() {
    let (mut server, _) = check_server();
    let input = concat!(
        r#"{"jsonrpc":"2.0","id":1,"method":"tools/list"}"#,
        "\n",
        "not-json\n",
        r#"{"jsonrpc":"2.0","id":2,"method":"tools/call","#,
        r#""params":{"name":"page","arguments":{"dbName":"shop","limit":"7"}}}"#,
        // final line without trailing newline is still served
    );
    let mut output: Vec<u8> = Vec::new();
    server.serve(input.as_bytes(), &mut output).await.unwrap();

    let lines: Vec<JsonValue> = String::from_utf8(output)
        .unwrap()
        .lines()
        .map(|l| serde_json::from_str(l).unwrap())
        .collect();
    assert_eq!(lines.len(), 3);
    assert_eq!(lines[0]["id"], 1);
    assert_eq!(lines[1]["error"]["code"], -1);
    assert_eq!(
        lines[2]["result"]["content"][0]["text"],
        r#"{"db":"shop","limit":7}"#
    );
}

#[tokio::test]
async fn test_serve_async_empty_input() {
    let (mut server, _) = check_server();
    let mut output: Vec<u8> = Vec::new();
    server.serve(&b""[..], &mut output).await.unwrap();
    assert!(output.is_empty());
}

// =============================================================================
// Document store tools end to end
// =============================================================================

#[test]
fn test_public_exposure_hides_analytics() {
    let server = docstore_server(Exposure::Public);
    assert!(server.registry().lookup("findDocument").is_ok());
    assert!(matches!(
        server.registry().lookup("distinctValues"),
        Err(McpError::UnknownTool(_))
    ));

    let server = docstore_server(Exposure::All);
    assert!(server.registry().lookup("distinctValues").is_ok());
}

#[test]
fn test_document_lifecycle() {
    let mut server = docstore_server(Exposure::All);
    send(&mut server, json!({"jsonrpc": "2.0", "id": 0, "method": "initialize"}));

    let created = call_text(
        &mut server,
        1,
        "createDatabase",
        json!({"dbName": "shop", "initialCollectionName": "orders"}),
    );
    assert!(created.contains("shop"), "{}", created);

    // Objects are accepted for string parameters and passed as JSON text
    let inserted = call_text(
        &mut server,
        2,
        "insertDocument",
        json!({
            "dbName": "shop",
            "collectionName": "orders",
            "jsonDocument": {"item": "pen", "qty": 3}
        }),
    );
    assert!(inserted.starts_with("Document inserted successfully"), "{}", inserted);

    call_text(
        &mut server,
        3,
        "insertDocument",
        json!({
            "dbName": "shop",
            "collectionName": "orders",
            "jsonDocument": "{\"item\":\"ink\",\"qty\":1}"
        }),
    );

    let count = call_text(
        &mut server,
        4,
        "countDocuments",
        json!({"dbName": "shop", "collectionName": "orders"}),
    );
    assert_eq!(count, "2");

    let found = call_text(
        &mut server,
        5,
        "findDocument",
        json!({
            "dbName": "shop",
            "collectionName": "orders",
            "jsonQuery": "{\"item\":\"pen\"}",
            "limit": "10"
        }),
    );
    let found: JsonValue = serde_json::from_str(&found).unwrap();
    assert_eq!(found.as_array().unwrap().len(), 1);
    assert_eq!(found[0]["qty"], 3);

    let updated = call_text(
        &mut server,
        6,
        "updateDocument",
        json!({
            "dbName": "shop",
            "collectionName": "orders",
            "jsonQuery": "{\"item\":\"pen\"}",
            "jsonUpdate": "{\"$set\":{\"qty\":5}}"
        }),
    );
    assert_eq!(updated, "Update completed. Matched: 1, Modified: 1");

    let distinct = call_text(
        &mut server,
        7,
        "distinctValues",
        json!({"dbName": "shop", "collectionName": "orders", "fieldName": "item"}),
    );
    let distinct: JsonValue = serde_json::from_str(&distinct).unwrap();
    assert_eq!(distinct["count"], 2);

    let deleted = call_text(
        &mut server,
        8,
        "deleteDocument",
        json!({"dbName": "shop", "collectionName": "orders", "jsonQuery": "{}"}),
    );
    assert_eq!(deleted, "Delete completed. Deleted: 2 documents.");
}

#[test]
fn test_domain_failure_is_successful_result() {
    let mut server = docstore_server(Exposure::Public);
    let response = send(
        &mut server,
        json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": "tools/call",
            "params": {"name": "dropDatabase", "arguments": {"dbName": "ghost"}}
        }),
    );
    assert!(response.get("error").is_none());
    assert_eq!(response["result"]["isError"], false);
    let text = response["result"]["content"][0]["text"].as_str().unwrap();
    assert!(text.starts_with("Failed to drop database 'ghost'"), "{}", text);
}

#[test]
fn test_missing_required_argument_is_internal_error() {
    let mut server = docstore_server(Exposure::Public);
    let response = send(
        &mut server,
        json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": "tools/call",
            "params": {"name": "listCollections", "arguments": {}}
        }),
    );
    assert_eq!(response["error"]["code"], -32603);
    let message = response["error"]["message"].as_str().unwrap();
    assert!(message.contains("dbName"), "{}", message);
}

#[test]
fn test_info_resource_counts_tools() {
    let mut server = docstore_server(Exposure::Public);
    let response = send(
        &mut server,
        json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": "resources/read",
            "params": {"uri": "docstore://info"}
        }),
    );
    let text = response["result"]["contents"][0]["text"].as_str().unwrap();
    let info: JsonValue = serde_json::from_str(text).unwrap();
    assert_eq!(info["tools_registered"], server.registry().len());
    assert_eq!(info["providers"], json!(["database", "collection", "document"]));
}

#[test]
fn test_inc_overflow_keeps_serving() {
    let mut server = docstore_server(Exposure::Public);
    call_text(
        &mut server,
        1,
        "insertDocument",
        json!({
            "dbName": "shop",
            "collectionName": "stock",
            "jsonDocument": {"sku": "a", "qty": i64::MAX}
        }),
    );

    let updated = call_text(
        &mut server,
        2,
        "updateDocument",
        json!({
            "dbName": "shop",
            "collectionName": "stock",
            "jsonQuery": "{\"sku\":\"a\"}",
            "jsonUpdate": "{\"$inc\":{\"qty\":1}}"
        }),
    );
    assert!(updated.starts_with("Failed to update documents:"), "{}", updated);

    let count = call_text(
        &mut server,
        3,
        "countDocuments",
        json!({"dbName": "shop", "collectionName": "stock"}),
    );
    assert_eq!(count, "1");

    let found = call_text(
        &mut server,
        4,
        "findOne",
        json!({"dbName": "shop", "collectionName": "stock", "jsonQuery": "{\"sku\":\"a\"}"}),
    );
    let found: JsonValue = serde_json::from_str(&found).unwrap();
    assert_eq!(found["qty"], json!(i64::MAX));
}

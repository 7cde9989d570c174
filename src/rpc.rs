//! Side-channel RPC server: line-delimited JSON-RPC 2.0 over stdio.
//!
//! `famtree serve rpc` reads one request per stdin line and writes one
//! response per stdout line, exiting at end of input. This is the process
//! the chat dispatcher's [`ProcessSideChannel`](crate::side_channel::ProcessSideChannel)
//! spawns.
//!
//! | Method | Result |
//! |--------|--------|
//! | `initialize` | protocol version, capabilities, server info |
//! | `tools/list` | `{tools: [{name, description, inputSchema}]}` |
//! | `tools/call` | `{content: [{type: "text", text}], isError?}` |
//!
//! Tool failures are results with `isError: true`, not JSON-RPC errors.
//! Unknown methods get error `-32601`; unparsable lines `-32700`.

use anyhow::Result;
use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::{debug, info, warn};

use crate::tools::{ToolContext, ToolRegistry};

pub const PROTOCOL_VERSION: &str = "2024-11-05";

const PARSE_ERROR: i64 = -32700;
const INVALID_REQUEST: i64 = -32600;
const METHOD_NOT_FOUND: i64 = -32601;

fn error_response(id: Value, code: i64, message: impl Into<String>) -> Value {
    json!({
        "jsonrpc": "2.0",
        "id": id,
        "error": { "code": code, "message": message.into() }
    })
}

fn success_response(id: Value, result: Value) -> Value {
    json!({ "jsonrpc": "2.0", "id": id, "result": result })
}

/// Wraps a tool outcome in the MCP text-content shape.
pub fn tool_result(outcome: Result<Value>) -> Value {
    match outcome {
        Ok(value) => {
            let text = serde_json::to_string(&value).unwrap_or_default();
            json!({ "content": [{ "type": "text", "text": text }] })
        }
        Err(e) => json!({
            "content": [{ "type": "text", "text": format!("Error: {:#}", e) }],
            "isError": true
        }),
    }
}

/// Answers one request. Returns `None` for notifications.
pub async fn handle_request(
    registry: &ToolRegistry,
    ctx: &ToolContext,
    request: &Value,
) -> Option<Value> {
    let id = request.get("id").cloned();
    let Some(method) = request.get("method").and_then(|m| m.as_str()) else {
        return Some(error_response(
            id.unwrap_or(Value::Null),
            INVALID_REQUEST,
            "missing method",
        ));
    };

    let Some(id) = id else {
        debug!(method, "ignoring notification");
        return None;
    };

    let params = request.get("params").cloned().unwrap_or(Value::Null);
    let response = match method {
        "initialize" => success_response(
            id,
            json!({
                "protocolVersion": PROTOCOL_VERSION,
                "capabilities": { "tools": {} },
                "serverInfo": { "name": "famtree", "version": env!("CARGO_PKG_VERSION") }
            }),
        ),
        "tools/list" => {
            let tools: Vec<Value> = registry
                .infos()
                .into_iter()
                .map(|t| {
                    json!({
                        "name": t.name,
                        "description": t.description,
                        "inputSchema": t.parameters,
                    })
                })
                .collect();
            success_response(id, json!({ "tools": tools }))
        }
        "tools/call" => {
            let name = params["name"].as_str().unwrap_or_default();
            let arguments = params.get("arguments").cloned().unwrap_or(json!({}));
            let outcome = registry.call(name, arguments, ctx).await;
            if let Err(e) = &outcome {
                warn!(tool = name, "tool call failed: {:#}", e);
            }
            success_response(id, tool_result(outcome))
        }
        other => error_response(id, METHOD_NOT_FOUND, format!("Method not found: {}", other)),
    };
    Some(response)
}

/// Serves requests from stdin until it closes.
pub async fn serve_stdio(registry: ToolRegistry, ctx: ToolContext) -> Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();
    info!(tools = registry.len(), "rpc server reading stdin");

    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        let response = match serde_json::from_str::<Value>(&line) {
            Ok(request) => handle_request(&registry, &ctx, &request).await,
            Err(e) => Some(error_response(
                Value::Null,
                PARSE_ERROR,
                format!("Parse error: {}", e),
            )),
        };
        if let Some(response) = response {
            stdout.write_all(response.to_string().as_bytes()).await?;
            stdout.write_all(b"\n").await?;
            stdout.flush().await?;
        }
    }

    debug!("rpc stdin closed");
    Ok(())
}

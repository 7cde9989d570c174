//! Client side of the assistant side channel.
//!
//! A [`SideChannel`] answers one JSON-RPC call within a caller-supplied
//! deadline. [`ProcessSideChannel`] spawns the configured command (usually
//! `famtree serve rpc`) per call: it writes a single request line, closes
//! stdin, and waits for the process to exit. The response is the last
//! non-empty stdout line. When the deadline passes the child is killed.
//!
//! Every failure (spawn, non-zero exit, empty or unparsable output,
//! JSON-RPC `error`, tool `isError`) is an error. Callers that have a
//! fallback log it and carry on.

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::process::Stdio;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::debug;

use family_tree_core::error::FamilyError;
use family_tree_core::json::recover_json;

use crate::config::SideChannelConfig;

#[async_trait]
pub trait SideChannel: Send + Sync {
    /// Sends `method(params)` and returns the unwrapped `result`.
    async fn call(&self, method: &str, params: Value, deadline: Duration) -> Result<Value>;
}

/// Used when `[side_channel]` is not configured. Every call fails, so
/// callers go straight to their fallback.
pub struct NoSideChannel;

#[async_trait]
impl SideChannel for NoSideChannel {
    async fn call(&self, _method: &str, _params: Value, _deadline: Duration) -> Result<Value> {
        Err(FamilyError::Upstream("side channel is not configured".to_string()).into())
    }
}

pub struct ProcessSideChannel {
    command: String,
    args: Vec<String>,
    next_id: AtomicU64,
}

impl ProcessSideChannel {
    pub fn new(config: &SideChannelConfig) -> Self {
        Self {
            command: config.command.clone(),
            args: config.args.clone(),
            next_id: AtomicU64::new(1),
        }
    }

    async fn exchange(&self, request: String) -> Result<std::process::Output> {
        let mut child = Command::new(&self.command)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .with_context(|| format!("Failed to spawn side channel: {}", self.command))?;

        let mut stdin = child
            .stdin
            .take()
            .context("side channel stdin unavailable")?;
        stdin.write_all(request.as_bytes()).await?;
        stdin.write_all(b"\n").await?;
        stdin.shutdown().await?;
        drop(stdin);

        Ok(child.wait_with_output().await?)
    }
}

#[async_trait]
impl SideChannel for ProcessSideChannel {
    async fn call(&self, method: &str, params: Value, deadline: Duration) -> Result<Value> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let request = json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
            "params": params,
        })
        .to_string();

        // Dropping the exchange future drops the child, which kills it.
        let output = tokio::time::timeout(deadline, self.exchange(request))
            .await
            .map_err(|_| {
                FamilyError::Upstream(format!(
                    "side channel timed out after {}ms",
                    deadline.as_millis()
                ))
            })??;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(FamilyError::Upstream(format!(
                "side channel exited with {}: {}",
                output.status,
                stderr.trim()
            ))
            .into());
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        debug!(method, bytes = stdout.len(), "side channel answered");
        parse_response(&stdout)
    }
}

/// Reads the last non-empty line as the response and unwraps it.
fn parse_response(stdout: &str) -> Result<Value> {
    let line = stdout
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .last()
        .ok_or_else(|| FamilyError::Upstream("side channel produced no output".to_string()))?;

    let response: Value = serde_json::from_str(line).map_err(|e| FamilyError::Parse {
        message: format!("side channel response: {}", e),
        raw: line.to_string(),
    })?;

    if let Some(error) = response.get("error") {
        let message = error
            .get("message")
            .and_then(|m| m.as_str())
            .map(str::to_string)
            .unwrap_or_else(|| error.to_string());
        return Err(FamilyError::Upstream(format!("side channel error: {}", message)).into());
    }

    let result = match response.get("result") {
        Some(result) => result.clone(),
        None => response,
    };

    if result.get("isError").and_then(|v| v.as_bool()) == Some(true) {
        return Err(FamilyError::Upstream(format!(
            "side channel tool failed: {}",
            content_text(&result).unwrap_or_default()
        ))
        .into());
    }
    Ok(result)
}

fn content_text(result: &Value) -> Option<&str> {
    result
        .get("content")?
        .as_array()?
        .iter()
        .find(|c| c.get("type").and_then(|t| t.as_str()) == Some("text"))?
        .get("text")?
        .as_str()
}

/// Calls a tool through `tools/call` and decodes the JSON carried in its
/// first text content block.
pub async fn call_tool(
    channel: &dyn SideChannel,
    name: &str,
    arguments: Value,
    deadline: Duration,
) -> Result<Value> {
    let result = channel
        .call(
            "tools/call",
            json!({ "name": name, "arguments": arguments }),
            deadline,
        )
        .await?;
    let text = content_text(&result)
        .ok_or_else(|| FamilyError::Upstream("side channel result has no text content".to_string()))?;
    recover_json(text)
}

pub fn create_side_channel(config: Option<&SideChannelConfig>) -> Arc<dyn SideChannel> {
    match config {
        Some(config) => Arc::new(ProcessSideChannel::new(config)),
        None => Arc::new(NoSideChannel),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_response_unwraps_envelope_and_takes_last_line() {
        let stdout = "starting up\n{\"jsonrpc\":\"2.0\",\"id\":1,\"result\":{\"content\":[{\"type\":\"text\",\"text\":\"[1]\"}]}}\n\n";
        let result = parse_response(stdout).unwrap();
        assert_eq!(content_text(&result), Some("[1]"));
    }

    #[test]
    fn test_parse_response_accepts_bare_content() {
        let result = parse_response(r#"{"content":[{"type":"text","text":"{}"}]}"#).unwrap();
        assert_eq!(content_text(&result), Some("{}"));
    }

    #[test]
    fn test_parse_response_failures() {
        assert!(parse_response("").is_err());
        assert!(parse_response("not json").is_err());
        assert!(parse_response(r#"{"jsonrpc":"2.0","id":1,"error":{"code":-32601,"message":"nope"}}"#).is_err());
        assert!(parse_response(
            r#"{"result":{"content":[{"type":"text","text":"Error: boom"}],"isError":true}}"#
        )
        .is_err());
    }

    #[tokio::test]
    async fn test_no_side_channel_always_fails() {
        assert!(NoSideChannel
            .call("tools/list", json!({}), Duration::from_secs(1))
            .await
            .is_err());
    }

    #[cfg(unix)]
    fn shell(script: &str) -> ProcessSideChannel {
        ProcessSideChannel::new(&SideChannelConfig {
            command: "sh".to_string(),
            args: vec!["-c".to_string(), script.to_string()],
            timeout_secs: 10,
        })
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_process_round_trip() {
        let channel = shell(
            r#"read line; echo '{"jsonrpc":"2.0","id":1,"result":{"content":[{"type":"text","text":"[{\"id\":\"p1\"}]"}]}}'"#,
        );
        let value = call_tool(
            &channel,
            "get_all_family_nodes",
            json!({}),
            Duration::from_secs(5),
        )
        .await
        .unwrap();
        assert_eq!(value[0]["id"], "p1");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_process_non_zero_exit_is_error() {
        let channel = shell("cat > /dev/null; echo oops >&2; exit 3");
        let err = channel
            .call("tools/list", json!({}), Duration::from_secs(5))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("oops"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_process_deadline_kills_child() {
        let channel = shell("sleep 30");
        let started = std::time::Instant::now();
        let err = channel
            .call("tools/list", json!({}), Duration::from_millis(200))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("timed out"));
        assert!(started.elapsed() < Duration::from_secs(10));
    }

    #[tokio::test]
    async fn test_spawn_failure_is_error() {
        let channel = ProcessSideChannel::new(&SideChannelConfig {
            command: "/nonexistent/famtree-side-channel".to_string(),
            args: vec![],
            timeout_secs: 1,
        });
        assert!(channel
            .call("tools/list", json!({}), Duration::from_secs(1))
            .await
            .is_err());
    }
}

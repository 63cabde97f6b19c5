//! A single MCP server connection over stdio JSON-RPC 2.0.
//!
//! This gateway has no sidecar-module manifest system — servers come from a
//! flat [`super::ServerConfig`] list — so only the handshake/call machinery
//! is needed, not manifest discovery.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::Mutex;

use super::ServerConfig;

#[derive(Debug, Serialize)]
struct JsonRpcRequest {
    jsonrpc: &'static str,
    id: Value,
    method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    params: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct JsonRpcResponse {
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<JsonRpcError>,
}

#[derive(Debug, Deserialize)]
struct JsonRpcError {
    code: i64,
    message: String,
    #[serde(default)]
    data: Option<Value>,
}

impl JsonRpcResponse {
    fn into_result(self) -> Result<Value, String> {
        if let Some(err) = self.error {
            return Err(format!(
                "MCP error {} ({}): {}",
                err.code,
                err.message,
                err.data.unwrap_or(Value::Null)
            ));
        }
        Ok(self.result.unwrap_or(Value::Null))
    }
}

/// A tool exposed by an MCP server, as returned by `tools/list`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct McpTool {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(rename = "inputSchema", default)]
    pub input_schema: Value,
}

struct McpProcess {
    stdin: tokio::process::ChildStdin,
    stdout: BufReader<tokio::process::ChildStdout>,
    child: tokio::process::Child,
    next_id: u64,
}

impl McpProcess {
    fn next_id(&mut self) -> Value {
        let id = self.next_id;
        self.next_id += 1;
        Value::Number(id.into())
    }

    async fn call(&mut self, method: &str, params: Option<Value>) -> Result<JsonRpcResponse, String> {
        let id = self.next_id();
        let req = JsonRpcRequest {
            jsonrpc: "2.0",
            id,
            method: method.to_string(),
            params,
        };
        let mut line = serde_json::to_string(&req).map_err(|e| format!("MCP serialize error: {e}"))?;
        line.push('\n');
        self.stdin
            .write_all(line.as_bytes())
            .await
            .map_err(|e| format!("MCP write error: {e}"))?;
        self.stdin.flush().await.map_err(|e| format!("MCP flush error: {e}"))?;

        let mut resp_line = String::new();
        self.stdout
            .read_line(&mut resp_line)
            .await
            .map_err(|e| format!("MCP read error: {e}"))?;
        if resp_line.is_empty() {
            return Err("MCP server closed the connection".to_string());
        }
        serde_json::from_str::<JsonRpcResponse>(&resp_line).map_err(|e| format!("MCP deserialize error: {e}"))
    }

    async fn notify(&mut self, method: &str) -> Result<(), String> {
        let notif = serde_json::json!({"jsonrpc": "2.0", "method": method});
        let mut line = serde_json::to_string(&notif).map_err(|e| format!("MCP notify serialize error: {e}"))?;
        line.push('\n');
        self.stdin
            .write_all(line.as_bytes())
            .await
            .map_err(|e| format!("MCP notify write error: {e}"))
    }
}

/// Manages one long-running MCP server process, stdio-transport only.
/// HTTP/SSE transports are optional and not implemented here.
pub struct McpClient {
    config: ServerConfig,
    process: Mutex<Option<McpProcess>>,
}

impl McpClient {
    pub fn new(config: ServerConfig) -> Self {
        Self {
            config,
            process: Mutex::new(None),
        }
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    /// Spawn the server and complete the MCP handshake, returning the tools
    /// it advertises.
    pub async fn connect(&self) -> Result<Vec<McpTool>, String> {
        let mut cmd = tokio::process::Command::new(&self.config.command);
        cmd.args(&self.config.args);
        for (k, v) in &self.config.env {
            cmd.env(k, v);
        }
        cmd.stdin(std::process::Stdio::piped())
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::null());

        let mut child = cmd
            .spawn()
            .map_err(|e| format!("failed to start MCP server '{}': {e}", self.config.name))?;
        let stdin = child.stdin.take().ok_or("MCP child has no stdin")?;
        let stdout = BufReader::new(child.stdout.take().ok_or("MCP child has no stdout")?);

        let mut proc = McpProcess {
            stdin,
            stdout,
            child,
            next_id: 0,
        };

        let init_params = serde_json::json!({
            "protocolVersion": "2024-11-05",
            "capabilities": {},
            "clientInfo": {"name": "safeclaw", "version": env!("CARGO_PKG_VERSION")},
        });
        proc.call("initialize", Some(init_params)).await?.into_result()?;
        proc.notify("notifications/initialized").await?;

        let tools_result = proc.call("tools/list", None).await?.into_result()?;
        let tools: Vec<McpTool> = tools_result
            .get("tools")
            .and_then(|v| serde_json::from_value(v.clone()).ok())
            .unwrap_or_default();

        *self.process.lock().await = Some(proc);
        tracing::info!(server = %self.config.name, count = tools.len(), "mcp server connected");
        Ok(tools)
    }

    pub async fn disconnect(&self) {
        let mut guard = self.process.lock().await;
        if let Some(mut proc) = guard.take() {
            let _ = proc.child.kill().await;
        }
    }

    pub async fn call_tool(&self, tool_name: &str, arguments: Value) -> Result<Value, String> {
        let mut guard = self.process.lock().await;
        let proc = guard
            .as_mut()
            .ok_or_else(|| format!("MCP server '{}' is not connected", self.config.name))?;
        let params = serde_json::json!({"name": tool_name, "arguments": arguments});
        let result = proc.call("tools/call", Some(params)).await?.into_result()?;
        if result.get("isError").and_then(|v| v.as_bool()).unwrap_or(false) {
            let msg = result
                .get("content")
                .and_then(|c| c.as_array())
                .and_then(|arr| arr.first())
                .and_then(|item| item.get("text"))
                .and_then(|t| t.as_str())
                .unwrap_or("tool returned an error");
            return Err(msg.to_string());
        }
        Ok(result)
    }
}

/// Flatten an MCP `content` array (text/resource parts) into plain text.
pub fn render_content(result: &Value) -> String {
    if let Some(parts) = result.get("content").and_then(|c| c.as_array()) {
        let rendered: Vec<String> = parts
            .iter()
            .filter_map(|p| p.get("text").and_then(|t| t.as_str()).map(|s| s.to_string()))
            .collect();
        if !rendered.is_empty() {
            return rendered.join("\n");
        }
    }
    serde_json::to_string_pretty(result).unwrap_or_else(|_| result.to_string())
}

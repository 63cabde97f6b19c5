//! Remote tool discovery over MCP.
//!
//! Configured servers are read from a well-known file
//! (`STORAGE_DIR/mcp_servers.json`), one stdio client is opened per entry
//! during wake, and each server's advertised tools are registered into the
//! [`crate::tools::ToolRegistry`] as `provenance=remote` definitions named
//! `mcp__<server>__<tool>`. HTTP/SSE transports are optional and
//! not implemented — every entry here is stdio.

pub mod client;

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::Mutex;

use crate::agent::naming::mcp_tool_name;
use crate::tools::{ToolDefinition, ToolRegistry};

pub use client::{render_content, McpClient, McpTool};

/// One entry in `mcp_servers.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub name: String,
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub env: HashMap<String, String>,
}

/// Load and parse the server config file, resolving `${VAR}` placeholders in
/// `command`/`args`/`env` values against the process environment. A missing
/// file is not an error — it means no remote tools are configured.
pub fn load_server_configs(path: &Path) -> Result<Vec<ServerConfig>, String> {
    let content = match std::fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(format!("failed to read {}: {e}", path.display())),
    };
    let mut configs: Vec<ServerConfig> =
        serde_json::from_str(&content).map_err(|e| format!("invalid mcp_servers.json: {e}"))?;
    for config in &mut configs {
        config.command = resolve_env_placeholders(&config.command);
        config.args = config.args.iter().map(|a| resolve_env_placeholders(a)).collect();
        for value in config.env.values_mut() {
            *value = resolve_env_placeholders(value);
        }
    }
    Ok(configs)
}

/// Replace every `${VAR}` with the value of the `VAR` environment variable,
/// leaving unresolvable placeholders untouched.
fn resolve_env_placeholders(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut rest = input;
    while let Some(start) = rest.find("${") {
        let Some(end) = rest[start..].find('}') else {
            out.push_str(rest);
            return out;
        };
        out.push_str(&rest[..start]);
        let var_name = &rest[start + 2..start + end];
        if let Ok(value) = std::env::var(var_name) {
            out.push_str(&value);
        } else {
            out.push_str(&rest[start..start + end + 1]);
        }
        rest = &rest[start + end + 1..];
    }
    out.push_str(rest);
    out
}

const DANGER_KEYWORDS: [&str; 10] = [
    "write", "delete", "remove", "exec", "run", "shell", "send", "post", "modify", "update",
];

/// Keyword heuristic assigning the `dangerous` flag to a discovered tool.
fn is_dangerous_heuristic(name: &str, description: &str) -> bool {
    let haystack = format!("{name} {description}").to_lowercase();
    DANGER_KEYWORDS.iter().any(|kw| haystack.contains(kw)) || !haystack.contains("read") && !haystack.contains("list") && !haystack.contains("get")
}

/// Owns the live clients for every connected MCP server.
pub struct McpManager {
    clients: Mutex<HashMap<String, Arc<McpClient>>>,
}

impl McpManager {
    pub fn new() -> Self {
        Self {
            clients: Mutex::new(HashMap::new()),
        }
    }

    /// Connect to every configured server concurrently and register their
    /// tools into `registry` as a fire-and-forget remote-tool discovery
    /// pass. Failures are logged per-server and do not prevent the others
    /// from registering.
    pub async fn connect_all(&self, configs: Vec<ServerConfig>, registry: &Mutex<ToolRegistry>) {
        let attempts = configs.into_iter().map(|config| async move {
            let name = config.name.clone();
            let client = Arc::new(McpClient::new(config));
            match client.connect().await {
                Ok(tools) => Some((name, client, tools)),
                Err(e) => {
                    tracing::warn!(server = %name, error = %e, "mcp server connect failed, skipping");
                    None
                }
            }
        });
        let results = futures::future::join_all(attempts).await;

        let mut clients = self.clients.lock().await;
        let mut reg = registry.lock().await;
        for (name, client, tools) in results.into_iter().flatten() {
            for tool in &tools {
                let dangerous = is_dangerous_heuristic(&tool.name, &tool.description);
                reg.register_remote(ToolDefinition::remote(
                    mcp_tool_name(&name, &tool.name),
                    tool.description.clone(),
                    dangerous,
                    name.clone(),
                    tool.name.clone(),
                    tool.input_schema.clone(),
                ));
            }
            clients.insert(name, client);
        }
    }

    /// Disconnect every client and forget them.
    pub async fn disconnect_all(&self) {
        let mut clients = self.clients.lock().await;
        for client in clients.values() {
            client.disconnect().await;
        }
        clients.clear();
    }

    /// Call `(server, tool)` with `arguments`, rendering the MCP content
    /// parts to text.
    pub async fn call(&self, server: &str, tool: &str, arguments: Value) -> Result<String, String> {
        let clients = self.clients.lock().await;
        let client = clients
            .get(server)
            .ok_or_else(|| format!("mcp server '{server}' is not connected"))?;
        let result = client.call_tool(tool, arguments).await?;
        Ok(render_content(&result))
    }
}

impl Default for McpManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_env_placeholders_substitutes_known_var() {
        unsafe { std::env::set_var("SAFECLAW_TEST_VAR", "hunter2") };
        assert_eq!(resolve_env_placeholders("token=${SAFECLAW_TEST_VAR}"), "token=hunter2");
        unsafe { std::env::remove_var("SAFECLAW_TEST_VAR") };
    }

    #[test]
    fn resolve_env_placeholders_leaves_unknown_var_untouched() {
        assert_eq!(resolve_env_placeholders("${SAFECLAW_DOES_NOT_EXIST}"), "${SAFECLAW_DOES_NOT_EXIST}");
    }

    #[test]
    fn load_server_configs_missing_file_is_empty() {
        let configs = load_server_configs(Path::new("/nonexistent/mcp_servers.json")).unwrap();
        assert!(configs.is_empty());
    }

    #[test]
    fn danger_heuristic_flags_write_verbs() {
        assert!(is_dangerous_heuristic("delete_record", "Deletes a record"));
        assert!(is_dangerous_heuristic("send_email", "Sends an email"));
    }

    #[test]
    fn danger_heuristic_allows_read_verbs() {
        assert!(!is_dangerous_heuristic("get_weather", "Reads current weather for a city"));
        assert!(!is_dangerous_heuristic("list_files", "Lists files in a directory"));
    }

    #[test]
    fn danger_heuristic_defaults_ambiguous_to_dangerous() {
        assert!(is_dangerous_heuristic("do_thing", "Does a thing"));
    }
}

//! Three-way tool execution dispatch.
//!
//! [`crate::tools::registry::ToolRegistry`] only tracks catalog state; this
//! is where a call by its LLM-visible name is actually routed to a builtin
//! [`crate::tools::Tool`] impl, a remote MCP server, or a persisted dynamic
//! skill script. SecretGuard checks for filesystem paths and shell commands
//! already live inside the individual builtin `Tool` impls, which resolve
//! and check their own paths, so this module only needs to route, not
//! re-check.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;

use crate::mcp::McpManager;
use crate::skills::SkillsManager;
use crate::tools::{Tool, ToolRegistry, ToolResult};

/// Everything [`dispatch`] needs to route a call once the registry says the
/// tool is enabled.
pub struct DispatchContext {
    pub builtins: HashMap<&'static str, Arc<dyn Tool>>,
    pub mcp: Arc<McpManager>,
    pub skills: Arc<SkillsManager>,
}

/// Execute `tool_name` with `arguments`, given its catalog entry in
/// `registry`. Returns a [`ToolResult`] on success or failure text on
/// infrastructure errors the caller should treat the same way (both become
/// tool-result content for the session history.
pub async fn dispatch(
    ctx: &DispatchContext,
    registry: &ToolRegistry,
    tool_name: &str,
    arguments: Value,
) -> Result<ToolResult, String> {
    let def = registry
        .get(tool_name)
        .ok_or_else(|| format!("tool '{tool_name}' is not registered"))?;

    use crate::tools::ToolProvenance::*;
    match def.provenance {
        Builtin => {
            let tool = ctx
                .builtins
                .get(tool_name)
                .ok_or_else(|| format!("no builtin implementation for '{tool_name}'"))?;
            tool.execute(arguments).await
        }
        Remote => {
            let server = def
                .remote_server
                .as_deref()
                .ok_or_else(|| format!("remote tool '{tool_name}' missing server metadata"))?;
            let original = def
                .remote_original_name
                .as_deref()
                .ok_or_else(|| format!("remote tool '{tool_name}' missing original name"))?;
            match ctx.mcp.call(server, original, arguments).await {
                Ok(text) => Ok(ToolResult::ok(text)),
                Err(e) => Ok(ToolResult::err(e)),
            }
        }
        Dynamic => {
            let skill_name = def
                .skill_name
                .as_deref()
                .ok_or_else(|| format!("dynamic tool '{tool_name}' missing skill name"))?;
            match ctx.skills.call(skill_name, arguments).await {
                Ok(text) => Ok(ToolResult::ok(text)),
                Err(e) => Ok(ToolResult::err(e)),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::ToolDefinition;
    use async_trait::async_trait;

    struct EchoTool;

    #[async_trait]
    impl Tool for EchoTool {
        fn name(&self) -> &str {
            "echo"
        }
        fn description(&self) -> &str {
            "echoes input"
        }
        fn parameters_schema(&self) -> Value {
            serde_json::json!({})
        }
        async fn execute(&self, args: Value) -> Result<ToolResult, String> {
            Ok(ToolResult::ok(args.to_string()))
        }
    }

    fn test_ctx() -> DispatchContext {
        let mut builtins: HashMap<&'static str, Arc<dyn Tool>> = HashMap::new();
        builtins.insert("read_file", Arc::new(EchoTool));
        DispatchContext {
            builtins,
            mcp: Arc::new(McpManager::new()),
            skills: Arc::new(SkillsManager::new(std::env::temp_dir().join("safeclaw_dispatch_test"))),
        }
    }

    #[tokio::test]
    async fn dispatch_unregistered_tool_errors() {
        let ctx = test_ctx();
        let registry = ToolRegistry::new();
        let result = dispatch(&ctx, &registry, "nope", serde_json::json!({})).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn dispatch_routes_builtin_to_its_impl() {
        let ctx = test_ctx();
        let mut registry = ToolRegistry::new();
        registry.insert_builtin(ToolDefinition::builtin("read_file", "d", false));
        let result = dispatch(&ctx, &registry, "read_file", serde_json::json!({"a": 1})).await.unwrap();
        assert!(result.output.contains('1'));
    }

    #[tokio::test]
    async fn dispatch_remote_without_connection_yields_error_result() {
        let ctx = test_ctx();
        let mut registry = ToolRegistry::new();
        registry.register_remote(ToolDefinition::remote(
            "mcp__fs__read",
            "d",
            false,
            "fs",
            "read",
            serde_json::json!({}),
        ));
        let result = dispatch(&ctx, &registry, "mcp__fs__read", serde_json::json!({})).await.unwrap();
        assert!(!result.success);
    }
}

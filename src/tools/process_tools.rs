//! `Tool` wrappers around [`ProcessRegistry`].
//!
//! `ProcessRegistry` itself is a plain async API (`spawn`/`poll`/`write`/
//! `kill`/`list`); these five thin structs adapt each action to the `Tool`
//! trait the same way `shell.rs`'s `ExecShellTool` wraps a one-shot
//! command, so the registry's actions show up in the LLM-visible tool
//! list under the exact names the naming table specifies.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Value, json};

use super::process::ProcessRegistry;
use super::traits::{Tool, ToolResult};

pub struct ExecShellBgTool {
    processes: Arc<ProcessRegistry>,
}

impl ExecShellBgTool {
    pub fn new(processes: Arc<ProcessRegistry>) -> Self {
        Self { processes }
    }
}

#[async_trait]
impl Tool for ExecShellBgTool {
    fn name(&self) -> &str {
        "exec_shell_bg"
    }

    fn description(&self) -> &str {
        "Start a persistent background shell session and return its session id."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "required": ["command"],
            "properties": {
                "command": { "type": "string", "description": "The shell command to run." },
                "working_dir": { "type": "string", "description": "Optional working directory." }
            }
        })
    }

    async fn execute(&self, args: Value) -> Result<ToolResult, String> {
        let command = args
            .get("command")
            .and_then(Value::as_str)
            .ok_or("missing required argument 'command'")?;
        let cwd = args.get("working_dir").and_then(Value::as_str);
        let id = self.processes.spawn(command, cwd).await?;
        Ok(ToolResult::ok(format!("started session '{id}'")))
    }
}

pub struct ProcessPollTool {
    processes: Arc<ProcessRegistry>,
}

impl ProcessPollTool {
    pub fn new(processes: Arc<ProcessRegistry>) -> Self {
        Self { processes }
    }
}

#[async_trait]
impl Tool for ProcessPollTool {
    fn name(&self) -> &str {
        "process_poll"
    }

    fn description(&self) -> &str {
        "Read accumulated output and status from a background shell session."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "required": ["session_id"],
            "properties": {
                "session_id": { "type": "string", "description": "The session id returned by exec_shell_bg." }
            }
        })
    }

    async fn execute(&self, args: Value) -> Result<ToolResult, String> {
        let session_id = args
            .get("session_id")
            .and_then(Value::as_str)
            .ok_or("missing required argument 'session_id'")?;
        let output = self.processes.poll(session_id).await?;
        Ok(ToolResult::ok(output))
    }
}

pub struct ProcessWriteTool {
    processes: Arc<ProcessRegistry>,
}

impl ProcessWriteTool {
    pub fn new(processes: Arc<ProcessRegistry>) -> Self {
        Self { processes }
    }
}

#[async_trait]
impl Tool for ProcessWriteTool {
    fn name(&self) -> &str {
        "process_write"
    }

    fn description(&self) -> &str {
        "Write a line of input to a background shell session's stdin."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "required": ["session_id", "input"],
            "properties": {
                "session_id": { "type": "string", "description": "The session id returned by exec_shell_bg." },
                "input": { "type": "string", "description": "Text to write to the session's stdin." }
            }
        })
    }

    async fn execute(&self, args: Value) -> Result<ToolResult, String> {
        let session_id = args
            .get("session_id")
            .and_then(Value::as_str)
            .ok_or("missing required argument 'session_id'")?;
        let input = args
            .get("input")
            .and_then(Value::as_str)
            .ok_or("missing required argument 'input'")?;
        let result = self.processes.write(session_id, input).await?;
        Ok(ToolResult::ok(result))
    }
}

pub struct ProcessKillTool {
    processes: Arc<ProcessRegistry>,
}

impl ProcessKillTool {
    pub fn new(processes: Arc<ProcessRegistry>) -> Self {
        Self { processes }
    }
}

#[async_trait]
impl Tool for ProcessKillTool {
    fn name(&self) -> &str {
        "process_kill"
    }

    fn description(&self) -> &str {
        "Terminate a background shell session."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "required": ["session_id"],
            "properties": {
                "session_id": { "type": "string", "description": "The session id returned by exec_shell_bg." }
            }
        })
    }

    async fn execute(&self, args: Value) -> Result<ToolResult, String> {
        let session_id = args
            .get("session_id")
            .and_then(Value::as_str)
            .ok_or("missing required argument 'session_id'")?;
        let result = self.processes.kill(session_id).await?;
        Ok(ToolResult::ok(result))
    }
}

pub struct ProcessListTool {
    processes: Arc<ProcessRegistry>,
}

impl ProcessListTool {
    pub fn new(processes: Arc<ProcessRegistry>) -> Self {
        Self { processes }
    }
}

#[async_trait]
impl Tool for ProcessListTool {
    fn name(&self) -> &str {
        "process_list"
    }

    fn description(&self) -> &str {
        "List all tracked background shell sessions and their status."
    }

    fn parameters_schema(&self) -> Value {
        json!({ "type": "object", "properties": {} })
    }

    async fn execute(&self, _args: Value) -> Result<ToolResult, String> {
        Ok(ToolResult::ok(self.processes.list().await))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn spawn_poll_and_kill_roundtrip() {
        let registry = Arc::new(ProcessRegistry::new(Duration::from_secs(600)));
        let spawn = ExecShellBgTool::new(registry.clone());
        let spawned = spawn.execute(json!({"command": "cat"})).await.unwrap();
        assert!(spawned.output.contains("started session"));

        let session_id = spawned.output.trim_start_matches("started session '").trim_end_matches('\'');

        let write = ProcessWriteTool::new(registry.clone());
        write.execute(json!({"session_id": session_id, "input": "hi"})).await.unwrap();

        tokio::time::sleep(Duration::from_millis(100)).await;
        let poll = ProcessPollTool::new(registry.clone());
        let polled = poll.execute(json!({"session_id": session_id})).await.unwrap();
        assert!(polled.output.contains("hi"));

        let kill = ProcessKillTool::new(registry.clone());
        kill.execute(json!({"session_id": session_id})).await.unwrap();

        let list = ProcessListTool::new(registry);
        let listed = list.execute(json!({})).await.unwrap();
        assert!(listed.output.contains(session_id));
    }
}

//! `exec_shell` builtin: run a one-shot shell command.
//!
//! Commands are screened by [`SecretGuard::check_command`]
//! before they run, and output is passed through `SecretGuard::redact_output`
//! before it reaches the model.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Value, json};

use crate::security::SecretGuard;

use super::traits::{Tool, ToolResult};

pub struct ExecShellTool {
    secret_guard: Arc<SecretGuard>,
}

impl ExecShellTool {
    pub fn new(secret_guard: Arc<SecretGuard>) -> Self {
        Self { secret_guard }
    }
}

#[async_trait]
impl Tool for ExecShellTool {
    fn name(&self) -> &str {
        "exec_shell"
    }

    fn description(&self) -> &str {
        "Execute a shell command and return its stdout/stderr output."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "command": { "type": "string", "description": "The shell command to execute." },
                "working_dir": { "type": "string", "description": "Optional working directory." }
            },
            "required": ["command"]
        })
    }

    async fn execute(&self, args: Value) -> Result<ToolResult, String> {
        let command = args
            .get("command")
            .and_then(Value::as_str)
            .ok_or("missing required argument 'command'")?
            .to_string();
        let working_dir = args.get("working_dir").and_then(Value::as_str).map(str::to_string);

        if let Some(reason) = self.secret_guard.check_command(&command) {
            return Err(reason);
        }

        let result = tokio::task::spawn_blocking(move || {
            let mut cmd = std::process::Command::new("sh");
            cmd.arg("-c").arg(&command);
            if let Some(dir) = &working_dir {
                cmd.current_dir(dir);
            }
            cmd.output().map_err(|e| format!("failed to spawn process: {e}"))
        })
        .await
        .map_err(|e| format!("blocking task panicked: {e}"))??;

        let stdout = String::from_utf8_lossy(&result.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&result.stderr).into_owned();
        let success = result.status.success();

        let combined = if stderr.is_empty() {
            stdout
        } else if stdout.is_empty() {
            format!("STDERR: {stderr}")
        } else {
            format!("{stdout}\nSTDERR: {stderr}")
        };
        let output = self.secret_guard.redact_output(&combined);

        let meta = json!({ "exit_code": result.status.code() });
        if success {
            Ok(ToolResult::ok(output).with_metadata(meta))
        } else {
            Ok(ToolResult::err(output).with_metadata(meta))
        }
    }
}

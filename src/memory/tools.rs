//! Agent-callable tools backed by [`MemoryStore`].
//!
//! Standard parameter validation, error propagation, and found/not-found
//! result text, cut down to the four flat-key actions the naming table
//! calls for — `memory_read`, `memory_write`, `memory_list`,
//! `memory_delete` — with no category/recall-scoring concepts, since
//! [`MemoryStore`] has none.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Value, json};

use crate::tools::traits::{Tool, ToolResult};

use super::store::MemoryStore;

pub struct MemoryReadTool {
    memory: Arc<MemoryStore>,
}

impl MemoryReadTool {
    pub fn new(memory: Arc<MemoryStore>) -> Self {
        Self { memory }
    }
}

#[async_trait]
impl Tool for MemoryReadTool {
    fn name(&self) -> &str {
        "memory_read"
    }

    fn description(&self) -> &str {
        "Read a value from persistent memory by key."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "required": ["key"],
            "properties": {
                "key": { "type": "string", "description": "The memory key to read." }
            }
        })
    }

    async fn execute(&self, args: Value) -> Result<ToolResult, String> {
        let key = args
            .get("key")
            .and_then(Value::as_str)
            .ok_or("missing required parameter 'key'")?;

        match self.memory.read(key).await {
            Some(value) => Ok(ToolResult::ok(value.to_string())),
            None => Ok(ToolResult::ok(format!("no memory entry for key '{key}'"))),
        }
    }
}

pub struct MemoryWriteTool {
    memory: Arc<MemoryStore>,
}

impl MemoryWriteTool {
    pub fn new(memory: Arc<MemoryStore>) -> Self {
        Self { memory }
    }
}

#[async_trait]
impl Tool for MemoryWriteTool {
    fn name(&self) -> &str {
        "memory_write"
    }

    fn description(&self) -> &str {
        "Write a value into persistent memory under a key, overwriting any existing value."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "required": ["key", "value"],
            "properties": {
                "key": { "type": "string", "description": "The memory key to write." },
                "value": { "description": "The value to store (any JSON value)." }
            }
        })
    }

    async fn execute(&self, args: Value) -> Result<ToolResult, String> {
        let key = args
            .get("key")
            .and_then(Value::as_str)
            .ok_or("missing required parameter 'key'")?;
        let value = args
            .get("value")
            .cloned()
            .ok_or("missing required parameter 'value'")?;

        self.memory
            .write(key, value)
            .await
            .map_err(|e| format!("failed to write memory: {e}"))?;
        Ok(ToolResult::ok(format!("stored memory '{key}'")))
    }
}

pub struct MemoryListTool {
    memory: Arc<MemoryStore>,
}

impl MemoryListTool {
    pub fn new(memory: Arc<MemoryStore>) -> Self {
        Self { memory }
    }
}

#[async_trait]
impl Tool for MemoryListTool {
    fn name(&self) -> &str {
        "memory_list"
    }

    fn description(&self) -> &str {
        "List all keys currently stored in persistent memory."
    }

    fn parameters_schema(&self) -> Value {
        json!({ "type": "object", "properties": {} })
    }

    async fn execute(&self, _args: Value) -> Result<ToolResult, String> {
        let mut keys = self.memory.list().await;
        keys.sort();
        if keys.is_empty() {
            Ok(ToolResult::ok("memory is empty"))
        } else {
            Ok(ToolResult::ok(keys.join("\n")))
        }
    }
}

pub struct MemoryDeleteTool {
    memory: Arc<MemoryStore>,
}

impl MemoryDeleteTool {
    pub fn new(memory: Arc<MemoryStore>) -> Self {
        Self { memory }
    }
}

#[async_trait]
impl Tool for MemoryDeleteTool {
    fn name(&self) -> &str {
        "memory_delete"
    }

    fn description(&self) -> &str {
        "Delete a key from persistent memory."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "required": ["key"],
            "properties": {
                "key": { "type": "string", "description": "The memory key to delete." }
            }
        })
    }

    async fn execute(&self, args: Value) -> Result<ToolResult, String> {
        let key = args
            .get("key")
            .and_then(Value::as_str)
            .ok_or("missing required parameter 'key'")?;

        let found = self
            .memory
            .delete(key)
            .await
            .map_err(|e| format!("failed to delete memory: {e}"))?;
        if found {
            Ok(ToolResult::ok(format!("deleted memory '{key}'")))
        } else {
            Ok(ToolResult::ok(format!("no memory entry for key '{key}'")))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    async fn memory() -> (TempDir, Arc<MemoryStore>) {
        let dir = TempDir::new().unwrap();
        let store = MemoryStore::load(dir.path().join("memory.json")).await.unwrap();
        (dir, Arc::new(store))
    }

    #[tokio::test]
    async fn write_then_read() {
        let (_dir, mem) = memory().await;
        let write = MemoryWriteTool::new(mem.clone());
        write
            .execute(json!({"key": "user:name", "value": "Ada"}))
            .await
            .unwrap();
        let read = MemoryReadTool::new(mem);
        let r = read.execute(json!({"key": "user:name"})).await.unwrap();
        assert!(r.output.contains("Ada"));
    }

    #[tokio::test]
    async fn read_missing_key_reports_absence() {
        let (_dir, mem) = memory().await;
        let read = MemoryReadTool::new(mem);
        let r = read.execute(json!({"key": "nope"})).await.unwrap();
        assert!(r.output.contains("no memory entry"));
    }

    #[tokio::test]
    async fn list_reports_all_keys() {
        let (_dir, mem) = memory().await;
        mem.write("a", json!(1)).await.unwrap();
        mem.write("b", json!(2)).await.unwrap();
        let list = MemoryListTool::new(mem);
        let r = list.execute(json!({})).await.unwrap();
        assert!(r.output.contains('a') && r.output.contains('b'));
    }

    #[tokio::test]
    async fn delete_reports_whether_key_existed() {
        let (_dir, mem) = memory().await;
        mem.write("a", json!(1)).await.unwrap();
        let delete = MemoryDeleteTool::new(mem.clone());
        let r1 = delete.execute(json!({"key": "a"})).await.unwrap();
        assert!(r1.output.contains("deleted"));
        let r2 = delete.execute(json!({"key": "a"})).await.unwrap();
        assert!(r2.output.contains("no memory entry"));
    }
}

//! Builtin tool implementations and the tool catalog.
//!
//! Rather than wire `Arc<dyn Tool>` instances straight into a flat registry,
//! this module owns the `Tool` implementations and a [`builtin_definitions`]
//! catalog seed; `ToolRegistry` (in [`registry`]) tracks enabled/disabled +
//! provenance state only, and `crate::agent::dispatch` is what actually
//! routes a call to one of the `Tool` impls declared here (or to a
//! remote/dynamic handler) once the registry says it's enabled.
//!
//! Scheduled jobs, tool-group presets, and spawning sibling agent sessions
//! have no counterpart in this gateway's scope and aren't implemented here.

pub mod file_ops;
pub mod patch;
pub mod process;
pub mod process_tools;
pub mod registry;
pub mod sandbox;
pub mod shell;
pub mod traits;
pub mod web;

use std::path::PathBuf;
use std::sync::Arc;

pub use file_ops::{DeleteFileTool, ListDirTool, MoveFileTool, ReadFileTool, WriteFileTool};
pub use patch::ApplyPatchTool;
pub use process::ProcessRegistry;
pub use process_tools::{ExecShellBgTool, ProcessKillTool, ProcessListTool, ProcessPollTool, ProcessWriteTool};
pub use registry::{ToolDefinition, ToolProvenance, ToolRegistry, ToolStatus};
pub use shell::ExecShellTool;
pub use traits::{Tool, ToolInfo, ToolResult};
pub use web::BrowseWebTool;

use crate::security::SecretGuard;

/// The fixed catalog of builtin tools and their danger
/// classification, used to seed a fresh [`ToolRegistry`] at startup.
/// All entries start disabled.
pub fn builtin_definitions() -> Vec<ToolDefinition> {
    vec![
        ToolDefinition::builtin("read_file", "Read the contents of a file.", false),
        ToolDefinition::builtin("list_dir", "List the contents of a directory.", false),
        ToolDefinition::builtin("write_file", "Write content to a file.", true),
        ToolDefinition::builtin("delete_file", "Delete a file.", true),
        ToolDefinition::builtin("move_file", "Move or rename a file.", true),
        ToolDefinition::builtin("browse_web", "Fetch content from a URL over HTTP GET.", false),
        ToolDefinition::builtin("exec_shell", "Execute a one-shot shell command.", true),
        ToolDefinition::builtin("exec_shell_bg", "Start a persistent background shell session.", true),
        ToolDefinition::builtin("process_poll", "Read output from a background shell session.", false),
        ToolDefinition::builtin("process_write", "Write input to a background shell session.", true),
        ToolDefinition::builtin("process_kill", "Terminate a background shell session.", true),
        ToolDefinition::builtin("process_list", "List tracked background shell sessions.", false),
        ToolDefinition::builtin("memory_read", "Read a value from persistent memory.", false),
        ToolDefinition::builtin("memory_write", "Write a value into persistent memory.", true),
        ToolDefinition::builtin("memory_list", "List all persistent memory keys.", false),
        ToolDefinition::builtin("memory_delete", "Delete a persistent memory key.", true),
        ToolDefinition::builtin("apply_patch", "Apply a multi-file patch envelope.", true),
    ]
}

/// Shared dependencies every builtin `Tool` construction needs.
pub struct BuiltinToolContext {
    pub workspace_root: PathBuf,
    pub secret_guard: Arc<SecretGuard>,
    pub processes: Arc<ProcessRegistry>,
    pub memory: Arc<crate::memory::MemoryStore>,
}

/// Construct one `Arc<dyn Tool>` per builtin definition name, keyed the
/// same way `builtin_definitions` names them. `crate::agent::dispatch`
/// looks calls up in the map this produces.
pub fn builtin_tools(ctx: &BuiltinToolContext) -> Vec<(&'static str, Arc<dyn Tool>)> {
    vec![
        (
            "read_file",
            Arc::new(ReadFileTool::new(ctx.workspace_root.clone(), ctx.secret_guard.clone())) as Arc<dyn Tool>,
        ),
        (
            "list_dir",
            Arc::new(ListDirTool::new(ctx.workspace_root.clone(), ctx.secret_guard.clone())) as Arc<dyn Tool>,
        ),
        (
            "write_file",
            Arc::new(WriteFileTool::new(ctx.workspace_root.clone(), ctx.secret_guard.clone())) as Arc<dyn Tool>,
        ),
        (
            "delete_file",
            Arc::new(DeleteFileTool::new(ctx.workspace_root.clone(), ctx.secret_guard.clone())) as Arc<dyn Tool>,
        ),
        (
            "move_file",
            Arc::new(MoveFileTool::new(ctx.workspace_root.clone(), ctx.secret_guard.clone())) as Arc<dyn Tool>,
        ),
        ("browse_web", Arc::new(BrowseWebTool::new()) as Arc<dyn Tool>),
        (
            "exec_shell",
            Arc::new(ExecShellTool::new(ctx.secret_guard.clone())) as Arc<dyn Tool>,
        ),
        (
            "exec_shell_bg",
            Arc::new(ExecShellBgTool::new(ctx.processes.clone())) as Arc<dyn Tool>,
        ),
        (
            "process_poll",
            Arc::new(ProcessPollTool::new(ctx.processes.clone())) as Arc<dyn Tool>,
        ),
        (
            "process_write",
            Arc::new(ProcessWriteTool::new(ctx.processes.clone())) as Arc<dyn Tool>,
        ),
        (
            "process_kill",
            Arc::new(ProcessKillTool::new(ctx.processes.clone())) as Arc<dyn Tool>,
        ),
        (
            "process_list",
            Arc::new(ProcessListTool::new(ctx.processes.clone())) as Arc<dyn Tool>,
        ),
        (
            "memory_read",
            Arc::new(crate::memory::MemoryReadTool::new(ctx.memory.clone())) as Arc<dyn Tool>,
        ),
        (
            "memory_write",
            Arc::new(crate::memory::MemoryWriteTool::new(ctx.memory.clone())) as Arc<dyn Tool>,
        ),
        (
            "memory_list",
            Arc::new(crate::memory::MemoryListTool::new(ctx.memory.clone())) as Arc<dyn Tool>,
        ),
        (
            "memory_delete",
            Arc::new(crate::memory::MemoryDeleteTool::new(ctx.memory.clone())) as Arc<dyn Tool>,
        ),
        (
            "apply_patch",
            Arc::new(ApplyPatchTool::new(ctx.workspace_root.clone(), ctx.secret_guard.clone())) as Arc<dyn Tool>,
        ),
    ]
}

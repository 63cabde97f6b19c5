//! The turn-based agent loop: prompt assembly, tool dispatch,
//! the safe/dangerous split, and continuation after an owner's `/confirm`
//! or `/deny`.
//!
//! Approval is a cross-turn ticket in [`crate::approval::ApprovalStore`] —
//! the run simply returns once a dangerous call is found, and a later owner
//! `/confirm` resumes it via [`AgentLoop::confirm`] rather than blocking
//! in-process on an approval reply. Compaction, tool-result truncation, and
//! the loop-depth ceiling operate over the richer [`crate::session::Session`]
//! data model.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::{json, Value};

use crate::agent::dispatch::{dispatch, DispatchContext};
use crate::agent::naming::{self, REQUEST_CAPABILITY};
use crate::ai::provider::LLMProvider;
use crate::ai::types::{CompletionRequest, Message as LlmMessage, ToolCall, ToolSchema};
use crate::approval::{ApprovalDetails, ApprovalStatus, ApprovalStore};
use crate::audit::AuditLog;
use crate::session::{Message as SessionMessage, MessageRole as SessionRole, PendingToolCall, Session};
use crate::skills::SkillsManager;
use crate::tools::{ToolDefinition, ToolProvenance, ToolRegistry};

/// The result of one [`AgentLoop::run`] / [`AgentLoop::confirm`] call.
#[derive(Debug, Clone)]
pub enum LoopOutcome {
    /// A final reply to show the owner; the run is complete.
    Replied(String),
    /// One or more dangerous tool calls need `/confirm`/`/deny` before the
    /// run can continue. The Gateway transitions to `action_pending`.
    PendingApproval {
        batch_id: Option<String>,
        ids: Vec<String>,
        prompt: String,
    },
}

/// Tunable limits for one [`AgentLoop`].
#[derive(Debug, Clone)]
pub struct AgentConfig {
    pub model: String,
    pub max_history: usize,
    pub compaction_threshold_tokens: usize,
    pub compaction_batch: usize,
    pub max_loop_depth: u32,
    pub tool_result_ceiling: usize,
}

/// Drives one owner run against a [`Session`], a provider, and the tool
/// catalog. Stateless across calls beyond what's threaded through `Session`.
pub struct AgentLoop {
    provider: Arc<dyn LLMProvider>,
    registry: Arc<tokio::sync::Mutex<ToolRegistry>>,
    dispatch_ctx: DispatchContext,
    approvals: Arc<ApprovalStore>,
    audit: Arc<AuditLog>,
    skills: Arc<SkillsManager>,
    config: AgentConfig,
}

impl AgentLoop {
    pub fn new(
        provider: Arc<dyn LLMProvider>,
        registry: Arc<tokio::sync::Mutex<ToolRegistry>>,
        dispatch_ctx: DispatchContext,
        approvals: Arc<ApprovalStore>,
        audit: Arc<AuditLog>,
        skills: Arc<SkillsManager>,
        config: AgentConfig,
    ) -> Self {
        Self {
            provider,
            registry,
            dispatch_ctx,
            approvals,
            audit,
            skills,
            config,
        }
    }

    /// Start a new run from owner free text.
    pub async fn run(
        &self,
        session: &mut Session,
        system_prompt: &str,
        user_message: &str,
    ) -> Result<LoopOutcome, String> {
        session.push(SessionMessage::user(user_message));
        session.trim_history(self.config.max_history);
        self.run_loop(session, system_prompt).await
    }

    /// Resolve one or more approvals as confirmed. Does
    /// not call the provider again until every ticket that was pending in
    /// `session.pending_tool_calls` has been resolved.
    pub async fn confirm(
        &self,
        session: &mut Session,
        system_prompt: &str,
        ids: &[String],
    ) -> Result<LoopOutcome, String> {
        let mut any_approved = false;
        for id in ids {
            let Some(pending) = session.pending_tool_calls.remove(id) else {
                continue;
            };
            // `approve` returns `None` for an id that's already resolved or has
            // since expired, not just for an unknown one.
            match self.approvals.approve(id) {
                Some(ticket) if ticket.status == ApprovalStatus::Approved => {
                    any_approved = true;
                    self.resolve_confirmed(session, pending).await;
                }
                _ => {
                    session.push(SessionMessage::tool_result(
                        pending.tool_call_id,
                        pending.tool_name,
                        "approval expired; treated as denied",
                    ));
                }
            }
        }

        if !session.pending_tool_calls.is_empty() {
            let ids: Vec<String> = session.pending_tool_calls.keys().cloned().collect();
            return Ok(LoopOutcome::PendingApproval {
                batch_id: None,
                ids,
                prompt: "Waiting on the remaining approvals in this batch.".to_string(),
            });
        }

        if !any_approved {
            return Ok(LoopOutcome::Replied("No pending approval with that id.".to_string()));
        }

        match self.run_loop(session, system_prompt).await {
            Ok(LoopOutcome::Replied(text)) => Ok(LoopOutcome::Replied(format!("Approved. {text}"))),
            other => other,
        }
    }

    /// Resolve one or more approvals as denied. No
    /// provider call is made; the caller (Gateway) decides whether to
    /// transition back to `awake` based on whether any tickets remain.
    pub fn deny(&self, session: &mut Session, ids: &[String]) -> String {
        let mut acknowledged = Vec::new();
        for id in ids {
            if let Some(pending) = session.pending_tool_calls.remove(id) {
                self.approvals.deny(id);
                acknowledged.push(pending.tool_name);
            }
        }
        if acknowledged.is_empty() {
            "No matching pending approval.".to_string()
        } else {
            format!("Denied: {}", acknowledged.join(", "))
        }
    }

    // ── Internal ─────────────────────────────────────────────────────────

    async fn resolve_confirmed(&self, session: &mut Session, pending: PendingToolCall) {
        if pending.tool_name == "skill_forge" {
            self.install_confirmed_skill(session, pending).await;
            return;
        }

        let result = {
            let registry = self.registry.lock().await;
            dispatch(&self.dispatch_ctx, &registry, &pending.tool_name, pending.input.clone()).await
        };
        let (text, success) = match result {
            Ok(tr) => (tr.output, tr.success),
            Err(e) => (e, false),
        };
        let _ = self.audit.record(
            "tool_executed",
            json!({"tool": pending.tool_name, "approved": true, "success": success}),
        );
        session.push(SessionMessage::tool_result(
            pending.tool_call_id,
            pending.tool_name,
            self.truncate(text),
        ));
    }

    async fn install_confirmed_skill(&self, session: &mut Session, pending: PendingToolCall) {
        let args = &pending.input;
        let skill_name = args.get("skill_name").and_then(Value::as_str).unwrap_or("");
        let description = args
            .get("skill_description")
            .and_then(Value::as_str)
            .unwrap_or("")
            .to_string();
        let dangerous = args.get("dangerous").and_then(Value::as_bool).unwrap_or(true);
        let parameters_schema = args.get("parameters_schema").cloned().unwrap_or_else(|| json!({}));
        let code = args
            .get("implementation_code")
            .and_then(Value::as_str)
            .unwrap_or("")
            .to_string();

        match self
            .skills
            .install(skill_name, description, dangerous, parameters_schema.clone(), code)
            .await
        {
            Ok(skill) => {
                let tool_name = naming::skill_tool_name(&skill.name);
                self.registry.lock().await.register_dynamic(
                    ToolDefinition::dynamic(
                        tool_name.clone(),
                        skill.description.clone(),
                        skill.dangerous,
                        skill.name.clone(),
                        parameters_schema,
                    ),
                    true,
                );
                let _ = self.audit.record("skill_installed", json!({"name": skill.name}));
                session.push(SessionMessage::tool_result(
                    pending.tool_call_id,
                    "skill_forge",
                    format!("skill installed and enabled as '{tool_name}'"),
                ));
            }
            Err(e) => {
                session.push(SessionMessage::tool_result(
                    pending.tool_call_id,
                    "skill_forge",
                    format!("installation failed: {e}"),
                ));
            }
        }
    }

    /// The step 5-6 loop: call the provider, dispatch safe calls, loop back
    /// while only safe calls were issued, suspend on the first dangerous one.
    async fn run_loop(&self, session: &mut Session, system_prompt: &str) -> Result<LoopOutcome, String> {
        let mut depth: u32 = 0;
        let mut compaction_notice: Option<String> = None;

        loop {
            if let Some(notice) = self.compact_if_needed(session).await {
                compaction_notice.get_or_insert(notice);
            }

            let tools = self.build_tool_schemas().await;
            let mut messages = vec![LlmMessage::system(system_prompt)];
            messages.extend(session.messages.iter().map(SessionMessage::to_llm_message));

            let request = CompletionRequest::new(self.config.model.clone(), messages).with_tools(tools);
            let response = self.provider.complete(request).await?;

            if response.tool_calls.is_empty() {
                session.push(SessionMessage::assistant(response.content.clone()));
                let mut reply = response.content;
                if let Some(notice) = compaction_notice {
                    reply = format!("{notice}\n{reply}");
                }
                return Ok(LoopOutcome::Replied(reply));
            }

            let mut assistant_msg = SessionMessage::assistant(response.content.clone());
            assistant_msg.tool_calls = response.tool_calls.clone();
            session.push(assistant_msg);

            let pending_batch = self.process_tool_calls(session, &response.tool_calls).await;

            if !pending_batch.is_empty() {
                return Ok(self.create_approvals(session, pending_batch).await);
            }

            depth += 1;
            if depth >= self.config.max_loop_depth {
                let last_text = session
                    .messages
                    .iter()
                    .rev()
                    .find(|m| matches!(m.role, SessionRole::Assistant) && !m.content.is_empty())
                    .map(|m| m.content.clone());
                return Ok(LoopOutcome::Replied(
                    last_text.unwrap_or_else(|| "[turn limit reached]".to_string()),
                ));
            }
        }
    }

    /// Execute every safe call immediately; collect dangerous calls (and
    /// validated skill proposals) for batch approval.
    async fn process_tool_calls(
        &self,
        session: &mut Session,
        calls: &[ToolCall],
    ) -> Vec<(String, Value, ApprovalDetails, ToolCall)> {
        let mut pending_batch = Vec::new();

        for call in calls {
            let args: Value = serde_json::from_str(&call.arguments).unwrap_or(Value::Null);

            if call.name == REQUEST_CAPABILITY {
                match self.validate_skill_proposal(&args) {
                    Ok((action, details)) => pending_batch.push((action, args, details, call.clone())),
                    Err(reason) => session.push(SessionMessage::tool_result(
                        call.id.clone(),
                        "skill_forge",
                        format!("proposal rejected: {reason}"),
                    )),
                }
                continue;
            }

            let (exists, enabled, dangerous, description) = {
                let registry = self.registry.lock().await;
                match registry.get(&call.name) {
                    Some(def) => (true, registry.is_enabled(&call.name), def.dangerous, def.description.clone()),
                    None => (false, false, true, String::new()),
                }
            };

            if !exists || !enabled {
                session.push(SessionMessage::tool_result(
                    call.id.clone(),
                    call.name.clone(),
                    "tool not enabled",
                ));
                continue;
            }

            if dangerous {
                let mut details = ApprovalDetails::new(format!("{}: {description}", call.name));
                if let Some(target) = guess_target(&args) {
                    details = details.with_target(target);
                }
                pending_batch.push(("tool_call".to_string(), args, details, call.clone()));
            } else {
                self.execute_safe(session, call, args).await;
            }
        }

        pending_batch
    }

    async fn execute_safe(&self, session: &mut Session, call: &ToolCall, args: Value) {
        let result = {
            let registry = self.registry.lock().await;
            dispatch(&self.dispatch_ctx, &registry, &call.name, args).await
        };
        let (text, success) = match result {
            Ok(tr) => (tr.output, tr.success),
            Err(e) => (e, false),
        };
        let _ = self
            .audit
            .record("tool_executed", json!({"tool": call.name, "approved": false, "success": success}));
        session.push(SessionMessage::tool_result(
            call.id.clone(),
            call.name.clone(),
            self.truncate(text),
        ));
    }

    fn validate_skill_proposal(&self, args: &Value) -> Result<(String, ApprovalDetails), String> {
        let raw_name = args
            .get("skill_name")
            .and_then(Value::as_str)
            .ok_or("missing skill_name")?;
        let name = SkillsManager::sanitize_name(raw_name);
        let code = args
            .get("implementation_code")
            .and_then(Value::as_str)
            .unwrap_or("")
            .to_string();
        let description = args
            .get("skill_description")
            .and_then(Value::as_str)
            .unwrap_or("")
            .to_string();

        if name.is_empty() {
            return Err("skill name is empty after sanitization".to_string());
        }
        if code.trim().is_empty() {
            return Err("implementation code is empty".to_string());
        }
        if self.skills.is_installed(&name) {
            return Err(format!("a skill named '{name}' is already installed"));
        }

        let details = ApprovalDetails::new(format!("install skill '{name}': {description}"))
            .with_target(name)
            .with_content(code);
        Ok(("skill_install".to_string(), details))
    }

    async fn create_approvals(
        &self,
        session: &mut Session,
        pending_batch: Vec<(String, Value, ApprovalDetails, ToolCall)>,
    ) -> LoopOutcome {
        let is_batch = pending_batch.len() > 1;
        let tool_names: Vec<String> = pending_batch
            .iter()
            .map(|(_, _, _, call)| {
                if call.name == REQUEST_CAPABILITY {
                    "skill_forge".to_string()
                } else {
                    call.name.clone()
                }
            })
            .collect();

        let (batch_id, ids) = if is_batch {
            let calls: Vec<_> = pending_batch
                .iter()
                .zip(&tool_names)
                .map(|((action, input, details, _call), name)| {
                    (name.clone(), action.clone(), input.clone(), details.clone())
                })
                .collect();
            let (bid, ids) = self.approvals.create_batch(calls);
            (Some(bid), ids)
        } else {
            let (action, input, details, _) = &pending_batch[0];
            let id = self
                .approvals
                .create(tool_names[0].clone(), action.clone(), input.clone(), details.clone());
            (None, vec![id])
        };

        for (id, (_, input, _, call)) in ids.iter().zip(&pending_batch) {
            let tool_name = if call.name == REQUEST_CAPABILITY {
                "skill_forge".to_string()
            } else {
                call.name.clone()
            };
            session.pending_tool_calls.insert(
                id.clone(),
                PendingToolCall {
                    approval_id: id.clone(),
                    tool_call_id: call.id.clone(),
                    tool_name,
                    input: input.clone(),
                },
            );
            let _ = self
                .audit
                .record("approval_requested", json!({"id": id, "batch_id": batch_id}));
        }

        let prompt = if let Some(bid) = &batch_id {
            let tickets: Vec<_> = ids.iter().filter_map(|id| self.approvals.get(id)).collect();
            ApprovalStore::format_batch_request(bid, &tickets)
        } else {
            let ticket = self.approvals.get(&ids[0]).expect("just created");
            ApprovalStore::format_pending_request(&ticket)
        };

        LoopOutcome::PendingApproval {
            batch_id,
            ids,
            prompt,
        }
    }

    async fn build_tool_schemas(&self) -> Vec<ToolSchema> {
        let mut schemas = vec![request_capability_schema()];
        let registry = self.registry.lock().await;
        for def in registry.get_enabled() {
            let parameters = match def.provenance {
                ToolProvenance::Builtin => self
                    .dispatch_ctx
                    .builtins
                    .get(def.name.as_str())
                    .map(|t| t.parameters_schema())
                    .unwrap_or_else(|| json!({})),
                ToolProvenance::Remote => def.remote_schema.clone().unwrap_or_else(|| json!({})),
                ToolProvenance::Dynamic => def.skill_parameters.clone().unwrap_or_else(|| json!({})),
            };
            schemas.push(ToolSchema {
                name: def.name.clone(),
                description: def.description.clone(),
                parameters,
            });
        }
        schemas
    }

    async fn compact_if_needed(&self, session: &mut Session) -> Option<String> {
        if session.estimate_tokens() < self.config.compaction_threshold_tokens {
            return None;
        }
        let n = self.config.compaction_batch.min(session.messages.len());
        if n == 0 {
            return None;
        }

        let excerpt: String = session.messages[..n]
            .iter()
            .map(|m| format!("{:?}: {}", m.role, m.content))
            .collect::<Vec<_>>()
            .join("\n");

        let request = CompletionRequest::new(
            self.config.model.clone(),
            vec![
                LlmMessage::system(
                    "Summarize the following conversation excerpt in 3-5 concise sentences, \
                     preserving important facts and decisions.",
                ),
                LlmMessage::user(excerpt),
            ],
        );

        match self.provider.complete(request).await {
            Ok(response) => {
                session.compact_prefix(n, &response.content);
                Some(format!("[Earlier conversation compacted — {n} messages summarized.]"))
            }
            Err(_) => None,
        }
    }

    fn truncate(&self, text: String) -> String {
        let ceiling = self.config.tool_result_ceiling;
        if text.chars().count() <= ceiling {
            return text;
        }
        let truncated: String = text.chars().take(ceiling).collect();
        format!("{truncated}\n[truncated to {ceiling} chars]")
    }
}

fn request_capability_schema() -> ToolSchema {
    ToolSchema {
        name: REQUEST_CAPABILITY.to_string(),
        description: "Propose a new capability for the owner to review and install as a tool."
            .to_string(),
        parameters: json!({
            "type": "object",
            "properties": {
                "skill_name": { "type": "string" },
                "skill_description": { "type": "string" },
                "reason": { "type": "string" },
                "dangerous": { "type": "boolean" },
                "parameters_schema": { "type": "object" },
                "implementation_code": { "type": "string" }
            },
            "required": ["skill_name", "skill_description", "reason", "dangerous", "parameters_schema", "implementation_code"]
        }),
    }
}

/// Best-effort human target for an approval prompt.
fn guess_target(args: &Value) -> Option<String> {
    for key in ["path", "command", "url", "key"] {
        if let Some(v) = args.get(key).and_then(Value::as_str) {
            return Some(v.to_string());
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::provider::{LLMProvider, Result as AiResult, StreamResponse};
    use crate::ai::types::CompletionResponse;
    use crate::memory::MemoryStore;
    use crate::mcp::McpManager;
    use crate::security::SecretGuard;
    use crate::tools::{BuiltinToolContext, ProcessRegistry};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::tempdir;

    struct ScriptedProvider {
        turns: Vec<CompletionResponse>,
        index: AtomicUsize,
    }

    impl ScriptedProvider {
        fn new(turns: Vec<CompletionResponse>) -> Arc<Self> {
            Arc::new(Self {
                turns,
                index: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl LLMProvider for ScriptedProvider {
        async fn complete(&self, _request: CompletionRequest) -> AiResult<CompletionResponse> {
            let i = self.index.fetch_add(1, Ordering::SeqCst);
            self.turns
                .get(i)
                .cloned()
                .ok_or_else(|| "no more scripted responses".to_string())
        }

        async fn stream(&self, _request: CompletionRequest) -> AiResult<StreamResponse> {
            unimplemented!("not used in these tests")
        }

        fn context_limit(&self) -> usize {
            128_000
        }

        fn supports_tools(&self) -> bool {
            true
        }

        fn provider_name(&self) -> &str {
            "scripted"
        }
    }

    fn text_response(text: &str) -> CompletionResponse {
        CompletionResponse {
            content: text.to_string(),
            model: "scripted".to_string(),
            usage: None,
            finish_reason: Some("stop".to_string()),
            tool_calls: vec![],
        }
    }

    fn tool_call_response(name: &str, arguments: &str) -> CompletionResponse {
        CompletionResponse {
            content: String::new(),
            model: "scripted".to_string(),
            usage: None,
            finish_reason: Some("tool_calls".to_string()),
            tool_calls: vec![ToolCall {
                id: "call-1".to_string(),
                name: name.to_string(),
                arguments: arguments.to_string(),
            }],
        }
    }

    struct Fixture {
        agent: AgentLoop,
        _dir: tempfile::TempDir,
    }

    async fn build_fixture(provider: Arc<dyn LLMProvider>, registry: ToolRegistry) -> Fixture {
        let dir = tempdir().unwrap();
        let workspace = dir.path().join("workspace");
        std::fs::create_dir_all(&workspace).unwrap();
        let secret_guard = Arc::new(SecretGuard::new(dir.path().join("storage")));
        let processes = Arc::new(ProcessRegistry::new(std::time::Duration::from_secs(300)));
        let memory = Arc::new(MemoryStore::load(dir.path().join("memory.json")).await.unwrap());
        let ctx = BuiltinToolContext {
            workspace_root: workspace,
            secret_guard,
            processes,
            memory,
        };
        let builtins: HashMap<&'static str, Arc<dyn crate::tools::Tool>> =
            crate::tools::builtin_tools(&ctx).into_iter().collect();
        let dispatch_ctx = DispatchContext {
            builtins,
            mcp: Arc::new(McpManager::new()),
            skills: Arc::new(SkillsManager::new(dir.path().join("skills"))),
        };
        let skills = dispatch_ctx.skills.clone();
        let agent = AgentLoop::new(
            provider,
            Arc::new(tokio::sync::Mutex::new(registry)),
            dispatch_ctx,
            Arc::new(ApprovalStore::new(std::time::Duration::from_secs(300))),
            Arc::new(AuditLog::new(dir.path().join("audit.jsonl"))),
            skills,
            AgentConfig {
                model: "scripted".to_string(),
                max_history: 200,
                compaction_threshold_tokens: 1_000_000,
                compaction_batch: 20,
                max_loop_depth: 8,
                tool_result_ceiling: 4000,
            },
        );
        Fixture { agent, _dir: dir }
    }

    fn registry_with_read_file_enabled() -> ToolRegistry {
        let mut r = ToolRegistry::new();
        for def in crate::tools::builtin_definitions() {
            r.insert_builtin(def);
        }
        r.enable("read_file");
        r
    }

    #[tokio::test]
    async fn text_only_turn_returns_reply() {
        let provider = ScriptedProvider::new(vec![text_response("Hello, owner.")]);
        let fixture = build_fixture(provider, ToolRegistry::new()).await;
        let mut session = Session::new();
        let outcome = fixture.agent.run(&mut session, "system", "hi").await.unwrap();
        match outcome {
            LoopOutcome::Replied(text) => assert_eq!(text, "Hello, owner."),
            other => panic!("expected Replied, got {other:?}"),
        }
        assert!(session.messages.iter().any(|m| m.role == SessionRole::User));
        assert!(session.messages.iter().any(|m| m.role == SessionRole::Assistant));
    }

    #[tokio::test]
    async fn disabled_tool_call_is_reported_and_loop_continues() {
        let provider = ScriptedProvider::new(vec![
            tool_call_response("write_file", r#"{"path":"a.txt","content":"x"}"#),
            text_response("noted."),
        ]);
        let registry = ToolRegistry::new(); // nothing registered
        let fixture = build_fixture(provider, registry).await;
        let mut session = Session::new();
        let outcome = fixture.agent.run(&mut session, "system", "write a file").await.unwrap();
        match outcome {
            LoopOutcome::Replied(text) => assert_eq!(text, "noted."),
            other => panic!("expected Replied, got {other:?}"),
        }
        assert!(session
            .messages
            .iter()
            .any(|m| m.role == SessionRole::ToolResult && m.content.contains("not enabled")));
    }

    #[tokio::test]
    async fn safe_tool_call_executes_and_loops_back() {
        let dir = tempdir().unwrap();
        let provider = ScriptedProvider::new(vec![
            tool_call_response("read_file", r#"{"path":"hello.txt"}"#),
            text_response("the file says hi"),
        ]);
        let registry = registry_with_read_file_enabled();
        let fixture = build_fixture(provider, registry).await;

        // Point the sandboxed workspace at a dir containing hello.txt by writing
        // straight through the same builtin context used in build_fixture is not
        // exposed here, so this test only exercises the "tool not enabled" and
        // dispatch wiring paths; file content correctness is covered in
        // tools::file_ops's own tests.
        let mut session = Session::new();
        let outcome = fixture.agent.run(&mut session, "system", "read hello.txt").await.unwrap();
        match outcome {
            LoopOutcome::Replied(text) => assert_eq!(text, "the file says hi"),
            other => panic!("expected Replied, got {other:?}"),
        }
        let _ = dir; // keep tempdir alive for documentation purposes above
    }

    #[tokio::test]
    async fn dangerous_tool_call_creates_approval_and_suspends() {
        let provider = ScriptedProvider::new(vec![tool_call_response(
            "write_file",
            r#"{"path":"b.txt","content":"x"}"#,
        )]);
        let mut registry = ToolRegistry::new();
        for def in crate::tools::builtin_definitions() {
            registry.insert_builtin(def);
        }
        registry.enable("write_file");
        let fixture = build_fixture(provider, registry).await;
        let mut session = Session::new();
        let outcome = fixture
            .agent
            .run(&mut session, "system", "write b.txt")
            .await
            .unwrap();
        match outcome {
            LoopOutcome::PendingApproval { ids, batch_id, .. } => {
                assert_eq!(ids.len(), 1);
                assert!(batch_id.is_none());
                assert_eq!(session.pending_tool_calls.len(), 1);
            }
            other => panic!("expected PendingApproval, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn deny_clears_pending_without_calling_provider() {
        let provider = ScriptedProvider::new(vec![tool_call_response(
            "write_file",
            r#"{"path":"b.txt","content":"x"}"#,
        )]);
        let mut registry = ToolRegistry::new();
        for def in crate::tools::builtin_definitions() {
            registry.insert_builtin(def);
        }
        registry.enable("write_file");
        let fixture = build_fixture(provider, registry).await;
        let mut session = Session::new();
        let outcome = fixture
            .agent
            .run(&mut session, "system", "write b.txt")
            .await
            .unwrap();
        let ids = match outcome {
            LoopOutcome::PendingApproval { ids, .. } => ids,
            other => panic!("expected PendingApproval, got {other:?}"),
        };
        let ack = fixture.agent.deny(&mut session, &ids);
        assert!(ack.contains("Denied"));
        assert!(session.pending_tool_calls.is_empty());
    }

    #[tokio::test]
    async fn request_capability_with_empty_name_is_rejected_without_approval() {
        let provider = ScriptedProvider::new(vec![
            tool_call_response(
                REQUEST_CAPABILITY,
                r##"{"skill_name":"","skill_description":"d","reason":"r","dangerous":false,"parameters_schema":{},"implementation_code":"#!/bin/sh\n"}"##,
            ),
            text_response("ok, skipping that."),
        ]);
        let fixture = build_fixture(provider, ToolRegistry::new()).await;
        let mut session = Session::new();
        let outcome = fixture
            .agent
            .run(&mut session, "system", "propose a broken skill")
            .await
            .unwrap();
        match outcome {
            LoopOutcome::Replied(text) => assert_eq!(text, "ok, skipping that."),
            other => panic!("expected Replied, got {other:?}"),
        }
        assert!(session.pending_tool_calls.is_empty());
    }

    #[tokio::test]
    async fn request_capability_with_valid_proposal_suspends_for_approval() {
        let provider = ScriptedProvider::new(vec![tool_call_response(
            REQUEST_CAPABILITY,
            r##"{"skill_name":"Weather Check","skill_description":"checks weather","reason":"useful","dangerous":false,"parameters_schema":{},"implementation_code":"#!/bin/sh\necho sunny\n"}"##,
        )]);
        let fixture = build_fixture(provider, ToolRegistry::new()).await;
        let mut session = Session::new();
        let outcome = fixture
            .agent
            .run(&mut session, "system", "propose a weather skill")
            .await
            .unwrap();
        match outcome {
            LoopOutcome::PendingApproval { ids, prompt, .. } => {
                assert_eq!(ids.len(), 1);
                assert!(prompt.contains("weathercheck"));
            }
            other => panic!("expected PendingApproval, got {other:?}"),
        }
    }
}

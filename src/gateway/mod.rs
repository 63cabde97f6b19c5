//! The gateway finite-state machine: `dormant`, `awake`,
//! `action_pending`, `shutdown`, and the side effects that accompany each
//! transition.
//!
//! One gateway per owner, serial state transitions, and every privileged resource (`ToolRegistry`,
//! `ApprovalStore`, `ProcessRegistry`, `ProviderStore`, `McpManager`,
//! `SkillsManager`) torn down and rebuilt across the dormant/awake boundary
//! rather than served continuously.

use std::sync::Arc;

use serde_json::json;
use tokio::sync::Mutex;

use crate::agent::dispatch::DispatchContext;
use crate::agent::loop_::{AgentConfig, AgentLoop, LoopOutcome};
use crate::approval::ApprovalStore;
use crate::audit::AuditLog;
use crate::commands::{parse, Command};
use crate::config::Config;
use crate::mcp::McpManager;
use crate::memory::MemoryStore;
use crate::security::SecretGuard;
use crate::session::Session;
use crate::skills::{load_prompt_skills, prompt::active_blocks, SkillsManager};
use crate::tools::{builtin_definitions, builtin_tools, BuiltinToolContext, ProcessRegistry, ToolDefinition, ToolRegistry};

/// Fallback model used until the owner overrides it with `/model`.
const DEFAULT_MODEL: &str = "openai/gpt-4o-mini";

const BASE_INSTRUCTION: &str = "You are a single-owner AI gateway with privileged tools. \
Act only on behalf of your owner. Dangerous tool calls require explicit owner confirmation \
before they run; never assume approval.";

/// The four reachable gateway states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GatewayState {
    Dormant,
    Awake,
    ActionPending,
    Shutdown,
}

/// Owns every resource that spans a dormant/awake cycle and drives the
/// state machine. One instance per owner process.
pub struct Gateway {
    config: Arc<Config>,
    state: Mutex<GatewayState>,
    session: Mutex<Option<Session>>,

    providers: Arc<crate::provider_store::ProviderStore>,
    approvals: Arc<ApprovalStore>,
    registry: Arc<Mutex<ToolRegistry>>,
    processes: Arc<ProcessRegistry>,
    audit: Arc<AuditLog>,
    mcp: Arc<McpManager>,
    skills: Arc<SkillsManager>,
    memory: Arc<MemoryStore>,
    secret_guard: Arc<SecretGuard>,

    inactivity_timer: Mutex<Option<tokio::task::JoinHandle<()>>>,
}

impl Gateway {
    /// Construct a fresh, dormant gateway. Does not spawn anything — the
    /// first `wake` drives the rest of the construction below.
    pub async fn new(config: Config) -> std::io::Result<Arc<Self>> {
        let config = Arc::new(config);
        let providers = crate::provider_store::ProviderStore::load(config.auth_path()).await?;
        let memory = MemoryStore::load(config.memory_path()).await?;

        let mut registry = ToolRegistry::new();
        for def in builtin_definitions() {
            registry.insert_builtin(def);
        }

        Ok(Arc::new(Self {
            audit: Arc::new(AuditLog::new(config.audit_path())),
            secret_guard: Arc::new(SecretGuard::new(config.storage_dir.clone())),
            processes: Arc::new(ProcessRegistry::new(config.process_ttl)),
            approvals: Arc::new(ApprovalStore::new(config.approval_timeout)),
            skills: Arc::new(SkillsManager::new(config.skills_dir())),
            mcp: Arc::new(McpManager::new()),
            registry: Arc::new(Mutex::new(registry)),
            providers: Arc::new(providers),
            memory: Arc::new(memory),
            session: Mutex::new(None),
            state: Mutex::new(GatewayState::Dormant),
            inactivity_timer: Mutex::new(None),
            config,
        }))
    }

    pub async fn state(&self) -> GatewayState {
        *self.state.lock().await
    }

    /// Record a message dropped because its sender didn't match the
    /// configured owner id. The transport filters these out before they
    /// ever reach [`Self::handle_owner_message`]; this is the only trace
    /// such a message leaves.
    pub fn record_unknown_sender(&self, sender: Option<&str>) {
        let _ = self.audit.record("auth_rejected", json!({"sender": sender}));
    }

    /// Entry point for a message from the owner's chat channel. Non-owner
    /// senders never reach here — the transport must drop them silently
    /// after calling [`Self::record_unknown_sender`].
    pub async fn handle_owner_message(self: &Arc<Self>, text: &str) -> Option<String> {
        let command = parse(text);
        let state = self.state().await;

        if state == GatewayState::Dormant {
            // A dormant gateway ignores everything but wake/setup.
            return match command {
                Command::Wake => Some(self.wake().await),
                Command::AuthSet { provider, key } => Some(self.auth_set(&provider, &key).await),
                Command::AuthStatus => Some(self.providers.status().await),
                Command::AuthRemove { provider } => Some(self.auth_remove(&provider).await),
                Command::Help => Some(help_text()),
                _ => None,
            };
        }

        if state == GatewayState::Shutdown {
            return None;
        }

        match command {
            Command::Wake => Some("already awake.".to_string()),
            Command::Sleep => Some(self.sleep().await),
            Command::Kill => Some(self.kill().await),

            Command::AuthSet { provider, key } => Some(self.auth_set(&provider, &key).await),
            Command::AuthStatus => Some(self.providers.status().await),
            Command::AuthRemove { provider } => Some(self.auth_remove(&provider).await),

            Command::ModelShow => Some(self.model_show().await),
            Command::ModelList { .. } => Some(self.providers.status().await),
            Command::ModelSet { provider, model } => Some(self.model_set(&provider, &model).await),

            Command::ToolsList => Some(self.tools_list().await),
            Command::Enable { name } => Some(self.toggle_tool(&name, true).await),
            Command::Disable { name } => Some(self.toggle_tool(&name, false).await),

            Command::Confirm { id } => Some(self.confirm(id.as_deref()).await),
            Command::ConfirmAll { batch_id } => Some(self.confirm_all(&batch_id).await),
            Command::Deny { id } => Some(self.deny(id.as_deref()).await),
            Command::DenyAll { batch_id } => Some(self.deny_all(&batch_id).await),

            Command::Status => Some(self.status().await),
            Command::Audit { count } => Some(self.audit_tail(count.unwrap_or(20))),
            Command::AuditVerbose { .. } => Some("audit verbosity toggled.".to_string()),
            Command::Skills => Some(self.skills_list().await),
            Command::Help => Some(help_text()),

            Command::Text(turn) => Some(self.run_turn(&turn).await),
        }
    }

    // ── Lifecycle transitions ──────────────────────────────────

    /// `dormant -> awake` / no-op if already awake.
    async fn wake(self: &Arc<Self>) -> String {
        {
            let mut state = self.state.lock().await;
            if *state != GatewayState::Dormant {
                return "already awake.".to_string();
            }
            *state = GatewayState::Awake;
        }

        *self.session.lock().await = Some(Session::new());
        self.registry.lock().await.disable_all();
        self.registry.lock().await.clear_remote();
        self.arm_inactivity_timer().await;

        let _ = self.audit.record("gateway_woke", json!({}));

        // Fire-and-forget: remote-tool discovery and dynamic-skill
        // re-registration never block the reply to `/wake`.
        let gw = Arc::clone(self);
        tokio::spawn(async move {
            gw.discover_remote_tools().await;
            gw.reload_dynamic_skills().await;
        });

        "awake.".to_string()
    }

    /// `awake|action_pending -> dormant`: stop the timer, clear the session
    /// and every per-wake resource, and return to dormant.
    async fn sleep(self: &Arc<Self>) -> String {
        self.enter_dormant().await;
        "sleeping.".to_string()
    }

    /// `* -> shutdown`: terminal. Like `sleep` but never re-wakeable.
    async fn kill(self: &Arc<Self>) -> String {
        self.enter_dormant().await;
        *self.state.lock().await = GatewayState::Shutdown;
        "shutting down.".to_string()
    }

    async fn enter_dormant(&self) {
        if let Some(handle) = self.inactivity_timer.lock().await.take() {
            handle.abort();
        }
        *self.session.lock().await = None;
        self.registry.lock().await.disable_all();
        self.registry.lock().await.clear_remote();
        self.registry.lock().await.clear_dynamic();
        self.approvals.clear();
        self.processes.dispose().await;
        self.mcp.disconnect_all().await;
        *self.state.lock().await = GatewayState::Dormant;
        let _ = self.audit.record("gateway_slept", json!({}));
    }

    /// Re-arm the one-shot inactivity timeout: after
    /// `config.inactivity_timeout` of silence, transition back to dormant
    /// unless a newer owner interaction already reset the timer — the
    /// timer is cancelled and re-armed on every owner interaction.
    async fn arm_inactivity_timer(self: &Arc<Self>) {
        if let Some(old) = self.inactivity_timer.lock().await.take() {
            old.abort();
        }
        let gw = Arc::clone(self);
        let timeout = self.config.inactivity_timeout;
        let handle = tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            if gw.state().await == GatewayState::Awake {
                gw.enter_dormant().await;
            }
        });
        *self.inactivity_timer.lock().await = Some(handle);
    }

    async fn discover_remote_tools(&self) {
        let configs = match crate::mcp::load_server_configs(&self.config.mcp_servers_path()) {
            Ok(c) => c,
            Err(e) => {
                let _ = self.audit.record("mcp_discovery_failed", json!({"error": e}));
                return;
            }
        };
        if configs.is_empty() {
            return;
        }
        self.mcp.connect_all(configs, &self.registry).await;
        let _ = self.audit.record("mcp_discovery_complete", json!({}));
    }

    async fn reload_dynamic_skills(&self) {
        let Ok(installed) = self.skills.load_all().await else {
            return;
        };
        let mut registry = self.registry.lock().await;
        for skill in installed {
            let tool_name = crate::agent::naming::skill_tool_name(&skill.name);
            registry.register_dynamic(
                ToolDefinition::dynamic(
                    tool_name,
                    skill.description.clone(),
                    skill.dangerous,
                    skill.name.clone(),
                    skill.parameters_schema.clone(),
                ),
                true,
            );
        }
    }

    // ── Auth / model commands ──────────────────────────────────────────────

    async fn auth_set(&self, provider: &str, key: &str) -> String {
        match self.providers.set_credential(provider, key).await {
            Ok(()) => format!("credential stored for '{provider}'."),
            Err(e) => format!("failed to store credential: {e}"),
        }
    }

    async fn auth_remove(&self, provider: &str) -> String {
        match self.providers.remove_credential(provider).await {
            Ok(true) => format!("removed credential for '{provider}'."),
            Ok(false) => format!("no credential stored for '{provider}'."),
            Err(e) => format!("failed to remove credential: {e}"),
        }
    }

    async fn model_show(&self) -> String {
        match self.providers.active().await {
            Some((provider, model)) => format!(
                "active: {provider}/{}",
                model.unwrap_or_else(|| "(provider default)".to_string())
            ),
            None => "no active provider; use /auth <provider> <key>".to_string(),
        }
    }

    async fn model_set(&self, provider: &str, model: &str) -> String {
        match self.providers.set_active(provider, Some(model)).await {
            Ok(()) => format!("active model set to {provider}/{model}."),
            Err(e) => format!("failed to set model: {e}"),
        }
    }

    // ── Tool commands ───────────────────────────────────────────────────────

    async fn tools_list(&self) -> String {
        let registry = self.registry.lock().await;
        let mut lines: Vec<String> = registry
            .iter()
            .map(|d| {
                let marker = if d.status == crate::tools::ToolStatus::Enabled {
                    "* "
                } else {
                    "  "
                };
                let danger = if d.dangerous { " [dangerous]" } else { "" };
                format!("{marker}{}{danger}", d.name)
            })
            .collect();
        lines.sort();
        if lines.is_empty() {
            "No tools registered.".to_string()
        } else {
            lines.join("\n")
        }
    }

    /// `/enable`/`/disable`, including the `mcp:<server>` and
    /// `skill__<name>` bulk/prefixed forms.
    async fn toggle_tool(&self, name: &str, enable: bool) -> String {
        let mut registry = self.registry.lock().await;
        if let Some(server) = name.strip_prefix("mcp:") {
            let count = if enable {
                registry.enable_by_server(server)
            } else {
                registry.disable_by_server(server)
            };
            return format!("{} {count} tool(s) from server '{server}'.", if enable { "enabled" } else { "disabled" });
        }
        let ok = if enable { registry.enable(name) } else { registry.disable(name) };
        if ok {
            format!("{} '{name}'.", if enable { "enabled" } else { "disabled" })
        } else {
            format!("no such tool '{name}'.")
        }
    }

    // ── Permission commands ─────────────────────────────────────────────────

    async fn confirm(self: &Arc<Self>, id: Option<&str>) -> String {
        let Some(id) = id else {
            return self.approvals.format_all_pending();
        };
        self.resolve_ids(&[id.to_string()], true).await
    }

    async fn confirm_all(self: &Arc<Self>, batch_id: &str) -> String {
        let ids: Vec<String> = self.approvals.list_batch(batch_id).into_iter().map(|r| r.id).collect();
        if ids.is_empty() {
            return format!("no pending batch '{batch_id}'.");
        }
        self.resolve_ids(&ids, true).await
    }

    async fn deny(self: &Arc<Self>, id: Option<&str>) -> String {
        let Some(id) = id else {
            return self.approvals.format_all_pending();
        };
        self.resolve_ids(&[id.to_string()], false).await
    }

    async fn deny_all(self: &Arc<Self>, batch_id: &str) -> String {
        let ids: Vec<String> = self.approvals.list_batch(batch_id).into_iter().map(|r| r.id).collect();
        if ids.is_empty() {
            return format!("no pending batch '{batch_id}'.");
        }
        self.resolve_ids(&ids, false).await
    }

    /// Resolve a set of approval ids as confirmed or denied, advancing the
    /// run through the agent loop if this was the last pending batch, and
    /// stepping the gateway back to `awake` once nothing remains pending.
    async fn resolve_ids(self: &Arc<Self>, ids: &[String], approve: bool) -> String {
        if !approve {
            let mut session_guard = self.session.lock().await;
            let Some(session) = session_guard.as_mut() else {
                return "no active session.".to_string();
            };
            let mut denied = Vec::new();
            for id in ids {
                if let Some(pending) = session.pending_tool_calls.remove(id) {
                    self.approvals.deny(id);
                    denied.push(pending.tool_name);
                }
            }
            let empty = session.pending_tool_calls.is_empty();
            drop(session_guard);
            if empty {
                *self.state.lock().await = GatewayState::Awake;
            }
            return if denied.is_empty() {
                "no matching pending approval.".to_string()
            } else {
                format!("denied: {}", denied.join(", "))
            };
        }

        let mut session_guard = self.session.lock().await;
        let Some(session) = session_guard.as_mut() else {
            return "no active session.".to_string();
        };

        let agent_loop = match self.build_agent_loop().await {
            Ok(l) => l,
            Err(e) => return e,
        };
        let system_prompt = self.build_system_prompt().await;
        let reply = match agent_loop.confirm(session, &system_prompt, ids).await {
            Ok(outcome) => self.apply_outcome(outcome).await,
            Err(e) => format!("error resuming run: {e}"),
        };

        if session.pending_tool_calls.is_empty() {
            drop(session_guard);
            *self.state.lock().await = GatewayState::Awake;
        } else {
            drop(session_guard);
            *self.state.lock().await = GatewayState::ActionPending;
        }
        reply
    }

    // ── Info commands ───────────────────────────────────────────────────────

    async fn status(&self) -> String {
        let state = self.state().await;
        let tools = self.registry.lock().await.get_enabled().len();
        let pending = self.approvals.list_pending().len();
        format!(
            "state: {state:?}\nenabled tools: {tools}\npending approvals: {pending}\n{}",
            self.providers.status().await
        )
    }

    fn audit_tail(&self, count: usize) -> String {
        match self.audit.tail(count) {
            Ok(events) if events.is_empty() => "no audit events.".to_string(),
            Ok(events) => events
                .iter()
                .map(|e| format!("{} {} {}", e.timestamp, e.event_type, e.details))
                .collect::<Vec<_>>()
                .join("\n"),
            Err(e) => format!("failed to read audit log: {e}"),
        }
    }

    async fn skills_list(&self) -> String {
        let installed = self.skills.list();
        if installed.is_empty() {
            "no dynamic skills installed.".to_string()
        } else {
            installed
                .iter()
                .map(|s| format!("{} — {}", s.name, s.description))
                .collect::<Vec<_>>()
                .join("\n")
        }
    }

    // ── Agent turn ───────────────────────────────────────────────────────────

    async fn run_turn(self: &Arc<Self>, text: &str) -> String {
        let mut session_guard = self.session.lock().await;
        let Some(session) = session_guard.as_mut() else {
            return "no active session.".to_string();
        };
        session.touch();

        let agent_loop = match self.build_agent_loop().await {
            Ok(l) => l,
            Err(e) => return e,
        };
        let system_prompt = self.build_system_prompt().await;
        let outcome = agent_loop.run(session, &system_prompt, text).await;

        let pending = !session.pending_tool_calls.is_empty();
        drop(session_guard);

        self.arm_inactivity_timer().await;
        *self.state.lock().await = if pending {
            GatewayState::ActionPending
        } else {
            GatewayState::Awake
        };

        match outcome {
            Ok(outcome) => self.apply_outcome(outcome).await,
            Err(e) => format!("run failed: {e}"),
        }
    }

    async fn apply_outcome(&self, outcome: LoopOutcome) -> String {
        match outcome {
            LoopOutcome::Replied(text) => text,
            LoopOutcome::PendingApproval { prompt, .. } => prompt,
        }
    }

    /// Build a fresh [`AgentLoop`] for this turn. Provider instances are
    /// transient, resolved per-turn from [`crate::provider_store::ProviderStore`]
    ///. Fails if no active provider/credential is configured yet.
    async fn build_agent_loop(self: &Arc<Self>) -> Result<AgentLoop, String> {
        let provider = self.providers.resolve().await?;
        let model = self.providers.active_model_or(DEFAULT_MODEL).await;
        Ok(AgentLoop::new(
            provider,
            self.registry.clone(),
            self.dispatch_context(),
            self.approvals.clone(),
            self.audit.clone(),
            self.skills.clone(),
            self.agent_config(model),
        ))
    }

    fn agent_config(&self, model: String) -> AgentConfig {
        AgentConfig {
            model,
            max_history: self.config.max_history,
            compaction_threshold_tokens: self.config.compaction_threshold_tokens,
            compaction_batch: self.config.compaction_batch,
            max_loop_depth: self.config.max_loop_depth,
            tool_result_ceiling: self.config.tool_result_ceiling,
        }
    }

    fn dispatch_context(&self) -> DispatchContext {
        let ctx = BuiltinToolContext {
            workspace_root: self.config.workspace_dir.clone(),
            secret_guard: self.secret_guard.clone(),
            processes: self.processes.clone(),
            memory: self.memory.clone(),
        };
        DispatchContext {
            builtins: builtin_tools(&ctx).into_iter().collect(),
            mcp: self.mcp.clone(),
            skills: self.skills.clone(),
        }
    }

    /// Assemble the base instruction, optional persona (`soul.md`), and any
    /// active prompt skill blocks.
    async fn build_system_prompt(&self) -> String {
        let mut sections = vec![BASE_INSTRUCTION.to_string()];

        if let Ok(persona) = tokio::fs::read_to_string(self.config.soul_path()).await {
            if !persona.trim().is_empty() {
                sections.push(persona);
            }
        }

        let prompt_skills = load_prompt_skills(&self.config.prompt_skills_dir()).await.unwrap_or_default();
        sections.extend(active_blocks(&prompt_skills));

        sections.join("\n\n---\n\n")
    }
}

fn help_text() -> String {
    [
        "Lifecycle: /wake /sleep /kill",
        "Auth: /auth <provider> <key>, /auth status, /auth remove <provider>",
        "Model: /model, /model list [<provider>], /model <provider>/<model>",
        "Tools: /tools, /enable <name>, /disable <name> (mcp:<server>, skill__<name>)",
        "Permissions: /confirm [<id>|all <batchId>], /deny [<id>|all <batchId>]",
        "Info: /status, /audit [n], /audit verbose [on|off], /skills, /help",
    ]
    .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tempfile::tempdir;

    fn test_config(storage: &std::path::Path) -> Config {
        Config {
            owner_id: "owner".to_string(),
            bot_token: "tok".to_string(),
            inactivity_timeout: Duration::from_secs(3600),
            approval_timeout: Duration::from_secs(300),
            storage_dir: storage.to_path_buf(),
            workspace_dir: storage.to_path_buf(),
            max_history: 200,
            compaction_threshold_tokens: 6000,
            compaction_batch: 20,
            max_loop_depth: 8,
            tool_result_ceiling: 4000,
            process_sweep_interval: Duration::from_secs(60),
            process_ttl: Duration::from_secs(600),
            mcp_connect_timeout: Duration::from_secs(10),
        }
    }

    #[tokio::test]
    async fn starts_dormant() {
        let dir = tempdir().unwrap();
        let gw = Gateway::new(test_config(dir.path())).await.unwrap();
        assert_eq!(gw.state().await, GatewayState::Dormant);
    }

    #[tokio::test]
    async fn dormant_ignores_non_wake_commands() {
        let dir = tempdir().unwrap();
        let gw = Gateway::new(test_config(dir.path())).await.unwrap();
        let reply = gw.handle_owner_message("/status").await;
        assert!(reply.is_none());
        assert_eq!(gw.state().await, GatewayState::Dormant);
    }

    #[tokio::test]
    async fn wake_creates_session_and_transitions_to_awake() {
        let dir = tempdir().unwrap();
        let gw = Gateway::new(test_config(dir.path())).await.unwrap();
        let reply = gw.handle_owner_message("/wake").await;
        assert!(reply.is_some());
        assert_eq!(gw.state().await, GatewayState::Awake);
        assert!(gw.session.lock().await.is_some());
    }

    #[tokio::test]
    async fn sleep_clears_session_and_returns_to_dormant() {
        let dir = tempdir().unwrap();
        let gw = Gateway::new(test_config(dir.path())).await.unwrap();
        gw.handle_owner_message("/wake").await;
        gw.handle_owner_message("/sleep").await;
        assert_eq!(gw.state().await, GatewayState::Dormant);
        assert!(gw.session.lock().await.is_none());
    }

    #[tokio::test]
    async fn kill_is_terminal() {
        let dir = tempdir().unwrap();
        let gw = Gateway::new(test_config(dir.path())).await.unwrap();
        gw.handle_owner_message("/wake").await;
        gw.handle_owner_message("/kill").await;
        assert_eq!(gw.state().await, GatewayState::Shutdown);
        let reply = gw.handle_owner_message("/wake").await;
        assert!(reply.is_none());
    }

    #[tokio::test]
    async fn auth_set_in_dormant_is_allowed() {
        let dir = tempdir().unwrap();
        let gw = Gateway::new(test_config(dir.path())).await.unwrap();
        let reply = gw.handle_owner_message("/auth openrouter sk-test").await;
        assert!(reply.unwrap().contains("openrouter"));
        assert_eq!(gw.state().await, GatewayState::Dormant);
    }

    #[tokio::test]
    async fn enable_disable_tool_by_name() {
        let dir = tempdir().unwrap();
        let gw = Gateway::new(test_config(dir.path())).await.unwrap();
        gw.handle_owner_message("/wake").await;
        let reply = gw.handle_owner_message("/enable read_file").await.unwrap();
        assert!(reply.contains("enabled"));
        assert!(gw.registry.lock().await.is_enabled("read_file"));
        gw.handle_owner_message("/disable read_file").await;
        assert!(!gw.registry.lock().await.is_enabled("read_file"));
    }

    #[tokio::test]
    async fn run_turn_without_provider_reports_error() {
        let dir = tempdir().unwrap();
        let gw = Gateway::new(test_config(dir.path())).await.unwrap();
        gw.handle_owner_message("/wake").await;
        let reply = gw.handle_owner_message("hello").await.unwrap();
        assert!(reply.contains("no active provider") || reply.contains("no credential"));
    }
}

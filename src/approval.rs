//! Cross-turn approval tickets for dangerous tool calls.
//!
//! Blocking synchronously inside `agent/loop_.rs::execute_tool_call` and
//! `.await`-ing a oneshot reply won't work here: approval may arrive in a
//! completely different wake cycle, possibly after the owner has gone
//! silent for minutes. So tickets are stored, not awaited, and the agent
//! loop polls `list_pending`/looks up a specific id on its next turn instead
//! of blocking.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalStatus {
    Pending,
    Approved,
    Denied,
    Expired,
}

/// Human-facing detail carried on a ticket.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApprovalDetails {
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
}

impl ApprovalDetails {
    pub fn new(description: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            target: None,
            content: None,
        }
    }

    pub fn with_target(mut self, target: impl Into<String>) -> Self {
        self.target = Some(target.into());
        self
    }

    pub fn with_content(mut self, content: impl Into<String>) -> Self {
        self.content = Some(content.into());
        self
    }
}

/// A single dangerous-tool-call approval ticket.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PermissionRequest {
    pub id: String,
    /// Ties a batch of related requests together for `/confirm all <batchId>`.
    pub batch_id: Option<String>,
    pub tool_name: String,
    pub action: String,
    pub input: serde_json::Value,
    pub details: ApprovalDetails,
    pub created_at: DateTime<Utc>,
    pub status: ApprovalStatus,
}

impl PermissionRequest {
    fn is_expired(&self, now: DateTime<Utc>, timeout: Duration) -> bool {
        self.status == ApprovalStatus::Pending
            && now.signed_duration_since(self.created_at)
                > chrono::Duration::from_std(timeout).unwrap_or(chrono::Duration::zero())
    }
}

/// Owns all in-flight approval tickets for the current wake session.
///
/// Expiry is passive: a ticket's status only flips to `Expired` when it is
/// next read, not via a
/// background timer.
pub struct ApprovalStore {
    timeout: Duration,
    tickets: Mutex<HashMap<String, PermissionRequest>>,
}

impl ApprovalStore {
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            tickets: Mutex::new(HashMap::new()),
        }
    }

    /// Create a new pending ticket and return its id.
    pub fn create(
        &self,
        tool_name: impl Into<String>,
        action: impl Into<String>,
        input: serde_json::Value,
        details: ApprovalDetails,
    ) -> String {
        self.create_in_batch(tool_name, action, input, details, None)
    }

    pub fn create_in_batch(
        &self,
        tool_name: impl Into<String>,
        action: impl Into<String>,
        input: serde_json::Value,
        details: ApprovalDetails,
        batch_id: Option<String>,
    ) -> String {
        let id = Uuid::new_v4().to_string();
        let request = PermissionRequest {
            id: id.clone(),
            batch_id,
            tool_name: tool_name.into(),
            action: action.into(),
            input,
            details,
            created_at: Utc::now(),
            status: ApprovalStatus::Pending,
        };
        self.tickets.lock().unwrap().insert(id.clone(), request);
        id
    }

    /// Create a batch of tickets that share a `batchId`, returning the ids in
    /// the same order as the inputs (`/confirm all`/`/deny all`).
    pub fn create_batch(
        &self,
        calls: Vec<(String, String, serde_json::Value, ApprovalDetails)>,
    ) -> (String, Vec<String>) {
        let batch_id = Uuid::new_v4().to_string();
        let ids = calls
            .into_iter()
            .map(|(name, action, input, details)| {
                self.create_in_batch(name, action, input, details, Some(batch_id.clone()))
            })
            .collect();
        (batch_id, ids)
    }

    fn refresh(&self, request: &mut PermissionRequest) {
        if request.is_expired(Utc::now(), self.timeout) {
            request.status = ApprovalStatus::Expired;
        }
    }

    /// Look up a ticket, lazily expiring it if its window has elapsed.
    pub fn get(&self, id: &str) -> Option<PermissionRequest> {
        let mut tickets = self.tickets.lock().unwrap();
        let request = tickets.get_mut(id)?;
        self.refresh(request);
        Some(request.clone())
    }

    /// Resolves a pending ticket as approved. Returns `None` for an id that's
    /// missing, or whose ticket was already resolved or has since expired —
    /// resolving the same id twice is not idempotent-success, it's absence.
    pub fn approve(&self, id: &str) -> Option<PermissionRequest> {
        let mut tickets = self.tickets.lock().unwrap();
        let request = tickets.get_mut(id)?;
        self.refresh(request);
        if request.status != ApprovalStatus::Pending {
            return None;
        }
        request.status = ApprovalStatus::Approved;
        Some(request.clone())
    }

    /// Resolves a pending ticket as denied. Same absence-on-already-resolved
    /// rule as [`Self::approve`].
    pub fn deny(&self, id: &str) -> Option<PermissionRequest> {
        let mut tickets = self.tickets.lock().unwrap();
        let request = tickets.get_mut(id)?;
        self.refresh(request);
        if request.status != ApprovalStatus::Pending {
            return None;
        }
        request.status = ApprovalStatus::Denied;
        Some(request.clone())
    }

    pub fn approve_batch(&self, batch_id: &str) -> Vec<PermissionRequest> {
        let mut tickets = self.tickets.lock().unwrap();
        tickets
            .values_mut()
            .filter(|r| r.batch_id.as_deref() == Some(batch_id))
            .map(|r| {
                self.refresh(r);
                if r.status == ApprovalStatus::Pending {
                    r.status = ApprovalStatus::Approved;
                }
                r.clone()
            })
            .collect()
    }

    pub fn deny_batch(&self, batch_id: &str) -> Vec<PermissionRequest> {
        let mut tickets = self.tickets.lock().unwrap();
        tickets
            .values_mut()
            .filter(|r| r.batch_id.as_deref() == Some(batch_id))
            .map(|r| {
                self.refresh(r);
                if r.status == ApprovalStatus::Pending {
                    r.status = ApprovalStatus::Denied;
                }
                r.clone()
            })
            .collect()
    }

    /// All tickets still pending, expiring any that should be as a side
    /// effect of this read.
    pub fn list_pending(&self) -> Vec<PermissionRequest> {
        let mut tickets = self.tickets.lock().unwrap();
        for request in tickets.values_mut() {
            self.refresh(request);
        }
        let mut pending: Vec<_> = tickets
            .values()
            .filter(|r| r.status == ApprovalStatus::Pending)
            .cloned()
            .collect();
        pending.sort_by_key(|r| r.created_at);
        pending
    }

    /// List every ticket sharing `batch_id`, lazily expiring first (used by
    /// `/confirm all`/`/deny all` to report what they're about to resolve).
    pub fn list_batch(&self, batch_id: &str) -> Vec<PermissionRequest> {
        let mut tickets = self.tickets.lock().unwrap();
        for request in tickets.values_mut() {
            self.refresh(request);
        }
        let mut batch: Vec<_> = tickets
            .values()
            .filter(|r| r.batch_id.as_deref() == Some(batch_id))
            .cloned()
            .collect();
        batch.sort_by_key(|r| r.created_at);
        batch
    }

    /// Drop all tickets; called when a session ends, since pending tool
    /// calls live only for the session's duration.
    pub fn clear(&self) {
        self.tickets.lock().unwrap().clear();
    }

    /// Render one ticket as a human-readable approval prompt.
    pub fn format_pending_request(request: &PermissionRequest) -> String {
        let mut lines = vec![format!(
            "[{}] {} — {}",
            request.id, request.tool_name, request.details.description
        )];
        if let Some(target) = &request.details.target {
            lines.push(format!("  target: {target}"));
        }
        if let Some(content) = &request.details.content {
            let preview: String = content.chars().take(200).collect();
            let suffix = if content.chars().count() > 200 { "…" } else { "" };
            lines.push(format!("  preview: {preview}{suffix}"));
        }
        lines.push(format!("  reply /confirm {} or /deny {}", request.id, request.id));
        lines.join("\n")
    }

    /// Render a batch as a single prompt (`/confirm all <batchId>`).
    pub fn format_batch_request(batch_id: &str, requests: &[PermissionRequest]) -> String {
        let mut lines = vec![format!("Batch {batch_id} ({} action(s)):", requests.len())];
        for r in requests {
            lines.push(Self::format_pending_request(r));
        }
        lines.push(format!(
            "reply /confirm all {batch_id} or /deny all {batch_id}"
        ));
        lines.join("\n\n")
    }

    /// Render every currently pending ticket (`/status`).
    pub fn format_all_pending(&self) -> String {
        let pending = self.list_pending();
        if pending.is_empty() {
            return "No pending approvals.".to_string();
        }
        pending
            .iter()
            .map(Self::format_pending_request)
            .collect::<Vec<_>>()
            .join("\n\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn create_and_approve() {
        let store = ApprovalStore::new(Duration::from_secs(300));
        let id = store.create(
            "exec_shell",
            "shell_exec",
            json!({"command": "ls"}),
            ApprovalDetails::new("run ls"),
        );
        let approved = store.approve(&id).unwrap();
        assert_eq!(approved.status, ApprovalStatus::Approved);
    }

    #[test]
    fn create_and_deny() {
        let store = ApprovalStore::new(Duration::from_secs(300));
        let id = store.create(
            "write_file",
            "file_write",
            json!({"path": "x"}),
            ApprovalDetails::new("write x").with_target("x"),
        );
        let denied = store.deny(&id).unwrap();
        assert_eq!(denied.status, ApprovalStatus::Denied);
    }

    #[test]
    fn unknown_id_returns_none() {
        let store = ApprovalStore::new(Duration::from_secs(300));
        assert!(store.approve("nonexistent").is_none());
    }

    #[test]
    fn expires_on_read_after_timeout() {
        let store = ApprovalStore::new(Duration::from_millis(0));
        let id = store.create("exec_shell", "shell_exec", json!({}), ApprovalDetails::new("t"));
        std::thread::sleep(Duration::from_millis(5));
        let ticket = store.get(&id).unwrap();
        assert_eq!(ticket.status, ApprovalStatus::Expired);
    }

    #[test]
    fn approving_expired_ticket_is_noop() {
        let store = ApprovalStore::new(Duration::from_millis(0));
        let id = store.create("exec_shell", "shell_exec", json!({}), ApprovalDetails::new("t"));
        std::thread::sleep(Duration::from_millis(5));
        let ticket = store.approve(&id).unwrap();
        assert_eq!(ticket.status, ApprovalStatus::Expired);
    }

    #[test]
    fn batch_approve_affects_only_matching_batch() {
        let store = ApprovalStore::new(Duration::from_secs(300));
        let (batch_id, ids) = store.create_batch(vec![
            ("a".into(), "shell_exec".into(), json!({}), ApprovalDetails::new("a")),
            ("b".into(), "shell_exec".into(), json!({}), ApprovalDetails::new("b")),
        ]);
        let other_id = store.create("c", "shell_exec", json!({}), ApprovalDetails::new("c"));

        let approved = store.approve_batch(&batch_id);
        assert_eq!(approved.len(), 2);
        for id in &ids {
            assert_eq!(store.get(id).unwrap().status, ApprovalStatus::Approved);
        }
        assert_eq!(store.get(&other_id).unwrap().status, ApprovalStatus::Pending);
    }

    #[test]
    fn list_pending_excludes_resolved() {
        let store = ApprovalStore::new(Duration::from_secs(300));
        let id1 = store.create("a", "shell_exec", json!({}), ApprovalDetails::new("a"));
        let id2 = store.create("b", "shell_exec", json!({}), ApprovalDetails::new("b"));
        store.approve(&id1).unwrap();
        let pending = store.list_pending();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id, id2);
    }

    #[test]
    fn clear_removes_all_tickets() {
        let store = ApprovalStore::new(Duration::from_secs(300));
        store.create("a", "shell_exec", json!({}), ApprovalDetails::new("a"));
        store.clear();
        assert!(store.list_pending().is_empty());
    }

    #[test]
    fn list_batch_returns_only_matching_batch() {
        let store = ApprovalStore::new(Duration::from_secs(300));
        let (batch_id, ids) = store.create_batch(vec![
            ("a".into(), "shell_exec".into(), json!({}), ApprovalDetails::new("a")),
            ("b".into(), "shell_exec".into(), json!({}), ApprovalDetails::new("b")),
        ]);
        store.create("c", "shell_exec", json!({}), ApprovalDetails::new("c"));
        let batch = store.list_batch(&batch_id);
        assert_eq!(batch.len(), 2);
        assert!(batch.iter().all(|r| ids.contains(&r.id)));
    }

    #[test]
    fn format_pending_request_includes_target_and_preview() {
        let store = ApprovalStore::new(Duration::from_secs(300));
        let id = store.create(
            "skill_forge",
            "skill_install",
            json!({}),
            ApprovalDetails::new("install skill foo")
                .with_target("foo")
                .with_content("fn main() {}"),
        );
        let ticket = store.get(&id).unwrap();
        let rendered = ApprovalStore::format_pending_request(&ticket);
        assert!(rendered.contains("foo"));
        assert!(rendered.contains("fn main"));
        assert!(rendered.contains(&id));
    }

    #[test]
    fn format_all_pending_reports_none_when_empty() {
        let store = ApprovalStore::new(Duration::from_secs(300));
        assert_eq!(store.format_all_pending(), "No pending approvals.");
    }
}

//! Per-wake conversation transcript.
//!
//! `trim_history`'s orphan-tool-result repair performs the same kind of
//! message-vector surgery as `agent/loop_.rs`'s compaction pass.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A single conversation turn.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: MessageRole,
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_name: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<crate::ai::types::ToolCall>,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::System,
            content: content.into(),
            tool_call_id: None,
            tool_name: None,
            tool_calls: vec![],
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            content: content.into(),
            tool_call_id: None,
            tool_name: None,
            tool_calls: vec![],
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::Assistant,
            content: content.into(),
            tool_call_id: None,
            tool_name: None,
            tool_calls: vec![],
        }
    }

    pub fn assistant_with_tool_calls(
        content: impl Into<String>,
        tool_calls: Vec<crate::ai::types::ToolCall>,
    ) -> Self {
        Self {
            role: MessageRole::Assistant,
            content: content.into(),
            tool_call_id: None,
            tool_name: None,
            tool_calls,
        }
    }

    pub fn tool_result(
        tool_call_id: impl Into<String>,
        tool_name: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            role: MessageRole::ToolResult,
            content: content.into(),
            tool_call_id: Some(tool_call_id.into()),
            tool_name: Some(tool_name.into()),
            tool_calls: vec![],
        }
    }

    /// Translate to the provider-facing wire message: assistant turns keep
    /// their `toolCalls` metadata, tool results are replayed against the
    /// matching `tool_call_id`.
    pub fn to_llm_message(&self) -> crate::ai::types::Message {
        use crate::ai::types::Message as LlmMessage;
        match self.role {
            MessageRole::System => LlmMessage::system(self.content.clone()),
            MessageRole::User => LlmMessage::user(self.content.clone()),
            MessageRole::Assistant => {
                let mut m = LlmMessage::assistant(self.content.clone());
                m.tool_calls = self.tool_calls.clone();
                m
            }
            MessageRole::ToolResult => LlmMessage::tool_result(
                self.tool_call_id.clone().unwrap_or_default(),
                self.content.clone(),
            ),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageRole {
    System,
    User,
    Assistant,
    ToolResult,
}

/// A dangerous tool call awaiting owner approval.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingToolCall {
    pub approval_id: String,
    pub tool_call_id: String,
    pub tool_name: String,
    pub input: serde_json::Value,
}

/// Per-wake conversation state. Created on `wake`, dropped on any
/// transition out of `awake` back to `dormant`/`shutdown`.
#[derive(Debug, Clone)]
pub struct Session {
    pub started_at: DateTime<Utc>,
    pub last_activity_at: DateTime<Utc>,
    pub messages: Vec<Message>,
    /// Keyed by `approvalId`.
    pub pending_tool_calls: HashMap<String, PendingToolCall>,
}

impl Session {
    pub fn new() -> Self {
        let now = Utc::now();
        Self {
            started_at: now,
            last_activity_at: now,
            messages: Vec::new(),
            pending_tool_calls: HashMap::new(),
        }
    }

    pub fn touch(&mut self) {
        self.last_activity_at = Utc::now();
    }

    pub fn push(&mut self, message: Message) {
        self.messages.push(message);
    }

    /// Keep the tail at `max_history`, then drop any leading
    /// `tool_result` messages that lost their preceding assistant turn.
    pub fn trim_history(&mut self, max_history: usize) {
        if self.messages.len() > max_history {
            let excess = self.messages.len() - max_history;
            self.messages.drain(0..excess);
        }
        while matches!(
            self.messages.first().map(|m| m.role),
            Some(MessageRole::ToolResult)
        ) {
            self.messages.remove(0);
        }
    }

    /// `sum(ceil(contentLength/4))`, used only as a threshold trigger for
    /// compaction.
    pub fn estimate_tokens(&self) -> usize {
        self.messages
            .iter()
            .map(|m| m.content.len().div_ceil(4))
            .sum()
    }

    /// Replace the oldest `n` messages with a single synthetic system
    /// summary message.
    pub fn compact_prefix(&mut self, n: usize, summary: &str) {
        let n = n.min(self.messages.len());
        let notice = format!("[Conversation summary — {n} messages compacted]\n\n{summary}");
        self.messages.splice(0..n, [Message::system(notice)]);
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trim_history_keeps_tail() {
        let mut s = Session::new();
        for i in 0..10 {
            s.push(Message::user(format!("msg {i}")));
        }
        s.trim_history(5);
        assert_eq!(s.messages.len(), 5);
        assert_eq!(s.messages[0].content, "msg 5");
    }

    #[test]
    fn trim_history_drops_orphan_tool_results() {
        let mut s = Session::new();
        s.push(Message::tool_result("id1", "shell", "orphaned output"));
        s.push(Message::user("hello"));
        s.trim_history(100);
        assert_eq!(s.messages.len(), 1);
        assert_eq!(s.messages[0].role, MessageRole::User);
    }

    #[test]
    fn trim_history_no_tool_result_at_head_invariant() {
        let mut s = Session::new();
        s.push(Message::assistant_with_tool_calls("", vec![]));
        s.push(Message::tool_result("id1", "shell", "ok"));
        s.trim_history(1);
        assert!(!matches!(
            s.messages.first().map(|m| m.role),
            Some(MessageRole::ToolResult)
        ));
    }

    #[test]
    fn estimate_tokens_sums_ceil_div4() {
        let mut s = Session::new();
        s.push(Message::user("abcd")); // 4 chars -> 1
        s.push(Message::user("abcde")); // 5 chars -> 2
        assert_eq!(s.estimate_tokens(), 3);
    }

    #[test]
    fn to_llm_message_preserves_tool_call_id_on_results() {
        let msg = Message::tool_result("call-1", "read_file", "contents");
        let llm = msg.to_llm_message();
        assert_eq!(llm.role, crate::ai::types::MessageRole::Tool);
        assert_eq!(llm.tool_call_id.as_deref(), Some("call-1"));
        assert_eq!(llm.content, "contents");
    }

    #[test]
    fn compact_prefix_replaces_with_summary() {
        let mut s = Session::new();
        for i in 0..5 {
            s.push(Message::user(format!("msg {i}")));
        }
        s.compact_prefix(3, "summary text");
        assert_eq!(s.messages.len(), 3);
        assert_eq!(s.messages[0].role, MessageRole::System);
        assert!(s.messages[0].content.contains("summary text"));
        assert!(s.messages[0].content.contains("3 messages compacted"));
    }
}

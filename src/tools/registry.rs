//! Catalog of tool definitions across the three provenances.
//!
//! Rather than hold `Arc<dyn Tool>` trait objects directly, this module is
//! pure catalog state (name, description, dangerous flag, enabled/disabled,
//! provenance-specific metadata) with no knowledge of how a tool actually
//! runs; `crate::agent::dispatch` holds the three-way discriminant that
//! executes a call once the registry says it's enabled.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolProvenance {
    Builtin,
    Remote,
    Dynamic,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolStatus {
    Enabled,
    Disabled,
}

/// Catalog entry for one tool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub dangerous: bool,
    pub status: ToolStatus,
    pub provenance: ToolProvenance,
    pub last_enabled_at: Option<DateTime<Utc>>,
    pub last_disabled_at: Option<DateTime<Utc>>,
    pub remote_server: Option<String>,
    pub remote_original_name: Option<String>,
    pub remote_schema: Option<Value>,
    pub skill_name: Option<String>,
    pub skill_parameters: Option<Value>,
}

impl ToolDefinition {
    pub fn builtin(name: impl Into<String>, description: impl Into<String>, dangerous: bool) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            dangerous,
            status: ToolStatus::Disabled,
            provenance: ToolProvenance::Builtin,
            last_enabled_at: None,
            last_disabled_at: None,
            remote_server: None,
            remote_original_name: None,
            remote_schema: None,
            skill_name: None,
            skill_parameters: None,
        }
    }

    pub fn remote(
        name: impl Into<String>,
        description: impl Into<String>,
        dangerous: bool,
        server: impl Into<String>,
        original_name: impl Into<String>,
        schema: Value,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            dangerous,
            status: ToolStatus::Disabled,
            provenance: ToolProvenance::Remote,
            last_enabled_at: None,
            last_disabled_at: None,
            remote_server: Some(server.into()),
            remote_original_name: Some(original_name.into()),
            remote_schema: Some(schema),
            skill_name: None,
            skill_parameters: None,
        }
    }

    pub fn dynamic(
        name: impl Into<String>,
        description: impl Into<String>,
        dangerous: bool,
        skill_name: impl Into<String>,
        parameters: Value,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            dangerous,
            status: ToolStatus::Disabled,
            provenance: ToolProvenance::Dynamic,
            last_enabled_at: None,
            last_disabled_at: None,
            remote_server: None,
            remote_original_name: None,
            remote_schema: None,
            skill_name: Some(skill_name.into()),
            skill_parameters: Some(parameters),
        }
    }
}

/// Name-indexed catalog of [`ToolDefinition`]s.
pub struct ToolRegistry {
    definitions: HashMap<String, ToolDefinition>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            definitions: HashMap::new(),
        }
    }

    /// Insert a builtin definition at construction time. All builtins start
    /// `disabled`.
    pub fn insert_builtin(&mut self, def: ToolDefinition) {
        debug_assert_eq!(def.provenance, ToolProvenance::Builtin);
        self.definitions.insert(def.name.clone(), def);
    }

    pub fn enable(&mut self, name: &str) -> bool {
        match self.definitions.get_mut(name) {
            Some(def) => {
                def.status = ToolStatus::Enabled;
                def.last_enabled_at = Some(Utc::now());
                true
            }
            None => false,
        }
    }

    pub fn disable(&mut self, name: &str) -> bool {
        match self.definitions.get_mut(name) {
            Some(def) => {
                def.status = ToolStatus::Disabled;
                def.last_disabled_at = Some(Utc::now());
                true
            }
            None => false,
        }
    }

    pub fn disable_all(&mut self) {
        let now = Utc::now();
        for def in self.definitions.values_mut() {
            def.status = ToolStatus::Disabled;
            def.last_disabled_at = Some(now);
        }
    }

    pub fn enable_by_server(&mut self, server: &str) -> usize {
        let now = Utc::now();
        let mut count = 0;
        for def in self.definitions.values_mut() {
            if def.remote_server.as_deref() == Some(server) {
                def.status = ToolStatus::Enabled;
                def.last_enabled_at = Some(now);
                count += 1;
            }
        }
        count
    }

    pub fn disable_by_server(&mut self, server: &str) -> usize {
        let now = Utc::now();
        let mut count = 0;
        for def in self.definitions.values_mut() {
            if def.remote_server.as_deref() == Some(server) {
                def.status = ToolStatus::Disabled;
                def.last_disabled_at = Some(now);
                count += 1;
            }
        }
        count
    }

    /// Register or replace a remote tool definition (re-announcement on MCP
    /// reconnect replaces the prior definition).
    pub fn register_remote(&mut self, def: ToolDefinition) {
        debug_assert_eq!(def.provenance, ToolProvenance::Remote);
        self.definitions.insert(def.name.clone(), def);
    }

    pub fn clear_remote(&mut self) {
        self.definitions
            .retain(|_, def| def.provenance != ToolProvenance::Remote);
    }

    pub fn register_dynamic(&mut self, mut def: ToolDefinition, enabled: bool) {
        debug_assert_eq!(def.provenance, ToolProvenance::Dynamic);
        def.status = if enabled {
            ToolStatus::Enabled
        } else {
            ToolStatus::Disabled
        };
        self.definitions.insert(def.name.clone(), def);
    }

    pub fn clear_dynamic(&mut self) {
        self.definitions
            .retain(|_, def| def.provenance != ToolProvenance::Dynamic);
    }

    pub fn get(&self, name: &str) -> Option<&ToolDefinition> {
        self.definitions.get(name)
    }

    pub fn get_enabled(&self) -> Vec<&ToolDefinition> {
        self.definitions
            .values()
            .filter(|d| d.status == ToolStatus::Enabled)
            .collect()
    }

    pub fn is_dangerous(&self, name: &str) -> bool {
        self.definitions.get(name).map(|d| d.dangerous).unwrap_or(true)
    }

    pub fn is_enabled(&self, name: &str) -> bool {
        self.definitions
            .get(name)
            .map(|d| d.status == ToolStatus::Enabled)
            .unwrap_or(false)
    }

    pub fn len(&self) -> usize {
        self.definitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ToolDefinition> {
        self.definitions.values()
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

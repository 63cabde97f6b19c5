//! ProviderStore: persisted credential set and active-provider selection.
//!
//! Uses a read-file-or-generate-and-write load-or-create shape (restricting
//! permissions on unix once written), and `ai::providers::{ProviderType,
//! create_provider}` for turning a stored credential into a live
//! [`LLMProvider`]. Unlike a single bearer token kept for one purpose, this
//! keeps a small map because the owner may hold keys for more than one
//! provider and switch between them with `/model`.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::ai::provider::LLMProvider;
use crate::ai::providers::{create_provider, ProviderType};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct ProviderStoreState {
    active_provider: Option<String>,
    active_model: Option<String>,
    providers: HashMap<String, String>,
}

/// Owns the owner's provider credentials and active provider/model selection.
/// Persisted as a whole on every mutation.
pub struct ProviderStore {
    path: PathBuf,
    state: Mutex<ProviderStoreState>,
}

impl ProviderStore {
    /// Load `path` if it exists, starting with no credentials otherwise.
    pub async fn load(path: PathBuf) -> std::io::Result<Self> {
        let state = match tokio::fs::read_to_string(&path).await {
            Ok(raw) => serde_json::from_str(&raw).unwrap_or_default(),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => ProviderStoreState::default(),
            Err(e) => return Err(e),
        };
        Ok(Self {
            path,
            state: Mutex::new(state),
        })
    }

    async fn persist(&self, state: &ProviderStoreState) -> std::io::Result<()> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let raw = serde_json::to_string_pretty(state).unwrap_or_else(|_| "{}".to_string());
        tokio::fs::write(&self.path, raw).await?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mut perms = tokio::fs::metadata(&self.path).await?.permissions();
            perms.set_mode(0o600);
            tokio::fs::set_permissions(&self.path, perms).await?;
        }
        Ok(())
    }

    /// Store a credential for `provider`. If no provider is currently
    /// active, this one becomes active (with its default model unset —
    /// the provider's built-in default is used until `/model` overrides it).
    pub async fn set_credential(&self, provider: &str, api_key: &str) -> std::io::Result<()> {
        let mut state = self.state.lock().await;
        state.providers.insert(provider.to_string(), api_key.to_string());
        if state.active_provider.is_none() {
            state.active_provider = Some(provider.to_string());
        }
        self.persist(&state).await
    }

    /// Remove a provider's credential. Removing the
    /// active provider rolls over to an arbitrary remaining one, or unsets
    /// both if none remain.
    pub async fn remove_credential(&self, provider: &str) -> std::io::Result<bool> {
        let mut state = self.state.lock().await;
        let existed = state.providers.remove(provider).is_some();
        if existed && state.active_provider.as_deref() == Some(provider) {
            state.active_provider = state.providers.keys().next().cloned();
            state.active_model = None;
        }
        if existed {
            self.persist(&state).await?;
        }
        Ok(existed)
    }

    /// Set the active provider (and optionally model). Fails if no
    /// credential is stored for that provider.
    pub async fn set_active(&self, provider: &str, model: Option<&str>) -> Result<(), String> {
        let mut state = self.state.lock().await;
        if !state.providers.contains_key(provider) {
            return Err(format!("no credential stored for provider '{provider}'"));
        }
        state.active_provider = Some(provider.to_string());
        state.active_model = model.map(str::to_string);
        self.persist(&state).await.map_err(|e| e.to_string())
    }

    /// The active `(provider, model)` pair, if any. `model` is `None` when
    /// the owner hasn't overridden the provider's built-in default.
    pub async fn active(&self) -> Option<(String, Option<String>)> {
        let state = self.state.lock().await;
        state
            .active_provider
            .clone()
            .map(|p| (p, state.active_model.clone()))
    }

    /// Human-readable rendering for `/auth status` and `/status`.
    pub async fn status(&self) -> String {
        let state = self.state.lock().await;
        if state.providers.is_empty() {
            return "No providers configured.".to_string();
        }
        let mut lines = Vec::new();
        let mut names: Vec<&String> = state.providers.keys().collect();
        names.sort();
        for name in names {
            let marker = if state.active_provider.as_deref() == Some(name) {
                "* "
            } else {
                "  "
            };
            lines.push(format!("{marker}{name}"));
        }
        if let Some(model) = &state.active_model {
            lines.push(format!("active model override: {model}"));
        }
        lines.join("\n")
    }

    /// Resolve a live provider instance from the active credential.
    /// Provider instances are transient, resolved fresh per turn rather
    /// than cached.
    pub async fn resolve(&self) -> Result<Arc<dyn LLMProvider>, String> {
        let state = self.state.lock().await;
        let active = state
            .active_provider
            .as_ref()
            .ok_or_else(|| "no active provider; use /auth <provider> <key>".to_string())?;
        let api_key = state
            .providers
            .get(active)
            .ok_or_else(|| format!("no credential stored for active provider '{active}'"))?;
        let provider_type = ProviderType::from_id(active)
            .ok_or_else(|| format!("unknown provider id '{active}'"))?;
        create_provider(provider_type, api_key, None, state.active_model.as_deref())
    }

    /// Resolve the model name the next turn should use, falling back to a
    /// provider-appropriate default when the owner hasn't overridden it.
    pub async fn active_model_or(&self, default: &str) -> String {
        let state = self.state.lock().await;
        state.active_model.clone().unwrap_or_else(|| default.to_string())
    }
}

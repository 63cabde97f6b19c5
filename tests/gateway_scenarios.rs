//! Black-box checks driven purely through `safeclaw`'s public API, as an
//! external consumer would use it — no access to private fields or
//! `#[cfg(test)]`-only helpers.

use std::time::Duration;

use safeclaw::audit::AuditLog;
use safeclaw::config::Config;
use safeclaw::gateway::{Gateway, GatewayState};
use safeclaw::tools::{ToolDefinition, ToolProvenance, ToolRegistry};

fn config(storage: &std::path::Path) -> Config {
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

/// Dormant drop (scenario 1): a gateway that was never woken ignores a
/// plain-text message outright, and the silence leaves no audit trail —
/// only `/wake` itself gets recorded.
#[tokio::test]
async fn dormant_gateway_drops_messages_and_leaves_no_audit_trail() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = config(dir.path());
    let audit_path = cfg.audit_path();
    let gw = Gateway::new(cfg).await.unwrap();

    assert!(gw.handle_owner_message("anything at all").await.is_none());
    assert_eq!(gw.state().await, GatewayState::Dormant);
    assert!(!audit_path.exists(), "a dropped message must not touch the audit log");

    let reply = gw.handle_owner_message("/wake").await;
    assert!(reply.is_some());
    assert_eq!(gw.state().await, GatewayState::Awake);

    let events = AuditLog::new(audit_path).tail(20).unwrap();
    assert!(events.iter().any(|e| e.event_type == "gateway_woke"));
}

/// The full wake -> enable -> sleep cycle, read back entirely through the
/// audit log on disk rather than through any in-process state the gateway
/// happens to expose — proves the persisted trail matches the transitions
/// an owner actually drove.
#[tokio::test]
async fn wake_then_sleep_round_trip_is_durably_audited() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = config(dir.path());
    let audit_path = cfg.audit_path();
    let gw = Gateway::new(cfg).await.unwrap();

    gw.handle_owner_message("/wake").await;
    let enabled = gw.handle_owner_message("/enable read_file").await.unwrap();
    assert!(enabled.contains("read_file"));

    let tools_reply = gw.handle_owner_message("/tools").await.unwrap();
    assert!(tools_reply.contains("* read_file"), "enabled tool should carry the '*' marker: {tools_reply}");

    gw.handle_owner_message("/sleep").await;
    assert_eq!(gw.state().await, GatewayState::Dormant);

    // Sleeping resets the registry: a subsequent wake starts every tool
    // disabled again, matching the audited history below.
    gw.handle_owner_message("/wake").await;
    let tools_after_rewake = gw.handle_owner_message("/tools").await.unwrap();
    assert!(!tools_after_rewake.contains("* read_file"), "tool should be disabled again after a sleep/wake cycle: {tools_after_rewake}");

    let events = AuditLog::new(audit_path).tail(20).unwrap();
    let types: Vec<&str> = events.iter().map(|e| e.event_type.as_str()).collect();
    assert_eq!(types.iter().filter(|t| **t == "gateway_woke").count(), 2);
    assert_eq!(types.iter().filter(|t| **t == "gateway_slept").count(), 1);
}

/// `/kill` is terminal: once shutdown, the gateway never answers again, not
/// even to `/wake` — distinct from `/sleep`, which always leaves it
/// re-wakeable.
#[tokio::test]
async fn kill_is_terminal_and_unrecoverable() {
    let dir = tempfile::tempdir().unwrap();
    let gw = Gateway::new(config(dir.path())).await.unwrap();

    gw.handle_owner_message("/wake").await;
    let reply = gw.handle_owner_message("/kill").await;
    assert!(reply.is_some());
    assert_eq!(gw.state().await, GatewayState::Shutdown);

    for msg in ["/wake", "hello", "/status"] {
        assert!(gw.handle_owner_message(msg).await.is_none(), "{msg} should get no reply once killed");
    }
}

/// A message from a sender who isn't the configured owner never reaches
/// `handle_owner_message` — the transport filters it — but the drop still
/// leaves exactly one `auth_rejected` audit event, never a reply.
#[tokio::test]
async fn unknown_sender_is_audited_but_never_answered() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = config(dir.path());
    let audit_path = cfg.audit_path();
    let gw = Gateway::new(cfg).await.unwrap();

    gw.record_unknown_sender(Some("stranger"));

    let events = AuditLog::new(audit_path).tail(20).unwrap();
    let rejected: Vec<_> = events.iter().filter(|e| e.event_type == "auth_rejected").collect();
    assert_eq!(rejected.len(), 1);
    assert_eq!(rejected[0].details.get("sender").and_then(|v| v.as_str()), Some("stranger"));
}

/// `ToolRegistry` as an external consumer sees it: a dynamically-installed
/// skill tool starts disabled, can be enabled, and `clear_dynamic` (what the
/// gateway calls on every sleep/kill) removes it outright rather than just
/// disabling it — unlike builtins, which survive a sleep cycle disabled but
/// present.
#[test]
fn dynamic_tools_do_not_survive_a_registry_reset() {
    let mut registry = ToolRegistry::new();
    registry.insert_builtin(ToolDefinition::builtin("read_file", "read a file", false));
    registry.register_dynamic(
        ToolDefinition::dynamic("weather_lookup", "look up weather", false, "weather-skill", serde_json::json!({})),
        true,
    );

    assert!(registry.is_enabled("weather_lookup"));
    assert_eq!(registry.get("weather_lookup").unwrap().provenance, ToolProvenance::Dynamic);

    registry.disable_all();
    registry.clear_dynamic();

    assert!(registry.get("weather_lookup").is_none());
    assert!(registry.get("read_file").is_some());
    assert!(!registry.is_enabled("read_file"));
}

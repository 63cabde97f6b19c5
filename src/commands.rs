//! Owner command-surface parser.
//!
//! Parsing is kept separate from execution: [`parse`] turns the owner's raw
//! text into a [`Command`], and [`crate::gateway`] is the only place that
//! interprets one — a clean split between "what was asked for" and "what
//! happens as a result."

/// A parsed owner command. `text` is anything that isn't a recognized
/// `/`-prefixed command and should be handed to the agent loop as a turn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Wake,
    Sleep,
    Kill,

    AuthSet { provider: String, key: String },
    AuthStatus,
    AuthRemove { provider: String },

    ModelShow,
    ModelList { provider: Option<String> },
    ModelSet { provider: String, model: String },

    ToolsList,
    Enable { name: String },
    Disable { name: String },

    Confirm { id: Option<String> },
    ConfirmAll { batch_id: String },
    Deny { id: Option<String> },
    DenyAll { batch_id: String },

    Status,
    Audit { count: Option<usize> },
    AuditVerbose { on: Option<bool> },
    Skills,
    Help,

    /// Not a recognized `/`-command; free text for the agent loop.
    Text(String),
}

/// Parse a single line of owner input into a [`Command`].
///
/// Unrecognized `/word` input falls back to `Command::Text` rather than an
/// error — there is no "unknown command" error category, and the agent
/// loop is free to tell the owner it didn't understand.
pub fn parse(input: &str) -> Command {
    let trimmed = input.trim();
    if !trimmed.starts_with('/') {
        return Command::Text(input.to_string());
    }

    let mut parts = trimmed.splitn(2, char::is_whitespace);
    let head = parts.next().unwrap_or("");
    let rest = parts.next().unwrap_or("").trim();

    match head {
        "/wake" => Command::Wake,
        "/sleep" => Command::Sleep,
        "/kill" => Command::Kill,

        "/auth" => parse_auth(rest, input),
        "/model" => parse_model(rest, input),

        "/tools" => Command::ToolsList,
        "/enable" => name_arg(rest, input, |name| Command::Enable { name }),
        "/disable" => name_arg(rest, input, |name| Command::Disable { name }),

        "/confirm" => parse_confirm_like(rest, |id| Command::Confirm { id }, Command::ConfirmAll),
        "/deny" => parse_confirm_like(rest, |id| Command::Deny { id }, Command::DenyAll),

        "/status" => Command::Status,
        "/audit" => parse_audit(rest),
        "/skills" => Command::Skills,
        "/help" => Command::Help,

        _ => Command::Text(input.to_string()),
    }
}

fn name_arg(rest: &str, original: &str, build: impl FnOnce(String) -> Command) -> Command {
    if rest.is_empty() {
        Command::Text(original.to_string())
    } else {
        build(rest.to_string())
    }
}

fn parse_auth(rest: &str, original: &str) -> Command {
    if rest == "status" {
        return Command::AuthStatus;
    }
    if let Some(provider) = rest.strip_prefix("remove").map(str::trim) {
        if !provider.is_empty() {
            return Command::AuthRemove {
                provider: provider.to_string(),
            };
        }
    }
    let mut it = rest.splitn(2, char::is_whitespace);
    match (it.next(), it.next()) {
        (Some(provider), Some(key)) if !provider.is_empty() && !key.trim().is_empty() => {
            Command::AuthSet {
                provider: provider.to_string(),
                key: key.trim().to_string(),
            }
        }
        _ => Command::Text(original.to_string()),
    }
}

fn parse_model(rest: &str, original: &str) -> Command {
    if rest.is_empty() {
        return Command::ModelShow;
    }
    if rest == "list" {
        return Command::ModelList { provider: None };
    }
    if let Some(provider) = rest.strip_prefix("list").map(str::trim) {
        if !provider.is_empty() {
            return Command::ModelList {
                provider: Some(provider.to_string()),
            };
        }
    }
    match rest.split_once('/') {
        Some((provider, model)) if !provider.is_empty() && !model.is_empty() => Command::ModelSet {
            provider: provider.to_string(),
            model: model.to_string(),
        },
        _ => Command::Text(original.to_string()),
    }
}

fn parse_confirm_like(
    rest: &str,
    single: impl FnOnce(Option<String>) -> Command,
    all: impl FnOnce(String) -> Command,
) -> Command {
    if rest.is_empty() {
        return single(None);
    }
    if let Some(batch_id) = rest.strip_prefix("all").map(str::trim) {
        if !batch_id.is_empty() {
            return all(batch_id.to_string());
        }
    }
    single(Some(rest.to_string()))
}

fn parse_audit(rest: &str) -> Command {
    if rest.is_empty() {
        return Command::Audit { count: None };
    }
    if let Some(flag) = rest.strip_prefix("verbose").map(str::trim) {
        return Command::AuditVerbose {
            on: match flag {
                "on" => Some(true),
                "off" => Some(false),
                _ => None,
            },
        };
    }
    Command::Audit {
        count: rest.parse().ok(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lifecycle_commands() {
        assert_eq!(parse("/wake"), Command::Wake);
        assert_eq!(parse("/sleep"), Command::Sleep);
        assert_eq!(parse("/kill"), Command::Kill);
    }

    #[test]
    fn free_text_passes_through() {
        assert_eq!(parse("hello there"), Command::Text("hello there".to_string()));
    }

    #[test]
    fn auth_set_and_status_and_remove() {
        assert_eq!(
            parse("/auth openrouter sk-abc123"),
            Command::AuthSet {
                provider: "openrouter".to_string(),
                key: "sk-abc123".to_string()
            }
        );
        assert_eq!(parse("/auth status"), Command::AuthStatus);
        assert_eq!(
            parse("/auth remove openrouter"),
            Command::AuthRemove {
                provider: "openrouter".to_string()
            }
        );
    }

    #[test]
    fn model_variants() {
        assert_eq!(parse("/model"), Command::ModelShow);
        assert_eq!(parse("/model list"), Command::ModelList { provider: None });
        assert_eq!(
            parse("/model list openrouter"),
            Command::ModelList {
                provider: Some("openrouter".to_string())
            }
        );
        assert_eq!(
            parse("/model openrouter/gpt-4o"),
            Command::ModelSet {
                provider: "openrouter".to_string(),
                model: "gpt-4o".to_string()
            }
        );
    }

    #[test]
    fn enable_disable_with_mcp_and_skill_prefixes() {
        assert_eq!(
            parse("/enable mcp:github"),
            Command::Enable {
                name: "mcp:github".to_string()
            }
        );
        assert_eq!(
            parse("/disable skill__deploy"),
            Command::Disable {
                name: "skill__deploy".to_string()
            }
        );
    }

    #[test]
    fn confirm_and_deny_variants() {
        assert_eq!(parse("/confirm"), Command::Confirm { id: None });
        assert_eq!(
            parse("/confirm abc123"),
            Command::Confirm {
                id: Some("abc123".to_string())
            }
        );
        assert_eq!(
            parse("/confirm all batch-1"),
            Command::ConfirmAll {
                batch_id: "batch-1".to_string()
            }
        );
        assert_eq!(parse("/deny"), Command::Deny { id: None });
        assert_eq!(
            parse("/deny all batch-2"),
            Command::DenyAll {
                batch_id: "batch-2".to_string()
            }
        );
    }

    #[test]
    fn audit_variants() {
        assert_eq!(parse("/audit"), Command::Audit { count: None });
        assert_eq!(parse("/audit 20"), Command::Audit { count: Some(20) });
        assert_eq!(
            parse("/audit verbose on"),
            Command::AuditVerbose { on: Some(true) }
        );
        assert_eq!(
            parse("/audit verbose off"),
            Command::AuditVerbose { on: Some(false) }
        );
    }

    #[test]
    fn info_commands() {
        assert_eq!(parse("/status"), Command::Status);
        assert_eq!(parse("/skills"), Command::Skills);
        assert_eq!(parse("/help"), Command::Help);
    }

    #[test]
    fn malformed_auth_falls_back_to_text() {
        assert_eq!(parse("/auth"), Command::Text("/auth".to_string()));
    }
}

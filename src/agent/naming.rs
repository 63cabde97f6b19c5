//! Tool-naming scheme resolution.
//!
//! Builtin names are used as-is as map keys (see [`crate::tools::builtin_tools`]).
//! Remote and dynamic tools are built from a server/skill name plus a suffix;
//! this module owns the construction and sanitization rules both the MCP
//! client and the skills manager need so the two stay consistent.

/// Replace every non-alphanumeric byte with `_`.
fn sanitize_segment(s: &str) -> String {
    s.chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect()
}

/// `mcp__<server>__<tool>`.
pub fn mcp_tool_name(server: &str, tool: &str) -> String {
    format!("mcp__{}__{}", sanitize_segment(server), sanitize_segment(tool))
}

/// `skill__<name>`. `name` must already be
/// sanitized via [`sanitize_skill_name`].
pub fn skill_tool_name(name: &str) -> String {
    format!("skill__{name}")
}

/// Lowercase and keep only `[a-z0-9_]`, dropping everything else.
/// Unlike [`sanitize_segment`], disallowed characters are removed
/// rather than replaced, since a skill name is a persisted file stem.
pub fn sanitize_skill_name(raw: &str) -> String {
    raw.to_lowercase()
        .chars()
        .filter(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || *c == '_')
        .collect()
}

/// The meta-tool schema name, always present.
pub const REQUEST_CAPABILITY: &str = "request_capability";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mcp_tool_name_sanitizes_both_segments() {
        assert_eq!(mcp_tool_name("my server!", "do-thing"), "mcp__my_server___do_thing");
    }

    #[test]
    fn skill_tool_name_prefixes() {
        assert_eq!(skill_tool_name("weather"), "skill__weather");
    }

    #[test]
    fn sanitize_skill_name_strips_disallowed_chars() {
        assert_eq!(sanitize_skill_name("Weather Fetch!"), "weatherfetch");
        assert_eq!(sanitize_skill_name("my_skill-2"), "my_skill2");
    }
}

//! Prompt skills: markdown blocks with front-matter, merged into the base
//! system prompt when their declared binaries are present (glossary
//! "Prompt skill", loaded from `prompt-skills/*.md`).
//!
//! Grounded on `skills/types.rs`'s `SkillDefinition` YAML frontmatter and
//! `skills/loader.rs::parse_skill_content`, trimmed of the composition,
//! inheritance, and LLM-based selection machinery those modules carry —
//! this gateway has no skill-selection step; every prompt skill whose
//! binaries are present is simply appended.

use std::path::{Path, PathBuf};

use serde::Deserialize;

/// Front-matter declared at the top of a `prompt-skills/*.md` file.
#[derive(Debug, Deserialize)]
struct PromptSkillFrontmatter {
    name: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    requires: Vec<String>,
    #[serde(default)]
    optional: Vec<String>,
}

/// One loaded prompt skill.
#[derive(Debug, Clone)]
pub struct PromptSkill {
    pub name: String,
    pub description: String,
    pub required_binaries: Vec<String>,
    pub optional_binaries: Vec<String>,
    pub content: String,
}

impl PromptSkill {
    /// Whether every required binary resolves on `PATH` (optional binaries
    /// never block activation, they just may go unused by the block's text).
    pub fn is_available(&self) -> bool {
        self.required_binaries.iter().all(|bin| which::which(bin).is_ok())
    }

    /// Render as the labelled block the agent loop appends to the base
    /// prompt.
    pub fn as_block(&self) -> String {
        format!("## {}\n{}", self.name, self.content)
    }
}

fn parse_skill_file(raw: &str) -> Result<PromptSkill, String> {
    let rest = raw
        .strip_prefix("---\n")
        .ok_or("prompt skill file must start with YAML frontmatter (---)")?;
    let end = rest.find("\n---").ok_or("missing closing --- for YAML frontmatter")?;
    let (yaml, body) = rest.split_at(end);
    let body = body.trim_start_matches("\n---").trim_start_matches('\n');

    let frontmatter: PromptSkillFrontmatter =
        serde_yaml::from_str(yaml).map_err(|e| format!("invalid prompt skill frontmatter: {e}"))?;

    Ok(PromptSkill {
        name: frontmatter.name,
        description: frontmatter.description,
        required_binaries: frontmatter.requires,
        optional_binaries: frontmatter.optional,
        content: body.to_string(),
    })
}

/// Load every `*.md` file directly under `dir`. A missing directory yields
/// an empty set — prompt skills are entirely optional.
pub async fn load_all(dir: &Path) -> std::io::Result<Vec<PromptSkill>> {
    if !dir.exists() {
        return Ok(Vec::new());
    }
    let mut entries = tokio::fs::read_dir(dir).await?;
    let mut skills = Vec::new();
    let mut paths: Vec<PathBuf> = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) == Some("md") {
            paths.push(path);
        }
    }
    paths.sort();
    for path in paths {
        let content = tokio::fs::read_to_string(&path).await?;
        match parse_skill_file(&content) {
            Ok(skill) => skills.push(skill),
            Err(e) => tracing::warn!(path = %path.display(), error = %e, "skipping malformed prompt skill"),
        }
    }
    Ok(skills)
}

/// Labelled blocks for every skill whose required binaries are all present,
/// in file order.
pub fn active_blocks(skills: &[PromptSkill]) -> Vec<String> {
    skills.iter().filter(|s| s.is_available()).map(PromptSkill::as_block).collect()
}

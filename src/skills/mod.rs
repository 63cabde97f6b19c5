//! Skills: dynamic (model-proposed, approval-gated tools) and prompt
//! (static markdown blocks merged into the system prompt), distinct from
//! a "Prompt skill".
//!
//! A much larger skill engine — LLM-driven selection among a curated
//! library, composition modes, inheritance, a generic application adapter —
//! isn't needed here: this gateway has exactly two skill kinds and no
//! selection step (every enabled dynamic skill and every prompt skill whose
//! binaries are present is simply available).

pub mod manager;
pub mod prompt;

pub use manager::{DynamicSkill, SkillInstallError, SkillsManager};
pub use prompt::{load_all as load_prompt_skills, PromptSkill};

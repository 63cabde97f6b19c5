//! Agent Intelligence Layer — the core reasoning loop and related utilities.
//!
//! # Key types
//! - [`AgentLoop`] — drives the turn loop: prompt, dispatch, suspend-on-approval
//! - [`AgentConfig`] — tunables for the loop (model, compaction, loop depth)
//! - [`LoopOutcome`] — a finished reply or a suspended batch of approvals
//! - [`DispatchContext`]/[`dispatch_tool_call`] — routes a call by provenance
//!
pub mod dispatch;
pub mod loop_;
pub mod naming;

pub use dispatch::{dispatch as dispatch_tool_call, DispatchContext};
pub use loop_::{AgentConfig, AgentLoop, LoopOutcome};

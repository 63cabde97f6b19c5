//! Flat key/value memory subsystem: `memory.json` under the
//! storage directory, exposed through four agent tools.
//!
//! No chunking, embeddings, or recall-ranked search here: this gateway's
//! memory tool has no recall query, only exact-key read/write/list/delete.
//!
//! # Agent tools
//! - [`tools::MemoryReadTool`]   — `memory_read`
//! - [`tools::MemoryWriteTool`]  — `memory_write`
//! - [`tools::MemoryListTool`]   — `memory_list`
//! - [`tools::MemoryDeleteTool`] — `memory_delete`

pub mod store;
pub mod tools;

pub use store::MemoryStore;
pub use tools::{MemoryDeleteTool, MemoryListTool, MemoryReadTool, MemoryWriteTool};

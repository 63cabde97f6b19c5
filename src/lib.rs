pub mod agent;
pub mod ai;
pub mod approval;
pub mod audit;
pub mod channels;
pub mod commands;
pub mod config;
pub mod error;
pub mod gateway;
pub mod logging;
pub mod mcp;
pub mod memory;
pub mod provider_store;
pub mod security;
pub mod session;
pub mod skills;
pub mod tools;

/// Convenience re-exports for the most commonly used traits and types.
///
/// ```rust
/// use safeclaw::prelude::*;
/// ```
pub mod prelude {
    pub use crate::ai::provider::LLMProvider;
    pub use crate::ai::types::{CompletionRequest, CompletionResponse, Message, MessageRole};

    pub use crate::tools::{Tool, ToolRegistry, ToolResult};

    pub use crate::channels::{Channel, ChannelMessage};

    pub use crate::config::Config;
    pub use crate::error::{ConfigError, GatewayError, ProviderError};
    pub use crate::gateway::{Gateway, GatewayState};
}

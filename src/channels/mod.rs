//! Channel abstraction layer.
//!
//! A **channel** is any transport that delivers [`traits::ChannelMessage`]s
//! between the gateway and its owner (console, Telegram, ...).
//!
//! # Architecture
//!
//! ```text
//!   stdin/stdout, Telegram long-poll, ...
//!         │
//!         ▼
//!   ┌─────────────┐
//!   │  Channel    │  (impl: ConsoleChannel, TelegramChannel, ...)
//!   └──────┬──────┘
//!          │ mpsc::Sender<ChannelMessage>
//!          ▼
//!       Gateway
//! ```
//!
//! # Implementing a new channel
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use crate::channels::ConsoleChannel;
//!
//! let channel = Arc::new(ConsoleChannel::new());
//! let (tx, mut rx) = tokio::sync::mpsc::channel(64);
//! tokio::spawn({
//!     let channel = channel.clone();
//!     async move { channel.listen(tx).await }
//! });
//! // poll rx in the gateway's owner-message loop
//! ```

pub mod console;
#[cfg(feature = "channels-telegram")]
pub mod telegram;
pub mod traits;

pub use console::ConsoleChannel;
pub use traits::{Channel, ChannelEvent, ChannelMessage};

#[cfg(feature = "channels-telegram")]
pub use telegram::{BotCommand, TelegramChannel, TelegramConfig};

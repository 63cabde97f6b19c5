//! Console channel: owner input over stdin/stdout.
//!
//! The only channel that needs no credentials, no network, and no external
//! service — it is what makes the gateway runnable out of the box. Grounded
//! on `channels::telegram`'s shape (a `Channel` impl around a long-running
//! `listen` loop that pushes lines onto an mpsc channel) with the bot-specific
//! parts (allow-lists, back-off, MarkdownV2 escaping) dropped since stdin has
//! no untrusted senders to filter and no reconnect semantics.

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;

use super::traits::{Channel, ChannelMessage};

/// Reads owner lines from stdin, writes replies to stdout.
pub struct ConsoleChannel;

impl ConsoleChannel {
    pub fn new() -> Self {
        Self
    }
}

impl Default for ConsoleChannel {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Channel for ConsoleChannel {
    fn name(&self) -> &str {
        "console"
    }

    /// `recipient` is ignored — there is only one peer, the terminal.
    async fn send(&self, message: &str, _recipient: Option<&str>) -> Result<(), String> {
        println!("{message}");
        Ok(())
    }

    /// Reads stdin line by line until EOF, forwarding each non-empty line.
    async fn listen(&self, tx: mpsc::Sender<ChannelMessage>) -> Result<(), String> {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        loop {
            let line = lines
                .next_line()
                .await
                .map_err(|e| format!("console: read error: {e}"))?;
            let Some(line) = line else {
                return Ok(());
            };
            if line.trim().is_empty() {
                continue;
            }
            let msg = ChannelMessage::new("console", line).with_sender("owner");
            if tx.send(msg).await.is_err() {
                return Ok(());
            }
        }
    }

    /// Stdin/stdout are always available once the process is running.
    async fn health_check(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn name_is_console() {
        assert_eq!(ConsoleChannel::new().name(), "console");
    }

    #[tokio::test]
    async fn health_check_is_always_true() {
        assert!(ConsoleChannel::new().health_check().await);
    }
}

use std::sync::Arc;

use safeclaw::channels::{Channel, ChannelMessage, ConsoleChannel};
use safeclaw::config::Config;
use safeclaw::gateway::Gateway;

#[cfg(feature = "channels-telegram")]
use safeclaw::channels::{TelegramChannel, TelegramConfig};

#[tokio::main]
async fn main() {
    let _ = rustls::crypto::ring::default_provider().install_default();

    let config = match Config::from_env() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("safeclaw: {e}");
            std::process::exit(1);
        }
    };

    safeclaw::logging::init(&config.logs_dir());

    let owner_id = config.owner_id.clone();
    let channel = build_channel(&config);

    let gateway = match Gateway::new(config).await {
        Ok(g) => g,
        Err(e) => {
            tracing::error!("failed to initialize gateway: {e}");
            std::process::exit(1);
        }
    };

    let (tx, mut rx) = tokio::sync::mpsc::channel::<ChannelMessage>(64);
    let listener = {
        let channel = Arc::clone(&channel);
        tokio::spawn(async move {
            if let Err(e) = channel.listen(tx).await {
                tracing::error!("channel listener exited: {e}");
            }
        })
    };

    tracing::info!(channel = channel.name(), "listening for owner messages");

    while let Some(msg) = rx.recv().await {
        if msg.sender.as_deref() != Some(owner_id.as_str()) {
            tracing::warn!(sender = ?msg.sender, "ignoring message from unknown sender");
            gateway.record_unknown_sender(msg.sender.as_deref());
            continue;
        }
        if let Some(reply) = gateway.handle_owner_message(&msg.content).await {
            if let Err(e) = channel.send(&reply, msg.sender.as_deref()).await {
                tracing::error!("failed to send reply: {e}");
            }
        }
    }

    listener.abort();
}

/// Picks the owner's chat transport. `console` (stdin/stdout) needs no
/// credentials and is the default; set `CHANNEL=telegram` to long-poll the
/// Telegram Bot API instead (requires the `channels-telegram` feature and
/// `BOT_TOKEN`).
fn build_channel(config: &Config) -> Arc<dyn Channel> {
    let kind = std::env::var("CHANNEL").unwrap_or_else(|_| "console".to_string());

    match kind.as_str() {
        #[cfg(feature = "channels-telegram")]
        "telegram" => {
            let allowed = config.owner_id.parse().map(|id| vec![id]).unwrap_or_default();
            Arc::new(TelegramChannel::new(TelegramConfig::with_allowed_ids(
                config.bot_token.clone(),
                allowed,
            )))
        }
        _ => Arc::new(ConsoleChannel::new()),
    }
}

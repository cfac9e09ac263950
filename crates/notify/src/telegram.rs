//! Telegram notification delivery.

use async_trait::async_trait;
use teloxide::prelude::*;
use teloxide::types::ChatId;
use tokio::sync::mpsc;
use tracing::warn;

use tracktrade_core::config::TelegramConfig;
use tracktrade_core::traits::Notifier;

/// Telegram notifier that queues messages to a background worker.
///
/// The worker owns the bot client and drains an unbounded channel; a failed
/// delivery is logged and the message dropped. Queuing keeps callers from
/// ever waiting on the Telegram API.
pub struct TelegramNotifier {
    tx: mpsc::UnboundedSender<String>,
}

impl TelegramNotifier {
    /// Creates the notifier and spawns its delivery worker.
    #[must_use]
    pub fn spawn(config: TelegramConfig) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let bot = Bot::new(config.bot_token.clone());
        let chat_id = ChatId(config.chat_id);
        tokio::spawn(delivery_worker(bot, chat_id, rx));
        Self { tx }
    }

    async fn enqueue(&self, text: String) {
        if self.tx.send(text).is_err() {
            warn!("telegram delivery worker is gone; dropping notification");
        }
    }
}

async fn delivery_worker(bot: Bot, chat_id: ChatId, mut rx: mpsc::UnboundedReceiver<String>) {
    while let Some(text) = rx.recv().await {
        if let Err(e) = bot.send_message(chat_id, text).await {
            warn!(error = %e, "failed to deliver telegram notification");
        }
    }
}

#[async_trait]
impl Notifier for TelegramNotifier {
    async fn send(&self, text: String) {
        self.enqueue(text).await;
    }
}

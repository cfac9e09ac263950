use async_trait::async_trait;
use tracing::debug;
use tracktrade_core::traits::Notifier;

/// Notifier used when no Telegram credentials are configured. Messages are
/// logged at debug level and dropped.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullNotifier;

#[async_trait]
impl Notifier for NullNotifier {
    async fn send(&self, text: String) {
        debug!(message = %text, "notification suppressed (no notifier configured)");
    }
}

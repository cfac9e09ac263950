//! Startup reconciliation of durable slots against the history log.
//!
//! Slot state and history can diverge after a crash; history wins. A slot
//! whose latest history record is terminal was simply never cleaned up and
//! is freed; anything else gets its monitor respawned as if freshly opened.

use tracing::{info, warn};

use crate::monitor::{MonitorConfig, MonitorDeps, PositionMonitor};
use crate::store::StoreError;
use crate::types::TradeStatus;

/// Counts reported after a recovery pass.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RecoverySummary {
    /// Monitors respawned for positions still awaiting entry.
    pub resumed_pending: usize,
    /// Monitors respawned for positions already filled.
    pub resumed_filled: usize,
    /// Slots freed because history already showed a terminal outcome.
    pub cleaned: Vec<(String, u32, u64)>,
}

impl RecoverySummary {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.resumed_pending == 0 && self.resumed_filled == 0 && self.cleaned.is_empty()
    }
}

/// Rebuilds in-memory monitors from durable state at process start.
pub struct RecoveryManager {
    deps: MonitorDeps,
    monitor_cfg: MonitorConfig,
}

impl RecoveryManager {
    #[must_use]
    pub fn new(deps: MonitorDeps, monitor_cfg: MonitorConfig) -> Self {
        Self { deps, monitor_cfg }
    }

    /// Runs one recovery pass and sends the summary notification.
    ///
    /// # Errors
    /// Returns an error when the store actor is unreachable.
    pub async fn run(&self) -> Result<RecoverySummary, StoreError> {
        let mut summary = RecoverySummary::default();

        for position in self.deps.store.open_positions().await? {
            let finished = self
                .deps
                .store
                .slot_finished_in_history(&position.symbol, position.track, position.slot_id)
                .await?;

            if finished {
                if !self.deps.store.clear_slot(position.slot_id).await? {
                    warn!(slot = position.slot_id, "stale slot vanished during recovery");
                }
                info!(
                    symbol = %position.symbol,
                    track = position.track,
                    slot = position.slot_id,
                    "cleared slot already finalized in history"
                );
                summary
                    .cleaned
                    .push((position.symbol, position.track, position.slot_id));
                continue;
            }

            match position.status {
                TradeStatus::Pending => summary.resumed_pending += 1,
                TradeStatus::Filled => summary.resumed_filled += 1,
                _ => continue,
            }
            info!(
                symbol = %position.symbol,
                track = position.track,
                slot = position.slot_id,
                status = %position.status,
                "resuming monitor"
            );
            PositionMonitor::spawn(self.deps.clone(), self.monitor_cfg.clone(), position);
        }

        if !summary.is_empty() {
            self.deps.notifier.send(render_summary(&summary)).await;
        }
        Ok(summary)
    }
}

fn render_summary(summary: &RecoverySummary) -> String {
    let mut lines = vec![
        "\u{1F504} Resume summary:".to_string(),
        format!("- awaiting-entry monitors restarted: {}", summary.resumed_pending),
        format!("- filled monitors restarted: {}", summary.resumed_filled),
    ];
    if !summary.cleaned.is_empty() {
        lines.push(format!("- finalized slots freed: {}", summary.cleaned.len()));
        for (symbol, track, slot) in summary.cleaned.iter().take(12) {
            lines.push(format!("   {symbol} — track {track} | slot {slot}"));
        }
        if summary.cleaned.len() > 12 {
            lines.push("   …".to_string());
        }
    }
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn summary_render_lists_cleaned_slots() {
        let summary = RecoverySummary {
            resumed_pending: 1,
            resumed_filled: 2,
            cleaned: vec![("BTCUSDT".to_string(), 3, 7)],
        };
        let text = render_summary(&summary);
        assert!(text.contains("restarted: 1"));
        assert!(text.contains("restarted: 2"));
        assert!(text.contains("BTCUSDT — track 3 | slot 7"));
    }

    #[test]
    fn empty_summary_is_detected() {
        assert!(RecoverySummary::default().is_empty());
    }
}

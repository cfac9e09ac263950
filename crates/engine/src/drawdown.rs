//! Periodic sweep over open positions: aggregate drawdown reporting and
//! exchange clock-skew checks.

use std::time::Duration;

use chrono::Utc;
use rust_decimal::Decimal;
use tracing::{debug, info, warn};

use tracktrade_core::config::TradingConfig;
use tracktrade_core::symbol::format_pair;

use crate::monitor::MonitorDeps;
use crate::store::StoreError;
use crate::types::TradeStatus;

/// Sweep parameters.
#[derive(Debug, Clone)]
pub struct SweepConfig {
    pub interval: Duration,
    /// Drop from fill price that puts a position in the report, percent.
    pub alert_pct: Decimal,
    /// Tolerated divergence between local and exchange clocks.
    pub clock_skew_warn: chrono::Duration,
}

impl From<&TradingConfig> for SweepConfig {
    fn from(cfg: &TradingConfig) -> Self {
        Self {
            interval: Duration::from_secs(cfg.sweep_secs),
            alert_pct: cfg.drawdown_alert_pct,
            clock_skew_warn: chrono::Duration::seconds(cfg.clock_skew_warn_secs),
        }
    }
}

/// One affected position in a sweep report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DrawdownLine {
    pub symbol: String,
    pub track: u32,
    pub slot_id: u64,
    pub fill_price: Decimal,
    pub current_price: Decimal,
    pub drop_pct: Decimal,
}

/// Periodic task scanning filled positions independently of their monitors.
pub struct DrawdownSweeper {
    deps: MonitorDeps,
    cfg: SweepConfig,
}

impl DrawdownSweeper {
    #[must_use]
    pub fn new(deps: MonitorDeps, cfg: SweepConfig) -> Self {
        Self { deps, cfg }
    }

    /// Runs the sweep loop forever. Spawn this on its own task.
    pub async fn run(self) {
        let mut ticker = tokio::time::interval(self.cfg.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // The first tick fires immediately; skip it so startup is quiet.
        ticker.tick().await;
        loop {
            ticker.tick().await;
            self.check_clock_skew().await;
            match self.sweep().await {
                Ok(lines) => {
                    if !lines.is_empty() {
                        self.deps
                            .notifier
                            .send(render_report(&lines, self.cfg.alert_pct))
                            .await;
                    }
                }
                Err(e) => warn!(error = %e, "drawdown sweep failed"),
            }
        }
    }

    /// One sweep pass: collects every filled position at or beyond the
    /// drawdown threshold, skipping slots the history log already settled.
    ///
    /// # Errors
    /// Returns an error when the store actor is unreachable.
    pub async fn sweep(&self) -> Result<Vec<DrawdownLine>, StoreError> {
        let mut lines = Vec::new();

        for position in self.deps.store.open_positions().await? {
            if position.status != TradeStatus::Filled {
                continue;
            }
            let Some(fill_price) = position.fill_price.filter(|p| *p > Decimal::ZERO) else {
                continue;
            };

            // The monitor may have exited this position between our state
            // read and now; history is authoritative.
            if self
                .deps
                .store
                .slot_finished_in_history(&position.symbol, position.track, position.slot_id)
                .await?
            {
                continue;
            }

            let pair = format_pair(&position.symbol);
            let price = match self.deps.exchange.ticker_price(&pair).await {
                Ok(price) if price > Decimal::ZERO => price,
                Ok(_) => continue,
                Err(e) => {
                    debug!(symbol = %position.symbol, error = %e, "sweep price fetch failed");
                    continue;
                }
            };

            let drop_pct = (fill_price - price) / fill_price * Decimal::ONE_HUNDRED;
            if drop_pct >= self.cfg.alert_pct {
                lines.push(DrawdownLine {
                    symbol: position.symbol.clone(),
                    track: position.track,
                    slot_id: position.slot_id,
                    fill_price,
                    current_price: price,
                    drop_pct,
                });
            }
        }

        lines.sort_by(|a, b| (a.symbol.as_str(), a.slot_id).cmp(&(b.symbol.as_str(), b.slot_id)));
        info!(affected = lines.len(), "drawdown sweep complete");
        Ok(lines)
    }

    /// Warns once per sweep when local time drifts from the exchange clock
    /// far enough to threaten signed-request validity.
    async fn check_clock_skew(&self) {
        match self.deps.exchange.server_time().await {
            Ok(server) => {
                let skew = Utc::now() - server;
                if skew.abs() > self.cfg.clock_skew_warn {
                    warn!(skew_ms = skew.num_milliseconds(), "clock skew detected");
                    self.deps
                        .notifier
                        .send(format!(
                            "\u{26A0}\u{FE0F} System clock is ~{}s off the exchange clock; signed requests may be rejected",
                            skew.num_seconds(),
                        ))
                        .await;
                }
            }
            Err(e) => debug!(error = %e, "server time check failed"),
        }
    }
}

fn render_report(lines: &[DrawdownLine], alert_pct: Decimal) -> String {
    let mut out = vec![format!("\u{1F4C9} Hourly drawdown alert (>= {alert_pct}%):")];
    for line in lines {
        out.push(format!(
            "- {} — track {} | slot {} | buy {:.6} \u{2192} now {:.6} (-{:.2}%)",
            line.symbol,
            line.track,
            line.slot_id,
            line.fill_price,
            line.current_price,
            line.drop_pct,
        ));
    }
    out.join("\n")
}

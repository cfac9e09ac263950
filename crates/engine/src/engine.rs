//! Engine facade: signal admission, manual intervention, capacity control,
//! and status queries. This is the surface the command interface talks to.

use std::sync::Arc;

use rust_decimal::Decimal;
use thiserror::Error;
use tracing::{info, warn};

use tracktrade_core::config::TradingConfig;
use tracktrade_core::symbol::{format_pair, normalize_symbol};
use tracktrade_core::traits::{AdmissionGate, Notifier, SpotExchange};

use crate::drawdown::{DrawdownSweeper, SweepConfig};
use crate::monitor::{
    classify_return, execute_market_sell, MonitorConfig, MonitorDeps, PositionMonitor,
};
use crate::recovery::{RecoveryManager, RecoverySummary};
use crate::store::{Outcome, RejectReason, StoreError, StoreHandle};
use crate::types::{Position, Signal, StateSnapshot, TradeStatus, TrackSnapshot};

/// Errors surfaced to the control interface.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("no active position in slot {0}")]
    UnknownSlot(u64),
}

/// Outcome of an accept-signal call. Rejections are normal control flow.
#[derive(Debug, Clone)]
pub enum SignalDecision {
    Accepted(Position),
    Rejected(RejectReason),
}

/// Outcome of a manual cancel-or-exit call.
#[derive(Debug, Clone)]
pub enum ExitReport {
    /// The position had not bought yet; the slot was released with no sell.
    Cancelled { slot_id: u64 },
    /// The held quantity was sold at market.
    Sold {
        slot_id: u64,
        status: TradeStatus,
        sell_price: Decimal,
        pnl_pct: Decimal,
    },
    /// The sell could not be executed; the asset is still held.
    SellFailed { slot_id: u64, reason: String },
}

/// The position lifecycle engine.
///
/// Owns no durable state itself; everything flows through the store actor
/// and the injected collaborators.
pub struct TradeEngine {
    deps: MonitorDeps,
    gate: Arc<dyn AdmissionGate>,
    monitor_cfg: MonitorConfig,
    sweep_cfg: SweepConfig,
}

impl TradeEngine {
    #[must_use]
    pub fn new(
        store: StoreHandle,
        exchange: Arc<dyn SpotExchange>,
        notifier: Arc<dyn Notifier>,
        gate: Arc<dyn AdmissionGate>,
        trading: &TradingConfig,
    ) -> Self {
        Self {
            deps: MonitorDeps {
                store,
                exchange,
                notifier,
            },
            gate,
            monitor_cfg: MonitorConfig::from(trading),
            sweep_cfg: SweepConfig::from(trading),
        }
    }

    /// Runs recovery, starts the periodic sweep task, and announces startup.
    ///
    /// # Errors
    /// Returns an error when the store actor is unreachable during recovery.
    pub async fn start(&self) -> Result<RecoverySummary, EngineError> {
        let summary = RecoveryManager::new(self.deps.clone(), self.monitor_cfg.clone())
            .run()
            .await?;

        let sweeper = DrawdownSweeper::new(self.deps.clone(), self.sweep_cfg.clone());
        tokio::spawn(sweeper.run());

        self.deps
            .notifier
            .send("\u{2705} Bot started — waiting for recommendations".to_string())
            .await;
        info!(
            resumed_pending = summary.resumed_pending,
            resumed_filled = summary.resumed_filled,
            cleaned = summary.cleaned.len(),
            "engine started"
        );
        Ok(summary)
    }

    /// Admits a signal: gate, target validation, capacity, reservation,
    /// then monitor spawn. A rejection never creates a position.
    ///
    /// # Errors
    /// Returns an error only when the store actor is unreachable.
    pub async fn accept_signal(
        &self,
        symbol: &str,
        entry: Decimal,
        stop: Decimal,
        targets: Vec<Decimal>,
    ) -> Result<SignalDecision, EngineError> {
        let symbol = normalize_symbol(symbol);

        if !self.gate.allows(&symbol) {
            self.deps
                .notifier
                .send(format!("\u{1F6AB} Ignored {symbol}: admission gate closed"))
                .await;
            return Ok(SignalDecision::Rejected(RejectReason::GateClosed));
        }

        let mut targets: Vec<Decimal> =
            targets.into_iter().filter(|t| *t > Decimal::ZERO).collect();
        targets.sort();
        targets.dedup();
        if targets.is_empty() {
            self.deps
                .notifier
                .send(format!("\u{26A0}\u{FE0F} Ignored {symbol}: no usable targets"))
                .await;
            return Ok(SignalDecision::Rejected(RejectReason::NoTargets));
        }

        let signal = Signal {
            symbol: symbol.clone(),
            entry,
            stop,
            targets,
        };
        let position = match self.deps.store.reserve(signal).await? {
            Ok(position) => position,
            Err(reason) => {
                warn!(%symbol, %reason, "signal rejected");
                self.deps
                    .notifier
                    .send(format!("\u{26A0}\u{FE0F} Cannot open {symbol}: {reason}"))
                    .await;
                return Ok(SignalDecision::Rejected(reason));
            }
        };

        self.deps
            .notifier
            .send(format!(
                "\u{1F4E5} New recommendation {symbol}\nentry <= {:.6} | TP1 >= {:.6} | stop {:.6}\namount {:.2} | track {} | slot {}",
                position.entry,
                position.targets[0],
                position.stop,
                position.amount,
                position.track,
                position.slot_id,
            ))
            .await;

        PositionMonitor::spawn(
            self.deps.clone(),
            self.monitor_cfg.clone(),
            position.clone(),
        );
        Ok(SignalDecision::Accepted(position))
    }

    /// Manually resolves a slot: cancels an unfilled position, or sells a
    /// filled one at market. The slot's monitor notices on its next guard
    /// check and exits on its own.
    ///
    /// # Errors
    /// Returns `UnknownSlot` when the slot holds no active position.
    pub async fn cancel_or_exit(&self, slot_id: u64) -> Result<ExitReport, EngineError> {
        let position = self
            .deps
            .store
            .slot(slot_id)
            .await?
            .filter(|p| p.status.is_open())
            .ok_or(EngineError::UnknownSlot(slot_id))?;

        match position.status {
            TradeStatus::Pending => {
                self.deps
                    .store
                    .finalize(slot_id, position.trade_id, Outcome::failed())
                    .await?;
                self.deps
                    .notifier
                    .send(format!(
                        "\u{1F6D1} Cancelled {} before entry — slot {slot_id} released",
                        position.symbol
                    ))
                    .await;
                Ok(ExitReport::Cancelled { slot_id })
            }
            TradeStatus::Filled => self.manual_sell(position).await,
            _ => Err(EngineError::UnknownSlot(slot_id)),
        }
    }

    async fn manual_sell(&self, position: Position) -> Result<ExitReport, EngineError> {
        let slot_id = position.slot_id;
        let (Some(fill_price), Some(qty)) = (position.fill_price, position.filled_qty) else {
            // Filled without execution data; release the slot, nothing to sell.
            self.deps
                .store
                .finalize(slot_id, position.trade_id, Outcome::failed())
                .await?;
            return Ok(ExitReport::SellFailed {
                slot_id,
                reason: "missing execution data".to_string(),
            });
        };

        let pair = format_pair(&position.symbol);
        let sell = async {
            let meta = self
                .deps
                .exchange
                .symbol_meta(&pair)
                .await
                .map_err(|e| e.to_string())?;
            execute_market_sell(
                self.deps.exchange.as_ref(),
                &pair,
                &meta,
                qty,
                self.monitor_cfg.fill_settle,
            )
            .await
            .map_err(|e| e.to_string())
        }
        .await;

        match sell {
            Ok(receipt) => {
                let (status, pnl_pct) = classify_return(
                    fill_price,
                    receipt.price,
                    self.monitor_cfg.profit_threshold_pct,
                );
                let pnl_abs = (receipt.price - fill_price) * receipt.qty;
                self.deps
                    .store
                    .finalize(
                        slot_id,
                        position.trade_id,
                        Outcome::sold(status, receipt.price, receipt.qty, pnl_abs, pnl_pct),
                    )
                    .await?;
                self.deps
                    .notifier
                    .send(format!(
                        "\u{1F4E4} Manual sell {} — buy {:.6} \u{2192} sell {:.6}, P&L {:.2}%",
                        position.symbol, fill_price, receipt.price, pnl_pct,
                    ))
                    .await;
                Ok(ExitReport::Sold {
                    slot_id,
                    status,
                    sell_price: receipt.price,
                    pnl_pct,
                })
            }
            Err(reason) => {
                warn!(symbol = %position.symbol, %reason, "manual sell failed");
                self.deps
                    .store
                    .finalize(slot_id, position.trade_id, Outcome::failed())
                    .await?;
                self.deps
                    .notifier
                    .send(format!(
                        "\u{274C} Manual sell of {} failed: {reason}; asset still held",
                        position.symbol
                    ))
                    .await;
                Ok(ExitReport::SellFailed { slot_id, reason })
            }
        }
    }

    /// Updates the open-position cap; returns the effective value.
    ///
    /// # Errors
    /// Returns an error when the store actor is unreachable.
    pub async fn set_capacity(&self, requested: usize) -> Result<usize, EngineError> {
        Ok(self.deps.store.set_capacity(requested).await?)
    }

    /// Full ladder snapshot for status queries.
    ///
    /// # Errors
    /// Returns an error when the store actor is unreachable.
    pub async fn status(&self) -> Result<StateSnapshot, EngineError> {
        Ok(self.deps.store.snapshot().await?)
    }

    /// Snapshot of a single track, if materialized.
    ///
    /// # Errors
    /// Returns an error when the store actor is unreachable.
    pub async fn track(&self, rank: u32) -> Result<Option<TrackSnapshot>, EngineError> {
        let snapshot = self.deps.store.snapshot().await?;
        Ok(snapshot.tracks.into_iter().find(|t| t.track == rank))
    }
}

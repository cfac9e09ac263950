//! Per-position monitoring state machine.
//!
//! One task per open position drives entry, the take-profit ladder with its
//! deferred trailing exit, the advisory stop notification, and terminal
//! classification. The monitor never mutates durable state directly; every
//! transition goes through the store actor.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use thiserror::Error;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use tracktrade_core::config::TradingConfig;
use tracktrade_core::market::SymbolMeta;
use tracktrade_core::symbol::{format_pair, quantize_down};
use tracktrade_core::traits::{Notifier, SpotExchange};

use crate::store::{Outcome, StoreHandle};
use crate::types::{Position, TradeStatus};

/// Numeric slack absorbing price-feed quantization noise in comparisons.
pub const EPS: Decimal = dec!(0.000001);

/// Candle interval used for the advisory stop check.
const STOP_CANDLE_INTERVAL: &str = "1hour";

/// Monitor timing and exit parameters.
#[derive(Debug, Clone)]
pub struct MonitorConfig {
    /// Poll interval while unfilled or filled-but-not-trailing.
    pub poll: Duration,
    /// Poll interval once trailing is armed.
    pub armed_poll: Duration,
    /// Give up on an unfilled position after this long without any price.
    pub price_timeout: Duration,
    /// Delay between order placement and the fill query.
    pub fill_settle: Duration,
    /// Retrace from the post-arm peak that triggers the trailing sell, percent.
    pub retrace_pct: Decimal,
    /// Gain at or above this percent classifies a close as profitable.
    pub profit_threshold_pct: Decimal,
    /// Quote currency funding the buys.
    pub quote_currency: String,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            poll: Duration::from_secs(60),
            armed_poll: Duration::from_secs(10),
            price_timeout: Duration::from_secs(600),
            fill_settle: Duration::from_secs(1),
            retrace_pct: Decimal::ONE,
            profit_threshold_pct: Decimal::TWO,
            quote_currency: "USDT".to_string(),
        }
    }
}

impl From<&TradingConfig> for MonitorConfig {
    fn from(cfg: &TradingConfig) -> Self {
        Self {
            poll: Duration::from_secs(cfg.poll_secs),
            armed_poll: Duration::from_secs(cfg.armed_poll_secs),
            price_timeout: Duration::from_secs(cfg.price_timeout_secs),
            fill_settle: Duration::from_secs(1),
            retrace_pct: cfg.retrace_pct,
            profit_threshold_pct: cfg.profit_threshold_pct,
            quote_currency: cfg.quote_currency.clone(),
        }
    }
}

/// Collaborators shared by every monitor.
#[derive(Clone)]
pub struct MonitorDeps {
    pub store: StoreHandle,
    pub exchange: Arc<dyn SpotExchange>,
    pub notifier: Arc<dyn Notifier>,
}

/// Why an entry attempt ended the position as `failed`.
#[derive(Debug, Error)]
pub enum EntryFailure {
    #[error("pair metadata unavailable: {0}")]
    MetaUnavailable(String),

    #[error("planned funds quantize to zero")]
    FundsTooSmall,

    #[error("available balance is zero")]
    NoBalance,

    #[error("balance lookup failed: {0}")]
    BalanceLookup(String),

    #[error("estimated quantity {est_qty} below pair minimum {min_size}")]
    BelowMinSize {
        est_qty: Decimal,
        min_size: Decimal,
    },

    #[error("buy order failed: {0}")]
    Order(String),

    #[error("fill lookup failed: {0}")]
    FillLookup(String),

    #[error("buy executed with zero filled size")]
    ZeroFill,

    #[error("no price for {0:?} before fill")]
    PriceTimeout(Duration),
}

/// Why a sell attempt ended the position as `failed`. The bought asset is
/// still held; the failure is reported and left to manual intervention.
#[derive(Debug, Error)]
pub enum ExitFailure {
    #[error("adjusted quantity {adjusted} below pair minimum {min_size}")]
    QtyBelowMin {
        adjusted: Decimal,
        min_size: Decimal,
    },

    #[error("sell order failed: {0}")]
    Order(String),

    #[error("fill lookup failed: {0}")]
    FillLookup(String),

    #[error("sell executed with zero filled size")]
    ZeroFill,
}

/// Which exit condition fired.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitTrigger {
    /// Price fell below the last touched target.
    FloorBreach,
    /// Price retraced from the post-arm peak while still at/above the floor.
    PeakRetrace,
}

/// Take-profit ladder with deferred trailing exit.
///
/// Tracks the highest touched target (the floor), arms trailing once the
/// first target is touched, and follows the peak price after arming. The
/// ladder never requests a sell merely because a target was touched.
#[derive(Debug, Clone)]
pub struct LadderTracker {
    targets: Vec<Decimal>,
    retrace_pct: Decimal,
    highest_touched: Option<usize>,
    peak: Option<Decimal>,
}

impl LadderTracker {
    #[must_use]
    pub fn new(targets: Vec<Decimal>, retrace_pct: Decimal) -> Self {
        Self {
            targets,
            retrace_pct,
            highest_touched: None,
            peak: None,
        }
    }

    /// Feeds one price observation. Returns the indices of targets newly
    /// touched by this observation, in ascending order.
    pub fn observe(&mut self, price: Decimal) -> Vec<usize> {
        let mut touched = Vec::new();
        loop {
            let next = self.highest_touched.map_or(0, |i| i + 1);
            match self.targets.get(next) {
                Some(target) if price >= *target - EPS => {
                    self.highest_touched = Some(next);
                    touched.push(next);
                }
                _ => break,
            }
        }
        if self.armed() {
            self.peak = Some(self.peak.map_or(price, |p| p.max(price)));
        }
        touched
    }

    /// True once the first target has been touched.
    #[must_use]
    pub fn armed(&self) -> bool {
        self.highest_touched.is_some()
    }

    /// The last touched target value; selling below it is a hard breach.
    #[must_use]
    pub fn floor(&self) -> Option<Decimal> {
        self.highest_touched.map(|i| self.targets[i])
    }

    /// Highest price observed since arming.
    #[must_use]
    pub fn peak(&self) -> Option<Decimal> {
        self.peak
    }

    /// Label of the next untouched target, for notifications.
    #[must_use]
    pub fn next_target_label(&self) -> String {
        let next = self.highest_touched.map_or(0, |i| i + 1);
        if next < self.targets.len() {
            format!("TP{}", next + 1)
        } else {
            "trailing only".to_string()
        }
    }

    /// Exit decision for the current price; only meaningful once armed.
    #[must_use]
    pub fn exit_signal(&self, price: Decimal) -> Option<ExitTrigger> {
        let floor = self.floor()?;
        if price < floor - EPS {
            return Some(ExitTrigger::FloorBreach);
        }
        let peak = self.peak?;
        let trigger = peak * (Decimal::ONE - self.retrace_pct / Decimal::ONE_HUNDRED);
        if price <= trigger + EPS {
            return Some(ExitTrigger::PeakRetrace);
        }
        None
    }
}

/// Classifies a realized return against the profit threshold.
///
/// Gains at or above the threshold count as a profitable `closed`; anything
/// else sold on the exchange is `drawn_down`.
#[must_use]
pub fn classify_return(
    fill_price: Decimal,
    sell_price: Decimal,
    profit_threshold_pct: Decimal,
) -> (TradeStatus, Decimal) {
    if fill_price <= Decimal::ZERO {
        return (TradeStatus::DrawnDown, Decimal::ZERO);
    }
    let pct = (sell_price - fill_price) / fill_price * Decimal::ONE_HUNDRED;
    let status = if pct >= profit_threshold_pct {
        TradeStatus::Closed
    } else {
        TradeStatus::DrawnDown
    };
    (status, pct)
}

/// Outcome of a completed market sell.
#[derive(Debug, Clone, Copy)]
pub struct SellReceipt {
    pub price: Decimal,
    pub qty: Decimal,
}

/// Places a market sell for a held quantity and reads back the execution.
///
/// Applies a small haircut before quantizing down so dust from fees never
/// pushes the order above the held balance.
pub async fn execute_market_sell(
    exchange: &dyn SpotExchange,
    pair: &str,
    meta: &SymbolMeta,
    held_qty: Decimal,
    fill_settle: Duration,
) -> Result<SellReceipt, ExitFailure> {
    let adjusted = quantize_down(held_qty * dec!(0.9998), meta.base_increment);
    if adjusted < meta.base_min_size || adjusted <= Decimal::ZERO {
        return Err(ExitFailure::QtyBelowMin {
            adjusted,
            min_size: meta.base_min_size,
        });
    }

    let order_id = exchange
        .place_market_sell(pair, adjusted)
        .await
        .map_err(|e| ExitFailure::Order(e.to_string()))?;
    tokio::time::sleep(fill_settle).await;

    let fill = exchange
        .order_fill(&order_id)
        .await
        .map_err(|e| ExitFailure::FillLookup(e.to_string()))?;
    let Some(price) = fill.avg_price() else {
        return Err(ExitFailure::ZeroFill);
    };
    Ok(SellReceipt {
        price,
        qty: fill.size,
    })
}

struct FillState {
    qty: Decimal,
    price: Decimal,
    at: DateTime<Utc>,
}

/// One task driving one open position to a terminal state.
pub struct PositionMonitor {
    deps: MonitorDeps,
    cfg: MonitorConfig,
    position: Position,
    pair: String,
}

impl PositionMonitor {
    #[must_use]
    pub fn new(deps: MonitorDeps, cfg: MonitorConfig, position: Position) -> Self {
        let pair = format_pair(&position.symbol);
        Self {
            deps,
            cfg,
            position,
            pair,
        }
    }

    /// Spawns the monitor task.
    pub fn spawn(deps: MonitorDeps, cfg: MonitorConfig, position: Position) {
        let monitor = Self::new(deps, cfg, position);
        tokio::spawn(async move {
            monitor.run().await;
        });
    }

    pub async fn run(self) {
        info!(
            symbol = %self.position.symbol,
            track = self.position.track,
            slot = self.position.slot_id,
            entry = %self.position.entry,
            "monitor started"
        );

        let meta = match self.deps.exchange.symbol_meta(&self.pair).await {
            Ok(meta) => meta,
            Err(e) => {
                let failure = EntryFailure::MetaUnavailable(e.to_string());
                warn!(symbol = %self.position.symbol, error = %failure, "entry failed");
                self.finalize_failed(&failure.to_string()).await;
                return;
            }
        };

        let mut ladder =
            LadderTracker::new(self.position.targets.clone(), self.cfg.retrace_pct);
        let mut fill = match (self.position.fill_price, self.position.filled_qty) {
            (Some(price), Some(qty)) => Some(FillState {
                qty,
                price,
                at: self.position.filled_at.unwrap_or(self.position.started_at),
            }),
            _ => None,
        };
        let mut stop_alerted = false;
        let mut last_price_at = Instant::now();

        loop {
            // Another actor may have resolved the slot (manual exit, crash
            // cleanup); if so this monitor's work is done.
            match self.deps.store.slot(self.position.slot_id).await {
                Ok(Some(current))
                    if current.trade_id == self.position.trade_id
                        && current.status.is_open() => {}
                Ok(_) => {
                    debug!(
                        symbol = %self.position.symbol,
                        slot = self.position.slot_id,
                        "slot resolved elsewhere; monitor exiting"
                    );
                    return;
                }
                Err(_) => return,
            }

            let price = match self.deps.exchange.ticker_price(&self.pair).await {
                Ok(price) => {
                    last_price_at = Instant::now();
                    Some(price)
                }
                Err(e) => {
                    debug!(symbol = %self.position.symbol, error = %e, "price fetch failed");
                    None
                }
            };

            let Some(price) = price else {
                if fill.is_none() && last_price_at.elapsed() >= self.cfg.price_timeout {
                    let failure = EntryFailure::PriceTimeout(self.cfg.price_timeout);
                    warn!(symbol = %self.position.symbol, error = %failure, "entry failed");
                    self.finalize_failed(&format!(
                        "no price for {} minutes, order was never placed",
                        self.cfg.price_timeout.as_secs() / 60
                    ))
                    .await;
                    return;
                }
                tokio::time::sleep(self.cfg.poll).await;
                continue;
            };

            // Entry is a ceiling: buying at or below the requested price.
            if fill.is_none() && price <= self.position.entry + EPS {
                match self.execute_entry(&meta, price).await {
                    Ok(state) => {
                        let recorded = self
                            .deps
                            .store
                            .mark_filled(
                                self.position.slot_id,
                                self.position.trade_id,
                                state.price,
                                state.qty,
                            )
                            .await
                            .unwrap_or(false);
                        if !recorded {
                            // Slot was resolved while the order ran; the
                            // asset is held but no longer tracked here.
                            warn!(
                                symbol = %self.position.symbol,
                                slot = self.position.slot_id,
                                "fill could not be recorded; monitor exiting"
                            );
                            return;
                        }
                        self.notify(format!(
                            "\u{2705} Bought {}\nprice {:.6} | qty {:.6} | {} {:.2}\ntrack {} | slot {}",
                            self.position.symbol,
                            state.price,
                            state.qty,
                            self.cfg.quote_currency,
                            self.position.amount,
                            self.position.track,
                            self.position.slot_id,
                        ))
                        .await;
                        fill = Some(state);
                    }
                    Err(failure) => {
                        warn!(symbol = %self.position.symbol, error = %failure, "entry failed");
                        self.finalize_failed(&failure.to_string()).await;
                        return;
                    }
                }
            }

            if let Some(fill_state) = &fill {
                let newly_touched = ladder.observe(price);
                for idx in newly_touched {
                    if idx == 0 {
                        self.notify(format!(
                            "\u{1F7E2} {} touched TP1 at {:.6}; trailing {}% armed, floor {:.6}",
                            self.position.symbol,
                            price,
                            self.cfg.retrace_pct,
                            ladder.floor().unwrap_or(price),
                        ))
                        .await;
                    } else {
                        self.notify(format!(
                            "\u{27A1}\u{FE0F} {} touched TP{} ({:.6}); next {}",
                            self.position.symbol,
                            idx + 1,
                            self.position.targets[idx],
                            ladder.next_target_label(),
                        ))
                        .await;
                    }
                }

                if let Some(trigger) = ladder.exit_signal(price) {
                    self.exit_position(&meta, fill_state, trigger).await;
                    return;
                }

                if !stop_alerted && self.stop_candle_breached(fill_state.at).await {
                    stop_alerted = true;
                    self.notify(format!(
                        "\u{1F6D1} {} hourly close at/below stop {:.6} — no sell, still tracking targets",
                        self.position.symbol, self.position.stop,
                    ))
                    .await;
                }
            }

            let pause = if ladder.armed() {
                self.cfg.armed_poll
            } else {
                self.cfg.poll
            };
            tokio::time::sleep(pause).await;
        }
    }

    async fn execute_entry(
        &self,
        meta: &SymbolMeta,
        price: Decimal,
    ) -> Result<FillState, EntryFailure> {
        let planned = quantize_down(self.position.amount, meta.quote_increment);
        if planned <= Decimal::ZERO {
            return Err(EntryFailure::FundsTooSmall);
        }

        let balance = self
            .deps
            .exchange
            .available_balance(&self.cfg.quote_currency)
            .await
            .map_err(|e| EntryFailure::BalanceLookup(e.to_string()))?;
        if balance <= Decimal::ZERO {
            return Err(EntryFailure::NoBalance);
        }

        let funds = quantize_down(planned.min(balance), meta.quote_increment);
        if funds <= Decimal::ZERO {
            return Err(EntryFailure::FundsTooSmall);
        }

        let est_qty = quantize_down(funds / price, meta.base_increment);
        if est_qty < meta.base_min_size {
            return Err(EntryFailure::BelowMinSize {
                est_qty,
                min_size: meta.base_min_size,
            });
        }

        let order_id = self
            .deps
            .exchange
            .place_market_buy(&self.pair, funds)
            .await
            .map_err(|e| EntryFailure::Order(e.to_string()))?;
        tokio::time::sleep(self.cfg.fill_settle).await;

        let fill = self
            .deps
            .exchange
            .order_fill(&order_id)
            .await
            .map_err(|e| EntryFailure::FillLookup(e.to_string()))?;
        let Some(fill_price) = fill.avg_price() else {
            return Err(EntryFailure::ZeroFill);
        };

        info!(
            symbol = %self.position.symbol,
            funds = %funds,
            qty = %fill.size,
            fill_price = %fill_price,
            "buy filled"
        );
        Ok(FillState {
            qty: fill.size,
            price: fill_price,
            at: Utc::now(),
        })
    }

    async fn exit_position(&self, meta: &SymbolMeta, fill: &FillState, trigger: ExitTrigger) {
        match execute_market_sell(
            self.deps.exchange.as_ref(),
            &self.pair,
            meta,
            fill.qty,
            self.cfg.fill_settle,
        )
        .await
        {
            Ok(receipt) => {
                let (status, pnl_pct) =
                    classify_return(fill.price, receipt.price, self.cfg.profit_threshold_pct);
                let pnl_abs = (receipt.price - fill.price) * receipt.qty;
                let outcome =
                    Outcome::sold(status, receipt.price, receipt.qty, pnl_abs, pnl_pct);
                let applied = self
                    .deps
                    .store
                    .finalize(self.position.slot_id, self.position.trade_id, outcome)
                    .await
                    .map(|r| r.applied)
                    .unwrap_or(false);
                if !applied {
                    return;
                }

                let reason = match trigger {
                    ExitTrigger::FloorBreach => "floor breach",
                    ExitTrigger::PeakRetrace => "peak retrace",
                };
                let icon = if status == TradeStatus::Closed {
                    "\u{1F7E2}"
                } else {
                    "\u{1F534}"
                };
                self.notify(format!(
                    "{icon} Sold {} ({reason})\nbuy {:.6} \u{2192} sell {:.6} | qty {:.6}\nP&L {:.4} {} ({:+.2}%)\nheld {}",
                    self.position.symbol,
                    fill.price,
                    receipt.price,
                    receipt.qty,
                    pnl_abs,
                    self.cfg.quote_currency,
                    pnl_pct,
                    format_duration(Utc::now() - fill.at),
                ))
                .await;
            }
            Err(failure) => {
                warn!(symbol = %self.position.symbol, error = %failure, "exit failed");
                self.finalize_failed(&format!(
                    "sell failed ({failure}); asset still held, manual intervention required"
                ))
                .await;
            }
        }
    }

    /// Whether the latest completed hourly candle after entry closed at or
    /// below the stop price.
    async fn stop_candle_breached(&self, filled_at: DateTime<Utc>) -> bool {
        match self
            .deps
            .exchange
            .latest_candle(&self.pair, STOP_CANDLE_INTERVAL)
            .await
        {
            Ok(Some(candle)) => {
                let end = candle.end(chrono::Duration::hours(1));
                end > filled_at && candle.close <= self.position.stop + EPS
            }
            Ok(None) => false,
            Err(e) => {
                debug!(symbol = %self.position.symbol, error = %e, "candle fetch failed");
                false
            }
        }
    }

    async fn finalize_failed(&self, reason: &str) {
        let applied = self
            .deps
            .store
            .finalize(
                self.position.slot_id,
                self.position.trade_id,
                Outcome::failed(),
            )
            .await
            .map(|r| r.applied)
            .unwrap_or(false);
        if applied {
            self.notify(format!(
                "\u{274C} {} failed: {reason}\ntrack {} | slot {} released",
                self.position.symbol, self.position.track, self.position.slot_id,
            ))
            .await;
        }
    }

    async fn notify(&self, text: String) {
        self.deps.notifier.send(text).await;
    }
}

/// `1d 4h 12m` style duration for notifications.
fn format_duration(delta: chrono::Duration) -> String {
    let minutes = delta.num_minutes().max(0);
    format!(
        "{}d {}h {}m",
        minutes / (24 * 60),
        (minutes / 60) % 24,
        minutes % 60
    )
}

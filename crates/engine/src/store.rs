//! Single-writer store actor.
//!
//! One task owns the ladder state and the trade history log and is the only
//! writer of both files. Every mutation arrives as a typed command over an
//! mpsc channel and is answered over a oneshot, which serializes allocation,
//! finalization, and manual intervention and removes the lost-update window
//! a shared read-modify-write file would have.

use chrono::Utc;
use rust_decimal::Decimal;
use std::path::PathBuf;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tracing::{error, info, warn};

use crate::allocator::{
    allocate_slot, apply_outcome, capacity_ok, clamp_capacity, ensure_track, open_count,
    select_track,
};
pub use crate::allocator::LadderSettings;
use crate::history::{write_atomic, TradeLog};
use crate::types::{
    LadderState, Position, Signal, StateSnapshot, TradeStatus, TrackSnapshot,
};

/// Errors from the durable store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("state I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("state serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    /// The actor task is gone; the process is shutting down.
    #[error("store actor is no longer running")]
    Closed,
}

/// Why a signal was not turned into a position. This is a normal outcome,
/// not an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RejectReason {
    /// The admission gate declined the symbol.
    GateClosed,
    /// The signal carried no usable targets.
    NoTargets,
    /// Open positions already meet the capacity limit.
    CapacityFull { open: usize, capacity: usize },
}

impl std::fmt::Display for RejectReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::GateClosed => write!(f, "admission gate closed"),
            Self::NoTargets => write!(f, "no valid targets"),
            Self::CapacityFull { open, capacity } => {
                write!(f, "capacity reached {open}/{capacity}")
            }
        }
    }
}

/// Terminal outcome of a position, as recorded by finalization.
#[derive(Debug, Clone)]
pub struct Outcome {
    pub status: TradeStatus,
    pub sell_price: Option<Decimal>,
    pub sell_qty: Option<Decimal>,
    pub pnl_abs: Option<Decimal>,
    pub pnl_pct: Option<Decimal>,
}

impl Outcome {
    /// Outcome of an execution or operational failure: no sell happened.
    #[must_use]
    pub fn failed() -> Self {
        Self {
            status: TradeStatus::Failed,
            sell_price: None,
            sell_qty: None,
            pnl_abs: None,
            pnl_pct: None,
        }
    }

    /// Outcome of a completed market sell.
    #[must_use]
    pub fn sold(
        status: TradeStatus,
        sell_price: Decimal,
        sell_qty: Decimal,
        pnl_abs: Decimal,
        pnl_pct: Decimal,
    ) -> Self {
        Self {
            status,
            sell_price: Some(sell_price),
            sell_qty: Some(sell_qty),
            pnl_abs: Some(pnl_abs),
            pnl_pct: Some(pnl_pct),
        }
    }
}

/// Result of a finalize command.
#[derive(Debug, Clone, Copy)]
pub struct FinalizeReceipt {
    /// False when the trade was already finalized; counters and history
    /// were left untouched.
    pub applied: bool,
    pub status: TradeStatus,
}

enum StoreCommand {
    Reserve {
        signal: Signal,
        reply: oneshot::Sender<Result<Position, RejectReason>>,
    },
    MarkFilled {
        slot_id: u64,
        trade_id: u64,
        fill_price: Decimal,
        qty: Decimal,
        reply: oneshot::Sender<bool>,
    },
    Finalize {
        slot_id: u64,
        trade_id: u64,
        outcome: Outcome,
        reply: oneshot::Sender<FinalizeReceipt>,
    },
    Slot {
        slot_id: u64,
        reply: oneshot::Sender<Option<Position>>,
    },
    OpenPositions {
        reply: oneshot::Sender<Vec<Position>>,
    },
    Snapshot {
        reply: oneshot::Sender<StateSnapshot>,
    },
    SetCapacity {
        requested: usize,
        reply: oneshot::Sender<usize>,
    },
    ClearSlot {
        slot_id: u64,
        reply: oneshot::Sender<bool>,
    },
    SlotFinishedInHistory {
        symbol: String,
        track: u32,
        slot_id: u64,
        reply: oneshot::Sender<bool>,
    },
}

/// Cloneable handle to the store actor.
#[derive(Clone)]
pub struct StoreHandle {
    tx: mpsc::Sender<StoreCommand>,
}

impl StoreHandle {
    async fn request<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<T>) -> StoreCommand,
    ) -> Result<T, StoreError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(build(reply))
            .await
            .map_err(|_| StoreError::Closed)?;
        rx.await.map_err(|_| StoreError::Closed)
    }

    /// Reserves a track, slot, and capital amount for a signal.
    ///
    /// # Errors
    /// Returns `StoreError::Closed` when the actor is gone; a capacity
    /// rejection is returned inside the `Ok` value.
    pub async fn reserve(
        &self,
        signal: Signal,
    ) -> Result<Result<Position, RejectReason>, StoreError> {
        self.request(|reply| StoreCommand::Reserve { signal, reply })
            .await
    }

    /// Records a buy execution against a slot. Returns `false` when the
    /// slot no longer holds the expected pending position.
    pub async fn mark_filled(
        &self,
        slot_id: u64,
        trade_id: u64,
        fill_price: Decimal,
        qty: Decimal,
    ) -> Result<bool, StoreError> {
        self.request(|reply| StoreCommand::MarkFilled {
            slot_id,
            trade_id,
            fill_price,
            qty,
            reply,
        })
        .await
    }

    /// Applies a terminal outcome: history, counters, cursor, slot release.
    /// Idempotent per trade id.
    pub async fn finalize(
        &self,
        slot_id: u64,
        trade_id: u64,
        outcome: Outcome,
    ) -> Result<FinalizeReceipt, StoreError> {
        self.request(|reply| StoreCommand::Finalize {
            slot_id,
            trade_id,
            outcome,
            reply,
        })
        .await
    }

    /// Current occupant of a slot.
    pub async fn slot(&self, slot_id: u64) -> Result<Option<Position>, StoreError> {
        self.request(|reply| StoreCommand::Slot { slot_id, reply })
            .await
    }

    /// All positions currently holding capacity.
    pub async fn open_positions(&self) -> Result<Vec<Position>, StoreError> {
        self.request(|reply| StoreCommand::OpenPositions { reply })
            .await
    }

    /// Full read-only view for status queries.
    pub async fn snapshot(&self) -> Result<StateSnapshot, StoreError> {
        self.request(|reply| StoreCommand::Snapshot { reply }).await
    }

    /// Updates the capacity limit; returns the effective (clamped) value.
    pub async fn set_capacity(&self, requested: usize) -> Result<usize, StoreError> {
        self.request(|reply| StoreCommand::SetCapacity { requested, reply })
            .await
    }

    /// Frees a slot without touching counters (recovery cleanup).
    pub async fn clear_slot(&self, slot_id: u64) -> Result<bool, StoreError> {
        self.request(|reply| StoreCommand::ClearSlot { slot_id, reply })
            .await
    }

    /// Whether the history log already shows a terminal outcome for the slot.
    pub async fn slot_finished_in_history(
        &self,
        symbol: &str,
        track: u32,
        slot_id: u64,
    ) -> Result<bool, StoreError> {
        let symbol = symbol.to_string();
        self.request(|reply| StoreCommand::SlotFinishedInHistory {
            symbol,
            track,
            slot_id,
            reply,
        })
        .await
    }
}

/// The actor owning ladder state and history.
pub struct StoreActor {
    settings: LadderSettings,
    state: LadderState,
    state_path: PathBuf,
    history: TradeLog,
    rx: mpsc::Receiver<StoreCommand>,
}

impl StoreActor {
    /// Loads (or initializes) durable state and spawns the actor task.
    ///
    /// # Errors
    /// Returns an error when existing state or history files cannot be read.
    pub fn spawn(
        settings: LadderSettings,
        initial_capacity: usize,
        state_path: impl Into<PathBuf>,
        history_path: impl Into<PathBuf>,
    ) -> Result<StoreHandle, StoreError> {
        let state_path = state_path.into();
        let state = if state_path.exists() {
            let raw = std::fs::read_to_string(&state_path)?;
            serde_json::from_str(&raw)?
        } else {
            LadderState::new(clamp_capacity(initial_capacity, &settings))
        };
        let history = TradeLog::load(history_path)?;

        info!(
            capacity = state.capacity,
            open = open_count(&state),
            next_track = state.next_track,
            "store loaded"
        );

        let (tx, rx) = mpsc::channel(64);
        let actor = Self {
            settings,
            state,
            state_path,
            history,
            rx,
        };
        tokio::spawn(actor.run());
        Ok(StoreHandle { tx })
    }

    async fn run(mut self) {
        while let Some(cmd) = self.rx.recv().await {
            self.handle(cmd);
        }
    }

    fn handle(&mut self, cmd: StoreCommand) {
        match cmd {
            StoreCommand::Reserve { signal, reply } => {
                let _ = reply.send(self.reserve(signal));
            }
            StoreCommand::MarkFilled {
                slot_id,
                trade_id,
                fill_price,
                qty,
                reply,
            } => {
                let _ = reply.send(self.mark_filled(slot_id, trade_id, fill_price, qty));
            }
            StoreCommand::Finalize {
                slot_id,
                trade_id,
                outcome,
                reply,
            } => {
                let _ = reply.send(self.finalize(slot_id, trade_id, outcome));
            }
            StoreCommand::Slot { slot_id, reply } => {
                let _ = reply.send(self.state.slots.get(&slot_id).cloned().flatten());
            }
            StoreCommand::OpenPositions { reply } => {
                let _ = reply.send(self.state.open_positions().cloned().collect());
            }
            StoreCommand::Snapshot { reply } => {
                let _ = reply.send(self.snapshot());
            }
            StoreCommand::SetCapacity { requested, reply } => {
                self.state.capacity = clamp_capacity(requested, &self.settings);
                self.persist_state();
                info!(capacity = self.state.capacity, "capacity updated");
                let _ = reply.send(self.state.capacity);
            }
            StoreCommand::ClearSlot { slot_id, reply } => {
                let cleared = match self.state.slots.get_mut(&slot_id) {
                    Some(slot @ Some(_)) => {
                        *slot = None;
                        true
                    }
                    _ => false,
                };
                if cleared {
                    self.persist_state();
                }
                let _ = reply.send(cleared);
            }
            StoreCommand::SlotFinishedInHistory {
                symbol,
                track,
                slot_id,
                reply,
            } => {
                let _ = reply.send(self.history.is_terminal_for_slot(&symbol, track, slot_id));
            }
        }
    }

    fn reserve(&mut self, signal: Signal) -> Result<Position, RejectReason> {
        if !capacity_ok(&self.state) {
            return Err(RejectReason::CapacityFull {
                open: open_count(&self.state),
                capacity: self.state.capacity,
            });
        }

        let track = select_track(&self.state, &self.settings);
        let amount = ensure_track(&mut self.state, &self.settings, track);
        let slot_id = allocate_slot(&mut self.state);

        let mut position = Position {
            symbol: signal.symbol,
            track,
            slot_id,
            trade_id: 0,
            entry: signal.entry,
            stop: signal.stop,
            targets: signal.targets,
            amount,
            status: TradeStatus::Pending,
            filled_qty: None,
            fill_price: None,
            started_at: Utc::now(),
            filled_at: None,
        };
        position.trade_id = self.history.append(&position);
        self.state.slots.insert(slot_id, Some(position.clone()));

        self.persist_state();
        self.persist_history();

        info!(
            symbol = %position.symbol,
            track,
            slot_id,
            trade_id = position.trade_id,
            amount = %amount,
            "position reserved"
        );
        Ok(position)
    }

    fn mark_filled(&mut self, slot_id: u64, trade_id: u64, fill_price: Decimal, qty: Decimal) -> bool {
        let now = Utc::now();
        let updated = match self.state.slots.get_mut(&slot_id) {
            Some(Some(pos)) if pos.trade_id == trade_id && pos.status == TradeStatus::Pending => {
                pos.status = TradeStatus::Filled;
                pos.fill_price = Some(fill_price);
                pos.filled_qty = Some(qty);
                pos.filled_at = Some(now);
                true
            }
            _ => false,
        };
        if updated {
            self.history.mark_filled(trade_id, fill_price, qty, now);
            self.persist_state();
            self.persist_history();
        } else {
            warn!(slot_id, trade_id, "fill recorded for a slot that moved on");
        }
        updated
    }

    fn finalize(&mut self, slot_id: u64, trade_id: u64, outcome: Outcome) -> FinalizeReceipt {
        // The history record decides idempotence: a trade finalized once
        // must not touch counters or history again.
        let already_terminal = self
            .history
            .record(trade_id)
            .map(|r| r.status.is_terminal())
            .unwrap_or(false);
        if already_terminal {
            let status = self
                .history
                .record(trade_id)
                .map(|r| r.status)
                .unwrap_or(outcome.status);
            return FinalizeReceipt {
                applied: false,
                status,
            };
        }

        let now = Utc::now();
        self.history.finalize(
            trade_id,
            outcome.status,
            outcome.sell_price,
            outcome.sell_qty,
            outcome.pnl_abs,
            outcome.pnl_pct,
            now,
        );
        apply_outcome(
            &mut self.state,
            &self.settings,
            outcome.status,
            now.date_naive(),
        );

        if let Some(slot) = self.state.slots.get_mut(&slot_id) {
            if slot.as_ref().map(|p| p.trade_id == trade_id).unwrap_or(false) {
                *slot = None;
            }
        }

        self.persist_state();
        self.persist_history();

        info!(slot_id, trade_id, status = %outcome.status, "position finalized");
        FinalizeReceipt {
            applied: true,
            status: outcome.status,
        }
    }

    fn snapshot(&self) -> StateSnapshot {
        let tracks = self
            .state
            .tracks
            .iter()
            .map(|(rank, track)| TrackSnapshot {
                track: *rank,
                amount: track.amount,
                positions: self
                    .state
                    .open_positions()
                    .filter(|p| p.track == *rank)
                    .cloned()
                    .collect(),
            })
            .collect();
        StateSnapshot {
            capacity: self.state.capacity,
            open_count: open_count(&self.state),
            next_track: self.state.next_track,
            counters: self.state.counters.clone(),
            tracks,
        }
    }

    // Persist failures are logged only: in-memory state stays authoritative
    // and the next mutation retries the write.
    fn persist_state(&self) {
        let result = serde_json::to_vec_pretty(&self.state)
            .map_err(StoreError::from)
            .and_then(|bytes| write_atomic(&self.state_path, &bytes));
        if let Err(e) = result {
            error!(error = %e, path = %self.state_path.display(), "failed to persist ladder state");
        }
    }

    fn persist_history(&self) {
        if let Err(e) = self.history.save() {
            error!(error = %e, "failed to persist trade history");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn settings() -> LadderSettings {
        LadderSettings {
            base_amount: dec!(50),
            growth_pct: dec!(2),
            max_tracks: 10,
        }
    }

    fn signal(symbol: &str) -> Signal {
        Signal {
            symbol: symbol.to_string(),
            entry: dec!(100),
            stop: dec!(90),
            targets: vec![dec!(102), dec!(105)],
        }
    }

    fn spawn_store(dir: &tempfile::TempDir, capacity: usize) -> StoreHandle {
        StoreActor::spawn(
            settings(),
            capacity,
            dir.path().join("state.json"),
            dir.path().join("history.json"),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn reserve_assigns_track_slot_and_amount() {
        let dir = tempfile::tempdir().unwrap();
        let store = spawn_store(&dir, 10);

        let pos = store.reserve(signal("BTCUSDT")).await.unwrap().unwrap();
        assert_eq!(pos.track, 1);
        assert_eq!(pos.slot_id, 1);
        assert_eq!(pos.trade_id, 1);
        assert_eq!(pos.amount, dec!(50));
        assert_eq!(pos.status, TradeStatus::Pending);
    }

    #[tokio::test]
    async fn second_signal_beyond_capacity_is_rejected_without_side_effects() {
        let dir = tempfile::tempdir().unwrap();
        let store = spawn_store(&dir, 1);

        store.reserve(signal("BTCUSDT")).await.unwrap().unwrap();
        let rejected = store.reserve(signal("ETHUSDT")).await.unwrap();
        assert_eq!(
            rejected.unwrap_err(),
            RejectReason::CapacityFull {
                open: 1,
                capacity: 1
            }
        );

        let snap = store.snapshot().await.unwrap();
        assert_eq!(snap.open_count, 1);
        assert_eq!(snap.next_track, 1, "rejection must not move the cursor");
    }

    #[tokio::test]
    async fn capacity_invariant_holds_under_load() {
        let dir = tempfile::tempdir().unwrap();
        let store = spawn_store(&dir, 3);

        for i in 0..10 {
            let _ = store.reserve(signal(&format!("SYM{i}USDT"))).await.unwrap();
        }
        let snap = store.snapshot().await.unwrap();
        assert!(snap.open_count <= snap.capacity);
        assert_eq!(snap.open_count, 3);
    }

    #[tokio::test]
    async fn finalize_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let store = spawn_store(&dir, 10);

        let pos = store.reserve(signal("BTCUSDT")).await.unwrap().unwrap();
        store
            .mark_filled(pos.slot_id, pos.trade_id, dec!(100), dec!(0.5))
            .await
            .unwrap();

        let outcome = Outcome::sold(TradeStatus::Closed, dec!(105), dec!(0.5), dec!(2.5), dec!(5));
        let first = store
            .finalize(pos.slot_id, pos.trade_id, outcome.clone())
            .await
            .unwrap();
        let second = store
            .finalize(pos.slot_id, pos.trade_id, outcome)
            .await
            .unwrap();

        assert!(first.applied);
        assert!(!second.applied);

        let snap = store.snapshot().await.unwrap();
        assert_eq!(snap.counters.total, 1);
        assert_eq!(snap.counters.successful, 1);
        assert_eq!(snap.open_count, 0);
    }

    #[tokio::test]
    async fn profitable_close_advances_cursor_and_frees_slot_for_reuse() {
        let dir = tempfile::tempdir().unwrap();
        let store = spawn_store(&dir, 10);

        let pos = store.reserve(signal("BTCUSDT")).await.unwrap().unwrap();
        store
            .finalize(
                pos.slot_id,
                pos.trade_id,
                Outcome::sold(TradeStatus::Closed, dec!(105), dec!(0.5), dec!(2.5), dec!(5)),
            )
            .await
            .unwrap();

        let next = store.reserve(signal("ETHUSDT")).await.unwrap().unwrap();
        assert_eq!(next.slot_id, pos.slot_id, "terminal slot id is recycled");
        assert_eq!(next.track, 2, "cursor advanced after profitable close");
        assert_eq!(next.amount, dec!(51));
        assert_eq!(next.trade_id, pos.trade_id + 1);
    }

    #[tokio::test]
    async fn failed_outcome_keeps_cursor_on_same_track() {
        let dir = tempfile::tempdir().unwrap();
        let store = spawn_store(&dir, 10);

        let pos = store.reserve(signal("BTCUSDT")).await.unwrap().unwrap();
        store
            .finalize(pos.slot_id, pos.trade_id, Outcome::failed())
            .await
            .unwrap();

        let next = store.reserve(signal("BTCUSDT")).await.unwrap().unwrap();
        assert_eq!(next.track, 1);
        assert_eq!(next.amount, dec!(50));
    }

    #[tokio::test]
    async fn state_survives_restart() {
        let dir = tempfile::tempdir().unwrap();
        let (slot_id, trade_id) = {
            let store = spawn_store(&dir, 10);
            let pos = store.reserve(signal("SOLUSDT")).await.unwrap().unwrap();
            store
                .mark_filled(pos.slot_id, pos.trade_id, dec!(99.5), dec!(0.4))
                .await
                .unwrap();
            (pos.slot_id, pos.trade_id)
        };

        let store = spawn_store(&dir, 10);
        let pos = store.slot(slot_id).await.unwrap().expect("slot restored");
        assert_eq!(pos.trade_id, trade_id);
        assert_eq!(pos.status, TradeStatus::Filled);
        assert_eq!(pos.fill_price, Some(dec!(99.5)));
        assert!(!store
            .slot_finished_in_history(&pos.symbol, pos.track, slot_id)
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn set_capacity_clamps_to_track_range() {
        let dir = tempfile::tempdir().unwrap();
        let store = spawn_store(&dir, 10);
        assert_eq!(store.set_capacity(50).await.unwrap(), 10);
        assert_eq!(store.set_capacity(0).await.unwrap(), 1);
        assert_eq!(store.set_capacity(4).await.unwrap(), 4);
    }

    #[tokio::test]
    async fn clear_slot_frees_without_counting() {
        let dir = tempfile::tempdir().unwrap();
        let store = spawn_store(&dir, 10);

        let pos = store.reserve(signal("BTCUSDT")).await.unwrap().unwrap();
        assert!(store.clear_slot(pos.slot_id).await.unwrap());
        assert!(!store.clear_slot(pos.slot_id).await.unwrap());

        let snap = store.snapshot().await.unwrap();
        assert_eq!(snap.open_count, 0);
        assert_eq!(snap.counters.total, 0);
    }
}

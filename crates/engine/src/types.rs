//! Durable state of the capital ladder and the positions it carries.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Lifecycle status of a position.
///
/// `Pending` and `Filled` consume open capacity; the remaining four are
/// terminal. `Stopped` is reserved for forced exits and is never produced
/// by the monitor itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TradeStatus {
    Pending,
    Filled,
    Closed,
    Stopped,
    DrawnDown,
    Failed,
}

impl TradeStatus {
    /// True once the position can no longer change.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::Closed | Self::Stopped | Self::DrawnDown | Self::Failed
        )
    }

    /// True while the position consumes open capacity.
    #[must_use]
    pub const fn is_open(self) -> bool {
        matches!(self, Self::Pending | Self::Filled)
    }
}

impl std::fmt::Display for TradeStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Self::Pending => "pending",
            Self::Filled => "filled",
            Self::Closed => "closed",
            Self::Stopped => "stopped",
            Self::DrawnDown => "drawn_down",
            Self::Failed => "failed",
        };
        write!(f, "{label}")
    }
}

/// An incoming recommendation, already normalized and validated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Signal {
    /// Symbol in canonical form (e.g. `BTCUSDT`).
    pub symbol: String,
    /// Entry ceiling: buying at or below this price is acceptable.
    pub entry: Decimal,
    /// Advisory stop price; breaches notify, they never sell.
    pub stop: Decimal,
    /// Take-profit ladder, strictly ascending.
    pub targets: Vec<Decimal>,
}

/// One open or in-flight position occupying a slot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Position {
    pub symbol: String,
    pub track: u32,
    pub slot_id: u64,
    /// Id of the backing history record.
    pub trade_id: u64,
    pub entry: Decimal,
    pub stop: Decimal,
    pub targets: Vec<Decimal>,
    /// Quote-currency capital planned for this position.
    pub amount: Decimal,
    pub status: TradeStatus,
    pub filled_qty: Option<Decimal>,
    pub fill_price: Option<Decimal>,
    pub started_at: DateTime<Utc>,
    pub filled_at: Option<DateTime<Utc>>,
}

/// One capital lane of the ladder.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackState {
    /// Capital committed by positions opened on this track.
    pub amount: Decimal,
}

/// Aggregate outcome counters, mutated only on terminal transitions.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Counters {
    pub total: u64,
    pub successful: u64,
    pub stopped: u64,
    pub drawdown: u64,
    pub failed: u64,
    /// Successful closes per ISO date.
    #[serde(default)]
    pub daily_successful: BTreeMap<String, u64>,
}

/// The durable ladder state: tracks, slots, counters, and allocation cursors.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LadderState {
    /// Materialized tracks by rank.
    pub tracks: BTreeMap<u32, TrackState>,
    /// Slots by id; a cleared slot keeps its key with no position so the id
    /// can be recycled.
    pub slots: BTreeMap<u64, Option<Position>>,
    /// Maximum simultaneously open positions.
    pub capacity: usize,
    /// Track assigned to the next accepted signal.
    pub next_track: u32,
    /// Next slot id to mint when no slot can be recycled.
    pub next_slot_id: u64,
    pub counters: Counters,
}

impl LadderState {
    /// Fresh state with the given starting capacity.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            tracks: BTreeMap::new(),
            slots: BTreeMap::new(),
            capacity,
            next_track: 1,
            next_slot_id: 1,
            counters: Counters::default(),
        }
    }

    /// Positions currently holding capacity.
    pub fn open_positions(&self) -> impl Iterator<Item = &Position> {
        self.slots
            .values()
            .filter_map(|slot| slot.as_ref())
            .filter(|p| p.status.is_open())
    }
}

/// Append-only record of one position's lifecycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradeRecord {
    pub id: u64,
    pub symbol: String,
    pub track: u32,
    pub slot_id: u64,
    pub entry: Decimal,
    pub stop: Decimal,
    pub targets: Vec<Decimal>,
    pub amount: Decimal,
    pub status: TradeStatus,
    pub opened_at: DateTime<Utc>,
    pub filled_at: Option<DateTime<Utc>>,
    pub closed_at: Option<DateTime<Utc>>,
    pub fill_price: Option<Decimal>,
    pub sell_price: Option<Decimal>,
    pub sell_qty: Option<Decimal>,
    pub pnl_abs: Option<Decimal>,
    pub pnl_pct: Option<Decimal>,
}

/// Read-only view of the whole ladder for status queries.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateSnapshot {
    pub capacity: usize,
    pub open_count: usize,
    pub next_track: u32,
    pub counters: Counters,
    pub tracks: Vec<TrackSnapshot>,
}

/// Read-only view of one track and the position currently on it, if any.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackSnapshot {
    pub track: u32,
    pub amount: Decimal,
    pub positions: Vec<Position>,
}

//! Track and slot allocation over the ladder state.
//!
//! These are pure transitions applied by the store actor: track selection,
//! slot recycling, capacity checks, and outcome accounting.

use chrono::NaiveDate;
use rust_decimal::Decimal;

use crate::types::{Counters, LadderState, TradeStatus, TrackState};

/// Ladder sizing parameters, fixed for the process lifetime.
#[derive(Debug, Clone)]
pub struct LadderSettings {
    /// Capital on track 1.
    pub base_amount: Decimal,
    /// Per-rank geometric growth, percent.
    pub growth_pct: Decimal,
    pub max_tracks: u32,
}

impl LadderSettings {
    /// Capital amount for a track rank: `base * (1 + g)^(rank-1)`, rounded
    /// to cents.
    #[must_use]
    pub fn track_amount(&self, rank: u32) -> Decimal {
        let growth = Decimal::ONE + self.growth_pct / Decimal::ONE_HUNDRED;
        let mut amount = self.base_amount;
        for _ in 1..rank.max(1) {
            amount *= growth;
        }
        amount.round_dp(2)
    }
}

/// Number of positions currently holding capacity.
#[must_use]
pub fn open_count(state: &LadderState) -> usize {
    state.open_positions().count()
}

/// Whether a new position may be opened.
#[must_use]
pub fn capacity_ok(state: &LadderState) -> bool {
    open_count(state) < state.capacity
}

/// Track rank for the next signal: the cursor, clamped to `[1, max_tracks]`.
#[must_use]
pub fn select_track(state: &LadderState, settings: &LadderSettings) -> u32 {
    state.next_track.clamp(1, settings.max_tracks.max(1))
}

/// Materializes a track (and its amount) if it does not exist yet.
pub fn ensure_track(state: &mut LadderState, settings: &LadderSettings, rank: u32) -> Decimal {
    let amount = state
        .tracks
        .entry(rank)
        .or_insert_with(|| TrackState {
            amount: settings.track_amount(rank),
        })
        .amount;
    amount
}

/// Picks a slot id for a new position.
///
/// Prefers a slot whose previous occupant reached a terminal state (freeing
/// it first); otherwise mints a fresh monotonically increasing id. An id is
/// never handed out while its slot holds an open position.
pub fn allocate_slot(state: &mut LadderState) -> u64 {
    let reusable = state
        .slots
        .iter()
        .find(|(_, slot)| match slot {
            None => true,
            Some(pos) => pos.status.is_terminal(),
        })
        .map(|(id, _)| *id);

    if let Some(id) = reusable {
        state.slots.insert(id, None);
        return id;
    }

    let id = state.next_slot_id;
    state.next_slot_id += 1;
    id
}

/// Clamps a requested capacity to `[1, max_tracks]`.
#[must_use]
pub fn clamp_capacity(requested: usize, settings: &LadderSettings) -> usize {
    requested.clamp(1, settings.max_tracks.max(1) as usize)
}

/// Applies a terminal outcome to the aggregate counters and, on a
/// profitable close, advances the track cursor.
///
/// Losing and failed attempts leave the cursor where it is, so capital
/// exposure never escalates off the back of a loss.
pub fn apply_outcome(
    state: &mut LadderState,
    settings: &LadderSettings,
    status: TradeStatus,
    today: NaiveDate,
) {
    debug_assert!(status.is_terminal());
    let counters: &mut Counters = &mut state.counters;
    counters.total += 1;
    match status {
        TradeStatus::Closed => {
            counters.successful += 1;
            *counters
                .daily_successful
                .entry(today.to_string())
                .or_insert(0) += 1;
            state.next_track = (state.next_track + 1).min(settings.max_tracks.max(1));
        }
        TradeStatus::Stopped => counters.stopped += 1,
        TradeStatus::DrawnDown => counters.drawdown += 1,
        TradeStatus::Failed => counters.failed += 1,
        TradeStatus::Pending | TradeStatus::Filled => {}
    }
}

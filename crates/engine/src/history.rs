//! Append-only trade history log.
//!
//! The log is the source of truth for whether a slot is actually finished:
//! slot state and history can diverge after a crash, and recovery prefers
//! history.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::store::StoreError;
use crate::types::{Position, TradeRecord, TradeStatus};

#[derive(Debug, Default, Serialize, Deserialize)]
struct LogFile {
    trades: Vec<TradeRecord>,
}

/// In-memory view of the history log plus its backing file.
#[derive(Debug)]
pub struct TradeLog {
    path: PathBuf,
    trades: Vec<TradeRecord>,
}

impl TradeLog {
    /// Loads the log, starting empty when the file does not exist yet.
    ///
    /// # Errors
    /// Returns an error when the file exists but cannot be read or parsed.
    pub fn load(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        let trades = if path.exists() {
            let raw = std::fs::read_to_string(&path)?;
            let file: LogFile = serde_json::from_str(&raw)?;
            file.trades
        } else {
            Vec::new()
        };
        Ok(Self { path, trades })
    }

    /// Appends a record for a newly reserved position and returns its id.
    pub fn append(&mut self, position: &Position) -> u64 {
        let id = self.trades.iter().map(|t| t.id).max().unwrap_or(0) + 1;
        self.trades.push(TradeRecord {
            id,
            symbol: position.symbol.clone(),
            track: position.track,
            slot_id: position.slot_id,
            entry: position.entry,
            stop: position.stop,
            targets: position.targets.clone(),
            amount: position.amount,
            status: TradeStatus::Pending,
            opened_at: position.started_at,
            filled_at: None,
            closed_at: None,
            fill_price: None,
            sell_price: None,
            sell_qty: None,
            pnl_abs: None,
            pnl_pct: None,
        });
        id
    }

    /// Records a buy execution.
    pub fn mark_filled(
        &mut self,
        trade_id: u64,
        fill_price: Decimal,
        qty: Decimal,
        at: DateTime<Utc>,
    ) {
        if let Some(record) = self.trades.iter_mut().find(|t| t.id == trade_id) {
            record.status = TradeStatus::Filled;
            record.fill_price = Some(fill_price);
            record.sell_qty = Some(qty);
            record.filled_at = Some(at);
        }
    }

    /// Writes the terminal outcome. Returns `false` when the record is
    /// missing or already terminal, leaving it untouched.
    #[allow(clippy::too_many_arguments)]
    pub fn finalize(
        &mut self,
        trade_id: u64,
        status: TradeStatus,
        sell_price: Option<Decimal>,
        sell_qty: Option<Decimal>,
        pnl_abs: Option<Decimal>,
        pnl_pct: Option<Decimal>,
        at: DateTime<Utc>,
    ) -> bool {
        let Some(record) = self.trades.iter_mut().find(|t| t.id == trade_id) else {
            return false;
        };
        if record.status.is_terminal() {
            return false;
        }
        record.status = status;
        record.sell_price = sell_price;
        record.sell_qty = sell_qty.or(record.sell_qty);
        record.pnl_abs = pnl_abs;
        record.pnl_pct = pnl_pct;
        record.closed_at = Some(at);
        true
    }

    /// Record by id.
    #[must_use]
    pub fn record(&self, trade_id: u64) -> Option<&TradeRecord> {
        self.trades.iter().find(|t| t.id == trade_id)
    }

    /// Latest record for a `(symbol, track, slot)` triple, by open time.
    #[must_use]
    pub fn latest_for_slot(&self, symbol: &str, track: u32, slot_id: u64) -> Option<&TradeRecord> {
        self.trades
            .iter()
            .filter(|t| t.symbol == symbol && t.track == track && t.slot_id == slot_id)
            .max_by_key(|t| (t.opened_at, t.id))
    }

    /// Whether the latest record for the triple is terminal.
    #[must_use]
    pub fn is_terminal_for_slot(&self, symbol: &str, track: u32, slot_id: u64) -> bool {
        self.latest_for_slot(symbol, track, slot_id)
            .map(|t| t.status.is_terminal())
            .unwrap_or(false)
    }

    /// Persists the log atomically (write-new then rename).
    ///
    /// # Errors
    /// Returns an error when the file cannot be written.
    pub fn save(&self) -> Result<(), StoreError> {
        let file = LogFile {
            trades: self.trades.clone(),
        };
        write_atomic(&self.path, &serde_json::to_vec_pretty(&file)?)
    }
}

/// Writes `bytes` to `path` via a sibling temp file and rename, so a crash
/// mid-write never truncates the previous version.
pub(crate) fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), StoreError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let tmp = path.with_extension("tmp");
    std::fs::write(&tmp, bytes)?;
    std::fs::rename(&tmp, path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn position(symbol: &str, track: u32, slot_id: u64) -> Position {
        Position {
            symbol: symbol.to_string(),
            track,
            slot_id,
            trade_id: 0,
            entry: dec!(100),
            stop: dec!(90),
            targets: vec![dec!(102)],
            amount: dec!(50),
            status: TradeStatus::Pending,
            filled_qty: None,
            fill_price: None,
            started_at: Utc::now(),
            filled_at: None,
        }
    }

    fn temp_log() -> (tempfile::TempDir, TradeLog) {
        let dir = tempfile::tempdir().unwrap();
        let log = TradeLog::load(dir.path().join("history.json")).unwrap();
        (dir, log)
    }

    #[test]
    fn ids_are_monotonic() {
        let (_dir, mut log) = temp_log();
        let a = log.append(&position("BTCUSDT", 1, 1));
        let b = log.append(&position("ETHUSDT", 2, 2));
        assert_eq!((a, b), (1, 2));
    }

    #[test]
    fn finalize_is_single_shot() {
        let (_dir, mut log) = temp_log();
        let id = log.append(&position("BTCUSDT", 1, 1));
        log.mark_filled(id, dec!(100), dec!(0.5), Utc::now());

        assert!(log.finalize(
            id,
            TradeStatus::Closed,
            Some(dec!(105)),
            Some(dec!(0.5)),
            Some(dec!(2.5)),
            Some(dec!(5)),
            Utc::now(),
        ));
        assert!(!log.finalize(
            id,
            TradeStatus::Failed,
            None,
            None,
            None,
            None,
            Utc::now(),
        ));
        assert_eq!(log.record(id).unwrap().status, TradeStatus::Closed);
    }

    #[test]
    fn latest_for_slot_prefers_newest_open_time() {
        let (_dir, mut log) = temp_log();
        let mut old = position("BTCUSDT", 1, 1);
        old.started_at = Utc::now() - chrono::Duration::hours(2);
        let old_id = log.append(&old);
        log.finalize(
            old_id,
            TradeStatus::Closed,
            None,
            None,
            None,
            None,
            Utc::now(),
        );

        let new_id = log.append(&position("BTCUSDT", 1, 1));
        let latest = log.latest_for_slot("BTCUSDT", 1, 1).unwrap();
        assert_eq!(latest.id, new_id);
        assert!(!log.is_terminal_for_slot("BTCUSDT", 1, 1));
    }

    #[test]
    fn reload_round_trips_records() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("history.json");
        let mut log = TradeLog::load(&path).unwrap();
        let id = log.append(&position("SOLUSDT", 3, 7));
        log.save().unwrap();

        let reloaded = TradeLog::load(&path).unwrap();
        let record = reloaded.record(id).unwrap();
        assert_eq!(record.symbol, "SOLUSDT");
        assert_eq!(record.slot_id, 7);
        assert_eq!(record.status, TradeStatus::Pending);
    }
}

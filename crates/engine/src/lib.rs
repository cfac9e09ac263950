//! Position lifecycle engine: capital-ladder allocation, per-position
//! monitoring, crash recovery, and drawdown aggregation.

pub mod allocator;
pub mod drawdown;
pub mod engine;
pub mod gate;
pub mod history;
pub mod monitor;
pub mod recovery;
pub mod store;
pub mod types;

pub use drawdown::{DrawdownLine, DrawdownSweeper, SweepConfig};
pub use engine::{EngineError, ExitReport, SignalDecision, TradeEngine};
pub use gate::BlacklistGate;
pub use monitor::{
    classify_return, EntryFailure, ExitFailure, ExitTrigger, LadderTracker, MonitorConfig,
    MonitorDeps, PositionMonitor,
};
pub use recovery::{RecoveryManager, RecoverySummary};
pub use store::{
    FinalizeReceipt, LadderSettings, Outcome, RejectReason, StoreActor, StoreError, StoreHandle,
};
pub use types::{
    Counters, LadderState, Position, Signal, StateSnapshot, TradeRecord, TradeStatus,
    TrackSnapshot,
};

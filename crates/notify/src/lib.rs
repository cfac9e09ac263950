//! Outbound notification adapters.
//!
//! Message delivery is best-effort by contract: sends are queued to a
//! background worker and failures are logged, never propagated into the
//! position engine's control flow.

pub mod null;
pub mod telegram;

pub use null::NullNotifier;
pub use telegram::TelegramNotifier;

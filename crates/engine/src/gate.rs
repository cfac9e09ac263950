//! Symbol admission.

use std::collections::HashSet;
use std::path::Path;

use tracing::info;
use tracktrade_core::symbol::normalize_symbol;
use tracktrade_core::traits::AdmissionGate;

/// Gate backed by a JSON file holding a list of blocked symbols.
///
/// The list is read once at construction; an unreadable or missing file
/// yields an empty blacklist.
#[derive(Debug, Default)]
pub struct BlacklistGate {
    blocked: HashSet<String>,
}

impl BlacklistGate {
    /// Loads the blacklist from a JSON array of symbols.
    #[must_use]
    pub fn load(path: &Path) -> Self {
        let blocked = std::fs::read_to_string(path)
            .ok()
            .and_then(|raw| serde_json::from_str::<Vec<String>>(&raw).ok())
            .map(|symbols| {
                symbols
                    .iter()
                    .map(|s| normalize_symbol(s))
                    .collect::<HashSet<_>>()
            })
            .unwrap_or_default();
        info!(count = blocked.len(), path = %path.display(), "blacklist loaded");
        Self { blocked }
    }

    /// Gate over an explicit symbol set.
    #[must_use]
    pub fn from_symbols(symbols: impl IntoIterator<Item = String>) -> Self {
        Self {
            blocked: symbols.into_iter().map(|s| normalize_symbol(&s)).collect(),
        }
    }
}

impl AdmissionGate for BlacklistGate {
    fn allows(&self, symbol: &str) -> bool {
        !self.blocked.contains(&normalize_symbol(symbol))
    }
}

use std::collections::BTreeSet;

use crate::ledger::LedgerSnapshot;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
/// Aggregate counts reported by the `/stats` command.
pub struct LedgerStats {
    pub seen_count: usize,
    pub active_count: usize,
    pub distinct_locales: usize,
}

impl LedgerStats {
    pub fn from_snapshot(snapshot: &LedgerSnapshot) -> Self {
        let locales = snapshot
            .details
            .values()
            .map(|detail| detail.locale_tag.as_str())
            .collect::<BTreeSet<_>>();
        Self {
            seen_count: snapshot.seen.len(),
            active_count: snapshot.active.len(),
            distinct_locales: locales.len(),
        }
    }
}

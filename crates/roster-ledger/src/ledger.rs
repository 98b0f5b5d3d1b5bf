//! Lock-guarded activity ledger mirrored into a durable store.
//!
//! All four collections sit behind a single mutex. Each operation takes the
//! lock once, mutates the in-memory copy, rewrites only the collections that
//! actually changed, and releases the lock. Logging of the outcome happens
//! after the guard is dropped.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex, MutexGuard};

use anyhow::{anyhow, Result};
use chrono::Utc;
use roster_core::{load_or_default, save_or_log, DurableStore, StoreKey};

use crate::user::{ObservedUser, UserDetail, UserId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ObservationOutcome {
    pub newly_seen: bool,
    pub details_changed: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ActivityOutcome {
    pub newly_active: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AdminPromotion {
    pub already_admin: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
/// Point-in-time copy of the reporting collections, taken under one lock acquisition.
pub struct LedgerSnapshot {
    pub seen: BTreeSet<UserId>,
    pub active: BTreeSet<UserId>,
    pub details: BTreeMap<UserId, UserDetail>,
}

#[derive(Debug, Default)]
struct LedgerState {
    seen: BTreeSet<UserId>,
    active: BTreeSet<UserId>,
    details: BTreeMap<UserId, UserDetail>,
    admins: BTreeSet<UserId>,
}

/// Authoritative record of observed, active, and admin users.
pub struct ActivityLedger {
    store: Arc<dyn DurableStore>,
    state: Mutex<LedgerState>,
}

impl ActivityLedger {
    /// Loads every collection from `store`; absent or unreadable collections start empty.
    pub fn load(store: Arc<dyn DurableStore>) -> Self {
        let mut state = LedgerState {
            seen: load_or_default(store.as_ref(), StoreKey::SeenUsers, BTreeSet::new()),
            active: load_or_default(store.as_ref(), StoreKey::ActiveUsers, BTreeSet::new()),
            details: load_or_default(store.as_ref(), StoreKey::UserDetails, BTreeMap::new()),
            admins: load_or_default(store.as_ref(), StoreKey::AdminUsers, BTreeSet::new()),
        };

        let orphaned_active = state
            .active
            .difference(&state.seen)
            .copied()
            .collect::<Vec<_>>();
        if !orphaned_active.is_empty() {
            tracing::warn!(
                count = orphaned_active.len(),
                "active users missing from seen set on load; restoring seen entries"
            );
            state.seen.extend(orphaned_active);
            save_or_log(store.as_ref(), StoreKey::SeenUsers, &state.seen);
        }

        tracing::info!(
            seen = state.seen.len(),
            active = state.active.len(),
            details = state.details.len(),
            admins = state.admins.len(),
            "activity ledger loaded"
        );
        Self {
            store,
            state: Mutex::new(state),
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, LedgerState>> {
        self.state
            .lock()
            .map_err(|_| anyhow!("activity ledger mutex is poisoned"))
    }

    /// Marks `user` as seen and refreshes its detail record when any field changed.
    ///
    /// `first_observed_at` is stamped once and preserved on later updates.
    pub fn record_observation(&self, user: &ObservedUser) -> Result<ObservationOutcome> {
        let outcome = {
            let mut state = self.lock()?;
            let newly_seen = state.seen.insert(user.id);
            if newly_seen {
                save_or_log(self.store.as_ref(), StoreKey::SeenUsers, &state.seen);
            }

            let existing = state.details.get(&user.id);
            let details_changed = !existing.is_some_and(|detail| detail.matches(user));
            if details_changed {
                let first_observed_at = existing
                    .map(|detail| detail.first_observed_at)
                    .unwrap_or_else(Utc::now);
                state.details.insert(
                    user.id,
                    UserDetail {
                        display_name: user.display_name.clone(),
                        handle: user.handle.clone(),
                        locale_tag: user.locale_tag.clone(),
                        first_observed_at,
                    },
                );
                save_or_log(self.store.as_ref(), StoreKey::UserDetails, &state.details);
            }
            ObservationOutcome {
                newly_seen,
                details_changed,
            }
        };

        if outcome.newly_seen {
            tracing::info!(
                user_id = %user.id,
                display_name = user.display_name.as_str(),
                handle = user.handle.as_str(),
                locale = user.locale_tag.as_str(),
                "new user observed"
            );
        } else if outcome.details_changed {
            tracing::info!(
                user_id = %user.id,
                display_name = user.display_name.as_str(),
                handle = user.handle.as_str(),
                "user details updated"
            );
        }
        Ok(outcome)
    }

    /// Marks `user` as active. A user missing from the seen set is added there too.
    pub fn record_activity(&self, user: UserId) -> Result<ActivityOutcome> {
        let (newly_active, repaired_seen) = {
            let mut state = self.lock()?;
            let repaired_seen = state.seen.insert(user);
            if repaired_seen {
                save_or_log(self.store.as_ref(), StoreKey::SeenUsers, &state.seen);
            }
            let newly_active = state.active.insert(user);
            if newly_active {
                save_or_log(self.store.as_ref(), StoreKey::ActiveUsers, &state.active);
            }
            (newly_active, repaired_seen)
        };

        if repaired_seen {
            tracing::warn!(user_id = %user, "activity recorded before observation");
        }
        if newly_active {
            tracing::info!(user_id = %user, "user wrote for the first time");
        }
        Ok(ActivityOutcome { newly_active })
    }

    pub fn promote_to_admin(&self, user: UserId) -> Result<AdminPromotion> {
        let promoted = {
            let mut state = self.lock()?;
            let promoted = state.admins.insert(user);
            if promoted {
                save_or_log(self.store.as_ref(), StoreKey::AdminUsers, &state.admins);
            }
            promoted
        };

        if promoted {
            tracing::info!(user_id = %user, "user promoted to admin");
        } else {
            tracing::info!(user_id = %user, "admin promotion requested by existing admin");
        }
        Ok(AdminPromotion {
            already_admin: !promoted,
        })
    }

    pub fn is_admin(&self, user: UserId) -> Result<bool> {
        Ok(self.lock()?.admins.contains(&user))
    }

    pub fn snapshot(&self) -> Result<LedgerSnapshot> {
        let state = self.lock()?;
        Ok(LedgerSnapshot {
            seen: state.seen.clone(),
            active: state.active.clone(),
            details: state.details.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;
    use std::sync::Arc;

    use roster_core::{DurableStore, JsonFileStore, MemoryStore, StoreKey};
    use tempfile::tempdir;

    use super::ActivityLedger;
    use crate::user::{ObservedUser, UserId};

    fn observed(id: u64, name: &str, handle: &str, locale: &str) -> ObservedUser {
        ObservedUser::new(UserId(id), Some(name), Some(handle), Some(locale))
    }

    fn memory_ledger() -> (Arc<MemoryStore>, ActivityLedger) {
        let store = Arc::new(MemoryStore::new());
        let ledger = ActivityLedger::load(store.clone());
        (store, ledger)
    }

    #[test]
    fn unit_first_observation_marks_seen_and_stores_details() {
        let (store, ledger) = memory_ledger();
        let outcome = ledger
            .record_observation(&observed(1, "Dana", "dana", "he"))
            .expect("observe");
        assert!(outcome.newly_seen);
        assert!(outcome.details_changed);
        assert_eq!(store.write_count(StoreKey::SeenUsers), 1);
        assert_eq!(store.write_count(StoreKey::UserDetails), 1);

        let snapshot = ledger.snapshot().expect("snapshot");
        assert!(snapshot.seen.contains(&UserId(1)));
        assert_eq!(snapshot.details[&UserId(1)].display_name, "Dana");
    }

    #[test]
    fn unit_repeated_identical_observation_is_idempotent() {
        let (store, ledger) = memory_ledger();
        let user = observed(1, "Dana", "dana", "he");
        ledger.record_observation(&user).expect("first");
        let writes_before = store.total_writes();

        let second = ledger.record_observation(&user).expect("second");
        assert!(!second.newly_seen);
        assert!(!second.details_changed);
        assert_eq!(store.total_writes(), writes_before);
    }

    #[test]
    fn unit_first_observed_at_survives_detail_changes() {
        let (store, ledger) = memory_ledger();
        ledger
            .record_observation(&observed(9, "Avi", "", "en"))
            .expect("first");
        let stamped = ledger.snapshot().expect("snapshot").details[&UserId(9)].first_observed_at;

        std::thread::sleep(std::time::Duration::from_millis(5));
        let outcome = ledger
            .record_observation(&observed(9, "Avraham", "avi", "he"))
            .expect("rename");
        assert!(!outcome.newly_seen);
        assert!(outcome.details_changed);
        assert_eq!(store.write_count(StoreKey::SeenUsers), 1);
        assert_eq!(store.write_count(StoreKey::UserDetails), 2);

        let detail = ledger.snapshot().expect("snapshot").details[&UserId(9)].clone();
        assert_eq!(detail.display_name, "Avraham");
        assert_eq!(detail.handle, "avi");
        assert_eq!(detail.first_observed_at, stamped);
    }

    #[test]
    fn unit_record_activity_persists_only_on_first_activity() {
        let (store, ledger) = memory_ledger();
        ledger
            .record_observation(&observed(3, "Lior", "", "he"))
            .expect("observe");
        assert!(ledger.record_activity(UserId(3)).expect("first").newly_active);
        assert!(!ledger.record_activity(UserId(3)).expect("second").newly_active);
        assert_eq!(store.write_count(StoreKey::ActiveUsers), 1);
    }

    #[test]
    fn regression_active_users_always_remain_seen() {
        let (_store, ledger) = memory_ledger();
        ledger.record_activity(UserId(11)).expect("activity first");
        for id in 1..=5 {
            ledger
                .record_observation(&observed(id, "user", "", "en"))
                .expect("observe");
            if id % 2 == 0 {
                ledger.record_activity(UserId(id)).expect("activity");
            }
        }
        let snapshot = ledger.snapshot().expect("snapshot");
        assert!(snapshot.active.is_subset(&snapshot.seen));
        assert!(snapshot.seen.contains(&UserId(11)));
    }

    #[test]
    fn unit_admin_bootstrap_is_idempotent() {
        let (store, ledger) = memory_ledger();
        assert!(!ledger.is_admin(UserId(77)).expect("is_admin"));
        assert!(!ledger.promote_to_admin(UserId(77)).expect("promote").already_admin);
        assert!(ledger.is_admin(UserId(77)).expect("is_admin"));
        assert!(ledger.promote_to_admin(UserId(77)).expect("again").already_admin);
        assert_eq!(store.write_count(StoreKey::AdminUsers), 1);
        let reloaded = ActivityLedger::load(store.clone());
        assert!(reloaded.is_admin(UserId(77)).expect("reloaded is_admin"));
    }

    #[test]
    fn integration_state_survives_reload_from_json_files() {
        let temp = tempdir().expect("tempdir");
        let store: Arc<dyn DurableStore> =
            Arc::new(JsonFileStore::open(temp.path()).expect("open store"));
        {
            let ledger = ActivityLedger::load(store.clone());
            ledger
                .record_observation(&observed(1, "Dana", "dana", "he"))
                .expect("observe 1");
            ledger
                .record_observation(&observed(2, "Eli", "", "en"))
                .expect("observe 2");
            ledger.record_activity(UserId(2)).expect("activity");
            ledger.promote_to_admin(UserId(1)).expect("promote");
        }

        let reloaded = ActivityLedger::load(store);
        let snapshot = reloaded.snapshot().expect("snapshot");
        assert_eq!(snapshot.seen, BTreeSet::from([UserId(1), UserId(2)]));
        assert_eq!(snapshot.active, BTreeSet::from([UserId(2)]));
        assert_eq!(snapshot.details[&UserId(1)].handle, "dana");
        assert!(reloaded.is_admin(UserId(1)).expect("is_admin"));
    }

    #[test]
    fn regression_load_restores_seen_entries_for_orphaned_active_users() {
        let store = Arc::new(MemoryStore::new());
        store.insert_raw(StoreKey::SeenUsers, "[1]");
        store.insert_raw(StoreKey::ActiveUsers, "[1, 4]");
        let ledger = ActivityLedger::load(store.clone());
        let snapshot = ledger.snapshot().expect("snapshot");
        assert_eq!(snapshot.seen, BTreeSet::from([UserId(1), UserId(4)]));
        assert_eq!(store.write_count(StoreKey::SeenUsers), 1);
    }

    #[test]
    fn regression_failed_writes_keep_memory_state_authoritative() {
        let (store, ledger) = memory_ledger();
        store.set_fail_writes(true);
        let outcome = ledger
            .record_observation(&observed(5, "Maya", "", "he"))
            .expect("observe despite store failure");
        assert!(outcome.newly_seen);
        assert!(ledger.snapshot().expect("snapshot").seen.contains(&UserId(5)));
        assert!(store.raw(StoreKey::SeenUsers).is_none());
    }

    #[test]
    fn functional_concurrent_callers_keep_snapshots_consistent() {
        let (_store, ledger) = memory_ledger();
        let ledger = Arc::new(ledger);
        let writers = (0..4_u64)
            .map(|worker| {
                let ledger = ledger.clone();
                std::thread::spawn(move || {
                    for offset in 0..50_u64 {
                        let id = worker * 1_000 + offset;
                        ledger
                            .record_observation(&observed(id, "user", "", "en"))
                            .expect("observe");
                        if offset % 3 == 0 {
                            ledger.record_activity(UserId(id)).expect("activity");
                        }
                    }
                })
            })
            .collect::<Vec<_>>();

        for _ in 0..20 {
            let snapshot = ledger.snapshot().expect("snapshot");
            assert!(snapshot.active.is_subset(&snapshot.seen));
        }
        for writer in writers {
            writer.join().expect("writer thread");
        }
        let snapshot = ledger.snapshot().expect("snapshot");
        assert_eq!(snapshot.seen.len(), 200);
        assert_eq!(snapshot.active.len(), 4 * 17);
    }
}

//! Snapshot reconciliation.
//!
//! Compares the stored entries of one source with a freshly fetched remote
//! snapshot and splits them into rows to create, rows to update and rows
//! to tombstone. Nothing here touches the database; the storage layer
//! applies a [`DiffResult`] in one transaction.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};

use crate::models::{BdListEntry, ServemeRecord, SteamId};

/// An entry that can be reconciled by player id.
pub trait Reconcile: Clone {
    fn key(&self) -> SteamId;

    /// True when `remote` carries a change worth writing over `self`.
    fn differs(&self, remote: &Self) -> bool;

    /// `self` with the remote fields applied, keeping local identity.
    fn merge(&self, remote: &Self, now: DateTime<Utc>) -> Self;
}

impl Reconcile for BdListEntry {
    fn key(&self) -> SteamId {
        self.steam_id
    }

    fn differs(&self, remote: &Self) -> bool {
        self.last_name != remote.last_name
            || self.last_seen.timestamp() != remote.last_seen.timestamp()
            || self.attributes_csv() != remote.attributes_csv()
            || self.proof != remote.proof
    }

    fn merge(&self, remote: &Self, now: DateTime<Utc>) -> Self {
        Self {
            attributes: BdListEntry::normalize_attributes(&remote.attributes),
            proof: remote.proof.clone(),
            last_seen: remote.last_seen,
            last_name: remote.last_name.clone(),
            deleted: false,
            updated_on: now,
            ..self.clone()
        }
    }
}

impl Reconcile for ServemeRecord {
    fn key(&self) -> SteamId {
        self.steam_id
    }

    fn differs(&self, remote: &Self) -> bool {
        self.name != remote.name || self.reason != remote.reason
    }

    fn merge(&self, remote: &Self, now: DateTime<Utc>) -> Self {
        Self {
            name: remote.name.clone(),
            reason: remote.reason.clone(),
            deleted: false,
            updated_on: now,
            ..self.clone()
        }
    }
}

/// Result of reconciling one source.
#[derive(Debug, Clone)]
pub struct DiffResult<T> {
    /// Remote entries with no local counterpart
    pub new: Vec<T>,
    /// Local entries merged with their changed remote counterpart
    pub updated: Vec<T>,
    /// Local entries missing from the remote snapshot
    pub deleted: Vec<T>,
    /// Entries present on both sides without a change
    pub unchanged: usize,
}

impl<T> Default for DiffResult<T> {
    fn default() -> Self {
        Self {
            new: Vec::new(),
            updated: Vec::new(),
            deleted: Vec::new(),
            unchanged: 0,
        }
    }
}

impl<T> DiffResult<T> {
    /// Check if there are any changes.
    pub fn has_changes(&self) -> bool {
        !self.new.is_empty() || !self.updated.is_empty() || !self.deleted.is_empty()
    }

    /// Get the total number of changes.
    pub fn change_count(&self) -> usize {
        self.new.len() + self.updated.len() + self.deleted.len()
    }
}

/// Three-way diff keyed by player id.
#[derive(Debug, Clone, Copy, Default)]
pub struct DiffCalculator;

impl DiffCalculator {
    pub fn new() -> Self {
        Self
    }

    /// Diff `local` against `remote`. Output order follows the input order;
    /// a key repeated on one side counts once, first occurrence wins.
    pub fn calculate<T: Reconcile>(&self, local: &[T], remote: &[T], now: DateTime<Utc>) -> DiffResult<T> {
        let mut local_map: HashMap<SteamId, &T> = HashMap::with_capacity(local.len());
        for entry in local {
            local_map.entry(entry.key()).or_insert(entry);
        }

        let mut result = DiffResult::default();
        let mut seen: HashSet<SteamId> = HashSet::with_capacity(remote.len());

        for incoming in remote {
            let key = incoming.key();
            if !seen.insert(key) {
                continue;
            }
            match local_map.get(&key) {
                None => result.new.push(incoming.clone()),
                Some(existing) if existing.differs(incoming) => {
                    result.updated.push(existing.merge(incoming, now));
                }
                Some(_) => result.unchanged += 1,
            }
        }

        let mut removed: HashSet<SteamId> = HashSet::new();
        for entry in local {
            let key = entry.key();
            if !seen.contains(&key) && removed.insert(key) {
                result.deleted.push(entry.clone());
            }
        }
        result
    }
}

/// Convenience function to calculate a diff.
pub fn calculate_diff<T: Reconcile>(local: &[T], remote: &[T], now: DateTime<Utc>) -> DiffResult<T> {
    DiffCalculator::new().calculate(local, remote, now)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(account: u32, name: &str) -> BdListEntry {
        let now = DateTime::from_timestamp(1_700_000_000, 0).unwrap();
        BdListEntry {
            entry_id: account as i64,
            list_id: 1,
            steam_id: SteamId::from_account_id(account).unwrap(),
            attributes: vec!["cheater".into()],
            proof: Vec::new(),
            last_seen: now,
            last_name: name.to_string(),
            deleted: false,
            created_on: now,
            updated_on: now,
        }
    }

    #[test]
    fn scraper_diff_scenario() {
        let local = vec![entry(1, "player1"), entry(2, "player2")];
        let remote = vec![entry(2, "player2-edit"), entry(3, "player3")];

        let result = calculate_diff(&local, &remote, Utc::now());
        assert_eq!(result.new.len(), 1);
        assert_eq!(result.new[0].steam_id.as_u64(), 76561197960265731);
        assert_eq!(result.updated.len(), 1);
        assert_eq!(result.updated[0].steam_id.as_u64(), 76561197960265730);
        assert_eq!(result.updated[0].last_name, "player2-edit");
        assert_eq!(result.updated[0].entry_id, 2);
        assert_eq!(result.deleted.len(), 1);
        assert_eq!(result.deleted[0].steam_id.as_u64(), 76561197960265729);
    }

    #[test]
    fn same_snapshot_twice_is_a_no_op() {
        let local = vec![entry(1, "a"), entry(2, "b")];
        let remote = vec![entry(3, "c"), entry(2, "b-edit")];
        let now = Utc::now();
        let first = calculate_diff(&local, &remote, now);

        // The stored state after applying the first diff.
        let mut applied: Vec<BdListEntry> = first.new.clone();
        applied.extend(first.updated.clone());

        let second = calculate_diff(&applied, &remote, now);
        assert!(!second.has_changes());
        assert_eq!(second.unchanged, 2);
    }

    #[test]
    fn counts_cover_the_union() {
        let local = vec![entry(1, "a"), entry(2, "b"), entry(4, "d")];
        let remote = vec![entry(2, "b"), entry(3, "c"), entry(4, "d2"), entry(5, "e")];
        let result = calculate_diff(&local, &remote, Utc::now());

        let union: HashSet<SteamId> = local.iter().chain(&remote).map(|e| e.steam_id).collect();
        assert_eq!(result.change_count() + result.unchanged, union.len());
    }

    #[test]
    fn attribute_order_is_not_a_change() {
        let mut local = entry(1, "a");
        local.attributes = vec!["bot".into(), "cheater".into()];
        let mut remote = entry(1, "a");
        remote.attributes = vec!["Cheater".into(), "bot".into()];
        assert!(!local.differs(&remote));

        remote.proof = vec!["demo".into()];
        assert!(local.differs(&remote));
    }

    #[test]
    fn serveme_reason_change_is_an_update() {
        let now = Utc::now();
        let record = |reason: &str| ServemeRecord {
            steam_id: SteamId::from_account_id(9).unwrap(),
            name: "x".into(),
            reason: reason.into(),
            deleted: false,
            created_on: now,
            updated_on: now,
        };
        let result = calculate_diff(&[record("old")], &[record("new")], now);
        assert_eq!(result.updated.len(), 1);
        assert_eq!(result.updated[0].reason, "new");
        assert!(result.new.is_empty() && result.deleted.is_empty());
    }

    #[test]
    fn empty_sides() {
        let remote = vec![entry(1, "a")];
        let result = calculate_diff(&[], &remote, Utc::now());
        assert_eq!(result.new.len(), 1);

        let result = calculate_diff(&remote, &[], Utc::now());
        assert_eq!(result.deleted.len(), 1);
    }
}

//! Persistent per-requester account records.
//!
//! Includes:
//! - Usage counting and the premium/admin flags backing watermark decisions
//! - Whole-file JSON persistence with temp-file + atomic-rename rewrites
//! - Per-record read-modify-write serialization via map entry locking

use crate::common::errors::{PipelineError, Result};
use chrono::{Duration, Local, NaiveDate};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use log::info;
use serde::{Deserialize, Serialize};
use std::{
    collections::BTreeMap,
    fs,
    path::{Path, PathBuf},
    sync::Mutex,
};

/// One durable record per requester identity. Created lazily on first
/// activity, never deleted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    #[serde(default)]
    pub uses: u64,
    #[serde(default, skip_serializing_if = "is_false")]
    pub is_admin: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub premium_until: Option<NaiveDate>,
}

fn is_false(b: &bool) -> bool {
    !*b
}

impl Account {
    /// Premium on `today`: admins always, otherwise strictly before the
    /// stored expiry. The expiry date itself counts as expired.
    pub fn is_premium_on(&self, today: NaiveDate) -> bool {
        if self.is_admin {
            return true;
        }
        self.premium_until.is_some_and(|until| today < until)
    }
}

/// Durable identity -> [`Account`] mapping. Every mutation rewrites the whole
/// file; the temp + rename discipline means a failed write never leaves a
/// half-updated mapping behind.
pub struct AccountStore {
    path: PathBuf,
    records: DashMap<String, Account>,
    flush_lock: Mutex<()>,
}

impl AccountStore {
    /// Load the store from `path`, creating an empty one (and its parent
    /// directory) if the file does not exist yet.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|source| PipelineError::StorageIo {
                path: parent.to_path_buf(),
                source,
            })?;
        }

        let records = DashMap::new();
        if path.exists() {
            let bytes = fs::read(&path).map_err(|source| PipelineError::StorageIo {
                path: path.clone(),
                source,
            })?;
            let loaded: BTreeMap<String, Account> = serde_json::from_slice(&bytes)
                .map_err(|source| PipelineError::StorageCodec {
                    path: path.clone(),
                    source,
                })?;
            info!("Loaded {} account records from {:?}", loaded.len(), path);
            for (identity, account) in loaded {
                records.insert(identity, account);
            }
        }

        Ok(AccountStore {
            path,
            records,
            flush_lock: Mutex::new(()),
        })
    }

    /// Premium right now. Pure read.
    pub fn is_premium(&self, identity: &str) -> bool {
        self.is_premium_on(identity, Local::now().date_naive())
    }

    /// Clock-injected variant of [`Self::is_premium`].
    pub fn is_premium_on(&self, identity: &str, today: NaiveDate) -> bool {
        self.records
            .get(identity)
            .map(|account| account.is_premium_on(today))
            .unwrap_or(false)
    }

    /// Current usage count, zero for unknown identities. Pure read.
    pub fn usage(&self, identity: &str) -> u64 {
        self.records
            .get(identity)
            .map(|account| account.uses)
            .unwrap_or(0)
    }

    /// Increment usage by one, creating the account if absent, and flush.
    /// Returns the new count.
    pub fn record_usage(&self, identity: &str) -> Result<u64> {
        self.mutate(identity, |account| {
            account.uses += 1;
            account.uses
        })
    }

    /// Set the premium expiry to today + `days`, overwriting any existing
    /// grant (no stacking). Returns the new expiry date.
    pub fn grant_premium(&self, identity: &str, days: i64) -> Result<NaiveDate> {
        let until = Local::now().date_naive() + Duration::days(days);
        self.mutate(identity, |account| {
            account.premium_until = Some(until);
        })?;
        info!("Granted premium to {} until {}", identity, until);
        Ok(until)
    }

    /// Mark the identity as admin (permanent, implicitly premium). Idempotent.
    pub fn grant_admin(&self, identity: &str) -> Result<()> {
        self.mutate(identity, |account| {
            account.is_admin = true;
        })
    }

    /// Apply one read-modify-write and flush it. Reads must keep reflecting
    /// the latest flushed state, so a failed flush rolls the record back to
    /// what it was before `op` ran (removing it again if `op` created it).
    /// Mutations for the same identity are serialized by the caller.
    fn mutate<T>(&self, identity: &str, op: impl FnOnce(&mut Account) -> T) -> Result<T> {
        let (prior, out) = match self.records.entry(identity.to_string()) {
            Entry::Occupied(mut occupied) => {
                let prior = Some(occupied.get().clone());
                let out = op(occupied.get_mut());
                (prior, out)
            }
            Entry::Vacant(vacant) => {
                let mut account = Account::default();
                let out = op(&mut account);
                vacant.insert(account);
                (None, out)
            }
        };

        if let Err(err) = self.flush() {
            match prior {
                Some(account) => {
                    self.records.insert(identity.to_string(), account);
                }
                None => {
                    self.records.remove(identity);
                }
            }
            return Err(err);
        }
        Ok(out)
    }

    /// One line per known account, sorted by identity. Backs the admin
    /// `stats` command; the caller enforces the admin check.
    pub fn usage_report(&self) -> String {
        let snapshot = self.snapshot();
        let mut lines = Vec::with_capacity(snapshot.len());
        for (identity, account) in snapshot {
            let premium = match account.premium_until {
                Some(until) => until.to_string(),
                None => "never".to_string(),
            };
            lines.push(format!(
                "{}: uses={}, admin={}, premium_until={}",
                identity, account.uses, account.is_admin, premium
            ));
        }
        lines.join("\n")
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn snapshot(&self) -> BTreeMap<String, Account> {
        self.records
            .iter()
            .map(|r| (r.key().clone(), r.value().clone()))
            .collect()
    }

    /// Rewrite the whole mapping: serialize a snapshot, write it next to the
    /// live file, then atomically rename over it. A second mutation arriving
    /// mid-flush waits on the flush lock and writes a newer snapshot after.
    fn flush(&self) -> Result<()> {
        let _guard = self.flush_lock.lock().unwrap_or_else(|e| e.into_inner());

        let json = serde_json::to_vec_pretty(&self.snapshot()).map_err(|source| {
            PipelineError::StorageCodec {
                path: self.path.clone(),
                source,
            }
        })?;

        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, &json).map_err(|source| PipelineError::StorageIo {
            path: tmp.clone(),
            source,
        })?;
        fs::rename(&tmp, &self.path).map_err(|source| PipelineError::StorageIo {
            path: self.path.clone(),
            source,
        })?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store_in(dir: &Path) -> AccountStore {
        AccountStore::open(dir.join("accounts.json")).unwrap()
    }

    #[test]
    fn usage_counts_persist_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(dir.path());

        assert_eq!(store.usage("alice"), 0);
        assert_eq!(store.record_usage("alice").unwrap(), 1);
        assert_eq!(store.record_usage("alice").unwrap(), 2);
        assert_eq!(store.record_usage("bob").unwrap(), 1);

        let reopened = store_in(dir.path());
        assert_eq!(reopened.usage("alice"), 2);
        assert_eq!(reopened.usage("bob"), 1);
        assert_eq!(reopened.usage("carol"), 0);
    }

    #[test]
    fn premium_expiry_boundary_is_exclusive() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(dir.path());
        let until = store.grant_premium("alice", 14).unwrap();

        assert!(store.is_premium_on("alice", until - Duration::days(1)));
        // The stored date itself counts as expired.
        assert!(!store.is_premium_on("alice", until));
        assert!(!store.is_premium_on("alice", until + Duration::days(1)));
    }

    #[test]
    fn premium_regrant_overwrites_instead_of_stacking() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(dir.path());

        let first = store.grant_premium("alice", 30).unwrap();
        let second = store.grant_premium("alice", 7).unwrap();
        assert!(second < first);
        assert!(!store.is_premium_on("alice", second));
    }

    #[test]
    fn admin_is_premium_regardless_of_expiry() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(dir.path());
        store.grant_admin("root").unwrap();
        store.grant_admin("root").unwrap(); // idempotent

        let far_future = NaiveDate::from_ymd_opt(2999, 1, 1).unwrap();
        assert!(store.is_premium_on("root", far_future));
        assert!(store.is_premium("root"));
    }

    #[test]
    fn unknown_identity_is_not_premium() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(dir.path());
        assert!(!store.is_premium("ghost"));
    }

    #[test]
    fn flush_leaves_no_temp_file_behind() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(dir.path());
        store.record_usage("alice").unwrap();

        assert!(store.path().exists());
        assert!(!dir.path().join("accounts.json.tmp").exists());
    }

    #[test]
    fn failed_flush_rolls_the_record_back() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(dir.path());
        store.record_usage("alice").unwrap();

        // Make the rename target un-replaceable so the next flush fails.
        fs::remove_file(store.path()).unwrap();
        fs::create_dir(store.path()).unwrap();

        let err = store.record_usage("alice").unwrap_err();
        assert!(matches!(err, PipelineError::StorageIo { .. }));
        // Reads still reflect the last flushed state, not the failed write.
        assert_eq!(store.usage("alice"), 1);

        // Once the path is writable again the count picks up from the
        // flushed value, with no phantom increment carried over.
        fs::remove_dir(store.path()).unwrap();
        assert_eq!(store.record_usage("alice").unwrap(), 2);
        let reopened = store_in(dir.path());
        assert_eq!(reopened.usage("alice"), 2);
    }

    #[test]
    fn failed_flush_removes_a_record_it_created() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(dir.path());
        store.record_usage("alice").unwrap();

        fs::remove_file(store.path()).unwrap();
        fs::create_dir(store.path()).unwrap();

        store.grant_admin("root").unwrap_err();
        store.grant_premium("bob", 14).unwrap_err();

        // Neither identity existed before, so neither may linger in memory.
        assert!(!store.is_premium("root"));
        assert!(!store.is_premium("bob"));
        let report = store.usage_report();
        assert_eq!(report.lines().count(), 1);
        assert!(report.starts_with("alice: "));
    }

    #[test]
    fn report_lists_every_account_sorted() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(dir.path());
        store.record_usage("bob").unwrap();
        store.grant_admin("admin").unwrap();

        let report = store.usage_report();
        let lines: Vec<&str> = report.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("admin: "));
        assert!(lines[1].starts_with("bob: uses=1"));
    }

    #[test]
    fn legacy_records_with_missing_fields_deserialize() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("accounts.json");
        fs::write(
            &path,
            r#"{"alice": {"uses": 2}, "root": {"is_admin": true}}"#,
        )
        .unwrap();

        let store = AccountStore::open(&path).unwrap();
        assert_eq!(store.usage("alice"), 2);
        assert!(store.is_premium("root"));
    }
}

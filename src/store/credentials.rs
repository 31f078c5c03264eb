//! File-backed credential store with per-credential usage and health tracking.
//!
//! The record on disk looks like:
//!
//! ```json
//! {"keys": ["..."], "key_status": {"...": {"is_active": true, "usage_count": 3, ...}}}
//! ```
//!
//! When a runtime override credential is supplied the store is ephemeral: it
//! holds just that credential and never touches the file.

use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::errors::StoreError;
use crate::rotation;

fn default_active() -> bool {
    true
}

/// Usage and health metadata for one credential.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CredentialStatus {
    #[serde(default = "default_active")]
    pub is_active: bool,
    #[serde(default)]
    pub usage_count: u64,
    #[serde(default)]
    pub last_used: Option<String>,
    #[serde(default)]
    pub deactivated_at: Option<String>,
    #[serde(default)]
    pub deactivation_reason: Option<String>,
    /// Fields written by other tools, kept so a save does not drop them.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl Default for CredentialStatus {
    fn default() -> Self {
        Self {
            is_active: true,
            usage_count: 0,
            last_used: None,
            deactivated_at: None,
            deactivation_reason: None,
            extra: serde_json::Map::new(),
        }
    }
}

/// Per-credential statuses in the order they appear on disk.
pub type StatusMap = IndexMap<String, CredentialStatus>;

/// The persisted shape of the store.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CredentialRecord {
    #[serde(default)]
    pub keys: Vec<String>,
    #[serde(default)]
    pub key_status: StatusMap,
}

impl CredentialRecord {
    fn dedup_keys(&mut self) {
        let mut seen = std::collections::HashSet::new();
        self.keys.retain(|k| seen.insert(k.clone()));
    }
}

/// Shared credential table. Mutations take `write_lock` for their whole
/// duration so persisted snapshots are written in mutation order.
pub struct CredentialStore {
    path: PathBuf,
    ephemeral: bool,
    state: Mutex<CredentialRecord>,
    write_lock: Mutex<()>,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

fn now() -> String {
    chrono::Utc::now().to_rfc3339()
}

/// Show only a short prefix of a secret for logs and listings.
pub fn mask_credential(key: &str) -> String {
    let prefix: String = key.chars().take(6).collect();
    if prefix.len() < key.len() {
        format!("{}...", prefix)
    } else {
        "***".to_string()
    }
}

impl CredentialStore {
    /// Build the store. A non-blank `override_key` wins over the file and
    /// makes the store ephemeral; otherwise the record at `path` is read,
    /// or an empty table is used when no record exists yet.
    pub fn load(path: impl Into<PathBuf>, override_key: Option<&str>) -> Result<Self, StoreError> {
        let path = path.into();

        if let Some(key) = override_key.map(str::trim).filter(|k| !k.is_empty()) {
            let mut record = CredentialRecord::default();
            record.keys.push(key.to_string());
            record
                .key_status
                .insert(key.to_string(), CredentialStatus::default());
            tracing::info!("using runtime credential override; credential record will not be written");
            return Ok(Self::from_parts(path, true, record));
        }

        let record = read_record(&path)?;
        tracing::debug!(
            path = %path.display(),
            credentials = record.keys.len(),
            "loaded credential record"
        );
        Ok(Self::from_parts(path, false, record))
    }

    fn from_parts(path: PathBuf, ephemeral: bool, mut record: CredentialRecord) -> Self {
        record.dedup_keys();
        Self {
            path,
            ephemeral,
            state: Mutex::new(record),
            write_lock: Mutex::new(()),
        }
    }

    pub fn is_ephemeral(&self) -> bool {
        self.ephemeral
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Copy of the current in-memory table.
    pub fn snapshot(&self) -> CredentialRecord {
        lock(&self.state).clone()
    }

    pub fn credentials(&self) -> Vec<String> {
        lock(&self.state).keys.clone()
    }

    pub fn status(&self, key: &str) -> Option<CredentialStatus> {
        lock(&self.state).key_status.get(key).cloned()
    }

    /// Persist the current table. Write failures are logged and swallowed;
    /// the in-memory table stays authoritative.
    pub fn save(&self) {
        self.mutate(|_| ());
    }

    /// Apply `f` to the table and persist the result, serialized against
    /// every other mutation.
    fn mutate<R>(&self, f: impl FnOnce(&mut CredentialRecord) -> R) -> R {
        let _writer = lock(&self.write_lock);
        let (result, snapshot) = {
            let mut state = lock(&self.state);
            let result = f(&mut state);
            let snapshot = (!self.ephemeral).then(|| state.clone());
            (result, snapshot)
        };
        if let Some(snapshot) = snapshot {
            write_record(&self.path, &snapshot);
        }
        result
    }

    /// Record one successful use of `key`.
    pub fn mark_used(&self, key: &str) {
        self.mutate(|rec| {
            let status = rec.key_status.entry(key.to_string()).or_default();
            status.usage_count += 1;
            status.last_used = Some(now());
        });
    }

    /// Take `key` out of rotation until the next reactivation.
    pub fn mark_inactive(&self, key: &str, reason: &str) {
        self.mutate(|rec| {
            let status = rec.key_status.entry(key.to_string()).or_default();
            status.is_active = false;
            status.deactivated_at = Some(now());
            status.deactivation_reason = Some(reason.to_string());
        });
        tracing::warn!(
            credential = %mask_credential(key),
            reason = reason,
            "credential deactivated"
        );
    }

    /// Mark every listed credential active again. Returns how many were
    /// inactive before the call.
    pub fn reactivate_all(&self) -> usize {
        self.mutate(reactivate_record)
    }

    /// Choose the credential for the next call: the least-used active one,
    /// ties broken by list order. When every known credential is inactive,
    /// all of them are reactivated first. `None` only if no credential is
    /// known at all.
    pub fn select_credential(&self) -> Option<String> {
        {
            let state = lock(&self.state);
            let active = rotation::active_credentials(&state.keys, &state.key_status);
            if let Some(key) = rotation::least_used(&active, &state.key_status) {
                tracing::debug!(credential = %mask_credential(key), "selected credential");
                return Some(key.to_string());
            }
            if state.keys.is_empty() {
                return None;
            }
        }

        self.mutate(|rec| {
            let reactivated = reactivate_record(rec);
            if reactivated > 0 {
                tracing::warn!(
                    reactivated = reactivated,
                    "all credentials inactive; reactivating every credential"
                );
            }
            let active = rotation::active_credentials(&rec.keys, &rec.key_status);
            rotation::least_used(&active, &rec.key_status).map(str::to_string)
        })
    }

    /// Append a new credential. Returns `false` if it was already known.
    pub fn add_credential(&self, key: &str) -> Result<bool, StoreError> {
        if self.ephemeral {
            return Err(StoreError::ReadOnly);
        }
        let key = key.trim();
        if key.is_empty() {
            return Err(StoreError::EmptyCredential);
        }
        Ok(self.mutate(|rec| {
            if rec.keys.iter().any(|k| k == key) {
                return false;
            }
            rec.keys.push(key.to_string());
            rec.key_status
                .entry(key.to_string())
                .or_insert_with(CredentialStatus::default);
            true
        }))
    }

    /// Drop a credential and its status. Returns `false` if it was unknown.
    pub fn remove_credential(&self, key: &str) -> Result<bool, StoreError> {
        if self.ephemeral {
            return Err(StoreError::ReadOnly);
        }
        let key = key.trim();
        if key.is_empty() {
            return Err(StoreError::EmptyCredential);
        }
        Ok(self.mutate(|rec| {
            let before = rec.keys.len();
            rec.keys.retain(|k| k != key);
            rec.key_status.shift_remove(key);
            rec.keys.len() != before
        }))
    }
}

fn reactivate_record(rec: &mut CredentialRecord) -> usize {
    let mut reactivated = 0;
    for key in &rec.keys {
        let status = rec.key_status.entry(key.clone()).or_default();
        if !status.is_active {
            reactivated += 1;
        }
        status.is_active = true;
    }
    reactivated
}

fn read_record(path: &Path) -> Result<CredentialRecord, StoreError> {
    let bytes = match std::fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Ok(CredentialRecord::default());
        }
        Err(e) => {
            return Err(StoreError::Io {
                path: path.display().to_string(),
                source: e,
            })
        }
    };
    serde_json::from_slice(&bytes).map_err(|e| StoreError::Corrupt {
        path: path.display().to_string(),
        source: e,
    })
}

/// Write to a sibling temp file and rename it over the record, so a crash
/// mid-write never leaves a truncated record behind.
fn write_record(path: &Path, record: &CredentialRecord) {
    let result = serde_json::to_vec_pretty(record)
        .map_err(std::io::Error::from)
        .and_then(|bytes| {
            let mut tmp = path.as_os_str().to_owned();
            tmp.push(".tmp");
            let tmp = PathBuf::from(tmp);
            std::fs::write(&tmp, bytes)?;
            std::fs::rename(&tmp, path)
        });
    if let Err(e) = result {
        tracing::warn!(path = %path.display(), "failed to save credential record: {}", e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store_with(dir: &tempfile::TempDir, keys: &[&str]) -> CredentialStore {
        let path = dir.path().join("api_keys.json");
        let store = CredentialStore::load(&path, None).unwrap();
        for k in keys {
            assert!(store.add_credential(k).unwrap());
        }
        store
    }

    #[test]
    fn test_missing_record_starts_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = CredentialStore::load(dir.path().join("nope.json"), None).unwrap();
        assert!(store.credentials().is_empty());
        assert!(!store.is_ephemeral());
        assert_eq!(store.select_credential(), None);
    }

    #[test]
    fn test_save_then_load_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_with(&dir, &["key-a", "key-b"]);
        store.mark_used("key-a");
        store.mark_used("key-a");
        store.mark_inactive("key-b", "quota_exceeded");
        store.save();

        let reloaded = CredentialStore::load(store.path(), None).unwrap();
        assert_eq!(reloaded.snapshot(), store.snapshot());
        let b = reloaded.status("key-b").unwrap();
        assert!(!b.is_active);
        assert_eq!(b.deactivation_reason.as_deref(), Some("quota_exceeded"));
        assert!(b.deactivated_at.is_some());
        assert_eq!(reloaded.status("key-a").unwrap().usage_count, 2);
    }

    #[test]
    fn test_override_never_writes_record() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("api_keys.json");
        std::fs::write(&path, r#"{"keys": ["disk-key"], "key_status": {}}"#).unwrap();
        let before = std::fs::read(&path).unwrap();

        let store = CredentialStore::load(&path, Some("  env-key  ")).unwrap();
        assert!(store.is_ephemeral());
        assert_eq!(store.credentials(), vec!["env-key".to_string()]);
        let status = store.status("env-key").unwrap();
        assert!(status.is_active);
        assert_eq!(status.usage_count, 0);

        store.mark_used("env-key");
        store.mark_inactive("env-key", "quota_exceeded");
        store.reactivate_all();
        store.save();

        assert_eq!(std::fs::read(&path).unwrap(), before);
        assert_eq!(store.status("env-key").unwrap().usage_count, 1);
    }

    #[test]
    fn test_blank_override_falls_back_to_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("api_keys.json");
        std::fs::write(&path, r#"{"keys": ["disk-key"]}"#).unwrap();
        let store = CredentialStore::load(&path, Some("   ")).unwrap();
        assert!(!store.is_ephemeral());
        assert_eq!(store.credentials(), vec!["disk-key".to_string()]);
    }

    #[test]
    fn test_ephemeral_store_rejects_admin_changes() {
        let dir = tempfile::tempdir().unwrap();
        let store = CredentialStore::load(dir.path().join("k.json"), Some("env-key")).unwrap();
        assert!(matches!(store.add_credential("x"), Err(StoreError::ReadOnly)));
        assert!(matches!(store.remove_credential("env-key"), Err(StoreError::ReadOnly)));
    }

    #[test]
    fn test_mark_used_creates_status_lazily() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("api_keys.json");
        std::fs::write(&path, r#"{"keys": ["k1"], "key_status": {}}"#).unwrap();
        let store = CredentialStore::load(&path, None).unwrap();
        assert!(store.status("k1").is_none());

        store.mark_used("k1");
        let status = store.status("k1").unwrap();
        assert_eq!(status.usage_count, 1);
        assert!(status.is_active);
        assert!(status.last_used.is_some());
    }

    #[test]
    fn test_partial_status_records_get_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("api_keys.json");
        std::fs::write(
            &path,
            r#"{"keys": ["k1", "k2"], "key_status": {"k1": {"usage_count": 4}, "k2": {"is_active": false}}}"#,
        )
        .unwrap();
        let store = CredentialStore::load(&path, None).unwrap();
        let k1 = store.status("k1").unwrap();
        assert!(k1.is_active);
        assert_eq!(k1.usage_count, 4);
        assert_eq!(store.status("k2").unwrap().usage_count, 0);
        assert_eq!(store.select_credential().as_deref(), Some("k1"));
    }

    #[test]
    fn test_unknown_status_fields_survive_save() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("api_keys.json");
        std::fs::write(
            &path,
            r#"{"keys": ["k1"], "key_status": {"k1": {"usage_count": 1, "label": "team-a"}}}"#,
        )
        .unwrap();
        let store = CredentialStore::load(&path, None).unwrap();
        store.mark_used("k1");

        let raw: serde_json::Value = serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
        assert_eq!(raw["key_status"]["k1"]["label"], "team-a");
        assert_eq!(raw["key_status"]["k1"]["usage_count"], 2);
    }

    #[test]
    fn test_duplicate_keys_are_collapsed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("api_keys.json");
        std::fs::write(&path, r#"{"keys": ["a", "b", "a"]}"#).unwrap();
        let store = CredentialStore::load(&path, None).unwrap();
        assert_eq!(store.credentials(), vec!["a".to_string(), "b".to_string()]);
        assert!(!store.add_credential("b").unwrap());
    }

    #[test]
    fn test_corrupt_record_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("api_keys.json");
        std::fs::write(&path, "{not json").unwrap();
        assert!(matches!(
            CredentialStore::load(&path, None),
            Err(StoreError::Corrupt { .. })
        ));
    }

    #[test]
    fn test_write_failure_is_swallowed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing-dir").join("api_keys.json");
        let store = CredentialStore::load(&path, None).unwrap();
        assert!(store.add_credential("k1").unwrap());
        store.mark_used("k1");
        assert_eq!(store.status("k1").unwrap().usage_count, 1);
        assert!(!path.exists());
    }

    #[test]
    fn test_selector_prefers_least_used() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_with(&dir, &["a", "b", "c"]);
        store.mark_used("a");
        store.mark_used("b");
        assert_eq!(store.select_credential().as_deref(), Some("c"));
        store.mark_used("c");
        assert_eq!(store.select_credential().as_deref(), Some("a"));
    }

    #[test]
    fn test_selector_skips_inactive() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_with(&dir, &["a", "b"]);
        store.mark_used("b");
        store.mark_inactive("a", "quota_exceeded");
        assert_eq!(store.select_credential().as_deref(), Some("b"));
    }

    #[test]
    fn test_selector_recovers_when_all_inactive() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_with(&dir, &["a", "b"]);
        store.mark_used("a");
        store.mark_inactive("a", "quota_exceeded");
        store.mark_inactive("b", "quota_exceeded");

        assert_eq!(store.select_credential().as_deref(), Some("b"));
        assert!(store.status("a").unwrap().is_active);
        assert!(store.status("b").unwrap().is_active);

        let persisted = CredentialStore::load(store.path(), None).unwrap();
        assert!(persisted.status("a").unwrap().is_active);
    }

    #[test]
    fn test_reactivate_all_counts_changes() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_with(&dir, &["a", "b", "c"]);
        store.mark_inactive("a", "quota_exceeded");
        store.mark_inactive("c", "quota_exceeded");
        assert_eq!(store.reactivate_all(), 2);
        assert_eq!(store.reactivate_all(), 0);
        assert!(store.status("c").unwrap().is_active);
    }

    #[test]
    fn test_remove_credential() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_with(&dir, &["a", "b"]);
        assert!(store.remove_credential("a").unwrap());
        assert!(!store.remove_credential("a").unwrap());
        assert_eq!(store.credentials(), vec!["b".to_string()]);
        assert!(store.status("a").is_none());
    }

    #[test]
    fn test_blank_credentials_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_with(&dir, &["a"]);
        assert!(matches!(store.add_credential("   "), Err(StoreError::EmptyCredential)));
        assert!(matches!(store.remove_credential(""), Err(StoreError::EmptyCredential)));
        assert_eq!(store.credentials(), vec!["a".to_string()]);
    }

    #[test]
    fn test_remove_trims_like_add() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_with(&dir, &[]);
        assert!(store.add_credential("  key-a \n").unwrap());
        assert!(store.remove_credential(" key-a ").unwrap());
        assert!(store.credentials().is_empty());
    }

    #[test]
    fn test_status_order_survives_save() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("api_keys.json");
        std::fs::write(
            &path,
            r#"{"keys": ["zeta", "alpha", "mid"], "key_status": {"zeta": {"usage_count": 1}, "alpha": {}, "mid": {}}}"#,
        )
        .unwrap();
        let store = CredentialStore::load(&path, None).unwrap();
        store.mark_used("alpha");

        let raw: serde_json::Value = serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
        let order: Vec<&str> = raw["key_status"]
            .as_object()
            .unwrap()
            .keys()
            .map(String::as_str)
            .collect();
        assert_eq!(order, vec!["zeta", "alpha", "mid"]);
    }

    #[test]
    fn test_concurrent_updates_keep_record_valid() {
        let dir = tempfile::tempdir().unwrap();
        let store = std::sync::Arc::new(store_with(&dir, &["k0", "k1", "k2", "k3"]));

        let handles: Vec<_> = (0..8)
            .map(|t| {
                let store = store.clone();
                std::thread::spawn(move || {
                    for i in 0..50 {
                        let key = store.select_credential().unwrap();
                        store.mark_used(&key);
                        if i % 10 == t % 10 {
                            store.mark_inactive(&key, "quota_exceeded");
                        }
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        let total: u64 = store
            .snapshot()
            .key_status
            .values()
            .map(|s| s.usage_count)
            .sum();
        assert_eq!(total, 400);

        let reloaded = CredentialStore::load(store.path(), None).unwrap();
        assert_eq!(reloaded.snapshot(), store.snapshot());
    }

    #[test]
    fn test_mask_credential() {
        assert_eq!(mask_credential("AIzaSyBCBqhxQ3"), "AIzaSy...");
        assert_eq!(mask_credential("short"), "***");
    }
}

//! Credential selection policy: least-used active credential first.
//!
//! Pure functions over the persisted record. The store calls these while it
//! holds its state lock, so selection always sees a consistent table.

use crate::store::credentials::StatusMap;

/// Credentials whose status is active, in list order.
/// A credential with no status record counts as active.
pub fn active_credentials<'a>(
    keys: &'a [String],
    statuses: &StatusMap,
) -> Vec<&'a str> {
    keys.iter()
        .filter(|k| statuses.get(k.as_str()).map_or(true, |s| s.is_active))
        .map(String::as_str)
        .collect()
}

/// Pick the candidate with the smallest usage count.
/// Ties go to the earliest candidate in list order.
pub fn least_used<'a>(
    candidates: &[&'a str],
    statuses: &StatusMap,
) -> Option<&'a str> {
    candidates
        .iter()
        .copied()
        .min_by_key(|k| statuses.get(*k).map_or(0, |s| s.usage_count))
}

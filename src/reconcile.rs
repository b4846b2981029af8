//! Merges a persisted order against what currently exists on disk.
//!
//! ```text
//! persisted order ++ existing names
//!        |
//!        v
//! drop names not in existing set   (stale)
//! drop repeated names, first wins   (duplicate)
//! drop reserved names               (core plugins)
//!        |
//!        v
//! reconciled order (new items appended in scan order)
//! ```

use crate::library::{name_key, Entry};
use std::collections::HashSet;
use tracing::debug;

/// Output of one merge pass, with counts of what was filtered.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Reconciled {
    pub entries: Vec<Entry>,
    pub stale: usize,
    pub duplicates: usize,
    pub reserved: usize,
    pub discovered: usize,
}

/// Builds the reconciled order.
///
/// `persisted` claims priority first; `existing` is both the membership set and
/// the source of newly discovered entries, which are appended inactive in the
/// order given. `reserved` names (compared case-insensitively) never survive.
pub fn reconcile(persisted: Vec<Entry>, existing: &[String], reserved: &[&str]) -> Reconciled {
    let existing_keys: HashSet<String> = existing.iter().map(|name| name_key(name)).collect();
    let reserved_keys: HashSet<String> = reserved.iter().map(|name| name_key(name)).collect();
    let persisted_len = persisted.len();

    let candidates = persisted.into_iter().chain(
        existing
            .iter()
            .map(|name| Entry::new(name.clone(), false)),
    );

    let mut out = Reconciled::default();
    let mut seen = HashSet::new();
    for (index, entry) in candidates.enumerate() {
        let key = name_key(&entry.name);
        if !existing_keys.contains(&key) {
            debug!(name = %entry.name, "dropping stale entry");
            out.stale += 1;
            continue;
        }
        if !seen.insert(key.clone()) {
            if index < persisted_len {
                debug!(name = %entry.name, "collapsing duplicate entry");
                out.duplicates += 1;
            }
            continue;
        }
        if reserved_keys.contains(&key) {
            out.reserved += 1;
            continue;
        }
        if index >= persisted_len {
            out.discovered += 1;
        }
        out.entries.push(entry);
    }
    out
}

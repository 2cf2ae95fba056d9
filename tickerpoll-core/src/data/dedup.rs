//! Dedup merger: set difference of fetched bars against persisted keys.

use crate::domain::{Bar, DedupKey};
use std::collections::HashSet;

/// Keep only candidates whose (ticker, timestamp) is not in `seen`.
///
/// Candidate order is preserved. A key repeated within `candidates` is kept
/// once (first occurrence). Cost is linear in the number of candidates; the
/// caller builds `seen` once per batch.
pub fn dedupe(candidates: Vec<Bar>, seen: &HashSet<DedupKey>) -> Vec<Bar> {
    let mut batch_keys = HashSet::with_capacity(candidates.len());
    candidates
        .into_iter()
        .filter(|bar| {
            let key = bar.key();
            !seen.contains(&key) && batch_keys.insert(key)
        })
        .collect()
}

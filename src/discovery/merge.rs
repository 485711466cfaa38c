//! Candidate de-duplication keyed by `(ip, port)`

use std::collections::HashSet;

use crate::models::DiscoveredCandidate;

/// Append `incoming` to `merged`, skipping keys already present.
/// The first record seen for a key wins. Returns how many were added.
pub fn merge_candidates<I>(merged: &mut Vec<DiscoveredCandidate>, incoming: I) -> usize
where
    I: IntoIterator<Item = DiscoveredCandidate>,
{
    let mut keys: HashSet<_> = merged.iter().map(DiscoveredCandidate::key).collect();
    let before = merged.len();
    for candidate in incoming {
        if keys.insert(candidate.key()) {
            merged.push(candidate);
        }
    }
    merged.len() - before
}

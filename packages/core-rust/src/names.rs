//! Listener-name list merging.

use std::collections::HashSet;

/// Insertion-order union of several name lists.
///
/// A name keeps the position of its first occurrence across all lists, in the
/// order the lists are given; later duplicates are dropped.
pub fn merge_unique<L, S>(lists: L) -> Vec<String>
where
    L: IntoIterator,
    L::Item: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut seen: HashSet<String> = HashSet::new();
    let mut merged = Vec::new();
    for list in lists {
        for name in list {
            let name = name.as_ref();
            if seen.insert(name.to_string()) {
                merged.push(name.to_string());
            }
        }
    }
    merged
}

//! Exhaustive partition checks for the change classifier.
//!
//! Every combination of user/modified/deleted sets over a small universe of
//! paths is classified, and the four buckets must partition
//! `modified ∪ deleted` whenever the status sets are disjoint.

use std::collections::BTreeSet;

use upsync_core::classifier::{classify, status_overlap, PathSet};

const UNIVERSE: [&str; 4] = ["a.js", "b/c.js", "d.md", "e/f/g.json"];

fn subset(mask: u32) -> PathSet {
    UNIVERSE
        .iter()
        .enumerate()
        .filter(|(i, _)| mask & (1 << i) != 0)
        .map(|(_, p)| p.to_string())
        .collect()
}

fn all_subsets() -> Vec<PathSet> {
    (0..(1u32 << UNIVERSE.len())).map(subset).collect()
}

#[test]
fn test_buckets_partition_status_paths() {
    let subsets = all_subsets();
    let mut checked = 0usize;

    for user in &subsets {
        for modified in &subsets {
            for deleted in &subsets {
                if !status_overlap(modified, deleted).is_empty() {
                    continue;
                }
                let result = classify(user, modified, deleted);
                let buckets = [
                    &result.deleted_by_user,
                    &result.missing_from_remote,
                    &result.conflict,
                    &result.safe_update,
                ];

                let expected: PathSet = modified.union(deleted).cloned().collect();
                for path in &expected {
                    let hits = buckets.iter().filter(|b| b.contains(path)).count();
                    assert_eq!(hits, 1, "{path} in {hits} buckets");
                }

                let union: BTreeSet<&String> = buckets.iter().flat_map(|b| b.iter()).collect();
                assert_eq!(union.len(), expected.len());
                assert_eq!(result.len(), expected.len());
                checked += 1;
            }
        }
    }

    // 16 user sets × 81 disjoint (modified, deleted) pairs.
    assert_eq!(checked, 16 * 81);
}

#[test]
fn test_bucket_membership_follows_user_history() {
    let subsets = all_subsets();
    for user in &subsets {
        for modified in &subsets {
            let result = classify(user, modified, &PathSet::new());
            assert!(result.conflict.iter().all(|p| user.contains(p)));
            assert!(result.safe_update.iter().all(|p| !user.contains(p)));
        }
        for deleted in &subsets {
            let result = classify(user, &PathSet::new(), deleted);
            assert!(result.deleted_by_user.iter().all(|p| user.contains(p)));
            assert!(result.missing_from_remote.iter().all(|p| !user.contains(p)));
        }
    }
}

#[test]
fn test_reclassifying_is_deterministic() {
    let subsets = all_subsets();
    for (i, user) in subsets.iter().enumerate() {
        let modified = &subsets[(i * 7) % subsets.len()];
        let deleted = &subsets[(i * 11 + 3) % subsets.len()];
        assert_eq!(
            classify(user, modified, deleted),
            classify(user, modified, deleted)
        );
    }
}

#[test]
fn test_overlap_never_drops_a_path() {
    let subsets = all_subsets();
    for user in &subsets {
        for status in &subsets {
            let result = classify(user, status, status);
            for path in status {
                let deleted_side =
                    result.deleted_by_user.contains(path) || result.missing_from_remote.contains(path);
                let modified_side =
                    result.conflict.contains(path) || result.safe_update.contains(path);
                assert!(deleted_side && modified_side, "{path} dropped");
            }
        }
    }
}

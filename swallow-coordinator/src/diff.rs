//! Membership snapshot diffing.

use bytes::Bytes;
use std::collections::HashMap;
use swallow_core::{MembershipDelta, NodeSpec};
use tracing::warn;

/// Compare two snapshots of raw registration records keyed by child name.
///
/// A key only in `new` is added, a key only in `old` is removed, and a key
/// in both whose raw bytes differ is changed. Entries that fail to decode
/// are logged and left out of the delta; they never fail the diff.
pub fn diff_snapshots(old: &HashMap<String, Bytes>, new: &HashMap<String, Bytes>) -> MembershipDelta {
    let mut delta = MembershipDelta::default();

    for (id, raw) in new {
        match old.get(id) {
            None => delta.added.extend(decode(id, raw)),
            Some(previous) if previous != raw => delta.changed.extend(decode(id, raw)),
            Some(_) => {}
        }
    }

    for (id, raw) in old {
        if !new.contains_key(id) {
            delta.removed.extend(decode(id, raw));
        }
    }

    delta
}

fn decode(id: &str, raw: &Bytes) -> Option<NodeSpec> {
    match NodeSpec::from_bytes(raw) {
        Ok(node) => Some(node),
        Err(e) => {
            warn!(
                "membership: skip node record {} ({}): {}",
                id,
                String::from_utf8_lossy(raw),
                e
            );
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::collections::HashSet;

    fn record(id: &str, service: &str) -> Bytes {
        Bytes::from(NodeSpec::new(id, service).to_bytes().unwrap())
    }

    fn snapshot(entries: &[(&str, Bytes)]) -> HashMap<String, Bytes> {
        entries
            .iter()
            .map(|(id, raw)| (id.to_string(), raw.clone()))
            .collect()
    }

    fn ids(nodes: &[NodeSpec]) -> HashSet<String> {
        nodes.iter().map(|n| n.id.clone()).collect()
    }

    #[test]
    fn test_first_scan_reports_everything_added() {
        let new = snapshot(&[("w1", record("w1", "ingest")), ("w2", record("w2", "ingest"))]);

        let delta = diff_snapshots(&HashMap::new(), &new);
        assert_eq!(ids(&delta.added), ["w1", "w2"].iter().map(|s| s.to_string()).collect());
        assert!(delta.removed.is_empty());
        assert!(delta.changed.is_empty());
    }

    #[test]
    fn test_departure_carries_last_known_record() {
        let old = snapshot(&[("w1", record("w1", "ingest")), ("w2", record("w2", "query"))]);
        let new = snapshot(&[("w1", record("w1", "ingest"))]);

        let delta = diff_snapshots(&old, &new);
        assert!(delta.added.is_empty());
        assert!(delta.changed.is_empty());
        assert_eq!(delta.removed, vec![NodeSpec::new("w2", "query")]);
    }

    #[test]
    fn test_rewritten_record_is_changed() {
        let old = snapshot(&[("w1", record("w1", "ingest"))]);
        let updated = NodeSpec::new("w1", "ingest").with_version(2);
        let new = snapshot(&[("w1", Bytes::from(updated.to_bytes().unwrap()))]);

        let delta = diff_snapshots(&old, &new);
        assert_eq!(delta.changed, vec![updated]);
        assert_eq!(delta.len(), 1);
    }

    #[test]
    fn test_undecodable_record_is_skipped() {
        let old = snapshot(&[("w1", record("w1", "ingest"))]);
        let new = snapshot(&[
            ("w1", record("w1", "ingest")),
            ("w3", Bytes::from_static(b"{not json")),
        ]);

        let delta = diff_snapshots(&old, &new);
        assert!(delta.is_empty());
    }

    #[test]
    fn test_identical_snapshots_yield_empty_delta() {
        let old = snapshot(&[("w1", record("w1", "ingest"))]);
        assert!(diff_snapshots(&old, &old.clone()).is_empty());
    }

    fn arb_snapshot() -> impl Strategy<Value = HashMap<String, Bytes>> {
        prop::collection::hash_map("w[0-9]{1,2}", 0u8..4, 0..12).prop_map(|entries| {
            entries
                .into_iter()
                .map(|(id, version)| {
                    let raw = NodeSpec::new(id.clone(), "svc")
                        .with_version(version)
                        .to_bytes()
                        .unwrap();
                    (id, Bytes::from(raw))
                })
                .collect()
        })
    }

    proptest! {
        #[test]
        fn prop_delta_partitions_keys(old in arb_snapshot(), new in arb_snapshot()) {
            let delta = diff_snapshots(&old, &new);
            let added = ids(&delta.added);
            let removed = ids(&delta.removed);
            let changed = ids(&delta.changed);

            prop_assert!(added.is_disjoint(&removed));
            prop_assert!(added.is_disjoint(&changed));
            prop_assert!(removed.is_disjoint(&changed));

            for id in &added {
                prop_assert!(new.contains_key(id) && !old.contains_key(id));
            }
            for id in &removed {
                prop_assert!(old.contains_key(id) && !new.contains_key(id));
            }
            for id in &changed {
                prop_assert!(old[id] != new[id]);
            }

            let expected = new.keys().filter(|k| old.get(*k) != new.get(*k)).count()
                + old.keys().filter(|k| !new.contains_key(*k)).count();
            prop_assert_eq!(delta.len(), expected);
        }

        #[test]
        fn prop_self_diff_is_empty(snapshot in arb_snapshot()) {
            prop_assert!(diff_snapshots(&snapshot, &snapshot).is_empty());
        }
    }
}

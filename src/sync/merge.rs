//! Merge engine: reconciles a local and a remote snapshot.
//!
//! Collections are merged record-by-record with an all-or-nothing conflict
//! policy (last-write-wins by default). Settings are merged key-by-key after
//! stripping node-local keys from the incoming side. Deletion logs are
//! unioned and applied once to the merged result, so a tombstone takes
//! effect no matter which side recorded it.

use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};

use crate::models::{Collection, Record, Settings, Snapshot, UPDATED_AT_KEY};

/// Which side of a conflict wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Winner {
    Local,
    Remote,
}

/// Decides the winner when both sides hold a record with the same id.
pub trait ConflictPolicy: Send + Sync {
    fn resolve(&self, local: &Record, remote: &Record) -> Winner;
}

/// Whole-record last-write-wins.
///
/// Compares `updatedAt`, then `createdAt`. A missing timestamp sorts before
/// any present one. Full ties keep the local record.
#[derive(Debug, Clone, Copy, Default)]
pub struct LastWriteWins;

impl ConflictPolicy for LastWriteWins {
    fn resolve(&self, local: &Record, remote: &Record) -> Winner {
        let local_key = (local.updated_at, local.created_at);
        let remote_key = (remote.updated_at, remote.created_at);
        match remote_key.cmp(&local_key) {
            Ordering::Greater => Winner::Remote,
            Ordering::Less | Ordering::Equal => Winner::Local,
        }
    }
}

/// Merges two versions of one collection.
///
/// Output keeps local order for ids present locally, then appends
/// remote-only records in remote order. Duplicate ids within one side do not
/// panic: the last occurrence wins.
pub fn merge_lists(local: &[Record], remote: &[Record], policy: &dyn ConflictPolicy) -> Vec<Record> {
    let remote_by_id: HashMap<&str, &Record> =
        remote.iter().map(|r| (r.id.as_str(), r)).collect();

    let mut merged: Vec<Record> = Vec::with_capacity(local.len().max(remote.len()));
    let mut positions: HashMap<&str, usize> = HashMap::with_capacity(merged.capacity());
    let mut local_ids: HashSet<&str> = HashSet::with_capacity(local.len());

    for record in local {
        local_ids.insert(record.id.as_str());
        let chosen = match remote_by_id.get(record.id.as_str()) {
            Some(theirs) => match policy.resolve(record, theirs) {
                Winner::Local => record,
                Winner::Remote => *theirs,
            },
            None => record,
        };
        match positions.get(record.id.as_str()) {
            Some(&pos) => merged[pos] = chosen.clone(),
            None => {
                positions.insert(record.id.as_str(), merged.len());
                merged.push(chosen.clone());
            }
        }
    }

    for record in remote {
        let id = record.id.as_str();
        if local_ids.contains(id) || positions.contains_key(id) {
            continue;
        }
        positions.insert(id, merged.len());
        merged.push(remote_by_id[id].clone());
    }

    merged
}

/// Merges two settings documents key by key.
///
/// Node-local keys never come from `remote`. A key present on one side only
/// is taken from that side; a key present on both sides comes from the side
/// whose document has the later `updatedAt` (ties keep local). A removed
/// shared key is held as `null`, so it counts as present and a newer removal
/// beats an older value.
pub fn merge_settings(local: &Settings, remote: &Settings) -> Settings {
    let incoming = remote.without_node_local();
    let remote_newer = incoming.updated_at() > local.updated_at();

    let mut merged = local.clone();
    for (key, value) in incoming.iter() {
        if key == UPDATED_AT_KEY {
            continue;
        }
        if remote_newer || !merged.contains_key(key) {
            merged.insert(key.clone(), value.clone());
        }
    }

    if remote_newer {
        if let Some(stamp) = incoming.get(UPDATED_AT_KEY) {
            merged.insert(UPDATED_AT_KEY, stamp.clone());
        }
    }

    merged
}

/// Merges two full snapshots with the default last-write-wins policy.
pub fn merge_dataset(local: &Snapshot, remote: &Snapshot) -> Snapshot {
    merge_dataset_with(local, remote, &LastWriteWins)
}

/// Merges two full snapshots with the given conflict policy.
pub fn merge_dataset_with(
    local: &Snapshot,
    remote: &Snapshot,
    policy: &dyn ConflictPolicy,
) -> Snapshot {
    let mut merged = Snapshot::new();

    for collection in Collection::ALL {
        merged.set_records(
            collection,
            merge_lists(local.records(collection), remote.records(collection), policy),
        );
    }

    merged.settings = merge_settings(&local.settings, &remote.settings);
    merged.deletions = local.deletions.union(&remote.deletions);

    let removed = merged.apply_deletions();
    tracing::debug!(
        records = merged.record_count(),
        tombstones = merged.deletions.len(),
        removed,
        "Merged datasets"
    );

    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::timestamp;
    use chrono::{DateTime, Utc};
    use serde_json::json;

    fn ts(millis: i64) -> DateTime<Utc> {
        timestamp::from_millis(millis).unwrap()
    }

    fn task(id: &str, title: &str, updated: i64) -> Record {
        Record::with_id(id)
            .with_field("title", title)
            .with_updated_at(ts(updated))
    }

    fn ids(records: &[Record]) -> Vec<&str> {
        records.iter().map(|r| r.id.as_str()).collect()
    }

    fn sorted(mut records: Vec<Record>) -> Vec<Record> {
        records.sort_by(|a, b| a.id.cmp(&b.id));
        records
    }

    #[test]
    fn test_last_write_wins_remote_newer() {
        let local = Snapshot::new().with_records(Collection::Tasks, vec![task("t1", "A", 100)]);
        let remote = Snapshot::new().with_records(Collection::Tasks, vec![task("t1", "B", 200)]);

        let merged = merge_dataset(&local, &remote);
        let tasks = merged.records(Collection::Tasks);
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].field("title"), Some(&json!("B")));
    }

    #[test]
    fn test_last_write_wins_local_newer() {
        let local = Snapshot::new().with_records(Collection::Tasks, vec![task("t1", "A", 300)]);
        let remote = Snapshot::new().with_records(Collection::Tasks, vec![task("t1", "B", 200)]);

        let merged = merge_dataset(&local, &remote);
        assert_eq!(
            merged.records(Collection::Tasks)[0].field("title"),
            Some(&json!("A"))
        );
    }

    #[test]
    fn test_winner_takes_whole_record() {
        let local = Record::with_id("n1")
            .with_field("title", "local title")
            .with_field("pinned", true)
            .with_updated_at(ts(100));
        let remote = Record::with_id("n1")
            .with_field("title", "remote title")
            .with_updated_at(ts(200));

        let merged = merge_lists(&[local], &[remote.clone()], &LastWriteWins);
        assert_eq!(merged, vec![remote]);
    }

    #[test]
    fn test_created_at_breaks_updated_at_tie() {
        let local = Record::with_id("x")
            .with_field("v", 1)
            .with_created_at(ts(10))
            .with_updated_at(ts(100));
        let remote = Record::with_id("x")
            .with_field("v", 2)
            .with_created_at(ts(20))
            .with_updated_at(ts(100));

        assert_eq!(LastWriteWins.resolve(&local, &remote), Winner::Remote);
        assert_eq!(LastWriteWins.resolve(&remote, &local), Winner::Local);
    }

    #[test]
    fn test_missing_timestamps_lose() {
        let untimed = Record::with_id("x").with_field("v", "old");
        let timed = Record::with_id("x").with_field("v", "new").with_created_at(ts(1));

        assert_eq!(LastWriteWins.resolve(&untimed, &timed), Winner::Remote);
        assert_eq!(LastWriteWins.resolve(&timed, &untimed), Winner::Local);
    }

    #[test]
    fn test_full_tie_keeps_local() {
        let local = Record::with_id("x").with_field("v", "local");
        let remote = Record::with_id("x").with_field("v", "remote");
        assert_eq!(LastWriteWins.resolve(&local, &remote), Winner::Local);
    }

    #[test]
    fn test_new_record_union() {
        let local = Snapshot::new().with_records(Collection::Notes, vec![Record::with_id("a")]);
        let remote = Snapshot::new().with_records(Collection::Notes, vec![Record::with_id("b")]);

        let merged = merge_dataset(&local, &remote);
        assert_eq!(ids(merged.records(Collection::Notes)), vec!["a", "b"]);
    }

    #[test]
    fn test_order_local_first_then_remote_only() {
        let local = vec![task("c", "", 1), task("a", "", 1), task("b", "", 1)];
        let remote = vec![task("z", "", 1), task("a", "", 5), task("y", "", 1)];

        let merged = merge_lists(&local, &remote, &LastWriteWins);
        assert_eq!(ids(&merged), vec!["c", "a", "b", "z", "y"]);
        assert_eq!(merged[1].updated_at, Some(ts(5)));
    }

    #[test]
    fn test_duplicate_ids_do_not_panic() {
        let local = vec![task("d", "first", 1), task("d", "second", 2)];
        let remote = vec![task("e", "one", 1), task("e", "two", 1)];

        let merged = merge_lists(&local, &remote, &LastWriteWins);
        assert_eq!(ids(&merged), vec!["d", "e"]);
        assert_eq!(merged[0].field("title"), Some(&json!("second")));
        assert_eq!(merged[1].field("title"), Some(&json!("two")));
    }

    #[test]
    fn test_collections_merge_independently() {
        let local = Snapshot::new()
            .with_records(Collection::Tasks, vec![task("same", "task", 100)])
            .with_records(Collection::Habits, vec![task("same", "habit-local", 100)]);
        let remote =
            Snapshot::new().with_records(Collection::Habits, vec![task("same", "habit-remote", 200)]);

        let merged = merge_dataset(&local, &remote);
        assert_eq!(
            merged.records(Collection::Tasks)[0].field("title"),
            Some(&json!("task"))
        );
        assert_eq!(
            merged.records(Collection::Habits)[0].field("title"),
            Some(&json!("habit-remote"))
        );
    }

    #[test]
    fn test_resurrection_example() {
        let mut remote = Snapshot::new();
        remote
            .deletions
            .record_deletion(Collection::Tasks, "abc", ts(100));

        let edited_later =
            Snapshot::new().with_records(Collection::Tasks, vec![task("abc", "kept", 200)]);
        let merged = merge_dataset(&edited_later, &remote);
        assert_eq!(ids(merged.records(Collection::Tasks)), vec!["abc"]);

        let edited_before =
            Snapshot::new().with_records(Collection::Tasks, vec![task("abc", "gone", 50)]);
        let merged = merge_dataset(&edited_before, &remote);
        assert!(merged.records(Collection::Tasks).is_empty());
        assert!(merged.deletions.get(Collection::Tasks, "abc").is_some());
    }

    #[test]
    fn test_deletion_wins_regardless_of_side() {
        let mut local = Snapshot::new();
        local.deletions.record_deletion(Collection::Decks, "d1", ts(500));
        let remote = Snapshot::new().with_records(Collection::Decks, vec![task("d1", "deck", 400)]);

        assert!(merge_dataset(&local, &remote)
            .records(Collection::Decks)
            .is_empty());
        assert!(merge_dataset(&remote, &local)
            .records(Collection::Decks)
            .is_empty());
    }

    #[test]
    fn test_deletion_monotonicity_across_repeated_merges() {
        let mut deleted = Snapshot::new();
        deleted.deletions.record_deletion(Collection::Tasks, "t", ts(100));
        let stale = Snapshot::new().with_records(Collection::Tasks, vec![task("t", "stale", 90)]);

        let once = merge_dataset(&deleted, &stale);
        let twice = merge_dataset(&stale, &once);
        let thrice = merge_dataset(&twice, &stale);
        for snapshot in [&once, &twice, &thrice] {
            assert!(snapshot.records(Collection::Tasks).is_empty());
        }
    }

    #[test]
    fn test_merge_is_idempotent() {
        let mut snapshot = Snapshot::new()
            .with_records(
                Collection::Tasks,
                vec![task("t1", "A", 100), Record::with_id("legacy")],
            )
            .with_records(Collection::ItemTags, vec![task("tag", "red", 5)]);
        snapshot.settings.set("theme", "dark", ts(10));
        snapshot.settings.insert("llmToken", "local-secret");
        snapshot
            .deletions
            .record_deletion(Collection::Tasks, "gone", ts(100));

        assert_eq!(merge_dataset(&snapshot, &snapshot), snapshot);
    }

    #[test]
    fn test_merge_value_selection_is_commutative() {
        let mut a = Snapshot::new()
            .with_records(
                Collection::Tasks,
                vec![task("1", "a1", 100), task("2", "a2", 300), task("3", "a3", 1)],
            )
            .with_records(Collection::Notes, vec![task("n", "a", 7)]);
        a.deletions.record_deletion(Collection::Tasks, "3", ts(50));

        let mut b = Snapshot::new()
            .with_records(
                Collection::Tasks,
                vec![task("2", "b2", 200), task("1", "b1", 150), task("4", "b4", 1)],
            )
            .with_records(Collection::Notes, vec![task("n", "b", 8)]);
        b.deletions.record_deletion(Collection::Tasks, "4", ts(1));

        let ab = merge_dataset(&a, &b);
        let ba = merge_dataset(&b, &a);

        for collection in Collection::ALL {
            assert_eq!(
                sorted(ab.records(collection).to_vec()),
                sorted(ba.records(collection).to_vec()),
                "collection {} differs",
                collection
            );
        }

        let titles: Vec<_> = sorted(ab.records(Collection::Tasks).to_vec())
            .into_iter()
            .map(|r| r.field("title").cloned().unwrap())
            .collect();
        assert_eq!(titles, vec![json!("b1"), json!("a2")]);
    }

    #[test]
    fn test_settings_remote_newer_wins_per_key() {
        let mut local = Settings::new();
        local.insert("theme", "dark");
        local.insert("localOnlyPref", 1);
        local.insert(UPDATED_AT_KEY, "2024-01-01T00:00:00.000Z");

        let mut remote = Settings::new();
        remote.insert("theme", "light");
        remote.insert("remoteOnlyPref", 2);
        remote.insert(UPDATED_AT_KEY, "2024-02-01T00:00:00.000Z");

        let merged = merge_settings(&local, &remote);
        assert_eq!(merged.get("theme"), Some(&json!("light")));
        assert_eq!(merged.get("localOnlyPref"), Some(&json!(1)));
        assert_eq!(merged.get("remoteOnlyPref"), Some(&json!(2)));
        assert_eq!(merged.updated_at(), timestamp::parse_str("2024-02-01T00:00:00Z"));
    }

    #[test]
    fn test_settings_local_newer_keeps_local_values() {
        let mut local = Settings::new();
        local.set("theme", "dark", ts(200));

        let mut remote = Settings::new();
        remote.set("theme", "light", ts(100));
        remote.insert("fontSize", 14);

        let merged = merge_settings(&local, &remote);
        assert_eq!(merged.get("theme"), Some(&json!("dark")));
        assert_eq!(merged.get("fontSize"), Some(&json!(14)));
        assert_eq!(merged.updated_at(), Some(ts(200)));
    }

    #[test]
    fn test_settings_never_take_node_local_keys_from_remote() {
        let mut local = Settings::new();
        local.insert("syncServerUrl", "http://mine");
        local.insert(UPDATED_AT_KEY, 1);

        let mut remote = Settings::new();
        remote.insert("syncServerUrl", "http://theirs");
        remote.insert("syncRole", "server");
        remote.insert("llmToken", "their-secret");
        remote.insert(UPDATED_AT_KEY, 999);

        let merged = merge_settings(&local, &remote);
        assert_eq!(merged.get("syncServerUrl"), Some(&json!("http://mine")));
        assert!(merged.get("syncRole").is_none());
        assert!(merged.get("llmToken").is_none());
    }

    struct RemoteAlwaysWins;

    impl ConflictPolicy for RemoteAlwaysWins {
        fn resolve(&self, _local: &Record, _remote: &Record) -> Winner {
            Winner::Remote
        }
    }

    #[test]
    fn test_custom_policy_is_used() {
        let local = Snapshot::new().with_records(Collection::Timers, vec![task("t", "mine", 999)]);
        let remote = Snapshot::new().with_records(Collection::Timers, vec![task("t", "theirs", 1)]);

        let merged = merge_dataset_with(&local, &remote, &RemoteAlwaysWins);
        assert_eq!(
            merged.records(Collection::Timers)[0].field("title"),
            Some(&json!("theirs"))
        );
    }

    #[test]
    fn test_newer_settings_removal_is_not_undone() {
        let mut local = Settings::new();
        local.set("theme", "light", ts(100));
        local.set("theme", serde_json::Value::Null, ts(200));

        let mut remote = Settings::new();
        remote.set("theme", "dark", ts(100));

        let merged = merge_settings(&local, &remote);
        assert!(!merged.is_set("theme"));
        assert_eq!(merged.updated_at(), Some(ts(200)));

        // The other direction sees the removal as the newer value.
        let merged = merge_settings(&remote, &local);
        assert!(!merged.is_set("theme"));
    }

    #[test]
    fn test_older_settings_removal_loses_to_newer_value() {
        let mut local = Settings::new();
        local.set("theme", serde_json::Value::Null, ts(100));

        let mut remote = Settings::new();
        remote.set("theme", "dark", ts(300));

        let merged = merge_settings(&local, &remote);
        assert_eq!(merged.get_str("theme"), Some("dark"));
    }
}

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::error::StoreError;
use tempfile::TempDir;

fn open_store(dir: &TempDir) -> Store {
    Store::open(dir.path().join("coven.db")).unwrap()
}

#[test]
fn open_creates_all_buckets() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir);

    // A read transaction must see every bucket, even before any write.
    let txn = store.db.begin_read().unwrap();
    for table in [TASKS, TAGS, CHILDREN, TASK_HISTORY, AGENTS, WORKFLOWS, QUESTIONS, TASK_QUESTIONS, EVENTS, META]
    {
        txn.open_table(table).unwrap();
    }
}

#[test]
fn reopen_preserves_schema_version() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("coven.db");
    drop(Store::open(&path).unwrap());
    // Second open sees the recorded version and succeeds.
    Store::open(&path).unwrap();
}

#[test]
fn future_schema_version_refuses_to_open() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("coven.db");
    {
        let store = Store::open(&path).unwrap();
        let txn = store.db.begin_write().unwrap();
        {
            let mut meta = txn.open_table(META).unwrap();
            put_json(&mut meta, "schema_version", &(SCHEMA_VERSION + 1)).unwrap();
        }
        txn.commit().unwrap();
    }

    match Store::open(&path) {
        Err(StoreError::SchemaVersion { found, supported }) => {
            assert_eq!(found, SCHEMA_VERSION + 1);
            assert_eq!(supported, SCHEMA_VERSION);
        }
        other => panic!("expected SchemaVersion error, got {other:?}"),
    }
}

#[test]
fn second_open_of_same_file_is_rejected() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("coven.db");
    let _held = Store::open(&path).unwrap();

    match Store::open(&path) {
        Err(StoreError::Locked) => {}
        other => panic!("expected Locked error, got {other:?}"),
    }
}

#[test]
fn next_seq_is_monotonic() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir);

    let txn = store.db.begin_write().unwrap();
    {
        let mut meta = txn.open_table(META).unwrap();
        assert_eq!(next_seq(&mut meta, META_HISTORY_SEQ).unwrap(), 1);
        assert_eq!(next_seq(&mut meta, META_HISTORY_SEQ).unwrap(), 2);
        assert_eq!(next_seq(&mut meta, META_HISTORY_SEQ).unwrap(), 3);
    }
    txn.commit().unwrap();
}

#[test]
fn scan_prefix_keys_stops_at_prefix_boundary() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir);

    let txn = store.db.begin_write().unwrap();
    {
        let mut tags = txn.open_table(TAGS).unwrap();
        put_json(&mut tags, "ui:task-1", &()).unwrap();
        put_json(&mut tags, "ui:task-2", &()).unwrap();
        put_json(&mut tags, "uix:task-3", &()).unwrap();
    }
    txn.commit().unwrap();

    let txn = store.db.begin_read().unwrap();
    let tags = txn.open_table(TAGS).unwrap();
    let keys = scan_prefix_keys(&tags, "ui:").unwrap();
    assert_eq!(keys, vec!["ui:task-1".to_string(), "ui:task-2".to_string()]);
}

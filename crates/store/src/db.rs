// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Database handle, bucket definitions, and schema gate.

use crate::error::StoreError;
use redb::{Database, ReadableTable, Table, TableDefinition};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::Path;

/// Schema version recorded in the `meta` bucket.
///
/// Bumped on any incompatible layout change; an on-disk version other
/// than this refuses to open (daemon exit code 3).
pub const SCHEMA_VERSION: u32 = 1;

pub(crate) const TASKS: TableDefinition<&str, &[u8]> = TableDefinition::new("tasks");
pub(crate) const TAGS: TableDefinition<&str, &[u8]> = TableDefinition::new("tags");
pub(crate) const CHILDREN: TableDefinition<&str, &[u8]> = TableDefinition::new("children");
pub(crate) const TASK_HISTORY: TableDefinition<&str, &[u8]> = TableDefinition::new("task_history");
pub(crate) const AGENTS: TableDefinition<&str, &[u8]> = TableDefinition::new("agents");
pub(crate) const WORKFLOWS: TableDefinition<&str, &[u8]> = TableDefinition::new("workflows");
pub(crate) const QUESTIONS: TableDefinition<&str, &[u8]> = TableDefinition::new("questions");
pub(crate) const TASK_QUESTIONS: TableDefinition<&str, &[u8]> =
    TableDefinition::new("task_questions");
pub(crate) const EVENTS: TableDefinition<&str, &[u8]> = TableDefinition::new("events");
pub(crate) const META: TableDefinition<&str, &[u8]> = TableDefinition::new("meta");

const META_SCHEMA_VERSION: &str = "schema_version";
pub(crate) const META_HISTORY_SEQ: &str = "history_seq";

/// Embedded KV store: one file, ordered keys, serializable writes.
///
/// redb serializes writers internally and lets readers proceed
/// concurrently, which is exactly the single-writer/multi-reader
/// discipline the daemon requires. The OS file lock rejects a second
/// daemon against the same database.
#[derive(Debug)]
pub struct Store {
    pub(crate) db: Database,
}

impl Store {
    /// Open (or create) the store at `path`, creating all buckets and
    /// checking the schema version.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let db = Database::create(path)?;
        let store = Self { db };
        store.init_schema()?;
        Ok(store)
    }

    fn init_schema(&self) -> Result<(), StoreError> {
        let txn = self.db.begin_write()?;
        {
            // Open every bucket once so later read transactions never
            // observe a missing table.
            txn.open_table(TASKS)?;
            txn.open_table(TAGS)?;
            txn.open_table(CHILDREN)?;
            txn.open_table(TASK_HISTORY)?;
            txn.open_table(AGENTS)?;
            txn.open_table(WORKFLOWS)?;
            txn.open_table(QUESTIONS)?;
            txn.open_table(TASK_QUESTIONS)?;
            txn.open_table(EVENTS)?;

            let mut meta = txn.open_table(META)?;
            match get_json::<u32, _>(&meta, META_SCHEMA_VERSION)? {
                Some(found) if found != SCHEMA_VERSION => {
                    return Err(StoreError::SchemaVersion { found, supported: SCHEMA_VERSION });
                }
                Some(_) => {}
                None => put_json(&mut meta, META_SCHEMA_VERSION, &SCHEMA_VERSION)?,
            }
        }
        txn.commit()?;
        Ok(())
    }
}

/// Read and deserialize a JSON value from a bucket.
pub(crate) fn get_json<T, Tbl>(table: &Tbl, key: &str) -> Result<Option<T>, StoreError>
where
    T: DeserializeOwned,
    Tbl: ReadableTable<&'static str, &'static [u8]>,
{
    match table.get(key)? {
        Some(guard) => {
            let value = serde_json::from_slice(guard.value())
                .map_err(|source| StoreError::CorruptRecord { key: key.to_string(), source })?;
            Ok(Some(value))
        }
        None => Ok(None),
    }
}

/// Serialize and write a JSON value into a bucket.
pub(crate) fn put_json<T>(
    table: &mut Table<'_, &'static str, &'static [u8]>,
    key: &str,
    value: &T,
) -> Result<(), StoreError>
where
    T: Serialize,
{
    let bytes = serde_json::to_vec(value)
        .map_err(|e| StoreError::Backend(format!("serialize {key}: {e}")))?;
    table.insert(key, bytes.as_slice())?;
    Ok(())
}

/// Collect every value in a bucket, skipping nothing: a corrupt record
/// is an error, not a silent gap.
pub(crate) fn scan_json<T, Tbl>(table: &Tbl) -> Result<Vec<T>, StoreError>
where
    T: DeserializeOwned,
    Tbl: ReadableTable<&'static str, &'static [u8]>,
{
    let mut out = Vec::new();
    for entry in table.iter()? {
        let (key, value) = entry?;
        let parsed = serde_json::from_slice(value.value()).map_err(|source| {
            StoreError::CorruptRecord { key: key.value().to_string(), source }
        })?;
        out.push(parsed);
    }
    Ok(out)
}

/// Collect the keys under `prefix` in a bucket.
pub(crate) fn scan_prefix_keys<Tbl>(table: &Tbl, prefix: &str) -> Result<Vec<String>, StoreError>
where
    Tbl: ReadableTable<&'static str, &'static [u8]>,
{
    let mut out = Vec::new();
    for entry in table.range(prefix..)? {
        let (key, _) = entry?;
        let key = key.value();
        if !key.starts_with(prefix) {
            break;
        }
        out.push(key.to_string());
    }
    Ok(out)
}

/// Read the next value of a monotonic counter kept in `meta`.
pub(crate) fn next_seq(
    meta: &mut Table<'_, &'static str, &'static [u8]>,
    key: &'static str,
) -> Result<u64, StoreError> {
    let next = get_json::<u64, _>(meta, key)?.unwrap_or(0) + 1;
    put_json(meta, key, &next)?;
    Ok(next)
}

#[cfg(test)]
#[path = "db_tests.rs"]
mod tests;

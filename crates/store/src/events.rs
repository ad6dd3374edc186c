// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Append-only event log with replay and pruning.

use crate::db::{put_json, scan_prefix_keys, Store, EVENTS};
use crate::error::StoreError;
use coven_core::Event;
use redb::ReadableTable;

impl Store {
    /// Append an event under its composite `type:entity:timestamp` key.
    pub fn append_event(&self, event: &Event) -> Result<(), StoreError> {
        let txn = self.db.begin_write()?;
        {
            let mut events = txn.open_table(EVENTS)?;
            put_json(&mut events, &event.store_key(), event)?;
        }
        txn.commit()?;
        Ok(())
    }

    /// Every persisted event with timestamp strictly greater than
    /// `since_ms`, ordered by (timestamp, id).
    ///
    /// Keys group by type and entity, not by time, so replay scans the
    /// whole bucket and sorts. The bucket is bounded by the retention
    /// window (24 h by default), which keeps this acceptable for
    /// reconnecting clients.
    pub fn events_since(&self, since_ms: u64) -> Result<Vec<Event>, StoreError> {
        let txn = self.db.begin_read()?;
        let events = txn.open_table(EVENTS)?;
        let mut out = Vec::new();
        for entry in events.iter()? {
            let (key, value) = entry?;
            let event: Event = serde_json::from_slice(value.value()).map_err(|source| {
                StoreError::CorruptRecord { key: key.value().to_string(), source }
            })?;
            if event.ts_ms > since_ms {
                out.push(event);
            }
        }
        out.sort_by(|a, b| (a.ts_ms, a.id.as_str()).cmp(&(b.ts_ms, b.id.as_str())));
        Ok(out)
    }

    /// Events for one `type:entity` prefix in chronological order, using
    /// the key layout instead of a full scan.
    pub fn events_for(&self, kind: &str, entity: &str, since_ms: u64) -> Result<Vec<Event>, StoreError> {
        let txn = self.db.begin_read()?;
        let events = txn.open_table(EVENTS)?;
        let prefix = format!("{kind}:{entity}:");
        let mut out = Vec::new();
        for key in scan_prefix_keys(&events, &prefix)? {
            if let Some(guard) = events.get(key.as_str())? {
                let event: Event = serde_json::from_slice(guard.value())
                    .map_err(|source| StoreError::CorruptRecord { key: key.clone(), source })?;
                if event.ts_ms > since_ms {
                    out.push(event);
                }
            }
        }
        Ok(out)
    }

    /// Delete events older than the retention cutoff. Returns the number
    /// pruned.
    pub fn prune_events(&self, older_than_ms: u64) -> Result<usize, StoreError> {
        let txn = self.db.begin_write()?;
        let pruned = {
            let mut events = txn.open_table(EVENTS)?;
            let mut doomed = Vec::new();
            for entry in events.iter()? {
                let (key, value) = entry?;
                let event: Event = serde_json::from_slice(value.value()).map_err(|source| {
                    StoreError::CorruptRecord { key: key.value().to_string(), source }
                })?;
                if event.ts_ms < older_than_ms {
                    doomed.push(key.value().to_string());
                }
            }
            for key in &doomed {
                events.remove(key.as_str())?;
            }
            doomed.len()
        };
        txn.commit()?;
        Ok(pruned)
    }
}

#[cfg(test)]
#[path = "events_tests.rs"]
mod tests;

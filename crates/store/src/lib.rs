// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! coven-store: the daemon's single embedded KV database.
//!
//! One redb file holds every persisted entity in its own bucket. Writes
//! are serialized by the backend; cross-entity invariants (claim + agent
//! + workflow) hold because they are written in one transaction.

mod agents;
mod db;
mod error;
mod events;
mod questions;
mod retention;
mod snapshot;
mod tasks;
mod workflows;

pub use db::{Store, SCHEMA_VERSION};
pub use error::{ClaimError, StoreError};
pub use retention::{RetentionPolicy, SweepStats};
pub use snapshot::StateSnapshot;
pub use workflows::WorkflowStart;

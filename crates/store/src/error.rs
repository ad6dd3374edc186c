// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Typed store errors.

use thiserror::Error;

/// Errors surfaced by the store.
///
/// `Locked` and `SchemaVersion` map to dedicated daemon exit codes;
/// `Corrupted` is fatal and never silently repaired.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store is locked by another process")]
    Locked,

    #[error("store schema version {found} is not supported (daemon supports {supported})")]
    SchemaVersion { found: u32, supported: u32 },

    #[error("store corrupted: {0}")]
    Corrupted(String),

    #[error("task not found: {0}")]
    TaskNotFound(String),

    #[error("agent not found: {0}")]
    AgentNotFound(String),

    #[error("workflow not found: {0}")]
    WorkflowNotFound(String),

    #[error("question not found: {0}")]
    QuestionNotFound(String),

    #[error("cannot move task {task} under its own descendant {parent}")]
    CyclicParent { task: String, parent: String },

    #[error("corrupt record at {key}: {source}")]
    CorruptRecord {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("store backend error: {0}")]
    Backend(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl From<redb::DatabaseError> for StoreError {
    fn from(e: redb::DatabaseError) -> Self {
        match e {
            redb::DatabaseError::DatabaseAlreadyOpen => StoreError::Locked,
            redb::DatabaseError::Storage(redb::StorageError::Io(io))
                if io.kind() == std::io::ErrorKind::WouldBlock =>
            {
                StoreError::Locked
            }
            redb::DatabaseError::Storage(redb::StorageError::Corrupted(msg)) => {
                StoreError::Corrupted(msg)
            }
            other => StoreError::Backend(other.to_string()),
        }
    }
}

impl From<redb::StorageError> for StoreError {
    fn from(e: redb::StorageError) -> Self {
        match e {
            redb::StorageError::Corrupted(msg) => StoreError::Corrupted(msg),
            other => StoreError::Backend(other.to_string()),
        }
    }
}

impl From<redb::TransactionError> for StoreError {
    fn from(e: redb::TransactionError) -> Self {
        StoreError::Backend(e.to_string())
    }
}

impl From<redb::TableError> for StoreError {
    fn from(e: redb::TableError) -> Self {
        StoreError::Backend(e.to_string())
    }
}

impl From<redb::CommitError> for StoreError {
    fn from(e: redb::CommitError) -> Self {
        StoreError::Backend(e.to_string())
    }
}

/// Errors from the claim path.
///
/// The scheduler treats all three semantic variants as soft: it logs and
/// moves on to the next candidate task.
#[derive(Debug, Error)]
pub enum ClaimError {
    #[error("task not found: {0}")]
    NotFound(String),

    #[error("task already claimed: {0}")]
    AlreadyClaimed(String),

    #[error("task {task} is not claimable in status {status}")]
    InvalidStatus { task: String, status: String },

    #[error(transparent)]
    Store(#[from] StoreError),
}

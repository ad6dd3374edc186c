// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Task operations: CRUD, tags, reparenting, claim/release.

use crate::db::{
    get_json, next_seq, put_json, scan_json, scan_prefix_keys, Store, CHILDREN, META, TAGS, TASKS,
    TASK_HISTORY,
};
use crate::error::{ClaimError, StoreError};
use coven_core::{AgentId, HistoryEntry, Task, TaskId, TaskStatus};
use redb::Table;

/// Index key for the `tags` bucket: one row per (tag, task).
fn tag_key(tag: &str, task: &TaskId) -> String {
    format!("{tag}:{task}")
}

/// Index key for the `children` bucket: one row per (parent, child).
fn child_key(parent: &TaskId, child: &TaskId) -> String {
    format!("{parent}:{child}")
}

pub(crate) fn append_history(
    history: &mut Table<'_, &'static str, &'static [u8]>,
    meta: &mut Table<'_, &'static str, &'static [u8]>,
    entry: &HistoryEntry,
) -> Result<(), StoreError> {
    let seq = next_seq(meta, crate::db::META_HISTORY_SEQ)?;
    let key = format!("{}:{:020}", entry.task_id, seq);
    put_json(history, &key, entry)
}

impl Store {
    /// Insert a new task and maintain the tag and children indexes.
    pub fn create_task(&self, task: &Task) -> Result<(), StoreError> {
        let txn = self.db.begin_write()?;
        {
            let mut tasks = txn.open_table(TASKS)?;
            let mut tags = txn.open_table(TAGS)?;
            let mut children = txn.open_table(CHILDREN)?;

            put_json(&mut tasks, task.id.as_str(), task)?;
            for tag in &task.tags {
                put_json(&mut tags, &tag_key(tag, &task.id), &())?;
            }
            if let Some(parent) = &task.parent {
                put_json(&mut children, &child_key(parent, &task.id), &())?;
            }
        }
        txn.commit()?;
        Ok(())
    }

    pub fn get_task(&self, id: &TaskId) -> Result<Task, StoreError> {
        let txn = self.db.begin_read()?;
        let tasks = txn.open_table(TASKS)?;
        get_json(&tasks, id.as_str())?.ok_or_else(|| StoreError::TaskNotFound(id.to_string()))
    }

    pub fn list_tasks(&self) -> Result<Vec<Task>, StoreError> {
        let txn = self.db.begin_read()?;
        let tasks = txn.open_table(TASKS)?;
        scan_json(&tasks)
    }

    /// Tasks the scheduler may claim: open, unclaimed, not soft-deleted.
    pub fn claimable_tasks(&self) -> Result<Vec<Task>, StoreError> {
        let mut tasks = self.list_tasks()?;
        tasks.retain(|t| t.is_claimable() && !t.is_deleted());
        // Highest priority first (0 beats 4), oldest first within a priority.
        tasks.sort_by_key(|t| (t.priority, t.created_at_ms));
        Ok(tasks)
    }

    /// Set a task's status, recording a history entry.
    pub fn set_task_status(
        &self,
        id: &TaskId,
        status: TaskStatus,
        changed_by: &str,
        now_ms: u64,
    ) -> Result<(), StoreError> {
        let txn = self.db.begin_write()?;
        {
            let mut tasks = txn.open_table(TASKS)?;
            let mut history = txn.open_table(TASK_HISTORY)?;
            let mut meta = txn.open_table(META)?;

            let mut task: Task = get_json(&tasks, id.as_str())?
                .ok_or_else(|| StoreError::TaskNotFound(id.to_string()))?;
            if task.status == status {
                return Ok(());
            }
            append_history(
                &mut history,
                &mut meta,
                &HistoryEntry::new(
                    task.id,
                    "status",
                    task.status.to_string(),
                    status.to_string(),
                    now_ms,
                    changed_by,
                ),
            )?;
            task.status = status;
            task.updated_at_ms = now_ms;
            put_json(&mut tasks, id.as_str(), &task)?;
        }
        txn.commit()?;
        Ok(())
    }

    /// Update plain task fields (title, body, type, priority). Status,
    /// claim, parent, and tags have their own audited operations.
    pub fn update_task(
        &self,
        id: &TaskId,
        apply: impl FnOnce(&mut Task),
        now_ms: u64,
    ) -> Result<Task, StoreError> {
        let txn = self.db.begin_write()?;
        let task = {
            let mut tasks = txn.open_table(TASKS)?;
            let mut task: Task = get_json(&tasks, id.as_str())?
                .ok_or_else(|| StoreError::TaskNotFound(id.to_string()))?;
            apply(&mut task);
            task.updated_at_ms = now_ms;
            put_json(&mut tasks, id.as_str(), &task)?;
            task
        };
        txn.commit()?;
        Ok(task)
    }

    pub fn add_tag(&self, id: &TaskId, tag: &str, now_ms: u64) -> Result<(), StoreError> {
        let txn = self.db.begin_write()?;
        {
            let mut tasks = txn.open_table(TASKS)?;
            let mut tags = txn.open_table(TAGS)?;

            let mut task: Task = get_json(&tasks, id.as_str())?
                .ok_or_else(|| StoreError::TaskNotFound(id.to_string()))?;
            if task.tags.insert(tag.to_string()) {
                task.updated_at_ms = now_ms;
                put_json(&mut tasks, id.as_str(), &task)?;
                put_json(&mut tags, &tag_key(tag, id), &())?;
            }
        }
        txn.commit()?;
        Ok(())
    }

    pub fn remove_tag(&self, id: &TaskId, tag: &str, now_ms: u64) -> Result<(), StoreError> {
        let txn = self.db.begin_write()?;
        {
            let mut tasks = txn.open_table(TASKS)?;
            let mut tags = txn.open_table(TAGS)?;

            let mut task: Task = get_json(&tasks, id.as_str())?
                .ok_or_else(|| StoreError::TaskNotFound(id.to_string()))?;
            if task.tags.remove(tag) {
                task.updated_at_ms = now_ms;
                put_json(&mut tasks, id.as_str(), &task)?;
                tags.remove(tag_key(tag, id).as_str())?;
            }
        }
        txn.commit()?;
        Ok(())
    }

    /// Move a task under a new parent (or to the root), rejecting moves
    /// that would create a cycle and recomputing depth over the moved
    /// subtree in the same transaction.
    pub fn reparent_task(
        &self,
        id: &TaskId,
        new_parent: Option<TaskId>,
        now_ms: u64,
    ) -> Result<(), StoreError> {
        let txn = self.db.begin_write()?;
        {
            let mut tasks = txn.open_table(TASKS)?;
            let mut children = txn.open_table(CHILDREN)?;
            let mut history = txn.open_table(TASK_HISTORY)?;
            let mut meta = txn.open_table(META)?;

            let mut task: Task = get_json(&tasks, id.as_str())?
                .ok_or_else(|| StoreError::TaskNotFound(id.to_string()))?;

            let new_depth = match &new_parent {
                Some(parent_id) => {
                    let parent: Task = get_json(&tasks, parent_id.as_str())?
                        .ok_or_else(|| StoreError::TaskNotFound(parent_id.to_string()))?;
                    // Walk the subtree rooted at `id`; the new parent must
                    // not be inside it.
                    if *parent_id == *id || subtree_ids(&children, id)?.contains(parent_id.as_str())
                    {
                        return Err(StoreError::CyclicParent {
                            task: id.to_string(),
                            parent: parent_id.to_string(),
                        });
                    }
                    parent.depth + 1
                }
                None => 0,
            };

            append_history(
                &mut history,
                &mut meta,
                &HistoryEntry::new(
                    task.id,
                    "parent",
                    task.parent.map(|p| p.to_string()).unwrap_or_default(),
                    new_parent.as_ref().map(|p| p.to_string()).unwrap_or_default(),
                    now_ms,
                    "api",
                ),
            )?;

            if let Some(old) = &task.parent {
                children.remove(child_key(old, id).as_str())?;
            }
            if let Some(parent_id) = &new_parent {
                put_json(&mut children, &child_key(parent_id, id), &())?;
            }
            task.parent = new_parent;
            task.depth = new_depth;
            task.updated_at_ms = now_ms;
            put_json(&mut tasks, id.as_str(), &task)?;

            // Recompute depth over the whole moved subtree.
            let mut queue = vec![(id.clone(), new_depth)];
            while let Some((parent_id, depth)) = queue.pop() {
                for child_id in direct_children(&children, &parent_id)? {
                    let mut child: Task = get_json(&tasks, child_id.as_str())?
                        .ok_or_else(|| StoreError::TaskNotFound(child_id.to_string()))?;
                    child.depth = depth + 1;
                    put_json(&mut tasks, child_id.as_str(), &child)?;
                    queue.push((child_id, depth + 1));
                }
            }
        }
        txn.commit()?;
        Ok(())
    }

    /// Mark a task soft-deleted. The retention sweep hard-deletes it
    /// after the grace period.
    pub fn soft_delete_task(&self, id: &TaskId, now_ms: u64) -> Result<(), StoreError> {
        let txn = self.db.begin_write()?;
        {
            let mut tasks = txn.open_table(TASKS)?;
            let mut task: Task = get_json(&tasks, id.as_str())?
                .ok_or_else(|| StoreError::TaskNotFound(id.to_string()))?;
            if task.deleted_at_ms.is_none() {
                task.deleted_at_ms = Some(now_ms);
                task.updated_at_ms = now_ms;
                put_json(&mut tasks, id.as_str(), &task)?;
            }
        }
        txn.commit()?;
        Ok(())
    }

    /// Remove a task and everything hanging off it: tag and children
    /// index rows, history, questions, agent record, and workflow.
    pub fn hard_delete_task(&self, id: &TaskId) -> Result<(), StoreError> {
        let txn = self.db.begin_write()?;
        {
            let mut tasks = txn.open_table(TASKS)?;
            let task: Option<Task> = get_json(&tasks, id.as_str())?;
            let Some(task) = task else {
                return Ok(());
            };

            let mut tags = txn.open_table(TAGS)?;
            for tag in &task.tags {
                tags.remove(tag_key(tag, id).as_str())?;
            }

            let mut children = txn.open_table(CHILDREN)?;
            if let Some(parent) = &task.parent {
                children.remove(child_key(parent, id).as_str())?;
            }

            let mut history = txn.open_table(TASK_HISTORY)?;
            for key in scan_prefix_keys(&history, &format!("{id}:"))? {
                history.remove(key.as_str())?;
            }

            let mut task_questions = txn.open_table(crate::db::TASK_QUESTIONS)?;
            let mut questions = txn.open_table(crate::db::QUESTIONS)?;
            for key in scan_prefix_keys(&task_questions, &format!("{id}:"))? {
                if let Some(question_id) = key.rsplit(':').next() {
                    questions.remove(question_id)?;
                }
                task_questions.remove(key.as_str())?;
            }

            let mut agents = txn.open_table(crate::db::AGENTS)?;
            agents.remove(id.as_str())?;
            let mut workflows = txn.open_table(crate::db::WORKFLOWS)?;
            workflows.remove(id.as_str())?;

            tasks.remove(id.as_str())?;
        }
        txn.commit()?;
        Ok(())
    }

    /// Atomically claim an open, unclaimed task for an agent.
    ///
    /// Writes the status change, the claim fields, and two history
    /// entries in one transaction.
    pub fn claim_task(
        &self,
        id: &TaskId,
        agent_id: &AgentId,
        now_ms: u64,
    ) -> Result<Task, ClaimError> {
        let txn = self.db.begin_write().map_err(StoreError::from)?;
        let task = {
            let mut tasks = txn.open_table(TASKS).map_err(StoreError::from)?;
            let mut history = txn.open_table(TASK_HISTORY).map_err(StoreError::from)?;
            let mut meta = txn.open_table(META).map_err(StoreError::from)?;
            claim_in_txn(&mut tasks, &mut history, &mut meta, id, agent_id, now_ms)?
        };
        txn.commit().map_err(StoreError::from)?;
        Ok(task)
    }

    /// Release a claimed task back to `open`.
    pub fn release_task(&self, id: &TaskId, now_ms: u64) -> Result<(), StoreError> {
        let txn = self.db.begin_write()?;
        {
            let mut tasks = txn.open_table(TASKS)?;
            let mut history = txn.open_table(TASK_HISTORY)?;
            let mut meta = txn.open_table(META)?;
            release_in_txn(&mut tasks, &mut history, &mut meta, id, now_ms)?;
        }
        txn.commit()?;
        Ok(())
    }

    /// Release every in-progress task whose claim is older than
    /// `cutoff_ms`. Returns the released task ids.
    ///
    /// Called on startup and then periodically by the scheduler.
    pub fn release_stale_claims(
        &self,
        cutoff_ms: u64,
        now_ms: u64,
    ) -> Result<Vec<TaskId>, StoreError> {
        let stale: Vec<TaskId> = self
            .list_tasks()?
            .into_iter()
            .filter(|t| {
                t.status == TaskStatus::InProgress
                    && !t.claimed_by.is_empty()
                    && t.claimed_at_ms < cutoff_ms
            })
            .map(|t| t.id)
            .collect();

        let txn = self.db.begin_write()?;
        {
            let mut tasks = txn.open_table(TASKS)?;
            let mut history = txn.open_table(TASK_HISTORY)?;
            let mut meta = txn.open_table(META)?;
            for id in &stale {
                release_in_txn(&mut tasks, &mut history, &mut meta, id, now_ms)?;
            }
        }
        txn.commit()?;
        Ok(stale)
    }

    /// Audit history for a task, oldest first.
    pub fn history_for_task(&self, id: &TaskId) -> Result<Vec<HistoryEntry>, StoreError> {
        let txn = self.db.begin_read()?;
        let history = txn.open_table(TASK_HISTORY)?;
        let mut out = Vec::new();
        for key in scan_prefix_keys(&history, &format!("{id}:"))? {
            if let Some(entry) = get_json::<HistoryEntry, _>(&history, &key)? {
                out.push(entry);
            }
        }
        Ok(out)
    }

    /// Check whether a task still has non-closed children; such tasks
    /// are not ready for scheduling.
    pub fn has_open_children(&self, id: &TaskId) -> Result<bool, StoreError> {
        let txn = self.db.begin_read()?;
        let children = txn.open_table(CHILDREN)?;
        let tasks = txn.open_table(TASKS)?;
        for child_id in direct_children(&children, id)? {
            if let Some(child) = get_json::<Task, _>(&tasks, child_id.as_str())? {
                if !child.status.is_terminal() && !child.is_deleted() {
                    return Ok(true);
                }
            }
        }
        Ok(false)
    }

    /// Task ids carrying `tag`, via the tag index.
    pub fn tasks_with_tag(&self, tag: &str) -> Result<Vec<TaskId>, StoreError> {
        let txn = self.db.begin_read()?;
        let tags = txn.open_table(TAGS)?;
        let prefix = format!("{tag}:");
        Ok(scan_prefix_keys(&tags, &prefix)?
            .into_iter()
            .map(|key| TaskId::from_string(&key[prefix.len()..]))
            .collect())
    }
}

/// Claim body shared by `claim_task` and the cross-entity start
/// transaction in `workflows.rs`.
pub(crate) fn claim_in_txn(
    tasks: &mut Table<'_, &'static str, &'static [u8]>,
    history: &mut Table<'_, &'static str, &'static [u8]>,
    meta: &mut Table<'_, &'static str, &'static [u8]>,
    id: &TaskId,
    agent_id: &AgentId,
    now_ms: u64,
) -> Result<Task, ClaimError> {
    let mut task: Task =
        get_json(tasks, id.as_str())?.ok_or_else(|| ClaimError::NotFound(id.to_string()))?;

    if !task.claimed_by.is_empty() {
        return Err(ClaimError::AlreadyClaimed(id.to_string()));
    }
    if !task.status.is_claimable() {
        return Err(ClaimError::InvalidStatus {
            task: id.to_string(),
            status: task.status.to_string(),
        });
    }

    append_history(
        history,
        meta,
        &HistoryEntry::new(
            task.id,
            "status",
            task.status.to_string(),
            TaskStatus::InProgress.to_string(),
            now_ms,
            "scheduler",
        ),
    )?;
    append_history(
        history,
        meta,
        &HistoryEntry::new(task.id, "claimed_by", "", agent_id.as_str(), now_ms, "scheduler"),
    )?;

    task.status = TaskStatus::InProgress;
    task.claimed_by = agent_id.clone();
    task.claimed_at_ms = now_ms;
    task.updated_at_ms = now_ms;
    put_json(tasks, id.as_str(), &task).map_err(ClaimError::Store)?;
    Ok(task)
}

fn release_in_txn(
    tasks: &mut Table<'_, &'static str, &'static [u8]>,
    history: &mut Table<'_, &'static str, &'static [u8]>,
    meta: &mut Table<'_, &'static str, &'static [u8]>,
    id: &TaskId,
    now_ms: u64,
) -> Result<(), StoreError> {
    let mut task: Task =
        get_json(tasks, id.as_str())?.ok_or_else(|| StoreError::TaskNotFound(id.to_string()))?;

    append_history(
        history,
        meta,
        &HistoryEntry::new(
            task.id,
            "status",
            task.status.to_string(),
            TaskStatus::Open.to_string(),
            now_ms,
            "scheduler",
        ),
    )?;
    append_history(
        history,
        meta,
        &HistoryEntry::new(task.id, "claimed_by", task.claimed_by.as_str(), "", now_ms, "scheduler"),
    )?;

    task.status = TaskStatus::Open;
    task.claimed_by = AgentId::default();
    task.claimed_at_ms = 0;
    task.updated_at_ms = now_ms;
    put_json(tasks, id.as_str(), &task)
}

/// All descendant ids of `root` via the children index.
fn subtree_ids<Tbl>(children: &Tbl, root: &TaskId) -> Result<std::collections::HashSet<String>, StoreError>
where
    Tbl: redb::ReadableTable<&'static str, &'static [u8]>,
{
    let mut seen = std::collections::HashSet::new();
    let mut queue = vec![root.clone()];
    while let Some(parent) = queue.pop() {
        for child in direct_children(children, &parent)? {
            if seen.insert(child.to_string()) {
                queue.push(child);
            }
        }
    }
    Ok(seen)
}

fn direct_children<Tbl>(children: &Tbl, parent: &TaskId) -> Result<Vec<TaskId>, StoreError>
where
    Tbl: redb::ReadableTable<&'static str, &'static [u8]>,
{
    let prefix = format!("{parent}:");
    Ok(scan_prefix_keys(children, &prefix)?
        .into_iter()
        .map(|key| TaskId::from_string(&key[prefix.len()..]))
        .collect())
}

#[cfg(test)]
#[path = "tasks_tests.rs"]
mod tests;

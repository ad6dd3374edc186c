// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Question records and the per-task question index.

use crate::db::{get_json, put_json, scan_json, scan_prefix_keys, Store, QUESTIONS, TASK_QUESTIONS};
use crate::error::StoreError;
use coven_core::{Question, QuestionId, QuestionStatus, TaskId};

impl Store {
    /// Insert a question and its row in the `task_questions` index.
    pub fn create_question(&self, question: &Question) -> Result<(), StoreError> {
        let txn = self.db.begin_write()?;
        {
            let mut questions = txn.open_table(QUESTIONS)?;
            let mut task_questions = txn.open_table(TASK_QUESTIONS)?;
            put_json(&mut questions, question.id.as_str(), question)?;
            put_json(
                &mut task_questions,
                &format!("{}:{}", question.task_id, question.id),
                &(),
            )?;
        }
        txn.commit()?;
        Ok(())
    }

    pub fn get_question(&self, id: &QuestionId) -> Result<Question, StoreError> {
        let txn = self.db.begin_read()?;
        let questions = txn.open_table(QUESTIONS)?;
        get_json(&questions, id.as_str())?
            .ok_or_else(|| StoreError::QuestionNotFound(id.to_string()))
    }

    /// Mark a question answered with the submitted reply.
    pub fn answer_question(
        &self,
        id: &QuestionId,
        response: &str,
        now_ms: u64,
    ) -> Result<Question, StoreError> {
        let txn = self.db.begin_write()?;
        let question = {
            let mut questions = txn.open_table(QUESTIONS)?;
            let mut question: Question = get_json(&questions, id.as_str())?
                .ok_or_else(|| StoreError::QuestionNotFound(id.to_string()))?;
            question.status = QuestionStatus::Answered;
            question.response = Some(response.to_string());
            question.answered_at_ms = Some(now_ms);
            put_json(&mut questions, id.as_str(), &question)?;
            question
        };
        txn.commit()?;
        Ok(question)
    }

    pub fn pending_questions(&self) -> Result<Vec<Question>, StoreError> {
        let txn = self.db.begin_read()?;
        let questions = txn.open_table(QUESTIONS)?;
        let mut all: Vec<Question> = scan_json(&questions)?;
        all.retain(Question::is_pending);
        Ok(all)
    }

    pub fn questions_for_task(&self, task_id: &TaskId) -> Result<Vec<Question>, StoreError> {
        let txn = self.db.begin_read()?;
        let questions = txn.open_table(QUESTIONS)?;
        let task_questions = txn.open_table(TASK_QUESTIONS)?;

        let prefix = format!("{task_id}:");
        let mut out = Vec::new();
        for key in scan_prefix_keys(&task_questions, &prefix)? {
            let question_id = &key[prefix.len()..];
            if let Some(question) = get_json::<Question, _>(&questions, question_id)? {
                out.push(question);
            }
        }
        Ok(out)
    }

    pub fn list_questions(&self) -> Result<Vec<Question>, StoreError> {
        let txn = self.db.begin_read()?;
        let questions = txn.open_table(QUESTIONS)?;
        scan_json(&questions)
    }
}

#[cfg(test)]
#[path = "questions_tests.rs"]
mod tests;

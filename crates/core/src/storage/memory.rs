use super::{
    ActivityRecord, ActivityRepository, AnswerRecord, AnswerRepository, QaRecord, QaRepository,
    UserRepository,
};
use crate::session::{StateName, UserSession};
use anyhow::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::Mutex;

/// A process-local repository for tests and database-less runs.
#[derive(Default)]
pub struct InMemoryRepository {
    users: Mutex<HashMap<i64, UserSession>>,
    qa: Mutex<Vec<QaRecord>>,
    answers: Mutex<Vec<AnswerRecord>>,
    activity: Mutex<Vec<ActivityRecord>>,
}

impl InMemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// All answers recorded so far, oldest first.
    pub async fn answers(&self) -> Vec<AnswerRecord> {
        self.answers.lock().await.clone()
    }

    /// The activity log, oldest first.
    pub async fn activity_log(&self) -> Vec<ActivityRecord> {
        self.activity.lock().await.clone()
    }
}

#[async_trait]
impl UserRepository for InMemoryRepository {
    async fn get_user(&self, user_id: i64) -> Result<Option<UserSession>> {
        Ok(self.users.lock().await.get(&user_id).cloned())
    }

    async fn save_user(&self, user: &UserSession) -> Result<()> {
        self.users.lock().await.insert(user.user_id, user.clone());
        Ok(())
    }

    async fn find_users_by_state(&self, state: &StateName) -> Result<Vec<UserSession>> {
        Ok(self
            .users
            .lock()
            .await
            .values()
            .filter(|u| u.current_state.as_ref() == Some(state))
            .cloned()
            .collect())
    }
}

#[async_trait]
impl QaRepository for InMemoryRepository {
    async fn save_qa(&self, record: &QaRecord) -> Result<()> {
        self.qa.lock().await.push(record.clone());
        Ok(())
    }

    async fn get_qa_history(&self, user_id: i64, limit: usize) -> Result<Vec<QaRecord>> {
        Ok(self
            .qa
            .lock()
            .await
            .iter()
            .rev()
            .filter(|r| r.user_id == user_id)
            .take(limit)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl AnswerRepository for InMemoryRepository {
    async fn save_answer(&self, record: &AnswerRecord) -> Result<()> {
        self.answers.lock().await.push(record.clone());
        Ok(())
    }
}

#[async_trait]
impl ActivityRepository for InMemoryRepository {
    async fn record_activity(&self, record: &ActivityRecord) -> Result<()> {
        let mut log = self.activity.lock().await;
        let seen = log.iter().any(|r| {
            r.user_id == record.user_id
                && r.activity_date == record.activity_date
                && r.kind == record.kind
        });
        if !seen {
            log.push(record.clone());
        }
        Ok(())
    }
}

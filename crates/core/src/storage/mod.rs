//! State Storage
//!
//! Repository traits for the persistent store plus the `StateStorage`
//! adapter the state machine talks to. The adapter never propagates
//! errors: failures are logged and surface as `None`, `false` or an empty
//! list.

mod memory;

pub use memory::InMemoryRepository;

use crate::session::{StateContext, StateName, UserSession};
use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, error};

/// Row-level access to user sessions.
#[async_trait]
pub trait UserRepository: Send + Sync {
    async fn get_user(&self, user_id: i64) -> Result<Option<UserSession>>;

    /// Inserts or replaces the user's row. Last write wins.
    async fn save_user(&self, user: &UserSession) -> Result<()>;

    async fn find_users_by_state(&self, state: &StateName) -> Result<Vec<UserSession>>;
}

/// One answered question, as kept in the Q&A history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QaRecord {
    pub user_id: i64,
    pub mode: String,
    pub context_topic: String,
    pub question: String,
    pub answer: String,
    pub sources: Vec<String>,
    pub created_at: DateTime<Utc>,
}

#[async_trait]
pub trait QaRepository: Send + Sync {
    async fn save_qa(&self, record: &QaRecord) -> Result<()>;

    /// Most recent records first.
    async fn get_qa_history(&self, user_id: i64, limit: usize) -> Result<Vec<QaRecord>>;
}

/// What kind of user input an `AnswerRecord` holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnswerKind {
    TheoryAnswer,
    BonusAnswer,
    WorkProduct,
    FeedFixation,
}

impl AnswerKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AnswerKind::TheoryAnswer => "theory_answer",
            AnswerKind::BonusAnswer => "bonus_answer",
            AnswerKind::WorkProduct => "work_product",
            AnswerKind::FeedFixation => "feed_fixation",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnswerRecord {
    pub user_id: i64,
    pub topic_index: Option<usize>,
    pub kind: AnswerKind,
    pub answer: String,
    pub created_at: DateTime<Utc>,
}

#[async_trait]
pub trait AnswerRepository: Send + Sync {
    async fn save_answer(&self, record: &AnswerRecord) -> Result<()>;
}

/// What made a day count as active.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityKind {
    TheoryAnswer,
    BonusAnswer,
    WorkProduct,
    FeedFixation,
    QuestionAsked,
}

impl ActivityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActivityKind::TheoryAnswer => "theory_answer",
            ActivityKind::BonusAnswer => "bonus_answer",
            ActivityKind::WorkProduct => "work_product",
            ActivityKind::FeedFixation => "feed_fixation",
            ActivityKind::QuestionAsked => "question_asked",
        }
    }
}

impl From<AnswerKind> for ActivityKind {
    fn from(kind: AnswerKind) -> Self {
        match kind {
            AnswerKind::TheoryAnswer => ActivityKind::TheoryAnswer,
            AnswerKind::BonusAnswer => ActivityKind::BonusAnswer,
            AnswerKind::WorkProduct => ActivityKind::WorkProduct,
            AnswerKind::FeedFixation => ActivityKind::FeedFixation,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivityRecord {
    pub user_id: i64,
    pub activity_date: NaiveDate,
    pub kind: ActivityKind,
    pub mode: String,
}

#[async_trait]
pub trait ActivityRepository: Send + Sync {
    /// Logs an activity. A second record for the same user, day and kind is
    /// ignored.
    async fn record_activity(&self, record: &ActivityRecord) -> Result<()>;
}

/// The state columns of a user's row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredState {
    pub current_state: Option<StateName>,
    pub previous_state: Option<StateName>,
    pub state_context: StateContext,
}

/// Persistence adapter consumed by the state machine.
#[derive(Clone)]
pub struct StateStorage {
    repo: Arc<dyn UserRepository>,
}

impl StateStorage {
    pub fn new(repo: Arc<dyn UserRepository>) -> Self {
        Self { repo }
    }

    /// Loads the state columns of a user, `None` if unknown or on failure.
    pub async fn load_state(&self, user_id: i64) -> Option<StoredState> {
        self.load_session(user_id).await.map(|user| StoredState {
            current_state: user.current_state,
            previous_state: user.previous_state,
            state_context: user.state_context,
        })
    }

    /// Loads the full session record, `None` if unknown or on failure.
    pub async fn load_session(&self, user_id: i64) -> Option<UserSession> {
        match self.repo.get_user(user_id).await {
            Ok(user) => user,
            Err(e) => {
                error!(user_id, error = ?e, "Failed to load user state");
                None
            }
        }
    }

    /// Persists the user's row. Returns `false` if the write failed.
    pub async fn save_state(&self, user: &UserSession) -> bool {
        match self.repo.save_user(user).await {
            Ok(()) => {
                debug!(
                    user_id = user.user_id,
                    state = ?user.current_state,
                    "State saved"
                );
                true
            }
            Err(e) => {
                error!(user_id = user.user_id, error = ?e, "Failed to save user state");
                false
            }
        }
    }

    pub async fn find_users_in_state(&self, state: &StateName) -> Vec<UserSession> {
        match self.repo.find_users_by_state(state).await {
            Ok(users) => users,
            Err(e) => {
                error!(%state, error = ?e, "Failed to list users in state");
                Vec::new()
            }
        }
    }

    pub async fn clear_state_context(&self, user: &mut UserSession) -> bool {
        user.state_context.clear();
        self.save_state(user).await
    }

    pub async fn set_context_value(&self, user: &mut UserSession, key: &str, value: Value) -> bool {
        user.state_context.insert(key.to_string(), value);
        self.save_state(user).await
    }

    pub fn get_context_value<'a>(&self, user: &'a UserSession, key: &str) -> Option<&'a Value> {
        user.state_context.get(key)
    }
}

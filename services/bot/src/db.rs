//! Data Access Layer
//!
//! Postgres implementations of the core repository traits. A user row keeps
//! the state columns the machine queries on, plus the whole session as a
//! JSONB payload.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::{FromRow, PgPool, types::Json};
use systrack_core::{
    session::{StateContext, StateName, UserSession},
    storage::{
        ActivityRecord, ActivityRepository, AnswerRecord, AnswerRepository, QaRecord, QaRepository,
        UserRepository,
    },
};

/// A wrapper around the `PgPool` to provide a clear data access interface.
#[derive(Clone)]
pub struct Db {
    pool: PgPool,
}

#[derive(FromRow)]
struct UserRow {
    current_state: Option<String>,
    previous_state: Option<String>,
    state_context: Json<StateContext>,
    payload: Json<Value>,
}

impl UserRow {
    fn into_session(self) -> Result<UserSession> {
        let mut user: UserSession =
            serde_json::from_value(self.payload.0).context("Corrupt user payload")?;
        user.current_state = self.current_state.map(StateName::from);
        user.previous_state = self.previous_state.map(StateName::from);
        user.state_context = self.state_context.0;
        Ok(user)
    }
}

#[derive(FromRow)]
struct QaRow {
    user_id: i64,
    mode: String,
    context_topic: String,
    question: String,
    answer: String,
    sources: Json<Vec<String>>,
    created_at: DateTime<Utc>,
}

impl From<QaRow> for QaRecord {
    fn from(row: QaRow) -> Self {
        Self {
            user_id: row.user_id,
            mode: row.mode,
            context_topic: row.context_topic,
            question: row.question,
            answer: row.answer,
            sources: row.sources.0,
            created_at: row.created_at,
        }
    }
}

impl Db {
    /// Creates a new `Db` instance.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Runs all pending `sqlx` migrations.
    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }
}

#[async_trait]
impl UserRepository for Db {
    async fn get_user(&self, user_id: i64) -> Result<Option<UserSession>> {
        let row = sqlx::query_as::<_, UserRow>(
            r#"
            SELECT current_state, previous_state, state_context, payload
            FROM users
            WHERE user_id = $1
            "#,
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(UserRow::into_session).transpose()
    }

    async fn save_user(&self, user: &UserSession) -> Result<()> {
        let payload = serde_json::to_value(user)?;
        sqlx::query(
            r#"
            INSERT INTO users (user_id, current_state, previous_state, state_context, payload)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (user_id) DO UPDATE
            SET current_state = EXCLUDED.current_state,
                previous_state = EXCLUDED.previous_state,
                state_context = EXCLUDED.state_context,
                payload = EXCLUDED.payload,
                updated_at = NOW()
            "#,
        )
        .bind(user.user_id)
        .bind(user.current_state.as_ref().map(StateName::as_str))
        .bind(user.previous_state.as_ref().map(StateName::as_str))
        .bind(Json(&user.state_context))
        .bind(Json(payload))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn find_users_by_state(&self, state: &StateName) -> Result<Vec<UserSession>> {
        let rows = sqlx::query_as::<_, UserRow>(
            r#"
            SELECT current_state, previous_state, state_context, payload
            FROM users
            WHERE current_state = $1
            ORDER BY user_id
            "#,
        )
        .bind(state.as_str())
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(UserRow::into_session).collect()
    }
}

#[async_trait]
impl QaRepository for Db {
    async fn save_qa(&self, record: &QaRecord) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO qa_history (user_id, mode, context_topic, question, answer, sources, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(record.user_id)
        .bind(&record.mode)
        .bind(&record.context_topic)
        .bind(&record.question)
        .bind(&record.answer)
        .bind(Json(&record.sources))
        .bind(record.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_qa_history(&self, user_id: i64, limit: usize) -> Result<Vec<QaRecord>> {
        let rows = sqlx::query_as::<_, QaRow>(
            r#"
            SELECT user_id, mode, context_topic, question, answer, sources, created_at
            FROM qa_history
            WHERE user_id = $1
            ORDER BY created_at DESC
            LIMIT $2
            "#,
        )
        .bind(user_id)
        .bind(i64::try_from(limit).unwrap_or(i64::MAX))
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(QaRecord::from).collect())
    }
}

#[async_trait]
impl AnswerRepository for Db {
    async fn save_answer(&self, record: &AnswerRecord) -> Result<()> {
        let topic_index = record
            .topic_index
            .map(i32::try_from)
            .transpose()
            .context("Topic index out of range")?;
        sqlx::query(
            r#"
            INSERT INTO answers (user_id, topic_index, kind, answer, created_at)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(record.user_id)
        .bind(topic_index)
        .bind(record.kind.as_str())
        .bind(&record.answer)
        .bind(record.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl ActivityRepository for Db {
    async fn record_activity(&self, record: &ActivityRecord) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO activity_log (user_id, activity_date, kind, mode)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (user_id, activity_date, kind) DO NOTHING
            "#,
        )
        .bind(record.user_id)
        .bind(record.activity_date)
        .bind(record.kind.as_str())
        .bind(&record.mode)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

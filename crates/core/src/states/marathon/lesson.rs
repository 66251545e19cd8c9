use crate::session::{IncomingMessage, Mode, StateContext, UserSession};
use crate::states::{State, StateDeps, names, today};
use anyhow::Result;
use async_trait::async_trait;
use serde_json::json;
use std::sync::Arc;
use tracing::info;

/// Shows the theory text of the current topic.
pub struct LessonState {
    deps: Arc<StateDeps>,
}

impl LessonState {
    pub fn new(deps: Arc<StateDeps>) -> Self {
        Self { deps }
    }

    fn finished(&self, user: &UserSession) -> bool {
        user.marathon.is_complete() || self.deps.curriculum.topic(user.marathon.current_topic_index).is_none()
    }
}

#[async_trait]
impl State for LessonState {
    fn name(&self) -> &'static str {
        names::LESSON
    }

    fn allow_global(&self) -> &'static [&'static str] {
        &["consultation", "mode"]
    }

    fn is_available(&self) -> bool {
        self.deps.features.marathon
    }

    async fn enter(&self, user: &mut UserSession, _context: &StateContext) -> Result<()> {
        let deps = &self.deps;
        user.mode = Mode::Marathon;
        user.marathon.roll_day(today());

        if self.finished(user) {
            return deps.send(user, deps.t("marathon.completed", user, &[])).await;
        }
        if user.marathon.daily_limit_reached() {
            return deps.send(user, deps.t("marathon.daily_limit", user, &[])).await;
        }
        if user.marathon.start_date.is_none() {
            user.marathon.start_date = Some(today());
        }

        let index = user.marathon.current_topic_index;
        let Some(topic) = deps.curriculum.topic(index) else {
            return Ok(());
        };
        if topic.is_practice() {
            return deps.send(user, deps.t("marathon.practice_pending", user, &[])).await;
        }

        let day = user.marathon.marathon_day().to_string();
        deps.send(user, format!("⏳ {}", deps.t("marathon.generating_material", user, &[])))
            .await?;
        let body = match deps.content.lesson(topic, user).await {
            Some(text) => text,
            None => deps.t("marathon.lesson_fallback", user, &[]),
        };
        info!(user_id = user.user_id, topic_index = index, "Lesson shown");

        let text = format!(
            "📚 {}\n\n{}\n\n{body}",
            deps.t("marathon.day_theory", user, &[("day", &day)]),
            topic.title
        );
        let ready = deps.t("marathon.ready_button", user, &[]);
        deps.send_buttons(user, text, vec![ready]).await
    }

    async fn handle(&self, user: &mut UserSession, _message: &IncomingMessage) -> Result<Option<String>> {
        if self.finished(user) {
            return Ok(Some("marathon_complete".into()));
        }
        user.marathon.roll_day(today());
        if user.marathon.daily_limit_reached() {
            self.deps
                .send(user, self.deps.t("marathon.daily_limit", user, &[]))
                .await?;
            return Ok(None);
        }
        let practice = self
            .deps
            .curriculum
            .topic(user.marathon.current_topic_index)
            .is_some_and(|t| t.is_practice());
        if practice {
            return Ok(Some("practice".into()));
        }
        Ok(Some("lesson_shown".into()))
    }

    async fn exit(&self, user: &UserSession) -> StateContext {
        StateContext::from([
            ("topic_index".to_string(), json!(user.marathon.current_topic_index)),
            ("marathon_day".to_string(), json!(user.marathon.marathon_day())),
        ])
    }
}

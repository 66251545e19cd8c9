use crate::session::{IncomingMessage, StateContext, TOPICS_PER_DAY, UserSession};
use crate::states::{State, StateDeps, names, today};
use crate::storage::AnswerKind;
use anyhow::Result;
use async_trait::async_trait;
use serde_json::json;
use std::sync::Arc;
use tracing::info;

const MIN_WORK_PRODUCT_CHARS: usize = 3;

/// The practice task of the day. The user replies with the name of their
/// work product.
pub struct TaskState {
    deps: Arc<StateDeps>,
}

impl TaskState {
    pub fn new(deps: Arc<StateDeps>) -> Self {
        Self { deps }
    }
}

fn day_finished(user: &UserSession) -> bool {
    user.marathon.current_topic_index % TOPICS_PER_DAY == 0
}

#[async_trait]
impl State for TaskState {
    fn name(&self) -> &'static str {
        names::TASK
    }

    fn allow_global(&self) -> &'static [&'static str] {
        &["consultation", "mode"]
    }

    async fn enter(&self, user: &mut UserSession, _context: &StateContext) -> Result<()> {
        let deps = &self.deps;
        let Some(topic) = deps.curriculum.topic(user.marathon.current_topic_index) else {
            return deps.send(user, deps.t("marathon.completed", user, &[])).await;
        };

        let day = user.marathon.marathon_day().to_string();
        let mut text = format!("✏️ {}", deps.t("marathon.day_practice", user, &[("day", &day)]));
        if let Some(intro) = deps.content.practice_intro(topic, user).await {
            text.push_str(&format!("\n\n{intro}"));
        }
        text.push_str(&format!(
            "\n\n📋 {}: {}\n\n{}",
            deps.t("marathon.task", user, &[]),
            topic.task,
            deps.t("marathon.write_wp_name", user, &[])
        ));
        let skip = deps.t("marathon.skip_button", user, &[]);
        deps.send_buttons(user, text, vec![skip]).await
    }

    async fn handle(&self, user: &mut UserSession, message: &IncomingMessage) -> Result<Option<String>> {
        let deps = &self.deps;
        if deps.wants_skip(user, message) {
            user.marathon.skip_topic();
            deps.send(user, deps.t("marathon.practice_skipped", user, &[])).await?;
            return Ok(Some("day_complete".into()));
        }

        let work_product = message.trimmed();
        if work_product.chars().count() < MIN_WORK_PRODUCT_CHARS {
            deps.send(user, deps.t("marathon.waiting_for_wp", user, &[])).await?;
            return Ok(None);
        }

        let index = user.marathon.current_topic_index;
        deps.save_answer(user, Some(index), AnswerKind::WorkProduct, work_product)
            .await;
        user.marathon.complete_topic(today());
        info!(user_id = user.user_id, topic_index = index, "Work product accepted");
        deps.send(user, deps.t("marathon.practice_accepted", user, &[])).await?;

        if user.marathon.is_complete() {
            deps.send(user, deps.t("marathon.completed", user, &[])).await?;
            return Ok(Some("marathon_complete".into()));
        }
        if day_finished(user) {
            deps.send(user, deps.t("marathon.day_complete", user, &[])).await?;
            return Ok(Some("day_complete".into()));
        }
        Ok(Some("submitted".into()))
    }

    async fn exit(&self, user: &UserSession) -> StateContext {
        StateContext::from([
            ("day_completed".to_string(), json!(day_finished(user))),
            (
                "topics_completed".to_string(),
                json!(user.marathon.completed_topics.len()),
            ),
        ])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::MARATHON_TOPICS;
    use crate::states::testing::{harness, llm_replying};

    fn on_practice() -> UserSession {
        let mut user = UserSession::new(1);
        user.marathon.current_topic_index = 1;
        user.marathon.completed_topics = vec![0];
        user
    }

    #[tokio::test]
    async fn test_task_is_presented() {
        let h = harness(llm_replying("This task builds your slot."));
        let state = TaskState::new(h.deps.clone());
        let mut user = on_practice();

        state.enter(&mut user, &StateContext::new()).await.unwrap();
        let texts = h.texts(1).await;
        let text = &texts[0];
        assert!(text.contains("This task builds your slot."));
        assert!(text.contains("Work product for Self-development slot"));
    }

    #[tokio::test]
    async fn test_work_product_completes_the_day() {
        let h = harness(llm_replying("unused"));
        let state = TaskState::new(h.deps.clone());
        let mut user = on_practice();

        let event = state.handle(&mut user, &IncomingMessage::new("Slot plan")).await.unwrap();
        assert_eq!(event.as_deref(), Some("day_complete"));
        assert_eq!(user.marathon.completed_topics, vec![0, 1]);
        assert_eq!(h.repo.answers().await[0].kind, AnswerKind::WorkProduct);

        let exit = state.exit(&user).await;
        assert_eq!(exit.get("day_completed"), Some(&json!(true)));
        assert_eq!(exit.get("topics_completed"), Some(&json!(2)));
    }

    #[tokio::test]
    async fn test_short_work_product_and_skip() {
        let h = harness(llm_replying("unused"));
        let state = TaskState::new(h.deps.clone());
        let mut user = on_practice();

        assert_eq!(state.handle(&mut user, &IncomingMessage::new("ok")).await.unwrap(), None);
        let event = state.handle(&mut user, &IncomingMessage::new("пропустить")).await.unwrap();
        assert_eq!(event.as_deref(), Some("day_complete"));
        assert_eq!(user.marathon.current_topic_index, 2);
        assert_eq!(user.marathon.completed_topics, vec![0]);
    }

    #[tokio::test]
    async fn test_last_work_product_completes_marathon() {
        let h = harness(llm_replying("unused"));
        let state = TaskState::new(h.deps.clone());
        let mut user = UserSession::new(1);
        user.marathon.completed_topics = (0..MARATHON_TOPICS - 1).collect();
        user.marathon.current_topic_index = MARATHON_TOPICS - 1;

        let event = state.handle(&mut user, &IncomingMessage::new("Final plan")).await.unwrap();
        assert_eq!(event.as_deref(), Some("marathon_complete"));
    }
}

use crate::session::{IncomingMessage, StateContext, UserSession};
use crate::states::{State, StateDeps, names, today};
use crate::storage::AnswerKind;
use anyhow::Result;
use async_trait::async_trait;
use serde_json::json;
use std::sync::Arc;
use tracing::info;

const MIN_ANSWER_CHARS: usize = 20;

/// Asks a comprehension question on the lesson just read.
pub struct QuestionState {
    deps: Arc<StateDeps>,
}

impl QuestionState {
    pub fn new(deps: Arc<StateDeps>) -> Self {
        Self { deps }
    }
}

#[async_trait]
impl State for QuestionState {
    fn name(&self) -> &'static str {
        names::QUESTION
    }

    fn allow_global(&self) -> &'static [&'static str] {
        &["consultation", "mode"]
    }

    async fn enter(&self, user: &mut UserSession, _context: &StateContext) -> Result<()> {
        let deps = &self.deps;
        let Some(topic) = deps.curriculum.topic(user.marathon.current_topic_index) else {
            return deps.send(user, deps.t("marathon.completed", user, &[])).await;
        };
        let tier = user.marathon.complexity_level;
        let question = match deps.content.question(topic, user, tier).await {
            Some(question) => question,
            None => deps.t("marathon.question_fallback", user, &[("topic", &topic.title)]),
        };

        let text = format!(
            "❓ {question}\n\n{}",
            deps.t("marathon.answer_hint", user, &[])
        );
        let skip = deps.t("marathon.skip_button", user, &[]);
        deps.send_buttons(user, text, vec![skip]).await
    }

    async fn handle(&self, user: &mut UserSession, message: &IncomingMessage) -> Result<Option<String>> {
        let deps = &self.deps;
        if deps.wants_skip(user, message) {
            user.marathon.skip_topic();
            deps.send(user, deps.t("marathon.topic_skipped", user, &[])).await?;
            return Ok(Some("skip".into()));
        }

        let answer = message.trimmed();
        if answer.chars().count() < MIN_ANSWER_CHARS {
            deps.send(user, deps.t("marathon.answer_too_short", user, &[])).await?;
            return Ok(None);
        }

        let index = user.marathon.current_topic_index;
        deps.save_answer(user, Some(index), AnswerKind::TheoryAnswer, answer).await;
        let upgraded = user.marathon.complete_topic(today());
        let tier = user.marathon.complexity_level;
        info!(user_id = user.user_id, topic_index = index, tier, upgraded, "Theory answer accepted");

        deps.send(user, deps.t("marathon.answer_accepted", user, &[])).await?;
        if upgraded {
            let level = user.marathon.complexity_level.to_string();
            deps.send(user, deps.t("marathon.level_up", user, &[("level", &level)]))
                .await?;
        }

        let event = if tier >= 2 { "correct" } else { "correct_level_1" };
        Ok(Some(event.into()))
    }

    async fn exit(&self, user: &UserSession) -> StateContext {
        StateContext::from([
            ("topic_index".to_string(), json!(user.marathon.current_topic_index)),
            ("complexity_level".to_string(), json!(user.marathon.complexity_level)),
            ("from_question".to_string(), json!(true)),
        ])
    }
}

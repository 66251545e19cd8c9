use crate::question::{Answer, ProgressSink, ProgressStage};
use crate::session::{IncomingMessage, Mode, StateContext, UserSession};
use crate::states::{State, StateDeps, names};
use anyhow::Result;
use async_trait::async_trait;
use serde_json::json;
use std::sync::Arc;

const QUESTION_KEY: &str = "question";
const CITED_SOURCES: usize = 2;

/// Answers a question asked with the `?` prefix, then returns to the
/// interrupted state.
pub struct ConsultationState {
    deps: Arc<StateDeps>,
}

/// Tells the user the question is being worked on.
struct ChatProgress<'a> {
    deps: &'a StateDeps,
    user: &'a UserSession,
}

#[async_trait]
impl ProgressSink for ChatProgress<'_> {
    async fn report(&self, stage: ProgressStage) -> Result<()> {
        if stage != ProgressStage::Analyzing {
            return Ok(());
        }
        let text = format!("💭 {}", self.deps.t("consultation.thinking", self.user, &[]));
        self.deps.send(self.user, text).await
    }
}

impl ConsultationState {
    pub fn new(deps: Arc<StateDeps>) -> Self {
        Self { deps }
    }

    fn context_topic(user: &UserSession) -> Option<String> {
        match user.mode {
            Mode::Feed if !user.feed.accepted_topics.is_empty() => {
                Some(user.feed.accepted_topics.join(", "))
            }
            // The question handler derives the marathon topic itself.
            _ => None,
        }
    }

    fn format_answer(&self, user: &UserSession, answer: &Answer) -> String {
        if answer.sources.is_empty() {
            return answer.text.clone();
        }
        let cited = answer
            .sources
            .iter()
            .take(CITED_SOURCES)
            .cloned()
            .collect::<Vec<_>>()
            .join(", ");
        format!(
            "{}\n\n📚 {}: {cited}",
            answer.text,
            self.deps.t("consultation.sources", user, &[])
        )
    }

    async fn answer(&self, user: &mut UserSession, question: &str) -> Result<()> {
        let snapshot = user.clone();
        let progress = ChatProgress {
            deps: &self.deps,
            user: &snapshot,
        };
        let topic = Self::context_topic(user);
        let answer = self
            .deps
            .questions
            .handle_question(question, user, topic.as_deref(), Some(&progress))
            .await;
        self.deps.send(user, self.format_answer(user, &answer)).await?;
        self.deps
            .send(user, self.deps.t("consultation.followup_hint", user, &[]))
            .await
    }
}

#[async_trait]
impl State for ConsultationState {
    fn name(&self) -> &'static str {
        names::CONSULTATION
    }

    async fn enter(&self, user: &mut UserSession, context: &StateContext) -> Result<()> {
        let question = context
            .get(QUESTION_KEY)
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .trim();
        if question.is_empty() {
            return self
                .deps
                .send(user, self.deps.t("consultation.no_question", user, &[]))
                .await;
        }
        self.answer(user, question).await
    }

    async fn handle(&self, user: &mut UserSession, message: &IncomingMessage) -> Result<Option<String>> {
        if let Some(question) = message.trimmed().strip_prefix('?').map(str::trim) {
            if !question.is_empty() {
                self.answer(user, question).await?;
                return Ok(Some("followup".into()));
            }
        }
        self.deps
            .send(user, self.deps.t("consultation.returning", user, &[]))
            .await?;
        Ok(Some("done".into()))
    }

    async fn exit(&self, _user: &UserSession) -> StateContext {
        StateContext::from([("consultation_complete".to_string(), json!(true))])
    }
}

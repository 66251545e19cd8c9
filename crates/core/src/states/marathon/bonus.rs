use crate::session::{IncomingMessage, StateContext, UserSession};
use crate::states::{State, StateDeps, names, normalized};
use crate::storage::AnswerKind;
use anyhow::Result;
use async_trait::async_trait;
use serde_json::{Value, json};
use std::sync::Arc;

const MIN_ANSWER_CHARS: usize = 20;
const ASKED_KEY: &str = "bonus_asked";
const YES_WORDS: &[&str] = &["да", "yes", "sí", "si", "harder"];
const NO_WORDS: &[&str] = &["нет", "no", "достаточно", "enough", "basta"];

/// Offers a harder question after a correct answer at tier 2 or above.
pub struct BonusState {
    deps: Arc<StateDeps>,
}

impl BonusState {
    pub fn new(deps: Arc<StateDeps>) -> Self {
        Self { deps }
    }

    fn matches(&self, user: &UserSession, text: &str, button_key: &str, words: &[&str]) -> bool {
        let button = self.deps.t(button_key, user, &[]).to_lowercase();
        text == button || words.contains(&text)
    }

    async fn offer(&self, user: &UserSession) -> Result<()> {
        let buttons = vec![
            self.deps.t("marathon.bonus_yes_button", user, &[]),
            self.deps.t("marathon.bonus_no_button", user, &[]),
        ];
        let text = self.deps.t("marathon.bonus_offer", user, &[]);
        self.deps.send_buttons(user, text, buttons).await
    }

    /// Asks the bonus question on the topic that was just completed.
    async fn ask(&self, user: &mut UserSession) -> Result<()> {
        let deps = &self.deps;
        let index = user.marathon.current_topic_index.saturating_sub(1);
        let question = match deps.curriculum.topic(index) {
            Some(topic) => match deps.content.bonus_question(topic, user).await {
                Some(question) => question,
                None => deps.t("marathon.question_fallback", user, &[("topic", &topic.title)]),
            },
            None => deps.t("marathon.bonus_fallback", user, &[]),
        };
        user.state_context.insert(ASKED_KEY.into(), Value::Bool(true));
        deps.send(user, format!("🎯 {question}")).await
    }
}

#[async_trait]
impl State for BonusState {
    fn name(&self) -> &'static str {
        names::BONUS
    }

    fn allow_global(&self) -> &'static [&'static str] {
        &["consultation", "mode"]
    }

    async fn enter(&self, user: &mut UserSession, _context: &StateContext) -> Result<()> {
        user.state_context.insert(ASKED_KEY.into(), Value::Bool(false));
        self.offer(user).await
    }

    async fn handle(&self, user: &mut UserSession, message: &IncomingMessage) -> Result<Option<String>> {
        let text = normalized(message);
        if self.matches(user, &text, "marathon.bonus_no_button", NO_WORDS) {
            return Ok(Some("no".into()));
        }

        let asked = user.state_context.get(ASKED_KEY) == Some(&Value::Bool(true));
        if !asked {
            if self.matches(user, &text, "marathon.bonus_yes_button", YES_WORDS) {
                self.ask(user).await?;
                return Ok(Some("yes".into()));
            }
            self.offer(user).await?;
            return Ok(None);
        }

        let answer = message.trimmed();
        if answer.chars().count() < MIN_ANSWER_CHARS {
            self.deps
                .send(user, self.deps.t("marathon.answer_too_short", user, &[]))
                .await?;
            return Ok(None);
        }
        let index = user.marathon.current_topic_index.saturating_sub(1);
        self.deps
            .save_answer(user, Some(index), AnswerKind::BonusAnswer, answer)
            .await;
        self.deps
            .send(user, self.deps.t("marathon.bonus_accepted", user, &[]))
            .await?;
        Ok(Some("answered".into()))
    }

    async fn exit(&self, _user: &UserSession) -> StateContext {
        StateContext::from([("from_bonus".to_string(), json!(true))])
    }
}

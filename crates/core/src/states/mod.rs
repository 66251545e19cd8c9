//! Conversational States
//!
//! Each state is a named unit with three hooks: `enter` runs after the
//! machine lands on it, `handle` reacts to user input and may return an
//! event name, `exit` hands a context payload to the next state. States
//! reach the outside world only through `StateDeps`.

pub mod common;
pub mod feed;
pub mod marathon;

#[cfg(test)]
pub(crate) mod testing;

use crate::activity::ActivityTracker;
use crate::content::ContentGenerator;
use crate::curriculum::Curriculum;
use crate::i18n::Localizer;
use crate::machine::StateMachine;
use crate::planner::TopicPlanner;
use crate::question::QuestionHandler;
use crate::session::{IncomingMessage, StateContext, UserSession};
use crate::storage::{AnswerKind, AnswerRecord, AnswerRepository};
use crate::transport::{Reply, Transport};
use anyhow::Result;
use async_trait::async_trait;
use chrono::{Local, NaiveDate, Utc};
use std::sync::Arc;
use tracing::error;

/// Registered state names.
pub mod names {
    pub const START: &str = "common.start";
    pub const MODE_SELECT: &str = "common.mode_select";
    pub const CONSULTATION: &str = "common.consultation";
    pub const ERROR: &str = "common.error";
    pub const LESSON: &str = "workshop.marathon.lesson";
    pub const QUESTION: &str = "workshop.marathon.question";
    pub const BONUS: &str = "workshop.marathon.bonus";
    pub const TASK: &str = "workshop.marathon.task";
    pub const FEED_TOPICS: &str = "feed.topics";
    pub const FEED_DIGEST: &str = "feed.digest";
}

const SKIP_WORDS: &[&str] = &["skip", "пропустить", "saltar"];

/// Event emitted by the machine when a state's `handle` fails.
pub const ERROR_EVENT: &str = "error";

#[async_trait]
pub trait State: Send + Sync {
    fn name(&self) -> &'static str;

    /// Global events allowed to interrupt this state when the transition
    /// table does not say otherwise.
    fn allow_global(&self) -> &'static [&'static str] {
        &[]
    }

    /// Whether the state can be entered at all. The machine sends users
    /// headed for an unavailable state to the fallback state instead.
    fn is_available(&self) -> bool {
        true
    }

    async fn enter(&self, user: &mut UserSession, context: &StateContext) -> Result<()>;

    /// Returns the event to fire, or `None` to stay.
    async fn handle(&self, user: &mut UserSession, message: &IncomingMessage) -> Result<Option<String>>;

    async fn exit(&self, _user: &UserSession) -> StateContext {
        StateContext::new()
    }
}

/// Which modes are offered in the mode menu.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Features {
    pub marathon: bool,
    pub feed: bool,
}

impl Default for Features {
    fn default() -> Self {
        Self {
            marathon: true,
            feed: true,
        }
    }
}

/// Collaborators shared by all states.
#[derive(Clone)]
pub struct StateDeps {
    pub transport: Arc<dyn Transport>,
    pub localizer: Arc<dyn Localizer>,
    pub content: Arc<ContentGenerator>,
    pub questions: Arc<QuestionHandler>,
    pub planner: Arc<dyn TopicPlanner>,
    pub curriculum: Arc<Curriculum>,
    pub answers: Arc<dyn AnswerRepository>,
    pub activity: ActivityTracker,
    pub features: Features,
}

impl StateDeps {
    pub fn t(&self, key: &str, user: &UserSession, params: &[(&str, &str)]) -> String {
        self.localizer.t(key, user.language(), params)
    }

    pub async fn send(&self, user: &UserSession, text: impl Into<String>) -> Result<()> {
        self.transport.send(user.user_id, Reply::text(text)).await
    }

    pub async fn send_buttons(&self, user: &UserSession, text: impl Into<String>, buttons: Vec<String>) -> Result<()> {
        self.transport
            .send(user.user_id, Reply::with_buttons(text, buttons))
            .await
    }

    /// Whether the whole message is a skip request: a skip word or the
    /// localized skip button.
    pub fn wants_skip(&self, user: &UserSession, message: &IncomingMessage) -> bool {
        let text = normalized(message);
        SKIP_WORDS.contains(&text.as_str())
            || text == self.t("marathon.skip_button", user, &[]).to_lowercase()
    }

    /// Stores a user answer and counts the day as active. A failed write is
    /// logged; the conversation goes on.
    pub async fn save_answer(&self, user: &mut UserSession, topic_index: Option<usize>, kind: AnswerKind, answer: &str) {
        let record = AnswerRecord {
            user_id: user.user_id,
            topic_index,
            kind,
            answer: answer.to_string(),
            created_at: Utc::now(),
        };
        if let Err(e) = self.answers.save_answer(&record).await {
            error!(user_id = user.user_id, kind = kind.as_str(), error = ?e, "Failed to save answer");
        }
        self.activity.record(user, kind.into(), today()).await;
    }
}

/// The local calendar date used for daily limits.
pub fn today() -> NaiveDate {
    Local::now().date_naive()
}

/// Lowercased, trimmed message text for keyword comparisons.
pub(crate) fn normalized(message: &IncomingMessage) -> String {
    message.trimmed().to_lowercase()
}

/// Registers every built-in state.
pub fn register_all(machine: &mut StateMachine, deps: StateDeps) {
    let deps = Arc::new(deps);
    let states: Vec<Arc<dyn State>> = vec![
        Arc::new(common::StartState::new(deps.clone())),
        Arc::new(common::ModeSelectState::new(deps.clone())),
        Arc::new(common::ConsultationState::new(deps.clone())),
        Arc::new(common::ErrorState::new(deps.clone())),
        Arc::new(marathon::LessonState::new(deps.clone())),
        Arc::new(marathon::QuestionState::new(deps.clone())),
        Arc::new(marathon::BonusState::new(deps.clone())),
        Arc::new(marathon::TaskState::new(deps.clone())),
        Arc::new(feed::TopicsState::new(deps.clone())),
        Arc::new(feed::DigestState::new(deps)),
    ];
    for state in states {
        machine.register(state);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::machine::{TransitionOutcome, TransitionTable};
    use crate::session::Mode;
    use crate::states::testing::{Harness, harness, harness_with, llm_replying};
    use crate::storage::StateStorage;

    const TRANSITIONS: &str = include_str!("../../../../config/transitions.yaml");

    fn machine(h: &Harness) -> StateMachine {
        let table = TransitionTable::from_yaml(TRANSITIONS).unwrap();
        let mut machine = StateMachine::with_table(StateStorage::new(h.repo.clone()), table);
        register_all(&mut machine, (*h.deps).clone());
        machine
    }

    fn marathon_user() -> UserSession {
        let mut user = UserSession::new(1);
        user.mode = Mode::Marathon;
        user.current_state = Some(names::LESSON.into());
        user
    }

    #[tokio::test]
    async fn test_feed_command_is_refused_when_feed_is_disabled() {
        let features = Features {
            marathon: true,
            feed: false,
        };
        let h = harness_with(llm_replying("unused"), features);
        let machine = machine(&h);
        let mut user = marathon_user();

        let outcome = machine.handle_message(&mut user, &IncomingMessage::new("/feed")).await;
        assert_eq!(
            outcome,
            TransitionOutcome::Moved {
                from: names::LESSON.into(),
                to: names::MODE_SELECT.into()
            }
        );
        assert_eq!(user.mode, Mode::Marathon);
        let replies = h.transport.drain(1).await;
        assert_eq!(replies[0].text, "common.mode_select.unavailable");
        assert_eq!(replies[1].buttons, vec!["common.mode_select.marathon"]);
    }

    #[tokio::test]
    async fn test_feed_command_switches_the_mode() {
        let h = harness(llm_replying("unused"));
        let machine = machine(&h);
        let mut user = marathon_user();

        machine.handle_message(&mut user, &IncomingMessage::new("/feed")).await;
        assert_eq!(user.current_state, Some(names::FEED_TOPICS.into()));
        assert_eq!(user.mode, Mode::Feed);
    }

    #[test]
    fn test_skip_needs_the_whole_message() {
        let h = harness(llm_replying("unused"));
        let user = UserSession::new(1);
        for text in ["Skip", "  пропустить ", "SALTAR", "marathon.skip_button"] {
            assert!(h.deps.wants_skip(&user, &IncomingMessage::new(text)), "{text}");
        }
        for text in ["my answer, skip", "skipping is easy", "don't skip"] {
            assert!(!h.deps.wants_skip(&user, &IncomingMessage::new(text)), "{text}");
        }
    }
}

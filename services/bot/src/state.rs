//! Shared Application State
//!
//! This module defines the `AppState` struct, which holds the state machine,
//! the repositories and the reply buffer shared by all handlers.

use std::{collections::HashMap, sync::Arc};
use systrack_core::{
    StateMachine,
    activity::ActivityTracker,
    content::ContentGenerator,
    curriculum::Curriculum,
    i18n::Localizer,
    llm_client::LLMClient,
    planner::TopicPlanner,
    question::QuestionHandler,
    retrieval::{DynamicContextBuilder, RetrievalEngine},
    states::{Features, StateDeps, register_all},
    storage::{ActivityRepository, AnswerRepository, QaRepository, StateStorage, UserRepository},
    transport::RecordingTransport,
};
use tokio::sync::Mutex;

/// Everything needed to build the state machine and its states.
pub struct Components {
    pub users: Arc<dyn UserRepository>,
    pub qa: Arc<dyn QaRepository>,
    pub answers: Arc<dyn AnswerRepository>,
    pub activity: Arc<dyn ActivityRepository>,
    pub llm: Arc<dyn LLMClient>,
    pub retrieval: Arc<RetrievalEngine>,
    pub planner: Arc<dyn TopicPlanner>,
    pub localizer: Arc<dyn Localizer>,
    pub curriculum: Arc<Curriculum>,
    pub features: Features,
}

/// The shared application state, created once at startup and passed to all handlers.
pub struct AppState {
    pub machine: Arc<StateMachine>,
    pub users: Arc<dyn UserRepository>,
    pub qa: Arc<dyn QaRepository>,
    pub transport: Arc<RecordingTransport>,
    user_locks: Mutex<HashMap<i64, Arc<Mutex<()>>>>,
}

impl AppState {
    pub fn new(
        machine: Arc<StateMachine>,
        users: Arc<dyn UserRepository>,
        qa: Arc<dyn QaRepository>,
        transport: Arc<RecordingTransport>,
    ) -> Self {
        Self {
            machine,
            users,
            qa,
            transport,
            user_locks: Mutex::new(HashMap::new()),
        }
    }

    /// Wires the states to their collaborators and registers them on a
    /// machine with an empty transition table. Load a table afterwards.
    pub fn assemble(parts: Components) -> Self {
        let transport = Arc::new(RecordingTransport::new());
        let activity = ActivityTracker::new(Some(parts.activity));
        let context = Arc::new(DynamicContextBuilder::new(Some(parts.qa.clone())));
        let questions = QuestionHandler::new(
            parts.llm.clone(),
            parts.retrieval.clone(),
            context,
            parts.localizer.clone(),
        )
        .with_history(parts.qa.clone())
        .with_curriculum(parts.curriculum.clone())
        .with_activity(activity.clone());

        let deps = StateDeps {
            transport: transport.clone(),
            localizer: parts.localizer,
            content: Arc::new(ContentGenerator::new(parts.llm, Some(parts.retrieval))),
            questions: Arc::new(questions),
            planner: parts.planner,
            curriculum: parts.curriculum,
            answers: parts.answers,
            activity,
            features: parts.features,
        };

        let mut machine = StateMachine::new(StateStorage::new(parts.users.clone()));
        register_all(&mut machine, deps);
        Self::new(Arc::new(machine), parts.users, parts.qa, transport)
    }

    /// The lock that serialises message processing for one user. Locks no
    /// request holds any more are dropped on the way.
    pub async fn user_lock(&self, user_id: i64) -> Arc<Mutex<()>> {
        let mut locks = self.user_locks.lock().await;
        locks.retain(|id, lock| *id == user_id || Arc::strong_count(lock) > 1);
        locks.entry(user_id).or_default().clone()
    }

    #[cfg(test)]
    pub(crate) async fn tracked_locks(&self) -> usize {
        self.user_locks.lock().await.len()
    }
}

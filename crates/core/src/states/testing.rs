//! Shared fixtures for state tests.
//!
//! The catalog is empty, so every localized text is its bare key.

use super::{Features, StateDeps};
use crate::activity::ActivityTracker;
use crate::content::ContentGenerator;
use crate::curriculum::{Curriculum, Topic, TopicKind};
use crate::i18n::Catalog;
use crate::llm_client::MockLLMClient;
use crate::planner::StaticTopicPlanner;
use crate::question::QuestionHandler;
use crate::retrieval::{DynamicContextBuilder, RetrievalConfig, RetrievalEngine};
use crate::storage::InMemoryRepository;
use crate::transport::RecordingTransport;
use std::sync::Arc;

pub(crate) struct Harness {
    pub deps: Arc<StateDeps>,
    pub transport: Arc<RecordingTransport>,
    pub repo: Arc<InMemoryRepository>,
}

impl Harness {
    /// Texts sent to `user_id` since the last call.
    pub async fn texts(&self, user_id: i64) -> Vec<String> {
        self.transport
            .drain(user_id)
            .await
            .into_iter()
            .map(|r| r.text)
            .collect()
    }
}

/// An LLM that answers every prompt with `text`.
pub(crate) fn llm_replying(text: &'static str) -> MockLLMClient {
    let mut llm = MockLLMClient::new();
    llm.expect_generate().returning(move |_, _| Ok(text.to_string()));
    llm
}

fn topic(id: &str, day: usize, kind: TopicKind, title: &str) -> Topic {
    Topic {
        id: id.to_string(),
        day,
        kind,
        title: title.to_string(),
        main_concept: "собранность".to_string(),
        related_concepts: vec!["внимание".to_string()],
        pain_point: String::new(),
        key_insight: String::new(),
        task: format!("Work product for {title}"),
    }
}

/// Two marathon days.
pub(crate) fn curriculum() -> Curriculum {
    Curriculum::new(vec![
        topic("1-1", 1, TopicKind::Theory, "Chaos and focus"),
        topic("1-2", 1, TopicKind::Practice, "Self-development slot"),
        topic("2-1", 2, TopicKind::Theory, "Agency"),
        topic("2-2", 2, TopicKind::Practice, "Agency log"),
    ])
}

pub(crate) fn harness(llm: MockLLMClient) -> Harness {
    harness_with(llm, Features::default())
}

pub(crate) fn harness_with(llm: MockLLMClient, features: Features) -> Harness {
    let llm = Arc::new(llm);
    let repo = Arc::new(InMemoryRepository::new());
    let transport = Arc::new(RecordingTransport::new());
    let catalog = Arc::new(Catalog::new());
    let curriculum = Arc::new(curriculum());
    let retrieval = Arc::new(RetrievalEngine::new(None, None, RetrievalConfig::default()));
    let activity = ActivityTracker::new(Some(repo.clone()));

    let questions = QuestionHandler::new(
        llm.clone(),
        retrieval,
        Arc::new(DynamicContextBuilder::new(None)),
        catalog.clone(),
    )
    .with_curriculum(curriculum.clone())
    .with_activity(activity.clone());

    let deps = StateDeps {
        transport: transport.clone(),
        localizer: catalog,
        content: Arc::new(ContentGenerator::new(llm, None)),
        questions: Arc::new(questions),
        planner: Arc::new(StaticTopicPlanner),
        curriculum,
        answers: repo.clone(),
        activity,
        features,
    };
    Harness {
        deps: Arc::new(deps),
        transport,
        repo,
    }
}

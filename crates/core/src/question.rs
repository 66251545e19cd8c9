//! Question Handler
//!
//! Answers a free-form user question: extracts keywords, retrieves
//! supporting materials, asks the language model and records the exchange.
//! The handler never fails; when the model produces nothing the user gets a
//! localized apology with no sources.

use crate::activity::ActivityTracker;
use crate::curriculum::Curriculum;
use crate::i18n::Localizer;
use crate::intent::extract_keywords;
use crate::llm_client::{LLMClient, generate_or_none};
use crate::retrieval::{
    ConversationItem, DynamicContext, DynamicContextBuilder, RetrievalEngine, RetrievalRequest,
    TopicMetadata,
};
use crate::session::{Mode, UserSession};
use crate::storage::{ActivityKind, QaRecord, QaRepository};
use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;
use tracing::{error, info, warn};

/// Stage boundaries reported while a question is being answered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgressStage {
    Analyzing,
    Searching,
    Generating,
    Done,
}

/// Receives progress notifications. Errors are logged and ignored.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ProgressSink: Send + Sync {
    async fn report(&self, stage: ProgressStage) -> Result<()>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Answer {
    pub text: String,
    pub sources: Vec<String>,
}

pub struct QuestionHandler {
    llm: Arc<dyn LLMClient>,
    retrieval: Arc<RetrievalEngine>,
    context: Arc<DynamicContextBuilder>,
    qa: Option<Arc<dyn QaRepository>>,
    localizer: Arc<dyn Localizer>,
    curriculum: Option<Arc<Curriculum>>,
    activity: ActivityTracker,
}

impl QuestionHandler {
    pub fn new(
        llm: Arc<dyn LLMClient>,
        retrieval: Arc<RetrievalEngine>,
        context: Arc<DynamicContextBuilder>,
        localizer: Arc<dyn Localizer>,
    ) -> Self {
        Self {
            llm,
            retrieval,
            context,
            qa: None,
            localizer,
            curriculum: None,
            activity: ActivityTracker::default(),
        }
    }

    pub fn with_history(mut self, qa: Arc<dyn QaRepository>) -> Self {
        self.qa = Some(qa);
        self
    }

    pub fn with_curriculum(mut self, curriculum: Arc<Curriculum>) -> Self {
        self.curriculum = Some(curriculum);
        self
    }

    pub fn with_activity(mut self, activity: ActivityTracker) -> Self {
        self.activity = activity;
        self
    }

    /// Metadata of the marathon topic the user is currently on.
    fn current_topic(&self, user: &UserSession) -> Option<TopicMetadata> {
        if user.mode != Mode::Marathon {
            return None;
        }
        let curriculum = self.curriculum.as_ref()?;
        curriculum
            .topic(user.marathon.current_topic_index)
            .map(TopicMetadata::from)
    }

    pub async fn handle_question(
        &self,
        question: &str,
        user: &mut UserSession,
        context_topic: Option<&str>,
        progress: Option<&dyn ProgressSink>,
    ) -> Answer {
        report(progress, ProgressStage::Analyzing).await;
        let keywords = extract_keywords(question);
        let topic = self.current_topic(user);
        let context_topic = context_topic
            .map(str::to_string)
            .or_else(|| topic.as_ref().map(|t| t.title.clone()));
        let dynamic = self
            .context
            .build(user, topic, Utc::now().date_naive())
            .await;

        report(progress, ProgressStage::Searching).await;
        let request = RetrievalRequest {
            query: question,
            keywords: &keywords,
            context_topic: context_topic.as_deref(),
            dynamic: Some(&dynamic),
        };
        let retrieved = self.retrieval.search(request).await;

        report(progress, ProgressStage::Generating).await;
        let (system, prompt) = self.prompts(question, user, context_topic.as_deref(), &retrieved.context, &dynamic);
        let answer = match generate_or_none(self.llm.as_ref(), &system, &prompt).await {
            Some(text) => {
                let answer = Answer {
                    text,
                    sources: retrieved.sources,
                };
                self.record(user, question, context_topic.unwrap_or_default(), &answer)
                    .await;
                answer
            }
            None => {
                warn!(user_id = user.user_id, "No answer generated, using fallback");
                Answer {
                    text: self.localizer.t(
                        "consultation.fallback",
                        user.language(),
                        &[("name", user.display_name())],
                    ),
                    sources: Vec::new(),
                }
            }
        };

        report(progress, ProgressStage::Done).await;
        answer
    }

    fn prompts(
        &self,
        question: &str,
        user: &UserSession,
        context_topic: Option<&str>,
        materials: &str,
        dynamic: &DynamicContext,
    ) -> (String, String) {
        let mut profile = format!("You answer questions of {}.", user.display_name());
        if let Some(occupation) = user.profile.occupation.as_deref().filter(|o| !o.is_empty()) {
            profile.push_str(&format!("\nTheir occupation: {occupation}."));
        }
        if let Some(topic) = context_topic {
            profile.push_str(&format!("\nCurrent topic of study: {topic}."));
        }

        let materials_section = if materials.is_empty() {
            String::new()
        } else {
            format!(
                "\n\nINFORMATION FROM THE AISYSTANT MATERIALS:\n{materials}\n\n\
                 Use this information for the answer, adapted to the user's question."
            )
        };
        let additions = dynamic.prompt_additions().render();
        let additions_section = if additions.is_empty() {
            String::new()
        } else {
            format!("\n\n{additions}")
        };

        let system = format!(
            "You are a friendly mentor in systems thinking and personal development.\n\
             {profile}\n\n\
             RULES:\n\
             1. Answer briefly and to the point (3-5 paragraphs at most)\n\
             2. Use plain language, avoid an academic style\n\
             3. If the question relates to the Aisystant materials, rely on the context\n\
             4. If the context is not enough, say so honestly\n\
             5. If the question is off topic, politely redirect\n\
             6. Answer in {lang}{additions_section}{materials_section}",
            lang = user.language().prompt_name(),
        );
        (system, format!("Question: {question}"))
    }

    async fn record(&self, user: &mut UserSession, question: &str, context_topic: String, answer: &Answer) {
        let now = Utc::now();
        self.context
            .memory()
            .add(
                user.user_id,
                ConversationItem {
                    question: question.to_string(),
                    answer: answer.text.clone(),
                    context_topic: context_topic.clone(),
                    created_at: now,
                    sources: answer.sources.clone(),
                },
            )
            .await;

        if let Some(qa) = &self.qa {
            let record = QaRecord {
                user_id: user.user_id,
                mode: user.mode.to_string(),
                context_topic,
                question: question.to_string(),
                answer: answer.text.clone(),
                sources: answer.sources.clone(),
                created_at: now,
            };
            if let Err(e) = qa.save_qa(&record).await {
                error!(user_id = user.user_id, error = ?e, "Failed to save Q&A");
            }
        }
        self.activity
            .record(user, ActivityKind::QuestionAsked, crate::states::today())
            .await;
        info!(user_id = user.user_id, sources = answer.sources.len(), "Question answered");
    }
}

async fn report(sink: Option<&dyn ProgressSink>, stage: ProgressStage) {
    if let Some(sink) = sink {
        if let Err(e) = sink.report(stage).await {
            warn!(?stage, error = ?e, "Progress callback failed");
        }
    }
}

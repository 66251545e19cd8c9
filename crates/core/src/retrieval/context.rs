//! Dynamic Context
//!
//! Auxiliary signals that bias retrieval and prompt composition: where the
//! user is in their learning path, what they asked recently, and what the
//! current topic is about.

use crate::session::{MARATHON_DAYS, Mode, TOPICS_PER_DAY, UserSession};
use crate::storage::QaRepository;
use chrono::{DateTime, NaiveDate, Utc};
use lru::LruCache;
use std::{
    collections::{HashSet, VecDeque},
    num::NonZeroUsize,
    sync::Arc,
};
use tokio::sync::Mutex;
use tracing::{debug, error};

const MAX_BOOST_TERMS: usize = 10;
const MEMORY_ITEMS: usize = 5;
const REMEMBERED_ANSWER_CHARS: usize = 500;
const RECENT_IN_PROMPT: usize = 3;
const REMEMBERED_USERS: usize = 1000;

#[derive(Debug, Clone, PartialEq)]
pub struct UserProgressSnapshot {
    pub current_day: usize,
    pub topics_completed: usize,
    pub complexity_level: u8,
    pub mode: Mode,
    pub is_behind_schedule: bool,
    pub active_days_streak: u32,
    pub active_days_total: u32,
}

impl UserProgressSnapshot {
    /// Derives the snapshot; the marathon day follows the calendar when a
    /// start date is known.
    pub fn from_session(user: &UserSession, today: NaiveDate) -> Self {
        let current_day = match user.marathon.start_date {
            Some(start) => {
                let passed = (today - start).num_days().max(0) as usize;
                (passed + 1).clamp(1, MARATHON_DAYS)
            }
            None => user.marathon.marathon_day(),
        };
        let topics_completed = user.marathon.completed_topics.len();
        let expected = current_day * TOPICS_PER_DAY;

        Self {
            current_day,
            topics_completed,
            complexity_level: user.marathon.complexity_level,
            mode: user.mode,
            is_behind_schedule: topics_completed + TOPICS_PER_DAY < expected,
            active_days_streak: user.activity.active_days_streak,
            active_days_total: user.activity.active_days_total,
        }
    }
}

/// Metadata of the topic a question is asked about.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TopicMetadata {
    pub title: String,
    pub main_concept: String,
    pub related_concepts: Vec<String>,
    pub pain_point: String,
    pub key_insight: String,
}

impl TopicMetadata {
    fn boost_terms(&self) -> Vec<String> {
        let mut terms = Vec::new();
        if !self.main_concept.is_empty() {
            terms.push(self.main_concept.clone());
        }
        terms.extend(self.related_concepts.iter().take(5).cloned());
        terms.extend(
            self.pain_point
                .to_lowercase()
                .split(|c: char| !c.is_alphabetic())
                .filter(|w| w.chars().count() >= 5)
                .take(3)
                .map(str::to_string),
        );
        terms
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ConversationItem {
    pub question: String,
    pub answer: String,
    pub context_topic: String,
    pub created_at: DateTime<Utc>,
    pub sources: Vec<String>,
}

/// Sections appended to the question prompt.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PromptAdditions {
    pub progress: Option<String>,
    pub topic: Option<String>,
    pub history: Option<String>,
}

impl PromptAdditions {
    pub fn render(&self) -> String {
        [&self.progress, &self.topic, &self.history]
            .into_iter()
            .flatten()
            .cloned()
            .collect::<Vec<_>>()
            .join("\n\n")
    }
}

#[derive(Debug, Clone, Default)]
pub struct DynamicContext {
    pub progress: Option<UserProgressSnapshot>,
    pub history: Vec<ConversationItem>,
    pub topic: Option<TopicMetadata>,
    pub boost_concepts: Vec<String>,
    pub recent_topics: HashSet<String>,
}

impl DynamicContext {
    /// Terms whose presence raises a snippet's score: the topic's main concept
    /// first, then the derived boost concepts and related concepts, at most 10.
    pub fn boost_terms(&self) -> Vec<String> {
        let mut terms: Vec<String> = Vec::new();
        let topic_terms = self.topic.iter().flat_map(|t| {
            std::iter::once(t.main_concept.clone()).chain(t.related_concepts.iter().cloned())
        });
        for term in topic_terms.chain(self.boost_concepts.iter().cloned()) {
            if !term.is_empty() && !terms.contains(&term) {
                terms.push(term);
            }
        }
        terms.truncate(MAX_BOOST_TERMS);
        terms
    }

    /// One-line progress summary, empty when nothing is known.
    pub fn summary(&self) -> String {
        let mut parts = Vec::new();
        if let Some(p) = &self.progress {
            parts.push(format!("Marathon day {}", p.current_day));
            parts.push(format!("Complexity: {}/3", p.complexity_level));
            if p.topics_completed > 0 {
                parts.push(format!("Topics completed: {}", p.topics_completed));
            }
            if p.is_behind_schedule {
                parts.push("Behind schedule".to_string());
            }
            if p.active_days_streak > 1 {
                parts.push(format!("Active days streak: {}", p.active_days_streak));
            }
        }
        if let Some(topic) = self.topic.as_ref().filter(|t| !t.title.is_empty()) {
            parts.push(format!("Current topic: {}", topic.title));
        }
        parts.join(" | ")
    }

    pub fn prompt_additions(&self) -> PromptAdditions {
        let summary = self.summary();
        let progress = (!summary.is_empty()).then(|| format!("USER PROGRESS: {summary}"));

        let topic = self.topic.as_ref().and_then(|meta| {
            let mut lines = Vec::new();
            if !meta.pain_point.is_empty() {
                lines.push(format!("User pain point: {}", meta.pain_point));
            }
            if !meta.key_insight.is_empty() {
                lines.push(format!("Key insight of the topic: {}", meta.key_insight));
            }
            if !meta.related_concepts.is_empty() {
                let related: Vec<&str> =
                    meta.related_concepts.iter().take(5).map(String::as_str).collect();
                lines.push(format!("Related concepts: {}", related.join(", ")));
            }
            (!lines.is_empty()).then(|| format!("TOPIC CONTEXT:\n{}", lines.join("\n")))
        });

        let history = (!self.history.is_empty()).then(|| {
            let start = self.history.len().saturating_sub(RECENT_IN_PROMPT);
            let mut lines = vec!["RECENT QUESTIONS:".to_string()];
            for item in &self.history[start..] {
                lines.push(format!("- {}", shorten(&item.question, 80)));
            }
            lines.join("\n")
        });

        PromptAdditions {
            progress,
            topic,
            history,
        }
    }
}

fn shorten(text: &str, max_chars: usize) -> String {
    if text.chars().count() > max_chars {
        let cut: String = text.chars().take(max_chars).collect();
        format!("{cut}...")
    } else {
        text.to_string()
    }
}

/// Per-user memory of the last few exchanges, kept for the most recently
/// active users only. An evicted user is reloaded from the Q&A log.
pub struct ConversationMemory {
    items: Mutex<LruCache<i64, VecDeque<ConversationItem>>>,
}

impl Default for ConversationMemory {
    fn default() -> Self {
        Self::with_capacity(REMEMBERED_USERS)
    }
}

impl ConversationMemory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            items: Mutex::new(LruCache::new(capacity)),
        }
    }

    pub async fn get(&self, user_id: i64) -> Option<Vec<ConversationItem>> {
        self.items
            .lock()
            .await
            .get(&user_id)
            .map(|items| items.iter().cloned().collect())
    }

    /// Replaces the remembered history, keeping the newest items.
    pub async fn set(&self, user_id: i64, history: Vec<ConversationItem>) {
        let mut items: VecDeque<ConversationItem> = history.into();
        while items.len() > MEMORY_ITEMS {
            items.pop_front();
        }
        let evicted = self.items.lock().await.push(user_id, items);
        if let Some((evicted, _)) = evicted.filter(|(id, _)| *id != user_id) {
            debug!(user_id = evicted, "Conversation memory evicted");
        }
    }

    pub async fn add(&self, user_id: i64, mut item: ConversationItem) {
        item.answer = item.answer.chars().take(REMEMBERED_ANSWER_CHARS).collect();
        let mut guard = self.items.lock().await;
        let items = guard.get_or_insert_mut(user_id, VecDeque::new);
        items.push_back(item);
        while items.len() > MEMORY_ITEMS {
            items.pop_front();
        }
    }

    pub async fn clear(&self, user_id: i64) {
        self.items.lock().await.pop(&user_id);
    }

    pub async fn remembered_users(&self) -> usize {
        self.items.lock().await.len()
    }
}

/// Assembles a `DynamicContext` for a user and an optional topic.
pub struct DynamicContextBuilder {
    memory: ConversationMemory,
    qa: Option<Arc<dyn QaRepository>>,
}

impl DynamicContextBuilder {
    pub fn new(qa: Option<Arc<dyn QaRepository>>) -> Self {
        Self {
            memory: ConversationMemory::new(),
            qa,
        }
    }

    pub fn memory(&self) -> &ConversationMemory {
        &self.memory
    }

    pub async fn build(
        &self,
        user: &UserSession,
        topic: Option<TopicMetadata>,
        today: NaiveDate,
    ) -> DynamicContext {
        let history = self.load_history(user.user_id).await;
        let boost_concepts = topic.as_ref().map(TopicMetadata::boost_terms).unwrap_or_default();
        let recent_topics = history
            .iter()
            .filter(|item| !item.context_topic.is_empty())
            .map(|item| item.context_topic.clone())
            .collect();

        let context = DynamicContext {
            progress: Some(UserProgressSnapshot::from_session(user, today)),
            history,
            topic,
            boost_concepts,
            recent_topics,
        };
        debug!(
            user_id = user.user_id,
            boost_concepts = context.boost_concepts.len(),
            history = context.history.len(),
            "Dynamic context built"
        );
        context
    }

    /// Remembered history, loaded from the Q&A log on first use.
    async fn load_history(&self, user_id: i64) -> Vec<ConversationItem> {
        if let Some(history) = self.memory.get(user_id).await {
            return history;
        }
        let Some(qa) = &self.qa else {
            return Vec::new();
        };
        match qa.get_qa_history(user_id, MEMORY_ITEMS).await {
            Ok(records) => {
                // Stored newest first; memory is chronological.
                let history: Vec<ConversationItem> = records
                    .into_iter()
                    .rev()
                    .map(|r| ConversationItem {
                        question: r.question,
                        answer: r.answer.chars().take(REMEMBERED_ANSWER_CHARS).collect(),
                        context_topic: r.context_topic,
                        created_at: r.created_at,
                        sources: r.sources,
                    })
                    .collect();
                self.memory.set(user_id, history.clone()).await;
                history
            }
            Err(e) => {
                error!(user_id, error = ?e, "Failed to load Q&A history");
                Vec::new()
            }
        }
    }
}

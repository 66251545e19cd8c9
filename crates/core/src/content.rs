//! Lesson Content Generation
//!
//! Composes the prompts for everything the marathon and feed states show:
//! lesson text, comprehension questions per complexity tier, the bonus
//! question, the practice intro and the feed digest. Every generator
//! returns `None` on failure so the calling state can show a localized
//! fallback instead.

use crate::curriculum::Topic;
use crate::llm_client::{LLMClient, generate_or_none};
use crate::retrieval::{RetrievalEngine, RetrievalRequest};
use crate::session::{MAX_COMPLEXITY, UserSession};
use std::sync::Arc;
use tracing::{debug, info};

const LESSON_WORDS: usize = 1200;
const DIGEST_WORDS: usize = 600;

/// How a comprehension question should probe the topic at a given tier.
fn tier_hint(tier: u8) -> (&'static str, &'static str) {
    match tier {
        2 => (
            "Understanding",
            "Ask an OPEN question about understanding (\"Why...\", \"How do you understand...\", \"Explain the link between...\").",
        ),
        3 => (
            "Application",
            "Ask a question about APPLICATION and ANALYSIS (\"Give an example from your life\", \"Analyse the situation\", \"How would you explain it to a colleague...\").",
        ),
        _ => (
            "Distinctions",
            "Ask a question about DISTINGUISHING concepts (\"What is the difference between...\", \"How does ... differ from...\").",
        ),
    }
}

fn depth_name(depth: u32) -> &'static str {
    match depth {
        1 => "basic",
        2 => "practical",
        3 => "integration",
        _ => "deep",
    }
}

pub struct ContentGenerator {
    llm: Arc<dyn LLMClient>,
    retrieval: Option<Arc<RetrievalEngine>>,
}

impl ContentGenerator {
    pub fn new(llm: Arc<dyn LLMClient>, retrieval: Option<Arc<RetrievalEngine>>) -> Self {
        Self { llm, retrieval }
    }

    /// Profile lines shared by every prompt.
    fn personalization(user: &UserSession) -> String {
        let mut lines = vec![format!("The reader's name is {}.", user.display_name())];
        if let Some(occupation) = user.profile.occupation.as_deref().filter(|o| !o.is_empty()) {
            lines.push(format!("Their occupation: {occupation}. Use examples from it."));
        }
        lines.push(format!("Write in {}.", user.language().prompt_name()));
        lines.join("\n")
    }

    async fn retrieve(&self, query: &str, keywords: &[String], topic: Option<&str>) -> String {
        let Some(engine) = &self.retrieval else {
            return String::new();
        };
        let request = RetrievalRequest {
            query,
            keywords,
            context_topic: topic,
            dynamic: None,
        };
        engine.search(request).await.context
    }

    /// Theory text for a marathon topic, grounded in retrieved materials.
    pub async fn lesson(&self, topic: &Topic, user: &UserSession) -> Option<String> {
        let query = format!("{} {}", topic.title, topic.main_concept);
        let materials = self.retrieve(query.trim(), &topic.related_concepts, Some(&topic.title)).await;

        let context_instruction = if materials.is_empty() {
            ""
        } else {
            "Use the provided materials as the basis: recent materials take priority, the guides complement them."
        };
        let system = format!(
            "You are a personal mentor in systems thinking and personal development.\n\
             {profile}\n\n\
             Write a text of about {LESSON_WORDS} words. No headings, only paragraphs.\n\
             The text must be engaging, with examples from the reader's life.\n\n\
             STRICTLY FORBIDDEN:\n\
             - adding questions anywhere in the text\n\
             - ending the text with a question\n\
             The question is asked separately after the text.\n\
             {context_instruction}",
            profile = Self::personalization(user),
        );

        let mut prompt = vec![
            format!("Topic: {}", topic.title),
            format!("Main concept: {}", topic.main_concept),
            format!("Related concepts: {}", topic.related_concepts.join(", ")),
        ];
        if !topic.pain_point.is_empty() {
            prompt.push(format!("Reader's pain: {}", topic.pain_point));
        }
        if !topic.key_insight.is_empty() {
            prompt.push(format!("Key insight: {}", topic.key_insight));
        }
        if !materials.is_empty() {
            prompt.push(format!("\nMATERIALS:\n{materials}"));
        }
        prompt.push(
            "\nStart by acknowledging the reader's pain, then develop the topic and lead to the key insight."
                .to_string(),
        );

        info!(user_id = user.user_id, topic = %topic.id, grounded = !materials.is_empty(), "Generating lesson");
        generate_or_none(self.llm.as_ref(), &system, &prompt.join("\n")).await
    }

    /// A single short comprehension question at the given complexity tier.
    pub async fn question(&self, topic: &Topic, user: &UserSession, tier: u8) -> Option<String> {
        let (tier_name, hint) = tier_hint(tier);
        let occupation = user.profile.occupation.as_deref().unwrap_or("work");
        let system = format!(
            "You generate ONLY ONE SHORT QUESTION. Nothing else.\n\
             Ask the question in {lang}.\n\n\
             STRICTLY FORBIDDEN:\n\
             - any introduction, explanation or text before the question\n\
             - headings such as \"Question:\"\n\
             - anything after the question\n\n\
             Output only the question, 1-3 sentences at most.\n\
             The question must relate to the occupation: \"{occupation}\".\n\
             Complexity: {tier_name}.\n\
             {hint}",
            lang = user.language().prompt_name(),
        );
        let prompt = format!(
            "Topic: {}\nMain concept: {}\nRelated concepts: {}",
            topic.title,
            topic.main_concept,
            topic.related_concepts.join(", ")
        );
        debug!(user_id = user.user_id, topic = %topic.id, tier, "Generating question");
        generate_or_none(self.llm.as_ref(), &system, &prompt).await
    }

    /// A harder follow-up question, one tier above the current one.
    pub async fn bonus_question(&self, topic: &Topic, user: &UserSession) -> Option<String> {
        let tier = (user.marathon.complexity_level + 1).min(MAX_COMPLEXITY);
        self.question(topic, user, tier).await
    }

    /// A short motivating introduction to a practice task.
    pub async fn practice_intro(&self, topic: &Topic, user: &UserSession) -> Option<String> {
        let system = format!(
            "You are a personal mentor in systems thinking.\n\
             {profile}\n\n\
             Write a short (3-5 sentences) introduction to a practical task.\n\
             Explain why the task matters and how it connects to the topic of the day.",
            profile = Self::personalization(user),
        );
        let prompt = format!(
            "Practical task: {}\nMain concept: {}\n\nTask: {}\n\nWrite a short introduction that motivates doing the task.",
            topic.title, topic.main_concept, topic.task
        );
        generate_or_none(self.llm.as_ref(), &system, &prompt).await
    }

    /// The feed digest over the user's accepted topics at the given depth.
    pub async fn feed_digest(&self, topics: &[String], user: &UserSession, depth: u32) -> Option<String> {
        let query = topics.join(" ");
        let materials = if query.trim().is_empty() {
            String::new()
        } else {
            self.retrieve(&query, &[], None).await
        };

        let system = format!(
            "You are a personal mentor in systems thinking.\n\
             {profile}\n\n\
             Write a digest of about {DIGEST_WORDS} words on the reader's topics of the week.\n\
             Depth level {depth} ({depth_name}): each level goes further than the previous one.\n\
             End with one reflection question linking the ideas to the reader's work.",
            profile = Self::personalization(user),
            depth_name = depth_name(depth),
        );
        let mut prompt = format!("Topics of the week: {}", topics.join(", "));
        if !materials.is_empty() {
            prompt.push_str(&format!("\n\nMATERIALS:\n{materials}"));
        }
        info!(user_id = user.user_id, depth, topics = topics.len(), "Generating feed digest");
        generate_or_none(self.llm.as_ref(), &system, &prompt).await
    }
}

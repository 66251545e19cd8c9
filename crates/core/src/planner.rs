//! Feed Topic Planner
//!
//! Suggests the weekly topics of the Feed mode. The LLM-backed planner asks
//! the model for a short list and falls back to a static list whenever the
//! model fails or returns something unparseable.

use crate::llm_client::LLMClient;
use crate::session::UserSession;
use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

/// Number of topics offered per week.
pub const TOPICS_TO_SUGGEST: usize = 5;

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct FeedTopic {
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub why: String,
    #[serde(default)]
    pub keywords: Vec<String>,
}

impl FeedTopic {
    pub fn titled(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Default::default()
        }
    }
}

/// Defines the contract for any service that can plan a week of feed topics.
#[async_trait]
pub trait TopicPlanner: Send + Sync {
    async fn suggest_topics(&self, user: &UserSession) -> Result<Vec<FeedTopic>>;
}

/// A `TopicPlanner` that asks the language model.
pub struct LlmTopicPlanner {
    llm: Arc<dyn LLMClient>,
    fallback: StaticTopicPlanner,
}

impl LlmTopicPlanner {
    pub fn new(llm: Arc<dyn LLMClient>) -> Self {
        Self {
            llm,
            fallback: StaticTopicPlanner,
        }
    }

    fn prompts(user: &UserSession) -> (String, String) {
        let occupation = user.profile.occupation.as_deref().unwrap_or("not specified");
        let system = format!(
            "You are a personal mentor in systems thinking.\n\
             Suggest {TOPICS_TO_SUGGEST} topics to study this week.\n\n\
             STUDENT PROFILE:\n- Name: {name}\n- Occupation: {occupation}\n\n\
             RULES:\n\
             1. Topics come from systems thinking and personal development\n\
             2. Each topic fits 5-12 minutes of study\n\
             3. Topics must not repeat each other\n\
             4. Write in {lang}\n\n\
             Answer with a JSON array of objects with the fields \
             \"title\", \"description\", \"why\" and \"keywords\".",
            name = user.display_name(),
            lang = user.language().prompt_name(),
        );
        let user_prompt = format!("Suggest {TOPICS_TO_SUGGEST} topics for this week.");
        (system, user_prompt)
    }
}

#[async_trait]
impl TopicPlanner for LlmTopicPlanner {
    async fn suggest_topics(&self, user: &UserSession) -> Result<Vec<FeedTopic>> {
        let (system, prompt) = Self::prompts(user);
        let answer = match self.llm.generate(&system, &prompt).await {
            Ok(answer) => answer,
            Err(e) => {
                warn!(user_id = user.user_id, error = ?e, "Topic suggestion failed, using fallback");
                return self.fallback.suggest_topics(user).await;
            }
        };

        let topics = parse_topics(&answer);
        if topics.is_empty() {
            warn!(user_id = user.user_id, "Could not parse suggested topics, using fallback");
            return self.fallback.suggest_topics(user).await;
        }
        info!(user_id = user.user_id, topics = topics.len(), "Weekly topics suggested");
        Ok(topics)
    }
}

/// Parses the model's answer: a JSON array if one is present, otherwise a
/// numbered list (`1. Title` or `1) Title`).
pub fn parse_topics(answer: &str) -> Vec<FeedTopic> {
    let mut topics = parse_json_topics(answer).unwrap_or_else(|| parse_numbered_topics(answer));
    topics.retain(|t| !t.title.trim().is_empty());
    topics.truncate(TOPICS_TO_SUGGEST);
    topics
}

fn parse_json_topics(answer: &str) -> Option<Vec<FeedTopic>> {
    let start = answer.find('[')?;
    let end = answer.rfind(']')?;
    if end <= start {
        return None;
    }
    serde_json::from_str(&answer[start..=end]).ok()
}

fn parse_numbered_topics(answer: &str) -> Vec<FeedTopic> {
    answer
        .lines()
        .filter_map(|line| {
            let line = line.trim();
            let idx = line.find(|c: char| c == '.' || c == ')')?;
            if idx == 0 || !line[..idx].chars().all(|c| c.is_ascii_digit()) {
                return None;
            }
            let name = line[idx + 1..].trim().trim_matches('*').trim();
            (!name.is_empty()).then(|| FeedTopic::titled(name))
        })
        .collect()
}

/// A fixed list of topics for development and as a fallback.
pub struct StaticTopicPlanner;

#[async_trait]
impl TopicPlanner for StaticTopicPlanner {
    async fn suggest_topics(&self, _user: &UserSession) -> Result<Vec<FeedTopic>> {
        Ok(vec![
            FeedTopic {
                title: "Three states of attention".into(),
                description: "How to manage attention and be more aware".into(),
                why: "Helps you concentrate on what matters".into(),
                keywords: vec!["внимание".into(), "осознанность".into(), "фокус".into()],
            },
            FeedTopic {
                title: "Systems thinking at work".into(),
                description: "Seeing relations and making better decisions".into(),
                why: "Improves decisions in complex situations".into(),
                keywords: vec!["системное мышление".into(), "решения".into()],
            },
            FeedTopic {
                title: "Self-development practices".into(),
                description: "Organizing your own learning and growth".into(),
                why: "Makes development systematic".into(),
                keywords: vec!["саморазвитие".into(), "привычки".into()],
            },
            FeedTopic {
                title: "Working with beliefs".into(),
                description: "Finding and transforming limiting beliefs".into(),
                why: "Removes inner barriers".into(),
                keywords: vec!["убеждения".into(), "мем".into()],
            },
        ])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm_client::MockLLMClient;
    use anyhow::anyhow;

    #[test]
    fn test_parse_json_topics() {
        let answer = r#"Here you go:
[{"title": "Focus", "description": "d", "why": "w", "keywords": ["фокус"]},
 {"title": "Agency"}]
Enjoy!"#;
        let topics = parse_topics(answer);
        assert_eq!(topics.len(), 2);
        assert_eq!(topics[0].keywords, vec!["фокус"]);
        assert_eq!(topics[1], FeedTopic::titled("Agency"));
    }

    #[test]
    fn test_parse_numbered_topics() {
        let answer = "Topics:\n1. Focus\n2) **Agency**\n- not numbered\n3.\n";
        let titles: Vec<String> = parse_topics(answer).into_iter().map(|t| t.title).collect();
        assert_eq!(titles, vec!["Focus", "Agency"]);
    }

    #[test]
    fn test_parse_caps_list() {
        let answer: String = (1..=8).map(|i| format!("{i}. Topic {i}\n")).collect();
        assert_eq!(parse_topics(&answer).len(), TOPICS_TO_SUGGEST);
    }

    #[tokio::test]
    async fn test_llm_planner_uses_model_output() {
        let mut llm = MockLLMClient::new();
        llm.expect_generate()
            .withf(|system, _| system.contains("Suggest 5 topics"))
            .returning(|_, _| Ok("1. Focus\n2. Agency".to_string()));
        let planner = LlmTopicPlanner::new(Arc::new(llm));

        let topics = planner.suggest_topics(&UserSession::new(1)).await.unwrap();
        assert_eq!(topics.len(), 2);
    }

    #[tokio::test]
    async fn test_llm_planner_falls_back() {
        let mut llm = MockLLMClient::new();
        llm.expect_generate().returning(|_, _| Err(anyhow!("down")));
        let planner = LlmTopicPlanner::new(Arc::new(llm));
        let topics = planner.suggest_topics(&UserSession::new(1)).await.unwrap();
        assert_eq!(topics.len(), 4);

        let mut garbage = MockLLMClient::new();
        garbage.expect_generate().returning(|_, _| Ok("no list here".to_string()));
        let planner = LlmTopicPlanner::new(Arc::new(garbage));
        let topics = planner.suggest_topics(&UserSession::new(1)).await.unwrap();
        assert_eq!(topics[0].title, "Three states of attention");
    }
}

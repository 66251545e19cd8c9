use crate::session::{IncomingMessage, Mode, StateContext, UserSession};
use crate::states::{State, StateDeps, names};
use anyhow::Result;
use async_trait::async_trait;
use fuzzy_matcher::FuzzyMatcher;
use fuzzy_matcher::skim::SkimMatcherV2;
use serde_json::json;
use std::sync::Arc;
use tracing::info;

/// Topics a user may pick for one week.
pub const MAX_SELECTED: usize = 3;
const MIN_FUZZY_SCORE: i64 = 40;

/// Resolves a reply like `1, 3`, `2 и 4` or `focus, habits` against the
/// offered titles. Returns titles in the order given, without repeats.
pub fn parse_selection(text: &str, offered: &[String]) -> Vec<String> {
    let mut selected: Vec<String> = Vec::new();
    let mut push = |title: &String| {
        if !selected.contains(title) {
            selected.push(title.clone());
        }
    };

    let numbers: Vec<usize> = text
        .split(|c: char| !c.is_ascii_digit())
        .filter_map(|n| n.parse().ok())
        .collect();
    if !numbers.is_empty() {
        for n in numbers {
            if let Some(title) = n.checked_sub(1).and_then(|i| offered.get(i)) {
                push(title);
            }
        }
        return selected;
    }

    let matcher = SkimMatcherV2::default().ignore_case();
    let separators = [",", ";", "\n", " и ", " and ", " y "];
    let mut parts = vec![text.to_string()];
    for sep in separators {
        parts = parts
            .iter()
            .flat_map(|p| p.split(sep).map(str::to_string).collect::<Vec<_>>())
            .collect();
    }
    for part in parts.iter().map(|p| p.trim()).filter(|p| !p.is_empty()) {
        let best = offered
            .iter()
            .filter_map(|title| matcher.fuzzy_match(title, part).map(|score| (score, title)))
            .filter(|(score, _)| *score >= MIN_FUZZY_SCORE)
            .max_by_key(|(score, _)| *score);
        if let Some((_, title)) = best {
            push(title);
        }
    }
    selected
}

/// Offers the week's topics and records the user's choice.
pub struct TopicsState {
    deps: Arc<StateDeps>,
}

impl TopicsState {
    pub fn new(deps: Arc<StateDeps>) -> Self {
        Self { deps }
    }

    async fn prompt_again(&self, user: &UserSession) -> Result<()> {
        let text = format!(
            "{}\n\n{}",
            self.deps.t("feed.invalid_selection", user, &[]),
            self.deps.t("feed.choose_hint", user, &[])
        );
        self.deps.send(user, text).await
    }
}

#[async_trait]
impl State for TopicsState {
    fn name(&self) -> &'static str {
        names::FEED_TOPICS
    }

    fn allow_global(&self) -> &'static [&'static str] {
        &["consultation", "mode"]
    }

    fn is_available(&self) -> bool {
        self.deps.features.feed
    }

    async fn enter(&self, user: &mut UserSession, _context: &StateContext) -> Result<()> {
        let deps = &self.deps;
        user.mode = Mode::Feed;
        deps.send(user, format!("⏳ {}", deps.t("feed.generating_topics", user, &[])))
            .await?;
        let topics = deps.planner.suggest_topics(user).await?;
        user.feed.suggested_topics = topics.iter().map(|t| t.title.clone()).collect();

        let list = topics
            .iter()
            .enumerate()
            .map(|(i, t)| {
                if t.description.is_empty() {
                    format!("{}. {}", i + 1, t.title)
                } else {
                    format!("{}. {} - {}", i + 1, t.title, t.description)
                }
            })
            .collect::<Vec<_>>()
            .join("\n");
        let text = format!(
            "📋 {}\n\n{list}\n\n{}",
            deps.t("feed.choose_topics", user, &[]),
            deps.t("feed.choose_hint", user, &[])
        );
        deps.send(user, text).await
    }

    async fn handle(&self, user: &mut UserSession, message: &IncomingMessage) -> Result<Option<String>> {
        if self.deps.wants_skip(user, message) {
            self.deps
                .send(user, self.deps.t("feed.topic_selection_skipped", user, &[]))
                .await?;
            return Ok(Some("skip".into()));
        }

        let selected = parse_selection(message.trimmed(), &user.feed.suggested_topics);
        if selected.is_empty() || selected.len() > MAX_SELECTED {
            self.prompt_again(user).await?;
            return Ok(None);
        }

        info!(user_id = user.user_id, topics = ?selected, "Feed topics selected");
        user.feed.accepted_topics = selected;
        user.feed.depth_level = 1;
        let text = format!(
            "✅ {}\n{}",
            self.deps.t("feed.topics_selected", user, &[]),
            user.feed.accepted_topics.join(", ")
        );
        self.deps.send(user, text).await?;
        Ok(Some("topics_selected".into()))
    }

    async fn exit(&self, _user: &UserSession) -> StateContext {
        StateContext::from([
            ("from_topics".to_string(), json!(true)),
            ("week_started".to_string(), json!(true)),
        ])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::states::testing::{harness, llm_replying};

    fn offered() -> Vec<String> {
        ["Three states of attention", "Systems thinking at work", "Self-development practices", "Working with beliefs"]
            .iter()
            .map(|s| s.to_string())
            .collect()
    }

    #[test]
    fn test_selection_by_numbers() {
        assert_eq!(
            parse_selection("1, 3 и 3", &offered()),
            vec!["Three states of attention", "Self-development practices"]
        );
        assert!(parse_selection("7", &offered()).is_empty());
        assert!(parse_selection("0", &offered()).is_empty());
    }

    #[test]
    fn test_selection_by_fuzzy_title() {
        assert_eq!(
            parse_selection("attention and beliefs", &offered()),
            vec!["Three states of attention", "Working with beliefs"]
        );
        assert!(parse_selection("cooking", &offered()).is_empty());
    }

    #[tokio::test]
    async fn test_topics_flow() {
        let h = harness(llm_replying("unused"));
        let state = TopicsState::new(h.deps.clone());
        let mut user = UserSession::new(1);
        user.feed.depth_level = 4;

        state.enter(&mut user, &StateContext::new()).await.unwrap();
        assert_eq!(user.mode, Mode::Feed);
        assert_eq!(user.feed.suggested_topics.len(), 4);
        assert!(h.texts(1).await[1].contains("1. Three states of attention"));

        let event = state.handle(&mut user, &IncomingMessage::new("1 2 3 4")).await.unwrap();
        assert_eq!(event, None);

        let event = state.handle(&mut user, &IncomingMessage::new("2, 4")).await.unwrap();
        assert_eq!(event.as_deref(), Some("topics_selected"));
        assert_eq!(user.feed.accepted_topics, vec!["Systems thinking at work", "Working with beliefs"]);
        assert_eq!(user.feed.depth_level, 1);
    }

    #[tokio::test]
    async fn test_skip() {
        let h = harness(llm_replying("unused"));
        let state = TopicsState::new(h.deps.clone());
        let mut user = UserSession::new(1);
        let event = state.handle(&mut user, &IncomingMessage::new("Skip")).await.unwrap();
        assert_eq!(event.as_deref(), Some("skip"));
    }

    #[tokio::test]
    async fn test_selection_mentioning_skip_is_a_selection() {
        let h = harness(llm_replying("unused"));
        let state = TopicsState::new(h.deps.clone());
        let mut user = UserSession::new(1);
        state.enter(&mut user, &StateContext::new()).await.unwrap();

        let event = state
            .handle(&mut user, &IncomingMessage::new("2, skip the rest"))
            .await
            .unwrap();
        assert_eq!(event.as_deref(), Some("topics_selected"));
        assert_eq!(user.feed.accepted_topics, vec!["Systems thinking at work"]);
    }
}

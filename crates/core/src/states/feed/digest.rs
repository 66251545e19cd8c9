use crate::session::{IncomingMessage, StateContext, UserSession};
use crate::states::{State, StateDeps, names, normalized, today};
use crate::storage::AnswerKind;
use anyhow::Result;
use async_trait::async_trait;
use serde_json::json;
use std::sync::Arc;
use tracing::info;

const MIN_FIXATION_CHARS: usize = 10;
const CHANGE_WORDS: &[&str] = &["новая неделя", "темы", "new week", "topics", "temas"];
const DONE_WORDS: &[&str] = &["выход", "готово", "exit", "done", "salir"];

/// Shows the digest on the accepted topics and waits for a fixation: a
/// short note of what the user takes away.
pub struct DigestState {
    deps: Arc<StateDeps>,
}

impl DigestState {
    pub fn new(deps: Arc<StateDeps>) -> Self {
        Self { deps }
    }
}

#[async_trait]
impl State for DigestState {
    fn name(&self) -> &'static str {
        names::FEED_DIGEST
    }

    fn allow_global(&self) -> &'static [&'static str] {
        &["consultation", "mode"]
    }

    async fn enter(&self, user: &mut UserSession, context: &StateContext) -> Result<()> {
        let deps = &self.deps;
        let depth = context
            .get("depth_level")
            .and_then(|v| v.as_u64())
            .map(|d| d as u32)
            .unwrap_or(user.feed.depth_level);
        let topics_label = if user.feed.accepted_topics.is_empty() {
            deps.t("feed.general_topics", user, &[])
        } else {
            user.feed.accepted_topics.join(", ")
        };

        deps.send(user, format!("⏳ {}", deps.t("feed.generating_digest", user, &[])))
            .await?;
        let digest = match deps
            .content
            .feed_digest(&user.feed.accepted_topics, user, depth)
            .await
        {
            Some(text) => text,
            None => deps.t("feed.digest_fallback", user, &[]),
        };

        let depth_str = depth.to_string();
        let text = format!(
            "📖 {}\n{topics_label}\n\n📊 {}\n\n{digest}\n\n💬 {}",
            deps.t("feed.digest_title", user, &[]),
            deps.t("feed.depth_level", user, &[("depth", &depth_str)]),
            deps.t("feed.waiting_for_fixation", user, &[])
        );
        deps.send(user, text).await
    }

    async fn handle(&self, user: &mut UserSession, message: &IncomingMessage) -> Result<Option<String>> {
        let deps = &self.deps;
        let text = normalized(message);
        if CHANGE_WORDS.contains(&text.as_str()) {
            deps.send(user, deps.t("feed.changing_topics", user, &[])).await?;
            return Ok(Some("change_topics".into()));
        }
        if DONE_WORDS.contains(&text.as_str()) {
            deps.send(user, deps.t("feed.exit", user, &[])).await?;
            return Ok(Some("done".into()));
        }

        let fixation = message.trimmed();
        if fixation.chars().count() < MIN_FIXATION_CHARS {
            deps.send(user, deps.t("feed.fixation_too_short", user, &[])).await?;
            return Ok(None);
        }

        deps.save_answer(user, None, AnswerKind::FeedFixation, fixation).await;
        let reached = user.feed.depth_level;
        user.feed.depth_level += 1;
        user.feed.fixations += 1;
        user.feed.last_feed_date = Some(today());
        info!(user_id = user.user_id, depth = reached, "Feed fixation saved");

        let reached = reached.to_string();
        deps.send(user, deps.t("feed.fixation_saved", user, &[("depth", &reached)]))
            .await?;
        Ok(Some("fixation_saved".into()))
    }

    async fn exit(&self, user: &UserSession) -> StateContext {
        StateContext::from([
            ("digest_completed".to_string(), json!(true)),
            ("depth_level".to_string(), json!(user.feed.depth_level)),
        ])
    }
}

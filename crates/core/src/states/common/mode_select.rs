use crate::machine::UNAVAILABLE_STATE_KEY;
use crate::session::{IncomingMessage, Mode, StateContext, UserSession};
use crate::states::{State, StateDeps, names, today};
use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::info;

/// The mode menu: Marathon or Feed.
pub struct ModeSelectState {
    deps: Arc<StateDeps>,
}

impl ModeSelectState {
    pub fn new(deps: Arc<StateDeps>) -> Self {
        Self { deps }
    }

    fn buttons(&self, user: &UserSession) -> Vec<String> {
        let mut buttons = Vec::new();
        if self.deps.features.marathon {
            buttons.push(self.deps.t("common.mode_select.marathon", user, &[]));
        }
        if self.deps.features.feed {
            buttons.push(self.deps.t("common.mode_select.feed", user, &[]));
        }
        buttons
    }

    async fn show_menu(&self, user: &UserSession) -> Result<()> {
        let title = self.deps.t("common.mode_select.title", user, &[]);
        self.deps.send_buttons(user, title, self.buttons(user)).await
    }
}

#[async_trait]
impl State for ModeSelectState {
    fn name(&self) -> &'static str {
        names::MODE_SELECT
    }

    fn allow_global(&self) -> &'static [&'static str] {
        &["consultation"]
    }

    async fn enter(&self, user: &mut UserSession, context: &StateContext) -> Result<()> {
        if context.contains_key(UNAVAILABLE_STATE_KEY) {
            let notice = self.deps.t("common.mode_select.unavailable", user, &[]);
            self.deps.send(user, notice).await?;
        }
        self.show_menu(user).await
    }

    async fn handle(&self, user: &mut UserSession, message: &IncomingMessage) -> Result<Option<String>> {
        let text = message.trimmed();
        let is = |key: &str| text.eq_ignore_ascii_case(&self.deps.t(key, user, &[]));

        if self.deps.features.marathon && is("common.mode_select.marathon") {
            user.mode = Mode::Marathon;
            if user.marathon.start_date.is_none() {
                user.marathon.start_date = Some(today());
            }
            info!(user_id = user.user_id, mode = %user.mode, "Mode selected");
            return Ok(Some("marathon".into()));
        }
        if self.deps.features.feed && is("common.mode_select.feed") {
            user.mode = Mode::Feed;
            info!(user_id = user.user_id, mode = %user.mode, "Mode selected");
            return Ok(Some("feed".into()));
        }

        self.show_menu(user).await?;
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::states::testing::{harness, llm_replying};

    #[tokio::test]
    async fn test_menu_lists_enabled_modes() {
        let h = harness(llm_replying("unused"));
        let state = ModeSelectState::new(h.deps.clone());
        let mut user = UserSession::new(1);

        state.enter(&mut user, &StateContext::new()).await.unwrap();
        let replies = h.transport.drain(1).await;
        assert_eq!(
            replies[0].buttons,
            vec!["common.mode_select.marathon", "common.mode_select.feed"]
        );
    }

    #[tokio::test]
    async fn test_selecting_marathon_starts_it() {
        let h = harness(llm_replying("unused"));
        let state = ModeSelectState::new(h.deps.clone());
        let mut user = UserSession::new(1);
        user.mode = Mode::Feed;

        let event = state
            .handle(&mut user, &IncomingMessage::new("common.mode_select.marathon"))
            .await
            .unwrap();
        assert_eq!(event.as_deref(), Some("marathon"));
        assert_eq!(user.mode, Mode::Marathon);
        assert!(user.marathon.start_date.is_some());
    }

    #[tokio::test]
    async fn test_unknown_choice_shows_menu_again() {
        let h = harness(llm_replying("unused"));
        let state = ModeSelectState::new(h.deps.clone());
        let mut user = UserSession::new(1);

        let event = state.handle(&mut user, &IncomingMessage::new("settings")).await.unwrap();
        assert_eq!(event, None);
        assert_eq!(h.texts(1).await, vec!["common.mode_select.title"]);

        let event = state
            .handle(&mut user, &IncomingMessage::new("common.mode_select.feed"))
            .await
            .unwrap();
        assert_eq!(event.as_deref(), Some("feed"));
        assert_eq!(user.mode, Mode::Feed);
    }

    #[tokio::test]
    async fn test_redirect_from_disabled_mode_explains_itself() {
        let h = harness(llm_replying("unused"));
        let state = ModeSelectState::new(h.deps.clone());
        let mut user = UserSession::new(1);
        let context = StateContext::from([(
            UNAVAILABLE_STATE_KEY.to_string(),
            serde_json::json!("feed.topics"),
        )]);

        state.enter(&mut user, &context).await.unwrap();
        assert_eq!(
            h.texts(1).await,
            vec!["common.mode_select.unavailable", "common.mode_select.title"]
        );
    }
}

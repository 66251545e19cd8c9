use crate::session::{IncomingMessage, StateContext, UserSession};
use crate::states::{State, StateDeps, names};
use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;

/// Shown after a state failed. Offers to start over or carry on.
pub struct ErrorState {
    deps: Arc<StateDeps>,
}

impl ErrorState {
    pub fn new(deps: Arc<StateDeps>) -> Self {
        Self { deps }
    }
}

#[async_trait]
impl State for ErrorState {
    fn name(&self) -> &'static str {
        names::ERROR
    }

    async fn enter(&self, user: &mut UserSession, _context: &StateContext) -> Result<()> {
        let buttons = vec![
            self.deps.t("states.error.retry_button", user, &[]),
            self.deps.t("common.back", user, &[]),
        ];
        let text = self.deps.t("states.error.message", user, &[]);
        self.deps.send_buttons(user, text, buttons).await
    }

    async fn handle(&self, user: &mut UserSession, message: &IncomingMessage) -> Result<Option<String>> {
        let retry = self.deps.t("states.error.retry_button", user, &[]);
        if message.trimmed() == retry {
            return Ok(Some("retry".into()));
        }
        Ok(Some("continue".into()))
    }
}

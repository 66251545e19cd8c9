use crate::session::{IncomingMessage, StateContext, UserSession};
use crate::states::{State, StateDeps, names};
use anyhow::Result;
use async_trait::async_trait;
use serde_json::{Value, json};
use std::sync::Arc;
use tracing::info;

const MIN_NAME_CHARS: usize = 2;
const ONBOARDED_KEY: &str = "from_onboarding";

/// Greets the user and asks a newcomer for their name.
pub struct StartState {
    deps: Arc<StateDeps>,
}

impl StartState {
    pub fn new(deps: Arc<StateDeps>) -> Self {
        Self { deps }
    }
}

#[async_trait]
impl State for StartState {
    fn name(&self) -> &'static str {
        names::START
    }

    async fn enter(&self, user: &mut UserSession, _context: &StateContext) -> Result<()> {
        match user.profile.name.clone() {
            Some(name) => {
                let text = self.deps.t("states.start.welcome_back", user, &[("name", &name)]);
                self.deps.send(user, text).await
            }
            None => {
                self.deps
                    .send(user, self.deps.t("states.start.welcome_new", user, &[]))
                    .await?;
                self.deps
                    .send(user, self.deps.t("states.start.ask_name", user, &[]))
                    .await
            }
        }
    }

    async fn handle(&self, user: &mut UserSession, message: &IncomingMessage) -> Result<Option<String>> {
        if user.profile.name.is_some() {
            return Ok(Some("existing_user".into()));
        }

        let name = message.trimmed();
        if name.chars().count() < MIN_NAME_CHARS {
            self.deps
                .send(user, self.deps.t("states.start.ask_name", user, &[]))
                .await?;
            return Ok(None);
        }

        user.profile.name = Some(name.to_string());
        user.state_context.insert(ONBOARDED_KEY.into(), Value::Bool(true));
        info!(user_id = user.user_id, "Onboarding complete");
        let text = self.deps.t("common.welcome", user, &[("name", name)]);
        self.deps.send(user, text).await?;
        Ok(Some("onboarding_complete".into()))
    }

    async fn exit(&self, user: &UserSession) -> StateContext {
        let onboarded = user.state_context.get(ONBOARDED_KEY) == Some(&Value::Bool(true));
        StateContext::from([(ONBOARDED_KEY.to_string(), json!(onboarded))])
    }
}

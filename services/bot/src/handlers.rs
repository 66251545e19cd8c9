//! Axum Handlers for the REST API
//!
//! Each message for a user is processed under that user's lock: load the
//! session, run it through the state machine, persist, and return whatever
//! the states sent in the meantime.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use std::sync::Arc;
use systrack_core::{
    session::{IncomingMessage, StateContext, StateName, UserSession},
    storage::UserRepository,
};
use tracing::{debug, error, info, warn};

use crate::{
    models::{
        ErrorResponse, ForceStatePayload, MessageResponse, QaQuery, QaView, ReloadResponse,
        SendMessagePayload, SessionView, UsersInStateResponse,
    },
    state::AppState,
};

const DEFAULT_QA_LIMIT: usize = 10;
const MAX_QA_LIMIT: usize = 100;

pub enum ApiError {
    BadRequest(String),
    NotFound(String),
    InternalServerError(anyhow::Error),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::BadRequest(message) => {
                (StatusCode::BAD_REQUEST, Json(ErrorResponse { message })).into_response()
            }
            ApiError::NotFound(message) => {
                (StatusCode::NOT_FOUND, Json(ErrorResponse { message })).into_response()
            }
            ApiError::InternalServerError(err) => {
                error!("Internal Server Error: {:?}", err);
                let message = "An internal server error occurred.".to_string();
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(ErrorResponse { message }),
                )
                    .into_response()
            }
        }
    }
}

impl<E> From<E> for ApiError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        Self::InternalServerError(err.into())
    }
}

/// Loads the user's session. A storage failure is an error here rather than
/// a fresh session, so an outage never resets anybody's progress.
async fn load_user(state: &AppState, user_id: i64) -> Result<Option<UserSession>, ApiError> {
    Ok(state.users.get_user(user_id).await?)
}

/// Persists the session and collects the replies queued for the user.
async fn finish(state: &AppState, user: &UserSession) -> MessageResponse {
    if !state.machine.storage().save_state(user).await {
        warn!(user_id = user.user_id, "Session was not persisted after processing");
    }
    let replies = state.transport.drain(user.user_id).await;
    MessageResponse {
        state: user.current_state.as_ref().map(ToString::to_string),
        replies: replies.into_iter().map(Into::into).collect(),
    }
}

/// Process one incoming chat message.
#[utoipa::path(
    post,
    path = "/users/{id}/messages",
    request_body = SendMessagePayload,
    responses(
        (status = 200, description = "Message processed", body = MessageResponse),
        (status = 400, description = "Empty message", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    ),
    params(
        ("id" = i64, Path, description = "Chat user ID")
    )
)]
pub async fn send_message(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<i64>,
    Json(payload): Json<SendMessagePayload>,
) -> Result<Json<MessageResponse>, ApiError> {
    if payload.text.trim().is_empty() {
        return Err(ApiError::BadRequest("Message text must not be empty".to_string()));
    }

    let lock = state.user_lock(user_id).await;
    let _guard = lock.lock().await;

    let Some(mut user) = load_user(&state, user_id).await? else {
        info!(user_id, "First contact, entering the default state");
        let mut user = UserSession::new(user_id);
        state.machine.start(&mut user, StateContext::new()).await;
        return Ok(Json(finish(&state, &user).await));
    };

    let outcome = state
        .machine
        .handle_message(&mut user, &IncomingMessage::new(payload.text))
        .await;
    debug!(user_id, ?outcome, "Message handled");
    Ok(Json(finish(&state, &user).await))
}

/// Restart the conversation from the default state.
#[utoipa::path(
    post,
    path = "/users/{id}/start",
    responses(
        (status = 200, description = "Conversation restarted", body = MessageResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    ),
    params(
        ("id" = i64, Path, description = "Chat user ID")
    )
)]
pub async fn start_user(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<i64>,
) -> Result<Json<MessageResponse>, ApiError> {
    let lock = state.user_lock(user_id).await;
    let _guard = lock.lock().await;

    let mut user = load_user(&state, user_id)
        .await?
        .unwrap_or_else(|| UserSession::new(user_id));
    state.machine.start(&mut user, StateContext::new()).await;
    Ok(Json(finish(&state, &user).await))
}

/// Get a user's session.
#[utoipa::path(
    get,
    path = "/users/{id}",
    responses(
        (status = 200, description = "Session details", body = SessionView),
        (status = 404, description = "User not found", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    ),
    params(
        ("id" = i64, Path, description = "Chat user ID")
    )
)]
pub async fn get_user(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<i64>,
) -> Result<Json<SessionView>, ApiError> {
    let user = load_user(&state, user_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("User '{}' not found", user_id)))?;
    Ok(Json(SessionView::from(&user)))
}

/// Move a user into a state directly, skipping the current state's exit.
#[utoipa::path(
    put,
    path = "/users/{id}/state",
    request_body = ForceStatePayload,
    responses(
        (status = 200, description = "State entered", body = MessageResponse),
        (status = 400, description = "State is not registered", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    ),
    params(
        ("id" = i64, Path, description = "Chat user ID")
    )
)]
pub async fn force_state(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<i64>,
    Json(payload): Json<ForceStatePayload>,
) -> Result<Json<MessageResponse>, ApiError> {
    let target = StateName::from(payload.state);
    if !state.machine.is_registered(target.as_str()) {
        return Err(ApiError::BadRequest(format!(
            "State '{}' is not registered",
            target
        )));
    }

    let lock = state.user_lock(user_id).await;
    let _guard = lock.lock().await;

    let mut user = load_user(&state, user_id)
        .await?
        .unwrap_or_else(|| UserSession::new(user_id));
    state
        .machine
        .force_state(&mut user, &target, payload.context)
        .await;
    Ok(Json(finish(&state, &user).await))
}

/// List a user's recent questions and answers, newest first.
#[utoipa::path(
    get,
    path = "/users/{id}/qa",
    responses(
        (status = 200, description = "Q&A history", body = [QaView]),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    ),
    params(
        ("id" = i64, Path, description = "Chat user ID"),
        QaQuery
    )
)]
pub async fn qa_history(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<i64>,
    Query(query): Query<QaQuery>,
) -> Result<Json<Vec<QaView>>, ApiError> {
    let limit = query.limit.unwrap_or(DEFAULT_QA_LIMIT).clamp(1, MAX_QA_LIMIT);
    let history = state.qa.get_qa_history(user_id, limit).await?;
    Ok(Json(history.into_iter().map(QaView::from).collect()))
}

/// List the users currently in a state.
#[utoipa::path(
    get,
    path = "/states/{name}/users",
    responses(
        (status = 200, description = "Users in the state", body = UsersInStateResponse)
    ),
    params(
        ("name" = String, Path, description = "State name, e.g. feed.digest")
    )
)]
pub async fn users_in_state(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> Json<UsersInStateResponse> {
    let users = state
        .machine
        .storage()
        .find_users_in_state(&StateName::from(name.as_str()))
        .await;
    Json(UsersInStateResponse {
        state: name,
        user_ids: users.into_iter().map(|u| u.user_id).collect(),
    })
}

/// Re-read the transition table. A failed reload keeps the current table.
#[utoipa::path(
    post,
    path = "/admin/transitions/reload",
    responses(
        (status = 200, description = "Table reloaded", body = ReloadResponse),
        (status = 400, description = "Table could not be loaded", body = ErrorResponse)
    )
)]
pub async fn reload_transitions(
    State(state): State<Arc<AppState>>,
) -> Result<Json<ReloadResponse>, ApiError> {
    let report = state
        .machine
        .reload_transitions()
        .await
        .map_err(|e| ApiError::BadRequest(format!("Transition table was not reloaded: {e}")))?;
    info!(clean = report.is_clean(), "Transition table reloaded");
    Ok(Json(report.into()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::router::create_router;
    use crate::state::Components;
    use anyhow::Result;
    use async_trait::async_trait;
    use axum::{Router, body::Body, http::Request};
    use serde_json::{Value, json};
    use systrack_core::{
        curriculum::Curriculum,
        i18n::{Catalog, Localizer},
        llm_client::LLMClient,
        machine::TransitionTable,
        planner::StaticTopicPlanner,
        retrieval::{RetrievalConfig, RetrievalEngine},
        session::{Language, MARATHON_TOPICS},
        states::Features,
        storage::{InMemoryRepository, QaRecord, QaRepository},
    };
    use tower::ServiceExt;

    const TRANSITIONS: &str = include_str!("../../../config/transitions.yaml");
    const CURRICULUM: &str = include_str!("../../../config/curriculum.yaml");

    struct CannedLlm;

    #[async_trait]
    impl LLMClient for CannedLlm {
        async fn generate(&self, _system_prompt: &str, _user_prompt: &str) -> Result<String> {
            Ok("Attention is a resource you invest.".to_string())
        }
    }

    async fn test_app() -> (Router, Arc<AppState>, Arc<InMemoryRepository>) {
        let repo = Arc::new(InMemoryRepository::new());
        let state = AppState::assemble(Components {
            users: repo.clone(),
            qa: repo.clone(),
            answers: repo.clone(),
            activity: repo.clone(),
            llm: Arc::new(CannedLlm),
            retrieval: Arc::new(RetrievalEngine::new(None, None, RetrievalConfig::default())),
            planner: Arc::new(StaticTopicPlanner),
            localizer: Arc::new(Catalog::new()),
            curriculum: Arc::new(Curriculum::from_yaml(CURRICULUM).unwrap()),
            features: Features::default(),
        });
        let report = state
            .machine
            .replace_table(TransitionTable::from_yaml(TRANSITIONS).unwrap())
            .await;
        assert!(report.is_clean(), "{report:?}");
        let state = Arc::new(state);
        (create_router(state.clone()), state, repo)
    }

    async fn call(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let request = Request::builder().method(method).uri(uri);
        let request = match body {
            Some(body) => request
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => request.body(Body::empty()).unwrap(),
        };
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, value)
    }

    async fn say(app: &Router, user_id: i64, text: &str) -> Value {
        let (status, body) = call(
            app,
            "POST",
            &format!("/users/{user_id}/messages"),
            Some(json!({ "text": text })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        body
    }

    #[tokio::test]
    async fn test_onboarding_then_mode_select() {
        let (app, _, _) = test_app().await;

        let body = say(&app, 42, "hello").await;
        assert_eq!(body["state"], "common.start");
        assert_eq!(body["replies"][0]["text"], "states.start.welcome_new");

        let body = say(&app, 42, "Maria").await;
        assert_eq!(body["state"], "common.mode_select");
        let texts: Vec<&str> = body["replies"]
            .as_array()
            .unwrap()
            .iter()
            .map(|r| r["text"].as_str().unwrap())
            .collect();
        assert!(texts.contains(&"common.welcome"));
        assert!(texts.contains(&"common.mode_select.title"));

        let (status, session) = call(&app, "GET", "/users/42", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(session["name"], "Maria");
        assert_eq!(session["previous_state"], "common.start");
    }

    #[tokio::test]
    async fn test_marathon_lesson_is_entered() {
        let (app, _, _) = test_app().await;
        say(&app, 1, "hi").await;
        say(&app, 1, "Maria").await;

        let body = say(&app, 1, "common.mode_select.marathon").await;
        assert_eq!(body["state"], "workshop.marathon.lesson");
        let last = body["replies"].as_array().unwrap().last().unwrap().clone();
        assert!(last["text"].as_str().unwrap().contains("Attention is a resource you invest."));
        assert_eq!(last["buttons"][0], "marathon.ready_button");

        let body = say(&app, 1, "marathon.ready_button").await;
        assert_eq!(body["state"], "workshop.marathon.question");
    }

    #[tokio::test]
    async fn test_consultation_returns_to_interrupted_state() {
        let (app, state, _) = test_app().await;
        say(&app, 5, "hi").await;
        say(&app, 5, "Maria").await;

        let body = say(&app, 5, "?what is a work product").await;
        assert_eq!(body["state"], "common.consultation");
        let texts: Vec<&str> = body["replies"]
            .as_array()
            .unwrap()
            .iter()
            .map(|r| r["text"].as_str().unwrap())
            .collect();
        assert!(texts.iter().any(|t| t.contains("Attention is a resource you invest.")));

        let body = say(&app, 5, "thanks").await;
        assert_eq!(body["state"], "common.mode_select");

        let history = state.qa.get_qa_history(5, 10).await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].question, "what is a work product");

        let (_, session) = call(&app, "GET", "/users/5", None).await;
        assert_eq!(session["activity"]["active_days_total"], 1);
        assert_eq!(session["activity"]["active_days_streak"], 1);
    }

    #[tokio::test]
    async fn test_finished_users_release_their_locks() {
        let (app, state, _) = test_app().await;
        for user_id in 1..=5 {
            say(&app, user_id, "hi").await;
        }
        assert_eq!(state.tracked_locks().await, 1);

        let held = state.user_lock(7).await;
        say(&app, 8, "hi").await;
        assert_eq!(state.tracked_locks().await, 2);
        drop(held);
    }

    #[tokio::test]
    async fn test_empty_message_is_rejected() {
        let (app, _, _) = test_app().await;
        let (status, body) = call(&app, "POST", "/users/1/messages", Some(json!({ "text": "  " }))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["message"], "Message text must not be empty");
    }

    #[tokio::test]
    async fn test_get_unknown_user_is_not_found() {
        let (app, _, _) = test_app().await;
        let (status, _) = call(&app, "GET", "/users/404", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_force_state_and_list_users() {
        let (app, _, _) = test_app().await;

        let (status, body) = call(
            &app,
            "PUT",
            "/users/9/state",
            Some(json!({ "state": "feed.topics", "context": { "week_started": true } })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["state"], "feed.topics");

        let (status, body) = call(&app, "GET", "/states/feed.topics/users", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["user_ids"], json!([9]));

        let (status, _) = call(&app, "PUT", "/users/9/state", Some(json!({ "state": "nowhere" }))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_start_resets_to_default_state() {
        let (app, _, _) = test_app().await;
        call(&app, "PUT", "/users/3/state", Some(json!({ "state": "feed.topics" }))).await;

        let (status, body) = call(&app, "POST", "/users/3/start", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["state"], "common.start");
    }

    #[tokio::test]
    async fn test_qa_history_limit() {
        let (app, _, repo) = test_app().await;
        for i in 0..3 {
            repo.save_qa(&QaRecord {
                user_id: 8,
                mode: "feed".into(),
                context_topic: String::new(),
                question: format!("question {i}"),
                answer: "answer".into(),
                sources: vec![],
                created_at: chrono::Utc::now(),
            })
            .await
            .unwrap();
        }

        let (status, body) = call(&app, "GET", "/users/8/qa?limit=2", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body.as_array().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_reload_without_source_is_rejected() {
        let (app, state, _) = test_app().await;
        let before = state.machine.table().await;

        let (status, _) = call(&app, "POST", "/admin/transitions/reload", None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(Arc::ptr_eq(&before, &state.machine.table().await));
    }

    #[test]
    fn test_shipped_locales_cover_every_language() {
        let mut catalog = Catalog::new();
        catalog.add_yaml(Language::Ru, include_str!("../../../locales/ru.yaml")).unwrap();
        catalog.add_yaml(Language::En, include_str!("../../../locales/en.yaml")).unwrap();
        catalog.add_yaml(Language::Es, include_str!("../../../locales/es.yaml")).unwrap();

        for key in [
            "states.start.welcome_new",
            "common.mode_select.title",
            "common.mode_select.unavailable",
            "consultation.fallback",
            "marathon.day_theory",
            "feed.fixation_saved",
        ] {
            for lang in [Language::Ru, Language::En, Language::Es] {
                assert_ne!(catalog.t(key, lang, &[]), key, "{key} missing for {lang:?}");
            }
        }
        assert_eq!(
            catalog.t("common.welcome", Language::En, &[("name", "Ana")]),
            "Nice to meet you, Ana!"
        );
    }

    #[test]
    fn test_shipped_curriculum_alternates_theory_and_practice() {
        let curriculum = Curriculum::from_yaml(CURRICULUM).unwrap();
        assert_eq!(curriculum.len(), MARATHON_TOPICS);
        for (i, topic) in curriculum.topics.iter().enumerate() {
            assert_eq!(topic.is_practice(), i % 2 == 1, "topic {}", topic.id);
            assert_eq!(topic.day, i / 2 + 1);
        }
    }
}

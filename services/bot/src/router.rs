//! Axum Router Configuration
//!
//! This module defines the complete HTTP routing for the application,
//! including the REST API and OpenAPI documentation.

use crate::{
    handlers,
    models::{
        ActivityView, ErrorResponse, FeedView, ForceStatePayload, MarathonView, MessageResponse, QaView,
        ReloadResponse, ReplyView, SendMessagePayload, SessionView, UsersInStateResponse,
    },
    state::AppState,
};

use axum::{
    Router,
    routing::{get, post, put},
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::send_message,
        handlers::start_user,
        handlers::get_user,
        handlers::force_state,
        handlers::qa_history,
        handlers::users_in_state,
        handlers::reload_transitions,
    ),
    components(
        schemas(
            SendMessagePayload, MessageResponse, ReplyView, ForceStatePayload, SessionView,
            MarathonView, FeedView, ActivityView, QaView, UsersInStateResponse, ReloadResponse, ErrorResponse
        )
    ),
    tags(
        (name = "Systrack Bot", description = "Conversational learning bot driven by a declarative state machine")
    )
)]
pub struct ApiDoc;

/// Creates the main Axum router for the application.
pub fn create_router(app_state: Arc<AppState>) -> Router {
    let api_router = Router::new()
        .route("/users/{id}", get(handlers::get_user))
        .route("/users/{id}/messages", post(handlers::send_message))
        .route("/users/{id}/start", post(handlers::start_user))
        .route("/users/{id}/state", put(handlers::force_state))
        .route("/users/{id}/qa", get(handlers::qa_history))
        .route("/states/{name}/users", get(handlers::users_in_state))
        .route(
            "/admin/transitions/reload",
            post(handlers::reload_transitions),
        )
        // Apply the state ONLY to this group of routes.
        .with_state(app_state);

    Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .merge(api_router)
        .layer(TraceLayer::new_for_http())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_openapi_lists_every_route() {
        let doc = ApiDoc::openapi();
        let paths: Vec<&String> = doc.paths.paths.keys().collect();
        for expected in [
            "/users/{id}",
            "/users/{id}/messages",
            "/users/{id}/start",
            "/users/{id}/state",
            "/users/{id}/qa",
            "/states/{name}/users",
            "/admin/transitions/reload",
        ] {
            assert!(paths.iter().any(|p| p.as_str() == expected), "missing {expected}");
        }
    }
}

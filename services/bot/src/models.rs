//! API Models
//!
//! Request and response bodies of the HTTP surface, documented with
//! `utoipa`. Core types are mapped into these views so the core crate stays
//! free of HTTP concerns.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use systrack_core::{
    machine::ValidationReport, session::UserSession, storage::QaRecord, transport::Reply,
};
use utoipa::{IntoParams, ToSchema};

#[derive(Deserialize, ToSchema)]
pub struct SendMessagePayload {
    #[schema(example = "What is systems thinking?")]
    pub text: String,
}

#[derive(Serialize, Deserialize, ToSchema, Debug, Clone, PartialEq)]
pub struct ReplyView {
    pub text: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub buttons: Vec<String>,
}

impl From<Reply> for ReplyView {
    fn from(reply: Reply) -> Self {
        Self {
            text: reply.text,
            buttons: reply.buttons,
        }
    }
}

/// The user's state after a processed message, with everything the bot said.
#[derive(Serialize, Deserialize, ToSchema, Debug)]
pub struct MessageResponse {
    #[schema(example = "workshop.marathon.lesson")]
    pub state: Option<String>,
    pub replies: Vec<ReplyView>,
}

#[derive(Deserialize, ToSchema)]
pub struct ForceStatePayload {
    #[schema(example = "feed.topics")]
    pub state: String,
    #[serde(default)]
    #[schema(value_type = Object)]
    pub context: HashMap<String, Value>,
}

#[derive(Serialize, Deserialize, ToSchema, Debug)]
pub struct MarathonView {
    pub current_topic_index: usize,
    pub completed_topics: Vec<usize>,
    pub complexity_level: u8,
    pub marathon_day: usize,
    pub start_date: Option<NaiveDate>,
}

#[derive(Serialize, Deserialize, ToSchema, Debug)]
pub struct FeedView {
    pub depth_level: u32,
    pub accepted_topics: Vec<String>,
    pub fixations: u32,
}

#[derive(Serialize, Deserialize, ToSchema, Debug)]
pub struct ActivityView {
    pub active_days_total: u32,
    pub active_days_streak: u32,
    pub longest_streak: u32,
    pub last_active_date: Option<NaiveDate>,
}

#[derive(Serialize, Deserialize, ToSchema, Debug)]
pub struct SessionView {
    pub user_id: i64,
    pub current_state: Option<String>,
    pub previous_state: Option<String>,
    #[schema(value_type = Object)]
    pub state_context: HashMap<String, Value>,
    #[schema(example = "marathon")]
    pub mode: String,
    #[schema(example = "ru")]
    pub language: String,
    pub name: Option<String>,
    pub marathon: MarathonView,
    pub feed: FeedView,
    pub activity: ActivityView,
}

impl From<&UserSession> for SessionView {
    fn from(user: &UserSession) -> Self {
        Self {
            user_id: user.user_id,
            current_state: user.current_state.as_ref().map(ToString::to_string),
            previous_state: user.previous_state.as_ref().map(ToString::to_string),
            state_context: user.state_context.clone(),
            mode: user.mode.to_string(),
            language: user.language().code().to_string(),
            name: user.profile.name.clone(),
            marathon: MarathonView {
                current_topic_index: user.marathon.current_topic_index,
                completed_topics: user.marathon.completed_topics.clone(),
                complexity_level: user.marathon.complexity_level,
                marathon_day: user.marathon.marathon_day(),
                start_date: user.marathon.start_date,
            },
            feed: FeedView {
                depth_level: user.feed.depth_level,
                accepted_topics: user.feed.accepted_topics.clone(),
                fixations: user.feed.fixations,
            },
            activity: ActivityView {
                active_days_total: user.activity.active_days_total,
                active_days_streak: user.activity.active_days_streak,
                longest_streak: user.activity.longest_streak,
                last_active_date: user.activity.last_active_date,
            },
        }
    }
}

#[derive(Deserialize, IntoParams)]
pub struct QaQuery {
    /// Maximum number of records, newest first. Defaults to 10.
    pub limit: Option<usize>,
}

#[derive(Serialize, Deserialize, ToSchema, Debug)]
pub struct QaView {
    pub mode: String,
    pub context_topic: String,
    pub question: String,
    pub answer: String,
    pub sources: Vec<String>,
    pub created_at: DateTime<Utc>,
}

impl From<QaRecord> for QaView {
    fn from(record: QaRecord) -> Self {
        Self {
            mode: record.mode,
            context_topic: record.context_topic,
            question: record.question,
            answer: record.answer,
            sources: record.sources,
            created_at: record.created_at,
        }
    }
}

#[derive(Serialize, Deserialize, ToSchema, Debug)]
pub struct UsersInStateResponse {
    pub state: String,
    pub user_ids: Vec<i64>,
}

#[derive(Serialize, Deserialize, ToSchema, Debug)]
pub struct ReloadResponse {
    pub clean: bool,
    pub dangling: Vec<String>,
    pub undescribed: Vec<String>,
    pub undefined_globals: Vec<String>,
}

impl From<ValidationReport> for ReloadResponse {
    fn from(report: ValidationReport) -> Self {
        Self {
            clean: report.is_clean(),
            dangling: report.dangling,
            undescribed: report.undescribed,
            undefined_globals: report.undefined_globals,
        }
    }
}

#[derive(Serialize, ToSchema)]
pub struct ErrorResponse {
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use systrack_core::session::{Language, StateName};

    #[test]
    fn test_session_view_flattens_progress() {
        let mut user = UserSession::new(7);
        user.current_state = Some(StateName::from("workshop.marathon.question"));
        user.profile.name = Some("Ana".into());
        user.profile.language = Language::Es;
        user.marathon.completed_topics = vec![0, 1, 2];
        user.marathon.current_topic_index = 3;

        let view = SessionView::from(&user);
        assert_eq!(view.current_state.as_deref(), Some("workshop.marathon.question"));
        assert_eq!(view.language, "es");
        assert_eq!(view.mode, "marathon");
        assert_eq!(view.marathon.marathon_day, 2);
        assert_eq!(view.feed.depth_level, 1);
    }

    #[test]
    fn test_reply_view_omits_empty_buttons() {
        let json = serde_json::to_string(&ReplyView::from(Reply::text("hi"))).unwrap();
        assert_eq!(json, r#"{"text":"hi"}"#);

        let json = serde_json::to_string(&ReplyView::from(Reply::with_buttons(
            "pick",
            vec!["A".into()],
        )))
        .unwrap();
        assert!(json.contains(r#""buttons":["A"]"#));
    }

    #[test]
    fn test_force_state_payload_context_is_optional() {
        let payload: ForceStatePayload = serde_json::from_str(r#"{"state": "feed.topics"}"#).unwrap();
        assert_eq!(payload.state, "feed.topics");
        assert!(payload.context.is_empty());
    }

    #[test]
    fn test_error_response_serialization() {
        let error = ErrorResponse {
            message: "User not found".to_string(),
        };
        let json = serde_json::to_string(&error).unwrap();
        assert_eq!(json, r#"{"message":"User not found"}"#);
    }
}

//! Activity Tracking
//!
//! Every answer, fixation or question counts the day as active for the
//! user. The streak lives on the session; each activity is also appended to
//! an optional log.

use crate::session::UserSession;
use crate::storage::{ActivityKind, ActivityRecord, ActivityRepository};
use chrono::NaiveDate;
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Clone, Default)]
pub struct ActivityTracker {
    log: Option<Arc<dyn ActivityRepository>>,
}

impl ActivityTracker {
    pub fn new(log: Option<Arc<dyn ActivityRepository>>) -> Self {
        Self { log }
    }

    /// Marks `today` as active and logs the activity. A failed log write is
    /// only a warning.
    pub async fn record(&self, user: &mut UserSession, kind: ActivityKind, today: NaiveDate) {
        if let Some(log) = &self.log {
            let record = ActivityRecord {
                user_id: user.user_id,
                activity_date: today,
                kind,
                mode: user.mode.to_string(),
            };
            if let Err(e) = log.record_activity(&record).await {
                warn!(user_id = user.user_id, kind = kind.as_str(), error = ?e, "Failed to log activity");
            }
        }

        if user.activity.record_day(today) {
            info!(
                user_id = user.user_id,
                streak = user.activity.active_days_streak,
                total = user.activity.active_days_total,
                "Active day"
            );
        }
    }
}

//! User Session Model
//!
//! A single typed record per end-user. The state machine only touches the
//! `current_state`, `previous_state` and `state_context` fields; everything
//! else is domain payload owned by individual states.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::{borrow::Borrow, collections::HashMap, fmt};

/// Number of days in the marathon.
pub const MARATHON_DAYS: usize = 14;
/// Topics per marathon day (one theory, one practice).
pub const TOPICS_PER_DAY: usize = 2;
/// Total topics in the marathon.
pub const MARATHON_TOPICS: usize = MARATHON_DAYS * TOPICS_PER_DAY;
/// Topics a user may complete on a single calendar day.
pub const DAILY_TOPICS_LIMIT: u32 = 4;
/// Completed topics at one complexity tier before moving to the next.
pub const COMPLEXITY_AUTO_UPGRADE_AFTER: u32 = 7;
/// Highest complexity tier.
pub const MAX_COMPLEXITY: u8 = 3;

/// Ad hoc payload handed from an exiting state to the entering one.
pub type StateContext = HashMap<String, Value>;

/// Identifier of a registered conversational state, e.g. `"common.start"`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StateName(String);

impl StateName {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for StateName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for StateName {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for StateName {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl Borrow<str> for StateName {
    fn borrow(&self) -> &str {
        &self.0
    }
}

/// Interface language of a user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    #[default]
    Ru,
    En,
    Es,
}

impl Language {
    pub fn code(&self) -> &'static str {
        match self {
            Language::Ru => "ru",
            Language::En => "en",
            Language::Es => "es",
        }
    }

    /// Maps a client language code (`"en-US"`, `"es"`) to a supported language.
    pub fn from_code(code: &str) -> Self {
        let prefix: String = code.chars().take(2).collect::<String>().to_lowercase();
        match prefix.as_str() {
            "en" => Language::En,
            "es" => Language::Es,
            _ => Language::Ru,
        }
    }

    /// Human-readable name used inside LLM prompts.
    pub fn prompt_name(&self) -> &'static str {
        match self {
            Language::Ru => "Russian",
            Language::En => "English",
            Language::Es => "Spanish",
        }
    }
}

/// Which pedagogical mode the user is in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    #[default]
    Marathon,
    Feed,
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mode::Marathon => write!(f, "marathon"),
            Mode::Feed => write!(f, "feed"),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Profile {
    pub name: Option<String>,
    pub occupation: Option<String>,
    pub language: Language,
}

/// Progress through the fixed 14-day curriculum.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MarathonProgress {
    pub current_topic_index: usize,
    pub completed_topics: Vec<usize>,
    pub topics_today: u32,
    pub last_topic_date: Option<NaiveDate>,
    pub start_date: Option<NaiveDate>,
    pub complexity_level: u8,
    pub topics_at_current_complexity: u32,
}

impl Default for MarathonProgress {
    fn default() -> Self {
        Self {
            current_topic_index: 0,
            completed_topics: Vec::new(),
            topics_today: 0,
            last_topic_date: None,
            start_date: None,
            complexity_level: 1,
            topics_at_current_complexity: 0,
        }
    }
}

impl MarathonProgress {
    /// The 1-based marathon day derived from completed topics.
    pub fn marathon_day(&self) -> usize {
        (self.completed_topics.len() / TOPICS_PER_DAY + 1).min(MARATHON_DAYS)
    }

    pub fn is_complete(&self) -> bool {
        self.completed_topics.len() >= MARATHON_TOPICS
    }

    /// Resets the per-day counter when `today` differs from the last topic date.
    pub fn roll_day(&mut self, today: NaiveDate) {
        if self.last_topic_date != Some(today) {
            self.topics_today = 0;
        }
    }

    pub fn daily_limit_reached(&self) -> bool {
        self.topics_today >= DAILY_TOPICS_LIMIT
    }

    /// Marks the current topic complete and advances to the next one.
    ///
    /// Returns `true` when this completion moved the user up a complexity tier.
    pub fn complete_topic(&mut self, today: NaiveDate) -> bool {
        self.roll_day(today);
        let index = self.current_topic_index;
        if !self.completed_topics.contains(&index) {
            self.completed_topics.push(index);
        }
        self.current_topic_index = index + 1;
        self.topics_today += 1;
        self.last_topic_date = Some(today);
        self.topics_at_current_complexity += 1;

        if self.topics_at_current_complexity >= COMPLEXITY_AUTO_UPGRADE_AFTER
            && self.complexity_level < MAX_COMPLEXITY
        {
            self.complexity_level += 1;
            self.topics_at_current_complexity = 0;
            return true;
        }
        false
    }

    /// Advances past the current topic without counting it as completed.
    pub fn skip_topic(&mut self) {
        self.current_topic_index += 1;
    }
}

/// Progress through the open-ended weekly feed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeedProgress {
    pub depth_level: u32,
    pub suggested_topics: Vec<String>,
    pub accepted_topics: Vec<String>,
    pub last_feed_date: Option<NaiveDate>,
    pub fixations: u32,
}

impl Default for FeedProgress {
    fn default() -> Self {
        Self {
            depth_level: 1,
            suggested_topics: Vec::new(),
            accepted_topics: Vec::new(),
            last_feed_date: None,
            fixations: 0,
        }
    }
}

/// Days on which the user answered, fixed a thought or asked a question.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ActivityProgress {
    pub active_days_total: u32,
    pub active_days_streak: u32,
    pub longest_streak: u32,
    pub last_active_date: Option<NaiveDate>,
}

impl ActivityProgress {
    /// Counts `today` as an active day. The streak continues only when the
    /// previous active day was yesterday. Returns `false` if today was
    /// already counted.
    pub fn record_day(&mut self, today: NaiveDate) -> bool {
        if self.last_active_date == Some(today) {
            return false;
        }
        self.active_days_streak = match self.last_active_date {
            Some(last) if last.succ_opt() == Some(today) => self.active_days_streak + 1,
            _ => 1,
        };
        self.longest_streak = self.longest_streak.max(self.active_days_streak);
        self.active_days_total += 1;
        self.last_active_date = Some(today);
        true
    }
}

/// The persisted conversation record of one user.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UserSession {
    pub user_id: i64,
    pub current_state: Option<StateName>,
    pub previous_state: Option<StateName>,
    pub state_context: StateContext,
    pub mode: Mode,
    pub profile: Profile,
    pub marathon: MarathonProgress,
    pub feed: FeedProgress,
    pub activity: ActivityProgress,
}

impl UserSession {
    /// A fresh session as created on first contact.
    pub fn new(user_id: i64) -> Self {
        Self {
            user_id,
            ..Default::default()
        }
    }

    pub fn language(&self) -> Language {
        self.profile.language
    }

    /// Display name used in greetings and prompts.
    pub fn display_name(&self) -> &str {
        self.profile.name.as_deref().unwrap_or("friend")
    }

    /// Reads a string value from the state context.
    pub fn context_str(&self, key: &str) -> Option<&str> {
        self.state_context.get(key).and_then(Value::as_str)
    }
}

/// A message arriving from the chat transport.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IncomingMessage {
    pub text: String,
}

impl IncomingMessage {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }

    /// The message text without surrounding whitespace.
    pub fn trimmed(&self) -> &str {
        self.text.trim()
    }
}

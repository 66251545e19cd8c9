//! Declarative transition table.

use crate::session::StateName;
use serde::{Deserialize, Serialize};
use std::{
    collections::{BTreeMap, HashMap},
    path::{Path, PathBuf},
};
use thiserror::Error;

/// Stay in the current state without exit or enter.
pub const SAME: &str = "_same";
/// Return to the state recorded in `previous_state`.
pub const PREVIOUS: &str = "_previous";
/// Global triggers starting with this marker are commands.
pub const COMMAND_MARKER: char = '/';

const DEFAULT_PAYLOAD_KEY: &str = "question";

#[derive(Debug, Error)]
pub enum TableError {
    #[error("failed to read transition table {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse transition table: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("no transition table has been loaded from a file")]
    NoSource,
}

/// Where an event leads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    Same,
    Previous,
    State(StateName),
}

impl Target {
    pub fn parse(raw: &str) -> Self {
        match raw {
            SAME => Target::Same,
            PREVIOUS => Target::Previous,
            name => Target::State(StateName::from(name)),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StateEntry {
    pub events: BTreeMap<String, String>,
    /// Global events permitted to interrupt this state. `None` defers to the
    /// state's own declaration.
    pub allow_global: Option<Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GlobalEvent {
    pub trigger: String,
    pub target: StateName,
    #[serde(default = "default_payload_key")]
    pub payload_key: String,
}

fn default_payload_key() -> String {
    DEFAULT_PAYLOAD_KEY.to_string()
}

impl GlobalEvent {
    pub fn is_command(&self) -> bool {
        self.trigger.starts_with(COMMAND_MARKER)
    }

    /// Returns the text after the trigger when `text` starts with it.
    ///
    /// Commands match case-insensitively and must be followed by the end of
    /// the text or whitespace. Any other trigger is a case-sensitive prefix.
    pub fn strip_trigger<'a>(&self, text: &'a str) -> Option<&'a str> {
        if self.trigger.is_empty() {
            return None;
        }
        if !self.is_command() {
            return text.strip_prefix(self.trigger.as_str());
        }
        let head = text.get(..self.trigger.len())?;
        if !head.eq_ignore_ascii_case(&self.trigger) {
            return None;
        }
        let rest = &text[self.trigger.len()..];
        match rest.chars().next() {
            None => Some(rest),
            Some(c) if c.is_whitespace() => Some(rest),
            Some(_) => None,
        }
    }
}

/// A matched global event.
#[derive(Debug, Clone, PartialEq)]
pub struct GlobalMatch {
    pub event: String,
    pub target: StateName,
    pub payload_key: String,
    pub payload: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransitionTable {
    #[serde(default = "default_state")]
    pub default_state: StateName,
    #[serde(default = "fallback_state")]
    pub fallback_state: StateName,
    #[serde(default)]
    pub states: HashMap<StateName, StateEntry>,
    #[serde(default)]
    pub global_events: BTreeMap<String, GlobalEvent>,
}

fn default_state() -> StateName {
    StateName::from("common.start")
}

fn fallback_state() -> StateName {
    StateName::from("common.mode_select")
}

impl Default for TransitionTable {
    fn default() -> Self {
        Self {
            default_state: default_state(),
            fallback_state: fallback_state(),
            states: HashMap::new(),
            global_events: BTreeMap::new(),
        }
    }
}

impl TransitionTable {
    pub fn from_yaml(raw: &str) -> Result<Self, TableError> {
        Ok(serde_yaml::from_str(raw)?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, TableError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| TableError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml(&raw)
    }

    pub fn entry(&self, state: &str) -> Option<&StateEntry> {
        self.states.get(state)
    }

    /// The target of `event` in the state's own event table.
    pub fn state_event(&self, state: &str, event: &str) -> Option<Target> {
        self.entry(state)?
            .events
            .get(event)
            .map(|raw| Target::parse(raw))
    }

    pub fn global_event(&self, event: &str) -> Option<&GlobalEvent> {
        self.global_events.get(event)
    }

    /// Finds the permitted global event whose trigger starts `text`,
    /// trying longer triggers first.
    pub fn match_global<S: AsRef<str>>(&self, allowed: &[S], text: &str) -> Option<GlobalMatch> {
        let mut candidates: Vec<(&String, &GlobalEvent)> = allowed
            .iter()
            .filter_map(|name| self.global_events.get_key_value(name.as_ref()))
            .collect();
        candidates.sort_by(|a, b| b.1.trigger.len().cmp(&a.1.trigger.len()).then(a.0.cmp(b.0)));

        candidates.into_iter().find_map(|(name, event)| {
            event.strip_trigger(text).map(|rest| GlobalMatch {
                event: name.clone(),
                target: event.target.clone(),
                payload_key: event.payload_key.clone(),
                payload: rest.trim().to_string(),
            })
        })
    }

    /// Every `(source, event, target)` whose target is neither a reserved
    /// token nor accepted by `exists`.
    pub fn dangling<F>(&self, exists: F) -> Vec<(String, String, String)>
    where
        F: Fn(&str) -> bool,
    {
        let mut dangling = Vec::new();
        for (state, entry) in &self.states {
            for (event, raw) in &entry.events {
                if let Target::State(target) = Target::parse(raw) {
                    if !exists(target.as_str()) {
                        dangling.push((state.to_string(), event.clone(), raw.clone()));
                    }
                }
            }
        }
        for (event, global) in &self.global_events {
            if !exists(global.target.as_str()) {
                dangling.push(("global".to_string(), event.clone(), global.target.to_string()));
            }
        }
        for special in [&self.default_state, &self.fallback_state] {
            if !exists(special.as_str()) {
                dangling.push(("table".to_string(), "default".to_string(), special.to_string()));
            }
        }
        dangling.sort();
        dangling
    }

    /// Global event names allowed by some state but not defined.
    pub fn undefined_globals(&self) -> Vec<String> {
        let mut missing: Vec<String> = self
            .states
            .values()
            .filter_map(|e| e.allow_global.as_ref())
            .flatten()
            .filter(|name| !self.global_events.contains_key(name.as_str()))
            .cloned()
            .collect();
        missing.sort();
        missing.dedup();
        missing
    }
}

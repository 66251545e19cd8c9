//! State Machine
//!
//! Routes every incoming message of a user through the registry of states
//! according to a declarative transition table. Global events (a leading
//! `?`, a `/command`) interrupt any state that permits them. The machine
//! never fails a conversation: unresolved events and unknown targets are
//! logged and leave the session where it was.

mod table;

pub use table::{
    COMMAND_MARKER, GlobalEvent, GlobalMatch, PREVIOUS, SAME, StateEntry, TableError, Target,
    TransitionTable,
};

use crate::session::{IncomingMessage, StateContext, StateName, UserSession};
use crate::states::{ERROR_EVENT, State};
use crate::storage::StateStorage;
use serde::Serialize;
use serde_json::Value;
use std::{
    collections::HashMap,
    path::{Path, PathBuf},
    sync::Arc,
};
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};

/// Context key naming the disabled state a transition was redirected from.
pub const UNAVAILABLE_STATE_KEY: &str = "unavailable_state";

#[derive(Debug, Error)]
pub enum MachineError {
    #[error("transition table references unregistered states: {0:?}")]
    Dangling(Vec<String>),
}

/// What happened to a session after a message or an event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransitionOutcome {
    Moved { from: StateName, to: StateName },
    /// No event, or an event resolving to `_same`.
    Stayed,
    /// The event has no transition from the current state.
    Unresolved,
    /// The resolved target is not a registered state.
    UnknownTarget(StateName),
}

/// Consistency report of the transition table against the registry.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ValidationReport {
    /// `state.event -> target` references to unregistered states.
    pub dangling: Vec<String>,
    /// Registered states the table does not describe.
    pub undescribed: Vec<String>,
    /// Global event names allowed by a state but never defined.
    pub undefined_globals: Vec<String>,
}

impl ValidationReport {
    pub fn is_clean(&self) -> bool {
        self.dangling.is_empty() && self.undefined_globals.is_empty()
    }
}

pub struct StateMachine {
    states: HashMap<StateName, Arc<dyn State>>,
    table: RwLock<Arc<TransitionTable>>,
    table_path: RwLock<Option<PathBuf>>,
    storage: StateStorage,
}

impl StateMachine {
    /// Creates a machine with an empty table.
    pub fn new(storage: StateStorage) -> Self {
        Self::with_table(storage, TransitionTable::default())
    }

    pub fn with_table(storage: StateStorage, table: TransitionTable) -> Self {
        Self {
            states: HashMap::new(),
            table: RwLock::new(Arc::new(table)),
            table_path: RwLock::new(None),
            storage,
        }
    }

    /// Adds a state. Registering a name twice replaces the earlier state.
    pub fn register(&mut self, state: Arc<dyn State>) {
        let name = StateName::from(state.name());
        if self.states.insert(name.clone(), state).is_some() {
            warn!(state = %name, "State registered twice, replacing");
        } else {
            debug!(state = %name, "State registered");
        }
    }

    pub fn is_registered(&self, name: &str) -> bool {
        self.states.contains_key(name)
    }

    pub fn state_names(&self) -> Vec<StateName> {
        let mut names: Vec<StateName> = self.states.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn storage(&self) -> &StateStorage {
        &self.storage
    }

    /// A snapshot of the active table.
    pub async fn table(&self) -> Arc<TransitionTable> {
        self.table.read().await.clone()
    }

    /// Loads a table from disk and makes it active. On failure the active
    /// table is kept and the error returned for logging.
    pub async fn load_transitions(&self, path: impl AsRef<Path>) -> Result<ValidationReport, TableError> {
        let path = path.as_ref().to_path_buf();
        *self.table_path.write().await = Some(path.clone());
        let table = TransitionTable::load(&path)?;
        info!(
            path = %path.display(),
            states = table.states.len(),
            global_events = table.global_events.len(),
            "Transition table loaded"
        );
        Ok(self.replace_table(table).await)
    }

    /// Re-reads the table from the path of the last `load_transitions`.
    pub async fn reload_transitions(&self) -> Result<ValidationReport, TableError> {
        let path = self.table_path.read().await.clone().ok_or(TableError::NoSource)?;
        match TransitionTable::load(&path) {
            Ok(table) => {
                info!(path = %path.display(), "Transition table reloaded");
                Ok(self.replace_table(table).await)
            }
            Err(e) => {
                error!(path = %path.display(), error = %e, "Reload failed, keeping the previous table");
                Err(e)
            }
        }
    }

    /// Swaps the active table and reports its dangling references.
    pub async fn replace_table(&self, table: TransitionTable) -> ValidationReport {
        let report = self.validate_table(&table);
        for reference in &report.dangling {
            warn!(reference = %reference, "Transition targets an unregistered state");
        }
        for name in &report.undefined_globals {
            warn!(event = %name, "State allows an undefined global event");
        }
        *self.table.write().await = Arc::new(table);
        report
    }

    pub async fn validate(&self) -> ValidationReport {
        let table = self.table().await;
        self.validate_table(&table)
    }

    /// Fails when the active table references unregistered states.
    pub async fn validate_strict(&self) -> Result<ValidationReport, MachineError> {
        let report = self.validate().await;
        if report.dangling.is_empty() {
            Ok(report)
        } else {
            Err(MachineError::Dangling(report.dangling))
        }
    }

    fn validate_table(&self, table: &TransitionTable) -> ValidationReport {
        let dangling = table
            .dangling(|name| self.is_registered(name))
            .into_iter()
            .map(|(state, event, target)| format!("{state}.{event} -> {target}"))
            .collect();
        let mut undescribed: Vec<String> = self
            .states
            .keys()
            .filter(|name| !table.states.contains_key(name.as_str()))
            .map(ToString::to_string)
            .collect();
        undescribed.sort();
        ValidationReport {
            dangling,
            undescribed,
            undefined_globals: table.undefined_globals(),
        }
    }

    /// The user's current state, or the default state when it is unset or
    /// no longer registered.
    fn current_state(&self, user: &UserSession, table: &TransitionTable) -> (StateName, Option<Arc<dyn State>>) {
        if let Some(name) = &user.current_state {
            if let Some(state) = self.states.get(name) {
                return (name.clone(), Some(state.clone()));
            }
            warn!(user_id = user.user_id, state = %name, "Unknown current state, using the default");
        }
        let name = table.default_state.clone();
        let state = self.states.get(&name).cloned();
        (name, state)
    }

    fn permitted_globals(table: &TransitionTable, name: &StateName, state: &dyn State) -> Vec<String> {
        match table.entry(name.as_str()).and_then(|e| e.allow_global.clone()) {
            Some(allowed) => allowed,
            None => state.allow_global().iter().map(|s| s.to_string()).collect(),
        }
    }

    /// The single entry point for user input.
    pub async fn handle_message(&self, user: &mut UserSession, message: &IncomingMessage) -> TransitionOutcome {
        let table = self.table().await;
        let (current, state) = self.current_state(user, &table);
        let Some(state) = state else {
            error!(user_id = user.user_id, state = %current, "Default state is not registered");
            return TransitionOutcome::Unresolved;
        };
        if user.current_state.as_ref() != Some(&current) {
            user.current_state = Some(current.clone());
        }

        let allowed = Self::permitted_globals(&table, &current, state.as_ref());
        if let Some(global) = table.match_global(&allowed, &message.text) {
            info!(user_id = user.user_id, event = %global.event, from = %current, "Global event");
            let mut context = StateContext::new();
            context.insert(global.payload_key, Value::String(global.payload));
            return self
                .transition(user, &global.event, Some(&global.target), Some(context))
                .await;
        }

        match state.handle(user, message).await {
            Ok(Some(event)) => self.transition(user, &event, None, None).await,
            Ok(None) => TransitionOutcome::Stayed,
            Err(e) => {
                error!(user_id = user.user_id, state = %current, error = ?e, "State failed to handle message");
                self.transition(user, ERROR_EVENT, None, None).await
            }
        }
    }

    /// Resolves `event` from the current state and moves the session.
    ///
    /// `forced_target` skips resolution. Caller context wins over the exiting
    /// state's context on key conflicts.
    pub async fn transition(
        &self,
        user: &mut UserSession,
        event: &str,
        forced_target: Option<&StateName>,
        extra_context: Option<StateContext>,
    ) -> TransitionOutcome {
        let table = self.table().await;
        let (current, from_state) = self.current_state(user, &table);

        let target = match forced_target {
            Some(name) => Target::State(name.clone()),
            None => match table
                .global_event(event)
                .map(|g| Target::State(g.target.clone()))
                .or_else(|| table.state_event(current.as_str(), event))
            {
                Some(target) => target,
                None => {
                    warn!(user_id = user.user_id, state = %current, event, "No transition for event");
                    return TransitionOutcome::Unresolved;
                }
            },
        };

        let mut target = match target {
            Target::Same => {
                debug!(user_id = user.user_id, state = %current, event, "Staying in state");
                return TransitionOutcome::Stayed;
            }
            Target::Previous => user
                .previous_state
                .clone()
                .unwrap_or_else(|| table.fallback_state.clone()),
            Target::State(name) => name,
        };

        let Some(mut to_state) = self.states.get(&target).cloned() else {
            error!(user_id = user.user_id, from = %current, to = %target, event, "Target state is not registered");
            return TransitionOutcome::UnknownTarget(target);
        };

        let mut unavailable = None;
        if !to_state.is_available() {
            warn!(user_id = user.user_id, to = %target, fallback = %table.fallback_state, "Target state is disabled");
            let fallback = table.fallback_state.clone();
            let Some(state) = self.states.get(&fallback).cloned() else {
                error!(user_id = user.user_id, to = %fallback, "Fallback state is not registered");
                return TransitionOutcome::UnknownTarget(fallback);
            };
            unavailable = Some(std::mem::replace(&mut target, fallback));
            to_state = state;
        }

        let mut context = match &from_state {
            Some(state) => state.exit(user).await,
            None => StateContext::new(),
        };
        if let Some(extra) = extra_context {
            context.extend(extra);
        }
        if let Some(name) = unavailable {
            context.insert(UNAVAILABLE_STATE_KEY.to_string(), Value::String(name.to_string()));
        }

        user.previous_state = Some(current.clone());
        user.current_state = Some(target.clone());
        user.state_context = context.clone();
        if !self.storage.save_state(user).await {
            warn!(user_id = user.user_id, to = %target, "State change was not persisted");
        }

        info!(user_id = user.user_id, from = %current, to = %target, event, "Transition");
        if let Err(e) = to_state.enter(user, &context).await {
            error!(user_id = user.user_id, state = %target, error = ?e, "State failed to enter");
        }
        TransitionOutcome::Moved {
            from: current,
            to: target,
        }
    }

    /// Puts the user into `name` without running the current state's exit.
    pub async fn force_state(&self, user: &mut UserSession, name: &StateName, context: StateContext) -> bool {
        let Some(state) = self.states.get(name).cloned() else {
            error!(user_id = user.user_id, state = %name, "Cannot force an unregistered state");
            return false;
        };
        user.previous_state = user.current_state.take();
        user.current_state = Some(name.clone());
        user.state_context = context.clone();
        if !self.storage.save_state(user).await {
            warn!(user_id = user.user_id, state = %name, "Forced state was not persisted");
        }
        info!(user_id = user.user_id, state = %name, "State forced");
        if let Err(e) = state.enter(user, &context).await {
            error!(user_id = user.user_id, state = %name, error = ?e, "State failed to enter");
        }
        true
    }

    /// Enters the default state, as on a first contact or a `/start`.
    pub async fn start(&self, user: &mut UserSession, context: StateContext) -> bool {
        let name = self.table().await.default_state.clone();
        self.force_state(user, &name, context).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{InMemoryRepository, UserRepository};
    use anyhow::{Result, anyhow};
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::Mutex;

    type Log = Arc<Mutex<Vec<String>>>;

    /// Returns a fixed event from `handle` and records every hook call.
    struct ScriptedState {
        name: &'static str,
        event: Option<&'static str>,
        fail: bool,
        available: bool,
        exit_context: StateContext,
        log: Log,
    }

    impl ScriptedState {
        fn new(name: &'static str, event: Option<&'static str>, log: &Log) -> Self {
            Self {
                name,
                event,
                fail: false,
                available: true,
                exit_context: StateContext::new(),
                log: log.clone(),
            }
        }

        fn record(&self, hook: &str) {
            self.log.lock().unwrap().push(format!("{}:{hook}", self.name));
        }
    }

    #[async_trait]
    impl State for ScriptedState {
        fn name(&self) -> &'static str {
            self.name
        }

        fn is_available(&self) -> bool {
            self.available
        }

        async fn enter(&self, user: &mut UserSession, context: &StateContext) -> Result<()> {
            self.record("enter");
            user.state_context.insert("entered_with".into(), json!(context.len()));
            Ok(())
        }

        async fn handle(&self, _user: &mut UserSession, _message: &IncomingMessage) -> Result<Option<String>> {
            self.record("handle");
            if self.fail {
                return Err(anyhow!("boom"));
            }
            Ok(self.event.map(str::to_string))
        }

        async fn exit(&self, _user: &UserSession) -> StateContext {
            self.record("exit");
            self.exit_context.clone()
        }
    }

    const TABLE: &str = r#"
default_state: common.start
fallback_state: common.mode_select
states:
  common.start:
    events:
      onboarding_complete: common.mode_select
      broken: missing.state
    allow_global: [mode]
  common.mode_select:
    events:
      marathon: workshop.marathon.question
      stay: _same
    allow_global: [consultation]
  workshop.marathon.question:
    events:
      correct: workshop.marathon.bonus
      error: common.error
    allow_global: [consultation, mode]
  common.consultation:
    events:
      done: _previous
      followup: _same
  common.error:
    events:
      continue: _previous
global_events:
  consultation:
    trigger: "?"
    target: common.consultation
  mode:
    trigger: /mode
    target: common.mode_select
"#;

    struct Fixture {
        machine: StateMachine,
        repo: Arc<InMemoryRepository>,
        log: Log,
    }

    fn fixture(customize: impl FnOnce(&mut Vec<ScriptedState>)) -> Fixture {
        let log: Log = Arc::new(Mutex::new(Vec::new()));
        let mut states = vec![
            ScriptedState::new("common.start", Some("onboarding_complete"), &log),
            ScriptedState::new("common.mode_select", Some("marathon"), &log),
            ScriptedState::new("workshop.marathon.question", Some("correct"), &log),
            ScriptedState::new("common.consultation", Some("done"), &log),
            ScriptedState::new("common.error", Some("continue"), &log),
        ];
        customize(&mut states);

        let repo = Arc::new(InMemoryRepository::new());
        let table = TransitionTable::from_yaml(TABLE).unwrap();
        let mut machine = StateMachine::with_table(StateStorage::new(repo.clone()), table);
        for state in states {
            machine.register(Arc::new(state));
        }
        Fixture { machine, repo, log }
    }

    fn calls(log: &Log) -> Vec<String> {
        std::mem::take(&mut *log.lock().unwrap())
    }

    fn user_in(state: &str) -> UserSession {
        let mut user = UserSession::new(1);
        user.current_state = Some(state.into());
        user
    }

    #[tokio::test]
    async fn test_unset_state_uses_default() {
        let f = fixture(|_| {});
        let mut user = UserSession::new(1);

        let outcome = f.machine.handle_message(&mut user, &IncomingMessage::new("hi")).await;
        assert_eq!(
            outcome,
            TransitionOutcome::Moved {
                from: "common.start".into(),
                to: "common.mode_select".into()
            }
        );
        assert_eq!(
            calls(&f.log),
            vec!["common.start:handle", "common.start:exit", "common.mode_select:enter"]
        );
        assert_eq!(user.previous_state, Some("common.start".into()));
    }

    #[tokio::test]
    async fn test_corrupt_state_falls_back_to_default() {
        let f = fixture(|_| {});
        let mut user = user_in("removed.state");

        f.machine.handle_message(&mut user, &IncomingMessage::new("hi")).await;
        assert_eq!(calls(&f.log)[0], "common.start:handle");
        assert_eq!(user.current_state, Some("common.mode_select".into()));
    }

    #[tokio::test]
    async fn test_transition_persists_and_merges_context() {
        let f = fixture(|states| {
            states[2].exit_context = StateContext::from([
                ("topic_index".to_string(), json!(3)),
                ("complexity_level".to_string(), json!(1)),
            ]);
        });
        let mut user = user_in("workshop.marathon.question");
        f.repo.save_user(&user).await.unwrap();

        let extra = StateContext::from([("complexity_level".to_string(), json!(2))]);
        let outcome = f
            .machine
            .transition(&mut user, "anything", Some(&"common.mode_select".into()), Some(extra))
            .await;
        assert!(matches!(outcome, TransitionOutcome::Moved { .. }));
        assert_eq!(user.state_context.get("topic_index"), Some(&json!(3)));
        assert_eq!(user.state_context.get("complexity_level"), Some(&json!(2)));

        let stored = f.repo.get_user(1).await.unwrap().unwrap();
        assert_eq!(stored.current_state, Some("common.mode_select".into()));
        assert_eq!(stored.previous_state, Some("workshop.marathon.question".into()));
    }

    #[tokio::test]
    async fn test_unknown_event_is_a_noop() {
        let f = fixture(|_| {});
        let mut user = user_in("common.mode_select");

        let outcome = f.machine.transition(&mut user, "nonexistent", None, None).await;
        assert_eq!(outcome, TransitionOutcome::Unresolved);
        assert_eq!(user.current_state, Some("common.mode_select".into()));
        assert!(calls(&f.log).is_empty());
    }

    #[tokio::test]
    async fn test_same_does_not_exit_or_enter() {
        let f = fixture(|_| {});
        let mut user = user_in("common.mode_select");
        user.previous_state = Some("common.start".into());

        let outcome = f.machine.transition(&mut user, "stay", None, None).await;
        assert_eq!(outcome, TransitionOutcome::Stayed);
        assert_eq!(user.previous_state, Some("common.start".into()));
        assert!(calls(&f.log).is_empty());
    }

    #[tokio::test]
    async fn test_previous_and_fallback() {
        let f = fixture(|_| {});
        let mut user = user_in("common.consultation");
        user.previous_state = Some("workshop.marathon.question".into());
        f.machine.transition(&mut user, "done", None, None).await;
        assert_eq!(user.current_state, Some("workshop.marathon.question".into()));
        assert_eq!(user.previous_state, Some("common.consultation".into()));

        let mut orphan = user_in("common.consultation");
        f.machine.transition(&mut orphan, "done", None, None).await;
        assert_eq!(orphan.current_state, Some("common.mode_select".into()));
    }

    #[tokio::test]
    async fn test_unregistered_target_leaves_session_untouched() {
        let f = fixture(|_| {});
        let mut user = user_in("common.start");

        let outcome = f.machine.transition(&mut user, "broken", None, None).await;
        assert_eq!(outcome, TransitionOutcome::UnknownTarget("missing.state".into()));
        assert_eq!(user.current_state, Some("common.start".into()));
        assert!(calls(&f.log).is_empty());
        assert!(f.repo.get_user(1).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_disabled_target_redirects_to_fallback() {
        let f = fixture(|states| states[2].available = false);
        let mut user = user_in("common.start");
        user.previous_state = Some("common.consultation".into());

        let outcome = f
            .machine
            .transition(&mut user, "x", Some(&"workshop.marathon.question".into()), None)
            .await;
        assert_eq!(
            outcome,
            TransitionOutcome::Moved {
                from: "common.start".into(),
                to: "common.mode_select".into()
            }
        );
        assert_eq!(calls(&f.log), vec!["common.start:exit", "common.mode_select:enter"]);
        assert_eq!(
            user.state_context.get(UNAVAILABLE_STATE_KEY),
            Some(&json!("workshop.marathon.question"))
        );
        assert_eq!(user.previous_state, Some("common.start".into()));
    }

    #[tokio::test]
    async fn test_global_event_bypasses_handle() {
        let f = fixture(|_| {});
        let mut user = user_in("workshop.marathon.question");

        let outcome = f
            .machine
            .handle_message(&mut user, &IncomingMessage::new("?what is systematic thinking"))
            .await;
        assert_eq!(
            outcome,
            TransitionOutcome::Moved {
                from: "workshop.marathon.question".into(),
                to: "common.consultation".into()
            }
        );
        assert_eq!(
            calls(&f.log),
            vec!["workshop.marathon.question:exit", "common.consultation:enter"]
        );
        assert_eq!(user.context_str("question"), Some("what is systematic thinking"));
        assert_eq!(user.previous_state, Some("workshop.marathon.question".into()));
    }

    #[tokio::test]
    async fn test_global_event_not_permitted_falls_through() {
        let f = fixture(|_| {});
        let mut user = user_in("common.start");

        f.machine.handle_message(&mut user, &IncomingMessage::new("?what")).await;
        assert_eq!(calls(&f.log)[0], "common.start:handle");
        assert_eq!(user.current_state, Some("common.mode_select".into()));
    }

    #[tokio::test]
    async fn test_command_global_is_case_insensitive() {
        let f = fixture(|_| {});
        let mut user = user_in("workshop.marathon.question");

        f.machine.handle_message(&mut user, &IncomingMessage::new("/MODE")).await;
        assert_eq!(user.current_state, Some("common.mode_select".into()));
    }

    #[tokio::test]
    async fn test_failing_handle_emits_error_event() {
        let f = fixture(|states| states[2].fail = true);
        let mut user = user_in("workshop.marathon.question");

        f.machine.handle_message(&mut user, &IncomingMessage::new("answer")).await;
        assert_eq!(user.current_state, Some("common.error".into()));
    }

    #[tokio::test]
    async fn test_handle_without_event_stays() {
        let f = fixture(|states| states[1].event = None);
        let mut user = user_in("common.mode_select");

        let outcome = f.machine.handle_message(&mut user, &IncomingMessage::new("hm")).await;
        assert_eq!(outcome, TransitionOutcome::Stayed);
        assert_eq!(calls(&f.log), vec!["common.mode_select:handle"]);
    }

    #[tokio::test]
    async fn test_force_state_skips_exit() {
        let f = fixture(|_| {});
        let mut user = user_in("workshop.marathon.question");

        let forced = f
            .machine
            .force_state(&mut user, &"common.start".into(), StateContext::new())
            .await;
        assert!(forced);
        assert_eq!(calls(&f.log), vec!["common.start:enter"]);
        assert!(!f.machine.force_state(&mut user, &"nope".into(), StateContext::new()).await);
    }

    #[tokio::test]
    async fn test_start_enters_default_state() {
        let f = fixture(|_| {});
        let mut user = UserSession::new(9);
        assert!(f.machine.start(&mut user, StateContext::new()).await);
        assert_eq!(user.current_state, Some("common.start".into()));
        assert_eq!(calls(&f.log), vec!["common.start:enter"]);
    }

    #[tokio::test]
    async fn test_reregistration_replaces() {
        let mut f = fixture(|_| {});
        let before = f.machine.state_names().len();
        f.machine
            .register(Arc::new(ScriptedState::new("common.start", None, &f.log)));
        assert_eq!(f.machine.state_names().len(), before);

        let mut user = UserSession::new(1);
        let outcome = f.machine.handle_message(&mut user, &IncomingMessage::new("hi")).await;
        assert_eq!(outcome, TransitionOutcome::Stayed);
    }

    #[tokio::test]
    async fn test_validation_reports_dangling_targets() {
        let f = fixture(|_| {});
        let report = f.machine.validate().await;
        assert!(report.dangling.contains(&"common.start.broken -> missing.state".to_string()));
        assert!(
            report
                .dangling
                .contains(&"workshop.marathon.question.correct -> workshop.marathon.bonus".to_string())
        );
        assert!(matches!(f.machine.validate_strict().await, Err(MachineError::Dangling(_))));
    }

    #[tokio::test]
    async fn test_failed_reload_keeps_table() {
        let f = fixture(|_| {});
        assert!(matches!(f.machine.reload_transitions().await, Err(TableError::NoSource)));

        let dir = std::env::temp_dir().join(format!("systrack-machine-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("transitions.yaml");
        std::fs::write(&path, TABLE).unwrap();
        f.machine.load_transitions(&path).await.unwrap();

        std::fs::write(&path, "states: [").unwrap();
        assert!(f.machine.reload_transitions().await.is_err());
        assert_eq!(f.machine.table().await.states.len(), 5);

        let mut missing = StateMachine::new(StateStorage::new(f.repo.clone()));
        missing.register(Arc::new(ScriptedState::new("common.start", None, &f.log)));
        assert!(missing.load_transitions(dir.join("absent.yaml")).await.is_err());
        assert!(missing.table().await.states.is_empty());
        std::fs::remove_dir_all(&dir).ok();
    }
}

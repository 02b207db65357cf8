//! Canonical room state as observed by this participant.
//!
//! [`RoomState`] is the aggregate; [`RoomState::reduce`] is the pure reducer that
//! every inbound [`ServerCommand`] goes through. [`RoomStateStore`] owns the
//! current state and publishes immutable `Arc<RoomState>` snapshots over a
//! `tokio::sync::watch` channel. Every mutation is copy-on-write, so a snapshot
//! a consumer holds never changes underneath it.

use std::collections::BTreeMap;
use std::sync::Arc;

use tokio::sync::watch;
use tracing::{debug, warn};

use crate::error::{Result, RoomError};
use crate::protocol::{
    ChatEntry, Language, Problem, RoomConfig, RoomUser, ServerCommand, TestResult,
};
use crate::test_status::TestStatus;

// ── Code buffers ────────────────────────────────────────────────────

/// Key of one code buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CodeKey {
    pub problem_index: usize,
    pub language: Language,
}

impl CodeKey {
    pub fn new(problem_index: usize, language: Language) -> Self {
        Self {
            problem_index,
            language,
        }
    }
}

/// Source text per `(problem index, language)`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CodeBuffers {
    buffers: BTreeMap<CodeKey, String>,
}

impl CodeBuffers {
    /// Buffers seeded from each problem's boilerplate, for every language.
    pub fn seeded(problems: &[Problem]) -> Self {
        let buffers = problems
            .iter()
            .enumerate()
            .flat_map(|(index, problem)| {
                Language::ALL.into_iter().map(move |language| {
                    (
                        CodeKey::new(index, language),
                        problem.boilerplate_code.for_language(language).to_string(),
                    )
                })
            })
            .collect();
        Self { buffers }
    }

    pub fn get(&self, problem_index: usize, language: Language) -> Option<&str> {
        self.buffers
            .get(&CodeKey::new(problem_index, language))
            .map(String::as_str)
    }

    /// Returns `true` if any language has a buffer for `problem_index`.
    pub fn has_problem(&self, problem_index: usize) -> bool {
        Language::ALL
            .iter()
            .any(|&language| self.buffers.contains_key(&CodeKey::new(problem_index, language)))
    }

    pub fn len(&self) -> usize {
        self.buffers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffers.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&CodeKey, &str)> {
        self.buffers.iter().map(|(key, code)| (key, code.as_str()))
    }

    fn replace(&mut self, key: CodeKey, code: String) {
        self.buffers.insert(key, code);
    }
}

// ── Room state ──────────────────────────────────────────────────────

/// Everything this participant knows about the room.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RoomState {
    chat_history: Vec<ChatEntry>,
    roster: Vec<RoomUser>,
    config: Option<RoomConfig>,
    problems: Option<Vec<Problem>>,
    code: CodeBuffers,
    current_problem_index: usize,
    test_status: TestStatus,
}

impl RoomState {
    /// The empty state a room view starts from.
    pub fn new() -> Self {
        Self::default()
    }

    /// Chat log in arrival order.
    pub fn chat_history(&self) -> &[ChatEntry] {
        &self.chat_history
    }

    pub fn roster(&self) -> &[RoomUser] {
        &self.roster
    }

    pub fn config(&self) -> Option<&RoomConfig> {
        self.config.as_ref()
    }

    /// The active problem set; `None` between rounds.
    pub fn problems(&self) -> Option<&[Problem]> {
        self.problems.as_deref()
    }

    pub fn code(&self) -> &CodeBuffers {
        &self.code
    }

    pub fn current_problem_index(&self) -> usize {
        self.current_problem_index
    }

    pub fn current_problem(&self) -> Option<&Problem> {
        self.problems()
            .and_then(|problems| problems.get(self.current_problem_index))
    }

    pub fn test_status(&self) -> &TestStatus {
        &self.test_status
    }

    fn problem_count(&self) -> usize {
        self.problems.as_ref().map_or(0, Vec::len)
    }

    /// Apply one inbound command.
    #[must_use]
    pub fn reduce(mut self, command: ServerCommand) -> Self {
        match command {
            ServerCommand::ChatMessage(entry) => {
                self.chat_history.push(entry);
            }
            ServerCommand::ChatHistory(entries) => {
                self.chat_history = entries;
            }
            ServerCommand::SetUsers(users) => {
                self.roster = users;
            }
            ServerCommand::SetRoomConfig(config) => {
                if self.config.is_some() {
                    debug!(room = %config.name, "room config replaced");
                }
                self.config = Some(config);
            }
            ServerCommand::SetProblems(Some(problems)) => {
                self.code = CodeBuffers::seeded(&problems);
                if self.current_problem_index >= problems.len() {
                    self.current_problem_index = 0;
                }
                self.problems = Some(problems);
            }
            ServerCommand::SetProblems(None) => {
                // Buffers stay: participants may still be mid-edit.
                self.problems = None;
            }
            ServerCommand::SetTestResponse(result) => {
                self.test_status = std::mem::take(&mut self.test_status).respond(result);
            }
        }
        self
    }

    /// Select the problem shown to the participant.
    ///
    /// The test status is reset first, even when `index` is rejected.
    ///
    /// # Errors
    ///
    /// Returns [`RoomError::ProblemIndexOutOfRange`] if `index` is not within
    /// the current problem set (or there is none).
    pub fn select_problem(&mut self, index: usize) -> Result<()> {
        self.test_status = std::mem::take(&mut self.test_status).reset();

        let len = self.problem_count();
        if index >= len {
            return Err(RoomError::ProblemIndexOutOfRange { index, len });
        }
        self.current_problem_index = index;
        Ok(())
    }

    /// Overwrite one code buffer. Returns `false` if the key is not writable.
    ///
    /// A key is writable when its problem index is inside the current problem
    /// set, or when a buffer for it was kept after the set was withdrawn.
    pub fn write_code(&mut self, problem_index: usize, language: Language, code: String) -> bool {
        let writable = self.is_code_writable(problem_index);
        if writable {
            self.code.replace(CodeKey::new(problem_index, language), code);
        }
        writable
    }

    fn is_code_writable(&self, problem_index: usize) -> bool {
        match &self.problems {
            Some(problems) => problem_index < problems.len(),
            None => self.code.has_problem(problem_index),
        }
    }

    pub fn set_test_status(&mut self, status: TestStatus) {
        self.test_status = status;
    }
}

// ── Store ───────────────────────────────────────────────────────────

/// Sole owner of a room view's [`RoomState`].
///
/// Reads go through [`snapshot`](Self::snapshot) or [`subscribe`](Self::subscribe);
/// writes go through the reducer or the local-only operations below. All of them
/// are synchronous and never block on I/O.
#[derive(Debug)]
pub struct RoomStateStore {
    state: watch::Sender<Arc<RoomState>>,
}

impl Default for RoomStateStore {
    fn default() -> Self {
        Self::new()
    }
}

impl RoomStateStore {
    pub fn new() -> Self {
        let (state, _) = watch::channel(Arc::new(RoomState::new()));
        Self { state }
    }

    /// The current state. Never changes after it is returned.
    pub fn snapshot(&self) -> Arc<RoomState> {
        Arc::clone(&*self.state.borrow())
    }

    /// Receive a notification after every mutation.
    pub fn subscribe(&self) -> watch::Receiver<Arc<RoomState>> {
        self.state.subscribe()
    }

    /// Apply one inbound command.
    pub fn apply(&self, command: ServerCommand) {
        debug!(tag = command.tag(), "applying server command");
        self.state.send_modify(|state| {
            let current = Arc::make_mut(state);
            *current = std::mem::take(current).reduce(command);
        });
    }

    /// See [`RoomState::select_problem`].
    ///
    /// # Errors
    ///
    /// Returns [`RoomError::ProblemIndexOutOfRange`] for an index outside the
    /// current problem set.
    pub fn set_current_problem_index(&self, index: usize) -> Result<()> {
        let mut outcome = Ok(());
        self.state.send_modify(|state| {
            outcome = Arc::make_mut(state).select_problem(index);
        });
        if let Err(e) = &outcome {
            warn!("problem selection rejected: {e}");
        }
        outcome
    }

    /// Overwrite the buffer at `(problem_index, language)`.
    ///
    /// Returns `false`, leaving the state untouched, if the key is not writable.
    pub fn set_problem_code(&self, problem_index: usize, language: Language, code: String) -> bool {
        // Checked on the shared value first so a rejected write never clones.
        self.state.send_if_modified(|state| {
            state.is_code_writable(problem_index)
                && Arc::make_mut(state).write_code(problem_index, language, code)
        })
    }

    /// Set the test status locally, e.g. to `Awaiting` right before a run is sent.
    pub fn set_test_status(&self, status: TestStatus) {
        self.state.send_modify(|state| Arc::make_mut(state).set_test_status(status));
    }

    /// Apply a judge result as if it had arrived from the server.
    pub fn apply_test_result(&self, result: TestResult) {
        self.apply(ServerCommand::SetTestResponse(result));
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::indexing_slicing
)]
mod tests {
    use super::*;
    use crate::protocol::{BoilerplateCode, TestCase};

    fn problem(id: &str, python: &str, javascript: &str) -> Problem {
        Problem {
            id: id.into(),
            title: format!("Problem {id}"),
            description: String::new(),
            boilerplate_code: BoilerplateCode {
                python: python.into(),
                javascript: javascript.into(),
            },
            default_test_cases: vec![TestCase {
                input: "1".into(),
                output: "2".into(),
            }],
            difficulty: None,
        }
    }

    #[test]
    fn seeding_covers_every_language() {
        let buffers = CodeBuffers::seeded(&[problem("a", "x", "y"), problem("b", "p", "q")]);
        assert_eq!(buffers.len(), 4);
        assert_eq!(buffers.get(1, Language::Javascript), Some("q"));
        assert!(buffers.has_problem(0));
        assert!(!buffers.has_problem(2));
    }

    #[test]
    fn new_problem_set_clamps_current_index() {
        let mut state = RoomState::new().reduce(ServerCommand::SetProblems(Some(vec![
            problem("a", "", ""),
            problem("b", "", ""),
        ])));
        state.select_problem(1).unwrap();

        let state = state.reduce(ServerCommand::SetProblems(Some(vec![problem("c", "", "")])));
        assert_eq!(state.current_problem_index(), 0);
        assert_eq!(state.current_problem().unwrap().id, "c");
    }

    #[test]
    fn write_code_rejects_out_of_range_problem() {
        let mut state =
            RoomState::new().reduce(ServerCommand::SetProblems(Some(vec![problem("a", "", "")])));
        assert!(!state.write_code(1, Language::Python, "nope".into()));
        assert!(state.code().get(1, Language::Python).is_none());
    }

    #[test]
    fn write_code_without_any_buffers_is_ignored() {
        let mut state = RoomState::new();
        assert!(!state.write_code(0, Language::Python, "early".into()));
        assert!(state.code().is_empty());
    }

    #[test]
    fn held_snapshot_does_not_observe_later_writes() {
        let store = RoomStateStore::new();
        store.apply(ServerCommand::SetProblems(Some(vec![problem("a", "x", "y")])));

        let before = store.snapshot();
        assert!(store.set_problem_code(0, Language::Python, "edited".into()));

        assert_eq!(before.code().get(0, Language::Python), Some("x"));
        assert_eq!(
            store.snapshot().code().get(0, Language::Python),
            Some("edited")
        );
    }

    #[tokio::test]
    async fn subscribers_are_notified_of_mutations() {
        let store = RoomStateStore::new();
        let mut rx = store.subscribe();

        store.apply(ServerCommand::SetUsers(vec![]));
        rx.changed().await.unwrap();
        assert!(rx.borrow_and_update().roster().is_empty());
    }

    #[tokio::test]
    async fn rejected_code_write_does_not_notify() {
        let store = RoomStateStore::new();
        let mut rx = store.subscribe();

        assert!(!store.set_problem_code(3, Language::Python, "x".into()));
        assert!(!rx.has_changed().unwrap());
    }
}

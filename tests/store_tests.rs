#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::indexing_slicing
)]
//! Reducer and local-mutation tests for the room state store.

mod common;

use radix_room_client::protocol::{ChatEntry, Language, RoomConfig, ServerCommand, TestResult};
use radix_room_client::{RoomError, RoomState, RoomStateStore, TestStatus};

use common::{connection_entry, problem, user};
use tokio_test::{assert_err, assert_ok};

fn reduce_all(commands: impl IntoIterator<Item = ServerCommand>) -> RoomState {
    commands
        .into_iter()
        .fold(RoomState::new(), |state, command| state.reduce(command))
}

// ── Chat ────────────────────────────────────────────────────────────

#[test]
fn chat_messages_keep_arrival_order() {
    let entries: Vec<ChatEntry> = (0..50)
        .map(|i| ChatEntry::UserChat {
            author: user("u1", "alice"),
            content: format!("message {i}"),
        })
        .collect();

    let state = reduce_all(entries.iter().cloned().map(ServerCommand::ChatMessage));
    assert_eq!(state.chat_history(), entries.as_slice());
}

#[test]
fn duplicate_chat_messages_are_kept() {
    let entry = connection_entry("alice");
    let state = reduce_all([
        ServerCommand::ChatMessage(entry.clone()),
        ServerCommand::ChatMessage(entry.clone()),
    ]);
    assert_eq!(state.chat_history(), [entry.clone(), entry].as_slice());
}

#[test]
fn chat_history_replaces_then_messages_append() {
    let state = reduce_all([
        ServerCommand::ChatMessage(ChatEntry::RoundEnd),
        ServerCommand::ChatHistory(vec![connection_entry("alice")]),
        ServerCommand::ChatMessage(ChatEntry::UserChat {
            author: user("u2", "bob"),
            content: "hi".into(),
        }),
    ]);
    assert_eq!(
        state.chat_history(),
        [
            connection_entry("alice"),
            ChatEntry::UserChat {
                author: user("u2", "bob"),
                content: "hi".into(),
            },
        ]
        .as_slice()
    );
}

// ── Roster and config ───────────────────────────────────────────────

#[test]
fn roster_is_replaced_not_merged() {
    let (a, b, c) = (user("a", "ann"), user("b", "ben"), user("c", "cat"));
    let state = reduce_all([
        ServerCommand::SetUsers(vec![a.clone(), b.clone()]),
        ServerCommand::SetUsers(vec![b.clone(), c.clone()]),
    ]);
    assert_eq!(state.roster(), [b, c].as_slice());
}

#[test]
fn later_room_config_overwrites() {
    let first = RoomConfig {
        name: "weekly".into(),
        is_public: false,
        owner: user("u1", "alice"),
    };
    let second = RoomConfig {
        is_public: true,
        ..first.clone()
    };
    let state = reduce_all([
        ServerCommand::SetRoomConfig(first),
        ServerCommand::SetRoomConfig(second.clone()),
    ]);
    assert_eq!(state.config(), Some(&second));
}

// ── Problems and code buffers ───────────────────────────────────────

#[test]
fn problem_set_seeds_every_language() {
    let state = reduce_all([ServerCommand::SetProblems(Some(vec![problem("P", "x", "y")]))]);
    assert_eq!(state.code().get(0, Language::Python), Some("x"));
    assert_eq!(state.code().get(0, Language::Javascript), Some("y"));
    assert_eq!(state.code().len(), 2);
}

#[test]
fn reapplying_problem_set_reseeds_edited_buffers() {
    let problems = vec![problem("P", "x", "y")];
    let mut state = reduce_all([ServerCommand::SetProblems(Some(problems.clone()))]);
    assert!(state.write_code(0, Language::Python, "edited".into()));
    assert_eq!(state.code().get(0, Language::Python), Some("edited"));

    let state = state.reduce(ServerCommand::SetProblems(Some(problems)));
    assert_eq!(state.code().get(0, Language::Python), Some("x"));
    assert_eq!(state.code().get(0, Language::Javascript), Some("y"));
}

#[test]
fn withdrawing_problems_keeps_buffers_writable() {
    let mut state = reduce_all([
        ServerCommand::SetProblems(Some(vec![problem("A", "a", "a"), problem("B", "b", "b")])),
        ServerCommand::SetProblems(None),
    ]);
    assert!(state.problems().is_none());
    assert_eq!(state.code().get(1, Language::Python), Some("b"));

    assert!(state.write_code(1, Language::Python, "still typing".into()));
    assert!(!state.write_code(2, Language::Python, "nope".into()));
}

#[test]
fn buffers_never_exceed_problem_bounds() {
    let state = reduce_all([
        ServerCommand::SetProblems(Some(vec![
            problem("A", "a", "a"),
            problem("B", "b", "b"),
            problem("C", "c", "c"),
        ])),
        ServerCommand::SetProblems(Some(vec![problem("D", "d", "d")])),
    ]);
    let len = state.problems().unwrap().len();
    assert!(state.code().iter().all(|(key, _)| key.problem_index < len));
}

#[test]
fn smaller_problem_set_resets_current_index() {
    let store = RoomStateStore::new();
    store.apply(ServerCommand::SetProblems(Some(vec![
        problem("A", "a", "a"),
        problem("B", "b", "b"),
    ])));
    assert_ok!(store.set_current_problem_index(1));

    store.apply(ServerCommand::SetProblems(Some(vec![problem("C", "c", "c")])));
    assert_eq!(store.snapshot().current_problem_index(), 0);
    assert_eq!(store.snapshot().current_problem().unwrap().title, "C");
}

// ── Test status ─────────────────────────────────────────────────────

#[test]
fn awaiting_then_response_then_reset_on_problem_switch() {
    let store = RoomStateStore::new();
    store.apply(ServerCommand::SetProblems(Some(vec![
        problem("A", "a", "a"),
        problem("B", "b", "b"),
    ])));

    store.set_test_status(TestStatus::Awaiting);
    assert_eq!(store.snapshot().test_status(), &TestStatus::Awaiting);

    store.apply(ServerCommand::SetTestResponse(TestResult::AllTestsPassed {
        runtime_ms: 120,
    }));
    assert_eq!(
        store.snapshot().test_status(),
        &TestStatus::Response(TestResult::AllTestsPassed { runtime_ms: 120 })
    );

    assert_ok!(store.set_current_problem_index(1));
    assert_eq!(store.snapshot().test_status(), &TestStatus::None);
}

#[test]
fn rejected_problem_switch_still_resets_test_status() {
    let store = RoomStateStore::new();
    store.apply(ServerCommand::SetProblems(Some(vec![problem("A", "a", "a")])));
    store.apply_test_result(TestResult::Error {
        message: "boom".into(),
    });

    let err = assert_err!(store.set_current_problem_index(5));
    assert!(matches!(
        err,
        RoomError::ProblemIndexOutOfRange { index: 5, len: 1 }
    ));
    assert_eq!(store.snapshot().test_status(), &TestStatus::None);
    assert_eq!(store.snapshot().current_problem_index(), 0);
}

#[test]
fn only_reachable_test_statuses_are_produced() {
    let reachable = |status: &TestStatus| {
        matches!(
            status,
            TestStatus::None | TestStatus::Awaiting | TestStatus::Response(_)
        )
    };
    let store = RoomStateStore::new();
    store.apply(ServerCommand::SetProblems(Some(vec![problem("A", "a", "a")])));

    store.set_test_status(TestStatus::Awaiting);
    store.set_test_status(TestStatus::Awaiting);
    assert_eq!(store.snapshot().test_status(), &TestStatus::Awaiting);

    store.apply_test_result(TestResult::AllTestsPassed { runtime_ms: 1 });
    store.apply_test_result(TestResult::AllTestsPassed { runtime_ms: 2 });
    assert!(reachable(store.snapshot().test_status()));
    assert_eq!(
        store.snapshot().test_status().result(),
        Some(&TestResult::AllTestsPassed { runtime_ms: 2 })
    );
}

#[test]
fn unsolicited_response_is_recorded() {
    let state = reduce_all([ServerCommand::SetTestResponse(TestResult::Error {
        message: "late".into(),
    })]);
    assert_eq!(
        state.test_status(),
        &TestStatus::Response(TestResult::Error {
            message: "late".into()
        })
    );
}

// ── Snapshots ───────────────────────────────────────────────────────

#[test]
fn snapshots_are_immutable() {
    let store = RoomStateStore::new();
    store.apply(ServerCommand::SetProblems(Some(vec![problem("A", "a", "a")])));
    let before = store.snapshot();

    assert!(store.set_problem_code(0, Language::Python, "edited".into()));
    store.apply(ServerCommand::ChatMessage(connection_entry("alice")));

    assert_eq!(before.code().get(0, Language::Python), Some("a"));
    assert!(before.chat_history().is_empty());
    assert_eq!(
        store.snapshot().code().get(0, Language::Python),
        Some("edited")
    );
}

#[tokio::test]
async fn subscribers_observe_every_reduction() {
    let store = RoomStateStore::new();
    let mut rx = store.subscribe();

    store.apply(ServerCommand::SetUsers(vec![user("u1", "alice")]));
    rx.changed().await.unwrap();
    assert_eq!(rx.borrow_and_update().roster().len(), 1);

    assert!(!store.set_problem_code(0, Language::Python, "no problems yet".into()));
    assert!(!rx.has_changed().unwrap());
}

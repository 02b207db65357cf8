#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::indexing_slicing
)]
//! Protocol wire-format tests for the Radix Room Client.
//!
//! Decodes JSON fixtures shaped like real room-server output and checks that
//! outbound commands encode to the field names the server reads.

use radix_room_client::protocol::{
    BoilerplateCode, ChatEntry, ClientCommand, FailedTestCase, Language, Problem, RoomConfig,
    RoomUser, ServerCommand, TestCase, TestResult,
};
use radix_room_client::RoomError;
use serde_json::{json, Value};

// ════════════════════════════════════════════════════════════════════
// Helpers
// ════════════════════════════════════════════════════════════════════

fn decode(value: Value) -> ServerCommand {
    ServerCommand::from_frame(&value.to_string()).expect("decode server frame")
}

fn encode(command: &ClientCommand) -> Value {
    serde_json::from_str(&command.to_frame().expect("encode")).expect("valid json")
}

fn alice() -> RoomUser {
    RoomUser {
        id: "u1".into(),
        name: "alice".into(),
        avatar: "https://avatars.example/alice.png".into(),
    }
}

// ════════════════════════════════════════════════════════════════════
// Inbound fixtures
// ════════════════════════════════════════════════════════════════════

#[test]
fn chat_message_user_chat_fixture() {
    let cmd = decode(json!({
        "t": "ChatMessage",
        "c": {
            "t": "UserChat",
            "c": {
                "author": {"id": "u1", "name": "alice", "image": "https://avatars.example/alice.png"},
                "content": "hi"
            }
        }
    }));
    assert_eq!(
        cmd,
        ServerCommand::ChatMessage(ChatEntry::UserChat {
            author: alice(),
            content: "hi".into(),
        })
    );
}

#[test]
fn chat_history_fixture_preserves_order() {
    let cmd = decode(json!({
        "t": "ChatHistory",
        "c": [
            {"t": "Connection", "c": {"username": "alice"}},
            {"t": "RoundBegin", "c": null},
            {"t": "UserSubmitted", "c": {"username": "bob"}},
            {"t": "UserProblemCompletion", "c": {"username": "bob", "problemIndex": 1}},
            {"t": "UserFinished", "c": {"username": "bob", "place": 1}},
            {"t": "RoundEnd", "c": null},
            {"t": "Disconnection", "c": {"username": "alice"}}
        ]
    }));
    let ServerCommand::ChatHistory(entries) = cmd else {
        panic!("expected ChatHistory");
    };
    assert_eq!(
        entries,
        vec![
            ChatEntry::Connection {
                username: "alice".into()
            },
            ChatEntry::RoundBegin,
            ChatEntry::UserSubmitted {
                username: "bob".into()
            },
            ChatEntry::UserProblemCompletion {
                username: "bob".into(),
                problem_index: 1
            },
            ChatEntry::UserFinished {
                username: "bob".into(),
                place: 1
            },
            ChatEntry::RoundEnd,
            ChatEntry::Disconnection {
                username: "alice".into()
            },
        ]
    );
}

#[test]
fn set_room_config_fixture() {
    let cmd = decode(json!({
        "t": "SetRoomConfig",
        "c": {
            "name": "weekly",
            "public": true,
            "owner": {"id": "u1", "name": "alice", "image": "https://avatars.example/alice.png"}
        }
    }));
    assert_eq!(
        cmd,
        ServerCommand::SetRoomConfig(RoomConfig {
            name: "weekly".into(),
            is_public: true,
            owner: alice(),
        })
    );
}

#[test]
fn set_problems_fixture() {
    let cmd = decode(json!({
        "t": "SetProblems",
        "c": [{
            "id": "two-sum",
            "title": "Two Sum",
            "description": "Add **two** numbers.",
            "boilerplateCode": {"python": "def solve():\n    pass", "javascript": "function solve() {}"},
            "defaultTestCases": [{"input": "1 2", "output": "3"}],
            "difficulty": 2
        }]
    }));
    assert_eq!(
        cmd,
        ServerCommand::SetProblems(Some(vec![Problem {
            id: "two-sum".into(),
            title: "Two Sum".into(),
            description: "Add **two** numbers.".into(),
            boilerplate_code: BoilerplateCode {
                python: "def solve():\n    pass".into(),
                javascript: "function solve() {}".into(),
            },
            default_test_cases: vec![TestCase {
                input: "1 2".into(),
                output: "3".into(),
            }],
            difficulty: Some(2),
        }]))
    );
}

#[test]
fn problem_without_optional_fields_decodes() {
    let cmd = decode(json!({
        "t": "SetProblems",
        "c": [{
            "id": "p",
            "title": "P",
            "description": "",
            "boilerplateCode": {"python": "", "javascript": ""}
        }]
    }));
    let ServerCommand::SetProblems(Some(problems)) = cmd else {
        panic!("expected a problem set");
    };
    assert!(problems[0].default_test_cases.is_empty());
    assert_eq!(problems[0].difficulty, None);
}

#[test]
fn set_test_response_fixtures() {
    assert_eq!(
        decode(json!({"t": "SetTestResponse", "c": {"t": "AllTestsPassed", "c": {"runtime": 120}}})),
        ServerCommand::SetTestResponse(TestResult::AllTestsPassed { runtime_ms: 120 })
    );
    assert_eq!(
        decode(json!({"t": "SetTestResponse", "c": {"t": "Error", "c": {"message": "SyntaxError"}}})),
        ServerCommand::SetTestResponse(TestResult::Error {
            message: "SyntaxError".into()
        })
    );
    assert_eq!(
        decode(json!({
            "t": "SetTestResponse",
            "c": {"t": "Ran", "c": {
                "failedTests": [{"input": "1 2", "output": "4", "expected": "3"}],
                "okayTests": [{"input": "2 2", "output": "4"}]
            }}
        })),
        ServerCommand::SetTestResponse(TestResult::Ran {
            failed_tests: vec![FailedTestCase {
                input: "1 2".into(),
                output: "4".into(),
                expected: "3".into(),
            }],
            okay_tests: vec![TestCase {
                input: "2 2".into(),
                output: "4".into(),
            }],
        })
    );
}

#[test]
fn unknown_chat_entry_rejects_the_whole_frame() {
    let err = ServerCommand::from_frame(
        &json!({"t": "ChatMessage", "c": {"t": "Emote", "c": {}}}).to_string(),
    )
    .unwrap_err();
    assert!(matches!(err, RoomError::InvalidPayload { ref tag, .. } if tag == "ChatMessage"));
}

#[test]
fn client_tags_are_not_server_commands() {
    let err = ServerCommand::from_frame(r#"{"t":"BeginRound","c":null}"#).unwrap_err();
    assert!(matches!(err, RoomError::UnknownTag { .. }));
}

// ════════════════════════════════════════════════════════════════════
// Outbound encoding
// ════════════════════════════════════════════════════════════════════

#[test]
fn send_chat_message_encoding() {
    assert_eq!(
        encode(&ClientCommand::SendChatMessage {
            content: "gl hf".into()
        }),
        json!({"t": "SendChatMessage", "c": {"content": "gl hf"}})
    );
}

#[test]
fn begin_round_encoding() {
    assert_eq!(
        encode(&ClientCommand::BeginRound),
        json!({"t": "BeginRound", "c": null})
    );
}

#[test]
fn set_editor_content_encoding() {
    assert_eq!(
        encode(&ClientCommand::SetEditorContent {
            content: "print(1)".into()
        }),
        json!({"t": "SetEditorContent", "c": {"content": "print(1)"}})
    );
}

#[test]
fn test_code_encoding() {
    assert_eq!(
        encode(&ClientCommand::TestCode {
            language: Language::Python,
            test_cases: vec![TestCase {
                input: "1 2".into(),
                output: "3".into(),
            }],
        }),
        json!({
            "t": "TestCode",
            "c": {"language": "python", "testCases": [{"input": "1 2", "output": "3"}]}
        })
    );
}

#[test]
fn submit_code_encoding() {
    assert_eq!(
        encode(&ClientCommand::SubmitCode {
            problem_index: 2,
            language: Language::Javascript,
        }),
        json!({"t": "SubmitCode", "c": {"problemIndex": 2, "language": "javascript"}})
    );
}

#[test]
fn unknown_language_is_rejected() {
    let err = ClientCommand::from_frame(
        &json!({"t": "SubmitCode", "c": {"problemIndex": 0, "language": "cobol"}}).to_string(),
    )
    .unwrap_err();
    assert!(matches!(err, RoomError::InvalidPayload { .. }));
}

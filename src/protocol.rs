//! Wire-compatible command protocol for room sessions.
//!
//! Every frame, in both directions, is a JSON object `{"t": <tag>, "c": <payload>}`.
//! Payload-less commands carry `"c": null`. The serde representation of every
//! tagged type in this module is adjacently tagged with `t`/`c`, and field names
//! are camelCase on the wire.
//!
//! Decoding is explicit: [`ServerCommand::from_frame`] distinguishes a frame that
//! is not JSON at all, a frame with an unknown tag, and a frame whose payload
//! does not fit its tag. Callers drop all three.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::{Result, RoomError};

// ── Enums ───────────────────────────────────────────────────────────

/// Programming languages a participant can write solutions in.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    Python,
    Javascript,
}

impl Language {
    /// Every supported language, in seeding order.
    pub const ALL: [Language; 2] = [Language::Python, Language::Javascript];

    /// The lowercase wire name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Python => "python",
            Self::Javascript => "javascript",
        }
    }
}

impl std::fmt::Display for Language {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Structs ─────────────────────────────────────────────────────────

/// A participant as shown in the roster and on chat messages.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RoomUser {
    pub id: String,
    pub name: String,
    /// Avatar reference (usually an image URL).
    #[serde(rename = "image")]
    pub avatar: String,
}

/// Room configuration, set by the server once the participant joins.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RoomConfig {
    pub name: String,
    #[serde(rename = "public")]
    pub is_public: bool,
    pub owner: RoomUser,
}

/// One input/expected-output pair.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TestCase {
    pub input: String,
    pub output: String,
}

/// A test case that produced the wrong output.
///
/// `output` is what the participant's code printed; `expected` is the case's
/// reference output.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FailedTestCase {
    pub input: String,
    pub output: String,
    pub expected: String,
}

/// Starting code for each supported language.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct BoilerplateCode {
    pub python: String,
    pub javascript: String,
}

impl BoilerplateCode {
    /// Boilerplate for `language`.
    pub fn for_language(&self, language: Language) -> &str {
        match language {
            Language::Python => &self.python,
            Language::Javascript => &self.javascript,
        }
    }
}

/// A problem as resolved by the server for the current round.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Problem {
    pub id: String,
    pub title: String,
    /// Markdown description.
    pub description: String,
    pub boilerplate_code: BoilerplateCode,
    #[serde(default)]
    pub default_test_cases: Vec<TestCase>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub difficulty: Option<u8>,
}

// ── Tagged values ───────────────────────────────────────────────────

/// One entry of the room chat log.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "t", content = "c")]
pub enum ChatEntry {
    /// A participant connected.
    Connection { username: String },
    /// A participant disconnected.
    Disconnection { username: String },
    /// A chat line written by a participant.
    UserChat { author: RoomUser, content: String },
    /// The owner started a round.
    RoundBegin,
    /// The round finished.
    RoundEnd,
    /// A participant submitted code.
    UserSubmitted { username: String },
    /// A participant solved one problem.
    UserProblemCompletion {
        username: String,
        #[serde(rename = "problemIndex")]
        problem_index: usize,
    },
    /// A participant solved every problem.
    UserFinished { username: String, place: u32 },
}

/// Outcome of a run or submission, as reported by the judge.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "t", content = "c")]
pub enum TestResult {
    /// The code ran; some cases may have failed.
    Ran {
        #[serde(rename = "failedTests")]
        failed_tests: Vec<FailedTestCase>,
        #[serde(rename = "okayTests")]
        okay_tests: Vec<TestCase>,
    },
    /// The code could not be run (compile error, runtime exception, judge failure).
    Error { message: String },
    /// Every case passed.
    AllTestsPassed {
        #[serde(rename = "runtime")]
        runtime_ms: u64,
    },
}

// ── Commands ────────────────────────────────────────────────────────

/// Commands sent from the server to this client.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "t", content = "c")]
pub enum ServerCommand {
    /// A single new chat entry.
    ChatMessage(ChatEntry),
    /// Chat entries accumulated before this client connected.
    ChatHistory(Vec<ChatEntry>),
    /// Full roster resync.
    SetUsers(Vec<RoomUser>),
    /// Room configuration.
    SetRoomConfig(RoomConfig),
    /// The active problem set, or `None` between rounds.
    SetProblems(Option<Vec<Problem>>),
    /// Result of the last run or submission.
    SetTestResponse(TestResult),
}

impl ServerCommand {
    /// Every tag a server frame may carry.
    pub const TAGS: &'static [&'static str] = &[
        "ChatMessage",
        "ChatHistory",
        "SetUsers",
        "SetRoomConfig",
        "SetProblems",
        "SetTestResponse",
    ];

    /// The wire tag of this command.
    pub fn tag(&self) -> &'static str {
        match self {
            Self::ChatMessage(_) => "ChatMessage",
            Self::ChatHistory(_) => "ChatHistory",
            Self::SetUsers(_) => "SetUsers",
            Self::SetRoomConfig(_) => "SetRoomConfig",
            Self::SetProblems(_) => "SetProblems",
            Self::SetTestResponse(_) => "SetTestResponse",
        }
    }

    /// Decode one inbound text frame.
    ///
    /// # Errors
    ///
    /// - [`RoomError::MalformedFrame`] if the text is not a `{t, c}` object
    /// - [`RoomError::UnknownTag`] if `t` is not in [`ServerCommand::TAGS`]
    /// - [`RoomError::InvalidPayload`] if `c` does not match the tag
    pub fn from_frame(text: &str) -> Result<Self> {
        decode_frame(text, Self::TAGS)
    }

    /// Encode this command as a text frame.
    ///
    /// # Errors
    ///
    /// Returns [`RoomError::Serialization`] if serialization fails.
    pub fn to_frame(&self) -> Result<String> {
        encode_frame(self)
    }
}

/// Commands sent from this client to the server.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "t", content = "c")]
pub enum ClientCommand {
    /// Post a chat line.
    SendChatMessage { content: String },
    /// Start the round (owner only; the server enforces it).
    BeginRound,
    /// Mirror the local editor contents to the server.
    SetEditorContent { content: String },
    /// Run the current code against the given cases.
    TestCode {
        language: Language,
        #[serde(rename = "testCases")]
        test_cases: Vec<TestCase>,
    },
    /// Submit the code for a problem for judging.
    SubmitCode {
        #[serde(rename = "problemIndex")]
        problem_index: usize,
        language: Language,
    },
}

impl ClientCommand {
    /// Every tag a client frame may carry.
    pub const TAGS: &'static [&'static str] = &[
        "SendChatMessage",
        "BeginRound",
        "SetEditorContent",
        "TestCode",
        "SubmitCode",
    ];

    /// The wire tag of this command.
    pub fn tag(&self) -> &'static str {
        match self {
            Self::SendChatMessage { .. } => "SendChatMessage",
            Self::BeginRound => "BeginRound",
            Self::SetEditorContent { .. } => "SetEditorContent",
            Self::TestCode { .. } => "TestCode",
            Self::SubmitCode { .. } => "SubmitCode",
        }
    }

    /// Encode this command as a text frame.
    ///
    /// # Errors
    ///
    /// Returns [`RoomError::Serialization`] if serialization fails.
    pub fn to_frame(&self) -> Result<String> {
        encode_frame(self)
    }

    /// Decode a client frame. Used by servers and test harnesses.
    ///
    /// # Errors
    ///
    /// Same as [`ServerCommand::from_frame`].
    pub fn from_frame(text: &str) -> Result<Self> {
        decode_frame(text, Self::TAGS)
    }
}

// ── Frame codec ─────────────────────────────────────────────────────

/// The bare `{t, c}` envelope, read before the payload is typed.
#[derive(Debug, Deserialize)]
struct Envelope {
    t: String,
}

fn encode_frame<T: Serialize>(value: &T) -> Result<String> {
    let mut frame = serde_json::to_value(value)?;
    // serde omits the content key for unit variants; the wire always has it.
    if let serde_json::Value::Object(map) = &mut frame {
        map.entry("c").or_insert(serde_json::Value::Null);
    }
    Ok(serde_json::to_string(&frame)?)
}

fn decode_frame<T: DeserializeOwned>(text: &str, tags: &[&str]) -> Result<T> {
    let envelope: Envelope =
        serde_json::from_str(text).map_err(|e| RoomError::MalformedFrame(e.to_string()))?;

    if !tags.contains(&envelope.t.as_str()) {
        return Err(RoomError::UnknownTag { tag: envelope.t });
    }

    serde_json::from_str(text).map_err(|e| RoomError::InvalidPayload {
        tag: envelope.t,
        detail: e.to_string(),
    })
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
    use serde_json::json;

    #[test]
    fn unit_commands_carry_null_content() {
        let frame = ClientCommand::BeginRound.to_frame().unwrap();
        let value: serde_json::Value = serde_json::from_str(&frame).unwrap();
        assert_eq!(value, json!({"t": "BeginRound", "c": null}));
    }

    #[test]
    fn unit_chat_entries_accept_null_or_missing_content() {
        let with_null: ChatEntry = serde_json::from_str(r#"{"t":"RoundBegin","c":null}"#).unwrap();
        let without: ChatEntry = serde_json::from_str(r#"{"t":"RoundEnd"}"#).unwrap();
        assert_eq!(with_null, ChatEntry::RoundBegin);
        assert_eq!(without, ChatEntry::RoundEnd);
    }

    #[test]
    fn set_problems_null_decodes_to_none() {
        let cmd = ServerCommand::from_frame(r#"{"t":"SetProblems","c":null}"#).unwrap();
        assert_eq!(cmd, ServerCommand::SetProblems(None));
    }

    #[test]
    fn tag_matches_serialized_tag() {
        let cmd = ServerCommand::SetUsers(vec![]);
        let value: serde_json::Value = serde_json::from_str(&cmd.to_frame().unwrap()).unwrap();
        assert_eq!(value["t"], cmd.tag());
    }

    #[test]
    fn tag_tables_cover_every_variant() {
        assert_eq!(ServerCommand::TAGS.len(), 6);
        assert_eq!(ClientCommand::TAGS.len(), 5);
        assert!(ClientCommand::TAGS.contains(&ClientCommand::BeginRound.tag()));
    }

    #[test]
    fn malformed_json_is_reported_as_malformed_frame() {
        let err = ServerCommand::from_frame("{not json").unwrap_err();
        assert!(matches!(err, RoomError::MalformedFrame(_)));
    }

    #[test]
    fn missing_tag_is_reported_as_malformed_frame() {
        let err = ServerCommand::from_frame(r#"{"c": 1}"#).unwrap_err();
        assert!(matches!(err, RoomError::MalformedFrame(_)));
    }

    #[test]
    fn unknown_tag_is_reported_by_name() {
        let err = ServerCommand::from_frame(r#"{"t":"Explode","c":null}"#).unwrap_err();
        match err {
            RoomError::UnknownTag { tag } => assert_eq!(tag, "Explode"),
            other => panic!("expected UnknownTag, got {other:?}"),
        }
    }

    #[test]
    fn wrong_payload_is_reported_as_invalid_payload() {
        let err = ServerCommand::from_frame(r#"{"t":"SetUsers","c":"nobody"}"#).unwrap_err();
        assert!(matches!(err, RoomError::InvalidPayload { ref tag, .. } if tag == "SetUsers"));
    }

    #[test]
    fn language_display_matches_wire_name() {
        for language in Language::ALL {
            let wire = serde_json::to_string(&language).unwrap();
            assert_eq!(wire, format!("\"{language}\""));
        }
    }

    #[test]
    fn boilerplate_for_language() {
        let code = BoilerplateCode {
            python: "def f(): pass".into(),
            javascript: "function f() {}".into(),
        };
        assert_eq!(code.for_language(Language::Python), "def f(): pass");
        assert_eq!(code.for_language(Language::Javascript), "function f() {}");
    }
}

//! The run/submission status machine.
//!
//! ```text
//!           request()              respond(result)
//!   None ─────────────▶ Awaiting ─────────────────▶ Response(result)
//!    ▲                                                   │
//!    └──────────────────── reset() ──────────────────────┘
//! ```
//!
//! `request()` from `Awaiting` re-sets the same state. A response that arrives
//! while nothing is awaited is still applied: the protocol carries no
//! correlation id, so a stale response cannot be told apart from a fresh one.

use tracing::debug;

use crate::protocol::TestResult;

/// Where the participant's last run or submission stands.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum TestStatus {
    /// Nothing requested, or reset after switching problems.
    #[default]
    None,
    /// A run or submission was sent and its result is pending.
    Awaiting,
    /// The judge answered.
    Response(TestResult),
}

impl TestStatus {
    /// Transition for a locally issued run or submission.
    #[must_use]
    pub fn request(self) -> Self {
        Self::Awaiting
    }

    /// Transition for an inbound `SetTestResponse`.
    #[must_use]
    pub fn respond(self, result: TestResult) -> Self {
        if !self.is_awaiting() {
            debug!(previous = ?self, "applying test response with no request outstanding");
        }
        Self::Response(result)
    }

    /// Explicit local reset.
    #[must_use]
    pub fn reset(self) -> Self {
        Self::None
    }

    /// Returns `true` while a result is pending.
    pub fn is_awaiting(&self) -> bool {
        matches!(self, Self::Awaiting)
    }

    /// The judge's result, if one has arrived.
    pub fn result(&self) -> Option<&TestResult> {
        match self {
            Self::Response(result) => Some(result),
            Self::None | Self::Awaiting => None,
        }
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

    fn passed(runtime_ms: u64) -> TestResult {
        TestResult::AllTestsPassed { runtime_ms }
    }

    #[test]
    fn starts_at_none() {
        assert_eq!(TestStatus::default(), TestStatus::None);
    }

    #[test]
    fn request_then_respond() {
        let status = TestStatus::None.request();
        assert!(status.is_awaiting());
        let status = status.respond(passed(120));
        assert_eq!(status, TestStatus::Response(passed(120)));
        assert_eq!(status.result(), Some(&passed(120)));
    }

    #[test]
    fn repeated_request_is_idempotent() {
        let once = TestStatus::None.request();
        let twice = once.clone().request();
        assert_eq!(once, twice);
    }

    #[test]
    fn unsolicited_response_is_applied() {
        let status = TestStatus::None.respond(TestResult::Error {
            message: "boom".into(),
        });
        assert!(matches!(status, TestStatus::Response(TestResult::Error { .. })));
    }

    #[test]
    fn fresh_request_leaves_response() {
        let status = TestStatus::Response(passed(3)).request();
        assert_eq!(status, TestStatus::Awaiting);
        assert_eq!(status.result(), None);
    }

    #[test]
    fn reset_from_any_state() {
        for status in [
            TestStatus::None,
            TestStatus::Awaiting,
            TestStatus::Response(passed(1)),
        ] {
            assert_eq!(status.reset(), TestStatus::None);
        }
    }
}

//! Test case status and the verdict engine's log types.

use std::fmt;

use serde::Serialize;

/// Log record type codes reported by the verdict engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogType {
    GeneralText,
    First,
    StartTest,
    EndTest,
    Verdict,
    ParsingError,
    InternalError,
    UserInteraction,
    EtsAssertion,
    FinalVerdict,
    Other(u32),
}

impl From<u32> for LogType {
    fn from(code: u32) -> Self {
        match code {
            0 => LogType::GeneralText,
            1 => LogType::First,
            2 => LogType::StartTest,
            3 => LogType::EndTest,
            4 => LogType::Verdict,
            5 => LogType::ParsingError,
            6 => LogType::InternalError,
            7 => LogType::UserInteraction,
            8 => LogType::EtsAssertion,
            9 => LogType::FinalVerdict,
            other => LogType::Other(other),
        }
    }
}

/// Lifecycle of one test case run.
///
/// ```text
/// Init ──start──► Started ──final verdict──► Pass | Inconc | Fail | Unknown
///                    any state ──engine error──► EngineError
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "detail", rename_all = "snake_case")]
pub enum TestCaseStatus {
    Init,
    Started,
    Pass,
    Inconc,
    Fail,
    /// Final verdict text without a recognizable verdict token.
    Unknown(String),
    /// Error code returned by the verdict engine while running the case.
    EngineError(i32),
}

impl TestCaseStatus {
    /// Terminal states are only left through an explicit reset.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, TestCaseStatus::Init | TestCaseStatus::Started)
    }

    /// Classify a final verdict message. Token search is case-sensitive.
    pub fn from_verdict(message: &str) -> Self {
        if message.contains("PASS") {
            TestCaseStatus::Pass
        } else if message.contains("INCONC") {
            TestCaseStatus::Inconc
        } else if message.contains("FAIL") {
            TestCaseStatus::Fail
        } else {
            TestCaseStatus::Unknown(message.trim().to_string())
        }
    }
}

impl fmt::Display for TestCaseStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TestCaseStatus::Init => f.write_str("INIT"),
            TestCaseStatus::Started => f.write_str("STARTED"),
            TestCaseStatus::Pass => f.write_str("PASS"),
            TestCaseStatus::Inconc => f.write_str("INCONC"),
            TestCaseStatus::Fail => f.write_str("FAIL"),
            TestCaseStatus::Unknown(text) => write!(f, "UNKNOWN ({})", text),
            TestCaseStatus::EngineError(code) => write!(f, "ENGINE ERROR 0x{:08x}", code),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verdict_tokens() {
        assert_eq!(TestCaseStatus::from_verdict("Final Verdict: PASS"), TestCaseStatus::Pass);
        assert_eq!(TestCaseStatus::from_verdict("INCONC"), TestCaseStatus::Inconc);
        assert_eq!(TestCaseStatus::from_verdict("verdict FAIL"), TestCaseStatus::Fail);
        assert_eq!(
            TestCaseStatus::from_verdict(" pass "),
            TestCaseStatus::Unknown("pass".to_string())
        );
    }

    #[test]
    fn test_terminal_states() {
        assert!(!TestCaseStatus::Init.is_terminal());
        assert!(!TestCaseStatus::Started.is_terminal());
        assert!(TestCaseStatus::Pass.is_terminal());
        assert!(TestCaseStatus::Unknown(String::new()).is_terminal());
        assert!(TestCaseStatus::EngineError(-1).is_terminal());
    }

    #[test]
    fn test_log_type_codes() {
        assert_eq!(LogType::from(2), LogType::StartTest);
        assert_eq!(LogType::from(9), LogType::FinalVerdict);
        assert_eq!(LogType::from(42), LogType::Other(42));
    }

    #[test]
    fn test_status_serializes_tagged() {
        let json = serde_json::to_value(TestCaseStatus::EngineError(-5)).unwrap();
        assert_eq!(json["status"], "engine_error");
        assert_eq!(json["detail"], -5);

        let json = serde_json::to_value(TestCaseStatus::Pass).unwrap();
        assert_eq!(json["status"], "pass");
    }

    #[test]
    fn test_display() {
        assert_eq!(TestCaseStatus::Inconc.to_string(), "INCONC");
        assert_eq!(
            TestCaseStatus::EngineError(-2147467259).to_string(),
            "ENGINE ERROR 0x80004005"
        );
    }
}

//! Run-time envelopes: run/case/step lifecycle, results and attachments.

use serde::{Deserialize, Serialize};

use super::Source;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct Timestamp {
    pub seconds: i64,
    pub nanos: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct Duration {
    pub seconds: i64,
    pub nanos: i64,
}

// ============================================================================
// Meta
// ============================================================================

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Meta {
    pub protocol_version: String,
    pub implementation: Product,
    pub runtime: Product,
    pub os: Product,
    pub cpu: Product,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ci: Option<Ci>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Product {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

impl Product {
    pub fn new(name: impl Into<String>, version: Option<&str>) -> Self {
        Self {
            name: name.into(),
            version: version.map(str::to_string),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Ci {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub build_number: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub git: Option<Git>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Git {
    pub remote: String,
    pub revision: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branch: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tag: Option<String>,
}

// ============================================================================
// Lifecycle
// ============================================================================

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TestRunStarted {
    pub timestamp: Timestamp,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestRunFinished {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub success: bool,
    pub timestamp: Timestamp,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exception: Option<Exception>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub test_run_started_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestCaseStarted {
    pub attempt: u32,
    pub id: String,
    pub test_case_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub worker_id: Option<String>,
    pub timestamp: Timestamp,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestCaseFinished {
    pub test_case_started_id: String,
    pub timestamp: Timestamp,
    pub will_be_retried: bool,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestStepStarted {
    pub test_case_started_id: String,
    pub test_step_id: String,
    pub timestamp: Timestamp,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestStepFinished {
    pub test_case_started_id: String,
    pub test_step_id: String,
    pub test_step_result: TestStepResult,
    pub timestamp: Timestamp,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestRunHookStarted {
    pub id: String,
    pub test_run_started_id: String,
    pub hook_id: String,
    pub timestamp: Timestamp,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestRunHookFinished {
    pub test_run_hook_started_id: String,
    pub result: TestStepResult,
    pub timestamp: Timestamp,
}

// ============================================================================
// Results
// ============================================================================

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestStepResult {
    pub duration: Duration,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub status: TestStepResultStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exception: Option<Exception>,
}

impl TestStepResult {
    pub fn new(status: TestStepResultStatus, duration: Duration) -> Self {
        Self {
            duration,
            message: None,
            status,
            exception: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Exception {
    #[serde(rename = "type")]
    pub exception_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stack_trace: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TestStepResultStatus {
    #[default]
    Unknown,
    Passed,
    Skipped,
    Pending,
    Undefined,
    Ambiguous,
    Failed,
}

impl TestStepResultStatus {
    /// Severity used when several outcomes are folded into one.
    pub fn rank(self) -> u8 {
        match self {
            TestStepResultStatus::Unknown => 0,
            TestStepResultStatus::Passed => 1,
            TestStepResultStatus::Skipped => 2,
            TestStepResultStatus::Pending => 3,
            TestStepResultStatus::Undefined => 4,
            TestStepResultStatus::Ambiguous => 5,
            TestStepResultStatus::Failed => 6,
        }
    }

    /// The more severe of two statuses.
    pub fn worst(self, other: Self) -> Self {
        if other.rank() > self.rank() {
            other
        } else {
            self
        }
    }

    /// Fold any number of statuses; an empty input is `Unknown`.
    pub fn worst_of<I>(statuses: I) -> Self
    where
        I: IntoIterator<Item = Self>,
    {
        statuses
            .into_iter()
            .fold(TestStepResultStatus::Unknown, TestStepResultStatus::worst)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TestStepResultStatus::Unknown => "UNKNOWN",
            TestStepResultStatus::Passed => "PASSED",
            TestStepResultStatus::Skipped => "SKIPPED",
            TestStepResultStatus::Pending => "PENDING",
            TestStepResultStatus::Undefined => "UNDEFINED",
            TestStepResultStatus::Ambiguous => "AMBIGUOUS",
            TestStepResultStatus::Failed => "FAILED",
        }
    }
}

// ============================================================================
// Attachments & suggestions
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AttachmentContentEncoding {
    #[default]
    Identity,
    Base64,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Attachment {
    pub body: String,
    pub content_encoding: AttachmentContentEncoding,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_name: Option<String>,
    pub media_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<Source>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub test_case_started_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub test_step_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub test_run_hook_started_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<Timestamp>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Suggestion {
    pub id: String,
    pub pickle_step_id: String,
    pub snippets: Vec<Snippet>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Snippet {
    pub language: String,
    pub code: String,
}

//! Progress event models

use serde::{Deserialize, Serialize};

/// Lifecycle event type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    Building,
    ContainerStarted,
    Testing,
    TestResult,
    MintingIdentity,
    Complete,
    Error,
}

impl EventType {
    /// `complete` and `error` close a deployment session
    pub fn is_terminal(&self) -> bool {
        matches!(self, EventType::Complete | EventType::Error)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::Building => "building",
            EventType::ContainerStarted => "container_started",
            EventType::Testing => "testing",
            EventType::TestResult => "test_result",
            EventType::MintingIdentity => "minting_identity",
            EventType::Complete => "complete",
            EventType::Error => "error",
        }
    }
}

/// Outcome of one post-deploy test
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestResult {
    pub test_type: String,

    pub passed: bool,

    pub duration_ms: u64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ai_score: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ai_notes: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tx_signature: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price_usdc: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_preview: Option<String>,
}

/// One immutable fact about a deployment, as written by the deploy worker
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressEvent {
    #[serde(rename = "type")]
    pub event_type: EventType,

    pub resource_id: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub test: Option<TestResult>,

    /// Opaque to the pipeline, relayed as-is
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoints: Option<serde_json::Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub public_url: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    /// Milliseconds since the Unix epoch
    pub timestamp: i64,
}

impl ProgressEvent {
    /// Create an event stamped with the current time
    pub fn new(event_type: EventType, resource_id: impl Into<String>) -> Self {
        Self {
            event_type,
            resource_id: resource_id.into(),
            resource_name: None,
            test: None,
            endpoints: None,
            public_url: None,
            error: None,
            timestamp: chrono::Utc::now().timestamp_millis(),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.resource_name = Some(name.into());
        self
    }

    pub fn with_test(mut self, test: TestResult) -> Self {
        self.test = Some(test);
        self
    }

    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }

    pub fn with_public_url(mut self, url: impl Into<String>) -> Self {
        self.public_url = Some(url.into());
        self
    }

    pub fn is_terminal(&self) -> bool {
        self.event_type.is_terminal()
    }
}

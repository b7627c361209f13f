//! Core data types for browser network log analysis.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// DevTools method announcing response headers for a request
pub const RESPONSE_RECEIVED: &str = "Network.responseReceived";
/// DevTools method reporting one chunk of decoded body data
pub const DATA_RECEIVED: &str = "Network.dataReceived";
/// DevTools method closing a request with its on-the-wire size
pub const LOADING_FINISHED: &str = "Network.loadingFinished";

/// URL prefix of images the proxy inlined into the page
pub const INLINE_IMAGE_PREFIX: &str = "data:image";
/// File name of the decoy images the proxy injects
pub const FAKE_IMAGE_NAME: &str = "__alpaca_fake_image.png";

/// One record of the browser performance log, as returned by the WebDriver
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawLogEntry {
    /// JSON-encoded envelope: `{"message": {"method": ..., "params": ...}, "webview": ...}`
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub level: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<f64>,
}

impl RawLogEntry {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            level: None,
            timestamp: None,
        }
    }
}

/// A decoded network timeline event
#[derive(Debug, Clone, PartialEq)]
pub struct NetworkEvent {
    pub method: String,
    pub params: Map<String, Value>,
}

impl NetworkEvent {
    pub fn new(method: impl Into<String>, params: Map<String, Value>) -> Self {
        Self {
            method: method.into(),
            params,
        }
    }

    /// String parameter, if present and actually a string
    pub fn str_param(&self, key: &str) -> Option<&str> {
        self.params.get(key).and_then(Value::as_str)
    }

    /// Byte counter parameter.
    ///
    /// Chrome reports `dataLength` as an integer but `encodedDataLength` as a
    /// double, so non-negative whole floats are accepted as well.
    pub fn byte_count(&self, key: &str) -> Option<u64> {
        let value = self.params.get(key)?;
        if let Some(n) = value.as_u64() {
            return Some(n);
        }
        value
            .as_f64()
            .filter(|f| f.is_finite() && *f >= 0.0 && f.fract() == 0.0)
            .map(|f| f as u64)
    }
}

/// One network request reconstructed from the performance log
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResourceRecord {
    pub url: String,
    pub status_text: String,
    /// Correlation key, only meaningful inside a single page load
    #[serde(skip)]
    pub request_id: String,
    /// Sum of `dataLength` over all data-received events
    pub decoded_bytes: u64,
    /// Sum of `encodedDataLength` over all loading-finished events
    pub encoded_bytes: u64,
}

impl ResourceRecord {
    pub fn new(
        request_id: impl Into<String>,
        url: impl Into<String>,
        status_text: impl Into<String>,
    ) -> Self {
        Self {
            url: url.into(),
            status_text: status_text.into(),
            request_id: request_id.into(),
            decoded_bytes: 0,
            encoded_bytes: 0,
        }
    }

    /// Record with known byte counters, mostly useful for tests and offline fixtures
    pub fn with_sizes(
        url: impl Into<String>,
        status_text: impl Into<String>,
        decoded_bytes: u64,
        encoded_bytes: u64,
    ) -> Self {
        Self {
            url: url.into(),
            status_text: status_text.into(),
            request_id: String::new(),
            decoded_bytes,
            encoded_bytes,
        }
    }

    pub fn is_inline_image(&self) -> bool {
        self.url.starts_with(INLINE_IMAGE_PREFIX)
    }

    pub fn is_fake_image(&self) -> bool {
        !self.is_inline_image() && self.url.contains(FAKE_IMAGE_NAME)
    }
}

/// Accepted number of decoy images for a scenario
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FakeImageExpectation {
    /// Deterministic configurations inject a fixed number of decoys
    Exact(usize),
    /// Probabilistic configurations draw the count from a range
    OneOf(Vec<usize>),
}

impl FakeImageExpectation {
    pub fn accepts(&self, observed: usize) -> bool {
        match self {
            FakeImageExpectation::Exact(n) => *n == observed,
            FakeImageExpectation::OneOf(set) => set.contains(&observed),
        }
    }
}

impl fmt::Display for FakeImageExpectation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FakeImageExpectation::Exact(n) => write!(f, "{}", n),
            FakeImageExpectation::OneOf(set) => write!(f, "one of {:?}", set),
        }
    }
}

/// Size and count contract of one scenario
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScenarioExpectation {
    pub inline_count: usize,
    pub fake_image_count: FakeImageExpectation,
}

impl ScenarioExpectation {
    pub fn new(inline_count: usize, fake_image_count: FakeImageExpectation) -> Self {
        Self {
            inline_count,
            fake_image_count,
        }
    }
}

/// Outcome of validating one page load
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationResult {
    pub success: bool,
    pub diagnostics: Vec<String>,
}

impl ValidationResult {
    pub fn passed() -> Self {
        Self {
            success: true,
            diagnostics: Vec::new(),
        }
    }

    pub fn failed(diagnostic: impl Into<String>) -> Self {
        let mut result = Self::passed();
        result.fail(diagnostic);
        result
    }

    pub fn fail(&mut self, diagnostic: impl Into<String>) {
        self.success = false;
        self.diagnostics.push(diagnostic.into());
    }
}

/// Reported outcome of one scenario run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioOutcome {
    pub name: String,
    pub success: bool,
    pub diagnostics: Vec<String>,
    pub timed_out: bool,
    /// Resources left after dropping the navigation record
    pub resource_count: usize,
    pub duration_ms: u64,
}

impl ScenarioOutcome {
    pub fn from_validation(name: &str, result: ValidationResult, resource_count: usize) -> Self {
        Self {
            name: name.to_string(),
            success: result.success,
            diagnostics: result.diagnostics,
            timed_out: false,
            resource_count,
            duration_ms: 0,
        }
    }

    pub fn failure(name: &str, diagnostic: impl Into<String>) -> Self {
        Self::from_validation(name, ValidationResult::failed(diagnostic), 0)
    }

    pub fn timeout(name: &str) -> Self {
        let mut outcome = Self::failure(name, "connection timed out");
        outcome.timed_out = true;
        outcome
    }
}

/// Run metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunMetadata {
    pub started_at: String,
    pub config_path: Option<String>,
    pub proxy_binary: String,
    pub target_url: String,
    pub scenario_count: usize,
}

/// Full report of one harness run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub metadata: RunMetadata,
    pub scenarios: Vec<ScenarioOutcome>,
}

impl RunReport {
    pub fn all_passed(&self) -> bool {
        self.scenarios.iter().all(|s| s.success)
    }

    pub fn failed_count(&self) -> usize {
        self.scenarios.iter().filter(|s| !s.success).count()
    }
}

//! Headless browser sessions over the WebDriver protocol.
//!
//! Each page load runs in a fresh Chrome session created through a running
//! chromedriver, with the `performance` log enabled so that the DevTools
//! network events of the load can be retrieved once navigation ends.
//!
//! ## Protocol sequence
//!
//! 1. `POST /session` with `goog:loggingPrefs: {performance: ALL}`
//! 2. `POST /session/{id}/timeouts` with the page-load bound
//! 3. `POST /session/{id}/url`
//! 4. `POST /session/{id}/se/log` with `type: performance`
//! 5. `DELETE /session/{id}`, also after a timeout or failure

use std::time::Duration;

use reqwest::blocking::Client;
use reqwest::Method;
use serde_json::{json, Value};

use crate::analysis::types::RawLogEntry;

/// Extra time granted to WebDriver round-trips beyond the navigation bound
const HTTP_GRACE: Duration = Duration::from_secs(30);

/// Result of one bounded navigation
#[derive(Debug, Clone, PartialEq)]
pub enum PageLoad {
    /// Navigation finished; the full performance log of the session
    Completed(Vec<RawLogEntry>),
    /// The page did not load within the navigation timeout
    TimedOut,
}

/// Errors raised while driving the browser
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("WebDriver request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("WebDriver error '{error}': {message}")]
    WebDriver { error: String, message: String },

    #[error("WebDriver response missing {0}")]
    MissingField(&'static str),

    #[error("Invalid performance log payload: {0}")]
    Payload(#[from] serde_json::Error),
}

impl SessionError {
    fn is_navigation_timeout(&self) -> bool {
        match self {
            SessionError::WebDriver { error, .. } => error == "timeout",
            SessionError::Http(e) => e.is_timeout(),
            _ => false,
        }
    }
}

/// Something that can load a page and hand back its raw performance log
pub trait PageLoader {
    fn load(&mut self, url: &str, timeout: Duration) -> Result<PageLoad, SessionError>;
}

/// Chrome driven through chromedriver's WebDriver endpoint
pub struct WebDriverSession {
    client: Client,
    base_url: String,
    headless: bool,
}

impl WebDriverSession {
    pub fn new(base_url: &str, headless: bool, navigation_timeout: Duration) -> Result<Self, SessionError> {
        let client = Client::builder()
            .timeout(navigation_timeout + HTTP_GRACE)
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            headless,
        })
    }

    fn command(&self, method: Method, path: &str, body: Option<Value>) -> Result<Value, SessionError> {
        let url = format!("{}{}", self.base_url, path);
        log::trace!("WebDriver {} {}", method, url);

        let mut request = self.client.request(method, &url);
        if let Some(body) = body {
            request = request.json(&body);
        }

        let response = request.send()?;
        let status = response.status();
        let mut body: Value = response.json()?;
        let value = body.get_mut("value").map(Value::take).unwrap_or(Value::Null);

        if !status.is_success() || value.get("error").is_some() {
            return Err(webdriver_error(&value));
        }
        Ok(value)
    }

    fn open_session(&self) -> Result<String, SessionError> {
        let value = self.command(Method::POST, "/session", Some(capabilities(self.headless)))?;
        let id = session_id(&value)?;
        log::debug!("Opened browser session {}", id);
        Ok(id)
    }

    fn close_session(&self, id: &str) {
        match self.command(Method::DELETE, &format!("/session/{}", id), None) {
            Ok(_) => log::debug!("Closed browser session {}", id),
            Err(e) => log::warn!("Failed to close browser session {}: {}", id, e),
        }
    }

    fn navigate(&self, id: &str, url: &str, timeout: Duration) -> Result<PageLoad, SessionError> {
        self.command(
            Method::POST,
            &format!("/session/{}/timeouts", id),
            Some(json!({ "pageLoad": timeout.as_millis() as u64 })),
        )?;

        match self.command(Method::POST, &format!("/session/{}/url", id), Some(json!({ "url": url }))) {
            Ok(_) => {}
            Err(e) if e.is_navigation_timeout() => {
                log::debug!("Navigation to {} timed out after {:?}", url, timeout);
                return Ok(PageLoad::TimedOut);
            }
            Err(e) => return Err(e),
        }

        let log = self.command(
            Method::POST,
            &format!("/session/{}/se/log", id),
            Some(json!({ "type": "performance" })),
        )?;
        let entries: Vec<RawLogEntry> = serde_json::from_value(log)?;
        log::debug!("Retrieved {} performance log entries", entries.len());

        Ok(PageLoad::Completed(entries))
    }
}

impl PageLoader for WebDriverSession {
    fn load(&mut self, url: &str, timeout: Duration) -> Result<PageLoad, SessionError> {
        let id = self.open_session()?;
        let result = self.navigate(&id, url, timeout);
        self.close_session(&id);
        result
    }
}

/// New-session payload requesting Chrome with the performance log enabled
pub fn capabilities(headless: bool) -> Value {
    let mut args = vec!["--disable-gpu", "--no-sandbox", "--disable-dev-shm-usage"];
    if headless {
        args.insert(0, "--headless");
    }

    json!({
        "capabilities": {
            "alwaysMatch": {
                "browserName": "chrome",
                "goog:chromeOptions": { "args": args },
                "goog:loggingPrefs": { "performance": "ALL" }
            }
        }
    })
}

/// Session id of a new-session response value
fn session_id(value: &Value) -> Result<String, SessionError> {
    value
        .get("sessionId")
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or(SessionError::MissingField("sessionId"))
}

/// Error carried in a WebDriver response value
fn webdriver_error(value: &Value) -> SessionError {
    let field = |key: &str| {
        value
            .get(key)
            .and_then(Value::as_str)
            .unwrap_or("unknown")
            .to_string()
    };
    SessionError::WebDriver {
        error: field("error"),
        message: field("message"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capabilities_enable_performance_log() {
        let caps = capabilities(true);
        let always = &caps["capabilities"]["alwaysMatch"];
        assert_eq!(always["goog:loggingPrefs"]["performance"], "ALL");
        assert_eq!(always["goog:chromeOptions"]["args"][0], "--headless");
    }

    #[test]
    fn test_capabilities_headed() {
        let caps = capabilities(false);
        let args = caps["capabilities"]["alwaysMatch"]["goog:chromeOptions"]["args"]
            .as_array()
            .unwrap();
        assert!(!args.iter().any(|a| *a == "--headless"));
    }

    #[test]
    fn test_session_id_extraction() {
        let value = json!({ "sessionId": "abc123", "capabilities": {} });
        assert_eq!(session_id(&value).unwrap(), "abc123");
        assert!(matches!(
            session_id(&json!({})),
            Err(SessionError::MissingField("sessionId"))
        ));
    }

    #[test]
    fn test_timeout_error_is_recognized() {
        let err = webdriver_error(&json!({
            "error": "timeout",
            "message": "timeout: Timed out receiving message from renderer: 10.000",
            "stacktrace": ""
        }));
        assert!(err.is_navigation_timeout());

        let err = webdriver_error(&json!({ "error": "session not created", "message": "no chrome binary" }));
        assert!(!err.is_navigation_timeout());
        assert_eq!(err.to_string(), "WebDriver error 'session not created': no chrome binary");
    }

    #[test]
    fn test_log_payload_decodes_into_entries() {
        let payload = json!([
            { "level": "INFO", "message": "{\"message\":{}}", "timestamp": 1611234567890.0 },
            { "level": "INFO", "message": "{}", "timestamp": 1611234567891.0 }
        ]);
        let entries: Vec<RawLogEntry> = serde_json::from_value(payload).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[1].message, "{}");
    }
}

use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::ParseError;

use crate::page::PageError;

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] ParseError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Page capture error: {0}")]
    Capture(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Fatal extraction error at {timestamp}: {message}")]
    Fatal { message: String, timestamp: u64 },
}

impl ExtractError {
    /// Builds a fatal error stamped with the current wall-clock time.
    pub fn fatal(message: impl Into<String>) -> Self {
        ExtractError::Fatal {
            message: message.into(),
            timestamp: crate::types::now_millis(),
        }
    }

    pub fn capture(message: impl Into<String>) -> Self {
        ExtractError::Capture(message.into())
    }

    pub fn to_payload(&self) -> ErrorPayload {
        match self {
            ExtractError::Io(e) => ErrorPayload::new(
                ErrorCategory::Config,
                e.to_string(),
                "Check file paths/permissions.",
            ),
            ExtractError::Network(e) => ErrorPayload::new(
                ErrorCategory::Network,
                e.to_string(),
                "Check connectivity/proxy/VPN and retry.",
            ),
            ExtractError::InvalidUrl(e) => ErrorPayload::new(
                ErrorCategory::Config,
                e.to_string(),
                "Verify URL/format (e.g., https://example.com).",
            ),
            ExtractError::Serialization(e) => ErrorPayload::new(
                ErrorCategory::Capture,
                e.to_string(),
                "Check that the capture file is a page capture JSON produced by `pse extract --save-capture`.",
            ),
            ExtractError::Capture(msg) => ErrorPayload::new(
                ErrorCategory::Capture,
                msg.clone(),
                capture_remediation(msg),
            ),
            ExtractError::Config(msg) => ErrorPayload::new(
                ErrorCategory::Config,
                msg.to_string(),
                "Check flags/paths (e.g., --viewport WIDTHxHEIGHT) and the config file.",
            ),
            ExtractError::Fatal { message, .. } => ErrorPayload::new(
                ErrorCategory::Fatal,
                message.to_string(),
                "The page could not be prepared for extraction; verify the capture has a document element and a non-empty viewport.",
            ),
        }
    }
}

/// Hint for a failed page capture, keyed on the failure message.
fn capture_remediation(message: &str) -> &'static str {
    let lower = message.to_ascii_lowercase();
    if lower.contains("playwright npm package is missing") {
        "Install Playwright (e.g., `npm install playwright` and `npx playwright install chromium`)."
    } else if lower.contains("not found on path") || lower.contains("node command") {
        "Install Node.js and ensure the node binary is on PATH, or set [browser] node_command."
    } else if lower.contains("timeout") || lower.contains("timed out") {
        "Try increasing --nav-timeout/--process-timeout or ensure the page loads without blocking."
    } else if lower.contains("references missing element")
        || lower.contains("out of range")
        || lower.contains("whose parent is")
        || lower.contains("cyclic parent chain")
    {
        "The capture's element tree is inconsistent; re-capture the page with --save-capture."
    } else {
        "Re-run with --verbose to see the browser output."
    }
}

impl From<PageError> for ExtractError {
    fn from(err: PageError) -> Self {
        ExtractError::Capture(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, ExtractError>;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ErrorCategory {
    Config,
    Network,
    Capture,
    Fatal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorPayload {
    pub category: ErrorCategory,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remediation: Option<String>,
}

impl ErrorPayload {
    pub fn new(category: ErrorCategory, message: String, remediation: impl Into<String>) -> Self {
        Self {
            category,
            message,
            remediation: Some(remediation.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capture_payload_includes_playwright_remediation() {
        let err = ExtractError::Capture(
            "Playwright npm package is missing; install with `npm install playwright`.".to_string(),
        );
        let payload = err.to_payload();
        assert_eq!(payload.category, ErrorCategory::Capture);
        let remediation = payload.remediation.unwrap_or_default();
        assert!(
            remediation.contains("npm install playwright"),
            "expected remediation to mention npm install playwright, got: {remediation}"
        );
    }

    #[test]
    fn capture_payload_includes_node_install_hint() {
        let err = ExtractError::Capture(
            "Unable to spawn Playwright helper; 'node' was not found on PATH".to_string(),
        );
        let remediation = err.to_payload().remediation.unwrap_or_default();
        assert!(
            remediation.to_ascii_lowercase().contains("node"),
            "expected node install/path remediation, got: {remediation}"
        );
    }

    #[test]
    fn capture_payload_includes_timeout_hint() {
        let err = ExtractError::Capture("Playwright timed out after 45s".to_string());
        let remediation = err.to_payload().remediation.unwrap_or_default();
        assert!(
            remediation.contains("--nav-timeout"),
            "expected timeout remediation, got: {remediation}"
        );
    }

    #[test]
    fn fatal_payload_uses_fatal_category() {
        let err = ExtractError::fatal("page has no document element");
        let payload = err.to_payload();
        assert_eq!(payload.category, ErrorCategory::Fatal);
        assert_eq!(payload.message, "page has no document element");
    }

    #[test]
    fn fatal_helper_stamps_timestamp() {
        match ExtractError::fatal("boom") {
            ExtractError::Fatal { timestamp, .. } => assert!(timestamp > 0),
            other => panic!("expected fatal error, got {other:?}"),
        }
    }

    #[test]
    fn config_payload_uses_default_remediation() {
        let err = ExtractError::Config("Some other config issue".to_string());
        let remediation = err.to_payload().remediation.unwrap_or_default();
        assert!(
            remediation.contains("Check flags/paths"),
            "expected default remediation for generic config errors"
        );
    }
}

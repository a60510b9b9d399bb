use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::ErrorPayload;
use crate::types::Snapshot;

/// Schema version for output payloads.
pub const PSE_OUTPUT_VERSION: &str = "0.1.0";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "kebab-case")]
pub enum PseOutput {
    Extract(ExtractOutput),
    Error(ErrorOutput),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    /// A capture JSON file on disk.
    Capture,
    /// A live URL rendered through Playwright.
    Url,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceDescriptor {
    pub kind: SourceKind,
    pub value: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractOutput {
    pub version: String,
    pub source: SourceDescriptor,
    /// Where the page capture was written, when requested.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub capture_path: Option<PathBuf>,
    pub snapshot: Snapshot,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorOutput {
    pub version: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub error: ErrorPayload,
}

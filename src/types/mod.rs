//! Core types used throughout the extractor.
//!
//! - [`geometry`] - viewport and element rectangles
//! - [`snapshot`] - the extraction output and its sections

pub mod geometry;
pub mod snapshot;

pub use geometry::{Rect, Viewport, ViewportParseError};
pub use snapshot::{
    AnimationEntry, ColorScheme, ElementStyles, ExtractionIssue, ExtractionStats, FontMetrics,
    IssueKind, KeyframeEntry, LayoutInfo, MediaQueryEntry, MediaRuleEntry, PhaseTimings,
    Snapshot, SnapshotMetadata, StyleMap, Typography,
};

use std::time::{SystemTime, UNIX_EPOCH};

/// Milliseconds since the Unix epoch.
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}

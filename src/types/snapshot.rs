//! The snapshot produced by one extraction pass.
//!
//! A [`Snapshot`] is created fresh for every call to
//! [`StyleExtractor::extract_snapshot`](crate::StyleExtractor::extract_snapshot),
//! filled in by the pipeline, pruned, and handed to the caller. Field names
//! serialize in camelCase.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::geometry::Viewport;

/// Property name to validated value, scoped to one element, pseudo-element
/// or selector.
pub type StyleMap = BTreeMap<String, String>;

/// Filtered styles of one element (or one of its pseudo-elements).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ElementStyles {
    #[serde(flatten)]
    pub styles: StyleMap,
    /// Every `url(...)` referenced by a non-`none` `background-image`.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub background_image_urls: Vec<String>,
}

impl ElementStyles {
    pub fn is_empty(&self) -> bool {
        self.styles.is_empty()
    }
}

/// One selector's declarations inside a media query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaRuleEntry {
    pub selector: String,
    pub styles: StyleMap,
}

/// All rules collected under one normalized media condition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaQueryEntry {
    pub normalized_query: String,
    pub rules: Vec<MediaRuleEntry>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyframeEntry {
    pub key_text: String,
    pub style: StyleMap,
}

/// A `@keyframes` block that some element actually references.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnimationEntry {
    pub name: String,
    pub keyframes: Vec<KeyframeEntry>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ColorScheme {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub background_color: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text_color: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub link_color: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub accent_color: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color_scheme: Option<String>,
}

impl ColorScheme {
    pub fn is_empty(&self) -> bool {
        self.background_color.is_none()
            && self.text_color.is_none()
            && self.link_color.is_none()
            && self.accent_color.is_none()
            && self.color_scheme.is_none()
    }
}

/// Font metrics of one element kind.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FontMetrics {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub font_family: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub font_size: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub font_weight: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line_height: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub letter_spacing: Option<String>,
}

impl FontMetrics {
    pub fn is_empty(&self) -> bool {
        self.font_family.is_none()
            && self.font_size.is_none()
            && self.font_weight.is_none()
            && self.line_height.is_none()
            && self.letter_spacing.is_none()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Typography {
    /// Base metrics of `<body>`.
    #[serde(flatten)]
    pub base: FontMetrics,
    /// Metrics of a synthetic `h1`..`h6`, keyed by tag.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub headings: BTreeMap<String, FontMetrics>,
}

impl Typography {
    pub fn is_empty(&self) -> bool {
        self.base.is_empty() && self.headings.is_empty()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LayoutInfo {
    pub viewport: Viewport,
    pub document_width: f64,
    pub document_height: f64,
    /// Distinct `grid-template-columns` / `grid-template-rows` values in use.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub grid_templates: Vec<String>,
    pub uses_flexbox: bool,
    pub uses_grid: bool,
}

/// Recoverable failure kinds recorded in [`Snapshot::errors`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueKind {
    StylesheetAccess,
    StylesheetFetch,
    StylesheetProcessing,
    ElementProcessing,
    ThemeExtraction,
}

impl IssueKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            IssueKind::StylesheetAccess => "stylesheet_access",
            IssueKind::StylesheetFetch => "stylesheet_fetch",
            IssueKind::StylesheetProcessing => "stylesheet_processing",
            IssueKind::ElementProcessing => "element_processing",
            IssueKind::ThemeExtraction => "theme_extraction",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractionIssue {
    #[serde(rename = "type")]
    pub kind: IssueKind,
    pub message: String,
    /// Selector, URL or element identifier the failure relates to.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractionStats {
    pub stylesheets: usize,
    pub stylesheets_fetched: usize,
    pub stylesheets_failed: usize,
    pub important_rules: usize,
    pub candidates: usize,
    pub offscreen_skipped: usize,
    pub elements_processed: usize,
    pub elements_kept: usize,
    pub pseudo_elements_kept: usize,
}

/// Wall-clock duration of each pipeline phase, in milliseconds.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PhaseTimings {
    pub stylesheets: f64,
    pub elements: f64,
    pub theme: f64,
    pub total: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotMetadata {
    pub extracted_at: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    pub viewport: Viewport,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
    pub stats: ExtractionStats,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub performance: Option<PhaseTimings>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub computed_styles: BTreeMap<String, ElementStyles>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub important_rules: BTreeMap<String, StyleMap>,
    #[serde(default)]
    pub media_queries: Vec<MediaQueryEntry>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub animations: BTreeMap<String, AnimationEntry>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color_scheme: Option<ColorScheme>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub typography: Option<Typography>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub layout_info: Option<LayoutInfo>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub custom_properties: BTreeMap<String, String>,
    #[serde(default)]
    pub errors: Vec<ExtractionIssue>,
    pub metadata: SnapshotMetadata,
}

impl Snapshot {
    pub fn new(metadata: SnapshotMetadata) -> Self {
        Self {
            metadata,
            ..Self::default()
        }
    }

    pub fn record_issue(
        &mut self,
        kind: IssueKind,
        message: impl Into<String>,
        context: Option<String>,
    ) {
        let issue = ExtractionIssue {
            kind,
            message: message.into(),
            context,
        };
        tracing::warn!(
            kind = issue.kind.as_str(),
            context = issue.context.as_deref().unwrap_or(""),
            "{}",
            issue.message
        );
        self.errors.push(issue);
    }

    pub fn issues_of(&self, kind: IssueKind) -> impl Iterator<Item = &ExtractionIssue> {
        self.errors.iter().filter(move |issue| issue.kind == kind)
    }

    /// Drops empty style maps and empty summary sections.
    pub fn prune(&mut self) {
        self.computed_styles.retain(|_, entry| !entry.is_empty());
        self.important_rules.retain(|_, styles| !styles.is_empty());
        if self.color_scheme.as_ref().is_some_and(ColorScheme::is_empty) {
            self.color_scheme = None;
        }
        if self.typography.as_ref().is_some_and(Typography::is_empty) {
            self.typography = None;
        }
    }
}

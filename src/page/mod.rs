//! Page access for the extractor.
//!
//! The extractor never talks to a browser directly. It reads the element tree
//! and resolved styles through [`StyleSource`] and the page's stylesheets
//! through [`StylesheetSource`]. [`CapturedPage`] implements both from a JSON
//! capture produced by the Playwright capture script.

mod captured;

pub use captured::{CapturedElement, CapturedPage, DocumentSize, CAPTURE_VERSION};

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use thiserror::Error;

use crate::css::{CssRule, Declaration};
use crate::types::{Rect, Viewport};

/// Index of an element inside one page.
pub type ElementId = usize;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PageError {
    #[error("unknown element {0}")]
    UnknownElement(ElementId),

    #[error("resolved style unavailable for element {element}: {reason}")]
    StyleUnavailable { element: ElementId, reason: String },

    #[error("no default style known for <{0}>")]
    UnknownTag(String),

    #[error("page has no <{0}> element")]
    MissingElement(&'static str),
}

/// Generated pseudo-elements whose styles are captured.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PseudoElement {
    Before,
    After,
}

impl PseudoElement {
    pub const ALL: [PseudoElement; 2] = [PseudoElement::Before, PseudoElement::After];

    pub fn selector(&self) -> &'static str {
        match self {
            PseudoElement::Before => "::before",
            PseudoElement::After => "::after",
        }
    }
}

/// A resolved style view: every active property with its resolved value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResolvedStyle {
    properties: BTreeMap<String, String>,
}

impl ResolvedStyle {
    pub fn len(&self) -> usize {
        self.properties.len()
    }

    pub fn is_empty(&self) -> bool {
        self.properties.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.properties
            .iter()
            .map(|(name, value)| (name.as_str(), value.as_str()))
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.properties.get(name).map(String::as_str)
    }

    /// Mirrors `getPropertyValue`: an absent property reads as the empty string.
    pub fn property_value(&self, name: &str) -> &str {
        self.get(name).unwrap_or("")
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for ResolvedStyle {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            properties: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

/// DOM and style resolution for one page.
pub trait StyleSource {
    /// The `<html>` element.
    fn document_element(&self) -> Option<ElementId>;

    fn body(&self) -> Option<ElementId>;

    /// Every element, in document order.
    fn elements(&self) -> Vec<ElementId>;

    /// Lower-cased tag name.
    fn tag_name(&self, element: ElementId) -> Option<&str>;

    fn attribute(&self, element: ElementId, name: &str) -> Option<&str>;

    fn attribute_names(&self, element: ElementId) -> Vec<&str>;

    fn parent(&self, element: ElementId) -> Option<ElementId>;

    /// Element children, in document order.
    fn children(&self, element: ElementId) -> &[ElementId];

    /// Concatenated text of the element's own text nodes.
    fn direct_text(&self, element: ElementId) -> Option<&str>;

    /// Declarations of the element's `style` attribute.
    fn inline_style(&self, element: ElementId) -> &[Declaration];

    fn computed_style(
        &self,
        element: ElementId,
        pseudo: Option<PseudoElement>,
    ) -> Result<Arc<ResolvedStyle>, PageError>;

    /// Border box in viewport coordinates, or `None` when the element has no
    /// layout box.
    fn bounding_rect(&self, element: ElementId) -> Option<Rect>;

    fn viewport(&self) -> Viewport;

    fn document_size(&self) -> DocumentSize;

    fn url(&self) -> Option<&str>;

    fn user_agent(&self) -> Option<&str> {
        None
    }

    /// Creates a detached, unstyled element of `tag` used to read that tag's
    /// default style. Callers go through [`ProbeElement`].
    fn create_probe(&self, tag: &str) -> Result<ElementId, PageError>;

    fn remove_probe(&self, probe: ElementId);

    fn classes(&self, element: ElementId) -> Vec<&str> {
        self.attribute(element, "class")
            .map(|class| class.split_whitespace().collect())
            .unwrap_or_default()
    }
}

/// Access to the stylesheets attached to a page.
pub trait StylesheetSource {
    fn stylesheets(&self) -> &[StylesheetHandle];
}

/// A page the extractor can run against.
pub trait Page: StyleSource + StylesheetSource {}

impl<T: StyleSource + StylesheetSource + ?Sized> Page for T {}

/// One stylesheet as seen from the page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StylesheetHandle {
    /// Origin URL for external sheets, `None` for inline `<style>` blocks.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub href: Option<String>,
    /// Parsed rules, absent when the page was not allowed to read them.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rules: Option<Vec<CssRule>>,
    /// Why reading the rules failed (e.g. `SecurityError`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_error: Option<String>,
}

impl StylesheetHandle {
    pub fn readable(href: Option<String>, rules: Vec<CssRule>) -> Self {
        Self {
            href,
            rules: Some(rules),
            access_error: None,
        }
    }

    pub fn denied(href: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            href: Some(href.into()),
            rules: None,
            access_error: Some(reason.into()),
        }
    }

    /// The rule list, or the reason it cannot be read.
    pub fn access(&self) -> Result<&[CssRule], String> {
        match (&self.rules, &self.access_error) {
            (Some(rules), None) => Ok(rules),
            (_, Some(reason)) => Err(reason.clone()),
            (None, None) => Err("stylesheet exposes no rule list".to_string()),
        }
    }
}

/// A probe element that is removed from the page when dropped, on every exit
/// path.
pub struct ProbeElement<'a, S: StyleSource + ?Sized> {
    source: &'a S,
    id: ElementId,
}

impl<'a, S: StyleSource + ?Sized> ProbeElement<'a, S> {
    pub fn acquire(source: &'a S, tag: &str) -> Result<Self, PageError> {
        let id = source.create_probe(tag)?;
        Ok(Self { source, id })
    }

    pub fn computed_style(&self) -> Result<Arc<ResolvedStyle>, PageError> {
        self.source.computed_style(self.id, None)
    }
}

impl<S: StyleSource + ?Sized> Drop for ProbeElement<'_, S> {
    fn drop(&mut self) {
        self.source.remove_probe(self.id);
    }
}

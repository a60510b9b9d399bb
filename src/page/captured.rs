//! In-memory page built from a JSON capture.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use super::{
    ElementId, PageError, PseudoElement, ResolvedStyle, StyleSource, StylesheetHandle,
    StylesheetSource,
};
use crate::css::Declaration;
use crate::types::{Rect, Viewport};
use crate::{ExtractError, Result};

/// Schema version written by the capture script.
pub const CAPTURE_VERSION: &str = "1";

fn default_version() -> String {
    CAPTURE_VERSION.to_string()
}

/// Scrollable extent of the document.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentSize {
    pub width: f64,
    pub height: f64,
}

/// One element of a captured page.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CapturedElement {
    pub tag: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub attributes: BTreeMap<String, String>,
    #[serde(default)]
    pub parent: Option<ElementId>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<ElementId>,
    /// Text of the element's own text nodes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub inline_style: Vec<Declaration>,
    /// `None` when the element had no layout box.
    #[serde(default)]
    pub rect: Option<Rect>,
    #[serde(default)]
    pub style: Arc<ResolvedStyle>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub before: Option<Arc<ResolvedStyle>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub after: Option<Arc<ResolvedStyle>>,
}

/// A page captured by the Playwright capture script (or built by hand).
///
/// Element ids are indices into [`CapturedPage::elements`]. Probe elements get
/// ids past the end of that list and resolve to the tag's default style.
#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CapturedPage {
    #[serde(default = "default_version")]
    pub version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
    #[serde(default)]
    pub viewport: Viewport,
    #[serde(default)]
    pub document_size: DocumentSize,
    /// Index of the `<html>` element.
    #[serde(default)]
    pub root: Option<ElementId>,
    #[serde(default)]
    pub elements: Vec<CapturedElement>,
    /// Resolved style of a bare element of each tag.
    #[serde(default)]
    pub default_styles: BTreeMap<String, Arc<ResolvedStyle>>,
    #[serde(default)]
    pub stylesheets: Vec<StylesheetHandle>,
    #[serde(skip)]
    probes: Mutex<HashMap<ElementId, String>>,
    #[serde(skip)]
    next_probe: AtomicUsize,
}

impl CapturedPage {
    /// Parses and checks a capture.
    pub fn from_json(json: &str) -> Result<Self> {
        let page: CapturedPage = serde_json::from_str(json)?;
        page.check_structure()?;
        Ok(page)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        std::fs::write(path, serde_json::to_string(self)?)?;
        Ok(())
    }

    /// Rejects dangling references, child lists that disagree with the
    /// child's `parent`, and parent cycles.
    pub fn check_structure(&self) -> Result<()> {
        let len = self.elements.len();
        if let Some(root) = self.root {
            if root >= len {
                return Err(ExtractError::capture(format!(
                    "root element {root} is out of range ({len} elements)"
                )));
            }
        }
        for (idx, element) in self.elements.iter().enumerate() {
            let bad_parent = element.parent.filter(|&p| p >= len);
            let bad_child = element.children.iter().find(|&&c| c >= len);
            if let Some(bad) = bad_parent.or(bad_child.copied()) {
                return Err(ExtractError::capture(format!(
                    "element {idx} <{}> references missing element {bad}",
                    element.tag
                )));
            }
            for &child in &element.children {
                if self.elements[child].parent != Some(idx) {
                    return Err(ExtractError::capture(format!(
                        "element {idx} <{}> lists child {child}, whose parent is {:?}",
                        element.tag, self.elements[child].parent
                    )));
                }
            }
        }

        // Every parent chain must end at a parentless element.
        let mut reaches_root = vec![false; len];
        for start in 0..len {
            let mut chain = Vec::new();
            let mut on_chain = HashSet::new();
            let mut current = Some(start);
            while let Some(id) = current {
                if reaches_root[id] {
                    break;
                }
                if !on_chain.insert(id) {
                    return Err(ExtractError::capture(format!(
                        "element {start} <{}> has a cyclic parent chain",
                        self.elements[start].tag
                    )));
                }
                chain.push(id);
                current = self.elements[id].parent;
            }
            for id in chain {
                reaches_root[id] = true;
            }
        }
        Ok(())
    }

    /// Probe elements currently alive.
    pub fn live_probes(&self) -> usize {
        self.probes.lock().map(|p| p.len()).unwrap_or(0)
    }

    fn element(&self, id: ElementId) -> Option<&CapturedElement> {
        self.elements.get(id)
    }
}

impl StyleSource for CapturedPage {
    fn document_element(&self) -> Option<ElementId> {
        self.root.or_else(|| {
            self.elements
                .iter()
                .position(|el| el.parent.is_none() && el.tag.eq_ignore_ascii_case("html"))
        })
    }

    fn body(&self) -> Option<ElementId> {
        let root = self.document_element()?;
        self.children(root)
            .iter()
            .copied()
            .find(|&child| self.tag_name(child) == Some("body"))
    }

    fn elements(&self) -> Vec<ElementId> {
        let Some(root) = self.document_element() else {
            return (0..self.elements.len()).collect();
        };
        let mut order = Vec::with_capacity(self.elements.len());
        let mut stack = vec![root];
        while let Some(id) = stack.pop() {
            order.push(id);
            stack.extend(self.children(id).iter().rev().copied());
        }
        order
    }

    fn tag_name(&self, element: ElementId) -> Option<&str> {
        self.element(element).map(|el| el.tag.as_str())
    }

    fn attribute(&self, element: ElementId, name: &str) -> Option<&str> {
        self.element(element)?
            .attributes
            .get(name)
            .map(String::as_str)
    }

    fn attribute_names(&self, element: ElementId) -> Vec<&str> {
        self.element(element)
            .map(|el| el.attributes.keys().map(String::as_str).collect())
            .unwrap_or_default()
    }

    fn parent(&self, element: ElementId) -> Option<ElementId> {
        self.element(element)?.parent
    }

    fn children(&self, element: ElementId) -> &[ElementId] {
        self.element(element)
            .map(|el| el.children.as_slice())
            .unwrap_or(&[])
    }

    fn direct_text(&self, element: ElementId) -> Option<&str> {
        self.element(element)?.text.as_deref()
    }

    fn inline_style(&self, element: ElementId) -> &[Declaration] {
        self.element(element)
            .map(|el| el.inline_style.as_slice())
            .unwrap_or(&[])
    }

    fn computed_style(
        &self,
        element: ElementId,
        pseudo: Option<PseudoElement>,
    ) -> std::result::Result<Arc<ResolvedStyle>, PageError> {
        if let Some(el) = self.element(element) {
            let style = match pseudo {
                None => Some(&el.style),
                Some(PseudoElement::Before) => el.before.as_ref(),
                Some(PseudoElement::After) => el.after.as_ref(),
            };
            return Ok(style.cloned().unwrap_or_default());
        }

        let tag = self
            .probes
            .lock()
            .ok()
            .and_then(|probes| probes.get(&element).cloned())
            .ok_or(PageError::UnknownElement(element))?;
        if pseudo.is_some() {
            return Ok(Arc::default());
        }
        self.default_styles
            .get(&tag)
            .cloned()
            .ok_or(PageError::UnknownTag(tag))
    }

    fn bounding_rect(&self, element: ElementId) -> Option<Rect> {
        self.element(element)?.rect
    }

    fn viewport(&self) -> Viewport {
        self.viewport
    }

    fn document_size(&self) -> DocumentSize {
        self.document_size
    }

    fn url(&self) -> Option<&str> {
        self.url.as_deref()
    }

    fn user_agent(&self) -> Option<&str> {
        self.user_agent.as_deref()
    }

    fn create_probe(&self, tag: &str) -> std::result::Result<ElementId, PageError> {
        let tag = tag.to_ascii_lowercase();
        if !self.default_styles.contains_key(&tag) {
            return Err(PageError::UnknownTag(tag));
        }
        let id = self.elements.len() + self.next_probe.fetch_add(1, Ordering::Relaxed);
        if let Ok(mut probes) = self.probes.lock() {
            probes.insert(id, tag);
        }
        Ok(id)
    }

    fn remove_probe(&self, probe: ElementId) {
        if let Ok(mut probes) = self.probes.lock() {
            probes.remove(&probe);
        }
    }
}

impl StylesheetSource for CapturedPage {
    fn stylesheets(&self) -> &[StylesheetHandle] {
        &self.stylesheets
    }
}

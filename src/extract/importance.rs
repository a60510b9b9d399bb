//! Heuristic relevance filter for elements.
//!
//! False positives and negatives are acceptable: the classifier only decides
//! which elements are worth the cost of style filtering. Every list is
//! tunable through [`ImportanceConfig`](crate::config::ImportanceConfig).

use crate::config::ImportanceConfig;
use crate::page::{ElementId, StyleSource};

/// Tags that never render content of their own.
pub const NON_RENDERING_TAGS: &[&str] = &["script", "style", "meta", "link", "noscript", "iframe"];

pub const SEMANTIC_TAGS: &[&str] = &[
    "header", "footer", "nav", "main", "article", "section", "aside", "form", "h1", "h2", "h3",
    "h4", "h5", "h6", "button", "input", "textarea", "select", "img", "a",
];

pub const INTERACTION_ATTRIBUTES: &[&str] = &[
    "role",
    "aria-label",
    "aria-labelledby",
    "aria-describedby",
    "tabindex",
];

/// Substrings of `id`/`class` that suggest a structural element.
pub const STRUCTURAL_KEYWORDS: &[&str] = &[
    "header", "footer", "nav", "main", "content", "container", "wrapper", "layout", "banner",
    "hero", "product", "item", "card", "list", "grid", "-root", "-main", "-primary",
    "-container", "-item",
];

pub const DEFAULT_TEXT_LENGTH_THRESHOLD: usize = 20;

const MIN_VISIBLE_OPACITY: f64 = 0.1;

#[derive(Debug, Clone)]
pub struct ImportanceRules {
    semantic_tags: Vec<String>,
    keywords: Vec<String>,
    text_length_threshold: usize,
}

impl Default for ImportanceRules {
    fn default() -> Self {
        Self {
            semantic_tags: SEMANTIC_TAGS.iter().map(|t| t.to_string()).collect(),
            keywords: STRUCTURAL_KEYWORDS.iter().map(|k| k.to_string()).collect(),
            text_length_threshold: DEFAULT_TEXT_LENGTH_THRESHOLD,
        }
    }
}

impl ImportanceRules {
    pub fn from_config(config: &ImportanceConfig) -> Self {
        let mut rules = Self {
            text_length_threshold: config.text_length_threshold,
            ..Self::default()
        };
        rules.semantic_tags.extend(
            config
                .extra_semantic_tags
                .iter()
                .map(|t| t.to_ascii_lowercase()),
        );
        rules
            .keywords
            .extend(config.extra_keywords.iter().map(|k| k.to_ascii_lowercase()));
        rules
    }

    fn is_semantic_tag(&self, tag: &str) -> bool {
        self.semantic_tags.iter().any(|t| t == tag)
    }

    fn has_structural_name<S: StyleSource + ?Sized>(&self, page: &S, element: ElementId) -> bool {
        let id = page.attribute(element, "id").unwrap_or("");
        let class = page.attribute(element, "class").unwrap_or("");
        if id.is_empty() && class.is_empty() {
            return false;
        }
        let names = format!("{id} {class}").to_ascii_lowercase();
        self.keywords.iter().any(|kw| names.contains(kw.as_str()))
    }

    /// Whether the element produces a visible box at all.
    pub fn is_rendered<S: StyleSource + ?Sized>(&self, page: &S, element: ElementId) -> bool {
        let Some(tag) = page.tag_name(element) else {
            return false;
        };
        if NON_RENDERING_TAGS.contains(&tag) {
            return false;
        }
        if page.bounding_rect(element).is_none() {
            return false;
        }
        let Ok(style) = page.computed_style(element, None) else {
            return false;
        };
        if style.property_value("display") == "none"
            || style.property_value("visibility") == "hidden"
        {
            return false;
        }
        !style
            .get("opacity")
            .and_then(|o| o.trim().parse::<f64>().ok())
            .is_some_and(|opacity| opacity < MIN_VISIBLE_OPACITY)
    }

    pub fn is_important<S: StyleSource + ?Sized>(&self, page: &S, element: ElementId) -> bool {
        if !self.is_rendered(page, element) {
            return false;
        }

        let attributes = page.attribute_names(element);
        if attributes.iter().any(|name| name.starts_with("on")) {
            return true;
        }
        if attributes
            .iter()
            .any(|name| INTERACTION_ATTRIBUTES.contains(name))
        {
            return true;
        }
        if page
            .tag_name(element)
            .is_some_and(|tag| self.is_semantic_tag(tag))
        {
            return true;
        }
        if self.has_structural_name(page, element) {
            return true;
        }
        page.direct_text(element)
            .is_some_and(|text| text.trim().chars().count() > self.text_length_threshold)
    }

    /// The targeted pre-selection used before ranking: semantic tags,
    /// structural names and elements with an explicit `role`.
    pub fn is_candidate<S: StyleSource + ?Sized>(&self, page: &S, element: ElementId) -> bool {
        page.tag_name(element)
            .is_some_and(|tag| self.is_semantic_tag(tag))
            || page.attribute(element, "role").is_some()
            || self.has_structural_name(page, element)
    }
}

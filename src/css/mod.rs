//! CSS rule model, validation, selector matching and media query handling.
//!
//! - [`validator`] - property whitelist and value validators
//! - [`selector`] - selector parsing and matching against a page
//! - [`parser`] - stylesheet text to [`CssRule`]s
//! - [`media`] - media query normalization and de-duplication

pub mod media;
pub mod parser;
pub mod selector;
pub mod validator;

use serde::{Deserialize, Serialize};

pub use media::{dedupe_media_queries, normalize_media_query, MediaQueryBook};
pub use parser::{parse_declarations, parse_stylesheet};
pub use selector::{SelectorComplexity, SelectorList};
pub use validator::{is_valid_property, standard_property, validate_value, ValidatedValue};

/// A single `name: value [!important]` declaration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Declaration {
    pub name: String,
    pub value: String,
    #[serde(default)]
    pub important: bool,
}

impl Declaration {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            important: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StyleRule {
    pub selector_text: String,
    #[serde(default)]
    pub declarations: Vec<Declaration>,
}

impl StyleRule {
    pub fn has_important(&self) -> bool {
        self.declarations.iter().any(|decl| decl.important)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaRule {
    pub condition_text: String,
    #[serde(default)]
    pub rules: Vec<CssRule>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Keyframe {
    pub key_text: String,
    #[serde(default)]
    pub declarations: Vec<Declaration>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyframesRule {
    pub name: String,
    #[serde(default)]
    pub keyframes: Vec<Keyframe>,
}

/// The rule kinds the extractor understands; everything else is `Other`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum CssRule {
    Style(StyleRule),
    Media(MediaRule),
    Keyframes(KeyframesRule),
    Other {
        #[serde(default, rename = "atRule")]
        at_rule: String,
    },
}

//! Property whitelist and value validation.
//!
//! The whitelist bounds which properties make it into a snapshot; the value
//! validators catch garbage values for the property families where a cheap
//! syntactic check is possible. Everything else is accepted on purpose so
//! that legitimate modern CSS is not silently dropped.

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashSet;

/// Properties worth keeping, in their unprefixed form.
pub const PROPERTY_WHITELIST: &[&str] = &[
    // Layout
    "display", "position", "top", "right", "bottom", "left", "float", "clear",
    "width", "height", "min-width", "max-width", "min-height", "max-height",
    "margin", "margin-top", "margin-right", "margin-bottom", "margin-left",
    "padding", "padding-top", "padding-right", "padding-bottom", "padding-left",
    // Box model
    "border", "border-width", "border-style", "border-color",
    "border-top", "border-right", "border-bottom", "border-left",
    "border-radius", "box-shadow", "box-sizing", "outline",
    // Typography
    "color", "font-family", "font-size", "font-weight", "font-style",
    "line-height", "letter-spacing", "text-align", "text-decoration",
    "text-transform", "white-space", "word-break", "word-wrap",
    // Visual
    "background", "background-color", "background-image",
    "background-position", "background-repeat", "background-size",
    "opacity", "visibility", "z-index", "overflow", "overflow-x", "overflow-y",
    // Flexbox
    "flex", "flex-basis", "flex-direction", "flex-flow", "flex-grow",
    "flex-shrink", "flex-wrap", "justify-content", "align-items",
    "align-content", "align-self", "order",
    // Grid
    "grid", "grid-template-columns", "grid-template-rows",
    "grid-template-areas", "grid-area", "grid-column", "grid-row",
    "gap", "grid-gap", "grid-column-gap", "grid-row-gap",
    // Transforms and transitions
    "transform", "transform-origin", "transition", "transition-property",
    "transition-duration", "transition-timing-function", "transition-delay",
    // Animation
    "animation", "animation-name", "animation-duration",
    "animation-timing-function", "animation-delay", "animation-iteration-count",
    "animation-direction", "animation-fill-mode", "animation-play-state",
    // Generated content
    "content",
    // Misc
    "cursor", "pointer-events", "user-select",
];

static WHITELIST: Lazy<HashSet<&'static str>> =
    Lazy::new(|| PROPERTY_WHITELIST.iter().copied().collect());

static VENDOR_PREFIX: Lazy<Regex> = Lazy::new(|| Regex::new(r"^-(webkit|moz|ms|o)-").unwrap());

static DIMENSION_PROPERTY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(width|height|top|right|bottom|left|margin|padding|min-|max-)").unwrap());
static COLOR_PROPERTY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"color$|background(-color)?$|border(-color)?$").unwrap());
static BORDER_STYLE_PROPERTY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^border(-.*)?-style$").unwrap());
static OVERFLOW_PROPERTY: Lazy<Regex> = Lazy::new(|| Regex::new(r"^overflow(-[xy])?$").unwrap());

static NUMERIC_WITH_UNIT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^-?\d*\.?\d+(px|em|rem|%|vh|vw|vmin|vmax|ch|ex|cm|mm|in|pt|pc)$").unwrap()
});
static CALC: Lazy<Regex> = Lazy::new(|| Regex::new(r"^calc\(.+\)$").unwrap());

static HEX_COLOR: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^#([0-9a-f]{3}|[0-9a-f]{4}|[0-9a-f]{6}|[0-9a-f]{8})$").unwrap()
});
static RGB_COLOR: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^rgb\(\s*\d+\s*,\s*\d+\s*,\s*\d+\s*\)$").unwrap());
static RGBA_COLOR: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^rgba\(\s*\d+\s*,\s*\d+\s*,\s*\d+\s*,\s*[0-1]?\.?\d+\s*\)$").unwrap()
});
static HSL_COLOR: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^hsl\(\s*\d+\s*,\s*\d+%\s*,\s*\d+%\s*\)$").unwrap());
static HSLA_COLOR: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^hsla\(\s*\d+\s*,\s*\d+%\s*,\s*\d+%\s*,\s*[0-1]?\.?\d+\s*\)$").unwrap()
});

static TRANSFORM_FUNCTION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(matrix|translate|scale|rotate|skew|perspective)").unwrap());

const DISPLAY_VALUES: &[&str] = &[
    "none", "block", "inline", "inline-block", "flex", "inline-flex", "grid", "inline-grid",
    "table", "table-cell", "table-row", "inline-table", "list-item", "flow-root", "contents",
];
const POSITION_VALUES: &[&str] = &["static", "relative", "absolute", "fixed", "sticky"];
const FONT_WEIGHT_KEYWORDS: &[&str] = &["normal", "bold", "lighter", "bolder"];
const BORDER_STYLE_VALUES: &[&str] = &[
    "none", "hidden", "solid", "dashed", "dotted", "double", "groove", "ridge", "inset", "outset",
];
const TEXT_ALIGN_VALUES: &[&str] = &[
    "left", "right", "center", "justify", "start", "end", "match-parent", "-moz-center",
    "-webkit-center",
];
const OVERFLOW_VALUES: &[&str] = &["visible", "hidden", "scroll", "auto", "clip"];
const VISIBILITY_VALUES: &[&str] = &["visible", "hidden", "collapse"];
const FLEX_DIRECTION_VALUES: &[&str] = &["row", "row-reverse", "column", "column-reverse"];
const FLEX_WRAP_VALUES: &[&str] = &["nowrap", "wrap", "wrap-reverse"];

/// Outcome of validating one declaration value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidatedValue {
    /// Keep the original value.
    Accept,
    /// Keep the declaration, but with this value instead.
    Corrected(String),
    /// Drop the declaration.
    Reject,
}

impl ValidatedValue {
    pub fn is_rejected(&self) -> bool {
        matches!(self, ValidatedValue::Reject)
    }

    /// The value to store, or `None` when the declaration must be dropped.
    pub fn resolve(self, original: &str) -> Option<String> {
        match self {
            ValidatedValue::Accept => Some(original.to_string()),
            ValidatedValue::Corrected(value) => Some(value),
            ValidatedValue::Reject => None,
        }
    }
}

impl From<bool> for ValidatedValue {
    fn from(valid: bool) -> Self {
        if valid {
            ValidatedValue::Accept
        } else {
            ValidatedValue::Reject
        }
    }
}

/// Strips a recognized vendor prefix (`-webkit-`, `-moz-`, `-ms-`, `-o-`).
pub fn standard_property(name: &str) -> &str {
    match VENDOR_PREFIX.find(name) {
        Some(prefix) => &name[prefix.end()..],
        None => name,
    }
}

pub fn has_vendor_prefix(name: &str) -> bool {
    VENDOR_PREFIX.is_match(name)
}

pub fn is_valid_property(name: &str) -> bool {
    WHITELIST.contains(standard_property(&name.to_ascii_lowercase()))
}

fn is_numeric_value(value: &str) -> bool {
    value == "auto" || value == "0" || NUMERIC_WITH_UNIT.is_match(value) || CALC.is_match(value)
}

fn is_color_value(value: &str) -> bool {
    value == "transparent"
        || value.eq_ignore_ascii_case("currentcolor")
        || HEX_COLOR.is_match(value)
        || RGB_COLOR.is_match(value)
        || RGBA_COLOR.is_match(value)
        || HSL_COLOR.is_match(value)
        || HSLA_COLOR.is_match(value)
}

fn is_font_weight(value: &str) -> bool {
    if FONT_WEIGHT_KEYWORDS.contains(&value) {
        return true;
    }
    match value.parse::<u32>() {
        Ok(weight) => (100..=900).contains(&weight) && weight % 100 == 0,
        Err(_) => false,
    }
}

fn is_opacity(value: &str) -> bool {
    match value.parse::<f64>() {
        Ok(alpha) => (0.0..=1.0).contains(&alpha),
        Err(_) => false,
    }
}

fn is_z_index(value: &str) -> bool {
    value == "auto" || value.parse::<i64>().is_ok()
}

/// Validates `value` for `property`. Property families are tried in a fixed
/// order and the first family that claims the property decides.
pub fn validate_value(property: &str, value: &str) -> ValidatedValue {
    let value = value.trim();
    if value.is_empty() || matches!(value, "initial" | "inherit" | "unset") {
        return ValidatedValue::Accept;
    }

    let prop = property.to_ascii_lowercase();
    let prop = prop.as_str();

    if DIMENSION_PROPERTY.is_match(prop) {
        let none_allowed = matches!(prop, "max-width" | "max-height") && value == "none";
        return (none_allowed || is_numeric_value(value)).into();
    }
    if COLOR_PROPERTY.is_match(prop) {
        if value == "none" {
            return ValidatedValue::Corrected("transparent".to_string());
        }
        return is_color_value(value).into();
    }
    match prop {
        "display" => return DISPLAY_VALUES.contains(&value).into(),
        "position" => return POSITION_VALUES.contains(&value).into(),
        "font-weight" => return is_font_weight(value).into(),
        "opacity" => return is_opacity(value).into(),
        _ => {}
    }
    if BORDER_STYLE_PROPERTY.is_match(prop) {
        return BORDER_STYLE_VALUES.contains(&value).into();
    }
    if prop == "text-align" {
        return TEXT_ALIGN_VALUES.contains(&value).into();
    }
    if OVERFLOW_PROPERTY.is_match(prop) {
        return OVERFLOW_VALUES.contains(&value).into();
    }
    match prop {
        "visibility" => VISIBILITY_VALUES.contains(&value).into(),
        "z-index" => is_z_index(value).into(),
        "transform" => (value == "none" || TRANSFORM_FUNCTION.is_match(value)).into(),
        "flex-direction" => FLEX_DIRECTION_VALUES.contains(&value).into(),
        "flex-wrap" => FLEX_WRAP_VALUES.contains(&value).into(),
        _ if prop.starts_with("flex-") => ValidatedValue::Accept,
        _ => {
            tracing::debug!(property = prop, value, "accepting value without a validator");
            ValidatedValue::Accept
        }
    }
}

//! Reduces an element's resolved style to the declarations that matter.

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashMap;
use std::sync::Arc;

use crate::css::validator::has_vendor_prefix;
use crate::css::{is_valid_property, standard_property, validate_value, Declaration};
use crate::page::{ElementId, PageError, ProbeElement, ResolvedStyle, StyleSource};
use crate::types::{ElementStyles, StyleMap};

static CSS_URL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"url\(\s*(?:"([^"]*)"|'([^']*)'|([^)'"]*?))\s*\)"#).unwrap()
});

/// Root font size assumed when the document's cannot be read.
pub const DEFAULT_ROOT_FONT_SIZE: f64 = 16.0;

const FONT_SIZE_TOLERANCE: f64 = 0.1;

/// Per-extraction cache of each tag's bare-element style.
#[derive(Debug, Default)]
pub struct DefaultStyleCache {
    by_tag: HashMap<String, Arc<ResolvedStyle>>,
}

impl DefaultStyleCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the cached default style for `tag`, reading it from a
    /// short-lived probe element on first use.
    pub fn get_or_probe<S: StyleSource + ?Sized>(
        &mut self,
        page: &S,
        tag: &str,
    ) -> Result<Arc<ResolvedStyle>, PageError> {
        let tag = tag.to_ascii_lowercase();
        if let Some(style) = self.by_tag.get(&tag) {
            return Ok(Arc::clone(style));
        }
        let style = {
            let probe = ProbeElement::acquire(page, &tag)?;
            probe.computed_style()?
        };
        self.by_tag.insert(tag, Arc::clone(&style));
        Ok(style)
    }
}

/// What a resolved style is compared against.
#[derive(Debug, Clone, Copy)]
pub struct FilterContext<'a> {
    /// Style of a bare element with the same tag.
    pub defaults: Option<&'a ResolvedStyle>,
    /// Resolved style of the parent element.
    pub parent: Option<&'a ResolvedStyle>,
    /// Root font size in px, used for `rem`.
    pub root_font_size: f64,
}

impl Default for FilterContext<'_> {
    fn default() -> Self {
        Self {
            defaults: None,
            parent: None,
            root_font_size: DEFAULT_ROOT_FONT_SIZE,
        }
    }
}

/// Parses a `px` length (or a bare number) into pixels.
pub fn parse_px(value: &str) -> Option<f64> {
    let value = value.trim();
    value
        .strip_suffix("px")
        .unwrap_or(value)
        .trim()
        .parse::<f64>()
        .ok()
}

fn first_font(stack: &str) -> String {
    stack
        .split(',')
        .next()
        .unwrap_or("")
        .trim()
        .trim_matches(|c| c == '"' || c == '\'')
        .to_ascii_lowercase()
}

/// Resolves an `em`/`rem`/`%` font size to px. `None` for other units.
fn relative_font_size_px(value: &str, parent_px: f64, root_px: f64) -> Option<f64> {
    let value = value.trim();
    let (number, base) = if let Some(n) = value.strip_suffix("rem") {
        (n, root_px)
    } else if let Some(n) = value.strip_suffix("em") {
        (n, parent_px)
    } else if let Some(n) = value.strip_suffix('%') {
        return n.trim().parse::<f64>().ok().map(|pct| pct / 100.0 * parent_px);
    } else {
        return None;
    };
    number.trim().parse::<f64>().ok().map(|factor| factor * base)
}

/// Whether `value` is what the element would inherit from `parent` anyway.
fn matches_parent(property: &str, value: &str, parent: &ResolvedStyle, root_px: f64) -> bool {
    let Some(parent_value) = parent.get(property) else {
        return false;
    };
    match property {
        "font-family" => first_font(value) == first_font(parent_value),
        "font-size" => {
            let parent_px = parse_px(parent_value);
            let resolved = parent_px.and_then(|px| relative_font_size_px(value, px, root_px));
            match (resolved, parent_px) {
                (Some(child), Some(parent)) => (child - parent).abs() <= FONT_SIZE_TOLERANCE,
                _ => value == parent_value,
            }
        }
        _ => value == parent_value,
    }
}

/// Every `url(...)` target referenced by `value`.
pub fn extract_urls(value: &str) -> Vec<String> {
    CSS_URL
        .captures_iter(value)
        .filter_map(|caps| {
            caps.get(1)
                .or_else(|| caps.get(2))
                .or_else(|| caps.get(3))
                .map(|m| m.as_str().trim().to_string())
        })
        .filter(|url| !url.is_empty())
        .collect()
}

fn record_background_urls(styles: &mut ElementStyles, property: &str, value: &str) {
    if property != "background-image" || value.trim() == "none" {
        return;
    }
    for url in extract_urls(value) {
        if !styles.background_image_urls.contains(&url) {
            styles.background_image_urls.push(url);
        }
    }
}

/// Filters a resolved style against tag defaults and the parent, then layers
/// the inline declarations on top.
pub fn filter_styles(
    resolved: &ResolvedStyle,
    inline: &[Declaration],
    context: &FilterContext<'_>,
) -> ElementStyles {
    let mut out = ElementStyles::default();

    for (name, value) in resolved.iter() {
        if !is_valid_property(name) {
            continue;
        }
        let property = standard_property(name);
        if has_vendor_prefix(name) && resolved.get(property).is_some_and(|v| !v.is_empty()) {
            continue;
        }
        if context.defaults.and_then(|d| d.get(name)) == Some(value) {
            continue;
        }
        if context
            .parent
            .is_some_and(|parent| matches_parent(property, value, parent, context.root_font_size))
        {
            continue;
        }
        let Some(value) = validate_value(property, value).resolve(value) else {
            tracing::debug!(property, value, "dropping invalid resolved value");
            continue;
        };
        record_background_urls(&mut out, property, &value);
        out.styles.insert(property.to_string(), value);
    }

    for decl in inline {
        let name = decl.name.to_ascii_lowercase();
        if !is_valid_property(&name) {
            continue;
        }
        let property = standard_property(&name);
        let Some(value) = validate_value(property, &decl.value).resolve(decl.value.trim()) else {
            tracing::debug!(property, value = %decl.value, "dropping invalid inline value");
            continue;
        };
        record_background_urls(&mut out, property, &value);
        out.styles.insert(property.to_string(), value);
    }

    out
}

/// Page-level wrapper over [`filter_styles`] reading the element's inline
/// declarations from the page.
pub fn filter_element<S: StyleSource + ?Sized>(
    page: &S,
    element: ElementId,
    resolved: &ResolvedStyle,
    context: &FilterContext<'_>,
) -> ElementStyles {
    filter_styles(resolved, page.inline_style(element), context)
}

fn has_generated_content(content: &str) -> bool {
    !matches!(
        content.trim(),
        "" | "none" | "normal" | "\"\"" | "''" | "-moz-alt-content"
    )
}

/// Styles of a `::before`/`::after`, or `None` when it generates no content.
/// Properties equal to the base element's resolved style are elided.
pub fn filter_pseudo(pseudo: &ResolvedStyle, base: &ResolvedStyle) -> Option<ElementStyles> {
    let content = pseudo.get("content")?;
    if !has_generated_content(content) {
        return None;
    }

    let mut out = ElementStyles::default();
    for (name, value) in pseudo.iter() {
        if name == "content" || !is_valid_property(name) {
            continue;
        }
        if base.get(name) == Some(value) {
            continue;
        }
        let property = standard_property(name);
        if let Some(value) = validate_value(property, value).resolve(value) {
            record_background_urls(&mut out, property, &value);
            out.styles.insert(property.to_string(), value);
        }
    }
    out.styles.insert("content".to_string(), content.to_string());
    Some(out)
}

/// Validated, whitelisted declarations of a rule block, at most `limit` of
/// them. Prefixed declarations give way to a standard one in the same block.
pub fn clean_declarations(declarations: &[Declaration], limit: usize) -> StyleMap {
    let mut out = StyleMap::new();
    for decl in declarations {
        if out.len() >= limit {
            break;
        }
        let name = decl.name.to_ascii_lowercase();
        if !is_valid_property(&name) {
            continue;
        }
        let property = standard_property(&name);
        if has_vendor_prefix(&name)
            && declarations
                .iter()
                .any(|other| other.name.eq_ignore_ascii_case(property))
        {
            continue;
        }
        if let Some(value) = validate_value(property, &decl.value).resolve(decl.value.trim()) {
            out.insert(property.to_string(), value);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::page::CapturedPage;
    use serde_json::json;

    fn style(pairs: &[(&str, &str)]) -> ResolvedStyle {
        pairs.iter().copied().collect()
    }

    #[test]
    fn color_equal_to_parent_is_elided() {
        let parent = style(&[("color", "rgb(0, 0, 0)")]);
        let context = FilterContext {
            parent: Some(&parent),
            ..FilterContext::default()
        };

        let same = filter_styles(&style(&[("color", "rgb(0, 0, 0)")]), &[], &context);
        assert!(same.styles.get("color").is_none());

        let differs = filter_styles(&style(&[("color", "rgb(255, 0, 0)")]), &[], &context);
        assert_eq!(differs.styles["color"], "rgb(255, 0, 0)");
    }

    #[test]
    fn relative_font_size_is_compared_in_px() {
        let parent = style(&[("font-size", "16px")]);
        let context = FilterContext {
            parent: Some(&parent),
            ..FilterContext::default()
        };

        let elided = filter_styles(&style(&[("font-size", "1em")]), &[], &context);
        assert!(elided.is_empty());

        let kept = filter_styles(&style(&[("font-size", "1.5em")]), &[], &context);
        assert_eq!(kept.styles["font-size"], "1.5em");

        let percent = filter_styles(&style(&[("font-size", "100%")]), &[], &context);
        assert!(percent.is_empty());
    }

    #[test]
    fn rem_resolves_against_the_root() {
        let parent = style(&[("font-size", "20px")]);
        let context = FilterContext {
            parent: Some(&parent),
            root_font_size: 10.0,
            ..FilterContext::default()
        };
        assert!(filter_styles(&style(&[("font-size", "2rem")]), &[], &context).is_empty());
        assert!(!filter_styles(&style(&[("font-size", "1rem")]), &[], &context).is_empty());
    }

    #[test]
    fn font_family_compares_first_font_only() {
        let parent = style(&[("font-family", "\"Inter\", Arial, sans-serif")]);
        let context = FilterContext {
            parent: Some(&parent),
            ..FilterContext::default()
        };
        let out = filter_styles(&style(&[("font-family", "Inter, sans-serif")]), &[], &context);
        assert!(out.is_empty());
    }

    #[test]
    fn tag_defaults_and_unknown_properties_are_dropped() {
        let defaults = style(&[("display", "block"), ("margin-top", "0px")]);
        let context = FilterContext {
            defaults: Some(&defaults),
            ..FilterContext::default()
        };
        let resolved = style(&[
            ("display", "block"),
            ("margin-top", "12px"),
            ("speak", "none"),
            ("opacity", "2"),
        ]);
        let out = filter_styles(&resolved, &[], &context);
        assert_eq!(out.styles.len(), 1);
        assert_eq!(out.styles["margin-top"], "12px");
    }

    #[test]
    fn prefixed_properties_fold_onto_standard_name() {
        let out = filter_styles(
            &style(&[("-webkit-transform", "rotate(5deg)")]),
            &[],
            &FilterContext::default(),
        );
        assert_eq!(out.styles["transform"], "rotate(5deg)");

        let both = filter_styles(
            &style(&[("-webkit-transform", "none"), ("transform", "scale(2)")]),
            &[],
            &FilterContext::default(),
        );
        assert_eq!(both.styles.len(), 1);
        assert_eq!(both.styles["transform"], "scale(2)");
    }

    #[test]
    fn inline_declarations_override_and_skip_elision() {
        let parent = style(&[("color", "rgb(0, 0, 255)")]);
        let context = FilterContext {
            parent: Some(&parent),
            ..FilterContext::default()
        };
        let inline = vec![
            Declaration::new("color", "rgb(0, 0, 255)"),
            Declaration::new("width", "50%"),
            Declaration::new("Opacity", "7"),
        ];
        let resolved = style(&[("color", "rgb(0, 0, 255)"), ("width", "10px"), ("opacity", "0.5")]);
        let out = filter_styles(&resolved, &inline, &context);
        assert_eq!(out.styles["color"], "rgb(0, 0, 255)");
        assert_eq!(out.styles["width"], "50%");
        assert_eq!(out.styles["opacity"], "0.5");
    }

    #[test]
    fn background_urls_are_collected() {
        let resolved = style(&[(
            "background-image",
            "url(\"https://a.example/x.png\"), linear-gradient(red, blue), url('y.svg'), url(z.gif)",
        )]);
        let out = filter_styles(&resolved, &[], &FilterContext::default());
        assert_eq!(
            out.background_image_urls,
            vec!["https://a.example/x.png", "y.svg", "z.gif"]
        );

        let none = filter_styles(&style(&[("background-image", "none")]), &[], &FilterContext::default());
        assert!(none.background_image_urls.is_empty());
    }

    #[test]
    fn empty_pseudo_content_is_excluded() {
        let base = style(&[("color", "rgb(0, 0, 0)")]);
        for content in ["\"\"", "''", "none", "normal", "-moz-alt-content"] {
            let pseudo = style(&[("content", content), ("color", "red")]);
            assert!(filter_pseudo(&pseudo, &base).is_none(), "{content}");
        }
        assert!(filter_pseudo(&style(&[("color", "red")]), &base).is_none());
    }

    #[test]
    fn pseudo_keeps_content_and_differing_properties() {
        let base = style(&[("color", "rgb(0, 0, 0)"), ("font-size", "16px")]);
        let pseudo = style(&[
            ("content", "\"★\""),
            ("color", "rgb(255, 0, 0)"),
            ("font-size", "16px"),
        ]);
        let out = filter_pseudo(&pseudo, &base).unwrap();
        assert_eq!(out.styles.len(), 2);
        assert_eq!(out.styles["content"], "\"★\"");
        assert_eq!(out.styles["color"], "rgb(255, 0, 0)");
    }

    #[test]
    fn declarations_are_cleaned_and_capped() {
        let decls = vec![
            Declaration::new("-webkit-box-shadow", "none"),
            Declaration::new("box-shadow", "0 1px 2px black"),
            Declaration::new("color", "none"),
            Declaration::new("zoom", "2"),
            Declaration::new("display", "grid"),
        ];
        let cleaned = clean_declarations(&decls, 20);
        assert_eq!(cleaned["box-shadow"], "0 1px 2px black");
        assert_eq!(cleaned["color"], "transparent");
        assert!(!cleaned.contains_key("zoom"));

        let many: Vec<_> = crate::css::validator::PROPERTY_WHITELIST
            .iter()
            .map(|name| Declaration::new(*name, "inherit"))
            .collect();
        assert_eq!(clean_declarations(&many, 20).len(), 20);
    }

    #[test]
    fn default_cache_probes_once_per_tag() {
        let page: CapturedPage = serde_json::from_value(json!({
            "root": 0,
            "elements": [{ "tag": "html" }],
            "defaultStyles": { "h1": { "font-size": "32px" } }
        }))
        .unwrap();
        let mut cache = DefaultStyleCache::new();
        let first = cache.get_or_probe(&page, "H1").unwrap();
        let second = cache.get_or_probe(&page, "h1").unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(cache.by_tag.len(), 1);
        assert_eq!(page.live_probes(), 0);
        assert!(cache.get_or_probe(&page, "marquee").is_err());
    }
}

//! Whole-document summaries: color scheme, typography, layout, custom
//! properties.

use std::collections::BTreeMap;

use super::filter::DefaultStyleCache;
use crate::page::{PageError, ResolvedStyle, StyleSource};
use crate::types::{ColorScheme, FontMetrics, LayoutInfo, Typography};

pub const HEADING_TAGS: [&str; 6] = ["h1", "h2", "h3", "h4", "h5", "h6"];

fn non_empty(style: &ResolvedStyle, property: &str) -> Option<String> {
    style
        .get(property)
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

fn is_transparent(color: &str) -> bool {
    let compact: String = color.chars().filter(|c| !c.is_whitespace()).collect();
    compact == "transparent" || compact == "rgba(0,0,0,0)"
}

fn font_metrics(style: &ResolvedStyle) -> FontMetrics {
    FontMetrics {
        font_family: non_empty(style, "font-family"),
        font_size: non_empty(style, "font-size"),
        font_weight: non_empty(style, "font-weight"),
        line_height: non_empty(style, "line-height"),
        letter_spacing: non_empty(style, "letter-spacing"),
    }
}

pub fn color_scheme<S: StyleSource + ?Sized>(page: &S) -> Result<ColorScheme, PageError> {
    let root = page
        .document_element()
        .ok_or(PageError::MissingElement("html"))?;
    let body = page.body().ok_or(PageError::MissingElement("body"))?;
    let root_style = page.computed_style(root, None)?;
    let body_style = page.computed_style(body, None)?;

    let background_color = [&body_style, &root_style]
        .into_iter()
        .filter_map(|style| non_empty(style, "background-color"))
        .find(|color| !is_transparent(color));

    let link = page
        .elements()
        .into_iter()
        .find(|&el| page.tag_name(el) == Some("a"));
    let link_color = match link {
        Some(el) => {
            let style = page.computed_style(el, None)?;
            non_empty(&style, "color")
        }
        None => None,
    };

    let accent_color = [&body_style, &root_style]
        .into_iter()
        .filter_map(|style| non_empty(style, "accent-color"))
        .find(|accent| accent != "auto");
    let color_scheme = non_empty(&root_style, "color-scheme").filter(|scheme| scheme != "normal");

    Ok(ColorScheme {
        background_color,
        text_color: non_empty(&body_style, "color"),
        link_color,
        accent_color,
        color_scheme,
    })
}

/// Body font metrics plus metrics of a bare `h1`..`h6`. Headings without a
/// known default style are left out.
pub fn typography<S: StyleSource + ?Sized>(
    page: &S,
    defaults: &mut DefaultStyleCache,
) -> Result<Typography, PageError> {
    let body = page.body().ok_or(PageError::MissingElement("body"))?;
    let body_style = page.computed_style(body, None)?;
    let base = font_metrics(&body_style);

    let mut headings = BTreeMap::new();
    for tag in HEADING_TAGS {
        match defaults.get_or_probe(page, tag) {
            Ok(style) => {
                let metrics = font_metrics(&style);
                if !metrics.is_empty() {
                    headings.insert(tag.to_string(), metrics);
                }
            }
            Err(PageError::UnknownTag(_)) => {
                tracing::debug!(tag, "no default style for heading");
            }
            Err(err) => return Err(err),
        }
    }

    Ok(Typography { base, headings })
}

pub fn layout_info<S: StyleSource + ?Sized>(page: &S) -> Result<LayoutInfo, PageError> {
    let document = page.document_size();
    let mut info = LayoutInfo {
        viewport: page.viewport(),
        document_width: document.width,
        document_height: document.height,
        ..LayoutInfo::default()
    };

    for el in page.elements() {
        let style = page.computed_style(el, None)?;
        match style.property_value("display") {
            "flex" | "inline-flex" => info.uses_flexbox = true,
            "grid" | "inline-grid" => {
                info.uses_grid = true;
                for property in ["grid-template-columns", "grid-template-rows"] {
                    if let Some(template) = non_empty(&style, property) {
                        if template != "none" && !info.grid_templates.contains(&template) {
                            info.grid_templates.push(template);
                        }
                    }
                }
            }
            _ => {}
        }
    }
    Ok(info)
}

/// Every `--*` property resolved on the root element.
pub fn custom_properties<S: StyleSource + ?Sized>(
    page: &S,
) -> Result<BTreeMap<String, String>, PageError> {
    let root = page
        .document_element()
        .ok_or(PageError::MissingElement("html"))?;
    let style = page.computed_style(root, None)?;
    Ok(style
        .iter()
        .filter(|(name, _)| name.starts_with("--"))
        .map(|(name, value)| (name.to_string(), value.trim().to_string()))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::page::CapturedPage;
    use serde_json::json;

    fn page() -> CapturedPage {
        serde_json::from_value(json!({
            "viewport": { "width": 800, "height": 600 },
            "documentSize": { "width": 800, "height": 2400 },
            "root": 0,
            "elements": [
                { "tag": "html", "children": [1], "style": {
                    "background-color": "rgb(250, 250, 250)",
                    "color-scheme": "light dark",
                    "--brand": " #0af ",
                    "color": "rgb(0, 0, 0)"
                } },
                { "tag": "body", "parent": 0, "children": [2, 3], "style": {
                    "background-color": "rgba(0, 0, 0, 0)",
                    "color": "rgb(20, 20, 20)",
                    "font-family": "Inter, sans-serif",
                    "font-size": "16px",
                    "accent-color": "auto"
                } },
                { "tag": "main", "parent": 1, "children": [4], "style": {
                    "display": "grid",
                    "grid-template-columns": "200px 1fr",
                    "grid-template-rows": "none"
                } },
                { "tag": "header", "parent": 1, "style": { "display": "flex" } },
                { "tag": "a", "parent": 2, "style": { "color": "rgb(0, 0, 238)" } }
            ],
            "defaultStyles": {
                "h1": { "font-size": "32px", "font-weight": "700" },
                "h2": { "font-size": "24px", "font-weight": "700" }
            }
        }))
        .unwrap()
    }

    #[test]
    fn color_scheme_falls_back_to_root_background() {
        let scheme = color_scheme(&page()).unwrap();
        assert_eq!(scheme.background_color.as_deref(), Some("rgb(250, 250, 250)"));
        assert_eq!(scheme.text_color.as_deref(), Some("rgb(20, 20, 20)"));
        assert_eq!(scheme.link_color.as_deref(), Some("rgb(0, 0, 238)"));
        assert_eq!(scheme.accent_color, None);
        assert_eq!(scheme.color_scheme.as_deref(), Some("light dark"));
    }

    #[test]
    fn typography_reads_body_and_known_headings() {
        let page = page();
        let mut cache = DefaultStyleCache::new();
        let typography = typography(&page, &mut cache).unwrap();
        assert_eq!(typography.base.font_size.as_deref(), Some("16px"));
        assert_eq!(typography.headings.len(), 2);
        assert_eq!(typography.headings["h1"].font_size.as_deref(), Some("32px"));
        assert_eq!(page.live_probes(), 0);
    }

    #[test]
    fn layout_info_detects_flex_and_grid() {
        let info = layout_info(&page()).unwrap();
        assert!(info.uses_flexbox);
        assert!(info.uses_grid);
        assert_eq!(info.grid_templates, vec!["200px 1fr"]);
        assert_eq!(info.document_height, 2400.0);
    }

    #[test]
    fn custom_properties_come_from_root() {
        let props = custom_properties(&page()).unwrap();
        assert_eq!(props.len(), 1);
        assert_eq!(props["--brand"], "#0af");
    }

    #[test]
    fn missing_body_is_an_error() {
        let page: CapturedPage =
            serde_json::from_value(json!({ "root": 0, "elements": [{ "tag": "html" }] })).unwrap();
        assert_eq!(color_scheme(&page), Err(PageError::MissingElement("body")));
        assert!(typography(&page, &mut DefaultStyleCache::new()).is_err());
    }
}

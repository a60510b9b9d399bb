use pse_lib::css::normalize_media_query;
use pse_lib::types::IssueKind;
use pse_lib::{CapturedPage, StyleExtractor};
use serde_json::{json, Value};

const BLACK: &str = "rgb(0, 0, 0)";
const RED: &str = "rgb(255, 0, 0)";

fn h1_defaults() -> Value {
    json!({
        "display": "block",
        "font-size": "32px",
        "font-weight": "700",
        "font-family": "Times New Roman",
        "margin-top": "21.44px",
        "color": BLACK
    })
}

/// `<html><body>…children…</body></html>`; children get ids from 2 upwards
/// and are parented to body.
fn page(children: Vec<Value>, stylesheets: Value) -> CapturedPage {
    let ids: Vec<usize> = (2..2 + children.len()).collect();
    let mut elements = vec![
        json!({
            "tag": "html",
            "children": [1],
            "rect": { "x": 0, "y": 0, "width": 1280, "height": 800 },
            "style": { "display": "block", "font-size": "16px", "color": BLACK }
        }),
        json!({
            "tag": "body",
            "parent": 0,
            "children": ids,
            "rect": { "x": 8, "y": 8, "width": 1264, "height": 784 },
            "style": {
                "display": "block",
                "font-size": "16px",
                "font-family": "Times New Roman",
                "color": BLACK,
                "background-color": "rgba(0, 0, 0, 0)"
            }
        }),
    ];
    elements.extend(children);

    let json = json!({
        "url": "https://site.example/",
        "viewport": { "width": 1280, "height": 800 },
        "documentSize": { "width": 1280, "height": 800 },
        "root": 0,
        "elements": elements,
        "defaultStyles": {
            "h1": h1_defaults(),
            "nav": { "display": "block", "color": BLACK, "font-size": "16px" },
            "body": { "display": "block", "color": BLACK },
            "html": { "display": "block", "color": BLACK }
        },
        "stylesheets": stylesheets
    });
    CapturedPage::from_json(&json.to_string()).expect("valid capture")
}

fn title_heading(extra_style: Value) -> Value {
    let mut style = h1_defaults();
    style["color"] = json!(RED);
    if let (Some(style), Some(extra)) = (style.as_object_mut(), extra_style.as_object()) {
        for (name, value) in extra {
            style.insert(name.clone(), value.clone());
        }
    }
    json!({
        "tag": "h1",
        "parent": 1,
        "attributes": { "id": "title" },
        "text": "Hello World, this is a long heading",
        "rect": { "x": 8, "y": 8, "width": 600, "height": 40 },
        "style": style
    })
}

#[tokio::test]
async fn heading_keeps_only_its_non_default_color() {
    let page = page(vec![title_heading(json!({}))], json!([]));

    let snapshot = StyleExtractor::default()
        .extract_snapshot(&page)
        .await
        .expect("extraction succeeds");

    let entry = snapshot
        .computed_styles
        .get("h1#title")
        .expect("heading is kept");
    assert_eq!(entry.styles.len(), 1, "got {:?}", entry.styles);
    assert_eq!(entry.styles.get("color").map(String::as_str), Some(RED));
    assert!(entry.background_image_urls.is_empty());
    assert!(snapshot.errors.is_empty(), "errors: {:?}", snapshot.errors);
    assert_eq!(page.live_probes(), 0);
}

#[tokio::test]
async fn denied_sheet_without_fetcher_is_reported_and_others_still_apply() {
    let sheets = json!([
        { "href": "https://cdn.example/theme.css", "accessError": "SecurityError" },
        { "rules": [
            { "type": "style", "selectorText": "h1#title", "declarations": [
                { "name": "letter-spacing", "value": "0.5px" }
            ]},
            { "type": "style", "selectorText": ".unused", "declarations": [
                { "name": "margin-top", "value": "4px" }
            ]}
        ]}
    ]);
    let page = page(vec![title_heading(json!({}))], sheets);

    let snapshot = StyleExtractor::default()
        .extract_snapshot(&page)
        .await
        .expect("access errors are not fatal");

    assert_eq!(snapshot.errors.len(), 1, "errors: {:?}", snapshot.errors);
    let issue = &snapshot.errors[0];
    assert_eq!(issue.kind, IssueKind::StylesheetAccess);
    assert_eq!(issue.context.as_deref(), Some("https://cdn.example/theme.css"));

    let rule = snapshot
        .important_rules
        .get("h1#title")
        .expect("rule matching an important element is kept");
    assert_eq!(rule.get("letter-spacing").map(String::as_str), Some("0.5px"));
    assert!(!snapshot.important_rules.contains_key(".unused"));
    assert!(snapshot.computed_styles.contains_key("h1#title"));
    assert_eq!(snapshot.metadata.stats.stylesheets, 2);
    assert_eq!(snapshot.metadata.stats.stylesheets_failed, 1);
}

#[tokio::test]
async fn only_referenced_keyframes_are_kept() {
    let keyframes = |name: &str| {
        json!({ "type": "keyframes", "name": name, "keyframes": [
            { "keyText": "from", "declarations": [{ "name": "opacity", "value": "0" }] },
            { "keyText": "to", "declarations": [{ "name": "opacity", "value": "1" }] }
        ]})
    };
    let sheets = json!([{ "rules": [keyframes("spin"), keyframes("fade")] }]);

    let unused = page(vec![title_heading(json!({}))], sheets.clone());
    let snapshot = StyleExtractor::default()
        .extract_snapshot(&unused)
        .await
        .expect("extraction succeeds");
    assert!(snapshot.animations.is_empty());
    let json = serde_json::to_value(&snapshot).expect("serialize");
    assert!(json.get("animations").is_none());

    let used = page(
        vec![title_heading(json!({ "animation-name": "fade" }))],
        sheets,
    );
    let snapshot = StyleExtractor::default()
        .extract_snapshot(&used)
        .await
        .expect("extraction succeeds");
    assert_eq!(snapshot.animations.len(), 1);
    let fade = snapshot.animations.get("fade").expect("fade is referenced");
    assert_eq!(fade.keyframes.len(), 2);
    assert_eq!(fade.keyframes[1].style.get("opacity").map(String::as_str), Some("1"));
}

#[tokio::test]
async fn relative_font_sizes_resolve_against_the_parent() {
    let nav = |id: &str, font_size: &str, y: f64| {
        json!({
            "tag": "nav",
            "parent": 1,
            "attributes": { "id": id },
            "rect": { "x": 0, "y": y, "width": 400, "height": 30 },
            "style": { "display": "block", "color": BLACK, "font-size": font_size }
        })
    };
    let page = page(
        vec![nav("same", "1em", 0.0), nav("larger", "1.5em", 40.0)],
        json!([]),
    );

    let snapshot = StyleExtractor::default()
        .extract_snapshot(&page)
        .await
        .expect("extraction succeeds");

    assert!(!snapshot.computed_styles.contains_key("nav#same"));
    let larger = snapshot
        .computed_styles
        .get("nav#larger")
        .expect("1.5em differs from the parent");
    assert_eq!(larger.styles.get("font-size").map(String::as_str), Some("1.5em"));
}

#[tokio::test]
async fn colors_equal_to_the_parent_are_elided() {
    let inherits = json!({
        "tag": "nav",
        "parent": 1,
        "attributes": { "class": "site-nav" },
        "rect": { "x": 0, "y": 0, "width": 400, "height": 30 },
        "style": { "display": "flex", "color": BLACK }
    });
    let page = page(vec![inherits], json!([]));

    let snapshot = StyleExtractor::default()
        .extract_snapshot(&page)
        .await
        .expect("extraction succeeds");

    let entry = snapshot
        .computed_styles
        .get("nav.site-nav:nth-child(1)")
        .expect("nav is kept");
    assert!(!entry.styles.contains_key("color"));
    assert_eq!(entry.styles.get("display").map(String::as_str), Some("flex"));
    assert!(snapshot.layout_info.as_ref().is_some_and(|l| l.uses_flexbox));
}

#[tokio::test]
async fn pseudo_elements_need_generated_content() {
    let mut heading = title_heading(json!({}));
    heading["before"] = json!({ "content": "\"#\"", "color": "rgb(0, 0, 255)" });
    heading["after"] = json!({ "content": "none", "color": "rgb(0, 0, 255)" });
    let page = page(vec![heading], json!([]));

    let snapshot = StyleExtractor::default()
        .extract_snapshot(&page)
        .await
        .expect("extraction succeeds");

    let before = snapshot
        .computed_styles
        .get("h1#title::before")
        .expect("::before generates content");
    assert_eq!(before.styles.get("content").map(String::as_str), Some("\"#\""));
    assert_eq!(
        before.styles.get("color").map(String::as_str),
        Some("rgb(0, 0, 255)")
    );
    assert!(!snapshot.computed_styles.contains_key("h1#title::after"));
    assert_eq!(snapshot.metadata.stats.pseudo_elements_kept, 1);
}

#[tokio::test]
async fn media_rules_for_important_elements_are_grouped_by_condition() {
    let sheets = json!([
        { "rules": [
            { "type": "media", "conditionText": "screen and (max-width: 600px)", "rules": [
                { "type": "style", "selectorText": "h1#title", "declarations": [
                    { "name": "font-size", "value": "24px" }
                ]}
            ]}
        ]},
        { "rules": [
            { "type": "media", "conditionText": "SCREEN  and (max-width:600px)", "rules": [
                { "type": "style", "selectorText": "h1#title", "declarations": [
                    { "name": "margin-top", "value": "8px" }
                ]}
            ]}
        ]}
    ]);
    let page = page(vec![title_heading(json!({}))], sheets);

    let snapshot = StyleExtractor::default()
        .extract_snapshot(&page)
        .await
        .expect("extraction succeeds");

    let wanted = normalize_media_query("screen and (max-width: 600px)");
    let matching: Vec<_> = snapshot
        .media_queries
        .iter()
        .filter(|entry| entry.normalized_query == wanted)
        .collect();
    assert_eq!(matching.len(), 1, "queries: {:?}", snapshot.media_queries);
    let rule = matching[0]
        .rules
        .iter()
        .find(|rule| rule.selector == "h1#title")
        .expect("heading rule kept");
    assert_eq!(rule.styles.get("font-size").map(String::as_str), Some("24px"));
    assert_eq!(rule.styles.get("margin-top").map(String::as_str), Some("8px"));
}

#[tokio::test]
async fn concurrent_extractions_do_not_share_state() {
    let page = page(vec![title_heading(json!({}))], json!([]));
    let extractor = StyleExtractor::default();

    let (first, second) = tokio::join!(
        extractor.extract_snapshot(&page),
        extractor.extract_snapshot(&page)
    );
    let first = first.expect("first pass");
    let second = second.expect("second pass");

    assert_eq!(first.computed_styles, second.computed_styles);
    assert_eq!(first.metadata.stats, second.metadata.stats);
    assert_eq!(page.live_probes(), 0);
}

#[tokio::test]
async fn missing_body_keeps_element_and_rule_results() {
    let json = json!({
        "url": "https://site.example/",
        "viewport": { "width": 1280, "height": 800 },
        "root": 0,
        "elements": [
            { "tag": "html", "children": [1],
              "rect": { "x": 0, "y": 0, "width": 1280, "height": 800 },
              "style": { "display": "block", "font-size": "16px", "color": BLACK } },
            { "tag": "main", "parent": 0, "attributes": { "id": "content" },
              "rect": { "x": 0, "y": 0, "width": 1280, "height": 600 },
              "style": { "display": "block", "color": RED } }
        ],
        "defaultStyles": {
            "html": { "display": "block", "color": BLACK },
            "main": { "display": "block", "color": BLACK }
        },
        "stylesheets": [{ "rules": [
            { "type": "style", "selectorText": "main#content", "declarations": [
                { "name": "padding-top", "value": "4px" }
            ]}
        ]}]
    });
    let page = CapturedPage::from_json(&json.to_string()).expect("valid capture");

    let snapshot = StyleExtractor::default()
        .extract_snapshot(&page)
        .await
        .expect("a missing body is not fatal");

    let sections: Vec<String> = snapshot
        .issues_of(IssueKind::ThemeExtraction)
        .filter_map(|issue| issue.context.clone())
        .collect();
    assert!(sections.contains(&"colorScheme".to_string()), "errors: {:?}", snapshot.errors);
    assert!(sections.contains(&"typography".to_string()), "errors: {:?}", snapshot.errors);
    assert!(snapshot.color_scheme.is_none());
    assert!(snapshot.typography.is_none());

    let main = snapshot
        .computed_styles
        .get("main#content")
        .expect("element styles survive");
    assert_eq!(main.styles.get("color").map(String::as_str), Some(RED));
    let rule = snapshot
        .important_rules
        .get("main#content")
        .expect("stylesheet rules survive");
    assert_eq!(rule.get("padding-top").map(String::as_str), Some("4px"));
}

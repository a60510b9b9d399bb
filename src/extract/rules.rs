//! Turns stylesheet rules into `importantRules`, `mediaQueries` and
//! `animations` entries.

use once_cell::unsync::OnceCell;
use std::collections::HashSet;
use thiserror::Error;

use super::filter::clean_declarations;
use super::importance::ImportanceRules;
use crate::config::{LimitsConfig, MediaConfig};
use crate::css::media::mentions_screen;
use crate::css::parser::split_top_level;
use crate::css::{
    CssRule, KeyframesRule, MediaQueryBook, MediaRule, SelectorComplexity, SelectorList,
    StyleRule,
};
use crate::page::{ElementId, StyleSource};
use crate::types::{AnimationEntry, KeyframeEntry, MediaRuleEntry, Snapshot, StyleMap};

/// Deepest `@media` nesting processed before the sheet is abandoned.
pub const MAX_MEDIA_DEPTH: usize = 8;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RuleError {
    #[error("@media nesting deeper than {} levels under \"{}\"", MAX_MEDIA_DEPTH, .0)]
    NestingTooDeep(String),

    #[error("response is not a stylesheet: {0}")]
    NotCss(String),
}

/// Bounds applied to every style rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RuleLimits {
    pub max_alternatives: usize,
    pub max_combinators: usize,
    pub max_declarations: usize,
    pub screen_only: bool,
}

impl Default for RuleLimits {
    fn default() -> Self {
        Self {
            max_alternatives: 2,
            max_combinators: 3,
            max_declarations: 20,
            screen_only: false,
        }
    }
}

impl RuleLimits {
    pub fn from_config(limits: &LimitsConfig, media: &MediaConfig) -> Self {
        Self {
            max_alternatives: limits.max_selector_alternatives,
            max_combinators: limits.max_selector_combinators,
            max_declarations: limits.max_declarations_per_selector,
            screen_only: media.screen_only,
        }
    }

    fn admits(&self, complexity: SelectorComplexity) -> bool {
        complexity.alternatives <= self.max_alternatives
            && complexity.combinators <= self.max_combinators
    }
}

/// Counts returned for one processed sheet.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SheetSummary {
    pub important_rules: usize,
    pub media_rules: usize,
    pub animations: usize,
}

/// Rule-processing state for one extraction pass.
///
/// The selector de-dup set and the lazily computed important-element and
/// animation-name sets live here, so a new processor starts clean.
pub struct RuleProcessor<'p, P: StyleSource + ?Sized> {
    page: &'p P,
    importance: &'p ImportanceRules,
    limits: RuleLimits,
    seen_selectors: HashSet<String>,
    important_elements: OnceCell<Vec<ElementId>>,
    referenced_animations: OnceCell<HashSet<String>>,
}

impl<'p, P: StyleSource + ?Sized> RuleProcessor<'p, P> {
    pub fn new(page: &'p P, importance: &'p ImportanceRules, limits: RuleLimits) -> Self {
        Self {
            page,
            importance,
            limits,
            seen_selectors: HashSet::new(),
            important_elements: OnceCell::new(),
            referenced_animations: OnceCell::new(),
        }
    }

    /// Merges the useful parts of one sheet's rules into `snapshot`.
    pub fn process_sheet(
        &mut self,
        rules: &[CssRule],
        snapshot: &mut Snapshot,
    ) -> Result<SheetSummary, RuleError> {
        let mut summary = SheetSummary::default();
        for rule in rules {
            match rule {
                CssRule::Style(style) => {
                    if let Some(styles) = self.process_style_rule(style, true) {
                        snapshot
                            .important_rules
                            .entry(style.selector_text.trim().to_string())
                            .or_default()
                            .extend(styles);
                        summary.important_rules += 1;
                    }
                }
                CssRule::Media(media) => {
                    if self.limits.screen_only && !mentions_screen(&media.condition_text) {
                        continue;
                    }
                    let mut collected = Vec::new();
                    self.collect_media(media, &media.condition_text, 1, &mut collected)?;
                    let mut book = MediaQueryBook::new(&mut snapshot.media_queries);
                    for (condition, entries) in collected {
                        summary.media_rules += entries.len();
                        book.add_or_merge(&condition, entries);
                    }
                }
                CssRule::Keyframes(keyframes) => {
                    if let Some(entry) = self.process_keyframes(keyframes) {
                        snapshot.animations.insert(entry.name.clone(), entry);
                        summary.animations += 1;
                    }
                }
                CssRule::Other { at_rule } => {
                    tracing::trace!(at_rule = %at_rule, "ignoring at-rule");
                }
            }
        }
        Ok(summary)
    }

    /// Flattens a media rule and its nested media rules into
    /// `(condition, rules)` pairs. Nested conditions are joined with `and`.
    fn collect_media(
        &mut self,
        media: &MediaRule,
        condition: &str,
        depth: usize,
        out: &mut Vec<(String, Vec<MediaRuleEntry>)>,
    ) -> Result<(), RuleError> {
        if depth > MAX_MEDIA_DEPTH {
            return Err(RuleError::NestingTooDeep(condition.to_string()));
        }
        let mut entries = Vec::new();
        let mut nested = Vec::new();
        for rule in &media.rules {
            match rule {
                CssRule::Style(style) => {
                    if let Some(styles) = self.process_style_rule(style, false) {
                        entries.push(MediaRuleEntry {
                            selector: style.selector_text.trim().to_string(),
                            styles,
                        });
                    }
                }
                CssRule::Media(inner) => nested.push(inner),
                _ => {}
            }
        }
        out.push((condition.to_string(), entries));
        for inner in nested {
            let joined = format!("{condition} and {}", inner.condition_text);
            self.collect_media(inner, &joined, depth + 1, out)?;
        }
        Ok(())
    }

    /// Cleaned declarations of a style rule worth keeping, or `None`.
    ///
    /// Top-level selectors are de-duplicated across the whole pass; rules
    /// inside `@media` are not, since the same selector legitimately appears
    /// under several conditions.
    fn process_style_rule(&mut self, rule: &StyleRule, top_level: bool) -> Option<StyleMap> {
        let selector = rule.selector_text.trim();
        if selector.is_empty() {
            return None;
        }
        if top_level && !self.seen_selectors.insert(selector.to_string()) {
            return None;
        }

        let parsed = SelectorList::parse(selector);
        let complexity = match &parsed {
            Ok(list) => list.complexity(),
            Err(_) => SelectorComplexity {
                alternatives: split_top_level(selector, ',').len(),
                combinators: 0,
            },
        };
        if !self.limits.admits(complexity) {
            tracing::trace!(selector, ?complexity, "skipping complex selector");
            return None;
        }

        let keep = rule.has_important()
            || parsed
                .as_ref()
                .is_ok_and(|list| self.matches_important_element(list));
        if !keep {
            return None;
        }

        let styles = clean_declarations(&rule.declarations, self.limits.max_declarations);
        (!styles.is_empty()).then_some(styles)
    }

    fn matches_important_element(&self, list: &SelectorList) -> bool {
        let page = self.page;
        let importance = self.importance;
        self.important_elements
            .get_or_init(|| {
                page.elements()
                    .into_iter()
                    .filter(|&el| importance.is_important(page, el))
                    .collect()
            })
            .iter()
            .any(|&el| list.matches(page, el))
    }

    fn process_keyframes(&self, rule: &KeyframesRule) -> Option<AnimationEntry> {
        let page = self.page;
        let referenced = self
            .referenced_animations
            .get_or_init(|| referenced_animation_names(page));
        if !referenced.contains(rule.name.trim()) {
            return None;
        }
        let keyframes = rule
            .keyframes
            .iter()
            .map(|frame| KeyframeEntry {
                key_text: frame.key_text.clone(),
                style: clean_declarations(&frame.declarations, usize::MAX),
            })
            .collect();
        Some(AnimationEntry {
            name: rule.name.trim().to_string(),
            keyframes,
        })
    }
}

/// Animation names referenced by any element's inline `animation` or
/// `animation-name`, or by its resolved `animation-name`.
pub fn referenced_animation_names<S: StyleSource + ?Sized>(page: &S) -> HashSet<String> {
    let mut names = HashSet::new();
    for el in page.elements() {
        for decl in page.inline_style(el) {
            let property = crate::css::standard_property(&decl.name).to_ascii_lowercase();
            match property.as_str() {
                "animation-name" => add_names(&mut names, &decl.value),
                // The shorthand has no fixed position for the name; every
                // token is a candidate.
                "animation" => {
                    for layer in decl.value.split(',') {
                        names.extend(layer.split_whitespace().map(str::to_string));
                    }
                }
                _ => {}
            }
        }
        if let Ok(style) = page.computed_style(el, None) {
            if let Some(value) = style.get("animation-name") {
                add_names(&mut names, value);
            }
        }
    }
    names.remove("none");
    names
}

fn add_names(names: &mut HashSet<String>, value: &str) {
    names.extend(
        value
            .split(',')
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .map(str::to_string),
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::css::parse_stylesheet;
    use crate::page::CapturedPage;
    use crate::types::SnapshotMetadata;
    use serde_json::json;

    const RECT: &str = r#"{ "x": 0, "y": 0, "width": 200, "height": 40 }"#;

    fn page() -> CapturedPage {
        let rect: serde_json::Value = serde_json::from_str(RECT).unwrap();
        serde_json::from_value(json!({
            "root": 0,
            "elements": [
                { "tag": "html", "children": [1] },
                { "tag": "body", "parent": 0, "children": [2, 3, 4], "rect": rect },
                { "tag": "nav", "parent": 1, "attributes": { "class": "menu" }, "rect": rect },
                { "tag": "span", "parent": 1, "attributes": { "class": "tiny" }, "rect": rect },
                { "tag": "div", "parent": 1, "attributes": { "class": "spinner" }, "rect": rect,
                  "inlineStyle": [{ "name": "animation", "value": "pulse 1s infinite" }] }
            ]
        }))
        .unwrap()
    }

    fn run(css: &str, limits: RuleLimits) -> (Snapshot, SheetSummary) {
        let page = page();
        let importance = ImportanceRules::default();
        let mut processor = RuleProcessor::new(&page, &importance, limits);
        let mut snapshot = Snapshot::new(SnapshotMetadata::default());
        let summary = processor
            .process_sheet(&parse_stylesheet(css), &mut snapshot)
            .unwrap();
        (snapshot, summary)
    }

    #[test]
    fn keeps_rules_matching_important_elements_or_marked_important() {
        let (snapshot, summary) = run(
            "nav.menu { display: flex; color: rgb(1, 2, 3) }\n\
             .tiny { color: rgb(9, 9, 9) }\n\
             .unused { margin-top: 4px !important }\n\
             .ghost { margin-top: 4px }",
            RuleLimits::default(),
        );
        assert_eq!(summary.important_rules, 2);
        assert_eq!(snapshot.important_rules["nav.menu"]["display"], "flex");
        assert_eq!(snapshot.important_rules[".unused"]["margin-top"], "4px");
        assert!(!snapshot.important_rules.contains_key(".tiny"));
        assert!(!snapshot.important_rules.contains_key(".ghost"));
    }

    #[test]
    fn complex_selectors_are_skipped() {
        let (snapshot, _) = run(
            "nav, .menu, body { color: rgb(0, 0, 0) !important }\n\
             html body nav.menu span a { color: rgb(0, 0, 0) !important }\n\
             body > nav { color: rgb(0, 0, 0) !important }",
            RuleLimits::default(),
        );
        assert_eq!(snapshot.important_rules.len(), 1);
        assert!(snapshot.important_rules.contains_key("body > nav"));
    }

    #[test]
    fn selectors_are_processed_once_per_pass() {
        let page = page();
        let importance = ImportanceRules::default();
        let mut processor = RuleProcessor::new(&page, &importance, RuleLimits::default());
        let mut snapshot = Snapshot::new(SnapshotMetadata::default());
        processor
            .process_sheet(&parse_stylesheet("nav { color: rgb(1, 1, 1) }"), &mut snapshot)
            .unwrap();
        let second = processor
            .process_sheet(&parse_stylesheet("nav { color: rgb(2, 2, 2) }"), &mut snapshot)
            .unwrap();
        assert_eq!(second.important_rules, 0);
        assert_eq!(snapshot.important_rules["nav"]["color"], "rgb(1, 1, 1)");
    }

    #[test]
    fn media_queries_are_normalized_and_always_registered() {
        let (snapshot, _) = run(
            "@media Screen AND (max-width: 600px) { nav { display: none } }\n\
             @media print { .ghost { color: rgb(0, 0, 0) } }",
            RuleLimits::default(),
        );
        assert_eq!(snapshot.media_queries.len(), 2);
        assert_eq!(
            snapshot.media_queries[0].normalized_query,
            "screen and (max-width:600px)"
        );
        assert_eq!(snapshot.media_queries[0].rules[0].selector, "nav");
        assert!(snapshot.media_queries[1].rules.is_empty());
    }

    #[test]
    fn screen_only_mode_drops_other_media() {
        let limits = RuleLimits {
            screen_only: true,
            ..RuleLimits::default()
        };
        let (snapshot, _) = run(
            "@media screen { nav { display: block } }\n@media print { nav { display: none } }",
            limits,
        );
        assert_eq!(snapshot.media_queries.len(), 1);
        assert_eq!(snapshot.media_queries[0].normalized_query, "screen");
    }

    #[test]
    fn nested_media_conditions_are_joined() {
        let (snapshot, _) = run(
            "@media screen { @media (min-width: 0px) { nav { display: block } } }",
            RuleLimits::default(),
        );
        let queries: Vec<_> = snapshot
            .media_queries
            .iter()
            .map(|m| m.normalized_query.as_str())
            .collect();
        assert_eq!(queries, vec!["screen", "screen and (min-width:0)"]);
    }

    #[test]
    fn only_referenced_keyframes_are_kept() {
        let (snapshot, summary) = run(
            "@keyframes pulse { from { opacity: 1 } to { opacity: 0.2 } }\n\
             @keyframes spin { to { transform: rotate(360deg) } }",
            RuleLimits::default(),
        );
        assert_eq!(summary.animations, 1);
        let pulse = &snapshot.animations["pulse"];
        assert_eq!(pulse.keyframes.len(), 2);
        assert_eq!(pulse.keyframes[1].key_text, "to");
        assert_eq!(pulse.keyframes[1].style["opacity"], "0.2");
        assert!(!snapshot.animations.contains_key("spin"));
    }

    #[test]
    fn deep_media_nesting_fails_the_sheet() {
        let mut css = String::new();
        for _ in 0..=MAX_MEDIA_DEPTH {
            css.push_str("@media screen { ");
        }
        css.push_str("nav { color: rgb(0, 0, 0) }");
        for _ in 0..=MAX_MEDIA_DEPTH {
            css.push_str(" }");
        }
        let page = page();
        let importance = ImportanceRules::default();
        let mut processor = RuleProcessor::new(&page, &importance, RuleLimits::default());
        let mut snapshot = Snapshot::new(SnapshotMetadata::default());
        let err = processor
            .process_sheet(&parse_stylesheet(&css), &mut snapshot)
            .unwrap_err();
        assert!(matches!(err, RuleError::NestingTooDeep(_)));
    }

    #[test]
    fn pathological_media_nesting_is_a_sheet_error() {
        let mut css = "@media screen{".repeat(20_000);
        css.push_str(&"}".repeat(20_000));
        let page = page();
        let importance = ImportanceRules::default();
        let mut processor = RuleProcessor::new(&page, &importance, RuleLimits::default());
        let mut snapshot = Snapshot::new(SnapshotMetadata::default());
        let err = processor
            .process_sheet(&parse_stylesheet(&css), &mut snapshot)
            .unwrap_err();
        assert!(matches!(err, RuleError::NestingTooDeep(_)));
    }
}

//! Media query normalization and de-duplication.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::types::{MediaQueryEntry, MediaRuleEntry};

static WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());
static VENDOR_TOKEN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(^|[\s(:,])-(webkit|moz|ms|o)-").unwrap());
static COLON: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s*:\s*").unwrap());
static OPEN_PAREN: Lazy<Regex> = Lazy::new(|| Regex::new(r"\(\s+").unwrap());
static CLOSE_PAREN: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+\)").unwrap());
static ZERO_PX: Lazy<Regex> = Lazy::new(|| Regex::new(r"(^|[^\d.])0px\b").unwrap());

/// Canonical form of a media condition: lower-case, single spaces, vendor
/// prefixes dropped, no space around `:`, `0px` written as `0`.
pub fn normalize_media_query(query: &str) -> String {
    let lower = query.to_lowercase();
    let collapsed = WHITESPACE.replace_all(lower.trim(), " ");
    let unprefixed = VENDOR_TOKEN.replace_all(&collapsed, "$1");
    let colons = COLON.replace_all(&unprefixed, ":");
    let opened = OPEN_PAREN.replace_all(&colons, "(");
    let closed = CLOSE_PAREN.replace_all(&opened, ")");
    ZERO_PX.replace_all(&closed, "${1}0").trim().to_string()
}

/// Whether a condition targets screens.
pub fn mentions_screen(query: &str) -> bool {
    query.to_lowercase().contains("screen")
}

fn merge_rules(existing: &mut Vec<MediaRuleEntry>, incoming: Vec<MediaRuleEntry>) {
    for rule in incoming {
        match existing.iter_mut().find(|r| r.selector == rule.selector) {
            Some(found) => found.styles.extend(rule.styles),
            None => existing.push(rule),
        }
    }
}

/// Keyed view over a snapshot's media query list.
pub struct MediaQueryBook<'a> {
    entries: &'a mut Vec<MediaQueryEntry>,
}

impl<'a> MediaQueryBook<'a> {
    pub fn new(entries: &'a mut Vec<MediaQueryEntry>) -> Self {
        Self { entries }
    }

    /// Merges `rules` into the entry for `query`, creating it if needed. An
    /// entry is registered even when `rules` is empty. Later declarations win
    /// for the same selector and property.
    pub fn add_or_merge(&mut self, query: &str, rules: Vec<MediaRuleEntry>) {
        let normalized = normalize_media_query(query);
        match self
            .entries
            .iter_mut()
            .find(|entry| entry.normalized_query == normalized)
        {
            Some(entry) => merge_rules(&mut entry.rules, rules),
            None => {
                let mut merged = Vec::with_capacity(rules.len());
                merge_rules(&mut merged, rules);
                self.entries.push(MediaQueryEntry {
                    normalized_query: normalized,
                    rules: merged,
                });
            }
        }
    }
}

/// Collapses entries that share a normalized query, keeping first-seen order.
pub fn dedupe_media_queries(entries: Vec<MediaQueryEntry>) -> Vec<MediaQueryEntry> {
    let mut out = Vec::with_capacity(entries.len());
    let mut book = MediaQueryBook::new(&mut out);
    for entry in entries {
        book.add_or_merge(&entry.normalized_query, entry.rules);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::StyleMap;

    fn rule(selector: &str, props: &[(&str, &str)]) -> MediaRuleEntry {
        MediaRuleEntry {
            selector: selector.to_string(),
            styles: props
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect::<StyleMap>(),
        }
    }

    #[test]
    fn normalizes_case_spacing_prefixes_and_zero() {
        assert_eq!(
            normalize_media_query("  Screen   AND ( min-width : 0px )"),
            "screen and (min-width:0)"
        );
        assert_eq!(
            normalize_media_query("(-webkit-min-device-pixel-ratio: 2)"),
            "(min-device-pixel-ratio:2)"
        );
        assert_eq!(
            normalize_media_query("(max-width: 10px)"),
            "(max-width:10px)"
        );
    }

    #[test]
    fn fractional_zero_px_tails_are_untouched() {
        assert_eq!(
            normalize_media_query("(min-width: 1.0px)"),
            "(min-width:1.0px)"
        );
        assert_eq!(
            normalize_media_query("(min-width: 0px) and (max-width: 20.0px)"),
            "(min-width:0) and (max-width:20.0px)"
        );
    }

    #[test]
    fn adding_the_same_rules_twice_is_idempotent() {
        let rules = vec![rule(".a", &[("color", "red")]), rule(".b", &[("width", "1px")])];

        let mut once = Vec::new();
        MediaQueryBook::new(&mut once).add_or_merge("screen", rules.clone());

        let mut twice = Vec::new();
        let mut book = MediaQueryBook::new(&mut twice);
        book.add_or_merge("screen", rules.clone());
        book.add_or_merge("SCREEN ", rules);

        assert_eq!(once, twice);
        assert_eq!(twice.len(), 1);
        assert_eq!(twice[0].rules.len(), 2);
    }

    #[test]
    fn merging_overwrites_same_named_properties() {
        let mut entries = Vec::new();
        let mut book = MediaQueryBook::new(&mut entries);
        book.add_or_merge("print", vec![rule(".a", &[("color", "red"), ("width", "1px")])]);
        book.add_or_merge("print", vec![rule(".a", &[("color", "blue")]), rule(".c", &[])]);
        assert_eq!(entries[0].rules.len(), 2);
        assert_eq!(entries[0].rules[0].styles["color"], "blue");
        assert_eq!(entries[0].rules[0].styles["width"], "1px");
    }

    #[test]
    fn empty_rule_sets_still_register_the_query() {
        let mut entries = Vec::new();
        MediaQueryBook::new(&mut entries).add_or_merge("(hover: hover)", Vec::new());
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].normalized_query, "(hover:hover)");
    }

    #[test]
    fn final_pass_merges_duplicate_entries() {
        let entries = vec![
            MediaQueryEntry {
                normalized_query: "screen".into(),
                rules: vec![rule(".a", &[("color", "red")])],
            },
            MediaQueryEntry {
                normalized_query: "print".into(),
                rules: vec![],
            },
            MediaQueryEntry {
                normalized_query: "screen".into(),
                rules: vec![rule(".a", &[("margin", "0")])],
            },
        ];
        let deduped = dedupe_media_queries(entries);
        assert_eq!(deduped.len(), 2);
        assert_eq!(deduped[0].normalized_query, "screen");
        assert_eq!(deduped[0].rules[0].styles.len(), 2);
    }
}

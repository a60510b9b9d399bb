//! Stylesheet text parser.
//!
//! Fetched cross-origin sheets arrive as raw text. This turns them into the
//! same rule model a readable sheet exposes: style rules, `@media` blocks and
//! `@keyframes` blocks. Other at-rules are kept as [`CssRule::Other`] and
//! ignored downstream. It splits on braces and semicolons only; values are
//! not interpreted.

use super::{CssRule, Declaration, Keyframe, KeyframesRule, MediaRule, StyleRule};

/// Deepest block nesting parsed. A `@media` block below this depth is kept
/// as [`CssRule::Other`] without parsing its body.
pub const MAX_BLOCK_DEPTH: usize = 32;

enum Segment<'a> {
    Block { prelude: &'a str, body: &'a str },
    Statement(&'a str),
}

/// Removes `/* ... */` comments outside of string literals.
fn strip_comments(css: &str) -> String {
    let mut out = String::with_capacity(css.len());
    let mut chars = css.chars().peekable();
    let mut quote: Option<char> = None;

    while let Some(ch) = chars.next() {
        if let Some(q) = quote {
            out.push(ch);
            if ch == '\\' {
                if let Some(escaped) = chars.next() {
                    out.push(escaped);
                }
            } else if ch == q {
                quote = None;
            }
            continue;
        }
        match ch {
            '"' | '\'' => {
                quote = Some(ch);
                out.push(ch);
            }
            '/' if chars.peek() == Some(&'*') => {
                chars.next();
                let mut prev = '\0';
                for c in chars.by_ref() {
                    if prev == '*' && c == '/' {
                        break;
                    }
                    prev = c;
                }
                out.push(' ');
            }
            _ => out.push(ch),
        }
    }
    out
}

/// Index of the `}` closing the `{` at `open`, skipping nested blocks and
/// strings.
fn matching_brace(bytes: &[u8], open: usize) -> Option<usize> {
    let mut depth = 0usize;
    let mut quote: Option<u8> = None;
    let mut i = open;
    while i < bytes.len() {
        let b = bytes[i];
        if let Some(q) = quote {
            if b == b'\\' {
                i += 2;
                continue;
            }
            if b == q {
                quote = None;
            }
        } else {
            match b {
                b'"' | b'\'' => quote = Some(b),
                b'{' => depth += 1,
                b'}' => {
                    depth -= 1;
                    if depth == 0 {
                        return Some(i);
                    }
                }
                _ => {}
            }
        }
        i += 1;
    }
    None
}

fn segments(css: &str) -> Vec<Segment<'_>> {
    let bytes = css.as_bytes();
    let mut out = Vec::new();
    let mut start = 0;
    let mut i = 0;
    let mut quote: Option<u8> = None;

    while i < bytes.len() {
        let b = bytes[i];
        if let Some(q) = quote {
            if b == b'\\' {
                i += 2;
                continue;
            }
            if b == q {
                quote = None;
            }
            i += 1;
            continue;
        }
        match b {
            b'"' | b'\'' => quote = Some(b),
            b';' => {
                let statement = css[start..i].trim();
                if !statement.is_empty() {
                    out.push(Segment::Statement(statement));
                }
                start = i + 1;
            }
            b'{' => {
                let prelude = css[start..i].trim();
                match matching_brace(bytes, i) {
                    Some(end) => {
                        out.push(Segment::Block {
                            prelude,
                            body: &css[i + 1..end],
                        });
                        i = end + 1;
                        start = i;
                        continue;
                    }
                    None => {
                        // Unterminated block: the rest of the sheet is its body.
                        out.push(Segment::Block {
                            prelude,
                            body: &css[i + 1..],
                        });
                        return out;
                    }
                }
            }
            b'}' => start = i + 1,
            _ => {}
        }
        i += 1;
    }

    if start < css.len() {
        let trailing = css[start..].trim();
        if !trailing.is_empty() {
            out.push(Segment::Statement(trailing));
        }
    }
    out
}

/// Splits `input` on `separator` where it is not nested in parentheses,
/// brackets or strings.
pub(crate) fn split_top_level(input: &str, separator: char) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0i32;
    let mut quote: Option<char> = None;
    let mut escaped = false;
    let mut start = 0;

    for (idx, ch) in input.char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        if ch == '\\' {
            escaped = true;
            continue;
        }
        if let Some(q) = quote {
            if ch == q {
                quote = None;
            }
            continue;
        }
        match ch {
            '"' | '\'' => quote = Some(ch),
            '(' | '[' => depth += 1,
            ')' | ']' => depth -= 1,
            c if c == separator && depth <= 0 => {
                parts.push(&input[start..idx]);
                start = idx + c.len_utf8();
            }
            _ => {}
        }
    }
    parts.push(&input[start..]);
    parts
}

fn split_important(value: &str) -> (&str, bool) {
    let trimmed = value.trim_end();
    if let Some(bang) = trimmed.rfind('!') {
        let flag = trimmed[bang + 1..].trim();
        if flag.eq_ignore_ascii_case("important") {
            return (trimmed[..bang].trim_end(), true);
        }
    }
    (trimmed, false)
}

/// Parses the body of a declaration block (`color: red; margin: 0 !important`).
pub fn parse_declarations(block: &str) -> Vec<Declaration> {
    split_top_level(block, ';')
        .into_iter()
        .filter_map(|raw| {
            let (name, value) = raw.split_once(':')?;
            let name = name.trim();
            if name.is_empty() {
                return None;
            }
            let name = if name.starts_with("--") {
                name.to_string()
            } else {
                name.to_ascii_lowercase()
            };
            let (value, important) = split_important(value.trim());
            if value.is_empty() {
                return None;
            }
            Some(Declaration {
                name,
                value: value.to_string(),
                important,
            })
        })
        .collect()
}

fn at_rule_name(prelude: &str) -> (String, &str) {
    let rest = &prelude[1..];
    let end = rest
        .find(|c: char| c.is_whitespace() || c == '(' || c == '"' || c == '\'')
        .unwrap_or(rest.len());
    (rest[..end].to_ascii_lowercase(), rest[end..].trim())
}

fn parse_keyframes(name: &str, body: &str) -> KeyframesRule {
    let keyframes = segments(body)
        .into_iter()
        .filter_map(|segment| match segment {
            Segment::Block { prelude, body } => Some(Keyframe {
                key_text: prelude.to_string(),
                declarations: parse_declarations(body),
            }),
            Segment::Statement(_) => None,
        })
        .collect();
    KeyframesRule {
        name: name.trim_matches(|c| c == '"' || c == '\'').to_string(),
        keyframes,
    }
}

fn parse_rules(css: &str, depth: usize) -> Vec<CssRule> {
    segments(css)
        .into_iter()
        .filter_map(|segment| match segment {
            Segment::Statement(statement) if statement.starts_with('@') => {
                let (name, _) = at_rule_name(statement);
                Some(CssRule::Other { at_rule: name })
            }
            Segment::Statement(_) => None,
            Segment::Block { prelude, body } if prelude.starts_with('@') => {
                let (name, params) = at_rule_name(prelude);
                let rule = match name.as_str() {
                    "media" if depth < MAX_BLOCK_DEPTH => CssRule::Media(MediaRule {
                        condition_text: params.to_string(),
                        rules: parse_rules(body, depth + 1),
                    }),
                    n if n == "keyframes" || n.ends_with("-keyframes") => {
                        CssRule::Keyframes(parse_keyframes(params, body))
                    }
                    _ => CssRule::Other { at_rule: name },
                };
                Some(rule)
            }
            Segment::Block { prelude, body } => {
                if prelude.is_empty() {
                    return None;
                }
                Some(CssRule::Style(StyleRule {
                    selector_text: prelude.split_whitespace().collect::<Vec<_>>().join(" "),
                    declarations: parse_declarations(body),
                }))
            }
        })
        .collect()
}

/// Parses a whole stylesheet.
pub fn parse_stylesheet(css: &str) -> Vec<CssRule> {
    parse_rules(&strip_comments(css), 0)
}

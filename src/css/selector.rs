//! Minimal selector parsing and matching.
//!
//! Supports type, universal, `#id`, `.class` and attribute selectors
//! (`[a]`, `=`, `~=`, `|=`, `^=`, `$=`, `*=`, optional ` i` flag), the
//! descendant, child, adjacent-sibling and general-sibling combinators, and
//! comma lists. Pseudo-classes and pseudo-elements are skipped, so `a:hover`
//! matches every `a`: the question asked is "could this rule style this
//! element", not "does it style it right now".

use thiserror::Error;

use super::parser::split_top_level;
use crate::page::{ElementId, StyleSource};

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SelectorError {
    #[error("empty selector")]
    Empty,
    #[error("unexpected character {0:?} in selector")]
    Unexpected(char),
    #[error("unterminated {0} in selector")]
    Unterminated(&'static str),
    #[error("dangling combinator in selector")]
    DanglingCombinator,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Combinator {
    Descendant,
    Child,
    NextSibling,
    SubsequentSibling,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttrOperator {
    Exists,
    Equals(String),
    Includes(String),
    DashMatch(String),
    Prefix(String),
    Suffix(String),
    Substring(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttributeSelector {
    pub name: String,
    pub operator: AttrOperator,
    pub case_insensitive: bool,
}

impl AttributeSelector {
    fn matches(&self, actual: Option<&str>) -> bool {
        let Some(actual) = actual else {
            return false;
        };
        let fold = |s: &str| {
            if self.case_insensitive {
                s.to_ascii_lowercase()
            } else {
                s.to_string()
            }
        };
        let actual = fold(actual);
        match &self.operator {
            AttrOperator::Exists => true,
            AttrOperator::Equals(v) => actual == fold(v),
            AttrOperator::Includes(v) => actual.split_whitespace().any(|w| w == fold(v)),
            AttrOperator::DashMatch(v) => {
                let v = fold(v);
                actual == v || actual.starts_with(&format!("{v}-"))
            }
            AttrOperator::Prefix(v) => !v.is_empty() && actual.starts_with(&fold(v)),
            AttrOperator::Suffix(v) => !v.is_empty() && actual.ends_with(&fold(v)),
            AttrOperator::Substring(v) => !v.is_empty() && actual.contains(&fold(v)),
        }
    }
}

/// A sequence of simple selectors with no combinator between them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompoundSelector {
    pub tag: Option<String>,
    pub ids: Vec<String>,
    pub classes: Vec<String>,
    pub attributes: Vec<AttributeSelector>,
}

impl CompoundSelector {
    fn matches<S: StyleSource + ?Sized>(&self, page: &S, element: ElementId) -> bool {
        if let Some(tag) = &self.tag {
            if page.tag_name(element) != Some(tag.as_str()) {
                return false;
            }
        }
        if !self.ids.is_empty() {
            let id = page.attribute(element, "id");
            if self.ids.iter().any(|wanted| id != Some(wanted.as_str())) {
                return false;
            }
        }
        if !self.classes.is_empty() {
            let classes = page.classes(element);
            if !self.classes.iter().all(|c| classes.contains(&c.as_str())) {
                return false;
            }
        }
        self.attributes
            .iter()
            .all(|attr| attr.matches(page.attribute(element, &attr.name)))
    }
}

/// One alternative of a selector list: compounds joined by combinators.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComplexSelector {
    compounds: Vec<CompoundSelector>,
    /// `combinators[i]` sits between `compounds[i]` and `compounds[i + 1]`.
    combinators: Vec<Combinator>,
}

impl ComplexSelector {
    pub fn combinator_count(&self) -> usize {
        self.combinators.len()
    }

    pub fn matches<S: StyleSource + ?Sized>(&self, page: &S, element: ElementId) -> bool {
        self.matches_from(page, element, self.compounds.len() - 1)
    }

    fn matches_from<S: StyleSource + ?Sized>(
        &self,
        page: &S,
        element: ElementId,
        index: usize,
    ) -> bool {
        if !self.compounds[index].matches(page, element) {
            return false;
        }
        if index == 0 {
            return true;
        }
        let next = index - 1;
        match self.combinators[next] {
            Combinator::Child => page
                .parent(element)
                .is_some_and(|parent| self.matches_from(page, parent, next)),
            Combinator::Descendant => {
                let mut current = page.parent(element);
                while let Some(ancestor) = current {
                    if self.matches_from(page, ancestor, next) {
                        return true;
                    }
                    current = page.parent(ancestor);
                }
                false
            }
            Combinator::NextSibling => previous_siblings(page, element)
                .last()
                .is_some_and(|sibling| self.matches_from(page, *sibling, next)),
            Combinator::SubsequentSibling => previous_siblings(page, element)
                .iter()
                .any(|sibling| self.matches_from(page, *sibling, next)),
        }
    }
}

fn previous_siblings<S: StyleSource + ?Sized>(page: &S, element: ElementId) -> &[ElementId] {
    let Some(parent) = page.parent(element) else {
        return &[];
    };
    let siblings = page.children(parent);
    match siblings.iter().position(|&child| child == element) {
        Some(pos) => &siblings[..pos],
        None => &[],
    }
}

/// Size of a selector, used to skip rules that are too costly to match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SelectorComplexity {
    pub alternatives: usize,
    /// Largest combinator count of any single alternative.
    pub combinators: usize,
}

/// A parsed, comma-separated selector list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectorList {
    selectors: Vec<ComplexSelector>,
}

impl SelectorList {
    pub fn parse(text: &str) -> Result<Self, SelectorError> {
        let selectors = split_top_level(text, ',')
            .into_iter()
            .map(parse_complex)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { selectors })
    }

    pub fn complexity(&self) -> SelectorComplexity {
        SelectorComplexity {
            alternatives: self.selectors.len(),
            combinators: self
                .selectors
                .iter()
                .map(ComplexSelector::combinator_count)
                .max()
                .unwrap_or(0),
        }
    }

    pub fn matches<S: StyleSource + ?Sized>(&self, page: &S, element: ElementId) -> bool {
        self.selectors.iter().any(|sel| sel.matches(page, element))
    }
}

fn is_ident_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '-' || c == '_' || !c.is_ascii()
}

struct Cursor<'a> {
    chars: std::iter::Peekable<std::str::Chars<'a>>,
}

impl<'a> Cursor<'a> {
    fn new(text: &'a str) -> Self {
        Self {
            chars: text.chars().peekable(),
        }
    }

    fn peek(&mut self) -> Option<char> {
        self.chars.peek().copied()
    }

    fn next(&mut self) -> Option<char> {
        self.chars.next()
    }

    fn skip_whitespace(&mut self) -> bool {
        let mut skipped = false;
        while self.peek().is_some_and(char::is_whitespace) {
            self.next();
            skipped = true;
        }
        skipped
    }

    fn ident(&mut self) -> String {
        let mut out = String::new();
        while let Some(c) = self.peek() {
            if c == '\\' {
                self.next();
                if let Some(escaped) = self.next() {
                    out.push(escaped);
                }
            } else if is_ident_char(c) {
                out.push(c);
                self.next();
            } else {
                break;
            }
        }
        out
    }

    /// Skips a balanced `( ... )` group if one starts here.
    fn skip_parenthesized(&mut self) -> Result<(), SelectorError> {
        if self.peek() != Some('(') {
            return Ok(());
        }
        let mut depth = 0;
        while let Some(c) = self.next() {
            match c {
                '(' => depth += 1,
                ')' => {
                    depth -= 1;
                    if depth == 0 {
                        return Ok(());
                    }
                }
                _ => {}
            }
        }
        Err(SelectorError::Unterminated("parenthesis"))
    }

    fn quoted_or_ident(&mut self) -> Result<String, SelectorError> {
        match self.peek() {
            Some(q @ ('"' | '\'')) => {
                self.next();
                let mut out = String::new();
                loop {
                    match self.next() {
                        Some('\\') => {
                            if let Some(c) = self.next() {
                                out.push(c);
                            }
                        }
                        Some(c) if c == q => return Ok(out),
                        Some(c) => out.push(c),
                        None => return Err(SelectorError::Unterminated("string")),
                    }
                }
            }
            _ => Ok(self.ident()),
        }
    }

    fn attribute(&mut self) -> Result<AttributeSelector, SelectorError> {
        self.skip_whitespace();
        let name = self.ident().to_ascii_lowercase();
        if name.is_empty() {
            return Err(self.unexpected());
        }
        self.skip_whitespace();
        let op = match self.next() {
            Some(']') => {
                return Ok(AttributeSelector {
                    name,
                    operator: AttrOperator::Exists,
                    case_insensitive: false,
                })
            }
            Some('=') => '=',
            Some(c @ ('~' | '|' | '^' | '$' | '*')) => {
                if self.next() != Some('=') {
                    return Err(SelectorError::Unexpected(c));
                }
                c
            }
            Some(c) => return Err(SelectorError::Unexpected(c)),
            None => return Err(SelectorError::Unterminated("attribute selector")),
        };
        self.skip_whitespace();
        let value = self.quoted_or_ident()?;
        self.skip_whitespace();
        let mut case_insensitive = false;
        if matches!(self.peek(), Some('i' | 'I' | 's' | 'S')) {
            case_insensitive = matches!(self.next(), Some('i' | 'I'));
            self.skip_whitespace();
        }
        if self.next() != Some(']') {
            return Err(SelectorError::Unterminated("attribute selector"));
        }
        let operator = match op {
            '=' => AttrOperator::Equals(value),
            '~' => AttrOperator::Includes(value),
            '|' => AttrOperator::DashMatch(value),
            '^' => AttrOperator::Prefix(value),
            '$' => AttrOperator::Suffix(value),
            _ => AttrOperator::Substring(value),
        };
        Ok(AttributeSelector {
            name,
            operator,
            case_insensitive,
        })
    }

    fn unexpected(&mut self) -> SelectorError {
        match self.peek() {
            Some(c) => SelectorError::Unexpected(c),
            None => SelectorError::Empty,
        }
    }

    /// Parses one compound; returns `None` when nothing was consumed.
    fn compound(&mut self) -> Result<Option<CompoundSelector>, SelectorError> {
        let mut compound = CompoundSelector::default();
        let mut consumed = false;
        loop {
            match self.peek() {
                Some('*') => {
                    self.next();
                }
                Some('#') => {
                    self.next();
                    let id = self.ident();
                    if id.is_empty() {
                        return Err(self.unexpected());
                    }
                    compound.ids.push(id);
                }
                Some('.') => {
                    self.next();
                    let class = self.ident();
                    if class.is_empty() {
                        return Err(self.unexpected());
                    }
                    compound.classes.push(class);
                }
                Some('[') => {
                    self.next();
                    compound.attributes.push(self.attribute()?);
                }
                Some(':') => {
                    self.next();
                    if self.peek() == Some(':') {
                        self.next();
                    }
                    self.ident();
                    self.skip_parenthesized()?;
                }
                Some(c) if is_ident_char(c) || c == '\\' => {
                    if consumed {
                        return Err(SelectorError::Unexpected(c));
                    }
                    compound.tag = Some(self.ident().to_ascii_lowercase());
                }
                _ => break,
            }
            consumed = true;
        }
        Ok(consumed.then_some(compound))
    }
}

fn parse_complex(text: &str) -> Result<ComplexSelector, SelectorError> {
    let mut cursor = Cursor::new(text.trim());
    let mut compounds = Vec::new();
    let mut combinators = Vec::new();

    loop {
        let compound = cursor.compound()?;
        match compound {
            Some(compound) => compounds.push(compound),
            None if compounds.is_empty() => return Err(cursor.unexpected()),
            None => return Err(SelectorError::DanglingCombinator),
        }

        let had_space = cursor.skip_whitespace();
        let combinator = match cursor.peek() {
            None => break,
            Some('>') => Combinator::Child,
            Some('+') => Combinator::NextSibling,
            Some('~') => Combinator::SubsequentSibling,
            Some(_) if had_space => {
                combinators.push(Combinator::Descendant);
                continue;
            }
            Some(c) => return Err(SelectorError::Unexpected(c)),
        };
        cursor.next();
        cursor.skip_whitespace();
        if cursor.peek().is_none() {
            return Err(SelectorError::DanglingCombinator);
        }
        combinators.push(combinator);
    }

    Ok(ComplexSelector {
        compounds,
        combinators,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::page::CapturedPage;
    use serde_json::json;

    fn page() -> CapturedPage {
        let el = |tag: &str, parent: Option<usize>, children: Vec<usize>, attrs: serde_json::Value| {
            json!({
                "tag": tag,
                "parent": parent,
                "children": children,
                "attributes": attrs,
            })
        };
        serde_json::from_value(json!({
            "root": 0,
            "viewport": { "width": 800, "height": 600 },
            "elements": [
                el("html", None, vec![1], json!({})),
                el("body", Some(0), vec![2, 5], json!({})),
                el("nav", Some(1), vec![3, 4], json!({ "class": "main-nav dark", "id": "top" })),
                el("a", Some(2), vec![], json!({ "href": "/home", "lang": "en-US" })),
                el("a", Some(2), vec![], json!({ "href": "https://x.example/", "class": "ext" })),
                el("footer", Some(1), vec![], json!({ "data-kind": "Site" })),
            ],
        }))
        .unwrap()
    }

    fn matches(selector: &str, element: usize) -> bool {
        SelectorList::parse(selector).unwrap().matches(&page(), element)
    }

    #[test]
    fn matches_simple_selectors() {
        assert!(matches("nav", 2));
        assert!(matches("#top", 2));
        assert!(matches(".main-nav.dark", 2));
        assert!(!matches(".main-nav.light", 2));
        assert!(matches("*", 5));
        assert!(matches("a:hover", 3));
        assert!(matches("nav::before", 2));
    }

    #[test]
    fn matches_attribute_operators() {
        assert!(matches("[href]", 3));
        assert!(matches("a[href^=\"https\"]", 4));
        assert!(!matches("a[href^=\"https\"]", 3));
        assert!(matches("a[lang|=en]", 3));
        assert!(matches("[data-kind=site i]", 5));
        assert!(!matches("[data-kind=site]", 5));
        assert!(matches("[class~=ext]", 4));
    }

    #[test]
    fn matches_combinators() {
        assert!(matches("body a", 3));
        assert!(matches("nav > a", 4));
        assert!(!matches("body > a", 3));
        assert!(matches("a + a", 4));
        assert!(!matches("a + a", 3));
        assert!(matches("nav ~ footer", 5));
        assert!(matches("html body nav.dark > a.ext", 4));
    }

    #[test]
    fn comma_lists_match_any_alternative() {
        assert!(matches("section, footer", 5));
        assert!(!matches("section, article", 5));
    }

    #[test]
    fn reports_complexity() {
        let list = SelectorList::parse("a b > c ~ d + e, f").unwrap();
        assert_eq!(
            list.complexity(),
            SelectorComplexity {
                alternatives: 2,
                combinators: 4
            }
        );
        assert_eq!(SelectorList::parse("a:not(.x, .y)").unwrap().complexity().alternatives, 1);
    }

    #[test]
    fn rejects_broken_selectors() {
        assert!(SelectorList::parse("").is_err());
        assert!(SelectorList::parse("a >").is_err());
        assert!(SelectorList::parse("[href").is_err());
        assert!(SelectorList::parse("a:not(.b").is_err());
    }
}

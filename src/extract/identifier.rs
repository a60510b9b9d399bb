use std::fmt::Write;

use crate::page::{ElementId, StyleSource};

/// Builds a selector-like label for an element:
/// `tag[#id][.class...][:nth-child(n)]`.
///
/// The `:nth-child` suffix is only added for elements without an id that
/// have a parent. Labels are best-effort; classless siblings under different
/// parents can collide.
pub fn identify<S: StyleSource + ?Sized>(page: &S, element: ElementId) -> String {
    let mut label = page
        .tag_name(element)
        .unwrap_or("unknown")
        .to_ascii_lowercase();

    let id = page
        .attribute(element, "id")
        .map(str::trim)
        .filter(|id| !id.is_empty());
    if let Some(id) = id {
        label.push('#');
        label.push_str(id);
    }

    let classes = page.classes(element);
    if !classes.is_empty() {
        label.push('.');
        label.push_str(&classes.join("."));
    }

    if id.is_none() {
        let position = page.parent(element).and_then(|parent| {
            page.children(parent)
                .iter()
                .position(|&child| child == element)
        });
        if let Some(index) = position {
            let _ = write!(label, ":nth-child({})", index + 1);
        }
    }

    label
}

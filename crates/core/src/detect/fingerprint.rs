use std::fmt;

use serde::Serialize;

use crate::parse::Element;
use crate::selector::compound;

/// Structural signature used to recognise repeated items.
///
/// Two elements share a fingerprint when they have the same tag, the same set of
/// classes (order-insensitive) and sit at the same depth below their nearest
/// id-bearing ancestor (or below the document root when there is none).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct Fingerprint {
    pub tag: String,
    /// Sorted, de-duplicated class names.
    pub classes: Vec<String>,
    pub depth: usize,
}

impl Fingerprint {
    pub fn of(element: Element<'_>) -> Self {
        let classes = element.classes().into_iter().map(str::to_string).collect();
        Self { tag: element.tag_name(), classes, depth: relative_depth(element) }
    }

    pub fn matches(&self, element: Element<'_>) -> bool {
        *self == Fingerprint::of(element)
    }

    /// The fingerprint as a relative CSS selector, `tag.class1.class2`.
    pub fn selector(&self) -> String {
        let classes: Vec<&str> = self.classes.iter().map(String::as_str).collect();
        compound(&self.tag, &classes)
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.selector(), self.depth)
    }
}

/// Levels between `element` and its nearest ancestor carrying an id.
fn relative_depth(element: Element<'_>) -> usize {
    let mut depth = 0;
    for ancestor in element.ancestors() {
        depth += 1;
        if ancestor.id().is_some() {
            break;
        }
    }
    depth
}

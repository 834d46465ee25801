//! HTML parsing and DOM navigation.
//!
//! This module provides the [`Document`] and [`Element`] types. A document is an
//! immutable arena of nodes (owned by `scraper`); an [`Element`] is a cheap, copyable
//! reference into that arena, so parent and sibling traversal are read-only lookups
//! and no node owns another.
//!
//! # Example
//!
//! ```rust
//! use gleaner_core::parse::Document;
//!
//! let html = r#"
//!     <html>
//!         <body>
//!             <h1>Title</h1>
//!             <p class="content">Paragraph</p>
//!         </body>
//!     </html>
//! "#;
//!
//! let doc = Document::parse(html).unwrap();
//! let paragraphs = doc.select("p.content").unwrap();
//! assert_eq!(paragraphs[0].text(), "Paragraph");
//! ```

use scraper::{ElementRef, Html, Selector};

use crate::{GleanerError, Result};

/// Compiles a CSS selector, reporting syntax problems as [`GleanerError::SelectorSyntax`].
pub fn compile_selector(selector: &str) -> Result<Selector> {
    if selector.trim().is_empty() {
        return Err(GleanerError::SelectorSyntax {
            selector: selector.to_string(),
            reason: "selector is empty".to_string(),
        });
    }

    Selector::parse(selector)
        .map_err(|e| GleanerError::SelectorSyntax { selector: selector.to_string(), reason: e.to_string() })
}

/// Collapses runs of whitespace to single spaces and trims both ends.
pub fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Represents a parsed HTML document.
///
/// Parsing is lenient (html5ever recovers from unbalanced tags, stray text and
/// missing wrappers); only input with no markup at all is rejected.
///
/// # Example
///
/// ```rust
/// use gleaner_core::parse::Document;
///
/// let doc = Document::parse("<ul><li>a</li><li>b</li></ul>").unwrap();
/// assert_eq!(doc.select("li").unwrap().len(), 2);
/// ```
pub struct Document {
    html: Html,
}

impl Document {
    /// Parses HTML from a string.
    ///
    /// # Errors
    ///
    /// Returns [`GleanerError::Extraction`] if the input is empty or whitespace-only.
    pub fn parse(html: &str) -> Result<Self> {
        if html.trim().is_empty() {
            return Err(GleanerError::Extraction { rule_id: None, reason: "document is empty".to_string() });
        }

        let html = Html::parse_document(html);
        if !html.errors.is_empty() {
            tracing::debug!(errors = html.errors.len(), "recovered from HTML parse errors");
        }

        Ok(Self { html })
    }

    /// Parses HTML from raw bytes, which must be valid UTF-8.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let text = std::str::from_utf8(bytes).map_err(|_| GleanerError::InvalidEncoding)?;
        Self::parse(text)
    }

    /// Gets the underlying `scraper::Html`.
    pub fn html(&self) -> &Html {
        &self.html
    }

    /// Gets the `<html>` element.
    pub fn root(&'_ self) -> Element<'_> {
        Element { element: self.html.root_element() }
    }

    /// Selects elements using a CSS selector, in document order.
    ///
    /// # Errors
    ///
    /// Returns [`GleanerError::SelectorSyntax`] if the selector is invalid.
    pub fn select(&'_ self, selector: &str) -> Result<Vec<Element<'_>>> {
        let sel = compile_selector(selector)?;
        Ok(self.select_compiled(&sel))
    }

    /// Selects elements using an already compiled selector.
    pub fn select_compiled(&'_ self, selector: &Selector) -> Vec<Element<'_>> {
        self.html.select(selector).map(|element| Element { element }).collect()
    }

    /// Gets the first element matching a CSS selector.
    pub fn select_first(&'_ self, selector: &str) -> Result<Option<Element<'_>>> {
        let sel = compile_selector(selector)?;
        Ok(self.select_first_compiled(&sel))
    }

    /// Gets the first element matching an already compiled selector.
    pub fn select_first_compiled(&'_ self, selector: &Selector) -> Option<Element<'_>> {
        self.html.select(selector).next().map(|element| Element { element })
    }

    /// Gets the title of the document.
    pub fn title(&self) -> Option<String> {
        let selector = Selector::parse("title").ok()?;
        self.html
            .select(&selector)
            .next()
            .map(|el| normalize_whitespace(&el.text().collect::<String>()))
    }

    /// Iterates over every element in document order.
    pub fn elements(&'_ self) -> impl Iterator<Item = Element<'_>> {
        self.html.tree.nodes().filter_map(ElementRef::wrap).map(|element| Element { element })
    }
}

/// A reference to one element of a [`Document`].
///
/// Elements compare equal when they point at the same node of the same document.
///
/// # Example
///
/// ```rust
/// use gleaner_core::parse::Document;
///
/// let html = r#"<a href="https://example.com">Link   text</a>"#;
/// let doc = Document::parse(html).unwrap();
/// let link = doc.select("a").unwrap()[0];
///
/// assert_eq!(link.text(), "Link text");
/// assert_eq!(link.attr("href"), Some("https://example.com"));
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Element<'a> {
    element: ElementRef<'a>,
}

impl<'a> Element<'a> {
    /// Gets the underlying `scraper::ElementRef`.
    pub fn element_ref(&self) -> ElementRef<'a> {
        self.element
    }

    /// Gets the outer HTML of this element.
    pub fn outer_html(&self) -> String {
        self.element.html()
    }

    /// Gets the inner HTML of this element.
    pub fn inner_html(&self) -> String {
        self.element.inner_html()
    }

    /// Gets the whitespace-collapsed, trimmed text content of this element.
    pub fn text(&self) -> String {
        normalize_whitespace(&self.raw_text())
    }

    /// Gets the concatenation of all descendant text nodes, untouched.
    pub fn raw_text(&self) -> String {
        self.element.text().collect()
    }

    /// Gets the text of this element's direct text-node children only.
    pub fn own_text(&self) -> String {
        let own: String = self
            .element
            .children()
            .filter_map(|node| node.value().as_text().map(|t| t.to_string()))
            .collect();
        normalize_whitespace(&own)
    }

    /// Gets the value of an attribute.
    pub fn attr(&self, name: &str) -> Option<&'a str> {
        self.element.value().attr(name)
    }

    /// Gets the tag name as parsed: lowercase for HTML ("div", "a"), case kept for
    /// foreign content such as SVG's `foreignObject`.
    pub fn tag_name(&self) -> String {
        self.element.value().name().to_string()
    }

    /// Gets the `id` attribute, if present and non-empty.
    pub fn id(&self) -> Option<&'a str> {
        self.element.value().id().filter(|id| !id.trim().is_empty())
    }

    /// Gets the class names, sorted and de-duplicated.
    pub fn classes(&self) -> Vec<&'a str> {
        let mut classes: Vec<&'a str> = self.element.value().classes().collect();
        classes.sort_unstable();
        classes.dedup();
        classes
    }

    /// Gets the parent element, if the parent is an element (not the document node).
    pub fn parent(&self) -> Option<Element<'a>> {
        self.element.parent().and_then(ElementRef::wrap).map(|element| Element { element })
    }

    /// Iterates over ancestors, nearest first.
    pub fn ancestors(&self) -> impl Iterator<Item = Element<'a>> + use<'a> {
        self.element.ancestors().filter_map(ElementRef::wrap).map(|element| Element { element })
    }

    /// Gets the element children in document order.
    pub fn children(&self) -> Vec<Element<'a>> {
        self.element
            .children()
            .filter_map(ElementRef::wrap)
            .map(|element| Element { element })
            .collect()
    }

    /// Gets the sibling elements before this one, nearest first.
    pub fn prev_siblings(&self) -> Vec<Element<'a>> {
        self.element
            .prev_siblings()
            .filter_map(ElementRef::wrap)
            .map(|element| Element { element })
            .collect()
    }

    /// Gets the sibling elements after this one, nearest first.
    pub fn next_siblings(&self) -> Vec<Element<'a>> {
        self.element
            .next_siblings()
            .filter_map(ElementRef::wrap)
            .map(|element| Element { element })
            .collect()
    }

    /// 1-based position among all element siblings, as `:nth-child` counts it.
    pub fn child_index(&self) -> usize {
        self.element.prev_siblings().filter_map(ElementRef::wrap).count() + 1
    }

    /// 1-based position among element siblings of the same tag, as `:nth-of-type` counts it.
    pub fn type_index(&self) -> usize {
        let tag = self.element.value().name();
        self.element
            .prev_siblings()
            .filter_map(ElementRef::wrap)
            .filter(|sib| sib.value().name() == tag)
            .count()
            + 1
    }

    /// Number of element ancestors.
    pub fn depth(&self) -> usize {
        self.ancestors().count()
    }

    /// Whether `other` is this element or lies inside it.
    pub fn contains(&self, other: &Element<'a>) -> bool {
        other == self || other.ancestors().any(|a| a == *self)
    }

    /// Selects descendant elements using a CSS selector.
    ///
    /// # Errors
    ///
    /// Returns [`GleanerError::SelectorSyntax`] if the selector is invalid.
    pub fn select(&self, selector: &str) -> Result<Vec<Element<'a>>> {
        let sel = compile_selector(selector)?;
        Ok(self.select_compiled(&sel))
    }

    /// Selects descendant elements using an already compiled selector.
    pub fn select_compiled(&self, selector: &Selector) -> Vec<Element<'a>> {
        self.element.select(selector).map(|element| Element { element }).collect()
    }

    /// Gets the first descendant matching an already compiled selector.
    pub fn select_first_compiled(&self, selector: &Selector) -> Option<Element<'a>> {
        self.element.select(selector).next().map(|element| Element { element })
    }

    /// Short human-readable description, e.g. `li.item.active`.
    pub fn describe(&self) -> String {
        let mut out = self.tag_name();
        if let Some(id) = self.id() {
            out.push('#');
            out.push_str(id);
        }
        for class in self.classes() {
            out.push('.');
            out.push_str(class);
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE_HTML: &str = r#"
        <!DOCTYPE html>
        <html lang="en">
        <head>
            <meta charset="UTF-8">
            <title>Test   Page</title>
        </head>
        <body>
            <h1>Heading</h1>
            <ul id="list">
                <li class="item">One</li>
                <li class="item">  Two
                    <b>bold</b> </li>
                <li class="item last">Three</li>
            </ul>
            <a href="https://example.com">Link</a>
        </body>
        </html>
    "#;

    #[test]
    fn test_parse_document() {
        let doc = Document::parse(SAMPLE_HTML).unwrap();
        assert_eq!(doc.title(), Some("Test Page".to_string()));
    }

    #[test]
    fn test_empty_document_rejected() {
        assert!(matches!(Document::parse("   \n "), Err(GleanerError::Extraction { rule_id: None, .. })));
    }

    #[test]
    fn test_invalid_utf8_rejected() {
        assert!(matches!(Document::from_bytes(&[0x3c, 0xff, 0xfe]), Err(GleanerError::InvalidEncoding)));
    }

    #[test]
    fn test_malformed_markup_is_recovered() {
        let doc = Document::parse("<div><p>unclosed <span>text</div>").unwrap();
        assert_eq!(doc.select("span").unwrap()[0].text(), "text");
    }

    #[test]
    fn test_select_elements_and_normalized_text() {
        let doc = Document::parse(SAMPLE_HTML).unwrap();
        let items = doc.select("li.item").unwrap();

        assert_eq!(items.len(), 3);
        assert_eq!(items[0].text(), "One");
        assert_eq!(items[1].text(), "Two bold");
        assert_eq!(items[1].own_text(), "Two");
    }

    #[test]
    fn test_navigation() {
        let doc = Document::parse(SAMPLE_HTML).unwrap();
        let items = doc.select("li").unwrap();
        let list = items[0].parent().unwrap();

        assert_eq!(list.id(), Some("list"));
        assert_eq!(list.children().len(), 3);
        assert_eq!(items[2].child_index(), 3);
        assert_eq!(items[2].prev_siblings(), vec![items[1], items[0]]);
        assert_eq!(items[0].next_siblings().len(), 2);
        assert!(list.contains(&items[1]));
        assert!(!items[0].contains(&list));
        assert_eq!(items[2].describe(), "li.item.last");
    }

    #[test]
    fn test_invalid_selector() {
        let doc = Document::parse(SAMPLE_HTML).unwrap();
        let result = doc.select("[[invalid");

        assert!(matches!(result, Err(GleanerError::SelectorSyntax { .. })));
        assert!(matches!(compile_selector("  "), Err(GleanerError::SelectorSyntax { .. })));
    }

    #[test]
    fn test_scoped_select() {
        let doc = Document::parse(SAMPLE_HTML).unwrap();
        let item = doc.select("li").unwrap()[1];
        let bold = item.select("b").unwrap();

        assert_eq!(bold.len(), 1);
        assert!(doc.select("li").unwrap()[0].select("b").unwrap().is_empty());
    }
}

//! Selector synthesis for targeted elements.
//!
//! Given an element picked in a document, [`synthesize`] produces CSS selectors
//! that resolve to exactly that element, best-first:
//!
//! 1. `#id` when the element's id is unique in the document.
//! 2. `tag.class1.class2` using all of the element's classes, when unique.
//! 3. An anchored chain `anchor > tag:nth-child(k) > ...` below the nearest ancestor
//!    that resolves through (1) or (2).
//! 4. A full positional path from `html`, which always resolves but breaks as soon
//!    as sibling order changes.
//!
//! Synthesis is a pure function of the document and the element.

use serde::Serialize;

use crate::parse::{Document, Element, compile_selector};
use crate::{GleanerError, Result};

/// How a candidate selector was built.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    Id,
    Classes,
    Anchored,
    Positional,
}

/// How well a selector is expected to survive structural drift between pages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Robustness {
    Low,
    Medium,
    High,
}

impl Strategy {
    pub fn robustness(self) -> Robustness {
        match self {
            Strategy::Id | Strategy::Classes => Robustness::High,
            Strategy::Anchored => Robustness::Medium,
            Strategy::Positional => Robustness::Low,
        }
    }
}

/// A selector that uniquely resolves to the target element.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SelectorCandidate {
    pub selector: String,
    pub strategy: Strategy,
    pub robustness: Robustness,
}

impl SelectorCandidate {
    fn new(selector: String, strategy: Strategy) -> Self {
        Self { selector, strategy, robustness: strategy.robustness() }
    }

    /// Whether this candidate is only a positional path.
    pub fn is_low_robustness(&self) -> bool {
        self.robustness == Robustness::Low
    }
}

/// Controls how many alternatives synthesis returns.
#[derive(Debug, Clone)]
pub struct SynthesisConfig {
    /// Maximum number of candidates to return (default: 1, the first winner).
    pub max_candidates: usize,
}

impl Default for SynthesisConfig {
    fn default() -> Self {
        Self { max_candidates: 1 }
    }
}

impl SynthesisConfig {
    /// Returns up to `n` candidates instead of only the winner.
    pub fn with_max_candidates(mut self, n: usize) -> Self {
        self.max_candidates = n.max(1);
        self
    }
}

/// Checks that a selector is syntactically valid CSS.
///
/// # Example
///
/// ```rust
/// use gleaner_core::validate_selector;
///
/// assert!(validate_selector("ul#results > li.item:nth-child(2)").is_ok());
/// assert!(validate_selector("li[").is_err());
/// ```
pub fn validate_selector(selector: &str) -> Result<()> {
    compile_selector(selector).map(|_| ())
}

/// Synthesizes the best selector for `target` (first winner only).
pub fn synthesize(doc: &Document, target: Element<'_>) -> Vec<SelectorCandidate> {
    synthesize_with_config(doc, target, &SynthesisConfig::default())
}

/// Synthesizes up to `config.max_candidates` selectors for `target`, best-first.
///
/// The result is never empty: the positional path is appended when nothing
/// better resolves uniquely.
///
/// # Example
///
/// ```rust
/// use gleaner_core::parse::Document;
/// use gleaner_core::selector::{Strategy, synthesize};
///
/// let doc = Document::parse(r#"<div id="main"><p>a</p><p>b</p></div>"#).unwrap();
/// let second = doc.select("p").unwrap()[1];
/// let best = &synthesize(&doc, second)[0];
/// assert_eq!(best.selector, "#main > p:nth-child(2)");
/// assert_eq!(best.strategy, Strategy::Anchored);
/// ```
pub fn synthesize_with_config(
    doc: &Document, target: Element<'_>, config: &SynthesisConfig,
) -> Vec<SelectorCandidate> {
    let max = config.max_candidates.max(1);
    let mut candidates: Vec<SelectorCandidate> = Vec::new();

    let push = |candidate: SelectorCandidate, candidates: &mut Vec<SelectorCandidate>| {
        if candidates.len() < max && !candidates.iter().any(|c| c.selector == candidate.selector) {
            candidates.push(candidate);
        }
    };

    if let Some(selector) = id_selector(&target)
        && resolves_to(doc, &selector, target)
    {
        push(SelectorCandidate::new(selector, Strategy::Id), &mut candidates);
    }

    if let Some(selector) = class_selector(&target)
        && resolves_to(doc, &selector, target)
    {
        push(SelectorCandidate::new(selector, Strategy::Classes), &mut candidates);
    }

    if candidates.len() < max
        && let Some(selector) = anchored_selector(doc, target)
    {
        push(SelectorCandidate::new(selector, Strategy::Anchored), &mut candidates);
    }

    if candidates.len() < max {
        let selector = positional_path(target);
        if resolves_to(doc, &selector, target) {
            push(SelectorCandidate::new(selector, Strategy::Positional), &mut candidates);
        } else if candidates.is_empty() {
            tracing::warn!(selector = %selector, "positional path did not resolve uniquely");
            push(SelectorCandidate::new(selector, Strategy::Positional), &mut candidates);
        }
    }

    tracing::debug!(
        target = %target.describe(),
        best = %candidates.first().map(|c| c.selector.as_str()).unwrap_or_default(),
        "synthesized selectors"
    );

    candidates
}

/// The single best selector for `target`.
pub fn best_selector(doc: &Document, target: Element<'_>) -> SelectorCandidate {
    synthesize(doc, target)
        .into_iter()
        .next()
        .unwrap_or_else(|| SelectorCandidate::new(positional_path(target), Strategy::Positional))
}

/// Whether `selector` matches exactly one element in `doc`, and that element is `target`.
pub fn resolves_to(doc: &Document, selector: &str, target: Element<'_>) -> bool {
    match compile_selector(selector) {
        Ok(sel) => {
            let matches = doc.select_compiled(&sel);
            matches.len() == 1 && matches[0] == target
        }
        Err(_) => false,
    }
}

/// Number of elements `selector` matches in `doc`.
pub fn match_count(doc: &Document, selector: &str) -> Result<usize> {
    let sel = compile_selector(selector)?;
    Ok(doc.select_compiled(&sel).len())
}

/// `#id` for an element with an id, without a uniqueness check.
pub fn id_selector(element: &Element<'_>) -> Option<String> {
    element.id().map(|id| format!("#{}", escape_ident(id)))
}

/// `tag.class1.class2` for an element with at least one class, without a uniqueness check.
pub fn class_selector(element: &Element<'_>) -> Option<String> {
    let classes = element.classes();
    if classes.is_empty() {
        return None;
    }
    Some(compound(&element.tag_name(), &classes))
}

/// Builds `tag.class1.class2` from a tag and class names.
pub fn compound(tag: &str, classes: &[&str]) -> String {
    let mut out = escape_ident(tag);
    for class in classes {
        out.push('.');
        out.push_str(&escape_ident(class));
    }
    out
}

/// Id or class selector if either resolves uniquely to `element`.
fn unique_simple_selector(doc: &Document, element: Element<'_>) -> Option<String> {
    id_selector(&element)
        .filter(|s| resolves_to(doc, s, element))
        .or_else(|| class_selector(&element).filter(|s| resolves_to(doc, s, element)))
}

/// `anchor > a:nth-child(i) > b:nth-child(j)` below the nearest uniquely resolvable ancestor.
fn anchored_selector(doc: &Document, target: Element<'_>) -> Option<String> {
    let mut steps = vec![nth_child_step(&target)];

    for ancestor in target.ancestors() {
        if let Some(anchor) = unique_simple_selector(doc, ancestor) {
            let mut selector = anchor;
            for step in steps.iter().rev() {
                selector.push_str(" > ");
                selector.push_str(step);
            }
            if resolves_to(doc, &selector, target) {
                return Some(selector);
            }
        }
        if ancestor.parent().is_none() {
            break;
        }
        steps.push(nth_child_step(&ancestor));
    }

    None
}

/// Full path from the root element, `:nth-child` at every level below `html`.
pub fn positional_path(target: Element<'_>) -> String {
    let mut chain: Vec<Element<'_>> = vec![target];
    chain.extend(target.ancestors());
    chain.reverse();

    let mut parts = Vec::with_capacity(chain.len());
    for (i, element) in chain.iter().enumerate() {
        if i == 0 && element.parent().is_none() {
            parts.push(escape_ident(&element.tag_name()));
        } else {
            parts.push(nth_child_step(element));
        }
    }
    parts.join(" > ")
}

pub(crate) fn nth_child_step(element: &Element<'_>) -> String {
    format!("{}:nth-child({})", escape_ident(&element.tag_name()), element.child_index())
}

/// Escapes a string for use as a CSS identifier (the `CSS.escape` rules).
pub fn escape_ident(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let chars: Vec<char> = value.chars().collect();

    for (i, &c) in chars.iter().enumerate() {
        let leading_digit = c.is_ascii_digit() && (i == 0 || (i == 1 && chars[0] == '-'));
        if c == '\0' {
            out.push('\u{FFFD}');
        } else if leading_digit || c.is_control() {
            out.push_str(&format!("\\{:x} ", c as u32));
        } else if i == 0 && c == '-' && chars.len() == 1 {
            out.push_str("\\-");
        } else if c.is_ascii_alphanumeric() || c == '-' || c == '_' || !c.is_ascii() {
            out.push(c);
        } else {
            out.push('\\');
            out.push(c);
        }
    }

    out
}

/// Ensures a selector is usable for a rule, mapping syntax failures to the rule name.
pub fn check_rule_selector(rule: &str, selector: &str) -> Result<()> {
    validate_selector(selector).map_err(|e| match e {
        GleanerError::SelectorSyntax { selector, reason } => {
            GleanerError::SelectorSyntax { selector, reason: format!("{} (rule '{}')", reason, rule) }
        }
        other => other,
    })
}

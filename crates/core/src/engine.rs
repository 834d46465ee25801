//! Rule execution.
//!
//! A [`RuleTree`] is compiled once into a [`Program`] (every selector parsed up
//! front, so syntax errors surface before any document is touched) and then run
//! against any number of documents. Execution is a pure function of the document
//! and the program: the same inputs always yield the same [`Record`].
//!
//! Scalar rules take the **first** element their selector matches within the
//! current scope. Additional matches are ignored, and a selector that matches
//! nothing yields [`Value::Null`] rather than an error. A selector of exactly
//! `:scope` reads the scope element itself (the `<html>` element at top level).
//!
//! # Example
//!
//! ```rust
//! use gleaner_core::{Rule, RuleTree, extract_html};
//!
//! let html = r#"<ul><li><b>a</b></li><li><b>b</b><b>c</b></li></ul>"#;
//! let tree = RuleTree::with_rules("page", vec![Rule::list("items", "li", vec![Rule::text("first", "b")])]);
//!
//! let record = extract_html(html, &tree).unwrap();
//! let items = record.list("items").unwrap();
//! assert_eq!(items[1].text("first"), Some("b"));
//! ```

use scraper::Selector;
use serde::Serialize;

use crate::parse::{Document, Element, compile_selector};
use crate::record::{Record, Value};
use crate::rule::{Rule, RuleKind, RuleTree};
use crate::Result;

/// Number of sample values a selector probe keeps.
pub const PROBE_SAMPLES: usize = 5;
/// Maximum characters per probe sample.
pub const PROBE_SAMPLE_CHARS: usize = 200;

/// The subtree a rule's selector is evaluated against.
#[derive(Clone, Copy)]
pub enum Scope<'a> {
    /// Top-level rules see the whole document.
    Document(&'a Document),
    /// Children of a structured list see only their container's descendants.
    Element(Element<'a>),
}

impl<'a> Scope<'a> {
    fn itself(&self) -> Element<'a> {
        match self {
            Scope::Document(doc) => doc.root(),
            Scope::Element(element) => *element,
        }
    }

    fn select_all(&self, selector: &Selector) -> Vec<Element<'a>> {
        match self {
            Scope::Document(doc) => doc.select_compiled(selector),
            Scope::Element(element) => element.select_compiled(selector),
        }
    }

    fn select_first(&self, selector: &Selector) -> Option<Element<'a>> {
        match self {
            Scope::Document(doc) => doc.select_first_compiled(selector),
            Scope::Element(element) => element.select_first_compiled(selector),
        }
    }
}

impl<'a> From<&'a Document> for Scope<'a> {
    fn from(doc: &'a Document) -> Self {
        Scope::Document(doc)
    }
}

impl<'a> From<Element<'a>> for Scope<'a> {
    fn from(element: Element<'a>) -> Self {
        Scope::Element(element)
    }
}

/// The selector that addresses the scope element itself.
pub const SCOPE_SELECTOR: &str = ":scope";

fn is_scope_selector(selector: &str) -> bool {
    selector.trim() == SCOPE_SELECTOR
}

fn matches_in<'a>(scope: &Scope<'a>, selector: &Selector, itself: bool) -> Vec<Element<'a>> {
    if itself { vec![scope.itself()] } else { scope.select_all(selector) }
}

enum Extract {
    Text,
    Attribute(String),
    List,
}

struct CompiledRule {
    name: String,
    extract: Extract,
    selector: Selector,
    itself: bool,
    children: Vec<CompiledRule>,
}

impl CompiledRule {
    fn compile(rule: &Rule) -> Result<Self> {
        let selector = compile_selector(&rule.selector).map_err(|e| e.at_rule(&rule.id))?;
        let children = rule.children().iter().map(CompiledRule::compile).collect::<Result<Vec<_>>>()?;
        let extract = match &rule.kind {
            RuleKind::ScalarText => Extract::Text,
            RuleKind::ScalarAttribute { attribute } => Extract::Attribute(attribute.clone()),
            RuleKind::StructuredList { .. } => Extract::List,
        };
        Ok(Self { name: rule.name.clone(), extract, selector, itself: is_scope_selector(&rule.selector), children })
    }

    fn first<'a>(&self, scope: &Scope<'a>) -> Option<Element<'a>> {
        if self.itself { Some(scope.itself()) } else { scope.select_first(&self.selector) }
    }

    fn run(&self, scope: Scope<'_>) -> Value {
        match &self.extract {
            Extract::Text => self.first(&scope).map(|el| el.text()).into(),
            Extract::Attribute(attribute) => {
                self.first(&scope).and_then(|el| el.attr(attribute)).map(str::to_string).into()
            }
            Extract::List => {
                let containers = matches_in(&scope, &self.selector, self.itself);
                tracing::debug!(rule = %self.name, containers = containers.len(), "structured list matched");
                let items = containers.into_iter().map(|c| run_children(&self.children, Scope::Element(c))).collect();
                Value::List(items)
            }
        }
    }
}

fn run_children(children: &[CompiledRule], scope: Scope<'_>) -> Record {
    let mut record = Record::new();
    for child in children {
        record.insert(child.name.clone(), child.run(scope));
    }
    record
}

/// A rule tree with every selector compiled, ready to run against documents.
///
/// A program owns everything it needs, so one compiled program can be shared
/// across threads (behind an `Arc`) and outlive the tree it came from.
pub struct Program {
    name: String,
    rules: Vec<CompiledRule>,
}

impl Program {
    /// Compiles every selector in `tree`.
    ///
    /// # Errors
    ///
    /// Returns [`GleanerError::Extraction`] carrying the id of the first rule whose
    /// selector is not valid CSS.
    pub fn compile(tree: &RuleTree) -> Result<Self> {
        let rules = tree.rules.iter().map(CompiledRule::compile).collect::<Result<Vec<_>>>()?;
        Ok(Self { name: tree.name.clone(), rules })
    }

    /// Name of the synthetic root.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Runs the program against one document, producing the root record.
    pub fn execute(&self, doc: &Document) -> Record {
        run_children(&self.rules, Scope::Document(doc))
    }

    /// Parses `html` and runs the program against it.
    ///
    /// # Errors
    ///
    /// Returns [`GleanerError::Extraction`] when the input has no markup at all.
    pub fn execute_html(&self, html: &str) -> Result<Record> {
        let doc = Document::parse(html)?;
        Ok(self.execute(&doc))
    }
}

/// Executes a single rule (and its children) within `scope`.
///
/// # Errors
///
/// Returns [`GleanerError::Extraction`] if any selector in the rule is invalid.
pub fn execute<'a>(scope: impl Into<Scope<'a>>, rule: &Rule) -> Result<Value> {
    let compiled = CompiledRule::compile(rule)?;
    Ok(compiled.run(scope.into()))
}

/// Executes a whole rule tree against a parsed document.
pub fn execute_tree(doc: &Document, tree: &RuleTree) -> Result<Record> {
    Ok(Program::compile(tree)?.execute(doc))
}

/// Parses `html` and executes `tree` against it.
///
/// # Errors
///
/// Returns [`GleanerError::Extraction`] when the input has no markup at all or a
/// selector is invalid.
pub fn extract_html(html: &str, tree: &RuleTree) -> Result<Record> {
    Program::compile(tree)?.execute_html(html)
}

/// What a rule's selector finds, for checking rules against a live page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SelectorProbe {
    pub rule_id: String,
    pub name: String,
    pub selector: String,
    /// Nesting depth, 0 for top-level rules.
    pub depth: usize,
    /// Total matches across every scope the rule is evaluated in.
    pub found_count: usize,
    pub samples: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl SelectorProbe {
    pub fn is_success(&self) -> bool {
        self.error.is_none() && self.found_count > 0
    }
}

/// Probes one rule's selector against the whole document.
///
/// Never fails: an invalid selector or an empty result is reported in
/// [`SelectorProbe::error`].
pub fn probe(doc: &Document, rule: &Rule) -> SelectorProbe {
    probe_in(rule, 0, &[Scope::Document(doc)]).0
}

/// Probes every rule of `tree` in pre-order. Children are evaluated inside the
/// containers their parent list matched.
pub fn probe_tree(doc: &Document, tree: &RuleTree) -> Vec<SelectorProbe> {
    let mut out = Vec::with_capacity(tree.len());
    probe_rules(&tree.rules, 0, &[Scope::Document(doc)], &mut out);
    out
}

fn probe_rules<'a>(rules: &[Rule], depth: usize, scopes: &[Scope<'a>], out: &mut Vec<SelectorProbe>) {
    for rule in rules {
        let (result, containers) = probe_in(rule, depth, scopes);
        out.push(result);
        if rule.is_list() {
            let scopes: Vec<Scope<'a>> = containers.into_iter().map(Scope::Element).collect();
            probe_rules(rule.children(), depth + 1, &scopes, out);
        }
    }
}

fn probe_in<'a>(rule: &Rule, depth: usize, scopes: &[Scope<'a>]) -> (SelectorProbe, Vec<Element<'a>>) {
    let mut result = SelectorProbe {
        rule_id: rule.id.clone(),
        name: rule.name.clone(),
        selector: rule.selector.clone(),
        depth,
        found_count: 0,
        samples: Vec::new(),
        error: None,
    };

    let selector = match compile_selector(&rule.selector) {
        Ok(selector) => selector,
        Err(e) => {
            tracing::warn!(rule = %rule.name, error = %e, "selector probe failed");
            result.error = Some(e.to_string());
            return (result, Vec::new());
        }
    };

    let itself = is_scope_selector(&rule.selector);
    let matches: Vec<Element<'a>> = scopes.iter().flat_map(|scope| matches_in(scope, &selector, itself)).collect();
    result.found_count = matches.len();
    result.samples = matches.iter().take(PROBE_SAMPLES).map(|el| truncate_chars(&sample_value(rule, el))).collect();
    if matches.is_empty() {
        result.error = Some("no elements found".to_string());
    }

    (result, matches)
}

fn sample_value(rule: &Rule, element: &Element<'_>) -> String {
    match &rule.kind {
        RuleKind::ScalarAttribute { attribute } => element.attr(attribute).unwrap_or_default().to_string(),
        _ => element.text(),
    }
}

fn truncate_chars(text: &str) -> String {
    text.chars().take(PROBE_SAMPLE_CHARS).collect()
}

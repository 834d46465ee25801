//! The rule model: a declarative extraction program.
//!
//! A [`RuleTree`] is a named synthetic root holding ordered top-level [`Rule`]s.
//! Each rule is a tagged union over its [`RuleKind`]: scalar rules read one value
//! from the first element their selector matches; structured lists produce one
//! nested record per matched container. Children are owned by their parent, so
//! the tree is acyclic by construction.
//!
//! Edits go through [`RuleTree::add_child`], [`RuleTree::remove`],
//! [`RuleTree::rename`] and [`RuleTree::set_selector`], each of which keeps the
//! sibling-name and selector-syntax invariants.
//!
//! # Example
//!
//! ```rust
//! use gleaner_core::{Rule, RuleTree};
//!
//! let mut tree = RuleTree::new("products");
//! let list = Rule::list("items", "ul.products > li", vec![Rule::text("title", "h2")]);
//! let list_id = list.id.clone();
//! tree.add_child(None, list).unwrap();
//! tree.add_child(Some(&list_id), Rule::attribute("link", "a", "href")).unwrap();
//!
//! assert!(tree.add_child(Some(&list_id), Rule::text("title", "h3")).is_err());
//! ```

use serde::{Deserialize, Serialize};

use crate::selector::check_rule_selector;
use crate::{GleanerError, Result};

/// Generates a fresh rule id.
pub fn new_rule_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// What a rule extracts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RuleKind {
    /// Normalized text of the first match.
    ScalarText,
    /// An attribute of the first match.
    ScalarAttribute { attribute: String },
    /// One nested record per matched container.
    StructuredList { children: Vec<Rule> },
}

/// One node of the extraction program.
///
/// Deserialization is strict: unknown keys are rejected, as are `attribute`
/// on anything but `scalar_attribute` and `children` on scalar rules.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawRule")]
pub struct Rule {
    /// Stable identifier.
    #[serde(default = "new_rule_id")]
    pub id: String,
    /// Output field or table name.
    pub name: String,
    /// CSS selector, relative to the parent rule's matched element.
    pub selector: String,
    /// Free-form note shown to whoever edits the rule.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(flatten)]
    pub kind: RuleKind,
}

#[derive(Deserialize)]
#[serde(rename_all = "snake_case")]
enum RawKind {
    ScalarText,
    ScalarAttribute,
    StructuredList,
}

/// The on-disk shape of a [`Rule`], checked by `TryFrom` before it becomes one.
#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct RawRule {
    #[serde(default = "new_rule_id")]
    id: String,
    name: String,
    selector: String,
    #[serde(default)]
    description: Option<String>,
    kind: RawKind,
    #[serde(default)]
    attribute: Option<String>,
    #[serde(default)]
    children: Option<Vec<Rule>>,
}

impl TryFrom<RawRule> for Rule {
    type Error = GleanerError;

    fn try_from(raw: RawRule) -> Result<Self> {
        let misplaced = |key: &str, kind: &str| GleanerError::InvalidRule {
            rule: raw.name.clone(),
            reason: format!("`{}` is not allowed on a {} rule", key, kind),
        };

        let kind = match raw.kind {
            RawKind::ScalarText => {
                if raw.attribute.is_some() {
                    return Err(misplaced("attribute", "scalar_text"));
                }
                if raw.children.is_some() {
                    return Err(misplaced("children", "scalar_text"));
                }
                RuleKind::ScalarText
            }
            RawKind::ScalarAttribute => {
                if raw.children.is_some() {
                    return Err(misplaced("children", "scalar_attribute"));
                }
                let attribute = raw.attribute.clone().ok_or_else(|| GleanerError::InvalidRule {
                    rule: raw.name.clone(),
                    reason: "scalar_attribute requires an attribute name".to_string(),
                })?;
                RuleKind::ScalarAttribute { attribute }
            }
            RawKind::StructuredList => {
                if raw.attribute.is_some() {
                    return Err(misplaced("attribute", "structured_list"));
                }
                RuleKind::StructuredList { children: raw.children.unwrap_or_default() }
            }
        };

        Ok(Self { id: raw.id, name: raw.name, selector: raw.selector, description: raw.description, kind })
    }
}

impl Rule {
    fn new(name: impl Into<String>, selector: impl Into<String>, kind: RuleKind) -> Self {
        Self { id: new_rule_id(), name: name.into(), selector: selector.into(), description: None, kind }
    }

    /// A `scalar_text` rule.
    pub fn text(name: impl Into<String>, selector: impl Into<String>) -> Self {
        Self::new(name, selector, RuleKind::ScalarText)
    }

    /// A `scalar_attribute` rule.
    pub fn attribute(name: impl Into<String>, selector: impl Into<String>, attribute: impl Into<String>) -> Self {
        Self::new(name, selector, RuleKind::ScalarAttribute { attribute: attribute.into() })
    }

    /// A `structured_list` rule.
    pub fn list(name: impl Into<String>, selector: impl Into<String>, children: Vec<Rule>) -> Self {
        Self::new(name, selector, RuleKind::StructuredList { children })
    }

    /// Replaces the generated id.
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn is_list(&self) -> bool {
        matches!(self.kind, RuleKind::StructuredList { .. })
    }

    /// Child rules; always empty for scalar rules.
    pub fn children(&self) -> &[Rule] {
        match &self.kind {
            RuleKind::StructuredList { children } => children,
            _ => &[],
        }
    }

    /// Kind name as written in configuration files.
    pub fn kind_name(&self) -> &'static str {
        match self.kind {
            RuleKind::ScalarText => "scalar_text",
            RuleKind::ScalarAttribute { .. } => "scalar_attribute",
            RuleKind::StructuredList { .. } => "structured_list",
        }
    }

    /// Validates this rule and its descendants.
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(GleanerError::InvalidRule { rule: self.id.clone(), reason: "name is empty".to_string() });
        }
        check_rule_selector(&self.name, &self.selector)?;

        match &self.kind {
            RuleKind::ScalarText => Ok(()),
            RuleKind::ScalarAttribute { attribute } if attribute.trim().is_empty() => Err(GleanerError::InvalidRule {
                rule: self.name.clone(),
                reason: "scalar_attribute requires an attribute name".to_string(),
            }),
            RuleKind::ScalarAttribute { .. } => Ok(()),
            RuleKind::StructuredList { children } => {
                if children.is_empty() {
                    return Err(GleanerError::InvalidRule {
                        rule: self.name.clone(),
                        reason: "structured_list requires at least one child".to_string(),
                    });
                }
                check_sibling_names(&self.name, children)?;
                children.iter().try_for_each(Rule::validate)
            }
        }
    }

    /// Number of rules in this subtree, including this one.
    pub fn size(&self) -> usize {
        1 + self.children().iter().map(Rule::size).sum::<usize>()
    }
}

fn check_sibling_names(parent: &str, siblings: &[Rule]) -> Result<()> {
    for (i, rule) in siblings.iter().enumerate() {
        if siblings[..i].iter().any(|other| other.name == rule.name) {
            return Err(GleanerError::DuplicateName { parent: parent.to_string(), name: rule.name.clone() });
        }
    }
    Ok(())
}

/// The root of an extraction program.
///
/// The root behaves as a structured list whose only container is the document
/// itself: executing a tree produces exactly one record per document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RuleTree {
    pub name: String,
    #[serde(default)]
    pub rules: Vec<Rule>,
}

impl RuleTree {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), rules: Vec::new() }
    }

    pub fn with_rules(name: impl Into<String>, rules: Vec<Rule>) -> Self {
        Self { name: name.into(), rules }
    }

    /// Validates names, selectors and kind shapes across the whole tree.
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(GleanerError::InvalidRule { rule: "<root>".to_string(), reason: "name is empty".to_string() });
        }
        check_sibling_names(&self.name, &self.rules)?;
        self.rules.iter().try_for_each(Rule::validate)
    }

    /// Finds a rule anywhere in the tree.
    pub fn find(&self, id: &str) -> Option<&Rule> {
        fn walk<'a>(rules: &'a [Rule], id: &str) -> Option<&'a Rule> {
            rules.iter().find_map(|rule| if rule.id == id { Some(rule) } else { walk(rule.children(), id) })
        }
        walk(&self.rules, id)
    }

    /// Finds a rule by name path, e.g. `["items", "price"]`.
    pub fn find_by_path(&self, path: &[&str]) -> Option<&Rule> {
        let (first, rest) = path.split_first()?;
        let mut current = self.rules.iter().find(|r| r.name == *first)?;
        for name in rest {
            current = current.children().iter().find(|r| r.name == *name)?;
        }
        Some(current)
    }

    /// Depth-first, pre-order traversal yielding each rule with its depth (top level = 0).
    pub fn walk(&self) -> Vec<(usize, &Rule)> {
        fn visit<'a>(rules: &'a [Rule], depth: usize, out: &mut Vec<(usize, &'a Rule)>) {
            for rule in rules {
                out.push((depth, rule));
                visit(rule.children(), depth + 1, out);
            }
        }
        let mut out = Vec::new();
        visit(&self.rules, 0, &mut out);
        out
    }

    /// Total number of rules, excluding the synthetic root.
    pub fn len(&self) -> usize {
        self.rules.iter().map(Rule::size).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Adds `rule` as the last child of `parent_id` (`None` for the root).
    ///
    /// # Errors
    ///
    /// [`GleanerError::NotFound`] for an unknown parent, [`GleanerError::InvalidRule`] if
    /// the parent is a scalar or `rule` is malformed, [`GleanerError::DuplicateName`] if a
    /// sibling already has the name, [`GleanerError::SelectorSyntax`] for a bad selector.
    pub fn add_child(&mut self, parent_id: Option<&str>, rule: Rule) -> Result<()> {
        rule.validate()?;

        let (parent_name, siblings) = match parent_id {
            None => (self.name.clone(), &mut self.rules),
            Some(id) => {
                let parent = find_mut(&mut self.rules, id).ok_or_else(|| GleanerError::NotFound(id.to_string()))?;
                let name = parent.name.clone();
                match &mut parent.kind {
                    RuleKind::StructuredList { children } => (name, children),
                    _ => {
                        return Err(GleanerError::InvalidRule {
                            rule: name,
                            reason: "scalar rules cannot have children".to_string(),
                        });
                    }
                }
            }
        };

        if siblings.iter().any(|r| r.name == rule.name) {
            return Err(GleanerError::DuplicateName { parent: parent_name, name: rule.name });
        }

        tracing::debug!(parent = %parent_name, rule = %rule.name, "added rule");
        siblings.push(rule);
        Ok(())
    }

    /// Removes a rule (and its subtree), returning it.
    ///
    /// Removing the only child of a structured list is rejected so the list keeps
    /// at least one child.
    pub fn remove(&mut self, id: &str) -> Result<Rule> {
        let (parent, siblings, index) =
            siblings_of_mut(&mut self.rules, id, None).ok_or_else(|| GleanerError::NotFound(id.to_string()))?;

        if let Some(parent) = parent
            && siblings.len() == 1
        {
            return Err(GleanerError::InvalidRule {
                rule: parent,
                reason: "structured_list requires at least one child".to_string(),
            });
        }

        Ok(siblings.remove(index))
    }

    /// Renames a rule, keeping sibling names unique.
    pub fn rename(&mut self, id: &str, name: impl Into<String>) -> Result<()> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(GleanerError::InvalidRule { rule: id.to_string(), reason: "name is empty".to_string() });
        }

        let (parent, siblings, index) =
            siblings_of_mut(&mut self.rules, id, None).ok_or_else(|| GleanerError::NotFound(id.to_string()))?;

        if siblings.iter().enumerate().any(|(i, r)| i != index && r.name == name) {
            let parent = parent.unwrap_or_else(|| self.name.clone());
            return Err(GleanerError::DuplicateName { parent, name });
        }

        siblings[index].name = name;
        Ok(())
    }

    /// Replaces a rule's selector after validating its syntax.
    pub fn set_selector(&mut self, id: &str, selector: impl Into<String>) -> Result<()> {
        let selector = selector.into();
        let rule = find_mut(&mut self.rules, id).ok_or_else(|| GleanerError::NotFound(id.to_string()))?;
        check_rule_selector(&rule.name, &selector)?;
        rule.selector = selector;
        Ok(())
    }
}

fn find_mut<'a>(rules: &'a mut [Rule], id: &str) -> Option<&'a mut Rule> {
    for rule in rules.iter_mut() {
        if rule.id == id {
            return Some(rule);
        }
        if let RuleKind::StructuredList { children } = &mut rule.kind
            && let Some(found) = find_mut(children, id)
        {
            return Some(found);
        }
    }
    None
}

/// Locates the sibling vector holding `id`, with the parent's name (`None` for the root).
fn siblings_of_mut<'a>(
    rules: &'a mut Vec<Rule>, id: &str, parent: Option<&str>,
) -> Option<(Option<String>, &'a mut Vec<Rule>, usize)> {
    if let Some(index) = rules.iter().position(|r| r.id == id) {
        return Some((parent.map(str::to_string), rules, index));
    }
    for rule in rules.iter_mut() {
        let name = rule.name.clone();
        if let RuleKind::StructuredList { children } = &mut rule.kind
            && let Some(found) = siblings_of_mut(children, id, Some(&name))
        {
            return Some(found);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_tree() -> RuleTree {
        RuleTree::with_rules(
            "page",
            vec![
                Rule::text("title", "h1").with_id("title"),
                Rule::list(
                    "items",
                    "li.item",
                    vec![Rule::text("name", ".name").with_id("name"), Rule::attribute("link", "a", "href").with_id("link")],
                )
                .with_id("items"),
            ],
        )
    }

    #[test]
    fn test_validate_sample() {
        assert!(sample_tree().validate().is_ok());
        assert_eq!(sample_tree().len(), 4);
    }

    #[test]
    fn test_add_child_to_root_and_list() {
        let mut tree = sample_tree();
        tree.add_child(None, Rule::text("subtitle", "h2")).unwrap();
        tree.add_child(Some("items"), Rule::text("price", ".price")).unwrap();

        assert_eq!(tree.rules.len(), 3);
        assert_eq!(tree.find("items").unwrap().children().len(), 3);
    }

    #[test]
    fn test_add_child_duplicate_name() {
        let mut tree = sample_tree();
        let err = tree.add_child(Some("items"), Rule::text("name", "span")).unwrap_err();
        assert!(matches!(err, GleanerError::DuplicateName { ref parent, ref name } if parent == "items" && name == "name"));

        let err = tree.add_child(None, Rule::text("title", "h2")).unwrap_err();
        assert!(matches!(err, GleanerError::DuplicateName { .. }));
    }

    #[test]
    fn test_add_child_unknown_parent_and_scalar_parent() {
        let mut tree = sample_tree();
        assert!(matches!(tree.add_child(Some("nope"), Rule::text("x", "p")), Err(GleanerError::NotFound(_))));
        assert!(matches!(tree.add_child(Some("title"), Rule::text("x", "p")), Err(GleanerError::InvalidRule { .. })));
    }

    #[test]
    fn test_add_child_rejects_bad_selector_immediately() {
        let mut tree = sample_tree();
        let err = tree.add_child(None, Rule::text("broken", "div[")).unwrap_err();
        assert!(matches!(err, GleanerError::SelectorSyntax { .. }));
    }

    #[test]
    fn test_remove() {
        let mut tree = sample_tree();
        let removed = tree.remove("link").unwrap();
        assert_eq!(removed.name, "link");
        assert!(tree.find("link").is_none());

        assert!(matches!(tree.remove("name"), Err(GleanerError::InvalidRule { .. })));
        assert!(matches!(tree.remove("missing"), Err(GleanerError::NotFound(_))));

        tree.remove("items").unwrap();
        assert_eq!(tree.len(), 1);
    }

    #[test]
    fn test_rename() {
        let mut tree = sample_tree();
        tree.rename("name", "label").unwrap();
        assert_eq!(tree.find("name").unwrap().name, "label");

        assert!(matches!(tree.rename("label", "link"), Err(GleanerError::NotFound(_))));
        assert!(matches!(tree.rename("name", "link"), Err(GleanerError::DuplicateName { .. })));
        tree.rename("name", "label").unwrap();
        assert!(matches!(tree.rename("missing", "x"), Err(GleanerError::NotFound(_))));
    }

    #[test]
    fn test_set_selector() {
        let mut tree = sample_tree();
        tree.set_selector("name", "span.title").unwrap();
        assert_eq!(tree.find("name").unwrap().selector, "span.title");

        assert!(matches!(tree.set_selector("name", "span["), Err(GleanerError::SelectorSyntax { .. })));
        assert_eq!(tree.find("name").unwrap().selector, "span.title");
        assert!(matches!(tree.set_selector("missing", "p"), Err(GleanerError::NotFound(_))));
    }

    #[test]
    fn test_validate_shape_errors() {
        let empty_list = RuleTree::with_rules("p", vec![Rule::list("items", "li", vec![])]);
        assert!(matches!(empty_list.validate(), Err(GleanerError::InvalidRule { .. })));

        let no_attr = RuleTree::with_rules("p", vec![Rule::attribute("link", "a", " ")]);
        assert!(matches!(no_attr.validate(), Err(GleanerError::InvalidRule { .. })));

        let dupes = RuleTree::with_rules("p", vec![Rule::text("a", "p"), Rule::text("a", "div")]);
        assert!(matches!(dupes.validate(), Err(GleanerError::DuplicateName { .. })));
    }

    #[test]
    fn test_walk_and_path_lookup() {
        let tree = sample_tree();
        let names: Vec<(usize, &str)> = tree.walk().iter().map(|(d, r)| (*d, r.name.as_str())).collect();
        assert_eq!(names, vec![(0, "title"), (0, "items"), (1, "name"), (1, "link")]);
        assert_eq!(tree.find_by_path(&["items", "link"]).unwrap().kind_name(), "scalar_attribute");
        assert!(tree.find_by_path(&["items", "nope"]).is_none());
    }

    #[test]
    fn test_serde_shape() {
        let rule = Rule::attribute("link", "a", "href").with_id("r1");
        let json = serde_json::to_value(&rule).unwrap();
        assert_eq!(json["kind"], "scalar_attribute");
        assert_eq!(json["attribute"], "href");
        assert!(json.get("description").is_none());

        let parsed: Rule = serde_json::from_str(r#"{"name":"t","selector":"h1","kind":"scalar_text"}"#).unwrap();
        assert_eq!(parsed.kind, RuleKind::ScalarText);
        assert!(!parsed.id.is_empty());
    }

    #[test]
    fn test_strict_deserialization() {
        let parse = |json: &str| serde_json::from_str::<Rule>(json);

        assert!(parse(r#"{"name":"t","selector":"h1","kind":"scalar_text","selectr":"h2"}"#).is_err());
        assert!(parse(r#"{"name":"t","selector":"a","kind":"scalar_text","attribute":"href"}"#).is_err());
        assert!(parse(r#"{"name":"t","selector":"a","kind":"scalar_attribute"}"#).is_err());
        assert!(parse(r#"{"name":"t","selector":"h1","kind":"scalar_text","required":true}"#).is_err());
        assert!(parse(r#"{"name":"t","selector":"li","kind":"scalar_text","is_list":true}"#).is_err());
        assert!(parse(r#"{"name":"t","selector":"div","kind":"html"}"#).is_err());
        assert!(parse(r#"{"name":"t","selector":"ul","kind":"structured_list","attribute":"id","children":[]}"#).is_err());

        let err = parse(r#"{"name":"t","selector":"a","kind":"scalar_attribute","attribute":"href","children":[]}"#)
            .unwrap_err();
        assert!(err.to_string().contains("`children` is not allowed on a scalar_attribute rule"));

        let list = parse(r#"{"name":"l","selector":"li","kind":"structured_list","children":[{"name":"t","selector":"b","kind":"scalar_text"}]}"#)
            .unwrap();
        assert_eq!(list.children().len(), 1);
        assert!(serde_json::from_str::<RuleTree>(r#"{"name":"p","rules":[],"extra":1}"#).is_err());
    }
}

use crate::detect::{DetectConfig, Fingerprint, NameAllocator, slugify};
use crate::engine::SCOPE_SELECTOR;
use crate::parse::{Document, Element, compile_selector};
use crate::rule::Rule;
use crate::selector::{best_selector, class_selector, escape_ident, match_count, nth_child_step};
use crate::{GleanerError, Result};

const SKIPPED_TAGS: &[&str] = &["script", "style", "noscript", "template", "br", "svg"];

/// A detected repeating list.
#[derive(Debug)]
pub struct ListDetection {
    /// `structured_list` rule with one generated field rule per piece of item content.
    pub rule: Rule,
    /// Fingerprint shared by the items.
    pub fingerprint: Fingerprint,
    /// Selector of the element holding the items.
    pub container_selector: String,
    /// Item selector relative to the container.
    pub item_selector: String,
    /// Number of elements the rule's selector matches in this document.
    pub item_count: usize,
    /// Set to [`GleanerError::AmbiguousDetection`] when no sibling shared the
    /// seed's fingerprint; the rule then covers the seed alone.
    pub warning: Option<GleanerError>,
}

impl ListDetection {
    pub fn is_ambiguous(&self) -> bool {
        self.warning.is_some()
    }
}

/// Detects the list the seed element belongs to, with default settings.
pub fn detect_list(doc: &Document, seed: Element<'_>) -> Result<ListDetection> {
    detect_list_with_config(doc, seed, &DetectConfig::default())
}

/// Detects the list the seed element belongs to.
///
/// When several disjoint runs of matching siblings exist, the run containing the
/// seed is used unless `contiguous_only` is turned off.
///
/// # Errors
///
/// Returns [`GleanerError::InvalidRule`] when the seed is the root element, which
/// has no siblings to compare against.
pub fn detect_list_with_config(doc: &Document, seed: Element<'_>, config: &DetectConfig) -> Result<ListDetection> {
    let Some(seed_parent) = seed.parent() else {
        return Err(GleanerError::InvalidRule {
            rule: config.list_name.clone(),
            reason: "the root element cannot be a list item".to_string(),
        });
    };

    let (item, parent, run) = locate_items(seed, seed_parent, config);
    let fingerprint = Fingerprint::of(item);

    let warning = if run.len() < 2 {
        tracing::warn!(fingerprint = %fingerprint, seed = %seed.describe(), "no repeating siblings found");
        Some(GleanerError::AmbiguousDetection { fingerprint: fingerprint.to_string(), seed: seed.describe() })
    } else {
        None
    };

    let container_selector = best_selector(doc, parent).selector;
    let mut item_selector = fingerprint.selector();
    for class in excluded_classes(&fingerprint, parent) {
        item_selector.push_str(&format!(":not(.{})", escape_ident(&class)));
    }
    if config.contiguous_only {
        let all_matching = parent.children().into_iter().filter(|c| fingerprint.matches(*c)).count();
        if let (Some(first), Some(last)) = (run.first(), run.last())
            && all_matching > run.len()
        {
            item_selector
                .push_str(&format!(":nth-child(n+{}):nth-child(-n+{})", first.child_index(), last.child_index()));
        }
    }

    let selector = format!("{} > {}", container_selector, item_selector);
    let item_count = match_count(doc, &selector)?;
    let fields = infer_fields(item, config)?;

    tracing::info!(selector = %selector, items = item_count, fields = fields.len(), "detected list");

    Ok(ListDetection {
        rule: Rule::list(config.list_name.clone(), selector, fields),
        fingerprint,
        container_selector,
        item_selector,
        item_count,
        warning,
    })
}

/// Finds the item element, its parent and the matching sibling run, climbing
/// up to `max_climb` ancestors when the seed has no matching siblings.
fn locate_items<'a>(
    seed: Element<'a>, seed_parent: Element<'a>, config: &DetectConfig,
) -> (Element<'a>, Element<'a>, Vec<Element<'a>>) {
    let mut item = seed;
    let mut parent = seed_parent;

    for _ in 0..=config.max_climb {
        let run = matching_run(item, parent, config.contiguous_only);
        if run.len() > 1 {
            return (item, parent, run);
        }
        match parent.parent() {
            Some(grandparent) => {
                item = parent;
                parent = grandparent;
            }
            None => break,
        }
    }

    (seed, seed_parent, vec![seed])
}

fn matching_run<'a>(item: Element<'a>, parent: Element<'a>, contiguous_only: bool) -> Vec<Element<'a>> {
    let fingerprint = Fingerprint::of(item);

    if !contiguous_only {
        return parent.children().into_iter().filter(|c| fingerprint.matches(*c)).collect();
    }

    let mut run: Vec<Element<'a>> =
        item.prev_siblings().into_iter().take_while(|s| fingerprint.matches(*s)).collect();
    run.reverse();
    run.push(item);
    run.extend(item.next_siblings().into_iter().take_while(|s| fingerprint.matches(*s)));
    run
}

/// One extra class per sibling that `tag.classes` would also match without
/// sharing the fingerprint, so `:not(.extra)` leaves only exact matches.
fn excluded_classes(fingerprint: &Fingerprint, parent: Element<'_>) -> Vec<String> {
    let mut excluded: Vec<String> = Vec::new();
    for sibling in parent.children() {
        if sibling.tag_name() != fingerprint.tag || fingerprint.matches(sibling) {
            continue;
        }
        let classes = sibling.classes();
        if !fingerprint.classes.iter().all(|c| classes.contains(&c.as_str())) {
            continue;
        }
        let mut extra: Vec<&str> = classes.into_iter().filter(|c| !fingerprint.classes.iter().any(|f| f == c)).collect();
        extra.sort_unstable();
        if let Some(class) = extra.first()
            && !excluded.iter().any(|e| e == class)
        {
            excluded.push(class.to_string());
        }
    }
    excluded
}

/// Generates field rules from the content of one item, in document order.
fn infer_fields(item: Element<'_>, config: &DetectConfig) -> Result<Vec<Rule>> {
    let mut names = NameAllocator::default();
    let mut fields = Vec::new();

    if !item.own_text().is_empty() {
        fields.push(Rule::text(names.allocate("text"), SCOPE_SELECTOR));
    }
    if item.tag_name() == "a" && item.attr("href").is_some() {
        fields.push(Rule::attribute(names.allocate("href"), SCOPE_SELECTOR, "href"));
    }

    let everything = compile_selector("*")?;
    for target in item.select_compiled(&everything) {
        if fields.len() >= config.max_fields {
            break;
        }

        let tag = target.tag_name();
        let skipped = |tag: &str| SKIPPED_TAGS.contains(&tag);
        if skipped(&tag) || target.ancestors().take_while(|a| *a != item).any(|a| skipped(&a.tag_name())) {
            continue;
        }

        let has_text = !target.own_text().is_empty();
        let link = tag == "a" && target.attr("href").is_some();
        let image = tag == "img" && target.attr("src").is_some();
        if !(has_text || link || image) {
            continue;
        }

        let Some(selector) = field_selector(item, target) else {
            tracing::debug!(target = %target.describe(), "no in-item selector reaches field");
            continue;
        };

        let base = target
            .classes()
            .first()
            .map(|class| slugify(class))
            .filter(|slug| !slug.is_empty())
            .unwrap_or_else(|| tag.clone());

        if has_text {
            fields.push(Rule::text(names.allocate(&base), selector.clone()));
        }
        if link {
            fields.push(Rule::attribute(names.allocate(&format!("{}_href", base)), selector.clone(), "href"));
        }
        if image {
            fields.push(Rule::attribute(names.allocate(&format!("{}_src", base)), selector, "src"));
        }
    }

    if fields.is_empty() {
        fields.push(Rule::text(names.allocate("text"), SCOPE_SELECTOR));
    }
    fields.truncate(config.max_fields);

    Ok(fields)
}

/// Shortest selector whose first match inside `item` is `target`:
/// `tag.classes`, then `tag`, then an `:nth-child` chain from the item.
fn field_selector(item: Element<'_>, target: Element<'_>) -> Option<String> {
    let mut chain = vec![nth_child_step(&target)];
    for ancestor in target.ancestors() {
        if ancestor == item {
            break;
        }
        chain.push(nth_child_step(&ancestor));
    }
    chain.reverse();

    let candidates = [class_selector(&target), Some(escape_ident(&target.tag_name())), Some(chain.join(" > "))];

    candidates.into_iter().flatten().find(|candidate| {
        compile_selector(candidate)
            .map(|sel| item.select_first_compiled(&sel) == Some(target))
            .unwrap_or(false)
    })
}

use serde::Serialize;

use crate::detect::{DetectConfig, NameAllocator, slugify};
use crate::parse::{Document, Element};
use crate::rule::Rule;
use crate::selector::best_selector;
use crate::{GleanerError, Result};

/// Where column names came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HeaderSource {
    /// The first row containing `<th>` cells.
    HeaderCells,
    /// No `<th>` anywhere: the first row fixes the column count and names are
    /// `column_1..column_N`. That row is still data.
    Positional,
}

/// A detected table.
#[derive(Debug, Clone)]
pub struct TableDetection {
    /// `structured_list` over the data rows with one `scalar_text` child per column.
    pub rule: Rule,
    pub table_selector: String,
    /// Column names in column order.
    pub headers: Vec<String>,
    pub header_source: HeaderSource,
    /// Data rows whose cell count matches the header.
    pub row_count: usize,
    /// Data rows with a different cell count. They are reported, not fatal.
    pub skipped_rows: usize,
}

/// Detects the table around `seed` with default settings.
pub fn detect_table(doc: &Document, seed: Element<'_>) -> Result<TableDetection> {
    detect_table_with_config(doc, seed, &DetectConfig::default())
}

/// Detects the table around `seed` (any element inside it, or the `<table>` itself).
///
/// Spanned cells count once, at the position of their starting column.
///
/// # Errors
///
/// [`GleanerError::NotInTable`] when `seed` has no `<table>` ancestor, and
/// [`GleanerError::InvalidRule`] when the table has no rows or no cells.
pub fn detect_table_with_config(doc: &Document, seed: Element<'_>, config: &DetectConfig) -> Result<TableDetection> {
    let table = if seed.tag_name() == "table" {
        seed
    } else {
        seed.ancestors().find(|a| a.tag_name() == "table").ok_or(GleanerError::NotInTable)?
    };

    let rows = table_rows(table);
    let invalid = |reason: &str| GleanerError::InvalidRule { rule: config.table_name.clone(), reason: reason.to_string() };
    if rows.is_empty() {
        return Err(invalid("table has no rows"));
    }

    let header_index = rows.iter().position(|row| cells(*row).iter().any(|c| c.tag_name() == "th"));
    let (header_source, header_row) = match header_index {
        Some(i) => (HeaderSource::HeaderCells, rows[i]),
        None => (HeaderSource::Positional, rows[0]),
    };

    let header_cells = cells(header_row);
    if header_cells.is_empty() {
        return Err(invalid("header row has no cells"));
    }
    let headers = column_names(&header_cells, header_source);

    let header_section = header_row.parent().unwrap_or(table);
    let (section, after) = match header_source {
        HeaderSource::HeaderCells if header_section.tag_name() == "thead" => {
            (table.children().into_iter().find(|c| c.tag_name() == "tbody"), 0)
        }
        HeaderSource::HeaderCells => (Some(header_section), header_row.child_index()),
        HeaderSource::Positional => (Some(header_section), 0),
    };

    let data_rows: Vec<Element<'_>> = section
        .map(|s| s.children().into_iter().filter(|r| r.tag_name() == "tr" && r.child_index() > after).collect())
        .unwrap_or_default();

    let width = headers.len();
    let (valid, skipped): (Vec<Element<'_>>, Vec<Element<'_>>) =
        data_rows.into_iter().partition(|row| cells(*row).len() == width);
    for row in &skipped {
        tracing::warn!(row = row.child_index(), cells = cells(*row).len(), expected = width, "skipping table row");
    }

    let table_selector = best_selector(doc, table).selector;
    let mut row_selector = match section {
        Some(s) if s != table => format!("{} > {} > tr", table_selector, section_step(table, s)),
        _ => format!("{} > tr", table_selector),
    };
    if after > 0 {
        row_selector.push_str(&format!(":nth-child(n+{})", after + 1));
    }
    for row in &skipped {
        row_selector.push_str(&format!(":not(:nth-child({}))", row.child_index()));
    }

    let sample = valid.first().map(|row| cells(*row)).unwrap_or_default();
    let columns = headers
        .iter()
        .enumerate()
        .map(|(i, name)| {
            let tag = sample.get(i).map(|c| c.tag_name()).unwrap_or_else(|| "td".to_string());
            Rule::text(name.clone(), format!("{}:nth-child({})", tag, i + 1))
        })
        .collect();

    tracing::info!(
        selector = %row_selector,
        columns = width,
        rows = valid.len(),
        skipped = skipped.len(),
        "detected table"
    );

    Ok(TableDetection {
        rule: Rule::list(config.table_name.clone(), row_selector, columns),
        table_selector,
        headers,
        header_source,
        row_count: valid.len(),
        skipped_rows: skipped.len(),
    })
}

/// Rows that belong to `table` itself (not to nested tables), in document order.
fn table_rows(table: Element<'_>) -> Vec<Element<'_>> {
    let mut rows = Vec::new();
    for child in table.children() {
        match child.tag_name().as_str() {
            "tr" => rows.push(child),
            "thead" | "tbody" | "tfoot" => rows.extend(child.children().into_iter().filter(|r| r.tag_name() == "tr")),
            _ => {}
        }
    }
    rows
}

fn cells(row: Element<'_>) -> Vec<Element<'_>> {
    row.children().into_iter().filter(|c| matches!(c.tag_name().as_str(), "td" | "th")).collect()
}

fn column_names(header_cells: &[Element<'_>], source: HeaderSource) -> Vec<String> {
    let mut names = NameAllocator::default();
    header_cells
        .iter()
        .enumerate()
        .map(|(i, cell)| {
            let slug = match source {
                HeaderSource::HeaderCells => slugify(&cell.text()),
                HeaderSource::Positional => String::new(),
            };
            if slug.is_empty() { names.allocate(&format!("column_{}", i + 1)) } else { names.allocate(&slug) }
        })
        .collect()
}

/// `tbody`, or `tbody:nth-of-type(j)` when the table has several bodies.
fn section_step(table: Element<'_>, section: Element<'_>) -> String {
    let tag = section.tag_name();
    let same = table.children().into_iter().filter(|c| c.tag_name() == tag).count();
    if same > 1 { format!("{}:nth-of-type({})", tag, section.type_index()) } else { tag }
}

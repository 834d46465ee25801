//! The execution entry point: rule tree + documents → materialized tables.
//!
//! [`run`] handles HTML already in hand (for example the page currently shown to
//! the user). Fetching targets goes through [`run_batch`](crate::batch::run_batch),
//! which produces the same [`RunReport`]. Either way a failing document is
//! recorded and the remaining documents still run.
//!
//! # Example
//!
//! ```rust
//! use gleaner_core::{Rule, RuleTree, run};
//!
//! let tree = RuleTree::with_rules("page", vec![Rule::text("title", "h1")]);
//! let report = run(&tree, &["<h1>One</h1>", "", "<h1>Two</h1>"]).unwrap();
//!
//! assert_eq!(report.succeeded, 2);
//! assert_eq!(report.failures[0].index, 1);
//! assert_eq!(report.tables[0].cell(1, "title"), Some("Two"));
//! ```

use crate::engine::Program;
use crate::materialize::{Materializer, Table};
use crate::parse::Document;
use crate::rule::RuleTree;
use crate::{GleanerError, Result};

/// A document that produced no rows.
#[derive(Debug)]
pub struct DocumentFailure {
    /// Position of the document in the input.
    pub index: usize,
    /// URL, path or other label of the document.
    pub source: String,
    pub error: GleanerError,
}

/// Outcome of running a rule tree over several documents.
#[derive(Debug)]
pub struct RunReport {
    /// Tables in schema order; rows follow input order.
    pub tables: Vec<Table>,
    /// Documents that were executed and materialized.
    pub succeeded: usize,
    pub failures: Vec<DocumentFailure>,
    /// Whether the run stopped early on request.
    pub cancelled: bool,
}

impl RunReport {
    pub fn table(&self, name: &str) -> Option<&Table> {
        self.tables.iter().find(|t| t.name == name)
    }

    pub fn total(&self) -> usize {
        self.succeeded + self.failures.len()
    }
}

/// Executes `tree` against each HTML document in order and materializes the results.
///
/// # Errors
///
/// Fails before touching any document when a selector is invalid or the derived
/// schema has a name conflict. Per-document failures are reported in
/// [`RunReport::failures`].
pub fn run<S: AsRef<str>>(tree: &RuleTree, documents: &[S]) -> Result<RunReport> {
    let program = Program::compile(tree)?;
    let mut materializer = Materializer::new(tree)?;
    let mut failures = Vec::new();
    let mut succeeded = 0;

    for (index, html) in documents.iter().enumerate() {
        match Document::parse(html.as_ref()) {
            Ok(doc) => {
                materializer.append(&program.execute(&doc));
                succeeded += 1;
            }
            Err(error) => {
                tracing::warn!(index, error = %error, "document failed");
                failures.push(DocumentFailure { index, source: format!("document {}", index + 1), error });
            }
        }
    }

    tracing::info!(documents = documents.len(), succeeded, failed = failures.len(), "run finished");
    Ok(RunReport { tables: materializer.finish(), succeeded, failures, cancelled: false })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rule::Rule;

    const SCORES: &str = r#"
        <table>
            <tr><th>Name</th><th>Score</th></tr>
            <tr><td>Alice</td><td>10</td></tr>
            <tr><td>Bob</td><td>20</td></tr>
            <tr><td>Carol</td><td>30</td></tr>
        </table>
    "#;

    fn scores_tree() -> RuleTree {
        RuleTree::with_rules(
            "scores",
            vec![Rule::list(
                "table_data",
                "table > tbody > tr:nth-child(n+2)",
                vec![Rule::text("Name", "td:nth-child(1)"), Rule::text("Score", "td:nth-child(2)")],
            )],
        )
    }

    #[test]
    fn test_name_score_table_materializes_three_rows() {
        let report = run(&scores_tree(), &[SCORES]).unwrap();
        let table = report.table("table_data").unwrap();

        let rows: Vec<(Option<&str>, Option<&str>)> =
            (0..table.rows.len()).map(|i| (table.cell(i, "Name"), table.cell(i, "Score"))).collect();
        assert_eq!(
            rows,
            vec![(Some("Alice"), Some("10")), (Some("Bob"), Some("20")), (Some("Carol"), Some("30"))]
        );
        assert_eq!(table.columns, vec!["Name", "Score"]);
    }

    #[test]
    fn test_failures_do_not_abort_the_run() {
        let report = run(&scores_tree(), &[SCORES, "   ", SCORES]).unwrap();

        assert_eq!(report.succeeded, 2);
        assert_eq!(report.total(), 3);
        assert_eq!(report.failures.len(), 1);
        assert!(matches!(report.failures[0].error, GleanerError::Extraction { .. }));

        let rows = &report.table("table_data").unwrap().rows;
        assert_eq!(rows.len(), 6);
        assert_eq!(rows[5].row_id, 6);
        assert_eq!(rows[5].parent_row_id, Some(2));
    }

    #[test]
    fn test_invalid_tree_fails_up_front() {
        let tree = RuleTree::with_rules("page", vec![Rule::text("a", "a"), Rule::text("A", "b")]);
        assert!(matches!(run(&tree, &[SCORES]), Err(GleanerError::SchemaConflict { .. })));
    }
}

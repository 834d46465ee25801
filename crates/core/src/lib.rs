//! Point-and-click HTML extraction.
//!
//! Gleaner turns picked elements into a declarative extraction program and runs
//! that program against HTML documents:
//!
//! 1. [`selector`] synthesizes unique, robust CSS selectors for a picked element.
//! 2. [`detect`] infers repeating lists and tables around a seed element.
//! 3. [`rule`] holds the program: a tree of typed rules with checked edits.
//! 4. [`engine`] executes the tree against a document, producing nested [`Record`]s.
//! 5. [`materialize`] flattens records into relational [`Table`]s.
//!
//! # Example
//!
//! ```rust
//! use gleaner_core::{Document, Rule, RuleTree, detect_table, materialize, execute_tree};
//!
//! let html = r#"
//!     <table id="scores">
//!         <tr><th>Name</th><th>Score</th></tr>
//!         <tr><td>Alice</td><td>10</td></tr>
//!         <tr><td>Bob</td><td>20</td></tr>
//!     </table>
//! "#;
//! let doc = Document::parse(html).unwrap();
//! let cell = doc.select("td").unwrap()[0];
//!
//! let detection = detect_table(&doc, cell).unwrap();
//! let tree = RuleTree::with_rules("scores", vec![detection.rule]);
//!
//! let record = execute_tree(&doc, &tree).unwrap();
//! let tables = materialize(&record, &tree).unwrap();
//! assert_eq!(tables[1].cell(1, "name"), Some("Bob"));
//! ```

#[cfg(feature = "fetch")]
pub mod batch;
pub mod config;
pub mod detect;
pub mod engine;
pub mod error;
pub mod export;
pub mod fetch;
pub mod materialize;
pub mod parse;
pub mod record;
pub mod rule;
pub mod run;
pub mod selector;

#[cfg(feature = "fetch")]
pub use batch::{BatchConfig, CancelToken, Cancellation, run_batch};
pub use config::{OutputFormat, ProjectConfig};
pub use detect::{
    DetectConfig, Fingerprint, ListDetection, TableDetection, detect_list, detect_list_with_config, detect_table,
    detect_table_with_config,
};
pub use engine::{Program, Scope, SelectorProbe, execute, execute_tree, extract_html, probe, probe_tree};
pub use error::{GleanerError, Result};
pub use fetch::{FetchConfig, Source, fetch_file, fetch_stdin};
#[cfg(feature = "fetch")]
pub use fetch::fetch_url;
pub use materialize::{Materializer, Row, Table, TableSchema, derive_schema, materialize};
pub use parse::{Document, Element};
pub use record::{Record, Value};
pub use rule::{Rule, RuleKind, RuleTree};
pub use run::{DocumentFailure, RunReport, run};
pub use selector::{
    Robustness, SelectorCandidate, Strategy, SynthesisConfig, best_selector, synthesize, synthesize_with_config,
    validate_selector,
};

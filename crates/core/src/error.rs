//! Error types for Gleaner operations.
//!
//! This module defines the main error type [`GleanerError`] which represents
//! every failure the engine can report: selector validation, rule edits,
//! document parsing, schema derivation and (with the `fetch` feature) HTTP
//! fetching.
//!
//! # Example
//!
//! ```rust
//! use gleaner_core::{GleanerError, Result};
//!
//! fn require_markup(html: &str) -> Result<()> {
//!     if html.trim().is_empty() {
//!         return Err(GleanerError::Extraction { rule_id: None, reason: "empty document".into() });
//!     }
//!     Ok(())
//! }
//! # assert!(require_markup("").is_err());
//! ```

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for selector synthesis, detection, execution and storage handoff.
///
/// "Selector matched nothing" is never an error: absent data is represented as
/// null or an empty list in the extracted record.
///
/// # Example
///
/// ```rust
/// use gleaner_core::{GleanerError, validate_selector};
///
/// match validate_selector("div[[") {
///     Err(GleanerError::SelectorSyntax { selector, .. }) => assert_eq!(selector, "div[["),
///     other => panic!("unexpected: {:?}", other),
/// }
/// ```
#[derive(Error, Debug)]
pub enum GleanerError {
    /// The selector string is not valid CSS.
    ///
    /// Raised at rule-edit and config-load time, never deferred to execution.
    #[error("Invalid CSS selector '{selector}': {reason}")]
    SelectorSyntax { selector: String, reason: String },

    /// Structural detection found no sibling sharing the seed's fingerprint.
    ///
    /// Detection attaches this as a warning to its result instead of failing.
    #[error("No repeating siblings match fingerprint {fingerprint} (seed: {seed})")]
    AmbiguousDetection { fingerprint: String, seed: String },

    /// A document could not be parsed, or a rule's selector could not be compiled
    /// during execution.
    ///
    /// Fatal for the document in question only.
    #[error("Extraction failed{}: {reason}", rule_suffix(.rule_id))]
    Extraction { rule_id: Option<String>, reason: String },

    /// Table or column names collide after derivation from rule names.
    ///
    /// Raised before any row is produced so no partial write can occur.
    #[error("Schema conflict in table '{table}': '{name}' collides with '{existing}'")]
    SchemaConflict { table: String, name: String, existing: String },

    /// An edit would create two siblings with the same name.
    #[error("Duplicate rule name '{name}' under '{parent}'")]
    DuplicateName { parent: String, name: String },

    /// A referenced rule id does not exist in the tree.
    #[error("Rule not found: {0}")]
    NotFound(String),

    /// A rule violates its kind's shape (children on a scalar, an empty list, a
    /// missing attribute name, an empty name).
    #[error("Invalid rule '{rule}': {reason}")]
    InvalidRule { rule: String, reason: String },

    /// Table detection was seeded with an element outside any `<table>`.
    #[error("Element is not inside a <table>")]
    NotInTable,

    /// Project configuration could not be read or deserialized.
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Invalid character encoding.
    ///
    /// Returned when the document bytes are not valid UTF-8.
    #[error("Invalid character encoding")]
    InvalidEncoding,

    /// Invalid URL provided.
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    /// HTTP request errors from reqwest.
    #[cfg(feature = "fetch")]
    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),

    /// Non-success HTTP status after all retry attempts.
    #[error("HTTP {status} for {url}")]
    HttpStatus { url: String, status: u16 },

    /// Request timeout.
    #[error("Request timed out after {timeout} seconds")]
    Timeout { timeout: u64 },

    /// File not found.
    #[error("File not found: {0}")]
    FileNotFound(PathBuf),

    /// File write errors.
    #[error("Failed to write to file: {0}")]
    WriteError(#[from] std::io::Error),

    /// The batch was cancelled before this document was handed to the engine.
    #[error("Cancelled")]
    Cancelled,
}

fn rule_suffix(rule_id: &Option<String>) -> String {
    rule_id.as_ref().map(|id| format!(" at rule {}", id)).unwrap_or_default()
}

impl GleanerError {
    /// Attach a rule id to an [`GleanerError::Extraction`] that does not carry one yet.
    pub(crate) fn at_rule(self, id: &str) -> Self {
        match self {
            GleanerError::Extraction { rule_id: None, reason } => {
                GleanerError::Extraction { rule_id: Some(id.to_string()), reason }
            }
            GleanerError::SelectorSyntax { selector, reason } => GleanerError::Extraction {
                rule_id: Some(id.to_string()),
                reason: format!("invalid selector '{}': {}", selector, reason),
            },
            other => other,
        }
    }
}

impl From<serde_yaml_ng::Error> for GleanerError {
    fn from(err: serde_yaml_ng::Error) -> Self {
        GleanerError::ConfigError(err.to_string())
    }
}

impl From<serde_json::Error> for GleanerError {
    fn from(err: serde_json::Error) -> Self {
        GleanerError::ConfigError(err.to_string())
    }
}

/// Result type alias for GleanerError.
///
/// This is a convenience alias for `std::result::Result<T, GleanerError>`.
pub type Result<T> = std::result::Result<T, GleanerError>;

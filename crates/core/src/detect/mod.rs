//! Structural pattern detection.
//!
//! Turns a single picked element into a `structured_list` rule by recognising the
//! repeating structure around it:
//!
//! - [`detect_list`] treats the seed as one item of a list, finds its siblings with
//!   the same [`Fingerprint`] and derives field rules from the seed's content.
//! - [`detect_table`] reads the header of the enclosing `<table>` and emits one
//!   column rule per header cell.
//!
//! Both are pure functions over an immutable [`Document`](crate::parse::Document).
//!
//! # Example
//!
//! ```rust
//! use gleaner_core::detect::detect_list;
//! use gleaner_core::parse::Document;
//!
//! let doc = Document::parse(r#"
//!     <ul id="results">
//!         <li class="hit"><a href="/a">Alpha</a></li>
//!         <li class="hit"><a href="/b">Beta</a></li>
//!     </ul>
//! "#).unwrap();
//! let seed = doc.select("li.hit").unwrap()[0];
//!
//! let detection = detect_list(&doc, seed).unwrap();
//! assert_eq!(detection.rule.selector, "#results > li.hit");
//! assert_eq!(detection.item_count, 2);
//! assert!(detection.warning.is_none());
//! ```

pub mod fingerprint;
pub mod list;
pub mod table;

pub use fingerprint::Fingerprint;
pub use list::{ListDetection, detect_list, detect_list_with_config};
pub use table::{HeaderSource, TableDetection, detect_table, detect_table_with_config};

/// Configuration for structural detection.
///
/// # Example
///
/// ```rust
/// use gleaner_core::detect::DetectConfig;
///
/// let config = DetectConfig::default().with_contiguous_only(false).with_list_name("results");
/// assert!(!config.contiguous_only);
/// assert_eq!(config.list_name, "results");
/// ```
#[derive(Debug, Clone)]
pub struct DetectConfig {
    /// Only take the unbroken run of matching siblings around the seed (default: true).
    /// When false, every sibling with the seed's fingerprint is an item.
    pub contiguous_only: bool,
    /// How many ancestors to climb when the seed itself has no matching siblings (default: 0).
    pub max_climb: usize,
    /// Maximum number of field rules generated per list item (default: 20).
    pub max_fields: usize,
    /// Name given to a detected list rule (default: "items").
    pub list_name: String,
    /// Name given to a detected table rule (default: "table_data").
    pub table_name: String,
}

impl Default for DetectConfig {
    fn default() -> Self {
        Self {
            contiguous_only: true,
            max_climb: 0,
            max_fields: 20,
            list_name: "items".to_string(),
            table_name: "table_data".to_string(),
        }
    }
}

impl DetectConfig {
    pub fn with_contiguous_only(mut self, contiguous_only: bool) -> Self {
        self.contiguous_only = contiguous_only;
        self
    }

    pub fn with_max_climb(mut self, max_climb: usize) -> Self {
        self.max_climb = max_climb;
        self
    }

    pub fn with_max_fields(mut self, max_fields: usize) -> Self {
        self.max_fields = max_fields.max(1);
        self
    }

    pub fn with_list_name(mut self, name: impl Into<String>) -> Self {
        self.list_name = name.into();
        self
    }

    pub fn with_table_name(mut self, name: impl Into<String>) -> Self {
        self.table_name = name.into();
        self
    }
}

/// Lowercase snake_case name from free text, e.g. `"Unit Price ($)"` → `"unit_price"`.
///
/// Returns an empty string when the text has no alphanumeric characters.
pub fn slugify(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut pending_sep = false;

    for c in text.chars() {
        if c.is_alphanumeric() {
            if pending_sep && !out.is_empty() {
                out.push('_');
            }
            pending_sep = false;
            out.extend(c.to_lowercase());
        } else {
            pending_sep = true;
        }
    }

    out
}

/// Hands out names that are unique among the ones already issued, suffixing `_2`, `_3`, ...
#[derive(Debug, Default)]
pub(crate) struct NameAllocator {
    taken: Vec<String>,
}

impl NameAllocator {
    pub(crate) fn allocate(&mut self, base: &str) -> String {
        let mut name = base.to_string();
        let mut n = 2;
        while self.taken.iter().any(|t| t == &name) {
            name = format!("{}_{}", base, n);
            n += 1;
        }
        self.taken.push(name.clone());
        name
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("Name", "name")]
    #[case("Unit Price ($)", "unit_price")]
    #[case("  e-mail address ", "e_mail_address")]
    #[case("Größe", "größe")]
    #[case("$$$", "")]
    #[case("2024 Total", "2024_total")]
    fn test_slugify(#[case] input: &str, #[case] expected: &str) {
        assert_eq!(slugify(input), expected);
    }

    #[test]
    fn test_name_allocator_suffixes_duplicates() {
        let mut names = NameAllocator::default();
        assert_eq!(names.allocate("price"), "price");
        assert_eq!(names.allocate("price"), "price_2");
        assert_eq!(names.allocate("price"), "price_3");
        assert_eq!(names.allocate("price_2"), "price_2_2");
    }

    #[test]
    fn test_config_builder() {
        let config = DetectConfig::default().with_max_climb(2).with_max_fields(0).with_table_name("rows");
        assert_eq!(config.max_climb, 2);
        assert_eq!(config.max_fields, 1);
        assert_eq!(config.table_name, "rows");
        assert!(config.contiguous_only);
    }
}

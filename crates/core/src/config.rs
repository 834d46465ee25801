//! Declarative project configuration.
//!
//! A project file names the target URLs, where output goes, how to fetch, and the
//! rule tree to run. YAML is the primary format; a `.json` extension selects JSON.
//!
//! ```yaml
//! name: scores
//! targets:
//!   - https://example.com/scores
//! output:
//!   format: jsonl
//! fetch:
//!   concurrency: 4
//! rules:
//!   name: scores
//!   rules:
//!     - name: table_data
//!       kind: structured_list
//!       selector: "#scores > tbody > tr:nth-child(n+2)"
//!       children:
//!         - { name: Name, kind: scalar_text, selector: "td:nth-child(1)" }
//!         - { name: Score, kind: scalar_text, selector: "td:nth-child(2)" }
//! ```
//!
//! Loading validates everything a batch run depends on (selectors, rule shapes,
//! sibling names, derived table and column names, target URLs) so an invalid
//! project never starts.
//!
//! # Example
//!
//! ```rust
//! use gleaner_core::config::ProjectConfig;
//!
//! let yaml = r#"
//! name: demo
//! rules:
//!   name: demo
//!   rules:
//!     - { name: title, kind: scalar_text, selector: h1 }
//! "#;
//! let config = ProjectConfig::from_yaml_str(yaml).unwrap();
//! assert_eq!(config.rules.rules[0].name, "title");
//! ```

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::fetch::{FetchConfig, parse_url};
use crate::materialize::derive_schema;
use crate::rule::RuleTree;
use crate::{GleanerError, Result};

static SLUG_SEPARATORS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[^a-z0-9]+").unwrap());

/// Fallback output directory when no data directory is available.
pub const FALLBACK_OUTPUT_DIR: &str = "gleaner-output";

/// Output file format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// One pretty-printed JSON document holding every table.
    Json,
    /// One JSON object per row, tagged with its table name.
    #[default]
    Jsonl,
    /// `CREATE TABLE` statements followed by `INSERT`s.
    Sql,
}

impl OutputFormat {
    pub fn extension(self) -> &'static str {
        match self {
            OutputFormat::Json => "json",
            OutputFormat::Jsonl => "jsonl",
            OutputFormat::Sql => "sql",
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

impl FromStr for OutputFormat {
    type Err = GleanerError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "json" => Ok(OutputFormat::Json),
            "jsonl" | "ndjson" => Ok(OutputFormat::Jsonl),
            "sql" => Ok(OutputFormat::Sql),
            other => Err(GleanerError::ConfigError(format!("unknown output format '{}'", other))),
        }
    }
}

/// Where and how results are written.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputSettings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub directory: Option<PathBuf>,
    #[serde(default)]
    pub format: OutputFormat,
}

/// Fetch and worker-pool settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchSettings {
    /// Request timeout in seconds.
    pub timeout: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
    /// Number of concurrent workers.
    pub concurrency: usize,
    /// Attempts per URL, including the first.
    pub attempts: u32,
    /// Initial retry backoff in milliseconds.
    pub backoff_ms: u64,
    /// Pause between two requests of the same worker, in milliseconds.
    pub delay_ms: u64,
}

impl Default for FetchSettings {
    fn default() -> Self {
        let fetch = FetchConfig::default();
        Self {
            timeout: fetch.timeout,
            user_agent: None,
            concurrency: 5,
            attempts: fetch.max_attempts,
            backoff_ms: fetch.initial_backoff.as_millis() as u64,
            delay_ms: 0,
        }
    }
}

impl FetchSettings {
    pub fn to_fetch_config(&self) -> FetchConfig {
        let defaults = FetchConfig::default();
        let initial = std::time::Duration::from_millis(self.backoff_ms);
        let mut config = defaults
            .clone()
            .with_timeout(self.timeout)
            .with_max_attempts(self.attempts)
            .with_backoff(initial, defaults.max_backoff);
        if let Some(user_agent) = &self.user_agent {
            config = config.with_user_agent(user_agent.clone());
        }
        config
    }
}

/// A scraping project: targets, output, fetch settings and the rule tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectConfig {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub targets: Vec<String>,
    #[serde(default)]
    pub output: OutputSettings,
    #[serde(default)]
    pub fetch: FetchSettings,
    pub rules: RuleTree,
}

impl ProjectConfig {
    pub fn new(name: impl Into<String>, rules: RuleTree) -> Self {
        Self {
            name: name.into(),
            description: None,
            targets: Vec::new(),
            output: OutputSettings::default(),
            fetch: FetchSettings::default(),
            rules,
        }
    }

    /// Parses and validates YAML.
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let config: ProjectConfig = serde_yaml_ng::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Parses and validates JSON.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: ProjectConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Loads a project file; `.json` files are read as JSON, anything else as YAML.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(GleanerError::FileNotFound(path.to_path_buf()));
        }
        let content = fs::read_to_string(path)?;
        let config = if is_json(path) { Self::from_json_str(&content) } else { Self::from_yaml_str(&content) }?;
        tracing::debug!(path = %path.display(), rules = config.rules.len(), "loaded project");
        Ok(config)
    }

    pub fn to_yaml_string(&self) -> Result<String> {
        Ok(serde_yaml_ng::to_string(self)?)
    }

    pub fn to_json_string(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Writes the project file, choosing the format from the extension like [`ProjectConfig::load`].
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let content = if is_json(path) { self.to_json_string()? } else { self.to_yaml_string()? };
        fs::write(path, content)?;
        Ok(())
    }

    /// Validates the rule tree, the derived schema, the targets and the fetch settings.
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(GleanerError::ConfigError("project name is empty".to_string()));
        }
        self.rules.validate()?;
        derive_schema(&self.rules)?;

        for target in &self.targets {
            parse_url(target)?;
        }
        if self.fetch.concurrency == 0 {
            return Err(GleanerError::ConfigError("fetch.concurrency must be at least 1".to_string()));
        }
        if self.fetch.attempts == 0 {
            return Err(GleanerError::ConfigError("fetch.attempts must be at least 1".to_string()));
        }
        Ok(())
    }

    /// Lowercase, dash-separated project name for file and directory names.
    pub fn slug(&self) -> String {
        let lower = self.name.to_lowercase();
        let slug = SLUG_SEPARATORS.replace_all(&lower, "-");
        let slug = slug.trim_matches('-');
        if slug.is_empty() { "project".to_string() } else { slug.to_string() }
    }

    /// The configured output directory, or `<data dir>/gleaner/<slug>`.
    pub fn output_directory(&self) -> PathBuf {
        match &self.output.directory {
            Some(dir) => dir.clone(),
            None => dirs::data_local_dir()
                .map(|dir| dir.join("gleaner").join(self.slug()))
                .unwrap_or_else(|| PathBuf::from(FALLBACK_OUTPUT_DIR)),
        }
    }

    /// Default output file: `<output dir>/<slug>.<format>`.
    pub fn output_path(&self) -> PathBuf {
        self.output_directory().join(format!("{}.{}", self.slug(), self.output.format.extension()))
    }
}

fn is_json(path: &Path) -> bool {
    path.extension().and_then(|e| e.to_str()).is_some_and(|e| e.eq_ignore_ascii_case("json"))
}

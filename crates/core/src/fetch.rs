//! Document sources: URLs, files, stdin and in-memory HTML.
//!
//! URL fetching (feature `fetch`) retries timeouts, connection failures and
//! 5xx/429 responses with exponential backoff. Everything else fails on the
//! first attempt.

use std::fs;
use std::path::PathBuf;
use std::time::Duration;

#[cfg(feature = "fetch")]
use reqwest::Client;
use url::Url;

use crate::{GleanerError, Result};

/// HTTP client configuration for fetching web pages.
#[derive(Debug, Clone)]
pub struct FetchConfig {
    /// Request timeout in seconds.
    pub timeout: u64,
    /// Custom User-Agent string.
    pub user_agent: String,
    /// Total attempts per URL, including the first (default: 3).
    pub max_attempts: u32,
    /// Wait before the first retry; doubled on each further retry.
    pub initial_backoff: Duration,
    /// Upper bound for a single wait.
    pub max_backoff: Duration,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            timeout: 20,
            user_agent: "Mozilla/5.0 (compatible; Gleaner/0.1)".to_string(),
            max_attempts: 3,
            initial_backoff: Duration::from_millis(500),
            max_backoff: Duration::from_secs(8),
        }
    }
}

impl FetchConfig {
    pub fn with_timeout(mut self, seconds: u64) -> Self {
        self.timeout = seconds;
        self
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts.max(1);
        self
    }

    pub fn with_backoff(mut self, initial: Duration, max: Duration) -> Self {
        self.initial_backoff = initial;
        self.max_backoff = max.max(initial);
        self
    }

    /// Wait before retry number `retry` (1 for the first retry).
    pub fn backoff_for(&self, retry: u32) -> Duration {
        let factor = 2u32.saturating_pow(retry.saturating_sub(1));
        self.initial_backoff.saturating_mul(factor).min(self.max_backoff)
    }
}

/// Parses and checks an absolute http(s) URL.
pub fn parse_url(url: &str) -> Result<Url> {
    let parsed = Url::parse(url).map_err(|e| GleanerError::InvalidUrl(format!("{}: {}", url, e)))?;
    match parsed.scheme() {
        "http" | "https" => Ok(parsed),
        other => Err(GleanerError::InvalidUrl(format!("{}: unsupported scheme '{}'", url, other))),
    }
}

/// Builds the HTTP client shared by every request of a run.
#[cfg(feature = "fetch")]
pub fn build_client(config: &FetchConfig) -> Result<Client> {
    Client::builder()
        .timeout(Duration::from_secs(config.timeout))
        .user_agent(config.user_agent.clone())
        .build()
        .map_err(GleanerError::HttpError)
}

/// Fetches HTML content from a URL with a fresh client.
#[cfg(feature = "fetch")]
pub async fn fetch_url(url: &str, config: &FetchConfig) -> Result<String> {
    let client = build_client(config)?;
    fetch_with_client(&client, url, config).await
}

/// Fetches `url`, retrying transient failures up to `config.max_attempts` times.
#[cfg(feature = "fetch")]
pub async fn fetch_with_client(client: &Client, url: &str, config: &FetchConfig) -> Result<String> {
    let parsed = parse_url(url)?;
    let mut attempt = 1;

    loop {
        match fetch_once(client, parsed.clone(), config).await {
            Ok(body) => return Ok(body),
            Err(err) if attempt < config.max_attempts && is_retryable(&err) => {
                let wait = config.backoff_for(attempt);
                tracing::warn!(url, attempt, wait_ms = wait.as_millis() as u64, error = %err, "retrying fetch");
                tokio::time::sleep(wait).await;
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}

#[cfg(feature = "fetch")]
async fn fetch_once(client: &Client, url: Url, config: &FetchConfig) -> Result<String> {
    let label = url.to_string();
    let response = client
        .get(url)
        .header("Accept", "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8")
        .header("Accept-Language", "en-US,en;q=0.9")
        .send()
        .await
        .map_err(|e| {
            if e.is_timeout() { GleanerError::Timeout { timeout: config.timeout } } else { GleanerError::HttpError(e) }
        })?;

    let status = response.status();
    if !status.is_success() {
        return Err(GleanerError::HttpStatus { url: label, status: status.as_u16() });
    }

    let content = response.text().await?;
    tracing::debug!(url = %label, bytes = content.len(), "fetched document");
    Ok(content)
}

/// Whether a failed fetch is worth another attempt.
pub fn is_retryable(err: &GleanerError) -> bool {
    match err {
        GleanerError::Timeout { .. } => true,
        GleanerError::HttpStatus { status, .. } => *status == 429 || (500..600).contains(status),
        #[cfg(feature = "fetch")]
        GleanerError::HttpError(e) => e.is_timeout() || e.is_connect(),
        _ => false,
    }
}

/// Reads HTML content from a local file.
///
/// Callers should validate and sanitize the path when accepting user input.
pub fn fetch_file(path: &str) -> Result<String> {
    let path_buf = PathBuf::from(path);

    if !path_buf.exists() {
        Err(GleanerError::FileNotFound(path_buf))
    } else {
        let bytes = fs::read(&path_buf)?;
        String::from_utf8(bytes).map_err(|_| GleanerError::InvalidEncoding)
    }
}

/// Reads HTML content from standard input until EOF.
pub fn fetch_stdin() -> Result<String> {
    use std::io::{self, Read};

    let mut buffer = String::new();
    io::stdin().read_to_string(&mut buffer).map_err(GleanerError::from)?;

    Ok(buffer)
}

/// Where a document comes from.
///
/// [`Source::Html`] carries markup that is already in hand (for example the page
/// currently shown to the user). The engine treats it exactly like fetched HTML.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Source {
    Url(String),
    File(PathBuf),
    Stdin,
    Html(String),
}

impl Source {
    /// Interprets a command-line style input: `-` is stdin, `http(s)://` is a
    /// URL, anything else is a file path.
    pub fn from_input(input: &str) -> Self {
        if input == "-" {
            Source::Stdin
        } else if input.starts_with("http://") || input.starts_with("https://") {
            Source::Url(input.to_string())
        } else {
            Source::File(PathBuf::from(input))
        }
    }

    /// Short label for logs and reports.
    pub fn label(&self) -> String {
        match self {
            Source::Url(url) => url.clone(),
            Source::File(path) => path.display().to_string(),
            Source::Stdin => "<stdin>".to_string(),
            Source::Html(_) => "<html>".to_string(),
        }
    }

    /// Loads sources that need no network access; `None` for URLs.
    pub fn load_local(&self) -> Option<Result<String>> {
        match self {
            Source::Url(_) => None,
            Source::File(path) => Some(fetch_file(&path.to_string_lossy())),
            Source::Stdin => Some(fetch_stdin()),
            Source::Html(html) => Some(Ok(html.clone())),
        }
    }

    /// Loads the document, fetching URLs through `client`.
    #[cfg(feature = "fetch")]
    pub async fn load(&self, client: &Client, config: &FetchConfig) -> Result<String> {
        match self {
            Source::Url(url) => fetch_with_client(client, url, config).await,
            local => local.load_local().unwrap_or_else(|| Err(GleanerError::InvalidUrl(local.label()))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_fetch_config_default() {
        let config = FetchConfig::default();
        assert_eq!(config.timeout, 20);
        assert_eq!(config.max_attempts, 3);
        assert!(config.user_agent.contains("Gleaner"));
    }

    #[test]
    fn test_backoff_doubles_and_caps() {
        let config = FetchConfig::default().with_backoff(Duration::from_millis(100), Duration::from_millis(350));
        assert_eq!(config.backoff_for(1), Duration::from_millis(100));
        assert_eq!(config.backoff_for(2), Duration::from_millis(200));
        assert_eq!(config.backoff_for(3), Duration::from_millis(350));
        assert_eq!(config.backoff_for(40), Duration::from_millis(350));
    }

    #[cfg(feature = "fetch")]
    #[test]
    fn test_fetch_url_invalid() {
        let config = FetchConfig::default();
        let result = std::thread::spawn(move || {
            tokio::runtime::Runtime::new().unwrap().block_on(fetch_url("not-a-url", &config))
        })
        .join()
        .unwrap();

        assert!(matches!(result, Err(GleanerError::InvalidUrl(_))));
    }

    #[test]
    fn test_url_validation() {
        assert!(parse_url("https://example.com/list?page=2").is_ok());
        assert!(matches!(parse_url("example.com"), Err(GleanerError::InvalidUrl(_))));
        assert!(matches!(parse_url("ftp://example.com"), Err(GleanerError::InvalidUrl(_))));
    }

    #[test]
    fn test_retryable_errors() {
        assert!(is_retryable(&GleanerError::Timeout { timeout: 5 }));
        assert!(is_retryable(&GleanerError::HttpStatus { url: "u".into(), status: 503 }));
        assert!(is_retryable(&GleanerError::HttpStatus { url: "u".into(), status: 429 }));
        assert!(!is_retryable(&GleanerError::HttpStatus { url: "u".into(), status: 404 }));
        assert!(!is_retryable(&GleanerError::InvalidUrl("x".into())));
    }

    #[test]
    fn test_fetch_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"<p>saved</p>").unwrap();

        let html = fetch_file(&file.path().to_string_lossy()).unwrap();
        assert_eq!(html, "<p>saved</p>");
        assert!(matches!(fetch_file("/nonexistent/path/file.html"), Err(GleanerError::FileNotFound(_))));
    }

    #[test]
    fn test_source_from_input() {
        assert_eq!(Source::from_input("-"), Source::Stdin);
        assert_eq!(Source::from_input("https://example.com"), Source::Url("https://example.com".into()));
        assert_eq!(Source::from_input("page.html"), Source::File(PathBuf::from("page.html")));
        assert_eq!(Source::Html("<p>".into()).load_local().unwrap().unwrap(), "<p>");
        assert!(Source::Url("https://example.com".into()).load_local().is_none());
    }
}

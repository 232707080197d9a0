use thiserror::Error;

pub type Result<T> = std::result::Result<T, ScraperError>;

#[derive(Error, Debug)]
pub enum ScraperError {
    /// The search page rendered its empty-result state.
    #[error("no results found")]
    NotFound,

    #[error("browser error: {0}")]
    Browser(String),

    #[error("parse error: {0}")]
    Parse(String),

    #[error("cache error: {0}")]
    Cache(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("session error: {0}")]
    Session(String),
}

impl ScraperError {
    /// Whether the retry policy may re-run the whole search for this error.
    ///
    /// `NotFound` is retried because the marketplace intermittently serves
    /// the empty-result page to suspected bots; `Browser` covers navigation
    /// and readiness timeouts. Everything else stops immediately, and
    /// `Session` in particular has no recovery path.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ScraperError::NotFound | ScraperError::Browser(_))
    }
}

impl From<std::io::Error> for ScraperError {
    fn from(err: std::io::Error) -> Self {
        ScraperError::Cache(err.to_string())
    }
}

impl From<serde_json::Error> for ScraperError {
    fn from(err: serde_json::Error) -> Self {
        ScraperError::Parse(err.to_string())
    }
}

impl From<toml::de::Error> for ScraperError {
    fn from(err: toml::de::Error) -> Self {
        ScraperError::Config(err.to_string())
    }
}

impl From<chromiumoxide::error::CdpError> for ScraperError {
    fn from(err: chromiumoxide::error::CdpError) -> Self {
        ScraperError::Browser(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retry_classification() {
        assert!(ScraperError::NotFound.is_retryable());
        assert!(ScraperError::Browser("navigation timed out".to_string()).is_retryable());

        assert!(!ScraperError::Parse("bad json".to_string()).is_retryable());
        assert!(!ScraperError::Cache("disk full".to_string()).is_retryable());
        assert!(!ScraperError::Config("missing field".to_string()).is_retryable());
        assert!(!ScraperError::Session("launch failed".to_string()).is_retryable());
    }
}

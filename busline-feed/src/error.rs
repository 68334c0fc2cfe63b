use std::fmt;

#[derive(Debug, thiserror::Error)]
pub enum FeedError {
    #[error("Transit source unavailable: {0}")]
    SourceUnavailable(String),

    #[error("Request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Failed to parse feed: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Failed to read GTFS archive: {0}")]
    Archive(String),
}

/// A provider record that failed validation and was left out of a snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MalformedRecord {
    pub key: String,
    pub reason: String,
}

impl MalformedRecord {
    pub fn new(key: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            reason: reason.into(),
        }
    }
}

impl fmt::Display for MalformedRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.key, self.reason)
    }
}

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CrawlError {
    #[error("HTTP request failed: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Session rejected: {0}")]
    Auth(String),

    #[error("Unexpected response: {0}")]
    Protocol(String),

    #[error("Invalid session id: {0}")]
    InvalidSession(String),

    #[error("Task join error: {0}")]
    Join(#[from] tokio::task::JoinError),
}

impl CrawlError {
    /// Fatal errors stop the whole crawl; anything else only ends the task
    /// that hit it.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            CrawlError::Auth(_) | CrawlError::Protocol(_) | CrawlError::InvalidUrl(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, CrawlError>;

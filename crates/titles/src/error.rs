use thiserror::Error;

/// Failure to obtain a title for a URL.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("invalid URL {url}: {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("unsupported URL scheme: {0}")]
    UnsupportedScheme(String),

    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("server responded with status {0}")]
    Status(u16),

    #[error("content type {0} is not HTML")]
    NotHtml(String),

    #[error("page has no title")]
    NoTitle,

    #[error("{0}")]
    Other(String),
}

/// Failure to discover URLs in a message.
#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("message is too long to scan ({0} bytes)")]
    TooLong(usize),

    #[error("{0}")]
    Other(String),
}

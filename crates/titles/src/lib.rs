pub mod error;
pub mod finder;
pub mod http;

use async_trait::async_trait;

pub use error::{ExtractError, FetchError};
pub use finder::RegexUrlFinder;
pub use http::{HttpTitleFetcher, HttpTitleFetcherConfig};

/// Resolves a URL to a human-readable title.
///
/// Implementations may be slow or never return; callers are expected to bound
/// the wait themselves.
#[async_trait]
pub trait TitleFetcher: Send + Sync {
    async fn fetch_title(&self, url: &str) -> Result<String, FetchError>;
}

/// Discovers URLs inside free-form chat text.
pub trait UrlFinder: Send + Sync {
    /// Return every URL in `text`, in the order they appear.
    ///
    /// The result is not deduplicated and may repeat a URL.
    fn find_urls(&self, text: &str) -> Result<Vec<String>, ExtractError>;
}

//! HTTP title fetching.
//!
//! Downloads the start of a page and pulls a title out of its markup.

use std::sync::LazyLock;
use std::time::Duration;

use async_trait::async_trait;
use regex::{Captures, Regex};
use reqwest::Client;
use tracing::debug;
use url::Url;

use crate::{FetchError, TitleFetcher};

static TITLE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<title[^>]*>(.*?)</title>").expect("valid regex"));

static OG_TITLE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)<meta[^>]+property=["']og:title["'][^>]+content=["']([^"']*)["']"#)
        .expect("valid regex")
});

static OG_TITLE_RE2: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)<meta[^>]+content=["']([^"']*)["'][^>]+property=["']og:title["']"#)
        .expect("valid regex")
});

static ENTITY_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"&(#[0-9]{1,7}|#[xX][0-9a-fA-F]{1,6}|[a-zA-Z]{2,8});").expect("valid regex")
});

/// Settings for [`HttpTitleFetcher`].
#[derive(Debug, Clone)]
pub struct HttpTitleFetcherConfig {
    /// User agent string.
    pub user_agent: String,
    /// Request timeout.
    pub timeout: Duration,
    /// Verify HTTPS certificates.
    pub verify_tls: bool,
    /// Maximum response size in bytes.
    pub max_body_bytes: usize,
}

impl Default for HttpTitleFetcherConfig {
    fn default() -> Self {
        Self {
            user_agent: format!("titlebot/{}", env!("CARGO_PKG_VERSION")),
            timeout: Duration::from_secs(15),
            verify_tls: false,
            max_body_bytes: 1024 * 1024, // 1MB
        }
    }
}

/// [`TitleFetcher`] that reads the `<title>` of an HTML page over HTTP(S).
pub struct HttpTitleFetcher {
    client: Client,
    max_body_bytes: usize,
}

impl HttpTitleFetcher {
    pub fn new(config: HttpTitleFetcherConfig) -> Result<Self, FetchError> {
        let client = Client::builder()
            .user_agent(&config.user_agent)
            .timeout(config.timeout)
            .danger_accept_invalid_certs(!config.verify_tls)
            .build()?;

        Ok(Self {
            client,
            max_body_bytes: config.max_body_bytes,
        })
    }

    async fn read_body(
        &self,
        mut response: reqwest::Response,
    ) -> Result<Vec<u8>, FetchError> {
        let mut body = Vec::new();
        while let Some(chunk) = response.chunk().await? {
            let room = self.max_body_bytes - body.len();
            body.extend_from_slice(&chunk[..chunk.len().min(room)]);
            if body.len() >= self.max_body_bytes {
                break;
            }
        }
        Ok(body)
    }
}

#[async_trait]
impl TitleFetcher for HttpTitleFetcher {
    async fn fetch_title(&self, url: &str) -> Result<String, FetchError> {
        let target = normalize_url(url)?;

        let response = self.client.get(target.clone()).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status(status.as_u16()));
        }

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_ascii_lowercase();

        if !content_type.is_empty()
            && !content_type.contains("text/html")
            && !content_type.contains("application/xhtml")
        {
            return Err(FetchError::NotHtml(content_type));
        }

        let body = self.read_body(response).await?;
        let html = String::from_utf8_lossy(&body);

        let title = extract_title(&html).ok_or(FetchError::NoTitle)?;
        debug!(url = %target, bytes = body.len(), "Extracted page title");
        Ok(title)
    }
}

/// Turn chat-captured text into a fetchable URL.
///
/// Text without a scheme (`www.example.com`, `example.com/page`) is fetched
/// over plain HTTP. Only http and https are allowed.
fn normalize_url(raw: &str) -> Result<Url, FetchError> {
    let candidate = if raw.contains("://") {
        raw.to_string()
    } else {
        format!("http://{raw}")
    };

    let parsed = Url::parse(&candidate).map_err(|e| FetchError::InvalidUrl {
        url: raw.to_string(),
        reason: e.to_string(),
    })?;

    match parsed.scheme() {
        "http" | "https" => Ok(parsed),
        other => Err(FetchError::UnsupportedScheme(other.to_string())),
    }
}

/// Extract the page title, preferring `<title>` over `og:title`.
fn extract_title(html: &str) -> Option<String> {
    let raw = TITLE_RE
        .captures(html)
        .or_else(|| OG_TITLE_RE.captures(html))
        .or_else(|| OG_TITLE_RE2.captures(html))?
        .get(1)?
        .as_str();

    let title = collapse_whitespace(&decode_html_entities(raw));
    if title.is_empty() { None } else { Some(title) }
}

fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Decode named and numeric HTML entities; unknown entities are left as is.
fn decode_html_entities(s: &str) -> String {
    ENTITY_RE
        .replace_all(s, |caps: &Captures| {
            let entity = &caps[1];
            let decoded = if let Some(hex) = entity
                .strip_prefix("#x")
                .or_else(|| entity.strip_prefix("#X"))
            {
                u32::from_str_radix(hex, 16).ok().and_then(char::from_u32)
            } else if let Some(dec) = entity.strip_prefix('#') {
                dec.parse::<u32>().ok().and_then(char::from_u32)
            } else {
                named_entity(entity)
            };
            decoded.map_or_else(|| caps[0].to_string(), |c| c.to_string())
        })
        .into_owned()
}

fn named_entity(name: &str) -> Option<char> {
    let c = match name {
        "amp" => '&',
        "lt" => '<',
        "gt" => '>',
        "quot" => '"',
        "apos" => '\'',
        "nbsp" => ' ',
        "ndash" => '–',
        "mdash" => '—',
        "hellip" => '…',
        "laquo" => '«',
        "raquo" => '»',
        "lsquo" => '‘',
        "rsquo" => '’',
        "ldquo" => '“',
        "rdquo" => '”',
        "middot" => '·',
        "bull" => '•',
        "copy" => '©',
        "reg" => '®',
        "trade" => '™',
        _ => return None,
    };
    Some(c)
}

#[cfg(test)]
mod tests {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    use super::*;

    #[test]
    fn test_extract_title() {
        let html = r"<html><head><title>Test Page</title></head></html>";
        assert_eq!(extract_title(html), Some("Test Page".to_string()));
    }

    #[test]
    fn test_extract_title_multiline_with_attributes() {
        let html = "<html><head><TITLE data-x=\"1\">\n  Rust  \n  Programming\n</TITLE></head></html>";
        assert_eq!(extract_title(html), Some("Rust Programming".to_string()));
    }

    #[test]
    fn test_extract_og_title_fallback() {
        let html = r#"<html><head><meta property="og:title" content="OG Title"></head></html>"#;
        assert_eq!(extract_title(html), Some("OG Title".to_string()));

        let html = r#"<html><head><meta content="Reversed" property="og:title"></head></html>"#;
        assert_eq!(extract_title(html), Some("Reversed".to_string()));
    }

    #[test]
    fn test_blank_title_is_none() {
        assert_eq!(extract_title("<title>   </title>"), None);
        assert_eq!(extract_title("<html><body>no head</body></html>"), None);
    }

    #[test]
    fn test_decode_html_entities() {
        assert_eq!(decode_html_entities("Hello &amp; World"), "Hello & World");
        assert_eq!(decode_html_entities("&lt;script&gt;"), "<script>");
        assert_eq!(decode_html_entities("It&#39;s &#x27;quoted&#x27;"), "It's 'quoted'");
        assert_eq!(decode_html_entities("A &mdash; B"), "A — B");
        assert_eq!(decode_html_entities("&bogus; stays"), "&bogus; stays");
    }

    #[test]
    fn test_normalize_url() {
        assert_eq!(
            normalize_url("example.com/page").unwrap().as_str(),
            "http://example.com/page"
        );
        assert_eq!(
            normalize_url("https://example.com/").unwrap().as_str(),
            "https://example.com/"
        );
        assert!(matches!(
            normalize_url("ftp://example.com/file"),
            Err(FetchError::UnsupportedScheme(s)) if s == "ftp"
        ));
        assert!(matches!(normalize_url(""), Err(FetchError::InvalidUrl { .. })));
    }

    /// Serve a single canned HTTP response and return the base URL.
    async fn serve_once(status_line: &'static str, content_type: &'static str, body: &'static str) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 4096];
            let _ = socket.read(&mut buf).await;
            let response = format!(
                "{status_line}\r\nContent-Type: {content_type}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                body.len()
            );
            let _ = socket.write_all(response.as_bytes()).await;
            socket.shutdown().await.ok();
        });

        format!("http://{addr}")
    }

    #[tokio::test]
    async fn test_fetch_title_from_server() {
        let base = serve_once(
            "HTTP/1.1 200 OK",
            "text/html; charset=utf-8",
            "<html><head><title>Served &amp; Found</title></head></html>",
        )
        .await;

        let fetcher = HttpTitleFetcher::new(HttpTitleFetcherConfig::default()).unwrap();
        let title = fetcher.fetch_title(&format!("{base}/page")).await.unwrap();
        assert_eq!(title, "Served & Found");
    }

    #[tokio::test]
    async fn test_fetch_title_error_status() {
        let base = serve_once("HTTP/1.1 404 Not Found", "text/html", "<title>Missing</title>").await;

        let fetcher = HttpTitleFetcher::new(HttpTitleFetcherConfig::default()).unwrap();
        let err = fetcher.fetch_title(&base).await.unwrap_err();
        assert!(matches!(err, FetchError::Status(404)));
    }

    #[tokio::test]
    async fn test_fetch_title_rejects_non_html() {
        let base = serve_once("HTTP/1.1 200 OK", "image/png", "not really a png").await;

        let fetcher = HttpTitleFetcher::new(HttpTitleFetcherConfig::default()).unwrap();
        let err = fetcher.fetch_title(&base).await.unwrap_err();
        assert!(matches!(err, FetchError::NotHtml(ct) if ct == "image/png"));
    }

    #[tokio::test]
    async fn test_body_cap_hides_late_title() {
        let base = serve_once(
            "HTTP/1.1 200 OK",
            "text/html",
            "<html><head><!-- padding padding padding --><title>Too late</title></head></html>",
        )
        .await;

        let fetcher = HttpTitleFetcher::new(HttpTitleFetcherConfig {
            max_body_bytes: 16,
            ..HttpTitleFetcherConfig::default()
        })
        .unwrap();
        let err = fetcher.fetch_title(&base).await.unwrap_err();
        assert!(matches!(err, FetchError::NoTitle));
    }
}

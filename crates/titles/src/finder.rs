//! Regex-based URL discovery.
//!
//! Matches explicit `scheme://` URLs, `www.` hosts and bare hosts whose
//! suffix is on the public suffix list. Trailing punctuation is deliberately
//! kept: a URL at the end of a sentence is captured with its period, and the
//! fetch job strips it again if the fetch fails.

use std::sync::LazyLock;

use regex::{Captures, Regex};

use crate::{ExtractError, UrlFinder};

/// Messages longer than this are refused rather than scanned.
const MAX_SCAN_BYTES: usize = 64 * 1024;

static URL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"(?ix)
        (?:
            (?:https?|ftp|file)://[^\s<>"]+
          | www\.[^\s<>"]+
          | (?P<host>
                [a-z0-9](?:[a-z0-9-]*[a-z0-9])?
                (?:\.[a-z0-9](?:[a-z0-9-]*[a-z0-9])?)*
                \.(?:[a-z]{2,63}|xn--[a-z0-9-]{1,59})
            )\b
            (?:[/?\#][^\s<>"]*)?
        )"#,
    )
    .expect("URL pattern is a valid regex")
});

/// Default [`UrlFinder`] used by the bot.
#[derive(Debug, Clone, Default)]
pub struct RegexUrlFinder;

impl RegexUrlFinder {
    pub fn new() -> Self {
        Self
    }
}

impl UrlFinder for RegexUrlFinder {
    fn find_urls(&self, text: &str) -> Result<Vec<String>, ExtractError> {
        if text.len() > MAX_SCAN_BYTES {
            return Err(ExtractError::TooLong(text.len()));
        }

        let urls = URL_RE
            .captures_iter(text)
            .filter(|caps| !is_mail_address(text, caps))
            .filter(|caps| caps.name("host").is_none_or(|host| has_public_suffix(host.as_str())))
            .filter_map(|caps| caps.get(0))
            .map(|m| m.as_str().to_string())
            .collect();

        Ok(urls)
    }
}

/// `user@example.com` is an address, not a link.
fn is_mail_address(text: &str, caps: &Captures) -> bool {
    let Some(m) = caps.get(0) else {
        return false;
    };
    text[..m.start()].ends_with('@') || text[m.end()..].starts_with('@')
}

/// Whether a bare host ends in a registered suffix (`docs.rs`, `foo.co.uk`),
/// as opposed to a file name such as `notes.txt`.
fn has_public_suffix(host: &str) -> bool {
    let host = host.to_ascii_lowercase();
    psl::suffix(host.as_bytes()).is_some_and(|suffix| suffix.is_known())
}

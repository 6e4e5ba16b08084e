//! In-memory fakes shared by the unit tests.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use titlebot_common::error::AppError;
use titlebot_titles::{ExtractError, FetchError, TitleFetcher, UrlFinder};

use crate::transport::ChannelTransport;

/// Transport that records every message it is asked to send.
#[derive(Default)]
pub struct RecordingTransport {
    sent: Mutex<Vec<(String, String)>>,
    fail: bool,
}

impl RecordingTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// A transport whose every send fails.
    pub fn failing() -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
            fail: true,
        }
    }

    pub fn sent(&self) -> Vec<(String, String)> {
        self.sent.lock().unwrap().clone()
    }

    pub fn sent_to(&self, channel: &str) -> Vec<String> {
        self.sent()
            .into_iter()
            .filter(|(c, _)| c == channel)
            .map(|(_, text)| text)
            .collect()
    }
}

#[async_trait]
impl ChannelTransport for RecordingTransport {
    async fn send(&self, channel: &str, text: &str) -> Result<(), AppError> {
        if self.fail {
            return Err(AppError::Transport("connection closed".to_string()));
        }
        self.sent
            .lock()
            .unwrap()
            .push((channel.to_string(), text.to_string()));
        Ok(())
    }
}

/// How a scripted URL behaves when fetched.
#[derive(Clone)]
pub enum Script {
    Title { delay: Duration, title: String },
    Fail { delay: Duration, error: String },
}

/// Fetcher answering from a fixed table; unknown URLs fail immediately.
#[derive(Default)]
pub struct ScriptedFetcher {
    scripts: HashMap<String, Script>,
    attempts: Mutex<Vec<String>>,
}

impl ScriptedFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn title(mut self, url: &str, title: &str) -> Self {
        self.scripts.insert(
            url.to_string(),
            Script::Title {
                delay: Duration::ZERO,
                title: title.to_string(),
            },
        );
        self
    }

    pub fn slow_title(mut self, url: &str, delay: Duration, title: &str) -> Self {
        self.scripts.insert(
            url.to_string(),
            Script::Title {
                delay,
                title: title.to_string(),
            },
        );
        self
    }

    pub fn fail(mut self, url: &str, error: &str) -> Self {
        self.scripts.insert(
            url.to_string(),
            Script::Fail {
                delay: Duration::ZERO,
                error: error.to_string(),
            },
        );
        self
    }

    pub fn attempted_urls(&self) -> Vec<String> {
        self.attempts.lock().unwrap().clone()
    }
}

#[async_trait]
impl TitleFetcher for ScriptedFetcher {
    async fn fetch_title(&self, url: &str) -> Result<String, FetchError> {
        self.attempts.lock().unwrap().push(url.to_string());

        match self.scripts.get(url).cloned() {
            Some(Script::Title { delay, title }) => {
                tokio::time::sleep(delay).await;
                Ok(title)
            }
            Some(Script::Fail { delay, error }) => {
                tokio::time::sleep(delay).await;
                Err(FetchError::Other(error))
            }
            None => Err(FetchError::Other("connection refused".to_string())),
        }
    }
}

/// Finder that returns a fixed list, or fails.
pub struct FixedFinder(pub Result<Vec<String>, String>);

impl FixedFinder {
    pub fn urls(urls: &[&str]) -> Self {
        Self(Ok(urls.iter().map(|u| u.to_string()).collect()))
    }

    pub fn failing(error: &str) -> Self {
        Self(Err(error.to_string()))
    }
}

impl UrlFinder for FixedFinder {
    fn find_urls(&self, _text: &str) -> Result<Vec<String>, ExtractError> {
        self.0.clone().map_err(ExtractError::Other)
    }
}

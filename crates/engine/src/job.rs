//! Fetch jobs and the retry-with-stripping policy.
//!
//! A URL captured from chat often drags along the punctuation that ended the
//! sentence (`see example.com/page.`). When a fetch fails and the URL ends in
//! ASCII punctuation, the job alerts, strips that one character and tries
//! again, until a fetch succeeds or no trailing punctuation is left.

use tokio::time::Instant;
use tracing::debug;
use uuid::Uuid;

use titlebot_common::types::{ChannelName, Severity};
use titlebot_titles::TitleFetcher;

use crate::alert::Alerter;

/// One URL to resolve, as seen in a message from `user` on `channel`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchJob {
    pub id: Uuid,
    pub channel: ChannelName,
    pub user: String,
    pub url: String,
}

impl FetchJob {
    pub fn new(channel: ChannelName, user: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            channel,
            user: user.into(),
            url: url.into(),
        }
    }
}

/// Result a job reports to the delivery stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
    /// `url` is the URL that was actually fetched, possibly with trailing
    /// punctuation stripped from the job's original URL.
    Title { url: String, title: String },
    /// Every attempt failed; the failures have already been alerted.
    NoTitle,
}

/// Run `job` to completion, alerting on every failed attempt.
pub async fn run_fetch_job(
    job: &FetchJob,
    fetcher: &dyn TitleFetcher,
    alerter: &Alerter,
) -> FetchOutcome {
    let mut url = job.url.clone();

    while !url.is_empty() {
        let started = Instant::now();
        match fetcher.fetch_title(&url).await {
            Ok(title) => {
                debug!(
                    job_id = %job.id,
                    channel = %job.channel,
                    user = %job.user,
                    url = %url,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    title = %title,
                    "Returning title"
                );
                return FetchOutcome::Title { url, title };
            }
            Err(e) => {
                let mut alert = format!(
                    "Error retrieving title for URL {} in message from {} in {} in {:.1}s: {}",
                    url,
                    job.user,
                    job.channel,
                    started.elapsed().as_secs_f64(),
                    e
                );

                let trailing = url.chars().last().filter(char::is_ascii_punctuation);
                if let Some(c) = trailing {
                    let period = if alert.ends_with('.') { "" } else { "." };
                    alert.push_str(&format!(
                        "{period} It will be reattempted with its last punctuation character \"{c}\" stripped."
                    ));
                }

                alerter.alert(&alert, Severity::Error).await;

                if trailing.is_none() {
                    break;
                }
                url.pop();
            }
        }
    }

    FetchOutcome::NoTitle
}

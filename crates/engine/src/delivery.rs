//! Ordered delivery of titles.
//!
//! Each channel has one [`DeliveryQueue`] and one [`DeliveryConsumer`]. The
//! consumer takes handles strictly in the order they were queued and waits a
//! bounded time for each. A job that overruns the timeout is abandoned: its
//! fetch keeps running but nothing is ever posted for it. This bounds how long
//! one slow page can hold back titles that are already available behind it.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use titlebot_common::config::casefold;
use titlebot_common::types::{ChannelName, Severity};

use crate::alert::Alerter;
use crate::job::FetchOutcome;
use crate::pool::ResultHandle;
use crate::transport::ChannelTransport;

/// Delivery policy shared by every channel.
#[derive(Debug, Clone)]
pub struct DeliverySettings {
    /// How long to wait for any single job.
    pub timeout: Duration,
    /// Text placed before each title.
    pub prefix: String,
    /// Case-folded titles that are never posted.
    pub skip_titles: HashSet<String>,
}

impl DeliverySettings {
    /// Render the chat message for `title`.
    pub fn format_message(&self, title: &str) -> String {
        if self.prefix.is_empty() {
            title.to_string()
        } else {
            format!("{} {}", self.prefix, title)
        }
    }

    pub fn is_skipped(&self, title: &str) -> bool {
        self.skip_titles.contains(&casefold(title))
    }
}

/// Terminal state of a job as seen by the delivery stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryOutcome {
    Delivered { url: String, title: String },
    SkippedTitle { title: String },
    FinalFailure,
    TimedOut,
    /// The title was ready but the transport refused it.
    SendFailed,
}

#[derive(Debug, Error)]
#[error("delivery queue for {0} is closed")]
pub struct QueueClosed(pub ChannelName);

/// Sending side of a channel's ordered handle queue.
#[derive(Clone)]
pub struct DeliveryQueue {
    channel: ChannelName,
    tx: mpsc::UnboundedSender<ResultHandle>,
}

impl DeliveryQueue {
    pub fn new(channel: ChannelName) -> (Self, mpsc::UnboundedReceiver<ResultHandle>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { channel, tx }, rx)
    }

    /// Append `handle`; never blocks.
    pub fn push(&self, handle: ResultHandle) -> Result<(), QueueClosed> {
        self.tx
            .send(handle)
            .map_err(|_| QueueClosed(self.channel.clone()))
    }
}

/// The single sequential reader of one channel's queue.
pub struct DeliveryConsumer {
    channel: ChannelName,
    receiver: mpsc::UnboundedReceiver<ResultHandle>,
    transport: Arc<dyn ChannelTransport>,
    alerter: Alerter,
    settings: Arc<DeliverySettings>,
}

impl DeliveryConsumer {
    pub fn new(
        channel: ChannelName,
        receiver: mpsc::UnboundedReceiver<ResultHandle>,
        transport: Arc<dyn ChannelTransport>,
        alerter: Alerter,
        settings: Arc<DeliverySettings>,
    ) -> Self {
        Self {
            channel,
            receiver,
            transport,
            alerter,
            settings,
        }
    }

    /// Drain the queue until every sender is dropped.
    pub async fn run(mut self) {
        debug!(channel = %self.channel, "Starting titles handler");

        while let Some(handle) = self.receiver.recv().await {
            self.deliver(handle).await;
        }

        debug!(channel = %self.channel, "Delivery queue closed, titles handler stopping");
    }

    /// Wait for one handle and act on its outcome.
    pub async fn deliver(&self, handle: ResultHandle) -> DeliveryOutcome {
        let started = Instant::now();
        let queued_ms = handle.submitted_at().elapsed().as_millis() as u64;
        let (job, outcome) = handle.into_parts();

        let outcome = match tokio::time::timeout(self.settings.timeout, outcome).await {
            Err(_) => {
                // No alert: only the log is reliably available here.
                error!(
                    channel = %self.channel,
                    job_id = %job.id,
                    user = %job.user,
                    url = %job.url,
                    "Result timed out after {:.1}s.",
                    started.elapsed().as_secs_f64()
                );
                return DeliveryOutcome::TimedOut;
            }
            Ok(Err(_)) => {
                warn!(
                    channel = %self.channel,
                    job_id = %job.id,
                    url = %job.url,
                    "Fetch job ended without reporting a result"
                );
                return DeliveryOutcome::FinalFailure;
            }
            Ok(Ok(outcome)) => outcome,
        };

        let FetchOutcome::Title { url, title } = outcome else {
            return DeliveryOutcome::FinalFailure;
        };

        if self.settings.is_skipped(&title) {
            let alert = format!(
                "Skipping title \"{}\" for {} in {} for URL {}",
                title, job.user, self.channel, url
            );
            self.alerter.alert(&alert, Severity::Info).await;
            return DeliveryOutcome::SkippedTitle { title };
        }

        let message = self.settings.format_message(&title);
        if let Err(e) = self.transport.send(self.channel.as_str(), &message).await {
            error!(
                channel = %self.channel,
                job_id = %job.id,
                url = %url,
                error = %e,
                "Failed to send title"
            );
            return DeliveryOutcome::SendFailed;
        }

        info!(
            channel = %self.channel,
            job_id = %job.id,
            user = %job.user,
            url = %url,
            queued_ms,
            elapsed_ms = started.elapsed().as_millis() as u64,
            message = %message,
            "Sent outgoing message"
        );

        DeliveryOutcome::Delivered { url, title }
    }
}

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, error};

use titlebot_common::config::casefold;
use titlebot_common::types::{InboundMessage, Severity};
use titlebot_titles::UrlFinder;

use crate::alert::Alerter;
use crate::channel::ChannelRegistry;
use crate::transport::InboundHandler;

/// What became of one inbound message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// The sender is on the ignore list.
    Ignored,
    /// The target is not a configured channel (usually a direct message).
    Unroutable,
    ExtractionFailed,
    NoUrls,
    /// This many jobs were queued for the channel.
    Queued(usize),
}

/// Routes inbound messages to their channel's pipeline.
pub struct Dispatcher {
    registry: Arc<ChannelRegistry>,
    finder: Arc<dyn UrlFinder>,
    alerter: Alerter,
    ignores: HashSet<String>,
}

impl Dispatcher {
    /// `ignores` holds case-folded nicks.
    pub fn new(
        registry: Arc<ChannelRegistry>,
        finder: Arc<dyn UrlFinder>,
        alerter: Alerter,
        ignores: HashSet<String>,
    ) -> Self {
        Self {
            registry,
            finder,
            alerter,
            ignores,
        }
    }

    pub async fn handle_inbound(&self, message: &InboundMessage) -> DispatchOutcome {
        if self.ignores.contains(&casefold(&message.user)) {
            debug!(user = %message.user, channel = %message.channel, "Ignoring message from ignored user");
            return DispatchOutcome::Ignored;
        }

        let Some(context) = self.registry.get(&message.channel) else {
            let alert = format!(
                "Ignoring private message from {}: {}",
                message.user, message.text
            );
            self.alerter.alert(&alert, Severity::Warning).await;
            return DispatchOutcome::Unroutable;
        };

        let urls = match self.finder.find_urls(&message.text) {
            Ok(urls) => urls,
            Err(e) => {
                let alert = format!(
                    "Error extracting URLs in message from {} in {}: \"{}\". The error is: {}",
                    message.user,
                    context.name(),
                    message.text,
                    e
                );
                self.alerter.alert(&alert, Severity::Error).await;
                return DispatchOutcome::ExtractionFailed;
            }
        };

        let found = urls.len();
        let urls = prepare_urls(urls);
        if urls.is_empty() {
            if found > 0 {
                debug!(channel = %context.name(), found, "No fetchable URLs after filtering");
            }
            return DispatchOutcome::NoUrls;
        }

        debug!(
            channel = %context.name(),
            user = %message.user,
            found,
            urls = ?urls,
            "Queueing URLs"
        );

        match context.submit_all(&message.user, &urls) {
            Ok(queued) => DispatchOutcome::Queued(queued),
            Err(e) => {
                // Only happens if the channel's consumer task has died.
                error!(channel = %context.name(), error = %e, "Failed to queue URLs");
                DispatchOutcome::Queued(0)
            }
        }
    }
}

/// Collapse consecutive duplicates and drop local file URLs.
pub fn prepare_urls(mut urls: Vec<String>) -> Vec<String> {
    urls.dedup();
    urls.retain(|url| !is_file_url(url));
    urls
}

fn is_file_url(candidate: &str) -> bool {
    match url::Url::parse(candidate) {
        Ok(parsed) => parsed.scheme() == "file",
        Err(_) => candidate
            .get(..5)
            .is_some_and(|prefix| prefix.eq_ignore_ascii_case("file:")),
    }
}

#[async_trait]
impl InboundHandler for Dispatcher {
    async fn on_message(&self, message: InboundMessage) {
        self.handle_inbound(&message).await;
    }
}

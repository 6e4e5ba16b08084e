use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use tracing::{Instrument, info};

use titlebot_common::types::ChannelName;
use titlebot_titles::TitleFetcher;

use crate::alert::Alerter;
use crate::delivery::{DeliveryConsumer, DeliveryQueue, DeliverySettings, QueueClosed};
use crate::job::FetchJob;
use crate::pool::WorkerPool;
use crate::transport::ChannelTransport;

/// Settings applied to every configured channel.
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub max_workers: usize,
    pub delivery: DeliverySettings,
}

/// Pipeline state owned by one channel.
pub struct ChannelContext {
    name: ChannelName,
    pool: WorkerPool,
    queue: DeliveryQueue,
    /// Held while one message's URLs are submitted, so that two messages
    /// arriving together cannot interleave their entries in the queue.
    submit_lock: Mutex<()>,
}

impl ChannelContext {
    pub fn name(&self) -> &ChannelName {
        &self.name
    }

    /// Submit one job per URL and queue the handles in the same order.
    pub fn submit_all(&self, user: &str, urls: &[String]) -> Result<usize, QueueClosed> {
        let _guard = self
            .submit_lock
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        for url in urls {
            let job = FetchJob::new(self.name.clone(), user, url.as_str());
            self.queue.push(self.pool.submit(job))?;
        }
        Ok(urls.len())
    }
}

/// All configured channels, each with its own pool and delivery consumer.
///
/// The set is fixed at startup; channels are never added or removed.
pub struct ChannelRegistry {
    channels: HashMap<ChannelName, ChannelContext>,
}

impl ChannelRegistry {
    /// Build a context for every channel and spawn its delivery consumer.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(
        channels: &[String],
        settings: &PipelineSettings,
        fetcher: Arc<dyn TitleFetcher>,
        transport: Arc<dyn ChannelTransport>,
        alerter: Alerter,
    ) -> Self {
        let delivery = Arc::new(settings.delivery.clone());
        let mut contexts = HashMap::with_capacity(channels.len());

        for channel in channels {
            let name = ChannelName::new(channel);
            if contexts.contains_key(&name) {
                continue;
            }

            let pool = WorkerPool::new(
                name.clone(),
                settings.max_workers,
                Arc::clone(&fetcher),
                alerter.clone(),
            );
            let (queue, receiver) = DeliveryQueue::new(name.clone());
            let consumer = DeliveryConsumer::new(
                name.clone(),
                receiver,
                Arc::clone(&transport),
                alerter.clone(),
                Arc::clone(&delivery),
            );

            let span = tracing::info_span!("titles_handler", channel = %name);
            tokio::spawn(consumer.run().instrument(span));

            info!(
                channel = %name,
                max_workers = pool.max_workers(),
                "Started channel pipeline"
            );

            contexts.insert(
                name.clone(),
                ChannelContext {
                    name,
                    pool,
                    queue,
                    submit_lock: Mutex::new(()),
                },
            );
        }

        Self { channels: contexts }
    }

    /// Look up a channel by name, ignoring case.
    pub fn get(&self, channel: &str) -> Option<&ChannelContext> {
        self.channels.get(&ChannelName::new(channel))
    }

    pub fn channel_names(&self) -> Vec<&ChannelName> {
        let mut names: Vec<_> = self.channels.keys().collect();
        names.sort_by(|a, b| a.as_str().cmp(b.as_str()));
        names
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::time::Duration;

    use super::*;
    use crate::test_support::{RecordingTransport, ScriptedFetcher};

    fn settings() -> PipelineSettings {
        PipelineSettings {
            max_workers: 2,
            delivery: DeliverySettings {
                timeout: Duration::from_secs(5),
                prefix: "↳".to_string(),
                skip_titles: HashSet::new(),
            },
        }
    }

    fn start(fetcher: ScriptedFetcher, transport: Arc<RecordingTransport>) -> ChannelRegistry {
        ChannelRegistry::start(
            &["#Rust".to_string(), "#tokio".to_string(), "#rust".to_string()],
            &settings(),
            Arc::new(fetcher),
            transport,
            Alerter::log_only(),
        )
    }

    #[tokio::test]
    async fn test_lookup_ignores_case() {
        let registry = start(ScriptedFetcher::new(), Arc::new(RecordingTransport::new()));

        assert_eq!(registry.get("#RUST").unwrap().name().as_str(), "#rust");
        assert!(registry.get("#Tokio").is_some());
        assert!(registry.get("#python").is_none());
        assert_eq!(
            registry
                .channel_names()
                .iter()
                .map(|c| c.as_str())
                .collect::<Vec<_>>(),
            vec!["#rust", "#tokio"]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_submit_all_delivers_in_order() {
        let fetcher = ScriptedFetcher::new()
            .slow_title("https://a.example", Duration::from_secs(2), "A")
            .title("https://b.example", "B");
        let transport = Arc::new(RecordingTransport::new());
        let registry = start(fetcher, transport.clone());

        let urls = vec!["https://a.example".to_string(), "https://b.example".to_string()];
        let queued = registry.get("#rust").unwrap().submit_all("alice", &urls).unwrap();
        assert_eq!(queued, 2);

        tokio::time::sleep(Duration::from_secs(3)).await;
        assert_eq!(transport.sent_to("#rust"), vec!["↳ A", "↳ B"]);
        assert!(transport.sent_to("#tokio").is_empty());
    }
}

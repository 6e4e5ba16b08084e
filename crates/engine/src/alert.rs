//! Operational alerts.
//!
//! Every alert is logged locally. When a transport is attached the alert is
//! also posted to the operations channel. Posting is best-effort: a failed
//! send is logged and swallowed so alerting can never take a caller down.

use std::sync::Arc;

use tracing::{error, info, warn};

use titlebot_common::types::Severity;

use crate::transport::ChannelTransport;

#[derive(Clone)]
struct AlertSink {
    transport: Arc<dyn ChannelTransport>,
    channel: String,
}

/// Cloneable handle used by every pipeline stage to raise alerts.
#[derive(Clone)]
pub struct Alerter {
    sink: Option<AlertSink>,
}

impl Alerter {
    /// Alerts are logged and posted to `alerts_channel`.
    pub fn new(transport: Arc<dyn ChannelTransport>, alerts_channel: impl Into<String>) -> Self {
        Self {
            sink: Some(AlertSink {
                transport,
                channel: alerts_channel.into(),
            }),
        }
    }

    /// Alerts are only logged.
    pub fn log_only() -> Self {
        Self { sink: None }
    }

    pub fn alerts_channel(&self) -> Option<&str> {
        self.sink.as_ref().map(|sink| sink.channel.as_str())
    }

    pub async fn alert(&self, message: &str, severity: Severity) {
        match severity {
            Severity::Info => info!(%severity, "{message}"),
            Severity::Warning => warn!(%severity, "{message}"),
            Severity::Error => error!(%severity, "{message}"),
        }

        let Some(sink) = &self.sink else {
            return;
        };

        if let Err(e) = sink.transport.send(&sink.channel, message).await {
            warn!(
                channel = %sink.channel,
                error = %e,
                "Failed to send alert to alerts channel"
            );
        }
    }
}

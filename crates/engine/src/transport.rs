use async_trait::async_trait;

use titlebot_common::error::AppError;
use titlebot_common::types::InboundMessage;

/// Outbound side of the chat connection.
#[async_trait]
pub trait ChannelTransport: Send + Sync {
    /// Send `text` to `channel`.
    async fn send(&self, channel: &str, text: &str) -> Result<(), AppError>;
}

/// Receives every message the chat connection sees.
///
/// Registered once with the transport at startup.
#[async_trait]
pub trait InboundHandler: Send + Sync {
    async fn on_message(&self, message: InboundMessage);
}

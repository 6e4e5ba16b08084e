//! Per-channel title pipeline.
//!
//! Inbound messages flow through the [`Dispatcher`], which submits one
//! [`FetchJob`] per URL to the channel's [`WorkerPool`] and queues the job's
//! [`ResultHandle`] on the channel's [`DeliveryQueue`]. A single consumer per
//! channel drains that queue in order, so titles are posted in the order their
//! URLs were seen no matter which fetch finishes first.

pub mod alert;
pub mod channel;
pub mod delivery;
pub mod dispatcher;
pub mod job;
pub mod pool;
pub mod transport;

#[cfg(test)]
pub(crate) mod test_support;

pub use alert::Alerter;
pub use channel::{ChannelContext, ChannelRegistry, PipelineSettings};
pub use delivery::{DeliveryConsumer, DeliveryOutcome, DeliveryQueue, DeliverySettings, QueueClosed};
pub use dispatcher::{DispatchOutcome, Dispatcher};
pub use job::{FetchJob, FetchOutcome};
pub use pool::{ResultHandle, WorkerPool};
pub use transport::{ChannelTransport, InboundHandler};

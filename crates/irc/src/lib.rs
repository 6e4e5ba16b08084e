//! IRC transport for the title bot.

pub mod client;
pub mod message;

pub use client::{IrcClient, IrcConfig, IrcTransport};
pub use message::IrcMessage;

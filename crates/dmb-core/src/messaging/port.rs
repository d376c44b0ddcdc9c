use async_trait::async_trait;

use crate::{
    domain::{ChannelId, MessageId},
    messaging::types::{ArchiveLimits, OutgoingMessage},
    Result,
};

/// Outbound side of the platform: where forensic records are published.
#[async_trait]
pub trait ArchiveSink: Send + Sync {
    fn limits(&self) -> ArchiveLimits {
        ArchiveLimits::default()
    }

    /// Find a guild channel by exact name.
    async fn find_channel(&self, name: &str) -> Result<Option<ChannelId>>;

    async fn send(&self, channel: ChannelId, message: OutgoingMessage) -> Result<MessageId>;
}

//! Deleted-message events and the in-process queue that carries them.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::{
    domain::{ChannelId, MessageId, UserId},
    errors::Error,
    messaging::types::Embed,
    ports::DeletionEventSource,
    Result,
};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    pub id: u64,
    pub filename: String,
    pub url: String,
    pub proxy_url: String,
}

/// One deleted message, reconstructed from what the platform client had
/// cached before the deletion.
#[derive(Clone, Debug, PartialEq)]
pub struct DeletionEvent {
    pub message_id: MessageId,
    pub author: UserId,
    pub channel: ChannelId,
    pub created_at: DateTime<Utc>,
    pub text: String,
    pub attachments: Vec<Attachment>,
    pub embeds: Vec<Embed>,
}

/// Producer half of the deletion queue, handed to the gateway bridge.
#[derive(Clone, Debug)]
pub struct DeletionSender {
    tx: mpsc::Sender<DeletionEvent>,
}

impl DeletionSender {
    /// Enqueue an event, waiting for room when the monitor is behind.
    pub async fn send(&self, event: DeletionEvent) -> Result<()> {
        self.tx
            .send(event)
            .await
            .map_err(|_| Error::External("deletion monitor has stopped".to_string()))
    }
}

/// Consumer half of the deletion queue. Events come out in arrival order.
#[derive(Debug)]
pub struct ChannelDeletionSource {
    rx: mpsc::Receiver<DeletionEvent>,
}

/// Bounded queue between the gateway bridge and the monitor loop.
pub fn deletion_channel(capacity: usize) -> (DeletionSender, ChannelDeletionSource) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (DeletionSender { tx }, ChannelDeletionSource { rx })
}

#[async_trait]
impl DeletionEventSource for ChannelDeletionSource {
    async fn next_deletion(&mut self) -> Option<DeletionEvent> {
        self.rx.recv().await
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;
    use chrono::TimeZone;

    pub fn event(message_id: u64, author: u64, channel: u64) -> DeletionEvent {
        DeletionEvent {
            message_id: MessageId(message_id),
            author: UserId(author),
            channel: ChannelId(channel),
            created_at: Utc.with_ymd_and_hms(2026, 3, 4, 5, 6, 7).unwrap(),
            text: String::new(),
            attachments: Vec::new(),
            embeds: Vec::new(),
        }
    }
}

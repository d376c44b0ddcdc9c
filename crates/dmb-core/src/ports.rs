use async_trait::async_trait;

use crate::{
    audit::{AuditActionKind, AuditEntry},
    domain::ChannelId,
    event::DeletionEvent,
    Result,
};

/// Hexagonal port for the platform's moderation audit log.
#[async_trait]
pub trait AuditLogSource: Send + Sync {
    /// Most recent `limit` entries of `kind`, newest first. When `channel` is
    /// set only entries linked to that channel are returned; the result may be
    /// shorter than `limit`.
    async fn query(
        &self,
        kind: AuditActionKind,
        channel: Option<ChannelId>,
        limit: usize,
    ) -> Result<Vec<AuditEntry>>;
}

/// Stream of deleted messages. `None` means the feed is closed for good.
#[async_trait]
pub trait DeletionEventSource: Send {
    async fn next_deletion(&mut self) -> Option<DeletionEvent>;
}

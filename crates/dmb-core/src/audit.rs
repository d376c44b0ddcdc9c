//! Moderation audit log model.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{AuditEntryId, ChannelId, UserId};

/// Kind of moderation action to query the audit log for.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AuditActionKind {
    MessageDelete,
    /// Mapped by the adapters so the audit port covers both deletion actions.
    /// Correlation only queries single deletions; bulk purges are not
    /// attributed.
    MessageBulkDelete,
}

/// One moderation action as reported by the platform's audit facility.
///
/// Everything except `affected_count` is fixed once fetched. The platform bumps
/// the count in place when it reuses the id for a consecutive action.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub id: AuditEntryId,
    pub actor: UserId,
    pub created_at: DateTime<Utc>,
    pub affected_count: u32,
    /// Channel the action applied to. Entries without it cannot be
    /// correlated with a deletion and are skipped.
    pub channel: Option<ChannelId>,
}

impl AuditEntry {
    pub fn age(&self, now: DateTime<Utc>) -> Duration {
        age_between(self.created_at, now)
    }
}

/// Absolute distance between two instants; clock skew never yields a
/// negative age.
pub fn age_between(then: DateTime<Utc>, now: DateTime<Utc>) -> Duration {
    (now - then).abs().to_std().unwrap_or_default()
}

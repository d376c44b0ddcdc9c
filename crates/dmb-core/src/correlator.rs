//! Works out who deleted a message.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::{
    audit::{AuditActionKind, AuditEntry},
    cache::CorrelationCache,
    domain::UserId,
    event::DeletionEvent,
    ports::AuditLogSource,
    Result,
};

pub const DEFAULT_SCAN_LIMIT: usize = 5;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Resolution {
    Publish { deleted_by: UserId },
    /// The bot deleting its own message: housekeeping, not worth archiving.
    Suppressed,
}

pub struct Correlator {
    audit: Arc<dyn AuditLogSource>,
    bot: UserId,
    scan_limit: usize,
}

impl Correlator {
    pub fn new(audit: Arc<dyn AuditLogSource>, bot: UserId, scan_limit: usize) -> Self {
        Self {
            audit,
            bot,
            scan_limit,
        }
    }

    /// Scan the recent audit window for the event's channel and decide who
    /// performed the deletion.
    ///
    /// A failed query returns before the cache is touched, so the call can be
    /// retried as-is.
    pub async fn resolve(
        &self,
        cache: &mut CorrelationCache,
        event: &DeletionEvent,
    ) -> Result<Resolution> {
        let entries = self
            .audit
            .query(
                AuditActionKind::MessageDelete,
                Some(event.channel),
                self.scan_limit,
            )
            .await?;

        let deleted_by =
            scan_entries(cache, event, &entries, Utc::now()).unwrap_or(event.author);

        if deleted_by == self.bot && event.author == self.bot {
            debug!(message = %event.message_id, "suppressing self-deletion by the bot");
            return Ok(Resolution::Suppressed);
        }
        Ok(Resolution::Publish { deleted_by })
    }
}

/// Fold the entries (in source order) through the cache; the last candidate
/// seen wins. `None` means no moderator action matched.
pub fn scan_entries(
    cache: &mut CorrelationCache,
    event: &DeletionEvent,
    entries: &[AuditEntry],
    now: DateTime<Utc>,
) -> Option<UserId> {
    entries.iter().fold(None, |chosen, entry| {
        let Some(channel) = entry.channel else {
            debug!(entry = %entry.id, "skipping audit entry without channel linkage");
            return chosen;
        };
        if channel != event.channel {
            return chosen;
        }
        cache.observe(entry, now).candidate().or(chosen)
    })
}

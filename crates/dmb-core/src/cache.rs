//! Correlation cache: audit entries already seen by the monitor.
//!
//! The platform reuses an audit entry id for consecutive deletions by the same
//! moderator and only bumps the entry's count. Remembering which ids (and
//! counts) we have already attributed lets the correlator tell "a new action"
//! from "the same old entry showing up again in the recent window".

use std::{collections::HashMap, time::Duration};

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::{
    audit::{age_between, AuditEntry},
    domain::{AuditEntryId, UserId},
};

/// Time windows that decide whether an audit entry is relevant or stale.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CorrelationWindows {
    /// An unseen entry only counts as a match when younger than this.
    pub fresh: Duration,
    /// Bootstrap only seeds entries younger than this.
    pub bootstrap: Duration,
    /// A cached entry untouched for longer than this is dropped.
    pub eviction: Duration,
}

impl Default for CorrelationWindows {
    fn default() -> Self {
        Self {
            fresh: Duration::from_secs(60),
            bootstrap: Duration::from_secs(3600),
            eviction: Duration::from_secs(86_400),
        }
    }
}

#[derive(Clone, Debug)]
struct CacheRecord {
    entry: AuditEntry,
    /// When the record was inserted or last refreshed by a count change.
    last_seen: DateTime<Utc>,
}

/// Outcome of observing one freshly fetched audit entry.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Observation {
    /// New entry inside the fresh window; its actor is a candidate.
    Recorded(UserId),
    /// Known id whose count moved; a new action reusing the id.
    CountChanged(UserId),
    /// Known id, same count. Nothing new.
    Unchanged,
    /// Known id, same count, and stale: removed from the cache.
    Evicted,
    /// Unseen id outside the fresh window; unrelated to the current deletion.
    Ignored,
}

impl Observation {
    pub fn candidate(&self) -> Option<UserId> {
        match self {
            Observation::Recorded(actor) | Observation::CountChanged(actor) => Some(*actor),
            _ => None,
        }
    }
}

/// Time-evicted store of previously seen audit entries.
///
/// Owned by the monitor loop and never shared, so no locking. There is no
/// size cap: records only leave through lazy eviction.
#[derive(Debug, Default)]
pub struct CorrelationCache {
    windows: CorrelationWindows,
    records: HashMap<AuditEntryId, CacheRecord>,
}

impl CorrelationCache {
    pub fn new(windows: CorrelationWindows) -> Self {
        Self {
            windows,
            records: HashMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn contains(&self, id: AuditEntryId) -> bool {
        self.records.contains_key(&id)
    }

    /// Seed from recent audit history. Only entries younger than the bootstrap
    /// window are kept; the first entry seen for an id wins.
    ///
    /// Returns how many records were inserted.
    pub fn bootstrap(
        &mut self,
        entries: impl IntoIterator<Item = AuditEntry>,
        now: DateTime<Utc>,
    ) -> usize {
        let mut inserted = 0usize;
        for entry in entries {
            if self.records.contains_key(&entry.id) {
                continue;
            }
            if entry.age(now) >= self.windows.bootstrap {
                continue;
            }
            self.records.insert(
                entry.id,
                CacheRecord {
                    entry,
                    last_seen: now,
                },
            );
            inserted += 1;
        }
        inserted
    }

    /// Fold one freshly fetched entry into the cache.
    pub fn observe(&mut self, entry: &AuditEntry, now: DateTime<Utc>) -> Observation {
        let Some(record) = self.records.get_mut(&entry.id) else {
            if entry.age(now) >= self.windows.fresh {
                return Observation::Ignored;
            }
            debug!(entry = %entry.id, actor = entry.actor.0, "recording fresh audit entry");
            self.records.insert(
                entry.id,
                CacheRecord {
                    entry: entry.clone(),
                    last_seen: now,
                },
            );
            return Observation::Recorded(entry.actor);
        };

        if record.entry.affected_count != entry.affected_count {
            debug!(
                entry = %entry.id,
                from = record.entry.affected_count,
                to = entry.affected_count,
                "audit entry count changed"
            );
            record.entry = entry.clone();
            record.last_seen = now;
            return Observation::CountChanged(entry.actor);
        }

        if age_between(record.last_seen, now) > self.windows.eviction {
            debug!(entry = %entry.id, "evicting stale audit entry");
            self.records.remove(&entry.id);
            return Observation::Evicted;
        }

        Observation::Unchanged
    }
}

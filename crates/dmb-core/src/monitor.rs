//! The deletion monitor loop.
//!
//! `Bootstrapping -> Waiting -> Correlating -> Publishing -> Waiting -> ...`
//!
//! One task owns the loop and its correlation cache. Events are handled one at
//! a time in arrival order: the audit scan for an event never starts before
//! the previous event has been published. Transient audit-log failures are
//! retried with exponential backoff until they succeed or the loop is
//! cancelled; everything else drops the current record and keeps going.

use std::{sync::Arc, time::Duration};

use chrono::Utc;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::{
    archiver::Archiver,
    audit::{AuditActionKind, AuditEntry},
    cache::{CorrelationCache, CorrelationWindows},
    correlator::{Correlator, Resolution, DEFAULT_SCAN_LIMIT},
    domain::UserId,
    errors::Error,
    event::DeletionEvent,
    messaging::port::ArchiveSink,
    ports::{AuditLogSource, DeletionEventSource},
    Result,
};

pub const DEFAULT_BOOTSTRAP_LIMIT: usize = 25;
pub const DEFAULT_ARCHIVE_CHANNEL: &str = "deleted_text";

/// Exponential backoff for transient audit-log failures.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Backoff {
    pub initial: Duration,
    pub max: Duration,
    pub factor: u32,
}

impl Default for Backoff {
    fn default() -> Self {
        Self {
            initial: Duration::from_secs(1),
            max: Duration::from_secs(60),
            factor: 2,
        }
    }
}

impl Backoff {
    /// Delay before retry number `attempt` (0-based).
    pub fn delay(&self, attempt: u32) -> Duration {
        self.initial
            .saturating_mul(self.factor.saturating_pow(attempt))
            .min(self.max)
    }
}

#[derive(Clone, Debug)]
pub struct MonitorConfig {
    pub archive_channel: String,
    pub bootstrap_limit: usize,
    pub scan_limit: usize,
    pub windows: CorrelationWindows,
    pub backoff: Backoff,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            archive_channel: DEFAULT_ARCHIVE_CHANNEL.to_string(),
            bootstrap_limit: DEFAULT_BOOTSTRAP_LIMIT,
            scan_limit: DEFAULT_SCAN_LIMIT,
            windows: CorrelationWindows::default(),
            backoff: Backoff::default(),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MonitorState {
    Bootstrapping,
    Waiting,
    Correlating,
    Publishing,
}

/// What happened to one deletion event.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Outcome {
    Published { deleted_by: UserId, messages: usize },
    Suppressed,
    Dropped,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct MonitorStats {
    pub events: u64,
    pub published: u64,
    pub suppressed: u64,
    pub dropped: u64,
    pub retries: u64,
}

pub struct DeletionMonitor {
    cfg: MonitorConfig,
    audit: Arc<dyn AuditLogSource>,
    correlator: Correlator,
    archiver: Archiver,
    cache: CorrelationCache,
    state: MonitorState,
    stats: MonitorStats,
}

impl DeletionMonitor {
    pub fn new(
        cfg: MonitorConfig,
        audit: Arc<dyn AuditLogSource>,
        sink: Arc<dyn ArchiveSink>,
        bot: UserId,
    ) -> Self {
        Self {
            correlator: Correlator::new(audit.clone(), bot, cfg.scan_limit),
            archiver: Archiver::new(sink, cfg.archive_channel.clone()),
            cache: CorrelationCache::new(cfg.windows),
            state: MonitorState::Bootstrapping,
            stats: MonitorStats::default(),
            audit,
            cfg,
        }
    }

    pub fn state(&self) -> MonitorState {
        self.state
    }

    pub fn stats(&self) -> MonitorStats {
        self.stats
    }

    pub fn cache(&self) -> &CorrelationCache {
        &self.cache
    }

    /// Bootstrap once, then process deletions until the feed closes or
    /// `cancel` fires.
    pub async fn run<S>(&mut self, events: &mut S, cancel: CancellationToken) -> Result<()>
    where
        S: DeletionEventSource + ?Sized,
    {
        if self.bootstrap(&cancel).await.is_none() {
            info!("deletion monitor cancelled during bootstrap");
            return Ok(());
        }

        loop {
            self.state = MonitorState::Waiting;
            let event = tokio::select! {
                _ = cancel.cancelled() => {
                    info!("deletion monitor stopped");
                    return Ok(());
                }
                ev = events.next_deletion() => ev,
            };
            let Some(event) = event else {
                info!("deletion feed closed; monitor exiting");
                return Ok(());
            };

            if self.handle(&event, &cancel).await.is_none() {
                info!("deletion monitor stopped");
                return Ok(());
            }
        }
    }

    /// Seed the cache from recent audit history. `None` if cancelled.
    pub async fn bootstrap(&mut self, cancel: &CancellationToken) -> Option<usize> {
        self.state = MonitorState::Bootstrapping;
        let audit = self.audit.clone();
        let limit = self.cfg.bootstrap_limit;

        let mut attempt = 0u32;
        let entries: Vec<AuditEntry> = loop {
            let res = tokio::select! {
                _ = cancel.cancelled() => return None,
                r = audit.query(AuditActionKind::MessageDelete, None, limit) => r,
            };
            match res {
                Ok(entries) => break entries,
                Err(e) if e.is_transient() => {
                    if !self.back_off(attempt, "bootstrap", &e, cancel).await {
                        return None;
                    }
                    attempt += 1;
                }
                Err(e) => {
                    // Not retryable: start with an empty cache rather than not at all.
                    error!("audit log bootstrap failed: {e}");
                    break Vec::new();
                }
            }
        };

        let fetched = entries.len();
        let inserted = self.cache.bootstrap(entries, Utc::now());
        info!(fetched, inserted, "correlation cache bootstrapped");
        Some(inserted)
    }

    /// Correlate and publish one event. `None` if cancelled mid-way.
    pub async fn handle(
        &mut self,
        event: &DeletionEvent,
        cancel: &CancellationToken,
    ) -> Option<Outcome> {
        self.stats.events += 1;
        self.state = MonitorState::Correlating;

        let mut attempt = 0u32;
        let resolution = loop {
            let res = tokio::select! {
                _ = cancel.cancelled() => return None,
                r = self.correlator.resolve(&mut self.cache, event) => r,
            };
            match res {
                Ok(r) => break r,
                Err(e) if e.is_transient() => {
                    if !self.back_off(attempt, "audit scan", &e, cancel).await {
                        return None;
                    }
                    attempt += 1;
                }
                Err(e) => {
                    warn!(message = %event.message_id, "dropping deletion, correlation failed: {e}");
                    self.stats.dropped += 1;
                    return Some(Outcome::Dropped);
                }
            }
        };

        let deleted_by = match resolution {
            Resolution::Suppressed => {
                self.stats.suppressed += 1;
                return Some(Outcome::Suppressed);
            }
            Resolution::Publish { deleted_by } => deleted_by,
        };

        self.state = MonitorState::Publishing;
        match self.archiver.publish(event, deleted_by).await {
            Ok(messages) => {
                self.stats.published += 1;
                Some(Outcome::Published {
                    deleted_by,
                    messages,
                })
            }
            Err(e) => {
                match &e {
                    Error::MissingCollaborator(_) => error!("dropping archive record: {e}"),
                    _ => warn!(message = %event.message_id, "dropping archive record: {e}"),
                }
                self.stats.dropped += 1;
                Some(Outcome::Dropped)
            }
        }
    }

    /// Sleep before the next retry. `false` if cancelled while waiting.
    async fn back_off(
        &mut self,
        attempt: u32,
        step: &str,
        err: &Error,
        cancel: &CancellationToken,
    ) -> bool {
        let delay = self.cfg.backoff.delay(attempt);
        self.stats.retries += 1;
        warn!(
            attempt = attempt + 1,
            delay_ms = delay.as_millis() as u64,
            "{step} failed, retrying: {err}"
        );
        tokio::select! {
            _ = cancel.cancelled() => false,
            _ = sleep(delay) => {
                debug!("{step} retry window elapsed");
                true
            }
        }
    }
}

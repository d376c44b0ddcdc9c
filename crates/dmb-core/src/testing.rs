//! In-memory port fakes shared by the unit tests.

use std::{
    collections::VecDeque,
    sync::{
        atomic::{AtomicU64, AtomicUsize, Ordering},
        Mutex,
    },
};

use async_trait::async_trait;

use crate::{
    audit::{AuditActionKind, AuditEntry},
    domain::{ChannelId, MessageId},
    errors::Error,
    messaging::{port::ArchiveSink, types::OutgoingMessage},
    ports::AuditLogSource,
    Result,
};

pub type QueryCall = (AuditActionKind, Option<ChannelId>, usize);

/// Audit log that replays queued responses; an empty script answers `[]`.
#[derive(Default)]
pub struct ScriptedAuditLog {
    script: Mutex<VecDeque<Result<Vec<AuditEntry>>>>,
    calls: Mutex<Vec<QueryCall>>,
}

impl ScriptedAuditLog {
    pub fn push_ok(&self, entries: Vec<AuditEntry>) {
        self.script.lock().unwrap().push_back(Ok(entries));
    }

    pub fn push_err(&self, err: Error) {
        self.script.lock().unwrap().push_back(Err(err));
    }

    pub fn calls(&self) -> Vec<QueryCall> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl AuditLogSource for ScriptedAuditLog {
    async fn query(
        &self,
        kind: AuditActionKind,
        channel: Option<ChannelId>,
        limit: usize,
    ) -> Result<Vec<AuditEntry>> {
        self.calls.lock().unwrap().push((kind, channel, limit));
        self.script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(Vec::new()))
    }
}

/// Archive sink that records everything sent to it.
#[derive(Default)]
pub struct RecordingSink {
    pub channels: Vec<(String, ChannelId)>,
    /// Reject every send after this many have succeeded.
    fail_after: Option<usize>,
    sent: Mutex<Vec<(ChannelId, OutgoingMessage)>>,
    lookups: AtomicUsize,
    next_id: AtomicU64,
}

impl RecordingSink {
    pub fn with_channel(name: &str, id: u64) -> Self {
        Self {
            channels: vec![(name.to_string(), ChannelId(id))],
            ..Self::default()
        }
    }

    pub fn failing_after(mut self, sends: usize) -> Self {
        self.fail_after = Some(sends);
        self
    }

    pub fn sent(&self) -> Vec<(ChannelId, OutgoingMessage)> {
        self.sent.lock().unwrap().clone()
    }

    pub fn lookups(&self) -> usize {
        self.lookups.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ArchiveSink for RecordingSink {
    async fn find_channel(&self, name: &str) -> Result<Option<ChannelId>> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .channels
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, id)| *id))
    }

    async fn send(&self, channel: ChannelId, message: OutgoingMessage) -> Result<MessageId> {
        let mut sent = self.sent.lock().unwrap();
        if self.fail_after.is_some_and(|limit| sent.len() >= limit) {
            return Err(Error::External("send rejected".to_string()));
        }
        sent.push((channel, message));
        Ok(MessageId(self.next_id.fetch_add(1, Ordering::SeqCst) + 1))
    }
}

use std::{collections::HashMap, sync::Arc, time::Duration};

use tokio::sync::Mutex;
use tokio::time::{sleep, Instant};

use crate::{
    domain::{ChannelId, MessageId},
    messaging::{
        port::ArchiveSink,
        types::{ArchiveLimits, OutgoingMessage},
    },
    Result,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ThrottleConfig {
    /// Minimum spacing between *any* outbound sends.
    pub global_min_interval: Duration,
    /// Minimum spacing between sends to the same channel (5 per 5s on Discord).
    pub per_channel_min_interval: Duration,
}

impl Default for ThrottleConfig {
    fn default() -> Self {
        Self {
            global_min_interval: Duration::from_millis(20),
            per_channel_min_interval: Duration::from_millis(1000),
        }
    }
}

#[derive(Debug)]
struct IntervalLimiter {
    interval: Duration,
    next: Instant,
}

impl IntervalLimiter {
    fn new(interval: Duration) -> Self {
        Self {
            interval,
            next: Instant::now(),
        }
    }

    /// Reserve the next slot and return the wait duration required before executing.
    fn reserve(&mut self) -> Duration {
        let now = Instant::now();
        let start = if now >= self.next { now } else { self.next };
        self.next = start + self.interval;
        start.saturating_duration_since(now)
    }
}

/// ArchiveSink decorator that paces outbound sends.
///
/// A deletion with many embeds turns into a burst of sends to one channel;
/// spacing them out keeps the adapter clear of most 429s. Channel lookups are
/// not throttled.
pub struct ThrottledSink {
    inner: Arc<dyn ArchiveSink>,
    cfg: ThrottleConfig,
    global: Mutex<IntervalLimiter>,
    per_channel: Mutex<HashMap<u64, IntervalLimiter>>,
}

impl ThrottledSink {
    pub fn new(inner: Arc<dyn ArchiveSink>, cfg: ThrottleConfig) -> Self {
        Self {
            inner,
            cfg,
            global: Mutex::new(IntervalLimiter::new(cfg.global_min_interval)),
            per_channel: Mutex::new(HashMap::new()),
        }
    }

    async fn throttle_channel(&self, channel: ChannelId) {
        let global_wait = { self.global.lock().await.reserve() };
        let channel_wait = {
            let mut map = self.per_channel.lock().await;
            map.entry(channel.0)
                .or_insert_with(|| IntervalLimiter::new(self.cfg.per_channel_min_interval))
                .reserve()
        };

        let wait = global_wait.max(channel_wait);
        if wait > Duration::ZERO {
            sleep(wait).await;
        }
    }
}

#[async_trait::async_trait]
impl ArchiveSink for ThrottledSink {
    fn limits(&self) -> ArchiveLimits {
        self.inner.limits()
    }

    async fn find_channel(&self, name: &str) -> Result<Option<ChannelId>> {
        self.inner.find_channel(name).await
    }

    async fn send(&self, channel: ChannelId, message: OutgoingMessage) -> Result<MessageId> {
        self.throttle_channel(channel).await;
        self.inner.send(channel, message).await
    }
}

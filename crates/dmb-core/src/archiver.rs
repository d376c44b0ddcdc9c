//! Forensic records for deleted messages and their publication.
//!
//! Every deletion produces one summary record followed by a replay of each
//! original embed. The platform does not let arbitrary embed content be merged
//! into a single outgoing message, hence the two passes.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, info};

use crate::{
    domain::{ChannelId, MessageId, UserId},
    errors::Error,
    event::DeletionEvent,
    formatting::{archive_timestamp, paginate, quote},
    messaging::{
        port::ArchiveSink,
        types::{ArchiveLimits, Embed, OutgoingMessage},
    },
    Result,
};

/// Summary record color (red).
pub const RECORD_COLOR: u32 = 0xE7_4C_3C;
/// Accent color applied to replayed embeds (pink).
pub const REPLAY_COLOR: u32 = 0xF5_AB_B9;
/// Stand-in for a field page that holds only blank lines.
const BLANK_FIELD: &str = "\u{200b}";

/// Human-readable reconstruction of one deletion. Built per event, never stored.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ForensicRecord {
    pub message_id: MessageId,
    pub author: UserId,
    pub deleted_by: UserId,
    pub channel: ChannelId,
    pub timestamp: DateTime<Utc>,
    pub text: Option<String>,
    pub attachment_urls: Vec<String>,
    pub embed_count: usize,
}

impl ForensicRecord {
    pub fn new(event: &DeletionEvent, deleted_by: UserId) -> Self {
        Self {
            message_id: event.message_id,
            author: event.author,
            deleted_by,
            channel: event.channel,
            timestamp: event.created_at,
            text: (!event.text.is_empty()).then(|| event.text.clone()),
            attachment_urls: event
                .attachments
                .iter()
                .map(|a| a.proxy_url.clone())
                .collect(),
            embed_count: event.embeds.len(),
        }
    }

    pub fn description(&self) -> String {
        format!(
            "Author: {}\nDeleted by: {}*\nChannel: {}\nUTC: {}",
            self.author.mention(),
            self.deleted_by.mention(),
            self.channel.mention(),
            archive_timestamp(self.timestamp)
        )
    }

    /// The summary embed. Optional fields appear only when they have content;
    /// values over the platform's field limit continue in same-named fields.
    pub fn to_embed(&self, limits: ArchiveLimits) -> Embed {
        let mut embed = Embed::new(
            format!("ID: {}", self.message_id),
            self.description(),
            RECORD_COLOR,
        );

        let mut add_paged = |name: &str, value: &str| {
            for page in paginate(value, limits.max_field_value_len) {
                // The platform rejects blank field values.
                let page = if page.trim().is_empty() {
                    BLANK_FIELD.to_string()
                } else {
                    page
                };
                embed.add_field(name, page, false);
            }
        };

        if let Some(text) = &self.text {
            add_paged("Message", &quote(text));
        }
        if !self.attachment_urls.is_empty() {
            let value = self
                .attachment_urls
                .iter()
                .map(|url| format!("<{url}>"))
                .collect::<Vec<_>>()
                .join("\n");
            add_paged("Attachments", &value);
        }
        if self.embed_count > 0 {
            add_paged("Embeds", &format!("{} found. See below:", self.embed_count));
        }

        embed
    }
}

/// Follow-up messages replaying each original embed, in order, recolored and
/// labelled `Embed i of N`.
pub fn replay_embeds(embeds: &[Embed]) -> Vec<OutgoingMessage> {
    let total = embeds.len();
    embeds
        .iter()
        .enumerate()
        .map(|(idx, original)| {
            let mut embed = original.clone();
            embed.color = Some(REPLAY_COLOR);
            OutgoingMessage::with_content(format!("**Embed {} of {total}**", idx + 1), embed)
        })
        .collect()
}

/// Publishes forensic records to the archive channel.
pub struct Archiver {
    sink: Arc<dyn ArchiveSink>,
    channel_name: String,
    channel: Option<ChannelId>,
}

impl Archiver {
    pub fn new(sink: Arc<dyn ArchiveSink>, channel_name: impl Into<String>) -> Self {
        Self {
            sink,
            channel_name: channel_name.into(),
            channel: None,
        }
    }

    /// Emit the summary record then the embed replays. Returns the number of
    /// messages sent.
    pub async fn publish(&mut self, event: &DeletionEvent, deleted_by: UserId) -> Result<usize> {
        let channel = self.archive_channel().await?;
        let record = ForensicRecord::new(event, deleted_by);

        self.sink
            .send(
                channel,
                OutgoingMessage::embed(record.to_embed(self.sink.limits())),
            )
            .await?;
        let mut sent = 1usize;

        for message in replay_embeds(&event.embeds) {
            self.sink.send(channel, message).await?;
            sent += 1;
        }

        info!(
            message = %event.message_id,
            author = event.author.0,
            deleted_by = deleted_by.0,
            sent,
            "archived deleted message"
        );
        Ok(sent)
    }

    /// Look the archive channel up by exact name the first time it is needed.
    async fn archive_channel(&mut self) -> Result<ChannelId> {
        if let Some(id) = self.channel {
            return Ok(id);
        }
        let Some(id) = self.sink.find_channel(&self.channel_name).await? else {
            return Err(Error::MissingCollaborator(format!(
                "archive channel #{} not found",
                self.channel_name
            )));
        };
        debug!(channel = id.0, name = %self.channel_name, "resolved archive channel");
        self.channel = Some(id);
        Ok(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{event::fixtures, event::Attachment, testing::RecordingSink};

    fn attachment(id: u64) -> Attachment {
        Attachment {
            id,
            filename: format!("f{id}.png"),
            url: format!("https://cdn.example/{id}"),
            proxy_url: format!("https://media.example/{id}"),
        }
    }

    fn titled(title: &str) -> Embed {
        let mut e = Embed::new(title, "body", 0x11_22_33);
        e.extra
            .insert("footer".into(), serde_json::json!({ "text": title }));
        e
    }

    fn rich_event() -> DeletionEvent {
        let mut ev = fixtures::event(42, 1, 10);
        ev.text = "hello there".into();
        ev.attachments = vec![attachment(1), attachment(2)];
        ev.embeds = vec![titled("a"), titled("b"), titled("c")];
        ev
    }

    #[test]
    fn description_lists_participants_and_time() {
        let rec = ForensicRecord::new(&fixtures::event(42, 1, 10), UserId(55));
        assert_eq!(
            rec.description(),
            "Author: <@1>\nDeleted by: <@55>*\nChannel: <#10>\nUTC: 03/04/2026 05:06"
        );
    }

    #[test]
    fn plain_deletion_has_no_optional_fields() {
        let rec = ForensicRecord::new(&fixtures::event(42, 1, 10), UserId(1));
        let embed = rec.to_embed(ArchiveLimits::default());
        assert_eq!(embed.title.as_deref(), Some("ID: 42"));
        assert_eq!(embed.color, Some(RECORD_COLOR));
        assert!(embed.fields.is_empty());
    }

    #[test]
    fn rich_deletion_has_three_optional_fields() {
        let rec = ForensicRecord::new(&rich_event(), UserId(1));
        let embed = rec.to_embed(ArchiveLimits::default());

        let names: Vec<_> = embed.fields.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["Message", "Attachments", "Embeds"]);
        assert_eq!(embed.field("Message").unwrap().value, "\"hello there\"");
        assert_eq!(
            embed.field("Attachments").unwrap().value,
            "<https://media.example/1>\n<https://media.example/2>"
        );
        assert_eq!(embed.field("Embeds").unwrap().value, "3 found. See below:");
        assert!(embed.fields.iter().all(|f| !f.inline));
    }

    #[test]
    fn long_message_spills_into_extra_fields() {
        let mut ev = fixtures::event(42, 1, 10);
        ev.text = "y".repeat(1500);
        let embed = ForensicRecord::new(&ev, UserId(1)).to_embed(ArchiveLimits::default());
        assert_eq!(embed.fields.len(), 2);
        assert!(embed.fields.iter().all(|f| f.name == "Message"));
        assert!(embed.fields.iter().all(|f| f.value.chars().count() <= 1024));
    }

    #[test]
    fn blank_line_at_a_page_break_survives() {
        let mut ev = fixtures::event(42, 1, 10);
        // With the opening quote the first line fills a page exactly, and the
        // closing quote does the same for the last one.
        ev.text = format!("{}\n\n{}", "x".repeat(1023), "y".repeat(1023));
        let embed = ForensicRecord::new(&ev, UserId(1)).to_embed(ArchiveLimits::default());

        let values: Vec<_> = embed.fields.iter().map(|f| f.value.as_str()).collect();
        assert_eq!(values.len(), 3);
        assert_eq!(values[1], BLANK_FIELD);
        assert!(values[0].starts_with('"') && values[2].ends_with('"'));
    }

    #[test]
    fn replay_recolors_and_labels_in_order() {
        let replays = replay_embeds(&rich_event().embeds);
        assert_eq!(replays.len(), 3);
        for (idx, (msg, title)) in replays.iter().zip(["a", "b", "c"]).enumerate() {
            assert_eq!(
                msg.content.as_deref(),
                Some(format!("**Embed {} of 3**", idx + 1).as_str())
            );
            let embed = &msg.embeds[0];
            assert_eq!(embed.title.as_deref(), Some(title));
            assert_eq!(embed.color, Some(REPLAY_COLOR));
            assert_eq!(embed.description.as_deref(), Some("body"));
            assert_eq!(embed.extra["footer"]["text"], title);
        }
    }

    #[tokio::test]
    async fn publish_sends_summary_then_replays() {
        let sink = Arc::new(RecordingSink::with_channel("deleted_text", 900));
        let mut archiver = Archiver::new(sink.clone(), "deleted_text");

        let sent = archiver.publish(&rich_event(), UserId(55)).await.unwrap();
        assert_eq!(sent, 4);

        let out = sink.sent();
        assert!(out.iter().all(|(ch, _)| *ch == ChannelId(900)));
        assert_eq!(out[0].1.content, None);
        assert_eq!(out[0].1.embeds[0].title.as_deref(), Some("ID: 42"));
        assert_eq!(out[1].1.content.as_deref(), Some("**Embed 1 of 3**"));
        assert_eq!(out[3].1.content.as_deref(), Some("**Embed 3 of 3**"));
    }

    #[tokio::test]
    async fn archive_channel_is_looked_up_once() {
        let sink = Arc::new(RecordingSink::with_channel("deleted_text", 900));
        let mut archiver = Archiver::new(sink.clone(), "deleted_text");

        archiver.publish(&fixtures::event(1, 1, 10), UserId(1)).await.unwrap();
        archiver.publish(&fixtures::event(2, 1, 10), UserId(1)).await.unwrap();
        assert_eq!(sink.lookups(), 1);
        assert_eq!(sink.sent().len(), 2);
    }

    #[tokio::test]
    async fn missing_archive_channel_is_reported() {
        let sink = Arc::new(RecordingSink::with_channel("general", 1));
        let mut archiver = Archiver::new(sink.clone(), "deleted_text");

        let err = archiver
            .publish(&fixtures::event(1, 1, 10), UserId(1))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::MissingCollaborator(_)));
        assert!(sink.sent().is_empty());
    }
}

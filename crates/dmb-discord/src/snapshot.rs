//! Deleted-message snapshots.
//!
//! The gateway's `MESSAGE_DELETE` only carries ids; the content has to come
//! from whatever the gateway client cached before the deletion. That client
//! hands us the cached message object as JSON, which is decoded here.

use chrono::{DateTime, Utc};
use serde::Deserialize;

use dmb_core::{
    domain::{ChannelId, MessageId, UserId},
    errors::Error,
    event::{Attachment, DeletionEvent},
    messaging::types::Embed,
    Result,
};

use crate::snowflake::Snowflake;

#[derive(Debug, Deserialize)]
struct RawMessage {
    id: Snowflake,
    channel_id: Snowflake,
    #[serde(default)]
    author: Option<RawUser>,
    #[serde(default)]
    timestamp: Option<DateTime<Utc>>,
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    attachments: Vec<RawAttachment>,
    #[serde(default)]
    embeds: Vec<Embed>,
}

#[derive(Debug, Deserialize)]
struct RawUser {
    id: Snowflake,
}

#[derive(Debug, Deserialize)]
struct RawAttachment {
    id: Snowflake,
    #[serde(default)]
    filename: String,
    url: String,
    #[serde(default)]
    proxy_url: Option<String>,
}

/// Decode one cached message object into a deletion event.
pub fn decode_snapshot(json: &str) -> Result<DeletionEvent> {
    let raw: RawMessage = serde_json::from_str(json)?;

    let Some(author) = raw.author else {
        return Err(Error::MalformedEntry(format!(
            "message {} snapshot has no author",
            raw.id.0
        )));
    };

    Ok(DeletionEvent {
        message_id: MessageId(raw.id.0),
        author: UserId(author.id.0),
        channel: ChannelId(raw.channel_id.0),
        created_at: raw.timestamp.unwrap_or_else(|| raw.id.timestamp()),
        text: raw.content.unwrap_or_default(),
        attachments: raw
            .attachments
            .into_iter()
            .map(|a| Attachment {
                id: a.id.0,
                proxy_url: a.proxy_url.unwrap_or_else(|| a.url.clone()),
                filename: a.filename,
                url: a.url,
            })
            .collect(),
        embeds: raw.embeds,
    })
}

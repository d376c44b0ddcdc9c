//! Discord adapter (REST).
//!
//! This crate implements the `dmb-core` audit-log and archive ports over the
//! Discord HTTP API. The gateway connection (and the message cache that feeds
//! deletion snapshots) belongs to the external platform client.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Method, StatusCode};
use serde::{de::DeserializeOwned, Deserialize};
use tokio::time::sleep;
use tracing::{debug, warn};

pub mod audit_log;
pub mod snapshot;
pub mod snowflake;

use dmb_core::{
    audit::{AuditActionKind, AuditEntry},
    domain::{ChannelId, GuildId, MessageId, UserId},
    errors::Error,
    messaging::{port::ArchiveSink, types::OutgoingMessage},
    ports::AuditLogSource,
    Result,
};

use crate::snowflake::Snowflake;

/// Guild text channel type.
const GUILD_TEXT: u8 = 0;

#[derive(Clone, Debug)]
pub struct DiscordClient {
    http: reqwest::Client,
    api_base: String,
    token: String,
    guild: GuildId,
}

#[derive(Debug, Deserialize)]
struct RawChannel {
    id: Snowflake,
    #[serde(default)]
    name: Option<String>,
    #[serde(rename = "type", default)]
    kind: u8,
}

#[derive(Debug, Deserialize)]
struct RawId {
    id: Snowflake,
}

#[derive(Debug, Deserialize)]
struct RateLimitBody {
    retry_after: f64,
}

impl DiscordClient {
    pub fn new(
        api_base: impl Into<String>,
        token: impl Into<String>,
        guild: GuildId,
        timeout: Duration,
    ) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!(
                "DiscordBot (",
                env!("CARGO_PKG_NAME"),
                ", ",
                env!("CARGO_PKG_VERSION"),
                ")"
            ))
            .build()
            .map_err(|e| Error::Config(format!("http client build failed: {e}")))?;
        Ok(Self {
            http,
            api_base: api_base.into(),
            token: token.into(),
            guild,
        })
    }

    /// The account this token belongs to.
    pub async fn current_user(&self) -> Result<UserId> {
        let me: RawId = self.request(Method::GET, "/users/@me", None).await?;
        Ok(UserId(me.id.0))
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.api_base, path)
    }

    async fn request<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: Option<&serde_json::Value>,
    ) -> Result<T> {
        let text = self.request_text(method, path, body).await?;
        serde_json::from_str(&text)
            .map_err(|e| Error::External(format!("discord json error on {path}: {e}")))
    }

    /// Send a request, honouring one 429 `retry_after` before giving up.
    async fn request_text(
        &self,
        method: Method,
        path: &str,
        body: Option<&serde_json::Value>,
    ) -> Result<String> {
        const MAX_RETRIES: usize = 1;
        let mut attempts = 0usize;
        loop {
            let mut req = self
                .http
                .request(method.clone(), self.url(path))
                .header("Authorization", format!("Bot {}", self.token));
            if let Some(b) = body {
                req = req.json(b);
            }

            let resp = req
                .send()
                .await
                .map_err(|e| Error::Fetch(format!("discord request error on {path}: {e}")))?;
            let status = resp.status();
            let retry_header = resp
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<f64>().ok());
            let text = resp
                .text()
                .await
                .map_err(|e| Error::Fetch(format!("discord read error on {path}: {e}")))?;

            if status.is_success() {
                return Ok(text);
            }

            if status == StatusCode::TOO_MANY_REQUESTS {
                if attempts < MAX_RETRIES {
                    attempts += 1;
                    let delay = retry_delay(&text, retry_header);
                    warn!(
                        path,
                        retry_after_ms = delay.as_millis() as u64,
                        "discord rate limited, retrying"
                    );
                    sleep(delay).await;
                    continue;
                }
                return Err(Error::Fetch(format!("discord rate limited on {path}")));
            }

            return Err(map_status(status, path, &text));
        }
    }
}

/// How long to wait after a 429. The JSON body wins over the `Retry-After`
/// header; anything missing or not a finite number falls back to one second.
fn retry_delay(body: &str, header: Option<f64>) -> Duration {
    let secs = serde_json::from_str::<RateLimitBody>(body)
        .ok()
        .map(|b| b.retry_after)
        .filter(|s| s.is_finite())
        .or(header.filter(|s| s.is_finite()))
        .unwrap_or(1.0);
    Duration::from_secs_f64(secs.clamp(0.0, 60.0))
}

fn map_status(status: StatusCode, path: &str, body: &str) -> Error {
    let snippet = body.chars().take(200).collect::<String>();
    let msg = format!("discord {status} on {path}: {snippet}");
    if status.is_server_error() {
        Error::Fetch(msg)
    } else {
        Error::External(msg)
    }
}

#[async_trait]
impl AuditLogSource for DiscordClient {
    async fn query(
        &self,
        kind: AuditActionKind,
        channel: Option<ChannelId>,
        limit: usize,
    ) -> Result<Vec<AuditEntry>> {
        // The endpoint has no channel filter: fetch `limit` and filter here.
        let path = format!(
            "/guilds/{}/audit-logs?action_type={}&limit={}",
            self.guild.0,
            audit_log::action_type(kind),
            limit.clamp(1, 100)
        );
        let text = self.request_text(Method::GET, &path, None).await?;
        let entries = audit_log::decode_entries(&text, channel)
            .map_err(|e| Error::External(format!("discord audit log decode failed: {e}")))?;
        debug!(count = entries.len(), "fetched audit log entries");
        Ok(entries)
    }
}

#[async_trait]
impl ArchiveSink for DiscordClient {
    async fn find_channel(&self, name: &str) -> Result<Option<ChannelId>> {
        let path = format!("/guilds/{}/channels", self.guild.0);
        let channels: Vec<RawChannel> = self.request(Method::GET, &path, None).await?;
        Ok(pick_channel(&channels, name))
    }

    async fn send(&self, channel: ChannelId, message: OutgoingMessage) -> Result<MessageId> {
        let body = serde_json::to_value(&message)?;
        let path = format!("/channels/{}/messages", channel.0);
        let sent: RawId = self.request(Method::POST, &path, Some(&body)).await?;
        Ok(MessageId(sent.id.0))
    }
}

/// Exact-name match among text channels.
fn pick_channel(channels: &[RawChannel], name: &str) -> Option<ChannelId> {
    channels
        .iter()
        .find(|c| c.kind == GUILD_TEXT && c.name.as_deref() == Some(name))
        .map(|c| ChannelId(c.id.0))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn channel_lookup_is_exact_and_text_only() {
        let channels: Vec<RawChannel> = serde_json::from_str(
            r#"[
              { "id": "1", "name": "Deleted_Text", "type": 0 },
              { "id": "2", "name": "deleted_text", "type": 2 },
              { "id": "3", "name": "deleted_text", "type": 0 },
              { "id": "4", "type": 4 }
            ]"#,
        )
        .unwrap();
        assert_eq!(pick_channel(&channels, "deleted_text"), Some(ChannelId(3)));
        assert_eq!(pick_channel(&channels, "deleted"), None);
    }

    #[test]
    fn server_errors_are_transient() {
        let e = map_status(StatusCode::BAD_GATEWAY, "/x", "upstream");
        assert!(e.is_transient());
        let e = map_status(StatusCode::FORBIDDEN, "/x", "{\"code\":50013}");
        assert!(!e.is_transient());
        assert!(e.to_string().contains("50013"));
    }

    #[test]
    fn retry_delay_prefers_the_body_then_the_header() {
        assert_eq!(
            retry_delay(r#"{"message":"rate limited","retry_after":0.25,"global":false}"#, Some(9.0)),
            Duration::from_millis(250)
        );
        assert_eq!(retry_delay("", Some(2.0)), Duration::from_secs(2));
        assert_eq!(retry_delay("", None), Duration::from_secs(1));
        assert_eq!(retry_delay(r#"{"retry_after":3600}"#, None), Duration::from_secs(60));
        assert_eq!(retry_delay(r#"{"retry_after":-4}"#, None), Duration::ZERO);
    }

    #[test]
    fn unparseable_retry_after_falls_back_to_one_second() {
        // `"NaN".parse::<f64>()` and `"inf".parse::<f64>()` both succeed.
        let nan = "NaN".parse::<f64>().ok();
        let inf = "inf".parse::<f64>().ok();
        assert_eq!(retry_delay("", nan), Duration::from_secs(1));
        assert_eq!(retry_delay("<html>", inf), Duration::from_secs(1));
    }

    #[test]
    fn outgoing_message_serializes_like_the_api_expects() {
        use dmb_core::messaging::types::Embed;

        let msg = OutgoingMessage::with_content("**Embed 1 of 1**", Embed::new("t", "d", 1));
        let v = serde_json::to_value(&msg).unwrap();
        assert_eq!(v["content"], "**Embed 1 of 1**");
        assert_eq!(v["embeds"][0]["title"], "t");
        assert_eq!(v["embeds"][0]["color"], 1);
        assert!(v["embeds"][0].get("fields").is_none());

        let bare = serde_json::to_value(OutgoingMessage::embed(Embed::new("t", "d", 1))).unwrap();
        assert!(bare.get("content").is_none());
    }

    #[test]
    fn paths_are_joined_onto_the_api_base() {
        let c = DiscordClient::new(
            "http://localhost:1/api",
            "tok",
            GuildId(5),
            Duration::from_secs(1),
        )
        .unwrap();
        assert_eq!(c.url("/users/@me"), "http://localhost:1/api/users/@me");
    }
}

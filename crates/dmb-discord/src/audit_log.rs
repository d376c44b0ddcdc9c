//! Audit log wire format (`GET /guilds/{id}/audit-logs`).

use serde::Deserialize;
use tracing::debug;

use dmb_core::{
    audit::{AuditActionKind, AuditEntry},
    domain::{AuditEntryId, ChannelId, UserId},
    errors::Error,
    Result,
};

use crate::snowflake::Snowflake;

pub fn action_type(kind: AuditActionKind) -> u16 {
    match kind {
        AuditActionKind::MessageDelete => 72,
        AuditActionKind::MessageBulkDelete => 73,
    }
}

#[derive(Debug, Deserialize)]
pub struct AuditLogResponse {
    #[serde(default)]
    pub audit_log_entries: Vec<RawAuditEntry>,
}

#[derive(Debug, Deserialize)]
pub struct RawAuditEntry {
    pub id: Snowflake,
    #[serde(default)]
    pub user_id: Option<Snowflake>,
    #[serde(default)]
    pub options: Option<RawOptions>,
}

#[derive(Debug, Default, Deserialize)]
pub struct RawOptions {
    #[serde(default)]
    pub channel_id: Option<Snowflake>,
    /// Sent as a string by the API.
    #[serde(default)]
    pub count: Option<String>,
}

impl RawAuditEntry {
    pub fn into_entry(self) -> Result<AuditEntry> {
        let Some(actor) = self.user_id else {
            return Err(Error::MalformedEntry(format!(
                "audit entry {} has no acting user",
                self.id.0
            )));
        };
        let options = self.options.unwrap_or_default();
        let affected_count = match options.count.as_deref() {
            None => 1,
            Some(raw) => raw.trim().parse::<u32>().map_err(|_| {
                Error::MalformedEntry(format!("audit entry {} has count {raw:?}", self.id.0))
            })?,
        };

        Ok(AuditEntry {
            id: AuditEntryId(self.id.0),
            actor: UserId(actor.0),
            created_at: self.id.timestamp(),
            affected_count,
            channel: options.channel_id.map(|c| ChannelId(c.0)),
        })
    }
}

/// Convert a response body, skipping malformed entries and, when `channel` is
/// set, entries for other channels. Source order is kept.
pub fn decode_entries(body: &str, channel: Option<ChannelId>) -> Result<Vec<AuditEntry>> {
    let resp: AuditLogResponse = serde_json::from_str(body)?;

    let mut out = Vec::with_capacity(resp.audit_log_entries.len());
    for raw in resp.audit_log_entries {
        let entry = match raw.into_entry() {
            Ok(e) => e,
            Err(e) => {
                debug!("skipping audit entry: {e}");
                continue;
            }
        };
        if let Some(want) = channel {
            if entry.channel != Some(want) {
                continue;
            }
        }
        out.push(entry);
    }
    Ok(out)
}

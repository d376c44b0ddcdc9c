//! Discord snowflake ids.

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Deserializer};

/// Milliseconds between the Unix epoch and the Discord epoch (2015-01-01).
pub const DISCORD_EPOCH_MS: u64 = 1_420_070_400_000;

/// Snowflake as sent on the wire: the API uses strings, some bridges send
/// plain numbers. Both are accepted.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Snowflake(pub u64);

impl<'de> Deserialize<'de> for Snowflake {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Str(String),
            Num(u64),
        }

        match Raw::deserialize(deserializer)? {
            Raw::Num(n) => Ok(Snowflake(n)),
            Raw::Str(s) => s
                .trim()
                .parse::<u64>()
                .map(Snowflake)
                .map_err(|_| serde::de::Error::custom(format!("invalid snowflake: {s}"))),
        }
    }
}

impl Snowflake {
    /// Creation time encoded in the id.
    pub fn timestamp(&self) -> DateTime<Utc> {
        let ms = (self.0 >> 22).saturating_add(DISCORD_EPOCH_MS);
        Utc.timestamp_millis_opt(ms as i64)
            .single()
            .unwrap_or_default()
    }
}

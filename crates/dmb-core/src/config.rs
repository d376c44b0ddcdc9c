use std::{env, fs, path::Path, time::Duration};

use crate::{
    cache::CorrelationWindows,
    correlator::DEFAULT_SCAN_LIMIT,
    errors::Error,
    messaging::throttled::ThrottleConfig,
    monitor::{Backoff, MonitorConfig, DEFAULT_ARCHIVE_CHANNEL, DEFAULT_BOOTSTRAP_LIMIT},
    Result,
};

pub const DEFAULT_API_BASE: &str = "https://discord.com/api/v10";

/// Typed configuration, read from the environment (and `.env` if present).
#[derive(Clone, Debug)]
pub struct Config {
    // Discord
    pub discord_bot_token: String,
    pub discord_guild_id: u64,
    pub discord_api_base: String,
    pub http_timeout: Duration,

    // Monitor
    pub monitor: MonitorConfig,
    pub event_queue_capacity: usize,
    pub archive_throttle: ThrottleConfig,
}

impl Config {
    pub fn load() -> Result<Self> {
        load_dotenv_if_present(Path::new(".env"));
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build from an arbitrary key lookup (the environment in production).
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let get = |key: &str| lookup(key).and_then(non_empty);
        let get_u64 = |key: &str| -> Result<Option<u64>> {
            get(key)
                .map(|s| {
                    s.trim()
                        .parse::<u64>()
                        .map_err(|_| Error::Config(format!("{key} must be a non-negative integer")))
                })
                .transpose()
        };

        // Required env vars
        let Some(discord_bot_token) = get("DISCORD_BOT_TOKEN") else {
            return Err(Error::Config(
                "DISCORD_BOT_TOKEN environment variable is required".to_string(),
            ));
        };
        let Some(discord_guild_id) = get_u64("DISCORD_GUILD_ID")? else {
            return Err(Error::Config(
                "DISCORD_GUILD_ID environment variable is required".to_string(),
            ));
        };

        let discord_api_base = get("DISCORD_API_BASE")
            .unwrap_or_else(|| DEFAULT_API_BASE.to_string())
            .trim_end_matches('/')
            .to_string();
        let http_timeout = Duration::from_millis(get_u64("HTTP_TIMEOUT_MS")?.unwrap_or(10_000));

        let archive_channel = get("ARCHIVE_CHANNEL_NAME")
            .map(|s| s.trim().trim_start_matches('#').to_string())
            .unwrap_or_else(|| DEFAULT_ARCHIVE_CHANNEL.to_string());

        let bootstrap_limit = get_u64("BOOTSTRAP_LIMIT")?
            .map(|v| v as usize)
            .unwrap_or(DEFAULT_BOOTSTRAP_LIMIT);
        let scan_limit = get_u64("SCAN_LIMIT")?
            .map(|v| v as usize)
            .unwrap_or(DEFAULT_SCAN_LIMIT);
        // The audit log endpoint accepts 1..=100.
        for (key, v) in [("BOOTSTRAP_LIMIT", bootstrap_limit), ("SCAN_LIMIT", scan_limit)] {
            if !(1..=100).contains(&v) {
                return Err(Error::Config(format!("{key} must be between 1 and 100")));
            }
        }

        let defaults = CorrelationWindows::default();
        let windows = CorrelationWindows {
            fresh: secs_or(get_u64("FRESH_WINDOW_SECS")?, defaults.fresh),
            bootstrap: secs_or(get_u64("BOOTSTRAP_WINDOW_SECS")?, defaults.bootstrap),
            eviction: secs_or(get_u64("EVICTION_WINDOW_SECS")?, defaults.eviction),
        };

        let backoff_defaults = Backoff::default();
        let backoff = Backoff {
            initial: millis_or(get_u64("RETRY_INITIAL_MS")?, backoff_defaults.initial),
            max: millis_or(get_u64("RETRY_MAX_MS")?, backoff_defaults.max),
            factor: backoff_defaults.factor,
        };
        if backoff.initial > backoff.max {
            return Err(Error::Config(
                "RETRY_INITIAL_MS must not exceed RETRY_MAX_MS".to_string(),
            ));
        }

        let event_queue_capacity = get_u64("EVENT_QUEUE_CAPACITY")?
            .map(|v| (v as usize).max(1))
            .unwrap_or(256);

        let throttle_defaults = ThrottleConfig::default();
        let archive_throttle = ThrottleConfig {
            global_min_interval: throttle_defaults.global_min_interval,
            per_channel_min_interval: millis_or(
                get_u64("ARCHIVE_SEND_INTERVAL_MS")?,
                throttle_defaults.per_channel_min_interval,
            ),
        };

        Ok(Self {
            discord_bot_token,
            discord_guild_id,
            discord_api_base,
            http_timeout,
            monitor: MonitorConfig {
                archive_channel,
                bootstrap_limit,
                scan_limit,
                windows,
                backoff,
            },
            event_queue_capacity,
            archive_throttle,
        })
    }
}

fn secs_or(v: Option<u64>, default: Duration) -> Duration {
    v.map(Duration::from_secs).unwrap_or(default)
}

fn millis_or(v: Option<u64>, default: Duration) -> Duration {
    v.map(Duration::from_millis).unwrap_or(default)
}

fn load_dotenv_if_present(path: &Path) {
    let Ok(contents) = fs::read_to_string(path) else {
        return;
    };

    for (key, val) in parse_dotenv(&contents) {
        if env::var_os(&key).is_some() {
            continue; // do not override existing env
        }
        env::set_var(key, val);
    }
}

fn parse_dotenv(contents: &str) -> Vec<(String, String)> {
    let mut out = Vec::new();
    for raw in contents.lines() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let Some((k, v)) = line.split_once('=') else {
            continue;
        };

        let key = k.trim();
        if key.is_empty() {
            continue;
        }

        let mut val = v.trim().to_string();
        // Strip optional surrounding quotes.
        if val.len() >= 2
            && ((val.starts_with('"') && val.ends_with('"'))
                || (val.starts_with('\'') && val.ends_with('\'')))
        {
            val = val[1..val.len() - 1].to_string();
        }

        out.push((key.to_string(), val));
    }
    out
}

fn non_empty(s: String) -> Option<String> {
    if s.trim().is_empty() {
        None
    } else {
        Some(s)
    }
}

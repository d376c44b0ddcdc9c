//! Outbound messaging abstractions (archive records, embeds, pacing).

pub mod port;
pub mod throttled;
pub mod types;

//! Core of the deletion monitor bot.
//!
//! This crate is intentionally platform-agnostic. The audit log, the deletion
//! feed and the archive channel live behind ports (traits) implemented in
//! adapter crates; everything here is the correlation engine and its loop.

pub mod archiver;
pub mod audit;
pub mod cache;
pub mod config;
pub mod correlator;
pub mod domain;
pub mod errors;
pub mod event;
pub mod formatting;
pub mod logging;
pub mod messaging;
pub mod monitor;
pub mod ports;

#[cfg(test)]
mod testing;

pub use errors::{Error, Result};

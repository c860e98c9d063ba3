//! Core types shared across the endpoint discovery engine.

mod config;
mod flow;

pub use config::{load_config, DiscoveryConfig};
pub use flow::*;

use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

pub const fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

/// Unix epoch milliseconds, the timestamp unit used by the store.
pub fn now_ms() -> i64 {
    (OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000) as i64
}

pub fn now_rfc3339() -> String {
    OffsetDateTime::now_utc().format(&Rfc3339).unwrap_or_else(|_| String::new())
}

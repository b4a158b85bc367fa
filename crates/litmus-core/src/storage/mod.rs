pub mod files;
pub mod judge_cache;
pub mod leases;
pub mod results;
pub mod runs;
pub mod schema;
pub mod store;
pub mod templates;

pub use leases::Lease;
pub use store::Store;

use chrono::{DateTime, SecondsFormat, Utc};

/// Timestamps are stored as RFC 3339 UTC with millisecond precision so they sort as text.
pub(crate) fn ts(at: &DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

pub(crate) fn now_ts() -> String {
    ts(&Utc::now())
}

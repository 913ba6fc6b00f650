//! Wall-clock timestamps as they appear on disk.
//!
//! Every timestamp is UTC, truncated to millisecond precision, and written as
//! RFC 3339 with a `Z` suffix (`2026-01-02T03:04:05.678Z`). Truncating at
//! creation keeps in-memory values identical to what a reload produces.

use chrono::{DateTime, SecondsFormat, SubsecRound, Utc};

/// UTC timestamp used throughout cachedb.
pub type Timestamp = DateTime<Utc>;

/// Current time, truncated to milliseconds.
pub fn now() -> Timestamp {
    Utc::now().trunc_subsecs(3)
}

/// Render a timestamp in the on-disk format.
pub fn format(ts: &Timestamp) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Serde adapter for required timestamps.
pub mod iso {
    use serde::{Deserialize, Deserializer, Serializer};

    use super::Timestamp;

    pub fn serialize<S: Serializer>(ts: &Timestamp, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&super::format(ts))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Timestamp, D::Error> {
        Timestamp::deserialize(d)
    }
}

/// Serde adapter for optional timestamps (`null` when absent).
pub mod iso_opt {
    use serde::{Deserialize, Deserializer, Serializer};

    use super::Timestamp;

    pub fn serialize<S: Serializer>(ts: &Option<Timestamp>, s: S) -> Result<S::Ok, S::Error> {
        match ts {
            Some(ts) => s.serialize_str(&super::format(ts)),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Timestamp>, D::Error> {
        Option::<Timestamp>::deserialize(d)
    }
}

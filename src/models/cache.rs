//! Cache entry and fingerprint types.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

use crate::models::{DayKey, VerdictPayload};
use crate::utils::hash::sha256_hex;

/// Persisted cache contents, keyed by day.
pub type CacheMap = BTreeMap<DayKey, CacheEntry>;

/// Digest of the raw feed used for change detection.
///
/// Equal fingerprints mean "treat the feed as unchanged". Stored values are
/// compared as plain strings, so digests written by older tooling still load.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Fingerprint raw feed content.
    pub fn of(content: &str) -> Self {
        Self(sha256_hex(content.as_bytes()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Fingerprint {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for Fingerprint {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// A cached verdict for one day.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    /// When the verdict was produced or last confirmed
    #[serde(with = "timestamp")]
    pub timestamp: DateTime<Utc>,

    #[serde(alias = "analysis")]
    pub verdict: VerdictPayload,

    /// Fingerprint of the feed the verdict was computed from
    #[serde(
        alias = "menu_hash",
        default,
        deserialize_with = "nullable_fingerprint"
    )]
    pub fingerprint: Fingerprint,
}

impl CacheEntry {
    pub fn new(timestamp: DateTime<Utc>, verdict: VerdictPayload, fingerprint: Fingerprint) -> Self {
        Self {
            timestamp,
            verdict,
            fingerprint,
        }
    }
}

/// A null fingerprint never matches a real one.
fn nullable_fingerprint<'de, D>(deserializer: D) -> Result<Fingerprint, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?
        .map(Fingerprint::from)
        .unwrap_or_default())
}

/// ISO-8601 timestamps. Values without an offset are read as UTC.
mod timestamp {
    use chrono::{DateTime, NaiveDateTime, Utc};
    use serde::{Deserialize, Deserializer, Serializer, de::Error};

    pub fn serialize<S>(value: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&value.to_rfc3339())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        if let Ok(parsed) = DateTime::parse_from_rfc3339(&raw) {
            return Ok(parsed.with_timezone(&Utc));
        }
        NaiveDateTime::parse_from_str(&raw, "%Y-%m-%dT%H:%M:%S%.f")
            .map(|naive| naive.and_utc())
            .map_err(|e| D::Error::custom(format!("bad timestamp '{}': {}", raw, e)))
    }
}

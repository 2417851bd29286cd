//! Record descriptor and store types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Ticks per second (one tick is 100 nanoseconds)
pub const TICKS_PER_SECOND: i64 = 10_000_000;

const NANOS_PER_TICK: i64 = 100;

/// Tick count of 1970-01-01T00:00:00Z, counted from 0001-01-01T00:00:00Z
pub const UNIX_EPOCH_TICKS: i64 = 621_355_968_000_000_000;

/// Largest representable tick count (9999-12-31T23:59:59.9999999Z)
pub const MAX_TICKS: i64 = 3_155_378_975_999_999_999;

/// Convert a timestamp to ticks since 0001-01-01, clamped to `0..=MAX_TICKS`.
///
/// Sub-tick precision is truncated.
pub fn to_ticks(time: &DateTime<Utc>) -> i64 {
    let ticks = i128::from(UNIX_EPOCH_TICKS)
        + i128::from(time.timestamp()) * i128::from(TICKS_PER_SECOND)
        + i128::from(time.timestamp_subsec_nanos()) / i128::from(NANOS_PER_TICK);
    ticks.clamp(0, i128::from(MAX_TICKS)) as i64
}

/// Convert ticks since 0001-01-01 back to a timestamp.
///
/// Returns `None` for negative tick counts or counts past `MAX_TICKS`.
pub fn from_ticks(ticks: i64) -> Option<DateTime<Utc>> {
    if !(0..=MAX_TICKS).contains(&ticks) {
        return None;
    }
    let relative = ticks - UNIX_EPOCH_TICKS;
    let secs = relative.div_euclid(TICKS_PER_SECOND);
    let nanos = (relative.rem_euclid(TICKS_PER_SECOND) * NANOS_PER_TICK) as u32;
    DateTime::from_timestamp(secs, nanos)
}

fn normalize(time: DateTime<Utc>) -> DateTime<Utc> {
    from_ticks(to_ticks(&time)).unwrap_or(time)
}

/// Metadata for one stored record version.
///
/// All of it is carried in the stored file's name; the payload is the file
/// contents. Timestamps are truncated to tick resolution on construction so
/// a descriptor always survives a trip through its file name unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "RecordDescriptorFields")]
pub struct RecordDescriptor {
    unique_name: String,
    expiration_time: DateTime<Utc>,
    updated_time: DateTime<Utc>,
    is_optimized: bool,
}

/// Wire shape of [`RecordDescriptor`]; deserialized values go through
/// [`RecordDescriptor::new`] so they are tick-normalized too.
#[derive(Deserialize)]
struct RecordDescriptorFields {
    unique_name: String,
    expiration_time: DateTime<Utc>,
    updated_time: DateTime<Utc>,
    #[serde(default)]
    is_optimized: bool,
}

impl From<RecordDescriptorFields> for RecordDescriptor {
    fn from(fields: RecordDescriptorFields) -> Self {
        RecordDescriptor::new(fields.unique_name, fields.expiration_time, fields.updated_time)
            .with_optimized(fields.is_optimized)
    }
}

impl RecordDescriptor {
    /// Create a descriptor with `is_optimized` unset
    pub fn new(
        unique_name: impl Into<String>,
        expiration_time: DateTime<Utc>,
        updated_time: DateTime<Utc>,
    ) -> Self {
        Self {
            unique_name: unique_name.into(),
            expiration_time: normalize(expiration_time),
            updated_time: normalize(updated_time),
            is_optimized: false,
        }
    }

    pub fn with_optimized(mut self, is_optimized: bool) -> Self {
        self.is_optimized = is_optimized;
        self
    }

    pub fn unique_name(&self) -> &str {
        &self.unique_name
    }

    pub fn expiration_time(&self) -> DateTime<Utc> {
        self.expiration_time
    }

    pub fn updated_time(&self) -> DateTime<Utc> {
        self.updated_time
    }

    pub fn is_optimized(&self) -> bool {
        self.is_optimized
    }

    /// Whether the record is stale at `now`
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expiration_time <= now
    }
}

/// Statistics about a provider
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderStats {
    /// Keys currently held in the latest-version cache
    pub cached_entries: usize,
    pub latest_hits: u64,
    pub latest_misses: u64,
    pub writes_committed: u64,
    /// Writes abandoned after every attempt failed
    pub writes_dropped: u64,
    /// Older versions scheduled for removal during lookups
    pub superseded_removed: u64,
}

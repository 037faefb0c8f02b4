//! Stateless anomaly predicates applied after discovery and matching.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, TimeDelta, Utc};
use splsensors_core::models::{SensorFamily, SensorObservation};

use crate::sensors::min_file_size;

/// Observations older than the family's latest start by more than this many
/// days are treated as carrying a corrupt embedded timestamp.
pub const WRONG_TIMESTAMP_DAYS: i64 = 2 * 365;

/// Families whose start times are checked against [`WRONG_TIMESTAMP_DAYS`].
pub fn checks_timestamps(family: SensorFamily) -> bool {
    family == SensorFamily::Sbp
}

/// `true` when `ts` lies more than the window before `latest`.
pub fn is_wrong_timestamp(ts: DateTime<Utc>, latest: DateTime<Utc>) -> bool {
    ts < latest - TimeDelta::days(WRONG_TIMESTAMP_DAYS)
}

/// Observations whose start is implausibly far before the newest one.
pub fn wrong_timestamps(observations: &[SensorObservation]) -> Vec<SensorObservation> {
    let Some(latest) = observations.iter().map(|o| o.timestamp).max() else {
        return Vec::new();
    };
    observations
        .iter()
        .filter(|o| is_wrong_timestamp(o.timestamp, latest))
        .cloned()
        .collect()
}

/// `true` when a file of `size` bytes is below the family's size floor.
pub fn is_undersized(family: SensorFamily, size: u64) -> bool {
    min_file_size(family).map(|floor| size < floor).unwrap_or(false)
}

/// Timestamps that occur more than once.
pub fn duplicate_timestamps<I>(timestamps: I) -> HashSet<DateTime<Utc>>
where
    I: IntoIterator<Item = DateTime<Utc>>,
{
    let mut counts: HashMap<DateTime<Utc>, usize> = HashMap::new();
    for ts in timestamps {
        *counts.entry(ts).or_default() += 1;
    }
    counts
        .into_iter()
        .filter(|(_, n)| *n > 1)
        .map(|(ts, _)| ts)
        .collect()
}

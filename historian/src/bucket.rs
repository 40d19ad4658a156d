//! Time-bucketing for the historian store.
//!
//! Buckets bound the cost of range queries and retention sweeps: each tag's
//! points are grouped into fixed time windows, so a query touches only the
//! buckets overlapping its range and a sweep drops whole buckets where it can.
//!
//! The bucket-key functions are pure and stateless. A bucket key is the
//! canonical start of the half-open window `[start, start + interval)`
//! containing a timestamp, with flooring toward negative infinity so
//! pre-epoch timestamps land in the correct window.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::tag::DataPoint;

/// Fixed bucketing interval.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BucketInterval {
    /// One-minute windows.
    Minute,
    /// Five-minute windows.
    FiveMinute,
    /// One-hour windows.
    Hour,
    /// One-day windows.
    Day,
}

impl BucketInterval {
    /// All intervals, finest first. Used by pre-aggregation.
    pub const ALL: [Self; 4] = [Self::Minute, Self::FiveMinute, Self::Hour, Self::Day];

    /// Returns the window length in milliseconds.
    pub fn interval_ms(self) -> i64 {
        match self {
            Self::Minute => 60 * 1_000,
            Self::FiveMinute => 5 * 60 * 1_000,
            Self::Hour => 60 * 60 * 1_000,
            Self::Day => 24 * 60 * 60 * 1_000,
        }
    }
}

/// Returns the canonical bucket key for a timestamp.
///
/// The key is the window start in milliseconds, floored toward negative
/// infinity.
///
/// # Examples
///
/// ```rust
/// use historian::bucket::{bucket_key, BucketInterval};
///
/// let ts = 90_500; // 1m30.5s after epoch
/// assert_eq!(bucket_key(ts, BucketInterval::Minute), 60_000);
/// assert_eq!(bucket_key(ts, BucketInterval::Hour), 0);
/// assert_eq!(bucket_key(-1, BucketInterval::Minute), -60_000);
/// ```
pub fn bucket_key(timestamp_ms: i64, interval: BucketInterval) -> i64 {
    let width = interval.interval_ms();
    timestamp_ms.div_euclid(width) * width
}

/// Returns the half-open `[start, end)` window containing a timestamp.
///
/// # Examples
///
/// ```rust
/// use historian::bucket::{bucket_bounds, BucketInterval};
///
/// let (start, end) = bucket_bounds(90_500, BucketInterval::Minute);
/// assert_eq!((start, end), (60_000, 120_000));
/// ```
pub fn bucket_bounds(timestamp_ms: i64, interval: BucketInterval) -> (i64, i64) {
    let start = bucket_key(timestamp_ms, interval);
    (start, start + interval.interval_ms())
}

/// Incrementally maintained rollup over a bucket's points.
///
/// Min/max/avg/sum cover points with a numeric representation; counts and
/// quality cover every point. Removal falls back to a full recompute since
/// min/max cannot be decremented.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct BucketStatistics {
    /// Number of points in the bucket.
    pub count: usize,
    /// Minimum numeric value, when any numeric point exists.
    pub min: Option<f64>,
    /// Maximum numeric value, when any numeric point exists.
    pub max: Option<f64>,
    /// Mean numeric value, when any numeric point exists.
    pub avg: Option<f64>,
    /// Sum of numeric values.
    pub sum: f64,
    /// Timestamp of the earliest point.
    pub first_timestamp: Option<i64>,
    /// Timestamp of the latest point.
    pub last_timestamp: Option<i64>,
    /// Mean quality across all points.
    pub avg_quality: f64,
    /// Count of points with a numeric representation.
    numeric_count: usize,
    /// Running quality total, kept for incremental averaging.
    quality_sum: u64,
}

impl BucketStatistics {
    fn add(&mut self, point: &DataPoint) {
        self.count += 1;
        self.quality_sum += u64::from(point.quality);
        #[allow(clippy::cast_precision_loss)]
        {
            self.avg_quality = self.quality_sum as f64 / self.count as f64;
        }

        if let Some(v) = point.value.as_f64() {
            self.numeric_count += 1;
            self.sum += v;
            self.min = Some(self.min.map_or(v, |m| m.min(v)));
            self.max = Some(self.max.map_or(v, |m| m.max(v)));
            #[allow(clippy::cast_precision_loss)]
            {
                self.avg = Some(self.sum / self.numeric_count as f64);
            }
        }

        self.first_timestamp = Some(
            self.first_timestamp
                .map_or(point.timestamp, |t| t.min(point.timestamp)),
        );
        self.last_timestamp = Some(
            self.last_timestamp
                .map_or(point.timestamp, |t| t.max(point.timestamp)),
        );
    }

    fn recompute<'a>(points: impl Iterator<Item = &'a DataPoint>) -> Self {
        let mut stats = Self::default();
        for point in points {
            stats.add(point);
        }
        stats
    }
}

/// A fixed time-window container for one tag's points.
///
/// Points are keyed by timestamp in a `BTreeMap`, giving ordered iteration
/// and efficient range scans within the window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bucket {
    /// Inclusive window start, milliseconds since the Unix epoch.
    pub start: i64,
    /// Exclusive window end.
    pub end: i64,
    points: BTreeMap<i64, DataPoint>,
    statistics: BucketStatistics,
}

impl Bucket {
    /// Creates an empty bucket for the window containing `timestamp_ms`.
    pub fn for_timestamp(timestamp_ms: i64, interval: BucketInterval) -> Self {
        let (start, end) = bucket_bounds(timestamp_ms, interval);
        Self {
            start,
            end,
            points: BTreeMap::new(),
            statistics: BucketStatistics::default(),
        }
    }

    /// Returns `true` when the bucket already holds a point at this instant.
    pub fn contains_timestamp(&self, timestamp_ms: i64) -> bool {
        self.points.contains_key(&timestamp_ms)
    }

    /// Inserts a point, updating the rollup.
    ///
    /// The caller guarantees the timestamp falls inside the window and is not
    /// already present; the write path checks both before insertion.
    pub fn insert(&mut self, point: DataPoint) {
        debug_assert!(point.timestamp >= self.start && point.timestamp < self.end);
        self.statistics.add(&point);
        self.points.insert(point.timestamp, point);
    }

    /// Removes the point at `timestamp_ms`, if present, and returns it.
    pub fn remove(&mut self, timestamp_ms: i64) -> Option<DataPoint> {
        let removed = self.points.remove(&timestamp_ms);
        if removed.is_some() {
            self.statistics = BucketStatistics::recompute(self.points.values());
        }
        removed
    }

    /// Removes every point older than `cutoff_ms` and returns how many.
    pub fn remove_older_than(&mut self, cutoff_ms: i64) -> usize {
        let before = self.points.len();
        self.points.retain(|ts, _| *ts >= cutoff_ms);
        let removed = before - self.points.len();
        if removed > 0 {
            self.statistics = BucketStatistics::recompute(self.points.values());
        }
        removed
    }

    /// Returns the number of points in the bucket.
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// Returns `true` when the bucket holds no points.
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Returns the current rollup.
    pub fn statistics(&self) -> &BucketStatistics {
        &self.statistics
    }

    /// Iterates points with timestamps in the inclusive `[start, end]` range,
    /// ascending.
    pub fn range(&self, start_ms: i64, end_ms: i64) -> impl Iterator<Item = &DataPoint> {
        self.points.range(start_ms..=end_ms).map(|(_, p)| p)
    }

    /// Iterates all points in the bucket, ascending by timestamp.
    pub fn iter(&self) -> impl Iterator<Item = &DataPoint> {
        self.points.values()
    }

    /// Returns `true` when the bucket's window overlaps the inclusive
    /// `[start, end]` query range.
    pub fn overlaps(&self, start_ms: i64, end_ms: i64) -> bool {
        self.start <= end_ms && self.end > start_ms
    }
}

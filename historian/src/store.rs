//! Time-series store: the write path, bucketed storage, queries, and
//! retention for the historian engine.
//!
//! # Design
//!
//! The store acts as the central coordinator:
//! - Owns the [`TagRegistry`] and resolves every write against it
//! - Maintains one [`TagIndex`] per written tag, holding that tag's buckets,
//!   compression state, precomputed aggregates, and performance counters
//! - Validates, coerces, and bucket-routes incoming points
//! - Serves range queries, recency queries, aggregations, and statistics
//! - Sweeps expired points per each tag's retention policy
//!
//! Per-tag state lives entirely inside its `TagIndex`, so a concurrent host
//! can shard or lock by tag name without cross-tag interference.
//!
//! # Example Usage
//!
//! ```rust
//! use historian::registry::TagRegistry;
//! use historian::store::{StoreConfig, TimeSeriesStore};
//! use historian::tag::{DataPointInput, TagConfig, TagDataType, TagValue};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let mut registry = TagRegistry::new();
//! registry.create_tag(TagConfig::new("BOILER.PRESSURE", TagDataType::Float))?;
//!
//! let mut store = TimeSeriesStore::new(StoreConfig::default(), registry);
//!
//! let result = store.write_single_data_point(DataPointInput::new(
//!     "BOILER.PRESSURE",
//!     1_700_000_000_000,
//!     TagValue::Float(42.5),
//! ));
//! assert_eq!(result.points_written, 1);
//! # Ok(())
//! # }
//! ```
//!
//! # Thread Safety
//!
//! The store is designed for single-threaded access patterns. External
//! synchronization must be provided if used across multiple threads.

use std::collections::{BTreeMap, HashMap};
use std::mem;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::aggregate::{AggregatedData, AggregationResult, AggregationType};
use crate::bucket::{Bucket, BucketInterval, bucket_bounds, bucket_key};
use crate::compression::{Boxcar, CompressionOutcome, CompressionState, SwingingDoor};
use crate::error::{AggregationError, QueryError, Result, WriteError, WriteErrorCode};
use crate::registry::TagRegistry;
use crate::tag::{
    CompressionType, DataPoint, DataPointInput, StorageType, Tag, TagDataType, TagValue, now_ms,
};

/// Utilization above which the store reports itself unhealthy.
const HIGH_WATER_UTILIZATION: f64 = 0.8;

/// Construction-time configuration for the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Hard capacity across all tags; writes past it fail with
    /// `STORAGE_FULL`.
    pub max_data_points: usize,
    /// Fallback retention in hours for tags missing from the registry
    /// snapshot during a sweep.
    pub retention_hours: i64,
    /// Master switch for deviation-based compression.
    pub compression_enabled: bool,
    /// Master switch for precomputed per-window aggregates.
    pub aggregation_enabled: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            max_data_points: 1_000_000,
            retention_hours: 24,
            compression_enabled: true,
            aggregation_enabled: true,
        }
    }
}

/// One failed point from a batch write.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WriteFailure {
    /// The tag that was targeted.
    pub tag_name: String,
    /// The rejected point's timestamp.
    pub timestamp: i64,
    /// Machine-readable failure classification.
    pub code: WriteErrorCode,
    /// Human-readable failure message.
    pub message: String,
}

/// Outcome of a batch write.
///
/// One bad point never aborts the batch: valid points are committed, invalid
/// ones are recorded in `errors`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WriteResult {
    /// Points accepted and committed.
    pub points_written: usize,
    /// Points rejected.
    pub points_failed: usize,
    /// Per-point failures, in input order.
    pub errors: Vec<WriteFailure>,
    /// Non-fatal notices (e.g. quality below the tag's threshold).
    pub warnings: Vec<String>,
    /// True when at least one point of the batch was evaluated against an
    /// active compression tolerance.
    pub compression_applied: bool,
    /// Wall-clock duration of the batch.
    pub execution_time: Duration,
    /// Accepted points per second over `execution_time`.
    pub throughput: f64,
}

/// Parameters for [`TimeSeriesStore::query_data_points`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryRequest {
    /// Tags to read; at least one must resolve via the registry.
    pub tag_names: Vec<String>,
    /// Inclusive range start, milliseconds since the Unix epoch.
    pub start_time: i64,
    /// Inclusive range end.
    pub end_time: i64,
    /// Cap on the merged result length.
    pub max_results: Option<usize>,
    /// Minimum quality; points below it are filtered out.
    pub quality_filter: Option<u8>,
}

/// Parameters for [`TimeSeriesStore::calculate_aggregation`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregationRequest {
    /// The tag to aggregate.
    pub tag_name: String,
    /// The summary function to apply.
    pub aggregation_type: AggregationType,
    /// Inclusive range start.
    pub start_time: i64,
    /// Inclusive range end.
    pub end_time: i64,
}

/// Point totals and capacity figures for monitoring.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StorageStatistics {
    /// Points currently stored across all tags.
    pub total_data_points: usize,
    /// Tags that currently hold stored data.
    pub total_tags: usize,
    /// Rough in-memory footprint of stored points, in bytes.
    pub estimated_storage_bytes: usize,
    /// Accepted-to-stored ratio; 1.0 when compression never elided a point.
    pub compression_ratio: f64,
    /// Timestamp of the oldest stored point.
    pub oldest_timestamp: Option<i64>,
    /// Timestamp of the newest stored point.
    pub newest_timestamp: Option<i64>,
    /// `total_data_points / max_data_points`.
    pub storage_utilization: f64,
}

/// Health summary derived from [`StorageStatistics`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreHealth {
    /// False once utilization exceeds the high-water mark.
    pub healthy: bool,
    /// Current utilization in [0, 1+].
    pub storage_utilization: f64,
    /// Points currently stored.
    pub total_data_points: usize,
    /// Configured capacity.
    pub max_data_points: usize,
    /// Registered tag count (from the registry).
    pub total_tags: usize,
}

/// What the per-tag write step did, reported back to the store so it can
/// maintain global counters.
struct IndexWriteOutcome {
    /// Whether the point was evaluated against a compression tolerance.
    evaluated: bool,
    /// Whether a previously stored point was elided.
    elided: bool,
}

/// Per-tag aggregate of buckets, compression state, precomputed aggregates,
/// and performance counters. Created on first write, destroyed by `clear()`
/// or purge-on-delete.
#[derive(Debug)]
struct TagIndex {
    /// Storage bucketing interval, derived from the tag's storage class.
    interval: BucketInterval,
    /// Buckets keyed by window start.
    buckets: BTreeMap<i64, Bucket>,
    /// Deviation filter, present only while the tag's policy is active.
    compression: Option<CompressionState>,
    /// The policy the live filter was built from, for change detection.
    compression_policy: Option<(CompressionType, f64)>,
    /// Precomputed per-window aggregates, keyed by (interval, type).
    aggregates: HashMap<(BucketInterval, AggregationType), AggregatedData>,
    point_count: usize,
    write_count: u64,
    read_count: u64,
    compression_savings: u64,
    estimated_bytes: usize,
}

impl TagIndex {
    fn new(tag: &Tag) -> Self {
        let interval = match tag.storage_type {
            StorageType::Normal => BucketInterval::Hour,
            StorageType::Lab => BucketInterval::Day,
        };
        Self {
            interval,
            buckets: BTreeMap::new(),
            compression: None,
            compression_policy: None,
            aggregates: HashMap::new(),
            point_count: 0,
            write_count: 0,
            read_count: 0,
            compression_savings: 0,
            estimated_bytes: 0,
        }
    }

    /// Aligns the deviation filter with the tag's current policy.
    ///
    /// The registry can change a tag's compression settings between writes;
    /// a policy change resets the filter state.
    fn sync_compression(&mut self, tag: &Tag, compression_enabled: bool) {
        let wanted = (compression_enabled
            && tag.compression_type.is_deviation_based()
            && tag.compression_deviation > 0.0)
            .then_some((tag.compression_type, tag.compression_deviation));
        if wanted == self.compression_policy {
            return;
        }
        self.compression = match wanted {
            Some((CompressionType::SwingingDoor, deviation)) => {
                Some(CompressionState::SwingingDoor(SwingingDoor::new(deviation)))
            }
            Some((CompressionType::Boxcar, deviation)) => {
                Some(CompressionState::Boxcar(Boxcar::new(deviation)))
            }
            _ => None,
        };
        self.compression_policy = wanted;
    }

    fn contains_timestamp(&self, timestamp_ms: i64) -> bool {
        let key = bucket_key(timestamp_ms, self.interval);
        self.buckets
            .get(&key)
            .is_some_and(|bucket| bucket.contains_timestamp(timestamp_ms))
    }

    fn write(&mut self, point: DataPoint) -> IndexWriteOutcome {
        let mut outcome = IndexWriteOutcome {
            evaluated: false,
            elided: false,
        };

        let mut elided_ts = None;
        if let Some(state) = &mut self.compression
            && let Some(value) = point.value.as_f64()
        {
            outcome.evaluated = true;
            if let CompressionOutcome::Held {
                elided: Some(ts),
            } = state.offer(point.timestamp, value)
            {
                elided_ts = Some(ts);
            }
        }
        if let Some(ts) = elided_ts
            && self.remove_point(ts)
        {
            outcome.elided = true;
            self.compression_savings += 1;
        }

        let key = bucket_key(point.timestamp, self.interval);
        let interval = self.interval;
        self.estimated_bytes += estimate_point_bytes(&point);
        self.buckets
            .entry(key)
            .or_insert_with(|| Bucket::for_timestamp(point.timestamp, interval))
            .insert(point);
        self.point_count += 1;
        self.write_count += 1;

        outcome
    }

    fn remove_point(&mut self, timestamp_ms: i64) -> bool {
        let key = bucket_key(timestamp_ms, self.interval);
        let Some(bucket) = self.buckets.get_mut(&key) else {
            return false;
        };
        let Some(removed) = bucket.remove(timestamp_ms) else {
            return false;
        };
        self.point_count -= 1;
        self.estimated_bytes = self
            .estimated_bytes
            .saturating_sub(estimate_point_bytes(&removed));
        if bucket.is_empty() {
            self.buckets.remove(&key);
        }
        true
    }

    /// Collects points in the inclusive `[start, end]` range, ascending.
    fn query_range(&self, start_ms: i64, end_ms: i64, quality_filter: Option<u8>) -> Vec<DataPoint> {
        let first_key = bucket_key(start_ms, self.interval);
        self.buckets
            .range(first_key..=end_ms)
            .filter(|(_, bucket)| bucket.overlaps(start_ms, end_ms))
            .flat_map(|(_, bucket)| bucket.range(start_ms, end_ms))
            .filter(|point| quality_filter.is_none_or(|min| point.quality >= min))
            .cloned()
            .collect()
    }

    /// Returns the last `count` points, descending by timestamp.
    fn recent(&self, count: usize) -> Vec<DataPoint> {
        if count == 0 {
            return Vec::new();
        }
        let mut points: Vec<DataPoint> = Vec::with_capacity(count);
        'outer: for bucket in self.buckets.values().rev() {
            let mut in_bucket: Vec<&DataPoint> = bucket.iter().collect();
            in_bucket.reverse();
            for point in in_bucket {
                points.push(point.clone());
                if points.len() == count {
                    break 'outer;
                }
            }
        }
        points
    }

    /// Removes points older than `cutoff_ms`; whole expired buckets are
    /// dropped without scanning their points.
    fn purge_older_than(&mut self, cutoff_ms: i64) -> usize {
        let mut removed = 0;

        let expired_keys: Vec<i64> = self
            .buckets
            .range(..=cutoff_ms)
            .filter(|(_, bucket)| bucket.end <= cutoff_ms)
            .map(|(key, _)| *key)
            .collect();
        for key in expired_keys {
            if let Some(bucket) = self.buckets.remove(&key) {
                removed += bucket.len();
                for point in bucket.iter() {
                    self.estimated_bytes = self
                        .estimated_bytes
                        .saturating_sub(estimate_point_bytes(point));
                }
            }
        }

        // The bucket straddling the cutoff needs a partial sweep.
        let boundary_key = bucket_key(cutoff_ms, self.interval);
        if let Some(bucket) = self.buckets.get_mut(&boundary_key) {
            let bytes_before: usize = bucket.iter().map(estimate_point_bytes).sum();
            removed += bucket.remove_older_than(cutoff_ms);
            let bytes_after: usize = bucket.iter().map(estimate_point_bytes).sum();
            self.estimated_bytes = self
                .estimated_bytes
                .saturating_sub(bytes_before - bytes_after);
            if bucket.is_empty() {
                self.buckets.remove(&boundary_key);
            }
        }

        self.point_count -= removed;
        removed
    }

    fn oldest_timestamp(&self) -> Option<i64> {
        self.buckets
            .values()
            .next()
            .and_then(|b| b.statistics().first_timestamp)
    }

    fn newest_timestamp(&self) -> Option<i64> {
        self.buckets
            .values()
            .next_back()
            .and_then(|b| b.statistics().last_timestamp)
    }

    /// Regenerates the precomputed aggregates for every interval window
    /// containing `timestamp_ms`.
    fn regenerate_aggregates(&mut self, tag_name: &str, timestamp_ms: i64) {
        for interval in BucketInterval::ALL {
            let (window_start, window_end) = bucket_bounds(timestamp_ms, interval);
            let points = self.query_range(window_start, window_end - 1, None);
            let values: Vec<f64> = points.iter().filter_map(|p| p.value.as_f64()).collect();
            let count = points.len();
            let quality_sum: f64 = points.iter().map(|p| f64::from(p.quality)).sum();
            #[allow(clippy::cast_precision_loss)]
            let avg_quality = if count == 0 { 0.0 } else { quality_sum / count as f64 };

            for aggregation_type in AggregationType::ALL {
                self.aggregates.insert(
                    (interval, aggregation_type),
                    AggregatedData {
                        tag_name: tag_name.to_string(),
                        aggregation_type,
                        interval,
                        window_start,
                        window_end,
                        value: aggregation_type.apply(&values),
                        count,
                        avg_quality,
                    },
                );
            }
        }
    }
}

/// Rough per-point footprint used for the storage estimate.
fn estimate_point_bytes(point: &DataPoint) -> usize {
    let value_bytes = match &point.value {
        TagValue::Text(s) => s.len(),
        _ => 0,
    };
    let source_bytes = point.source.as_ref().map_or(0, String::len);
    mem::size_of::<DataPoint>() + point.tag_name.len() + value_bytes + source_bytes
}

/// Tag-oriented, in-memory time-series store.
#[derive(Debug)]
pub struct TimeSeriesStore {
    config: StoreConfig,
    registry: TagRegistry,
    indices: HashMap<String, TagIndex>,
    total_points: usize,
    total_writes: u64,
    total_reads: u64,
}

impl TimeSeriesStore {
    /// Creates a store over the given registry.
    pub fn new(config: StoreConfig, registry: TagRegistry) -> Self {
        Self {
            config,
            registry,
            indices: HashMap::new(),
            total_points: 0,
            total_writes: 0,
            total_reads: 0,
        }
    }

    /// Returns the construction-time configuration.
    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Returns the owned tag registry.
    pub fn registry(&self) -> &TagRegistry {
        &self.registry
    }

    /// Returns the owned tag registry mutably, for tag lifecycle management.
    ///
    /// Deleting a tag through the registry directly leaves its stored data
    /// in place; use [`delete_tag`](Self::delete_tag) for purge-on-delete.
    pub fn registry_mut(&mut self) -> &mut TagRegistry {
        &mut self.registry
    }

    /// Writes a batch of points, one validation pipeline per point.
    ///
    /// Valid points are committed even when neighbors fail; the result
    /// carries a per-point error list alongside the totals.
    pub fn write_data_points(&mut self, points: &[DataPointInput]) -> WriteResult {
        let started = Instant::now();
        let mut result = WriteResult {
            points_written: 0,
            points_failed: 0,
            errors: Vec::new(),
            warnings: Vec::new(),
            compression_applied: false,
            execution_time: Duration::ZERO,
            throughput: 0.0,
        };

        for input in points {
            match self.write_point(input, &mut result.warnings) {
                Ok(evaluated) => {
                    result.points_written += 1;
                    result.compression_applied |= evaluated;
                }
                Err(error) => {
                    result.points_failed += 1;
                    result.errors.push(WriteFailure {
                        tag_name: input.tag_name.clone(),
                        timestamp: input.timestamp,
                        code: error.code(),
                        message: error.to_string(),
                    });
                }
            }
        }

        result.execution_time = started.elapsed();
        let secs = result.execution_time.as_secs_f64();
        if secs > 0.0 {
            #[allow(clippy::cast_precision_loss)]
            {
                result.throughput = result.points_written as f64 / secs;
            }
        }
        result
    }

    /// One-point convenience form of [`write_data_points`](Self::write_data_points).
    pub fn write_single_data_point(&mut self, point: DataPointInput) -> WriteResult {
        self.write_data_points(std::slice::from_ref(&point))
    }

    /// Runs the full validation pipeline for one point.
    ///
    /// Returns whether the point was evaluated against a compression
    /// tolerance.
    fn write_point(
        &mut self,
        input: &DataPointInput,
        warnings: &mut Vec<String>,
    ) -> std::result::Result<bool, WriteError> {
        let tag = self
            .registry
            .get(&input.tag_name)
            .ok_or_else(|| WriteError::TagNotFound {
                tag_name: input.tag_name.clone(),
            })?
            .clone();

        if !tag.is_active {
            return Err(WriteError::TagInactive {
                tag_name: input.tag_name.clone(),
            });
        }

        if input.timestamp <= 0 {
            return Err(WriteError::InvalidTimestamp {
                tag_name: input.tag_name.clone(),
                timestamp: input.timestamp,
            });
        }

        let quality = input.quality.unwrap_or_else(|| i32::from(tag.default_quality));
        if !(0..=100).contains(&quality) {
            return Err(WriteError::QualityTooLow {
                tag_name: input.tag_name.clone(),
                quality,
            });
        }
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let quality = quality as u8;

        let value = input
            .value
            .clone()
            .coerce_to(tag.data_type)
            .map_err(|reason| WriteError::InvalidValue {
                tag_name: input.tag_name.clone(),
                reason,
            })?;

        if let Some(v) = value.as_f64()
            && tag.data_type.is_numeric()
        {
            let below = tag.min_value.is_some_and(|min| v < min);
            let above = tag.max_value.is_some_and(|max| v > max);
            if below || above {
                return Err(WriteError::ValueOutOfRange {
                    tag_name: input.tag_name.clone(),
                    value: v,
                });
            }
        }

        if self.total_points >= self.config.max_data_points {
            warn!(
                max_data_points = self.config.max_data_points,
                "store at capacity, rejecting write"
            );
            return Err(WriteError::StorageFull {
                max_data_points: self.config.max_data_points,
            });
        }

        let compression_enabled = self.config.compression_enabled;
        let index = self
            .indices
            .entry(tag.name.clone())
            .or_insert_with(|| TagIndex::new(&tag));
        index.sync_compression(&tag, compression_enabled);

        if index.contains_timestamp(input.timestamp) {
            return Err(WriteError::DuplicateTimestamp {
                tag_name: input.tag_name.clone(),
                timestamp: input.timestamp,
            });
        }

        if quality < tag.quality_threshold {
            warnings.push(format!(
                "quality {quality} below threshold {} for tag '{}' at {}",
                tag.quality_threshold, tag.name, input.timestamp
            ));
        }

        let point = DataPoint {
            tag_name: tag.name.clone(),
            timestamp: input.timestamp,
            value,
            quality,
            source: input.source.clone(),
        };

        let outcome = index.write(point);
        if outcome.elided {
            self.total_points -= 1;
        }
        self.total_points += 1;
        self.total_writes += 1;

        if self.config.aggregation_enabled {
            index.regenerate_aggregates(&tag.name, input.timestamp);
        }

        Ok(outcome.evaluated)
    }

    /// Reads points for one or more tags over an inclusive time range.
    ///
    /// Results are merged across tags, sorted ascending by timestamp, and
    /// truncated to `max_results` when given.
    ///
    /// # Errors
    ///
    /// - [`QueryError::InvalidTimeRange`] when start > end
    /// - [`QueryError::NoValidTags`] when no requested name resolves
    pub fn query_data_points(&mut self, request: &QueryRequest) -> Result<Vec<DataPoint>> {
        if request.start_time > request.end_time {
            return Err(QueryError::InvalidTimeRange {
                start: request.start_time,
                end: request.end_time,
            }
            .into());
        }

        let resolved: Vec<&str> = request
            .tag_names
            .iter()
            .filter(|name| self.registry.get(name).is_some())
            .map(String::as_str)
            .collect();
        if resolved.is_empty() {
            return Err(QueryError::NoValidTags.into());
        }

        let mut points = Vec::new();
        for name in &resolved {
            if let Some(index) = self.indices.get(*name) {
                points.extend(index.query_range(
                    request.start_time,
                    request.end_time,
                    request.quality_filter,
                ));
            }
        }
        for name in resolved {
            if let Some(index) = self.indices.get_mut(name) {
                index.read_count += 1;
            }
        }
        self.total_reads += 1;

        points.sort_by(|a, b| {
            a.timestamp
                .cmp(&b.timestamp)
                .then_with(|| a.tag_name.cmp(&b.tag_name))
        });
        if let Some(max) = request.max_results {
            points.truncate(max);
        }
        Ok(points)
    }

    /// Returns the last `count` points for a tag, descending by timestamp.
    ///
    /// # Errors
    ///
    /// Returns [`QueryError::UnknownTag`] when the tag is not registered.
    pub fn recent_data_points(&mut self, tag_name: &str, count: usize) -> Result<Vec<DataPoint>> {
        if self.registry.get(tag_name).is_none() {
            return Err(QueryError::UnknownTag {
                name: tag_name.to_string(),
            }
            .into());
        }
        self.total_reads += 1;
        Ok(self.indices.get_mut(tag_name).map_or_else(Vec::new, |index| {
            index.read_count += 1;
            index.recent(count)
        }))
    }

    /// Computes a scalar aggregate over exactly the points in the inclusive
    /// `[start_time, end_time]` range.
    ///
    /// # Errors
    ///
    /// - [`AggregationError::InvalidTimeRange`] when start > end
    /// - [`AggregationError::UnknownTag`] for an unregistered tag
    /// - [`AggregationError::NonNumericTag`] for Text tags
    /// - [`AggregationError::NoDataPoints`] when the range holds zero points
    pub fn calculate_aggregation(
        &mut self,
        request: &AggregationRequest,
    ) -> Result<AggregationResult> {
        if request.start_time > request.end_time {
            return Err(AggregationError::InvalidTimeRange {
                start: request.start_time,
                end: request.end_time,
            }
            .into());
        }

        let tag = self
            .registry
            .get(&request.tag_name)
            .ok_or_else(|| AggregationError::UnknownTag {
                name: request.tag_name.clone(),
            })?;
        if tag.data_type == TagDataType::Text {
            return Err(AggregationError::NonNumericTag {
                name: tag.name.clone(),
                data_type: tag.data_type,
            }
            .into());
        }

        let points = self
            .indices
            .get_mut(&request.tag_name)
            .map_or_else(Vec::new, |index| {
                index.read_count += 1;
                index.query_range(request.start_time, request.end_time, None)
            });
        self.total_reads += 1;
        if points.is_empty() {
            return Err(AggregationError::NoDataPoints.into());
        }

        let values: Vec<f64> = points.iter().filter_map(|p| p.value.as_f64()).collect();
        #[allow(clippy::cast_precision_loss)]
        let avg_quality =
            points.iter().map(|p| f64::from(p.quality)).sum::<f64>() / points.len() as f64;

        Ok(AggregationResult {
            tag_name: request.tag_name.clone(),
            aggregation_type: request.aggregation_type,
            start_time: request.start_time,
            end_time: request.end_time,
            value: request.aggregation_type.apply(&values),
            count: points.len(),
            avg_quality,
        })
    }

    /// Returns the precomputed aggregate for a tag's current window, when
    /// pre-aggregation is enabled and the tag has been written.
    pub fn pre_aggregated(
        &self,
        tag_name: &str,
        interval: BucketInterval,
        aggregation_type: AggregationType,
    ) -> Option<&AggregatedData> {
        self.indices
            .get(tag_name)?
            .aggregates
            .get(&(interval, aggregation_type))
    }

    /// Returns point totals, capacity, and compression figures.
    pub fn storage_statistics(&self) -> StorageStatistics {
        let mut oldest: Option<i64> = None;
        let mut newest: Option<i64> = None;
        let mut estimated_bytes = 0;
        let mut savings = 0;

        for index in self.indices.values() {
            if let Some(ts) = index.oldest_timestamp() {
                oldest = Some(oldest.map_or(ts, |o| o.min(ts)));
            }
            if let Some(ts) = index.newest_timestamp() {
                newest = Some(newest.map_or(ts, |n| n.max(ts)));
            }
            estimated_bytes += index.estimated_bytes;
            savings += index.compression_savings;
        }

        #[allow(clippy::cast_precision_loss)]
        let compression_ratio = if self.total_points == 0 {
            1.0
        } else {
            (self.total_points as f64 + savings as f64) / self.total_points as f64
        };

        #[allow(clippy::cast_precision_loss)]
        let storage_utilization = if self.config.max_data_points == 0 {
            1.0
        } else {
            self.total_points as f64 / self.config.max_data_points as f64
        };

        StorageStatistics {
            total_data_points: self.total_points,
            total_tags: self.indices.len(),
            estimated_storage_bytes: estimated_bytes,
            compression_ratio,
            oldest_timestamp: oldest,
            newest_timestamp: newest,
            storage_utilization,
        }
    }

    /// Returns a pass/fail health summary.
    ///
    /// The store is unhealthy once utilization exceeds the 0.8 high-water
    /// mark.
    pub fn health_status(&self) -> StoreHealth {
        let statistics = self.storage_statistics();
        StoreHealth {
            healthy: statistics.storage_utilization <= HIGH_WATER_UTILIZATION,
            storage_utilization: statistics.storage_utilization,
            total_data_points: statistics.total_data_points,
            max_data_points: self.config.max_data_points,
            total_tags: self.registry.tag_count(),
        }
    }

    /// Purges points older than each tag's retention window.
    ///
    /// Tags missing from the registry snapshot fall back to the store-level
    /// `retention_hours`. Safe to call repeatedly; at steady state it
    /// removes nothing.
    pub fn cleanup_expired_data(&mut self) -> usize {
        let now = now_ms();
        let mut removed = 0;

        for (name, index) in &mut self.indices {
            let retention_hours = self
                .registry
                .get(name)
                .map_or(self.config.retention_hours, |tag| tag.retention_hours);
            // Stored timestamps are strictly positive, so a cutoff clamped
            // to 0 removes nothing even for extreme retention values.
            let cutoff = now
                .saturating_sub(retention_hours.saturating_mul(3_600_000))
                .max(0);
            removed += index.purge_older_than(cutoff);
        }

        self.total_points -= removed;
        if removed > 0 {
            debug!(removed, "retention sweep purged expired points");
        }
        removed
    }

    /// Removes a tag and purges all of its stored data.
    ///
    /// This is the documented purge-on-delete path; going through
    /// [`registry_mut`](Self::registry_mut) instead orphans the tag's
    /// buckets.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::TagNotFound`](crate::error::RegistryError::TagNotFound)
    /// when the name is absent.
    pub fn delete_tag(&mut self, tag_name: &str) -> Result<Tag> {
        let removed = self.registry.delete_tag(tag_name)?;
        if let Some(index) = self.indices.remove(tag_name) {
            self.total_points -= index.point_count;
            debug!(tag = tag_name, points = index.point_count, "tag data purged");
        }
        Ok(removed)
    }

    /// Empties all buckets, aggregates, and counters. The registry is
    /// untouched.
    pub fn clear(&mut self) {
        self.indices.clear();
        self.total_points = 0;
        self.total_writes = 0;
        self.total_reads = 0;
    }

    /// Returns the number of points currently stored.
    pub fn total_data_points(&self) -> usize {
        self.total_points
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tag::TagConfig;

    const BASE_TS: i64 = 1_700_000_000_000;

    fn store_with_tag(name: &str) -> TimeSeriesStore {
        let mut registry = TagRegistry::new();
        registry
            .create_tag(TagConfig::new(name, TagDataType::Float))
            .unwrap();
        TimeSeriesStore::new(StoreConfig::default(), registry)
    }

    fn float_point(name: &str, offset_ms: i64, value: f64) -> DataPointInput {
        DataPointInput::new(name, BASE_TS + offset_ms, TagValue::Float(value))
    }

    #[test]
    fn test_write_and_count() {
        let mut store = store_with_tag("T.1");
        let result = store.write_data_points(&[
            float_point("T.1", 0, 1.0),
            float_point("T.1", 1_000, 2.0),
        ]);

        assert_eq!(result.points_written, 2);
        assert_eq!(result.points_failed, 0);
        assert!(result.errors.is_empty());
        assert_eq!(store.total_data_points(), 2);
    }

    #[test]
    fn test_unknown_and_inactive_tags() {
        let mut store = store_with_tag("T.1");
        store
            .registry_mut()
            .update_tag(
                "T.1",
                crate::tag::TagUpdate {
                    is_active: Some(false),
                    ..Default::default()
                },
            )
            .unwrap();

        let result = store.write_data_points(&[
            float_point("GHOST", 0, 1.0),
            float_point("T.1", 0, 1.0),
        ]);

        assert_eq!(result.points_failed, 2);
        assert_eq!(result.errors[0].code, WriteErrorCode::TagNotFound);
        assert_eq!(result.errors[1].code, WriteErrorCode::TagInactive);
    }

    #[test]
    fn test_quality_bounds() {
        let mut store = store_with_tag("T.1");
        let result = store.write_data_points(&[
            float_point("T.1", 0, 1.0).with_quality(-10),
            float_point("T.1", 1_000, 1.0).with_quality(150),
            float_point("T.1", 2_000, 1.0).with_quality(100),
        ]);

        assert_eq!(result.points_written, 1);
        assert_eq!(result.points_failed, 2);
        assert!(
            result
                .errors
                .iter()
                .all(|e| e.code == WriteErrorCode::QualityTooLow)
        );
    }

    #[test]
    fn test_quality_threshold_warning() {
        let mut store = store_with_tag("T.1");
        let result = store.write_single_data_point(float_point("T.1", 0, 1.0).with_quality(10));

        // Below the default threshold of 50: accepted, but flagged
        assert_eq!(result.points_written, 1);
        assert_eq!(result.warnings.len(), 1);
        assert!(result.warnings[0].contains("below threshold"));
    }

    #[test]
    fn test_invalid_timestamp() {
        let mut store = store_with_tag("T.1");
        let result = store.write_single_data_point(DataPointInput::new(
            "T.1",
            0,
            TagValue::Float(1.0),
        ));
        assert_eq!(result.errors[0].code, WriteErrorCode::InvalidTimestamp);
    }

    #[test]
    fn test_value_coercion_and_range() {
        let mut registry = TagRegistry::new();
        let mut config = TagConfig::new("T.RANGED", TagDataType::Float);
        config.min_value = Some(0.0);
        config.max_value = Some(100.0);
        registry.create_tag(config).unwrap();
        let mut store = TimeSeriesStore::new(StoreConfig::default(), registry);

        let result = store.write_data_points(&[
            DataPointInput::new("T.RANGED", BASE_TS, TagValue::Boolean(true)),
            float_point("T.RANGED", 1_000, 150.0),
            DataPointInput::new("T.RANGED", BASE_TS + 2_000, TagValue::Integer(50)),
        ]);

        assert_eq!(result.points_written, 1); // the integer coerces to 50.0
        assert_eq!(result.errors[0].code, WriteErrorCode::InvalidValue);
        assert_eq!(result.errors[1].code, WriteErrorCode::ValueOutOfRange);
    }

    #[test]
    fn test_duplicate_timestamp() {
        let mut store = store_with_tag("T.1");
        let result = store.write_data_points(&[
            float_point("T.1", 0, 1.0),
            float_point("T.1", 0, 2.0),
        ]);

        assert_eq!(result.points_written, 1);
        assert_eq!(result.errors[0].code, WriteErrorCode::DuplicateTimestamp);
        assert_eq!(store.total_data_points(), 1);
    }

    #[test]
    fn test_storage_full() {
        let mut registry = TagRegistry::new();
        registry
            .create_tag(TagConfig::new("T.1", TagDataType::Float))
            .unwrap();
        let mut store = TimeSeriesStore::new(
            StoreConfig {
                max_data_points: 2,
                ..StoreConfig::default()
            },
            registry,
        );

        let result = store.write_data_points(&[
            float_point("T.1", 0, 1.0),
            float_point("T.1", 1_000, 2.0),
            float_point("T.1", 2_000, 3.0),
        ]);

        assert_eq!(result.points_written, 2);
        assert_eq!(result.errors[0].code, WriteErrorCode::StorageFull);
        assert_eq!(store.total_data_points(), 2);
    }

    #[test]
    fn test_query_round_trip() {
        let mut store = store_with_tag("T.1");
        let inputs: Vec<DataPointInput> = (0..5)
            .map(|i| float_point("T.1", i * 1_000, f64::from(i as u32)))
            .collect();
        store.write_data_points(&inputs);

        let points = store
            .query_data_points(&QueryRequest {
                tag_names: vec!["T.1".to_string()],
                start_time: BASE_TS,
                end_time: BASE_TS + 10_000,
                max_results: None,
                quality_filter: None,
            })
            .unwrap();

        assert_eq!(points.len(), 5);
        for (i, point) in points.iter().enumerate() {
            assert_eq!(point.timestamp, BASE_TS + i as i64 * 1_000);
            assert_eq!(point.value, TagValue::Float(f64::from(i as u32)));
            assert_eq!(point.quality, 100);
        }
    }

    #[test]
    fn test_query_validation() {
        let mut store = store_with_tag("T.1");

        let err = store
            .query_data_points(&QueryRequest {
                tag_names: vec!["GHOST".to_string()],
                start_time: BASE_TS,
                end_time: BASE_TS + 1,
                max_results: None,
                quality_filter: None,
            })
            .unwrap_err();
        assert!(err.to_string().contains("No valid tags found"));

        let err = store
            .query_data_points(&QueryRequest {
                tag_names: vec!["T.1".to_string()],
                start_time: BASE_TS + 10,
                end_time: BASE_TS,
                max_results: None,
                quality_filter: None,
            })
            .unwrap_err();
        assert!(matches!(
            err,
            crate::error::HistorianError::Query(QueryError::InvalidTimeRange { .. })
        ));
    }

    #[test]
    fn test_query_quality_filter_and_max_results() {
        let mut store = store_with_tag("T.1");
        store.write_data_points(&[
            float_point("T.1", 0, 1.0).with_quality(90),
            float_point("T.1", 1_000, 2.0).with_quality(40),
            float_point("T.1", 2_000, 3.0).with_quality(95),
        ]);

        let points = store
            .query_data_points(&QueryRequest {
                tag_names: vec!["T.1".to_string()],
                start_time: BASE_TS,
                end_time: BASE_TS + 10_000,
                max_results: Some(1),
                quality_filter: Some(50),
            })
            .unwrap();

        assert_eq!(points.len(), 1);
        assert_eq!(points[0].timestamp, BASE_TS);
    }

    #[test]
    fn test_recent_data_points_descending() {
        let mut store = store_with_tag("T.1");
        let inputs: Vec<DataPointInput> = (0..10)
            .map(|i| float_point("T.1", i * 1_000, f64::from(i as u32)))
            .collect();
        store.write_data_points(&inputs);

        let recent = store.recent_data_points("T.1", 3).unwrap();
        let timestamps: Vec<i64> = recent.iter().map(|p| p.timestamp).collect();
        assert_eq!(
            timestamps,
            vec![BASE_TS + 9_000, BASE_TS + 8_000, BASE_TS + 7_000]
        );

        assert!(store.recent_data_points("GHOST", 3).is_err());
        // Registered but never written: empty, not an error
        store
            .registry_mut()
            .create_tag(TagConfig::new("T.EMPTY", TagDataType::Float))
            .unwrap();
        assert!(store.recent_data_points("T.EMPTY", 3).unwrap().is_empty());
    }

    #[test]
    fn test_aggregation_values() {
        let mut store = store_with_tag("T.1");
        let inputs: Vec<DataPointInput> = [10.0, 20.0, 30.0, 40.0, 50.0]
            .iter()
            .enumerate()
            .map(|(i, v)| float_point("T.1", i as i64 * 1_000, *v))
            .collect();
        store.write_data_points(&inputs);

        let request = |aggregation_type| AggregationRequest {
            tag_name: "T.1".to_string(),
            aggregation_type,
            start_time: BASE_TS,
            end_time: BASE_TS + 10_000,
        };

        assert_eq!(
            store.calculate_aggregation(&request(AggregationType::Average)).unwrap().value,
            30.0
        );
        assert_eq!(
            store.calculate_aggregation(&request(AggregationType::Minimum)).unwrap().value,
            10.0
        );
        assert_eq!(
            store.calculate_aggregation(&request(AggregationType::Maximum)).unwrap().value,
            50.0
        );
        assert_eq!(
            store.calculate_aggregation(&request(AggregationType::Sum)).unwrap().value,
            150.0
        );
        let count = store.calculate_aggregation(&request(AggregationType::Count)).unwrap();
        assert_eq!(count.value, 5.0);
        assert_eq!(count.count, 5);
    }

    #[test]
    fn test_aggregation_empty_range() {
        let mut store = store_with_tag("T.1");
        store.write_single_data_point(float_point("T.1", 0, 1.0));

        let err = store
            .calculate_aggregation(&AggregationRequest {
                tag_name: "T.1".to_string(),
                aggregation_type: AggregationType::Average,
                start_time: BASE_TS + 60_000,
                end_time: BASE_TS + 120_000,
            })
            .unwrap_err();
        assert!(err.to_string().contains("No data points found for aggregation"));
    }

    #[test]
    fn test_pre_aggregation_regenerates() {
        let mut store = store_with_tag("T.1");
        store.write_data_points(&[
            float_point("T.1", 0, 10.0),
            float_point("T.1", 1_000, 20.0),
        ]);

        let entry = store
            .pre_aggregated("T.1", BucketInterval::Minute, AggregationType::Average)
            .unwrap();
        assert_eq!(entry.value, 15.0);
        assert_eq!(entry.count, 2);

        // A third point in the same minute window regenerates the entry
        store.write_single_data_point(float_point("T.1", 2_000, 30.0));
        let entry = store
            .pre_aggregated("T.1", BucketInterval::Minute, AggregationType::Average)
            .unwrap();
        assert_eq!(entry.value, 20.0);
        assert_eq!(entry.count, 3);
    }

    #[test]
    fn test_statistics_and_health() {
        let mut registry = TagRegistry::new();
        registry
            .create_tag(TagConfig::new("T.1", TagDataType::Float))
            .unwrap();
        let mut store = TimeSeriesStore::new(
            StoreConfig {
                max_data_points: 10,
                ..StoreConfig::default()
            },
            registry,
        );

        for i in 0..5 {
            store.write_single_data_point(float_point("T.1", i * 1_000, 1.0));
        }

        let statistics = store.storage_statistics();
        assert_eq!(statistics.total_data_points, 5);
        assert_eq!(statistics.total_tags, 1);
        assert_eq!(statistics.oldest_timestamp, Some(BASE_TS));
        assert_eq!(statistics.newest_timestamp, Some(BASE_TS + 4_000));
        assert_eq!(statistics.storage_utilization, 0.5);
        assert!(statistics.estimated_storage_bytes > 0);
        assert!(store.health_status().healthy);

        // Past the 0.8 high-water mark the store reports unhealthy
        for i in 5..9 {
            store.write_single_data_point(float_point("T.1", i * 1_000, 1.0));
        }
        let health = store.health_status();
        assert!(health.storage_utilization > 0.8);
        assert!(!health.healthy);
    }

    #[test]
    fn test_cleanup_expired_data() {
        let mut registry = TagRegistry::new();
        let mut config = TagConfig::new("T.SHORT", TagDataType::Float);
        config.retention_hours = Some(1);
        registry.create_tag(config).unwrap();
        let mut store = TimeSeriesStore::new(StoreConfig::default(), registry);

        let now = now_ms();
        store.write_data_points(&[
            DataPointInput::new("T.SHORT", now - 2 * 3_600_000, TagValue::Float(1.0)),
            DataPointInput::new("T.SHORT", now - 90 * 60_000, TagValue::Float(2.0)),
            DataPointInput::new("T.SHORT", now - 60_000, TagValue::Float(3.0)),
        ]);
        assert_eq!(store.total_data_points(), 3);

        let removed = store.cleanup_expired_data();
        assert_eq!(removed, 2);
        assert_eq!(store.total_data_points(), 1);

        // Idempotent at steady state
        assert_eq!(store.cleanup_expired_data(), 0);
    }

    #[test]
    fn test_cleanup_with_extreme_retention() {
        let mut registry = TagRegistry::new();
        let mut config = TagConfig::new("T.KEEP", TagDataType::Float);
        config.retention_hours = Some(i64::MAX);
        registry.create_tag(config).unwrap();
        let mut store = TimeSeriesStore::new(StoreConfig::default(), registry);

        store.write_single_data_point(float_point("T.KEEP", 0, 1.0));

        // The cutoff saturates instead of overflowing; nothing is purged.
        assert_eq!(store.cleanup_expired_data(), 0);
        assert_eq!(store.total_data_points(), 1);
    }

    #[test]
    fn test_clear_is_idempotent() {
        let mut store = store_with_tag("T.1");
        store.write_single_data_point(float_point("T.1", 0, 1.0));

        store.clear();
        assert_eq!(store.total_data_points(), 0);
        store.clear();
        assert_eq!(store.total_data_points(), 0);

        // Registry is untouched by clear()
        assert_eq!(store.registry().tag_count(), 1);
    }

    #[test]
    fn test_delete_tag_purges_data() {
        let mut store = store_with_tag("T.1");
        store.write_single_data_point(float_point("T.1", 0, 1.0));

        store.delete_tag("T.1").unwrap();
        assert_eq!(store.total_data_points(), 0);
        assert!(store.registry().get_tag("T.1").is_err());
        assert!(store.delete_tag("T.1").is_err());
    }

    #[test]
    fn test_lab_tags_bucket_by_day() {
        let mut registry = TagRegistry::new();
        let mut config = TagConfig::new("LAB.PH", TagDataType::Float);
        config.storage_type = Some(crate::tag::StorageType::Lab);
        registry.create_tag(config).unwrap();
        let mut store = TimeSeriesStore::new(StoreConfig::default(), registry);

        // Two points 20 hours apart share one day bucket
        store.write_data_points(&[
            DataPointInput::new("LAB.PH", BASE_TS, TagValue::Float(7.0)),
            DataPointInput::new("LAB.PH", BASE_TS + 20 * 3_600_000, TagValue::Float(7.2)),
        ]);
        let index = store.indices.get("LAB.PH").unwrap();
        assert_eq!(index.interval, BucketInterval::Day);
    }

    fn compressed_store(
        name: &str,
        compression: CompressionType,
        deviation: f64,
    ) -> TimeSeriesStore {
        let mut registry = TagRegistry::new();
        let mut config = TagConfig::new(name, TagDataType::Float);
        config.compression_type = Some(compression);
        config.compression_deviation = Some(deviation);
        registry.create_tag(config).unwrap();
        TimeSeriesStore::new(StoreConfig::default(), registry)
    }

    #[test]
    fn test_compression_type_switch_rebuilds_filter() {
        let mut store = compressed_store("T.1", CompressionType::SwingingDoor, 0.05);
        store.write_data_points(&[
            float_point("T.1", 0, 0.0),
            float_point("T.1", 1_000, 10.0),
            float_point("T.1", 2_000, 20.0),
        ]);

        store
            .registry_mut()
            .update_tag(
                "T.1",
                crate::tag::TagUpdate {
                    compression_type: Some(CompressionType::Boxcar),
                    ..Default::default()
                },
            )
            .unwrap();

        // The first point after the switch seeds a fresh boxcar anchor; the
        // next point is far outside the deadband, so neither may be elided.
        store.write_single_data_point(float_point("T.1", 3_000, 30.0));
        store.write_single_data_point(float_point("T.1", 4_000, 40.0));

        let recent = store.recent_data_points("T.1", 10).unwrap();
        let timestamps: Vec<i64> = recent.iter().map(|p| p.timestamp).collect();
        assert_eq!(
            timestamps,
            vec![
                BASE_TS + 4_000,
                BASE_TS + 3_000,
                BASE_TS + 2_000,
                BASE_TS
            ]
        );
    }

    #[test]
    fn test_deviation_change_rebuilds_filter() {
        let mut store = compressed_store("T.1", CompressionType::SwingingDoor, 0.1);
        store.write_data_points(&[
            float_point("T.1", 0, 10.0),
            float_point("T.1", 1_000, 10.0),
        ]);

        store
            .registry_mut()
            .update_tag(
                "T.1",
                crate::tag::TagUpdate {
                    compression_deviation: Some(0.2),
                    ..Default::default()
                },
            )
            .unwrap();

        // A stale filter would elide the point at +1s on this flat signal;
        // the rebuilt filter archives the next point as a fresh anchor.
        store.write_single_data_point(float_point("T.1", 2_000, 10.0));
        assert_eq!(store.total_data_points(), 3);
    }
}

//! Aggregation functions and precomputed aggregate records.
//!
//! An aggregation is a scalar summary computed over a tag's points within a
//! time range. NaN values are filtered out before aggregation; an empty or
//! all-NaN input yields NaN (the store's public API reports "no data" as a
//! typed error before this layer is reached).

use serde::{Deserialize, Serialize};

use crate::bucket::BucketInterval;

/// Scalar summary function over a set of numeric values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AggregationType {
    /// Arithmetic mean of all non-NaN values.
    Average,
    /// Minimum of all non-NaN values.
    Minimum,
    /// Maximum of all non-NaN values.
    Maximum,
    /// Sum of all non-NaN values.
    Sum,
    /// Count of non-NaN values.
    Count,
    /// Population standard deviation of all non-NaN values.
    StandardDeviation,
    /// Maximum minus minimum of all non-NaN values.
    Range,
}

impl AggregationType {
    /// All aggregation types. Used by pre-aggregation.
    pub const ALL: [Self; 7] = [
        Self::Average,
        Self::Minimum,
        Self::Maximum,
        Self::Sum,
        Self::Count,
        Self::StandardDeviation,
        Self::Range,
    ];

    /// Applies this aggregation to a slice of values.
    ///
    /// NaN values are filtered out first. If no valid values remain, returns
    /// NaN.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use historian::aggregate::AggregationType;
    ///
    /// let values = [10.0, 20.0, 30.0, 40.0, 50.0];
    ///
    /// assert_eq!(AggregationType::Average.apply(&values), 30.0);
    /// assert_eq!(AggregationType::Minimum.apply(&values), 10.0);
    /// assert_eq!(AggregationType::Maximum.apply(&values), 50.0);
    /// assert_eq!(AggregationType::Sum.apply(&values), 150.0);
    /// assert_eq!(AggregationType::Count.apply(&values), 5.0);
    /// assert_eq!(AggregationType::Range.apply(&values), 40.0);
    /// ```
    #[allow(clippy::cast_precision_loss)] // Acceptable for aggregate outputs
    pub fn apply(self, values: &[f64]) -> f64 {
        let valid: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();

        if valid.is_empty() {
            return f64::NAN;
        }

        match self {
            Self::Average => valid.iter().sum::<f64>() / valid.len() as f64,
            Self::Minimum => valid.iter().fold(f64::INFINITY, |acc, &v| acc.min(v)),
            Self::Maximum => valid.iter().fold(f64::NEG_INFINITY, |acc, &v| acc.max(v)),
            Self::Sum => valid.iter().sum(),
            Self::Count => valid.len() as f64,
            Self::StandardDeviation => {
                let mean = valid.iter().sum::<f64>() / valid.len() as f64;
                let variance = valid
                    .iter()
                    .map(|v| {
                        let d = v - mean;
                        d * d
                    })
                    .sum::<f64>()
                    / valid.len() as f64;
                variance.sqrt()
            }
            Self::Range => {
                let min = valid.iter().fold(f64::INFINITY, |acc, &v| acc.min(v));
                let max = valid.iter().fold(f64::NEG_INFINITY, |acc, &v| acc.max(v));
                max - min
            }
        }
    }
}

/// A precomputed scalar summary over one tag's current window.
///
/// When pre-aggregation is enabled, the store keeps one entry per
/// (interval, aggregation type) pair for each tag and regenerates the entries
/// covering the window each new point lands in.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregatedData {
    /// The owning tag.
    pub tag_name: String,
    /// The summary function.
    pub aggregation_type: AggregationType,
    /// The bucketing interval defining the window.
    pub interval: BucketInterval,
    /// Window start, milliseconds since the Unix epoch (inclusive).
    pub window_start: i64,
    /// Window end (exclusive).
    pub window_end: i64,
    /// The aggregated value.
    pub value: f64,
    /// Number of points in the window.
    pub count: usize,
    /// Mean quality across the window's points.
    pub avg_quality: f64,
}

/// Result of an on-demand aggregation over an explicit time range.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregationResult {
    /// The aggregated tag.
    pub tag_name: String,
    /// The summary function that was applied.
    pub aggregation_type: AggregationType,
    /// Requested range start (inclusive).
    pub start_time: i64,
    /// Requested range end (inclusive).
    pub end_time: i64,
    /// The aggregated value.
    pub value: f64,
    /// Number of points that entered the calculation.
    pub count: usize,
    /// Mean quality of those points.
    pub avg_quality: f64,
}

//! Error types for the historian time-series engine.

use thiserror::Error;

use crate::tag::TagDataType;

/// The main error type for all historian operations.
///
/// This enum covers all error conditions that can occur across the engine,
/// from tag registration through writes, queries, and aggregation.
#[derive(Error, Debug)]
pub enum HistorianError {
    /// Error from the tag registry (validation, lookup, update).
    #[error("registry error: {0}")]
    Registry(#[from] RegistryError),

    /// Error during a write operation.
    #[error("write error: {0}")]
    Write(#[from] WriteError),

    /// Error during a query operation.
    #[error("query error: {0}")]
    Query(#[from] QueryError),

    /// Error during an aggregation calculation.
    #[error("aggregation error: {0}")]
    Aggregation(#[from] AggregationError),
}

/// Errors produced by the tag registry.
///
/// Registry failures are returned as values so batch helpers such as
/// [`bulk_create_tags`](crate::registry::TagRegistry::bulk_create_tags) can
/// continue past individual failures and report a created/failed split.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RegistryError {
    /// A tag with this name is already registered.
    #[error("Tag name already exists: '{name}'")]
    NameExists {
        /// The conflicting tag name.
        name: String,
    },

    /// No tag with this name is registered.
    #[error("Tag not found: '{name}'")]
    TagNotFound {
        /// The name that was looked up.
        name: String,
    },

    /// The tag name is empty.
    #[error("tag name cannot be empty")]
    EmptyName,

    /// No data type was provided for a new tag.
    #[error("tag '{name}' has no data type")]
    MissingDataType {
        /// The tag being created.
        name: String,
    },

    /// The tag name exceeds the maximum length.
    #[error("tag name is {length} characters (max {max})")]
    NameTooLong {
        /// The actual name length.
        length: usize,
        /// The maximum allowed length.
        max: usize,
    },

    /// The tag name contains a forbidden character.
    #[error("tag name '{name}' contains forbidden character '{character}'")]
    ForbiddenNameCharacter {
        /// The offending name.
        name: String,
        /// The forbidden character that was found.
        character: char,
    },

    /// Deviation-based compression was requested for a non-numeric tag.
    #[error("Compression not supported for {data_type} data type")]
    CompressionUnsupported {
        /// The non-numeric data type.
        data_type: TagDataType,
    },

    /// The compression deviation is outside [0, 1].
    #[error("compression deviation {value} is outside [0, 1]")]
    InvalidDeviation {
        /// The rejected deviation.
        value: f64,
    },

    /// The retention period is not positive.
    #[error("retention hours must be > 0, got {hours}")]
    InvalidRetention {
        /// The rejected retention value.
        hours: i64,
    },

    /// A quality field is outside [0, 100].
    #[error("{field} must be in [0, 100], got {value}")]
    InvalidQuality {
        /// Which quality field was invalid.
        field: &'static str,
        /// The rejected value.
        value: i64,
    },

    /// `min_value` is not strictly below `max_value`.
    #[error("min_value ({min}) must be < max_value ({max})")]
    InvalidValueRange {
        /// The configured minimum.
        min: f64,
        /// The configured maximum.
        max: f64,
    },

    /// A value range was configured for a non-numeric tag.
    #[error("value range is not applicable to {data_type} data type")]
    RangeNotNumeric {
        /// The non-numeric data type.
        data_type: TagDataType,
    },

    /// An update attempted to modify an immutable field.
    #[error("Cannot update immutable field: {field}")]
    ImmutableField {
        /// The immutable field that was targeted.
        field: &'static str,
    },

    /// A search pattern could not be compiled.
    #[error("invalid search pattern '{pattern}': {reason}")]
    InvalidSearchPattern {
        /// The pattern as provided by the caller.
        pattern: String,
        /// Why compilation failed.
        reason: String,
    },
}

/// Machine-readable classification of a write failure.
///
/// Every [`WriteError`] maps to exactly one code. The codes mirror the
/// historian's write-path taxonomy and serialize as SCREAMING_SNAKE_CASE.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WriteErrorCode {
    /// The tag is not registered.
    TagNotFound,
    /// The tag exists but is marked inactive.
    TagInactive,
    /// The timestamp is not a valid instant.
    InvalidTimestamp,
    /// The quality score is outside [0, 100].
    QualityTooLow,
    /// The value could not be coerced to the tag's data type.
    InvalidValue,
    /// The value is outside the tag's configured min/max range.
    ValueOutOfRange,
    /// The store has reached `max_data_points`.
    StorageFull,
    /// A point already exists for this tag at this timestamp.
    DuplicateTimestamp,
}

/// Errors that can occur when writing a single data point.
///
/// Batch writes never abort on one of these; each failure is recorded in the
/// batch result's error list while the remaining points are still committed.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum WriteError {
    /// The tag is not registered.
    #[error("tag '{tag_name}' not found")]
    TagNotFound {
        /// The unresolved tag name.
        tag_name: String,
    },

    /// The tag exists but is inactive.
    #[error("tag '{tag_name}' is inactive")]
    TagInactive {
        /// The inactive tag name.
        tag_name: String,
    },

    /// The timestamp is not a valid instant.
    #[error("invalid timestamp {timestamp} for tag '{tag_name}'")]
    InvalidTimestamp {
        /// The tag being written.
        tag_name: String,
        /// The rejected timestamp (milliseconds since epoch).
        timestamp: i64,
    },

    /// The quality score is outside [0, 100].
    #[error("quality {quality} for tag '{tag_name}' is outside [0, 100]")]
    QualityTooLow {
        /// The tag being written.
        tag_name: String,
        /// The rejected quality score.
        quality: i32,
    },

    /// The value could not be coerced to the tag's declared data type.
    #[error("invalid value for tag '{tag_name}': {reason}")]
    InvalidValue {
        /// The tag being written.
        tag_name: String,
        /// Why coercion failed.
        reason: String,
    },

    /// The value is outside the tag's configured min/max range.
    #[error("value {value} for tag '{tag_name}' is outside configured range")]
    ValueOutOfRange {
        /// The tag being written.
        tag_name: String,
        /// The out-of-range value.
        value: f64,
    },

    /// The store has reached its configured capacity.
    #[error("storage full: {max_data_points} data points reached")]
    StorageFull {
        /// The configured capacity that was hit.
        max_data_points: usize,
    },

    /// A point already exists for this tag at this exact timestamp.
    #[error("duplicate timestamp {timestamp} for tag '{tag_name}'")]
    DuplicateTimestamp {
        /// The tag being written.
        tag_name: String,
        /// The duplicated timestamp.
        timestamp: i64,
    },
}

impl WriteError {
    /// Returns the machine-readable code for this failure.
    pub fn code(&self) -> WriteErrorCode {
        match self {
            Self::TagNotFound { .. } => WriteErrorCode::TagNotFound,
            Self::TagInactive { .. } => WriteErrorCode::TagInactive,
            Self::InvalidTimestamp { .. } => WriteErrorCode::InvalidTimestamp,
            Self::QualityTooLow { .. } => WriteErrorCode::QualityTooLow,
            Self::InvalidValue { .. } => WriteErrorCode::InvalidValue,
            Self::ValueOutOfRange { .. } => WriteErrorCode::ValueOutOfRange,
            Self::StorageFull { .. } => WriteErrorCode::StorageFull,
            Self::DuplicateTimestamp { .. } => WriteErrorCode::DuplicateTimestamp,
        }
    }
}

/// Errors that can occur during query operations (read path).
#[derive(Error, Debug, Clone, PartialEq)]
pub enum QueryError {
    /// None of the requested tag names resolved via the registry.
    #[error("No valid tags found")]
    NoValidTags,

    /// The time range is invalid (start > end).
    #[error("invalid time range: start {start} > end {end}")]
    InvalidTimeRange {
        /// The start time.
        start: i64,
        /// The end time.
        end: i64,
    },

    /// The requested tag is not registered.
    #[error("tag '{name}' not found")]
    UnknownTag {
        /// The unresolved tag name.
        name: String,
    },
}

/// Errors that can occur during aggregation calculations.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AggregationError {
    /// The requested range contains zero points.
    #[error("No data points found for aggregation")]
    NoDataPoints,

    /// The requested tag is not registered.
    #[error("tag '{name}' not found")]
    UnknownTag {
        /// The unresolved tag name.
        name: String,
    },

    /// The time range is invalid (start > end).
    #[error("invalid time range: start {start} > end {end}")]
    InvalidTimeRange {
        /// The start time.
        start: i64,
        /// The end time.
        end: i64,
    },

    /// The tag's data type has no numeric representation to aggregate.
    #[error("tag '{name}' has non-numeric data type {data_type}")]
    NonNumericTag {
        /// The tag name.
        name: String,
        /// The tag's data type.
        data_type: TagDataType,
    },
}

/// Type alias for `Result<T, HistorianError>`.
pub type Result<T> = std::result::Result<T, HistorianError>;

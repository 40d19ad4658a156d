//! Tag model for the historian engine.
//!
//! A tag is a named time-series channel with a declared data type,
//! engineering units, and storage/compression policy. This module defines the
//! tag record itself, the creation/update inputs consumed by the registry,
//! the typed value carried by every data point, and the data point record.
//!
//! Tag metadata is owned by the [`TagRegistry`](crate::registry::TagRegistry);
//! the types here are plain records with validation hooks.

use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

/// Maximum tag name length in characters.
pub const MAX_TAG_NAME_LEN: usize = 255;

/// Characters that may not appear in a tag name.
pub const FORBIDDEN_NAME_CHARS: &[char] = &['<', '>', ':', '"', '/', '\\', '|', '?', '*'];

/// Declared data type of a tag's values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TagDataType {
    /// 64-bit floating point process values.
    Float,
    /// 64-bit signed integer values (counters, states).
    Integer,
    /// Free-form text values (batch IDs, operator notes).
    Text,
    /// Boolean values (valve open/closed, running/stopped).
    Boolean,
    /// Timestamp values, stored as milliseconds since the Unix epoch.
    DateTime,
}

impl TagDataType {
    /// Returns `true` for types with a numeric representation.
    ///
    /// Only numeric tags support deviation-based compression and min/max
    /// range limits.
    pub fn is_numeric(self) -> bool {
        matches!(self, Self::Float | Self::Integer)
    }
}

impl fmt::Display for TagDataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Float => "Float",
            Self::Integer => "Integer",
            Self::Text => "Text",
            Self::Boolean => "Boolean",
            Self::DateTime => "DateTime",
        };
        f.write_str(name)
    }
}

/// Compression policy applied to a tag's write path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum CompressionType {
    /// Every accepted point is archived unmodified.
    #[default]
    None,
    /// Swinging-door trending: a point is archived only when linear
    /// interpolation from the last archived point can no longer predict the
    /// buffered candidates within the configured deviation.
    SwingingDoor,
    /// Boxcar deadband: a point is archived only when it deviates from the
    /// last archived value by more than the configured deviation.
    Boxcar,
}

impl CompressionType {
    /// Returns `true` for deviation-based policies.
    pub fn is_deviation_based(self) -> bool {
        matches!(self, Self::SwingingDoor | Self::Boxcar)
    }
}

/// Storage class of a tag.
///
/// Lab tags carry low-frequency laboratory samples and are bucketed by day;
/// normal process tags are bucketed by hour.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum StorageType {
    /// Regular process instrumentation data.
    #[default]
    Normal,
    /// Laboratory analysis results.
    Lab,
}

/// A typed value carried by a data point.
///
/// The runtime variant must be coercible to the owning tag's declared
/// [`TagDataType`]; coercion happens on the write path before a point is
/// accepted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TagValue {
    /// A floating point value.
    Float(f64),
    /// An integer value.
    Integer(i64),
    /// A text value.
    Text(String),
    /// A boolean value.
    Boolean(bool),
    /// A timestamp value in milliseconds since the Unix epoch.
    Timestamp(i64),
}

impl TagValue {
    /// Returns the variant name for diagnostics.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Float(_) => "Float",
            Self::Integer(_) => "Integer",
            Self::Text(_) => "Text",
            Self::Boolean(_) => "Boolean",
            Self::Timestamp(_) => "Timestamp",
        }
    }

    /// Returns the numeric representation of this value, if it has one.
    ///
    /// Booleans map to 0.0/1.0 and timestamps to their millisecond value so
    /// they can participate in aggregation. Text has no numeric form.
    #[allow(clippy::cast_precision_loss)] // Acceptable for aggregation inputs
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Float(v) => Some(*v),
            Self::Integer(v) => Some(*v as f64),
            Self::Boolean(v) => Some(if *v { 1.0 } else { 0.0 }),
            Self::Timestamp(v) => Some(*v as f64),
            Self::Text(_) => None,
        }
    }

    /// Coerces this value to the given declared data type.
    ///
    /// Integers widen losslessly to Float. A Float coerces to Integer only
    /// when it is finite, fractionless, and in range. All other cross-type
    /// coercions are rejected.
    ///
    /// # Errors
    ///
    /// Returns a human-readable reason when the value cannot represent the
    /// declared type.
    #[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation)]
    pub fn coerce_to(self, data_type: TagDataType) -> std::result::Result<Self, String> {
        match (data_type, self) {
            (TagDataType::Float, Self::Float(v)) => {
                if v.is_finite() {
                    Ok(Self::Float(v))
                } else {
                    Err(format!("non-finite float value {v}"))
                }
            }
            (TagDataType::Float, Self::Integer(v)) => Ok(Self::Float(v as f64)),
            (TagDataType::Integer, Self::Integer(v)) => Ok(Self::Integer(v)),
            (TagDataType::Integer, Self::Float(v)) => {
                if v.is_finite() && v.fract() == 0.0 && v >= i64::MIN as f64 && v <= i64::MAX as f64
                {
                    Ok(Self::Integer(v as i64))
                } else {
                    Err(format!("float value {v} is not an integer"))
                }
            }
            (TagDataType::Text, Self::Text(v)) => Ok(Self::Text(v)),
            (TagDataType::Boolean, Self::Boolean(v)) => Ok(Self::Boolean(v)),
            (TagDataType::DateTime, Self::Timestamp(v)) => Ok(Self::Timestamp(v)),
            (expected, got) => Err(format!(
                "cannot coerce {} value to {expected} data type",
                got.type_name()
            )),
        }
    }
}

/// A registered tag: the full metadata record for one time-series channel.
///
/// `id`, `name`, `created_at`, and `created_by` are immutable after creation;
/// all other fields can change through
/// [`update_tag`](crate::registry::TagRegistry::update_tag), which bumps
/// `updated_at`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tag {
    /// Registry-assigned identifier, unique for the registry's lifetime.
    pub id: u64,
    /// Globally unique, case-sensitive tag name.
    pub name: String,
    /// Free-form description, searchable alongside the name.
    pub description: String,
    /// Declared data type of the tag's values.
    pub data_type: TagDataType,
    /// Engineering units label (e.g. "°C", "bar", "rpm").
    pub engineering_units: String,
    /// Source system label for the collector feeding this tag.
    pub collector: String,
    /// Lower bound for numeric values, when configured.
    pub min_value: Option<f64>,
    /// Upper bound for numeric values, when configured.
    pub max_value: Option<f64>,
    /// Compression policy for the write path.
    pub compression_type: CompressionType,
    /// Deviation tolerance for deviation-based compression, in [0, 1].
    pub compression_deviation: f64,
    /// Storage class determining the bucketing interval.
    pub storage_type: StorageType,
    /// Maximum age in hours before points become eligible for purge.
    pub retention_hours: i64,
    /// Quality assigned to points written without an explicit score.
    pub default_quality: u8,
    /// Quality below which accepted points are flagged with a warning.
    pub quality_threshold: u8,
    /// Whether the tag accepts writes.
    pub is_active: bool,
    /// Creation instant, milliseconds since the Unix epoch.
    pub created_at: i64,
    /// Last update instant, milliseconds since the Unix epoch.
    pub updated_at: i64,
    /// Who or what created the tag.
    pub created_by: String,
}

/// Input record for creating a tag.
///
/// Only `name` and `data_type` are required; unset fields receive the
/// historian defaults when the registry accepts the config.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TagConfig {
    /// The tag name (required, unique, case-sensitive).
    pub name: String,
    /// The declared data type (required).
    pub data_type: Option<TagDataType>,
    /// Free-form description.
    pub description: Option<String>,
    /// Engineering units label. Default: empty.
    pub engineering_units: Option<String>,
    /// Source system label.
    pub collector: Option<String>,
    /// Lower numeric bound.
    pub min_value: Option<f64>,
    /// Upper numeric bound.
    pub max_value: Option<f64>,
    /// Compression policy. Default: [`CompressionType::None`].
    pub compression_type: Option<CompressionType>,
    /// Deviation tolerance in [0, 1]. Default: 0.
    pub compression_deviation: Option<f64>,
    /// Storage class. Default: [`StorageType::Normal`].
    pub storage_type: Option<StorageType>,
    /// Retention in hours. Default: 24.
    pub retention_hours: Option<i64>,
    /// Default quality score. Default: 100.
    pub default_quality: Option<i64>,
    /// Quality warning threshold. Default: 50.
    pub quality_threshold: Option<i64>,
    /// Whether the tag starts active. Default: true.
    pub is_active: Option<bool>,
    /// Who or what is creating the tag.
    pub created_by: Option<String>,
}

impl TagConfig {
    /// Creates a config with the two required fields set.
    pub fn new(name: impl Into<String>, data_type: TagDataType) -> Self {
        Self {
            name: name.into(),
            data_type: Some(data_type),
            ..Self::default()
        }
    }
}

/// Partial update record for [`update_tag`](crate::registry::TagRegistry::update_tag).
///
/// The immutable identity fields are present so that an attempt to set them
/// can be rejected explicitly rather than silently ignored.
///
/// `None` always means "leave as-is": optional fields such as the numeric
/// bounds can be replaced through an update but not cleared back to unset.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TagUpdate {
    /// Immutable; any `Some` value is rejected.
    pub id: Option<u64>,
    /// Immutable; any `Some` value is rejected.
    pub name: Option<String>,
    /// Immutable; any `Some` value is rejected.
    pub created_at: Option<i64>,
    /// Immutable; any `Some` value is rejected.
    pub created_by: Option<String>,
    /// New description.
    pub description: Option<String>,
    /// New engineering units label.
    pub engineering_units: Option<String>,
    /// New collector label.
    pub collector: Option<String>,
    /// New lower numeric bound; replaces but never clears an existing bound.
    pub min_value: Option<f64>,
    /// New upper numeric bound; replaces but never clears an existing bound.
    pub max_value: Option<f64>,
    /// New compression policy.
    pub compression_type: Option<CompressionType>,
    /// New deviation tolerance.
    pub compression_deviation: Option<f64>,
    /// New storage class.
    pub storage_type: Option<StorageType>,
    /// New retention in hours.
    pub retention_hours: Option<i64>,
    /// New default quality score.
    pub default_quality: Option<i64>,
    /// New quality warning threshold.
    pub quality_threshold: Option<i64>,
    /// New active flag.
    pub is_active: Option<bool>,
}

/// A single accepted measurement.
///
/// Data points are immutable once accepted; they are only created by the
/// write path and destroyed by retention purge, compression elision,
/// `clear()`, or tag purge-on-delete.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataPoint {
    /// Name of the owning tag.
    pub tag_name: String,
    /// Timestamp in milliseconds since the Unix epoch.
    pub timestamp: i64,
    /// The typed value, already coerced to the tag's data type.
    pub value: TagValue,
    /// Validity/confidence score in [0, 100].
    pub quality: u8,
    /// Optional source annotation (e.g. a collector node name).
    pub source: Option<String>,
}

/// Input record for the write path.
///
/// Unlike [`DataPoint`], the value is not yet coerced and the quality is an
/// open integer so out-of-range scores can be rejected with a typed error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataPointInput {
    /// Name of the target tag.
    pub tag_name: String,
    /// Timestamp in milliseconds since the Unix epoch.
    pub timestamp: i64,
    /// The raw value to coerce and store.
    pub value: TagValue,
    /// Quality score; `None` uses the tag's `default_quality`.
    pub quality: Option<i32>,
    /// Optional source annotation.
    pub source: Option<String>,
}

impl DataPointInput {
    /// Creates an input with default quality and no source.
    pub fn new(tag_name: impl Into<String>, timestamp: i64, value: TagValue) -> Self {
        Self {
            tag_name: tag_name.into(),
            timestamp,
            value,
            quality: None,
            source: None,
        }
    }

    /// Sets an explicit quality score.
    #[must_use]
    pub fn with_quality(mut self, quality: i32) -> Self {
        self.quality = Some(quality);
        self
    }

    /// Sets a source annotation.
    #[must_use]
    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }
}

/// Returns the current wall-clock time in milliseconds since the Unix epoch.
///
/// Clocks before the epoch collapse to 0, which the write path rejects.
#[allow(clippy::cast_possible_truncation)] // Millis since 1970 fit in i64 for ~292M years
pub fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

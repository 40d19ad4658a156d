//! Tag registry: the schema/metadata authority for time-series channels.
//!
//! The registry owns the catalog of [`Tag`] definitions, their validation
//! rules, and their defaults. The [`TimeSeriesStore`](crate::store::TimeSeriesStore)
//! resolves every write against it; business services manage tag lifecycle
//! through it.
//!
//! # Validation model
//!
//! Validation failures are returned as [`RegistryError`] values with
//! human-readable messages, never panics. [`bulk_create_tags`] relies on this
//! to attempt every config independently and report a created/failed split.
//!
//! # Example
//!
//! ```rust
//! use historian::registry::TagRegistry;
//! use historian::tag::{TagConfig, TagDataType};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let mut registry = TagRegistry::new();
//!
//! let tag = registry.create_tag(TagConfig::new("REACTOR1.TEMP", TagDataType::Float))?;
//! assert_eq!(tag.retention_hours, 24); // historian default
//!
//! // Lookups are exact and case-sensitive
//! assert!(registry.get_tag("REACTOR1.TEMP").is_ok());
//! assert!(registry.get_tag("reactor1.temp").is_err());
//! # Ok(())
//! # }
//! ```
//!
//! [`bulk_create_tags`]: TagRegistry::bulk_create_tags

use std::collections::{BTreeMap, HashMap};

use regex::RegexBuilder;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{RegistryError, Result};
use crate::tag::{
    CompressionType, FORBIDDEN_NAME_CHARS, MAX_TAG_NAME_LEN, StorageType, Tag, TagConfig,
    TagDataType, TagUpdate, now_ms,
};

/// Filter for [`TagRegistry::get_all_tags`].
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TagFilter {
    /// When true, only active tags are returned.
    pub active_only: bool,
    /// When set, only tags fed by this collector are returned.
    pub collector: Option<String>,
    /// When set, only tags of this data type are returned.
    pub data_type: Option<TagDataType>,
}

/// Registry-level health summary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegistryHealth {
    /// Total number of registered tags.
    pub total_tags: usize,
    /// Number of active tags.
    pub active_tags: usize,
    /// Number of inactive tags.
    pub inactive_tags: usize,
    /// Tag counts keyed by data type name.
    pub by_data_type: BTreeMap<String, usize>,
    /// Tag counts keyed by collector label.
    pub by_collector: BTreeMap<String, usize>,
}

/// One failed config from a bulk create.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BulkCreateFailure {
    /// The name from the failed config.
    pub name: String,
    /// The validation failure message.
    pub error: String,
}

/// Outcome of [`TagRegistry::bulk_create_tags`].
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct BulkCreateResult {
    /// Tags that were created.
    pub created: Vec<Tag>,
    /// Configs that failed, with per-item error messages.
    pub failed: Vec<BulkCreateFailure>,
}

/// Authoritative catalog of tag definitions.
///
/// # Thread Safety
///
/// The registry is designed for single-threaded access patterns. External
/// synchronization must be provided if used across multiple threads.
#[derive(Debug, Default)]
pub struct TagRegistry {
    tags: HashMap<String, Tag>,
    next_id: u64,
}

impl TagRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self {
            tags: HashMap::new(),
            next_id: 1,
        }
    }

    /// Creates a tag from a config, applying historian defaults to unset
    /// optional fields.
    ///
    /// # Errors
    ///
    /// - [`RegistryError::NameExists`] for a duplicate name
    /// - [`RegistryError::EmptyName`] / [`RegistryError::NameTooLong`] /
    ///   [`RegistryError::ForbiddenNameCharacter`] for invalid names
    /// - [`RegistryError::MissingDataType`] when no data type is given
    /// - [`RegistryError::CompressionUnsupported`] for deviation compression
    ///   on non-numeric tags
    /// - [`RegistryError::InvalidDeviation`] / [`RegistryError::InvalidRetention`] /
    ///   [`RegistryError::InvalidQuality`] / [`RegistryError::InvalidValueRange`] /
    ///   [`RegistryError::RangeNotNumeric`] for out-of-range policy fields
    pub fn create_tag(&mut self, config: TagConfig) -> Result<Tag> {
        validate_name(&config.name)?;

        if self.tags.contains_key(&config.name) {
            return Err(RegistryError::NameExists { name: config.name }.into());
        }

        let data_type = config.data_type.ok_or_else(|| RegistryError::MissingDataType {
            name: config.name.clone(),
        })?;

        let default_quality = resolve_quality("default_quality", config.default_quality, 100)?;
        let quality_threshold =
            resolve_quality("quality_threshold", config.quality_threshold, 50)?;

        let now = now_ms();
        let tag = Tag {
            id: self.next_id,
            name: config.name,
            description: config.description.unwrap_or_default(),
            data_type,
            engineering_units: config.engineering_units.unwrap_or_default(),
            collector: config.collector.unwrap_or_default(),
            min_value: config.min_value,
            max_value: config.max_value,
            compression_type: config.compression_type.unwrap_or_default(),
            compression_deviation: config.compression_deviation.unwrap_or(0.0),
            storage_type: config.storage_type.unwrap_or_default(),
            retention_hours: config.retention_hours.unwrap_or(24),
            default_quality,
            quality_threshold,
            is_active: config.is_active.unwrap_or(true),
            created_at: now,
            updated_at: now,
            created_by: config.created_by.unwrap_or_default(),
        };

        validate_policy(&tag)?;

        self.next_id += 1;
        debug!(tag = %tag.name, data_type = %tag.data_type, "tag created");
        self.tags.insert(tag.name.clone(), tag.clone());
        Ok(tag)
    }

    /// Looks up a tag by exact, case-sensitive name.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::TagNotFound`] when the name is absent.
    pub fn get_tag(&self, name: &str) -> Result<&Tag> {
        self.tags.get(name).ok_or_else(|| {
            RegistryError::TagNotFound {
                name: name.to_string(),
            }
            .into()
        })
    }

    /// Non-failing lookup for the write path.
    pub fn get(&self, name: &str) -> Option<&Tag> {
        self.tags.get(name)
    }

    /// Returns all tags matching the filter, sorted by name.
    ///
    /// An empty filter returns every tag; no match returns an empty list.
    pub fn get_all_tags(&self, filter: &TagFilter) -> Vec<&Tag> {
        let mut tags: Vec<&Tag> = self
            .tags
            .values()
            .filter(|tag| {
                if filter.active_only && !tag.is_active {
                    return false;
                }
                if let Some(collector) = &filter.collector
                    && tag.collector != *collector
                {
                    return false;
                }
                if let Some(data_type) = filter.data_type
                    && tag.data_type != data_type
                {
                    return false;
                }
                true
            })
            .collect();
        tags.sort_by(|a, b| a.name.cmp(&b.name));
        tags
    }

    /// Applies a partial update to a tag, re-running all create-level
    /// validations against the merged record and bumping `updated_at`.
    ///
    /// # Errors
    ///
    /// - [`RegistryError::TagNotFound`] when the name is absent
    /// - [`RegistryError::ImmutableField`] when the update targets `id`,
    ///   `name`, `created_at`, or `created_by`
    /// - Any create-level validation error against the merged record
    pub fn update_tag(&mut self, name: &str, update: TagUpdate) -> Result<Tag> {
        if update.id.is_some() {
            return Err(RegistryError::ImmutableField { field: "id" }.into());
        }
        if update.name.is_some() {
            return Err(RegistryError::ImmutableField { field: "name" }.into());
        }
        if update.created_at.is_some() {
            return Err(RegistryError::ImmutableField { field: "created_at" }.into());
        }
        if update.created_by.is_some() {
            return Err(RegistryError::ImmutableField { field: "created_by" }.into());
        }

        let existing = self.tags.get(name).ok_or_else(|| RegistryError::TagNotFound {
            name: name.to_string(),
        })?;

        let mut merged = existing.clone();
        if let Some(description) = update.description {
            merged.description = description;
        }
        if let Some(units) = update.engineering_units {
            merged.engineering_units = units;
        }
        if let Some(collector) = update.collector {
            merged.collector = collector;
        }
        if let Some(min) = update.min_value {
            merged.min_value = Some(min);
        }
        if let Some(max) = update.max_value {
            merged.max_value = Some(max);
        }
        if let Some(compression_type) = update.compression_type {
            merged.compression_type = compression_type;
        }
        if let Some(deviation) = update.compression_deviation {
            merged.compression_deviation = deviation;
        }
        if let Some(storage_type) = update.storage_type {
            merged.storage_type = storage_type;
        }
        if let Some(retention) = update.retention_hours {
            merged.retention_hours = retention;
        }
        if let Some(quality) = update.default_quality {
            merged.default_quality = resolve_quality("default_quality", Some(quality), 100)?;
        }
        if let Some(threshold) = update.quality_threshold {
            merged.quality_threshold = resolve_quality("quality_threshold", Some(threshold), 50)?;
        }
        if let Some(active) = update.is_active {
            merged.is_active = active;
        }

        validate_policy(&merged)?;
        merged.updated_at = now_ms().max(merged.updated_at + 1);

        self.tags.insert(name.to_string(), merged.clone());
        Ok(merged)
    }

    /// Removes a tag's registry entry and returns it.
    ///
    /// Stored data points are not touched; use
    /// [`TimeSeriesStore::delete_tag`](crate::store::TimeSeriesStore::delete_tag)
    /// for the documented purge-on-delete path.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::TagNotFound`] when the name is absent.
    pub fn delete_tag(&mut self, name: &str) -> Result<Tag> {
        let removed = self.tags.remove(name).ok_or_else(|| RegistryError::TagNotFound {
            name: name.to_string(),
        })?;
        debug!(tag = %removed.name, "tag deleted");
        Ok(removed)
    }

    /// Searches tags case-insensitively by name and description.
    ///
    /// The pattern is a literal substring, with `*` acting as a
    /// multi-character wildcard. Results are sorted by name and capped by
    /// `limit` when given.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::InvalidSearchPattern`] when the compiled
    /// expression is rejected (e.g. over the size limit).
    pub fn search_tags(&self, pattern: &str, limit: Option<usize>) -> Result<Vec<&Tag>> {
        // Escape everything except `*`, which becomes `.*`.
        let escaped = regex::escape(pattern).replace("\\*", ".*");
        let matcher = RegexBuilder::new(&escaped)
            .case_insensitive(true)
            .build()
            .map_err(|e| RegistryError::InvalidSearchPattern {
                pattern: pattern.to_string(),
                reason: e.to_string(),
            })?;

        let mut matches: Vec<&Tag> = self
            .tags
            .values()
            .filter(|tag| matcher.is_match(&tag.name) || matcher.is_match(&tag.description))
            .collect();
        matches.sort_by(|a, b| a.name.cmp(&b.name));
        if let Some(limit) = limit {
            matches.truncate(limit);
        }
        Ok(matches)
    }

    /// Returns the number of registered tags.
    pub fn tag_count(&self) -> usize {
        self.tags.len()
    }

    /// Returns totals and breakdowns for monitoring.
    pub fn health_status(&self) -> RegistryHealth {
        let mut by_data_type: BTreeMap<String, usize> = BTreeMap::new();
        let mut by_collector: BTreeMap<String, usize> = BTreeMap::new();
        let mut active = 0;

        for tag in self.tags.values() {
            if tag.is_active {
                active += 1;
            }
            *by_data_type.entry(tag.data_type.to_string()).or_default() += 1;
            *by_collector.entry(tag.collector.clone()).or_default() += 1;
        }

        RegistryHealth {
            total_tags: self.tags.len(),
            active_tags: active,
            inactive_tags: self.tags.len() - active,
            by_data_type,
            by_collector,
        }
    }

    /// Removes all tags.
    pub fn clear(&mut self) {
        self.tags.clear();
    }

    /// Attempts every config independently; one failure never blocks the
    /// others.
    pub fn bulk_create_tags(&mut self, configs: Vec<TagConfig>) -> BulkCreateResult {
        let mut result = BulkCreateResult::default();
        for config in configs {
            let name = config.name.clone();
            match self.create_tag(config) {
                Ok(tag) => result.created.push(tag),
                Err(error) => result.failed.push(BulkCreateFailure {
                    name,
                    error: error.to_string(),
                }),
            }
        }
        result
    }

    /// Iterates all registered tags in unspecified order.
    pub fn iter(&self) -> impl Iterator<Item = &Tag> {
        self.tags.values()
    }
}

/// Validates a tag name's presence, length, and charset.
fn validate_name(name: &str) -> std::result::Result<(), RegistryError> {
    if name.is_empty() {
        return Err(RegistryError::EmptyName);
    }
    let length = name.chars().count();
    if length > MAX_TAG_NAME_LEN {
        return Err(RegistryError::NameTooLong {
            length,
            max: MAX_TAG_NAME_LEN,
        });
    }
    if let Some(character) = name.chars().find(|c| FORBIDDEN_NAME_CHARS.contains(c)) {
        return Err(RegistryError::ForbiddenNameCharacter {
            name: name.to_string(),
            character,
        });
    }
    Ok(())
}

/// Validates the policy fields of a (new or merged) tag record.
fn validate_policy(tag: &Tag) -> std::result::Result<(), RegistryError> {
    if tag.compression_type.is_deviation_based() && !tag.data_type.is_numeric() {
        return Err(RegistryError::CompressionUnsupported {
            data_type: tag.data_type,
        });
    }
    if !(0.0..=1.0).contains(&tag.compression_deviation) {
        return Err(RegistryError::InvalidDeviation {
            value: tag.compression_deviation,
        });
    }
    if tag.retention_hours <= 0 {
        return Err(RegistryError::InvalidRetention {
            hours: tag.retention_hours,
        });
    }
    if (tag.min_value.is_some() || tag.max_value.is_some()) && !tag.data_type.is_numeric() {
        return Err(RegistryError::RangeNotNumeric {
            data_type: tag.data_type,
        });
    }
    if let (Some(min), Some(max)) = (tag.min_value, tag.max_value)
        && min >= max
    {
        return Err(RegistryError::InvalidValueRange { min, max });
    }
    Ok(())
}

/// Bounds-checks a quality field, applying the default when unset.
fn resolve_quality(
    field: &'static str,
    value: Option<i64>,
    default: u8,
) -> std::result::Result<u8, RegistryError> {
    match value {
        None => Ok(default),
        Some(v) if (0..=100).contains(&v) => {
            #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
            let quality = v as u8;
            Ok(quality)
        }
        Some(v) => Err(RegistryError::InvalidQuality { field, value: v }),
    }
}

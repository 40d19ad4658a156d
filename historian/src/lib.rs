//! # historian
//!
//! Tag-oriented, in-memory industrial historian.
//!
//! historian is a Rust library for ingesting, compressing, and querying
//! process data from industrial instrumentation. Every measurement belongs to
//! a named tag with a declared data type, engineering units, and
//! storage/compression policy; the engine validates writes against the tag's
//! policy, groups accepted points into fixed time buckets, and serves range
//! queries, aggregations, and retention sweeps over them.
//!
//! **Status**: This crate is in early development. The API is not yet stable.
//!
//! ## Key Properties
//!
//! - Tag registry as the single source of truth for metadata and policy
//! - Swinging-door and boxcar compression on the write path
//! - Time-bucketed storage with incrementally maintained rollups
//! - Per-point error reporting — one bad point never aborts a batch
//! - Per-tag retention with whole-bucket purge where possible
//! - No background threads; sweeps and aggregation run on the caller's time
//!
//! ## Quick Start
//!
//! ```rust
//! use historian::{
//!     DataPointInput, StoreConfig, TagConfig, TagDataType, TagRegistry,
//!     TagValue, TimeSeriesStore,
//! };
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! // Register a tag
//! let mut registry = TagRegistry::new();
//! let mut config = TagConfig::new("REACTOR.TEMP", TagDataType::Float);
//! config.engineering_units = Some("°C".to_string());
//! registry.create_tag(config)?;
//!
//! // Open a store over the registry
//! let mut store = TimeSeriesStore::new(StoreConfig::default(), registry);
//!
//! // Write a point
//! let result = store.write_single_data_point(DataPointInput::new(
//!     "REACTOR.TEMP",
//!     1_700_000_000_000,
//!     TagValue::Float(351.2),
//! ));
//! assert_eq!(result.points_written, 1);
//!
//! // Query it back
//! let points = store.query_data_points(&historian::QueryRequest {
//!     tag_names: vec!["REACTOR.TEMP".to_string()],
//!     start_time: 1_700_000_000_000,
//!     end_time: 1_700_000_060_000,
//!     max_results: None,
//!     quality_filter: None,
//! })?;
//! assert_eq!(points.len(), 1);
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! - [`TagRegistry`] — Tag lifecycle: create, update, search, bulk operations
//! - [`TimeSeriesStore`] — Write pipeline, buckets, queries, retention
//! - [`Tag`] / [`TagConfig`] / [`TagUpdate`] — Metadata records
//! - [`DataPoint`] / [`DataPointInput`] — Stored and incoming measurements
//!
//! ## Modules
//!
//! For lower-level access, the individual modules are also public:
//!
//! - [`registry`] — Tag registry, validation, search
//! - [`store`] — Store lifecycle, writes, queries, retention
//! - [`tag`] — Tag model, typed values, data points
//! - [`bucket`] — Time-bucketing and per-bucket rollups
//! - [`compression`] — Swinging-door and boxcar filters
//! - [`aggregate`] — Aggregation functions and result records
//! - [`error`] — Error types

pub mod aggregate;
pub mod bucket;
pub mod compression;
pub mod error;
pub mod registry;
pub mod store;
pub mod tag;

// Re-export primary API types at crate root for convenience.
pub use aggregate::{AggregatedData, AggregationResult, AggregationType};
pub use bucket::{Bucket, BucketInterval, BucketStatistics, bucket_bounds, bucket_key};
pub use error::{HistorianError, Result, WriteErrorCode};
pub use registry::{BulkCreateResult, RegistryHealth, TagFilter, TagRegistry};
pub use store::{
    AggregationRequest, QueryRequest, StorageStatistics, StoreConfig, StoreHealth,
    TimeSeriesStore, WriteResult,
};
pub use tag::{
    CompressionType, DataPoint, DataPointInput, StorageType, Tag, TagConfig, TagDataType,
    TagUpdate, TagValue,
};

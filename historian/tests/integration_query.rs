//! Integration tests for queries and aggregation.

use historian::aggregate::AggregationType;
use historian::error::{AggregationError, HistorianError, QueryError};
use historian::registry::TagRegistry;
use historian::store::{AggregationRequest, QueryRequest, StoreConfig, TimeSeriesStore};
use historian::tag::{DataPointInput, TagConfig, TagDataType, TagValue};

const BASE_TS: i64 = 1_700_000_000_000;

fn seeded_store() -> TimeSeriesStore {
    let mut registry = TagRegistry::new();
    registry
        .create_tag(TagConfig::new("FURNACE.TEMP", TagDataType::Float))
        .unwrap();
    registry
        .create_tag(TagConfig::new("FURNACE.O2", TagDataType::Float))
        .unwrap();
    registry
        .create_tag(TagConfig::new("FURNACE.BATCH", TagDataType::Text))
        .unwrap();
    let mut store = TimeSeriesStore::new(StoreConfig::default(), registry);

    // 10 minutes of 1-minute samples per numeric tag, spanning bucket
    // boundaries
    for i in 0..10 {
        let ts = BASE_TS + i * 60_000;
        store.write_single_data_point(
            DataPointInput::new("FURNACE.TEMP", ts, TagValue::Float(800.0 + f64::from(i as u32)))
                .with_quality(if i == 5 { 30 } else { 90 }),
        );
        store.write_single_data_point(DataPointInput::new(
            "FURNACE.O2",
            ts,
            TagValue::Float(3.0),
        ));
    }
    store
}

fn query(tags: &[&str], start: i64, end: i64) -> QueryRequest {
    QueryRequest {
        tag_names: tags.iter().map(|t| (*t).to_string()).collect(),
        start_time: start,
        end_time: end,
        max_results: None,
        quality_filter: None,
    }
}

#[test]
fn test_multi_tag_query_merges_and_sorts() {
    let mut store = seeded_store();

    let points = store
        .query_data_points(&query(
            &["FURNACE.TEMP", "FURNACE.O2"],
            BASE_TS,
            BASE_TS + 600_000,
        ))
        .unwrap();

    assert_eq!(points.len(), 20);
    // Ascending by timestamp; ties broken by tag name
    for pair in points.windows(2) {
        assert!(pair[0].timestamp <= pair[1].timestamp);
        if pair[0].timestamp == pair[1].timestamp {
            assert!(pair[0].tag_name < pair[1].tag_name);
        }
    }
}

#[test]
fn test_query_range_is_inclusive() {
    let mut store = seeded_store();

    // Exactly the 3rd through 5th samples
    let points = store
        .query_data_points(&query(
            &["FURNACE.TEMP"],
            BASE_TS + 120_000,
            BASE_TS + 240_000,
        ))
        .unwrap();
    let timestamps: Vec<i64> = points.iter().map(|p| p.timestamp).collect();
    assert_eq!(
        timestamps,
        vec![BASE_TS + 120_000, BASE_TS + 180_000, BASE_TS + 240_000]
    );

    // A range before any data is empty, not an error
    let points = store
        .query_data_points(&query(&["FURNACE.TEMP"], 1, 1_000))
        .unwrap();
    assert!(points.is_empty());
}

#[test]
fn test_unknown_tags_are_skipped_not_fatal() {
    let mut store = seeded_store();

    // One resolvable tag is enough
    let points = store
        .query_data_points(&query(
            &["GHOST.1", "FURNACE.O2", "GHOST.2"],
            BASE_TS,
            BASE_TS + 600_000,
        ))
        .unwrap();
    assert_eq!(points.len(), 10);
    assert!(points.iter().all(|p| p.tag_name == "FURNACE.O2"));

    // Zero resolvable tags is the canonical failure
    let err = store
        .query_data_points(&query(&["GHOST.1", "GHOST.2"], BASE_TS, BASE_TS + 1))
        .unwrap_err();
    assert!(matches!(
        err,
        HistorianError::Query(QueryError::NoValidTags)
    ));
    assert!(err.to_string().contains("No valid tags found"));
}

#[test]
fn test_quality_filter_and_truncation() {
    let mut store = seeded_store();

    let mut request = query(&["FURNACE.TEMP"], BASE_TS, BASE_TS + 600_000);
    request.quality_filter = Some(50);
    let points = store.query_data_points(&request).unwrap();
    // The i == 5 sample was written with quality 30
    assert_eq!(points.len(), 9);
    assert!(points.iter().all(|p| p.quality >= 50));

    request.max_results = Some(4);
    let points = store.query_data_points(&request).unwrap();
    assert_eq!(points.len(), 4);
    assert_eq!(points[0].timestamp, BASE_TS);
}

#[test]
fn test_aggregation_over_range() {
    let mut registry = TagRegistry::new();
    registry
        .create_tag(TagConfig::new("KILN.TEMP", TagDataType::Float))
        .unwrap();
    let mut store = TimeSeriesStore::new(StoreConfig::default(), registry);

    for (i, v) in [10.0, 20.0, 30.0, 40.0, 50.0].iter().enumerate() {
        store.write_single_data_point(DataPointInput::new(
            "KILN.TEMP",
            BASE_TS + i as i64 * 60_000,
            TagValue::Float(*v),
        ));
    }

    let request = |aggregation_type| AggregationRequest {
        tag_name: "KILN.TEMP".to_string(),
        aggregation_type,
        start_time: BASE_TS,
        end_time: BASE_TS + 300_000,
    };

    let avg = store.calculate_aggregation(&request(AggregationType::Average)).unwrap();
    assert_eq!(avg.value, 30.0);
    assert_eq!(avg.count, 5);
    assert_eq!(avg.avg_quality, 100.0);

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
    assert_eq!(
        store.calculate_aggregation(&request(AggregationType::Count)).unwrap().value,
        5.0
    );
    assert_eq!(
        store.calculate_aggregation(&request(AggregationType::Range)).unwrap().value,
        40.0
    );
    let sd = store
        .calculate_aggregation(&request(AggregationType::StandardDeviation))
        .unwrap();
    assert!((sd.value - 200.0_f64.sqrt()).abs() < 1e-10);

    // The range is inclusive on both ends: trimming one endpoint drops one
    // sample
    let partial = store
        .calculate_aggregation(&AggregationRequest {
            tag_name: "KILN.TEMP".to_string(),
            aggregation_type: AggregationType::Count,
            start_time: BASE_TS + 60_000,
            end_time: BASE_TS + 300_000,
        })
        .unwrap();
    assert_eq!(partial.count, 4);
}

#[test]
fn test_aggregation_failure_modes() {
    let mut store = seeded_store();

    // Empty range
    let err = store
        .calculate_aggregation(&AggregationRequest {
            tag_name: "FURNACE.TEMP".to_string(),
            aggregation_type: AggregationType::Average,
            start_time: 1,
            end_time: 2,
        })
        .unwrap_err();
    assert!(matches!(
        err,
        HistorianError::Aggregation(AggregationError::NoDataPoints)
    ));
    assert!(err.to_string().contains("No data points found for aggregation"));

    // Text tags have no numeric representation
    let err = store
        .calculate_aggregation(&AggregationRequest {
            tag_name: "FURNACE.BATCH".to_string(),
            aggregation_type: AggregationType::Average,
            start_time: BASE_TS,
            end_time: BASE_TS + 600_000,
        })
        .unwrap_err();
    assert!(matches!(
        err,
        HistorianError::Aggregation(AggregationError::NonNumericTag { .. })
    ));

    // Unknown tag and inverted range
    assert!(
        store
            .calculate_aggregation(&AggregationRequest {
                tag_name: "GHOST".to_string(),
                aggregation_type: AggregationType::Average,
                start_time: BASE_TS,
                end_time: BASE_TS + 1,
            })
            .is_err()
    );
    assert!(
        store
            .calculate_aggregation(&AggregationRequest {
                tag_name: "FURNACE.TEMP".to_string(),
                aggregation_type: AggregationType::Average,
                start_time: BASE_TS + 1,
                end_time: BASE_TS,
            })
            .is_err()
    );
}

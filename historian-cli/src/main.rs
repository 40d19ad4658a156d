//! CLI for the historian time-series engine.
//!
//! Provides commands for simulating plant data through the engine, running
//! aggregations, and benchmarking the write path.

use std::time::Instant;

use clap::{Parser, Subcommand, ValueEnum};
use historian::aggregate::AggregationType;
use historian::registry::TagRegistry;
use historian::store::{AggregationRequest, QueryRequest, StoreConfig, TimeSeriesStore};
use historian::tag::{CompressionType, DataPointInput, TagConfig, TagDataType, TagValue, now_ms};
use tracing::info;

/// historian — Tag-oriented in-memory historian engine CLI.
#[derive(Parser)]
#[command(name = "historian", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

/// Available CLI commands.
#[derive(Subcommand)]
enum Commands {
    /// Simulate plant tags, write generated data, and report store health.
    Simulate {
        /// Number of tags to register.
        #[arg(long, default_value = "10")]
        tags: u32,

        /// Number of data points to write per tag.
        #[arg(long, default_value = "3600")]
        points: u32,

        /// Swinging-door deviation in [0, 1]; 0 disables compression.
        #[arg(long, default_value = "0.0")]
        deviation: f64,

        /// Sample interval in milliseconds.
        #[arg(long, default_value = "1000")]
        interval_ms: i64,

        /// Output format.
        #[arg(long, default_value = "text")]
        format: OutputFormat,
    },

    /// Simulate one tag and aggregate its data over the full range.
    Aggregate {
        /// Number of data points to write.
        #[arg(long, default_value = "3600")]
        points: u32,

        /// Aggregation to apply.
        #[arg(long, default_value = "average")]
        aggregation: AggregationArg,

        /// Output format.
        #[arg(long, default_value = "text")]
        format: OutputFormat,
    },

    /// Run a write-path microbenchmark.
    Bench {
        /// Number of data points to write.
        #[arg(long, default_value = "1000000")]
        points: u64,

        /// Number of tags to register.
        #[arg(long, default_value = "30")]
        tags: u32,
    },
}

/// Output format for command results.
#[derive(Clone, ValueEnum)]
enum OutputFormat {
    /// Human-readable text.
    Text,
    /// JSON object.
    Json,
}

/// CLI-facing aggregation names.
#[derive(Clone, Copy, ValueEnum)]
enum AggregationArg {
    /// Arithmetic mean.
    Average,
    /// Smallest value.
    Minimum,
    /// Largest value.
    Maximum,
    /// Sum of values.
    Sum,
    /// Number of values.
    Count,
    /// Population standard deviation.
    Stddev,
    /// Maximum minus minimum.
    Range,
}

impl From<AggregationArg> for AggregationType {
    fn from(arg: AggregationArg) -> Self {
        match arg {
            AggregationArg::Average => Self::Average,
            AggregationArg::Minimum => Self::Minimum,
            AggregationArg::Maximum => Self::Maximum,
            AggregationArg::Sum => Self::Sum,
            AggregationArg::Count => Self::Count,
            AggregationArg::Stddev => Self::StandardDeviation,
            AggregationArg::Range => Self::Range,
        }
    }
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Simulate {
            tags,
            points,
            deviation,
            interval_ms,
            format,
        } => cmd_simulate(tags, points, deviation, interval_ms, &format),
        Commands::Aggregate {
            points,
            aggregation,
            format,
        } => cmd_aggregate(points, aggregation.into(), &format),
        Commands::Bench { points, tags } => cmd_bench(points, tags),
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

/// Registers `tag_count` simulated Float tags on a fresh store.
fn setup_store(
    tag_count: u32,
    deviation: f64,
) -> Result<TimeSeriesStore, Box<dyn std::error::Error>> {
    let mut registry = TagRegistry::new();
    for i in 0..tag_count {
        let mut config = TagConfig::new(format!("SIM.UNIT{}.PV{i}", i / 10), TagDataType::Float);
        config.engineering_units = Some("°C".to_string());
        config.collector = Some("sim".to_string());
        if deviation > 0.0 {
            config.compression_type = Some(CompressionType::SwingingDoor);
            config.compression_deviation = Some(deviation);
        }
        registry.create_tag(config)?;
    }
    Ok(TimeSeriesStore::new(
        StoreConfig {
            max_data_points: usize::MAX,
            aggregation_enabled: false,
            ..StoreConfig::default()
        },
        registry,
    ))
}

/// Simulated process value: a slow sine with per-tag phase.
fn simulated_value(tag_index: u32, sample_index: u32) -> f64 {
    let phase = f64::from(tag_index) * 0.7;
    100.0 + 25.0 * (f64::from(sample_index) * 0.01 + phase).sin()
}

/// Implements `historian simulate`.
fn cmd_simulate(
    tags: u32,
    points: u32,
    deviation: f64,
    interval_ms: i64,
    format: &OutputFormat,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut store = setup_store(tags, deviation)?;
    let tag_names: Vec<String> = store.registry().iter().map(|t| t.name.clone()).collect();

    let base_ts = now_ms() - i64::from(points) * interval_ms;
    let mut written = 0usize;
    let mut failed = 0usize;
    let started = Instant::now();

    for sample in 0..points {
        let ts = base_ts + i64::from(sample) * interval_ms;
        let batch: Vec<DataPointInput> = tag_names
            .iter()
            .enumerate()
            .map(|(i, name)| {
                #[allow(clippy::cast_possible_truncation)]
                let value = simulated_value(i as u32, sample);
                DataPointInput::new(name.clone(), ts, TagValue::Float(value))
            })
            .collect();
        let result = store.write_data_points(&batch);
        written += result.points_written;
        failed += result.points_failed;
    }
    let elapsed = started.elapsed();
    info!(written, failed, ?elapsed, "simulation complete");

    let statistics = store.storage_statistics();
    let health = store.health_status();

    match format {
        OutputFormat::Text => {
            println!("Simulated {tags} tags x {points} samples");
            println!();
            println!("Write results:");
            println!("  Written: {written}");
            println!("  Failed: {failed}");
            println!("  Elapsed: {elapsed:.3?}");
            println!();
            println!("Storage:");
            println!("  Stored points: {}", statistics.total_data_points);
            println!("  Compression ratio: {:.2}x", statistics.compression_ratio);
            println!(
                "  Estimated footprint: {}",
                format_bytes(statistics.estimated_storage_bytes)
            );
            println!("  Healthy: {}", health.healthy);
        }
        OutputFormat::Json => {
            let output = serde_json::json!({
                "tags": tags,
                "samples_per_tag": points,
                "written": written,
                "failed": failed,
                "elapsed_ms": elapsed.as_millis(),
                "statistics": statistics,
                "health": health,
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
    }

    Ok(())
}

/// Implements `historian aggregate`.
fn cmd_aggregate(
    points: u32,
    aggregation_type: AggregationType,
    format: &OutputFormat,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut store = setup_store(1, 0.0)?;
    let tag_name = store
        .registry()
        .iter()
        .next()
        .map(|t| t.name.clone())
        .ok_or("no tag registered")?;

    let base_ts = now_ms() - i64::from(points) * 1_000;
    for sample in 0..points {
        store.write_single_data_point(DataPointInput::new(
            tag_name.clone(),
            base_ts + i64::from(sample) * 1_000,
            TagValue::Float(simulated_value(0, sample)),
        ));
    }

    let result = store.calculate_aggregation(&AggregationRequest {
        tag_name: tag_name.clone(),
        aggregation_type,
        start_time: base_ts,
        end_time: base_ts + i64::from(points) * 1_000,
    })?;

    match format {
        OutputFormat::Text => {
            println!("Tag: {tag_name}");
            println!("Aggregation: {aggregation_type:?}");
            println!("Points: {}", result.count);
            println!("Value: {:.4}", result.value);
            println!("Avg quality: {:.1}", result.avg_quality);
        }
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
    }

    Ok(())
}

/// Implements `historian bench`.
#[allow(clippy::cast_precision_loss)] // Benchmark stats are fine with f64 precision
fn cmd_bench(points: u64, tags: u32) -> Result<(), Box<dyn std::error::Error>> {
    println!("historian write-path benchmark");
    println!("  Points: {points}");
    println!("  Tags: {tags}");
    println!();

    let mut store = setup_store(tags, 0.0)?;
    let tag_names: Vec<String> = store.registry().iter().map(|t| t.name.clone()).collect();

    println!("Writing {points} data points across {tags} tags...");

    let base_ts = 1_700_000_000_000i64;
    let mut ts = base_ts;
    let rounds = points / u64::from(tags);

    let start = Instant::now();
    for _ in 0..rounds {
        ts += 1_000;
        let batch: Vec<DataPointInput> = tag_names
            .iter()
            .map(|name| DataPointInput::new(name.clone(), ts, TagValue::Float(99.9)))
            .collect();
        let result = store.write_data_points(&batch);
        if result.points_failed > 0 {
            return Err(format!("{} writes failed", result.points_failed).into());
        }
    }
    let elapsed = start.elapsed();

    let total_writes = rounds * u64::from(tags);
    let ns_per_write = elapsed.as_nanos() as f64 / total_writes as f64;
    let writes_per_sec = total_writes as f64 / elapsed.as_secs_f64();

    // A read pass over the last hour keeps the query path honest too
    let read_start = Instant::now();
    let recent = store.query_data_points(&QueryRequest {
        tag_names: tag_names.clone(),
        start_time: ts - 3_600_000,
        end_time: ts,
        max_results: None,
        quality_filter: None,
    })?;
    let read_elapsed = read_start.elapsed();

    println!();
    println!("Results:");
    println!("  Total writes: {total_writes}");
    println!("  Elapsed: {elapsed:.3?}");
    println!("  Avg latency: {ns_per_write:.1} ns/write");
    println!("  Throughput: {writes_per_sec:.0} writes/sec");
    println!(
        "  Query (last hour): {} points in {read_elapsed:.3?}",
        recent.len()
    );
    println!();

    Ok(())
}

/// Formats a byte count as a human-readable string.
#[allow(clippy::cast_precision_loss)] // Byte counts are display-only
fn format_bytes(bytes: usize) -> String {
    if bytes >= 1_048_576 {
        format!("{:.1} MB", bytes as f64 / 1_048_576.0)
    } else if bytes >= 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else {
        format!("{bytes} B")
    }
}

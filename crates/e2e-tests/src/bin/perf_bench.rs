use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;

use clap::{Parser, ValueEnum};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;
use serde_json::json;

use e2e_tests::{random_vectors, TestHarness};
use vectordb_store::SearchOptions;

const SMALL_ITEM_COUNT: usize = 500;
const MEDIUM_ITEM_COUNT: usize = 5_000;
const DEFAULT_ITERATIONS: usize = 3;
const SEARCH_QUERIES: usize = 100;
const SEARCH_LIMIT: usize = 10;

#[derive(Parser, Debug)]
#[command(name = "perf_bench", about = "vectordb collection benchmark harness")]
struct Args {
    #[arg(long, value_enum, default_value = "small")]
    tier: DatasetTier,
    #[arg(long, default_value_t = DEFAULT_ITERATIONS)]
    iterations: usize,
    #[arg(long, default_value_t = 42)]
    seed: u64,
    #[arg(long)]
    out_dir: Option<PathBuf>,
}

#[derive(Clone, Copy, Debug, Serialize, ValueEnum, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
enum DatasetTier {
    Small,
    Medium,
}

impl DatasetTier {
    fn item_count(self) -> usize {
        match self {
            DatasetTier::Small => SMALL_ITEM_COUNT,
            DatasetTier::Medium => MEDIUM_ITEM_COUNT,
        }
    }
}

#[derive(Clone, Debug, Serialize)]
struct StepMetrics {
    p50_ms: f64,
    p90_ms: f64,
    p99_ms: f64,
    samples: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    throughput_ops: Option<f64>,
}

#[derive(Debug, Serialize)]
struct BenchmarkOutput {
    tier: DatasetTier,
    iterations: usize,
    items: usize,
    steps: BTreeMap<String, StepMetrics>,
}

#[derive(Default)]
struct SampleCollector {
    durations: HashMap<String, Vec<f64>>,
    throughput: HashMap<String, Vec<f64>>,
}

impl SampleCollector {
    fn record(&mut self, step: &str, duration_ms: f64) {
        self.durations
            .entry(step.to_string())
            .or_default()
            .push(duration_ms);
    }

    fn record_batch(&mut self, step: &str, started: Instant, ops: usize) {
        let secs = started.elapsed().as_secs_f64();
        if secs > 0.0 {
            self.throughput
                .entry(step.to_string())
                .or_default()
                .push(ops as f64 / secs);
        }
    }
}

fn elapsed_ms(started: Instant) -> f64 {
    started.elapsed().as_secs_f64() * 1000.0
}

#[tokio::main]
async fn main() -> Result<(), String> {
    let args = Args::parse();
    let items = args.tier.item_count();
    let mut collector = SampleCollector::default();

    for iteration in 0..args.iterations {
        run_iteration(items, args.seed + iteration as u64, &mut collector).await?;
    }

    let output = BenchmarkOutput {
        tier: args.tier,
        iterations: args.iterations,
        items,
        steps: build_metrics(&collector),
    };

    let json = serde_json::to_string_pretty(&output).map_err(|e| e.to_string())?;
    let table = render_table(&output);
    if let Some(out_dir) = &args.out_dir {
        fs::create_dir_all(out_dir).map_err(|e| format!("Failed to create out dir: {e}"))?;
        write_outputs(out_dir, &json, &table)?;
    }

    println!("{}", table);
    println!("\n{}", json);
    Ok(())
}

async fn run_iteration(
    items: usize,
    seed: u64,
    collector: &mut SampleCollector,
) -> Result<(), String> {
    let harness = TestHarness::with_settings(items, std::time::Duration::from_secs(3600));
    let client = harness.client();
    let bench = client.create("bench").await.map_err(|e| e.to_string())?;
    let vectors = random_vectors(items, seed);

    let batch = Instant::now();
    let mut ids = Vec::with_capacity(items);
    for (i, vector) in vectors.iter().enumerate() {
        let started = Instant::now();
        let item = bench
            .insert_with_vector(Some(json!({ "n": i })), vector)
            .await
            .map_err(|e| e.to_string())?;
        collector.record("insert", elapsed_ms(started));
        ids.push(item.id);
    }
    collector.record_batch("insert", batch, items);

    let mut rng = StdRng::seed_from_u64(seed);
    let options = SearchOptions::new().with_limit(SEARCH_LIMIT);
    let batch = Instant::now();
    for _ in 0..SEARCH_QUERIES {
        let query = &vectors[rng.random_range(0..vectors.len())];
        let started = Instant::now();
        bench
            .find_by_vector(query, &options)
            .await
            .map_err(|e| e.to_string())?;
        collector.record("search", elapsed_ms(started));
    }
    collector.record_batch("search", batch, SEARCH_QUERIES);

    for _ in 0..SEARCH_QUERIES {
        let id = ids[rng.random_range(0..ids.len())];
        let started = Instant::now();
        bench.get(id).await.map_err(|e| e.to_string())?;
        collector.record("get", elapsed_ms(started));
    }

    let started = Instant::now();
    bench.save().await.map_err(|e| e.to_string())?;
    collector.record("save", elapsed_ms(started));
    client.forget("bench").map_err(|e| e.to_string())?;

    let client = harness.client();
    let started = Instant::now();
    client.load_all().await.map_err(|e| e.to_string())?;
    collector.record("load", elapsed_ms(started));

    let loaded = client.get("bench").map(|c| c.size()).unwrap_or(0);
    if loaded != items {
        return Err(format!("expected {} items after load, found {}", items, loaded));
    }
    client.shutdown().await.map_err(|e| e.to_string())?;
    Ok(())
}

fn build_metrics(collector: &SampleCollector) -> BTreeMap<String, StepMetrics> {
    let mut steps = BTreeMap::new();
    for (step, values) in &collector.durations {
        let mut sorted = values.clone();
        sorted.sort_by(|a, b| a.total_cmp(b));
        let throughput_ops = collector.throughput.get(step).map(|values| {
            let mut sorted = values.clone();
            sorted.sort_by(|a, b| a.total_cmp(b));
            percentile(&sorted, 50.0)
        });
        steps.insert(
            step.clone(),
            StepMetrics {
                p50_ms: percentile(&sorted, 50.0),
                p90_ms: percentile(&sorted, 90.0),
                p99_ms: percentile(&sorted, 99.0),
                samples: sorted.len(),
                throughput_ops,
            },
        );
    }
    steps
}

fn percentile(values: &[f64], percentile: f64) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let rank = (percentile / 100.0) * (values.len() as f64 - 1.0);
    let low = rank.floor() as usize;
    let high = rank.ceil() as usize;
    if low == high {
        values[low]
    } else {
        let weight = rank - low as f64;
        values[low] + (values[high] - values[low]) * weight
    }
}

fn render_table(output: &BenchmarkOutput) -> String {
    let mut lines = Vec::new();
    lines.push(format!(
        "Benchmark Results (items={}, iterations={})",
        output.items, output.iterations
    ));
    lines.push("step\tp50_ms\tp90_ms\tp99_ms\tthroughput_ops".to_string());

    for (step, metrics) in &output.steps {
        let throughput = metrics
            .throughput_ops
            .map(|t| format!("{:.2}", t))
            .unwrap_or_else(|| "-".to_string());
        lines.push(format!(
            "{}\t{:.2}\t{:.2}\t{:.2}\t{}",
            step, metrics.p50_ms, metrics.p90_ms, metrics.p99_ms, throughput
        ));
    }
    lines.join("\n")
}

fn write_outputs(out_dir: &Path, json: &str, table: &str) -> Result<(), String> {
    fs::write(out_dir.join("latest.json"), json).map_err(|e| e.to_string())?;
    fs::write(out_dir.join("latest.txt"), table).map_err(|e| e.to_string())?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_percentile_interpolates() {
        let values = [1.0, 2.0, 3.0, 4.0];
        assert_eq!(percentile(&values, 0.0), 1.0);
        assert_eq!(percentile(&values, 100.0), 4.0);
        assert!((percentile(&values, 50.0) - 2.5).abs() < 1e-9);
        assert_eq!(percentile(&[], 50.0), 0.0);
    }
}

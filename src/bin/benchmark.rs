//! Spanweave Benchmark
//!
//! Run with: cargo run --release --bin spanweave-bench
//!
//! Environment variables:
//! - SPANWEAVE_BENCH_SPANS: Number of synthetic spans (default: 10000)
//! - SPANWEAVE_BENCH_DOCUMENTS: Retrieved documents per span (default: 8)
//! - SPANWEAVE_BENCH_SEED: RNG seed (default: 12345)
//! - RUST_LOG: Log level (default: info)

use std::time::{Duration, Instant};

use chrono::{TimeZone, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use spanweave::attributes::{flatten_map, AttributeMap, AttributeValue, FlattenOptions};
use spanweave::otel::semconv::JSON_STRING_ATTRIBUTES;
use spanweave::otel::{SpanContext, SpanId, SpanKind, SpanStatusCode, TraceId};
use spanweave::{Span, Transcoder};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const MODELS: &[&str] = &["gpt-4o", "claude-3-5-sonnet", "llama-3-70b", "mistral-large"];
const SOURCES: &[&str] = &["wiki", "docs", "blog", "forum", "pdf", "ticket"];
const ROLES: &[&str] = &["system", "user", "assistant"];
const EMBEDDING_DIM: usize = 64;

fn map(entries: Vec<(&str, AttributeValue)>) -> AttributeValue {
    AttributeValue::Map(
        entries
            .into_iter()
            .map(|(k, v)| (k.to_string(), v))
            .collect(),
    )
}

fn pick<'a>(rng: &mut StdRng, items: &[&'a str]) -> &'a str {
    items[rng.gen_range(0..items.len())]
}

fn generate_documents(rng: &mut StdRng, count: usize) -> AttributeValue {
    let documents = (0..count)
        .map(|i| {
            map(vec![(
                "document",
                map(vec![
                    ("id", format!("doc-{}", rng.gen::<u32>()).into()),
                    ("score", rng.gen_range(0.0..1.0f64).into()),
                    ("content", format!("passage {} of the corpus", i).into()),
                    (
                        "metadata",
                        map(vec![
                            ("source", pick(rng, SOURCES).into()),
                            ("page", AttributeValue::Int(rng.gen_range(1..400))),
                        ]),
                    ),
                ]),
            )])
        })
        .collect();
    AttributeValue::List(documents)
}

fn generate_embeddings(rng: &mut StdRng, count: usize) -> AttributeValue {
    let embeddings = (0..count)
        .map(|_| {
            let vector = (0..EMBEDDING_DIM)
                .map(|_| AttributeValue::Float(rng.gen_range(-1.0..1.0)))
                .collect::<Vec<_>>();
            map(vec![("embedding", map(vec![("vector", vector.into())]))])
        })
        .collect();
    AttributeValue::List(embeddings)
}

fn generate_messages(rng: &mut StdRng) -> AttributeValue {
    let messages = (0..rng.gen_range(1..6))
        .map(|i| {
            map(vec![(
                "message",
                map(vec![
                    ("role", pick(rng, ROLES).into()),
                    ("content", format!("turn {}", i).into()),
                ]),
            )])
        })
        .collect();
    AttributeValue::List(messages)
}

fn generate_span(rng: &mut StdRng, index: usize, documents: usize) -> Span {
    let kind = match index % 3 {
        0 => SpanKind::Retriever,
        1 => SpanKind::Embedding,
        _ => SpanKind::Llm,
    };

    let mut attributes = AttributeMap::new();
    attributes.insert(
        "input".to_string(),
        map(vec![("value", format!("question {}", index).into())]),
    );
    match kind {
        SpanKind::Retriever => {
            attributes.insert(
                "retrieval".to_string(),
                map(vec![("documents", generate_documents(rng, documents))]),
            );
        }
        SpanKind::Embedding => {
            attributes.insert(
                "embedding".to_string(),
                map(vec![
                    ("model_name", "text-embedding-3-small".into()),
                    ("embeddings", generate_embeddings(rng, documents)),
                ]),
            );
        }
        _ => {
            let prompt = rng.gen_range(10..2000i64);
            let completion = rng.gen_range(1..500i64);
            attributes.insert(
                "llm".to_string(),
                map(vec![
                    ("model_name", pick(rng, MODELS).into()),
                    ("input_messages", generate_messages(rng)),
                    (
                        "token_count",
                        map(vec![
                            ("prompt", AttributeValue::Int(prompt)),
                            ("completion", AttributeValue::Int(completion)),
                            ("total", AttributeValue::Int(prompt + completion)),
                        ]),
                    ),
                ]),
            );
        }
    }

    let start_nanos = 1_700_000_000_000_000_000 + index as i64 * 1_000_000;
    let context = SpanContext {
        trace_id: TraceId::from_u128(rng.gen()),
        span_id: SpanId::from_u64(rng.gen()),
    };
    Span::new(format!("span-{}", index), context, kind, Utc.timestamp_nanos(start_nanos))
        .with_end_time(Utc.timestamp_nanos(start_nanos + rng.gen_range(1_000..5_000_000)))
        .with_status(SpanStatusCode::Ok, "")
        .with_attributes(attributes)
}

struct BenchmarkStats {
    total_items: usize,
    total_duration: Duration,
    latencies: Vec<Duration>,
}

impl BenchmarkStats {
    fn items_per_sec(&self) -> f64 {
        self.total_items as f64 / self.total_duration.as_secs_f64()
    }

    fn avg_latency(&self) -> Duration {
        if self.latencies.is_empty() {
            return Duration::ZERO;
        }
        let sum: Duration = self.latencies.iter().sum();
        sum / self.latencies.len() as u32
    }

    fn percentile(&self, pct: usize) -> Duration {
        let mut sorted = self.latencies.clone();
        sorted.sort();
        sorted
            .get(sorted.len() * pct / 100)
            .or(sorted.last())
            .copied()
            .unwrap_or_default()
    }

    fn report(&self, label: &str) {
        println!("{}:", label);
        println!("  Items/sec:   {:.0}", self.items_per_sec());
        println!("  Total time:  {:?}", self.total_duration);
        if !self.latencies.is_empty() {
            println!(
                "  Latency:     avg={:?} p50={:?} p99={:?}",
                self.avg_latency(),
                self.percentile(50),
                self.percentile(99)
            );
        }
        println!();
    }
}

fn time_each<T, R>(items: &[T], mut f: impl FnMut(&T) -> R) -> (Vec<R>, BenchmarkStats) {
    let mut results = Vec::with_capacity(items.len());
    let mut latencies = Vec::with_capacity(items.len());
    let start = Instant::now();
    for item in items {
        let item_start = Instant::now();
        results.push(f(item));
        latencies.push(item_start.elapsed());
    }
    let stats = BenchmarkStats {
        total_items: items.len(),
        total_duration: start.elapsed(),
        latencies,
    };
    (results, stats)
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "spanweave=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let span_count: usize = std::env::var("SPANWEAVE_BENCH_SPANS")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(10_000);
    let documents: usize = std::env::var("SPANWEAVE_BENCH_DOCUMENTS")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(8);
    let seed: u64 = std::env::var("SPANWEAVE_BENCH_SEED")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(12345);
    let threads = num_cpus::get();

    println!("Spanweave Benchmark");
    println!("===================");
    println!("Spans:           {}", span_count);
    println!("Documents/span:  {}", documents);
    println!("Seed:            {}", seed);
    println!("Threads:         {}", threads);
    println!();

    let mut rng = StdRng::seed_from_u64(seed);
    let spans: Vec<Span> = (0..span_count)
        .map(|i| generate_span(&mut rng, i, documents))
        .collect();
    tracing::info!("Generated {} synthetic spans", spans.len());

    let transcoder = Transcoder::default();
    let options = FlattenOptions::new()
        .with_recurse_on_sequence(true)
        .with_json_string_attributes(JSON_STRING_ATTRIBUTES.iter().copied());

    let (pair_counts, stats) =
        time_each(&spans, |span| flatten_map(&span.attributes, options.clone()).count());
    stats.report("Flatten");
    tracing::info!(
        "Flattened {} attribute pairs",
        pair_counts.iter().sum::<usize>()
    );

    let (encoded, stats) = time_each(&spans, |span| transcoder.encode_span_bytes(span));
    stats.report("Encode");
    let encoded = encoded.into_iter().collect::<Result<Vec<_>, _>>()?;
    let total_bytes: usize = encoded.iter().map(Vec::len).sum();
    tracing::info!(
        "Encoded {:.2} MB of protobuf",
        total_bytes as f64 / 1024.0 / 1024.0
    );

    let (decoded, stats) = time_each(&encoded, |bytes| transcoder.decode_span_bytes(bytes));
    stats.report("Decode");
    let decoded = decoded.into_iter().collect::<Result<Vec<_>, _>>()?;

    let mismatches = decoded
        .iter()
        .zip(&spans)
        .filter(|(decoded, original)| decoded != original)
        .count();
    if mismatches > 0 {
        tracing::warn!("{} spans did not survive the round trip", mismatches);
    }

    let pool = rayon::ThreadPoolBuilder::new().num_threads(threads).build()?;
    let start = Instant::now();
    let parallel: Vec<Span> = pool.install(|| {
        encoded
            .par_iter()
            .filter_map(|bytes| transcoder.decode_span_bytes(bytes).ok())
            .collect()
    });
    BenchmarkStats {
        total_items: parallel.len(),
        total_duration: start.elapsed(),
        latencies: Vec::new(),
    }
    .report("Parallel decode");

    Ok(())
}

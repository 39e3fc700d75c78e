use std::any::Any;
use std::env;
use std::fs;
use std::path::PathBuf;
use std::time::Instant;

use snaptree_core::{Engine, Error, Freezer, Leaf, Patch, Record, Result, Value};

const CI_CONFIG: &[(u64, u64)] = &[(100, 5), (1_000, 1), (10_000, 1)];

const LOCAL_CONFIG: &[(u64, u64)] = &[(1, 1), (10, 1), (100, 1), (1_000, 1), (10_000, 1)];

#[derive(serde::Serialize)]
#[serde(rename_all = "camelCase")]
struct Output {
    implementation: &'static str,
    workload: String,
    timestamp: String,
    name: String,
    total_ops: u64,
    duration_ms: f64,
    ops_per_sec: f64,
    extra: Extra,
    source_file: Option<String>,
}

#[derive(serde::Serialize)]
#[serde(rename_all = "camelCase")]
struct Extra {
    count: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    iterations: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    avg_duration_ms: Option<f64>,
}

#[derive(Clone, Copy)]
enum Workload {
    /// One produce per record, each appending a price through the record's own method.
    Produce,
    /// Records the produce workload as patches, then times replaying them.
    Apply,
}

impl Workload {
    fn name(self) -> &'static str {
        match self {
            Workload::Produce => "produce-push-price",
            Workload::Apply => "apply-push-price",
        }
    }
}

#[derive(Clone, Debug)]
struct Quote {
    ticker: String,
    prices: Vec<f64>,
}

impl Record for Quote {
    fn type_name(&self) -> &'static str {
        "Quote"
    }

    fn fields(&self) -> &'static [&'static str] {
        &["ticker", "prices"]
    }

    fn get(&self, field: &str) -> Option<Value> {
        match field {
            "ticker" => Some(Value::from(self.ticker.as_str())),
            "prices" => Some(Value::seq(self.prices.iter().copied())),
            _ => None,
        }
    }

    fn set(&mut self, field: &str, value: Value) -> Result<()> {
        match (field, &value) {
            ("ticker", Value::Leaf(Leaf::Str(s))) => self.ticker = s.clone(),
            ("prices", Value::Seq(items)) => {
                self.prices = items.iter().filter_map(Value::as_float).collect()
            }
            _ => return Err(Error::TypeMismatch(format!("bad value for `{field}`"))),
        }
        Ok(())
    }

    fn clone_record(&self) -> Box<dyn Record> {
        Box::new(self.clone())
    }

    fn freeze_members(&mut self, _: &mut Freezer) -> Result<()> {
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

fn is_ci() -> bool {
    env::var("CI").map(|v| v == "true").unwrap_or(false)
}

fn ticker(i: u64) -> String {
    format!("T{i:06}")
}

fn portfolio(engine: &Engine, count: u64) -> Value {
    let stocks = (0..count).map(|i| {
        let quote = Quote {
            ticker: ticker(i),
            prices: vec![100.0],
        };
        (ticker(i), Value::record(quote))
    });
    engine
        .freeze(Value::map([("stocks", Value::map(stocks))]))
        .expect("freeze base")
}

fn push_all(engine: &Engine, base: &Value, count: u64) -> (Value, Vec<Patch>) {
    let mut state = base.clone();
    let mut patches = Vec::with_capacity(count as usize);
    for i in 0..count {
        let produced = engine
            .produce_with_patches(&state, |d| {
                d.child("stocks")?
                    .child(ticker(i))?
                    .update_record(|q: &mut Quote| q.prices.push(101.0 + i as f64))
            })
            .expect("produce");
        state = produced.value;
        patches.extend(produced.patches);
    }
    (state, patches)
}

fn run_benchmark(engine: &Engine, workload: Workload, count: u64) -> f64 {
    let base = portfolio(engine, count);
    match workload {
        Workload::Produce => {
            let start = Instant::now();
            let _ = push_all(engine, &base, count);
            start.elapsed().as_secs_f64() * 1000.0
        }
        Workload::Apply => {
            let (_, patches) = push_all(engine, &base, count);
            let start = Instant::now();
            let _ = engine.apply_patches(&base, &patches).expect("apply");
            start.elapsed().as_secs_f64() * 1000.0
        }
    }
}

fn main() {
    let config: &[(u64, u64)] = if is_ci() { CI_CONFIG } else { LOCAL_CONFIG };

    let mut out_dir: Option<PathBuf> = None;
    let mut custom_config: Option<Vec<(u64, u64)>> = None;
    for arg in env::args().skip(1) {
        if let Some(val) = arg.strip_prefix("--count=") {
            let count = val.parse().unwrap_or(500);
            custom_config = Some(vec![(count, 1)]);
        } else if let Some(val) = arg.strip_prefix("--counts=") {
            let parsed: Vec<(u64, u64)> = val
                .split(',')
                .filter_map(|s| s.trim().parse::<u64>().ok())
                .map(|c| (c, 1))
                .collect();
            if !parsed.is_empty() {
                custom_config = Some(parsed);
            }
        } else if let Some(val) = arg.strip_prefix("--out-dir=") {
            out_dir = Some(PathBuf::from(val));
        }
    }

    let config = custom_config.as_deref().unwrap_or(config);
    let out_dir = out_dir.unwrap_or_else(|| PathBuf::from("benchmarks/core"));
    fs::create_dir_all(&out_dir).expect("mkdirs");

    let engine = Engine::default();
    for workload in [Workload::Produce, Workload::Apply] {
        for &(count, iterations) in config {
            let (duration_ms, iterations_opt, avg_duration_ms) = if iterations > 1 {
                let durations: Vec<f64> = (0..iterations)
                    .map(|_| run_benchmark(&engine, workload, count))
                    .collect();
                let avg = durations.iter().sum::<f64>() / durations.len() as f64;
                (avg, Some(iterations), Some(avg))
            } else {
                (run_benchmark(&engine, workload, count), None, None)
            };

            let workload_name = format!("{}-{}", workload.name(), count);
            let out_path = out_dir.join(format!("memory-{workload_name}.json"));

            let output = Output {
                implementation: "snaptree-core",
                workload: workload_name.clone(),
                timestamp: chrono::Utc::now().to_rfc3339(),
                name: workload_name,
                total_ops: count,
                duration_ms,
                ops_per_sec: if duration_ms > 0.0 {
                    count as f64 / duration_ms * 1000.0
                } else {
                    f64::INFINITY
                },
                extra: Extra {
                    count,
                    iterations: iterations_opt,
                    avg_duration_ms,
                },
                source_file: Some(out_path.display().to_string()),
            };

            let json = serde_json::to_string_pretty(&output).expect("serialize");
            fs::write(&out_path, &json).expect("write output");
            println!("{}", json);
        }
    }
}

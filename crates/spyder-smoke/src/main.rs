//! Spyder Smoke Harness
//!
//! Runs the offline worker against a live origin: install and activate
//! into an on-disk cache, then resolve the requested URLs and optionally
//! deliver a push message. Prints a JSON summary on stdout.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};
use serde_json::json;
use spyder_cache::{CacheStore, DiskCacheStore};
use spyder_common::{init_logging, LogConfig, LogError};
use spyder_net::{HttpNetwork, LoaderConfig, Request};
use spyder_sw::{
    EventOutcome, FetchDecision, NotificationTray, ServiceWorker, WindowClients, WorkerConfig,
    WorkerEvent, WorkerHost,
};
use tracing::{error, info};
use url::Url;

/// Per-operation timings.
#[derive(Default)]
struct PerfTiming {
    timings: HashMap<&'static str, Vec<Duration>>,
}

impl PerfTiming {
    fn record(&mut self, operation: &'static str, duration: Duration) {
        self.timings.entry(operation).or_default().push(duration);
    }

    fn summary(&self) -> serde_json::Value {
        let mut summary = serde_json::Map::new();
        for (op, durations) in &self.timings {
            let count = durations.len();
            let total_ms: f64 = durations.iter().map(|d| d.as_secs_f64() * 1000.0).sum();
            summary.insert(
                op.to_string(),
                json!({
                    "count": count,
                    "total_ms": (total_ms * 100.0).round() / 100.0,
                    "avg_ms": (total_ms / count.max(1) as f64 * 100.0).round() / 100.0,
                }),
            );
        }
        serde_json::Value::Object(summary)
    }
}

/// Parse command line arguments
struct Args {
    config: Option<String>,
    cache_dir: String,
    fetch: Vec<String>,
    navigate: Vec<String>,
    push: Option<String>,
    timeout_ms: Option<u64>,
    summary_output: Option<String>,
}

impl Args {
    fn parse() -> Self {
        let mut args = std::env::args().skip(1);
        let mut config = None;
        let mut cache_dir = "spyder-cache".to_string();
        let mut fetch = Vec::new();
        let mut navigate = Vec::new();
        let mut push = None;
        let mut timeout_ms = None;
        let mut summary_output = None;

        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--config" => {
                    config = args.next();
                }
                "--cache-dir" => {
                    if let Some(val) = args.next() {
                        cache_dir = val;
                    }
                }
                "--fetch" => fetch.extend(args.next()),
                "--navigate" => navigate.extend(args.next()),
                "--push" => {
                    push = args.next();
                }
                "--timeout-ms" => {
                    timeout_ms = args.next().and_then(|val| val.parse().ok());
                }
                "--summary-output" => {
                    summary_output = args.next();
                }
                other => {
                    eprintln!("Warning: ignoring unknown argument {other}");
                }
            }
        }

        Self {
            config,
            cache_dir,
            fetch,
            navigate,
            push,
            timeout_ms,
            summary_output,
        }
    }
}

fn describe(decision: &FetchDecision) -> serde_json::Value {
    match decision {
        FetchDecision::Passthrough => json!({ "decision": "passthrough" }),
        FetchDecision::Respond(response) => json!({
            "decision": "respond",
            "status": response.status.as_u16(),
            "from_cache": response.from_cache(),
            "bytes": response.body.len(),
        }),
    }
}

async fn resolve(
    host: &WorkerHost,
    request: Request,
    perf: &mut PerfTiming,
) -> serde_json::Value {
    let url = request.url.to_string();
    let start = Instant::now();
    let result = host.dispatch(WorkerEvent::Fetch(request)).await;
    perf.record("fetch", start.elapsed());

    match result {
        Ok(EventOutcome::Fetched(decision)) => {
            let mut value = describe(&decision);
            value["url"] = json!(url);
            value
        }
        Ok(other) => json!({ "url": url, "error": format!("unexpected outcome {other:?}") }),
        Err(e) => json!({ "url": url, "error": e.to_string() }),
    }
}

/// Fall back to default logging, saying why on stderr.
fn log_config_or_default(config: Result<LogConfig, LogError>) -> LogConfig {
    config.unwrap_or_else(|e| {
        eprintln!("Warning: ignoring log settings: {e}");
        LogConfig::default()
    })
}

#[tokio::main]
async fn main() -> Result<()> {
    init_logging(log_config_or_default(LogConfig::from_env()));

    let args = Args::parse();
    let Some(config_path) = args.config.as_deref() else {
        bail!("usage: spyder-smoke --config <file> [--cache-dir <dir>] [--fetch <url>]... [--navigate <url>]... [--push <json>]");
    };

    let config = WorkerConfig::from_json_file(config_path)
        .with_context(|| format!("loading {config_path}"))?;
    info!(generation = %config.generation, origin = %config.origin, "Starting smoke run");

    let mut loader = LoaderConfig::default();
    if let Some(ms) = args.timeout_ms {
        loader = loader.with_timeout(Duration::from_millis(ms));
    }
    let network = HttpNetwork::new(loader).context("building HTTP client")?;
    let store = DiskCacheStore::open(&args.cache_dir)
        .await
        .with_context(|| format!("opening cache directory {}", args.cache_dir))?;
    let clients = WindowClients::new();
    let tray = NotificationTray::new();

    let worker = Arc::new(ServiceWorker::new(
        config.clone(),
        Arc::new(store.clone()),
        Arc::new(network),
        Arc::new(clients.clone()),
        Arc::new(tray.clone()),
    ));
    let host = WorkerHost::spawn(Arc::clone(&worker));
    let mut perf = PerfTiming::default();

    let start = Instant::now();
    let install = host.dispatch(WorkerEvent::Install).await;
    perf.record("install", start.elapsed());
    let install = match install {
        Ok(outcome) => json!({ "ok": true, "outcome": format!("{outcome:?}") }),
        Err(e) => {
            error!(error = %e, "Install failed");
            json!({ "ok": false, "error": e.to_string() })
        }
    };

    let mut fetches = Vec::new();
    for raw in &args.fetch {
        let url = config.resolve(raw)?;
        fetches.push(resolve(&host, Request::get(url), &mut perf).await);
    }
    for raw in &args.navigate {
        let url: Url = config.resolve(raw)?;
        fetches.push(resolve(&host, Request::navigate(url), &mut perf).await);
    }

    let push = match args.push {
        Some(body) => {
            let start = Instant::now();
            let result = host
                .dispatch(WorkerEvent::Push(Some(bytes::Bytes::from(body))))
                .await;
            perf.record("push", start.elapsed());
            match result {
                Ok(EventOutcome::Shown(n)) => json!({
                    "title": n.title,
                    "body": n.options.body,
                    "tag": n.options.tag,
                    "url": n.options.data.url,
                }),
                Ok(other) => json!({ "error": format!("unexpected outcome {other:?}") }),
                Err(e) => json!({ "error": e.to_string() }),
            }
        }
        None => serde_json::Value::Null,
    };

    host.shutdown().await;

    let result = json!({
        "generation": config.generation,
        "state": worker.state().await.map(|s| format!("{s:?}")),
        "install": install,
        "generations": store.generation_names().await?,
        "fetches": fetches,
        "push": push,
        "perf": perf.summary(),
    });

    if let Some(ref path) = args.summary_output {
        if let Err(e) = std::fs::write(path, result.to_string()) {
            eprintln!("Warning: Failed to write summary to {path}: {e}");
        }
    }
    println!("{result}");
    Ok(())
}

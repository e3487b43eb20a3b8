//! dealcache CLI
//!
//! Command-line front end for the dealcache keyed async cache.

mod demo;

use std::future::Future;
use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use colored::*;
use indicatif::{ProgressBar, ProgressStyle};
use serde_json::Value;
use tracing::warn;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

use dealcache_core::constants::{ENV_API_TIMEOUT_SECONDS, ENV_API_TOKEN, ENV_API_URL};
use dealcache_http::{ApiClient, ApiConfig};
use dealcache_store::{BindingPhase, BindingSnapshot, CacheConfig, CacheStats, KeyedAsyncCache, ObserveOptions};

/// dealcache - keyed async cache for the deal pipeline API
#[derive(Parser)]
#[command(name = "dealcache")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    log_json: bool,

    /// Backend base URL
    #[arg(long, global = true, env = ENV_API_URL)]
    base_url: Option<String>,

    /// Bearer token for the backend
    #[arg(long, global = true, env = ENV_API_TOKEN, hide_env_values = true)]
    token: Option<String>,

    /// Request timeout in seconds
    #[arg(long, global = true, env = ENV_API_TIMEOUT_SECONDS)]
    timeout: Option<u64>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Observe a path through the cache, optionally several times
    Fetch {
        /// Request path, e.g. /api/projects
        path: String,
        /// Number of observations
        #[arg(short, long, default_value = "1")]
        repeat: usize,
        /// Pause between observations
        #[arg(long, default_value = "0")]
        interval_ms: u64,
        /// Freshness window for the cached response
        #[arg(long)]
        ttl_ms: Option<u64>,
        /// Print the response body of every observation
        #[arg(long)]
        body: bool,
    },

    /// Refetch a path periodically, keeping stale data visible while loading
    Watch {
        /// Request path
        path: String,
        /// Refetch period
        #[arg(long, default_value = "5000")]
        every_ms: u64,
        /// Stop after this many refetches (runs until Ctrl+C otherwise)
        #[arg(short, long)]
        count: Option<usize>,
    },

    /// Replay the caching scenarios against a simulated backend
    Demo,
}

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        "dealcache=debug,dealcache_store=debug,dealcache_http=debug,info"
    } else {
        "dealcache=info,warn"
    };
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into());
    let fmt_layer = if cli.log_json {
        tracing_subscriber::fmt::layer().json().boxed()
    } else {
        tracing_subscriber::fmt::layer().boxed()
    };
    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .init();

    let cache = KeyedAsyncCache::with_config(
        CacheConfig::from_env().context("Invalid cache configuration")?,
    );

    match &cli.command {
        Commands::Fetch {
            path,
            repeat,
            interval_ms,
            ttl_ms,
            body,
        } => {
            let client = api_client(&cli)?;
            cmd_fetch(&client, &cache, path, *repeat, *interval_ms, *ttl_ms, *body).await
        }
        Commands::Watch {
            path,
            every_ms,
            count,
        } => {
            let client = api_client(&cli)?;
            cmd_watch(&client, &cache, path, *every_ms, *count).await
        }
        Commands::Demo => demo::run(&cache).await,
    }
}

fn api_client(cli: &Cli) -> Result<ApiClient> {
    let mut config = ApiConfig::default();
    if let Some(url) = &cli.base_url {
        config.base_url = url.clone();
    }
    if let Some(seconds) = cli.timeout {
        config.timeout_seconds = seconds;
    }
    config.bearer_token = cli.token.clone().filter(|t| !t.is_empty());

    ApiClient::new(config).context("Failed to create API client")
}

/// Observe a path, reporting hits and misses
async fn cmd_fetch(
    client: &ApiClient,
    cache: &KeyedAsyncCache,
    path: &str,
    repeat: usize,
    interval_ms: u64,
    ttl_ms: Option<u64>,
    show_body: bool,
) -> Result<()> {
    let url = client.url(path)?;
    println!("{} {}", "📡 Fetching:".cyan().bold(), url);

    let producer = client.producer::<Value>(path);
    let key = producer.cache_key();
    let mut options = ObserveOptions::new();
    if let Some(ttl) = ttl_ms {
        options = options.ttl_ms(ttl);
    }

    let mut last_error = None;
    for round in 1..=repeat.max(1) {
        let started = Instant::now();
        let binding = cache.observe(key.clone(), producer.clone(), options.clone())?;

        let hit = !binding.is_loading();
        let snapshot = if hit {
            binding.snapshot()
        } else {
            with_spinner(format!("GET {}", path), binding.wait_settled()).await?
        };
        let elapsed = started.elapsed();

        match (&snapshot.error, snapshot.data()) {
            (Some(err), _) => {
                println!("   {} #{} {} ({:?})", "❌".red(), round, err.red(), elapsed);
                last_error = Some(err.clone());
            }
            (None, Some(data)) => {
                let source = if hit { "cache".green() } else { "network".yellow() };
                println!(
                    "   {} #{} {} from {} ({:?})",
                    "✓".green(),
                    round,
                    describe(data),
                    source,
                    elapsed
                );
                if show_body || round == 1 {
                    println!("{}", serde_json::to_string_pretty(data)?);
                }
                last_error = None;
            }
            (None, None) => println!("   {} #{} no data", "⚠️".yellow(), round),
        }

        if round < repeat && interval_ms > 0 {
            tokio::time::sleep(Duration::from_millis(interval_ms)).await;
        }
    }

    print_stats(&cache.stats());

    if let Some(err) = last_error {
        bail!("Request failed: {}", err);
    }
    Ok(())
}

/// Refetch a path on a timer
async fn cmd_watch(
    client: &ApiClient,
    cache: &KeyedAsyncCache,
    path: &str,
    every_ms: u64,
    count: Option<usize>,
) -> Result<()> {
    println!(
        "{} {} every {}ms",
        "👀 Watching:".cyan().bold(),
        client.url(path)?,
        every_ms
    );
    println!("   Press Ctrl+C to stop.\n");

    let producer = client.producer::<Value>(path);
    let options = ObserveOptions::new()
        .ttl_ms(every_ms)
        .on_error(|e| warn!(error = %e, "Refetch failed"));
    let binding = cache.observe(producer.cache_key(), producer, options)?;

    let _subscription = binding.subscribe(print_transition);
    print_transition(&binding.snapshot());
    binding.wait_settled().await;

    let mut rounds = 0usize;
    loop {
        if count.is_some_and(|limit| rounds >= limit) {
            break;
        }
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                println!("\n{}", "Stopped.".dimmed());
                break;
            }
            _ = tokio::time::sleep(Duration::from_millis(every_ms)) => {}
        }
        binding.refetch().await;
        rounds += 1;
    }

    print_stats(&cache.stats());
    Ok(())
}

fn print_transition(snapshot: &BindingSnapshot<Value>) {
    let phase = match snapshot.phase {
        BindingPhase::Fresh => snapshot.phase.to_string().green(),
        BindingPhase::Errored => snapshot.phase.to_string().red(),
        BindingPhase::Loading => snapshot.phase.to_string().yellow(),
        _ => snapshot.phase.to_string().dimmed(),
    };
    let data = snapshot
        .data()
        .map(describe)
        .unwrap_or_else(|| "no data".to_string());

    match &snapshot.error {
        Some(err) => println!("   [{}] {} ({})", phase, data, err.red()),
        None => println!("   [{}] {}", phase, data),
    }
}

/// Short human description of a JSON payload.
fn describe(value: &Value) -> String {
    match value {
        Value::Array(items) => format!("{} item(s)", items.len()),
        Value::Object(fields) => format!("object with {} field(s)", fields.len()),
        Value::Null => "null".to_string(),
        other => {
            let text = other.to_string();
            if text.chars().count() > 40 {
                format!("{}...", text.chars().take(40).collect::<String>())
            } else {
                text
            }
        }
    }
}

pub(crate) fn print_stats(stats: &CacheStats) {
    println!("\n{}", "📈 Cache:".green().bold());
    println!(
        "   Entries: {} ({} fresh, {} stale)",
        stats.total_entries, stats.fresh_entries, stats.stale_entries
    );
    println!(
        "   Hits: {}  Misses: {}  Hit rate: {:.0}%",
        stats.hits,
        stats.misses,
        stats.hit_rate() * 100.0
    );
    println!(
        "   Fetches: {}  Succeeded: {}  Failed: {}  Cancelled: {}",
        stats.fetches, stats.successes, stats.failures, stats.cancellations
    );
}

pub(crate) async fn with_spinner<F: Future>(message: String, fut: F) -> Result<F::Output> {
    let pb = ProgressBar::new_spinner();
    pb.set_style(ProgressStyle::default_spinner().template("   {spinner:.green} {msg}")?);
    pb.set_message(message);
    pb.enable_steady_tick(Duration::from_millis(80));

    let output = fut.await;
    pb.finish_and_clear();
    Ok(output)
}

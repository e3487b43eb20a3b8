//! Scripted walkthrough of the cache against a simulated backend.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{ensure, Result};
use colored::*;

use dealcache_store::{
    from_fn, BindingPhase, CacheError, CancelToken, KeyedAsyncCache, ObserveOptions, Producer,
};

use crate::{print_stats, with_spinner};

const FIVE_MINUTES_MS: u64 = 300_000;

/// Producer that sleeps `delay` and returns `make(call_number)`.
fn simulated<T, F>(calls: Arc<AtomicUsize>, delay: Duration, make: F) -> impl Producer<T>
where
    T: Send + Sync + 'static,
    F: Fn(usize) -> T + Send + Sync + 'static,
{
    from_fn(move |cancel: CancelToken| {
        let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
        let value = make(n);
        async move {
            tokio::time::sleep(delay).await;
            cancel.check()?;
            Ok::<T, CacheError>(value)
        }
    })
}

fn check(label: &str, ok: bool) -> Result<()> {
    if ok {
        println!("   {} {}", "✅".green(), label);
    } else {
        println!("   {} {}", "❌".red(), label);
    }
    ensure!(ok, "Expectation failed: {}", label);
    Ok(())
}

pub(crate) async fn run(cache: &KeyedAsyncCache) -> Result<()> {
    println!("{}", "🎬 dealcache demo (simulated backend)".cyan().bold());

    fresh_hit(cache).await?;
    stale_while_revalidate(cache).await?;
    pattern_invalidation(cache).await?;
    superseded_request(cache).await?;

    print_stats(&cache.stats());
    Ok(())
}

/// A second consumer within the TTL is served from cache.
async fn fresh_hit(cache: &KeyedAsyncCache) -> Result<()> {
    println!("\n{}", "1. Projects list within TTL".yellow().bold());

    let calls = Arc::new(AtomicUsize::new(0));
    let options = ObserveOptions::new().ttl_ms(FIVE_MINUTES_MS);

    let first = cache.observe(
        "projects",
        simulated(calls.clone(), Duration::from_millis(50), |_| {
            vec!["Atlas Holdings".to_string(), "Borealis Capital".to_string()]
        }),
        options.clone(),
    )?;
    check("first observer starts loading", first.is_loading())?;
    let snapshot = with_spinner("GET /api/projects".into(), first.wait_settled()).await?;
    println!("   {} {:?}", "data:".dimmed(), snapshot.data());

    tokio::time::sleep(Duration::from_millis(100)).await;

    let second_calls = Arc::new(AtomicUsize::new(0));
    let second = cache.observe(
        "projects",
        simulated(second_calls.clone(), Duration::from_millis(50), |_| Vec::<String>::new()),
        options,
    )?;
    check("second observer is served immediately", !second.is_loading())?;
    check(
        "second producer never called",
        second_calls.load(Ordering::SeqCst) == 0,
    )?;
    check("same value for both", second.data() == first.data())?;
    Ok(())
}

/// A refetch keeps the old value visible until the new one lands.
async fn stale_while_revalidate(cache: &KeyedAsyncCache) -> Result<()> {
    println!("\n{}", "2. Refetch keeps stale data visible".yellow().bold());

    let calls = Arc::new(AtomicUsize::new(0));
    let binding = cache.observe(
        "project:p1:deals",
        simulated(calls.clone(), Duration::from_millis(100), |n| (1..=n as u32).collect::<Vec<_>>()),
        ObserveOptions::new().ttl_ms(FIVE_MINUTES_MS),
    )?;
    binding.wait_settled().await;

    let probe = async {
        tokio::time::sleep(Duration::from_millis(20)).await;
        binding.snapshot()
    };
    let ((), during) = tokio::join!(binding.refetch(), probe);

    check(
        "loading while refetching",
        during.loading && during.phase == BindingPhase::Loading,
    )?;
    check(
        "old data visible while loading",
        during.data().map(Vec::as_slice) == Some(&[1][..]),
    )?;
    check(
        "new data after refetch",
        binding.data().as_deref().map(Vec::as_slice) == Some(&[1, 2][..]),
    )?;
    check("producer called twice", calls.load(Ordering::SeqCst) == 2)?;
    Ok(())
}

/// Substring invalidation removes every matching key and nothing else.
async fn pattern_invalidation(cache: &KeyedAsyncCache) -> Result<()> {
    println!("\n{}", "3. Invalidate by pattern".yellow().bold());

    let ttl = Duration::from_millis(FIVE_MINUTES_MS);
    cache.insert("proj-42:deals", vec!["Deal A"], ttl);
    cache.insert("proj-42:risks", vec!["Key-person risk"], ttl);
    cache.insert("proj-7:deals", vec!["Deal B"], ttl);

    let removed = cache.invalidate_by_pattern("proj-42");
    println!("   {} {}", "removed:".dimmed(), removed);
    check("both proj-42 keys removed", removed == 2)?;
    check("proj-7 untouched", cache.contains("proj-7:deals"))?;

    let calls = Arc::new(AtomicUsize::new(0));
    let binding = cache.observe(
        "proj-42:deals",
        simulated(calls.clone(), Duration::from_millis(30), |_| vec!["Deal A"]),
        ObserveOptions::new(),
    )?;
    binding.wait_settled().await;
    check("next observer refetches", calls.load(Ordering::SeqCst) == 1)?;

    binding.invalidate();
    check(
        "invalidate resets the binding",
        binding.data().is_none() && binding.phase() == BindingPhase::Invalidated,
    )?;
    Ok(())
}

/// A slow request started first never overwrites a newer one.
async fn superseded_request(cache: &KeyedAsyncCache) -> Result<()> {
    println!("\n{}", "4. Superseded request is discarded".yellow().bold());

    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    let producer = from_fn(move |cancel: CancelToken| {
        let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
        async move {
            // First call is slow, later calls are fast
            let delay = if n == 1 { 300 } else { 20 };
            tokio::time::sleep(Duration::from_millis(delay)).await;
            cancel.check()?;
            Ok::<String, CacheError>(format!("response #{}", n))
        }
    });

    let binding = cache.observe("deal:7:summary", producer, ObserveOptions::new())?;
    tokio::time::sleep(Duration::from_millis(10)).await;
    binding.refetch().await;
    tokio::time::sleep(Duration::from_millis(400)).await;

    let data = binding.data();
    println!("   {} {:?}", "data:".dimmed(), data);
    check(
        "newest response wins",
        data.as_deref().map(String::as_str) == Some("response #2"),
    )?;
    check("no error surfaced", binding.error().is_none())?;
    Ok(())
}

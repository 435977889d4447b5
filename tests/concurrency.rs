// tests/concurrency.rs
mod common;

use anyhow::{Result, bail};
use std::collections::HashSet;
use std::sync::{Arc, Barrier, Mutex};
use std::time::Duration;
use tablestream::testing::*;
use tablestream::transforms::*;
use tablestream::*;

fn numbers(n: i64) -> Vec<Record> {
    (0..n).map(|i| record! { "n" => i }).collect()
}

#[test]
fn concurrently_processes_every_record_once() -> Result<()> {
    common::init_logging();
    let doubled = map(|mut r| {
        let n = r.get("n").and_then(Value::as_i64).unwrap_or_default();
        r.insert("double", n * 2);
        Ok(r)
    });
    let table = transform(from_vec(numbers(200)), concurrently(doubled, 4));
    let expected: Vec<Record> = (0..200).map(|i| record! { "n" => i, "double" => i * 2 }).collect();
    assert_rows_unordered_eq(collect(&table)?, expected);
    Ok(())
}

#[test]
fn concurrently_runs_on_several_workers() -> Result<()> {
    let threads = Arc::new(Mutex::new(HashSet::new()));
    let seen = Arc::clone(&threads);
    let record_thread = each(move |_| {
        std::thread::sleep(Duration::from_millis(2));
        let name = std::thread::current().name().unwrap_or_default().to_string();
        seen.lock().map_err(|_| anyhow::anyhow!("poisoned"))?.insert(name);
        Ok(())
    });
    let table = transform(from_vec(numbers(64)), concurrently(record_thread, 4));
    assert_eq!(collect(&table)?.len(), 64);
    let names = threads.lock().map_err(|_| anyhow::anyhow!("poisoned"))?;
    assert!(names.len() > 1, "only ran on {names:?}");
    assert!(names.iter().all(|n| n.contains("-worker-each-")), "{names:?}");
    Ok(())
}

#[test]
fn zero_workers_means_one() -> Result<()> {
    let table = transform(from_vec(numbers(5)), concurrently(each(|_| Ok(())), 0));
    assert_eq!(collect(&table)?, numbers(5));
    Ok(())
}

#[test]
fn worker_error_fails_stage_and_drains_infinite_source() {
    let source = TrackedSource::infinite();
    let table = transform(
        source.clone(),
        concurrently(map(|_| bail!("worker failed")), 3),
    );
    assert_eq!(discard(&table).unwrap_err().to_string(), "worker failed");
    assert_consumed(&*source);
    assert!(source.wait_finished(Duration::from_secs(10)));
}

#[test]
fn one_failing_worker_among_healthy_ones() {
    let table = transform(
        from_vec(numbers(100)),
        concurrently(
            select(|r| {
                if r.get("n") == Some(&Value::Int(50)) {
                    bail!("record 50 rejected");
                }
                Ok(true)
            }),
            4,
        ),
    );
    assert_eq!(discard(&table).unwrap_err().to_string(), "record 50 rejected");
}

#[test]
#[should_panic(expected = "worker exploded")]
fn worker_panics_are_fatal() {
    let table = transform(
        from_vec(numbers(10)),
        concurrently(map(|_| panic!("worker exploded")), 2),
    );
    let _ = discard(&table);
}

#[test]
fn concurrently_default_uses_configured_workers() -> Result<()> {
    let table = transform(from_vec(numbers(20)), concurrently_default(each(|_| Ok(()))));
    assert_rows_unordered_eq(collect(&table)?, numbers(20));
    Ok(())
}

#[test]
#[should_panic(expected = "late worker panic")]
fn sibling_panic_after_a_worker_error_is_not_lost() {
    // Both records are held by different workers before either acts.
    let both_taken = Arc::new(Barrier::new(2));
    let table = transform(
        from_vec(numbers(2)),
        concurrently(
            each(move |r| {
                both_taken.wait();
                if r.get("n") == Some(&Value::Int(0)) {
                    bail!("early worker error");
                }
                std::thread::sleep(Duration::from_millis(100));
                panic!("late worker panic");
            }),
            2,
        ),
    );
    let _ = discard(&table);
}

fn worker_threads(table: &TableRef) -> Result<HashSet<String>> {
    Ok(collect(table)?
        .iter()
        .filter_map(|r| r.get("thread").and_then(Value::as_str).map(str::to_string))
        .collect())
}

fn record_thread(mut r: Record) -> Result<Record> {
    let name = std::thread::current().name().unwrap_or_default().to_string();
    r.insert("thread", name);
    Ok(r)
}

#[test]
fn workers_follow_the_stage_config() -> Result<()> {
    let config = EngineConfig::default().with_thread_prefix("etl");
    let table = transform_with(from_vec(numbers(10)), concurrently(map(record_thread), 2), &config);
    let threads = worker_threads(&table)?;
    assert!(!threads.is_empty());
    for name in &threads {
        assert!(name.starts_with("etl-worker-map-"), "unexpected worker thread {name}");
    }
    Ok(())
}

#[test]
fn concurrently_default_reads_the_stage_config() -> Result<()> {
    let config = EngineConfig::default()
        .with_thread_prefix("fanout")
        .with_default_concurrency(2);
    let table = transform_with(
        from_vec(numbers(30)),
        concurrently_default(map(record_thread)),
        &config,
    );
    let threads = worker_threads(&table)?;
    assert!(!threads.is_empty() && threads.len() <= 2, "workers: {threads:?}");
    assert!(threads.iter().all(|name| name.starts_with("fanout-worker-map-")));
    Ok(())
}

#[test]
fn builder_config_reaches_workers() -> Result<()> {
    let threads: HashSet<String> = Transformer::new(from_vec(numbers(10)))
        .with_config(EngineConfig::default().with_thread_prefix("built").with_default_concurrency(3))
        .concurrently_default(map(record_thread))
        .sink(collect)?
        .iter()
        .filter_map(|r| r.get("thread").and_then(Value::as_str).map(str::to_string))
        .collect();
    assert!(!threads.is_empty() && threads.len() <= 3, "workers: {threads:?}");
    assert!(threads.iter().all(|name| name.starts_with("built-worker-map-")));
    Ok(())
}

//! Snapshot delivery through sinks, and the probe log side channel.

mod common;

use std::collections::HashMap;
use std::fs;
use std::time::Duration;

use common::{wait_until, Flaky, Ticker};
use probe_agent::{MetricSnapshot, Probe, ProbeConfig, ProbeError, RandomProbe, Sink, Value};

const WAIT: Duration = Duration::from_secs(5);

fn drain(sink: &Sink) -> Vec<MetricSnapshot> {
    std::iter::from_fn(|| sink.try_pop())
        .map(|line| MetricSnapshot::from_json(&line).expect("valid snapshot json"))
        .collect()
}

fn by_metric(snaps: Vec<MetricSnapshot>) -> HashMap<String, Vec<Value>> {
    let mut out: HashMap<String, Vec<Value>> = HashMap::new();
    for s in snaps {
        out.entry(s.name).or_default().push(s.val.expect("value set"));
    }
    out
}

// =============================================================================
// Sink delivery
// =============================================================================

#[test]
fn test_five_cycles_deliver_five_ordered_snapshots() {
    let (ticker, _) = Ticker::new();
    let config = ProbeConfig::default()
        .with_periodicity(Duration::from_millis(30))
        .with_max_cycles(5);
    let probe = Probe::with_config("five", ticker, config).unwrap();
    let sink = probe.attach_sink(Some(Sink::bounded(100)));

    probe.activate().unwrap();
    assert!(probe.join(WAIT));
    assert_eq!(probe.cycles(), 5);

    let snaps = drain(&sink);
    assert_eq!(snaps.len(), 10);
    assert!(snaps.iter().all(|s| s.group.as_deref() == Some("five")));

    let per_metric = by_metric(snaps);
    let expected: Vec<Value> = (1..=5).map(Value::Int).collect();
    assert_eq!(per_metric["tick"], expected);
    assert_eq!(per_metric["counter"], expected);
}

#[test]
fn test_full_sink_drops_without_stalling() {
    let (ticker, _) = Ticker::new();
    let config = ProbeConfig::default()
        .with_periodicity(Duration::from_millis(10))
        .with_push_timeout(Duration::from_millis(20))
        .with_max_cycles(5);
    let probe = Probe::with_config("overflow", ticker, config).unwrap();
    let sink = probe.attach_sink(Some(Sink::bounded(2)));

    probe.activate().unwrap();
    assert!(probe.join(WAIT));

    assert_eq!(probe.cycles(), 5);
    // First cycle fills the sink; every later push times out.
    assert_eq!(sink.len(), 2);
    assert_eq!(drain(&sink).len(), 2);
}

#[test]
fn test_default_sink_uses_configured_capacity() {
    let (ticker, _) = Ticker::new();
    let config = ProbeConfig::default().with_sink_capacity(42);
    let probe = Probe::with_config("default-sink", ticker, config).unwrap();

    let sink = probe.attach_sink(None);
    assert_eq!(sink.capacity(), 42);
    assert!(probe.sink().unwrap().same_as(&sink));
}

#[test]
fn test_shared_sink_receives_from_many_probes() {
    let sink = Sink::bounded(1000);
    let probes: Vec<Probe> = ["a", "b", "c"]
        .into_iter()
        .map(|name| {
            let (ticker, _) = Ticker::new();
            let config = ProbeConfig::default()
                .with_periodicity(Duration::from_millis(10))
                .with_max_cycles(3);
            let probe = Probe::with_config(name, ticker, config).unwrap();
            probe.attach_sink(Some(sink.clone()));
            probe.activate().unwrap();
            probe
        })
        .collect();

    for p in &probes {
        assert!(p.join(WAIT));
    }

    let snaps = drain(&sink);
    assert_eq!(snaps.len(), 3 * 3 * 2);
    for name in ["a", "b", "c"] {
        let ticks: Vec<Value> = snaps
            .iter()
            .filter(|s| s.group.as_deref() == Some(name) && s.name == "tick")
            .filter_map(|s| s.val.clone())
            .collect();
        assert_eq!(ticks, vec![Value::Int(1), Value::Int(2), Value::Int(3)]);
    }
}

#[test]
fn test_detached_probe_keeps_collecting() {
    let (ticker, _) = Ticker::new();
    let probe = Probe::with_config(
        "detached",
        ticker,
        ProbeConfig::default().with_periodicity(Duration::from_millis(10)),
    )
    .unwrap();
    let sink = probe.attach_sink(None);

    probe.activate().unwrap();
    assert!(wait_until(WAIT, || probe.cycles() >= 2));
    assert!(probe.detach_sink().is_some());
    assert!(probe.sink().is_none());

    let mark = probe.cycles();
    assert!(wait_until(WAIT, || probe.cycles() >= mark + 2));
    let delivered = sink.len();

    let mark = probe.cycles();
    assert!(wait_until(WAIT, || probe.cycles() >= mark + 3));
    assert_eq!(sink.len(), delivered);

    let tick = probe
        .snapshot()
        .into_iter()
        .find(|s| s.name == "tick")
        .and_then(|s| s.val)
        .and_then(|v| v.as_f64())
        .unwrap();
    assert!(tick >= (mark + 3) as f64);

    probe.terminate();
    assert!(probe.join(WAIT));
}

#[test]
fn test_random_probe_end_to_end() {
    let config = ProbeConfig::default()
        .with_periodicity(Duration::from_millis(10))
        .with_max_cycles(3)
        .with_debug(true);
    let probe = Probe::with_config("dice", RandomProbe::seeded(42), config).unwrap();
    let sink = probe.attach_sink(None);

    probe.activate().unwrap();
    assert!(probe.join(WAIT));

    let per_metric = by_metric(drain(&sink));
    assert_eq!(per_metric.len(), 4);
    assert!(per_metric.values().all(|vals| vals.len() == 3));
    assert_eq!(
        per_metric["cycle_counter"],
        vec![Value::Int(1), Value::Int(2), Value::Int(3)]
    );
}

// =============================================================================
// Probe log
// =============================================================================

fn log_lines(probe: &Probe) -> Vec<String> {
    let path = probe.log_path().expect("logging enabled");
    fs::read_to_string(path)
        .unwrap()
        .lines()
        .map(str::to_owned)
        .collect()
}

#[test]
fn test_log_records_lifecycle() {
    let dir = tempfile::tempdir().unwrap();
    let (ticker, _) = Ticker::new();
    let probe = Probe::with_config(
        "logged",
        ticker,
        ProbeConfig::default().with_periodicity(Duration::from_millis(10)),
    )
    .unwrap();

    let path = probe.enable_logging(Some(dir.path())).unwrap();
    assert_eq!(path, dir.path().join("logs").join("logged").join("logged.log"));

    probe.activate().unwrap();
    probe.deactivate().unwrap();
    probe.terminate();
    assert!(probe.join(WAIT));

    let lines = log_lines(&probe);
    let messages: Vec<&str> = lines
        .iter()
        .map(|l| l.splitn(4, " - ").nth(3).unwrap())
        .collect();
    assert_eq!(
        messages,
        vec![
            "Initialized and logging turned ON",
            "Data collection ACTIVATED",
            "Data collection DEACTIVATED",
            "Data collection TERMINATED",
        ]
    );
    for line in &lines {
        let parts: Vec<&str> = line.splitn(4, " - ").collect();
        assert_eq!(parts[1], "logged");
        assert_eq!(parts[2], "INFO");
    }
}

#[test]
fn test_log_records_collection_errors() {
    let dir = tempfile::tempdir().unwrap();
    let config = ProbeConfig::default()
        .with_periodicity(Duration::from_millis(5))
        .with_max_consecutive_errors(1)
        .with_log_dir(dir.path());
    let probe = Probe::with_config("failing", Flaky::always(), config).unwrap();
    probe.enable_logging(None).unwrap();

    probe.activate().unwrap();
    assert!(probe.join(WAIT));

    let lines = log_lines(&probe);
    let errors: Vec<&String> = lines.iter().filter(|l| l.contains(" - ERROR - ")).collect();
    assert_eq!(
        errors.iter().filter(|l| l.contains("data collection FAILED")).count(),
        2
    );
    assert!(lines.iter().any(|l| l.ends_with("TERMINATING due to too many ERRORS")));
    assert!(lines.last().unwrap().ends_with("Data collection TERMINATED"));
}

#[test]
fn test_logging_failure_does_not_stop_probe() {
    let dir = tempfile::tempdir().unwrap();
    let blocker = dir.path().join("not-a-dir");
    fs::write(&blocker, b"x").unwrap();

    let (ticker, _) = Ticker::new();
    let probe = Probe::with_config(
        "nolog",
        ticker,
        ProbeConfig::default().with_periodicity(Duration::from_millis(10)),
    )
    .unwrap();

    let err = probe.enable_logging(Some(&blocker)).unwrap_err();
    assert!(matches!(err, ProbeError::LoggingInit { .. }));
    assert!(probe.log_path().is_none());

    probe.activate().unwrap();
    assert!(wait_until(WAIT, || probe.cycles() >= 2));
    probe.terminate();
    assert!(probe.join(WAIT));
}

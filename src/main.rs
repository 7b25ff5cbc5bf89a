use std::fs::File;
use std::io::BufWriter;
use std::path::Path;
use std::time::Duration;

use probe_agent::{
    AgentConfig, Collector, Probe, ProbeEntry, ProbeKind, ProcessProbe, RandomProbe, Sink,
};
use tracing_subscriber::EnvFilter;

/// How often the drain task re-checks a quiet sink for closure.
const DRAIN_POLL: Duration = Duration::from_millis(500);

/// Upper bound on waiting for each probe's worker at shutdown.
const JOIN_TIMEOUT: Duration = Duration::from_secs(10);

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // ── 1. Load configuration ────────────────────────────────────
    let config = match std::env::args_os().nth(1) {
        Some(path) => {
            tracing::info!(path = %Path::new(&path).display(), "Loading configuration");
            AgentConfig::load(Path::new(&path))?
        }
        None => {
            tracing::info!("No configuration given, using defaults");
            AgentConfig::default()
        }
    };

    // ── 2. Shared sink + JSONL consumer ──────────────────────────
    let sink = Sink::bounded(config.sink_capacity);
    let output = File::create(&config.output)?;
    tracing::info!(output = %config.output.display(), capacity = sink.capacity(), "Writing snapshots");

    let consumer = {
        let sink = sink.clone();
        tokio::task::spawn_blocking(move || {
            let mut out = BufWriter::new(output);
            sink.drain_into(&mut out, DRAIN_POLL)
        })
    };
    // Any early return below must still let the consumer finish.
    let closer = sink.close_guard();

    // ── 3. Build and activate probes ─────────────────────────────
    let mut probes = Vec::with_capacity(config.probes.len());
    for entry in &config.probes {
        let probe = build_probe(entry)?;
        probe.attach_sink(Some(sink.clone()));
        probe.activate()?;
        tracing::info!(
            probe = %probe.name(),
            id = %probe.id(),
            periodicity_secs = probe.periodicity().as_secs_f64(),
            metrics = ?probe.metric_names(),
            "Probe started"
        );
        probes.push(probe);
    }

    // ── 4. Run until Ctrl-C or the configured deadline ───────────
    match config.run_for {
        Some(limit) => {
            tokio::select! {
                _ = tokio::time::sleep(limit) => tracing::info!("Run time elapsed"),
                res = tokio::signal::ctrl_c() => { res?; tracing::info!("Interrupted"); }
            }
        }
        None => {
            tokio::signal::ctrl_c().await?;
            tracing::info!("Interrupted");
        }
    }

    // ── 5. Shut down ─────────────────────────────────────────────
    for probe in &probes {
        probe.terminate();
    }
    tokio::task::spawn_blocking(move || {
        for probe in &probes {
            if !probe.join(JOIN_TIMEOUT) {
                tracing::warn!(probe = %probe.name(), "Worker did not exit in time");
            }
        }
    })
    .await?;

    drop(closer);
    let written = consumer.await??;
    tracing::info!(snapshots = written, "Agent stopped");
    Ok(())
}

fn build_probe(entry: &ProbeEntry) -> Result<Probe, Box<dyn std::error::Error>> {
    let (default_name, collector): (&str, Box<dyn Collector>) = match entry.kind {
        ProbeKind::Random => ("RandomProbe", Box::new(RandomProbe::new())),
        ProbeKind::Process => ("ProcessProbe", Box::new(ProcessProbe::new())),
    };
    let name = entry.name.clone().unwrap_or_else(|| default_name.to_owned());
    let probe = Probe::from_boxed(name, collector, entry.config.clone())?;

    if entry.config.log_dir.is_some() {
        // Logging is optional; the probe runs either way.
        if let Err(e) = probe.enable_logging(None) {
            tracing::warn!(probe = %probe.name(), error = %e, "Continuing without probe log");
        }
    }
    Ok(probe)
}

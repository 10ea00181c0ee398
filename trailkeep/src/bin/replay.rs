//! Replay a recorded positioning log through a tracking session and save
//! the result, exercising the same pipeline as a live capture.
//!
//! Input is JSON lines, one raw sample per line:
//! `{"latitude":46.0,"longitude":8.0,"accuracy":5.0,"timestamp":1700000000000}`

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use serde_json::json;
use trailcore::{ManualClock, RawSample, SampleOutcome};
use trailkeep::{
    ChannelPositionSource, Collaborators, ElevationLookup, NoElevation, OpenElevationClient,
    PersistenceStore, SaveDecision, ScriptedPrompter, StopOutcome, TrackerConfig, TrackingSession,
};

#[derive(Parser, Debug)]
struct Args {
    /// JSON-lines file of raw positioning samples
    input: PathBuf,

    /// Name for the saved route (defaults to a date-based name)
    #[arg(long)]
    name: Option<String>,

    /// Directory holding the database and fallback store
    #[arg(long, default_value = ".")]
    data_dir: PathBuf,

    /// Tracker config file (JSON)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Elevation service endpoint; overrides the config
    #[arg(long)]
    elevation_url: Option<String>,
}

fn load_samples(path: &Path) -> anyhow::Result<Vec<RawSample>> {
    let file = File::open(path).with_context(|| format!("opening {}", path.display()))?;
    let mut samples = Vec::new();
    for (n, line) in BufReader::new(file).lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let sample: RawSample = serde_json::from_str(&line)
            .with_context(|| format!("{}:{}: bad sample", path.display(), n + 1))?;
        samples.push(sample);
    }
    Ok(samples)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    trailkeep::init_logging();
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => TrackerConfig::load(path)?,
        None => TrackerConfig::in_dir(&args.data_dir),
    };
    if args.elevation_url.is_some() {
        config.elevation_url = args.elevation_url.clone();
    }

    let samples = load_samples(&args.input)?;
    let Some(first) = samples.first() else {
        anyhow::bail!("{} contains no samples", args.input.display());
    };

    // Replay time follows the sample timestamps
    let clock = Arc::new(ManualClock::new(first.timestamp));
    let store = PersistenceStore::open(&config, first.timestamp).await?;
    let elevation: Arc<dyn ElevationLookup> = match &config.elevation_url {
        Some(url) => Arc::new(OpenElevationClient::new(url.as_str())?),
        None => Arc::new(NoElevation),
    };
    let prompter = Arc::new(
        ScriptedPrompter::new().answer_save(SaveDecision::Saved(args.name.clone().unwrap_or_default())),
    );

    let mut session = TrackingSession::new(
        config,
        store,
        Collaborators {
            positions: Arc::new(ChannelPositionSource::new()),
            elevation,
            prompter,
        },
        clock.clone(),
    );
    session.start().await?;

    let mut accepted = 0usize;
    let mut rejected = 0usize;
    let mut last_ts = first.timestamp;
    for sample in samples.iter().copied() {
        if sample.timestamp > last_ts {
            clock.advance((sample.timestamp - last_ts) as u64);
            last_ts = sample.timestamp;
        }
        match session.process_sample(sample).await {
            SampleOutcome::Accepted { .. } => accepted += 1,
            SampleOutcome::Rejected(_) => rejected += 1,
        }
    }
    session.flush_elevations().await;

    let report = match session.stop().await? {
        StopOutcome::Saved(route) => json!({
            "id": route.id,
            "name": route.name,
            "entries": route.entries.len(),
            "distanceKm": route.total_distance_km,
            "elapsedMs": route.elapsed_ms,
        }),
        other => json!({ "outcome": format!("{:?}", other) }),
    };

    println!(
        "{}",
        serde_json::to_string_pretty(&json!({
            "samples": samples.len(),
            "accepted": accepted,
            "rejected": rejected,
            "route": report,
            "backend": session.store().active_backend().to_string(),
        }))?
    );
    Ok(())
}

//! CLI entrypoint for the sigcore fixture-replay harness.

use std::fs;
use std::path::PathBuf;

use clap::{Parser, Subcommand};
use serde::Deserialize;
use sigcore::cluster::DataPoint;
use sigcore::types::{Frame, Pulse};
use sigcore::CoreContext;

/// Fixture-driven replay tooling for the signal-analysis core.
#[derive(Debug, Parser)]
#[command(name = "sigcore-harness")]
#[command(about = "Replay captured pulse/frame fixtures through sigcore")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Replay a JSON fixture of pulses/frames and print the resulting
    /// analysis snapshots.
    Replay {
        /// Path to a fixture JSON file (see `FixtureFile`).
        #[arg(long)]
        fixture: PathBuf,
        /// Cluster count to request when clustering is present in the fixture.
        #[arg(long, default_value_t = 0)]
        k: usize,
    },
}

#[derive(Debug, Deserialize)]
struct PulseFixture {
    level: u8,
    width_us: u16,
    #[serde(default)]
    timestamp_us: u32,
}

#[derive(Debug, Deserialize)]
struct FrameFixture {
    #[serde(default)]
    timestamp_us: u32,
    #[serde(default)]
    duration_us: u32,
    #[serde(default)]
    rssi_dbm: i16,
    #[serde(default)]
    frequency_hz: u32,
    data: Vec<u8>,
}

#[derive(Debug, Deserialize)]
struct ClusterPointFixture {
    x: i32,
    y: i32,
}

#[derive(Debug, Default, Deserialize)]
struct FixtureFile {
    #[serde(default)]
    pulses: Vec<PulseFixture>,
    #[serde(default)]
    frames: Vec<FrameFixture>,
    #[serde(default)]
    cluster_points: Vec<ClusterPointFixture>,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let cli = Cli::parse();

    match cli.command {
        Command::Replay { fixture, k } => replay(&fixture, k)?,
    }
    Ok(())
}

fn replay(fixture_path: &PathBuf, k: usize) -> Result<(), Box<dyn std::error::Error>> {
    let raw = fs::read_to_string(fixture_path)?;
    let fixture: FixtureFile = serde_json::from_str(&raw)?;
    log::info!(
        "loaded fixture: {} pulses, {} frames, {} cluster points",
        fixture.pulses.len(),
        fixture.frames.len(),
        fixture.cluster_points.len()
    );

    let ctx = CoreContext::default();
    ctx.start_fingerprinting();
    ctx.start_threat_analysis();

    for p in &fixture.pulses {
        ctx.on_pulse(Pulse::new(p.level, p.width_us, p.timestamp_us));
    }
    for f in &fixture.frames {
        let frame = Frame::new(f.timestamp_us, f.duration_us, f.rssi_dbm, f.frequency_hz, &f.data, 0, 0);
        ctx.on_frame(&frame);
    }
    for c in &fixture.cluster_points {
        ctx.push_cluster_point(DataPoint::new(c.x, c.y));
    }

    ctx.analyze_protocol();
    let threat = ctx.assess_threat();
    let protocol = ctx.snapshot_protocol_hypothesis();
    let fingerprint = ctx.snapshot_fingerprint();

    println!("fingerprint progress: {}%", ctx.fingerprint_progress());
    println!("fingerprint hash valid: {}", fingerprint.hash_is_valid());
    println!("protocol modulation: {:?} (confidence {})", protocol.modulation, protocol.modulation_confidence);
    println!("protocol encoding: {:?} (confidence {})", protocol.encoding, protocol.encoding_confidence);
    println!("threat level: {} (score {})", threat.level.as_str(), threat.vulnerability_score);

    if !fixture.cluster_points.is_empty() {
        let result = ctx.run_clustering(k);
        println!("clustering: k={} iterations={} converged={}", result.k, result.iterations, result.converged);
    }

    Ok(())
}

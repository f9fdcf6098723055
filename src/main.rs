// Replays a recorded detection scenario through the measurement engine and logs
// every lifecycle change. Useful for checking timing parameters against real
// detector output without a camera attached.

use anyhow::{Context, Result};
use power_scouter::ScouterConfig;
use power_scouter::pipeline::{FaceObservation, FrameInfo, MeasurementPipeline, MeasurementState};
use serde::Deserialize;
use std::env;
use std::fs;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Deserialize)]
struct Scenario {
    width: u32,
    height: u32,
    #[serde(default)]
    rotation_degrees: u32,
    frames: Vec<ScenarioFrame>,
}

#[derive(Debug, Deserialize)]
struct ScenarioFrame {
    timestamp_ms: u64,
    #[serde(default)]
    faces: Vec<FaceObservation>,
    /// A frame whose detection failed upstream.
    #[serde(default)]
    detector_failed: bool,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("power_scouter=info")),
        )
        .init();

    let args: Vec<String> = env::args().collect();
    if args.len() < 2 {
        println!("Usage: power_scouter <scenario.yaml> [config.yaml]");
        return Ok(());
    }

    let config = match args.get(2) {
        Some(path) => ScouterConfig::load(path)
            .with_context(|| format!("failed to load config from {}", path))?,
        None => ScouterConfig::default(),
    };
    info!(
        measuring_duration_ms = config.measuring_duration_ms,
        grace_period_ms = config.grace_period_ms,
        "configuration loaded"
    );

    let contents = fs::read_to_string(&args[1])
        .with_context(|| format!("failed to read scenario {}", args[1]))?;
    let scenario: Scenario = serde_yaml::from_str(&contents).context("invalid scenario file")?;
    info!("Replaying {} frame(s) from {}", scenario.frames.len(), args[1]);

    let mut pipeline = MeasurementPipeline::new(config)?;

    for frame in &scenario.frames {
        let info = FrameInfo::new(
            frame.timestamp_ms,
            scenario.width,
            scenario.height,
            scenario.rotation_degrees,
        );
        let faces: &[FaceObservation] = if frame.detector_failed {
            warn!(timestamp_ms = frame.timestamp_ms, "detector failure, replaying as empty frame");
            &[]
        } else {
            &frame.faces
        };

        let report = pipeline.process_frame(&info, faces, frame.timestamp_ms);

        for id in &report.newly_done {
            if let Some(MeasurementState::Done(done)) = report.snapshot.get(*id) {
                info!(
                    identity = id,
                    power = done.averaged_score,
                    t = report.timestamp_ms,
                    "power level measured"
                );
            }
        }
        for id in &report.lost {
            info!(identity = id, t = report.timestamp_ms, "face lost");
        }
        debug!(t = report.timestamp_ms, tracked = report.snapshot.len(), "frame processed");
    }

    let snapshot = pipeline.snapshot();
    println!("Final snapshot ({} face(s)):", snapshot.len());
    for (id, state) in snapshot.iter() {
        match state {
            MeasurementState::Measuring(face) => println!(
                "  #{:<4} measuring  samples={} running_avg={}",
                id,
                face.samples.len(),
                face.running_average()
            ),
            MeasurementState::Done(face) => {
                println!("  #{:<4} done       power={}", id, face.averaged_score)
            }
            MeasurementState::Idle => {}
        }
    }
    if let Some(main) = snapshot.main_subject().and_then(MeasurementState::identity) {
        println!("Main subject: #{}", main);
    }

    Ok(())
}

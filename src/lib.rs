// THEORY:
// This file is the main entry point for the `power_scouter` library crate.
// It defines the public API exposed to the application that drives the camera,
// the face detector and the overlay.
//
// The primary exports are the two pipelines. `MeasurementPipeline` is the
// synchronous owner of the measurement state for a single-threaded frame loop;
// `ParallelPipeline` runs the detector and the aggregation on separate tokio tasks
// connected by latest-only handoff slots. Both are thin shells around the pure
// per-frame update in `core_modules::session`.

pub mod config;
pub mod core_modules;
pub mod error;
pub mod parallel_pipeline;
pub mod pipeline;

pub use config::ScouterConfig;
pub use error::{DetectorError, Error, Result};
pub use parallel_pipeline::{Clock, Detector, ParallelPipeline, SystemClock};
pub use pipeline::{FrameData, FrameInfo, FrameReport, MeasurementPipeline};

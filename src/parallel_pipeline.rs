// THEORY:
// The `parallel_pipeline` runs the engine as two cooperating tokio tasks so that slow
// detector inference never blocks whoever is rendering the results.
//
//   submit_frame ─▶ [frame slot] ─▶ detector task ─▶ [batch slot] ─▶ aggregator task ─▶ watch<FrameReport>
//
// 1.  **Latest-Only Handoff**: Both slots hold a single value. Putting a new value
//     into an occupied slot replaces the old one, so under backpressure older frames
//     are dropped instead of queued.
// 2.  **Future Boundary**: The detector is an async collaborator. A failed detection is
//     logged and treated as a frame with no faces; it never tears the pipeline down.
// 3.  **Single Aggregator**: Only the aggregator task touches the snapshot, one update
//     at a time. It stamps each update with the wall clock, so grace periods expire by
//     time, not by frame count.
// 4.  **Whole-Report Publication**: Reports go out through a `watch` channel. Readers
//     always see a complete report; there is no partially built state to observe.

use crate::config::ScouterConfig;
use crate::core_modules::detection::{Detection, into_detections};
use crate::core_modules::power_calculator::PowerCalculator;
use crate::core_modules::session::{MeasurementSession, Snapshot};
use crate::error::{DetectorError, Error, Result};
use crate::pipeline::{FaceObservation, FrameData, FrameInfo, FrameReport};
use futures::future::BoxFuture;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::sync::{Notify, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

/// An asynchronous face detector backend.
pub trait Detector: Send + Sync + 'static {
    fn detect<'a>(
        &'a self,
        frame: &'a FrameData,
    ) -> BoxFuture<'a, std::result::Result<Vec<FaceObservation>, DetectorError>>;
}

/// Source of the `now` timestamps used for measurement windows and grace periods.
pub trait Clock: Send + Sync + 'static {
    fn now_ms(&self) -> u64;
}

/// Milliseconds since the Unix epoch.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0)
    }
}

/// A single-value handoff slot. `put` overwrites whatever has not been taken yet.
pub struct LatestSlot<T> {
    value: Mutex<Option<T>>,
    notify: Notify,
    closed: AtomicBool,
}

impl<T> Default for LatestSlot<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> LatestSlot<T> {
    pub fn new() -> Self {
        Self {
            value: Mutex::new(None),
            notify: Notify::new(),
            closed: AtomicBool::new(false),
        }
    }

    /// Stores `value`, returning true if an untaken value was replaced.
    pub fn put(&self, value: T) -> bool {
        let replaced = self
            .value
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(value)
            .is_some();
        self.notify.notify_one();
        replaced
    }

    /// Waits for the next value. Returns `None` once the slot is closed and drained.
    pub async fn take(&self) -> Option<T> {
        loop {
            let taken = self.value.lock().unwrap_or_else(PoisonError::into_inner).take();
            if let Some(value) = taken {
                return Some(value);
            }
            if self.closed.load(Ordering::Acquire) {
                return None;
            }
            self.notify.notified().await;
        }
    }

    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
        self.notify.notify_one();
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

/// One frame's scored detections on their way to the aggregator.
#[derive(Debug, Clone)]
pub struct DetectionBatch {
    pub frame: FrameInfo,
    pub detections: Vec<Detection>,
}

#[derive(Debug, Default)]
struct Counters {
    frames_submitted: AtomicU64,
    frames_dropped: AtomicU64,
    batches_dropped: AtomicU64,
    detector_failures: AtomicU64,
    reports_published: AtomicU64,
}

/// Point-in-time view of the pipeline counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PipelineStats {
    pub frames_submitted: u64,
    /// Frames replaced in the ingress slot before the detector picked them up.
    pub frames_dropped: u64,
    /// Detection batches replaced before the aggregator picked them up.
    pub batches_dropped: u64,
    pub detector_failures: u64,
    pub reports_published: u64,
}

pub struct ParallelPipeline {
    frames: Arc<LatestSlot<FrameData>>,
    batches: Arc<LatestSlot<DetectionBatch>>,
    report_rx: watch::Receiver<FrameReport>,
    counters: Arc<Counters>,
    workers: Vec<JoinHandle<()>>,
}

impl ParallelPipeline {
    /// Starts the detector and aggregator tasks. Must be called inside a tokio runtime.
    pub fn spawn<D: Detector, C: Clock>(config: ScouterConfig, detector: D, clock: C) -> Result<Self> {
        config.validate()?;

        let frames = Arc::new(LatestSlot::<FrameData>::new());
        let batches = Arc::new(LatestSlot::<DetectionBatch>::new());
        let counters = Arc::new(Counters::default());
        let (report_tx, report_rx) = watch::channel(FrameReport::default());

        let detector_worker = tokio::spawn(run_detector(
            detector,
            PowerCalculator::new(),
            Arc::clone(&frames),
            Arc::clone(&batches),
            Arc::clone(&counters),
        ));

        let aggregator_worker = tokio::spawn(run_aggregator(
            MeasurementSession::from_config(&config),
            clock,
            Arc::clone(&batches),
            report_tx,
            Arc::clone(&counters),
        ));

        Ok(Self {
            frames,
            batches,
            report_rx,
            counters,
            workers: vec![detector_worker, aggregator_worker],
        })
    }

    /// Queues a frame for detection, replacing any frame still waiting.
    pub fn submit_frame(&self, frame: FrameData) -> Result<()> {
        if self.frames.is_closed() {
            return Err(Error::PipelineClosed("frame ingress is closed".to_string()));
        }
        self.counters.frames_submitted.fetch_add(1, Ordering::Relaxed);
        if self.frames.put(frame) {
            self.counters.frames_dropped.fetch_add(1, Ordering::Relaxed);
            debug!("detector busy, dropped the previous pending frame");
        }
        Ok(())
    }

    /// A receiver that is notified whenever a new report is published.
    pub fn subscribe(&self) -> watch::Receiver<FrameReport> {
        self.report_rx.clone()
    }

    pub fn latest_report(&self) -> FrameReport {
        self.report_rx.borrow().clone()
    }

    pub fn latest_snapshot(&self) -> Snapshot {
        self.report_rx.borrow().snapshot.clone()
    }

    pub fn stats(&self) -> PipelineStats {
        PipelineStats {
            frames_submitted: self.counters.frames_submitted.load(Ordering::Relaxed),
            frames_dropped: self.counters.frames_dropped.load(Ordering::Relaxed),
            batches_dropped: self.counters.batches_dropped.load(Ordering::Relaxed),
            detector_failures: self.counters.detector_failures.load(Ordering::Relaxed),
            reports_published: self.counters.reports_published.load(Ordering::Relaxed),
        }
    }

    /// Stops accepting frames, lets the frame already queued finish, and waits for both tasks.
    pub async fn shutdown(mut self) {
        self.frames.close();
        for worker in std::mem::take(&mut self.workers) {
            if let Err(err) = worker.await {
                error!(%err, "pipeline worker ended abnormally");
            }
        }
    }
}

impl Drop for ParallelPipeline {
    fn drop(&mut self) {
        // Best effort shutdown on drop
        self.frames.close();
        self.batches.close();
    }
}

async fn run_detector<D: Detector>(
    detector: D,
    calculator: PowerCalculator,
    frames: Arc<LatestSlot<FrameData>>,
    batches: Arc<LatestSlot<DetectionBatch>>,
    counters: Arc<Counters>,
) {
    while let Some(frame) = frames.take().await {
        let observations = match detector.detect(&frame).await {
            Ok(observations) => observations,
            Err(err) => {
                counters.detector_failures.fetch_add(1, Ordering::Relaxed);
                warn!(
                    %err,
                    timestamp_ms = frame.info.timestamp_ms,
                    "detection failed, treating frame as empty"
                );
                Vec::new()
            }
        };

        let batch = DetectionBatch {
            frame: frame.info,
            detections: into_detections(&observations, &calculator),
        };
        if batches.put(batch) {
            counters.batches_dropped.fetch_add(1, Ordering::Relaxed);
            debug!("aggregator busy, dropped the previous pending batch");
        }
    }
    batches.close();
}

async fn run_aggregator<C: Clock>(
    session: MeasurementSession,
    clock: C,
    batches: Arc<LatestSlot<DetectionBatch>>,
    report_tx: watch::Sender<FrameReport>,
    counters: Arc<Counters>,
) {
    let mut snapshot = Snapshot::empty();
    while let Some(batch) = batches.take().await {
        let now_ms = clock.now_ms();
        let next = session.update(&snapshot, &batch.detections, now_ms);
        let report = FrameReport::between(&snapshot, next.clone(), &batch.frame, now_ms);
        snapshot = next;

        counters.reports_published.fetch_add(1, Ordering::Relaxed);
        report_tx.send_replace(report);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::{MeasurementState, Region};
    use futures::FutureExt;
    use std::time::Duration;

    #[derive(Clone, Default)]
    struct ManualClock(Arc<AtomicU64>);

    impl ManualClock {
        fn set(&self, now_ms: u64) {
            self.0.store(now_ms, Ordering::SeqCst);
        }
    }

    impl Clock for ManualClock {
        fn now_ms(&self) -> u64 {
            self.0.load(Ordering::SeqCst)
        }
    }

    struct FixedDetector(Vec<FaceObservation>);

    impl Detector for FixedDetector {
        fn detect<'a>(
            &'a self,
            _frame: &'a FrameData,
        ) -> BoxFuture<'a, std::result::Result<Vec<FaceObservation>, DetectorError>> {
            async move { Ok(self.0.clone()) }.boxed()
        }
    }

    struct FailingDetector;

    impl Detector for FailingDetector {
        fn detect<'a>(
            &'a self,
            _frame: &'a FrameData,
        ) -> BoxFuture<'a, std::result::Result<Vec<FaceObservation>, DetectorError>> {
            async { Err::<Vec<FaceObservation>, _>(DetectorError::Backend("model not loaded".to_string())) }
                .boxed()
        }
    }

    fn frame(timestamp_ms: u64) -> FrameData {
        FrameData::new(FrameInfo::new(timestamp_ms, 640, 480, 0), vec![0u8; 16])
    }

    async fn next_report(rx: &mut watch::Receiver<FrameReport>) -> FrameReport {
        tokio::time::timeout(Duration::from_secs(2), rx.changed())
            .await
            .expect("timed out waiting for a report")
            .expect("report channel closed");
        rx.borrow_and_update().clone()
    }

    #[tokio::test]
    async fn test_latest_slot_keeps_only_newest() {
        let slot = LatestSlot::new();
        assert!(!slot.put(1));
        assert!(slot.put(2));
        assert_eq!(slot.take().await, Some(2));

        slot.put(3);
        slot.close();
        assert_eq!(slot.take().await, Some(3));
        assert_eq!(slot.take().await, None);
    }

    #[tokio::test]
    async fn test_frames_flow_into_reports() {
        let clock = ManualClock::default();
        let detector = FixedDetector(vec![
            FaceObservation::new(Region::new(0.0, 0.0, 200.0, 200.0)).with_tracking_id(7),
        ]);
        let config = ScouterConfig {
            measuring_duration_ms: 100,
            ..ScouterConfig::default()
        };
        let pipeline = ParallelPipeline::spawn(config, detector, clock.clone()).unwrap();
        let mut reports = pipeline.subscribe();

        clock.set(1_000);
        pipeline.submit_frame(frame(1_000)).unwrap();
        let report = next_report(&mut reports).await;
        assert!(matches!(report.snapshot.get(7), Some(MeasurementState::Measuring(_))));
        assert_eq!(report.timestamp_ms, 1_000);
        assert_eq!((report.image_width, report.image_height), (640, 480));

        clock.set(1_100);
        pipeline.submit_frame(frame(1_100)).unwrap();
        let report = next_report(&mut reports).await;
        assert_eq!(report.newly_done, vec![7]);
        assert!(pipeline.latest_snapshot().get(7).is_some_and(MeasurementState::is_done));

        pipeline.shutdown().await;
    }

    #[tokio::test]
    async fn test_detector_failure_counts_as_empty_frame() {
        let clock = ManualClock::default();
        let pipeline =
            ParallelPipeline::spawn(ScouterConfig::default(), FailingDetector, clock.clone()).unwrap();
        let mut reports = pipeline.subscribe();

        pipeline.submit_frame(frame(0)).unwrap();
        let report = next_report(&mut reports).await;
        assert!(report.snapshot.is_empty());

        let stats = pipeline.stats();
        assert_eq!(stats.detector_failures, 1);
        assert_eq!(stats.reports_published, 1);
        assert_eq!(stats.frames_submitted, 1);

        pipeline.shutdown().await;
    }

    #[tokio::test]
    async fn test_invalid_config_is_rejected() {
        let config = ScouterConfig {
            measuring_duration_ms: 0,
            ..ScouterConfig::default()
        };
        let result = ParallelPipeline::spawn(config, FailingDetector, SystemClock);
        assert!(matches!(result, Err(Error::InvalidConfig(_))));
    }
}

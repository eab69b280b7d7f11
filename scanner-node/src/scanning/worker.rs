use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, info_span, warn};

use super::{CodeExtractor, PackAccumulator};
use crate::camera::{Frame, FrameSource};
use crate::config::CameraConfig;
use crate::messaging::EventSender;
use crate::recognition::PackRecognizer;
use crate::utils::metrics::Metrics;
use packscan_common::{ScannerEvent, WorkerId};

/// Consecutive failed reads after which the stream is treated as lost.
const MAX_CONSECUTIVE_READ_FAILURES: u32 = 5;
const CANCEL_POLL: Duration = Duration::from_millis(50);

/// One camera: reads frames, tracks presence and emits a result per pack.
///
/// Runs on its own thread and only talks outward through its
/// [`EventSender`]. Emits `StartScanning` first and `EndScanning` last.
///
/// When the source ends or fails and `auto_reconnect` is set, the source is
/// reopened and an episode in progress carries over. Once
/// `max_reconnect_attempts` consecutive reopens have produced no frame, the
/// open episode is flushed and the worker stops.
pub struct CameraWorker {
    config: CameraConfig,
    source: Box<dyn FrameSource>,
    recognizer: Box<dyn PackRecognizer>,
    extractor: Box<dyn CodeExtractor>,
    accumulator: PackAccumulator,
    events: EventSender,
    cancel: CancellationToken,
    metrics: Arc<Metrics>,
    present: bool,
}

impl CameraWorker {
    pub fn new(
        config: CameraConfig,
        source: Box<dyn FrameSource>,
        recognizer: Box<dyn PackRecognizer>,
        extractor: Box<dyn CodeExtractor>,
        events: EventSender,
        cancel: CancellationToken,
        metrics: Arc<Metrics>,
    ) -> Self {
        let accumulator = PackAccumulator::new(config.worker_id);
        Self {
            config,
            source,
            recognizer,
            extractor,
            accumulator,
            events,
            cancel,
            metrics,
            present: false,
        }
    }

    pub fn worker_id(&self) -> WorkerId {
        self.config.worker_id
    }

    pub fn spawn(self) -> std::io::Result<JoinHandle<()>> {
        thread::Builder::new()
            .name(format!("camera-{}", self.worker_id()))
            .spawn(move || self.run())
    }

    pub fn run(mut self) {
        let worker_id = self.worker_id();
        let span = info_span!("camera_worker", worker_id, camera = %self.config.name);
        let _guard = span.enter();

        info!(source = %self.source.describe(), extractor = self.extractor.name(), "Camera worker started");
        self.events.send(ScannerEvent::StartScanning {
            worker_id,
            at: Utc::now(),
        });

        let mut connected = match self.source.open() {
            Ok(()) => true,
            Err(e) => {
                self.report_error(format!("failed to open source: {}", e));
                false
            }
        };
        let mut frame_index: u64 = 0;
        let mut reconnect_attempts: u32 = 0;
        let mut read_failures: u32 = 0;

        while !self.cancel.is_cancelled() {
            if !connected {
                if !self.config.auto_reconnect {
                    info!("Source finished, auto reconnect disabled");
                    break;
                }
                reconnect_attempts += 1;
                if let Some(max) = self.config.max_reconnect_attempts {
                    if reconnect_attempts > max {
                        warn!(attempts = max, "Giving up on source after reconnect attempts");
                        break;
                    }
                }
                if !self.wait(self.config.reconnect_delay()) {
                    break;
                }
                debug!(attempt = reconnect_attempts, "Reopening source");
                match self.source.reopen() {
                    Ok(()) => {
                        connected = true;
                        read_failures = 0;
                    }
                    Err(e) => self.report_error(format!("failed to reopen source: {}", e)),
                }
                continue;
            }

            match self.source.read() {
                Ok(Some(frame)) => {
                    reconnect_attempts = 0;
                    read_failures = 0;
                    self.process(&frame, frame_index);
                    frame_index += 1;
                }
                Ok(None) => {
                    info!(frames = frame_index, "Source exhausted");
                    connected = false;
                }
                Err(e) => {
                    self.metrics.record_frame_error(worker_id);
                    self.report_error(format!("frame read failed: {}", e));
                    read_failures += 1;
                    if read_failures >= MAX_CONSECUTIVE_READ_FAILURES {
                        warn!(failures = read_failures, "Too many failed reads, treating source as lost");
                        connected = false;
                    }
                }
            }
        }

        if self.cancel.is_cancelled() {
            info!("Camera worker cancelled");
        }
        if let Some(result) = self.accumulator.flush(Utc::now()) {
            info!("Flushing pack still in view");
            self.metrics.record_camera_result(worker_id);
            self.events.send(ScannerEvent::CameraPackResult(result));
        }
        self.source.close();
        self.events.send(ScannerEvent::EndScanning {
            worker_id,
            at: Utc::now(),
        });
        info!(frames = frame_index, "Camera worker stopped");
    }

    fn process(&mut self, frame: &Frame, frame_index: u64) {
        let worker_id = self.worker_id();
        self.metrics.record_frame(worker_id);

        if frame_index % u64::from(self.config.frames_per_check.max(1)) == 0 {
            self.present = self.recognizer.is_recognized(frame);
        }

        let codes = if self.present {
            match self.extractor.extract(frame) {
                Ok(codes) => Some(codes),
                Err(e) => {
                    debug!(sequence = frame.sequence_num, error = %e, "Code extraction failed");
                    None
                }
            }
        } else {
            None
        };

        if let Some(result) = self.accumulator.step(self.present, codes, frame.captured_at) {
            self.metrics.record_camera_result(worker_id);
            self.events.send(ScannerEvent::CameraPackResult(result));
        }
    }

    fn report_error(&self, message: String) {
        warn!(error = %message, "Camera task error");
        self.events.send(ScannerEvent::TaskError {
            worker_id: self.worker_id(),
            message,
            at: Utc::now(),
        });
    }

    /// Sleeps for `delay` unless cancelled first. Returns false on cancel.
    fn wait(&self, delay: Duration) -> bool {
        let deadline = Instant::now() + delay;
        loop {
            if self.cancel.is_cancelled() {
                return false;
            }
            let now = Instant::now();
            if now >= deadline {
                return true;
            }
            thread::sleep(CANCEL_POLL.min(deadline - now));
        }
    }
}

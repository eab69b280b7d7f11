use prometheus::{Encoder, IntCounter, IntCounterVec, Opts, Registry, TextEncoder};

use crate::error::{Result, ScannerError};
use packscan_common::WorkerId;

/// Station counters. Each instance owns its registry so several pipelines
/// (or tests) can run in one process.
pub struct Metrics {
    registry: Registry,
    frames: IntCounterVec,
    frame_errors: IntCounterVec,
    camera_results: IntCounterVec,
    events_dropped: IntCounter,
    packs_with_codes: IntCounter,
    packs_bad_codes: IntCounter,
    notifications_failed: IntCounter,
}

impl Metrics {
    pub fn new() -> Result<Self> {
        let registry = Registry::new_custom(Some("packscan".to_string()), None)?;

        let frames = IntCounterVec::new(
            Opts::new("frames_total", "Frames read per camera"),
            &["worker"],
        )?;
        let frame_errors = IntCounterVec::new(
            Opts::new("frame_errors_total", "Failed frame reads per camera"),
            &["worker"],
        )?;
        let camera_results = IntCounterVec::new(
            Opts::new("camera_results_total", "Presence episodes reported per camera"),
            &["worker"],
        )?;
        let events_dropped = IntCounter::new(
            "events_dropped_total",
            "Worker events dropped because the controller queue stayed full",
        )?;
        let packs_with_codes = IntCounter::new("packs_with_codes_total", "Confirmed packs")?;
        let packs_bad_codes = IntCounter::new("packs_bad_codes_total", "Packs with bad codes")?;
        let notifications_failed = IntCounter::new(
            "notifications_failed_total",
            "Server notifications that failed",
        )?;

        registry.register(Box::new(frames.clone()))?;
        registry.register(Box::new(frame_errors.clone()))?;
        registry.register(Box::new(camera_results.clone()))?;
        registry.register(Box::new(events_dropped.clone()))?;
        registry.register(Box::new(packs_with_codes.clone()))?;
        registry.register(Box::new(packs_bad_codes.clone()))?;
        registry.register(Box::new(notifications_failed.clone()))?;

        Ok(Self {
            registry,
            frames,
            frame_errors,
            camera_results,
            events_dropped,
            packs_with_codes,
            packs_bad_codes,
            notifications_failed,
        })
    }

    pub fn record_frame(&self, worker: WorkerId) {
        self.frames.with_label_values(&[&worker.to_string()]).inc();
    }

    pub fn record_frame_error(&self, worker: WorkerId) {
        self.frame_errors.with_label_values(&[&worker.to_string()]).inc();
    }

    pub fn record_camera_result(&self, worker: WorkerId) {
        self.camera_results.with_label_values(&[&worker.to_string()]).inc();
    }

    pub fn record_event_dropped(&self) {
        self.events_dropped.inc();
    }

    pub fn record_pack(&self, confirmed: bool) {
        if confirmed {
            self.packs_with_codes.inc();
        } else {
            self.packs_bad_codes.inc();
        }
    }

    pub fn record_notification_failure(&self) {
        self.notifications_failed.inc();
    }

    pub fn frames(&self, worker: WorkerId) -> u64 {
        self.frames.with_label_values(&[&worker.to_string()]).get()
    }

    pub fn packs_with_codes(&self) -> u64 {
        self.packs_with_codes.get()
    }

    pub fn packs_bad_codes(&self) -> u64 {
        self.packs_bad_codes.get()
    }

    pub fn events_dropped(&self) -> u64 {
        self.events_dropped.get()
    }

    /// Prometheus text exposition of all counters.
    pub fn render(&self) -> Result<String> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| ScannerError::SerializationError(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_show_up_in_rendered_text() {
        let metrics = Metrics::new().unwrap();
        metrics.record_frame(1);
        metrics.record_frame(1);
        metrics.record_pack(true);
        metrics.record_pack(false);
        metrics.record_pack(false);

        assert_eq!(metrics.frames(1), 2);
        assert_eq!(metrics.packs_bad_codes(), 2);

        let text = metrics.render().unwrap();
        assert!(text.contains("packscan_frames_total{worker=\"1\"} 2"));
        assert!(text.contains("packscan_packs_with_codes_total 1"));
    }

    #[test]
    fn instances_do_not_share_state() {
        let a = Metrics::new().unwrap();
        let b = Metrics::new().unwrap();
        a.record_event_dropped();
        assert_eq!(a.events_dropped(), 1);
        assert_eq!(b.events_dropped(), 0);
    }
}

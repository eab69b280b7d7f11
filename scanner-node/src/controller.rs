//! The controller owns the reconciliation queue and is the only consumer of
//! worker events.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use crossbeam::channel::{Receiver, TryRecvError};
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use crate::config::ScannerConfig;
use crate::messaging::Notifier;
use crate::sync::{build_sync_queue, PackSyncQueue};
use crate::utils::metrics::Metrics;
use packscan_common::utils::seconds_between;
use packscan_common::{PackOutcome, ScannerEvent, WorkerId};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerStatus {
    Running,
    Finished,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ControllerReport {
    pub results_received: usize,
    pub task_errors: usize,
    pub packs_with_codes: usize,
    pub packs_bad_codes: usize,
}

#[derive(Debug, Clone)]
struct Schedule {
    poll: Duration,
    batch_refresh: Duration,
    report: Duration,
}

pub struct Controller {
    events: Receiver<ScannerEvent>,
    queue: Box<dyn PackSyncQueue>,
    notifier: Arc<dyn Notifier>,
    metrics: Arc<Metrics>,
    workers: HashMap<WorkerId, WorkerStatus>,
    cancel: CancellationToken,
    schedule: Schedule,
    /// Work mode required before confirmed packs are sent, if any.
    required_work_mode: Option<String>,
    expected_codes_count: Option<u32>,
    report: ControllerReport,
}

impl Controller {
    pub fn new(
        config: &ScannerConfig,
        events: Receiver<ScannerEvent>,
        notifier: Arc<dyn Notifier>,
        metrics: Arc<Metrics>,
        cancel: CancellationToken,
    ) -> Self {
        let min = Duration::from_millis(1);
        let schedule = Schedule {
            poll: config.sync.poll_interval().max(min),
            batch_refresh: config.server.batch_refresh_interval().max(min),
            report: Duration::from_secs(config.monitoring.report_interval_secs).max(min),
        };
        let required_work_mode = config
            .server
            .require_auto_mode
            .then(|| config.server.auto_work_mode.clone());

        Self {
            events,
            queue: build_sync_queue(&config.sync),
            notifier,
            metrics,
            workers: HashMap::new(),
            cancel,
            schedule,
            required_work_mode,
            expected_codes_count: config.expected_codes_count,
            report: ControllerReport::default(),
        }
    }

    /// Marks a worker as running before its thread starts, so `--once` does
    /// not stop before every camera has reported in.
    pub fn register_worker(&mut self, worker_id: WorkerId) {
        self.workers.insert(worker_id, WorkerStatus::Running);
    }

    pub fn worker_status(&self, worker_id: WorkerId) -> Option<WorkerStatus> {
        self.workers.get(&worker_id).copied()
    }

    pub fn all_finished(&self) -> bool {
        !self.workers.is_empty()
            && self
                .workers
                .values()
                .all(|status| *status == WorkerStatus::Finished)
    }

    pub fn expected_codes_count(&self) -> Option<u32> {
        self.expected_codes_count
    }

    pub fn pending(&self) -> usize {
        self.queue.pending()
    }

    /// Handles every event currently in the channel without blocking.
    pub fn pump(&mut self) -> usize {
        let mut handled = 0;
        loop {
            match self.events.try_recv() {
                Ok(event) => {
                    self.handle_event(event);
                    handled += 1;
                }
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    debug!("All worker senders dropped");
                    break;
                }
            }
        }
        handled
    }

    fn handle_event(&mut self, event: ScannerEvent) {
        match event {
            ScannerEvent::StartScanning { worker_id, .. } => {
                info!(worker_id, "Camera started scanning");
                self.workers.insert(worker_id, WorkerStatus::Running);
            }
            ScannerEvent::CameraPackResult(mut result) => {
                let received = Utc::now();
                result.receive_time = Some(received);
                if result.expected_codes_count.is_none() {
                    result.expected_codes_count = self.expected_codes_count;
                }
                debug!(
                    worker_id = result.worker_id,
                    qr = result.qr_codes.len(),
                    barcodes = result.barcodes.len(),
                    delay_secs = seconds_between(result.finish_time, received),
                    "Camera result received"
                );
                self.report.results_received += 1;
                self.queue.enqueue(result);
            }
            ScannerEvent::TaskError {
                worker_id, message, ..
            } => {
                warn!(worker_id, error = %message, "Camera task error");
                self.report.task_errors += 1;
            }
            ScannerEvent::EndScanning { worker_id, .. } => {
                info!(worker_id, "Camera finished scanning");
                self.workers.insert(worker_id, WorkerStatus::Finished);
            }
        }
    }

    /// Sends outcomes to the server. Failures are logged and never retried.
    pub async fn dispatch(&mut self, outcomes: Vec<PackOutcome>) {
        for outcome in outcomes {
            self.metrics.record_pack(outcome.is_confirmed());
            match outcome {
                PackOutcome::WithCodes(pack) => {
                    self.report.packs_with_codes += 1;
                    if !self.work_mode_allows_sending().await {
                        warn!(pack_id = %pack.pack_id(), "Work mode is not automatic, pack not reported");
                        continue;
                    }
                    if let Err(e) = self.notifier.notify_pack(&pack).await {
                        error!(pack_id = %pack.pack_id(), error = %e, "Failed to report pack");
                        self.metrics.record_notification_failure();
                    }
                }
                PackOutcome::BadCodes(pack) => {
                    self.report.packs_bad_codes += 1;
                    if let Err(e) = self.notifier.notify_bad_pack(&pack).await {
                        error!(pack_id = %pack.pack_id, error = %e, "Failed to report bad pack");
                        self.metrics.record_notification_failure();
                    }
                }
            }
        }
    }

    async fn work_mode_allows_sending(&self) -> bool {
        let Some(required) = &self.required_work_mode else {
            return true;
        };
        match self.notifier.work_mode().await {
            Some(mode) => &mode == required,
            None => {
                debug!("Work mode unknown, treating as manual");
                false
            }
        }
    }

    #[instrument(skip(self))]
    pub async fn refresh_expected_count(&mut self) {
        match self.notifier.expected_codes_count().await {
            Ok(count) => {
                if self.expected_codes_count != Some(count) {
                    info!(count, "Expected codes per pack updated");
                }
                self.expected_codes_count = Some(count);
            }
            Err(e) => warn!(
                error = %e,
                fallback = ?self.expected_codes_count,
                "Could not read expected codes count"
            ),
        }
    }

    fn log_report(&self) {
        info!(
            received = self.report.results_received,
            with_codes = self.metrics.packs_with_codes(),
            bad_codes = self.metrics.packs_bad_codes(),
            dropped_events = self.metrics.events_dropped(),
            pending = self.queue.pending(),
            "Scanner status"
        );
    }

    /// Polls events and settled groups until cancelled, or with `once` until
    /// every registered worker has finished.
    pub async fn run(&mut self, once: bool) {
        let cancel = self.cancel.clone();
        let mut poll = interval(self.schedule.poll);
        let mut refresh = interval(self.schedule.batch_refresh);
        let mut report = interval(self.schedule.report);
        for timer in [&mut poll, &mut refresh, &mut report] {
            timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
        }
        // Skip the immediate first report tick.
        report.tick().await;

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("Controller cancelled");
                    break;
                }
                _ = poll.tick() => {
                    self.pump();
                    let outcomes = self.queue.drain_ready();
                    self.dispatch(outcomes).await;
                    if once && self.all_finished() {
                        info!("All cameras finished");
                        break;
                    }
                }
                _ = refresh.tick() => self.refresh_expected_count().await,
                _ = report.tick() => self.log_report(),
            }
        }
    }

    /// Final pass after the workers have stopped: takes any remaining
    /// events and decides every queued result regardless of settling.
    pub async fn finish(&mut self) -> ControllerReport {
        self.pump();
        let outcomes = self.queue.drain_all();
        self.dispatch(outcomes).await;
        self.log_report();
        self.report.clone()
    }
}

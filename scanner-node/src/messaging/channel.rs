use std::sync::Arc;
use std::time::Duration;

use crossbeam::channel::{bounded, Receiver, SendTimeoutError, Sender};
use tracing::{debug, warn};

use crate::config::ChannelConfig;
use crate::utils::metrics::Metrics;
use packscan_common::ScannerEvent;

/// Producer half handed to each camera worker.
///
/// The queue is bounded; a send waits at most `send_timeout` for room and
/// then drops the event, so a stalled controller can only slow a worker
/// down by that much per event.
#[derive(Clone)]
pub struct EventSender {
    tx: Sender<ScannerEvent>,
    send_timeout: Duration,
    metrics: Arc<Metrics>,
}

impl EventSender {
    /// Returns `false` if the event was not delivered.
    pub fn send(&self, event: ScannerEvent) -> bool {
        match self.tx.send_timeout(event, self.send_timeout) {
            Ok(()) => true,
            Err(SendTimeoutError::Timeout(event)) => {
                warn!(
                    worker_id = event.worker_id(),
                    kind = event.kind(),
                    "Controller queue full, dropping event"
                );
                self.metrics.record_event_dropped();
                false
            }
            Err(SendTimeoutError::Disconnected(event)) => {
                debug!(
                    worker_id = event.worker_id(),
                    kind = event.kind(),
                    "Controller gone, event discarded"
                );
                false
            }
        }
    }
}

pub fn event_channel(
    config: &ChannelConfig,
    metrics: Arc<Metrics>,
) -> (EventSender, Receiver<ScannerEvent>) {
    let (tx, rx) = bounded(config.capacity);
    let sender = EventSender {
        tx,
        send_timeout: config.send_timeout(),
        metrics,
    };
    (sender, rx)
}

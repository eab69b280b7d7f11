use chrono::{DateTime, Utc};
use indexmap::IndexSet;
use tracing::{debug, info};

use super::DecodedCodes;
use packscan_common::{CameraPackResult, WorkerId};

#[derive(Debug)]
struct Episode {
    start_time: DateTime<Utc>,
    qr_codes: IndexSet<String>,
    barcodes: IndexSet<String>,
}

#[derive(Debug)]
enum EpisodeState {
    Idle,
    Tracking(Episode),
}

/// Per-camera episode state machine.
///
/// Opens an episode on the absent→present edge, merges codes while the pack
/// is in view (first occurrence wins, repeats are dropped) and closes it on
/// the present→absent edge, producing one [`CameraPackResult`].
#[derive(Debug)]
pub struct PackAccumulator {
    worker_id: WorkerId,
    state: EpisodeState,
    /// Last barcode read on any episode; used when an episode has fewer
    /// barcodes than QR codes.
    last_good_barcode: Option<String>,
}

impl PackAccumulator {
    pub fn new(worker_id: WorkerId) -> Self {
        Self {
            worker_id,
            state: EpisodeState::Idle,
            last_good_barcode: None,
        }
    }

    pub fn is_tracking(&self) -> bool {
        matches!(self.state, EpisodeState::Tracking(_))
    }

    /// Feeds one frame's presence state and the codes decoded from it.
    /// Returns a result when this frame closes an episode.
    pub fn step(
        &mut self,
        present: bool,
        codes: Option<DecodedCodes>,
        now: DateTime<Utc>,
    ) -> Option<CameraPackResult> {
        if present {
            if !self.is_tracking() {
                self.begin(now);
            }
            if let Some(codes) = codes {
                self.merge(codes);
            }
            return None;
        }

        if self.is_tracking() {
            return self.finish(now);
        }
        None
    }

    /// Closes an open episode early, e.g. when the stream ends mid-pack.
    pub fn flush(&mut self, now: DateTime<Utc>) -> Option<CameraPackResult> {
        self.finish(now)
    }

    fn begin(&mut self, now: DateTime<Utc>) {
        debug!(worker_id = self.worker_id, "Pack entered view");
        self.state = EpisodeState::Tracking(Episode {
            start_time: now,
            qr_codes: IndexSet::new(),
            barcodes: IndexSet::new(),
        });
    }

    fn merge(&mut self, codes: DecodedCodes) {
        if let EpisodeState::Tracking(episode) = &mut self.state {
            episode.qr_codes.extend(codes.qr_codes);
            episode.barcodes.extend(codes.barcodes);
        }
    }

    fn finish(&mut self, now: DateTime<Utc>) -> Option<CameraPackResult> {
        let EpisodeState::Tracking(episode) = std::mem::replace(&mut self.state, EpisodeState::Idle)
        else {
            return None;
        };

        let qr_codes: Vec<String> = episode.qr_codes.into_iter().collect();
        let mut barcodes: Vec<String> = episode.barcodes.into_iter().collect();

        if let Some(last) = barcodes.last() {
            self.last_good_barcode = Some(last.clone());
        }
        let missing = qr_codes.len().saturating_sub(barcodes.len());
        if missing > 0 {
            match &self.last_good_barcode {
                Some(fill) => barcodes.extend(std::iter::repeat(fill.clone()).take(missing)),
                None => debug!(
                    worker_id = self.worker_id,
                    missing, "No barcode read yet, cannot backfill"
                ),
            }
        }

        info!(
            worker_id = self.worker_id,
            qr = qr_codes.len(),
            barcodes = barcodes.len(),
            "Pack left view"
        );

        Some(CameraPackResult::new(self.worker_id, episode.start_time, now).with_codes(qr_codes, barcodes))
    }
}

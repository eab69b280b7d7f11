use std::collections::{BTreeMap, VecDeque};

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, info, warn};

use super::{validate_codes, PackSyncQueue};
use packscan_common::{
    BadCodesReason, CameraPackResult, PackBadCodes, PackOutcome, WorkerId,
};

/// Cross-camera reconciler.
///
/// Results are kept in arrival order. The oldest results are grouped into a
/// chain: each next result joins while its `start_time` is not after the
/// latest `finish_time` seen in the group so far. A group is decided once
/// its latest `finish_time` is older than the settle timeout, which gives
/// slower cameras time to deliver their half of the same pack.
///
/// A single pack is expected to be read from exactly one side. Sides are
/// told apart by worker id.
#[derive(Debug)]
pub struct IntervalSyncQueue {
    queue: VecDeque<CameraPackResult>,
    settle_timeout: Duration,
    sides: usize,
}

#[derive(Debug, Default)]
struct SideCodes {
    qr_codes: Vec<String>,
    barcodes: Vec<String>,
}

impl IntervalSyncQueue {
    pub fn new(settle_timeout: Duration, sides: usize) -> Self {
        Self {
            queue: VecDeque::new(),
            settle_timeout,
            sides,
        }
    }

    /// Length and time bound of the chain starting at the queue head.
    fn oldest_group(&self) -> Option<(usize, DateTime<Utc>)> {
        let first = self.queue.front()?;
        let mut bound = first.finish_time;
        let mut len = 1;
        for result in self.queue.iter().skip(1) {
            if result.start_time > bound {
                break;
            }
            bound = bound.max(result.finish_time);
            len += 1;
        }
        Some((len, bound))
    }

    fn take_group(&mut self, len: usize) -> Vec<CameraPackResult> {
        self.queue.drain(..len).collect()
    }

    fn reconcile(&self, group: Vec<CameraPackResult>) -> PackOutcome {
        let expected = group.first().and_then(|r| r.expected_codes_count);
        if group.iter().any(|r| r.expected_codes_count != expected) {
            warn!(
                expected = ?expected,
                "Results in one group expect different code counts"
            );
        }

        let mut sides: BTreeMap<WorkerId, SideCodes> = BTreeMap::new();
        for result in group {
            let side = sides.entry(result.worker_id).or_default();
            side.qr_codes.extend(result.qr_codes);
            side.barcodes.extend(result.barcodes);
        }

        if sides.len() < self.sides {
            warn!(
                seen = sides.len(),
                sides = self.sides,
                workers = ?sides.keys().collect::<Vec<_>>(),
                "No matching result from every side (desync?)"
            );
        }

        let with_qr: Vec<WorkerId> = sides
            .iter()
            .filter(|(_, side)| !side.qr_codes.is_empty())
            .map(|(worker_id, _)| *worker_id)
            .collect();

        let mut qr_codes = Vec::new();
        let mut barcodes = Vec::new();
        for side in sides.into_values() {
            qr_codes.extend(side.qr_codes);
            barcodes.extend(side.barcodes);
        }

        if with_qr.len() > 1 {
            warn!(sides = ?with_qr, "QR codes read from more than one side");
            return PackOutcome::BadCodes(PackBadCodes::new(
                qr_codes,
                barcodes,
                BadCodesReason::ConflictingSides { sides: with_qr },
            ));
        }

        let outcome = validate_codes(qr_codes, barcodes, expected);
        if let PackOutcome::BadCodes(pack) = &outcome {
            warn!(reason = ?pack.reason, "Group could not be confirmed");
        }
        outcome
    }
}

impl PackSyncQueue for IntervalSyncQueue {
    fn enqueue(&mut self, result: CameraPackResult) {
        debug!(
            worker_id = result.worker_id,
            qr = result.qr_codes.len(),
            pending = self.queue.len() + 1,
            "Result queued for reconciliation"
        );
        self.queue.push_back(result);
    }

    fn drain_ready_at(&mut self, now: DateTime<Utc>) -> Vec<PackOutcome> {
        let mut outcomes = Vec::new();
        while let Some((len, bound)) = self.oldest_group() {
            if now - bound <= self.settle_timeout {
                break;
            }
            let group = self.take_group(len);
            debug!(members = group.len(), "Reconciling group");
            outcomes.push(self.reconcile(group));
        }
        outcomes
    }

    fn drain_all(&mut self) -> Vec<PackOutcome> {
        let mut outcomes = Vec::new();
        while let Some((len, _)) = self.oldest_group() {
            let group = self.take_group(len);
            outcomes.push(self.reconcile(group));
        }
        if !outcomes.is_empty() {
            info!(groups = outcomes.len(), "Flushed unsettled results");
        }
        outcomes
    }

    fn pending(&self) -> usize {
        self.queue.len()
    }
}

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use tracing::warn;

use super::{validate_codes, PackSyncQueue};
use packscan_common::{CameraPackResult, PackOutcome};

/// Single-camera validation: every result is decided on its own as soon as
/// it is drained, with no waiting and no grouping.
#[derive(Debug, Default)]
pub struct InstantSyncQueue {
    queue: VecDeque<CameraPackResult>,
}

impl InstantSyncQueue {
    pub fn new() -> Self {
        Self::default()
    }

    fn decide(result: CameraPackResult) -> PackOutcome {
        let worker_id = result.worker_id;
        let outcome = validate_codes(result.qr_codes, result.barcodes, result.expected_codes_count);
        if let PackOutcome::BadCodes(pack) = &outcome {
            warn!(worker_id, reason = ?pack.reason, "Pack could not be confirmed");
        }
        outcome
    }
}

impl PackSyncQueue for InstantSyncQueue {
    fn enqueue(&mut self, result: CameraPackResult) {
        self.queue.push_back(result);
    }

    fn drain_ready_at(&mut self, _now: DateTime<Utc>) -> Vec<PackOutcome> {
        self.queue.drain(..).map(Self::decide).collect()
    }

    fn drain_all(&mut self) -> Vec<PackOutcome> {
        self.drain_ready_at(Utc::now())
    }

    fn pending(&self) -> usize {
        self.queue.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use packscan_common::BadCodesReason;

    fn s(codes: &[&str]) -> Vec<String> {
        codes.iter().map(|c| c.to_string()).collect()
    }

    fn result(qr: &[&str], bar: &[&str], expected: Option<u32>) -> CameraPackResult {
        let now = Utc::now();
        CameraPackResult::new(0, now, now)
            .with_codes(s(qr), s(bar))
            .with_expected_codes_count(expected)
    }

    #[test]
    fn each_result_is_decided_immediately() {
        let mut q = InstantSyncQueue::new();
        q.enqueue(result(&["q1", "q2"], &["b1"], Some(2)));
        q.enqueue(result(&[], &[], Some(1)));
        q.enqueue(result(&["q1"], &[], Some(1)));

        let outcomes = q.drain_ready();
        assert_eq!(outcomes.len(), 3);
        match &outcomes[0] {
            PackOutcome::WithCodes(pack) => assert_eq!(pack.barcodes(), &s(&["b1", "b1"])[..]),
            other => panic!("expected confirmed pack, got {:?}", other),
        }
        match (&outcomes[1], &outcomes[2]) {
            (PackOutcome::BadCodes(none), PackOutcome::BadCodes(missing)) => {
                assert_eq!(none.reason, BadCodesReason::NoCodes);
                assert_eq!(missing.reason, BadCodesReason::MissingBarcodes);
            }
            other => panic!("unexpected outcomes {:?}", other),
        }
        assert_eq!(q.pending(), 0);
        assert!(q.drain_ready().is_empty());
    }

    #[test]
    fn wrong_count_is_rejected() {
        let mut q = InstantSyncQueue::new();
        q.enqueue(result(&["q1"], &["b1"], Some(3)));
        assert!(!q.drain_all()[0].is_confirmed());
    }
}

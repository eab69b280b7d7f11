//! Turning per-camera results into final pack outcomes.
//!
//! [`IntervalSyncQueue`] groups results from several cameras by time overlap
//! once they have settled; [`InstantSyncQueue`] validates each result on its
//! own for single-camera stations. Both are owned by the controller alone.

pub mod instant;
pub mod interval;

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::config::{SyncConfig, SyncMode};
use packscan_common::{BadCodesReason, CameraPackResult, PackBadCodes, PackOutcome, PackWithCodes};

pub use instant::InstantSyncQueue;
pub use interval::IntervalSyncQueue;

pub trait PackSyncQueue: Send {
    fn enqueue(&mut self, result: CameraPackResult);

    /// Outcomes that can be decided now. Results not yet ready stay queued.
    fn drain_ready(&mut self) -> Vec<PackOutcome> {
        self.drain_ready_at(Utc::now())
    }

    fn drain_ready_at(&mut self, now: DateTime<Utc>) -> Vec<PackOutcome>;

    /// Decides everything still queued, ignoring any settle window.
    fn drain_all(&mut self) -> Vec<PackOutcome>;

    fn pending(&self) -> usize;
}

pub fn build_sync_queue(config: &SyncConfig) -> Box<dyn PackSyncQueue> {
    match config.mode {
        SyncMode::Interval => Box::new(IntervalSyncQueue::new(config.settle_timeout(), config.sides)),
        SyncMode::Instant => Box::new(InstantSyncQueue::new()),
    }
}

/// Pads barcodes to the QR count by repeating the last one, then checks the
/// pairing and the expected count.
pub fn validate_codes(
    qr_codes: Vec<String>,
    mut barcodes: Vec<String>,
    expected_codes_count: Option<u32>,
) -> PackOutcome {
    if qr_codes.is_empty() {
        return bad(qr_codes, barcodes, BadCodesReason::NoCodes);
    }
    let Some(last) = barcodes.last().cloned() else {
        return bad(qr_codes, barcodes, BadCodesReason::MissingBarcodes);
    };

    if barcodes.len() < qr_codes.len() {
        debug!(
            qr = qr_codes.len(),
            barcodes = barcodes.len(),
            "Padding barcodes with {}",
            last
        );
        barcodes.resize(qr_codes.len(), last);
    }
    if barcodes.len() != qr_codes.len() {
        let reason = BadCodesReason::Misaligned {
            qr_codes: qr_codes.len(),
            barcodes: barcodes.len(),
        };
        return bad(qr_codes, barcodes, reason);
    }

    let actual = qr_codes.len();
    if expected_codes_count.map(|n| n as usize) != Some(actual) {
        let reason = BadCodesReason::CountMismatch {
            expected: expected_codes_count,
            actual,
        };
        return bad(qr_codes, barcodes, reason);
    }

    match PackWithCodes::new(qr_codes.clone(), barcodes.clone()) {
        Some(pack) => PackOutcome::WithCodes(pack),
        None => bad(
            qr_codes,
            barcodes,
            BadCodesReason::Misaligned {
                qr_codes: actual,
                barcodes: actual,
            },
        ),
    }
}

fn bad(qr_codes: Vec<String>, barcodes: Vec<String>, reason: BadCodesReason) -> PackOutcome {
    PackOutcome::BadCodes(PackBadCodes::new(qr_codes, barcodes, reason))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn s(codes: &[&str]) -> Vec<String> {
        codes.iter().map(|c| c.to_string()).collect()
    }

    fn reason(outcome: &PackOutcome) -> Option<&BadCodesReason> {
        match outcome {
            PackOutcome::BadCodes(pack) => Some(&pack.reason),
            PackOutcome::WithCodes(_) => None,
        }
    }

    #[test]
    fn pads_and_confirms() {
        match validate_codes(s(&["q1", "q2", "q3"]), s(&["b1"]), Some(3)) {
            PackOutcome::WithCodes(pack) => {
                assert_eq!(pack.barcodes(), &s(&["b1", "b1", "b1"])[..]);
            }
            other => panic!("expected confirmed pack, got {:?}", other),
        }
    }

    #[test]
    fn no_qr_codes() {
        let outcome = validate_codes(vec![], s(&["b1"]), Some(1));
        assert_eq!(reason(&outcome), Some(&BadCodesReason::NoCodes));
    }

    #[test]
    fn no_barcodes() {
        let outcome = validate_codes(s(&["q1"]), vec![], Some(1));
        assert_eq!(reason(&outcome), Some(&BadCodesReason::MissingBarcodes));
    }

    #[test]
    fn extra_barcodes_are_misaligned() {
        let outcome = validate_codes(s(&["q1"]), s(&["b1", "b2"]), Some(1));
        assert_eq!(
            reason(&outcome),
            Some(&BadCodesReason::Misaligned {
                qr_codes: 1,
                barcodes: 2
            })
        );
    }

    #[test]
    fn count_mismatch_keeps_codes() {
        let outcome = validate_codes(s(&["q1", "q2"]), s(&["b1"]), Some(3));
        match outcome {
            PackOutcome::BadCodes(pack) => {
                assert_eq!(pack.qr_codes, s(&["q1", "q2"]));
                assert_eq!(pack.barcodes, s(&["b1", "b1"]));
                assert_eq!(
                    pack.reason,
                    BadCodesReason::CountMismatch {
                        expected: Some(3),
                        actual: 2
                    }
                );
            }
            other => panic!("expected bad codes, got {:?}", other),
        }
    }

    #[test]
    fn unknown_expected_count_is_not_trusted() {
        let outcome = validate_codes(s(&["q1"]), s(&["b1"]), None);
        assert!(!outcome.is_confirmed());
    }
}

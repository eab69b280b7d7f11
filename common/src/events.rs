use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identity of a camera worker. Also used as the "side" of the station
/// when results from several cameras are reconciled.
pub type WorkerId = u32;

/// All codes one camera observed during a single presence episode.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct CameraPackResult {
    pub worker_id: WorkerId,
    pub qr_codes: Vec<String>,
    pub barcodes: Vec<String>,
    pub expected_codes_count: Option<u32>,
    pub start_time: DateTime<Utc>,
    pub finish_time: DateTime<Utc>,
    /// Set by the receiving side, never by the worker.
    pub receive_time: Option<DateTime<Utc>>,
}

impl CameraPackResult {
    pub fn new(worker_id: WorkerId, start_time: DateTime<Utc>, finish_time: DateTime<Utc>) -> Self {
        Self {
            worker_id,
            qr_codes: Vec::new(),
            barcodes: Vec::new(),
            expected_codes_count: None,
            start_time,
            finish_time,
            receive_time: None,
        }
    }

    pub fn with_codes(mut self, qr_codes: Vec<String>, barcodes: Vec<String>) -> Self {
        self.qr_codes = qr_codes;
        self.barcodes = barcodes;
        self
    }

    pub fn with_expected_codes_count(mut self, count: Option<u32>) -> Self {
        self.expected_codes_count = count;
        self
    }
}

/// Validated outcome: QR codes and barcodes are index-aligned pairs.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct PackWithCodes {
    pack_id: Uuid,
    created_at: DateTime<Utc>,
    qr_codes: Vec<String>,
    barcodes: Vec<String>,
}

impl PackWithCodes {
    /// Returns `None` when the two lists cannot be paired one to one.
    pub fn new(qr_codes: Vec<String>, barcodes: Vec<String>) -> Option<Self> {
        if qr_codes.len() != barcodes.len() {
            return None;
        }
        Some(Self {
            pack_id: Uuid::new_v4(),
            created_at: Utc::now(),
            qr_codes,
            barcodes,
        })
    }

    pub fn pack_id(&self) -> Uuid {
        self.pack_id
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn qr_codes(&self) -> &[String] {
        &self.qr_codes
    }

    pub fn barcodes(&self) -> &[String] {
        &self.barcodes
    }

    /// `(qr_code, barcode)` pairs in reporting order.
    pub fn pairs(&self) -> impl Iterator<Item = (&str, &str)> {
        self.qr_codes
            .iter()
            .zip(self.barcodes.iter())
            .map(|(qr, bar)| (qr.as_str(), bar.as_str()))
    }
}

/// Why a pack could not be confirmed.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BadCodesReason {
    /// No QR code was read by any camera.
    NoCodes,
    /// More than one side read QR codes for what should be a single pack.
    ConflictingSides { sides: Vec<WorkerId> },
    /// QR codes were read but there is no barcode to pair them with.
    MissingBarcodes,
    /// The number of QR codes differs from what the server expects.
    CountMismatch { expected: Option<u32>, actual: usize },
    /// After padding there are more barcodes than QR codes.
    Misaligned { qr_codes: usize, barcodes: usize },
}

/// Degraded outcome. Carries whatever codes were read, but the counts must
/// not be trusted.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct PackBadCodes {
    pub pack_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub qr_codes: Vec<String>,
    pub barcodes: Vec<String>,
    pub reason: BadCodesReason,
}

impl PackBadCodes {
    pub fn new(qr_codes: Vec<String>, barcodes: Vec<String>, reason: BadCodesReason) -> Self {
        Self {
            pack_id: Uuid::new_v4(),
            created_at: Utc::now(),
            qr_codes,
            barcodes,
            reason,
        }
    }
}

/// Terminal result for one physical pack. Never revised once emitted.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum PackOutcome {
    WithCodes(PackWithCodes),
    BadCodes(PackBadCodes),
}

impl PackOutcome {
    pub fn pack_id(&self) -> Uuid {
        match self {
            PackOutcome::WithCodes(pack) => pack.pack_id(),
            PackOutcome::BadCodes(pack) => pack.pack_id,
        }
    }

    pub fn is_confirmed(&self) -> bool {
        matches!(self, PackOutcome::WithCodes(_))
    }
}

/// Messages a camera worker sends to the controller. One-directional.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ScannerEvent {
    StartScanning {
        worker_id: WorkerId,
        at: DateTime<Utc>,
    },
    CameraPackResult(CameraPackResult),
    TaskError {
        worker_id: WorkerId,
        message: String,
        at: DateTime<Utc>,
    },
    EndScanning {
        worker_id: WorkerId,
        at: DateTime<Utc>,
    },
}

impl ScannerEvent {
    pub fn worker_id(&self) -> WorkerId {
        match self {
            ScannerEvent::StartScanning { worker_id, .. }
            | ScannerEvent::TaskError { worker_id, .. }
            | ScannerEvent::EndScanning { worker_id, .. } => *worker_id,
            ScannerEvent::CameraPackResult(result) => result.worker_id,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            ScannerEvent::StartScanning { .. } => "start_scanning",
            ScannerEvent::CameraPackResult(_) => "camera_pack_result",
            ScannerEvent::TaskError { .. } => "task_error",
            ScannerEvent::EndScanning { .. } => "end_scanning",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn codes(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    #[test]
    fn pack_with_codes_requires_aligned_lists() {
        assert!(PackWithCodes::new(codes(&["q1", "q2"]), codes(&["b1"])).is_none());

        let pack = PackWithCodes::new(codes(&["q1", "q2"]), codes(&["b1", "b1"])).unwrap();
        let pairs: Vec<_> = pack.pairs().collect();
        assert_eq!(pairs, vec![("q1", "b1"), ("q2", "b1")]);
    }

    #[test]
    fn scanner_event_is_tagged_on_the_wire() {
        let now = Utc::now();
        let result = CameraPackResult::new(1, now - Duration::seconds(2), now)
            .with_codes(codes(&["q"]), codes(&["b"]))
            .with_expected_codes_count(Some(1));
        let event = ScannerEvent::CameraPackResult(result.clone());

        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "camera_pack_result");
        assert_eq!(json["worker_id"], 1);
        assert_eq!(json["qr_codes"][0], "q");
        assert!(json["receive_time"].is_null());

        let back: ScannerEvent = serde_json::from_value(json).unwrap();
        assert_eq!(back.worker_id(), 1);
        assert_eq!(back, event);
    }

    #[test]
    fn error_event_carries_only_its_fields() {
        let event = ScannerEvent::TaskError {
            worker_id: 0,
            message: "no frame".to_string(),
            at: Utc::now(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "task_error");
        assert_eq!(json["message"], "no frame");
        assert!(json.get("qr_codes").is_none());
        assert_eq!(event.kind(), "task_error");
    }

    #[test]
    fn bad_codes_reason_serializes_with_kind() {
        let outcome = PackOutcome::BadCodes(PackBadCodes::new(
            codes(&["q1"]),
            codes(&["b1"]),
            BadCodesReason::CountMismatch {
                expected: Some(2),
                actual: 1,
            },
        ));
        let json = serde_json::to_value(&outcome).unwrap();
        assert_eq!(json["outcome"], "bad_codes");
        assert_eq!(json["reason"]["kind"], "count_mismatch");
        assert_eq!(json["reason"]["expected"], 2);
        assert!(!outcome.is_confirmed());
    }
}

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use crate::camera::Frame;
use crate::error::Result;

/// Codes found on a single frame, in the order the decoder reported them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecodedCodes {
    pub qr_codes: Vec<String>,
    pub barcodes: Vec<String>,
}

impl DecodedCodes {
    pub fn new(qr_codes: Vec<String>, barcodes: Vec<String>) -> Self {
        Self { qr_codes, barcodes }
    }
}

/// Decoder seam. Implementations wrap whatever QR/barcode library the
/// station uses; the pipeline only needs the decoded strings.
pub trait CodeExtractor: Send {
    fn name(&self) -> &'static str;

    fn extract(&mut self, frame: &Frame) -> Result<DecodedCodes>;
}

/// Finds nothing. Used when no decoder backend is configured, so presence
/// episodes are still reported (as packs without codes).
#[derive(Debug, Default)]
pub struct NullExtractor;

impl CodeExtractor for NullExtractor {
    fn name(&self) -> &'static str {
        "null"
    }

    fn extract(&mut self, _frame: &Frame) -> Result<DecodedCodes> {
        Ok(DecodedCodes::default())
    }
}

/// Returns prepared results call by call, then nothing. For replays and
/// tests.
#[derive(Debug, Default)]
pub struct ScriptedExtractor {
    script: VecDeque<Result<DecodedCodes>>,
}

impl ScriptedExtractor {
    pub fn new(script: Vec<Result<DecodedCodes>>) -> Self {
        Self {
            script: script.into(),
        }
    }
}

impl CodeExtractor for ScriptedExtractor {
    fn name(&self) -> &'static str {
        "scripted"
    }

    fn extract(&mut self, _frame: &Frame) -> Result<DecodedCodes> {
        self.script.pop_front().unwrap_or_else(|| Ok(DecodedCodes::default()))
    }
}

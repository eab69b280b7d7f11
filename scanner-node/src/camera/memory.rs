use std::collections::VecDeque;

use image::RgbImage;

use super::{Frame, FrameSource};
use crate::error::{Result, ScannerError};

#[derive(Debug, Clone)]
pub enum MemoryItem {
    Frame(RgbImage),
    /// Makes the next `read` fail with this message.
    ReadFailure(String),
}

/// In-memory source. Every `open` moves on to the next segment, which lets a
/// test model a stream that drops and comes back after a reconnect. Opening
/// past the last segment fails.
pub struct MemorySource {
    name: String,
    segments: VecDeque<Vec<MemoryItem>>,
    current: VecDeque<MemoryItem>,
    sequence_num: u64,
}

impl MemorySource {
    pub fn new(name: impl Into<String>, frames: Vec<RgbImage>) -> Self {
        Self::with_segments(name, vec![frames.into_iter().map(MemoryItem::Frame).collect()])
    }

    pub fn with_segments(name: impl Into<String>, segments: Vec<Vec<MemoryItem>>) -> Self {
        Self {
            name: name.into(),
            segments: segments.into(),
            current: VecDeque::new(),
            sequence_num: 0,
        }
    }
}

impl FrameSource for MemorySource {
    fn open(&mut self) -> Result<()> {
        let segment = self.segments.pop_front().ok_or_else(|| {
            ScannerError::CameraError(format!("{}: no more segments", self.name))
        })?;
        self.current = segment.into();
        Ok(())
    }

    fn read(&mut self) -> Result<Option<Frame>> {
        match self.current.pop_front() {
            Some(MemoryItem::Frame(image)) => {
                self.sequence_num += 1;
                Ok(Some(Frame::new(image, self.sequence_num)))
            }
            Some(MemoryItem::ReadFailure(message)) => Err(ScannerError::CameraError(message)),
            None => Ok(None),
        }
    }

    fn describe(&self) -> String {
        format!("mem://{}", self.name)
    }
}

use std::collections::VecDeque;

use ndarray::{Array2, Zip};

use super::PresenceScorer;
use crate::camera::Frame;
use crate::error::{Result, ScannerError};

/// Three-frame differencing: a pixel moves when it changed by more than
/// `pixel_threshold` grey levels in both of the last two frame pairs.
pub struct MotionScorer {
    pixel_threshold: f32,
    history: VecDeque<Array2<f32>>,
}

impl MotionScorer {
    pub fn new(pixel_threshold: f32) -> Self {
        Self {
            pixel_threshold,
            history: VecDeque::with_capacity(3),
        }
    }
}

impl PresenceScorer for MotionScorer {
    fn score(&mut self, frame: &Frame, _learning_rate: f64) -> Result<f64> {
        let luma = frame.luma();
        if let Some(last_dim) = self.history.back().map(|last| last.dim()) {
            if last_dim != luma.dim() {
                self.history.clear();
                return Err(ScannerError::RecognitionError(format!(
                    "frame size changed from {:?} to {:?}",
                    last_dim,
                    luma.dim()
                )));
            }
        }

        self.history.push_back(luma);
        if self.history.len() > 3 {
            self.history.pop_front();
        }
        if self.history.len() < 3 || self.history[0].is_empty() {
            return Ok(0.0);
        }

        let threshold = self.pixel_threshold;
        let mut moving = 0usize;
        Zip::from(&self.history[0])
            .and(&self.history[1])
            .and(&self.history[2])
            .for_each(|&a, &b, &c| {
                if (a - b).abs() > threshold && (b - c).abs() > threshold {
                    moving += 1;
                }
            });

        Ok(moving as f64 / self.history[0].len() as f64)
    }
}

/// Mean absolute difference to a fixed reference frame, scaled to `[0, 1]`.
pub struct PixelDiffScorer {
    reference: Array2<f32>,
}

impl PixelDiffScorer {
    pub fn new(reference: &Frame) -> Self {
        Self {
            reference: reference.luma(),
        }
    }
}

impl PresenceScorer for PixelDiffScorer {
    fn score(&mut self, frame: &Frame, _learning_rate: f64) -> Result<f64> {
        let luma = frame.luma();
        if luma.dim() != self.reference.dim() {
            return Err(ScannerError::RecognitionError(format!(
                "frame size {:?} differs from reference {:?}",
                luma.dim(),
                self.reference.dim()
            )));
        }
        if luma.is_empty() {
            return Ok(0.0);
        }

        let total: f64 = Zip::from(&luma)
            .and(&self.reference)
            .fold(0.0, |acc, &a, &b| acc + f64::from((a - b).abs()));
        Ok(total / (255.0 * luma.len() as f64))
    }
}

use tracing::{trace, warn};

use super::{Debouncer, PackRecognizer, PresenceScorer};
use crate::camera::Frame;
use crate::config::DebounceConfig;
use crate::error::Result;

/// Thresholds a scorer's output and debounces the result.
///
/// While a pack is present the scorer is fed a zero learning rate so the
/// pack is never absorbed into the background.
pub struct ScoredRecognizer<S> {
    scorer: S,
    debouncer: Debouncer,
    threshold_score: f64,
    learning_rate: f64,
    last_score: Option<f64>,
}

impl<S: PresenceScorer> ScoredRecognizer<S> {
    pub fn new(scorer: S, debounce: &DebounceConfig, learning_rate: f64) -> Result<Self> {
        Ok(Self {
            scorer,
            debouncer: Debouncer::new(debounce.activation_count, debounce.deactivation_count)?,
            threshold_score: debounce.threshold_score,
            learning_rate,
            last_score: None,
        })
    }

    pub fn last_score(&self) -> Option<f64> {
        self.last_score
    }
}

impl<S: PresenceScorer> PackRecognizer for ScoredRecognizer<S> {
    fn is_recognized(&mut self, frame: &Frame) -> bool {
        let learning_rate = if self.debouncer.is_present() {
            0.0
        } else {
            self.learning_rate
        };

        let recognized_now = match self.scorer.score(frame, learning_rate) {
            Ok(score) => {
                trace!(frame = frame.sequence_num, score, "presence score");
                self.last_score = Some(score);
                score > self.threshold_score
            }
            Err(e) => {
                warn!("Scoring frame {} failed: {}", frame.sequence_num, e);
                self.last_score = None;
                false
            }
        };

        self.debouncer.update(recognized_now)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ScannerError;
    use image::RgbImage;
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};

    /// Replays fixed scores and records the learning rates it was given.
    struct FixedScores {
        scores: VecDeque<Result<f64>>,
        rates: Arc<Mutex<Vec<f64>>>,
    }

    impl PresenceScorer for FixedScores {
        fn score(&mut self, _frame: &Frame, learning_rate: f64) -> Result<f64> {
            self.rates.lock().unwrap().push(learning_rate);
            self.scores.pop_front().unwrap_or(Ok(0.0))
        }
    }

    fn frame() -> Frame {
        Frame::new(RgbImage::new(2, 2), 0)
    }

    fn debounce(activation: i32, deactivation: i32) -> DebounceConfig {
        DebounceConfig {
            activation_count: activation,
            deactivation_count: deactivation,
            threshold_score: 0.3,
        }
    }

    #[test]
    fn learning_rate_is_frozen_while_present() {
        let rates = Arc::new(Mutex::new(Vec::new()));
        let scorer = FixedScores {
            scores: vec![Ok(0.9), Ok(0.9), Ok(0.1), Ok(0.1)].into(),
            rates: rates.clone(),
        };
        let mut recognizer = ScoredRecognizer::new(scorer, &debounce(2, -2), 0.01).unwrap();

        let states: Vec<bool> = (0..4).map(|_| recognizer.is_recognized(&frame())).collect();
        assert_eq!(states, vec![false, true, true, false]);
        assert_eq!(*rates.lock().unwrap(), vec![0.01, 0.01, 0.0, 0.0]);
    }

    #[test]
    fn score_at_threshold_is_not_recognized() {
        let scorer = FixedScores {
            scores: vec![Ok(0.3)].into(),
            rates: Arc::new(Mutex::new(Vec::new())),
        };
        let mut recognizer = ScoredRecognizer::new(scorer, &debounce(1, -1), 0.0).unwrap();
        assert!(!recognizer.is_recognized(&frame()));
        assert_eq!(recognizer.last_score(), Some(0.3));
    }

    #[test]
    fn scorer_errors_count_as_absent() {
        let scorer = FixedScores {
            scores: vec![
                Ok(0.8),
                Err(ScannerError::RecognitionError("bad frame".into())),
                Ok(0.8),
            ]
            .into(),
            rates: Arc::new(Mutex::new(Vec::new())),
        };
        let mut recognizer = ScoredRecognizer::new(scorer, &debounce(2, -3), 0.0).unwrap();
        assert!(!recognizer.is_recognized(&frame()));
        assert!(!recognizer.is_recognized(&frame()));
        assert!(recognizer.last_score().is_none());
        assert!(!recognizer.is_recognized(&frame()));
    }
}

use tracing::warn;

use super::PackRecognizer;
use crate::camera::Frame;
use crate::error::{Result, ScannerError};

/// External "is something in front of me" query, e.g. a distance sensor
/// read by key from a device on the line.
pub trait PresenceProbe: Send {
    fn is_object_present(&mut self) -> Result<bool>;
}

/// Presence from a probe instead of the image. The probe is slow compared
/// to the frame rate, so it is only queried on every `poll_every`-th call;
/// the last answer is reused in between and kept when a query fails.
pub struct SensorRecognizer<P> {
    probe: P,
    poll_every: u32,
    calls: u64,
    present: bool,
}

impl<P: PresenceProbe> SensorRecognizer<P> {
    pub fn new(probe: P, poll_every: u32) -> Result<Self> {
        if poll_every == 0 {
            return Err(ScannerError::ConfigError(
                "sensor poll interval must be at least 1".to_string(),
            ));
        }
        Ok(Self {
            probe,
            poll_every,
            calls: 0,
            present: false,
        })
    }
}

impl<P: PresenceProbe> PackRecognizer for SensorRecognizer<P> {
    fn is_recognized(&mut self, _frame: &Frame) -> bool {
        if self.calls % u64::from(self.poll_every) == 0 {
            match self.probe.is_object_present() {
                Ok(present) => self.present = present,
                Err(e) => warn!("Presence probe query failed: {}", e),
            }
        }
        self.calls += 1;
        self.present
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::RgbImage;
    use std::collections::VecDeque;

    struct ScriptedProbe {
        answers: VecDeque<Result<bool>>,
        queries: usize,
    }

    impl PresenceProbe for ScriptedProbe {
        fn is_object_present(&mut self) -> Result<bool> {
            self.queries += 1;
            self.answers.pop_front().unwrap_or(Ok(false))
        }
    }

    #[test]
    fn probe_is_polled_on_a_decimated_schedule() {
        let probe = ScriptedProbe {
            answers: vec![Ok(true), Ok(false)].into(),
            queries: 0,
        };
        let mut recognizer = SensorRecognizer::new(probe, 3).unwrap();
        let frame = Frame::new(RgbImage::new(1, 1), 0);

        let states: Vec<bool> = (0..6).map(|_| recognizer.is_recognized(&frame)).collect();
        assert_eq!(states, vec![true, true, true, false, false, false]);
        assert_eq!(recognizer.probe.queries, 2);
    }

    #[test]
    fn failed_query_keeps_last_state() {
        let probe = ScriptedProbe {
            answers: vec![
                Ok(true),
                Err(ScannerError::Timeout("sensor".into())),
            ]
            .into(),
            queries: 0,
        };
        let mut recognizer = SensorRecognizer::new(probe, 1).unwrap();
        let frame = Frame::new(RgbImage::new(1, 1), 0);
        assert!(recognizer.is_recognized(&frame));
        assert!(recognizer.is_recognized(&frame));
    }

    #[test]
    fn zero_poll_interval_is_rejected() {
        let probe = ScriptedProbe {
            answers: VecDeque::new(),
            queries: 0,
        };
        assert!(SensorRecognizer::new(probe, 0).is_err());
    }
}

use crate::error::{Result, ScannerError};

/// Hysteresis counter over per-frame classifications.
///
/// The counter lives in `[deactivation_count, activation_count]`. A frame
/// that contradicts the current run first resets the counter to zero, so a
/// single outlier cannot erase a long run. The state only flips when the
/// counter reaches one of the bounds.
#[derive(Debug, Clone)]
pub struct Debouncer {
    activation_count: i32,
    deactivation_count: i32,
    counter: i32,
    present: bool,
}

impl Debouncer {
    pub fn new(activation_count: i32, deactivation_count: i32) -> Result<Self> {
        if deactivation_count >= 0 || activation_count <= 0 {
            return Err(ScannerError::RecognitionError(format!(
                "debounce bounds must satisfy {} < 0 < {}",
                deactivation_count, activation_count
            )));
        }
        Ok(Self {
            activation_count,
            deactivation_count,
            counter: 0,
            present: false,
        })
    }

    pub fn update(&mut self, recognized_now: bool) -> bool {
        self.counter = if recognized_now {
            self.counter.max(0) + 1
        } else {
            self.counter.min(0) - 1
        };
        self.counter = self
            .counter
            .clamp(self.deactivation_count, self.activation_count);

        if self.counter >= self.activation_count {
            self.present = true;
        } else if self.counter <= self.deactivation_count {
            self.present = false;
        }
        self.present
    }

    pub fn is_present(&self) -> bool {
        self.present
    }

    pub fn counter(&self) -> i32 {
        self.counter
    }
}

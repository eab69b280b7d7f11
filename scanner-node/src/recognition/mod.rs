//! Pack presence recognition.
//!
//! A [`PackRecognizer`] turns a stream of frames into a stable present/absent
//! signal. Image based recognizers pair a [`PresenceScorer`] with a
//! [`Debouncer`]; the sensor recognizer polls an external probe instead.

pub mod background;
pub mod debounce;
pub mod motion;
pub mod scored;
pub mod sensor;

use tracing::info;

use crate::camera::Frame;
use crate::config::RecognizerConfig;
use crate::error::Result;

pub use background::{BackgroundModel, ForegroundScorer};
pub use debounce::Debouncer;
pub use motion::{MotionScorer, PixelDiffScorer};
pub use scored::ScoredRecognizer;
pub use sensor::{PresenceProbe, SensorRecognizer};

pub trait PackRecognizer: Send {
    /// Called once per evaluated frame; returns the debounced presence state.
    fn is_recognized(&mut self, frame: &Frame) -> bool;
}

pub trait PresenceScorer: Send {
    /// Dissimilarity of `frame` from what the scorer considers empty, in
    /// `[0, 1]`. Scorers with an adaptive model update it with
    /// `learning_rate`; others ignore it.
    fn score(&mut self, frame: &Frame, learning_rate: f64) -> Result<f64>;
}

pub fn build_recognizer(config: &RecognizerConfig) -> Result<Box<dyn PackRecognizer>> {
    match config {
        RecognizerConfig::Background(bg) => {
            let mut scorer = ForegroundScorer::new(BackgroundModel::new(&bg.model));
            if let Some(path) = &bg.background_image {
                let image = image::open(path)?.to_rgb8();
                scorer.seed(&Frame::new(image, 0))?;
                info!("Seeded background model from {}", path.display());
            }
            let recognizer = ScoredRecognizer::new(scorer, &bg.debounce, bg.learning_rate)?;
            Ok(Box::new(recognizer))
        }
        RecognizerConfig::Motion(motion) => {
            let scorer = MotionScorer::new(motion.pixel_threshold as f32);
            let recognizer = ScoredRecognizer::new(scorer, &motion.debounce, 0.0)?;
            Ok(Box::new(recognizer))
        }
        RecognizerConfig::Reference(reference) => {
            let image = image::open(&reference.reference_image)?.to_rgb8();
            let scorer = PixelDiffScorer::new(&Frame::new(image, 0));
            info!("Loaded reference frame {}", reference.reference_image.display());
            let recognizer = ScoredRecognizer::new(scorer, &reference.debounce, 0.0)?;
            Ok(Box::new(recognizer))
        }
    }
}

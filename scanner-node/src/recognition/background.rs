use ndarray::{Array2, Zip};

use super::PresenceScorer;
use crate::camera::Frame;
use crate::config::BackgroundModelConfig;
use crate::error::{Result, ScannerError};

pub const MASK_BACKGROUND: u8 = 0;
pub const MASK_SHADOW: u8 = 127;
pub const MASK_FOREGROUND: u8 = 255;

/// Per-pixel running Gaussian over grayscale frames with shadow labelling.
///
/// A pixel is background when its squared distance to the mean is within
/// `variance_threshold` variances. A pixel that is darker than the mean but
/// keeps at least `shadow_threshold` of its brightness is labelled shadow.
/// Everything else is foreground.
#[derive(Debug, Clone)]
pub struct BackgroundModel {
    variance_threshold: f32,
    initial_variance: f32,
    min_variance: f32,
    max_variance: f32,
    shadow_threshold: f32,
    mean: Option<Array2<f32>>,
    variance: Option<Array2<f32>>,
}

impl BackgroundModel {
    pub fn new(config: &BackgroundModelConfig) -> Self {
        Self {
            variance_threshold: config.variance_threshold as f32,
            initial_variance: config.initial_variance as f32,
            min_variance: config.min_variance as f32,
            max_variance: config.max_variance.max(config.min_variance) as f32,
            shadow_threshold: config.shadow_threshold as f32,
            mean: None,
            variance: None,
        }
    }

    pub fn is_initialized(&self) -> bool {
        self.mean.is_some()
    }

    /// Classifies every pixel of `luma` against the model, then moves the
    /// model towards `luma` by `learning_rate` (0 keeps it, 1 replaces it).
    /// The first frame ever applied becomes the background.
    pub fn apply(&mut self, luma: &Array2<f32>, learning_rate: f32) -> Result<Array2<u8>> {
        let (Some(mean), Some(variance)) = (self.mean.as_mut(), self.variance.as_mut()) else {
            self.mean = Some(luma.clone());
            self.variance = Some(Array2::from_elem(luma.dim(), self.initial_variance));
            return Ok(Array2::from_elem(luma.dim(), MASK_BACKGROUND));
        };

        if mean.dim() != luma.dim() {
            return Err(ScannerError::RecognitionError(format!(
                "frame size {:?} differs from background {:?}",
                luma.dim(),
                mean.dim()
            )));
        }

        let rate = learning_rate.clamp(0.0, 1.0);
        let threshold = self.variance_threshold;
        let shadow = self.shadow_threshold;
        let (min_var, max_var) = (self.min_variance, self.max_variance);

        let mut mask = Array2::from_elem(luma.dim(), MASK_BACKGROUND);
        Zip::from(&mut mask)
            .and(luma)
            .and(mean)
            .and(variance)
            .par_for_each(|label, &pixel, mu, var| {
                let diff = pixel - *mu;
                let dist2 = diff * diff;

                *label = if dist2 <= threshold * *var {
                    MASK_BACKGROUND
                } else if *mu > 0.0 && pixel < *mu && pixel / *mu >= shadow {
                    MASK_SHADOW
                } else {
                    MASK_FOREGROUND
                };

                if rate > 0.0 {
                    *mu += rate * diff;
                    *var = (*var + rate * (dist2 - *var)).clamp(min_var, max_var);
                }
            });

        Ok(mask)
    }
}

/// Share of strong-foreground pixels; shadow labels are discarded.
pub fn foreground_fraction(mask: &Array2<u8>) -> f64 {
    if mask.is_empty() {
        return 0.0;
    }
    let foreground = mask.iter().filter(|&&label| label == MASK_FOREGROUND).count();
    foreground as f64 / mask.len() as f64
}

/// Scores frames against an adaptive [`BackgroundModel`].
pub struct ForegroundScorer {
    model: BackgroundModel,
}

impl ForegroundScorer {
    pub fn new(model: BackgroundModel) -> Self {
        Self { model }
    }

    /// Replaces the background with `frame` at full weight.
    pub fn seed(&mut self, frame: &Frame) -> Result<()> {
        self.model.apply(&frame.luma(), 1.0)?;
        Ok(())
    }

    pub fn model(&self) -> &BackgroundModel {
        &self.model
    }
}

impl PresenceScorer for ForegroundScorer {
    fn score(&mut self, frame: &Frame, learning_rate: f64) -> Result<f64> {
        let mask = self.model.apply(&frame.luma(), learning_rate as f32)?;
        Ok(foreground_fraction(&mask))
    }
}

//! Frame sources for camera workers.
//!
//! Sources are blocking and owned by a single worker thread. `read` returns
//! `Ok(None)` when the stream is exhausted and `Err` on a failed read; the
//! worker decides whether to reopen.

#[cfg(feature = "gstreamer")]
pub mod gstreamer;
pub mod image_dir;
pub mod memory;

use chrono::{DateTime, Utc};
use image::RgbImage;
use ndarray::Array2;

use crate::error::{Result, ScannerError};

pub use image_dir::ImageDirSource;
pub use memory::{MemoryItem, MemorySource};

#[derive(Debug, Clone)]
pub struct Frame {
    pub image: RgbImage,
    pub sequence_num: u64,
    pub captured_at: DateTime<Utc>,
}

impl Frame {
    pub fn new(image: RgbImage, sequence_num: u64) -> Self {
        Self {
            image,
            sequence_num,
            captured_at: Utc::now(),
        }
    }

    /// Grayscale plane indexed `[row, column]`.
    pub fn luma(&self) -> Array2<f32> {
        let gray = image::imageops::grayscale(&self.image);
        let (width, height) = gray.dimensions();
        Array2::from_shape_fn((height as usize, width as usize), |(y, x)| {
            f32::from(gray.get_pixel(x as u32, y as u32)[0])
        })
    }
}

pub trait FrameSource: Send {
    fn open(&mut self) -> Result<()>;

    fn read(&mut self) -> Result<Option<Frame>>;

    fn close(&mut self) {}

    fn reopen(&mut self) -> Result<()> {
        self.close();
        self.open()
    }

    fn describe(&self) -> String;
}

/// Picks a source implementation from the URL scheme. The source is
/// returned unopened.
pub fn open_source(url: &str) -> Result<Box<dyn FrameSource>> {
    if let Some(path) = url.strip_prefix("dir://") {
        return Ok(Box::new(ImageDirSource::new(path)));
    }

    #[cfg(feature = "gstreamer")]
    if url.starts_with("rtsp://") || url.starts_with("v4l2://") || url.starts_with("gst://") {
        return Ok(Box::new(self::gstreamer::GStreamerSource::new(url)));
    }

    if !url.contains("://") {
        return Ok(Box::new(ImageDirSource::new(url)));
    }

    Err(ScannerError::CameraError(format!(
        "unsupported frame source: {}",
        url
    )))
}

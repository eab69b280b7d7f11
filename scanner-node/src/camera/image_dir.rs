use std::path::{Path, PathBuf};
use tracing::{debug, info};

use super::{Frame, FrameSource};
use crate::error::{Result, ScannerError};

const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "bmp"];

/// Replays a directory of still images in file-name order. Each `open`
/// rescans the directory and starts from the first image.
pub struct ImageDirSource {
    dir: PathBuf,
    files: Vec<PathBuf>,
    cursor: usize,
    sequence_num: u64,
}

impl ImageDirSource {
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
            files: Vec::new(),
            cursor: 0,
            sequence_num: 0,
        }
    }

    fn is_image(path: &Path) -> bool {
        path.extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| IMAGE_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
            .unwrap_or(false)
    }
}

impl FrameSource for ImageDirSource {
    fn open(&mut self) -> Result<()> {
        let entries = std::fs::read_dir(&self.dir).map_err(|e| {
            ScannerError::CameraError(format!("cannot open {}: {}", self.dir.display(), e))
        })?;

        let mut files = Vec::new();
        for entry in entries {
            let path = entry?.path();
            if path.is_file() && Self::is_image(&path) {
                files.push(path);
            }
        }
        files.sort();

        info!("Opened {} with {} frames", self.dir.display(), files.len());
        self.files = files;
        self.cursor = 0;
        Ok(())
    }

    fn read(&mut self) -> Result<Option<Frame>> {
        let Some(path) = self.files.get(self.cursor).cloned() else {
            return Ok(None);
        };
        self.cursor += 1;

        let image = image::open(&path)
            .map_err(|e| ScannerError::CameraError(format!("{}: {}", path.display(), e)))?
            .to_rgb8();
        self.sequence_num += 1;
        debug!("Read frame {} from {}", self.sequence_num, path.display());

        Ok(Some(Frame::new(image, self.sequence_num)))
    }

    fn close(&mut self) {
        self.files.clear();
        self.cursor = 0;
    }

    fn describe(&self) -> String {
        format!("dir://{}", self.dir.display())
    }
}

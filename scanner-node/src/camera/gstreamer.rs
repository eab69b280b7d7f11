use gstreamer::prelude::*;
use gstreamer_app::AppSink;
use gstreamer_video::VideoInfo;
use image::RgbImage;
use tracing::{info, warn};

use super::{Frame, FrameSource};
use crate::error::{Result, ScannerError};

const PULL_TIMEOUT_MS: u64 = 5000;

/// Live stream read through an appsink. Frames are pulled synchronously by
/// the owning worker; the appsink drops stale buffers so a slow worker
/// always sees recent frames.
pub struct GStreamerSource {
    url: String,
    pipeline: Option<gstreamer::Pipeline>,
    appsink: Option<AppSink>,
    sequence_num: u64,
}

impl GStreamerSource {
    pub fn new(url: &str) -> Self {
        Self {
            url: url.to_string(),
            pipeline: None,
            appsink: None,
            sequence_num: 0,
        }
    }

    fn pipeline_description(&self) -> String {
        let sink = "videoconvert ! video/x-raw,format=RGB ! appsink name=sink sync=false";
        if let Some(device) = self.url.strip_prefix("v4l2://") {
            format!("v4l2src device={} ! {}", device, sink)
        } else if let Some(desc) = self.url.strip_prefix("gst://") {
            desc.to_string()
        } else {
            format!("rtspsrc location={} latency=100 ! decodebin ! {}", self.url, sink)
        }
    }

    fn camera_error(message: impl std::fmt::Display) -> ScannerError {
        ScannerError::CameraError(message.to_string())
    }

    fn sample_to_frame(&mut self, sample: gstreamer::Sample) -> Result<Frame> {
        let buffer = sample
            .buffer()
            .ok_or_else(|| Self::camera_error("sample without buffer"))?;
        let caps = sample
            .caps()
            .ok_or_else(|| Self::camera_error("sample without caps"))?;
        let video_info = VideoInfo::from_caps(caps).map_err(Self::camera_error)?;
        let map = buffer.map_readable().map_err(Self::camera_error)?;

        let width = video_info.width();
        let height = video_info.height();
        let stride = video_info.stride()[0] as usize;
        let row_len = width as usize * 3;
        let data = map.as_slice();

        let mut pixels = Vec::with_capacity(row_len * height as usize);
        for row in 0..height as usize {
            let start = row * stride;
            let end = start + row_len;
            if end > data.len() {
                return Err(Self::camera_error("truncated video buffer"));
            }
            pixels.extend_from_slice(&data[start..end]);
        }

        let image = RgbImage::from_raw(width, height, pixels)
            .ok_or_else(|| Self::camera_error("buffer does not match frame size"))?;
        self.sequence_num += 1;
        Ok(Frame::new(image, self.sequence_num))
    }
}

impl FrameSource for GStreamerSource {
    fn open(&mut self) -> Result<()> {
        gstreamer::init().map_err(Self::camera_error)?;

        let desc = self.pipeline_description();
        info!("Creating GStreamer pipeline: {}", desc);
        let pipeline = gstreamer::parse_launch(&desc)
            .map_err(Self::camera_error)?
            .downcast::<gstreamer::Pipeline>()
            .map_err(|_| Self::camera_error("description is not a pipeline"))?;

        let appsink = pipeline
            .by_name("sink")
            .ok_or_else(|| Self::camera_error("no appsink named 'sink' in pipeline"))?
            .downcast::<AppSink>()
            .map_err(|_| Self::camera_error("element 'sink' is not an appsink"))?;
        appsink.set_drop(true);
        appsink.set_max_buffers(5);

        pipeline
            .set_state(gstreamer::State::Playing)
            .map_err(|e| Self::camera_error(format!("cannot start pipeline: {}", e)))?;

        self.pipeline = Some(pipeline);
        self.appsink = Some(appsink);
        Ok(())
    }

    fn read(&mut self) -> Result<Option<Frame>> {
        let appsink = self
            .appsink
            .clone()
            .ok_or_else(|| Self::camera_error("source is not open"))?;

        match appsink.try_pull_sample(gstreamer::ClockTime::from_mseconds(PULL_TIMEOUT_MS)) {
            Some(sample) => self.sample_to_frame(sample).map(Some),
            None if appsink.is_eos() => Ok(None),
            None => Err(ScannerError::Timeout(format!(
                "no frame from {} within {} ms",
                self.url, PULL_TIMEOUT_MS
            ))),
        }
    }

    fn close(&mut self) {
        if let Some(pipeline) = self.pipeline.take() {
            if let Err(e) = pipeline.set_state(gstreamer::State::Null) {
                warn!("Failed to stop pipeline for {}: {}", self.url, e);
            }
        }
        self.appsink = None;
    }

    fn describe(&self) -> String {
        self.url.clone()
    }
}

impl Drop for GStreamerSource {
    fn drop(&mut self) {
        self.close();
    }
}

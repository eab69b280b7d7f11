use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use image::{Rgb, RgbImage};
use tokio_util::sync::CancellationToken;

use packscan_common::{BadCodesReason, PackBadCodes, PackWithCodes};
use packscan_node::camera::{Frame, FrameSource, MemorySource};
use packscan_node::config::{
    BackgroundRecognizerConfig, CameraConfig, DebounceConfig, RecognizerConfig, SyncMode,
};
use packscan_node::messaging::Notifier;
use packscan_node::recognition::build_recognizer;
use packscan_node::scanning::{CodeExtractor, DecodedCodes};
use packscan_node::utils::metrics::Metrics;
use packscan_node::{Result, ScannerConfig, ScannerError, Station, WorkerParts};

#[derive(Default)]
struct RecordingNotifier {
    expected: Option<u32>,
    packs: Mutex<Vec<PackWithCodes>>,
    bad_packs: Mutex<Vec<PackBadCodes>>,
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify_pack(&self, pack: &PackWithCodes) -> Result<()> {
        self.packs.lock().unwrap().push(pack.clone());
        Ok(())
    }

    async fn notify_bad_pack(&self, pack: &PackBadCodes) -> Result<()> {
        self.bad_packs.lock().unwrap().push(pack.clone());
        Ok(())
    }

    async fn work_mode(&self) -> Option<String> {
        Some("auto".to_string())
    }

    async fn expected_codes_count(&self) -> Result<u32> {
        self.expected
            .ok_or_else(|| ScannerError::NotificationError("offline".to_string()))
    }
}

/// Spreads frames out in time so episodes on both cameras overlap.
struct Paced(MemorySource);

impl FrameSource for Paced {
    fn open(&mut self) -> Result<()> {
        self.0.open()
    }

    fn read(&mut self) -> Result<Option<Frame>> {
        std::thread::sleep(Duration::from_millis(15));
        self.0.read()
    }

    fn describe(&self) -> String {
        self.0.describe()
    }
}

/// Reads fixed codes whenever the frame is bright.
struct BrightFrameCodes {
    qr: Vec<&'static str>,
    barcode: Vec<&'static str>,
}

impl CodeExtractor for BrightFrameCodes {
    fn name(&self) -> &'static str {
        "bright-frame"
    }

    fn extract(&mut self, frame: &Frame) -> Result<DecodedCodes> {
        let bright = frame.luma().mean().unwrap_or(0.0) > 128.0;
        if !bright {
            return Ok(DecodedCodes::default());
        }
        Ok(DecodedCodes::new(
            self.qr.iter().map(|c| c.to_string()).collect(),
            self.barcode.iter().map(|c| c.to_string()).collect(),
        ))
    }
}

fn frames(pattern: &[(u8, usize)]) -> Vec<RgbImage> {
    pattern
        .iter()
        .flat_map(|&(level, count)| {
            std::iter::repeat(RgbImage::from_pixel(16, 12, Rgb([level; 3]))).take(count)
        })
        .collect()
}

fn camera(worker_id: u32) -> CameraConfig {
    CameraConfig {
        worker_id,
        name: format!("cam{}", worker_id),
        auto_reconnect: false,
        reconnect_delay_ms: 0,
        recognizer: RecognizerConfig::Background(BackgroundRecognizerConfig {
            debounce: DebounceConfig {
                activation_count: 3,
                deactivation_count: -3,
                threshold_score: 0.3,
            },
            ..Default::default()
        }),
        ..Default::default()
    }
}

fn station_config() -> ScannerConfig {
    let mut config = ScannerConfig::default();
    config.cameras = vec![camera(0), camera(1)];
    config.sync.mode = SyncMode::Interval;
    config.sync.sides = 2;
    config.sync.poll_interval_ms = 10;
    config.expected_codes_count = Some(1);
    config
}

type Script = (Vec<RgbImage>, Vec<&'static str>, Vec<&'static str>);

fn script(images: Vec<RgbImage>, qr: &[&'static str], barcode: &[&'static str]) -> Script {
    (images, qr.to_vec(), barcode.to_vec())
}

async fn run_station(config: &ScannerConfig, scripts: Vec<Script>) -> Arc<RecordingNotifier> {
    run_station_with(config, scripts, RecordingNotifier::default()).await
}

async fn run_station_with(
    config: &ScannerConfig,
    scripts: Vec<Script>,
    notifier: RecordingNotifier,
) -> Arc<RecordingNotifier> {
    let notifier = Arc::new(notifier);
    let metrics = Arc::new(Metrics::new().unwrap());
    let mut scripts = scripts.into_iter();

    let station = Station::assemble(
        config,
        notifier.clone(),
        metrics,
        CancellationToken::new(),
        |camera| {
            let (images, qr, barcode) = scripts.next().unwrap();
            Ok(WorkerParts {
                source: Box::new(Paced(MemorySource::new(camera.name.clone(), images))),
                recognizer: build_recognizer(&camera.recognizer)?,
                extractor: Box::new(BrightFrameCodes { qr, barcode }),
            })
        },
    )
    .unwrap();
    assert_eq!(station.worker_count(), config.cameras.len());

    tokio::time::timeout(Duration::from_secs(10), station.run(true))
        .await
        .expect("station did not finish")
        .unwrap();
    notifier
}

#[tokio::test]
async fn pack_seen_by_one_camera_is_confirmed() {
    let config = station_config();
    let notifier = run_station(
        &config,
        vec![
            script(frames(&[(10, 5), (240, 6), (10, 6)]), &["Q1"], &["B1"]),
            script(frames(&[(10, 17)]), &[], &[]),
        ],
    )
    .await;

    let packs = notifier.packs.lock().unwrap();
    assert_eq!(packs.len(), 1);
    assert_eq!(packs[0].qr_codes(), &["Q1".to_string()][..]);
    assert_eq!(packs[0].barcodes(), &["B1".to_string()][..]);
    assert!(notifier.bad_packs.lock().unwrap().is_empty());
}

#[tokio::test]
async fn barcode_from_the_other_camera_completes_the_pack() {
    let config = station_config();
    let notifier = run_station(
        &config,
        vec![
            script(frames(&[(10, 5), (240, 6), (10, 6)]), &["Q1"], &[]),
            script(frames(&[(10, 5), (240, 6), (10, 6)]), &[], &["B1"]),
        ],
    )
    .await;

    let packs = notifier.packs.lock().unwrap();
    assert_eq!(packs.len(), 1);
    assert_eq!(packs[0].barcodes(), &["B1".to_string()][..]);
}

#[tokio::test]
async fn qr_codes_on_both_sides_are_rejected() {
    let config = station_config();
    let notifier = run_station(
        &config,
        vec![
            script(frames(&[(10, 5), (240, 6), (10, 6)]), &["Q1"], &["B1"]),
            script(frames(&[(10, 5), (240, 6), (10, 6)]), &["Q2"], &["B2"]),
        ],
    )
    .await;

    assert!(notifier.packs.lock().unwrap().is_empty());
    let bad = notifier.bad_packs.lock().unwrap();
    assert_eq!(bad.len(), 1);
    assert_eq!(bad[0].reason, BadCodesReason::ConflictingSides { sides: vec![0, 1] });
}

#[tokio::test]
async fn expected_count_comes_from_the_server() {
    let mut config = station_config();
    config.cameras = vec![camera(0)];
    config.sync.mode = SyncMode::Instant;
    config.sync.sides = 1;
    config.expected_codes_count = Some(1);

    let notifier = run_station_with(
        &config,
        vec![script(frames(&[(10, 5), (240, 6), (10, 6)]), &["Q1", "Q2"], &["B1", "B2"])],
        RecordingNotifier {
            expected: Some(2),
            ..Default::default()
        },
    )
    .await;

    assert!(notifier.bad_packs.lock().unwrap().is_empty());
    let packs = notifier.packs.lock().unwrap();
    assert_eq!(packs.len(), 1);
    assert_eq!(packs[0].qr_codes(), &["Q1".to_string(), "Q2".to_string()][..]);
    assert_eq!(packs[0].barcodes(), &["B1".to_string(), "B2".to_string()][..]);
}

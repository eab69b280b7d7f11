use serde::{Deserialize, Serialize};
use std::{collections::HashSet, path::PathBuf, time::Duration};
use validator::{Validate, ValidationError, ValidationErrors};

use crate::error::{Result, ScannerError};
use packscan_common::{utils::validate_server_url, WorkerId};

#[derive(Debug, Serialize, Deserialize, Clone, Validate)]
#[serde(default)]
#[validate(schema(function = "validate_cameras"))]
pub struct ScannerConfig {
    #[validate(length(min = 1))]
    pub node_id: String,
    #[validate]
    pub cameras: Vec<CameraConfig>,
    #[validate]
    pub sync: SyncConfig,
    #[validate]
    pub channel: ChannelConfig,
    #[validate]
    pub server: ServerConfig,
    /// Used until the server reports the current batch.
    pub expected_codes_count: Option<u32>,
    pub monitoring: MonitoringConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Serialize, Deserialize, Clone, Validate)]
#[serde(default)]
pub struct CameraConfig {
    pub worker_id: WorkerId,
    pub name: String,
    /// `dir://<path>`, a plain directory path, or (with the `gstreamer`
    /// feature) `rtsp://...`, `v4l2://<device>`, `gst://<pipeline>`.
    #[validate(length(min = 1))]
    pub source: String,
    pub enabled: bool,
    pub auto_reconnect: bool,
    pub reconnect_delay_ms: u64,
    /// Consecutive reopen attempts without a frame before the worker gives up.
    pub max_reconnect_attempts: Option<u32>,
    /// Presence is evaluated on every K-th frame.
    #[validate(range(min = 1))]
    pub frames_per_check: u32,
    #[validate]
    pub recognizer: RecognizerConfig,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RecognizerConfig {
    /// Adaptive background subtraction.
    Background(BackgroundRecognizerConfig),
    /// Three-frame differencing.
    Motion(MotionRecognizerConfig),
    /// Mean difference to a fixed image of the empty station.
    Reference(ReferenceRecognizerConfig),
}

impl Validate for RecognizerConfig {
    fn validate(&self) -> std::result::Result<(), ValidationErrors> {
        match self {
            RecognizerConfig::Background(config) => config.validate(),
            RecognizerConfig::Motion(config) => config.validate(),
            RecognizerConfig::Reference(config) => config.validate(),
        }
    }
}

/// `deactivation_count < 0 < activation_count`.
#[derive(Debug, Serialize, Deserialize, Clone, Validate)]
#[serde(default)]
#[validate(schema(function = "validate_debounce"))]
pub struct DebounceConfig {
    pub activation_count: i32,
    pub deactivation_count: i32,
    #[validate(range(min = 0.0, max = 1.0))]
    pub threshold_score: f64,
}

#[derive(Debug, Serialize, Deserialize, Clone, Validate)]
#[serde(default)]
pub struct BackgroundRecognizerConfig {
    #[validate]
    pub debounce: DebounceConfig,
    #[validate(range(min = 0.0, max = 1.0))]
    pub learning_rate: f64,
    pub background_image: Option<PathBuf>,
    #[validate]
    pub model: BackgroundModelConfig,
}

#[derive(Debug, Serialize, Deserialize, Clone, Validate)]
#[serde(default)]
pub struct BackgroundModelConfig {
    #[validate(range(min = 0.0))]
    pub variance_threshold: f64,
    #[validate(range(min = 0.0))]
    pub initial_variance: f64,
    #[validate(range(min = 0.0))]
    pub min_variance: f64,
    #[validate(range(min = 0.0))]
    pub max_variance: f64,
    /// Darker pixels whose brightness ratio to the background stays above
    /// this value are treated as shadow.
    #[validate(range(min = 0.0, max = 1.0))]
    pub shadow_threshold: f64,
}

#[derive(Debug, Serialize, Deserialize, Clone, Validate)]
#[serde(default)]
pub struct MotionRecognizerConfig {
    #[validate]
    pub debounce: DebounceConfig,
    #[validate(range(min = 0.0, max = 255.0))]
    pub pixel_threshold: f64,
}

#[derive(Debug, Serialize, Deserialize, Clone, Validate)]
pub struct ReferenceRecognizerConfig {
    #[serde(default)]
    #[validate]
    pub debounce: DebounceConfig,
    pub reference_image: PathBuf,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SyncMode {
    /// Cross-camera reconciliation by time overlap.
    Interval,
    /// Per-result validation for single-camera stations.
    Instant,
}

#[derive(Debug, Serialize, Deserialize, Clone, Validate)]
#[serde(default)]
pub struct SyncConfig {
    pub mode: SyncMode,
    pub settle_timeout_secs: u64,
    #[validate(range(min = 1))]
    pub poll_interval_ms: u64,
    /// Number of cameras looking at one pack from different sides.
    #[validate(range(min = 1))]
    pub sides: usize,
}

#[derive(Debug, Serialize, Deserialize, Clone, Validate)]
#[serde(default)]
pub struct ChannelConfig {
    #[validate(range(min = 1))]
    pub capacity: usize,
    pub send_timeout_ms: u64,
}

#[derive(Debug, Serialize, Deserialize, Clone, Validate)]
#[serde(default)]
pub struct ServerConfig {
    #[validate(custom = "validate_base_url")]
    pub base_url: Option<String>,
    #[validate(range(min = 1))]
    pub request_timeout_ms: u64,
    #[validate(range(min = 1))]
    pub batch_refresh_secs: u64,
    pub auto_work_mode: String,
    /// Skip confirmed-pack notifications unless the server reports `auto_work_mode`.
    pub require_auto_mode: bool,
    pub bad_pack_path: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct MonitoringConfig {
    pub enable_metrics: bool,
    pub metrics_dump_path: Option<PathBuf>,
    pub report_interval_secs: u64,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
}

fn validate_base_url(url: &str) -> std::result::Result<(), ValidationError> {
    validate_server_url(url).map_err(|_| ValidationError::new("base_url"))
}

fn validate_debounce(config: &DebounceConfig) -> std::result::Result<(), ValidationError> {
    if config.deactivation_count < 0 && config.activation_count > 0 {
        Ok(())
    } else {
        Err(ValidationError::new("debounce_bounds"))
    }
}

fn validate_cameras(config: &ScannerConfig) -> std::result::Result<(), ValidationError> {
    if config.cameras.is_empty() {
        return Err(ValidationError::new("no_cameras"));
    }
    let mut seen = HashSet::new();
    for camera in &config.cameras {
        if !seen.insert(camera.worker_id) {
            return Err(ValidationError::new("duplicate_worker_id"));
        }
    }
    Ok(())
}

impl ScannerConfig {
    /// Reads a YAML file (if present) layered with `PACKSCAN_*` environment
    /// overrides (`__` separates nested keys), then validates the result.
    pub fn load(path: &str) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name(path).required(false))
            .add_source(
                config::Environment::with_prefix("PACKSCAN")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let config: ScannerConfig = settings.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_yaml(text: &str) -> Result<Self> {
        let config: ScannerConfig = serde_yaml::from_str(text)
            .map_err(|e| ScannerError::ConfigError(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn enabled_cameras(&self) -> impl Iterator<Item = &CameraConfig> {
        self.cameras.iter().filter(|camera| camera.enabled)
    }
}

impl CameraConfig {
    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }
}

impl SyncConfig {
    pub fn settle_timeout(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.settle_timeout_secs as i64)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

impl ChannelConfig {
    pub fn send_timeout(&self) -> Duration {
        Duration::from_millis(self.send_timeout_ms)
    }
}

impl ServerConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn batch_refresh_interval(&self) -> Duration {
        Duration::from_secs(self.batch_refresh_secs)
    }
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            node_id: "packscan-node-1".to_string(),
            cameras: vec![],
            sync: SyncConfig::default(),
            channel: ChannelConfig::default(),
            server: ServerConfig::default(),
            expected_codes_count: None,
            monitoring: MonitoringConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            worker_id: 0,
            name: "camera-0".to_string(),
            source: "dir://frames/camera-0".to_string(),
            enabled: true,
            auto_reconnect: true,
            reconnect_delay_ms: 1000,
            max_reconnect_attempts: None,
            frames_per_check: 1,
            recognizer: RecognizerConfig::default(),
        }
    }
}

impl Default for RecognizerConfig {
    fn default() -> Self {
        RecognizerConfig::Background(BackgroundRecognizerConfig::default())
    }
}

impl Default for DebounceConfig {
    fn default() -> Self {
        Self {
            activation_count: 15,
            deactivation_count: -20,
            threshold_score: 0.3,
        }
    }
}

impl Default for BackgroundRecognizerConfig {
    fn default() -> Self {
        Self {
            debounce: DebounceConfig::default(),
            learning_rate: 1e-4,
            background_image: None,
            model: BackgroundModelConfig::default(),
        }
    }
}

impl Default for BackgroundModelConfig {
    fn default() -> Self {
        Self {
            variance_threshold: 16.0,
            initial_variance: 15.0,
            min_variance: 4.0,
            max_variance: 75.0,
            shadow_threshold: 0.5,
        }
    }
}

impl Default for MotionRecognizerConfig {
    fn default() -> Self {
        Self {
            debounce: DebounceConfig::default(),
            pixel_threshold: 5.0,
        }
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            mode: SyncMode::Interval,
            settle_timeout_secs: 20,
            poll_interval_ms: 500,
            sides: 2,
        }
    }
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            capacity: 256,
            send_timeout_ms: 500,
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            request_timeout_ms: 2000,
            batch_refresh_secs: 30,
            auto_work_mode: "auto".to_string(),
            require_auto_mode: false,
            bad_pack_path: None,
        }
    }
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        Self {
            enable_metrics: true,
            metrics_dump_path: None,
            report_interval_secs: 60,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const STATION: &str = r#"
node_id: line-3
expected_codes_count: 2
cameras:
  - worker_id: 0
    name: left
    source: dir:///var/lib/packscan/left
    frames_per_check: 15
    recognizer:
      kind: background
      learning_rate: 0.0002
      debounce:
        activation_count: 10
        deactivation_count: -12
        threshold_score: 0.25
  - worker_id: 1
    name: right
    source: dir:///var/lib/packscan/right
    recognizer:
      kind: motion
server:
  base_url: http://10.0.0.5:8000
"#;

    #[test]
    fn parses_station_yaml_with_defaults() {
        let config = ScannerConfig::from_yaml(STATION).unwrap();
        assert_eq!(config.node_id, "line-3");
        assert_eq!(config.cameras.len(), 2);
        assert_eq!(config.cameras[0].frames_per_check, 15);
        assert!(config.cameras[1].auto_reconnect);
        assert_eq!(config.sync.settle_timeout_secs, 20);
        assert_eq!(config.server.request_timeout_ms, 2000);

        match &config.cameras[0].recognizer {
            RecognizerConfig::Background(bg) => {
                assert_eq!(bg.debounce.activation_count, 10);
                assert_eq!(bg.debounce.deactivation_count, -12);
                assert_eq!(bg.model.variance_threshold, 16.0);
            }
            other => panic!("unexpected recognizer {:?}", other),
        }
        assert!(matches!(config.cameras[1].recognizer, RecognizerConfig::Motion(_)));
    }

    #[test]
    fn rejects_positive_deactivation_count() {
        let yaml = STATION.replace("deactivation_count: -12", "deactivation_count: 3");
        let err = ScannerConfig::from_yaml(&yaml).unwrap_err();
        assert!(matches!(err, ScannerError::ValidationError(_)));
    }

    #[test]
    fn rejects_duplicate_worker_ids() {
        let yaml = STATION.replace("worker_id: 1", "worker_id: 0");
        assert!(ScannerConfig::from_yaml(&yaml).is_err());
    }

    #[test]
    fn rejects_non_http_server_url() {
        let yaml = STATION.replace("http://10.0.0.5:8000", "ftp://10.0.0.5");
        assert!(ScannerConfig::from_yaml(&yaml).is_err());
    }

    #[test]
    fn reference_recognizer_needs_an_image() {
        let with_image = STATION.replace(
            "      kind: motion",
            "      kind: reference\n      reference_image: /var/lib/packscan/empty.png",
        );
        let config = ScannerConfig::from_yaml(&with_image).unwrap();
        match &config.cameras[1].recognizer {
            RecognizerConfig::Reference(reference) => {
                assert_eq!(reference.reference_image.to_str(), Some("/var/lib/packscan/empty.png"));
                assert_eq!(reference.debounce.activation_count, 15);
            }
            other => panic!("unexpected recognizer {:?}", other),
        }

        let without_image = STATION.replace("      kind: motion", "      kind: reference");
        assert!(ScannerConfig::from_yaml(&without_image).is_err());
    }

    #[test]
    fn a_station_needs_at_least_one_camera() {
        assert!(ScannerConfig::default().validate().is_err());
    }

    #[test]
    fn load_reads_yaml_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scanner.yaml");
        std::fs::write(&path, STATION).unwrap();

        let config = ScannerConfig::load(path.to_str().unwrap()).unwrap();
        assert_eq!(config.expected_codes_count, Some(2));
        assert_eq!(config.enabled_cameras().count(), 2);
    }
}

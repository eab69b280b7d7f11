use thiserror::Error;

#[derive(Error, Debug)]
pub enum ScannerError {
    #[error("Camera error: {0}")]
    CameraError(String),

    #[error("Recognition error: {0}")]
    RecognitionError(String),

    #[error("Extraction error: {0}")]
    ExtractionError(String),

    #[error("Notification error: {0}")]
    NotificationError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Timeout: {0}")]
    Timeout(String),

    #[error("Validation error: {0}")]
    ValidationError(String),
}

impl From<reqwest::Error> for ScannerError {
    fn from(error: reqwest::Error) -> Self {
        if error.is_timeout() {
            ScannerError::Timeout(error.to_string())
        } else {
            ScannerError::NotificationError(error.to_string())
        }
    }
}

impl From<serde_json::Error> for ScannerError {
    fn from(error: serde_json::Error) -> Self {
        ScannerError::SerializationError(error.to_string())
    }
}

impl From<image::ImageError> for ScannerError {
    fn from(error: image::ImageError) -> Self {
        ScannerError::CameraError(error.to_string())
    }
}

impl From<config::ConfigError> for ScannerError {
    fn from(error: config::ConfigError) -> Self {
        ScannerError::ConfigError(error.to_string())
    }
}

impl From<validator::ValidationErrors> for ScannerError {
    fn from(error: validator::ValidationErrors) -> Self {
        ScannerError::ValidationError(error.to_string())
    }
}

impl From<prometheus::Error> for ScannerError {
    fn from(error: prometheus::Error) -> Self {
        ScannerError::ConfigError(format!("metrics registry: {}", error))
    }
}

pub type Result<T> = std::result::Result<T, ScannerError>;

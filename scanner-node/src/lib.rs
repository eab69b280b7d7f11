//! Pack scanning station: per-camera presence tracking and code collection,
//! cross-camera reconciliation and reporting to the line server.

pub mod camera;
pub mod config;
pub mod controller;
pub mod error;
pub mod messaging;
pub mod recognition;
pub mod scanning;
pub mod station;
pub mod sync;
pub mod utils;

pub use config::ScannerConfig;
pub use controller::{Controller, ControllerReport, WorkerStatus};
pub use error::{Result, ScannerError};
pub use station::{Station, WorkerParts};

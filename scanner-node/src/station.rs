//! Wires camera workers to the controller for one scanning station.

use std::sync::Arc;
use std::thread::JoinHandle;

use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::camera::{open_source, FrameSource};
use crate::config::{CameraConfig, ScannerConfig};
use crate::controller::{Controller, ControllerReport};
use crate::error::Result;
use crate::messaging::{event_channel, Notifier};
use crate::recognition::{build_recognizer, PackRecognizer};
use crate::scanning::{CameraWorker, CodeExtractor, NullExtractor};
use crate::utils::metrics::Metrics;
use packscan_common::WorkerId;

/// Per-camera components owned by a worker thread.
pub struct WorkerParts {
    pub source: Box<dyn FrameSource>,
    pub recognizer: Box<dyn PackRecognizer>,
    pub extractor: Box<dyn CodeExtractor>,
}

impl WorkerParts {
    /// Source and recognizer as configured. Code decoding is provided by the
    /// deployment; the default extractor reads nothing.
    pub fn from_config(camera: &CameraConfig) -> Result<Self> {
        Ok(Self {
            source: open_source(&camera.source)?,
            recognizer: build_recognizer(&camera.recognizer)?,
            extractor: Box::new(NullExtractor),
        })
    }
}

pub struct Station {
    controller: Controller,
    workers: Vec<CameraWorker>,
    cancel: CancellationToken,
}

impl Station {
    pub fn from_config(
        config: &ScannerConfig,
        notifier: Arc<dyn Notifier>,
        metrics: Arc<Metrics>,
        cancel: CancellationToken,
    ) -> Result<Self> {
        Self::assemble(config, notifier, metrics, cancel, WorkerParts::from_config)
    }

    /// Builds a worker for every enabled camera using `parts` to create its
    /// source, recognizer and extractor.
    pub fn assemble<F>(
        config: &ScannerConfig,
        notifier: Arc<dyn Notifier>,
        metrics: Arc<Metrics>,
        cancel: CancellationToken,
        mut parts: F,
    ) -> Result<Self>
    where
        F: FnMut(&CameraConfig) -> Result<WorkerParts>,
    {
        let (sender, events) = event_channel(&config.channel, metrics.clone());

        let mut workers = Vec::new();
        for camera in config.enabled_cameras() {
            let WorkerParts {
                source,
                recognizer,
                extractor,
            } = parts(camera)?;
            info!(
                worker_id = camera.worker_id,
                name = %camera.name,
                source = %source.describe(),
                "Camera configured"
            );
            let worker = CameraWorker::new(
                camera.clone(),
                source,
                recognizer,
                extractor,
                sender.clone(),
                cancel.child_token(),
                metrics.clone(),
            );
            workers.push(worker);
        }

        let controller = Controller::new(config, events, notifier, metrics, cancel.clone());
        Ok(Self {
            controller,
            workers,
            cancel,
        })
    }

    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }

    /// Runs until cancelled, or with `once` until every camera has finished.
    /// Workers are stopped and joined before the final flush.
    pub async fn run(self, once: bool) -> Result<ControllerReport> {
        let Station {
            mut controller,
            workers,
            cancel,
        } = self;

        let mut handles: Vec<(WorkerId, JoinHandle<()>)> = Vec::with_capacity(workers.len());
        for worker in workers {
            let worker_id = worker.worker_id();
            controller.register_worker(worker_id);
            match worker.spawn() {
                Ok(handle) => handles.push((worker_id, handle)),
                Err(e) => {
                    error!(worker_id, error = %e, "Failed to start camera worker");
                    cancel.cancel();
                    join_workers(handles).await;
                    return Err(e.into());
                }
            }
        }
        info!(cameras = handles.len(), "Station running");

        controller.run(once).await;

        cancel.cancel();
        join_workers(handles).await;
        Ok(controller.finish().await)
    }
}

async fn join_workers(handles: Vec<(WorkerId, JoinHandle<()>)>) {
    let joined = tokio::task::spawn_blocking(move || {
        for (worker_id, handle) in handles {
            if handle.join().is_err() {
                error!(worker_id, "Camera worker panicked");
            }
        }
    })
    .await;
    if let Err(e) = joined {
        error!(error = %e, "Failed to join camera workers");
    }
}

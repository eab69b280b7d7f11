//! HTTP client for the line server.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::Notifier;
use crate::config::ServerConfig;
use crate::error::{Result, ScannerError};
use packscan_common::{PackBadCodes, PackWithCodes};

const NEW_PACK_PATH: &str = "/api/v1_0/new_pack_after_pintset";
const WORK_MODE_PATH: &str = "/api/v1_0/get_mode";
const CURRENT_BATCH_PATH: &str = "/api/v1_0/current_batch";

#[derive(Debug, Serialize)]
struct CodePair<'a> {
    qr: &'a str,
    barcode: &'a str,
}

#[derive(Debug, Deserialize)]
struct WorkModeReply {
    work_mode: Option<String>,
}

#[derive(Debug, Deserialize)]
struct BatchReply {
    params: Option<BatchParams>,
}

#[derive(Debug, Deserialize)]
struct BatchParams {
    multipacks_after_pintset: Option<u32>,
}

/// Extracts `work_mode` from a `get_mode` reply body.
pub fn parse_work_mode(body: &str) -> Option<String> {
    serde_json::from_str::<WorkModeReply>(body)
        .ok()
        .and_then(|reply| reply.work_mode)
}

/// Extracts `params.multipacks_after_pintset` from a `current_batch` reply
/// body. A missing field is an error.
pub fn parse_expected_codes(body: &str) -> Result<u32> {
    let reply: BatchReply = serde_json::from_str(body)?;
    reply
        .params
        .and_then(|params| params.multipacks_after_pintset)
        .ok_or_else(|| {
            ScannerError::NotificationError(
                "current_batch reply has no params.multipacks_after_pintset".to_string(),
            )
        })
}

pub struct HttpNotifier {
    client: Client,
    base_url: String,
    bad_pack_path: Option<String>,
}

impl HttpNotifier {
    pub fn new(base_url: &str, config: &ServerConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.request_timeout())
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            bad_pack_path: config.bad_pack_path.clone(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn put_pair(&self, qr: &str, barcode: &str) -> Result<()> {
        let response = self
            .client
            .put(self.url(NEW_PACK_PATH))
            .json(&CodePair { qr, barcode })
            .send()
            .await?;
        response.error_for_status()?;
        Ok(())
    }

    async fn get_text(&self, path: &str) -> Result<String> {
        let response = self.client.get(self.url(path)).send().await?;
        Ok(response.error_for_status()?.text().await?)
    }
}

#[async_trait]
impl Notifier for HttpNotifier {
    async fn notify_pack(&self, pack: &PackWithCodes) -> Result<()> {
        let mut failed = 0usize;
        for (qr, barcode) in pack.pairs() {
            match self.put_pair(qr, barcode).await {
                Ok(()) => debug!(pack_id = %pack.pack_id(), qr, barcode, "Code pair sent"),
                Err(e) => {
                    warn!(pack_id = %pack.pack_id(), qr, barcode, error = %e, "Failed to send code pair");
                    failed += 1;
                }
            }
        }

        if failed == 0 {
            info!(pack_id = %pack.pack_id(), pairs = pack.qr_codes().len(), "Pack reported");
            Ok(())
        } else {
            Err(ScannerError::NotificationError(format!(
                "{} of {} code pairs not delivered",
                failed,
                pack.qr_codes().len()
            )))
        }
    }

    async fn notify_bad_pack(&self, pack: &PackBadCodes) -> Result<()> {
        match &self.bad_pack_path {
            Some(path) => {
                self.client
                    .post(self.url(path))
                    .json(pack)
                    .send()
                    .await?
                    .error_for_status()?;
                info!(pack_id = %pack.pack_id, "Bad pack reported");
            }
            None => {
                warn!(pack_id = %pack.pack_id, reason = ?pack.reason, "Pack with bad codes");
            }
        }
        Ok(())
    }

    async fn work_mode(&self) -> Option<String> {
        match self.get_text(WORK_MODE_PATH).await {
            Ok(body) => parse_work_mode(&body),
            Err(e) => {
                warn!(error = %e, "Work mode query failed");
                None
            }
        }
    }

    async fn expected_codes_count(&self) -> Result<u32> {
        let body = self.get_text(CURRENT_BATCH_PATH).await?;
        parse_expected_codes(&body)
    }
}

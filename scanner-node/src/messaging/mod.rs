//! Outbound messaging: the worker → controller event channel and the
//! notifications sent to the line server.

pub mod channel;
pub mod http;

use async_trait::async_trait;
use tracing::{info, warn};

use crate::error::{Result, ScannerError};
use packscan_common::{PackBadCodes, PackWithCodes};

pub use channel::{event_channel, EventSender};
pub use http::HttpNotifier;

/// Reports outcomes to the line server and reads its operating parameters.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Sends every code pair of a confirmed pack. Failures are logged per
    /// pair; an error is returned if any pair was not delivered.
    async fn notify_pack(&self, pack: &PackWithCodes) -> Result<()>;

    async fn notify_bad_pack(&self, pack: &PackBadCodes) -> Result<()>;

    /// `None` when the mode is unknown (request failed or malformed reply).
    async fn work_mode(&self) -> Option<String>;

    /// Expected codes per pack for the current batch.
    async fn expected_codes_count(&self) -> Result<u32>;
}

/// Used when no server is configured: outcomes are only logged.
#[derive(Debug, Default)]
pub struct LogOnlyNotifier;

#[async_trait]
impl Notifier for LogOnlyNotifier {
    async fn notify_pack(&self, pack: &PackWithCodes) -> Result<()> {
        for (qr, barcode) in pack.pairs() {
            info!(pack_id = %pack.pack_id(), qr, barcode, "Pack confirmed");
        }
        Ok(())
    }

    async fn notify_bad_pack(&self, pack: &PackBadCodes) -> Result<()> {
        warn!(pack_id = %pack.pack_id, reason = ?pack.reason, "Pack with bad codes");
        Ok(())
    }

    async fn work_mode(&self) -> Option<String> {
        None
    }

    async fn expected_codes_count(&self) -> Result<u32> {
        Err(ScannerError::NotificationError(
            "no server configured".to_string(),
        ))
    }
}

//! QR artifact polling.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use bytes::Bytes;

use crate::config::PollPolicy;
use crate::error::GatewayTimeout;
use crate::gateway::{BestEffort, QrPoll, SessionGateway};

/// PNG returned by the gateway for the pairing scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QrImage(Bytes);

impl QrImage {
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn to_data_url(&self) -> String {
        format!("data:image/png;base64,{}", STANDARD.encode(&self.0))
    }
}

/// Try the QR endpoint up to `policy.max_attempts` times, sleeping
/// `policy.interval` between attempts. Only HTTP 200 ends the loop early.
pub async fn acquire_qr(
    gateway: &dyn SessionGateway,
    name: &str,
    policy: PollPolicy,
) -> Result<QrImage, GatewayTimeout> {
    for attempt in 1..=policy.max_attempts {
        match BestEffort::from(gateway.get_qr_code(name).await).log_discarded("QR poll", name) {
            Some(QrPoll::Ready(bytes)) => {
                tracing::info!(session = name, attempt, bytes = bytes.len(), "QR code obtained");
                return Ok(QrImage(bytes));
            }
            Some(QrPoll::NotReady { status }) => {
                tracing::debug!(
                    session = name,
                    attempt,
                    max_attempts = policy.max_attempts,
                    http_status = status,
                    "QR code not available yet"
                );
            }
            None => {}
        }

        if attempt < policy.max_attempts {
            tokio::time::sleep(policy.interval).await;
        }
    }

    tracing::warn!(session = name, max_attempts = policy.max_attempts, "QR code never became available");
    Err(GatewayTimeout::QrCode {
        attempts: policy.max_attempts,
        interval: policy.interval,
    })
}

//! Messaging gateway session API.
//!
//! The gateway owns the session state machine; this crate only observes and
//! nudges it. [`SessionGateway`] is the seam the provisioning flow talks to,
//! [`client::HttpGatewayClient`] is the REST implementation.

pub mod client;
#[cfg(test)]
pub(crate) mod fake;

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;

use crate::credentials::GatewayCredentials;
use crate::error::GatewayError;

pub use self::client::{HttpGatewayClient, HttpGatewayFactory};

/// Session status as reported by the gateway.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SessionStatus {
    Starting,
    Started,
    Stopped,
    ScanQrCode,
    Working,
    Failed,
    Other(String),
}

impl SessionStatus {
    pub fn parse(value: &str) -> Self {
        match value.trim().to_ascii_uppercase().as_str() {
            "STARTING" => Self::Starting,
            "STARTED" => Self::Started,
            "STOPPED" => Self::Stopped,
            "SCAN_QR_CODE" => Self::ScanQrCode,
            "WORKING" => Self::Working,
            "FAILED" => Self::Failed,
            _ => Self::Other(value.trim().to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Starting => "STARTING",
            Self::Started => "STARTED",
            Self::Stopped => "STOPPED",
            Self::ScanQrCode => "SCAN_QR_CODE",
            Self::Working => "WORKING",
            Self::Failed => "FAILED",
            Self::Other(raw) => raw,
        }
    }

    /// States the readiness wait may stop on.
    pub fn is_ready(&self) -> bool {
        matches!(self, Self::Started | Self::Working | Self::ScanQrCode)
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Account the session is logged in as (`me` in the gateway payload).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionIdentity {
    pub id: String,
    pub push_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewaySession {
    pub name: String,
    pub status: SessionStatus,
    pub identity: Option<SessionIdentity>,
}

/// One QR poll attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QrPoll {
    /// HTTP 200 with the PNG body.
    Ready(Bytes),
    /// Any other HTTP status; the caller keeps polling.
    NotReady { status: u16 },
}

#[async_trait]
pub trait SessionGateway: Send + Sync {
    /// Current state of `name`, or `None` when the gateway does not know it.
    async fn get_session(&self, name: &str) -> Result<Option<GatewaySession>, GatewayError>;

    /// Create and start `name`, returning the state reported by the gateway.
    async fn create_session(&self, name: &str) -> Result<GatewaySession, GatewayError>;

    /// Remove `name`. An unknown session counts as removed.
    async fn delete_session(&self, name: &str) -> Result<(), GatewayError>;

    async fn get_qr_code(&self, name: &str) -> Result<QrPoll, GatewayError>;
}

/// Builds a gateway bound to a set of pooled credentials.
pub trait GatewayFactory: Send + Sync {
    fn gateway(
        &self,
        credentials: &GatewayCredentials,
    ) -> Result<Arc<dyn SessionGateway>, GatewayError>;
}

/// Outcome of a call whose failure is tolerated.
///
/// Failures are kept as a value instead of being dropped with `let _ =`, so
/// the caller has to log or inspect them.
#[must_use]
#[derive(Debug)]
pub enum BestEffort<T> {
    Done(T),
    Discarded(GatewayError),
}

impl<T> BestEffort<T> {
    pub fn is_discarded(&self) -> bool {
        matches!(self, Self::Discarded(_))
    }

    /// Log a discarded failure at warn and return the value, if any.
    pub fn log_discarded(self, action: &str, session: &str) -> Option<T> {
        match self {
            Self::Done(value) => Some(value),
            Self::Discarded(error) => {
                tracing::warn!(session, error = %error, "Ignoring failed {}", action);
                None
            }
        }
    }
}

impl<T> From<Result<T, GatewayError>> for BestEffort<T> {
    fn from(result: Result<T, GatewayError>) -> Self {
        match result {
            Ok(value) => Self::Done(value),
            Err(error) => Self::Discarded(error),
        }
    }
}

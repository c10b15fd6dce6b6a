//! Request and response shapes of the connect flow.

use serde::{Deserialize, Serialize};

use crate::db::{ConnectionRecord, IdentityMapping, SessionRecord};
use crate::error::{ConnectError, ConnectErrorKind};

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectRequest {
    pub session_name: String,
    #[serde(default)]
    pub phone_number: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionSummary {
    pub name: String,
    pub status: String,
}

/// Successful end states of one orchestration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectOutcome {
    AlreadyAuthenticated,
    QrIssued {
        qr_code: String,
        phone_number: Option<String>,
        session: SessionSummary,
    },
}

/// Uniform JSON envelope returned for every connect call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub already_authenticated: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub qr_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone_number: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session: Option<SessionSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip)]
    pub error_kind: Option<ConnectErrorKind>,
}

impl ConnectResponse {
    pub fn failure(error: &ConnectError) -> Self {
        Self {
            success: false,
            already_authenticated: None,
            qr_code: None,
            phone_number: None,
            session: None,
            message: Some(error.to_string()),
            error_kind: Some(error.kind()),
        }
    }

    /// HTTP status matching the envelope.
    pub fn http_status(&self) -> u16 {
        self.error_kind.map_or(200, ConnectErrorKind::http_status)
    }
}

impl From<ConnectOutcome> for ConnectResponse {
    fn from(outcome: ConnectOutcome) -> Self {
        match outcome {
            ConnectOutcome::AlreadyAuthenticated => Self {
                success: true,
                already_authenticated: Some(true),
                qr_code: None,
                phone_number: None,
                session: None,
                message: None,
                error_kind: None,
            },
            ConnectOutcome::QrIssued {
                qr_code,
                phone_number,
                session,
            } => Self {
                success: true,
                already_authenticated: None,
                qr_code: Some(qr_code),
                phone_number,
                session: Some(session),
                message: None,
                error_kind: None,
            },
        }
    }
}

/// Everything stored locally about a caller's connection.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionView {
    pub connection: Option<ConnectionRecord>,
    pub sessions: Vec<SessionRecord>,
    pub identities: Vec<IdentityMapping>,
}

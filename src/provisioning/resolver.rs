//! Decide whether an existing gateway session can be reused.

use crate::gateway::{GatewaySession, SessionGateway, SessionStatus};

/// What to do with the session named by the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionPlan {
    /// Session is WORKING; nothing to create.
    AlreadyAuthenticated(GatewaySession),
    /// Session is waiting for a scan; fetch its QR directly.
    ReuseScanReady(GatewaySession),
    /// Create a fresh session. `delete_first` is set whenever a session may
    /// exist on the gateway.
    Recreate {
        previous: Option<SessionStatus>,
        delete_first: bool,
    },
}

pub async fn resolve_session(gateway: &dyn SessionGateway, name: &str) -> SessionPlan {
    match gateway.get_session(name).await {
        Ok(Some(session)) => match session.status {
            SessionStatus::Working => SessionPlan::AlreadyAuthenticated(session),
            SessionStatus::ScanQrCode => SessionPlan::ReuseScanReady(session),
            other => {
                tracing::info!(session = name, status = %other, "Existing session will be recreated");
                SessionPlan::Recreate {
                    previous: Some(other),
                    delete_first: true,
                }
            }
        },
        Ok(None) => SessionPlan::Recreate {
            previous: None,
            delete_first: false,
        },
        Err(e) => {
            tracing::warn!(session = name, error = %e, "Session lookup failed, treating as absent");
            SessionPlan::Recreate {
                previous: None,
                delete_first: true,
            }
        }
    }
}

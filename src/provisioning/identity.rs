//! Capture the account a WORKING session is logged in as.
//!
//! Nothing here fails the surrounding request: every problem is reported
//! as an [`IdentityCapture`] variant and logged.

use chrono::Utc;

use crate::db::{ConnectionStore, IdentityMapping};
use crate::error::{DatabaseError, GatewayError};
use crate::gateway::SessionGateway;

#[derive(Debug)]
pub enum IdentityCapture {
    Stored(IdentityMapping),
    /// Session reported no `me.id`.
    NoIdentity,
    /// Session disappeared between the status check and the re-query.
    SessionMissing,
    LookupFailed(GatewayError),
    StoreFailed(DatabaseError),
}

impl IdentityCapture {
    pub fn is_stored(&self) -> bool {
        matches!(self, Self::Stored(_))
    }
}

pub async fn capture_identity(
    gateway: &dyn SessionGateway,
    store: &dyn ConnectionStore,
    user_id: &str,
    session_name: &str,
) -> IdentityCapture {
    let outcome = capture(gateway, store, user_id, session_name).await;
    match &outcome {
        IdentityCapture::Stored(mapping) => {
            tracing::info!(
                session = session_name,
                user_id,
                identity = %mapping.identity,
                franchise_id = ?mapping.franchise_id,
                "Identity mapping stored"
            );
        }
        IdentityCapture::NoIdentity => {
            tracing::warn!(session = session_name, user_id, "WORKING session reported no identity");
        }
        IdentityCapture::SessionMissing => {
            tracing::warn!(session = session_name, user_id, "Session vanished before identity capture");
        }
        IdentityCapture::LookupFailed(e) => {
            tracing::warn!(session = session_name, user_id, error = %e, "Identity re-query failed");
        }
        IdentityCapture::StoreFailed(e) => {
            tracing::warn!(session = session_name, user_id, error = %e, "Failed to store identity mapping");
        }
    }
    outcome
}

async fn capture(
    gateway: &dyn SessionGateway,
    store: &dyn ConnectionStore,
    user_id: &str,
    session_name: &str,
) -> IdentityCapture {
    let session = match gateway.get_session(session_name).await {
        Ok(Some(session)) => session,
        Ok(None) => return IdentityCapture::SessionMissing,
        Err(e) => return IdentityCapture::LookupFailed(e),
    };
    let Some(identity) = session.identity else {
        return IdentityCapture::NoIdentity;
    };

    // Untagged is better than nothing.
    let franchise_id = match store.franchise_for_user(user_id).await {
        Ok(franchise) => franchise,
        Err(e) => {
            tracing::warn!(user_id, error = %e, "Franchise lookup failed, storing identity untagged");
            None
        }
    };

    let mapping = IdentityMapping {
        identity: identity.id,
        user_id: user_id.to_string(),
        franchise_id,
        display_name: identity.push_name,
        updated_at: Utc::now(),
    };
    match store.upsert_identity_mapping(&mapping).await {
        Ok(()) => IdentityCapture::Stored(mapping),
        Err(e) => IdentityCapture::StoreFailed(e),
    }
}

//! Mirror gateway transitions into the local connection tables.

use chrono::Utc;

use crate::db::{ConnectionRecord, ConnectionStatus, ConnectionStore, SessionRecord};
use crate::error::DatabaseError;
use crate::gateway::SessionStatus;

/// One observed transition for a user's session.
#[derive(Debug, Clone)]
pub struct Transition<'a> {
    pub user_id: &'a str,
    pub session_name: &'a str,
    /// Identifier the gateway reported for the session.
    pub gateway_session_id: &'a str,
    pub gateway_status: &'a SessionStatus,
    pub connection: ConnectionStatus,
    pub phone_number: Option<&'a str>,
}

/// Upsert the connection row and the (user, session) snapshot.
pub async fn record_transition(
    store: &dyn ConnectionStore,
    transition: &Transition<'_>,
) -> Result<(), DatabaseError> {
    let now = Utc::now();

    store
        .upsert_connection(&ConnectionRecord {
            user_id: transition.user_id.to_string(),
            session_name: transition.session_name.to_string(),
            status: transition.connection,
            phone_number: transition.phone_number.map(str::to_string),
            updated_at: now,
        })
        .await?;

    store
        .upsert_session_record(&SessionRecord {
            user_id: transition.user_id.to_string(),
            session_name: transition.session_name.to_string(),
            status: transition.gateway_status.to_string(),
            gateway_session_id: transition.gateway_session_id.to_string(),
            updated_at: now,
        })
        .await?;

    tracing::debug!(
        user_id = transition.user_id,
        session = transition.session_name,
        connection = transition.connection.as_str(),
        status = %transition.gateway_status,
        "Local connection state updated"
    );
    Ok(())
}

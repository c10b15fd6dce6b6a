//! End-to-end connect flow.

use std::sync::Arc;

use crate::auth::{CallerAuthenticator, CallerIdentity};
use crate::config::PollingConfig;
use crate::credentials::CredentialLookup;
use crate::db::{ConnectionStatus, ConnectionStore};
use crate::error::{ConfigError, ConnectError, GatewayError};
use crate::gateway::{BestEffort, GatewayFactory, GatewaySession, SessionGateway};
use crate::provisioning::envelope::{
    ConnectOutcome, ConnectRequest, ConnectResponse, ConnectionView, SessionSummary,
};
use crate::provisioning::identity::capture_identity;
use crate::provisioning::qr::acquire_qr;
use crate::provisioning::readiness::create_and_wait;
use crate::provisioning::resolver::{SessionPlan, resolve_session};
use crate::provisioning::sync::{Transition, record_transition};
use crate::provisioning::validation::{validate_phone, validate_session_name};

/// Sequences authentication, session resolution, QR acquisition and local
/// state sync for one connect request.
pub struct ConnectOrchestrator {
    authenticator: Arc<dyn CallerAuthenticator>,
    credentials: Arc<dyn CredentialLookup>,
    gateways: Arc<dyn GatewayFactory>,
    store: Arc<dyn ConnectionStore>,
    polling: PollingConfig,
}

impl ConnectOrchestrator {
    pub fn new(
        authenticator: Arc<dyn CallerAuthenticator>,
        credentials: Arc<dyn CredentialLookup>,
        gateways: Arc<dyn GatewayFactory>,
        store: Arc<dyn ConnectionStore>,
        polling: PollingConfig,
    ) -> Self {
        Self {
            authenticator,
            credentials,
            gateways,
            store,
            polling,
        }
    }

    /// Run the flow and fold any failure into the response envelope.
    pub async fn connect(&self, bearer: Option<&str>, request: ConnectRequest) -> ConnectResponse {
        match self.run(bearer, &request).await {
            Ok(outcome) => outcome.into(),
            Err(error) => {
                let kind = error.kind();
                if kind.http_status() >= 500 {
                    tracing::error!(
                        session = %request.session_name,
                        kind = kind.as_str(),
                        error = %error,
                        "Connect failed"
                    );
                } else {
                    tracing::info!(
                        session = %request.session_name,
                        kind = kind.as_str(),
                        error = %error,
                        "Connect rejected"
                    );
                }
                ConnectResponse::failure(&error)
            }
        }
    }

    pub async fn run(
        &self,
        bearer: Option<&str>,
        request: &ConnectRequest,
    ) -> Result<ConnectOutcome, ConnectError> {
        let caller = self.authenticator.authenticate(bearer).await?;
        let session_name = validate_session_name(&request.session_name)?;
        let credentials = self.credentials.pooled_credentials().await?;
        let gateway = self
            .gateways
            .gateway(&credentials)
            .map_err(|e| match e {
                GatewayError::InvalidBaseUrl { .. } => ConnectError::Configuration(
                    ConfigError::InvalidValue {
                        key: "gateway_credentials.base_url".to_string(),
                        message: e.to_string(),
                    },
                ),
                other => other.into(),
            })?;

        tracing::info!(user_id = %caller.user_id, session = session_name, "Connect requested");

        match resolve_session(gateway.as_ref(), session_name).await {
            SessionPlan::AlreadyAuthenticated(session) => {
                self.finish_authenticated(gateway.as_ref(), &caller, session_name, &session)
                    .await
            }
            SessionPlan::ReuseScanReady(session) => {
                // Reusing a pending session does not need a phone number; keep one
                // only if it is well-formed.
                let phone = request
                    .phone_number
                    .as_deref()
                    .and_then(|p| validate_phone(Some(p)).ok());
                self.issue_qr(gateway.as_ref(), &caller, session_name, session, phone)
                    .await
            }
            SessionPlan::Recreate {
                previous,
                delete_first,
            } => {
                let phone = validate_phone(request.phone_number.as_deref())?;
                if delete_first {
                    tracing::info!(
                        session = session_name,
                        previous = ?previous.as_ref().map(|s| s.as_str()),
                        "Deleting stale session"
                    );
                    let deleted = BestEffort::from(gateway.delete_session(session_name).await);
                    if deleted
                        .log_discarded("session delete", session_name)
                        .is_some()
                    {
                        tracing::debug!(session = session_name, "Stale session deleted");
                    }
                }
                let session =
                    create_and_wait(gateway.as_ref(), session_name, self.polling.readiness)
                        .await?;
                self.issue_qr(gateway.as_ref(), &caller, session_name, session, Some(phone))
                    .await
            }
        }
    }

    async fn finish_authenticated(
        &self,
        gateway: &dyn SessionGateway,
        caller: &CallerIdentity,
        session_name: &str,
        session: &GatewaySession,
    ) -> Result<ConnectOutcome, ConnectError> {
        let identity =
            capture_identity(gateway, self.store.as_ref(), &caller.user_id, session_name).await;
        tracing::debug!(stored = identity.is_stored(), "Identity capture finished");

        record_transition(
            self.store.as_ref(),
            &Transition {
                user_id: &caller.user_id,
                session_name,
                gateway_session_id: &session.name,
                gateway_status: &session.status,
                connection: ConnectionStatus::Connected,
                phone_number: None,
            },
        )
        .await?;

        tracing::info!(user_id = %caller.user_id, session = session_name, "Session already authenticated");
        Ok(ConnectOutcome::AlreadyAuthenticated)
    }

    async fn issue_qr(
        &self,
        gateway: &dyn SessionGateway,
        caller: &CallerIdentity,
        session_name: &str,
        session: GatewaySession,
        phone_number: Option<String>,
    ) -> Result<ConnectOutcome, ConnectError> {
        let qr = acquire_qr(gateway, session_name, self.polling.qr).await?;

        record_transition(
            self.store.as_ref(),
            &Transition {
                user_id: &caller.user_id,
                session_name,
                gateway_session_id: &session.name,
                gateway_status: &session.status,
                connection: ConnectionStatus::Connecting,
                phone_number: phone_number.as_deref(),
            },
        )
        .await?;

        tracing::info!(user_id = %caller.user_id, session = session_name, "QR code issued");
        Ok(ConnectOutcome::QrIssued {
            qr_code: qr.to_data_url(),
            phone_number,
            session: SessionSummary {
                name: session.name,
                status: session.status.to_string(),
            },
        })
    }

    /// Everything stored locally for the authenticated caller.
    pub async fn connection_view(
        &self,
        bearer: Option<&str>,
    ) -> Result<ConnectionView, ConnectError> {
        let caller = self.authenticator.authenticate(bearer).await?;
        Ok(ConnectionView {
            connection: self.store.get_connection(&caller.user_id).await?,
            sessions: self.store.list_session_records(&caller.user_id).await?,
            identities: self.store.list_identity_mappings(&caller.user_id).await?,
        })
    }
}

#[cfg(all(test, feature = "libsql"))]
mod tests {
    use std::time::Duration;

    use async_trait::async_trait;
    use pretty_assertions::assert_eq;
    use secrecy::SecretString;

    use super::*;
    use crate::auth::StaticTokenAuthenticator;
    use crate::config::{ApiToken, PollPolicy};
    use crate::credentials::{
        GatewayCredentials, StaticCredentialLookup, UnconfiguredCredentialLookup,
    };
    use crate::db::libsql::LibSqlBackend;
    use crate::db::{ConnectionRecord, Database, IdentityMapping, SessionRecord};
    use crate::error::{ConnectErrorKind, DatabaseError};
    use crate::gateway::fake::{Call, Lookup, QrStep, ScriptedFactory, ScriptedGateway};

    const PHONE: &str = "5511987654321";

    fn fast_polling() -> PollingConfig {
        PollingConfig {
            readiness: PollPolicy::new(Duration::ZERO, 30),
            qr: PollPolicy::new(Duration::ZERO, 60),
        }
    }

    fn authenticator() -> Arc<dyn CallerAuthenticator> {
        Arc::new(StaticTokenAuthenticator::new(vec![ApiToken {
            token: SecretString::from("tok".to_string()),
            user_id: "user-1".to_string(),
        }]))
    }

    fn static_credentials() -> Arc<dyn CredentialLookup> {
        Arc::new(StaticCredentialLookup::new(GatewayCredentials {
            base_url: "https://waha.internal".to_string(),
            api_key: SecretString::from("pooled".to_string()),
        }))
    }

    struct Harness {
        orchestrator: ConnectOrchestrator,
        gateway: Arc<ScriptedGateway>,
        db: Arc<LibSqlBackend>,
        _dir: tempfile::TempDir,
    }

    async fn harness(gateway: ScriptedGateway) -> Harness {
        let dir = tempfile::tempdir().unwrap();
        let db = Arc::new(
            LibSqlBackend::new_local(&dir.path().join("orchestrator.db"))
                .await
                .unwrap(),
        );
        db.run_migrations().await.unwrap();
        let gateway = Arc::new(gateway);
        let orchestrator = ConnectOrchestrator::new(
            authenticator(),
            static_credentials(),
            Arc::new(ScriptedFactory::new(gateway.clone())),
            db.clone(),
            fast_polling(),
        );
        Harness {
            orchestrator,
            gateway,
            db,
            _dir: dir,
        }
    }

    fn request(phone: Option<&str>) -> ConnectRequest {
        ConnectRequest {
            session_name: "tenant-a".to_string(),
            phone_number: phone.map(str::to_string),
        }
    }

    fn position(calls: &[Call], wanted: &Call) -> Option<usize> {
        calls.iter().position(|c| c == wanted)
    }

    fn named(op: fn(String) -> Call) -> Call {
        op("tenant-a".to_string())
    }

    #[tokio::test]
    async fn working_session_is_already_authenticated() {
        let h = harness(ScriptedGateway::new().with_lookups([Lookup::Identified {
            status: "WORKING",
            id: "5511987654321@c.us",
            push_name: Some("Loja Centro"),
        }]))
        .await;
        let conn = h.db.connect().await.unwrap();
        conn.execute(
            "INSERT INTO franchise_members (user_id, franchise_id) VALUES ('user-1', 'fr-7')",
            (),
        )
        .await
        .unwrap();

        let response = h.orchestrator.connect(Some("tok"), request(None)).await;

        assert_eq!(
            response,
            ConnectResponse::from(ConnectOutcome::AlreadyAuthenticated)
        );
        assert_eq!(
            h.gateway.calls(),
            vec![named(Call::Get), named(Call::Get)],
            "WORKING must not create, delete or fetch a QR code"
        );

        let stored = h.db.get_connection("user-1").await.unwrap().unwrap();
        assert_eq!(stored.status, ConnectionStatus::Connected);
        let identities = h.db.list_identity_mappings("user-1").await.unwrap();
        assert_eq!(identities.len(), 1);
        assert_eq!(identities[0].identity, "5511987654321@c.us");
        assert_eq!(identities[0].franchise_id.as_deref(), Some("fr-7"));
        assert_eq!(identities[0].display_name.as_deref(), Some("Loja Centro"));
    }

    #[tokio::test]
    async fn missing_identity_does_not_fail_authenticated_path() {
        let h = harness(ScriptedGateway::new().with_lookups([
            Lookup::Status("WORKING"),
            Lookup::Fail,
        ]))
        .await;

        let response = h.orchestrator.connect(Some("tok"), request(None)).await;

        assert!(response.success);
        assert_eq!(response.already_authenticated, Some(true));
        assert!(h.db.list_identity_mappings("user-1").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn scan_ready_session_goes_straight_to_qr() {
        let h = harness(
            ScriptedGateway::new()
                .with_lookups([Lookup::Status("SCAN_QR_CODE")])
                .with_qr([QrStep::NotReady(404), QrStep::Ready(b"png")]),
        )
        .await;

        let response = h.orchestrator.connect(Some("tok"), request(None)).await;

        assert!(response.success, "{response:?}");
        assert_eq!(response.qr_code.as_deref(), Some("data:image/png;base64,cG5n"));
        assert_eq!(response.phone_number, None);
        assert_eq!(h.gateway.count(|c| matches!(c, Call::Delete(_) | Call::Create(_))), 0);

        let stored = h.db.get_connection("user-1").await.unwrap().unwrap();
        assert_eq!(stored.status, ConnectionStatus::Connecting);
        let sessions = h.db.list_session_records("user-1").await.unwrap();
        assert_eq!(sessions[0].status, "SCAN_QR_CODE");
    }

    #[tokio::test]
    async fn stale_session_is_deleted_once_before_create() {
        let h = harness(
            ScriptedGateway::new()
                .with_lookups([Lookup::Status("FAILED"), Lookup::Status("SCAN_QR_CODE")])
                .with_qr([QrStep::Ready(b"png")]),
        )
        .await;

        let response = h.orchestrator.connect(Some("tok"), request(Some(PHONE))).await;
        assert!(response.success, "{response:?}");

        let calls = h.gateway.calls();
        assert_eq!(h.gateway.count(|c| matches!(c, Call::Delete(_))), 1);
        assert_eq!(h.gateway.count(|c| matches!(c, Call::Create(_))), 1);
        assert!(position(&calls, &named(Call::Delete)) < position(&calls, &named(Call::Create)));
    }

    #[tokio::test]
    async fn failed_delete_is_tolerated() {
        let h = harness(
            ScriptedGateway::new()
                .with_lookups([Lookup::Status("STOPPED"), Lookup::Status("STARTED")])
                .with_failing_delete()
                .with_qr([QrStep::Ready(b"png")]),
        )
        .await;

        let response = h.orchestrator.connect(Some("tok"), request(Some(PHONE))).await;

        assert!(response.success, "{response:?}");
        assert_eq!(
            response.session.map(|s| s.status),
            Some("STARTED".to_string())
        );
    }

    #[tokio::test]
    async fn bad_phone_is_rejected_before_any_mutation() {
        for phone in [None, Some("11987654321"), Some("55119876")] {
            let h = harness(ScriptedGateway::new().with_lookups([Lookup::Status("STOPPED")])).await;

            let response = h.orchestrator.connect(Some("tok"), request(phone)).await;

            assert!(!response.success);
            assert_eq!(response.http_status(), 400);
            assert_eq!(h.gateway.calls(), vec![named(Call::Get)], "{phone:?}");
            assert!(h.db.get_connection("user-1").await.unwrap().is_none());
        }
    }

    #[tokio::test]
    async fn not_found_session_is_created_and_qr_returned() {
        let h = harness(
            ScriptedGateway::new()
                .with_lookups([
                    Lookup::Absent,
                    Lookup::Status("STARTING"),
                    Lookup::Status("SCAN_QR_CODE"),
                ])
                .with_create(Some("STARTING"))
                .with_qr([QrStep::Ready(b"png")]),
        )
        .await;

        let response = h.orchestrator.connect(Some("tok"), request(Some(PHONE))).await;

        assert_eq!(
            response,
            ConnectResponse::from(ConnectOutcome::QrIssued {
                qr_code: "data:image/png;base64,cG5n".to_string(),
                phone_number: Some(PHONE.to_string()),
                session: SessionSummary {
                    name: "tenant-a".to_string(),
                    status: "SCAN_QR_CODE".to_string(),
                },
            })
        );
        assert_eq!(h.gateway.count(|c| matches!(c, Call::Delete(_))), 0);

        let stored = h.db.get_connection("user-1").await.unwrap().unwrap();
        assert_eq!(stored.phone_number.as_deref(), Some(PHONE));
        assert_eq!(stored.status, ConnectionStatus::Connecting);
    }

    #[tokio::test]
    async fn session_stuck_starting_times_out() {
        let h = harness(
            ScriptedGateway::new()
                .with_lookups([Lookup::Absent, Lookup::Status("STARTING")])
                .with_create(Some("STARTING")),
        )
        .await;

        let response = h.orchestrator.connect(Some("tok"), request(Some(PHONE))).await;

        assert_eq!(response.http_status(), 504);
        assert_eq!(
            response.message.as_deref(),
            Some("Session failed to start. Final status: STARTING")
        );
        // One resolver lookup plus thirty readiness polls.
        assert_eq!(h.gateway.count(|c| matches!(c, Call::Get(_))), 31);
        assert_eq!(h.gateway.count(|c| matches!(c, Call::Qr(_))), 0);
    }

    #[tokio::test]
    async fn qr_never_available_times_out() {
        let h = harness(
            ScriptedGateway::new()
                .with_lookups([Lookup::Status("SCAN_QR_CODE")])
                .with_qr([QrStep::NotReady(404)]),
        )
        .await;

        let response = h.orchestrator.connect(Some("tok"), request(None)).await;

        assert_eq!(response.http_status(), 504);
        assert_eq!(
            response.message.as_deref(),
            Some("Failed to obtain QR Code within timeout period")
        );
        assert_eq!(h.gateway.count(|c| matches!(c, Call::Qr(_))), 60);
        assert!(h.db.get_connection("user-1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn repeated_connects_keep_one_row_each() {
        let h = harness(
            ScriptedGateway::new()
                .with_lookups([Lookup::Status("SCAN_QR_CODE")])
                .with_qr([QrStep::Ready(b"png")]),
        )
        .await;

        for _ in 0..3 {
            let response = h.orchestrator.connect(Some("tok"), request(Some(PHONE))).await;
            assert!(response.success);
        }

        let conn = h.db.connect().await.unwrap();
        let mut rows = conn
            .query("SELECT COUNT(*) FROM whatsapp_connections", ())
            .await
            .unwrap();
        let count: i64 = rows.next().await.unwrap().unwrap().get(0).unwrap();
        assert_eq!(count, 1);
        assert_eq!(h.db.list_session_records("user-1").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn unauthenticated_callers_never_reach_the_gateway() {
        let h = harness(ScriptedGateway::new()).await;

        for bearer in [None, Some("wrong")] {
            let response = h.orchestrator.connect(bearer, request(Some(PHONE))).await;
            assert_eq!(response.http_status(), 401);
        }
        assert!(h.gateway.calls().is_empty());
    }

    #[tokio::test]
    async fn invalid_session_name_is_a_validation_error() {
        let h = harness(ScriptedGateway::new()).await;
        let response = h
            .orchestrator
            .connect(
                Some("tok"),
                ConnectRequest {
                    session_name: "../admin".to_string(),
                    phone_number: Some(PHONE.to_string()),
                },
            )
            .await;
        assert_eq!(response.http_status(), 400);
        assert!(h.gateway.calls().is_empty());
    }

    #[tokio::test]
    async fn missing_credentials_are_a_configuration_error() {
        let gateway = Arc::new(ScriptedGateway::new());
        let dir = tempfile::tempdir().unwrap();
        let db = Arc::new(LibSqlBackend::new_local(&dir.path().join("c.db")).await.unwrap());
        db.run_migrations().await.unwrap();
        let orchestrator = ConnectOrchestrator::new(
            authenticator(),
            Arc::new(UnconfiguredCredentialLookup),
            Arc::new(ScriptedFactory::new(gateway.clone())),
            db,
            fast_polling(),
        );

        let err = orchestrator
            .run(Some("tok"), &request(Some(PHONE)))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ConnectErrorKind::Configuration);
        assert!(gateway.calls().is_empty());
    }

    struct BrokenStore;

    #[async_trait]
    impl ConnectionStore for BrokenStore {
        async fn upsert_connection(&self, _: &ConnectionRecord) -> Result<(), DatabaseError> {
            Err(DatabaseError::Query("disk full".to_string()))
        }
        async fn get_connection(&self, _: &str) -> Result<Option<ConnectionRecord>, DatabaseError> {
            Ok(None)
        }
        async fn upsert_session_record(&self, _: &SessionRecord) -> Result<(), DatabaseError> {
            Ok(())
        }
        async fn list_session_records(&self, _: &str) -> Result<Vec<SessionRecord>, DatabaseError> {
            Ok(Vec::new())
        }
        async fn upsert_identity_mapping(&self, _: &IdentityMapping) -> Result<(), DatabaseError> {
            Ok(())
        }
        async fn list_identity_mappings(
            &self,
            _: &str,
        ) -> Result<Vec<IdentityMapping>, DatabaseError> {
            Ok(Vec::new())
        }
        async fn franchise_for_user(&self, _: &str) -> Result<Option<String>, DatabaseError> {
            Ok(None)
        }
    }

    #[tokio::test]
    async fn storage_failures_surface_as_storage_errors() {
        let gateway = Arc::new(
            ScriptedGateway::new()
                .with_lookups([Lookup::Status("SCAN_QR_CODE")])
                .with_qr([QrStep::Ready(b"png")]),
        );
        let orchestrator = ConnectOrchestrator::new(
            authenticator(),
            static_credentials(),
            Arc::new(ScriptedFactory::new(gateway)),
            Arc::new(BrokenStore),
            fast_polling(),
        );

        let response = orchestrator.connect(Some("tok"), request(None)).await;
        assert_eq!(response.error_kind, Some(ConnectErrorKind::Storage));
        assert_eq!(response.http_status(), 500);
    }

    #[tokio::test]
    async fn connection_view_lists_stored_state() {
        let h = harness(
            ScriptedGateway::new()
                .with_lookups([Lookup::Status("SCAN_QR_CODE")])
                .with_qr([QrStep::Ready(b"png")]),
        )
        .await;
        h.orchestrator.connect(Some("tok"), request(Some(PHONE))).await;

        let view = h.orchestrator.connection_view(Some("tok")).await.unwrap();
        assert_eq!(
            view.connection.map(|c| c.status),
            Some(ConnectionStatus::Connecting)
        );
        assert_eq!(view.sessions.len(), 1);
        assert!(view.identities.is_empty());

        let err = h.orchestrator.connection_view(None).await.unwrap_err();
        assert_eq!(err.kind(), ConnectErrorKind::Authentication);
    }
}

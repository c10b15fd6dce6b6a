//! Error types for waprovision.

use std::time::Duration;

use serde::Serialize;

/// Top-level error type for the service binary and startup wiring.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("Gateway error: {0}")]
    Gateway(#[from] GatewayError),

    #[error("Server error: {0}")]
    Server(#[from] ServerError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required configuration: {key}. {hint}")]
    MissingRequired { key: String, hint: String },

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    #[error("Pooled gateway credentials unavailable for owner {owner}: {reason}")]
    CredentialsUnavailable { owner: String, reason: String },
}

/// Database-related errors.
#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    #[error("Connection pool error: {0}")]
    Pool(String),

    #[error("Query failed: {0}")]
    Query(String),

    #[error("Migration failed: {0}")]
    Migration(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[cfg(feature = "postgres")]
    #[error("PostgreSQL error: {0}")]
    Postgres(#[from] tokio_postgres::Error),

    #[cfg(feature = "postgres")]
    #[error("Pool runtime error: {0}")]
    PoolRuntime(#[from] deadpool_postgres::PoolError),

    #[cfg(feature = "libsql")]
    #[error("LibSQL error: {0}")]
    LibSql(#[from] libsql::Error),
}

/// Failures talking to the messaging gateway.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("Gateway {operation} request for session {session} failed: {reason}")]
    RequestFailed {
        operation: &'static str,
        session: String,
        reason: String,
    },

    #[error("Gateway {operation} for session {session} returned HTTP {status}: {body}")]
    UnexpectedStatus {
        operation: &'static str,
        session: String,
        status: u16,
        body: String,
    },

    #[error("Invalid gateway response to {operation} for session {session}: {reason}")]
    InvalidResponse {
        operation: &'static str,
        session: String,
        reason: String,
    },

    #[error("Invalid gateway base URL {url}: {reason}")]
    InvalidBaseUrl { url: String, reason: String },

    #[error("HTTP client init failed: {0}")]
    Client(String),
}

/// Caller authentication failures.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("Missing bearer token")]
    MissingToken,

    #[error("Invalid or expired bearer token")]
    InvalidToken,
}

/// Bounded polling budgets that ran out.
#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum GatewayTimeout {
    #[error("Session failed to start. Final status: {last_status}")]
    Readiness {
        last_status: String,
        attempts: u32,
        interval: Duration,
    },

    #[error("Failed to obtain QR Code within timeout period")]
    QrCode { attempts: u32, interval: Duration },
}

/// HTTP server startup errors.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("Failed to bind to {addr}: {reason}")]
    Bind { addr: String, reason: String },
}

/// Every fatal outcome of one connect orchestration.
///
/// The orchestrator converts these into the uniform failure envelope exactly
/// once, at the top of the flow.
#[derive(Debug, thiserror::Error)]
pub enum ConnectError {
    #[error("Authentication failed: {0}")]
    Authentication(#[from] AuthError),

    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigError),

    #[error("{0}")]
    Validation(String),

    #[error(transparent)]
    GatewayTimeout(#[from] GatewayTimeout),

    #[error("Gateway request failed: {0}")]
    GatewayRequest(#[from] GatewayError),

    #[error("Failed to persist connection state: {0}")]
    Storage(#[from] DatabaseError),
}

/// Coarse classification of [`ConnectError`] for status codes and logs.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ConnectErrorKind {
    Authentication,
    Configuration,
    Validation,
    GatewayTimeout,
    GatewayRequest,
    Storage,
}

impl ConnectErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Authentication => "authentication",
            Self::Configuration => "configuration",
            Self::Validation => "validation",
            Self::GatewayTimeout => "gateway_timeout",
            Self::GatewayRequest => "gateway_request",
            Self::Storage => "storage",
        }
    }

    /// HTTP status used for the failure envelope.
    pub fn http_status(self) -> u16 {
        match self {
            Self::Authentication => 401,
            Self::Validation => 400,
            Self::GatewayRequest => 502,
            Self::GatewayTimeout => 504,
            Self::Configuration | Self::Storage => 500,
        }
    }
}

impl ConnectError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn kind(&self) -> ConnectErrorKind {
        match self {
            Self::Authentication(_) => ConnectErrorKind::Authentication,
            Self::Configuration(_) => ConnectErrorKind::Configuration,
            Self::Validation(_) => ConnectErrorKind::Validation,
            Self::GatewayTimeout(_) => ConnectErrorKind::GatewayTimeout,
            Self::GatewayRequest(_) => ConnectErrorKind::GatewayRequest,
            Self::Storage(_) => ConnectErrorKind::Storage,
        }
    }
}

/// Result type alias for the service.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn readiness_timeout_reports_final_status() {
        let err = ConnectError::from(GatewayTimeout::Readiness {
            last_status: "STARTING".to_string(),
            attempts: 30,
            interval: Duration::from_secs(1),
        });

        assert_eq!(err.kind(), ConnectErrorKind::GatewayTimeout);
        assert_eq!(
            err.to_string(),
            "Session failed to start. Final status: STARTING"
        );
        assert_eq!(err.kind().http_status(), 504);
    }

    #[test]
    fn qr_timeout_is_distinct_from_readiness_timeout() {
        let err = ConnectError::from(GatewayTimeout::QrCode {
            attempts: 60,
            interval: Duration::from_secs(1),
        });

        assert_eq!(
            err.to_string(),
            "Failed to obtain QR Code within timeout period"
        );
        assert_ne!(
            err.to_string(),
            ConnectError::from(GatewayTimeout::Readiness {
                last_status: "STARTING".to_string(),
                attempts: 60,
                interval: Duration::from_secs(1),
            })
            .to_string()
        );
    }

    #[test]
    fn maps_kinds_to_http_status() {
        assert_eq!(
            ConnectError::from(AuthError::MissingToken)
                .kind()
                .http_status(),
            401
        );
        assert_eq!(
            ConnectError::validation("bad phone").kind().http_status(),
            400
        );
        assert_eq!(
            ConnectError::from(GatewayError::RequestFailed {
                operation: "create_session",
                session: "tenant-a".to_string(),
                reason: "connection refused".to_string(),
            })
            .kind()
            .http_status(),
            502
        );
        assert_eq!(
            ConnectError::from(ConfigError::MissingRequired {
                key: "GATEWAY_POOL_OWNER".into(),
                hint: "set it".into(),
            })
            .kind()
            .http_status(),
            500
        );
    }

    #[test]
    fn serializes_kind_labels() {
        let value = serde_json::to_value(ConnectErrorKind::GatewayTimeout).expect("json");
        assert_eq!(value, "gateway_timeout");
        assert_eq!(ConnectErrorKind::Storage.as_str(), "storage");
    }
}

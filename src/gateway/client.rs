//! REST client for the gateway session API.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

use crate::credentials::GatewayCredentials;
use crate::error::GatewayError;
use crate::gateway::{
    GatewayFactory, GatewaySession, QrPoll, SessionGateway, SessionIdentity, SessionStatus,
};

const API_KEY_HEADER: &str = "X-Api-Key";

/// Longest error body kept in [`GatewayError::UnexpectedStatus`].
const MAX_ERROR_BODY: usize = 512;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SessionPayload {
    #[serde(default)]
    name: Option<String>,
    status: String,
    #[serde(default)]
    me: Option<MePayload>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MePayload {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    push_name: Option<String>,
}

#[derive(Debug, Serialize)]
struct CreateSessionRequest<'a> {
    name: &'a str,
    start: bool,
}

impl SessionPayload {
    fn into_session(self, requested: &str) -> GatewaySession {
        let identity = self.me.and_then(|me| {
            me.id
                .filter(|id| !id.trim().is_empty())
                .map(|id| SessionIdentity {
                    id,
                    push_name: me.push_name,
                })
        });
        GatewaySession {
            name: self.name.unwrap_or_else(|| requested.to_string()),
            status: SessionStatus::parse(&self.status),
            identity,
        }
    }
}

/// HTTP client bound to one gateway account.
pub struct HttpGatewayClient {
    http: reqwest::Client,
    base_url: String,
    api_key: SecretString,
}

impl HttpGatewayClient {
    pub fn new(
        http: reqwest::Client,
        credentials: &GatewayCredentials,
    ) -> Result<Self, GatewayError> {
        let parsed =
            url::Url::parse(&credentials.base_url).map_err(|e| GatewayError::InvalidBaseUrl {
                url: credentials.base_url.clone(),
                reason: e.to_string(),
            })?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(GatewayError::InvalidBaseUrl {
                url: credentials.base_url.clone(),
                reason: format!("unsupported scheme '{}'", parsed.scheme()),
            });
        }

        Ok(Self {
            http,
            base_url: credentials.base_url.trim_end_matches('/').to_string(),
            api_key: credentials.api_key.clone(),
        })
    }

    fn session_url(&self, name: &str) -> String {
        format!("{}/api/sessions/{}", self.base_url, urlencoding::encode(name))
    }

    fn qr_url(&self, name: &str) -> String {
        format!("{}/api/{}/auth/qr", self.base_url, urlencoding::encode(name))
    }

    fn request(&self, method: reqwest::Method, url: &str) -> reqwest::RequestBuilder {
        self.http
            .request(method, url)
            .header(API_KEY_HEADER, self.api_key.expose_secret())
    }

    async fn send(
        &self,
        builder: reqwest::RequestBuilder,
        operation: &'static str,
        session: &str,
    ) -> Result<reqwest::Response, GatewayError> {
        builder
            .send()
            .await
            .map_err(|e| GatewayError::RequestFailed {
                operation,
                session: session.to_string(),
                reason: describe_transport_error(&e),
            })
    }

    async fn unexpected_status(
        response: reqwest::Response,
        operation: &'static str,
        session: &str,
    ) -> GatewayError {
        let status = response.status().as_u16();
        let mut body = response.text().await.unwrap_or_default();
        if body.len() > MAX_ERROR_BODY {
            let mut cut = MAX_ERROR_BODY;
            while !body.is_char_boundary(cut) {
                cut -= 1;
            }
            body.truncate(cut);
        }
        GatewayError::UnexpectedStatus {
            operation,
            session: session.to_string(),
            status,
            body,
        }
    }

    async fn parse_session(
        response: reqwest::Response,
        operation: &'static str,
        session: &str,
    ) -> Result<GatewaySession, GatewayError> {
        let payload: SessionPayload =
            response
                .json()
                .await
                .map_err(|e| GatewayError::InvalidResponse {
                    operation,
                    session: session.to_string(),
                    reason: e.to_string(),
                })?;
        Ok(payload.into_session(session))
    }
}

fn describe_transport_error(error: &reqwest::Error) -> String {
    if error.is_timeout() {
        format!("timed out: {error}")
    } else if error.is_connect() {
        format!("connect failed: {error}")
    } else {
        error.to_string()
    }
}

#[async_trait]
impl SessionGateway for HttpGatewayClient {
    async fn get_session(&self, name: &str) -> Result<Option<GatewaySession>, GatewayError> {
        const OP: &str = "get_session";
        let response = self
            .send(self.request(reqwest::Method::GET, &self.session_url(name)), OP, name)
            .await?;

        match response.status() {
            StatusCode::NOT_FOUND => Ok(None),
            status if status.is_success() => {
                Self::parse_session(response, OP, name).await.map(Some)
            }
            _ => Err(Self::unexpected_status(response, OP, name).await),
        }
    }

    async fn create_session(&self, name: &str) -> Result<GatewaySession, GatewayError> {
        const OP: &str = "create_session";
        let url = format!("{}/api/sessions", self.base_url);
        let builder = self
            .request(reqwest::Method::POST, &url)
            .json(&CreateSessionRequest { name, start: true });
        let response = self.send(builder, OP, name).await?;

        if !response.status().is_success() {
            return Err(Self::unexpected_status(response, OP, name).await);
        }
        Self::parse_session(response, OP, name).await
    }

    async fn delete_session(&self, name: &str) -> Result<(), GatewayError> {
        const OP: &str = "delete_session";
        let response = self
            .send(
                self.request(reqwest::Method::DELETE, &self.session_url(name)),
                OP,
                name,
            )
            .await?;

        let status = response.status();
        if status.is_success() || status == StatusCode::NOT_FOUND {
            Ok(())
        } else {
            Err(Self::unexpected_status(response, OP, name).await)
        }
    }

    async fn get_qr_code(&self, name: &str) -> Result<QrPoll, GatewayError> {
        const OP: &str = "get_qr_code";
        let builder = self
            .request(reqwest::Method::GET, &self.qr_url(name))
            .header(reqwest::header::ACCEPT, "image/png");
        let response = self.send(builder, OP, name).await?;

        if response.status() != StatusCode::OK {
            return Ok(QrPoll::NotReady {
                status: response.status().as_u16(),
            });
        }
        let bytes = response
            .bytes()
            .await
            .map_err(|e| GatewayError::RequestFailed {
                operation: OP,
                session: name.to_string(),
                reason: format!("reading QR body: {e}"),
            })?;
        Ok(QrPoll::Ready(bytes))
    }
}

/// Shares one `reqwest::Client` (and its connection pool) across requests.
pub struct HttpGatewayFactory {
    http: reqwest::Client,
}

impl HttpGatewayFactory {
    pub fn new(request_timeout: Duration) -> Result<Self, GatewayError> {
        let http = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| GatewayError::Client(e.to_string()))?;
        Ok(Self { http })
    }
}

impl GatewayFactory for HttpGatewayFactory {
    fn gateway(
        &self,
        credentials: &GatewayCredentials,
    ) -> Result<Arc<dyn SessionGateway>, GatewayError> {
        Ok(Arc::new(HttpGatewayClient::new(
            self.http.clone(),
            credentials,
        )?))
    }
}
